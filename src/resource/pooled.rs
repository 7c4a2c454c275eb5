//! Pooled Resource
//!
//! One physical object plus the bookkeeping the registry needs to share it
//! safely across tickets and frames.

use std::any::Any;

use crate::backend::RenderBackend;
use crate::resource::TicketId;
use crate::resource::definition::{Disposal, DisposerKind, ResourceShape};

// ─── Reservation Ring ─────────────────────────────────────────────────────────

/// One reservation bit per timeline slot (pass execution index).
///
/// Slots wrap modulo [`ReservationMask::SLOTS`]; a window longer than the
/// ring reserves every slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReservationMask {
    bits: [u64; 2],
}

impl ReservationMask {
    pub const SLOTS: usize = 128;

    #[inline]
    fn locate(slot: usize) -> (usize, u64) {
        let slot = slot % Self::SLOTS;
        (slot / 64, 1_u64 << (slot % 64))
    }

    pub fn reserve(&mut self, slot: usize) {
        let (word, bit) = Self::locate(slot);
        self.bits[word] |= bit;
    }

    /// Reserves every slot in `start..=end`.
    pub fn reserve_range(&mut self, start: usize, end: usize) {
        if end.saturating_sub(start) + 1 >= Self::SLOTS {
            self.bits = [u64::MAX; 2];
            return;
        }
        for slot in start..=end {
            self.reserve(slot);
        }
    }

    #[must_use]
    pub fn is_reserved(&self, slot: usize) -> bool {
        let (word, bit) = Self::locate(slot);
        self.bits[word] & bit != 0
    }

    /// Returns `true` if any slot in `start..=end` is reserved.
    #[must_use]
    pub fn any_within(&self, start: usize, end: usize) -> bool {
        if self.is_empty() {
            return false;
        }
        if end.saturating_sub(start) + 1 >= Self::SLOTS {
            return true;
        }
        (start..=end).any(|slot| self.is_reserved(slot))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits == [0; 2]
    }

    pub fn clear(&mut self) {
        self.bits = [0; 2];
    }
}

// ─── Pooled Resource ──────────────────────────────────────────────────────────

pub(crate) struct PooledResource {
    pub(crate) id: u64,
    pub(crate) object: Box<dyn Any>,
    pub(crate) shape: ResourceShape,
    disposal: Disposal,
    pub(crate) acquired: bool,
    timeout: u32,
    pub(crate) used_this_frame: bool,
    pub(crate) reservations: ReservationMask,
    /// Ticket that explicitly reserved this object for the current frame.
    pub(crate) claimed_by: Option<TicketId>,
    pub(crate) constant: bool,
}

impl PooledResource {
    pub(crate) fn new(id: u64, object: Box<dyn Any>, shape: ResourceShape, disposal: Disposal) -> Self {
        Self {
            id,
            object,
            shape,
            disposal,
            acquired: false,
            timeout: 0,
            used_this_frame: false,
            reservations: ReservationMask::default(),
            claimed_by: None,
            constant: false,
        }
    }

    pub(crate) fn disposer_kind(&self) -> DisposerKind {
        self.disposal.kind()
    }

    /// Whether `ticket` may bind this object for the window `start..=end`.
    pub(crate) fn is_available_for(&self, ticket: TicketId, start: usize, end: usize) -> bool {
        if self.acquired {
            return false;
        }
        match self.claimed_by {
            Some(owner) => owner == ticket,
            None => !self.reservations.any_within(start, end),
        }
    }

    /// Re-arms the eviction timer to `max(static, default)`.
    pub(crate) fn arm_timer(&mut self, static_timeout: Option<u32>, default_timeout: u32) {
        self.timeout = static_timeout.map_or(default_timeout, |t| t.max(default_timeout));
    }

    #[must_use]
    pub(crate) fn timeout(&self) -> u32 {
        self.timeout
    }

    /// Counts one idle frame. Returns `false` once the object has outlived
    /// its timeout and should be disposed.
    pub(crate) fn tick_timeout(&mut self) -> bool {
        if self.timeout == 0 {
            return false;
        }
        self.timeout -= 1;
        true
    }

    pub(crate) fn dispose(self, backend: &mut dyn RenderBackend) {
        let Self {
            object, disposal, ..
        } = self;
        disposal.run(object, backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservation_ring_wraps() {
        let mut mask = ReservationMask::default();
        mask.reserve(3);
        assert!(mask.is_reserved(3));
        assert!(mask.is_reserved(3 + ReservationMask::SLOTS));
        assert!(!mask.is_reserved(4));

        mask.reserve(70);
        assert!(mask.any_within(60, 80));
        assert!(!mask.any_within(4, 69));

        mask.clear();
        assert!(mask.is_empty());
        assert!(!mask.any_within(0, 500));
    }

    #[test]
    fn test_reservation_range() {
        let mut mask = ReservationMask::default();
        mask.reserve_range(2, 5);
        assert!(!mask.is_reserved(1));
        assert!((2..=5).all(|slot| mask.is_reserved(slot)));
        assert!(!mask.is_reserved(6));

        mask.reserve_range(0, 1000);
        assert!(mask.is_reserved(127));
    }

    #[test]
    fn test_timer_survives_timeout_frames() {
        let mut resource =
            PooledResource::new(1, Box::new(0_u32), ResourceShape::Value(std::any::TypeId::of::<u32>()), Disposal::Noop);
        resource.arm_timer(Some(2), 1);
        assert_eq!(resource.timeout(), 2);
        assert!(resource.tick_timeout());
        assert!(resource.tick_timeout());
        assert!(!resource.tick_timeout());

        resource.arm_timer(None, 5);
        assert_eq!(resource.timeout(), 5);
        resource.arm_timer(Some(1), 5);
        assert_eq!(resource.timeout(), 5);
    }
}

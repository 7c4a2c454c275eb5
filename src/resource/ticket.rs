//! Resource Tickets
//!
//! A [`ResourceTicket<T>`] is a typed, copyable handle to a resource that may
//! not exist yet. Tickets live in a [`TicketTable`] arena. Each ticket either
//! stands for itself (its owner's declaration) or forwards to another ticket,
//! which lets a pass hand a producer's output through under a new name.
//!
//! ```text
//!   Blur.Input ──► PassThrough.Output ──► PassThrough.Input ──► Scene.Color
//!                                                                 (terminal)
//! ```
//!
//! Resolution follows forwarding links to the terminal ticket and caches the
//! result on every visited entry (path compression). Any link change bumps
//! the table epoch, invalidating all cached results at once.

use std::any::TypeId;
use std::cell::Cell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::errors::{FrameGraphError, Result};
use crate::graph::PassId;
use crate::resource::ResourceKey;

new_key_type! {
    /// Untyped ticket identity.
    pub struct TicketId;
}

// ─── Typed Handle ─────────────────────────────────────────────────────────────

/// Typed handle to a (possibly not yet materialized) resource of type `T`.
///
/// The default ticket is null and never resolves.
pub struct ResourceTicket<T> {
    id: TicketId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResourceTicket<T> {
    #[inline]
    pub(crate) fn from_id(id: TicketId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> TicketId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.id == TicketId::default()
    }
}

impl<T> Clone for ResourceTicket<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ResourceTicket<T> {}

impl<T> Default for ResourceTicket<T> {
    fn default() -> Self {
        Self::from_id(TicketId::default())
    }
}

impl<T> PartialEq for ResourceTicket<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for ResourceTicket<T> {}

impl<T> Hash for ResourceTicket<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for ResourceTicket<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceTicket").field(&self.id).finish()
    }
}

impl<T> From<ResourceTicket<T>> for TicketId {
    fn from(ticket: ResourceTicket<T>) -> Self {
        ticket.id
    }
}

// ─── Ticket Table ─────────────────────────────────────────────────────────────

struct TicketEntry {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    owner: Option<PassId>,
    source: Option<TicketId>,
    /// Cached terminal and the epoch it was computed in.
    shortcut: Cell<Option<(TicketId, u64)>>,
    /// Pooled object this ticket was bound to most recently.
    last_resource: Option<ResourceKey>,
}

/// Arena of every ticket known to a frame graph.
#[derive(Default)]
pub struct TicketTable {
    entries: SlotMap<TicketId, TicketEntry>,
    epoch: u64,
}

impl TicketTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Creates a ticket. `owner` is `None` for free-standing placeholders.
    pub fn create<T: 'static>(
        &mut self,
        name: impl Into<String>,
        owner: Option<PassId>,
    ) -> ResourceTicket<T> {
        let id = self.entries.insert(TicketEntry {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            owner,
            source: None,
            shortcut: Cell::new(None),
            last_resource: None,
        });
        ResourceTicket::from_id(id)
    }

    #[must_use]
    pub fn contains(&self, id: TicketId) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn name(&self, id: TicketId) -> Option<&str> {
        self.entries.get(id).map(|entry| entry.name.as_str())
    }

    /// Name for diagnostics; stale tickets render as `<stale>`.
    pub(crate) fn display_name(&self, id: TicketId) -> String {
        self.name(id).unwrap_or("<stale>").to_string()
    }

    #[must_use]
    pub fn owner(&self, id: TicketId) -> Option<PassId> {
        self.entries.get(id).and_then(|entry| entry.owner)
    }

    /// The ticket `id` forwards to, if any.
    #[must_use]
    pub fn source(&self, id: TicketId) -> Option<TicketId> {
        self.entries.get(id).and_then(|entry| entry.source)
    }

    pub(crate) fn type_name(&self, id: TicketId) -> &'static str {
        self.entries.get(id).map_or("<stale>", |entry| entry.type_name)
    }

    pub(crate) fn check_type<T: 'static>(&self, id: TicketId) -> Result<()> {
        let entry = self.entries.get(id).ok_or(FrameGraphError::StaleTicket)?;
        if entry.type_id == TypeId::of::<T>() {
            Ok(())
        } else {
            Err(FrameGraphError::TypeMismatch {
                ticket: entry.name.clone(),
                expected: std::any::type_name::<T>(),
            })
        }
    }

    /// Makes `ticket` forward to `source`.
    ///
    /// Fails if either ticket is stale, their types differ, or the link
    /// would close a forwarding cycle.
    pub fn connect(&mut self, ticket: TicketId, source: TicketId) -> Result<()> {
        let (ticket_type, ticket_name) = {
            let entry = self.entries.get(ticket).ok_or(FrameGraphError::StaleTicket)?;
            (entry.type_id, entry.name.clone())
        };
        let source_entry = self.entries.get(source).ok_or(FrameGraphError::StaleTicket)?;
        if source_entry.type_id != ticket_type {
            return Err(FrameGraphError::TypeMismatch {
                ticket: source_entry.name.clone(),
                expected: self.type_name(ticket),
            });
        }

        let mut cursor = Some(source);
        while let Some(current) = cursor {
            if current == ticket {
                return Err(FrameGraphError::CyclicForwarding {
                    ticket: ticket_name,
                    source_ticket: self.display_name(source),
                });
            }
            cursor = self.source(current);
        }

        if let Some(entry) = self.entries.get_mut(ticket) {
            entry.source = Some(source);
        }
        self.epoch += 1;
        Ok(())
    }

    /// Removes the forwarding link of `ticket`. Returns `true` if one existed.
    pub fn disconnect(&mut self, ticket: TicketId) -> bool {
        let severed = self
            .entries
            .get_mut(ticket)
            .and_then(|entry| entry.source.take())
            .is_some();
        if severed {
            self.epoch += 1;
        }
        severed
    }

    /// Removes every ticket owned by `owner` and severs links pointing at
    /// them. Returns the number of severed links.
    pub fn remove_owned_by(&mut self, owner: PassId) -> usize {
        let owned: SmallVec<[TicketId; 8]> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.owner == Some(owner))
            .map(|(id, _)| id)
            .collect();
        if owned.is_empty() {
            return 0;
        }
        for id in &owned {
            self.entries.remove(*id);
        }
        self.sever_links_to(&owned)
    }

    /// Removes a free-standing ticket. Pass-owned tickets live as long as
    /// their pass and are left alone; returns `false` for them.
    pub fn remove_free(&mut self, id: TicketId) -> bool {
        if !self.entries.get(id).is_some_and(|entry| entry.owner.is_none()) {
            return false;
        }
        self.entries.remove(id);
        self.sever_links_to(&[id]);
        true
    }

    fn sever_links_to(&mut self, removed: &[TicketId]) -> usize {
        let mut severed = 0;
        for (id, entry) in &mut self.entries {
            if entry.source.is_some_and(|source| removed.contains(&source)) {
                log::debug!("Severed forwarding link of ticket '{}' ({id:?})", entry.name);
                entry.source = None;
                severed += 1;
            }
        }
        self.epoch += 1;
        severed
    }

    /// Follows forwarding links to the terminal ticket.
    pub fn resolve(&self, id: TicketId) -> Result<TicketId> {
        let entry = self.entries.get(id).ok_or(FrameGraphError::StaleTicket)?;
        if let Some((terminal, epoch)) = entry.shortcut.get()
            && epoch == self.epoch
        {
            return Ok(terminal);
        }

        let mut visited: SmallVec<[TicketId; 8]> = SmallVec::new();
        let mut current = id;
        loop {
            let entry = self.entries.get(current).ok_or(FrameGraphError::StaleTicket)?;
            if let Some((terminal, epoch)) = entry.shortcut.get()
                && epoch == self.epoch
            {
                current = terminal;
                break;
            }
            visited.push(current);
            match entry.source {
                Some(next) => current = next,
                None => break,
            }
        }

        for visited_id in visited {
            if let Some(entry) = self.entries.get(visited_id) {
                entry.shortcut.set(Some((current, self.epoch)));
            }
        }
        Ok(current)
    }

    pub(crate) fn last_resource(&self, id: TicketId) -> Option<ResourceKey> {
        self.entries.get(id).and_then(|entry| entry.last_resource)
    }

    pub(crate) fn set_last_resource(&mut self, id: TicketId, key: ResourceKey) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.last_resource = Some(key);
        }
    }

    pub(crate) fn tickets_owned_by(&self, owner: PassId) -> impl Iterator<Item = TicketId> + '_ {
        self.entries
            .iter()
            .filter(move |(_, entry)| entry.owner == Some(owner))
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_follows_chain() {
        let mut table = TicketTable::new();
        let a = table.create::<u32>("a", None);
        let b = table.create::<u32>("b", None);
        let c = table.create::<u32>("c", None);

        table.connect(c.id(), b.id()).unwrap();
        table.connect(b.id(), a.id()).unwrap();

        assert_eq!(table.resolve(c.id()).unwrap(), a.id());
        assert_eq!(table.resolve(b.id()).unwrap(), a.id());
        assert_eq!(table.resolve(a.id()).unwrap(), a.id());
    }

    #[test]
    fn test_shortcut_invalidated_on_relink() {
        let mut table = TicketTable::new();
        let a = table.create::<u32>("a", None);
        let b = table.create::<u32>("b", None);
        let c = table.create::<u32>("c", None);

        table.connect(c.id(), a.id()).unwrap();
        assert_eq!(table.resolve(c.id()).unwrap(), a.id());

        table.connect(c.id(), b.id()).unwrap();
        assert_eq!(table.resolve(c.id()).unwrap(), b.id());

        assert!(table.disconnect(c.id()));
        assert_eq!(table.resolve(c.id()).unwrap(), c.id());
    }

    #[test]
    fn test_cycle_rejected() {
        let mut table = TicketTable::new();
        let a = table.create::<u32>("a", None);
        let b = table.create::<u32>("b", None);

        table.connect(b.id(), a.id()).unwrap();
        let err = table.connect(a.id(), b.id()).unwrap_err();
        assert!(matches!(err, FrameGraphError::CyclicForwarding { .. }));

        let err = table.connect(a.id(), a.id()).unwrap_err();
        assert!(matches!(err, FrameGraphError::CyclicForwarding { .. }));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut table = TicketTable::new();
        let a = table.create::<u32>("a", None);
        let b = table.create::<f32>("b", None);
        let err = table.connect(b.id(), a.id()).unwrap_err();
        assert!(matches!(err, FrameGraphError::TypeMismatch { .. }));
    }

    #[test]
    fn test_null_ticket_is_stale() {
        let table = TicketTable::new();
        let ticket = ResourceTicket::<u32>::default();
        assert!(ticket.is_null());
        assert!(matches!(
            table.resolve(ticket.id()),
            Err(FrameGraphError::StaleTicket)
        ));
    }
}

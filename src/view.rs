//! Viewport geometry and depth range.
//!
//! - [`Viewport`]: current render size plus a revision counter bumped on
//!   every real size change.
//! - [`CameraSize`]: per-pass tracker that answers "did the size change since
//!   I last looked?", used to recreate camera-sized frame buffers.
//! - [`DepthRange`]: validated `[start, end]` depth interval.

use glam::UVec2;
use serde::{Deserialize, Serialize};

use crate::errors::{FrameGraphError, Result};

/// Size of the surface the graph renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    size: UVec2,
    revision: u64,
}

impl Viewport {
    #[must_use]
    pub fn new(size: UVec2) -> Self {
        Self { size, revision: 0 }
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec2 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.size.x
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.size.y
    }

    /// Incremented every time [`resize`](Self::resize) changes the size.
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns `true` if the size actually changed.
    pub fn resize(&mut self, size: UVec2) -> bool {
        if self.size == size {
            return false;
        }
        log::debug!(
            "Viewport resized {}x{} -> {}x{}",
            self.size.x,
            self.size.y,
            size.x,
            size.y
        );
        self.size = size;
        self.revision += 1;
        true
    }
}

/// Remembers the last viewport size a pass rendered at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CameraSize {
    last: Option<UVec2>,
}

impl CameraSize {
    /// Records `size` and reports whether it differs from the previous one.
    /// The first call always reports a change.
    pub fn update(&mut self, size: UVec2) -> bool {
        let changed = self.last != Some(size);
        self.last = Some(size);
        changed
    }

    #[must_use]
    pub fn last(&self) -> Option<UVec2> {
        self.last
    }

    /// Forgets the recorded size so the next update reports a change.
    pub fn invalidate(&mut self) {
        self.last = None;
    }
}

/// Depth interval written by the rasterizer.
///
/// Both bounds lie in `[0, 1]` and `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthRange {
    start: f32,
    end: f32,
}

impl DepthRange {
    /// Full range `[0, 1]`.
    pub const IDENTITY: Self = Self { start: 0.0, end: 1.0 };
    /// Everything at the near plane.
    pub const FRONT: Self = Self { start: 0.0, end: 0.0 };
    /// Everything at the far plane.
    pub const REAR: Self = Self { start: 1.0, end: 1.0 };

    pub fn new(start: f32, end: f32) -> Result<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if in_unit(self.start) && in_unit(self.end) && self.start <= self.end {
            Ok(())
        } else {
            Err(FrameGraphError::InvalidDepthRange {
                start: self.start,
                end: self.end,
            })
        }
    }

    #[inline]
    #[must_use]
    pub fn start(&self) -> f32 {
        self.start
    }

    #[inline]
    #[must_use]
    pub fn end(&self) -> f32 {
        self.end
    }
}

impl Default for DepthRange {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_range_validation() {
        assert!(DepthRange::new(0.25, 0.75).is_ok());
        assert!(DepthRange::new(0.0, 0.0).is_ok());
        assert!(DepthRange::new(0.8, 0.2).is_err());
        assert!(DepthRange::new(-0.1, 0.5).is_err());
        assert!(DepthRange::new(0.5, 1.5).is_err());
        assert!(DepthRange::new(f32::NAN, 1.0).is_err());
        assert_eq!(DepthRange::default(), DepthRange::IDENTITY);
    }

    #[test]
    fn test_camera_size_reports_changes_once() {
        let mut camera = CameraSize::default();
        assert!(camera.update(UVec2::new(800, 600)));
        assert!(!camera.update(UVec2::new(800, 600)));
        assert!(camera.update(UVec2::new(1920, 1080)));
        assert!(!camera.update(UVec2::new(1920, 1080)));

        camera.invalidate();
        assert!(camera.update(UVec2::new(1920, 1080)));
    }

    #[test]
    fn test_viewport_revision() {
        let mut viewport = Viewport::new(UVec2::new(800, 600));
        assert!(!viewport.resize(UVec2::new(800, 600)));
        assert!(viewport.resize(UVec2::new(1024, 768)));
        assert_eq!(viewport.revision(), 1);
        assert_eq!(viewport.width(), 1024);
    }
}

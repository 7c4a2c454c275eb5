//! Frame Graph Settings
//!
//! Construction-time configuration consumed once by
//! [`FrameGraph::new`](crate::graph::FrameGraph::new).
//!
//! ```rust,ignore
//! use myth_framegraph::{FrameGraph, FrameGraphSettings, HeadlessBackend};
//!
//! let settings = FrameGraphSettings {
//!     default_timeout: 3,
//!     ..Default::default()
//! };
//! let graph = FrameGraph::new(HeadlessBackend::new(), &settings);
//! ```

use glam::UVec2;
use serde::{Deserialize, Serialize};

/// Configuration for a [`FrameGraph`](crate::graph::FrameGraph).
///
/// | Field | Default | Meaning |
/// |-------|---------|---------|
/// | `default_timeout` | `1` | Idle frames a pooled object survives when its definition sets no timeout |
/// | `viewport_width` / `viewport_height` | `1280 × 720` | Initial viewport size |
/// | `pass_capacity` | `16` | Pre-allocated pass slots |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameGraphSettings {
    /// Pool-wide eviction timeout, in idle frames.
    pub default_timeout: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub pass_capacity: usize,
}

impl Default for FrameGraphSettings {
    fn default() -> Self {
        Self {
            default_timeout: 1,
            viewport_width: 1280,
            viewport_height: 720,
            pass_capacity: 16,
        }
    }
}

impl FrameGraphSettings {
    #[inline]
    #[must_use]
    pub fn viewport_size(&self) -> UVec2 {
        UVec2::new(self.viewport_width, self.viewport_height)
    }

    /// Builder-style viewport override.
    #[must_use]
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    #[must_use]
    pub fn with_default_timeout(mut self, frames: u32) -> Self {
        self.default_timeout = frames;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: FrameGraphSettings =
            serde_json::from_str(r#"{ "default_timeout": 4 }"#).unwrap();
        assert_eq!(settings.default_timeout, 4);
        assert_eq!(settings.viewport_size(), UVec2::new(1280, 720));
    }
}

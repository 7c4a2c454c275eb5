//! Frame Graph Step Definitions
//!
//! `GraphStep` names the stages of one frame-graph execution, in the order
//! the graph runs them. Profilers receive one marker per step.

/// Frame-graph step enumeration.
///
/// # Step Overview
///
/// | Step | Purpose | Per-pass hook |
/// |------|---------|---------------|
/// | `Begin` | Start of the rendering session (first execution of a frame) | none |
/// | `Prepare` | Declare outputs, reference inputs | `RenderPass::prepare` |
/// | `Cull` | Liveness analysis over resource references | `RenderPass::is_used` |
/// | `Execute` | Acquire resources and draw | `RenderPass::execute` |
/// | `Reset` | Per-frame notification, eviction tick | `RenderPass::reset` |
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
#[repr(u8)]
pub enum GraphStep {
    /// Rendering session setup. Only reported on the first execution of a
    /// logical frame.
    Begin = 0,

    /// Passes declare and reference tickets.
    Prepare = 1,

    /// Unreferenced passes are culled.
    Cull = 2,

    /// Used passes run their bodies.
    Execute = 3,

    /// Every pass is reset; the pool ticks eviction timers.
    Reset = 4,
}

impl GraphStep {
    /// Every step in execution order.
    pub const ALL: [Self; 5] = [
        Self::Begin,
        Self::Prepare,
        Self::Cull,
        Self::Execute,
        Self::Reset,
    ];

    /// Returns the numeric index of the step (used for sorting).
    #[inline]
    #[must_use]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Returns the step name (for debugging).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Begin => "Begin",
            Self::Prepare => "Prepare",
            Self::Cull => "Cull",
            Self::Execute => "Execute",
            Self::Reset => "Reset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_ordering() {
        assert!(GraphStep::Prepare < GraphStep::Cull);
        assert!(GraphStep::Cull < GraphStep::Execute);
        assert!(GraphStep::Execute < GraphStep::Reset);

        let mut sorted = GraphStep::ALL;
        sorted.sort();
        assert_eq!(sorted, GraphStep::ALL);
    }

    #[test]
    fn test_step_names() {
        assert_eq!(GraphStep::Cull.name(), "Cull");
        assert_eq!(GraphStep::Reset.order(), 4);
    }
}

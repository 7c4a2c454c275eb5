//! Frame Graph Module
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`frame_graph`] | Pass sequence and the per-frame protocol |
//! | [`pass`] | Pass trait, shared base and stage contexts |
//! | [`step`] | Step enumeration reported to profilers |

pub mod frame_graph;
pub mod pass;
pub mod step;

pub use frame_graph::FrameGraph;
pub use pass::{
    ExecuteContext, InitContext, PassBase, PassId, PassState, PrepareContext, RenderPass,
};
pub use step::GraphStep;

//! # Myth Frame Graph
//!
//! A per-frame render-graph scheduler with a pooled transient resource
//! allocator.
//!
//! Passes declare what they produce and reference what they consume through
//! typed [`ResourceTicket`]s. Every frame the [`FrameGraph`] prepares all
//! passes, culls the ones nothing depends on, executes the rest in order, and
//! hands out physical textures, frame buffers and values from a reuse pool
//! with idle-frame eviction.
//!
//! ```rust,ignore
//! use myth_framegraph::prelude::*;
//!
//! let mut graph = FrameGraph::new(HeadlessBackend::new(), &FrameGraphSettings::default());
//! let scene = graph.add(ScenePass::default())?;
//! let post = graph.add(PostProcessPass::default())?;
//! let input = graph.input::<Texture2d>(post, "Color")?;
//! graph.connect_to_output(scene, "Color", input)?;
//!
//! loop {
//!     graph.execute()?;
//!     graph.rendering_complete();
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod backend;
pub mod context;
pub mod errors;
pub mod graph;
pub mod passes;
pub mod persist;
pub mod profiler;
pub mod resource;
pub mod settings;
pub mod view;

pub use backend::{
    BackendCommand, BackendStats, ClearFlags, FrameBuffer, FrameBufferDesc, GeometryBucket,
    HeadlessBackend, RenderBackend, Texture2d, TextureDesc,
};
pub use context::{RenderContext, SettingsMark};
pub use errors::{BackendError, FaultKind, FrameGraphError, Result};
pub use graph::{
    ExecuteContext, FrameGraph, GraphStep, InitContext, PassBase, PassId, PassState,
    PrepareContext, RenderPass,
};
pub use passes::{PassThroughPass, PostProcessPass};
pub use persist::{GraphDescriptor, LinkDescriptor, PassDescriptor, PassFactoryRegistry};
pub use profiler::{LogProfiler, Profiler};
pub use resource::{
    DisposerKind, FrameBufferDef, NativeObject, ResourceDef, ResourceRegistry, ResourceShape,
    ResourceTicket, TextureDef, TicketId, TicketTable, ValueDef,
};
pub use settings::FrameGraphSettings;
pub use view::{CameraSize, DepthRange, Viewport};

/// Everything a pass author usually needs.
pub mod prelude {
    pub use crate::backend::{
        ClearFlags, FrameBuffer, FrameBufferDesc, GeometryBucket, HeadlessBackend, RenderBackend,
        Texture2d, TextureDesc,
    };
    pub use crate::errors::{FrameGraphError, Result};
    pub use crate::graph::{
        ExecuteContext, FrameGraph, InitContext, PassId, PrepareContext, RenderPass,
    };
    pub use crate::passes::{PassThroughPass, PostProcessPass};
    pub use crate::resource::{FrameBufferDef, ResourceDef, ResourceTicket, TextureDef, ValueDef};
    pub use crate::settings::FrameGraphSettings;
    pub use crate::view::DepthRange;
}

//! Render Pass Trait & Stage Contexts
//!
//! A pass is the unit of scheduled work. It owns its ticket fields, wires
//! them up once in [`RenderPass::initialize`], declares and references them
//! every frame in [`RenderPass::prepare`], and acquires the physical objects
//! behind them in [`RenderPass::execute`].
//!
//! # Lifecycle
//!
//! ```text
//! Unassigned ─► Initialized ─► { Prepared ─► (Culled | Executed) ─► Reset }* ─► CleanedUp
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! #[derive(Default)]
//! struct SceneColorPass {
//!     color: ResourceTicket<Texture2d>,
//! }
//!
//! impl RenderPass for SceneColorPass {
//!     fn initialize(&mut self, ctx: &mut InitContext) -> Result<()> {
//!         self.color = ctx.add_output("Color");
//!         Ok(())
//!     }
//!
//!     fn prepare(&mut self, ctx: &mut PrepareContext) -> Result<()> {
//!         let def = TextureDef::new(ctx.width(), ctx.height(), TextureFormat::Rgba16Float);
//!         ctx.declare(def, self.color)
//!     }
//!
//!     fn execute(&mut self, ctx: &mut ExecuteContext) -> Result<()> {
//!         let color = ctx.acquire(self.color)?;
//!         ctx.backend().draw_geometry(GeometryBucket::Opaque)?;
//!         Ok(())
//!     }
//! }
//! ```

use std::any::Any;
use std::fmt;

use glam::UVec2;
use smallvec::SmallVec;

use crate::backend::{FrameBuffer, RenderBackend, Texture2d};
use crate::context::RenderContext;
use crate::errors::{FrameGraphError, Result};
use crate::resource::{ResourceDef, ResourceRegistry, ResourceTicket, TicketId, TicketTable};
use crate::view::CameraSize;

// ─── Identity & State ─────────────────────────────────────────────────────────

/// Stable identity of a pass inside one frame graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(u32);

impl PassId {
    #[inline]
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a pass is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassState {
    Unassigned,
    Initialized,
    Prepared,
    Culled,
    Executed,
    Reset,
    CleanedUp,
}

// ─── Pass Trait ───────────────────────────────────────────────────────────────

/// The pass author contract.
///
/// Only [`prepare`](Self::prepare) and [`execute`](Self::execute) are
/// required. Every acquired ticket is released by the graph when `execute`
/// returns, whether it succeeded or not.
pub trait RenderPass: Any {
    /// Called once when the pass joins a graph. Create tickets here.
    fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Declares outputs and references inputs for this frame.
    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<()>;

    /// Acquires resources and records draws. Only runs for used passes.
    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<()>;

    /// End-of-frame notification, sent to every pass including culled ones.
    fn reset(&mut self, _ctx: &mut RenderContext) {}

    /// Called once when the pass leaves the graph.
    fn cleanup(&mut self, _ctx: &mut RenderContext) {}

    /// Decides whether the pass runs this frame. `referenced` is `true` when
    /// a live consumer depends on one of its outputs. Override to force
    /// execution.
    fn is_used(&self, referenced: bool) -> bool {
        referenced
    }

    /// Builds the pass-owned frame buffer. Called before the first execute
    /// and again whenever the viewport size changes.
    fn create_frame_buffer(&mut self, _ctx: &mut RenderContext) -> Result<Option<FrameBuffer>> {
        Ok(None)
    }

    /// The logical frame is done (all viewports rendered).
    fn rendering_complete(&mut self) {}

    /// Before scene update, once per logical frame.
    fn pre_frame(&mut self, _ctx: &mut RenderContext) {}

    /// After the render queue is built.
    fn post_queue(&mut self, _ctx: &mut RenderContext) {}

    /// Fully qualified type name, used for default pass names.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Last path segment of a type name, generics stripped.
pub(crate) fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// ─── Pass Base ────────────────────────────────────────────────────────────────

/// Graph-side bookkeeping shared by every pass.
#[derive(Debug)]
pub struct PassBase {
    id: PassId,
    name: String,
    pub(crate) index: Option<usize>,
    pub(crate) inputs: SmallVec<[TicketId; 4]>,
    pub(crate) outputs: SmallVec<[TicketId; 4]>,
    pub(crate) refs: u32,
    pub(crate) used: bool,
    pub(crate) frame_buffer: Option<FrameBuffer>,
    pub(crate) camera: CameraSize,
    pub(crate) state: PassState,
    pub(crate) frame_buffer_builds: u32,
}

impl PassBase {
    pub(crate) fn new(id: PassId, name: String) -> Self {
        Self {
            id,
            name,
            index: None,
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
            refs: 0,
            used: false,
            frame_buffer: None,
            camera: CameraSize::default(),
            state: PassState::Unassigned,
            frame_buffer_builds: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> PassId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in the execution order, `None` once removed.
    #[inline]
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    #[must_use]
    pub fn inputs(&self) -> &[TicketId] {
        &self.inputs
    }

    #[must_use]
    pub fn outputs(&self) -> &[TicketId] {
        &self.outputs
    }

    /// Reference count left after the most recent cull.
    #[must_use]
    pub fn refs(&self) -> u32 {
        self.refs
    }

    /// Whether the pass survived the most recent cull.
    #[must_use]
    pub fn is_used(&self) -> bool {
        self.used
    }

    #[must_use]
    pub fn frame_buffer(&self) -> Option<&FrameBuffer> {
        self.frame_buffer.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> PassState {
        self.state
    }

    /// How many times the owned frame buffer was (re)built.
    #[must_use]
    pub fn frame_buffer_builds(&self) -> u32 {
        self.frame_buffer_builds
    }

    pub(crate) fn current_index(&self) -> usize {
        self.index.unwrap_or(usize::MAX)
    }
}

// ─── Stage Contexts ───────────────────────────────────────────────────────────

/// Context for [`RenderPass::initialize`].
pub struct InitContext<'a> {
    pub(crate) tickets: &'a mut TicketTable,
    pub(crate) base: &'a mut PassBase,
}

impl InitContext<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        self.base.name()
    }

    #[must_use]
    pub fn id(&self) -> PassId {
        self.base.id()
    }

    /// Creates a named input ticket owned by this pass.
    pub fn add_input<T: 'static>(&mut self, name: &str) -> ResourceTicket<T> {
        let ticket = self.tickets.create::<T>(name, Some(self.base.id()));
        self.base.inputs.push(ticket.id());
        ticket
    }

    /// Creates a named output ticket owned by this pass.
    pub fn add_output<T: 'static>(&mut self, name: &str) -> ResourceTicket<T> {
        let ticket = self.tickets.create::<T>(name, Some(self.base.id()));
        self.base.outputs.push(ticket.id());
        ticket
    }

    /// Makes `ticket` forward to `source`.
    pub fn forward<T: 'static>(
        &mut self,
        ticket: ResourceTicket<T>,
        source: ResourceTicket<T>,
    ) -> Result<()> {
        self.tickets.connect(ticket.id(), source.id())
    }
}

/// Context for [`RenderPass::prepare`].
pub struct PrepareContext<'a> {
    pub(crate) registry: &'a mut ResourceRegistry,
    pub(crate) render: &'a RenderContext,
    pub(crate) base: &'a PassBase,
}

impl PrepareContext<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        self.base.name()
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.base.current_index()
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.render.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.render.height()
    }

    #[must_use]
    pub fn viewport_size(&self) -> UVec2 {
        self.render.viewport().size()
    }

    #[must_use]
    pub fn tpf(&self) -> f32 {
        self.render.tpf()
    }

    /// Binds `ticket` to `def` for this frame, with this pass as producer.
    pub fn declare<D: ResourceDef>(&mut self, def: D, ticket: ResourceTicket<D::Object>) -> Result<()> {
        self.registry.declare(self.base.current_index(), def, ticket)
    }

    /// Hard dependency. Fails at cull if no pass declares the ticket.
    pub fn reference<T>(&mut self, ticket: ResourceTicket<T>) -> Result<()> {
        self.registry.reference(self.base.current_index(), ticket.id())
    }

    pub fn reference_all<T>(&mut self, tickets: &[ResourceTicket<T>]) -> Result<()> {
        for ticket in tickets {
            self.reference(*ticket)?;
        }
        Ok(())
    }

    /// Soft dependency. Returns whether the ticket resolves this frame.
    pub fn reference_optional<T>(&mut self, ticket: ResourceTicket<T>) -> bool {
        self.registry
            .reference_optional(self.base.current_index(), ticket.id())
    }

    /// Reserves the object `ticket` held last frame on this pass's slot.
    pub fn reserve<T>(&mut self, ticket: ResourceTicket<T>) -> Result<()> {
        self.registry.reserve(self.base.current_index(), ticket.id())
    }

    /// Keeps the object bound to `ticket` out of eviction.
    pub fn make_constant<T>(&mut self, ticket: ResourceTicket<T>) -> Result<()> {
        self.registry.make_constant(ticket.id())
    }
}

/// Context for [`RenderPass::execute`].
pub struct ExecuteContext<'a> {
    pub(crate) registry: &'a mut ResourceRegistry,
    pub(crate) render: &'a mut RenderContext,
    pub(crate) base: &'a PassBase,
}

impl ExecuteContext<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        self.base.name()
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.base.current_index()
    }

    /// The pass-owned frame buffer, if the pass creates one.
    #[must_use]
    pub fn frame_buffer(&self) -> Option<FrameBuffer> {
        self.base.frame_buffer
    }

    pub fn render(&mut self) -> &mut RenderContext {
        &mut *self.render
    }

    pub fn backend(&mut self) -> &mut dyn RenderBackend {
        self.render.backend_mut()
    }

    /// Acquires a `Copy` handle such as a texture or frame buffer.
    pub fn acquire<T: Copy + 'static>(&mut self, ticket: ResourceTicket<T>) -> Result<T> {
        self.registry.acquire(ticket, self.render.backend_mut())
    }

    /// `None` when the ticket has no live producer this frame.
    pub fn acquire_optional<T: Copy + 'static>(
        &mut self,
        ticket: ResourceTicket<T>,
    ) -> Result<Option<T>> {
        self.registry
            .acquire_optional(ticket, self.render.backend_mut())
    }

    /// Acquires the pooled object itself. Producers write transient values
    /// through this; consumers of the same ticket see those writes.
    pub fn acquire_mut<T: 'static>(&mut self, ticket: ResourceTicket<T>) -> Result<&mut T> {
        self.registry.acquire_mut(ticket, self.render.backend_mut())
    }

    pub fn acquire_optional_mut<T: 'static>(
        &mut self,
        ticket: ResourceTicket<T>,
    ) -> Result<Option<&mut T>> {
        self.registry
            .acquire_optional_mut(ticket, self.render.backend_mut())
    }

    /// Borrows an object this pass acquired earlier in its execute.
    pub fn acquired_mut<T: 'static>(&mut self, ticket: ResourceTicket<T>) -> Result<&mut T> {
        self.registry.acquired_mut(ticket)
    }

    pub fn release<T>(&mut self, ticket: ResourceTicket<T>) -> Result<()> {
        self.registry.release(ticket, self.render.backend_mut())
    }

    /// Acquires each texture and attaches it as a color target of
    /// `frame_buffer`, in order. Every texture must match the frame buffer
    /// size.
    pub fn acquire_color_targets(
        &mut self,
        frame_buffer: &FrameBuffer,
        tickets: &[ResourceTicket<Texture2d>],
    ) -> Result<SmallVec<[Texture2d; 4]>> {
        let mut targets = SmallVec::new();
        for (index, ticket) in tickets.iter().enumerate() {
            let texture = self.acquire(*ticket)?;
            if texture.size() != frame_buffer.size() {
                return Err(FrameGraphError::ShapeMismatch {
                    expected: frame_buffer.desc().to_string(),
                    found: texture.desc().to_string(),
                });
            }
            self.render
                .backend_mut()
                .attach_color_target(frame_buffer, index as u32, &texture)?;
            targets.push(texture);
        }
        Ok(targets)
    }

    /// Number of objects this pass currently holds.
    #[must_use]
    pub fn acquired_count(&self) -> usize {
        self.registry.acquired_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("myth_framegraph::passes::PostProcessPass"), "PostProcessPass");
        assert_eq!(short_type_name("crate::Wrapper<alloc::string::String>"), "Wrapper");
        assert_eq!(short_type_name("Plain"), "Plain");
    }
}

//! Frame Graph
//!
//! The orchestrator: owns the ordered pass sequence, the resource registry
//! and the render context, and drives one frame through the four steps.
//!
//! # Frame Protocol
//!
//! ```text
//! execute()
//!   ├─ Begin     (first execution of a logical frame only)
//!   ├─ Prepare   every pass, in order: declare / reference / reserve
//!   ├─ Cull      reference counts → used / culled
//!   ├─ Execute   used passes: frame buffer refresh → body → release all
//!   └─ Reset     every pass; transient bindings cleared; eviction tick
//! rendering_complete()
//! ```
//!
//! All cull decisions are made before any pass executes. Passes are
//! skipped wholesale, never interrupted.

use std::any::Any;

use glam::UVec2;

use crate::backend::RenderBackend;
use crate::context::RenderContext;
use crate::errors::{FrameGraphError, Result};
use crate::graph::GraphStep;
use crate::graph::pass::{
    ExecuteContext, InitContext, PassBase, PassId, PassState, PrepareContext, RenderPass,
    short_type_name,
};
use crate::profiler::Profiler;
use crate::resource::registry::CullPass;
use crate::resource::{ResourceRegistry, ResourceTicket, TicketId};
use crate::settings::FrameGraphSettings;

pub(crate) struct PassSlot {
    pub(crate) base: PassBase,
    pub(crate) pass: Box<dyn RenderPass>,
}

/// Ordered pass sequence plus the pool and context it runs against.
pub struct FrameGraph {
    pub(crate) passes: Vec<PassSlot>,
    registry: ResourceRegistry,
    context: RenderContext,
    rendered: bool,
    next_pass_id: u32,
}

impl FrameGraph {
    pub fn new(backend: impl RenderBackend, settings: &FrameGraphSettings) -> Self {
        Self::with_backend(Box::new(backend), settings)
    }

    #[must_use]
    pub fn with_backend(backend: Box<dyn RenderBackend>, settings: &FrameGraphSettings) -> Self {
        Self {
            passes: Vec::with_capacity(settings.pass_capacity),
            registry: ResourceRegistry::new(settings.default_timeout),
            context: RenderContext::new(backend, settings.viewport_size()),
            rendered: false,
            next_pass_id: 0,
        }
    }

    // ─── Sequence Edits ───────────────────────────────────────────────────────

    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Appends a pass named after its type.
    pub fn add<P: RenderPass>(&mut self, pass: P) -> Result<PassId> {
        self.add_boxed(Box::new(pass), None, None)
    }

    /// Appends a pass under a custom name.
    pub fn add_named<P: RenderPass>(&mut self, pass: P, name: &str) -> Result<PassId> {
        self.add_boxed(Box::new(pass), Some(name.to_string()), None)
    }

    /// Inserts a pass at `index`, shifting later passes back by one.
    /// An index at or past the end appends.
    pub fn insert<P: RenderPass>(&mut self, pass: P, index: usize) -> Result<PassId> {
        self.add_boxed(Box::new(pass), None, Some(index))
    }

    /// Adds a boxed pass and runs its `initialize` hook. On failure the pass
    /// is dropped and the sequence is left untouched.
    pub fn add_boxed(
        &mut self,
        mut pass: Box<dyn RenderPass>,
        name: Option<String>,
        index: Option<usize>,
    ) -> Result<PassId> {
        let id = PassId::new(self.next_pass_id);
        self.next_pass_id += 1;
        let name = name.unwrap_or_else(|| short_type_name(pass.type_name()).to_string());
        let index = index.map_or(self.passes.len(), |index| index.min(self.passes.len()));

        let mut base = PassBase::new(id, name);
        base.index = Some(index);
        let initialized = pass.initialize(&mut InitContext {
            tickets: self.registry.tickets_mut(),
            base: &mut base,
        });
        if let Err(err) = initialized {
            self.registry.tickets_mut().remove_owned_by(id);
            return Err(err);
        }
        base.state = PassState::Initialized;

        log::debug!("Added pass '{}' {id} at index {index}", base.name());
        self.passes.insert(index, PassSlot { base, pass });
        self.reindex(index);
        Ok(id)
    }

    /// Removes the pass at `index`, severs links into its tickets, shifts
    /// later passes forward and runs its `cleanup` hook.
    pub fn remove_at(&mut self, index: usize) -> Result<Box<dyn RenderPass>> {
        if index >= self.passes.len() {
            return Err(FrameGraphError::IndexOutOfRange {
                index,
                len: self.passes.len(),
            });
        }
        let mut slot = self.passes.remove(index);
        self.reindex(index);
        self.detach(&mut slot);
        log::debug!("Removed pass '{}' {} from index {index}", slot.base.name(), slot.base.id());
        Ok(slot.pass)
    }

    /// Removes the pass with `id`. Returns `None` if it is not in the graph.
    pub fn remove(&mut self, id: PassId) -> Option<Box<dyn RenderPass>> {
        let index = self.index_of(id)?;
        self.remove_at(index).ok()
    }

    /// Cleans up every pass and empties the sequence.
    pub fn clear(&mut self) {
        let slots: Vec<PassSlot> = self.passes.drain(..).collect();
        for mut slot in slots {
            self.detach(&mut slot);
        }
        self.registry.clear();
        log::debug!("Cleared frame graph");
    }

    fn detach(&mut self, slot: &mut PassSlot) {
        let severed = self.registry.tickets_mut().remove_owned_by(slot.base.id());
        if severed > 0 {
            log::debug!("Pass '{}' removal severed {severed} link(s)", slot.base.name());
        }
        slot.pass.cleanup(&mut self.context);
        if let Some(frame_buffer) = slot.base.frame_buffer.take() {
            self.context.backend_mut().dispose_frame_buffer(&frame_buffer);
        }
        slot.base.index = None;
        slot.base.state = PassState::CleanedUp;
    }

    fn reindex(&mut self, from: usize) {
        for (index, slot) in self.passes.iter_mut().enumerate().skip(from) {
            slot.base.index = Some(index);
        }
    }

    // ─── Lookup ───────────────────────────────────────────────────────────────

    #[must_use]
    pub fn index_of(&self, id: PassId) -> Option<usize> {
        self.passes.iter().position(|slot| slot.base.id() == id)
    }

    /// Bookkeeping of every pass, in execution order.
    pub fn passes(&self) -> impl Iterator<Item = &PassBase> {
        self.passes.iter().map(|slot| &slot.base)
    }

    #[must_use]
    pub fn pass_base(&self, id: PassId) -> Option<&PassBase> {
        self.passes
            .iter()
            .find(|slot| slot.base.id() == id)
            .map(|slot| &slot.base)
    }

    #[must_use]
    pub fn pass_at(&self, index: usize) -> Option<&PassBase> {
        self.passes.get(index).map(|slot| &slot.base)
    }

    /// First pass of type `P`.
    #[must_use]
    pub fn get<P: RenderPass>(&self) -> Option<&P> {
        self.find(|_| true)
    }

    /// First pass of type `P` with the given name.
    #[must_use]
    pub fn get_named<P: RenderPass>(&self, name: &str) -> Option<&P> {
        self.find(|base| base.name() == name)
    }

    #[must_use]
    pub fn get_by_id<P: RenderPass>(&self, id: PassId) -> Option<&P> {
        self.find(|base| base.id() == id)
    }

    pub fn get_mut<P: RenderPass>(&mut self) -> Option<&mut P> {
        self.find_mut(|_| true)
    }

    pub fn get_named_mut<P: RenderPass>(&mut self, name: &str) -> Option<&mut P> {
        self.find_mut(|base| base.name() == name)
    }

    pub fn get_by_id_mut<P: RenderPass>(&mut self, id: PassId) -> Option<&mut P> {
        self.find_mut(|base| base.id() == id)
    }

    fn find<P: RenderPass>(&self, predicate: impl Fn(&PassBase) -> bool) -> Option<&P> {
        self.passes
            .iter()
            .filter(|slot| predicate(&slot.base))
            .find_map(|slot| (slot.pass.as_ref() as &dyn Any).downcast_ref::<P>())
    }

    fn find_mut<P: RenderPass>(
        &mut self,
        predicate: impl Fn(&PassBase) -> bool,
    ) -> Option<&mut P> {
        self.passes
            .iter_mut()
            .filter(|slot| predicate(&slot.base))
            .find_map(|slot| (slot.pass.as_mut() as &mut dyn Any).downcast_mut::<P>())
    }

    // ─── Ticket Wiring ────────────────────────────────────────────────────────

    /// Creates a free-standing placeholder ticket. It stays in the table
    /// until [`release_ticket`](Self::release_ticket), whatever happens to
    /// the passes.
    pub fn create_ticket<T: 'static>(&mut self, name: &str) -> ResourceTicket<T> {
        self.registry.tickets_mut().create(name, None)
    }

    /// Drops a ticket made by [`create_ticket`](Self::create_ticket). Links
    /// forwarding to it are severed. Pass-owned tickets are not touched.
    pub fn release_ticket<T>(&mut self, ticket: ResourceTicket<T>) -> bool {
        self.registry.tickets_mut().remove_free(ticket.id())
    }

    /// Makes `ticket` forward to `source`.
    pub fn connect<T: 'static>(
        &mut self,
        ticket: ResourceTicket<T>,
        source: ResourceTicket<T>,
    ) -> Result<()> {
        self.registry.tickets_mut().connect(ticket.id(), source.id())
    }

    /// Removes the forwarding link of `ticket`.
    pub fn disconnect<T>(&mut self, ticket: ResourceTicket<T>) -> bool {
        self.registry.tickets_mut().disconnect(ticket.id())
    }

    /// Makes `ticket` forward to `producer`'s output named `output`.
    pub fn connect_to_output<T: 'static>(
        &mut self,
        producer: PassId,
        output: &str,
        ticket: ResourceTicket<T>,
    ) -> Result<()> {
        let source = self.output::<T>(producer, output)?;
        self.connect(ticket, source)
    }

    /// The input ticket `name` of pass `pass`.
    pub fn input<T: 'static>(&self, pass: PassId, name: &str) -> Result<ResourceTicket<T>> {
        self.named_ticket(pass, name, |base| base.inputs())
    }

    /// The output ticket `name` of pass `pass`.
    pub fn output<T: 'static>(&self, pass: PassId, name: &str) -> Result<ResourceTicket<T>> {
        self.named_ticket(pass, name, |base| base.outputs())
    }

    fn named_ticket<T: 'static>(
        &self,
        pass: PassId,
        name: &str,
        list: impl Fn(&PassBase) -> &[TicketId],
    ) -> Result<ResourceTicket<T>> {
        let id = self.find_ticket(pass, name, list)?;
        self.registry.tickets().check_type::<T>(id)?;
        Ok(ResourceTicket::from_id(id))
    }

    pub(crate) fn find_ticket(
        &self,
        pass: PassId,
        name: &str,
        list: impl Fn(&PassBase) -> &[TicketId],
    ) -> Result<TicketId> {
        let base = self.pass_base(pass).ok_or(FrameGraphError::StaleTicket)?;
        list(base)
            .iter()
            .copied()
            .find(|id| self.registry.tickets().name(*id) == Some(name))
            .ok_or_else(|| FrameGraphError::UnknownTicketName {
                pass: base.name().to_string(),
                ticket: name.to_string(),
            })
    }

    // ─── Frame ────────────────────────────────────────────────────────────────

    /// Runs one full frame. Returns `true` on the first execution of the
    /// current logical frame.
    ///
    /// On failure every acquired resource is released and the transient
    /// bindings are torn down, so the next call starts clean.
    pub fn execute(&mut self) -> Result<bool> {
        let first = !self.rendered;
        self.rendered = true;
        if first {
            self.context.profile_step(GraphStep::Begin);
            self.registry.begin_rendering_session();
        }

        if let Err(err) = self.run_frame() {
            log::warn!("Frame graph execution failed: {err}");
            let released = self.registry.release_all(self.context.backend_mut());
            if released > 0 {
                log::debug!("Released {released} resource(s) after failed frame");
            }
            self.registry.clear();
            return Err(err);
        }
        Ok(first)
    }

    fn run_frame(&mut self) -> Result<()> {
        self.prepare_passes()?;
        self.cull_passes()?;
        self.execute_passes()?;
        self.reset_passes();
        Ok(())
    }

    pub(crate) fn prepare_passes(&mut self) -> Result<()> {
        self.context.profile_step(GraphStep::Prepare);
        for slot in &mut self.passes {
            log::trace!("Preparing pass '{}'", slot.base.name());
            slot.pass.prepare(&mut PrepareContext {
                registry: &mut self.registry,
                render: &self.context,
                base: &slot.base,
            })?;
            slot.base.state = PassState::Prepared;
        }
        Ok(())
    }

    pub(crate) fn cull_passes(&mut self) -> Result<()> {
        self.context.profile_step(GraphStep::Cull);
        let inputs: Vec<CullPass<'_>> = self
            .passes
            .iter()
            .map(|slot| CullPass {
                name: slot.base.name(),
                forced: slot.pass.is_used(false),
            })
            .collect();
        let refs = self.registry.cull(&inputs)?;
        drop(inputs);

        let mut used = Vec::with_capacity(self.passes.len());
        for (slot, refs) in self.passes.iter_mut().zip(refs) {
            slot.base.refs = refs;
            slot.base.used = slot.pass.is_used(refs > 0);
            if !slot.base.used {
                log::trace!("Culled pass '{}'", slot.base.name());
                slot.base.state = PassState::Culled;
            }
            used.push(slot.base.used);
        }
        self.registry.apply_cull(&used);
        Ok(())
    }

    fn execute_passes(&mut self) -> Result<()> {
        self.context.profile_step(GraphStep::Execute);
        let size = self.context.viewport().size();
        for slot in &mut self.passes {
            if !slot.base.used {
                continue;
            }
            self.context.profile_pass(slot.base.name());
            log::trace!("Executing pass '{}'", slot.base.name());

            if slot.base.camera.update(size) {
                if let Some(old) = slot.base.frame_buffer.take() {
                    self.context.backend_mut().dispose_frame_buffer(&old);
                }
                match slot.pass.create_frame_buffer(&mut self.context) {
                    Ok(Some(frame_buffer)) => {
                        log::debug!(
                            "Pass '{}' built frame buffer {}x{}",
                            slot.base.name(),
                            size.x,
                            size.y
                        );
                        slot.base.frame_buffer = Some(frame_buffer);
                        slot.base.frame_buffer_builds += 1;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        slot.base.camera.invalidate();
                        return Err(err);
                    }
                }
            }

            let mark = self.context.save_settings();
            self.registry.begin_pass(slot.base.current_index());
            let result = slot.pass.execute(&mut ExecuteContext {
                registry: &mut self.registry,
                render: &mut self.context,
                base: &slot.base,
            });
            self.registry.end_pass(self.context.backend_mut());
            self.context.restore_settings(mark);
            result?;
            slot.base.state = PassState::Executed;
        }
        Ok(())
    }

    fn reset_passes(&mut self) {
        self.context.profile_step(GraphStep::Reset);
        for slot in &mut self.passes {
            slot.pass.reset(&mut self.context);
            slot.base.state = PassState::Reset;
        }
        self.registry.clear();
        let disposed = self.registry.tick_eviction(self.context.backend_mut());
        if disposed > 0 {
            log::debug!("Evicted {disposed} pooled resource(s)");
        }
    }

    /// Ends the logical frame; the next `execute` counts as its first.
    pub fn rendering_complete(&mut self) {
        for slot in &mut self.passes {
            slot.pass.rendering_complete();
        }
        self.rendered = false;
    }

    /// Whether `execute` ran since the last `rendering_complete`.
    #[must_use]
    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    /// Forwards the pre-frame hook to every pass.
    pub fn pre_frame(&mut self) {
        for slot in &mut self.passes {
            slot.pass.pre_frame(&mut self.context);
        }
    }

    /// Forwards the post-queue hook to every pass.
    pub fn post_queue(&mut self) {
        for slot in &mut self.passes {
            slot.pass.post_queue(&mut self.context);
        }
    }

    // ─── Context ──────────────────────────────────────────────────────────────

    /// Sets the viewport size. Passes owning camera-sized frame buffers
    /// rebuild them on their next execute.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        self.context.resize(UVec2::new(width, height))
    }

    pub fn set_tpf(&mut self, tpf: f32) {
        self.context.set_tpf(tpf);
    }

    pub fn set_profiler(&mut self, profiler: Option<Box<dyn Profiler>>) {
        self.context.set_profiler(profiler);
    }

    #[must_use]
    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut RenderContext {
        &mut self.context
    }

    #[must_use]
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub(crate) fn ticket_table_mut(&mut self) -> &mut crate::resource::TicketTable {
        self.registry.tickets_mut()
    }

    /// The backend downcast to its concrete type.
    #[must_use]
    pub fn backend<B: RenderBackend>(&self) -> Option<&B> {
        self.context.backend_as::<B>()
    }

    /// Disposes every pooled object that is not currently acquired.
    pub fn dispose_pool(&mut self) -> usize {
        self.registry.dispose_all(self.context.backend_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessBackend, Texture2d};
    use crate::graph::pass::{ExecuteContext, InitContext, PrepareContext};
    use crate::resource::TextureDef;

    #[derive(Default)]
    struct Producer {
        color: ResourceTicket<Texture2d>,
    }

    impl RenderPass for Producer {
        fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
            self.color = ctx.add_output("Color");
            Ok(())
        }

        fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<()> {
            let def = TextureDef::new(ctx.width(), ctx.height(), wgpu::TextureFormat::Rgba8Unorm);
            ctx.declare(def, self.color)
        }

        fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<()> {
            ctx.acquire(self.color)?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Sink {
        input: ResourceTicket<Texture2d>,
    }

    impl RenderPass for Sink {
        fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
            self.input = ctx.add_input("Input");
            Ok(())
        }

        fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<()> {
            ctx.reference(self.input)
        }

        fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<()> {
            ctx.acquire(self.input)?;
            Ok(())
        }

        fn is_used(&self, _referenced: bool) -> bool {
            true
        }
    }

    fn graph() -> FrameGraph {
        FrameGraph::new(HeadlessBackend::new(), &FrameGraphSettings::default())
    }

    #[test]
    fn test_cull_is_idempotent() {
        let mut graph = graph();
        let producer = graph.add(Producer::default()).unwrap();
        let unused = graph.add_named(Producer::default(), "Unused").unwrap();
        let sink = graph.add(Sink::default()).unwrap();
        let input = graph.input::<Texture2d>(sink, "Input").unwrap();
        graph.connect_to_output(producer, "Color", input).unwrap();

        graph.registry.begin_rendering_session();
        graph.prepare_passes().unwrap();
        graph.cull_passes().unwrap();
        let first: Vec<(u32, bool)> = graph.passes().map(|b| (b.refs(), b.is_used())).collect();

        graph.cull_passes().unwrap();
        let second: Vec<(u32, bool)> = graph.passes().map(|b| (b.refs(), b.is_used())).collect();

        assert_eq!(first, second);
        assert!(graph.pass_base(producer).unwrap().is_used());
        assert!(!graph.pass_base(unused).unwrap().is_used());
        assert!(graph.pass_base(sink).unwrap().is_used());
        graph.registry.clear();
    }

    #[test]
    fn test_default_names_use_short_type_name() {
        let mut graph = graph();
        let id = graph.add(Producer::default()).unwrap();
        assert_eq!(graph.pass_base(id).unwrap().name(), "Producer");
        assert!(graph.get_named::<Producer>("Producer").is_some());
        assert!(graph.get::<Sink>().is_none());
    }
}

//! Resource Registry
//!
//! The pool behind every ticket. It owns all pooled objects, binds tickets
//! to definitions each frame, decides which producers are live, and hands
//! out objects on acquire.
//!
//! # Frame Flow
//!
//! ```text
//! begin_rendering_session()         first execution of a logical frame
//! declare / reference / reserve     prepare step, per pass
//! cull() + apply_cull()             liveness over reference counts
//! acquire / release                 execute step, per used pass
//! clear()                           end of every execution
//! tick_eviction()                   end of every execution
//! ```
//!
//! # Materialization
//!
//! Objects are bound lazily on the first acquire of a frame, so culled
//! producers never allocate. The lookup order is:
//!
//! 1. The object the ticket held most recently, if it is still pooled,
//!    compatible and not reserved by someone else.
//! 2. Any compatible pooled object that is free for the ticket's lifetime
//!    window `[first use, last use]`.
//! 3. A freshly created object.
//!
//! Reuse (1 and 2) only happens when the definition has `use_existing` set
//! and its `apply` accepts the candidate.

use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::backend::RenderBackend;
use crate::errors::{FrameGraphError, Result};
use crate::resource::definition::{DisposerKind, ErasedDef, ResourceDef, ResourceShape};
use crate::resource::pooled::PooledResource;
use crate::resource::ticket::{ResourceTicket, TicketId, TicketTable};
use crate::resource::ResourceKey;

/// Pass information the cull step needs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CullPass<'a> {
    pub(crate) name: &'a str,
    /// `is_used(false)`: the pass runs even when nothing consumes it.
    pub(crate) forced: bool,
}

/// A ticket's binding for the current frame.
struct ResourceView {
    def: Box<dyn ErasedDef>,
    producer: usize,
    first_use: usize,
    last_use: usize,
    consumers: u32,
    culled: bool,
    constant: bool,
    resource: Option<ResourceKey>,
}

struct Reference {
    consumer: usize,
    ticket: TicketId,
    required: bool,
}

/// Pool of physical objects shared by all passes of one frame graph.
pub struct ResourceRegistry {
    pool: SlotMap<ResourceKey, PooledResource>,
    shapes: FxHashMap<ResourceShape, SmallVec<[ResourceKey; 4]>>,
    tickets: TicketTable,
    views: FxHashMap<TicketId, ResourceView>,
    references: Vec<Reference>,
    acquired: SmallVec<[(TicketId, ResourceKey); 8]>,
    active_pass: Option<usize>,
    next_id: u64,
    default_timeout: u32,
    frame: u64,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new(default_timeout: u32) -> Self {
        Self {
            pool: SlotMap::with_key(),
            shapes: FxHashMap::default(),
            tickets: TicketTable::new(),
            views: FxHashMap::default(),
            references: Vec::new(),
            acquired: SmallVec::new(),
            active_pass: None,
            next_id: 1,
            default_timeout,
            frame: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn tickets(&self) -> &TicketTable {
        &self.tickets
    }

    #[inline]
    pub fn tickets_mut(&mut self) -> &mut TicketTable {
        &mut self.tickets
    }

    #[must_use]
    pub fn default_timeout(&self) -> u32 {
        self.default_timeout
    }

    /// Number of logical frames started so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Starts a logical frame.
    pub fn begin_rendering_session(&mut self) {
        self.frame += 1;
        for resource in self.pool.values_mut() {
            resource.reservations.clear();
            resource.claimed_by = None;
        }
        log::trace!("Rendering session {} started", self.frame);
    }

    // ─── Prepare ──────────────────────────────────────────────────────────────

    /// Binds `ticket` to `def` for this frame, produced by pass `pass_index`.
    pub fn declare<D: ResourceDef>(
        &mut self,
        pass_index: usize,
        def: D,
        ticket: ResourceTicket<D::Object>,
    ) -> Result<()> {
        let id = ticket.id();
        self.tickets.check_type::<D::Object>(id)?;
        if self.tickets.source(id).is_some() {
            return Err(FrameGraphError::ForwardedDeclaration {
                ticket: self.tickets.display_name(id),
            });
        }
        if self.views.contains_key(&id) {
            return Err(FrameGraphError::DuplicateDeclaration {
                ticket: self.tickets.display_name(id),
            });
        }
        self.views.insert(
            id,
            ResourceView {
                def: Box::new(def),
                producer: pass_index,
                first_use: pass_index,
                last_use: pass_index,
                consumers: 0,
                culled: false,
                constant: false,
                resource: None,
            },
        );
        Ok(())
    }

    /// Records a hard dependency. An unresolved ticket fails at cull.
    pub fn reference(&mut self, pass_index: usize, ticket: TicketId) -> Result<()> {
        self.tickets.resolve(ticket)?;
        self.references.push(Reference {
            consumer: pass_index,
            ticket,
            required: true,
        });
        Ok(())
    }

    /// Records a soft dependency. Returns whether the ticket currently
    /// resolves to a declared resource.
    pub fn reference_optional(&mut self, pass_index: usize, ticket: TicketId) -> bool {
        let declared = self
            .tickets
            .resolve(ticket)
            .is_ok_and(|terminal| self.views.contains_key(&terminal));
        if declared {
            self.references.push(Reference {
                consumer: pass_index,
                ticket,
                required: false,
            });
        }
        declared
    }

    /// Reserves the object `ticket` held last frame on timeline slot
    /// `pass_index`, so no other ticket can take it first.
    pub fn reserve(&mut self, pass_index: usize, ticket: TicketId) -> Result<()> {
        let terminal = self.tickets.resolve(ticket)?;
        let Some(key) = self.tickets.last_resource(terminal) else {
            log::trace!(
                "Reservation of '{}' at slot {pass_index} has no previous object",
                self.tickets.display_name(ticket)
            );
            return Ok(());
        };
        match self.pool.get_mut(key) {
            Some(resource)
                if !resource.acquired
                    && resource.claimed_by.is_none_or(|owner| owner == terminal) =>
            {
                resource.claimed_by = Some(terminal);
                resource.reservations.reserve(pass_index);
            }
            Some(_) => log::trace!(
                "Reservation of '{}' at slot {pass_index} lost: object is held elsewhere",
                self.tickets.display_name(ticket)
            ),
            None => log::trace!(
                "Reservation of '{}' at slot {pass_index} lost: object was evicted",
                self.tickets.display_name(ticket)
            ),
        }
        Ok(())
    }

    /// Marks the object bound to `ticket` this frame as never evicted.
    pub fn make_constant(&mut self, ticket: TicketId) -> Result<()> {
        let terminal = self.tickets.resolve(ticket)?;
        match self.views.get_mut(&terminal) {
            Some(view) => {
                view.constant = true;
                Ok(())
            }
            None => Err(FrameGraphError::NotDeclared {
                ticket: self.tickets.display_name(ticket),
            }),
        }
    }

    /// Number of tickets `pass_index` declared this frame.
    #[must_use]
    pub fn declared_by(&self, pass_index: usize) -> usize {
        self.views
            .values()
            .filter(|view| view.producer == pass_index)
            .count()
    }

    // ─── Cull ─────────────────────────────────────────────────────────────────

    /// Backward demand propagation over resource reference counts.
    ///
    /// Returns each pass's remaining reference count. Counts are rebuilt
    /// from the prepare data on every call.
    pub(crate) fn cull(&mut self, passes: &[CullPass<'_>]) -> Result<Vec<u32>> {
        for view in self.views.values_mut() {
            view.consumers = 0;
            view.first_use = view.producer;
            view.last_use = view.producer;
            view.culled = false;
        }

        let mut inputs: Vec<SmallVec<[TicketId; 4]>> = vec![SmallVec::new(); passes.len()];
        for reference in &self.references {
            let terminal = match self.tickets.resolve(reference.ticket) {
                Ok(terminal) => terminal,
                Err(_) if !reference.required => continue,
                Err(err) => return Err(err),
            };
            let Some(view) = self.views.get_mut(&terminal) else {
                if reference.required {
                    return Err(FrameGraphError::UnresolvedTicket {
                        pass: passes
                            .get(reference.consumer)
                            .map_or("<unknown>", |pass| pass.name)
                            .to_string(),
                        ticket: self.tickets.display_name(reference.ticket),
                    });
                }
                continue;
            };
            if view.producer == reference.consumer {
                continue;
            }
            if view.producer > reference.consumer {
                log::warn!(
                    "Pass '{}' consumes '{}' before its producer runs",
                    passes.get(reference.consumer).map_or("<unknown>", |pass| pass.name),
                    self.tickets.display_name(reference.ticket)
                );
            }
            view.consumers += 1;
            view.first_use = view.first_use.min(reference.consumer);
            view.last_use = view.last_use.max(reference.consumer);
            if let Some(list) = inputs.get_mut(reference.consumer) {
                list.push(terminal);
            }
        }

        let mut pass_refs = vec![0_u32; passes.len()];
        for view in self.views.values() {
            if let Some(refs) = pass_refs.get_mut(view.producer) {
                *refs += 1;
            }
        }

        let mut view_refs: FxHashMap<TicketId, u32> = self
            .views
            .iter()
            .map(|(id, view)| (*id, view.consumers))
            .collect();
        let mut stack: Vec<TicketId> = view_refs
            .iter()
            .filter(|(_, refs)| **refs == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut culled = vec![false; passes.len()];

        for (index, pass) in passes.iter().enumerate() {
            if pass_refs[index] == 0 && !pass.forced {
                culled[index] = true;
                Self::drop_inputs(&inputs[index], &mut view_refs, &mut stack);
            }
        }

        while let Some(terminal) = stack.pop() {
            let Some(producer) = self.views.get(&terminal).map(|view| view.producer) else {
                continue;
            };
            let (Some(refs), Some(pass)) = (pass_refs.get_mut(producer), passes.get(producer))
            else {
                continue;
            };
            *refs = refs.saturating_sub(1);
            if *refs == 0 && !pass.forced && !culled[producer] {
                culled[producer] = true;
                Self::drop_inputs(&inputs[producer], &mut view_refs, &mut stack);
            }
        }

        Ok(pass_refs)
    }

    fn drop_inputs(
        inputs: &[TicketId],
        view_refs: &mut FxHashMap<TicketId, u32>,
        stack: &mut Vec<TicketId>,
    ) {
        for terminal in inputs {
            if let Some(refs) = view_refs.get_mut(terminal)
                && *refs > 0
            {
                *refs -= 1;
                if *refs == 0 {
                    stack.push(*terminal);
                }
            }
        }
    }

    /// Drops resources of unused producers from the active set.
    pub(crate) fn apply_cull(&mut self, used: &[bool]) {
        for view in self.views.values_mut() {
            view.culled = !used.get(view.producer).copied().unwrap_or(false);
        }
    }

    /// Whether the resource behind `ticket` was culled this frame.
    #[must_use]
    pub fn is_culled(&self, ticket: TicketId) -> bool {
        self.tickets
            .resolve(ticket)
            .ok()
            .and_then(|terminal| self.views.get(&terminal))
            .is_some_and(|view| view.culled)
    }

    // ─── Execute ──────────────────────────────────────────────────────────────

    pub(crate) fn begin_pass(&mut self, pass_index: usize) {
        self.active_pass = Some(pass_index);
    }

    pub(crate) fn end_pass(&mut self, backend: &mut dyn RenderBackend) -> usize {
        let released = self.release_all(backend);
        self.active_pass = None;
        released
    }

    /// Acquires the handle behind `ticket`, materializing it if needed.
    pub fn acquire<T: Copy + 'static>(
        &mut self,
        ticket: ResourceTicket<T>,
        backend: &mut dyn RenderBackend,
    ) -> Result<T> {
        self.acquire_mut(ticket, backend).map(|object| *object)
    }

    /// Acquires the object behind `ticket` in place. Writes made through the
    /// returned reference are what later consumers of the ticket read.
    pub fn acquire_mut<T: 'static>(
        &mut self,
        ticket: ResourceTicket<T>,
        backend: &mut dyn RenderBackend,
    ) -> Result<&mut T> {
        let key = self.acquire_key(ticket.id(), backend)?;
        self.object_mut(ticket.id(), key)
    }

    /// Like [`acquire`](Self::acquire), but returns `None` when the ticket
    /// has no live producer this frame.
    pub fn acquire_optional<T: Copy + 'static>(
        &mut self,
        ticket: ResourceTicket<T>,
        backend: &mut dyn RenderBackend,
    ) -> Result<Option<T>> {
        Ok(self.acquire_optional_mut(ticket, backend)?.map(|object| *object))
    }

    pub fn acquire_optional_mut<T: 'static>(
        &mut self,
        ticket: ResourceTicket<T>,
        backend: &mut dyn RenderBackend,
    ) -> Result<Option<&mut T>> {
        if self.is_live(ticket.id()) {
            self.acquire_mut(ticket, backend).map(Some)
        } else {
            Ok(None)
        }
    }

    /// The object behind a ticket this pass already holds.
    pub fn acquired_mut<T: 'static>(&mut self, ticket: ResourceTicket<T>) -> Result<&mut T> {
        let terminal = self.tickets.resolve(ticket.id())?;
        let Some(key) = self
            .acquired
            .iter()
            .find(|(held, _)| *held == terminal)
            .map(|(_, key)| *key)
        else {
            return Err(FrameGraphError::NotAcquired {
                ticket: self.tickets.display_name(ticket.id()),
            });
        };
        self.object_mut(ticket.id(), key)
    }

    fn is_live(&self, ticket: TicketId) -> bool {
        self.tickets
            .resolve(ticket)
            .ok()
            .and_then(|terminal| self.views.get(&terminal))
            .is_some_and(|view| !view.culled)
    }

    fn object_mut<T: 'static>(&mut self, ticket: TicketId, key: ResourceKey) -> Result<&mut T> {
        match self
            .pool
            .get_mut(key)
            .and_then(|resource| resource.object.downcast_mut::<T>())
        {
            Some(object) => Ok(object),
            None => Err(FrameGraphError::TypeMismatch {
                ticket: self.tickets.display_name(ticket),
                expected: std::any::type_name::<T>(),
            }),
        }
    }

    fn acquire_key(
        &mut self,
        ticket: TicketId,
        backend: &mut dyn RenderBackend,
    ) -> Result<ResourceKey> {
        let terminal = self.tickets.resolve(ticket)?;
        let Some(view) = self.views.get(&terminal) else {
            return Err(FrameGraphError::NotDeclared {
                ticket: self.tickets.display_name(ticket),
            });
        };
        if view.culled {
            return Err(FrameGraphError::CulledResource {
                ticket: self.tickets.display_name(ticket),
            });
        }

        let key = match view.resource.filter(|key| self.pool.contains_key(*key)) {
            Some(key) => key,
            None => self.materialize(terminal, backend)?,
        };

        let Some(view) = self.views.get(&terminal) else {
            return Err(FrameGraphError::StaleTicket);
        };
        let Some(resource) = self.pool.get_mut(key) else {
            return Err(FrameGraphError::StaleTicket);
        };
        if resource.acquired {
            return Err(FrameGraphError::AlreadyAcquired {
                ticket: self.tickets.display_name(ticket),
            });
        }
        resource.acquired = true;
        resource.used_this_frame = true;
        resource.arm_timer(view.def.static_timeout(), self.default_timeout);
        if view.constant {
            resource.constant = true;
        }
        self.acquired.push((terminal, key));
        Ok(key)
    }

    fn materialize(
        &mut self,
        terminal: TicketId,
        backend: &mut dyn RenderBackend,
    ) -> Result<ResourceKey> {
        let Some(view) = self.views.get(&terminal) else {
            return Err(FrameGraphError::NotDeclared {
                ticket: self.tickets.display_name(terminal),
            });
        };
        let shape = view.def.shape();
        let (start, end) = (view.first_use, view.last_use);

        let mut chosen = None;
        if view.def.use_existing() {
            let last = self.tickets.last_resource(terminal);
            let pooled = self
                .shapes
                .get(&shape)
                .into_iter()
                .flatten()
                .copied()
                .filter(|key| Some(*key) != last);
            for key in last.into_iter().chain(pooled) {
                let Some(resource) = self.pool.get_mut(key) else {
                    continue;
                };
                if resource.shape != shape || !resource.is_available_for(terminal, start, end) {
                    continue;
                }
                if resource.constant && Some(key) != last {
                    continue;
                }
                if view.def.apply(resource.object.as_mut()) {
                    log::debug!(
                        "Reusing pooled resource #{} ({shape}) for '{}'",
                        resource.id,
                        self.tickets.display_name(terminal)
                    );
                    chosen = Some(key);
                    break;
                }
            }
        }

        let key = if let Some(key) = chosen {
            key
        } else {
            let object = view.def.create(backend)?.ok_or_else(|| FrameGraphError::NullResource {
                ticket: self.tickets.display_name(terminal),
            })?;
            let id = self.next_id;
            self.next_id += 1;
            let key = self
                .pool
                .insert(PooledResource::new(id, object, shape, view.def.disposal()));
            self.shapes.entry(shape).or_default().push(key);
            log::debug!(
                "Created pooled resource #{id} ({shape}) for '{}'",
                self.tickets.display_name(terminal)
            );
            key
        };

        if let Some(resource) = self.pool.get_mut(key) {
            resource.reservations.reserve_range(start, end);
        }
        if let Some(view) = self.views.get_mut(&terminal) {
            view.resource = Some(key);
        }
        self.tickets.set_last_resource(terminal, key);
        Ok(key)
    }

    /// Releases the object behind `ticket`, making it eligible for reuse.
    pub fn release<T>(
        &mut self,
        ticket: ResourceTicket<T>,
        backend: &mut dyn RenderBackend,
    ) -> Result<()> {
        self.release_id(ticket.id(), backend)
    }

    fn release_id(&mut self, ticket: TicketId, backend: &mut dyn RenderBackend) -> Result<()> {
        let terminal = self.tickets.resolve(ticket)?;
        let Some(view) = self.views.get_mut(&terminal) else {
            return Err(FrameGraphError::NotDeclared {
                ticket: self.tickets.display_name(ticket),
            });
        };
        let Some(key) = view.resource else {
            return Err(FrameGraphError::AlreadyReleased {
                ticket: self.tickets.display_name(ticket),
            });
        };
        let Some(resource) = self.pool.get_mut(key).filter(|resource| resource.acquired) else {
            return Err(FrameGraphError::AlreadyReleased {
                ticket: self.tickets.display_name(ticket),
            });
        };
        resource.acquired = false;
        self.acquired.retain(|(_, held)| *held != key);

        let window_closed = self.active_pass.is_none_or(|index| index >= view.last_use);
        if view.def.dispose_on_release() && window_closed {
            view.resource = None;
            self.dispose_resource(key, backend);
        }
        Ok(())
    }

    /// Releases everything acquired since the last call. Returns the count.
    pub fn release_all(&mut self, backend: &mut dyn RenderBackend) -> usize {
        let held: SmallVec<[(TicketId, ResourceKey); 8]> = self.acquired.drain(..).collect();
        let mut released = 0;
        for (terminal, key) in held {
            let still_held = self.pool.get(key).is_some_and(|resource| resource.acquired);
            if !still_held {
                continue;
            }
            self.acquired.push((terminal, key));
            match self.release_id(terminal, backend) {
                Ok(()) => released += 1,
                Err(err) => {
                    log::warn!("Failed to release resource #{key:?}: {err}");
                    if let Some(resource) = self.pool.get_mut(key) {
                        resource.acquired = false;
                    }
                    self.acquired.retain(|(_, held)| *held != key);
                }
            }
        }
        released
    }

    /// Number of objects currently acquired.
    #[must_use]
    pub fn acquired_count(&self) -> usize {
        self.acquired.len()
    }

    // ─── Reset ────────────────────────────────────────────────────────────────

    /// Tears down this execution's transient bindings. Pooled objects stay.
    pub fn clear(&mut self) {
        self.views.clear();
        self.references.clear();
        self.acquired.clear();
        self.active_pass = None;
        for resource in self.pool.values_mut() {
            resource.acquired = false;
            resource.reservations.clear();
            resource.claimed_by = None;
        }
    }

    /// Counts one idle execution on every unacquired, non-constant object
    /// that was not used since the last tick and disposes expired ones.
    pub fn tick_eviction(&mut self, backend: &mut dyn RenderBackend) -> usize {
        let mut expired: SmallVec<[ResourceKey; 8]> = SmallVec::new();
        for (key, resource) in &mut self.pool {
            if resource.acquired || resource.constant {
                continue;
            }
            if resource.used_this_frame {
                resource.used_this_frame = false;
                continue;
            }
            if !resource.tick_timeout() {
                expired.push(key);
            }
        }
        let count = expired.len();
        for key in expired {
            self.dispose_resource(key, backend);
        }
        count
    }

    /// Disposes every unacquired pooled object, constants included.
    pub fn dispose_all(&mut self, backend: &mut dyn RenderBackend) -> usize {
        let keys: Vec<ResourceKey> = self
            .pool
            .iter()
            .filter(|(_, resource)| !resource.acquired)
            .map(|(key, _)| key)
            .collect();
        let count = keys.len();
        for key in keys {
            self.dispose_resource(key, backend);
        }
        count
    }

    fn dispose_resource(&mut self, key: ResourceKey, backend: &mut dyn RenderBackend) {
        let Some(resource) = self.pool.remove(key) else {
            return;
        };
        if let Some(keys) = self.shapes.get_mut(&resource.shape) {
            keys.retain(|pooled| *pooled != key);
            if keys.is_empty() {
                self.shapes.remove(&resource.shape);
            }
        }
        log::debug!("Disposing pooled resource #{} ({})", resource.id, resource.shape);
        resource.dispose(backend);
    }

    // ─── Introspection ────────────────────────────────────────────────────────

    /// Number of pooled objects, acquired or not.
    #[must_use]
    pub fn pooled_count(&self) -> usize {
        self.pool.len()
    }

    /// Identities of every pooled object, in ascending order.
    #[must_use]
    pub fn pooled_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.pool.values().map(|resource| resource.id).collect();
        ids.sort_unstable();
        ids
    }

    /// Identity of the pooled object `ticket` was bound to most recently,
    /// if that object is still alive.
    #[must_use]
    pub fn resource_id(&self, ticket: TicketId) -> Option<u64> {
        self.bound_resource(ticket).map(|resource| resource.id)
    }

    /// Remaining idle frames of the object bound to `ticket`.
    #[must_use]
    pub fn timeout_of(&self, ticket: TicketId) -> Option<u32> {
        self.bound_resource(ticket).map(PooledResource::timeout)
    }

    #[must_use]
    pub fn is_constant(&self, ticket: TicketId) -> bool {
        self.bound_resource(ticket)
            .is_some_and(|resource| resource.constant)
    }

    #[must_use]
    pub fn disposer_kind(&self, ticket: TicketId) -> Option<DisposerKind> {
        self.bound_resource(ticket)
            .map(PooledResource::disposer_kind)
    }

    fn bound_resource(&self, ticket: TicketId) -> Option<&PooledResource> {
        let terminal = self.tickets.resolve(ticket).ok()?;
        let key = self.tickets.last_resource(terminal)?;
        self.pool.get(key)
    }
}

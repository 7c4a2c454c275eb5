//! Graph Layout Persistence
//!
//! A saved layout is the ordered pass list plus each pass's tunables and the
//! forwarding links between pass-owned tickets, encoded as JSON:
//!
//! ```json
//! {
//!   "passes": [
//!     { "kind": "scene", "name": "Scene", "settings": {} },
//!     { "kind": "post_process", "name": "Output", "settings": { "slot": "ColorMap" } }
//!   ],
//!   "links": [
//!     { "pass": 1, "ticket": "Color", "source_pass": 0, "source_ticket": "Color" }
//!   ]
//! }
//! ```
//!
//! Pass types are written and read through a [`PassFactoryRegistry`] keyed
//! by a type tag. Passes serialize their tunables with serde; ticket fields
//! are `#[serde(skip)]` and recreated by `initialize` on load.

use std::any::{Any, TypeId};

use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{FrameGraphError, Result};
use crate::graph::{FrameGraph, PassId, RenderPass};
use crate::passes::{PassThroughPass, PostProcessPass};
use crate::resource::TicketId;

// ─── Descriptors ──────────────────────────────────────────────────────────────

/// One saved pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassDescriptor {
    /// Factory tag.
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub settings: Value,
}

/// One saved forwarding link, by pass position and ticket name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDescriptor {
    pub pass: usize,
    pub ticket: String,
    pub source_pass: usize,
    pub source_ticket: String,
}

/// A saved frame graph layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDescriptor {
    pub passes: Vec<PassDescriptor>,
    #[serde(default)]
    pub links: Vec<LinkDescriptor>,
}

impl GraphDescriptor {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ─── Factory Registry ─────────────────────────────────────────────────────────

type PassReader = Box<dyn Fn(Value) -> Result<Box<dyn RenderPass>>>;
type PassWriter = Box<dyn Fn(&dyn RenderPass) -> Result<Value>>;

/// Maps type tags to pass constructors and pass types to writers.
#[derive(Default)]
pub struct PassFactoryRegistry {
    readers: FxHashMap<String, PassReader>,
    writers: FxHashMap<TypeId, (String, PassWriter)>,
}

impl PassFactoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in passes under `post_process` and
    /// `pass_through`.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register::<PostProcessPass>("post_process");
        registry.register::<PassThroughPass>("pass_through");
        registry
    }

    /// Registers `P` under `tag`. A later registration of the same tag or
    /// type replaces the earlier one.
    pub fn register<P>(&mut self, tag: &str)
    where
        P: RenderPass + Serialize + DeserializeOwned,
    {
        self.readers.insert(
            tag.to_string(),
            Box::new(|settings: Value| -> Result<Box<dyn RenderPass>> {
                let pass: P = serde_json::from_value(settings)?;
                Ok(Box::new(pass) as Box<dyn RenderPass>)
            }),
        );
        let owned_tag = tag.to_string();
        self.writers.insert(
            TypeId::of::<P>(),
            (
                tag.to_string(),
                Box::new(move |pass: &dyn RenderPass| -> Result<Value> {
                    let any: &dyn Any = pass;
                    let pass = any
                        .downcast_ref::<P>()
                        .ok_or_else(|| FrameGraphError::PassNotSerializable(owned_tag.clone()))?;
                    Ok(serde_json::to_value(pass)?)
                }),
            ),
        );
    }

    #[must_use]
    pub fn is_registered(&self, tag: &str) -> bool {
        self.readers.contains_key(tag)
    }

    /// Captures the layout of `graph`.
    pub fn save(&self, graph: &FrameGraph) -> Result<GraphDescriptor> {
        let mut passes = Vec::with_capacity(graph.len());
        for slot in &graph.passes {
            let any: &dyn Any = slot.pass.as_ref();
            let (kind, write) = self
                .writers
                .get(&any.type_id())
                .ok_or_else(|| FrameGraphError::PassNotSerializable(slot.base.name().to_string()))?;
            passes.push(PassDescriptor {
                kind: kind.clone(),
                name: slot.base.name().to_string(),
                settings: write(slot.pass.as_ref())?,
            });
        }

        let tickets = graph.registry().tickets();
        let mut links = Vec::new();
        for (index, slot) in graph.passes.iter().enumerate() {
            let owned = slot.base.inputs().iter().chain(slot.base.outputs());
            for ticket in owned {
                let Some(source) = tickets.source(*ticket) else {
                    continue;
                };
                let Some(source_owner) = tickets.owner(source) else {
                    continue;
                };
                if source_owner == slot.base.id() {
                    continue;
                }
                let Some(source_pass) = graph.index_of(source_owner) else {
                    continue;
                };
                links.push(LinkDescriptor {
                    pass: index,
                    ticket: tickets.display_name(*ticket),
                    source_pass,
                    source_ticket: tickets.display_name(source),
                });
            }
        }

        Ok(GraphDescriptor { passes, links })
    }

    /// Appends the saved passes to `graph` in order, re-running their
    /// initialization, then restores the saved links. Returns the new ids.
    ///
    /// Every pass type is checked before anything is added. If a pass fails
    /// to initialize or a link cannot be restored, the passes added so far
    /// are removed again and `graph` is left as it was.
    pub fn load(&self, graph: &mut FrameGraph, descriptor: &GraphDescriptor) -> Result<Vec<PassId>> {
        let mut readers = Vec::with_capacity(descriptor.passes.len());
        for pass in &descriptor.passes {
            let reader = self
                .readers
                .get(&pass.kind)
                .ok_or_else(|| FrameGraphError::UnknownPassType(pass.kind.clone()))?;
            readers.push(reader);
        }

        let mut ids = Vec::with_capacity(descriptor.passes.len());
        let restored = Self::add_passes(graph, descriptor, &readers, &mut ids)
            .and_then(|()| Self::restore_links(graph, descriptor, &ids));
        if let Err(err) = restored {
            for id in ids.iter().rev() {
                graph.remove(*id);
            }
            log::debug!("Rolled back {} pass(es) after failed load", ids.len());
            return Err(err);
        }

        log::debug!(
            "Loaded {} pass(es) and {} link(s)",
            ids.len(),
            descriptor.links.len()
        );
        Ok(ids)
    }

    fn add_passes(
        graph: &mut FrameGraph,
        descriptor: &GraphDescriptor,
        readers: &[&PassReader],
        ids: &mut Vec<PassId>,
    ) -> Result<()> {
        for (pass, read) in descriptor.passes.iter().zip(readers) {
            let settings = if pass.settings.is_null() {
                Value::Object(serde_json::Map::new())
            } else {
                pass.settings.clone()
            };
            let instance = read(settings)?;
            ids.push(graph.add_boxed(instance, Some(pass.name.clone()), None)?);
        }
        Ok(())
    }

    fn restore_links(
        graph: &mut FrameGraph,
        descriptor: &GraphDescriptor,
        ids: &[PassId],
    ) -> Result<()> {
        for link in &descriptor.links {
            let (Some(pass), Some(source_pass)) = (ids.get(link.pass), ids.get(link.source_pass))
            else {
                return Err(FrameGraphError::IndexOutOfRange {
                    index: link.pass.max(link.source_pass),
                    len: ids.len(),
                });
            };
            let ticket = owned_ticket(graph, *pass, &link.ticket)?;
            let source = owned_ticket(graph, *source_pass, &link.source_ticket)?;
            graph.ticket_table_mut().connect(ticket, source)?;
        }
        Ok(())
    }
}

/// Looks a ticket up among the pass's inputs first, then its outputs.
fn owned_ticket(graph: &FrameGraph, pass: PassId, name: &str) -> Result<TicketId> {
    graph
        .find_ticket(pass, name, |base| base.inputs())
        .or_else(|_| graph.find_ticket(pass, name, |base| base.outputs()))
}

impl FrameGraph {
    /// Shorthand for [`PassFactoryRegistry::save`].
    pub fn save(&self, factories: &PassFactoryRegistry) -> Result<GraphDescriptor> {
        factories.save(self)
    }

    /// Shorthand for [`PassFactoryRegistry::load`].
    pub fn load(
        &mut self,
        factories: &PassFactoryRegistry,
        descriptor: &GraphDescriptor,
    ) -> Result<Vec<PassId>> {
        factories.load(self, descriptor)
    }
}

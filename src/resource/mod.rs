//! Resource Management
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`definition`] | How to create, reuse and dispose one resource type |
//! | [`ticket`] | Typed handles and forwarding chains |
//! | [`pooled`] | A physical object with acquisition and eviction state |
//! | [`registry`] | The pool: binding, culling, acquisition, eviction |

pub mod definition;
pub mod pooled;
pub mod registry;
pub mod ticket;

pub use definition::{
    Disposer, DisposerKind, FrameBufferDef, NativeObject, ResourceDef, ResourceShape, TextureDef,
    ValueDef,
};
pub use pooled::ReservationMask;
pub use registry::ResourceRegistry;
pub use ticket::{ResourceTicket, TicketId, TicketTable};

slotmap::new_key_type! {
    /// Key of a pooled object inside the registry.
    pub struct ResourceKey;
}

//! Error Types
//!
//! This module defines the error types used throughout the frame graph.
//!
//! # Overview
//!
//! The main error type [`FrameGraphError`] covers every failure mode of the
//! scheduler and the resource pool. Variants fall into a small set of
//! categories reported by [`FrameGraphError::kind`]:
//!
//! | Kind | Meaning | Typical cause |
//! |------|---------|---------------|
//! | [`FaultKind::Configuration`] | Wiring bug in graph setup | Bad index, cyclic ticket chain |
//! | [`FaultKind::State`] | Bookkeeping misuse | Double release, stale ticket |
//! | [`FaultKind::Validation`] | Resource shape/type mismatch | Target size differs from frame buffer |
//! | [`FaultKind::Backend`] | Render backend failure | Texture allocation failed |
//! | [`FaultKind::Persistence`] | Saved layout cannot be read/written | Unknown pass type tag |
//!
//! None of these are recovered internally. A malformed pass graph is a
//! programming error, not a transient condition.
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, FrameGraphError>`.
//!
//! ```rust,ignore
//! use myth_framegraph::errors::{FrameGraphError, Result};
//!
//! fn build() -> Result<()> {
//!     graph.remove_at(3)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Failure reported by a [`RenderBackend`](crate::backend::RenderBackend).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not allocate a texture or frame buffer.
    #[error("Backend allocation failed: {0}")]
    AllocationFailed(String),

    /// A handle passed to the backend is unknown or already disposed.
    #[error("Unknown backend handle: {0}")]
    InvalidHandle(u64),

    /// The backend rejected a draw or state change.
    #[error("Backend command failed: {0}")]
    CommandFailed(String),
}

/// Category of a [`FrameGraphError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Graph wiring bug (indices, ticket links, missing producers).
    Configuration,
    /// Acquisition bookkeeping misuse.
    State,
    /// Resource shape or type validation failure.
    Validation,
    /// Error raised by the render backend.
    Backend,
    /// Saved graph layout could not be read or written.
    Persistence,
}

/// The main error type for the frame graph.
#[derive(Error, Debug)]
pub enum FrameGraphError {
    // ========================================================================
    // Configuration Faults
    // ========================================================================
    /// A pass index is outside the current pass sequence.
    #[error("Pass index {index} is out of bounds for size {len}")]
    IndexOutOfRange {
        /// The offending index
        index: usize,
        /// Number of passes in the graph
        len: usize,
    },

    /// Linking the ticket would create a forwarding cycle.
    #[error("Forwarding ticket '{ticket}' to '{source_ticket}' would create a cycle")]
    CyclicForwarding {
        /// Ticket that was being linked
        ticket: String,
        /// Ticket it was being linked to
        source_ticket: String,
    },

    /// A hard reference names a ticket that no live pass declared this frame.
    #[error("Pass '{pass}' references ticket '{ticket}' which has no producer this frame")]
    UnresolvedTicket {
        /// Name of the referencing pass
        pass: String,
        /// Name of the unresolved ticket
        ticket: String,
    },

    /// A ticket was declared twice in the same frame.
    #[error("Ticket '{ticket}' was already declared this frame")]
    DuplicateDeclaration {
        /// Name of the ticket
        ticket: String,
    },

    /// A forwarding ticket cannot carry its own declaration.
    #[error("Ticket '{ticket}' forwards to another ticket and cannot be declared")]
    ForwardedDeclaration {
        /// Name of the ticket
        ticket: String,
    },

    /// A pass has no input or output with the requested name.
    #[error("Pass '{pass}' has no ticket named '{ticket}'")]
    UnknownTicketName {
        /// Name of the pass
        pass: String,
        /// Requested ticket name
        ticket: String,
    },

    // ========================================================================
    // State Faults
    // ========================================================================
    /// The ticket was removed together with its owning pass, or never existed.
    #[error("Ticket is stale or was never created")]
    StaleTicket,

    /// The resource behind the ticket is already acquired.
    #[error("Resource behind ticket '{ticket}' is already acquired")]
    AlreadyAcquired {
        /// Name of the ticket
        ticket: String,
    },

    /// The resource behind the ticket was already released.
    #[error("Resource behind ticket '{ticket}' was already released")]
    AlreadyReleased {
        /// Name of the ticket
        ticket: String,
    },

    /// The pass asked for an object it does not hold.
    #[error("Resource behind ticket '{ticket}' is not acquired by this pass")]
    NotAcquired {
        /// Name of the ticket
        ticket: String,
    },

    /// The ticket was not declared by any pass this frame.
    #[error("Ticket '{ticket}' is not declared this frame")]
    NotDeclared {
        /// Name of the ticket
        ticket: String,
    },

    /// The producer of the resource was culled this frame.
    #[error("Resource behind ticket '{ticket}' was culled this frame")]
    CulledResource {
        /// Name of the ticket
        ticket: String,
    },

    // ========================================================================
    // Resource Validation Faults
    // ========================================================================
    /// Two resources that must agree in shape do not.
    #[error("Resource shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch {
        /// Expected shape
        expected: String,
        /// Actual shape
        found: String,
    },

    /// A resource definition failed to produce an object.
    #[error("Definition for ticket '{ticket}' produced no object")]
    NullResource {
        /// Name of the ticket
        ticket: String,
    },

    /// The pooled object does not have the type the ticket promises.
    #[error("Resource behind ticket '{ticket}' is not a {expected}")]
    TypeMismatch {
        /// Name of the ticket
        ticket: String,
        /// Requested type name
        expected: &'static str,
    },

    /// Depth range bounds are outside `[0, 1]` or reversed.
    #[error("Invalid depth range [{start}, {end}]")]
    InvalidDepthRange {
        /// Range start
        start: f32,
        /// Range end
        end: f32,
    },

    // ========================================================================
    // Backend Faults
    // ========================================================================
    /// Error propagated from the render backend.
    #[error("Render backend error: {0}")]
    Backend(#[from] BackendError),

    // ========================================================================
    // Persistence Faults
    // ========================================================================
    /// No factory is registered for the saved pass type tag.
    #[error("Unknown pass type: {0}")]
    UnknownPassType(String),

    /// The pass type was never registered and cannot be written.
    #[error("Pass '{0}' has no registered factory and cannot be saved")]
    PassNotSerializable(String),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FrameGraphError {
    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::IndexOutOfRange { .. }
            | Self::CyclicForwarding { .. }
            | Self::UnresolvedTicket { .. }
            | Self::DuplicateDeclaration { .. }
            | Self::ForwardedDeclaration { .. }
            | Self::UnknownTicketName { .. } => FaultKind::Configuration,
            Self::StaleTicket
            | Self::AlreadyAcquired { .. }
            | Self::AlreadyReleased { .. }
            | Self::NotAcquired { .. }
            | Self::NotDeclared { .. }
            | Self::CulledResource { .. } => FaultKind::State,
            Self::ShapeMismatch { .. }
            | Self::NullResource { .. }
            | Self::TypeMismatch { .. }
            | Self::InvalidDepthRange { .. } => FaultKind::Validation,
            Self::Backend(_) => FaultKind::Backend,
            Self::UnknownPassType(_) | Self::PassNotSerializable(_) | Self::Json(_) => {
                FaultKind::Persistence
            }
        }
    }
}

/// Alias for `Result<T, FrameGraphError>`.
pub type Result<T> = std::result::Result<T, FrameGraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = FrameGraphError::IndexOutOfRange { index: 4, len: 2 };
        assert_eq!(err.kind(), FaultKind::Configuration);
        assert_eq!(err.to_string(), "Pass index 4 is out of bounds for size 2");

        let err = FrameGraphError::from(BackendError::InvalidHandle(7));
        assert_eq!(err.kind(), FaultKind::Backend);

        assert_eq!(FrameGraphError::StaleTicket.kind(), FaultKind::State);
    }
}

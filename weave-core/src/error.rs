//! Error types.
//!
//! Every error here is a usage error: it points at a programming mistake at
//! the call site. Stale notifications are part of normal operation and never
//! surface as errors.

use thiserror::Error;

use crate::graph::EdgeId;

/// Errors returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A hook or effect was created while no lifecycle was active.
    #[error("no active lifecycle; hooks and effects must be created while rendering or inside an effect")]
    NoActiveLifecycle,

    /// The edge has already been unlinked.
    #[error("dependency edge {0:?} is dead")]
    DeadEdge(EdgeId),

    /// The mounting group is already mounted.
    #[error("mounting group is already mounted")]
    AlreadyMounted,

    /// A list index was outside the valid range for the operation.
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// `List::batch` was called from inside a batch on the same list.
    #[error("list batches cannot be nested")]
    NestedBatch,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

//! Control-thread-only error type.
//!
//! The realtime thread never constructs or propagates [`EngineError`]. It returns plain
//! booleans/`Option`s and best-effort-logs failures into the log ring instead, matching the
//! "nothing is retried automatically, the realtime thread never surfaces errors" contract.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("pool is saturated, no free slot for a new object")]
    PoolSaturated,

    #[error("queue is full, task was not enqueued")]
    QueueFull,

    #[error("a playspec is already under construction (in progress: {in_progress})")]
    BuilderConflict { in_progress: bool },

    #[error("unknown {kind} id: {id}")]
    UnknownId { kind: &'static str, id: i32 },

    #[error("driver initialization failed: {0}")]
    DriverInit(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

//! Execution-context decisions.
//!
//! # Data Flow
//! ```text
//! traversal / encoding ──▶ Dispatcher::call(resource, op)
//!                              │
//!            requires_worker_thread()?
//!              │ no                 │ yes
//!              ▼                    ▼
//!         inline on the        WorkerPool (semaphore-bounded
//!         calling task         spawn_blocking)
//!              └────────┬───────────┘
//!                       ▼
//!               PendingOutcome ──▶ caller
//! ```
//!
//! # Design Decisions
//! - The affinity flag is read at every hand-off, so a resource's update and
//!   the encoding of the response are judged independently.
//! - Binary content readers always run on a worker: the sink blocks.

pub mod dispatcher;
pub mod worker_pool;

use crate::error::ResourceError;

pub use dispatcher::Dispatcher;
pub use worker_pool::WorkerPool;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("worker pool is closed")]
    Closed,

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl From<DispatchError> for ResourceError {
    fn from(err: DispatchError) -> Self {
        ResourceError::internal("worker dispatch failed").with_cause(err)
    }
}

//! Error types for the fetch pool.
//!
//! This module defines the central `Error` enum, which captures every failure
//! a submitter, the master, or the supervisor can observe.
//!
//! ## Error Cases
//! - `ChannelError`: An internal communication failure between tasks.
//! - `Transport`: A transport session could not be created.
//! - `RetriesExhausted`: A bounded [`RetryPolicy`] gave up on a job.
//! - `NotFound`: The resource does not exist and the policy treats that as
//!   terminal.
//! - `UnknownWorker`: A completion notice arrived from a worker that was not
//!   busy.
//! - `ReplyDropped`: The serving worker went away without replying.
//! - `ServiceShutdown`: The pool is shutting down.
//! - `InvalidConfig`: Rejected configuration.
//! - `Linked`: A linked task failed, taking its branch of the tree down.
//!
//! [`RetryPolicy`]: crate::RetryPolicy

use crate::{pool::WorkerId, retry::AttemptFailure, transport::TransportError};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the fetch pool.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// A worker's transport session could not be created.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The job was attempted `attempts` times without a successful response.
    #[error("Gave up after {attempts} attempts (last failure: {last})")]
    RetriesExhausted { attempts: u32, last: AttemptFailure },

    /// The resource returned 404 and the policy does not retry it.
    #[error("Resource not found: {url}")]
    NotFound { url: String },

    /// A completion notice named a worker that was not in the busy set.
    #[error("Worker {worker_id} reported completion while not busy")]
    UnknownWorker { worker_id: WorkerId },

    /// The reply channel closed before a result was delivered.
    #[error("Reply dropped before a response was sent")]
    ReplyDropped,

    /// The pool is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// The supplied configuration was rejected.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A linked task returned an error or panicked.
    #[error("Linked task `{actor}` failed: {reason}")]
    Linked { actor: String, reason: String },
}

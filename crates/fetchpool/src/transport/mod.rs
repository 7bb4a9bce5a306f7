//! The seam between a worker and the network.
//!
//! A [`Transport`] performs a single ranged fetch and reports either the
//! response (any status code) or a transport-level failure. It never
//! retries on its own; retry decisions belong to the worker's
//! [`RetryPolicy`].
//!
//! [`RetryPolicy`]: crate::RetryPolicy

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::*;

use crate::job::{Job, Response};
use core::{future::Future, time::Duration};

/// A transport session owned exclusively by one worker.
///
/// Sessions are created once when the worker starts and dropped when it
/// exits, so implementations may keep connection state across jobs.
pub trait Transport: Send + 'static {
    /// Performs one ranged fetch for `job`.
    fn fetch(&mut self, job: &Job) -> impl Future<Output = Result<Response, TransportError>> + Send;
}

/// Failures below the HTTP status layer (connection, DNS, TLS, timeout).
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be completed.
    #[error("request failed: {0}")]
    Request(String),

    /// The attempt exceeded the per-attempt timeout.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
}

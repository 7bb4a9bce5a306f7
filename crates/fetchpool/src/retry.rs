use crate::{
    error::Error,
    job::{Job, Response},
    transport::TransportError,
};
use bytes::Bytes;
use core::{num::NonZeroU32, time::Duration};

const NOT_FOUND: u16 = 404;

/// Controls how a worker reacts to failed attempts.
///
/// The default never gives up: transport errors and every non-2xx status
/// (404 included) are retried after [`cooldown`](Self::cooldown) for as long
/// as the pool is running. A job that never sees a 2xx response is simply
/// never answered.
///
/// Setting [`max_attempts`](Self::max_attempts) bounds the loop. Once the
/// bound is hit the submitter receives [`Error::RetriesExhausted`] and the
/// worker is released back to the pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between a failed attempt and the next one.
    pub cooldown: Duration,
    /// Total attempts allowed per job, or `None` to retry forever.
    pub max_attempts: Option<NonZeroU32>,
    /// Upper bound for a single attempt. An attempt that runs longer counts
    /// as a transport error.
    pub attempt_timeout: Option<Duration>,
    /// Fail on the first 404 instead of retrying it.
    pub fail_on_not_found: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            cooldown: Self::DEFAULT_COOLDOWN,
            max_attempts: None,
            attempt_timeout: None,
            fail_on_not_found: false,
        }
    }
}

impl RetryPolicy {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(100);

    /// A policy that gives up after `max_attempts` attempts.
    pub fn bounded(max_attempts: NonZeroU32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::default()
        }
    }

    pub(crate) fn classify(&self, job: &Job, result: Result<Response, TransportError>) -> Verdict {
        match result {
            Ok(response) if response.is_success() => Verdict::Delivered(response.body),
            Ok(response) if response.status == NOT_FOUND && self.fail_on_not_found => {
                Verdict::Failed(Error::NotFound {
                    url: job.url.clone(),
                })
            }
            Ok(response) => Verdict::Retry(AttemptFailure::Status(response.status)),
            Err(err) => Verdict::Retry(AttemptFailure::Transport(err)),
        }
    }

    pub(crate) fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max.get())
    }
}

/// Why a single attempt did not produce a result.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum AttemptFailure {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The outcome of classifying one attempt.
#[derive(Debug)]
pub(crate) enum Verdict {
    Delivered(Bytes),
    Retry(AttemptFailure),
    Failed(Error),
}

//! Failure propagation between tasks.
//!
//! A [`Link`] pairs a [`CancellationToken`] with a channel back to the
//! supervisor. Tasks spawned through a link run under the tracker; when one
//! returns an error or panics, the link's token is cancelled (taking down
//! everything holding a child of that token) and the failure is reported to
//! whoever holds the receiving end.

use crate::error::{Error, Result};
use core::future::Future;
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

#[derive(Clone, Debug)]
pub struct Link {
    token: CancellationToken,
    failures: mpsc::UnboundedSender<Error>,
}

impl Link {
    /// Creates a root link and the receiver on which linked failures arrive.
    pub fn new(token: CancellationToken) -> (Self, mpsc::UnboundedReceiver<Error>) {
        let (failures, rx) = mpsc::unbounded_channel();
        (Self { token, failures }, rx)
    }

    /// The token cancelled when this branch goes down.
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns a link for a sub-branch. Cancelling `self` cancels the child;
    /// a failure in the child only cancels the child's own token.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            failures: self.failures.clone(),
        }
    }

    /// Spawns `fut` on `tracker` as a task linked to this branch.
    pub fn spawn<F>(&self, tracker: &TaskTracker, actor: impl Into<String>, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let actor = actor.into();
        let token = self.token.clone();
        let failures = self.failures.clone();

        // The inner spawn isolates panics so they surface as a `JoinError`.
        let task = tokio::spawn(fut);
        tracker.spawn(async move {
            let reason = match task.await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("{actor} exited normally");
                    return;
                }
                Ok(Err(err)) => err.to_string(),
                Err(err) if err.is_panic() => "panicked".to_string(),
                Err(_) => "aborted".to_string(),
            };

            #[cfg(feature = "tracing")]
            tracing::error!("{actor} failed: {reason}");

            token.cancel();
            let _ = failures.send(Error::Linked { actor, reason });
        });
    }
}

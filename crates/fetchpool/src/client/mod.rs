//! Job generator.
//!
//! The [`Client`] produces one job per tick, at delays drawn from a
//! [`DelaySource`], for as long as its token is live. Each tick spawns an
//! independent one-shot request task ([`client_job`]) that submits the job to
//! the master and waits for whichever worker serves it to reply.

mod delay;

pub use delay::*;

use crate::{
    error::{Error, Result},
    job::Job,
    link::Link,
    pool::MasterHandle,
};
use bytes::Bytes;
use core::future::Future;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Periodic job producer.
pub struct Client<D> {
    master: MasterHandle,
    job: Job,
    delays: D,
    tracker: TaskTracker,
    link: Link,
    shutdown: CancellationToken,
    count: u64,
}

impl<D> Client<D>
where
    D: DelaySource + Send + 'static,
{
    /// Creates a client submitting copies of `job` to `master`.
    ///
    /// The client stops when `link`'s token is cancelled. Request tasks are
    /// spawned on `tracker` and linked to `link`, so a crashing request takes
    /// that branch down with it. A request that merely fails is logged.
    pub fn new(
        master: MasterHandle,
        job: Job,
        delays: D,
        tracker: TaskTracker,
        link: Link,
    ) -> Self {
        let shutdown = link.token().child_token();
        Self {
            master,
            job,
            delays,
            tracker,
            link,
            shutdown,
            count: 0,
        }
    }

    /// Produces jobs until cancelled. The first job is produced immediately.
    pub async fn run(mut self) -> Result<()> {
        #[cfg(feature = "tracing")]
        tracing::info!("Client started");

        loop {
            self.count += 1;

            #[cfg(feature = "tracing")]
            tracing::debug!("Spawning client job nr. {}", self.count);

            let request = client_job(
                self.count,
                self.master.clone(),
                self.job.clone(),
                self.shutdown.child_token(),
            );
            self.spawn_job(self.count, async move {
                let _ = request.await;
                Ok(())
            });

            let delay = self.delays.next_delay();
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Client stopped after {} job(s)", self.count);
        Ok(())
    }

    fn spawn_job<F>(&self, nr: u64, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.link.spawn(&self.tracker, format!("client job nr. {nr}"), fut);
    }
}

/// One outstanding request: submits `job` and waits for the reply.
///
/// Returns the payload on success. A job that is never answered keeps this
/// task alive until `shutdown` is cancelled, which resolves to
/// [`Error::ServiceShutdown`].
#[allow(clippy::used_underscore_binding)]
pub async fn client_job(
    _nr: u64,
    master: MasterHandle,
    job: Job,
    shutdown: CancellationToken,
) -> Result<Bytes> {
    let result = tokio::select! {
        () = shutdown.cancelled() => Err(Error::ServiceShutdown),
        result = master.submit(job) => result,
    };

    match &result {
        Ok(_payload) => {
            #[cfg(feature = "tracing")]
            tracing::info!(
                "Client job nr. {_nr} received {} bytes",
                _payload.len()
            );
        }
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("Client job nr. {_nr} failed: {_e}");
        }
    }

    result
}

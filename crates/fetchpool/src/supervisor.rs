//! Lifecycle supervision for the whole task tree.
//!
//! ```text
//!   root token ── master token ─┬─ worker 0..N (child tokens)
//!                               └─ client ── client jobs (child tokens)
//! ```
//!
//! The master is linked to the root; the client and each client job are
//! linked to the master, so a failure anywhere cancels its branch and is
//! reported here. Shutdown is two-phase: the first interrupt cancels the root
//! and waits for every task to finish; a second interrupt while waiting gives
//! up and reports
//! [`ShutdownOutcome::Aborted`] so the caller can exit immediately.

use crate::{
    client::{Client, DelaySource},
    error::{Error, Result},
    job::Job,
    link::Link,
    pool::{Master, MasterHandle, PoolConfig, WorkerId},
    transport::{Transport, TransportError},
};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// How a supervised run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every task finished after the shutdown request.
    Drained,
    /// A second interrupt arrived before the tasks finished. Some may still
    /// be running.
    Aborted,
}

/// Owns the task tree and drives its shutdown.
pub struct Supervisor {
    root: CancellationToken,
    tracker: TaskTracker,
    master: MasterHandle,
    failures: mpsc::UnboundedReceiver<Error>,
}

impl Supervisor {
    /// Spawns the master (and its workers) and a client linked to it.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool config is invalid or a transport session
    /// cannot be created.
    pub fn start<T, F, D>(
        pool: &PoolConfig,
        make_transport: F,
        job: Job,
        delays: D,
    ) -> Result<Self>
    where
        T: Transport,
        F: FnMut(WorkerId) -> core::result::Result<T, TransportError>,
        D: DelaySource + Send + 'static,
    {
        let root = CancellationToken::new();
        let tracker = TaskTracker::new();
        let (root_link, failures) = Link::new(root.clone());

        let master_link = root_link.child();
        let (master, handle) = Master::start(pool, make_transport, &tracker, &master_link)?;
        root_link.spawn(&tracker, "master", master.run());

        // Exiting master cancels the client through the child token; a failed
        // client or client job cancels the master through the link.
        let client = Client::new(
            handle.clone(),
            job,
            delays,
            tracker.clone(),
            master_link.clone(),
        );
        master_link.spawn(&tracker, "client", client.run());

        #[cfg(feature = "tracing")]
        tracing::info!("Supervisor started {} worker(s)", pool.num_workers);

        Ok(Self {
            root,
            tracker,
            master: handle,
            failures,
        })
    }

    pub const fn master(&self) -> &MasterHandle {
        &self.master
    }

    /// Cancels the whole tree. Calling this more than once has no further
    /// effect.
    pub fn request_shutdown(&self) {
        self.root.cancel();
    }

    /// Runs until an interrupt, an explicit shutdown request, or a linked
    /// failure, then drains.
    ///
    /// Each item of `interrupts` is one interrupt. The first starts a graceful
    /// drain; the next one received during the drain aborts it.
    ///
    /// # Errors
    ///
    /// Returns the first linked failure if the run ended because of one and
    /// the drain completed.
    pub async fn run<S>(mut self, mut interrupts: S) -> Result<ShutdownOutcome>
    where
        S: Stream<Item = ()> + Unpin,
    {
        let failure = tokio::select! {
            _ = interrupts.next() => {
                #[cfg(feature = "tracing")]
                tracing::info!("Received interrupt");
                None
            }
            () = self.root.cancelled() => None,
            Some(err) = self.failures.recv() => {
                #[cfg(feature = "tracing")]
                tracing::error!("Shutting down after failure: {err}");
                Some(err)
            }
        };

        self.root.cancel();
        self.tracker.close();

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Waiting for {} task(s) to finish; this may take a while (interrupt again to abort)",
            self.tracker.len()
        );

        tokio::select! {
            () = self.tracker.wait() => {}
            Some(()) = interrupts.next() => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Second interrupt; abandoning {} task(s)", self.tracker.len());
                return Ok(ShutdownOutcome::Aborted);
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!("All tasks finished");

        // Failures reported during the drain are consequences of the first
        // one; only surface the first.
        match failure.or_else(|| self.failures.try_recv().ok()) {
            Some(err) => Err(err),
            None => Ok(ShutdownOutcome::Drained),
        }
    }
}

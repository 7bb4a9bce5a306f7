//! The pool master.
//!
//! The master owns the idle/busy bookkeeping for a fixed set of workers and
//! serialises every change to it through its own task, so no locking is
//! needed. It reacts to two kinds of messages:
//!
//! - **Submissions** (from any [`MasterHandle`]) are forwarded unchanged to an
//!   idle worker. When the last idle worker is handed out the master becomes
//!   [`DispatchMode::Saturated`] and stops reading the submission queue.
//!   Pending submissions stay in the bounded queue and submitters block on it.
//! - **Completion notices** (from workers) move the worker back to idle. In
//!   saturated mode this also re-enables the submission queue.

use super::{
    WorkerId,
    state::{DispatchMode, PoolState, PoolStats},
    worker::{JobRequest, worker_loop},
};
use crate::{
    error::{Error, Result},
    job::Job,
    link::Link,
    retry::RetryPolicy,
    transport::{Transport, TransportError},
};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Pool sizing and worker behaviour.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of workers, fixed for the lifetime of the pool.
    pub num_workers: usize,
    /// Capacity of the master's submission queue.
    pub submission_buffer: usize,
    pub retry: RetryPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 10,
            submission_buffer: 1,
            retry: RetryPolicy::default(),
        }
    }
}

impl PoolConfig {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an empty pool or a zero-capacity
    /// submission queue.
    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(Error::InvalidConfig {
                reason: "pool needs at least one worker".to_string(),
            });
        }
        if self.submission_buffer == 0 {
            return Err(Error::InvalidConfig {
                reason: "submission buffer must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

enum Event {
    Submitted(JobRequest),
    Finished(WorkerId),
}

/// The master task. Obtain one from [`Master::start`] and drive it with
/// [`Master::run`].
pub struct Master {
    state: PoolState,
    workers: Vec<mpsc::Sender<JobRequest>>,
    submissions: mpsc::Receiver<JobRequest>,
    finished: mpsc::Receiver<WorkerId>,
    stats: watch::Sender<PoolStats>,
    shutdown: CancellationToken,
}

impl Master {
    /// Spawns the workers and returns the master together with a handle for
    /// submitting jobs.
    ///
    /// Every worker is started here, before the master can accept a job.
    /// `make_transport` is called once per worker to create its session.
    /// Workers run under `tracker`, linked to `link`: a worker failure
    /// cancels the master, and cancelling the master stops the workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or a transport session
    /// cannot be created. Workers already spawned are stopped in that case.
    pub fn start<T, F>(
        config: &PoolConfig,
        mut make_transport: F,
        tracker: &TaskTracker,
        link: &Link,
    ) -> Result<(Self, MasterHandle)>
    where
        T: Transport,
        F: FnMut(WorkerId) -> core::result::Result<T, TransportError>,
    {
        config.validate()?;

        let shutdown = link.token().clone();
        let (submit_tx, submit_rx) = mpsc::channel(config.submission_buffer);
        // A worker has at most one outstanding notice, so this never blocks.
        let (finished_tx, finished_rx) = mpsc::channel(config.num_workers);
        let mut workers = Vec::with_capacity(config.num_workers);

        for worker_id in 0..config.num_workers {
            let transport = match make_transport(worker_id) {
                Ok(transport) => transport,
                Err(err) => {
                    shutdown.cancel();
                    return Err(err.into());
                }
            };

            // The master only forwards to idle workers, so each mailbox holds
            // at most one request.
            let (tx, rx) = mpsc::channel(1);
            workers.push(tx);

            link.spawn(
                tracker,
                format!("worker {worker_id}"),
                worker_loop(
                    worker_id,
                    rx,
                    transport,
                    finished_tx.clone(),
                    config.retry.clone(),
                    shutdown.child_token(),
                ),
            );
        }

        let state = PoolState::new(config.num_workers);
        let (stats_tx, stats_rx) = watch::channel(state.stats());

        let master = Self {
            state,
            workers,
            submissions: submit_rx,
            finished: finished_rx,
            stats: stats_tx,
            shutdown: shutdown.clone(),
        };
        let handle = MasterHandle {
            submissions: submit_tx,
            stats: stats_rx,
            shutdown,
        };

        Ok((master, handle))
    }

    /// Runs the dispatch loop until the master's token is cancelled or every
    /// handle is dropped. On exit the token is cancelled so the workers stop.
    pub async fn run(mut self) -> Result<()> {
        #[cfg(feature = "tracing")]
        tracing::info!("Master started with {} worker(s)", self.workers.len());

        let result = self.serve().await;
        self.shutdown.cancel();

        #[cfg(feature = "tracing")]
        tracing::info!("Master stopped");
        result
    }

    async fn serve(&mut self) -> Result<()> {
        loop {
            let event = match self.state.mode() {
                DispatchMode::Accepting => tokio::select! {
                    biased;
                    () = self.shutdown.cancelled() => return Ok(()),
                    Some(worker_id) = self.finished.recv() => Event::Finished(worker_id),
                    request = self.submissions.recv() => match request {
                        Some(request) => Event::Submitted(request),
                        None => return Ok(()),
                    },
                },
                // The submission queue is deliberately not polled here.
                DispatchMode::Saturated => tokio::select! {
                    biased;
                    () = self.shutdown.cancelled() => return Ok(()),
                    worker_id = self.finished.recv() => match worker_id {
                        Some(worker_id) => Event::Finished(worker_id),
                        None => return Err(Error::ChannelError {
                            context: "all workers exited".to_string(),
                        }),
                    },
                },
            };

            match event {
                Event::Submitted(request) => self.dispatch(request)?,
                Event::Finished(worker_id) => self.release(worker_id)?,
            }

            self.stats.send_replace(self.state.stats());
        }
    }

    fn dispatch(&mut self, request: JobRequest) -> Result<()> {
        let worker_id = self.state.checkout().ok_or_else(|| Error::ChannelError {
            context: "dispatch attempted with no idle worker".to_string(),
        })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Forwarding {} to worker {worker_id} ({} active jobs)",
            request.job.url,
            self.state.busy().len()
        );

        match self.workers[worker_id].try_send(request) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                return Err(Error::ChannelError {
                    context: format!("worker {worker_id} mailbox full"),
                });
            }
            // The worker saw the cancellation first; the dropped request
            // resolves its submitter with `ReplyDropped`.
            Err(mpsc::error::TrySendError::Closed(_)) if self.shutdown.is_cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} already stopped; dropping job");
                return Ok(());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                return Err(Error::Linked {
                    actor: format!("worker {worker_id}"),
                    reason: "mailbox closed".to_string(),
                });
            }
        }

        if self.state.mode() == DispatchMode::Saturated {
            #[cfg(feature = "tracing")]
            tracing::debug!("All workers busy; deferring submissions");
        }

        Ok(())
    }

    fn release(&mut self, worker_id: WorkerId) -> Result<()> {
        let _resumed = self.state.mode() == DispatchMode::Saturated;
        self.state.release(worker_id)?;

        #[cfg(feature = "tracing")]
        {
            if _resumed {
                tracing::debug!("Worker {worker_id} is done; resuming dispatch");
            } else {
                tracing::trace!("Worker {worker_id} is done");
            }
        }

        Ok(())
    }
}

/// Cloneable handle for submitting jobs to a running [`Master`].
#[derive(Clone, Debug)]
pub struct MasterHandle {
    submissions: mpsc::Sender<JobRequest>,
    stats: watch::Receiver<PoolStats>,
    shutdown: CancellationToken,
}

impl MasterHandle {
    /// Enqueues `job` and returns the pending reply.
    ///
    /// Waits while the submission queue is full, which happens when every
    /// worker is busy and the queue has filled up behind them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] if the master is shutting down.
    pub async fn send(&self, job: Job) -> Result<PendingReply> {
        if self.shutdown.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        let (reply, rx) = oneshot::channel();
        let request = JobRequest { job, reply };

        tokio::select! {
            () = self.shutdown.cancelled() => Err(Error::ServiceShutdown),
            sent = self.submissions.send(request) => match sent {
                Ok(()) => Ok(PendingReply(rx)),
                Err(_) => Err(Error::ServiceShutdown),
            },
        }
    }

    /// Submits `job` and waits for the worker's reply.
    pub async fn submit(&self, job: Job) -> Result<Bytes> {
        self.send(job).await?.recv().await
    }

    /// The most recently published pool snapshot.
    pub fn stats(&self) -> PoolStats {
        *self.stats.borrow()
    }

    /// A receiver notified after every pool transition.
    pub fn subscribe(&self) -> watch::Receiver<PoolStats> {
        self.stats.clone()
    }

    /// Asks the master to exit. Workers finish their in-flight attempt and
    /// stop; queued submissions are dropped.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// A reply that will be sent directly by the worker serving the job.
#[derive(Debug)]
pub struct PendingReply(oneshot::Receiver<Result<Bytes>>);

impl PendingReply {
    /// Waits for the worker's reply.
    ///
    /// # Errors
    ///
    /// Returns the worker's failure, or [`Error::ReplyDropped`] if the job
    /// was discarded without a reply (shutdown, worker crash).
    pub async fn recv(self) -> Result<Bytes> {
        self.0.await.map_err(|_| Error::ReplyDropped)?
    }
}

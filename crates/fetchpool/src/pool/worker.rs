use super::WorkerId;
use crate::{
    error::{Error, Result},
    job::Job,
    retry::{RetryPolicy, Verdict},
    transport::{Transport, TransportError},
};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// A job in flight, carrying the channel its result goes back on.
///
/// The master forwards requests unchanged, so the reply travels from the
/// worker straight to the original submitter.
#[derive(Debug)]
pub(crate) struct JobRequest {
    pub job: Job,
    pub reply: oneshot::Sender<Result<Bytes>>,
}

/// Worker task: owns one transport session and serves one job at a time.
///
/// For each [`JobRequest`] the worker loops on its transport until the
/// [`RetryPolicy`] reaches a verdict, then sends a completion notice on
/// `finished` followed by the result on the request's reply channel. No
/// notice is sent while a job is still being retried.
///
/// On cancellation the worker lets an in-flight attempt run to completion
/// but does not start another one; the submitter then receives
/// [`Error::ServiceShutdown`].
///
/// # Arguments
///
/// - `worker_id`: Identity reported to the master on completion.
/// - `rx`: Mailbox of forwarded jobs. The master never queues more than one.
/// - `transport`: Session created for this worker at startup.
/// - `finished`: Completion notices back to the master.
/// - `policy`: Retry behaviour shared by every worker in the pool.
/// - `shutdown`: Child of the master's token.
pub(crate) async fn worker_loop<T: Transport>(
    worker_id: WorkerId,
    mut rx: mpsc::Receiver<JobRequest>,
    mut transport: T,
    finished: mpsc::Sender<WorkerId>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
) -> Result<()> {
    #[cfg(feature = "tracing")]
    tracing::debug!("Worker {worker_id} started");

    loop {
        let request = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Worker {worker_id} reading {} [{}]",
            request.job.url,
            request.job.range()
        );

        let outcome =
            fetch_with_retry(worker_id, &mut transport, &request.job, &policy, &shutdown).await;

        // Free the slot first so the master can hand out the next job while
        // the reply is in flight.
        if finished.send(worker_id).await.is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {worker_id} could not notify master; master is gone");
        }

        if request.reply.send(outcome).is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {worker_id} result discarded; submitter is gone");
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("Worker {worker_id} stopped");
    Ok(())
}

/// Attempts `job` until the policy produces a terminal verdict.
#[allow(clippy::used_underscore_binding)]
async fn fetch_with_retry<T: Transport>(
    _worker_id: WorkerId,
    transport: &mut T,
    job: &Job,
    policy: &RetryPolicy,
    shutdown: &CancellationToken,
) -> Result<Bytes> {
    let mut attempts: u32 = 0;

    loop {
        attempts = attempts.saturating_add(1);

        let result = match policy.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, transport.fetch(job))
                .await
                .unwrap_or(Err(TransportError::Timeout(limit))),
            None => transport.fetch(job).await,
        };

        let failure = match policy.classify(job, result) {
            Verdict::Delivered(body) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "Worker {_worker_id} received {} bytes after {attempts} attempt(s)",
                    body.len()
                );
                return Ok(body);
            }
            Verdict::Failed(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Worker {_worker_id} giving up on {}: {err}", job.url);
                return Err(err);
            }
            Verdict::Retry(failure) => failure,
        };

        #[cfg(feature = "tracing")]
        tracing::warn!(
            "Worker {_worker_id} attempt {attempts} for {} failed: {failure}",
            job.url
        );

        if policy.exhausted(attempts) {
            return Err(Error::RetriesExhausted {
                attempts,
                last: failure,
            });
        }

        // Cool down before retrying so an unreachable remote does not spin
        // the worker.
        tokio::select! {
            () = shutdown.cancelled() => return Err(Error::ServiceShutdown),
            () = tokio::time::sleep(policy.cooldown) => {}
        }
    }
}

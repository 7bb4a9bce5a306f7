//! In-memory transport double driven by per-URL scripts.

use crate::{
    job::{Job, Response},
    pool::WorkerId,
    transport::{Transport, TransportError},
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};
use tokio::sync::Notify;

/// What the transport does for one attempt.
#[derive(Clone, Debug)]
pub(crate) enum Step {
    /// Respond with this status and the canned body.
    Status(u16),
    /// Fail at the transport level.
    Fail,
    /// Never complete.
    Hang,
    /// Wait for the gate to open, then respond 206.
    Gate(Arc<Notify>),
    /// Panic inside the worker.
    Panic,
}

#[derive(Default)]
struct Inner {
    steps: HashMap<String, VecDeque<Step>>,
    calls: Vec<(WorkerId, String)>,
}

/// Shared script. URLs without queued steps answer 206 immediately with the
/// body `payload:<url>`.
#[derive(Clone, Default)]
pub(crate) struct Script {
    inner: Arc<Mutex<Inner>>,
}

impl Script {
    pub fn push(&self, url: &str, steps: impl IntoIterator<Item = Step>) {
        let mut inner = self.inner.lock().unwrap();
        inner.steps.entry(url.to_string()).or_default().extend(steps);
    }

    /// Queues a gated step for `url` and returns the gate.
    pub fn gate(&self, url: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.push(url, [Step::Gate(Arc::clone(&gate))]);
        gate
    }

    pub fn transport(&self, worker_id: WorkerId) -> ScriptedTransport {
        ScriptedTransport {
            worker_id,
            script: self.clone(),
        }
    }

    pub fn attempts(&self, url: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.calls.iter().filter(|(_, u)| u == url).count()
    }

    /// Workers that attempted `url`, in call order.
    pub fn workers_for(&self, url: &str) -> Vec<WorkerId> {
        let inner = self.inner.lock().unwrap();
        inner
            .calls
            .iter()
            .filter(|(_, u)| u == url)
            .map(|(w, _)| *w)
            .collect()
    }

    fn next_step(&self, worker_id: WorkerId, url: &str) -> Step {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push((worker_id, url.to_string()));
        inner
            .steps
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Status(206))
    }
}

pub(crate) struct ScriptedTransport {
    worker_id: WorkerId,
    script: Script,
}

impl Transport for ScriptedTransport {
    async fn fetch(&mut self, job: &Job) -> Result<Response, TransportError> {
        let body = format!("payload:{}", job.url);
        match self.script.next_step(self.worker_id, &job.url) {
            Step::Status(status) => Ok(Response::new(status, body)),
            Step::Fail => Err(TransportError::Request("connection refused".into())),
            Step::Hang => std::future::pending().await,
            Step::Gate(gate) => {
                gate.notified().await;
                Ok(Response::new(206, body))
            }
            Step::Panic => panic!("transport blew up"),
        }
    }
}

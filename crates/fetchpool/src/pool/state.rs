use super::WorkerId;
use crate::error::{Error, Result};

/// Whether the master is currently reading its submission queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DispatchMode {
    /// At least one worker is idle; submissions are dispatched immediately.
    #[default]
    Accepting,
    /// Every worker is busy; submissions wait in the queue until a worker
    /// reports completion.
    Saturated,
}

/// Point-in-time view of the pool, published after every transition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub busy: usize,
    pub mode: DispatchMode,
    /// Jobs forwarded to a worker.
    pub dispatched: u64,
    /// Completion notices processed.
    pub completed: u64,
    /// Number of times the pool went from accepting to saturated.
    pub stalls: u64,
}

/// Idle/busy membership for a fixed set of workers.
///
/// Every worker id in `0..size` is in exactly one of the two sets at all
/// times. Idle workers are handed out LIFO, so the worker that most recently
/// finished is the next one to receive work.
#[derive(Clone, Debug)]
pub struct PoolState {
    idle: Vec<WorkerId>,
    busy: Vec<WorkerId>,
    dispatched: u64,
    completed: u64,
    stalls: u64,
}

impl PoolState {
    pub fn new(size: usize) -> Self {
        Self {
            idle: (0..size).collect(),
            busy: Vec::with_capacity(size),
            dispatched: 0,
            completed: 0,
            stalls: 0,
        }
    }

    pub fn mode(&self) -> DispatchMode {
        if self.idle.is_empty() {
            DispatchMode::Saturated
        } else {
            DispatchMode::Accepting
        }
    }

    pub fn size(&self) -> usize {
        self.idle.len() + self.busy.len()
    }

    pub fn idle(&self) -> &[WorkerId] {
        &self.idle
    }

    pub fn busy(&self) -> &[WorkerId] {
        &self.busy
    }

    /// Moves one idle worker to the busy set and returns it, or `None` when
    /// the pool is saturated.
    pub fn checkout(&mut self) -> Option<WorkerId> {
        let worker_id = self.idle.pop()?;
        self.busy.push(worker_id);
        self.dispatched += 1;
        if self.idle.is_empty() {
            self.stalls += 1;
        }
        Some(worker_id)
    }

    /// Moves `worker_id` from the busy set back to idle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownWorker`] if the worker is not busy.
    pub fn release(&mut self, worker_id: WorkerId) -> Result<()> {
        let pos = self
            .busy
            .iter()
            .position(|&id| id == worker_id)
            .ok_or(Error::UnknownWorker { worker_id })?;
        self.busy.swap_remove(pos);
        self.idle.push(worker_id);
        self.completed += 1;
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.len(),
            busy: self.busy.len(),
            mode: self.mode(),
            dispatched: self.dispatched,
            completed: self.completed,
            stalls: self.stalls,
        }
    }
}

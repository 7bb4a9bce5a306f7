//! The worker pool: a master task load-balancing jobs across a fixed set of
//! transport workers.
//!
//! ## Structure
//!
//! - `state`: idle/busy bookkeeping and the dispatch mode.
//! - `master`: the master task and the [`MasterHandle`] used to submit jobs.
//! - `worker`: the per-worker retry loop.

mod master;
mod state;
mod worker;

#[cfg(test)]
mod tests;

pub use master::*;
pub use state::*;

/// Index of a worker within its pool.
pub type WorkerId = usize;

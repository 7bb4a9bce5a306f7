#![doc = include_str!("../README.md")]

mod client;
mod error;
mod job;
mod link;
mod pool;
mod retry;
mod supervisor;
#[cfg(test)]
mod testing;
mod transport;

pub use crate::client::*;
pub use crate::error::*;
pub use crate::job::*;
pub use crate::link::*;
pub use crate::pool::*;
pub use crate::retry::*;
pub use crate::supervisor::*;
pub use crate::transport::*;

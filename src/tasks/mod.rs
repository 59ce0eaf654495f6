//! Background task channel.
//!
//! # Data Flow
//! ```text
//! dispatcher → TaskSender::dispatch(payload) → shared queue
//!     → task worker → task hook → task-finish hook
//! ```
//!
//! Completion is reported only through hooks; the request that queued a task
//! never waits for it.

pub mod pool;

pub use pool::{TaskError, TaskId, TaskPool, TaskSender};

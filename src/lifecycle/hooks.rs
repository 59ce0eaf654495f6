//! Server lifecycle callbacks.
//!
//! The hook set mirrors the events the runtime reports: server start, worker
//! start/stop, background task execution and completion, and worker errors.
//! Requests themselves go through the [`Dispatcher`](crate::http::Dispatcher).
//!
//! Every method has a logging default, so implementors override only what
//! they need.

use std::net::SocketAddr;

use serde_json::Value;
use thiserror::Error;

use crate::tasks::TaskId;

/// Faults contained inside a worker without stopping it.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("dispatcher panicked: {message}")]
    DispatcherPanicked { message: String },

    #[error("task {task_id} panicked: {message}")]
    TaskPanicked { task_id: TaskId, message: String },
}

/// Callbacks fired by the server runtime.
pub trait ServerHooks: Send + Sync + 'static {
    /// The listener is bound and the server is about to accept connections.
    fn on_start(&self, addr: SocketAddr) {
        tracing::info!(address = %addr, "Server start");
    }

    fn on_worker_start(&self, worker_id: usize) {
        tracing::debug!(worker_id, "Worker start");
    }

    fn on_worker_stop(&self, worker_id: usize) {
        tracing::debug!(worker_id, "Worker stop");
    }

    /// Run a background task on a task worker; the return value is passed to
    /// [`on_task_finish`](Self::on_task_finish).
    ///
    /// Called on a dedicated task-worker thread, never on a request worker,
    /// so blocking here only holds up the queue behind this worker.
    fn on_task(&self, task_id: TaskId, worker_id: usize, payload: Value) -> Value {
        tracing::info!(%task_id, worker_id, %payload, "Start task");
        Value::Null
    }

    fn on_task_finish(&self, task_id: TaskId, result: &Value) {
        tracing::info!(%task_id, %result, "Task finish");
    }

    fn on_worker_error(&self, worker_id: usize, error: &WorkerError) {
        tracing::error!(worker_id, error = %error, "Worker error");
    }
}

/// Hooks that only log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHooks;

impl ServerHooks for LoggingHooks {}

//! Task worker pool.
//!
//! # Responsibilities
//! - Accept fire-and-forget payloads from request handlers
//! - Run each payload through the task hook on one of the task workers
//! - Report the result through the task-finish hook
//! - Recycle a worker after it has handled `task_max_request` tasks
//!
//! # Design Decisions
//! - One shared unbounded queue; workers take turns receiving from it
//! - Each task worker is a dedicated OS thread, so a task hook may block
//!   without stalling the runtime that serves requests
//! - A panicking task hook is reported through the worker-error hook and the
//!   worker keeps going

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::lifecycle::hooks::{ServerHooks, WorkerError};
use crate::lifecycle::startup::set_worker_id;
use crate::observability::metrics;

/// Identifier handed back when a task is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    /// No task worker is left to receive the task.
    #[error("task workers are not running")]
    Closed,
}

#[derive(Debug)]
struct Task {
    id: TaskId,
    payload: Value,
}

/// Cloneable handle for queuing background tasks.
#[derive(Clone)]
pub struct TaskSender {
    tx: mpsc::UnboundedSender<Task>,
    next_id: Arc<AtomicU64>,
}

impl TaskSender {
    /// Queue `payload` for a task worker and return its id immediately.
    pub fn dispatch(&self, payload: Value) -> Result<TaskId, TaskError> {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.tx
            .send(Task { id, payload })
            .map_err(|_| TaskError::Closed)?;
        tracing::debug!(task_id = %id, "Task queued");
        Ok(id)
    }
}

/// Running task workers.
pub struct TaskPool {
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Spawn `task_worker_num` worker threads.
    ///
    /// Task worker ids follow the request worker ids: the first one is
    /// `worker_num`.
    pub fn start(config: &ServerConfig, hooks: Arc<dyn ServerHooks>) -> io::Result<(Self, TaskSender)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(config.task_worker_num);
        for i in 0..config.task_worker_num {
            let worker = TaskWorker {
                id: config.worker_num + i,
                max_requests: config.task_max_request,
                hooks: hooks.clone(),
            };
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("task-worker-{}", worker.id))
                .spawn(move || worker.run(rx))?;
            workers.push(handle);
        }

        tracing::info!(task_workers = config.task_worker_num, "Task pool started");

        let sender = TaskSender {
            tx,
            next_id: Arc::new(AtomicU64::new(0)),
        };
        Ok((Self { workers }, sender))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Block until every worker has exited. Workers exit once all senders
    /// are dropped and the queue is empty.
    pub fn join(self) {
        for worker in self.workers {
            if worker.join().is_err() {
                tracing::error!("Task worker terminated abnormally");
            }
        }
    }
}

struct TaskWorker {
    id: usize,
    max_requests: usize,
    hooks: Arc<dyn ServerHooks>,
}

impl TaskWorker {
    fn run(self, rx: Arc<Mutex<mpsc::UnboundedReceiver<Task>>>) {
        set_worker_id(self.id);
        self.hooks.on_worker_start(self.id);
        let mut handled = 0usize;

        loop {
            let next = match rx.lock() {
                Ok(mut rx) => rx.blocking_recv(),
                Err(poisoned) => poisoned.into_inner().blocking_recv(),
            };
            let Some(task) = next else { break };

            self.execute(task);
            handled += 1;

            if self.max_requests > 0 && handled >= self.max_requests {
                tracing::debug!(worker_id = self.id, handled, "Recycling task worker");
                self.hooks.on_worker_stop(self.id);
                self.hooks.on_worker_start(self.id);
                handled = 0;
            }
        }

        self.hooks.on_worker_stop(self.id);
    }

    fn execute(&self, task: Task) {
        let Task { id, payload } = task;
        let hooks = &self.hooks;

        match panic::catch_unwind(AssertUnwindSafe(|| hooks.on_task(id, self.id, payload))) {
            Ok(result) => {
                metrics::record_task("finished");
                hooks.on_task_finish(id, &result);
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                let error = WorkerError::TaskPanicked { task_id: id, message };
                metrics::record_task("panicked");
                metrics::record_worker_error();
                hooks.on_worker_error(self.id, &error);
            }
        }
    }
}

//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the tokio runtime with the configured number of request workers
//! - Fire worker-start / worker-stop hooks as runtime threads come and go
//! - Write the pid file for the lifetime of the process
//!
//! # Design Decisions
//! - Worker ids are assigned in thread start order, starting at 0
//! - Any thread the runtime starts counts as a worker, including blocking-pool
//!   threads if something spawns blocking work

use std::cell::Cell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::config::ServerConfig;
use crate::lifecycle::hooks::ServerHooks;

thread_local! {
    static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Id of the worker (request or task) running on this thread, if any.
pub fn current_worker_id() -> Option<usize> {
    WORKER_ID.with(Cell::get)
}

/// Tag the current thread with a worker id.
pub(crate) fn set_worker_id(id: usize) {
    WORKER_ID.with(|cell| cell.set(Some(id)));
}

/// Build the multi-thread runtime that serves requests.
pub fn build_runtime(config: &ServerConfig, hooks: Arc<dyn ServerHooks>) -> io::Result<Runtime> {
    let next_id = Arc::new(AtomicUsize::new(0));
    let start_hooks = hooks.clone();
    let stop_hooks = hooks;

    Builder::new_multi_thread()
        .worker_threads(config.worker_num)
        .thread_name("bridge-worker")
        .enable_all()
        .on_thread_start(move || {
            let id = next_id.fetch_add(1, Ordering::Relaxed);
            set_worker_id(id);
            start_hooks.on_worker_start(id);
        })
        .on_thread_stop(move || {
            if let Some(id) = WORKER_ID.with(Cell::take) {
                stop_hooks.on_worker_stop(id);
            }
        })
        .build()
}

/// Pid file removed again when dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id to `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        fs::write(path, format!("{}\n", std::process::id()))?;
        tracing::info!(path = %path.display(), pid = std::process::id(), "Pid file written");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove pid file");
        }
    }
}

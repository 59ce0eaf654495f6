//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → build runtime (worker hooks) → write pid file → bind
//!
//! Hooks (hooks.rs):
//!     start, worker-start, task, task-finish, worker-stop, worker-error
//!
//! Shutdown (shutdown.rs):
//!     Ctrl-C or trigger → stop accepting → drain in-flight events → exit
//! ```

pub mod hooks;
pub mod shutdown;
pub mod startup;

pub use hooks::{LoggingHooks, ServerHooks, WorkerError};
pub use shutdown::Shutdown;
pub use startup::{build_runtime, current_worker_id, PidFile};

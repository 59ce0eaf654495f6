//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout and the optional log file
//!     → Prometheus scrape endpoint (when enabled)
//! ```
//!
//! # Design Decisions
//! - Fields, not formatted strings, carry request details
//! - Request ID (`x-request-id`) is attached by middleware and visible to
//!   application code through `RequestView`

pub mod logging;
pub mod metrics;

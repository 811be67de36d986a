//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (tracing subscriber: pretty or JSON, EnvFilter)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//!
//! Consumers:
//!     → stdout log aggregation
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - The request id set by the HTTP layer is attached to every pipeline log
//!   event as a field.
//! - Metric updates go through the `metrics` facade; without an installed
//!   recorder they are no-ops, so tests need no setup.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LoggingError};

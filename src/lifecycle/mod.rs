//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → broadcast → server stops accepting → in-flight requests drain
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - One broadcast coordinator; every long-running task subscribes
//! - In-flight worker tasks are not cancelled; they finish or are abandoned
//!   with the process

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;

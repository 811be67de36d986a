//! HTTP transport.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (assign or keep x-request-id)
//!     → pipeline (request context → traversal → encoding → response)
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::GatewayServer;

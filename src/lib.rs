//! Resource Gateway Library

// Resource model
pub mod error;
pub mod request;
pub mod resource;

// Request processing
pub mod body;
pub mod codec;
pub mod dispatch;
pub mod encoding;
pub mod pipeline;
pub mod traversal;

// Transport and cross-cutting concerns
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use error::{ErrorKind, ResourceError};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use resource::Resource;

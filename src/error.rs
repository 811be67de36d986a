//! Error taxonomy shared by every subsystem.
//!
//! # Design Decisions
//! - `ErrorKind` is the client-facing classification; it alone decides the
//!   HTTP status code.
//! - `ResourceError` carries an optional cause for logging. The cause is never
//!   written into a response body.
//! - Subsystem errors (`CodecError`, `BodyError`, ...) stay local and convert
//!   into a `ResourceError` where a response is built.

use std::fmt;
use std::sync::Arc;

/// Classification of a failed resource operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotAuthorized,
    Forbidden,
    NotAcceptable,
    NoSuchResource,
    ResourceAlreadyExists,
    CreateNotSupported,
    ReadNotSupported,
    UpdateNotSupported,
    DeleteNotSupported,
    InternalError,
    UnsupportedMediaType,
    IncompatibleMediaType,
    InvalidRequest,
}

impl ErrorKind {
    /// Wire name used in encoded error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotAuthorized => "NOT_AUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotAcceptable => "NOT_ACCEPTABLE",
            ErrorKind::NoSuchResource => "NO_SUCH_RESOURCE",
            ErrorKind::ResourceAlreadyExists => "RESOURCE_ALREADY_EXISTS",
            ErrorKind::CreateNotSupported => "CREATE_NOT_SUPPORTED",
            ErrorKind::ReadNotSupported => "READ_NOT_SUPPORTED",
            ErrorKind::UpdateNotSupported => "UPDATE_NOT_SUPPORTED",
            ErrorKind::DeleteNotSupported => "DELETE_NOT_SUPPORTED",
            ErrorKind::InternalError => "INTERNAL_ERROR",
            ErrorKind::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            ErrorKind::IncompatibleMediaType => "INCOMPATIBLE_MEDIA_TYPE",
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
        }
    }

    /// Message used when the error carries none of its own.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::NotAuthorized => "Not authorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotAcceptable => "Not acceptable",
            ErrorKind::NoSuchResource => "No such resource",
            ErrorKind::ResourceAlreadyExists => "Resource already exists",
            ErrorKind::CreateNotSupported => "Create not supported",
            ErrorKind::ReadNotSupported => "Read not supported",
            ErrorKind::UpdateNotSupported => "Update not supported",
            ErrorKind::DeleteNotSupported => "Delete not supported",
            ErrorKind::InternalError => "Internal Server Error",
            ErrorKind::UnsupportedMediaType => "Unsupported media type",
            ErrorKind::IncompatibleMediaType => "Incompatible media type",
            ErrorKind::InvalidRequest => "Invalid request",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, thread-safe error cause.
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A structured failure of a resource operation.
#[derive(Debug, Clone)]
pub struct ResourceError {
    kind: ErrorKind,
    message: Option<String>,
    resource_id: Option<String>,
    cause: Option<Cause>,
}

impl ResourceError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            resource_id: None,
            cause: None,
        }
    }

    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(kind)
        }
    }

    /// `NoSuchResource` for the segment `id` that failed to resolve.
    pub fn no_such_resource(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            message: Some(format!("No such resource: {}", id)),
            resource_id: Some(id),
            ..Self::new(ErrorKind::NoSuchResource)
        }
    }

    pub fn already_exists(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            message: Some(format!("Resource already exists: {}", id)),
            resource_id: Some(id),
            ..Self::new(ErrorKind::ResourceAlreadyExists)
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_message(ErrorKind::InternalError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::with_message(ErrorKind::InvalidRequest, message)
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or_else(|| self.kind.default_message())
    }

    /// Identifier of the path segment or member the error refers to.
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    /// Message safe to show to a client. Internal errors are reduced to the
    /// generic text.
    pub fn client_message(&self) -> &str {
        if self.kind == ErrorKind::InternalError {
            self.kind.default_message()
        } else {
            self.message()
        }
    }

    /// Render the message followed by the full cause chain, for logs.
    pub fn chain(&self) -> String {
        let mut out = format!("{}: {}", self.kind, self.message());
        let mut source: Option<&(dyn std::error::Error + 'static)> =
            self.cause.as_ref().map(|c| c.as_ref() as &(dyn std::error::Error + 'static));
        while let Some(err) = source {
            out.push_str(": ");
            out.push_str(&err.to_string());
            source = err.source();
        }
        out
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message())
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for ResourceError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("disk on fire")]
    struct Boom;

    #[test]
    fn internal_errors_hide_their_message_from_clients() {
        let err = ResourceError::internal("db password rejected").with_cause(Boom);
        assert_eq!(err.client_message(), "Internal Server Error");
        assert!(err.chain().contains("db password rejected"));
        assert!(err.chain().contains("disk on fire"));
    }

    #[test]
    fn no_such_resource_carries_segment_id() {
        let err = ResourceError::no_such_resource("missing");
        assert_eq!(err.kind(), ErrorKind::NoSuchResource);
        assert_eq!(err.resource_id(), Some("missing"));
    }
}

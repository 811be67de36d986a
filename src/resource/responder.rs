//! Single-use completion handle for resource operations.
//!
//! Every capability method receives a `Responder` and must resolve it with
//! exactly one outcome. All resolving methods consume the responder, so a
//! second resolution cannot be written. A responder dropped without a
//! resolution resolves itself as an internal error and logs the defect.

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::{ErrorKind, ResourceError};
use crate::resource::Resource;

/// Outcome of a single capability invocation.
#[derive(Clone)]
pub enum ResourceOutcome {
    Read(Arc<dyn Resource>),
    Created(Arc<dyn Resource>),
    Updated(Arc<dyn Resource>),
    Deleted(Arc<dyn Resource>),
    Error(ResourceError),
}

impl ResourceOutcome {
    pub fn error(&self) -> Option<&ResourceError> {
        match self {
            ResourceOutcome::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn resource(&self) -> Option<&Arc<dyn Resource>> {
        match self {
            ResourceOutcome::Read(r)
            | ResourceOutcome::Created(r)
            | ResourceOutcome::Updated(r)
            | ResourceOutcome::Deleted(r) => Some(r),
            ResourceOutcome::Error(_) => None,
        }
    }
}

impl fmt::Debug for ResourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceOutcome::Read(r) => write!(f, "Read({})", r.uri()),
            ResourceOutcome::Created(r) => write!(f, "Created({})", r.uri()),
            ResourceOutcome::Updated(r) => write!(f, "Updated({})", r.uri()),
            ResourceOutcome::Deleted(r) => write!(f, "Deleted({})", r.uri()),
            ResourceOutcome::Error(e) => write!(f, "Error({})", e),
        }
    }
}

/// Completion handle passed into capability methods.
pub struct Responder {
    tx: Option<oneshot::Sender<ResourceOutcome>>,
    operation: &'static str,
}

/// Receiving half of a `Responder`.
#[derive(Debug)]
pub struct PendingOutcome {
    rx: oneshot::Receiver<ResourceOutcome>,
}

impl Responder {
    /// Create a responder for `operation` (used in diagnostics only).
    pub fn new(operation: &'static str) -> (Self, PendingOutcome) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Some(tx),
                operation,
            },
            PendingOutcome { rx },
        )
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn resource_read(self, resource: Arc<dyn Resource>) {
        self.respond(ResourceOutcome::Read(resource));
    }

    pub fn resource_created(self, resource: Arc<dyn Resource>) {
        self.respond(ResourceOutcome::Created(resource));
    }

    pub fn resource_updated(self, resource: Arc<dyn Resource>) {
        self.respond(ResourceOutcome::Updated(resource));
    }

    pub fn resource_deleted(self, resource: Arc<dyn Resource>) {
        self.respond(ResourceOutcome::Deleted(resource));
    }

    pub fn create_not_supported(self) {
        self.error(ErrorKind::CreateNotSupported.into());
    }

    pub fn read_not_supported(self) {
        self.error(ErrorKind::ReadNotSupported.into());
    }

    pub fn update_not_supported(self) {
        self.error(ErrorKind::UpdateNotSupported.into());
    }

    pub fn delete_not_supported(self) {
        self.error(ErrorKind::DeleteNotSupported.into());
    }

    pub fn no_such_resource(self, id: impl Into<String>) {
        self.error(ResourceError::no_such_resource(id));
    }

    pub fn resource_already_exists(self, id: impl Into<String>) {
        self.error(ResourceError::already_exists(id));
    }

    pub fn invalid_request(self, message: impl Into<String>) {
        self.error(ResourceError::invalid_request(message));
    }

    pub fn internal_error(self, message: impl Into<String>) {
        self.error(ResourceError::internal(message));
    }

    pub fn error(self, error: ResourceError) {
        self.respond(ResourceOutcome::Error(error));
    }

    fn respond(mut self, outcome: ResourceOutcome) {
        if let Some(tx) = self.tx.take() {
            // The receiver only disappears when the request was abandoned.
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::error!(
                operation = self.operation,
                "Responder dropped without a response"
            );
            let _ = tx.send(ResourceOutcome::Error(ResourceError::internal(format!(
                "{} completed without a response",
                self.operation
            ))));
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("operation", &self.operation)
            .field("resolved", &self.tx.is_none())
            .finish()
    }
}

impl PendingOutcome {
    /// Wait for the outcome. The responder may be resolved on any thread.
    pub async fn outcome(self) -> ResourceOutcome {
        self.rx.await.unwrap_or_else(|_| {
            ResourceOutcome::Error(ResourceError::internal("responder vanished"))
        })
    }

    /// Non-blocking check, for callers that must know whether a resource
    /// already answered synchronously.
    pub fn try_outcome(&mut self) -> Option<ResourceOutcome> {
        self.rx.try_recv().ok()
    }
}

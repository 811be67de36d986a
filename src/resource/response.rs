//! Completed resource operations on their way back to the client.

use std::fmt;
use std::sync::Arc;

use crate::error::ResourceError;
use crate::request::RequestContext;
use crate::resource::{Resource, ResourceOutcome, ResourceState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Created,
    Read,
    Updated,
    Deleted,
    Error,
}

/// Outcome of a request, tied to the request it answers.
pub struct ResourceResponse {
    in_reply_to: RequestContext,
    response_type: ResponseType,
    resource: Option<Arc<dyn Resource>>,
    state: Option<ResourceState>,
    error: Option<ResourceError>,
}

impl ResourceResponse {
    pub fn new(
        in_reply_to: RequestContext,
        response_type: ResponseType,
        resource: Arc<dyn Resource>,
    ) -> Self {
        Self {
            in_reply_to,
            response_type,
            resource: Some(resource),
            state: None,
            error: None,
        }
    }

    pub fn error(in_reply_to: RequestContext, error: ResourceError) -> Self {
        Self {
            in_reply_to,
            response_type: ResponseType::Error,
            resource: None,
            state: None,
            error: Some(error),
        }
    }

    pub fn from_outcome(in_reply_to: RequestContext, outcome: ResourceOutcome) -> Self {
        match outcome {
            ResourceOutcome::Read(r) => Self::new(in_reply_to, ResponseType::Read, r),
            ResourceOutcome::Created(r) => Self::new(in_reply_to, ResponseType::Created, r),
            ResourceOutcome::Updated(r) => Self::new(in_reply_to, ResponseType::Updated, r),
            ResourceOutcome::Deleted(r) => Self::new(in_reply_to, ResponseType::Deleted, r),
            ResourceOutcome::Error(e) => Self::error(in_reply_to, e),
        }
    }

    pub fn in_reply_to(&self) -> &RequestContext {
        &self.in_reply_to
    }

    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }

    pub fn is_error(&self) -> bool {
        self.response_type == ResponseType::Error
    }

    pub fn resource(&self) -> Option<&Arc<dyn Resource>> {
        self.resource.as_ref()
    }

    pub fn state(&self) -> Option<&ResourceState> {
        self.state.as_ref()
    }

    pub fn set_state(&mut self, state: ResourceState) {
        self.state = Some(state);
    }

    pub fn resource_error(&self) -> Option<&ResourceError> {
        self.error.as_ref()
    }

    /// Replace this response with an error answering the same request.
    pub fn into_error(self, error: ResourceError) -> Self {
        Self::error(self.in_reply_to, error)
    }
}

impl fmt::Debug for ResourceResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceResponse")
            .field("response_type", &self.response_type)
            .field("resource", &self.resource.as_ref().map(|r| r.uri().to_string()))
            .field("error", &self.error)
            .finish()
    }
}

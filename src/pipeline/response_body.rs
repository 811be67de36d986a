//! Fills in the state a [`ResourceResponse`] will be encoded from.

use crate::encoding::EncodingDriver;
use crate::error::{ErrorKind, ResourceError};
use crate::pipeline::{Continuation, Payload, Processor};
use crate::resource::{ResourceResponse, ResourceState};

pub struct ResponseBodyProcessor {
    driver: EncodingDriver,
}

impl ResponseBodyProcessor {
    pub fn new(driver: EncodingDriver) -> Self {
        Self { driver }
    }
}

impl Processor for ResponseBodyProcessor {
    fn name(&self) -> &'static str {
        "response-body"
    }

    fn process(&self, payload: Payload) -> Continuation {
        let Payload::Response(mut response) = payload else {
            return Continuation::Proceed(payload);
        };

        if let Some(err) = response.resource_error() {
            let state = error_state(response.in_reply_to().request_id(), err);
            response.set_state(state);
            return Continuation::Proceed(Payload::Response(response));
        }

        let Some(resource) = response.resource().cloned() else {
            return Continuation::Proceed(Payload::Response(response));
        };
        // Binary content is streamed by the HTTP response stage.
        if resource.clone().as_binary().is_some() {
            return Continuation::Proceed(Payload::Response(response));
        }

        let driver = self.driver.clone();
        Continuation::Suspend(Box::pin(async move {
            let ctx = response.in_reply_to().clone();
            let response = match driver.encode(resource, &ctx).await {
                Ok(state) => {
                    response.set_state(state);
                    response
                }
                Err(err) => failed(response, err),
            };
            Continuation::Proceed(Payload::Response(response))
        }))
    }
}

/// Turn `response` into an error response carrying `err`'s state.
pub(crate) fn failed(response: ResourceResponse, err: ResourceError) -> ResourceResponse {
    let state = error_state(response.in_reply_to().request_id(), &err);
    let mut response = response.into_error(err);
    response.set_state(state);
    response
}

/// Client-facing state of an error: its kind and a message. Internal
/// failures are logged with their cause chain and reduced to the generic
/// message.
pub(crate) fn error_state(request_id: &str, err: &ResourceError) -> ResourceState {
    if err.kind() == ErrorKind::InternalError {
        tracing::error!(request_id, error = %err.chain(), "Internal error");
    } else {
        tracing::debug!(request_id, error = %err, "Request failed");
    }
    let mut state = ResourceState::new();
    state.put_property("error-type", err.kind().as_str());
    state.put_property("message", err.client_message());
    state
}

//! [`ResourceResponse`] → transport response.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::codec::{CodecError, EncodingResult, ResourceCodecManager};
use crate::dispatch::Dispatcher;
use crate::error::{ErrorKind, ResourceError};
use crate::pipeline::response_body::failed;
use crate::pipeline::{Continuation, Payload, PipelineError, Processor};
use crate::resource::{ResourceResponse, ResponseType};

/// Negotiates the media type, encodes, applies the status table and sets
/// `Content-Type` and `Location`. Binary resources are streamed.
#[derive(Clone)]
pub struct HttpResponseProcessor {
    codecs: Arc<ResourceCodecManager>,
    dispatcher: Dispatcher,
    max_response_size: usize,
}

impl HttpResponseProcessor {
    pub fn new(
        codecs: Arc<ResourceCodecManager>,
        dispatcher: Dispatcher,
        max_response_size: usize,
    ) -> Self {
        Self {
            codecs,
            dispatcher,
            max_response_size,
        }
    }

    async fn respond(&self, response: ResourceResponse) -> Response {
        let matcher = response.in_reply_to().media_type_matcher().clone();
        let blocking = response
            .resource()
            .is_some_and(|r| r.requires_worker_thread());

        let codecs = self.codecs.clone();
        let encode_matcher = matcher.clone();
        let encoded = self
            .dispatcher
            .execute(blocking, move || {
                let result = codecs.encode(&encode_matcher, &response);
                (response, result)
            })
            .await;
        let (response, encoded) = match encoded {
            Ok(pair) => pair,
            Err(err) => {
                tracing::error!(error = %err, "Response encoding dispatch failed");
                return internal_error();
            }
        };

        let failure = match encoded {
            Ok(result) => match self.finish(&response, result).await {
                Ok(reply) => return reply,
                Err(err) => err,
            },
            Err(err) => ResourceError::from(err),
        };

        // Error responses always find a codec, so this second pass only
        // fails on a defect.
        let response = failed(response, failure);
        match self.codecs.encode(&matcher, &response) {
            Ok(result) => self
                .finish(&response, result)
                .await
                .unwrap_or_else(|err| {
                    tracing::error!(error = %err.chain(), "Error response could not be sent");
                    internal_error()
                }),
            Err(err) => {
                tracing::error!(error = %err, "Error response could not be encoded");
                internal_error()
            }
        }
    }

    async fn finish(
        &self,
        response: &ResourceResponse,
        result: EncodingResult,
    ) -> Result<Response, ResourceError> {
        let status = status_for(response);
        let location = match response.resource() {
            Some(resource) => resource.uri().to_string(),
            None => response.in_reply_to().path().to_string(),
        };

        let (body, length) = match result.body {
            Some(encoded) if response.is_error() => {
                let length = encoded.len() as u64;
                (Body::from(encoded), length)
            }
            Some(encoded) => {
                let staged = self.stage(encoded).await?;
                let length = staged.len() as u64;
                (Body::from(staged), length)
            }
            None => {
                let binary = response
                    .resource()
                    .and_then(|r| r.clone().as_binary())
                    .ok_or_else(|| ResourceError::internal("binary encoding without a binary resource"))?;
                let length = binary.content_length();
                if length == 0 {
                    (Body::empty(), 0)
                } else {
                    let stream = self.dispatcher.stream_content(binary, response.in_reply_to());
                    let chunks = futures_util::stream::unfold(stream, |mut stream| async move {
                        stream
                            .next_chunk()
                            .await
                            .map(|chunk| (Ok::<Bytes, Infallible>(chunk), stream))
                    });
                    (Body::from_stream(chunks), length)
                }
            }
        };

        let mut reply = Response::new(body);
        *reply.status_mut() = status;
        let headers = reply.headers_mut();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        set_header(headers, CONTENT_TYPE, &result.media_type.to_string());
        set_header(headers, LOCATION, &location);
        Ok(reply)
    }

    /// Copy the encoded body through a pooled buffer, enforcing the response
    /// size cap. Error bodies skip this.
    async fn stage(&self, encoded: Bytes) -> Result<Bytes, ResourceError> {
        let mut buffer = self.dispatcher.buffers().acquire().await?;
        let limit = self.max_response_size.min(buffer.capacity());
        if encoded.len() > limit {
            return Err(CodecError::ResponseTooLarge { limit }.into());
        }
        buffer.fill(&encoded);
        Ok(buffer.drain())
    }
}

impl Processor for HttpResponseProcessor {
    fn name(&self) -> &'static str {
        "http-response"
    }

    fn process(&self, payload: Payload) -> Continuation {
        match payload {
            Payload::Response(response) => {
                let this = self.clone();
                Continuation::Suspend(Box::pin(async move {
                    Continuation::Reply(this.respond(response).await)
                }))
            }
            Payload::Reply(reply) => Continuation::Reply(reply),
            other => Continuation::Reply(
                PipelineError::Unexpected {
                    stage: self.name(),
                    payload: other.kind(),
                }
                .into_response(),
            ),
        }
    }
}

/// Status code for a response.
pub fn status_for(response: &ResourceResponse) -> StatusCode {
    match response.response_type() {
        ResponseType::Created => StatusCode::CREATED,
        ResponseType::Read | ResponseType::Updated | ResponseType::Deleted => StatusCode::OK,
        ResponseType::Error => response
            .resource_error()
            .map_or(StatusCode::INTERNAL_SERVER_ERROR, |e| status_for_error(e.kind())),
    }
}

pub fn status_for_error(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotAuthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotAcceptable
        | ErrorKind::InvalidRequest
        | ErrorKind::ResourceAlreadyExists
        | ErrorKind::IncompatibleMediaType => StatusCode::NOT_ACCEPTABLE,
        ErrorKind::NoSuchResource => StatusCode::NOT_FOUND,
        ErrorKind::CreateNotSupported
        | ErrorKind::ReadNotSupported
        | ErrorKind::UpdateNotSupported
        | ErrorKind::DeleteNotSupported => StatusCode::METHOD_NOT_ALLOWED,
        ErrorKind::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn set_header(headers: &mut axum::http::HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::warn!(header = %name, value, "Dropping unrepresentable header"),
    }
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

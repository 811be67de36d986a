//! Transport request → [`RequestContext`].

use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{ACCEPT, ALLOW, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use futures_util::TryStreamExt;

use crate::body::{BodyError, RequestBody};
use crate::codec::ResourceCodecManager;
use crate::error::{ErrorKind, ResourceError};
use crate::http::X_REQUEST_ID;
use crate::pipeline::{Continuation, Payload, Processor};
use crate::request::{
    MediaType, MediaTypeMatcher, Pagination, RequestContext, RequestType, ResourceParams,
    ReturnFields, Sorting,
};
use crate::resource::{LazyResourceState, ResourcePath, ResourceResponse};

/// Builds the request context: method mapping, path extension, negotiation
/// inputs, projection, pagination and the pending body.
pub struct HttpRequestProcessor {
    codecs: Arc<ResourceCodecManager>,
}

impl HttpRequestProcessor {
    pub fn new(codecs: Arc<ResourceCodecManager>) -> Self {
        Self { codecs }
    }

    fn context(&self, request: Request<Body>, request_type: RequestType) -> Payload {
        let (parts, body) = request.into_parts();
        let headers = &parts.headers;

        let (path, extension) = ResourcePath::parse(parts.uri.path())
            .strip_extension(|ext| self.codecs.media_type_for_extension(ext).is_some());
        let extension = extension.and_then(|ext| self.codecs.media_type_for_extension(&ext));

        let params = ResourceParams::parse(parts.uri.query());
        let request_id = header(headers, X_REQUEST_ID.as_str()).map(str::to_string);

        tracing::debug!(
            request_id = request_id.as_deref().unwrap_or("-"),
            method = %parts.method,
            path = %path,
            "Request received"
        );

        let mut problem: Option<ResourceError> = None;

        let matcher = match MediaTypeMatcher::parse(header(headers, ACCEPT.as_str()), extension) {
            Ok(matcher) => matcher,
            Err(err) => {
                problem = Some(
                    ResourceError::with_message(ErrorKind::NotAcceptable, err.to_string())
                        .with_cause(err),
                );
                MediaTypeMatcher::default()
            }
        };

        let return_fields = ReturnFields::parse(params.value("fields").unwrap_or("*"))
            .and_then(|fields| match params.value("expand") {
                Some(expand) => fields.expand(expand),
                None => Ok(fields),
            })
            .unwrap_or_else(|err| {
                problem.get_or_insert_with(|| ResourceError::invalid_request(err.to_string()));
                ReturnFields::all()
            });

        let content_type = match header(headers, CONTENT_TYPE.as_str()).map(MediaType::parse) {
            None => None,
            Some(Ok(media_type)) => Some(media_type),
            Some(Err(err)) => {
                problem.get_or_insert_with(|| {
                    ResourceError::with_message(ErrorKind::UnsupportedMediaType, err.to_string())
                });
                None
            }
        };

        let mut builder = RequestContext::builder(request_type, path)
            .pagination(Pagination::from_params(&params))
            .sorting(Sorting::from_params(&params))
            .return_fields(return_fields)
            .media_type_matcher(matcher)
            .authorization(header(headers, AUTHORIZATION.as_str()).map(str::to_string))
            .content_type(content_type.clone())
            .request_id(request_id);

        if request_type.expects_body() {
            let content_length = header(headers, CONTENT_LENGTH.as_str()).and_then(|v| v.parse().ok());
            let stream = body
                .into_data_stream()
                .map_err(|e| BodyError::Transport(e.to_string()));
            let media_type = content_type.unwrap_or_else(MediaType::json);
            builder = builder
                .body(RequestBody::new(Box::pin(stream), content_length))
                .state(LazyResourceState::new(self.codecs.clone(), media_type));
        }

        let ctx = builder.params(params).build();
        match problem {
            Some(err) => Payload::Response(ResourceResponse::error(ctx, err)),
            None => Payload::Request(ctx),
        }
    }
}

impl Processor for HttpRequestProcessor {
    fn name(&self) -> &'static str {
        "http-request"
    }

    fn process(&self, payload: Payload) -> Continuation {
        let Payload::Exchange(request) = payload else {
            return Continuation::Proceed(payload);
        };
        match RequestType::from_method(request.method()) {
            Some(request_type) => Continuation::Proceed(self.context(request, request_type)),
            None => {
                tracing::debug!(method = %request.method(), "Unsupported HTTP method");
                Continuation::Reply(
                    (
                        StatusCode::METHOD_NOT_ALLOWED,
                        [(ALLOW, "GET, POST, PUT, DELETE")],
                        "Unsupported operation",
                    )
                        .into_response(),
                )
            }
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

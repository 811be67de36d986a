//! Per-request context.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use axum::http::Method;

use crate::body::RequestBody;
use crate::request::{MediaType, MediaTypeMatcher, Pagination, ResourceParams, ReturnFields, Sorting};
use crate::resource::{LazyResourceState, ResourcePath};

/// Operation a request performs on its target resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Create,
    Read,
    Update,
    Delete,
}

impl RequestType {
    /// POST, GET, PUT and DELETE map to an operation; anything else does not.
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::POST => Some(RequestType::Create),
            Method::GET => Some(RequestType::Read),
            Method::PUT => Some(RequestType::Update),
            Method::DELETE => Some(RequestType::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Create => "CREATE",
            RequestType::Read => "READ",
            RequestType::Update => "UPDATE",
            RequestType::Delete => "DELETE",
        }
    }

    pub fn expects_body(&self) -> bool {
        matches!(self, RequestType::Create | RequestType::Update)
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque attributes carried alongside the request.
#[derive(Debug, Clone, Default)]
pub struct RequestAttributes {
    pub authorization: Option<String>,
    pub content_type: Option<MediaType>,
    pub request_id: Option<String>,
}

struct Inner {
    request_type: RequestType,
    path: ResourcePath,
    params: ResourceParams,
    pagination: Pagination,
    sorting: Sorting,
    return_fields: ReturnFields,
    matcher: MediaTypeMatcher,
    attributes: RequestAttributes,
    body: Mutex<Option<RequestBody>>,
    state: Mutex<Option<LazyResourceState>>,
}

/// Cheap-to-clone handle shared by every stage of one request.
///
/// Everything except the body and the request state is fixed at ingress.
/// The body can be taken once; the request state is filled in by the body
/// accumulator and read by the dispatcher.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

impl RequestContext {
    pub fn builder(request_type: RequestType, path: ResourcePath) -> RequestContextBuilder {
        RequestContextBuilder {
            request_type,
            path,
            params: ResourceParams::default(),
            pagination: Pagination::default(),
            sorting: Sorting::default(),
            return_fields: ReturnFields::all(),
            matcher: MediaTypeMatcher::default(),
            attributes: RequestAttributes::default(),
            body: None,
            state: None,
        }
    }

    pub fn request_type(&self) -> RequestType {
        self.inner.request_type
    }

    pub fn path(&self) -> &ResourcePath {
        &self.inner.path
    }

    pub fn params(&self) -> &ResourceParams {
        &self.inner.params
    }

    pub fn pagination(&self) -> Pagination {
        self.inner.pagination
    }

    pub fn sorting(&self) -> &Sorting {
        &self.inner.sorting
    }

    pub fn return_fields(&self) -> &ReturnFields {
        &self.inner.return_fields
    }

    pub fn media_type_matcher(&self) -> &MediaTypeMatcher {
        &self.inner.matcher
    }

    pub fn attributes(&self) -> &RequestAttributes {
        &self.inner.attributes
    }

    pub fn request_id(&self) -> &str {
        self.inner.attributes.request_id.as_deref().unwrap_or("-")
    }

    /// Take the transport body. Returns `None` after the first call.
    pub fn take_body(&self) -> Option<RequestBody> {
        self.inner
            .body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Run `f` against the request state, if the request carries one.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut LazyResourceState) -> R) -> Option<R> {
        let mut guard = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_mut().map(f)
    }

    pub fn has_state(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_type", &self.inner.request_type)
            .field("path", &self.inner.path.to_string())
            .field("request_id", &self.request_id())
            .finish()
    }
}

pub struct RequestContextBuilder {
    request_type: RequestType,
    path: ResourcePath,
    params: ResourceParams,
    pagination: Pagination,
    sorting: Sorting,
    return_fields: ReturnFields,
    matcher: MediaTypeMatcher,
    attributes: RequestAttributes,
    body: Option<RequestBody>,
    state: Option<LazyResourceState>,
}

impl RequestContextBuilder {
    pub fn params(mut self, params: ResourceParams) -> Self {
        self.params = params;
        self
    }

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn sorting(mut self, sorting: Sorting) -> Self {
        self.sorting = sorting;
        self
    }

    pub fn return_fields(mut self, return_fields: ReturnFields) -> Self {
        self.return_fields = return_fields;
        self
    }

    pub fn media_type_matcher(mut self, matcher: MediaTypeMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn authorization(mut self, value: Option<String>) -> Self {
        self.attributes.authorization = value;
        self
    }

    pub fn content_type(mut self, value: Option<MediaType>) -> Self {
        self.attributes.content_type = value;
        self
    }

    pub fn request_id(mut self, value: Option<String>) -> Self {
        self.attributes.request_id = value;
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn state(mut self, state: LazyResourceState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn build(self) -> RequestContext {
        RequestContext {
            inner: Arc::new(Inner {
                request_type: self.request_type,
                path: self.path,
                params: self.params,
                pagination: self.pagination,
                sorting: self.sorting,
                return_fields: self.return_fields,
                matcher: self.matcher,
                attributes: self.attributes,
                body: Mutex::new(self.body),
                state: Mutex::new(self.state),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn maps_http_methods() {
        assert_eq!(RequestType::from_method(&Method::POST), Some(RequestType::Create));
        assert_eq!(RequestType::from_method(&Method::PUT), Some(RequestType::Update));
        assert_eq!(RequestType::from_method(&Method::PATCH), None);
        assert!(RequestType::Update.expects_body());
        assert!(!RequestType::Read.expects_body());
    }

    #[test]
    fn body_is_taken_once() {
        let ctx = RequestContext::builder(RequestType::Create, ResourcePath::parse("/c"))
            .body(RequestBody::full(Bytes::from_static(b"{}")))
            .build();
        let clone = ctx.clone();
        assert!(clone.take_body().is_some());
        assert!(ctx.take_body().is_none());
    }
}

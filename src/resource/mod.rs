//! Resource capability model.
//!
//! # Data Flow
//! ```text
//! traversal engine ──readMember──▶ Resource ──Responder──▶ ResourceOutcome
//! dispatcher ──createMember/updateProperties──▶ Resource (inline or worker)
//! encoding driver ──readProperties/readMembers──▶ PropertySink / ResourceSink
//! binary streaming ──readContent──▶ BinaryContentSink ──▶ transport
//! ```
//!
//! # Design Decisions
//! - Capability methods return nothing: every result travels through the
//!   consuming `Responder` or a sink, so a resource may answer inline or
//!   from any thread at a later point.
//! - Methods take `self: Arc<Self>` so a resource can hand itself to the
//!   responder without holding a self-reference.
//! - Thread affinity is a capability flag (`requires_worker_thread`) queried
//!   once per dispatch decision.
//! - Resources form a tree through `parent()`; the core only borrows the
//!   tree for the duration of a request.

pub mod memory;
pub mod path;
pub mod responder;
pub mod response;
pub mod sink;
pub mod state;

use std::sync::Arc;

use bytes::Bytes;

pub use path::{ResourcePath, Segment};
pub use responder::{PendingOutcome, Responder, ResourceOutcome};
pub use response::{ResourceResponse, ResponseType};
pub use sink::{BinaryContentSink, BinaryContentStream, PropertySink, ResourceSink, SinkError};
pub use state::{LazyResourceState, ResourceState, Value};

use crate::request::{MediaType, RequestContext};

/// A node in the addressable resource tree.
pub trait Resource: Send + Sync + 'static {
    /// Identifier of this resource within its parent. The root uses `""`.
    fn id(&self) -> &str;

    fn parent(&self) -> Option<Arc<dyn Resource>> {
        None
    }

    /// Self URI, derived from the parent chain.
    fn uri(&self) -> ResourcePath {
        let base = self.parent().map(|p| p.uri()).unwrap_or_default();
        if self.id().is_empty() {
            base
        } else {
            base.child(self.id())
        }
    }

    /// Whether capability calls must run on a worker thread instead of the
    /// I/O runtime.
    fn requires_worker_thread(&self) -> bool {
        false
    }

    /// Binary view of this resource, if it streams raw content.
    fn as_binary(self: Arc<Self>) -> Option<Arc<dyn BinaryResource>> {
        None
    }

    /// Stream properties into `sink`, then close it.
    fn read_properties(self: Arc<Self>, _ctx: &RequestContext, sink: PropertySink) {
        sink.close();
    }

    /// Stream members into `sink`, then close it.
    fn read_members(self: Arc<Self>, _ctx: &RequestContext, sink: ResourceSink) {
        sink.close();
    }

    fn read_member(self: Arc<Self>, _ctx: &RequestContext, id: &str, responder: Responder) {
        responder.no_such_resource(id);
    }

    fn create_member(
        self: Arc<Self>,
        _ctx: &RequestContext,
        _state: ResourceState,
        responder: Responder,
    ) {
        responder.create_not_supported();
    }

    fn update_properties(
        self: Arc<Self>,
        _ctx: &RequestContext,
        _state: ResourceState,
        responder: Responder,
    ) {
        responder.update_not_supported();
    }

    fn delete(self: Arc<Self>, _ctx: &RequestContext, responder: Responder) {
        responder.delete_not_supported();
    }
}

/// One progressive write into a binary resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChunk {
    pub data: Bytes,
    /// Bytes already written before this chunk.
    pub offset: u64,
    /// True only for the chunk that completes the body.
    pub complete: bool,
}

/// A resource whose content is raw bytes rather than a state tree.
///
/// Implementations should report `requires_worker_thread() == true`:
/// `BinaryContentSink::accept` blocks.
pub trait BinaryResource: Resource {
    fn media_type(&self) -> MediaType;

    fn content_length(&self) -> u64;

    /// Push the content into `sink` and close it.
    fn read_content(self: Arc<Self>, ctx: &RequestContext, sink: BinaryContentSink);

    /// Pre-flight gate, called before any body byte is read. Return the
    /// responder to accept the upload; answer through it and return `None`
    /// to reject.
    fn will_process_update(&self, _ctx: &RequestContext, responder: Responder) -> Option<Responder> {
        responder.update_not_supported();
        None
    }

    /// Accept one chunk. Return the responder to keep streaming; the final
    /// chunk (`complete == true`) must resolve it.
    fn update_content(
        self: Arc<Self>,
        _ctx: &RequestContext,
        _chunk: ContentChunk,
        responder: Responder,
    ) -> Option<Responder> {
        responder.update_not_supported();
        None
    }
}

/// Resolve `path` below `root` by reading one segment at a time.
/// Used by tests and tooling that need a resource handle directly.
pub async fn lookup(
    root: Arc<dyn Resource>,
    ctx: &RequestContext,
    path: &ResourcePath,
) -> Result<Arc<dyn Resource>, crate::error::ResourceError> {
    let mut current = root;
    for segment in path.segments() {
        let (responder, pending) = Responder::new("readMember");
        current.clone().read_member(ctx, segment.name(), responder);
        match pending.outcome().await {
            ResourceOutcome::Error(err) => return Err(err),
            outcome => match outcome.resource() {
                Some(next) => current = next.clone(),
                None => return Err(crate::error::ResourceError::no_such_resource(segment.name())),
            },
        }
    }
    Ok(current)
}

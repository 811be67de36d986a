//! Thread-affinity aware invocation of resource capabilities.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::body::{BodyAccumulator, BufferPool};
use crate::dispatch::{DispatchError, WorkerPool};
use crate::error::ResourceError;
use crate::request::RequestContext;
use crate::resource::{
    BinaryContentSink, BinaryContentStream, BinaryResource, PropertySink, Resource,
    ResourceOutcome, ResourceSink, ResourceState, Responder, Value,
};

/// Calls resources inline or on a worker, depending on
/// `requires_worker_thread`, and drives request bodies into them.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    workers: WorkerPool,
    buffers: Arc<BufferPool>,
    max_request_size: usize,
}

impl Dispatcher {
    pub fn new(workers: WorkerPool, buffers: Arc<BufferPool>, max_request_size: usize) -> Self {
        Self {
            workers,
            buffers,
            max_request_size,
        }
    }

    pub fn buffers(&self) -> &Arc<BufferPool> {
        &self.buffers
    }

    /// Move arbitrary work off the I/O context.
    pub async fn dispatch<F, R>(&self, task: F) -> Result<R, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.workers.run(task).await
    }

    /// Run `f` on a worker when `blocking`, inline otherwise. A panic in
    /// either context comes back as [`DispatchError::Worker`].
    pub async fn execute<F, R>(&self, blocking: bool, f: F) -> Result<R, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if blocking {
            self.workers.run(f).await
        } else {
            panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!(panic = %message, "Inline resource call panicked");
                DispatchError::Worker(message)
            })
        }
    }

    /// Invoke a responder-style capability and wait for its single outcome.
    pub async fn call<F>(
        &self,
        resource: &Arc<dyn Resource>,
        operation: &'static str,
        f: F,
    ) -> ResourceOutcome
    where
        F: FnOnce(Responder) + Send + 'static,
    {
        let (responder, pending) = Responder::new(operation);
        if let Err(err) = self
            .execute(resource.requires_worker_thread(), move || f(responder))
            .await
        {
            // The responder went down with the task and resolves as internal.
            tracing::error!(operation, error = %err, "Resource dispatch failed");
        }
        pending.outcome().await
    }

    pub async fn read_member(
        &self,
        parent: &Arc<dyn Resource>,
        ctx: &RequestContext,
        id: &str,
    ) -> ResourceOutcome {
        let (target, ctx, id) = (parent.clone(), ctx.clone(), id.to_string());
        self.call(parent, "readMember", move |r| target.read_member(&ctx, &id, r))
            .await
    }

    pub async fn delete(&self, target: &Arc<dyn Resource>, ctx: &RequestContext) -> ResourceOutcome {
        let (resource, ctx) = (target.clone(), ctx.clone());
        self.call(target, "delete", move |r| resource.delete(&ctx, r))
            .await
    }

    /// Read the body, then `createMember` on `parent`.
    pub async fn create(&self, parent: &Arc<dyn Resource>, ctx: &RequestContext) -> ResourceOutcome {
        self.create_member(parent, ctx, None).await
    }

    /// Like [`create`](Self::create), with the request state relabelled to
    /// `id` first.
    pub async fn create_as(
        &self,
        parent: &Arc<dyn Resource>,
        ctx: &RequestContext,
        id: &str,
    ) -> ResourceOutcome {
        self.create_member(parent, ctx, Some(id)).await
    }

    async fn create_member(
        &self,
        parent: &Arc<dyn Resource>,
        ctx: &RequestContext,
        id: Option<&str>,
    ) -> ResourceOutcome {
        let mut state = match self.request_state(ctx).await {
            Ok(state) => state,
            Err(err) => return ResourceOutcome::Error(err),
        };
        if let Some(id) = id {
            state.set_id(id);
            ctx.with_state(|lazy| lazy.state().map(|s| s.set_id(id)).ok());
        }
        let (resource, ctx) = (parent.clone(), ctx.clone());
        self.call(parent, "createMember", move |r| resource.create_member(&ctx, state, r))
            .await
    }

    /// Read the body, then `updateProperties` on `target`. Binary resources
    /// receive the body as progressive `update_content` writes instead.
    pub async fn update(&self, target: &Arc<dyn Resource>, ctx: &RequestContext) -> ResourceOutcome {
        if let Some(binary) = target.clone().as_binary() {
            return self.update_binary(target.requires_worker_thread(), binary, ctx).await;
        }
        let state = match self.request_state(ctx).await {
            Ok(state) => state,
            Err(err) => return ResourceOutcome::Error(err),
        };
        let (resource, ctx) = (target.clone(), ctx.clone());
        self.call(target, "updateProperties", move |r| {
            resource.update_properties(&ctx, state, r)
        })
        .await
    }

    pub async fn read_properties(
        &self,
        resource: &Arc<dyn Resource>,
        ctx: &RequestContext,
    ) -> Result<Vec<(String, Value)>, ResourceError> {
        let (sink, rx) = PropertySink::channel();
        let (target, call_ctx) = (resource.clone(), ctx.clone());
        self.execute(resource.requires_worker_thread(), move || {
            target.read_properties(&call_ctx, sink)
        })
        .await
        .map_err(|e| ResourceError::internal("readProperties failed").with_cause(e))?;
        rx.collect()
            .await
            .map_err(|e| ResourceError::internal("readProperties failed").with_cause(e))
    }

    pub async fn read_members(
        &self,
        resource: &Arc<dyn Resource>,
        ctx: &RequestContext,
    ) -> Result<Vec<Arc<dyn Resource>>, ResourceError> {
        let (sink, rx) = ResourceSink::channel();
        let (target, call_ctx) = (resource.clone(), ctx.clone());
        self.execute(resource.requires_worker_thread(), move || {
            target.read_members(&call_ctx, sink)
        })
        .await
        .map_err(|e| ResourceError::internal("readMembers failed").with_cause(e))?;
        rx.collect()
            .await
            .map_err(|e| ResourceError::internal("readMembers failed").with_cause(e))
    }

    /// Start streaming a binary resource's content. The reader always runs on
    /// a worker because the sink blocks between chunks.
    pub fn stream_content(
        &self,
        binary: Arc<dyn BinaryResource>,
        ctx: &RequestContext,
    ) -> BinaryContentStream {
        let (sink, stream) = BinaryContentSink::channel();
        let ctx = ctx.clone();
        self.workers.spawn(move || binary.read_content(&ctx, sink));
        stream
    }

    /// Decoded request state, reading the body first if it is still pending.
    async fn request_state(&self, ctx: &RequestContext) -> Result<ResourceState, ResourceError> {
        if let Some(body) = ctx.take_body() {
            let buffer = self.buffers.acquire().await?;
            let content = BodyAccumulator::new(body, buffer, self.max_request_size)
                .read_all()
                .await?;
            ctx.with_state(|lazy| lazy.set_content(content));
        }
        let state = ctx
            .with_state(|lazy| lazy.state().map(|s| s.clone()))
            .transpose()?;
        Ok(state.unwrap_or_default())
    }

    async fn update_binary(
        &self,
        blocking: bool,
        binary: Arc<dyn BinaryResource>,
        ctx: &RequestContext,
    ) -> ResourceOutcome {
        let (responder, pending) = Responder::new("updateContent");

        let gate = {
            let (binary, ctx) = (binary.clone(), ctx.clone());
            self.execute(blocking, move || binary.will_process_update(&ctx, responder))
                .await
        };
        let mut responder = match gate {
            Ok(Some(responder)) => responder,
            Ok(None) => return pending.outcome().await,
            Err(err) => {
                tracing::error!(error = %err, "willProcessUpdate dispatch failed");
                return pending.outcome().await;
            }
        };

        let Some(body) = ctx.take_body() else {
            responder.internal_error("request body was already consumed");
            return pending.outcome().await;
        };
        let buffer = match self.buffers.acquire().await {
            Ok(buffer) => buffer,
            Err(err) => {
                responder.error(err.into());
                return pending.outcome().await;
            }
        };
        let mut accumulator = BodyAccumulator::new(body, buffer, self.max_request_size);

        loop {
            let chunk = match accumulator.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    responder.internal_error("body ended without a final chunk");
                    break;
                }
                Err(err) => {
                    tracing::error!(error = %err, request_id = ctx.request_id(), "Binary body read failed");
                    responder.error(err.into());
                    break;
                }
            };
            let complete = chunk.complete;
            let (target, call_ctx) = (binary.clone(), ctx.clone());
            let next = self
                .execute(blocking, move || target.update_content(&call_ctx, chunk, responder))
                .await;
            match next {
                Ok(Some(unresolved)) if complete => {
                    unresolved.internal_error("binary resource kept the responder after the final chunk");
                    break;
                }
                Ok(Some(unresolved)) => responder = unresolved,
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(error = %err, "updateContent dispatch failed");
                    break;
                }
            }
        }

        let total = accumulator.bytes_read();
        ctx.with_state(|lazy| lazy.mark_streamed(total));
        pending.outcome().await
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::RequestBody;
    use crate::codec::ResourceCodecManager;
    use crate::error::ErrorKind;
    use crate::request::{MediaType, RequestType};
    use crate::resource::memory::{InMemoryBinary, InMemoryCollection};
    use crate::resource::{LazyResourceState, ResourcePath};
    use bytes::Bytes;

    fn dispatcher(limit: usize) -> Dispatcher {
        Dispatcher::new(WorkerPool::new(2), BufferPool::new(4, limit), limit)
    }

    fn body_ctx(request_type: RequestType, body: &'static [u8]) -> RequestContext {
        let codecs = Arc::new(ResourceCodecManager::with_defaults());
        RequestContext::builder(request_type, ResourcePath::parse("/coll"))
            .body(RequestBody::full(Bytes::from_static(body)))
            .state(LazyResourceState::new(codecs, MediaType::json()))
            .build()
    }

    #[tokio::test]
    async fn create_decodes_body_into_member() {
        let root = InMemoryCollection::root();
        let coll: Arc<dyn Resource> = root.add_collection("coll");
        let ctx = body_ctx(RequestType::Create, br#"{"id":"x","name":"n"}"#);
        let outcome = dispatcher(1024).create(&coll, &ctx).await;
        match outcome {
            ResourceOutcome::Created(r) => assert_eq!(r.id(), "x"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn oversized_body_never_reaches_the_resource() {
        let root = InMemoryCollection::root();
        let coll = root.add_collection("coll");
        let as_resource: Arc<dyn Resource> = coll.clone();
        let ctx = body_ctx(RequestType::Create, br#"{"id":"x","name":"a long enough name"}"#);
        let outcome = dispatcher(16).create(&as_resource, &ctx).await;
        assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::InvalidRequest));
        assert!(coll.is_empty());
    }

    #[tokio::test]
    async fn binary_update_streams_on_a_worker() {
        let blob = InMemoryBinary::root("b", MediaType::octet_stream(), Vec::new());
        let target: Arc<dyn Resource> = blob.clone();
        let ctx = body_ctx(RequestType::Update, b"0123456789");
        let outcome = dispatcher(4).update(&target, &ctx).await;
        assert!(matches!(outcome, ResourceOutcome::Updated(_)));
        assert_eq!(&blob.content()[..], b"0123456789");
        assert_eq!(ctx.with_state(|s| s.has_big_content()), Some(true));
    }

    #[tokio::test]
    async fn binary_content_streams_back() {
        let blob = InMemoryBinary::root("b", MediaType::octet_stream(), vec![7u8; 20_000]);
        let ctx = body_ctx(RequestType::Read, b"");
        let mut stream = dispatcher(64).stream_content(blob, &ctx);
        let mut total = 0;
        while let Some(chunk) = stream.next_chunk().await {
            total += chunk.len();
        }
        assert_eq!(total, 20_000);
    }

    struct Exploding;

    impl Resource for Exploding {
        fn id(&self) -> &str {
            "exploding"
        }
        fn read_properties(self: Arc<Self>, _ctx: &RequestContext, _sink: PropertySink) {
            panic!("properties unavailable");
        }
        fn read_member(self: Arc<Self>, _ctx: &RequestContext, _id: &str, _responder: Responder) {
            panic!("member lookup failed");
        }
    }

    #[tokio::test]
    async fn inline_panics_become_internal_errors() {
        let target: Arc<dyn Resource> = Arc::new(Exploding);
        let ctx = body_ctx(RequestType::Read, b"");
        let dispatcher = dispatcher(64);

        let outcome = dispatcher.read_member(&target, &ctx, "x").await;
        assert_eq!(outcome.error().map(|e| e.kind()), Some(ErrorKind::InternalError));

        let err = dispatcher.read_properties(&target, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalError);

        let result = dispatcher.execute(false, || -> u8 { panic!("boom") }).await;
        assert!(matches!(result, Err(DispatchError::Worker(msg)) if msg == "boom"));
    }
}

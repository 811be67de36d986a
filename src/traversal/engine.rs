//! Walks a [`TraversalPlan`] against the resource tree.

use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::error::{ErrorKind, ResourceError};
use crate::request::RequestContext;
use crate::resource::{Resource, ResourceOutcome};
use crate::traversal::{Step, TraversalPlan};

#[derive(Debug, Clone)]
pub struct TraversalEngine {
    dispatcher: Dispatcher,
}

impl TraversalEngine {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Resolve the request path below `root` and apply the request's
    /// operation to the resolved resource.
    ///
    /// An update whose target does not exist is turned into a create of that
    /// id against the resource that reported the miss.
    pub async fn traverse(&self, root: Arc<dyn Resource>, ctx: &RequestContext) -> ResourceOutcome {
        let mut plan = TraversalPlan::new(ctx.request_type(), ctx.path());
        let mut current = root;
        // Id the request state is relabelled to once an update became a create.
        let mut created_id: Option<String> = None;
        let mut index = 0;

        while let Some(step) = plan.steps().get(index).cloned() {
            tracing::debug!(
                request_id = ctx.request_id(),
                step = ?step,
                resource = %current.uri(),
                "Traversal step"
            );
            match step {
                Step::Read(id) => {
                    let outcome = self.dispatcher.read_member(&current, ctx, &id).await;
                    match outcome {
                        ResourceOutcome::Error(err) if err.kind() == ErrorKind::NoSuchResource => {
                            let update_follows = index + 2 == plan.steps().len()
                                && plan.steps().get(index + 1) == Some(&Step::Update);
                            if !update_follows {
                                return ResourceOutcome::Error(ResourceError::no_such_resource(id));
                            }
                            tracing::debug!(
                                request_id = ctx.request_id(),
                                id = %id,
                                "Update target missing, creating it"
                            );
                            plan.remove(index);
                            plan.replace(index, Step::Create);
                            created_id = Some(id);
                        }
                        ResourceOutcome::Error(err) => return ResourceOutcome::Error(err),
                        outcome => match outcome.resource() {
                            Some(next) => {
                                current = next.clone();
                                index += 1;
                            }
                            None => return ResourceOutcome::Error(ResourceError::no_such_resource(id)),
                        },
                    }
                }
                Step::Create => {
                    return match created_id.as_deref() {
                        Some(id) => self.dispatcher.create_as(&current, ctx, id).await,
                        None => self.dispatcher.create(&current, ctx).await,
                    };
                }
                Step::Update => {
                    let outcome = self.dispatcher.update(&current, ctx).await;
                    match outcome {
                        ResourceOutcome::Error(err) if err.kind() == ErrorKind::NoSuchResource => {
                            let id = err
                                .resource_id()
                                .unwrap_or_else(|| current.id())
                                .to_string();
                            plan.replace(index, Step::Create);
                            created_id = Some(id);
                        }
                        outcome => return outcome,
                    }
                }
                Step::Delete => return self.dispatcher.delete(&current, ctx).await,
            }
        }

        ResourceOutcome::Read(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BufferPool, RequestBody};
    use crate::codec::ResourceCodecManager;
    use crate::dispatch::WorkerPool;
    use crate::request::{MediaType, RequestType};
    use crate::resource::memory::InMemoryCollection;
    use crate::resource::{LazyResourceState, ResourcePath, Responder, ResourceState};
    use bytes::Bytes;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine() -> TraversalEngine {
        let dispatcher = Dispatcher::new(WorkerPool::new(2), BufferPool::new(4, 4096), 4096);
        TraversalEngine::new(dispatcher)
    }

    fn request(request_type: RequestType, path: &str, body: Option<&'static str>) -> RequestContext {
        let mut builder = RequestContext::builder(request_type, ResourcePath::parse(path));
        if let Some(body) = body {
            let codecs = Arc::new(ResourceCodecManager::with_defaults());
            builder = builder
                .body(RequestBody::full(Bytes::from_static(body.as_bytes())))
                .state(LazyResourceState::new(codecs, MediaType::json()));
        }
        builder.build()
    }

    #[tokio::test]
    async fn put_to_missing_member_creates_it() {
        let root = InMemoryCollection::root();
        let coll = root.add_collection("coll");
        let ctx = request(RequestType::Update, "/coll/x", Some(r#"{"name":"n"}"#));
        let outcome = engine().traverse(root.clone(), &ctx).await;
        match outcome {
            ResourceOutcome::Created(r) => {
                assert_eq!(r.id(), "x");
                assert_eq!(r.uri().to_string(), "/coll/x");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(coll.len(), 1);
    }

    #[tokio::test]
    async fn put_to_existing_member_updates_it() {
        let root = InMemoryCollection::root();
        let coll = root.add_collection("coll");
        let mut seed = ResourceState::with_id("x");
        seed.put_property("name", "old");
        coll.add_object(seed);
        let ctx = request(RequestType::Update, "/coll/x", Some(r#"{"name":"new"}"#));
        let outcome = engine().traverse(root.clone(), &ctx).await;
        assert!(matches!(outcome, ResourceOutcome::Updated(_)), "{:?}", outcome);
    }

    #[tokio::test]
    async fn missing_intermediate_segment_names_that_segment() {
        let root = InMemoryCollection::root();
        root.add_collection("coll");
        let ctx = request(RequestType::Update, "/nope/x", Some("{}"));
        let outcome = engine().traverse(root.clone(), &ctx).await;
        let err = outcome.error().expect("error");
        assert_eq!(err.kind(), ErrorKind::NoSuchResource);
        assert_eq!(err.resource_id(), Some("nope"));
    }

    #[tokio::test]
    async fn get_of_missing_member_is_not_found() {
        let root = InMemoryCollection::root();
        root.add_collection("coll");
        let outcome = engine()
            .traverse(root.clone(), &request(RequestType::Read, "/coll/ghost", None))
            .await;
        assert_eq!(outcome.error().and_then(|e| e.resource_id()), Some("ghost"));
    }

    #[tokio::test]
    async fn update_reporting_miss_creates_under_the_reporter() {
        struct Vanishing {
            inner: Arc<InMemoryCollection>,
        }
        impl Resource for Vanishing {
            fn id(&self) -> &str {
                "v"
            }
            fn update_properties(
                self: Arc<Self>,
                _ctx: &RequestContext,
                _state: ResourceState,
                responder: Responder,
            ) {
                responder.no_such_resource("gone");
            }
            fn create_member(self: Arc<Self>, ctx: &RequestContext, state: ResourceState, responder: Responder) {
                self.inner.clone().create_member(ctx, state, responder);
            }
        }
        let inner = InMemoryCollection::new("v");
        let root: Arc<dyn Resource> = Arc::new(Vanishing { inner: inner.clone() });
        let ctx = request(RequestType::Update, "/", Some(r#"{"name":"n"}"#));
        let outcome = engine().traverse(root.clone(), &ctx).await;
        assert_eq!(outcome.resource().map(|r| r.id().to_string()), Some("gone".into()));
        assert!(inner.member("gone").is_some());
    }

    #[tokio::test]
    async fn delete_reaches_the_target() {
        let root = InMemoryCollection::root();
        let coll = root.add_collection("coll");
        coll.add_object(ResourceState::with_id("x"));
        let outcome = engine()
            .traverse(root.clone(), &request(RequestType::Delete, "/coll/x", None))
            .await;
        assert!(matches!(outcome, ResourceOutcome::Deleted(_)));
        assert!(coll.is_empty());
    }

    #[derive(Debug, Clone, Copy)]
    enum Behaviour {
        Answer,
        Fail,
        Forget,
        Deferred,
    }

    #[derive(Default)]
    struct Counters {
        calls: AtomicUsize,
        answers: AtomicUsize,
    }

    /// Fake resource that answers every capability the scripted way and
    /// counts what it did.
    struct Scripted {
        id: String,
        behaviour: Behaviour,
        blocking: bool,
        counters: Arc<Counters>,
    }

    impl Scripted {
        fn child(&self, id: &str) -> Arc<Scripted> {
            Arc::new(Scripted {
                id: id.to_string(),
                behaviour: self.behaviour,
                blocking: self.blocking,
                counters: self.counters.clone(),
            })
        }

        fn act(&self, responder: Responder, answer: impl FnOnce(Responder) + Send + 'static) {
            self.counters.calls.fetch_add(1, Ordering::SeqCst);
            let counters = self.counters.clone();
            match self.behaviour {
                Behaviour::Answer => {
                    counters.answers.fetch_add(1, Ordering::SeqCst);
                    answer(responder);
                }
                Behaviour::Fail => {
                    counters.answers.fetch_add(1, Ordering::SeqCst);
                    responder.invalid_request("scripted failure");
                }
                Behaviour::Forget => drop(responder),
                Behaviour::Deferred => {
                    std::thread::spawn(move || {
                        counters.answers.fetch_add(1, Ordering::SeqCst);
                        answer(responder);
                    });
                }
            }
        }
    }

    impl Resource for Scripted {
        fn id(&self) -> &str {
            &self.id
        }
        fn requires_worker_thread(&self) -> bool {
            self.blocking
        }
        fn read_member(self: Arc<Self>, _ctx: &RequestContext, id: &str, responder: Responder) {
            let child: Arc<dyn Resource> = self.child(id);
            self.act(responder, move |r| r.resource_read(child));
        }
        fn create_member(self: Arc<Self>, _ctx: &RequestContext, _s: ResourceState, responder: Responder) {
            let child: Arc<dyn Resource> = self.child("new");
            self.act(responder, move |r| r.resource_created(child));
        }
        fn update_properties(self: Arc<Self>, _ctx: &RequestContext, _s: ResourceState, responder: Responder) {
            let me: Arc<dyn Resource> = self.clone();
            self.act(responder, move |r| r.resource_updated(me));
        }
        fn delete(self: Arc<Self>, _ctx: &RequestContext, responder: Responder) {
            let me: Arc<dyn Resource> = self.clone();
            self.act(responder, move |r| r.resource_deleted(me));
        }
    }

    fn behaviour() -> impl Strategy<Value = Behaviour> {
        prop_oneof![
            Just(Behaviour::Answer),
            Just(Behaviour::Fail),
            Just(Behaviour::Forget),
            Just(Behaviour::Deferred),
        ]
    }

    fn request_type() -> impl Strategy<Value = RequestType> {
        prop_oneof![
            Just(RequestType::Create),
            Just(RequestType::Read),
            Just(RequestType::Update),
            Just(RequestType::Delete),
        ]
    }

    proptest! {
        #[test]
        fn every_invocation_resolves_exactly_once(
            script in proptest::collection::vec((request_type(), behaviour(), any::<bool>()), 1..12),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let engine = engine();
            for (request_type, behaviour, blocking) in script {
                let counters = Arc::new(Counters::default());
                let root: Arc<dyn Resource> = Arc::new(Scripted {
                    id: String::new(),
                    behaviour,
                    blocking,
                    counters: counters.clone(),
                });
                let ctx = request(request_type, "/child", None);
                let outcome = runtime.block_on(engine.traverse(root, &ctx));

                let calls = counters.calls.load(Ordering::SeqCst);
                match behaviour {
                    Behaviour::Answer | Behaviour::Deferred => {
                        let expected = if request_type == RequestType::Read { 1 } else { 2 };
                        prop_assert_eq!(calls, expected);
                        prop_assert_eq!(counters.answers.load(Ordering::SeqCst), calls);
                        prop_assert!(outcome.error().is_none(), "{:?}", outcome);
                    }
                    Behaviour::Fail => {
                        prop_assert_eq!(calls, 1);
                        prop_assert_eq!(
                            outcome.error().map(|e| e.kind()),
                            Some(ErrorKind::InvalidRequest)
                        );
                    }
                    Behaviour::Forget => {
                        prop_assert_eq!(calls, 1);
                        prop_assert_eq!(counters.answers.load(Ordering::SeqCst), 0);
                        prop_assert_eq!(
                            outcome.error().map(|e| e.kind()),
                            Some(ErrorKind::InternalError)
                        );
                    }
                }
            }
        }
    }
}

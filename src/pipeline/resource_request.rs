//! [`RequestContext`] → [`ResourceResponse`] via the traversal engine.

use std::sync::Arc;

use crate::pipeline::{Continuation, Payload, Processor};
use crate::resource::{Resource, ResourceResponse};
use crate::traversal::TraversalEngine;

pub struct ResourceRequestProcessor {
    root: Arc<dyn Resource>,
    engine: TraversalEngine,
}

impl ResourceRequestProcessor {
    pub fn new(root: Arc<dyn Resource>, engine: TraversalEngine) -> Self {
        Self { root, engine }
    }
}

impl Processor for ResourceRequestProcessor {
    fn name(&self) -> &'static str {
        "resource-request"
    }

    fn process(&self, payload: Payload) -> Continuation {
        let Payload::Request(ctx) = payload else {
            return Continuation::Proceed(payload);
        };
        let (root, engine) = (self.root.clone(), self.engine.clone());
        Continuation::Suspend(Box::pin(async move {
            let outcome = engine.traverse(root, &ctx).await;
            tracing::debug!(
                request_id = ctx.request_id(),
                request_type = %ctx.request_type(),
                outcome = ?outcome,
                "Resource operation finished"
            );
            Continuation::Proceed(Payload::Response(ResourceResponse::from_outcome(ctx, outcome)))
        }))
    }
}

//! Ordered request processing chain.
//!
//! # Data Flow
//! ```text
//! axum Request
//!     → http_request.rs     Exchange  → Request(RequestContext)
//!     → resource_request.rs Request   → Response(ResourceResponse)   [traversal]
//!     → response_body.rs    Response  → Response + state             [encoding walk]
//!     → http_response.rs    Response  → Reply(axum Response)         [codec, status]
//! ```
//!
//! # Design Decisions
//! - Stages are an array plus a cursor. `PipelineRun::proceed` is the only
//!   way to reach the next stage and advances the cursor by exactly one.
//! - A stage that must wait returns `Continuation::Suspend`; the future's
//!   result is handled as if the same stage had returned it, so re-entry
//!   resumes at the right cursor position.
//! - One request runs one stage at a time.
//! - A stage passes through payloads it does not consume.

pub mod http_request;
pub mod http_response;
pub mod resource_request;
pub mod response_body;

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;

use crate::request::RequestContext;
use crate::resource::ResourceResponse;

pub use http_request::HttpRequestProcessor;
pub use http_response::HttpResponseProcessor;
pub use resource_request::ResourceRequestProcessor;
pub use response_body::ResponseBodyProcessor;

/// Value handed from one stage to the next.
pub enum Payload {
    /// Raw transport request.
    Exchange(Request<Body>),
    Request(RequestContext),
    Response(ResourceResponse),
    /// Finished transport response.
    Reply(Response),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Exchange(_) => "exchange",
            Payload::Request(_) => "request",
            Payload::Response(_) => "response",
            Payload::Reply(_) => "reply",
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// What a stage wants to happen next.
pub enum Continuation {
    /// Hand the payload to the next stage.
    Proceed(Payload),
    /// Wait, then handle the result as this stage's answer.
    Suspend(BoxFuture<'static, Continuation>),
    /// Flush to the transport and stop.
    Reply(Response),
}

pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(&self, payload: Payload) -> Continuation;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline ended while holding a {payload} payload")]
    Exhausted { payload: &'static str },

    #[error("stage {stage} cannot handle a {payload} payload")]
    Unexpected {
        stage: &'static str,
        payload: &'static str,
    },
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Pipeline defect");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

/// Immutable stage list shared by all requests.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Processor>]>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Processor>>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Cursor positioned before the first stage.
    pub fn start(&self) -> PipelineRun {
        PipelineRun {
            stages: self.stages.clone(),
            cursor: None,
        }
    }

    pub async fn handle(&self, request: Request<Body>) -> Response {
        self.start().run(Payload::Exchange(request)).await
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// One request's walk through the stages.
pub struct PipelineRun {
    stages: Arc<[Arc<dyn Processor>]>,
    cursor: Option<usize>,
}

impl PipelineRun {
    /// Index of the stage that last received a payload.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Advance exactly one stage and let it process `payload`.
    pub fn proceed(&mut self, payload: Payload) -> Result<Continuation, PipelineError> {
        let next = self.cursor.map_or(0, |c| c + 1);
        let Some(stage) = self.stages.get(next) else {
            return Err(PipelineError::Exhausted {
                payload: payload.kind(),
            });
        };
        self.cursor = Some(next);
        tracing::debug!(stage = stage.name(), payload = payload.kind(), "Pipeline stage");
        Ok(stage.process(payload))
    }

    /// Drive the run to completion.
    pub async fn run(mut self, payload: Payload) -> Response {
        let mut next = match self.proceed(payload) {
            Ok(next) => next,
            Err(err) => return err.into_response(),
        };
        loop {
            next = match next {
                Continuation::Proceed(Payload::Reply(reply)) | Continuation::Reply(reply) => {
                    return reply
                }
                Continuation::Proceed(payload) => match self.proceed(payload) {
                    Ok(next) => next,
                    Err(err) => return err.into_response(),
                },
                Continuation::Suspend(pending) => pending.await,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts its invocations and forwards, optionally after a suspension.
    struct Counting {
        name: &'static str,
        suspend: bool,
        hits: Arc<AtomicUsize>,
    }

    impl Processor for Counting {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process(&self, payload: Payload) -> Continuation {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if self.suspend {
                Continuation::Suspend(Box::pin(async move {
                    tokio::task::yield_now().await;
                    Continuation::Proceed(payload)
                }))
            } else {
                Continuation::Proceed(payload)
            }
        }
    }

    struct Terminal;

    impl Processor for Terminal {
        fn name(&self) -> &'static str {
            "terminal"
        }

        fn process(&self, payload: Payload) -> Continuation {
            Continuation::Reply((StatusCode::OK, payload.kind()).into_response())
        }
    }

    fn counting(name: &'static str, suspend: bool) -> (Arc<dyn Processor>, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let stage = Arc::new(Counting {
            name,
            suspend,
            hits: hits.clone(),
        });
        (stage, hits)
    }

    #[tokio::test]
    async fn each_stage_runs_once_in_order_across_suspension() {
        let (a, a_hits) = counting("a", false);
        let (b, b_hits) = counting("b", true);
        let pipeline = Pipeline::new(vec![a, b, Arc::new(Terminal)]);
        assert_eq!(pipeline.stage_names(), vec!["a", "b", "terminal"]);

        let request = Request::new(Body::empty());
        let response = pipeline.handle(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(a_hits.load(Ordering::SeqCst), 1);
        assert_eq!(b_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn proceed_advances_one_stage_at_a_time() {
        let (a, _) = counting("a", false);
        let pipeline = Pipeline::new(vec![a]);
        let mut run = pipeline.start();
        assert_eq!(run.cursor(), None);
        let next = run.proceed(Payload::Exchange(Request::new(Body::empty()))).unwrap();
        assert_eq!(run.cursor(), Some(0));
        let Continuation::Proceed(payload) = next else {
            panic!("expected proceed");
        };
        let err = run.proceed(payload).err().unwrap();
        assert_eq!(err, PipelineError::Exhausted { payload: "exchange" });
    }

    #[tokio::test]
    async fn running_off_the_end_is_a_server_error() {
        let (a, _) = counting("a", true);
        let response = Pipeline::new(vec![a]).handle(Request::new(Body::empty())).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

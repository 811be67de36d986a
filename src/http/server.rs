//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Assemble the shared machinery: codecs, buffer pool, worker pool,
//!   dispatcher and the processing pipeline
//! - Create the Axum router with a single catch-all handler
//! - Wire up middleware (timeout, request ID, tracing)
//! - Serve until the shutdown channel fires

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Request, State},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::body::BufferPool;
use crate::codec::ResourceCodecManager;
use crate::config::GatewayConfig;
use crate::dispatch::{Dispatcher, WorkerPool};
use crate::encoding::EncodingDriver;
use crate::http::request::{propagate_request_id_layer, request_id_of, set_request_id_layer};
use crate::observability::metrics;
use crate::pipeline::{
    HttpRequestProcessor, HttpResponseProcessor, Pipeline, Processor, ResourceRequestProcessor,
    ResponseBodyProcessor,
};
use crate::resource::Resource;
use crate::traversal::TraversalEngine;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
}

/// HTTP front end serving one resource tree.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
}

impl GatewayServer {
    /// Create a server exposing `root` with the given configuration.
    pub fn new(config: GatewayConfig, root: Arc<dyn Resource>) -> Self {
        Self::with_codecs(config, root, ResourceCodecManager::with_defaults())
    }

    /// Like [`new`](Self::new) with a custom codec registry.
    pub fn with_codecs(
        config: GatewayConfig,
        root: Arc<dyn Resource>,
        codecs: ResourceCodecManager,
    ) -> Self {
        let pipeline = build_pipeline(&config, root, Arc::new(codecs));
        tracing::debug!(stages = ?pipeline.stage_names(), "Pipeline assembled");
        let router = Self::build_router(&config, AppState { pipeline });
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(resource_handler))
            .route("/", any(resource_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

fn build_pipeline(
    config: &GatewayConfig,
    root: Arc<dyn Resource>,
    codecs: Arc<ResourceCodecManager>,
) -> Pipeline {
    let limits = &config.limits;
    let buffers = BufferPool::new(limits.buffers_per_region, limits.buffer_size());
    let workers = WorkerPool::new(config.workers.max_blocking);
    let dispatcher = Dispatcher::new(workers, buffers, limits.max_request_size);

    let stages: Vec<Arc<dyn Processor>> = vec![
        Arc::new(HttpRequestProcessor::new(codecs.clone())),
        Arc::new(ResourceRequestProcessor::new(
            root,
            TraversalEngine::new(dispatcher.clone()),
        )),
        Arc::new(ResponseBodyProcessor::new(EncodingDriver::new(dispatcher.clone()))),
        Arc::new(HttpResponseProcessor::new(
            codecs,
            dispatcher,
            limits.max_response_size,
        )),
    ];
    Pipeline::new(stages)
}

async fn resource_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let request_id = request_id_of(&request).unwrap_or("-").to_string();
    let path = request.uri().path().to_string();

    let response = state.pipeline.handle(request).await;

    let status = response.status();
    metrics::record_request(&method, status.as_u16(), start);
    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = status.as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );
    response
}

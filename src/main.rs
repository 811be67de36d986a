//! Resource Gateway
//!
//! Serves a tree of resources over HTTP with content negotiation, field
//! projection, pagination and streamed binary content.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────────┐
//!                        │                  RESOURCE GATEWAY                  │
//!                        │                                                    │
//!   Client Request       │  ┌─────────┐   ┌──────────────┐   ┌────────────┐  │
//!   ─────────────────────┼─▶│  http   │──▶│ http_request │──▶│ traversal  │  │
//!                        │  │ server  │   │   (context)  │   │  engine    │  │
//!                        │  └─────────┘   └──────────────┘   └─────┬──────┘  │
//!                        │                                         │         │
//!                        │                      dispatcher ◀───────┤         │
//!                        │                   (inline / worker)     ▼         │
//!                        │                                   ┌────────────┐  │
//!                        │                                   │  resource  │  │
//!                        │                                   │    tree    │  │
//!                        │                                   └─────┬──────┘  │
//!   Client Response      │  ┌─────────┐   ┌──────────────┐   ┌─────▼──────┐  │
//!   ◀────────────────────┼──│ codecs  │◀──│http_response │◀──│  encoding  │  │
//!                        │  │json/html│   │(status, body)│   │   driver   │  │
//!                        │  └─────────┘   └──────────────┘   └────────────┘  │
//!                        │                                                    │
//!                        │  config · observability · lifecycle · buffer pool  │
//!                        └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use resource_gateway::config::{load_config, GatewayConfig};
use resource_gateway::http::GatewayServer;
use resource_gateway::lifecycle::{wait_for_signal, Shutdown};
use resource_gateway::observability::{init_logging, metrics};
use resource_gateway::request::MediaType;
use resource_gateway::resource::memory::InMemoryCollection;
use resource_gateway::resource::ResourceState;

#[derive(Parser)]
#[command(name = "resource-gateway")]
#[command(about = "HTTP gateway for a tree of resources", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability.log_level, config.observability.log_format)?;

    tracing::info!("resource-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_request_size = config.limits.max_request_size,
        max_response_size = config.limits.max_response_size,
        max_blocking = config.workers.max_blocking,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let server = GatewayServer::new(config, sample_tree());
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Starter tree served when no other resources are wired in.
fn sample_tree() -> std::sync::Arc<InMemoryCollection> {
    let root = InMemoryCollection::root();

    let people = root.add_collection("people");
    for (id, name) in [("ada", "Ada"), ("grace", "Grace"), ("linus", "Linus")] {
        let mut state = ResourceState::with_id(id);
        state.put_property("name", name);
        people.add_object(state);
    }

    let files = root.add_collection("files");
    files.add_binary("readme", MediaType::new("text", "plain"), "Upload files with POST or PUT.\n");

    root
}

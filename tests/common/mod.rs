//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;

use resource_gateway::config::GatewayConfig;
use resource_gateway::http::GatewayServer;
use resource_gateway::lifecycle::Shutdown;
use resource_gateway::resource::memory::InMemoryCollection;
use resource_gateway::resource::ResourceState;
use tokio::net::TcpListener;

/// A gateway serving an in-memory tree on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub root: Arc<InMemoryCollection>,
    pub client: reqwest::Client,
    shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway with default limits over `root`.
pub async fn start_gateway(root: Arc<InMemoryCollection>) -> TestGateway {
    start_gateway_with(GatewayConfig::default(), root).await
}

pub async fn start_gateway_with(config: GatewayConfig, root: Arc<InMemoryCollection>) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config, root.clone());
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    TestGateway {
        addr,
        root,
        client,
        shutdown,
    }
}

/// Root with a `people` collection holding the given ids, each named after
/// its id.
#[allow(dead_code)]
pub fn people(ids: &[&str]) -> Arc<InMemoryCollection> {
    let root = InMemoryCollection::root();
    let people = root.add_collection("people");
    for id in ids {
        let mut state = ResourceState::with_id(*id);
        state.put_property("name", *id);
        people.add_object(state);
    }
    root.add_collection("files");
    root
}

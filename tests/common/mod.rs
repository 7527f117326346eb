//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use trellis::bridge::BridgeRegistry;
use trellis::config::TrellisConfig;
use trellis::{HttpServer, MemorySessionStore, Router, SessionData, SessionStore, Shutdown};

/// A server running on an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub registry: BridgeRegistry,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server task to finish.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

/// Start `routes` with the default configuration.
pub async fn start_server(routes: Router) -> TestServer {
    start_server_with(TrellisConfig::default(), routes).await
}

/// Start `routes` with `config`; the bind address is always 127.0.0.1:0.
pub async fn start_server_with(config: TrellisConfig, routes: Router) -> TestServer {
    let sessions: Arc<dyn SessionStore<SessionData>> =
        Arc::new(MemorySessionStore::<SessionData>::from_config(&config.sessions));
    let server = HttpServer::new(&config, routes, sessions);
    let registry = server.registry().clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.clone()));

    TestServer {
        addr,
        shutdown,
        registry,
        handle,
    }
}

/// Poll `condition` until it holds, failing after two seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

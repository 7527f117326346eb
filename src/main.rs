//! Trellis demo server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ axum (trace, timeout) ──▶ Dispatcher ──▶ Router.find_routes(path)
//!                                              │
//!                       ┌──────────────────────┼───────────────────────┐
//!                       ▼                      ▼                       ▼
//!                  middleware             terminal                upgrade
//!                 (pass / finish)         (respond)          (Bridge ⇄ Endpoint)
//!                       │                      │
//!                       └──── SessionStore ────┘
//! ```
//!
//! Routes:
//! - `/*` middleware adds `x-powered-by`
//! - `/hello/:name` greets, `?shout` upper-cases
//! - `/ping` answers `pong`
//! - `/login/:user`, `/whoami`, `/logout` exercise sessions
//! - `/echo` WebSocket echo endpoint

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use trellis::bridge::{Endpoint, Socket};
use trellis::config::{load_config, TrellisConfig};
use trellis::lifecycle::{spawn_signal_listener, Shutdown};
use trellis::observability::{init_logging, init_metrics};
use trellis::{HttpServer, MemorySessionStore, Router, SessionData, SessionStore};

#[derive(Debug, Parser)]
#[command(name = "trellis", version, about = "Trellis demo server")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

/// Echoes every text message back to the sender.
struct Echo;

impl Endpoint for Echo {
    fn on_open(&mut self, socket: &Socket) {
        tracing::info!(socket_id = %socket.id(), hex = %socket.id_hex(), "Echo client connected");
    }

    fn on_message(&mut self, socket: &Socket, text: String) {
        if let Err(err) = socket.send_message(text) {
            tracing::warn!(socket_id = %socket.id(), error = %err, "Echo failed");
        }
    }

    fn on_close(&mut self, socket: &Socket) {
        tracing::info!(socket_id = %socket.id(), "Echo client disconnected");
    }
}

fn routes() -> Result<Router, trellis::routing::PatternError> {
    let mut router: Router = Router::new();
    router
        .middleware("/*", |_, res| {
            res.set_header("x-powered-by", "trellis")?;
            Ok(false)
        })?
        .on("/hello/:name", |req, res| {
            let name = req.param("name").unwrap_or("stranger");
            let greeting = format!("hi {name}");
            match req.query("shout") {
                Some(_) => res.write(&greeting.to_uppercase()),
                None => res.write(&greeting),
            }
            Ok(())
        })?
        .on("/ping", |_, res| {
            res.set_mime("text/plain")?;
            res.enable_cache(60);
            res.write("pong");
            Ok(())
        })?
        .on("/login/:user", |req, res| {
            let mut data = SessionData::new();
            data.insert("user".into(), req.param("user").unwrap_or_default().to_string());
            res.start_session(data);
            res.write("welcome");
            Ok(())
        })?
        .on("/whoami", |req, res| {
            let user = req.session().and_then(|data| data.get("user").cloned());
            res.json(&serde_json::json!({ "user": user }))?;
            Ok(())
        })?
        .on("/logout", |req, res| {
            res.stop_session(req);
            res.write("bye");
            Ok(())
        })?
        .websocket("/echo", |_| Some(Echo))?;
    Ok(router)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TrellisConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability);
    tracing::info!("trellis v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_body_size = config.http.max_body_size,
        session_cookie = %config.sessions.cookie_name,
        session_lifetime_secs = config.sessions.lifetime_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let sessions: Arc<dyn SessionStore<SessionData>> =
        Arc::new(MemorySessionStore::<SessionData>::from_config(&config.sessions));
    let server = HttpServer::new(&config, routes()?, sessions);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

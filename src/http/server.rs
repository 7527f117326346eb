//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the axum router with a single catch-all handler
//! - Wire up middleware (tracing, timeout)
//! - Buffer each request body up to the configured limit
//! - Run the dispatcher and either respond or complete the upgrade
//! - Start and stop the session sweeper with the server
//! - Close open WebSocket bridges on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Request as AxumRequest, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as AxumResponse};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::bridge::BridgeRegistry;
use crate::config::TrellisConfig;
use crate::http::dispatcher::{Dispatch, Dispatcher};
use crate::http::request::IncomingRequest;
use crate::http::websocket::serve_socket;
use crate::lifecycle::Shutdown;
use crate::routing::Router;
use crate::session::{SessionData, SessionStore};

/// Application state injected into the handler.
pub struct AppState<S = SessionData> {
    pub dispatcher: Dispatcher<S>,
    pub registry: BridgeRegistry,
    pub max_body_size: usize,
    pub max_message_size: usize,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            registry: self.registry.clone(),
            max_body_size: self.max_body_size,
            max_message_size: self.max_message_size,
        }
    }
}

/// HTTP front end for a route table.
pub struct HttpServer<S = SessionData> {
    router: axum::Router,
    state: AppState<S>,
}

impl<S: Send + Sync + 'static> HttpServer<S> {
    /// Freeze `routes` and build the server around them.
    pub fn new(
        config: &TrellisConfig,
        routes: Router<S>,
        sessions: Arc<dyn SessionStore<S>>,
    ) -> Self {
        let state = AppState {
            dispatcher: Dispatcher::new(routes, sessions),
            registry: BridgeRegistry::new(),
            max_body_size: config.http.max_body_size,
            max_message_size: config.websocket.max_message_size,
        };

        let router = Self::build_router(config, state.clone());
        Self { router, state }
    }

    /// Build the axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &TrellisConfig, state: AppState<S>) -> axum::Router {
        axum::Router::new()
            .fallback(dispatch_handler::<S>)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.http.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Registry of open WebSocket connections.
    pub fn registry(&self) -> &BridgeRegistry {
        &self.state.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher<S> {
        &self.state.dispatcher
    }

    /// Serve until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.state.dispatcher.router().len(),
            "HTTP server starting"
        );

        let sweeper = self
            .state
            .dispatcher
            .sessions()
            .spawn_sweeper(shutdown.subscribe());

        let registry = self.state.registry.clone();
        let stop = shutdown.subscribe();
        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                Shutdown::wait(stop).await;
                tracing::info!("Shutdown signal received");
                registry.close_all();
            })
            .await;

        // Also stops the sweeper when serving failed on its own.
        shutdown.trigger();
        if let Some(sweeper) = sweeper {
            if let Err(err) = sweeper.await {
                tracing::warn!(error = %err, "Session sweeper task failed");
            }
        }

        tracing::info!("HTTP server stopped");
        served
    }
}

/// Catch-all handler: buffer, dispatch, respond or upgrade.
async fn dispatch_handler<S: Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: AxumRequest,
) -> AxumResponse {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(
                path = %parts.uri.path(),
                limit = state.max_body_size,
                error = %err,
                "Request body rejected"
            );
            return (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD TOO LARGE").into_response();
        }
    };

    let uri = parts
        .uri
        .path_and_query()
        .map(|target| target.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let incoming = IncomingRequest {
        method: parts.method,
        uri,
        headers: parts.headers,
        body,
    };

    match state.dispatcher.dispatch(incoming) {
        Dispatch::Respond(response) => response.into_response(),
        Dispatch::Upgrade(bridge) => match upgrade {
            Ok(ws) => {
                let bridge = Arc::new(bridge);
                let registry = state.registry.clone();
                ws.max_message_size(state.max_message_size)
                    .on_upgrade(move |socket| serve_socket(socket, bridge, registry))
            }
            Err(rejection) => {
                tracing::info!(error = %rejection, "WebSocket handshake rejected");
                rejection.into_response()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use axum::body::Body;
    use tower::ServiceExt;

    fn server(config: &TrellisConfig) -> HttpServer {
        let mut routes: Router = Router::new();
        routes
            .on("/hello/:name", |req, res| {
                res.write(&format!("hi {}", req.param("name").unwrap_or_default()));
                Ok(())
            })
            .unwrap()
            .on("/echo-body", |req, res| {
                res.write(&req.text());
                Ok(())
            })
            .unwrap();
        let sessions: Arc<dyn SessionStore<SessionData>> =
            Arc::new(MemorySessionStore::<SessionData>::from_config(&config.sessions));
        HttpServer::new(config, routes, sessions)
    }

    async fn body_text(response: AxumResponse) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_catch_all_dispatches_any_path() {
        let server = server(&TrellisConfig::default());
        let response = server
            .router
            .clone()
            .oneshot(axum::http::Request::get("/hello/axum").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "hi axum");

        let missing = server
            .router
            .clone()
            .oneshot(axum::http::Request::get("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.headers()["connection"], "close");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let mut config = TrellisConfig::default();
        config.http.max_body_size = 8;
        let server = server(&config);

        let small = server
            .router
            .clone()
            .oneshot(axum::http::Request::post("/echo-body").body(Body::from("tiny")).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(small).await, "tiny");

        let request = axum::http::Request::post("/echo-body")
            .body(Body::from("far too large"))
            .unwrap();
        let large = server.router.clone().oneshot(request).await.unwrap();
        assert_eq!(large.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}

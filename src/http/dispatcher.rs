//! Request dispatch over the route table.
//!
//! # Responsibilities
//! - Walk the matches for a path in registration order
//! - Apply the per-kind policy (middleware may pass, terminal always ends,
//!   upgrade only applies to upgrade requests)
//! - Contain handler errors and panics per route attempt
//! - Fall back to `404 NOT FOUND`
//!
//! # Design Decisions
//! - Synchronous: handlers never await, the transport adapter does all I/O
//! - The response is checkpointed before each attempt and restored when the
//!   attempt fails, so a failed handler leaks no partial output; sessions
//!   it started are stopped
//! - An upgrade factory returning `None` answers `403 FORBIDDEN`

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, HeaderValue, StatusCode};

use crate::bridge::{Bridge, Endpoint};
use crate::error::{panic_message, BoxError, HandlerResult};
use crate::http::request::{IncomingRequest, Request};
use crate::http::response::Response;
use crate::observability::metrics;
use crate::routing::{Handler, HandlerKind, MatchedRoute, Router};
use crate::session::{SessionData, SessionStore};

/// Body of the fallback response.
pub const NOT_FOUND_BODY: &str = "NOT FOUND";

/// Body sent when an upgrade factory refuses the connection.
pub const FORBIDDEN_BODY: &str = "FORBIDDEN";

/// What the transport should do with a dispatched request.
pub enum Dispatch<S = SessionData> {
    /// Send this response.
    Respond(Response<S>),
    /// Complete the handshake and hand the connection to this bridge.
    Upgrade(Bridge),
}

impl<S> fmt::Debug for Dispatch<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Respond(response) => f.debug_tuple("Respond").field(response).finish(),
            Dispatch::Upgrade(bridge) => f.debug_tuple("Upgrade").field(bridge).finish(),
        }
    }
}

/// A handler attempt that did not fulfil the request.
#[derive(Debug, thiserror::Error)]
pub enum HandlerFailure {
    #[error("handler returned an error: {0}")]
    Error(BoxError),

    #[error("handler panicked: {0}")]
    Panic(String),
}

enum Step {
    Continue,
    Respond,
    Upgrade(Box<dyn Endpoint>),
    Reject,
}

/// Runs requests through a frozen [`Router`].
pub struct Dispatcher<S = SessionData> {
    router: Arc<Router<S>>,
    sessions: Arc<dyn SessionStore<S>>,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            router: Arc::clone(&self.router),
            sessions: Arc::clone(&self.sessions),
        }
    }
}

impl<S: 'static> Dispatcher<S> {
    pub fn new(router: Router<S>, sessions: Arc<dyn SessionStore<S>>) -> Self {
        Self {
            router: Arc::new(router),
            sessions,
        }
    }

    pub fn router(&self) -> &Router<S> {
        &self.router
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore<S>> {
        &self.sessions
    }

    /// Decide the outcome of one request.
    pub fn dispatch(&self, incoming: IncomingRequest) -> Dispatch<S> {
        let started = Instant::now();
        let mut request = Request::new(incoming, Arc::clone(&self.sessions));
        let mut response = Response::new(Arc::clone(&self.sessions));
        let path = request.path().to_string();

        tracing::debug!(method = %request.method(), path = %path, "Dispatching request");

        for MatchedRoute { route, params } in self.router.find_routes(&path) {
            let kind = route.handler().kind();
            if kind == HandlerKind::Upgrade && !request.is_upgrade() {
                tracing::trace!(
                    pattern = %route.pattern(),
                    "Skipping upgrade route for plain request"
                );
                continue;
            }

            request.set_params(params);
            let checkpoint = response.clone();

            let step = match route.handler() {
                Handler::Middleware(handler) => contain(|| handler(&request, &mut response))
                    .map(|handled| if handled { Step::Respond } else { Step::Continue }),
                Handler::Terminal(handler) => {
                    contain(|| handler(&request, &mut response)).map(|()| Step::Respond)
                }
                Handler::Upgrade(factory) => {
                    contain(|| Ok(factory(&request))).map(|endpoint| match endpoint {
                        Some(endpoint) => Step::Upgrade(endpoint),
                        None => Step::Reject,
                    })
                }
            };

            match step {
                Ok(Step::Continue) => {
                    tracing::trace!(pattern = %route.pattern(), "Middleware passed");
                }
                Ok(Step::Respond) => {
                    metrics::record_request("handled", response.status().as_u16(), started);
                    return Dispatch::Respond(response);
                }
                Ok(Step::Upgrade(endpoint)) => {
                    let bridge = Bridge::new(endpoint);
                    tracing::debug!(
                        pattern = %route.pattern(),
                        socket_id = %bridge.socket().id(),
                        "Upgrade accepted"
                    );
                    let status = StatusCode::SWITCHING_PROTOCOLS.as_u16();
                    metrics::record_request("upgraded", status, started);
                    return Dispatch::Upgrade(bridge);
                }
                Ok(Step::Reject) => {
                    tracing::info!(
                        pattern = %route.pattern(),
                        path = %path,
                        "Upgrade refused by endpoint factory"
                    );
                    let response = self.fixed(StatusCode::FORBIDDEN, FORBIDDEN_BODY);
                    metrics::record_request("rejected", response.status().as_u16(), started);
                    return Dispatch::Respond(response);
                }
                Err(failure) => {
                    tracing::warn!(
                        pattern = %route.pattern(),
                        path = %path,
                        kind = %kind,
                        error = %failure,
                        "Handler failed, trying next route"
                    );
                    metrics::record_handler_failure(kind.as_str());
                    response.roll_back_to(checkpoint);
                }
            }
        }

        tracing::debug!(path = %path, "No route fulfilled the request");
        let mut response = self.fixed(StatusCode::NOT_FOUND, NOT_FOUND_BODY);
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
        metrics::record_request("not_found", response.status().as_u16(), started);
        Dispatch::Respond(response)
    }

    fn fixed(&self, status: StatusCode, body: &str) -> Response<S> {
        let mut response = Response::new(Arc::clone(&self.sessions));
        response.set_status(status);
        response.write(body);
        response
    }
}

/// Run one handler attempt, turning errors and panics into a failure.
fn contain<T>(attempt: impl FnOnce() -> HandlerResult<T>) -> Result<T, HandlerFailure> {
    match panic::catch_unwind(AssertUnwindSafe(attempt)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(HandlerFailure::Error(err)),
        Err(payload) => Err(HandlerFailure::Panic(panic_message(&*payload))),
    }
}

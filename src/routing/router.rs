//! Route table and lookup.
//!
//! # Responsibilities
//! - Store compiled routes in registration order
//! - Pair every pattern with one handler kind (terminal, middleware, upgrade)
//! - Produce a lazy, restartable stream of matches for a path
//!
//! # Design Decisions
//! - Append-only before serving; immutable afterwards (thread-safe without locks)
//! - O(n) scan over routes (acceptable for typical route counts)
//! - No match yields an empty stream, never an error

use std::fmt;
use std::sync::Arc;

use crate::bridge::Endpoint;
use crate::error::HandlerResult;
use crate::http::{Request, Response};
use crate::routing::pattern::{Params, PatternError, RoutePattern};
use crate::session::SessionData;

/// Terminal handler: always ends dispatch with the response it produced.
pub type TerminalFn<S> = dyn Fn(&Request<S>, &mut Response<S>) -> HandlerResult + Send + Sync;

/// Middleware handler: returns `true` when the request is fully handled.
pub type MiddlewareFn<S> =
    dyn Fn(&Request<S>, &mut Response<S>) -> HandlerResult<bool> + Send + Sync;

/// Upgrade factory: creates the endpoint for an accepted connection,
/// or `None` to refuse the handshake.
pub type UpgradeFn<S> = dyn Fn(&Request<S>) -> Option<Box<dyn Endpoint>> + Send + Sync;

/// The handler attached to a route.
pub enum Handler<S = SessionData> {
    Terminal(Arc<TerminalFn<S>>),
    Middleware(Arc<MiddlewareFn<S>>),
    Upgrade(Arc<UpgradeFn<S>>),
}

/// Discriminant of [`Handler`], used for logging and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Terminal,
    Middleware,
    Upgrade,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Terminal => "terminal",
            HandlerKind::Middleware => "middleware",
            HandlerKind::Upgrade => "upgrade",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<S: 'static> Handler<S> {
    /// Wrap a terminal handler closure.
    pub fn terminal<F>(f: F) -> Self
    where
        F: Fn(&Request<S>, &mut Response<S>) -> HandlerResult + Send + Sync + 'static,
    {
        Handler::Terminal(Arc::new(f))
    }

    /// Wrap a middleware closure.
    pub fn middleware<F>(f: F) -> Self
    where
        F: Fn(&Request<S>, &mut Response<S>) -> HandlerResult<bool> + Send + Sync + 'static,
    {
        Handler::Middleware(Arc::new(f))
    }

    /// Wrap an endpoint factory.
    pub fn upgrade<F, E>(factory: F) -> Self
    where
        F: Fn(&Request<S>) -> Option<E> + Send + Sync + 'static,
        E: Endpoint,
    {
        Handler::Upgrade(Arc::new(move |req: &Request<S>| {
            factory(req).map(|endpoint| Box::new(endpoint) as Box<dyn Endpoint>)
        }))
    }
}

impl<S> Handler<S> {
    pub fn kind(&self) -> HandlerKind {
        match self {
            Handler::Terminal(_) => HandlerKind::Terminal,
            Handler::Middleware(_) => HandlerKind::Middleware,
            Handler::Upgrade(_) => HandlerKind::Upgrade,
        }
    }
}

impl<S> Clone for Handler<S> {
    fn clone(&self) -> Self {
        match self {
            Handler::Terminal(h) => Handler::Terminal(Arc::clone(h)),
            Handler::Middleware(h) => Handler::Middleware(Arc::clone(h)),
            Handler::Upgrade(h) => Handler::Upgrade(Arc::clone(h)),
        }
    }
}

impl<S> fmt::Debug for Handler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.kind()).finish()
    }
}

/// A pattern bound to a handler.
#[derive(Debug)]
pub struct Route<S = SessionData> {
    pattern: RoutePattern,
    handler: Handler<S>,
}

impl<S> Route<S> {
    pub fn new(pattern: RoutePattern, handler: Handler<S>) -> Self {
        Self { pattern, handler }
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn handler(&self) -> &Handler<S> {
        &self.handler
    }
}

/// One successful lookup: the route plus its captured parameters.
#[derive(Debug)]
pub struct MatchedRoute<'a, S = SessionData> {
    pub route: &'a Route<S>,
    pub params: Params,
}

/// Lazy sequence of matches in registration order.
///
/// Cloning the iterator restarts from the clone point; calling
/// [`Router::find_routes`] again restarts from the first route.
pub struct Matches<'a, S = SessionData> {
    routes: std::slice::Iter<'a, Route<S>>,
    path: &'a str,
}

impl<S> Clone for Matches<'_, S> {
    fn clone(&self) -> Self {
        Self {
            routes: self.routes.clone(),
            path: self.path,
        }
    }
}

impl<'a, S> Iterator for Matches<'a, S> {
    type Item = MatchedRoute<'a, S>;

    fn next(&mut self) -> Option<Self::Item> {
        for route in self.routes.by_ref() {
            if let Some(params) = route.pattern.matches(self.path) {
                return Some(MatchedRoute { route, params });
            }
        }
        None
    }
}

/// Ordered route table.
#[derive(Debug)]
pub struct Router<S = SessionData> {
    routes: Vec<Route<S>>,
}

impl<S> Default for Router<S> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<S: 'static> Router<S> {
    /// Create an empty route table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `pattern` and append it with `handler` to the table.
    pub fn add_route(
        &mut self,
        pattern: &str,
        handler: Handler<S>,
    ) -> Result<&mut Self, PatternError> {
        let pattern = RoutePattern::new(pattern)?;
        tracing::debug!(
            pattern = %pattern,
            kind = %handler.kind(),
            position = self.routes.len(),
            "Route registered"
        );
        self.routes.push(Route::new(pattern, handler));
        Ok(self)
    }

    /// Alias of [`Router::add_route`] taking the handler kind through [`Handler`].
    pub fn register(
        &mut self,
        pattern: &str,
        handler: Handler<S>,
    ) -> Result<&mut Self, PatternError> {
        self.add_route(pattern, handler)
    }

    /// Register a terminal handler.
    pub fn on<F>(&mut self, pattern: &str, f: F) -> Result<&mut Self, PatternError>
    where
        F: Fn(&Request<S>, &mut Response<S>) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_route(pattern, Handler::terminal(f))
    }

    /// Register a middleware handler.
    pub fn middleware<F>(&mut self, pattern: &str, f: F) -> Result<&mut Self, PatternError>
    where
        F: Fn(&Request<S>, &mut Response<S>) -> HandlerResult<bool> + Send + Sync + 'static,
    {
        self.add_route(pattern, Handler::middleware(f))
    }

    /// Register a WebSocket endpoint factory.
    pub fn websocket<F, E>(&mut self, pattern: &str, factory: F) -> Result<&mut Self, PatternError>
    where
        F: Fn(&Request<S>) -> Option<E> + Send + Sync + 'static,
        E: Endpoint,
    {
        self.add_route(pattern, Handler::upgrade(factory))
    }
}

impl<S> Router<S> {
    /// Lazily match `path` against every route in registration order.
    pub fn find_routes<'a>(&'a self, path: &'a str) -> Matches<'a, S> {
        Matches {
            routes: self.routes.iter(),
            path,
        }
    }

    pub fn routes(&self) -> &[Route<S>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn templates<'a>(matches: Matches<'a, SessionData>) -> Vec<&'a str> {
        matches.map(|m| m.route.pattern().template()).collect()
    }

    fn table() -> Router {
        let mut router: Router = Router::new();
        router
            .middleware("/*", |_, _| Ok(false))
            .unwrap()
            .on("/foo/:id", |_, _| Ok(()))
            .unwrap()
            .on("/foo/bar", |_, _| Ok(()))
            .unwrap()
            .on("/other", |_, _| Ok(()))
            .unwrap();
        router
    }

    #[test]
    fn test_matches_follow_registration_order() {
        let router = table();
        assert_eq!(templates(router.find_routes("/foo/bar")), ["/*", "/foo/:id", "/foo/bar"]);
        assert_eq!(templates(router.find_routes("/other")), ["/*", "/other"]);
    }

    #[test]
    fn test_matches_carry_params() {
        let router = table();
        let matched: Vec<_> = router.find_routes("/foo/42").collect();
        assert_eq!(matched.len(), 2);
        assert!(matched[0].params.is_empty());
        assert_eq!(matched[1].params["id"], "42");
    }

    #[test]
    fn test_lookup_is_lazy_and_restartable() {
        let router = table();
        let mut matches = router.find_routes("/foo/bar");

        let first = matches.next().unwrap();
        assert_eq!(first.route.pattern().template(), "/*");

        // The clone resumes where its source stopped.
        let rest = matches.clone();
        assert_eq!(templates(rest), ["/foo/:id", "/foo/bar"]);

        assert_eq!(matches.next().unwrap().route.pattern().template(), "/foo/:id");
        assert_eq!(router.find_routes("/foo/bar").count(), 3);
    }

    #[test]
    fn test_no_match_is_empty() {
        let mut router: Router = Router::new();
        router.on("/only", |_, _| Ok(())).unwrap();
        assert_eq!(router.find_routes("/missing").count(), 0);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let mut router: Router = Router::new();
        assert!(router.on("/:a/:a", |_, _| Ok(())).is_err());
        assert!(router.is_empty());
    }

    #[test]
    fn test_handler_kinds() {
        let mut router: Router = Router::new();
        router.register("/a", Handler::terminal(|_, _| Ok(()))).unwrap();
        router.register("/b", Handler::middleware(|_, _| Ok(true))).unwrap();
        let kinds: Vec<_> = router.routes().iter().map(|r| r.handler().kind()).collect();
        assert_eq!(kinds, [HandlerKind::Terminal, HandlerKind::Middleware]);
    }
}

//! Inbound request values.
//!
//! # Responsibilities
//! - Carry a fully buffered request from the transport (`IncomingRequest`)
//! - Split the target into path and query, decode the query once
//! - Parse the `Cookie` header once
//! - Expose per-request accessors to handlers (`Request`)
//!
//! # Design Decisions
//! - Requests are read-only for handlers; only path parameters change
//!   between route attempts, and only the dispatcher changes them
//! - Session lookups go through the store on every call, so sliding
//!   expiry is refreshed by each read

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};

use crate::http::cookie::parse_cookie_header;
use crate::http::query::{parse_query, split_target};
use crate::routing::Params;
use crate::session::{SessionData, SessionStore};

/// A complete request as delivered by the transport.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    /// Path plus optional query, as sent by the client.
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IncomingRequest {
    /// A `GET` request for `uri` without headers or body.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Append a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// The request as seen by handlers.
pub struct Request<S = SessionData> {
    method: Method,
    uri: String,
    path: String,
    query: HashMap<String, String>,
    headers: HeaderMap,
    cookies: HashMap<String, String>,
    body: Bytes,
    params: Params,
    sessions: Arc<dyn SessionStore<S>>,
}

impl<S: 'static> Request<S> {
    pub fn new(incoming: IncomingRequest, sessions: Arc<dyn SessionStore<S>>) -> Self {
        let IncomingRequest {
            method,
            uri,
            headers,
            body,
        } = incoming;

        let (path, raw_query) = split_target(&uri);
        let path = path.to_string();
        let query = raw_query.map(parse_query).unwrap_or_default();

        let mut cookies = HashMap::new();
        for value in headers.get_all(header::COOKIE) {
            if let Ok(value) = value.to_str() {
                parse_cookie_header(value, &mut cookies);
            }
        }

        Self {
            method,
            uri,
            path,
            query,
            headers,
            cookies,
            body,
            params: Params::new(),
            sessions,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The full target, path plus query.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The target without its query component.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// First value of header `name` (case-insensitive), if it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Path parameter captured by the route currently being tried.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Decoded query value by exact key.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// Token carried in the session cookie, if any.
    pub fn session_token(&self) -> Option<&str> {
        self.cookie(self.sessions.cookie_name())
    }

    /// Current session value. Absent or expired sessions yield `None`.
    pub fn session(&self) -> Option<S> {
        let token = self.session_token()?;
        self.sessions.get_session(token)
    }

    pub fn session_store(&self) -> &Arc<dyn SessionStore<S>> {
        &self.sessions
    }

    /// Raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as `application/x-www-form-urlencoded`.
    pub fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(&self.body).into_owned().collect()
    }

    /// True for a WebSocket upgrade request.
    pub fn is_upgrade(&self) -> bool {
        let connection_upgrade = self
            .headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

        let websocket = self
            .header(header::UPGRADE.as_str())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));

        connection_upgrade && websocket
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }
}

impl<S> fmt::Debug for Request<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use std::time::Duration;

    fn store() -> Arc<dyn SessionStore<SessionData>> {
        Arc::new(MemorySessionStore::<SessionData>::new("SID", Some(Duration::from_secs(60))))
    }

    #[test]
    fn test_path_and_query_are_split() {
        let req = Request::new(IncomingRequest::new("/hello/world?x=1&y=a%20b"), store());
        assert_eq!(req.path(), "/hello/world");
        assert_eq!(req.uri(), "/hello/world?x=1&y=a%20b");
        assert_eq!(req.query("x"), Some("1"));
        assert_eq!(req.query("y"), Some("a b"));
        assert_eq!(req.query("z"), None);
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let req = Request::new(
            IncomingRequest::new("/").with_header("X-Token", "secret"),
            store(),
        );
        assert_eq!(req.header("x-token"), Some("secret"));
        assert_eq!(req.header("missing"), None);
    }

    #[test]
    fn test_cookies_from_multiple_headers() {
        let req = Request::new(
            IncomingRequest::new("/")
                .with_header("cookie", "a=1; b=2")
                .with_header("cookie", "c=3"),
            store(),
        );
        assert_eq!(req.cookie("a"), Some("1"));
        assert_eq!(req.cookie("c"), Some("3"));
        assert_eq!(req.cookies().len(), 3);
    }

    #[test]
    fn test_session_lookup_through_cookie() {
        let sessions = store();
        let mut data = SessionData::new();
        data.insert("user".into(), "ada".into());
        let token = sessions.start_session(data);

        let req = Request::new(
            IncomingRequest::new("/").with_header("cookie", &format!("SID={token}")),
            Arc::clone(&sessions),
        );
        assert_eq!(req.session_token(), Some(token.as_str()));
        assert_eq!(req.session().unwrap()["user"], "ada");

        let anonymous = Request::new(IncomingRequest::new("/"), sessions);
        assert!(anonymous.session().is_none());
    }

    #[test]
    fn test_form_body() {
        let req = Request::new(
            IncomingRequest::new("/submit")
                .with_method(Method::POST)
                .with_body("name=ada+lovelace&lang=en"),
            store(),
        );
        let form = req.form();
        assert_eq!(form["name"], "ada lovelace");
        assert_eq!(req.text(), "name=ada+lovelace&lang=en");
    }

    #[test]
    fn test_upgrade_detection() {
        let upgrade = Request::new(
            IncomingRequest::new("/ws")
                .with_header("connection", "keep-alive, Upgrade")
                .with_header("upgrade", "WebSocket"),
            store(),
        );
        assert!(upgrade.is_upgrade());

        let plain = Request::new(IncomingRequest::new("/ws"), store());
        assert!(!plain.is_upgrade());

        let no_connection = Request::new(
            IncomingRequest::new("/ws").with_header("upgrade", "websocket"),
            store(),
        );
        assert!(!no_connection.is_upgrade());
    }
}

//! Outbound response accumulation.
//!
//! # Responsibilities
//! - Accumulate status, headers, cookies and body across middleware and the
//!   final handler
//! - Mint and expire session cookies through the session store
//! - Convert into the transport response exactly once
//!
//! # Design Decisions
//! - Cookies are kept apart from headers and emitted as one `Set-Cookie`
//!   occurrence each, never comma-joined
//! - Cloneable so the dispatcher can checkpoint before each route attempt

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use serde::Serialize;

use crate::error::Error;
use crate::http::cookie::Cookie;
use crate::http::request::Request;
use crate::session::{SessionData, SessionStore};

/// Mutable response owned by one dispatch cycle.
pub struct Response<S = SessionData> {
    status: StatusCode,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
    body: Vec<u8>,
    /// Tokens minted through this response, oldest first.
    started: Vec<String>,
    sessions: Arc<dyn SessionStore<S>>,
}

impl<S> Clone for Response<S> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            headers: self.headers.clone(),
            cookies: self.cookies.clone(),
            body: self.body.clone(),
            started: self.started.clone(),
            sessions: Arc::clone(&self.sessions),
        }
    }
}

impl<S: 'static> Response<S> {
    /// An empty `200 OK` response.
    pub fn new(sessions: Arc<dyn SessionStore<S>>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: Vec::new(),
            started: Vec::new(),
            sessions,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Replace every value of header `name` with `value`.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let (name, value) = header_pair(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Replace header `name` with several independent values.
    pub fn set_header_values<I, V>(&mut self, name: &str, values: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = V>,
        V: AsRef<str>,
    {
        let name = header_name(name)?;
        let mut parsed = Vec::new();
        for value in values {
            parsed.push(header_value(name.as_str(), value.as_ref())?);
        }
        self.headers.remove(&name);
        for value in parsed {
            self.headers.append(name.clone(), value);
        }
        Ok(())
    }

    /// Add one more value to header `name`.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let (name, value) = header_pair(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set the `Content-Type` header.
    pub fn set_mime(&mut self, mime: &str) -> Result<(), Error> {
        self.set_header(header::CONTENT_TYPE.as_str(), mime)
    }

    /// Allow clients to cache the response for `seconds`.
    pub fn enable_cache(&mut self, seconds: u64) {
        if let Ok(value) = HeaderValue::try_from(format!("max-age={seconds}")) {
            self.headers.insert(header::CACHE_CONTROL, value);
        }
    }

    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Store `value` as a new session and attach its cookie. Returns the token.
    pub fn start_session(&mut self, value: S) -> String {
        let token = self.sessions.start_session(value);
        let cookie = self.sessions.session_cookie(&token);
        self.cookies.push(cookie);
        self.started.push(token.clone());
        token
    }

    /// End the session carried by `request`, if any, and expire its cookie.
    pub fn stop_session(&mut self, request: &Request<S>) {
        if let Some(token) = request.session_token() {
            self.sessions.stop_session(token);
        }
        let template = self.sessions.session_cookie("");
        self.cookies.push(Cookie::removal(template.name, template.path));
    }

    /// Restore `checkpoint`, stopping sessions started after it was taken.
    pub(crate) fn roll_back_to(&mut self, checkpoint: Self) {
        for token in self.started.iter().skip(checkpoint.started.len()) {
            self.sessions.stop_session(token);
        }
        *self = checkpoint;
    }

    /// Append UTF-8 text to the body.
    pub fn write(&mut self, text: &str) {
        self.body.extend_from_slice(text.as_bytes());
    }

    /// Append raw bytes to the body.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Serialize `value` as the JSON body and set the content type.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        self.body = serde_json::to_vec(value)?;
        self.set_mime("application/json")
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl<S: 'static> fmt::Write for Response<S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s);
        Ok(())
    }
}

impl<S> fmt::Debug for Response<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// The single flush: status, headers, one `Set-Cookie` per cookie, body.
impl<S> IntoResponse for Response<S> {
    fn into_response(self) -> axum::response::Response {
        let mut headers = self.headers;
        for cookie in &self.cookies {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(_) => {
                    tracing::warn!(
                        cookie = %cookie.name,
                        "Dropping cookie with invalid characters"
                    );
                }
            }
        }

        let mut response = axum::response::Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}

fn header_name(name: &str) -> Result<HeaderName, Error> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::InvalidHeader {
        name: name.to_string(),
    })
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader {
        name: name.to_string(),
    })
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), Error> {
    let name = header_name(name)?;
    let value = header_value(name.as_str(), value)?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::IncomingRequest;
    use crate::session::MemorySessionStore;
    use std::fmt::Write as _;
    use std::time::Duration;

    fn store() -> Arc<dyn SessionStore<SessionData>> {
        Arc::new(MemorySessionStore::<SessionData>::new("SID", Some(Duration::from_secs(60))))
    }

    #[test]
    fn test_defaults() {
        let res = Response::new(store());
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.body().is_empty());
        assert!(res.headers().is_empty());
    }

    #[test]
    fn test_headers_single_and_multi() {
        let mut res = Response::new(store());
        res.set_header("x-a", "1").unwrap();
        res.set_header("x-a", "2").unwrap();
        assert_eq!(res.header("x-a"), Some("2"));

        res.set_header_values("vary", ["accept", "origin"]).unwrap();
        let vary: Vec<_> = res.headers().get_all("vary").iter().collect();
        assert_eq!(vary.len(), 2);

        res.append_header("x-a", "3").unwrap();
        assert_eq!(res.headers().get_all("x-a").iter().count(), 2);

        assert!(res.set_header("bad header", "x").is_err());
        assert!(res.set_header("x-b", "line\nbreak").is_err());
    }

    #[test]
    fn test_mime_and_cache() {
        let mut res = Response::new(store());
        res.set_mime("text/plain").unwrap();
        res.enable_cache(3600);
        assert_eq!(res.header("content-type"), Some("text/plain"));
        assert_eq!(res.header("cache-control"), Some("max-age=3600"));
    }

    #[test]
    fn test_write_text_and_bytes() {
        let mut res = Response::new(store());
        res.write("hi ");
        res.write_bytes(b"there");
        write!(res, " #{}", 7).unwrap();
        assert_eq!(res.text(), "hi there #7");
    }

    #[test]
    fn test_json_body() {
        let mut res = Response::new(store());
        res.json(&serde_json::json!({ "ok": true })).unwrap();
        assert_eq!(res.text(), r#"{"ok":true}"#);
        assert_eq!(res.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_start_session_sets_cookie_and_stores_value() {
        let sessions = store();
        let mut res = Response::new(Arc::clone(&sessions));
        let mut data = SessionData::new();
        data.insert("user".into(), "ada".into());

        let token = res.start_session(data);
        assert_eq!(res.cookies().len(), 1);
        assert_eq!(res.cookies()[0].name, "SID");
        assert_eq!(res.cookies()[0].value, token);
        assert_eq!(sessions.get_session(&token).unwrap()["user"], "ada");
    }

    #[test]
    fn test_stop_session_removes_entry_and_expires_cookie() {
        let sessions = store();
        let token = sessions.start_session(SessionData::new());
        let req = Request::new(
            IncomingRequest::new("/").with_header("cookie", &format!("SID={token}")),
            Arc::clone(&sessions),
        );

        let mut res = Response::new(Arc::clone(&sessions));
        res.stop_session(&req);
        assert!(sessions.get_session(&token).is_none());
        assert_eq!(res.cookies()[0].max_age, Some(0));
    }

    #[test]
    fn test_roll_back_stops_sessions_started_after_checkpoint() {
        let sessions = store();
        let mut res = Response::new(Arc::clone(&sessions));
        let kept = res.start_session(SessionData::new());
        let checkpoint = res.clone();

        let dropped = res.start_session(SessionData::new());
        res.write("partial");
        res.roll_back_to(checkpoint);

        assert!(sessions.get_session(&kept).is_some());
        assert!(sessions.get_session(&dropped).is_none());
        assert_eq!(res.cookies().len(), 1);
        assert!(res.body().is_empty());
    }

    #[test]
    fn test_each_cookie_is_a_separate_header() {
        let mut res = Response::new(store());
        res.set_cookie(Cookie::new("a", "1"));
        res.set_cookie(Cookie::new("b", "2"));
        res.set_status(StatusCode::CREATED);

        let response = res.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        let cookies: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(cookies, ["a=1", "b=2"]);
    }
}

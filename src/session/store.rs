//! Session store contract.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::http::cookie::Cookie;

/// Token-keyed session storage shared by every request.
///
/// Implementations must tolerate concurrent calls from any task.
pub trait SessionStore<S>: Send + Sync + 'static {
    /// Name of the cookie carrying the session token.
    fn cookie_name(&self) -> &str;

    /// Store `value` under a fresh token and return the token.
    fn start_session(&self, value: S) -> String;

    /// The value for `token`, if present and not expired.
    fn get_session(&self, token: &str) -> Option<S>;

    /// Remove `token`. No-op when absent.
    fn stop_session(&self, token: &str);

    /// The cookie that hands `token` to the client.
    fn session_cookie(&self, token: &str) -> Cookie {
        Cookie::new(self.cookie_name(), token).with_path("/")
    }

    /// Start background eviction, stopped by `shutdown`.
    ///
    /// Stores without expiry return `None`.
    fn spawn_sweeper(&self, shutdown: broadcast::Receiver<()>) -> Option<JoinHandle<()>> {
        drop(shutdown);
        None
    }
}

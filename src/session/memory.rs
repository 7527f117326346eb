//! In-process session store with sliding expiry.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::SessionConfig;
use crate::http::cookie::Cookie;
use crate::observability::metrics;
use crate::session::store::SessionStore;
use crate::session::SessionData;

/// Cookie name of the default store.
pub const DEFAULT_COOKIE_NAME: &str = "TRELLISSES";

/// Lifetime of the default store.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(30 * 60);

struct Entry<S> {
    value: S,
    /// `None` when the store has no lifetime.
    expires_at: Option<Instant>,
}

impl<S> Entry<S> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// DashMap-backed session store.
///
/// Every successful read pushes the deadline out by one lifetime. A
/// background sweeper (see [`SessionStore::spawn_sweeper`]) runs once per
/// lifetime and drops entries whose deadline has passed. Clones share the
/// same map.
pub struct MemorySessionStore<S = SessionData> {
    entries: Arc<DashMap<String, Entry<S>>>,
    lifetime: Option<Duration>,
    cookie_name: String,
    cookie_path: String,
    http_only: bool,
}

impl<S> Clone for MemorySessionStore<S> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            lifetime: self.lifetime,
            cookie_name: self.cookie_name.clone(),
            cookie_path: self.cookie_path.clone(),
            http_only: self.http_only,
        }
    }
}

impl<S> MemorySessionStore<S> {
    /// A store using `cookie_name`. `None` or a zero lifetime never expires.
    pub fn new(cookie_name: impl Into<String>, lifetime: Option<Duration>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            lifetime: lifetime.filter(|d| !d.is_zero()),
            cookie_name: cookie_name.into(),
            cookie_path: "/".to_string(),
            http_only: true,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.cookie_name.clone(),
            Some(Duration::from_secs(config.lifetime_secs)),
        )
        .with_cookie_path(config.cookie_path.clone())
        .with_http_only(config.http_only)
    }

    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn lifetime(&self) -> Option<Duration> {
        self.lifetime
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry now. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        sweep(&self.entries)
    }

    /// A deadline past the clock's range means the entry never expires.
    fn deadline(&self, now: Instant) -> Option<Instant> {
        self.lifetime.and_then(|lifetime| now.checked_add(lifetime))
    }
}

impl Default for MemorySessionStore<SessionData> {
    fn default() -> Self {
        Self::new(DEFAULT_COOKIE_NAME, Some(DEFAULT_LIFETIME))
    }
}

impl<S> SessionStore<S> for MemorySessionStore<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn start_session(&self, value: S) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let expires_at = self.deadline(Instant::now());
        self.entries.insert(token.clone(), Entry { value, expires_at });
        metrics::set_sessions_active(self.entries.len());
        tracing::debug!(sessions = self.entries.len(), "Session started");
        token
    }

    fn get_session(&self, token: &str) -> Option<S> {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(token) {
            if !entry.is_expired(now) {
                entry.expires_at = self.deadline(now);
                return Some(entry.value.clone());
            }
        }

        // Expired but not swept yet: evict on read.
        if self.entries.remove_if(token, |_, entry| entry.is_expired(now)).is_some() {
            metrics::record_sessions_reaped(1);
            metrics::set_sessions_active(self.entries.len());
        }
        None
    }

    fn stop_session(&self, token: &str) {
        if self.entries.remove(token).is_some() {
            metrics::set_sessions_active(self.entries.len());
            tracing::debug!(sessions = self.entries.len(), "Session stopped");
        }
    }

    fn session_cookie(&self, token: &str) -> Cookie {
        Cookie::new(self.cookie_name.as_str(), token)
            .with_path(self.cookie_path.as_str())
            .http_only(self.http_only)
    }

    fn spawn_sweeper(&self, mut shutdown: broadcast::Receiver<()>) -> Option<JoinHandle<()>> {
        let period = self.lifetime?;
        let first_tick = Instant::now().checked_add(period)?;
        let entries = Arc::clone(&self.entries);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, period);
            tracing::debug!(period_secs = period.as_secs(), "Session sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep(&entries);
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Session sweeper stopped");
                        break;
                    }
                }
            }
        }))
    }
}

fn sweep<S>(entries: &DashMap<String, Entry<S>>) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    let removed = before.saturating_sub(entries.len());

    if removed > 0 {
        tracing::debug!(removed, remaining = entries.len(), "Expired sessions swept");
        metrics::record_sessions_reaped(removed);
    }
    metrics::set_sessions_active(entries.len());
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const LIFETIME: Duration = Duration::from_secs(60);

    fn store() -> MemorySessionStore<String> {
        MemorySessionStore::new("SID", Some(LIFETIME))
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_get() {
        let store = store();
        let token = store.start_session("alice".to_string());
        assert_eq!(store.get_session(&token).as_deref(), Some("alice"));
        assert_eq!(store.get_session("unknown"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_without_access() {
        let store = store();
        let token = store.start_session("alice".to_string());

        tokio::time::advance(LIFETIME + Duration::from_millis(1)).await;
        assert_eq!(store.get_session(&token), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifetime_past_clock_range_never_expires() {
        let store = MemorySessionStore::<String>::new("SID", Some(Duration::from_secs(u64::MAX)));
        let token = store.start_session("alice".to_string());

        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert_eq!(store.get_session(&token).as_deref(), Some("alice"));
        assert_eq!(store.sweep_expired(), 0);

        let (_tx, rx) = broadcast::channel(1);
        assert!(store.spawn_sweeper(rx).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_slides_the_deadline() {
        let store = store();
        let token = store.start_session("alice".to_string());

        tokio::time::advance(LIFETIME - Duration::from_secs(10)).await;
        assert!(store.get_session(&token).is_some());

        // Past the first deadline but inside the refreshed one.
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(store.get_session(&token).is_some());

        tokio::time::advance(LIFETIME).await;
        assert!(store.get_session(&token).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_session() {
        let store = store();
        let token = store.start_session("alice".to_string());
        store.stop_session(&token);
        store.stop_session(&token);
        store.stop_session("never-existed");
        assert_eq!(store.get_session(&token), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_lifetime_never_expires() {
        let store = MemorySessionStore::new("SID", Some(Duration::ZERO));
        assert_eq!(store.lifetime(), None);
        let token = store.start_session(1u32);

        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert_eq!(store.get_session(&token), Some(1));

        let (_tx, rx) = broadcast::channel(1);
        assert!(store.spawn_sweeper(rx).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let store = store();
        let old = store.start_session("old".to_string());
        tokio::time::advance(Duration::from_secs(30)).await;
        let fresh = store.start_session("fresh".to_string());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get_session(&old).is_none());
        assert!(store.get_session(&fresh).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_and_shutdown() {
        let store = store();
        store.start_session("a".to_string());
        store.start_session("b".to_string());

        let (tx, rx) = broadcast::channel(1);
        let sweeper = store.spawn_sweeper(rx).unwrap();

        tokio::time::sleep(LIFETIME + Duration::from_secs(1)).await;
        assert!(store.is_empty());

        tx.send(()).unwrap();
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn test_tokens_are_unique_under_concurrency() {
        let store = Arc::new(store());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                (0..50)
                    .map(|j| {
                        let token = store.start_session(format!("{i}-{j}"));
                        assert_eq!(store.get_session(&token), Some(format!("{i}-{j}")));
                        token
                    })
                    .collect::<Vec<_>>()
            }));
        }

        let mut tokens = HashSet::new();
        for task in tasks {
            tokens.extend(task.await.unwrap());
        }
        assert_eq!(tokens.len(), 16 * 50);
        assert_eq!(store.len(), 16 * 50);
    }

    #[test]
    fn test_default_store_settings() {
        let store = MemorySessionStore::default();
        assert_eq!(SessionStore::<SessionData>::cookie_name(&store), DEFAULT_COOKIE_NAME);
        assert_eq!(store.lifetime(), Some(DEFAULT_LIFETIME));

        let cookie = store.session_cookie("tok");
        assert_eq!(cookie.to_string(), "TRELLISSES=tok; Path=/; HttpOnly");
    }
}

//! Registry of live bridges, used to force-close them on shutdown.

use std::sync::Arc;

use dashmap::DashMap;

use crate::bridge::connection::Bridge;
use crate::bridge::endpoint::SocketId;
use crate::bridge::frame::CloseReason;
use crate::observability::metrics;

/// Shared map of open connections keyed by socket id.
#[derive(Clone, Default)]
pub struct BridgeRegistry {
    bridges: Arc<DashMap<SocketId, Arc<Bridge>>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bridge: Arc<Bridge>) {
        self.bridges.insert(bridge.socket().id(), bridge);
        metrics::set_open_sockets(self.bridges.len());
    }

    pub fn remove(&self, id: SocketId) -> Option<Arc<Bridge>> {
        let removed = self.bridges.remove(&id).map(|(_, bridge)| bridge);
        metrics::set_open_sockets(self.bridges.len());
        removed
    }

    pub fn get(&self, id: SocketId) -> Option<Arc<Bridge>> {
        self.bridges.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }

    /// Close every registered bridge with `1001 Going Away`.
    ///
    /// Returns how many `on_close` callbacks this call fired.
    pub fn close_all(&self) -> usize {
        // Collect first so no shard lock is held while callbacks run.
        let bridges: Vec<Arc<Bridge>> = self
            .bridges
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let closed = bridges
            .iter()
            .filter(|bridge| bridge.close_with(CloseReason::going_away()))
            .count();

        tracing::info!(sockets = bridges.len(), closed, "Closed open sockets");
        closed
    }
}

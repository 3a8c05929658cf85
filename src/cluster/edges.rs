//! Edge registry
//!
//! Downstream links known to this node, keyed by peer address. A link is
//! registered the first time it sends a report or publishes a stream and
//! removed when it closes. The registry is only used to fan messages out;
//! subscriptions never consult it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::link::{ClusterLink, LinkId};

/// Registered downstream links
#[derive(Default)]
pub struct EdgeRegistry {
    edges: RwLock<HashMap<SocketAddr, Arc<ClusterLink>>>,
}

impl EdgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `link` under its peer address
    ///
    /// Returns true if the link was not registered before. A closed link left
    /// under the same address is replaced.
    pub async fn insert(&self, link: &Arc<ClusterLink>) -> bool {
        let mut edges = self.edges.write().await;

        if let Some(existing) = edges.get(&link.peer_addr()) {
            if existing.id() == link.id() || !existing.is_closed() {
                return false;
            }
        }

        edges.insert(link.peer_addr(), Arc::clone(link));
        tracing::info!(link = %link.id(), peer = %link.peer_addr(), edges = edges.len(), "Edge registered");
        true
    }

    /// Deregister `link`
    ///
    /// Only removes the entry if it still refers to this link.
    pub async fn remove(&self, link: &ClusterLink) -> bool {
        let mut edges = self.edges.write().await;

        match edges.get(&link.peer_addr()) {
            Some(existing) if existing.id() == link.id() => {
                edges.remove(&link.peer_addr());
                tracing::info!(link = %link.id(), peer = %link.peer_addr(), edges = edges.len(), "Edge removed");
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, addr: &SocketAddr) -> Option<Arc<ClusterLink>> {
        self.edges.read().await.get(addr).cloned()
    }

    pub async fn contains(&self, addr: &SocketAddr) -> bool {
        self.edges.read().await.contains_key(addr)
    }

    pub async fn len(&self) -> usize {
        self.edges.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.edges.read().await.is_empty()
    }

    /// Snapshot of the registered links
    pub async fn snapshot(&self) -> Vec<Arc<ClusterLink>> {
        self.edges.read().await.values().cloned().collect()
    }

    /// Apply `f` to every registered link except `exclude`
    ///
    /// Runs under the read lock: concurrent broadcasts may overlap, but no
    /// link is added or removed while one is in progress. Returns the number
    /// of links `f` was applied to.
    pub async fn broadcast<F>(&self, exclude: Option<LinkId>, mut f: F) -> usize
    where
        F: FnMut(&Arc<ClusterLink>),
    {
        let edges = self.edges.read().await;
        let mut reached = 0;

        for link in edges.values() {
            if Some(link.id()) == exclude {
                continue;
            }
            f(link);
            reached += 1;
        }

        reached
    }
}

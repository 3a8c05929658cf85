//! Origin/edge replication
//!
//! A node can be an origin (edges dial it), an edge (it dials its origin), or
//! both. Every connection is a [`ClusterLink`] running the same message loop;
//! the role only decides which summary messages are honored and what happens
//! to mirrored streams when the link goes away.
//!
//! ```text
//!        origin                                edge
//!   ┌───────────────┐   PUBLISH/TRACK/DATA  ┌───────────────┐
//!   │ EdgeRegistry  │──────────────────────►│ Uplink        │
//!   │ (Downstream   │   SUMMARY start/stop  │ (Upstream     │
//!   │  links)       │◄──────────────────────│  link)        │
//!   └───────────────┘   SUBSCRIBE/report    └───────────────┘
//! ```

pub mod edges;
pub mod link;
pub mod session;
pub mod summary;
pub mod sync;
pub mod uplink;

use std::sync::Arc;
use std::time::{Duration, Instant};

pub use edges::EdgeRegistry;
pub use link::{ClusterLink, LinkId, LinkRole};
pub use summary::SummaryAggregator;
pub use uplink::{Uplink, UplinkStats};

use crate::registry::{RegistryConfig, StreamRegistry};
use crate::server::ClusterConfig;
use crate::stats::ServerSummary;

/// State shared by every link of a node
pub struct NodeContext {
    pub config: ClusterConfig,
    pub registry: Arc<StreamRegistry>,
    pub edges: EdgeRegistry,
    pub summary: SummaryAggregator,
    pub uplink: Uplink,
    started_at: Instant,
}

impl NodeContext {
    /// Create a context with its own stream registry
    pub fn new(config: ClusterConfig) -> Arc<Self> {
        let registry = Arc::new(StreamRegistry::with_config(
            RegistryConfig::default()
                .packet_capacity(config.packet_capacity)
                .event_capacity(config.event_capacity),
        ));
        Self::with_registry(config, registry)
    }

    /// Create a context around an existing stream registry
    pub fn with_registry(config: ClusterConfig, registry: Arc<StreamRegistry>) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            edges: EdgeRegistry::new(),
            summary: SummaryAggregator::new(),
            uplink: Uplink::new(),
            started_at: Instant::now(),
        })
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_monitoring_active(&self) -> bool {
        self.summary.is_active()
    }

    /// Turn monitoring on or off for this node and its edges
    pub async fn set_monitoring(&self, active: bool) -> bool {
        self.summary.set_active(&self.edges, active).await
    }

    /// Current report of this node, including its edges' latest reports
    pub async fn report_now(&self) -> ServerSummary {
        let mut report = ServerSummary::collect(&self.registry, self.uptime()).await;
        report.children = self.summary.children().await;
        report
    }
}

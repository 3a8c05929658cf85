//! Cluster node
//!
//! Wires the stream registry to the cluster: the hook task turns registry
//! lifecycle events into cluster traffic, the listener serves edges and the
//! uplink keeps the connection to the origin.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::cluster::{sync, uplink, NodeContext, UplinkStats};
use crate::error::{ProtocolError, Result};
use crate::registry::{StreamEvent, StreamOrigin, StreamRegistry};
use crate::server::config::ClusterConfig;
use crate::server::listener::OriginListener;
use crate::stats::ServerSummary;

/// A media server's cluster plugin
pub struct ClusterNode {
    ctx: Arc<NodeContext>,
}

impl ClusterNode {
    /// Create a node with its own stream registry
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            ctx: NodeContext::new(config),
        }
    }

    /// Create a node around the host's stream registry
    pub fn with_registry(config: ClusterConfig, registry: Arc<StreamRegistry>) -> Self {
        Self {
            ctx: NodeContext::with_registry(config, registry),
        }
    }

    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.ctx.registry
    }

    pub fn context(&self) -> &Arc<NodeContext> {
        &self.ctx
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.ctx.config
    }

    pub fn is_monitoring_active(&self) -> bool {
        self.ctx.is_monitoring_active()
    }

    /// Turn monitoring on or off for this node and its edges
    pub async fn set_monitoring(&self, active: bool) -> bool {
        self.ctx.set_monitoring(active).await
    }

    /// Current report of this node
    pub async fn report_now(&self) -> ServerSummary {
        self.ctx.report_now().await
    }

    pub async fn uplink_stats(&self) -> UplinkStats {
        self.ctx.uplink.stats().await
    }

    /// Ask the origin for a stream this node does not have
    ///
    /// The origin answers with the stream's track announcements, which
    /// create the mirrored stream here.
    pub async fn pull(&self, path: &str) -> Result<()> {
        let link = self
            .ctx
            .uplink
            .current()
            .await
            .ok_or(ProtocolError::NotConnected)?;

        tracing::debug!(link = %link.id(), stream = %path, "Pulling stream from origin");
        link.write_subscribe(path).await
    }

    /// Run the node
    ///
    /// Returns `Ok(())` at once if neither an origin nor a listen address is
    /// configured; fails if the listen address cannot be bound. Otherwise
    /// runs until the process ends.
    pub async fn run(&self) -> Result<()> {
        if !self.ctx.config.is_enabled() {
            tracing::info!("Cluster not configured, node inert");
            return Ok(());
        }

        let hooks = self.spawn_hooks();

        let listener = match self.ctx.config.listen_addr {
            Some(addr) => Some(OriginListener::bind(Arc::clone(&self.ctx), addr).await?),
            None => None,
        };

        let uplink = self.ctx.config.origin_server.clone().map(|origin| {
            tracing::info!(origin = %origin, push = self.ctx.config.push, "Cluster edge starting");
            tokio::spawn(uplink::run(Arc::clone(&self.ctx), origin))
        });

        let result = match (listener, uplink) {
            (Some(listener), uplink) => {
                let result = listener.run().await;
                if let Some(uplink) = uplink {
                    uplink.abort();
                }
                result
            }
            (None, Some(uplink)) => {
                let _ = uplink.await;
                Ok(())
            }
            (None, None) => Ok(()),
        };

        hooks.abort();
        result
    }

    /// Run the node until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.run() => result,
        }
    }

    /// Start turning registry events into cluster traffic
    ///
    /// The event receiver is attached before this returns, so nothing
    /// published afterwards is missed.
    pub fn spawn_hooks(&self) -> JoinHandle<()> {
        let mut events = self.ctx.registry.events();
        let ctx = Arc::clone(&self.ctx);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => handle_event(&ctx, event).await,
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Cluster hooks lagged on stream events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

async fn handle_event(ctx: &Arc<NodeContext>, event: StreamEvent) {
    match event {
        StreamEvent::Published { path, origin } => on_published(ctx, &path, origin).await,
        StreamEvent::Demand {
            path,
            origin,
            active,
        } => {
            let Some(link) = origin.link() else {
                return;
            };

            let result = if active {
                link.write_subscribe(&path).await
            } else {
                link.write_unsubscribe(&path).await
            };

            match result {
                Ok(()) => {
                    tracing::debug!(link = %link.id(), stream = %path, active = active, "Demand forwarded");
                }
                Err(e) => {
                    tracing::debug!(link = %link.id(), stream = %path, error = %e, "Demand not forwarded");
                }
            }
        }
        StreamEvent::Closed { path, .. } => on_closed(ctx, &path).await,
        StreamEvent::TrackAdded { .. } => {}
    }
}

/// Fan a new stream out to every edge but its source, and push it upward
/// if it is ours
async fn on_published(ctx: &Arc<NodeContext>, path: &str, origin: StreamOrigin) {
    let Some(stream) = ctx.registry.find_stream(path).await else {
        return;
    };

    let reached = ctx
        .edges
        .broadcast(origin.link_id(), |link| {
            sync::spawn_stream_relay(
                Arc::clone(&ctx.registry),
                Arc::clone(link),
                Arc::clone(&stream),
                true,
                None,
            );
        })
        .await;

    let mut pushed = false;
    if origin.is_local() && ctx.config.push {
        if let Some(uplink) = ctx.uplink.current().await {
            pushed = sync::spawn_stream_relay(
                Arc::clone(&ctx.registry),
                uplink,
                stream,
                true,
                None,
            );
        }
    }

    tracing::debug!(stream = %path, edges = reached, pushed = pushed, "Stream fanned out");
}

/// Tell every link that was relaying the stream that it ended
async fn on_closed(ctx: &Arc<NodeContext>, path: &str) {
    let mut targets = ctx.edges.snapshot().await;
    if let Some(uplink) = ctx.uplink.current().await {
        targets.push(uplink);
    }

    for link in targets {
        if !link.stop_relay(path) {
            continue;
        }
        if let Err(e) = link.write_unpublish(path).await {
            tracing::debug!(link = %link.id(), stream = %path, error = %e, "Unpublish not delivered");
        }
    }
}

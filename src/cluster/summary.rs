//! Monitoring summary aggregation
//!
//! Monitoring is a process-wide on/off flag. Turning it on or off is pushed
//! down to every registered edge as a SUMMARY order; an edge that is told to
//! start turns monitoring on for its own edges in turn and reports upward
//! once per report interval until told to stop.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::edges::EdgeRegistry;
use super::link::ClusterLink;
use super::NodeContext;
use crate::error::Result;
use crate::stats::ServerSummary;

/// Latest report of each edge, plus the monitoring flag
#[derive(Default)]
pub struct SummaryAggregator {
    active: AtomicBool,
    /// Held while the flag changes and its orders go out
    toggle: Mutex<()>,
    children: RwLock<HashMap<SocketAddr, ServerSummary>>,
}

impl SummaryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Turn monitoring on or off
    ///
    /// When the flag changes, every registered edge is sent the matching
    /// order. Concurrent toggles are applied one at a time, so every edge
    /// sees the orders in the order the flag changed. Returns whether the
    /// flag changed.
    pub async fn set_active(&self, edges: &EdgeRegistry, active: bool) -> bool {
        let _toggle = self.toggle.lock().await;
        if self.active.swap(active, Ordering::AcqRel) == active {
            return false;
        }

        let mut targets = Vec::new();
        let count = edges
            .broadcast(None, |link| targets.push(Arc::clone(link)))
            .await;
        tracing::info!(active = active, edges = count, "Monitoring toggled");

        for link in targets {
            if let Err(e) = link.write_summary_order(active).await {
                tracing::debug!(link = %link.id(), peer = %link.peer_addr(), error = %e, "Summary order not delivered");
            }
        }

        if !active {
            self.children.write().await.clear();
        }
        true
    }

    /// Merge a report received from an edge
    ///
    /// The report is stamped with the sender's address and replaces its
    /// previous one. The sender is registered as an edge on first sight.
    pub async fn on_report(
        &self,
        edges: &EdgeRegistry,
        link: &Arc<ClusterLink>,
        json: &str,
    ) -> Result<()> {
        let mut report = ServerSummary::from_json(json)?;
        report.address = link.peer_addr().to_string();

        tracing::trace!(peer = %link.peer_addr(), streams = report.stream_count(), "Summary report");
        self.children.write().await.insert(link.peer_addr(), report);

        self.register_edge(edges, link).await?;
        Ok(())
    }

    /// Register `link` as an edge
    ///
    /// A newly registered edge is sent a start order right away if
    /// monitoring is on. Returns whether the link was new.
    pub async fn register_edge(&self, edges: &EdgeRegistry, link: &Arc<ClusterLink>) -> Result<bool> {
        let _toggle = self.toggle.lock().await;
        if !edges.insert(link).await {
            return Ok(false);
        }

        if self.is_active() {
            link.write_summary_order(true).await?;
        }
        Ok(true)
    }

    /// Drop the report of an edge that went away
    pub async fn forget(&self, addr: &SocketAddr) -> bool {
        self.children.write().await.remove(addr).is_some()
    }

    /// Latest report of each edge, keyed by address
    pub async fn children(&self) -> HashMap<String, ServerSummary> {
        self.children
            .read()
            .await
            .iter()
            .map(|(addr, report)| (addr.to_string(), report.clone()))
            .collect()
    }

    pub async fn report_count(&self) -> usize {
        self.children.read().await.len()
    }
}

/// Send the current report of this node on `link`
pub async fn send_report(ctx: &NodeContext, link: &ClusterLink) -> Result<()> {
    let json = ctx.report_now().await.to_json()?;
    link.write_summary_report(json).await
}

/// Start reporting on `link` once per report interval
///
/// Returns false if a reporter already runs on the link.
pub fn spawn_reporter(ctx: Arc<NodeContext>, link: Arc<ClusterLink>) -> bool {
    let Some(token) = link.start_reporting() else {
        return false;
    };

    tracing::info!(link = %link.id(), peer = %link.peer_addr(), "Reporting started");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ctx.config.report_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = send_report(&ctx, &link).await {
                        tracing::debug!(link = %link.id(), error = %e, "Report failed");
                        break;
                    }
                }
            }
        }
        token.cancel();
        tracing::info!(link = %link.id(), peer = %link.peer_addr(), "Reporting stopped");
    });

    true
}

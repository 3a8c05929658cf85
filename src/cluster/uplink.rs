//! Uplink manager
//!
//! An edge keeps one link to its origin. The dial loop never gives up: after
//! a failed dial or a closed link it sleeps for a random delay inside the
//! configured window and dials again.
//!
//! After each successful connect the edge first sends its current report,
//! then rebinds the streams it mirrors from the origin to the new link (which
//! re-sends SUBSCRIBE for those with local demand), then re-announces its
//! own published streams if push is enabled.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::sync::RwLock;

use super::link::{ClusterLink, LinkId, LinkRole};
use super::{session, summary, sync, NodeContext};
use crate::error::Result;
use crate::protocol::FrameReader;
use crate::registry::StreamOrigin;

/// Counters of the dial loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UplinkStats {
    /// Dials started
    pub dial_attempts: u64,
    /// Dials that produced a link
    pub connects: u64,
    /// Whether a link to the origin is currently up
    pub connected: bool,
}

/// The current link to the origin, if any
#[derive(Default)]
pub struct Uplink {
    current: RwLock<Option<Arc<ClusterLink>>>,
    dial_attempts: AtomicU64,
    connects: AtomicU64,
}

impl Uplink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live link to the origin
    pub async fn current(&self) -> Option<Arc<ClusterLink>> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|link| !link.is_closed())
            .cloned()
    }

    pub async fn stats(&self) -> UplinkStats {
        UplinkStats {
            dial_attempts: self.dial_attempts.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            connected: self.current().await.is_some(),
        }
    }

    async fn set(&self, link: Arc<ClusterLink>) {
        *self.current.write().await = Some(link);
    }

    async fn clear(&self, id: LinkId) {
        let mut current = self.current.write().await;
        if current.as_ref().map(|link| link.id()) == Some(id) {
            *current = None;
        }
    }
}

/// Random delay before the next dial, uniform within `[min, max]`
pub fn reconnect_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }

    let min_ms = min.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

/// Keep a link to `origin` up for as long as the node runs
pub async fn run(ctx: Arc<NodeContext>, origin: String) {
    loop {
        ctx.uplink.dial_attempts.fetch_add(1, Ordering::Relaxed);

        match TcpStream::connect(origin.as_str()).await {
            Ok(socket) => {
                if ctx.config.tcp_nodelay {
                    if let Err(e) = socket.set_nodelay(true) {
                        tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
                    }
                }

                match socket.peer_addr() {
                    Ok(peer_addr) => {
                        if let Err(e) = connect(Arc::clone(&ctx), socket, peer_addr).await {
                            tracing::warn!(origin = %origin, error = %e, "Origin link failed");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(origin = %origin, error = %e, "Origin connection lost");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Failed to connect to origin");
            }
        }

        let delay = reconnect_delay(ctx.config.reconnect_delay_min, ctx.config.reconnect_delay_max);
        tracing::info!(
            origin = %origin,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to origin"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Run one connection to the origin over `io` until it ends
pub async fn connect<S>(ctx: Arc<NodeContext>, io: S, peer_addr: SocketAddr) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(io);
    let link = ClusterLink::new(LinkRole::Upstream, peer_addr, write_half);
    let reader = FrameReader::with_max_payload(BufReader::new(read_half), ctx.config.max_payload_size);

    ctx.uplink.connects.fetch_add(1, Ordering::Relaxed);
    ctx.uplink.set(Arc::clone(&link)).await;
    tracing::info!(link = %link.id(), origin = %peer_addr, "Connected to origin");

    let result = match resume(&ctx, &link).await {
        Ok(()) => session::run_link(Arc::clone(&ctx), Arc::clone(&link), reader).await,
        Err(e) => {
            session::teardown(&ctx, &link).await;
            Err(e)
        }
    };

    ctx.uplink.clear(link.id()).await;
    result
}

async fn resume(ctx: &Arc<NodeContext>, link: &Arc<ClusterLink>) -> Result<()> {
    summary::send_report(ctx, link).await?;

    let mut rebound = 0;
    let mut pushed = 0;
    for stream in ctx.registry.streams().await {
        match stream.origin() {
            StreamOrigin::Mirrored(previous)
                if previous.role() == LinkRole::Upstream && previous.id() != link.id() =>
            {
                ctx.registry
                    .publish(stream.path(), StreamOrigin::Mirrored(Arc::clone(link)))
                    .await?;
                rebound += 1;
            }
            StreamOrigin::Local if ctx.config.push => {
                if sync::spawn_stream_relay(
                    Arc::clone(&ctx.registry),
                    Arc::clone(link),
                    stream,
                    true,
                    None,
                ) {
                    pushed += 1;
                }
            }
            _ => {}
        }
    }

    if rebound > 0 || pushed > 0 {
        tracing::info!(link = %link.id(), rebound = rebound, pushed = pushed, "Uplink streams restored");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;
    use crate::server::ClusterConfig;

    #[test]
    fn test_reconnect_delay_within_window() {
        let min = Duration::from_secs(5);
        let max = Duration::from_secs(10);
        for _ in 0..1000 {
            let delay = reconnect_delay(min, max);
            assert!(delay >= min && delay <= max, "{:?} outside window", delay);
        }
    }

    #[test]
    fn test_reconnect_delay_degenerate_window() {
        let d = Duration::from_millis(250);
        assert_eq!(reconnect_delay(d, d), d);
        assert_eq!(reconnect_delay(d, Duration::from_millis(100)), d);
    }

    #[tokio::test]
    async fn test_dial_loop_never_gives_up() {
        // Reserve a port, then close it so every dial is refused
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ClusterConfig::default()
            .origin_server(addr.to_string())
            .reconnect_delay(Duration::from_millis(10), Duration::from_millis(20));
        let ctx = NodeContext::new(config);

        let handle = tokio::spawn(run(Arc::clone(&ctx), addr.to_string()));
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!handle.is_finished());
        let stats = ctx.uplink.stats().await;
        assert!(stats.dial_attempts >= 3, "only {} dials", stats.dial_attempts);
        assert_eq!(stats.connects, 0);
        assert!(!stats.connected);

        handle.abort();
    }

    #[tokio::test]
    async fn test_dial_loop_reconnects_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = ClusterConfig::default()
            .origin_server(addr.to_string())
            .reconnect_delay(Duration::from_millis(10), Duration::from_millis(20));
        let ctx = NodeContext::new(config);
        let handle = tokio::spawn(run(Arc::clone(&ctx), addr.to_string()));

        // Accept and immediately drop two connections
        for _ in 0..2 {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        }
        let (_kept, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stats = ctx.uplink.stats().await;
        assert_eq!(stats.connects, 3);
        assert!(stats.connected);

        handle.abort();
    }
}

//! Origin listener
//!
//! Handles the TCP accept loop and spawns one edge session per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::cluster::{session, NodeContext};
use crate::error::Result;

/// Accepts edge connections
pub struct OriginListener {
    ctx: Arc<NodeContext>,
    listener: TcpListener,
}

impl OriginListener {
    /// Bind the listening socket
    ///
    /// A node configured to host edges cannot do its job without this
    /// socket, so the error is returned rather than retried.
    pub async fn bind(ctx: Arc<NodeContext>, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "Cluster origin listening");
        Ok(Self { ctx, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop
    ///
    /// This method only returns if the node is shut down around it.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        tracing::debug!(peer = %peer_addr, "New connection");

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        session::serve_downstream(Arc::clone(&self.ctx), socket, peer_addr);
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.ctx.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ClusterConfig;

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let ctx = NodeContext::new(ClusterConfig::default());
        let first = OriginListener::bind(Arc::clone(&ctx), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let taken = first.local_addr().unwrap();

        let second = OriginListener::bind(ctx, taken).await;
        assert!(second.is_err());
    }
}

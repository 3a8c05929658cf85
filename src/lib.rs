//! Origin/edge cluster replication for live media servers
//!
//! Nodes form a tree: an origin accepts links from edges and relays the
//! streams published on it down to them; edges forward subscriber demand
//! and, when pushing, their own streams back up, reconnecting forever if
//! the origin goes away.
//!
//! # Example
//!
//! ```no_run
//! use media_cluster::{ClusterConfig, ClusterNode};
//!
//! #[tokio::main]
//! async fn main() -> media_cluster::Result<()> {
//!     let config = ClusterConfig::default()
//!         .listen("0.0.0.0:44944".parse().unwrap())
//!         .origin_server("origin.example:44944");
//!
//!     ClusterNode::new(config).run().await
//! }
//! ```

pub mod cluster;
pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stats;

pub use cluster::{ClusterLink, LinkId, LinkRole, NodeContext, UplinkStats};
pub use error::{Error, ProtocolError, Result};
pub use protocol::{Message, Summary};
pub use registry::{
    MediaPacket, RegistryConfig, RegistryError, StreamEntry, StreamEvent, StreamOrigin,
    StreamRegistry, StreamSubscriber, Track, TrackKind,
};
pub use server::{ClusterConfig, ClusterNode, OriginListener, PluginConfig};
pub use stats::ServerSummary;

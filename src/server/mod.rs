//! Cluster server
//!
//! [`ClusterNode`] is the entry point: build it from a [`ClusterConfig`]
//! (or a host [`PluginConfig`]) and run it next to the media server.

pub mod config;
pub mod listener;
pub mod node;

pub use config::{ClusterConfig, PluginConfig};
pub use listener::OriginListener;
pub use node::ClusterNode;

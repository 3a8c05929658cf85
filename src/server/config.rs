//! Cluster configuration

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::protocol::constants::*;

/// Cluster configuration options
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Origin to dial as an edge (`None` = no upstream)
    pub origin_server: Option<String>,

    /// Address to accept edges on (`None` = host no edges)
    pub listen_addr: Option<SocketAddr>,

    /// Send locally published streams up to the origin
    pub push: bool,

    /// Lower bound of the reconnect delay
    pub reconnect_delay_min: Duration,

    /// Upper bound of the reconnect delay
    pub reconnect_delay_max: Duration,

    /// Interval between reports while monitoring is on
    pub report_interval: Duration,

    /// Delay before answering a PULSE
    pub pulse_interval: Duration,

    /// Capacity of the stream lifecycle event channel
    pub event_capacity: usize,

    /// Capacity of each track's packet channel
    pub packet_capacity: usize,

    /// Largest binary field accepted from a peer
    pub max_payload_size: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            origin_server: None,
            listen_addr: None,
            push: true,
            reconnect_delay_min: DEFAULT_RECONNECT_DELAY_MIN,
            reconnect_delay_max: DEFAULT_RECONNECT_DELAY_MAX,
            report_interval: DEFAULT_REPORT_INTERVAL,
            pulse_interval: DEFAULT_PULSE_INTERVAL,
            event_capacity: 1024,
            packet_capacity: 512,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            tcp_nodelay: true, // Important for low latency
        }
    }
}

impl ClusterConfig {
    /// Set the origin to dial
    pub fn origin_server(mut self, addr: impl Into<String>) -> Self {
        self.origin_server = Some(addr.into());
        self
    }

    /// Set the address to accept edges on
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = Some(addr);
        self
    }

    /// Enable or disable pushing local streams upward
    pub fn push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    /// Set the reconnect delay window
    ///
    /// A window given upside down is swapped.
    pub fn reconnect_delay(mut self, min: Duration, max: Duration) -> Self {
        self.reconnect_delay_min = min.min(max);
        self.reconnect_delay_max = max.max(min);
        self
    }

    /// Set the report interval
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Set the pulse answer delay
    pub fn pulse_interval(mut self, interval: Duration) -> Self {
        self.pulse_interval = interval;
        self
    }

    /// Set the per-track packet channel capacity
    pub fn packet_capacity(mut self, capacity: usize) -> Self {
        self.packet_capacity = capacity.max(1);
        self
    }

    /// Set the largest binary field accepted from a peer
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Whether the node takes part in a cluster at all
    pub fn is_enabled(&self) -> bool {
        self.origin_server.is_some() || self.listen_addr.is_some()
    }
}

/// Cluster section of the host's plugin configuration
///
/// Empty strings mean "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PluginConfig {
    pub origin_server: String,
    pub listen_addr: String,
    pub push: Option<bool>,
}

impl TryFrom<PluginConfig> for ClusterConfig {
    type Error = Error;

    fn try_from(raw: PluginConfig) -> Result<Self, Self::Error> {
        let mut config = ClusterConfig::default();

        let origin = raw.origin_server.trim();
        if !origin.is_empty() {
            config.origin_server = Some(origin.to_string());
        }

        let listen = raw.listen_addr.trim();
        if !listen.is_empty() {
            let addr = listen
                .parse()
                .map_err(|e| Error::Config(format!("ListenAddr {:?}: {}", listen, e)))?;
            config.listen_addr = Some(addr);
        }

        if let Some(push) = raw.push {
            config.push = push;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClusterConfig::default();

        assert!(config.origin_server.is_none());
        assert!(config.listen_addr.is_none());
        assert!(config.push);
        assert!(config.tcp_nodelay);
        assert_eq!(config.reconnect_delay_min, Duration::from_secs(5));
        assert_eq!(config.reconnect_delay_max, Duration::from_secs(10));
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "0.0.0.0:44944".parse().unwrap();
        let config = ClusterConfig::default()
            .origin_server("origin.example:44944")
            .listen(addr)
            .push(false)
            .report_interval(Duration::from_millis(500))
            .pulse_interval(Duration::from_millis(250));

        assert_eq!(config.origin_server.as_deref(), Some("origin.example:44944"));
        assert_eq!(config.listen_addr, Some(addr));
        assert!(!config.push);
        assert_eq!(config.report_interval, Duration::from_millis(500));
        assert_eq!(config.pulse_interval, Duration::from_millis(250));
        assert!(config.is_enabled());
    }

    #[test]
    fn test_reconnect_window_is_ordered() {
        let config = ClusterConfig::default()
            .reconnect_delay(Duration::from_secs(9), Duration::from_secs(3));

        assert_eq!(config.reconnect_delay_min, Duration::from_secs(3));
        assert_eq!(config.reconnect_delay_max, Duration::from_secs(9));
    }

    #[test]
    fn test_plugin_config_from_json() {
        let raw: PluginConfig = serde_json::from_str(
            r#"{"OriginServer": "10.0.0.1:44944", "ListenAddr": "0.0.0.0:44945", "Push": false}"#,
        )
        .unwrap();
        let config = ClusterConfig::try_from(raw).unwrap();

        assert_eq!(config.origin_server.as_deref(), Some("10.0.0.1:44944"));
        assert_eq!(config.listen_addr, Some("0.0.0.0:44945".parse().unwrap()));
        assert!(!config.push);
    }

    #[test]
    fn test_plugin_config_empty_means_absent() {
        let raw: PluginConfig = serde_json::from_str(r#"{"OriginServer": "", "ListenAddr": ""}"#).unwrap();
        let config = ClusterConfig::try_from(raw).unwrap();

        assert!(config.origin_server.is_none());
        assert!(config.listen_addr.is_none());
        assert!(config.push);
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_plugin_config_bad_listen_addr() {
        let raw = PluginConfig {
            listen_addr: "not-an-address".into(),
            ..Default::default()
        };
        let err = ClusterConfig::try_from(raw).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

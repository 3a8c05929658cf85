//! Registry configuration

/// Registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Capacity of each track's packet broadcast channel
    ///
    /// A consumer that falls further behind than this skips ahead.
    pub packet_capacity: usize,

    /// Capacity of the lifecycle event channel
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            packet_capacity: 512,
            event_capacity: 1024,
        }
    }
}

impl RegistryConfig {
    /// Set the per-track packet channel capacity
    pub fn packet_capacity(mut self, capacity: usize) -> Self {
        self.packet_capacity = capacity.max(1);
        self
    }

    /// Set the lifecycle event channel capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

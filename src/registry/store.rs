//! Stream registry implementation
//!
//! The central registry that owns every stream known to this node, local or
//! mirrored, and announces their lifecycle to the cluster layer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use super::config::RegistryConfig;
use super::entry::{StreamEntry, StreamOrigin, StreamStats};
use super::error::RegistryError;
use super::event::StreamEvent;
use super::subscriber::StreamSubscriber;
use crate::cluster::LinkId;

/// Central registry for all active streams
///
/// Thread-safe via `RwLock`. Lookups during relaying and broadcasting take
/// the read side; only publish and close take the write side.
pub struct StreamRegistry {
    /// Map of stream path to stream entry
    streams: RwLock<HashMap<String, Arc<StreamEntry>>>,

    /// Lifecycle announcements
    events: broadcast::Sender<StreamEvent>,

    /// Configuration
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a new stream registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            streams: RwLock::new(HashMap::new()),
            events,
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Receive lifecycle events from now on
    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Look up a stream by path
    pub async fn find_stream(&self, path: &str) -> Option<Arc<StreamEntry>> {
        self.streams.read().await.get(path).cloned()
    }

    /// Publish a stream
    ///
    /// A new path is created. An existing mirrored stream is updated in place:
    /// a local publisher takes it over, and another mirror announcement just
    /// rebinds it to the announcing link. A locally published stream cannot
    /// be published again.
    pub async fn publish(
        &self,
        path: &str,
        origin: StreamOrigin,
    ) -> Result<Arc<StreamEntry>, RegistryError> {
        let mut streams = self.streams.write().await;

        let Some(entry) = streams.get(path).cloned() else {
            let entry = Arc::new(StreamEntry::new(
                path.to_string(),
                origin.clone(),
                self.config.packet_capacity,
                self.events.clone(),
            ));
            streams.insert(path.to_string(), Arc::clone(&entry));

            tracing::info!(stream = %path, origin = ?origin, "Stream published (new stream)");
            let _ = self.events.send(StreamEvent::Published {
                path: path.to_string(),
                origin,
            });
            return Ok(entry);
        };

        match (entry.origin(), &origin) {
            (StreamOrigin::Local, _) => {
                return Err(RegistryError::StreamAlreadyPublishing(path.to_string()));
            }
            (StreamOrigin::Mirrored(previous), StreamOrigin::Local) => {
                entry.set_origin(StreamOrigin::Local);
                tracing::info!(
                    stream = %path,
                    previous_link = %previous.id(),
                    subscribers = entry.subscriber_count(),
                    "Local publisher took over mirrored stream"
                );
                let _ = self.events.send(StreamEvent::Published {
                    path: path.to_string(),
                    origin,
                });
            }
            (StreamOrigin::Mirrored(previous), StreamOrigin::Mirrored(link)) => {
                if previous.id() != link.id() {
                    tracing::info!(
                        stream = %path,
                        previous_link = %previous.id(),
                        link = %link.id(),
                        "Mirrored stream rebound"
                    );
                }
                entry.set_origin(origin);
            }
        }

        Ok(entry)
    }

    /// Close a stream
    ///
    /// Returns the removed entry, if there was one.
    pub async fn close(&self, path: &str) -> Option<Arc<StreamEntry>> {
        let entry = self.streams.write().await.remove(path)?;
        self.announce_closed(&entry);
        Some(entry)
    }

    /// Close a stream only if it is mirrored from the given link
    ///
    /// An UNPUBLISH from a link that is not the stream's source is ignored.
    pub async fn close_from(&self, path: &str, link: LinkId) -> bool {
        let mut streams = self.streams.write().await;

        let owned = streams
            .get(path)
            .map(|entry| entry.origin().is_from(link))
            .unwrap_or(false);
        if !owned {
            return false;
        }

        if let Some(entry) = streams.remove(path) {
            self.announce_closed(&entry);
        }
        true
    }

    /// Close every stream mirrored from the given link
    ///
    /// Returns the number of streams closed.
    pub async fn close_mirrored_from(&self, link: LinkId) -> usize {
        let mut streams = self.streams.write().await;

        let paths: Vec<String> = streams
            .iter()
            .filter(|(_, entry)| entry.origin().is_from(link))
            .map(|(path, _)| path.clone())
            .collect();

        for path in &paths {
            if let Some(entry) = streams.remove(path) {
                self.announce_closed(&entry);
            }
        }

        paths.len()
    }

    fn announce_closed(&self, entry: &StreamEntry) {
        let origin = entry.origin();
        tracing::info!(stream = %entry.path(), origin = ?origin, "Stream closed");
        let _ = self.events.send(StreamEvent::Closed {
            path: entry.path().to_string(),
            origin,
        });
    }

    /// Subscribe to a stream
    ///
    /// The returned handle counts as demand until it is dropped.
    pub async fn subscribe(&self, path: &str) -> Result<StreamSubscriber, RegistryError> {
        let entry = self
            .find_stream(path)
            .await
            .ok_or_else(|| RegistryError::StreamNotFound(path.to_string()))?;

        Ok(entry.subscribe())
    }

    /// Snapshot of all streams
    pub async fn streams(&self) -> Vec<Arc<StreamEntry>> {
        self.streams.read().await.values().cloned().collect()
    }

    /// Get stream statistics
    pub async fn get_stream_stats(&self, path: &str) -> Option<StreamStats> {
        let entry = self.find_stream(path).await?;
        Some(StreamStats {
            subscriber_count: entry.subscriber_count(),
            mirrored: entry.is_mirrored(),
            track_count: entry.tracks().await.len(),
        })
    }

    /// Get total number of streams
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

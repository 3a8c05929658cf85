//! Stream entry and origin types
//!
//! This module defines the per-stream state stored in the registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::{broadcast, RwLock};

use super::event::StreamEvent;
use super::subscriber::StreamSubscriber;
use super::track::{Track, TrackKind};
use crate::cluster::{ClusterLink, LinkId};

/// Where a stream's media comes from
#[derive(Clone)]
pub enum StreamOrigin {
    /// Published by a producer on this node
    Local,
    /// Mirrored from a remote node; packets arrive on this link
    Mirrored(Arc<ClusterLink>),
}

impl StreamOrigin {
    pub fn is_local(&self) -> bool {
        matches!(self, StreamOrigin::Local)
    }

    /// Link the stream arrives on, if mirrored
    pub fn link(&self) -> Option<&Arc<ClusterLink>> {
        match self {
            StreamOrigin::Local => None,
            StreamOrigin::Mirrored(link) => Some(link),
        }
    }

    pub fn link_id(&self) -> Option<LinkId> {
        self.link().map(|link| link.id())
    }

    /// Whether the stream is mirrored from the given link
    pub fn is_from(&self, id: LinkId) -> bool {
        self.link_id() == Some(id)
    }

    fn same_as(&self, other: &StreamOrigin) -> bool {
        match (self, other) {
            (StreamOrigin::Local, StreamOrigin::Local) => true,
            (StreamOrigin::Mirrored(a), StreamOrigin::Mirrored(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl fmt::Debug for StreamOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamOrigin::Local => write!(f, "Local"),
            StreamOrigin::Mirrored(link) => {
                write!(f, "Mirrored({} via {})", link.id(), link.peer_addr())
            }
        }
    }
}

/// Entry for a single stream in the registry
pub struct StreamEntry {
    path: String,

    /// Current origin; replaced when a publish updates the stream
    origin: Mutex<StreamOrigin>,

    /// All tracks created on this stream, keyed by name
    tracks: RwLock<HashMap<String, Track>>,

    /// Number of local subscribers
    ///
    /// Guarded together with the demand event so transitions are announced
    /// in the same order they happen.
    subscribers: Mutex<u32>,

    /// Capacity of each track's packet channel
    packet_capacity: usize,

    /// When the stream was created
    pub created_at: Instant,

    events: broadcast::Sender<StreamEvent>,
}

impl StreamEntry {
    pub(super) fn new(
        path: String,
        origin: StreamOrigin,
        packet_capacity: usize,
        events: broadcast::Sender<StreamEvent>,
    ) -> Self {
        Self {
            path,
            origin: Mutex::new(origin),
            tracks: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(0),
            packet_capacity,
            created_at: Instant::now(),
            events,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn origin(&self) -> StreamOrigin {
        self.origin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_mirrored(&self) -> bool {
        !self.origin().is_local()
    }

    /// Replace the origin, moving any outstanding demand to the new one
    ///
    /// Returns the previous origin.
    pub(super) fn set_origin(&self, origin: StreamOrigin) -> StreamOrigin {
        let subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = {
            let mut current = self.origin.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, origin.clone())
        };

        if *subscribers > 0 && !previous.same_as(&origin) {
            self.emit_demand(previous.clone(), false);
            self.emit_demand(origin, true);
        }

        previous
    }

    /// Get the named track, creating it if needed
    ///
    /// An existing track of the same kind is reused with its codec updated,
    /// so consumers already attached to it keep receiving packets. A track of
    /// the other kind under the same name is replaced.
    pub async fn new_track(&self, kind: TrackKind, name: &str, codec: u8) -> Track {
        let mut tracks = self.tracks.write().await;

        if let Some(existing) = tracks.get(name) {
            if existing.kind() == kind {
                existing.set_codec(codec);
                return existing.clone();
            }
        }

        let track = Track::new(kind, name, codec, self.packet_capacity);
        tracks.insert(name.to_string(), track.clone());
        track
    }

    /// Make a track visible in the stream's track set
    ///
    /// Emits [`StreamEvent::TrackAdded`] the first time only.
    pub async fn add_track(&self, track: &Track) {
        let tracks = self.tracks.read().await;
        let current = tracks.get(track.name()).map(|t| t.ptr_eq(track)).unwrap_or(false);
        if !current {
            return;
        }

        if track.mark_published() {
            tracing::debug!(
                stream = %self.path,
                track = track.name(),
                kind = ?track.kind(),
                "Track added"
            );
            let _ = self.events.send(StreamEvent::TrackAdded {
                path: self.path.clone(),
                name: track.name().to_string(),
            });
        }
    }

    /// Published tracks, in no particular order
    pub async fn tracks(&self) -> Vec<Track> {
        self.tracks
            .read()
            .await
            .values()
            .filter(|t| t.is_published())
            .cloned()
            .collect()
    }

    /// Look up a published track by name
    pub async fn track(&self, name: &str) -> Option<Track> {
        self.tracks
            .read()
            .await
            .get(name)
            .filter(|t| t.is_published())
            .cloned()
    }

    /// Register demand on this stream
    pub fn subscribe(self: &Arc<Self>) -> StreamSubscriber {
        StreamSubscriber::attach(Arc::clone(self))
    }

    /// Get the number of subscribers
    pub fn subscriber_count(&self) -> u32 {
        *self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn add_subscriber(&self) {
        let mut count = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
        tracing::debug!(stream = %self.path, subscribers = *count, "Subscriber added");

        if *count == 1 {
            self.emit_demand(self.origin(), true);
        }
    }

    pub(super) fn remove_subscriber(&self) {
        let mut count = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        if *count == 0 {
            return;
        }
        *count -= 1;
        tracing::debug!(stream = %self.path, subscribers = *count, "Subscriber removed");

        if *count == 0 {
            self.emit_demand(self.origin(), false);
        }
    }

    fn emit_demand(&self, origin: StreamOrigin, active: bool) {
        if origin.is_local() {
            return;
        }
        let _ = self.events.send(StreamEvent::Demand {
            path: self.path.clone(),
            origin,
            active,
        });
    }
}

/// Statistics for a stream
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Number of active subscribers
    pub subscriber_count: u32,
    /// Whether the stream is mirrored from another node
    pub mirrored: bool,
    /// Number of published tracks
    pub track_count: usize,
}

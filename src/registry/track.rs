//! Media tracks
//!
//! A track is one elementary stream inside a stream path. Packets pushed
//! into a track are fanned out over a `tokio::sync::broadcast` channel, so
//! every consumer shares the same `Bytes` allocation.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::broadcast;

use crate::media::flv;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

/// A timestamped chunk of a track's byte stream
#[derive(Debug, Clone)]
pub struct MediaPacket {
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// FLV tag body (zero-copy via reference counting)
    pub payload: Bytes,
}

/// Shared state behind a [`Track`]
#[derive(Debug)]
pub struct MediaTrack {
    name: String,
    codec: AtomicU8,
    /// Last decoder configuration record seen on this track
    extra_data: Mutex<Bytes>,
    /// Whether the track is visible in its stream's track set
    published: AtomicBool,
    tx: broadcast::Sender<MediaPacket>,
}

/// Handle to a video or audio track
///
/// Cheap to clone; all clones refer to the same track.
#[derive(Debug, Clone)]
pub enum Track {
    Video(Arc<MediaTrack>),
    Audio(Arc<MediaTrack>),
}

impl Track {
    /// Create a detached track
    pub fn new(kind: TrackKind, name: impl Into<String>, codec: u8, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let inner = Arc::new(MediaTrack {
            name: name.into(),
            codec: AtomicU8::new(codec),
            extra_data: Mutex::new(Bytes::new()),
            published: AtomicBool::new(false),
            tx,
        });

        match kind {
            TrackKind::Video => Track::Video(inner),
            TrackKind::Audio => Track::Audio(inner),
        }
    }

    fn inner(&self) -> &Arc<MediaTrack> {
        match self {
            Track::Video(t) | Track::Audio(t) => t,
        }
    }

    pub fn kind(&self) -> TrackKind {
        match self {
            Track::Video(_) => TrackKind::Video,
            Track::Audio(_) => TrackKind::Audio,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner().name
    }

    pub fn codec(&self) -> u8 {
        self.inner().codec.load(Ordering::Relaxed)
    }

    pub(crate) fn set_codec(&self, codec: u8) {
        self.inner().codec.store(codec, Ordering::Relaxed);
    }

    /// Decoder configuration record, empty until one has been pushed
    pub fn extra_data(&self) -> Bytes {
        self.inner()
            .extra_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Push a chunk of the track's byte stream
    ///
    /// Sequence headers are also kept as the track's extra data so they can
    /// be announced to consumers that attach later. Returns the number of
    /// consumers the packet reached.
    pub fn push_byte_stream(&self, timestamp: u32, payload: Bytes) -> usize {
        let is_header = match self.kind() {
            TrackKind::Video => flv::is_video_sequence_header(&payload),
            TrackKind::Audio => flv::is_audio_sequence_header(&payload),
        };
        if is_header {
            *self
                .inner()
                .extra_data
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = payload.clone();
        }

        self.inner()
            .tx
            .send(MediaPacket { timestamp, payload })
            .unwrap_or(0)
    }

    /// Attach a consumer to this track's packets
    pub fn subscribe(&self) -> broadcast::Receiver<MediaPacket> {
        self.inner().tx.subscribe()
    }

    pub fn is_published(&self) -> bool {
        self.inner().published.load(Ordering::Acquire)
    }

    /// Mark the track published; returns true on the first call only
    pub(crate) fn mark_published(&self) -> bool {
        !self.inner().published.swap(true, Ordering::AcqRel)
    }

    /// Whether two handles refer to the same track
    pub fn ptr_eq(&self, other: &Track) -> bool {
        self.kind() == other.kind() && Arc::ptr_eq(self.inner(), other.inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_reaches_subscribers() {
        let track = Track::new(TrackKind::Video, "h264", 7, 16);
        let mut rx = track.subscribe();

        let sent = track.push_byte_stream(40, Bytes::from_static(&[0x27, 0x01, 0xAA]));
        assert_eq!(sent, 1);

        let packet = rx.recv().await.unwrap();
        assert_eq!(packet.timestamp, 40);
        assert_eq!(&packet.payload[..], &[0x27, 0x01, 0xAA]);
    }

    #[test]
    fn test_push_without_subscribers() {
        let track = Track::new(TrackKind::Audio, "aac", 10, 16);
        assert_eq!(track.push_byte_stream(0, Bytes::from_static(&[0xAF, 0x01])), 0);
    }

    #[test]
    fn test_sequence_header_becomes_extra_data() {
        let track = Track::new(TrackKind::Video, "h264", 7, 16);
        assert!(track.extra_data().is_empty());

        let header = Bytes::from_static(&[0x17, 0x00, 0x00, 0x00, 0x00, 0x01, 0x64]);
        track.push_byte_stream(0, header.clone());
        assert_eq!(track.extra_data(), header);

        // Ordinary frames leave it alone
        track.push_byte_stream(33, Bytes::from_static(&[0x17, 0x01, 0x00, 0x00, 0x00]));
        assert_eq!(track.extra_data(), header);
    }

    #[test]
    fn test_audio_header_detection_is_per_kind() {
        // An AAC header pushed into a video track is just data
        let track = Track::new(TrackKind::Video, "v", 7, 16);
        track.push_byte_stream(0, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]));
        assert!(track.extra_data().is_empty());

        let audio = Track::new(TrackKind::Audio, "a", 10, 16);
        audio.push_byte_stream(0, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]));
        assert_eq!(&audio.extra_data()[..], &[0xAF, 0x00, 0x12, 0x10]);
    }

    #[test]
    fn test_mark_published_once() {
        let track = Track::new(TrackKind::Audio, "aac", 10, 16);
        assert!(!track.is_published());
        assert!(track.mark_published());
        assert!(!track.mark_published());
        assert!(track.is_published());
    }

    #[test]
    fn test_clones_share_state() {
        let track = Track::new(TrackKind::Video, "h264", 7, 16);
        let clone = track.clone();
        clone.set_codec(12);

        assert_eq!(track.codec(), 12);
        assert!(track.ptr_eq(&clone));
        assert!(!track.ptr_eq(&Track::new(TrackKind::Video, "h264", 7, 16)));
    }
}

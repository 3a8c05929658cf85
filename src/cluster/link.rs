//! Cluster link
//!
//! One logical connection between two nodes. Every message for every stream
//! path shares the link's single byte stream, so each write takes the writer
//! lock for the whole frame and flushes before releasing it.
//!
//! The link also carries the per-connection state the message loop mutates:
//! the track map filled by track announcements, the relays started on behalf
//! of the peer, and the periodic reporter when the peer asked for reports.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::{ProtocolError, Result};
use crate::protocol::{Message, Summary};
use crate::registry::{MediaPacket, StreamSubscriber, Track, TrackKind};

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique link identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

impl LinkId {
    fn next() -> Self {
        LinkId(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Which end of the origin/edge relationship the peer is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// We dialed the peer; it is our origin
    Upstream,
    /// The peer dialed us; it is one of our edges
    Downstream,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Tracks announced on a link: path -> track name -> track
type TrackMap = HashMap<String, HashMap<String, Track>>;

/// A relay running on a link
struct RelaySlot {
    token: CancellationToken,
    /// Started by the peer's SUBSCRIBE rather than by fan-out or push
    subscribed: bool,
    /// Demand held for the peer while it is subscribed
    demand: Option<StreamSubscriber>,
}

/// One cluster connection
pub struct ClusterLink {
    id: LinkId,
    role: LinkRole,
    peer_addr: SocketAddr,

    writer: AsyncMutex<BufWriter<BoxedWriter>>,

    tracks: RwLock<TrackMap>,

    /// Relays feeding this link, keyed by stream path
    relays: Mutex<HashMap<String, RelaySlot>>,

    /// Periodic report task for this link, if the peer requested one
    reporter: Mutex<Option<CancellationToken>>,

    /// Parent of every task working on behalf of this link
    cancel: CancellationToken,
}

impl ClusterLink {
    /// Create a link writing to `writer`
    pub fn new<W>(role: LinkRole, peer_addr: SocketAddr, writer: W) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Arc::new(Self {
            id: LinkId::next(),
            role,
            peer_addr,
            writer: AsyncMutex::new(BufWriter::new(Box::new(writer))),
            tracks: RwLock::new(HashMap::new()),
            relays: Mutex::new(HashMap::new()),
            reporter: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn role(&self) -> LinkRole {
        self.role
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Close the link, stopping every task working for it
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the link has been closed
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Write one complete frame
    ///
    /// The frame is encoded before the writer lock is taken, and the lock is
    /// held until the frame has been flushed.
    pub async fn send(&self, message: &Message) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::NotConnected.into());
        }

        let frame = message.to_bytes()?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn write_audio(
        &self,
        path: &str,
        track: &str,
        timestamp: u32,
        payload: Bytes,
    ) -> Result<()> {
        self.send(&Message::Audio {
            path: path.to_string(),
            track: track.to_string(),
            timestamp,
            payload,
        })
        .await
    }

    pub async fn write_video(
        &self,
        path: &str,
        track: &str,
        timestamp: u32,
        payload: Bytes,
    ) -> Result<()> {
        self.send(&Message::Video {
            path: path.to_string(),
            track: track.to_string(),
            timestamp,
            payload,
        })
        .await
    }

    pub async fn write_subscribe(&self, path: &str) -> Result<()> {
        self.send(&Message::Subscribe {
            path: path.to_string(),
        })
        .await
    }

    pub async fn write_unsubscribe(&self, path: &str) -> Result<()> {
        self.send(&Message::Unsubscribe {
            path: path.to_string(),
        })
        .await
    }

    /// Ask the peer to start or stop periodic reporting
    pub async fn write_summary_order(&self, start: bool) -> Result<()> {
        let order = if start { Summary::Start } else { Summary::Stop };
        self.send(&Message::Summary(order)).await
    }

    pub async fn write_summary_report(&self, json: String) -> Result<()> {
        self.send(&Message::Summary(Summary::Report(json))).await
    }

    pub async fn write_publish(&self, path: &str) -> Result<()> {
        self.send(&Message::Publish {
            path: path.to_string(),
        })
        .await
    }

    pub async fn write_unpublish(&self, path: &str) -> Result<()> {
        self.send(&Message::Unpublish {
            path: path.to_string(),
        })
        .await
    }

    pub async fn write_video_track(
        &self,
        path: &str,
        track: &str,
        codec: u8,
        extra_data: Bytes,
    ) -> Result<()> {
        self.send(&Message::VideoTrack {
            path: path.to_string(),
            track: track.to_string(),
            codec,
            extra_data,
        })
        .await
    }

    pub async fn write_audio_track(
        &self,
        path: &str,
        track: &str,
        codec: u8,
        extra_data: Bytes,
    ) -> Result<()> {
        self.send(&Message::AudioTrack {
            path: path.to_string(),
            track: track.to_string(),
            codec,
            extra_data,
        })
        .await
    }

    pub async fn write_pulse(&self) -> Result<()> {
        self.send(&Message::Pulse).await
    }

    /// Announce a track with its current codec and extra data
    pub async fn write_track(&self, path: &str, track: &Track) -> Result<()> {
        match track {
            Track::Video(_) => {
                self.write_video_track(path, track.name(), track.codec(), track.extra_data())
                    .await
            }
            Track::Audio(_) => {
                self.write_audio_track(path, track.name(), track.codec(), track.extra_data())
                    .await
            }
        }
    }

    /// Forward one packet of a track
    pub async fn write_packet(&self, path: &str, track: &Track, packet: MediaPacket) -> Result<()> {
        match track.kind() {
            TrackKind::Video => {
                self.write_video(path, track.name(), packet.timestamp, packet.payload)
                    .await
            }
            TrackKind::Audio => {
                self.write_audio(path, track.name(), packet.timestamp, packet.payload)
                    .await
            }
        }
    }

    /// Remember the track announced for (path, name), replacing any earlier one
    pub async fn register_track(&self, path: &str, name: &str, track: Track) {
        let mut tracks = self.tracks.write().await;
        tracks
            .entry(path.to_string())
            .or_default()
            .insert(name.to_string(), track);
    }

    /// Look up the track announced for (path, name)
    pub async fn lookup_track(&self, path: &str, name: &str) -> Option<Track> {
        let tracks = self.tracks.read().await;
        tracks.get(path).and_then(|t| t.get(name)).cloned()
    }

    /// Push a packet into the track announced for (path, name)
    ///
    /// The track map stays read-locked for the lookup and the push, so a
    /// concurrent release cannot hand the packet to a dropped track.
    pub async fn push_to_track(
        &self,
        kind: TrackKind,
        path: &str,
        name: &str,
        timestamp: u32,
        payload: Bytes,
    ) -> Result<usize> {
        let tracks = self.tracks.read().await;
        let track = tracks
            .get(path)
            .and_then(|t| t.get(name))
            .filter(|t| t.kind() == kind)
            .ok_or_else(|| ProtocolError::TrackAbsent {
                path: path.to_string(),
                name: name.to_string(),
            })?;

        Ok(track.push_byte_stream(timestamp, payload))
    }

    /// Forget the tracks announced for one path
    pub async fn release_stream(&self, path: &str) -> usize {
        let mut tracks = self.tracks.write().await;
        tracks.remove(path).map(|t| t.len()).unwrap_or(0)
    }

    /// Forget every track announced on this link
    pub async fn release_tracks(&self) -> usize {
        let mut tracks = self.tracks.write().await;
        let count = tracks.values().map(HashMap::len).sum();
        tracks.clear();
        count
    }

    /// Reserve the relay slot for `path`
    ///
    /// Returns a token for the new relay, or `None` if a relay for this path
    /// is already running on the link. `demand` is the peer's SUBSCRIBE: a
    /// relay started with it belongs to that subscription, and when the slot
    /// is already taken the demand is kept on the running relay instead.
    /// A relay started without demand (fan-out or push) also claims a
    /// running subscribed relay, so a later UNSUBSCRIBE leaves it alone.
    pub fn start_relay(
        &self,
        path: &str,
        demand: Option<StreamSubscriber>,
    ) -> Option<CancellationToken> {
        if self.is_closed() {
            return None;
        }

        let mut relays = self.relays.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = relays.get_mut(path) {
            if !slot.token.is_cancelled() {
                match demand {
                    Some(demand) if slot.demand.is_none() => slot.demand = Some(demand),
                    Some(_) => {}
                    None => slot.subscribed = false,
                }
                return None;
            }
        }

        let token = self.cancel.child_token();
        let previous = relays.insert(
            path.to_string(),
            RelaySlot {
                token: token.clone(),
                subscribed: demand.is_some(),
                demand,
            },
        );
        drop(relays);
        drop(previous);

        Some(token)
    }

    /// Stop the relay for `path`
    ///
    /// Returns true if the link had been relaying the path.
    pub fn stop_relay(&self, path: &str) -> bool {
        let slot = self
            .relays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);

        match slot {
            Some(slot) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Withdraw the peer's subscription to `path`
    ///
    /// Cancels the relay only if the subscription started it; a fan-out or
    /// push relay keeps running and just loses the demand. Returns whether
    /// there was a subscription to withdraw.
    pub fn unsubscribe_relay(&self, path: &str) -> bool {
        let mut relays = self.relays.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = relays.get_mut(path) else {
            return false;
        };

        if slot.subscribed {
            let slot = relays.remove(path);
            drop(relays);
            if let Some(slot) = slot {
                slot.token.cancel();
            }
            return true;
        }

        let demand = slot.demand.take();
        drop(relays);
        demand.is_some()
    }

    /// Stop every relay on the link; returns how many were running
    pub fn stop_relays(&self) -> usize {
        let slots: Vec<RelaySlot> = self
            .relays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, slot)| slot)
            .collect();

        slots
            .iter()
            .filter(|slot| !slot.token.is_cancelled())
            .inspect(|slot| slot.token.cancel())
            .count()
    }

    /// Whether a relay for `path` is running on this link
    pub fn is_relaying(&self, path: &str) -> bool {
        self.relays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|slot| !slot.token.is_cancelled())
            .unwrap_or(false)
    }

    /// Whether the peer holds a subscription to `path` on this link
    pub fn is_subscribed(&self, path: &str) -> bool {
        self.relays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|slot| slot.demand.is_some())
            .unwrap_or(false)
    }

    /// Reserve the reporter slot
    ///
    /// Returns `None` if a reporter is already running.
    pub fn start_reporting(&self) -> Option<CancellationToken> {
        let mut reporter = self.reporter.lock().unwrap_or_else(PoisonError::into_inner);
        if reporter.as_ref().map(|t| !t.is_cancelled()).unwrap_or(false) {
            return None;
        }

        let token = self.cancel.child_token();
        *reporter = Some(token.clone());
        Some(token)
    }

    /// Stop the reporter, if one is running
    pub fn stop_reporting(&self) -> bool {
        let token = self
            .reporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match token {
            Some(token) => {
                let was_running = !token.is_cancelled();
                token.cancel();
                was_running
            }
            None => false,
        }
    }
}

impl fmt::Debug for ClusterLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterLink")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

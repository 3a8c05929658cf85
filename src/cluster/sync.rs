//! Track synchronization and relaying
//!
//! Inbound: track announcements create or update tracks on a mirrored
//! stream and register them in the link's track map; media packets are
//! pushed into the registered track.
//!
//! Outbound: a stream relay forwards every track of a stream to one link,
//! one task per track. Each track task writes its announcement before its
//! first packet, so the peer always sees VIDEOTRACK/AUDIOTRACK ahead of the
//! data for that track.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::link::ClusterLink;
use crate::error::Result;
use crate::registry::{
    StreamEntry, StreamEvent, StreamOrigin, StreamRegistry, StreamSubscriber, Track, TrackKind,
};

/// Handle a VIDEOTRACK or AUDIOTRACK announcement received on `link`
///
/// The stream is created as mirrored from `link` if it does not exist yet.
/// A non-empty extra data blob is pushed into the track as its first chunk.
pub async fn on_track_announced(
    registry: &StreamRegistry,
    link: &Arc<ClusterLink>,
    kind: TrackKind,
    path: &str,
    name: &str,
    codec: u8,
    extra_data: Bytes,
) -> Result<()> {
    let stream = registry
        .publish(path, StreamOrigin::Mirrored(Arc::clone(link)))
        .await?;

    let track = stream.new_track(kind, name, codec).await;
    link.register_track(path, name, track.clone()).await;

    tracing::debug!(
        link = %link.id(),
        stream = %path,
        track = name,
        kind = ?kind,
        codec = codec,
        extra_data = extra_data.len(),
        "Track announced"
    );

    if !extra_data.is_empty() {
        track.push_byte_stream(0, extra_data);
    }
    stream.add_track(&track).await;

    Ok(())
}

/// Handle an AUDIO or VIDEO packet received on `link`
///
/// Fails with [`ProtocolError::TrackAbsent`](crate::error::ProtocolError::TrackAbsent)
/// if the track was never announced on this link.
pub async fn on_packet(
    link: &ClusterLink,
    kind: TrackKind,
    path: &str,
    name: &str,
    timestamp: u32,
    payload: Bytes,
) -> Result<()> {
    link.push_to_track(kind, path, name, timestamp, payload)
        .await
        .map(|_| ())
}

/// Start relaying `stream` to `link`
///
/// With `announce` set, PUBLISH is written before any track. `demand` is the
/// peer's subscription and stays on the link's relay slot until the peer
/// unsubscribes or the relay stops. Returns false if the link already relays
/// this path; the demand then joins the running relay.
pub fn spawn_stream_relay(
    registry: Arc<StreamRegistry>,
    link: Arc<ClusterLink>,
    stream: Arc<StreamEntry>,
    announce: bool,
    demand: Option<StreamSubscriber>,
) -> bool {
    let Some(token) = link.start_relay(stream.path(), demand) else {
        return false;
    };

    tracing::debug!(
        link = %link.id(),
        peer = %link.peer_addr(),
        stream = %stream.path(),
        announce = announce,
        "Relay started"
    );

    tokio::spawn(relay_stream(registry, link, stream, token, announce));
    true
}

async fn relay_stream(
    registry: Arc<StreamRegistry>,
    link: Arc<ClusterLink>,
    stream: Arc<StreamEntry>,
    token: CancellationToken,
    announce: bool,
) {
    let path = stream.path().to_string();

    // Subscribe before the snapshot so no track slips between the two
    let mut events = registry.events();

    if announce {
        if let Err(e) = link.write_publish(&path).await {
            tracing::debug!(link = %link.id(), stream = %path, error = %e, "Relay announce failed");
            token.cancel();
            return;
        }
    }

    let mut relayed = HashSet::new();
    relay_new_tracks(&link, &stream, &token, &mut relayed).await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            event = events.recv() => match event {
                Ok(StreamEvent::TrackAdded { path: p, name }) if p == path => {
                    if let Some(track) = stream.track(&name).await {
                        if relayed.insert(name) {
                            spawn_track_relay(Arc::clone(&link), path.clone(), track, token.child_token());
                        }
                    }
                }
                Ok(StreamEvent::Closed { path: p, .. }) if p == path => break,
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(stream = %path, skipped = n, "Relay lagged on stream events");
                    relay_new_tracks(&link, &stream, &token, &mut relayed).await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    token.cancel();
    tracing::debug!(link = %link.id(), stream = %path, "Relay stopped");
}

async fn relay_new_tracks(
    link: &Arc<ClusterLink>,
    stream: &StreamEntry,
    token: &CancellationToken,
    relayed: &mut HashSet<String>,
) {
    for track in stream.tracks().await {
        if relayed.insert(track.name().to_string()) {
            spawn_track_relay(
                Arc::clone(link),
                stream.path().to_string(),
                track,
                token.child_token(),
            );
        }
    }
}

fn spawn_track_relay(link: Arc<ClusterLink>, path: String, track: Track, token: CancellationToken) {
    tokio::spawn(async move {
        let mut packets = track.subscribe();

        if let Err(e) = link.write_track(&path, &track).await {
            tracing::debug!(link = %link.id(), stream = %path, track = track.name(), error = %e, "Track announce failed");
            return;
        }

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                packet = packets.recv() => match packet {
                    Ok(packet) => {
                        if let Err(e) = link.write_packet(&path, &track, packet).await {
                            tracing::debug!(
                                link = %link.id(),
                                stream = %path,
                                track = track.name(),
                                error = %e,
                                "Track relay write failed"
                            );
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(
                            link = %link.id(),
                            stream = %path,
                            track = track.name(),
                            skipped = n,
                            "Track relay lagged"
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    });
}

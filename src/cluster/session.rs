//! Link message loop
//!
//! Both ends of a link run the same loop: read one frame, dispatch it, and
//! repeat until the peer goes away or a frame leaves the stream in an
//! unknown state. Errors that only concern one message are logged and the
//! loop carries on.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};
use tokio::task::JoinHandle;

use super::link::{ClusterLink, LinkRole};
use super::{summary, sync, NodeContext};
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{FrameReader, Message, Summary};
use crate::registry::{StreamOrigin, TrackKind};

/// Serve an edge that connected to us
///
/// Sends the first PULSE, then runs the message loop on its own task.
pub fn serve_downstream<S>(
    ctx: Arc<NodeContext>,
    io: S,
    peer_addr: SocketAddr,
) -> (Arc<ClusterLink>, JoinHandle<()>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(io);
    let link = ClusterLink::new(LinkRole::Downstream, peer_addr, write_half);
    let reader = FrameReader::with_max_payload(BufReader::new(read_half), ctx.config.max_payload_size);

    let task_link = Arc::clone(&link);
    let handle = tokio::spawn(async move {
        let link = task_link;
        tracing::info!(link = %link.id(), peer = %peer_addr, "Edge connected");

        let result = match link.write_pulse().await {
            Ok(()) => run_link(ctx, Arc::clone(&link), reader).await,
            Err(e) => {
                teardown(&ctx, &link).await;
                Err(e)
            }
        };

        if let Err(e) = result {
            tracing::warn!(link = %link.id(), peer = %peer_addr, error = %e, "Edge link failed");
        }
    });

    (link, handle)
}

/// Read and dispatch messages until the link ends, then tear it down
pub async fn run_link<R>(
    ctx: Arc<NodeContext>,
    link: Arc<ClusterLink>,
    mut reader: FrameReader<R>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let result = loop {
        let message = tokio::select! {
            _ = link.closed() => break Ok(()),
            message = reader.read_message() => message,
        };

        match message {
            Ok(Some(message)) => {
                if let Err(e) = dispatch(&ctx, &link, message).await {
                    if e.closes_link() {
                        break Err(e);
                    }
                    log_dropped(&link, &e);
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    teardown(&ctx, &link).await;
    result
}

fn log_dropped(link: &ClusterLink, error: &Error) {
    match error {
        Error::Protocol(ProtocolError::TrackAbsent { path, name }) => {
            tracing::trace!(link = %link.id(), stream = %path, track = %name, "Packet for unknown track dropped");
        }
        _ => {
            tracing::warn!(link = %link.id(), peer = %link.peer_addr(), error = %error, "Message dropped");
        }
    }
}

async fn dispatch(ctx: &Arc<NodeContext>, link: &Arc<ClusterLink>, message: Message) -> Result<()> {
    match message {
        Message::Audio {
            path,
            track,
            timestamp,
            payload,
        } => sync::on_packet(link, TrackKind::Audio, &path, &track, timestamp, payload).await,
        Message::Video {
            path,
            track,
            timestamp,
            payload,
        } => sync::on_packet(link, TrackKind::Video, &path, &track, timestamp, payload).await,
        Message::VideoTrack {
            path,
            track,
            codec,
            extra_data,
        } => {
            sync::on_track_announced(&ctx.registry, link, TrackKind::Video, &path, &track, codec, extra_data)
                .await
        }
        Message::AudioTrack {
            path,
            track,
            codec,
            extra_data,
        } => {
            sync::on_track_announced(&ctx.registry, link, TrackKind::Audio, &path, &track, codec, extra_data)
                .await
        }
        Message::Publish { path } => on_publish(ctx, link, &path).await,
        Message::Unpublish { path } => on_unpublish(ctx, link, &path).await,
        Message::Subscribe { path } => on_subscribe(ctx, link, &path).await,
        Message::Unsubscribe { path } => {
            if link.unsubscribe_relay(&path) {
                tracing::debug!(link = %link.id(), stream = %path, "Unsubscribed");
            }
            Ok(())
        }
        Message::Summary(order) => on_summary(ctx, link, order).await,
        Message::Pulse => {
            on_pulse(ctx, link);
            Ok(())
        }
    }
}

async fn on_publish(ctx: &Arc<NodeContext>, link: &Arc<ClusterLink>, path: &str) -> Result<()> {
    ctx.registry
        .publish(path, StreamOrigin::Mirrored(Arc::clone(link)))
        .await?;

    tracing::info!(link = %link.id(), peer = %link.peer_addr(), stream = %path, "Remote publish");

    if link.role() == LinkRole::Downstream {
        ctx.summary.register_edge(&ctx.edges, link).await?;
    }
    Ok(())
}

async fn on_unpublish(ctx: &Arc<NodeContext>, link: &Arc<ClusterLink>, path: &str) -> Result<()> {
    let released = link.release_stream(path).await;
    if ctx.registry.close_from(path, link.id()).await {
        tracing::info!(link = %link.id(), stream = %path, tracks = released, "Remote unpublish");
    }
    Ok(())
}

async fn on_subscribe(ctx: &Arc<NodeContext>, link: &Arc<ClusterLink>, path: &str) -> Result<()> {
    // Never send a stream back to where it came from
    if let Some(stream) = ctx.registry.find_stream(path).await {
        if stream.origin().is_from(link.id()) {
            tracing::debug!(link = %link.id(), stream = %path, "Ignoring subscribe from stream source");
            return Ok(());
        }
    }

    let demand = ctx.registry.subscribe(path).await?;
    let stream = Arc::clone(demand.stream());

    if sync::spawn_stream_relay(Arc::clone(&ctx.registry), Arc::clone(link), stream, false, Some(demand)) {
        tracing::debug!(link = %link.id(), stream = %path, "Subscribed");
    } else {
        tracing::debug!(link = %link.id(), stream = %path, "Subscribed to running relay");
    }
    Ok(())
}

async fn on_summary(ctx: &Arc<NodeContext>, link: &Arc<ClusterLink>, order: Summary) -> Result<()> {
    match (link.role(), order) {
        (LinkRole::Upstream, Summary::Start) => {
            tracing::info!(link = %link.id(), "Origin requested reports");
            summary::spawn_reporter(Arc::clone(ctx), Arc::clone(link));
            ctx.set_monitoring(true).await;
        }
        (LinkRole::Upstream, Summary::Stop) => {
            tracing::info!(link = %link.id(), "Origin stopped reports");
            link.stop_reporting();
            ctx.set_monitoring(false).await;
        }
        (LinkRole::Downstream, Summary::Report(json)) => {
            ctx.summary.on_report(&ctx.edges, link, &json).await?;
        }
        (role, order) => {
            tracing::debug!(link = %link.id(), role = ?role, order = ?order, "Ignoring summary message");
        }
    }
    Ok(())
}

fn on_pulse(ctx: &Arc<NodeContext>, link: &Arc<ClusterLink>) {
    let link = Arc::clone(link);
    let interval = ctx.config.pulse_interval;

    tokio::spawn(async move {
        tokio::select! {
            _ = link.closed() => {}
            _ = tokio::time::sleep(interval) => {
                if let Err(e) = link.write_pulse().await {
                    tracing::debug!(link = %link.id(), error = %e, "Pulse not delivered");
                }
            }
        }
    });
}

/// Release everything a link holds
///
/// Relays and the reporter stop, the track map is cleared and the link
/// leaves the edge registry. Streams mirrored from an edge close with it.
/// Streams mirrored from the origin stay up while they have local
/// subscribers, so the next uplink can rebind them.
pub async fn teardown(ctx: &NodeContext, link: &Arc<ClusterLink>) {
    link.close();
    let relays = link.stop_relays();
    let tracks = link.release_tracks().await;

    let closed = match link.role() {
        LinkRole::Downstream => {
            ctx.edges.remove(link).await;
            ctx.summary.forget(&link.peer_addr()).await;
            ctx.registry.close_mirrored_from(link.id()).await
        }
        LinkRole::Upstream => {
            let mut closed = 0;
            for stream in ctx.registry.streams().await {
                if stream.origin().is_from(link.id())
                    && stream.subscriber_count() == 0
                    && ctx.registry.close_from(stream.path(), link.id()).await
                {
                    closed += 1;
                }
            }
            closed
        }
    };

    tracing::info!(
        link = %link.id(),
        peer = %link.peer_addr(),
        role = ?link.role(),
        relays = relays,
        tracks = tracks,
        streams_closed = closed,
        "Link closed"
    );
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf};
    use tokio::task::JoinHandle;

    use super::*;
    use crate::cluster::uplink;
    use crate::server::{ClusterConfig, ClusterNode};

    /// The far end of a link, driven by the test
    struct Peer {
        reader: FrameReader<BufReader<ReadHalf<DuplexStream>>>,
        writer: Arc<ClusterLink>,
    }

    impl Peer {
        fn new(io: DuplexStream) -> Self {
            let (read_half, write_half) = tokio::io::split(io);
            Self {
                reader: FrameReader::new(BufReader::new(read_half)),
                writer: ClusterLink::new(LinkRole::Upstream, "127.0.0.1:1".parse().unwrap(), write_half),
            }
        }

        async fn recv(&mut self) -> Option<Message> {
            tokio::time::timeout(Duration::from_millis(300), self.reader.read_message())
                .await
                .ok()
                .and_then(|r| r.ok().flatten())
        }

        async fn expect(&mut self) -> Message {
            self.recv().await.expect("expected a frame")
        }

        async fn assert_quiet(&mut self) {
            assert_eq!(self.recv().await, None);
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn node(config: ClusterConfig) -> Arc<NodeContext> {
        let node = ClusterNode::new(config);
        node.spawn_hooks();
        Arc::clone(node.context())
    }

    /// Connect an edge to `ctx` acting as origin
    async fn connect_edge(ctx: &Arc<NodeContext>, addr: &str) -> (Arc<ClusterLink>, Peer) {
        let (origin_io, edge_io) = tokio::io::duplex(256 * 1024);
        let (link, _) = serve_downstream(Arc::clone(ctx), origin_io, addr.parse().unwrap());
        let mut edge = Peer::new(edge_io);
        assert_eq!(edge.expect().await, Message::Pulse);
        (link, edge)
    }

    async fn register(edge: &Peer) {
        edge.writer.write_summary_report("{}".to_string()).await.unwrap();
        settle().await;
    }

    /// Connect `ctx` acting as edge to an origin driven by the test
    async fn connect_origin(ctx: &Arc<NodeContext>) -> (Peer, JoinHandle<Result<()>>) {
        let (edge_io, origin_io) = tokio::io::duplex(256 * 1024);
        let handle = tokio::spawn(uplink::connect(
            Arc::clone(ctx),
            edge_io,
            "10.9.0.1:44944".parse().unwrap(),
        ));
        let mut origin = Peer::new(origin_io);
        assert!(matches!(
            origin.expect().await,
            Message::Summary(Summary::Report(_))
        ));
        (origin, handle)
    }

    #[tokio::test]
    async fn test_fan_out_skips_source_edge() {
        let ctx = node(ClusterConfig::default());
        let (_l1, mut e1) = connect_edge(&ctx, "10.0.0.1:5000").await;
        let (_l2, mut e2) = connect_edge(&ctx, "10.0.0.2:5000").await;
        let (_l3, mut e3) = connect_edge(&ctx, "10.0.0.3:5000").await;
        for edge in [&e1, &e2, &e3] {
            register(edge).await;
        }

        e1.writer.write_publish("a/b").await.unwrap();
        e1.writer
            .write_video_track("a/b", "v", 7, Bytes::from_static(&[0x17, 0x00, 0x01]))
            .await
            .unwrap();
        settle().await;
        e1.writer
            .write_video("a/b", "v", 40, Bytes::from_static(&[0x27, 0x01]))
            .await
            .unwrap();

        for edge in [&mut e2, &mut e3] {
            assert_eq!(edge.expect().await, Message::Publish { path: "a/b".into() });
            assert!(matches!(
                edge.expect().await,
                Message::VideoTrack { track, codec: 7, extra_data, .. }
                    if track == "v" && extra_data[..] == [0x17, 0x00, 0x01]
            ));
            assert!(matches!(
                edge.expect().await,
                Message::Video { timestamp: 40, .. }
            ));
        }

        e1.assert_quiet().await;
    }

    #[tokio::test]
    async fn test_late_edge_waits_for_subscribe() {
        let ctx = node(ClusterConfig::default());
        let (_l1, mut e1) = connect_edge(&ctx, "10.0.0.1:5000").await;

        e1.writer.write_publish("a/b").await.unwrap();
        e1.writer
            .write_video_track("a/b", "v", 7, Bytes::new())
            .await
            .unwrap();
        e1.writer
            .write_audio_track("a/b", "a", 10, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]))
            .await
            .unwrap();
        settle().await;

        // Nobody else to tell
        e1.assert_quiet().await;

        let (_l2, mut e2) = connect_edge(&ctx, "10.0.0.2:5000").await;
        register(&e2).await;
        e2.assert_quiet().await;

        e2.writer.write_subscribe("a/b").await.unwrap();
        let mut announced = Vec::new();
        for _ in 0..2 {
            match e2.expect().await {
                Message::VideoTrack { track, .. } | Message::AudioTrack { track, .. } => {
                    announced.push(track)
                }
                other => panic!("expected a track announcement, got {:?}", other),
            }
        }
        announced.sort();
        assert_eq!(announced, vec!["a".to_string(), "v".to_string()]);

        // Demand travels back to the source
        assert_eq!(e1.expect().await, Message::Subscribe { path: "a/b".into() });

        e1.writer
            .write_video("a/b", "v", 80, Bytes::from_static(&[0x17, 0x01]))
            .await
            .unwrap();
        assert!(matches!(
            e2.expect().await,
            Message::Video { path, timestamp: 80, .. } if path == "a/b"
        ));

        e2.writer.write_unsubscribe("a/b").await.unwrap();
        assert_eq!(e1.expect().await, Message::Unsubscribe { path: "a/b".into() });
    }

    #[tokio::test]
    async fn test_monitoring_reaches_late_edge() {
        let ctx = node(ClusterConfig::default());
        let (_l1, mut e1) = connect_edge(&ctx, "10.0.0.1:5000").await;
        let (_l2, mut e2) = connect_edge(&ctx, "10.0.0.2:5000").await;
        register(&e1).await;
        register(&e2).await;

        assert!(ctx.set_monitoring(true).await);
        assert_eq!(e1.expect().await, Message::Summary(Summary::Start));
        assert_eq!(e2.expect().await, Message::Summary(Summary::Start));

        let (_l3, mut e3) = connect_edge(&ctx, "10.0.0.3:5000").await;
        e3.assert_quiet().await;
        e3.writer.write_summary_report("{}".to_string()).await.unwrap();
        assert_eq!(e3.expect().await, Message::Summary(Summary::Start));

        let report = ctx.report_now().await;
        assert_eq!(report.children.len(), 3);
        assert!(report.children.contains_key("10.0.0.3:5000"));
    }

    #[tokio::test]
    async fn test_subscribe_refcount_over_the_wire() {
        let ctx = node(ClusterConfig::default());
        let (mut origin, _handle) = connect_origin(&ctx).await;

        origin.writer.write_publish("a/b").await.unwrap();
        origin
            .writer
            .write_video_track("a/b", "v", 7, Bytes::new())
            .await
            .unwrap();
        settle().await;

        let s1 = ctx.registry.subscribe("a/b").await.unwrap();
        let s2 = ctx.registry.subscribe("a/b").await.unwrap();
        let s3 = ctx.registry.subscribe("a/b").await.unwrap();
        assert_eq!(origin.expect().await, Message::Subscribe { path: "a/b".into() });

        drop(s1);
        drop(s2);
        origin.assert_quiet().await;

        drop(s3);
        assert_eq!(origin.expect().await, Message::Unsubscribe { path: "a/b".into() });
        origin.assert_quiet().await;
    }

    #[tokio::test]
    async fn test_local_publish_is_pushed_upward() {
        let ctx = node(ClusterConfig::default());
        let (mut origin, _handle) = connect_origin(&ctx).await;

        let stream = ctx.registry.publish("cam/1", StreamOrigin::Local).await.unwrap();
        assert_eq!(origin.expect().await, Message::Publish { path: "cam/1".into() });

        let video = stream.new_track(TrackKind::Video, "h264", 7).await;
        video.push_byte_stream(0, Bytes::from_static(&[0x17, 0x00, 0x01]));
        stream.add_track(&video).await;
        assert!(matches!(
            origin.expect().await,
            Message::VideoTrack { track, extra_data, .. }
                if track == "h264" && extra_data[..] == [0x17, 0x00, 0x01]
        ));

        video.push_byte_stream(33, Bytes::from_static(&[0x27, 0x01]));
        assert!(matches!(
            origin.expect().await,
            Message::Video { timestamp: 33, .. }
        ));

        ctx.registry.close("cam/1").await;
        assert_eq!(origin.expect().await, Message::Unpublish { path: "cam/1".into() });
    }

    #[tokio::test]
    async fn test_no_push_keeps_local_streams_home() {
        let ctx = node(ClusterConfig::default().push(false));
        let (mut origin, _handle) = connect_origin(&ctx).await;

        ctx.registry.publish("cam/1", StreamOrigin::Local).await.unwrap();
        origin.assert_quiet().await;
    }

    #[tokio::test]
    async fn test_reconnect_resubscribes_demanded_streams() {
        let ctx = node(ClusterConfig::default());
        let (mut first, handle) = connect_origin(&ctx).await;

        for path in ["a/b", "idle"] {
            first.writer.write_publish(path).await.unwrap();
        }
        settle().await;
        let _sub = ctx.registry.subscribe("a/b").await.unwrap();
        assert_eq!(first.expect().await, Message::Subscribe { path: "a/b".into() });

        drop(first);
        assert!(handle.await.unwrap().is_ok());

        // The stream with a subscriber outlives the link, the idle one does not
        assert!(ctx.registry.find_stream("a/b").await.is_some());
        assert!(ctx.registry.find_stream("idle").await.is_none());

        let (mut second, _handle) = connect_origin(&ctx).await;
        assert_eq!(second.expect().await, Message::Subscribe { path: "a/b".into() });

        let stream = ctx.registry.find_stream("a/b").await.unwrap();
        let uplink = ctx.uplink.current().await.unwrap();
        assert!(stream.origin().is_from(uplink.id()));
    }

    #[tokio::test]
    async fn test_pulse_is_answered() {
        let ctx = node(ClusterConfig::default().pulse_interval(Duration::from_millis(10)));
        let (mut origin, _handle) = connect_origin(&ctx).await;

        origin.writer.write_pulse().await.unwrap();
        assert_eq!(origin.expect().await, Message::Pulse);
    }

    #[tokio::test]
    async fn test_summary_order_propagates_down() {
        let config = ClusterConfig::default().report_interval(Duration::from_millis(20));
        let ctx = node(config);
        let (mut origin, _handle) = connect_origin(&ctx).await;
        let (_child_link, mut child) = connect_edge(&ctx, "10.0.0.7:5000").await;
        register(&child).await;

        origin.writer.write_summary_order(true).await.unwrap();
        assert!(matches!(
            origin.expect().await,
            Message::Summary(Summary::Report(_))
        ));
        assert_eq!(child.expect().await, Message::Summary(Summary::Start));
        assert!(ctx.is_monitoring_active());

        origin.writer.write_summary_order(false).await.unwrap();
        assert_eq!(child.expect().await, Message::Summary(Summary::Stop));
        assert!(!ctx.is_monitoring_active());
    }

    #[tokio::test]
    async fn test_unknown_opcode_closes_link() {
        let ctx = node(ClusterConfig::default());
        let (origin_io, mut edge_io) = tokio::io::duplex(64 * 1024);
        let (link, handle) = serve_downstream(Arc::clone(&ctx), origin_io, "10.0.0.8:5000".parse().unwrap());

        let publish = Message::Publish { path: "a/b".into() }.to_bytes().unwrap();
        edge_io.write_all(&publish).await.unwrap();
        settle().await;
        assert!(ctx.registry.find_stream("a/b").await.is_some());
        assert!(ctx.edges.contains(&link.peer_addr()).await);

        edge_io.write_all(&[0xEE]).await.unwrap();
        handle.await.unwrap();

        assert!(link.is_closed());
        assert!(ctx.edges.is_empty().await);
        assert!(ctx.registry.find_stream("a/b").await.is_none());
    }

    #[tokio::test]
    async fn test_packet_for_unknown_track_keeps_link() {
        let ctx = node(ClusterConfig::default());
        let (link, edge) = connect_edge(&ctx, "10.0.0.9:5000").await;

        edge.writer
            .write_video("a/b", "missing", 0, Bytes::from_static(&[0x17, 0x01]))
            .await
            .unwrap();
        edge.writer.write_publish("a/b").await.unwrap();
        settle().await;

        assert!(!link.is_closed());
        assert!(ctx.registry.find_stream("a/b").await.is_some());
    }

    #[tokio::test]
    async fn test_subscribe_from_source_is_ignored() {
        let ctx = node(ClusterConfig::default());
        let (link, mut edge) = connect_edge(&ctx, "10.0.0.10:5000").await;

        edge.writer.write_publish("a/b").await.unwrap();
        edge.writer
            .write_video_track("a/b", "v", 7, Bytes::new())
            .await
            .unwrap();
        settle().await;

        edge.writer.write_subscribe("a/b").await.unwrap();
        edge.assert_quiet().await;
        assert!(!link.is_relaying("a/b"));
    }

    #[tokio::test]
    async fn test_subscribe_on_fanned_out_stream_keeps_demand() {
        let ctx = node(ClusterConfig::default());
        let (mut origin, _handle) = connect_origin(&ctx).await;
        let (e2_link, mut e2) = connect_edge(&ctx, "10.0.0.2:5000").await;
        register(&e2).await;

        origin.writer.write_publish("a/b").await.unwrap();
        origin
            .writer
            .write_video_track("a/b", "v", 7, Bytes::new())
            .await
            .unwrap();
        assert_eq!(e2.expect().await, Message::Publish { path: "a/b".into() });
        assert!(matches!(e2.expect().await, Message::VideoTrack { .. }));

        e2.writer.write_subscribe("a/b").await.unwrap();
        assert_eq!(origin.expect().await, Message::Subscribe { path: "a/b".into() });
        origin.assert_quiet().await;

        let stream = ctx.registry.find_stream("a/b").await.unwrap();
        assert_eq!(stream.subscriber_count(), 1);
        assert!(e2_link.is_subscribed("a/b"));

        // Demand goes, the fan-out relay stays
        e2.writer.write_unsubscribe("a/b").await.unwrap();
        assert_eq!(origin.expect().await, Message::Unsubscribe { path: "a/b".into() });
        assert_eq!(stream.subscriber_count(), 0);
        assert!(e2_link.is_relaying("a/b"));

        origin
            .writer
            .write_video("a/b", "v", 40, Bytes::from_static(&[0x27, 0x01]))
            .await
            .unwrap();
        assert!(matches!(
            e2.expect().await,
            Message::Video { timestamp: 40, .. }
        ));
    }

    #[tokio::test]
    async fn test_unsubscribe_leaves_push_relay_running() {
        let ctx = node(ClusterConfig::default());
        let (mut origin, _handle) = connect_origin(&ctx).await;

        let stream = ctx.registry.publish("cam/1", StreamOrigin::Local).await.unwrap();
        let video = stream.new_track(TrackKind::Video, "h264", 7).await;
        stream.add_track(&video).await;
        assert_eq!(origin.expect().await, Message::Publish { path: "cam/1".into() });
        assert!(matches!(origin.expect().await, Message::VideoTrack { .. }));

        origin.writer.write_subscribe("cam/1").await.unwrap();
        origin.writer.write_unsubscribe("cam/1").await.unwrap();
        settle().await;

        let uplink = ctx.uplink.current().await.unwrap();
        assert!(uplink.is_relaying("cam/1"));
        assert!(!uplink.is_subscribed("cam/1"));
        assert_eq!(stream.subscriber_count(), 0);

        video.push_byte_stream(80, Bytes::from_static(&[0x27, 0x01]));
        assert!(matches!(
            origin.expect().await,
            Message::Video { timestamp: 80, .. }
        ));
    }

    #[tokio::test]
    async fn test_closed_edge_releases_its_demand() {
        let ctx = node(ClusterConfig::default());
        let (mut origin, _handle) = connect_origin(&ctx).await;
        let (_e2_link, e2) = connect_edge(&ctx, "10.0.0.2:5000").await;

        origin.writer.write_publish("a/b").await.unwrap();
        settle().await;

        e2.writer.write_subscribe("a/b").await.unwrap();
        assert_eq!(origin.expect().await, Message::Subscribe { path: "a/b".into() });

        drop(e2);
        assert_eq!(origin.expect().await, Message::Unsubscribe { path: "a/b".into() });
        let stream = ctx.registry.find_stream("a/b").await.unwrap();
        assert_eq!(stream.subscriber_count(), 0);
    }
}

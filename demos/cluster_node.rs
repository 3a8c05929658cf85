//! Cluster Node - Runs one node of an origin/edge cluster
//!
//! Run with: cargo run --example cluster_node -- [OPTIONS]
//!
//! This example demonstrates:
//! - Building a `ClusterConfig` from command line options
//! - Publishing a local stream into the node's registry
//! - Watching mirrored streams arrive from the origin
//! - Turning on cluster-wide monitoring and printing reports
//!
//! # Two-node setup
//!
//! ```text
//!   cluster_node --listen 127.0.0.1:44944 --monitor
//!   cluster_node --origin 127.0.0.1:44944 --publish live/demo
//! ```
//!
//! The second node pushes `live/demo` to the first, which lists it as a
//! mirrored stream in its reports.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use media_cluster::{
    ClusterConfig, ClusterNode, StreamEvent, StreamOrigin, StreamRegistry, TrackKind,
};

fn print_usage() {
    eprintln!("Usage: cluster_node [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --listen ADDR     Accept edges on ADDR");
    eprintln!("  --origin ADDR     Dial ADDR as this node's origin");
    eprintln!("  --no-push         Do not push local streams to the origin");
    eprintln!("  --publish PATH    Publish a synthetic local stream at PATH");
    eprintln!("  --monitor         Turn on monitoring and print reports");
}

struct Options {
    config: ClusterConfig,
    publish: Option<String>,
    monitor: bool,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut config = ClusterConfig::default();
    let mut publish = None;
    let mut monitor = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--listen" => {
                let value = iter.next().ok_or("--listen needs an address")?;
                let addr = value
                    .replace("localhost", "127.0.0.1")
                    .parse()
                    .map_err(|e| format!("Invalid listen address '{}': {}", value, e))?;
                config = config.listen(addr);
            }
            "--origin" => {
                let value = iter.next().ok_or("--origin needs an address")?;
                config = config.origin_server(value.clone());
            }
            "--no-push" => config = config.push(false),
            "--publish" => {
                publish = Some(iter.next().ok_or("--publish needs a path")?.clone());
            }
            "--monitor" => monitor = true,
            other => return Err(format!("Unknown option '{}'", other)),
        }
    }

    Ok(Options {
        config,
        publish,
        monitor,
    })
}

/// Feed a stream with a fake AVC track at 25 fps
async fn synthetic_publisher(registry: Arc<StreamRegistry>, path: String) {
    let stream = match registry.publish(&path, StreamOrigin::Local).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("Publish failed: {}", e);
            return;
        }
    };

    let video = stream.new_track(TrackKind::Video, "h264", 7).await;
    video.push_byte_stream(0, Bytes::from_static(&[0x17, 0x00, 0x00, 0x00, 0x00, 0x01, 0x64]));
    stream.add_track(&video).await;

    let mut ticker = tokio::time::interval(Duration::from_millis(40));
    let mut timestamp = 0u32;
    loop {
        ticker.tick().await;
        let keyframe = timestamp % 2000 == 0;
        let header = if keyframe { 0x17 } else { 0x27 };
        video.push_byte_stream(timestamp, Bytes::from(vec![header, 0x01, 0x00, 0x00, 0x00]));
        timestamp = timestamp.wrapping_add(40);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("media_cluster=debug".parse()?)
                .add_directive("cluster_node=debug".parse()?),
        )
        .init();

    let node = Arc::new(ClusterNode::new(options.config));
    let registry = Arc::clone(node.registry());

    // Print stream lifecycle as it happens
    let mut events = registry.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                StreamEvent::Published { path, origin } => {
                    println!("published {} ({:?})", path, origin);
                }
                StreamEvent::Closed { path, .. } => println!("closed {}", path),
                _ => {}
            }
        }
    });

    if let Some(path) = options.publish {
        tokio::spawn(synthetic_publisher(Arc::clone(&registry), path));
    }

    if options.monitor {
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            node.set_monitoring(true).await;
            let mut ticker = tokio::time::interval(Duration::from_secs(5));
            loop {
                ticker.tick().await;
                let report = node.report_now().await;
                println!(
                    "{} local streams, {} across the cluster, {} edges reporting",
                    report.stream_count(),
                    report.total_streams(),
                    report.children.len()
                );
            }
        });
    }

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                eprintln!("Node error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    Ok(())
}

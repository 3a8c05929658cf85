//! Node summary report

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::{StreamRegistry, TrackKind};

/// Snapshot of one node, as carried by SUMMARY reports
///
/// Field names are PascalCase on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerSummary {
    /// Address the report arrived from; stamped by the receiving node
    #[serde(default)]
    pub address: String,

    /// Seconds since the node started
    #[serde(default)]
    pub uptime_secs: u64,

    #[serde(default)]
    pub streams: Vec<StreamSummary>,

    /// Latest report of each edge, keyed by address
    #[serde(default)]
    pub children: HashMap<String, ServerSummary>,
}

/// One stream in a [`ServerSummary`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamSummary {
    pub path: String,
    /// Whether the stream arrives from another node
    pub mirrored: bool,
    pub subscribers: u32,
    #[serde(default)]
    pub tracks: Vec<TrackSummary>,
}

/// One track in a [`StreamSummary`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrackSummary {
    pub name: String,
    /// "video" or "audio"
    pub kind: String,
    pub codec: u8,
}

impl ServerSummary {
    /// Build a summary of the streams currently in `registry`
    ///
    /// Streams are listed in path order.
    pub async fn collect(registry: &StreamRegistry, uptime: Duration) -> Self {
        let mut streams = Vec::new();

        for entry in registry.streams().await {
            let mut tracks: Vec<TrackSummary> = entry
                .tracks()
                .await
                .iter()
                .map(|track| TrackSummary {
                    name: track.name().to_string(),
                    kind: match track.kind() {
                        TrackKind::Video => "video".to_string(),
                        TrackKind::Audio => "audio".to_string(),
                    },
                    codec: track.codec(),
                })
                .collect();
            tracks.sort_by(|a, b| a.name.cmp(&b.name));

            streams.push(StreamSummary {
                path: entry.path().to_string(),
                mirrored: entry.is_mirrored(),
                subscribers: entry.subscriber_count(),
                tracks,
            });
        }
        streams.sort_by(|a, b| a.path.cmp(&b.path));

        Self {
            address: String::new(),
            uptime_secs: uptime.as_secs(),
            streams,
            children: HashMap::new(),
        }
    }

    /// Streams on this node alone
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Streams on this node and every node below it
    pub fn total_streams(&self) -> usize {
        self.stream_count()
            + self
                .children
                .values()
                .map(ServerSummary::total_streams)
                .sum::<usize>()
    }

    /// Encode as the JSON carried by a SUMMARY report
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a SUMMARY report
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

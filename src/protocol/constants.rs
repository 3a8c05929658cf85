//! Cluster protocol constants

use std::time::Duration;

/// Opcode: audio packet for a named track
pub const MSG_AUDIO: u8 = 1;
/// Opcode: video packet for a named track
pub const MSG_VIDEO: u8 = 2;
/// Opcode: request a stream path be relayed
pub const MSG_SUBSCRIBE: u8 = 3;
// 4 was used for an authentication exchange that was never enabled
/// Opcode: monitoring order or report
pub const MSG_SUMMARY: u8 = 5;
// 6 was reserved for remote log shipping
/// Opcode: announce a new or resumed stream
pub const MSG_PUBLISH: u8 = 7;
/// Opcode: announce or update a video track
pub const MSG_VIDEOTRACK: u8 = 8;
/// Opcode: announce or update an audio track
pub const MSG_AUDIOTRACK: u8 = 9;
/// Opcode: stop relaying a stream path
pub const MSG_UNSUBSCRIBE: u8 = 10;
/// Opcode: announce stream end
pub const MSG_UNPUBLISH: u8 = 11;
/// Opcode: keepalive
pub const MSG_PULSE: u8 = 12;

/// SUMMARY sub-opcode: stop periodic reporting
pub const SUMMARY_STOP: u8 = 0;
/// SUMMARY sub-opcode: start periodic reporting
pub const SUMMARY_START: u8 = 1;
/// SUMMARY sub-opcode: JSON report follows as a C-string
pub const SUMMARY_REPORT: u8 = 2;

/// Terminator for string fields
pub const STRING_TERMINATOR: u8 = 0x00;

/// Default upper bound for a single binary field (16 MiB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Default lower bound of the reconnect jitter window
pub const DEFAULT_RECONNECT_DELAY_MIN: Duration = Duration::from_secs(5);

/// Default upper bound of the reconnect jitter window
pub const DEFAULT_RECONNECT_DELAY_MAX: Duration = Duration::from_secs(10);

/// Default interval between periodic monitoring reports
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Default delay before answering a PULSE
pub const DEFAULT_PULSE_INTERVAL: Duration = Duration::from_secs(1);

/// Default cluster port
pub const DEFAULT_CLUSTER_PORT: u16 = 44944;

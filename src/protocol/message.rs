//! Cluster message types and encoder
//!
//! Every frame is a one-byte opcode followed by an opcode-specific payload
//! built from three field encodings:
//!
//! ```text
//! C-string:   | UTF-8 bytes ... | 0x00 |
//! u32:        | 4 bytes, big-endian    |
//! binary:     | len: u32 BE | len bytes |
//! ```
//!
//! The protocol is not self-delimiting: a reader that meets an opcode it
//! does not know cannot find the start of the next frame.

use bytes::{BufMut, Bytes, BytesMut};

use super::constants::*;
use crate::error::{ProtocolError, Result};

/// Message opcode
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Audio = MSG_AUDIO,
    Video = MSG_VIDEO,
    Subscribe = MSG_SUBSCRIBE,
    Summary = MSG_SUMMARY,
    Publish = MSG_PUBLISH,
    VideoTrack = MSG_VIDEOTRACK,
    AudioTrack = MSG_AUDIOTRACK,
    Unsubscribe = MSG_UNSUBSCRIBE,
    Unpublish = MSG_UNPUBLISH,
    Pulse = MSG_PULSE,
}

impl Opcode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            MSG_AUDIO => Some(Opcode::Audio),
            MSG_VIDEO => Some(Opcode::Video),
            MSG_SUBSCRIBE => Some(Opcode::Subscribe),
            MSG_SUMMARY => Some(Opcode::Summary),
            MSG_PUBLISH => Some(Opcode::Publish),
            MSG_VIDEOTRACK => Some(Opcode::VideoTrack),
            MSG_AUDIOTRACK => Some(Opcode::AudioTrack),
            MSG_UNSUBSCRIBE => Some(Opcode::Unsubscribe),
            MSG_UNPUBLISH => Some(Opcode::Unpublish),
            MSG_PULSE => Some(Opcode::Pulse),
            _ => None,
        }
    }
}

/// Payload of a SUMMARY message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Summary {
    /// Ask the peer to start periodic reporting
    Start,
    /// Ask the peer to stop periodic reporting
    Stop,
    /// Serialized report (JSON)
    Report(String),
}

/// A decoded cluster message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Audio {
        path: String,
        track: String,
        timestamp: u32,
        payload: Bytes,
    },
    Video {
        path: String,
        track: String,
        timestamp: u32,
        payload: Bytes,
    },
    Subscribe {
        path: String,
    },
    Unsubscribe {
        path: String,
    },
    Summary(Summary),
    Publish {
        path: String,
    },
    Unpublish {
        path: String,
    },
    VideoTrack {
        path: String,
        track: String,
        codec: u8,
        extra_data: Bytes,
    },
    AudioTrack {
        path: String,
        track: String,
        codec: u8,
        extra_data: Bytes,
    },
    Pulse,
}

impl Message {
    /// Opcode this message is framed with
    pub fn opcode(&self) -> Opcode {
        match self {
            Message::Audio { .. } => Opcode::Audio,
            Message::Video { .. } => Opcode::Video,
            Message::Subscribe { .. } => Opcode::Subscribe,
            Message::Unsubscribe { .. } => Opcode::Unsubscribe,
            Message::Summary(_) => Opcode::Summary,
            Message::Publish { .. } => Opcode::Publish,
            Message::Unpublish { .. } => Opcode::Unpublish,
            Message::VideoTrack { .. } => Opcode::VideoTrack,
            Message::AudioTrack { .. } => Opcode::AudioTrack,
            Message::Pulse => Opcode::Pulse,
        }
    }

    /// Append the full frame (opcode + payload) to `buf`
    ///
    /// Fails without touching `buf` if a string field contains a NUL byte or
    /// a binary field does not fit its 32-bit length prefix.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        self.validate()?;
        buf.put_u8(self.opcode() as u8);

        match self {
            Message::Audio {
                path,
                track,
                timestamp,
                payload,
            }
            | Message::Video {
                path,
                track,
                timestamp,
                payload,
            } => {
                put_cstring(buf, path);
                put_cstring(buf, track);
                buf.put_u32(*timestamp);
                put_binary(buf, payload);
            }
            Message::Subscribe { path }
            | Message::Unsubscribe { path }
            | Message::Publish { path }
            | Message::Unpublish { path } => {
                put_cstring(buf, path);
            }
            Message::Summary(summary) => match summary {
                Summary::Start => buf.put_u8(SUMMARY_START),
                Summary::Stop => buf.put_u8(SUMMARY_STOP),
                Summary::Report(json) => {
                    buf.put_u8(SUMMARY_REPORT);
                    put_cstring(buf, json);
                }
            },
            Message::VideoTrack {
                path,
                track,
                codec,
                extra_data,
            }
            | Message::AudioTrack {
                path,
                track,
                codec,
                extra_data,
            } => {
                put_cstring(buf, path);
                put_cstring(buf, track);
                buf.put_u8(*codec);
                put_binary(buf, extra_data);
            }
            Message::Pulse => {}
        }

        Ok(())
    }

    /// Encode into a standalone buffer
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len_hint());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    fn validate(&self) -> Result<()> {
        let strings: [&str; 2] = match self {
            Message::Audio { path, track, .. }
            | Message::Video { path, track, .. }
            | Message::VideoTrack { path, track, .. }
            | Message::AudioTrack { path, track, .. } => [path.as_str(), track.as_str()],
            Message::Subscribe { path }
            | Message::Unsubscribe { path }
            | Message::Publish { path }
            | Message::Unpublish { path } => [path.as_str(), ""],
            Message::Summary(Summary::Report(json)) => [json.as_str(), ""],
            Message::Summary(_) | Message::Pulse => ["", ""],
        };

        if strings.iter().any(|s| s.as_bytes().contains(&STRING_TERMINATOR)) {
            return Err(ProtocolError::MalformedString.into());
        }

        match self {
            Message::Audio { payload, .. } | Message::Video { payload, .. } => {
                check_binary_len(payload.len())
            }
            Message::VideoTrack { extra_data, .. } | Message::AudioTrack { extra_data, .. } => {
                check_binary_len(extra_data.len())
            }
            _ => Ok(()),
        }
    }

    fn encoded_len_hint(&self) -> usize {
        match self {
            Message::Audio {
                path,
                track,
                payload,
                ..
            }
            | Message::Video {
                path,
                track,
                payload,
                ..
            } => 1 + path.len() + track.len() + 2 + 8 + payload.len(),
            Message::VideoTrack {
                path,
                track,
                extra_data,
                ..
            }
            | Message::AudioTrack {
                path,
                track,
                extra_data,
                ..
            } => 1 + path.len() + track.len() + 2 + 5 + extra_data.len(),
            Message::Summary(Summary::Report(json)) => 3 + json.len(),
            _ => 64,
        }
    }
}

fn put_cstring(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(STRING_TERMINATOR);
}

fn check_binary_len(len: usize) -> Result<()> {
    if u32::try_from(len).is_err() {
        return Err(ProtocolError::PayloadTooLarge(len).into());
    }
    Ok(())
}

fn put_binary(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

//! Frame decoder
//!
//! [`FrameReader`] pulls one message at a time straight off the transport.
//! A clean end of stream between two frames is `Ok(None)`; the stream ending
//! anywhere inside a frame is [`ProtocolError::TruncatedMessage`].

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::constants::*;
use super::message::{Message, Opcode, Summary};
use crate::error::{ProtocolError, Result};

/// Reads cluster frames from a buffered byte stream
pub struct FrameReader<R> {
    inner: R,
    max_payload_size: usize,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    /// Create a reader with the default payload limit
    pub fn new(inner: R) -> Self {
        Self::with_max_payload(inner, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a reader that rejects binary fields larger than `max_payload_size`
    pub fn with_max_payload(inner: R, max_payload_size: usize) -> Self {
        Self {
            inner,
            max_payload_size,
        }
    }

    /// Read the next complete message
    ///
    /// Returns `Ok(None)` when the peer closed the stream on a frame boundary.
    pub async fn read_message(&mut self) -> Result<Option<Message>> {
        let opcode = match self.inner.read_u8().await {
            Ok(op) => op,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let opcode = Opcode::from_u8(opcode).ok_or(ProtocolError::UnknownOpcode(opcode))?;
        self.read_payload(opcode).await.map(Some)
    }

    async fn read_payload(&mut self, opcode: Opcode) -> Result<Message> {
        let message = match opcode {
            Opcode::Audio | Opcode::Video => {
                let path = self.read_string().await?;
                let track = self.read_string().await?;
                let timestamp = self.read_u32().await?;
                let payload = self.read_binary().await?;
                if opcode == Opcode::Audio {
                    Message::Audio {
                        path,
                        track,
                        timestamp,
                        payload,
                    }
                } else {
                    Message::Video {
                        path,
                        track,
                        timestamp,
                        payload,
                    }
                }
            }
            Opcode::Subscribe => Message::Subscribe {
                path: self.read_string().await?,
            },
            Opcode::Unsubscribe => Message::Unsubscribe {
                path: self.read_string().await?,
            },
            Opcode::Publish => Message::Publish {
                path: self.read_string().await?,
            },
            Opcode::Unpublish => Message::Unpublish {
                path: self.read_string().await?,
            },
            Opcode::Summary => {
                let summary = match self.read_u8().await? {
                    SUMMARY_START => Summary::Start,
                    SUMMARY_STOP => Summary::Stop,
                    SUMMARY_REPORT => Summary::Report(self.read_string().await?),
                    other => return Err(ProtocolError::InvalidSummaryOrder(other).into()),
                };
                Message::Summary(summary)
            }
            Opcode::VideoTrack | Opcode::AudioTrack => {
                let path = self.read_string().await?;
                let track = self.read_string().await?;
                let codec = self.read_u8().await?;
                let extra_data = self.read_binary().await?;
                if opcode == Opcode::VideoTrack {
                    Message::VideoTrack {
                        path,
                        track,
                        codec,
                        extra_data,
                    }
                } else {
                    Message::AudioTrack {
                        path,
                        track,
                        codec,
                        extra_data,
                    }
                }
            }
            Opcode::Pulse => Message::Pulse,
        };

        Ok(message)
    }

    /// Read a NUL-terminated UTF-8 string
    ///
    /// A string longer than the payload limit is rejected before its
    /// terminator shows up.
    pub async fn read_string(&mut self) -> Result<String> {
        let limit = self.max_payload_size;
        let mut raw = Vec::new();
        (&mut self.inner)
            .take((limit as u64).saturating_add(1))
            .read_until(STRING_TERMINATOR, &mut raw)
            .await?;

        if raw.last() != Some(&STRING_TERMINATOR) {
            if raw.len() > limit {
                return Err(ProtocolError::PayloadTooLarge(raw.len()).into());
            }
            return Err(ProtocolError::TruncatedMessage.into());
        }
        raw.pop();

        String::from_utf8(raw).map_err(|_| ProtocolError::MalformedString.into())
    }

    /// Read a big-endian u32
    pub async fn read_u32(&mut self) -> Result<u32> {
        Ok(self.inner.read_u32().await?)
    }

    /// Read a single raw byte
    pub async fn read_u8(&mut self) -> Result<u8> {
        Ok(self.inner.read_u8().await?)
    }

    /// Read a length-prefixed binary field
    pub async fn read_binary(&mut self) -> Result<Bytes> {
        let len = self.read_u32().await? as usize;
        if len > self.max_payload_size {
            return Err(ProtocolError::PayloadTooLarge(len).into());
        }

        let mut buf = BytesMut::zeroed(len);
        self.inner.read_exact(&mut buf).await?;
        Ok(buf.freeze())
    }

    /// Consume the reader and return the underlying stream
    pub fn into_inner(self) -> R {
        self.inner
    }
}

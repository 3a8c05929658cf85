//! Error types
//!
//! All fallible operations in the crate return [`Result`]. Errors are split
//! by how a link reacts to them: framing and transport failures end the read
//! loop, while a missing track or a bad report only costs the one message.

use std::fmt;
use std::io;

use crate::registry::RegistryError;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Transport-level failure (connect, read, write)
    Io(io::Error),
    /// Malformed or unexpected cluster message
    Protocol(ProtocolError),
    /// Media engine refused an operation
    Registry(RegistryError),
    /// Invalid configuration
    Config(String),
    /// SUMMARY report payload was not a valid report
    ReportDecode(serde_json::Error),
}

/// Wire protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Stream ended in the middle of a message
    TruncatedMessage,
    /// Opcode byte not recognized by this reader
    UnknownOpcode(u8),
    /// String field is not valid UTF-8 or contains a NUL byte
    MalformedString,
    /// Binary field length exceeds the configured limit
    PayloadTooLarge(usize),
    /// SUMMARY carried an unknown sub-opcode
    InvalidSummaryOrder(u8),
    /// Media packet for a track that was never announced on this link
    TrackAbsent { path: String, name: String },
    /// No live link to write to
    NotConnected,
}

impl Error {
    /// Whether this error must terminate the link that produced it
    ///
    /// A packet for an unknown track and an undecodable report are dropped
    /// on their own; everything else leaves the byte stream in an unknown
    /// position or means the transport is gone.
    pub fn closes_link(&self) -> bool {
        !matches!(
            self,
            Error::ReportDecode(_)
                | Error::Registry(_)
                | Error::Protocol(ProtocolError::TrackAbsent { .. })
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "Transport error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::ReportDecode(e) => write!(f, "Invalid summary report: {}", e),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::TruncatedMessage => write!(f, "truncated message"),
            ProtocolError::UnknownOpcode(op) => write!(f, "unknown opcode {}", op),
            ProtocolError::MalformedString => write!(f, "malformed string field"),
            ProtocolError::PayloadTooLarge(len) => {
                write!(f, "payload of {} bytes exceeds limit", len)
            }
            ProtocolError::InvalidSummaryOrder(op) => {
                write!(f, "unknown summary sub-opcode {}", op)
            }
            ProtocolError::TrackAbsent { path, name } => {
                write!(f, "no track {} announced for {}", name, path)
            }
            ProtocolError::NotConnected => write!(f, "link not connected"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::ReportDecode(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        // EOF inside a field is a framing problem, not a transport one
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Protocol(ProtocolError::TruncatedMessage)
        } else {
            Error::Io(e)
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ReportDecode(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_eof_is_truncation() {
        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::TruncatedMessage)
        ));
    }

    #[test]
    fn test_closes_link() {
        let reset: Error = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        assert!(reset.closes_link());
        assert!(Error::from(ProtocolError::UnknownOpcode(0xEE)).closes_link());
        assert!(Error::from(ProtocolError::TruncatedMessage).closes_link());

        let absent = Error::from(ProtocolError::TrackAbsent {
            path: "live/a".into(),
            name: "h264".into(),
        });
        assert!(!absent.closes_link());

        let bad_json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!Error::from(bad_json).closes_link());
    }

    #[test]
    fn test_display() {
        let err = Error::from(ProtocolError::UnknownOpcode(42));
        assert_eq!(err.to_string(), "Protocol error: unknown opcode 42");
    }
}

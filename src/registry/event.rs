//! Stream lifecycle events
//!
//! The registry announces lifecycle changes on a broadcast channel. The
//! cluster layer consumes them the way a host engine's publish/subscribe
//! hooks would be consumed.

use super::entry::StreamOrigin;

/// A change in the set of streams or in a stream's demand
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A stream was created, or a local publisher took over a mirrored one
    Published { path: String, origin: StreamOrigin },

    /// A track became visible in a stream's track set
    TrackAdded { path: String, name: String },

    /// Local demand crossed zero (first subscriber joined or last one left)
    ///
    /// `origin` is where demand has to be forwarded; for a mirrored stream
    /// that is the link the stream arrives on.
    Demand {
        path: String,
        origin: StreamOrigin,
        active: bool,
    },

    /// A stream ended
    Closed { path: String, origin: StreamOrigin },
}

impl StreamEvent {
    /// Stream path the event refers to
    pub fn path(&self) -> &str {
        match self {
            StreamEvent::Published { path, .. }
            | StreamEvent::TrackAdded { path, .. }
            | StreamEvent::Demand { path, .. }
            | StreamEvent::Closed { path, .. } => path,
        }
    }
}

//! Local subscriber handle

use std::sync::Arc;

use super::entry::StreamEntry;
use super::track::Track;

/// A local consumer of a stream
///
/// Holding one counts as demand for the stream; dropping it releases that
/// demand. When the first subscriber of a mirrored stream arrives, or the
/// last one leaves, the registry emits a
/// [`StreamEvent::Demand`](super::StreamEvent::Demand).
pub struct StreamSubscriber {
    stream: Arc<StreamEntry>,
}

impl StreamSubscriber {
    pub(super) fn attach(stream: Arc<StreamEntry>) -> Self {
        stream.add_subscriber();
        Self { stream }
    }

    pub fn stream(&self) -> &Arc<StreamEntry> {
        &self.stream
    }

    pub fn path(&self) -> &str {
        self.stream.path()
    }

    /// Tracks currently published on the stream
    pub async fn tracks(&self) -> Vec<Track> {
        self.stream.tracks().await
    }
}

impl Drop for StreamSubscriber {
    fn drop(&mut self) {
        self.stream.remove_subscriber();
    }
}

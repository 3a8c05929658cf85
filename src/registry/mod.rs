//! In-process media engine
//!
//! The registry owns every stream this node knows about. A stream is either
//! published locally or mirrored from a cluster link; its tracks fan packets
//! out to consumers over `tokio::sync::broadcast`.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamRegistry>
//!                     ┌─────────────────────────┐
//!                     │ streams: HashMap<Path,  │
//!                     │   StreamEntry {         │
//!                     │     origin,             │──── events ───► cluster hooks
//!                     │     tracks: {Track},    │   (Published, TrackAdded,
//!                     │     subscribers,        │    Demand, Closed)
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         ▼                       ▼                       ▼
//!   [Link reader]            [Relay task]           [Subscriber]
//!   push_byte_stream()       track.subscribe()      StreamSubscriber
//! ```
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` uses reference counting, so every relay and consumer of a
//! track shares the same allocation. The broadcast channel clones the
//! `MediaPacket`, but the inner `Bytes` data is only reference-counted.

pub mod config;
pub mod entry;
pub mod error;
pub mod event;
pub mod store;
pub mod subscriber;
pub mod track;

pub use config::RegistryConfig;
pub use entry::{StreamEntry, StreamOrigin, StreamStats};
pub use error::RegistryError;
pub use event::StreamEvent;
pub use store::StreamRegistry;
pub use subscriber::StreamSubscriber;
pub use track::{MediaPacket, MediaTrack, Track, TrackKind};

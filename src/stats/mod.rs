//! Statistics reported through the cluster
//!
//! Edges send their [`ServerSummary`] upstream while monitoring is active;
//! an origin folds the reports of its edges into its own summary's children.

pub mod summary;

pub use summary::{ServerSummary, StreamSummary, TrackSummary};

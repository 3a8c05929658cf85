//! Registry error types
//!
//! Error types for stream registry operations.

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Stream not found
    StreamNotFound(String),
    /// Stream already has a local publisher
    StreamAlreadyPublishing(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::StreamNotFound(path) => write!(f, "Stream not found: {}", path),
            RegistryError::StreamAlreadyPublishing(path) => {
                write!(f, "Stream already has a publisher: {}", path)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

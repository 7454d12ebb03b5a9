// ========== Core Modules ==========
pub mod value;

// Export commonly used types
pub use value::Value;

use std::time::Duration;

// Error types
pub type BackendResult<T> = Result<T, BackendError>;

/// Failure surfaced by a shard connection.
///
/// The routing layer never inspects these beyond passing them through.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl BackendError {
    /// True if the connection that produced this error is still usable.
    ///
    /// An error reply from the server leaves the stream in sync; anything
    /// else may have left unread bytes behind.
    pub fn connection_reusable(&self) -> bool {
        matches!(self, BackendError::Server(_))
    }
}

//! Error types for aircoord

use thiserror::Error;

use crate::WorkerKind;

/// Result type alias for aircoord operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for aircoord
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error (sockets, subprocess pipes, config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared state store rejected or failed an operation
    #[error("Store error: {0}")]
    Store(String),

    /// Shared state store could not be reached
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Malformed store wire-protocol message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON encoding/decoding of a stored record failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Channel number outside every supported band
    #[error("Invalid channel: {0}")]
    InvalidChannel(u16),

    /// Unknown attack mode name
    #[error("Invalid attack mode '{0}'")]
    InvalidMode(String),

    /// Malformed MAC address
    #[error("Invalid MAC address '{0}'")]
    InvalidMac(String),

    /// A worker failed to start or stop
    #[error("Worker {kind} failed: {reason}")]
    Worker { kind: WorkerKind, reason: String },

    /// No worker registered for a kind
    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    /// Radio channel change failed
    #[error("Radio error: {0}")]
    Radio(String),

    /// Frame source failed or produced garbage
    #[error("Frame source error: {0}")]
    FrameSource(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation interrupted
    #[error("Operation interrupted: {0}")]
    Interrupted(String),
}

impl Error {
    /// Create a store error with a custom message
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Error::Store(msg.into())
    }

    /// Create a worker error
    pub fn worker<S: Into<String>>(kind: WorkerKind, reason: S) -> Self {
        Error::Worker {
            kind,
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Whether retrying the same operation later may succeed.
    ///
    /// The control loop uses this to decide between "retry next tick" and
    /// logging a hard failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_) | Error::Io(_) | Error::Interrupted(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::StoreUnavailable("refused".into()).is_transient());
        assert!(Error::Io(std::io::Error::other("reset")).is_transient());
        assert!(!Error::store("bad key").is_transient());
        assert!(!Error::InvalidMode("FOO".into()).is_transient());
    }

    #[test]
    fn test_worker_error_display() {
        let err = Error::worker(WorkerKind::WepAttack, "exec failed");
        assert_eq!(err.to_string(), "Worker wep_attack failed: exec failed");
    }
}

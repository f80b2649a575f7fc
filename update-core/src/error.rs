//! Error types for the update pipeline.
//!
//! Nothing in here is fatal to the device. Every variant ends the current
//! poll or session and the scheduler tries again on the next interval.

use thiserror::Error;

/// Failures reported by an HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("connection dropped: {0}")]
    Dropped(String),
}

/// Failures reported by the firmware staging storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("no update partition available")]
    NoUpdatePartition,
    #[error("failed to open update partition")]
    BeginFailed,
    #[error("write rejected by update partition")]
    WriteFailed,
    #[error("staged image failed validation")]
    ValidationFailed,
    #[error("failed to switch boot partition")]
    BootPartitionFailed,
    #[error("no update in progress")]
    NotStarted,
}

/// Coarse classification used for logging and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NetworkFailure,
    ParseFailure,
    StorageFailure,
    LengthMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error("network failure: {0}")]
    Network(#[from] TransportError),
    #[error("server responded with HTTP {0}")]
    HttpStatus(u16),
    #[error("malformed manifest: {0}")]
    Parse(String),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("length mismatch: expected {expected} bytes, received {received}")]
    LengthMismatch { expected: u64, received: u64 },
    #[error("image stream closed before any bytes arrived")]
    EmptyImage,
    #[error("invalid declared length {0:?}")]
    InvalidLength(String),
    #[error("stream stalled for {waited_ms} ms")]
    Timeout { waited_ms: u64 },
    #[error("an update session is already in progress")]
    SessionActive,
}

impl UpdateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpdateError::Network(_) | UpdateError::HttpStatus(_) | UpdateError::Timeout { .. } => {
                ErrorKind::NetworkFailure
            }
            UpdateError::Parse(_) => ErrorKind::ParseFailure,
            UpdateError::Storage(_) | UpdateError::SessionActive => ErrorKind::StorageFailure,
            UpdateError::LengthMismatch { .. }
            | UpdateError::EmptyImage
            | UpdateError::InvalidLength(_) => ErrorKind::LengthMismatch,
        }
    }
}

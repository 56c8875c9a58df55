use crate::types::{EntityKind, RemoteId};

/// Failure surfaced by a [`RemoteApi`](crate::remote::RemoteApi) implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },
}

/// Error types for sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Wrong argument shape, raised before any remote call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Unexpected response shape: {0}")]
    DataShape(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: RemoteId },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;

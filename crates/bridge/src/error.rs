//! Errors surfaced by the orchestrator.

use catalog::{CatalogError, EngineUserId, MovieId};
use engine_client::EngineError;
use snapshot::SnapshotError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The engine answered, but without a success status
    #[error("Engine did not acknowledge rating of movie {movie_id} by user {engine_user_id}")]
    NotAcknowledged {
        engine_user_id: EngineUserId,
        movie_id: MovieId,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A blocking snapshot task panicked or was cancelled
    #[error("Snapshot task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// Whether the caller may resubmit after a fresh sync
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Engine(e) => e.is_retryable(),
            SyncError::NotAcknowledged { .. } => true,
            _ => false,
        }
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, SyncError>;

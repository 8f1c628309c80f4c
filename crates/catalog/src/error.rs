//! Error types for the catalog crate.
//!
//! Every failure of the relational side is a variant here so callers can
//! decide between user-facing messages and operator diagnostics.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{MovieId, PrincipalId};

/// Errors raised by the relational store.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Username was blank after trimming
    #[error("Username must not be blank")]
    BlankUsername,

    /// Another principal already owns this username
    #[error("Username already taken: {0}")]
    DuplicateUsername(String),

    #[error("Unknown principal: {0}")]
    UnknownPrincipal(PrincipalId),

    #[error("Unknown username: {0}")]
    UnknownUsername(String),

    #[error("Unknown movie: {0}")]
    UnknownMovie(MovieId),

    /// The principal has not completed a profile yet
    #[error("Principal {0} has no profile")]
    NoProfile(PrincipalId),

    #[error("Principal {0} already has a profile")]
    ProfileExists(PrincipalId),

    /// Ages follow the profile form bounds (1..=120)
    #[error("Invalid age: {0}")]
    InvalidAge(u32),

    /// Scores live in [1.0, 5.0]; NaN is rejected as well
    #[error("Score out of range [1.0, 5.0]: {0}")]
    ScoreOutOfRange(f32),

    /// Movie fields that cannot cross into the flat files
    #[error("Invalid movie {movie_id}: {reason}")]
    InvalidMovie { movie_id: MovieId, reason: String },

    /// The engine id sequence ran out of u32 space
    #[error("Engine user id sequence exhausted")]
    SequenceExhausted,

    #[error("Failed to access catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog file {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, CatalogError>;

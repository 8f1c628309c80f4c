//! Error types for the snapshot crate.

use std::path::PathBuf;

use catalog::CatalogError;
use thiserror::Error;

/// Errors raised while writing or reading the flat-file snapshot.
///
/// A missing import source is not an error; see `ImportOutcome::MissingSource`.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// A snapshot file could not be written; the current sync is aborted
    #[error("Failed to write snapshot file {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read snapshot file {path}: {source}")]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot directory could not be created or resolved
    #[error("Snapshot directory {path} is unusable: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Line in a snapshot file couldn't be parsed
    #[error("Parse error at line {line} in {file}: {reason}")]
    ParseError {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("Expected {expected} fields but found {found} in line {line} of {file}")]
    FieldCountMismatch {
        file: String,
        expected: usize,
        found: usize,
        line: usize,
    },

    /// First row of the file is not the expected header
    #[error("Unexpected header in {file}: expected `{expected}`, found `{found}`")]
    HeaderMismatch {
        file: String,
        expected: String,
        found: String,
    },

    /// The relational store refused an imported row
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, SnapshotError>;

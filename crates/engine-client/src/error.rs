//! Errors surfaced by the engine gateway.
//!
//! None of these are retried inside the gateway. The caller decides whether
//! to resubmit, usually after re-running the snapshot sync.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The two verbs the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Recommend,
    AddRating,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Recommend => "recommend",
            Verb::AddRating => "add_rating",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// The process outlived its deadline and was killed
    #[error("Engine {verb} timed out after {after:?}")]
    Timeout { verb: Verb, after: Duration },

    /// Non-zero exit, or output that does not decode.
    ///
    /// `diagnostic` keeps the raw stderr/stdout text for operators.
    #[error("Engine {verb} failed (exit code {exit_code:?}): {diagnostic}")]
    Failure {
        verb: Verb,
        exit_code: Option<i32>,
        diagnostic: String,
    },

    /// Exit code 0 but nothing on stdout; the engine is unhealthy
    #[error("Engine {verb} returned empty output (stderr: {stderr:?})")]
    EmptyResponse { verb: Verb, stderr: String },

    /// The engine executable could not be started at all
    #[error("Failed to launch engine {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Whether resubmitting the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Timeout { .. })
    }

    /// Raw text the engine produced, if any
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            EngineError::Failure { diagnostic, .. } => Some(diagnostic),
            EngineError::EmptyResponse { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, EngineError>;

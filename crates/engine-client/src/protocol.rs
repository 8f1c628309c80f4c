//! Decoding and validating engine output.
//!
//! `recommend` prints a JSON array of objects, most preferred first.
//! `add_rating` prints one JSON object whose `status` must be `"success"`.

use catalog::MovieId;
use serde::Deserialize;
use tracing::warn;

use crate::error::{EngineError, Result, Verb};

/// Status value the engine prints when a rating was recorded
pub const SUCCESS_STATUS: &str = "success";

/// One recommended movie as reported by the engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Recommendation {
    pub movie_id: MovieId,
    #[serde(rename = "predicted_rating", alias = "predicted_score", alias = "score")]
    pub predicted_score: f32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Acknowledgement {
    status: String,
}

/// Decode `recommend` stdout, keeping at most `count` rows
pub fn decode_recommendations(stdout: &str, stderr: &str, count: usize) -> Result<Vec<Recommendation>> {
    let mut rows: Vec<Recommendation> =
        serde_json::from_str(stdout.trim()).map_err(|e| malformed(Verb::Recommend, &e, stdout, stderr))?;

    if let Some(bad) = rows.iter().find(|r| !r.predicted_score.is_finite()) {
        return Err(EngineError::Failure {
            verb: Verb::Recommend,
            exit_code: Some(0),
            diagnostic: format!("non-finite predicted score for movie {}", bad.movie_id),
        });
    }

    if rows.len() > count {
        warn!("Engine returned {} recommendations, {} requested; truncating", rows.len(), count);
        rows.truncate(count);
    }
    Ok(rows)
}

/// Decode `add_rating` stdout; true only for an explicit success status
pub fn decode_acknowledgement(stdout: &str, stderr: &str) -> Result<bool> {
    let ack: Acknowledgement =
        serde_json::from_str(stdout.trim()).map_err(|e| malformed(Verb::AddRating, &e, stdout, stderr))?;
    if ack.status != SUCCESS_STATUS {
        warn!("Engine did not acknowledge rating: status {:?}", ack.status);
    }
    Ok(ack.status == SUCCESS_STATUS)
}

fn malformed(verb: Verb, error: &serde_json::Error, stdout: &str, stderr: &str) -> EngineError {
    EngineError::Failure {
        verb,
        exit_code: Some(0),
        diagnostic: format!(
            "unparseable output ({}); stdout: {:?}, stderr: {:?}",
            error,
            stdout.trim(),
            stderr.trim()
        ),
    }
}

//! Core domain types of the relational store.
//!
//! The relational side owns every entity. The flat-file snapshot is a derived
//! projection built from the read-path types at the bottom of this module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Type Aliases
// =============================================================================

/// Movie identity, shared verbatim with the engine
pub type MovieId = u32;

/// Identity of a profile on the engine side; assigned once, never reused
pub type EngineUserId = u32;

/// Login identity; never leaves the relational store
pub type PrincipalId = u64;

/// Lowest and highest score a rating may carry
pub const MIN_SCORE: f32 = 1.0;
pub const MAX_SCORE: f32 = 5.0;

/// Accepted profile ages
pub const MIN_AGE: u32 = 1;
pub const MAX_AGE: u32 = 120;

/// First engine user id handed out by an empty catalog
pub const FIRST_ENGINE_USER_ID: EngineUserId = 101;

/// Returns true when `score` is a finite value inside [1.0, 5.0]
pub fn score_in_range(score: f32) -> bool {
    score.is_finite() && (MIN_SCORE..=MAX_SCORE).contains(&score)
}

/// Format a score with the shortest exact decimal, always keeping a fraction.
///
/// `4.5` stays `4.5`, `5.0` becomes `5.0` rather than `5`. Used for both the
/// rating table and the engine's command line.
pub fn format_score(score: f32) -> String {
    let text = score.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A movie in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub movie_id: MovieId,
    pub title: String,
    pub genre: String,
    pub year: i32,
    /// Mean of all current ratings, 0.0 when unrated
    #[serde(default)]
    pub avg_rating: f32,
    #[serde(default)]
    pub rating_count: u32,
}

impl Movie {
    /// Build an unrated movie
    pub fn new(movie_id: MovieId, title: impl Into<String>, genre: impl Into<String>, year: i32) -> Self {
        Self {
            movie_id,
            title: title.into(),
            genre: genre.into(),
            year,
            avg_rating: 0.0,
            rating_count: 0,
        }
    }

    /// Reason this movie cannot be stored, if any
    pub fn listing_problem(&self) -> Option<&'static str> {
        if self.title.trim().is_empty() {
            Some("blank title")
        } else {
            None
        }
    }

    /// Compare only the fields the flat file carries
    pub fn same_listing(&self, other: &Movie) -> bool {
        self.movie_id == other.movie_id
            && self.title == other.title
            && self.genre == other.genre
            && self.year == other.year
    }
}

/// A login identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub username: String,
}

/// Profile attached to a principal; carries the engine identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub principal_id: PrincipalId,
    pub engine_user_id: EngineUserId,
    pub age: u32,
    #[serde(default)]
    pub ratings_count: u32,
    #[serde(default)]
    pub avg_rating_given: f32,
}

/// The single current rating of one principal for one movie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub principal_id: PrincipalId,
    pub movie_id: MovieId,
    pub score: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What an upsert did to the stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

// =============================================================================
// Read paths consumed by the snapshot exporter
// =============================================================================

/// A profile as the exporter sees it.
///
/// `display_name` is `None` when the login identity is gone or blank.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRow {
    pub engine_user_id: EngineUserId,
    pub display_name: Option<String>,
    pub age: u32,
}

/// A rating resolved to engine identities.
///
/// `engine_user_id` is `None` when the rater never completed a profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedRating {
    pub engine_user_id: Option<EngineUserId>,
    pub movie_id: MovieId,
    pub score: f32,
}

/// All three read paths taken under one consistent read.
#[derive(Debug, Clone, Default)]
pub struct CatalogView {
    pub movies: Vec<Movie>,
    pub profiles: Vec<ProfileRow>,
    pub ratings: Vec<ResolvedRating>,
}

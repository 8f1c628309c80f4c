//! Parser for the snapshot tables.
//!
//! - movies.csv: movie_id,title,genre,year
//! - users.csv: user_id,name,age
//! - ratings.csv: user_id,movie_id,rating
//!
//! Used by the importer and by `Snapshot::validate`, which checks what is on
//! disk right now (including rows the engine appended since the last export).

use std::collections::HashSet;
use std::path::Path;

use catalog::{score_in_range, EngineUserId, MovieId};

use crate::codec::{expect_fields, parse_field, read_table, Record};
use crate::error::Result;
use crate::workspace::SnapshotLease;
use crate::{MOVIES_FILE, MOVIES_HEADER, RATINGS_FILE, RATINGS_HEADER, USERS_FILE, USERS_HEADER};

#[derive(Debug, Clone, PartialEq)]
pub struct MovieRow {
    pub movie_id: MovieId,
    pub title: String,
    pub genre: String,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub user_id: EngineUserId,
    pub name: String,
    pub age: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingRow {
    pub user_id: EngineUserId,
    pub movie_id: MovieId,
    pub rating: f32,
}

/// Parse a movie table
pub fn read_movies(path: &Path) -> Result<Vec<MovieRow>> {
    read_table(path, MOVIES_HEADER)?
        .iter()
        .map(|record| {
            expect_fields(record, MOVIES_HEADER.len(), MOVIES_FILE)?;
            Ok(MovieRow {
                movie_id: parse_field(record, 0, "movie_id", MOVIES_FILE)?,
                title: text_field(record, 1),
                genre: text_field(record, 2),
                year: parse_field(record, 3, "year", MOVIES_FILE)?,
            })
        })
        .collect()
}

/// Parse a user table
pub fn read_users(path: &Path) -> Result<Vec<UserRow>> {
    read_table(path, USERS_HEADER)?
        .iter()
        .map(|record| {
            expect_fields(record, USERS_HEADER.len(), USERS_FILE)?;
            Ok(UserRow {
                user_id: parse_field(record, 0, "user_id", USERS_FILE)?,
                name: text_field(record, 1),
                age: parse_field(record, 2, "age", USERS_FILE)?,
            })
        })
        .collect()
}

/// Parse a rating table
pub fn read_ratings(path: &Path) -> Result<Vec<RatingRow>> {
    read_table(path, RATINGS_HEADER)?
        .iter()
        .map(|record| {
            expect_fields(record, RATINGS_HEADER.len(), RATINGS_FILE)?;
            Ok(RatingRow {
                user_id: parse_field(record, 0, "user_id", RATINGS_FILE)?,
                movie_id: parse_field(record, 1, "movie_id", RATINGS_FILE)?,
                rating: parse_field(record, 2, "rating", RATINGS_FILE)?,
            })
        })
        .collect()
}

fn text_field(record: &Record, index: usize) -> String {
    record.fields[index].clone()
}

/// Problems found in a snapshot on disk
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotIssue {
    UnknownUser { user_id: EngineUserId, movie_id: MovieId },
    UnknownMovie { user_id: EngineUserId, movie_id: MovieId },
    ScoreOutOfRange { user_id: EngineUserId, movie_id: MovieId, rating: f32 },
    DuplicateMovie(MovieId),
    DuplicateUser(EngineUserId),
}

/// All three tables as currently on disk
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub movies: Vec<MovieRow>,
    pub users: Vec<UserRow>,
    pub ratings: Vec<RatingRow>,
}

impl Snapshot {
    /// Read all three files while holding the lease
    pub fn load(lease: &SnapshotLease) -> Result<Self> {
        Ok(Self {
            movies: read_movies(&lease.movies_path())?,
            users: read_users(&lease.users_path())?,
            ratings: read_ratings(&lease.ratings_path())?,
        })
    }

    /// Check referential integrity and score ranges.
    ///
    /// Returns every issue found; an empty list means the engine can trust
    /// the snapshot.
    pub fn validate(&self) -> Vec<SnapshotIssue> {
        let mut issues = Vec::new();

        let mut movie_ids = HashSet::new();
        for movie in &self.movies {
            if !movie_ids.insert(movie.movie_id) {
                issues.push(SnapshotIssue::DuplicateMovie(movie.movie_id));
            }
        }
        let mut user_ids = HashSet::new();
        for user in &self.users {
            if !user_ids.insert(user.user_id) {
                issues.push(SnapshotIssue::DuplicateUser(user.user_id));
            }
        }

        for rating in &self.ratings {
            if !user_ids.contains(&rating.user_id) {
                issues.push(SnapshotIssue::UnknownUser {
                    user_id: rating.user_id,
                    movie_id: rating.movie_id,
                });
            }
            if !movie_ids.contains(&rating.movie_id) {
                issues.push(SnapshotIssue::UnknownMovie {
                    user_id: rating.user_id,
                    movie_id: rating.movie_id,
                });
            }
            if !score_in_range(rating.rating) {
                issues.push(SnapshotIssue::ScoreOutOfRange {
                    user_id: rating.user_id,
                    movie_id: rating.movie_id,
                    rating: rating.rating,
                });
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reports_gaps() {
        let snapshot = Snapshot {
            movies: vec![MovieRow {
                movie_id: 1,
                title: "A".to_string(),
                genre: "Drama".to_string(),
                year: 2000,
            }],
            users: vec![UserRow {
                user_id: 101,
                name: "Bob".to_string(),
                age: 30,
            }],
            ratings: vec![
                RatingRow { user_id: 101, movie_id: 1, rating: 4.5 },
                RatingRow { user_id: 102, movie_id: 1, rating: 3.0 },
                RatingRow { user_id: 101, movie_id: 9, rating: 6.0 },
            ],
        };

        let issues = snapshot.validate();
        assert_eq!(
            issues,
            vec![
                SnapshotIssue::UnknownUser { user_id: 102, movie_id: 1 },
                SnapshotIssue::UnknownMovie { user_id: 101, movie_id: 9 },
                SnapshotIssue::ScoreOutOfRange { user_id: 101, movie_id: 9, rating: 6.0 },
            ]
        );
    }

    #[test]
    fn test_read_movies_rejects_bad_year() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.csv");
        std::fs::write(&path, "movie_id,title,genre,year\n1,A,Drama,soon\n").unwrap();

        let err = read_movies(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_read_ratings_checks_field_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.csv");
        std::fs::write(&path, "user_id,movie_id,rating\n101,1\n").unwrap();

        let err = read_ratings(&path).unwrap_err();
        assert!(matches!(
            err,
            crate::SnapshotError::FieldCountMismatch { expected: 3, found: 2, line: 2, .. }
        ));
    }
}

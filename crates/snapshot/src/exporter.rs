//! Snapshot Exporter: relational store → three flat tables.
//!
//! Files are regenerated wholesale on every export. Rows are sorted by key,
//! so exporting an unchanged catalog twice yields byte-identical files.
//!
//! Referential integrity is enforced by omission: a rating is written only if
//! both its user row and its movie row made it into the snapshot. Omitted
//! rows are counted and logged, never dropped silently.

use std::collections::HashSet;
use std::sync::Arc;

use catalog::{
    format_score, score_in_range, CatalogStore, CatalogView, EngineUserId, Movie, MovieId, ProfileRow,
    ResolvedRating,
};
use tracing::{debug, info, warn};

use crate::codec::write_table;
use crate::error::Result;
use crate::workspace::SnapshotLease;
use crate::{MOVIES_HEADER, RATINGS_HEADER, USERS_HEADER};

/// A rating left out of the snapshot because one side of it is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialGap {
    /// The rater never completed a profile, so there is no engine identity
    UnresolvedUser { movie_id: MovieId },
    /// The profile exists but its user row was not exported
    UserNotExported {
        engine_user_id: EngineUserId,
        movie_id: MovieId,
    },
    /// The movie row was not exported
    MovieNotExported {
        engine_user_id: EngineUserId,
        movie_id: MovieId,
    },
}

/// Outcome of writing the user table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserExport {
    pub written: usize,
    /// Profiles skipped because they have no display name
    pub skipped: Vec<EngineUserId>,
}

/// Outcome of writing the rating table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatingExport {
    pub written: usize,
    pub gaps: Vec<ReferentialGap>,
    /// Scores outside [1.0, 5.0] or not finite; a relational-side bug
    pub rejected_scores: Vec<ResolvedRating>,
}

impl RatingExport {
    /// Every rating that did not reach the file
    pub fn omitted(&self) -> usize {
        self.gaps.len() + self.rejected_scores.len()
    }
}

/// Summary of a full `sync_all`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportReport {
    pub movies: usize,
    pub users: UserExport,
    pub ratings: RatingExport,
}

/// Writes the snapshot from a `CatalogStore`.
#[derive(Clone)]
pub struct SnapshotExporter {
    catalog: Arc<dyn CatalogStore>,
}

impl SnapshotExporter {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Write one row per movie. Fails only on I/O.
    pub fn export_movies(&self, lease: &SnapshotLease) -> Result<usize> {
        write_movies(lease, &self.catalog.all_movies())
    }

    /// Write one row per profile; profiles without a display name are skipped
    pub fn export_users(&self, lease: &SnapshotLease) -> Result<UserExport> {
        let (export, _) = write_users(lease, &self.catalog.all_profiles())?;
        Ok(export)
    }

    /// Write one row per rating whose user and movie are exportable
    pub fn export_ratings(&self, lease: &SnapshotLease) -> Result<RatingExport> {
        let view = self.catalog.view();
        let users = exportable_users(&view.profiles);
        let movies = movie_ids(&view.movies);
        write_ratings(lease, &view.ratings, &users, &movies)
    }

    /// Export movies, then users, then ratings from one consistent view.
    ///
    /// The first I/O failure aborts the sync and is returned.
    pub fn sync_all(&self, lease: &SnapshotLease) -> Result<ExportReport> {
        let CatalogView {
            movies,
            profiles,
            ratings,
        } = self.catalog.view();

        let movie_count = write_movies(lease, &movies)?;
        let (users, exported_users) = write_users(lease, &profiles)?;
        let ratings = write_ratings(lease, &ratings, &exported_users, &movie_ids(&movies))?;

        info!(
            "Snapshot synced to {:?}: {} movies, {} users, {} ratings ({} users skipped, {} ratings omitted)",
            lease.dir(),
            movie_count,
            users.written,
            ratings.written,
            users.skipped.len(),
            ratings.omitted()
        );

        Ok(ExportReport {
            movies: movie_count,
            users,
            ratings,
        })
    }
}

fn movie_ids(movies: &[Movie]) -> HashSet<MovieId> {
    movies.iter().map(|m| m.movie_id).collect()
}

fn exportable_users(profiles: &[ProfileRow]) -> HashSet<EngineUserId> {
    profiles
        .iter()
        .filter(|p| p.display_name.is_some())
        .map(|p| p.engine_user_id)
        .collect()
}

fn write_movies(lease: &SnapshotLease, movies: &[Movie]) -> Result<usize> {
    let mut sorted: Vec<&Movie> = movies.iter().collect();
    sorted.sort_by_key(|m| m.movie_id);

    let rows = sorted.into_iter().map(|m| {
        vec![
            m.movie_id.to_string(),
            m.title.clone(),
            m.genre.clone(),
            m.year.to_string(),
        ]
    });
    write_table(&lease.movies_path(), MOVIES_HEADER, rows)
}

fn write_users(
    lease: &SnapshotLease,
    profiles: &[ProfileRow],
) -> Result<(UserExport, HashSet<EngineUserId>)> {
    let mut sorted: Vec<&ProfileRow> = profiles.iter().collect();
    sorted.sort_by_key(|p| p.engine_user_id);

    let mut skipped = Vec::new();
    let mut exported = HashSet::new();
    let mut rows = Vec::with_capacity(sorted.len());
    for profile in sorted {
        match &profile.display_name {
            Some(name) => {
                exported.insert(profile.engine_user_id);
                rows.push(vec![
                    profile.engine_user_id.to_string(),
                    name.clone(),
                    profile.age.to_string(),
                ]);
            }
            None => {
                warn!(
                    "Skipping profile with engine user id {}: no display name",
                    profile.engine_user_id
                );
                skipped.push(profile.engine_user_id);
            }
        }
    }

    let written = write_table(&lease.users_path(), USERS_HEADER, rows)?;
    Ok((UserExport { written, skipped }, exported))
}

fn write_ratings(
    lease: &SnapshotLease,
    ratings: &[ResolvedRating],
    users: &HashSet<EngineUserId>,
    movies: &HashSet<MovieId>,
) -> Result<RatingExport> {
    let mut gaps = Vec::new();
    let mut rejected_scores = Vec::new();
    let mut kept: Vec<(EngineUserId, MovieId, f32)> = Vec::with_capacity(ratings.len());

    for rating in ratings {
        let Some(engine_user_id) = rating.engine_user_id else {
            gaps.push(ReferentialGap::UnresolvedUser {
                movie_id: rating.movie_id,
            });
            continue;
        };
        if !users.contains(&engine_user_id) {
            gaps.push(ReferentialGap::UserNotExported {
                engine_user_id,
                movie_id: rating.movie_id,
            });
            continue;
        }
        if !movies.contains(&rating.movie_id) {
            gaps.push(ReferentialGap::MovieNotExported {
                engine_user_id,
                movie_id: rating.movie_id,
            });
            continue;
        }
        if !score_in_range(rating.score) {
            warn!(
                "Rejecting out-of-range score {} for user {} movie {}",
                rating.score, engine_user_id, rating.movie_id
            );
            rejected_scores.push(*rating);
            continue;
        }
        kept.push((engine_user_id, rating.movie_id, rating.score));
    }

    for gap in &gaps {
        debug!("Omitting rating from snapshot: {:?}", gap);
    }
    if !gaps.is_empty() {
        warn!("Omitted {} ratings with referential gaps", gaps.len());
    }

    kept.sort_by_key(|&(user, movie, _)| (user, movie));
    let rows = kept.into_iter().map(|(user, movie, score)| {
        vec![user.to_string(), movie.to_string(), format_score(score)]
    });
    let written = write_table(&lease.ratings_path(), RATINGS_HEADER, rows)?;

    Ok(RatingExport {
        written,
        gaps,
        rejected_scores,
    })
}

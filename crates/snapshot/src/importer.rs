//! Snapshot Importer: an external movie table → relational store.
//!
//! Only movies flow this way, for bulk catalog loads. Users and ratings are
//! never read back. The whole file is parsed and every row checked before the
//! first upsert, so a malformed or unstorable row leaves the store untouched.

use std::path::Path;
use std::sync::Arc;

use catalog::{CatalogError, CatalogStore, Movie, UpsertOutcome};
use tracing::{debug, info};

use crate::error::Result;
use crate::reader::read_movies;
use crate::workspace::SnapshotLease;

/// Counts of what an import changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl ImportReport {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Applied(ImportReport),
    /// The source file does not exist; nothing was done
    MissingSource,
}

#[derive(Clone)]
pub struct SnapshotImporter {
    catalog: Arc<dyn CatalogStore>,
}

impl SnapshotImporter {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Import the movie table of the snapshot directory
    pub fn import_movies(&self, lease: &SnapshotLease) -> Result<ImportOutcome> {
        self.import_movies_from(&lease.movies_path())
    }

    /// Import a movie table from any path.
    ///
    /// Upserts by `movie_id`, overwriting title, genre and year. Running it
    /// twice on the same file changes nothing the second time.
    pub fn import_movies_from(&self, path: &Path) -> Result<ImportOutcome> {
        if !path.exists() {
            info!("No movie table at {:?}, skipping import", path);
            return Ok(ImportOutcome::MissingSource);
        }

        let movies: Vec<Movie> = read_movies(path)?
            .into_iter()
            .map(|row| Movie::new(row.movie_id, row.title, row.genre, row.year))
            .collect();
        if let Some((movie_id, reason)) = movies
            .iter()
            .find_map(|m| m.listing_problem().map(|reason| (m.movie_id, reason)))
        {
            return Err(CatalogError::InvalidMovie {
                movie_id,
                reason: reason.to_string(),
            }
            .into());
        }

        let mut report = ImportReport::default();
        for movie in movies {
            let movie_id = movie.movie_id;
            let outcome = self.catalog.upsert_movie(movie)?;
            debug!("Imported movie {}: {:?}", movie_id, outcome);
            match outcome {
                UpsertOutcome::Inserted => report.inserted += 1,
                UpsertOutcome::Updated => report.updated += 1,
                UpsertOutcome::Unchanged => report.unchanged += 1,
            }
        }

        info!(
            "Imported {} movies from {:?} ({} new, {} updated, {} unchanged)",
            report.total(),
            path,
            report.inserted,
            report.updated,
            report.unchanged
        );
        Ok(ImportOutcome::Applied(report))
    }
}

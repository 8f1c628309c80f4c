//! Synchronization Orchestrator: decides when the snapshot is rewritten.
//!
//! Every engine call is preceded by a full export, and both run under one
//! snapshot lease, so the engine never reads a snapshot older than the
//! caller's own writes and never sees a half-written one.

use std::sync::Arc;

use catalog::{
    Catalog, CatalogError, CatalogStore, Movie, MovieId, Principal, PrincipalId, RatingRecord,
    UpsertOutcome, UserProfile, MAX_AGE, MIN_AGE,
};
use engine_client::RecommendationEngine;
use snapshot::{
    ExportReport, ImportOutcome, Snapshot, SnapshotExporter, SnapshotImporter, SnapshotIssue,
    SnapshotLease, SnapshotWorkspace,
};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SyncError};

/// A recommendation joined with the catalog's movie metadata
#[derive(Debug, Clone, PartialEq)]
pub struct MovieRecommendation {
    pub movie: Movie,
    pub predicted_score: f32,
    pub reason: Option<String>,
}

/// A freshly registered user
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub principal: Principal,
    pub profile: UserProfile,
}

/// A rating the engine acknowledged and the catalog committed
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRating {
    pub record: RatingRecord,
    pub outcome: UpsertOutcome,
}

/// What `verify` found in the snapshot directory
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    pub movies: usize,
    pub users: usize,
    pub ratings: usize,
    pub issues: Vec<SnapshotIssue>,
}

impl VerifyReport {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Coordinates the catalog, the snapshot files and the engine.
#[derive(Clone)]
pub struct SyncOrchestrator {
    pub(crate) catalog: Arc<Catalog>,
    exporter: SnapshotExporter,
    importer: SnapshotImporter,
    workspace: SnapshotWorkspace,
    engine: Arc<dyn RecommendationEngine>,
}

impl SyncOrchestrator {
    pub fn new(
        catalog: Arc<Catalog>,
        workspace: SnapshotWorkspace,
        engine: Arc<dyn RecommendationEngine>,
    ) -> Self {
        let store: Arc<dyn CatalogStore> = catalog.clone();
        Self {
            exporter: SnapshotExporter::new(store.clone()),
            importer: SnapshotImporter::new(store),
            catalog,
            workspace,
            engine,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn workspace(&self) -> &SnapshotWorkspace {
        &self.workspace
    }

    /// Look up a principal by login name
    pub fn principal_id(&self, username: &str) -> Result<PrincipalId> {
        self.catalog
            .principal_by_username(username)
            .map(|p| p.id)
            .ok_or_else(|| CatalogError::UnknownUsername(username.to_string()).into())
    }

    /// Rewrite the whole snapshot from the catalog
    pub async fn sync(&self) -> Result<ExportReport> {
        let lease = self.workspace.acquire().await;
        let (_lease, report) = self.export(lease).await?;
        Ok(report)
    }

    /// Fresh recommendations for a principal, best first.
    ///
    /// Engine rows whose movie is unknown to the catalog are dropped.
    pub async fn recommend(
        &self,
        principal_id: PrincipalId,
        count: usize,
    ) -> Result<Vec<MovieRecommendation>> {
        let engine_user_id = self.catalog.engine_user_id(principal_id)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let lease = self.workspace.acquire().await;
        let (lease, _report) = self.export(lease).await?;
        let picks = self.engine.recommend(engine_user_id, count).await?;
        drop(lease);

        let mut enriched = Vec::with_capacity(picks.len());
        for pick in picks {
            match self.catalog.movie(pick.movie_id) {
                Some(movie) => enriched.push(MovieRecommendation {
                    movie,
                    predicted_score: pick.predicted_score,
                    reason: pick.reason,
                }),
                None => warn!(
                    "Engine recommended movie {} which is not in the catalog, dropping it",
                    pick.movie_id
                ),
            }
        }

        info!(
            "Recommended {} movies for principal {} (engine user {})",
            enriched.len(),
            principal_id,
            engine_user_id
        );
        Ok(enriched)
    }

    /// Record a rating in the engine, then in the catalog.
    ///
    /// The catalog row is written only after the engine acknowledges, so a
    /// failed call leaves the catalog exactly as it was.
    pub async fn record_rating(
        &self,
        principal_id: PrincipalId,
        movie_id: MovieId,
        score: f32,
    ) -> Result<RecordedRating> {
        self.catalog.check_rating(principal_id, movie_id, score)?;
        let engine_user_id = self.catalog.engine_user_id(principal_id)?;

        let lease = self.workspace.acquire().await;
        let (lease, _report) = self.export(lease).await?;

        if !self.engine.add_rating(engine_user_id, movie_id, score).await? {
            return Err(SyncError::NotAcknowledged {
                engine_user_id,
                movie_id,
            });
        }

        // Commit before releasing the lease, so no export can run between
        // the engine's write and ours and drop the new row from the file.
        let (record, outcome) = self
            .catalog
            .upsert_rating(principal_id, movie_id, score)
            .map_err(|e| {
                error!(
                    "Engine user {} holds rating {} for movie {} but the catalog refused it: {}; \
                     the next sync will drop it from the engine",
                    engine_user_id, score, movie_id, e
                );
                e
            })?;
        drop(lease);

        info!(
            "Recorded rating {} for movie {} by principal {} ({:?})",
            score, movie_id, principal_id, outcome
        );
        Ok(RecordedRating { record, outcome })
    }

    /// Create a login identity with a profile, then sync
    pub async fn register_user(&self, username: &str, age: u32) -> Result<Registration> {
        // Checked up front so a bad age leaves no principal behind.
        if !(MIN_AGE..=MAX_AGE).contains(&age) {
            return Err(CatalogError::InvalidAge(age).into());
        }

        let principal = self.catalog.create_principal(username)?;
        let profile = self.catalog.create_profile(principal.id, age)?;
        self.sync().await?;

        info!(
            "Registered {} as engine user {}",
            principal.username, profile.engine_user_id
        );
        Ok(Registration { principal, profile })
    }

    /// Attach a profile to an existing principal, then sync
    pub async fn complete_profile(&self, principal_id: PrincipalId, age: u32) -> Result<UserProfile> {
        let profile = self.catalog.create_profile(principal_id, age)?;
        self.sync().await?;
        Ok(profile)
    }

    /// Load `movies.csv` from the snapshot directory into the catalog
    pub async fn import_movies(&self) -> Result<ImportOutcome> {
        let lease = self.workspace.acquire().await;
        let importer = self.importer.clone();
        let (_lease, outcome) = run_blocking(lease, move |lease| importer.import_movies(lease)).await?;
        Ok(outcome)
    }

    /// Read the snapshot as it is on disk and check its integrity
    pub async fn verify(&self) -> Result<VerifyReport> {
        let lease = self.workspace.acquire().await;
        let (_lease, snapshot) = run_blocking(lease, Snapshot::load).await?;

        let issues = snapshot.validate();
        for issue in &issues {
            warn!("Snapshot issue: {:?}", issue);
        }
        Ok(VerifyReport {
            movies: snapshot.movies.len(),
            users: snapshot.users.len(),
            ratings: snapshot.ratings.len(),
            issues,
        })
    }

    async fn export(&self, lease: SnapshotLease) -> Result<(SnapshotLease, ExportReport)> {
        let exporter = self.exporter.clone();
        let (lease, report) = run_blocking(lease, move |lease| exporter.sync_all(lease)).await?;
        debug!(
            "Export before engine call: {} movies, {} users, {} ratings",
            report.movies, report.users.written, report.ratings.written
        );
        Ok((lease, report))
    }
}

/// Run file work on the blocking pool, handing the lease back afterwards
async fn run_blocking<T, F>(lease: SnapshotLease, work: F) -> Result<(SnapshotLease, T)>
where
    T: Send + 'static,
    F: FnOnce(&SnapshotLease) -> snapshot::Result<T> + Send + 'static,
{
    let (lease, result) = tokio::task::spawn_blocking(move || {
        let result = work(&lease);
        (lease, result)
    })
    .await?;
    Ok((lease, result?))
}

//! The in-memory relational store and its collaborator trait.
//!
//! `Catalog` keeps its tables behind a single `RwLock` so every read path used
//! by the exporter can be taken as one consistent view. Engine user ids come
//! from an atomic sequence rather than "max + 1", so concurrent profile
//! creation can never hand out the same id twice.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CatalogError, Result};
use crate::stats;
use crate::types::*;

/// Read and upsert capability the snapshot layer needs from the relational side.
///
/// The exporter only reads; the importer only upserts movies.
pub trait CatalogStore: Send + Sync {
    /// Every movie, ordered by id
    fn all_movies(&self) -> Vec<Movie>;

    /// Every profile with its display name and age, ordered by engine id
    fn all_profiles(&self) -> Vec<ProfileRow>;

    /// Every rating resolved to engine identities
    fn all_ratings(&self) -> Vec<ResolvedRating>;

    /// Insert or overwrite a movie keyed by `movie_id`
    fn upsert_movie(&self, movie: Movie) -> Result<UpsertOutcome>;

    /// All three read paths at one point in time.
    ///
    /// The default stitches three separate reads together; stores that can do
    /// better should override it.
    fn view(&self) -> CatalogView {
        CatalogView {
            movies: self.all_movies(),
            profiles: self.all_profiles(),
            ratings: self.all_ratings(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) principals: BTreeMap<PrincipalId, Principal>,
    pub(crate) profiles: BTreeMap<PrincipalId, UserProfile>,
    pub(crate) movies: BTreeMap<MovieId, Movie>,
    pub(crate) ratings: BTreeMap<(PrincipalId, MovieId), RatingRecord>,
}

/// On-disk shape of the catalog
#[derive(Debug, Serialize, Deserialize)]
struct PersistedCatalog {
    next_principal_id: PrincipalId,
    next_engine_user_id: EngineUserId,
    #[serde(default)]
    principals: Vec<Principal>,
    #[serde(default)]
    profiles: Vec<UserProfile>,
    #[serde(default)]
    movies: Vec<Movie>,
    #[serde(default)]
    ratings: Vec<RatingRecord>,
}

/// The relational store.
#[derive(Debug)]
pub struct Catalog {
    tables: RwLock<Tables>,
    next_principal_id: AtomicU64,
    next_engine_user_id: AtomicU32,
}

impl Catalog {
    /// Creates an empty catalog
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_principal_id: AtomicU64::new(1),
            next_engine_user_id: AtomicU32::new(FIRST_ENGINE_USER_ID),
        }
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Load a catalog from a JSON file.
    ///
    /// A missing file yields an empty catalog. Aggregates are recomputed
    /// rather than trusted.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No catalog at {:?}, starting empty", path);
            return Ok(Self::new());
        }

        let bytes = fs::read(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let persisted: PersistedCatalog =
            serde_json::from_slice(&bytes).map_err(|source| CatalogError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        let mut tables = Tables::default();
        for principal in persisted.principals {
            tables.principals.insert(principal.id, principal);
        }
        for profile in persisted.profiles {
            tables.profiles.insert(profile.principal_id, profile);
        }
        for movie in persisted.movies {
            tables.movies.insert(movie.movie_id, movie);
        }
        for rating in persisted.ratings {
            tables
                .ratings
                .insert((rating.principal_id, rating.movie_id), rating);
        }
        stats::refresh_all(&mut tables);

        // Never hand out an id that is already on disk, even if the stored
        // counter was edited by hand.
        let next_principal = tables
            .principals
            .keys()
            .next_back()
            .map_or(1, |max| max + 1)
            .max(persisted.next_principal_id);
        let next_engine = tables
            .profiles
            .values()
            .map(|p| p.engine_user_id.saturating_add(1))
            .max()
            .unwrap_or(FIRST_ENGINE_USER_ID)
            .max(persisted.next_engine_user_id)
            .max(FIRST_ENGINE_USER_ID);

        info!(
            "Loaded catalog from {:?}: {} movies, {} principals, {} profiles, {} ratings",
            path,
            tables.movies.len(),
            tables.principals.len(),
            tables.profiles.len(),
            tables.ratings.len()
        );

        Ok(Self {
            tables: RwLock::new(tables),
            next_principal_id: AtomicU64::new(next_principal),
            next_engine_user_id: AtomicU32::new(next_engine),
        })
    }

    /// Write the catalog as pretty JSON, replacing `path` atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let persisted = {
            let tables = self.tables.read();
            PersistedCatalog {
                next_principal_id: self.next_principal_id.load(Ordering::SeqCst),
                next_engine_user_id: self.next_engine_user_id.load(Ordering::SeqCst),
                principals: tables.principals.values().cloned().collect(),
                profiles: tables.profiles.values().cloned().collect(),
                movies: tables.movies.values().cloned().collect(),
                ratings: tables.ratings.values().cloned().collect(),
            }
        };

        let io_err = |source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_vec_pretty(&persisted).map_err(|source| CatalogError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;

        debug!("Saved catalog to {:?}", path);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Principals and profiles
    // -------------------------------------------------------------------------

    /// Register a login identity
    pub fn create_principal(&self, username: &str) -> Result<Principal> {
        let username = username.trim();
        if username.is_empty() {
            return Err(CatalogError::BlankUsername);
        }

        let mut tables = self.tables.write();
        if tables.principals.values().any(|p| p.username == username) {
            return Err(CatalogError::DuplicateUsername(username.to_string()));
        }

        let principal = Principal {
            id: self.next_principal_id.fetch_add(1, Ordering::SeqCst),
            username: username.to_string(),
        };
        tables.principals.insert(principal.id, principal.clone());
        debug!("Created principal {} ({})", principal.id, principal.username);
        Ok(principal)
    }

    /// Attach a profile to a principal, allocating its engine user id
    pub fn create_profile(&self, principal_id: PrincipalId, age: u32) -> Result<UserProfile> {
        if !(MIN_AGE..=MAX_AGE).contains(&age) {
            return Err(CatalogError::InvalidAge(age));
        }

        let mut tables = self.tables.write();
        if !tables.principals.contains_key(&principal_id) {
            return Err(CatalogError::UnknownPrincipal(principal_id));
        }
        if tables.profiles.contains_key(&principal_id) {
            return Err(CatalogError::ProfileExists(principal_id));
        }

        let mut profile = UserProfile {
            principal_id,
            engine_user_id: self.allocate_engine_user_id()?,
            age,
            ratings_count: 0,
            avg_rating_given: 0.0,
        };
        // Ratings entered before the profile existed still count.
        stats::apply_profile_stats(&tables, &mut profile);
        tables.profiles.insert(principal_id, profile.clone());

        info!(
            "Created profile for principal {} with engine user id {}",
            principal_id, profile.engine_user_id
        );
        Ok(profile)
    }

    /// Take the next engine user id from the sequence.
    ///
    /// Ids are handed out strictly increasing and never return to the pool.
    pub fn allocate_engine_user_id(&self) -> Result<EngineUserId> {
        self.next_engine_user_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map_err(|_| CatalogError::SequenceExhausted)
    }

    /// Remove a login identity and its ratings.
    ///
    /// The profile row stays behind without a display name so its engine
    /// user id is retired rather than recycled.
    pub fn remove_principal(&self, principal_id: PrincipalId) -> Result<Principal> {
        let mut tables = self.tables.write();
        let principal = tables
            .principals
            .remove(&principal_id)
            .ok_or(CatalogError::UnknownPrincipal(principal_id))?;

        let touched: Vec<MovieId> = tables
            .ratings
            .range((principal_id, MovieId::MIN)..=(principal_id, MovieId::MAX))
            .map(|(&(_, movie_id), _)| movie_id)
            .collect();
        for movie_id in &touched {
            tables.ratings.remove(&(principal_id, *movie_id));
        }
        for movie_id in touched {
            stats::recompute_movie(&mut tables, movie_id);
        }
        stats::recompute_profile(&mut tables, principal_id);

        info!("Removed principal {} ({})", principal.id, principal.username);
        Ok(principal)
    }

    pub fn principal(&self, principal_id: PrincipalId) -> Option<Principal> {
        self.tables.read().principals.get(&principal_id).cloned()
    }

    pub fn principal_by_username(&self, username: &str) -> Option<Principal> {
        self.tables
            .read()
            .principals
            .values()
            .find(|p| p.username == username)
            .cloned()
    }

    pub fn profile(&self, principal_id: PrincipalId) -> Option<UserProfile> {
        self.tables.read().profiles.get(&principal_id).cloned()
    }

    /// Resolve the engine identity of a principal
    pub fn engine_user_id(&self, principal_id: PrincipalId) -> Result<EngineUserId> {
        let tables = self.tables.read();
        if !tables.principals.contains_key(&principal_id) {
            return Err(CatalogError::UnknownPrincipal(principal_id));
        }
        tables
            .profiles
            .get(&principal_id)
            .map(|p| p.engine_user_id)
            .ok_or(CatalogError::NoProfile(principal_id))
    }

    // -------------------------------------------------------------------------
    // Movies
    // -------------------------------------------------------------------------

    pub fn movie(&self, movie_id: MovieId) -> Option<Movie> {
        self.tables.read().movies.get(&movie_id).cloned()
    }

    // -------------------------------------------------------------------------
    // Ratings
    // -------------------------------------------------------------------------

    /// Validate a rating without storing it
    pub fn check_rating(&self, principal_id: PrincipalId, movie_id: MovieId, score: f32) -> Result<()> {
        let tables = self.tables.read();
        check_rating_against(&tables, principal_id, movie_id, score)
    }

    /// Insert or update the single rating of `principal_id` for `movie_id`
    pub fn upsert_rating(
        &self,
        principal_id: PrincipalId,
        movie_id: MovieId,
        score: f32,
    ) -> Result<(RatingRecord, UpsertOutcome)> {
        let mut tables = self.tables.write();
        check_rating_against(&tables, principal_id, movie_id, score)?;

        let now = Utc::now();
        let (record, outcome) = match tables.ratings.get_mut(&(principal_id, movie_id)) {
            Some(existing) if existing.score == score => (existing.clone(), UpsertOutcome::Unchanged),
            Some(existing) => {
                existing.score = score;
                existing.updated_at = now;
                (existing.clone(), UpsertOutcome::Updated)
            }
            None => {
                let record = RatingRecord {
                    principal_id,
                    movie_id,
                    score,
                    created_at: now,
                    updated_at: now,
                };
                tables
                    .ratings
                    .insert((principal_id, movie_id), record.clone());
                (record, UpsertOutcome::Inserted)
            }
        };

        if outcome != UpsertOutcome::Unchanged {
            stats::recompute_movie(&mut tables, movie_id);
            stats::recompute_profile(&mut tables, principal_id);
        }
        debug!(
            "Rating {:?}: principal {} movie {} score {}",
            outcome, principal_id, movie_id, score
        );
        Ok((record, outcome))
    }

    pub fn rating(&self, principal_id: PrincipalId, movie_id: MovieId) -> Option<RatingRecord> {
        self.tables
            .read()
            .ratings
            .get(&(principal_id, movie_id))
            .cloned()
    }

    /// All ratings of one principal, newest first
    pub fn ratings_by(&self, principal_id: PrincipalId) -> Vec<RatingRecord> {
        let mut ratings: Vec<RatingRecord> = self
            .tables
            .read()
            .ratings
            .range((principal_id, MovieId::MIN)..=(principal_id, MovieId::MAX))
            .map(|(_, r)| r.clone())
            .collect();
        ratings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        ratings
    }

    /// Recompute every aggregate from scratch
    pub fn refresh_stats(&self) {
        stats::refresh_all(&mut self.tables.write());
    }

    /// Get counts for debugging/validation: (movies, profiles, ratings)
    pub fn counts(&self) -> (usize, usize, usize) {
        let tables = self.tables.read();
        (tables.movies.len(), tables.profiles.len(), tables.ratings.len())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

fn check_rating_against(
    tables: &Tables,
    principal_id: PrincipalId,
    movie_id: MovieId,
    score: f32,
) -> Result<()> {
    if !score_in_range(score) {
        return Err(CatalogError::ScoreOutOfRange(score));
    }
    if !tables.principals.contains_key(&principal_id) {
        return Err(CatalogError::UnknownPrincipal(principal_id));
    }
    if !tables.movies.contains_key(&movie_id) {
        return Err(CatalogError::UnknownMovie(movie_id));
    }
    Ok(())
}

fn profile_rows(tables: &Tables) -> Vec<ProfileRow> {
    let mut rows: Vec<ProfileRow> = tables
        .profiles
        .values()
        .map(|profile| ProfileRow {
            engine_user_id: profile.engine_user_id,
            display_name: tables
                .principals
                .get(&profile.principal_id)
                .map(|p| p.username.trim().to_string())
                .filter(|name| !name.is_empty()),
            age: profile.age,
        })
        .collect();
    rows.sort_by_key(|row| row.engine_user_id);
    rows
}

fn resolved_ratings(tables: &Tables) -> Vec<ResolvedRating> {
    tables
        .ratings
        .values()
        .map(|rating| ResolvedRating {
            engine_user_id: tables
                .profiles
                .get(&rating.principal_id)
                .map(|p| p.engine_user_id),
            movie_id: rating.movie_id,
            score: rating.score,
        })
        .collect()
}

impl CatalogStore for Catalog {
    fn all_movies(&self) -> Vec<Movie> {
        self.tables.read().movies.values().cloned().collect()
    }

    fn all_profiles(&self) -> Vec<ProfileRow> {
        profile_rows(&self.tables.read())
    }

    fn all_ratings(&self) -> Vec<ResolvedRating> {
        resolved_ratings(&self.tables.read())
    }

    fn upsert_movie(&self, movie: Movie) -> Result<UpsertOutcome> {
        if let Some(reason) = movie.listing_problem() {
            return Err(CatalogError::InvalidMovie {
                movie_id: movie.movie_id,
                reason: reason.to_string(),
            });
        }

        let mut tables = self.tables.write();
        let outcome = match tables.movies.get_mut(&movie.movie_id) {
            Some(existing) if existing.same_listing(&movie) => UpsertOutcome::Unchanged,
            Some(existing) => {
                existing.title = movie.title;
                existing.genre = movie.genre;
                existing.year = movie.year;
                UpsertOutcome::Updated
            }
            None => {
                let movie_id = movie.movie_id;
                tables.movies.insert(movie_id, movie);
                stats::recompute_movie(&mut tables, movie_id);
                UpsertOutcome::Inserted
            }
        };
        Ok(outcome)
    }

    fn view(&self) -> CatalogView {
        let tables = self.tables.read();
        CatalogView {
            movies: tables.movies.values().cloned().collect(),
            profiles: profile_rows(&tables),
            ratings: resolved_ratings(&tables),
        }
    }
}

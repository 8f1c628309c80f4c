//! Orchestrator tests against an in-process engine double.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge::{GenerationPlan, SyncError, SyncOrchestrator, TEST_USERNAME};
use catalog::{
    Catalog, CatalogError, CatalogStore, EngineUserId, Movie, MovieId, PrincipalId, UpsertOutcome,
};
use engine_client::{EngineError, Recommendation, RecommendationEngine, Verb};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use snapshot::{ImportOutcome, SnapshotWorkspace};
use tempfile::{tempdir, TempDir};

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Clone, Copy)]
enum AddRatingBehavior {
    Acknowledge,
    Refuse,
    Crash,
}

/// Engine double that records what the snapshot looked like at call time
struct ScriptedEngine {
    dir: PathBuf,
    picks: Vec<(MovieId, f32)>,
    add_rating: AddRatingBehavior,
    calls: AtomicUsize,
    in_call: AtomicBool,
    overlapped: AtomicBool,
    seen_ratings: Mutex<Vec<String>>,
    // Principal dropped from the catalog while the engine handles add_rating
    remove_during_add: Mutex<Option<(Arc<Catalog>, PrincipalId)>>,
}

impl ScriptedEngine {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            picks: vec![(3, 4.8), (99, 4.6), (2, 4.1)],
            add_rating: AddRatingBehavior::Acknowledge,
            calls: AtomicUsize::new(0),
            in_call: AtomicBool::new(false),
            overlapped: AtomicBool::new(false),
            seen_ratings: Mutex::new(Vec::new()),
            remove_during_add: Mutex::new(None),
        }
    }

    async fn enter(&self) {
        if self.in_call.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ratings = fs::read_to_string(self.dir.join("ratings.csv")).unwrap_or_default();
        self.seen_ratings.lock().push(ratings);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_call.store(false, Ordering::SeqCst);
    }

    fn last_seen_ratings(&self) -> String {
        self.seen_ratings.lock().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl RecommendationEngine for ScriptedEngine {
    async fn recommend(
        &self,
        _user: EngineUserId,
        count: usize,
    ) -> engine_client::Result<Vec<Recommendation>> {
        self.enter().await;
        Ok(self
            .picks
            .iter()
            .take(count)
            .map(|&(movie_id, predicted_score)| Recommendation {
                movie_id,
                predicted_score,
                title: None,
                genre: None,
                year: None,
                reason: Some("Similar users liked this".to_string()),
            })
            .collect())
    }

    async fn add_rating(
        &self,
        _user: EngineUserId,
        _movie: MovieId,
        _score: f32,
    ) -> engine_client::Result<bool> {
        self.enter().await;
        if let Some((catalog, principal_id)) = self.remove_during_add.lock().take() {
            catalog.remove_principal(principal_id).unwrap();
        }
        match self.add_rating {
            AddRatingBehavior::Acknowledge => Ok(true),
            AddRatingBehavior::Refuse => Ok(false),
            AddRatingBehavior::Crash => Err(EngineError::Failure {
                verb: Verb::AddRating,
                exit_code: Some(1),
                diagnostic: "User or movie not found\n".to_string(),
            }),
        }
    }
}

struct Harness {
    _dir: TempDir,
    catalog: Arc<Catalog>,
    engine: Arc<ScriptedEngine>,
    orchestrator: SyncOrchestrator,
}

fn harness_with(configure: impl FnOnce(&mut ScriptedEngine)) -> Harness {
    let dir = tempdir().unwrap();
    let workspace = SnapshotWorkspace::open(dir.path()).unwrap();
    let mut engine = ScriptedEngine::new(workspace.dir());
    configure(&mut engine);
    let engine = Arc::new(engine);

    let catalog = Arc::new(Catalog::new());
    for (id, title, genre, year) in [
        (1, "The Shawshank Redemption", "Drama", 1994),
        (2, "The Godfather", "Crime", 1972),
        (3, "The Dark Knight", "Action", 2008),
    ] {
        catalog.upsert_movie(Movie::new(id, title, genre, year)).unwrap();
    }

    let orchestrator = SyncOrchestrator::new(catalog.clone(), workspace, engine.clone());
    Harness {
        _dir: dir,
        catalog,
        engine,
        orchestrator,
    }
}

fn harness() -> Harness {
    harness_with(|_| {})
}

// ============================================================================
// recommend
// ============================================================================

#[tokio::test]
async fn test_recommend_exports_before_calling_engine() {
    let h = harness();
    let alice = h.orchestrator.register_user("alice", 25).await.unwrap();
    // Written straight to the catalog, after the registration sync
    h.catalog.upsert_rating(alice.principal.id, 1, 5.0).unwrap();

    h.orchestrator.recommend(alice.principal.id, 10).await.unwrap();

    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.engine.last_seen_ratings(), "user_id,movie_id,rating\n101,1,5.0\n");
}

#[tokio::test]
async fn test_recommend_enriches_and_drops_unknown_movies() {
    let h = harness();
    let alice = h.orchestrator.register_user("alice", 25).await.unwrap();

    let picks = h.orchestrator.recommend(alice.principal.id, 10).await.unwrap();

    let titles: Vec<&str> = picks.iter().map(|p| p.movie.title.as_str()).collect();
    assert_eq!(titles, vec!["The Dark Knight", "The Godfather"]);
    assert_eq!(picks[0].predicted_score, 4.8);
    assert_eq!(picks[0].reason.as_deref(), Some("Similar users liked this"));
}

#[tokio::test]
async fn test_recommend_requires_profile() {
    let h = harness();
    let dave = h.catalog.create_principal("dave").unwrap();

    let err = h.orchestrator.recommend(dave.id, 10).await.unwrap_err();
    assert!(matches!(err, SyncError::Catalog(CatalogError::NoProfile(id)) if id == dave.id));
    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_recommend_zero_count_skips_engine() {
    let h = harness();
    let alice = h.orchestrator.register_user("alice", 25).await.unwrap();

    assert!(h.orchestrator.recommend(alice.principal.id, 0).await.unwrap().is_empty());
    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_requests_never_overlap() {
    let h = harness();
    let alice = h.orchestrator.register_user("alice", 25).await.unwrap();
    let bob = h.orchestrator.register_user("bob", 30).await.unwrap();

    let first = h.orchestrator.clone();
    let second = h.orchestrator.clone();
    let (a, b, c) = tokio::join!(
        first.recommend(alice.principal.id, 5),
        second.record_rating(bob.principal.id, 2, 4.0),
        h.orchestrator.recommend(bob.principal.id, 5),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 3);
    assert!(!h.engine.overlapped.load(Ordering::SeqCst));
}

// ============================================================================
// record_rating
// ============================================================================

#[tokio::test]
async fn test_record_rating_commits_after_ack() {
    let h = harness();
    let bob = h.orchestrator.register_user("bob", 30).await.unwrap();

    let recorded = h.orchestrator.record_rating(bob.principal.id, 3, 4.5).await.unwrap();
    assert_eq!(recorded.outcome, UpsertOutcome::Inserted);
    assert_eq!(h.catalog.rating(bob.principal.id, 3).unwrap().score, 4.5);

    let updated = h.orchestrator.record_rating(bob.principal.id, 3, 3.5).await.unwrap();
    assert_eq!(updated.outcome, UpsertOutcome::Updated);
    assert_eq!(h.catalog.rating(bob.principal.id, 3).unwrap().score, 3.5);
    // The engine saw the first rating in the snapshot before the update call
    assert_eq!(h.engine.last_seen_ratings(), "user_id,movie_id,rating\n101,3,4.5\n");
}

#[tokio::test]
async fn test_engine_failure_leaves_catalog_unchanged() {
    let h = harness_with(|e| e.add_rating = AddRatingBehavior::Crash);
    let bob = h.orchestrator.register_user("bob", 30).await.unwrap();
    h.catalog.upsert_rating(bob.principal.id, 1, 2.0).unwrap();
    let before = h.catalog.rating(bob.principal.id, 1).unwrap();

    let err = h.orchestrator.record_rating(bob.principal.id, 1, 5.0).await.unwrap_err();
    match &err {
        SyncError::Engine(engine) => {
            assert!(engine.diagnostic().unwrap().contains("User or movie not found"));
        }
        other => panic!("expected engine failure, got {:?}", other),
    }

    assert_eq!(h.catalog.rating(bob.principal.id, 1), Some(before));
    assert!(h.catalog.rating(bob.principal.id, 2).is_none());
}

#[tokio::test]
async fn test_unacknowledged_rating_is_not_committed() {
    let h = harness_with(|e| e.add_rating = AddRatingBehavior::Refuse);
    let bob = h.orchestrator.register_user("bob", 30).await.unwrap();

    let err = h.orchestrator.record_rating(bob.principal.id, 2, 4.0).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::NotAcknowledged { engine_user_id: 101, movie_id: 2 }
    ));
    assert!(err.is_retryable());
    assert!(h.catalog.rating(bob.principal.id, 2).is_none());
}

#[tokio::test]
async fn test_catalog_refusal_after_ack_surfaces_error() {
    let h = harness();
    let bob = h.orchestrator.register_user("bob", 30).await.unwrap();
    *h.engine.remove_during_add.lock() = Some((h.catalog.clone(), bob.principal.id));

    let err = h.orchestrator.record_rating(bob.principal.id, 2, 4.0).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Catalog(CatalogError::UnknownPrincipal(id)) if id == bob.principal.id
    ));
    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 1);
    assert!(h.catalog.rating(bob.principal.id, 2).is_none());
    assert!(h.catalog.all_ratings().is_empty());
}

#[tokio::test]
async fn test_invalid_rating_never_reaches_engine() {
    let h = harness();
    let bob = h.orchestrator.register_user("bob", 30).await.unwrap();

    let err = h.orchestrator.record_rating(bob.principal.id, 2, 5.5).await.unwrap_err();
    assert!(matches!(err, SyncError::Catalog(CatalogError::ScoreOutOfRange(_))));

    let err = h.orchestrator.record_rating(bob.principal.id, 42, 4.0).await.unwrap_err();
    assert!(matches!(err, SyncError::Catalog(CatalogError::UnknownMovie(42))));

    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn test_register_user_assigns_sequential_ids_and_syncs() {
    let h = harness();
    let alice = h.orchestrator.register_user("alice", 25).await.unwrap();
    let bob = h.orchestrator.register_user("bob", 30).await.unwrap();

    assert_eq!(alice.profile.engine_user_id, 101);
    assert_eq!(bob.profile.engine_user_id, 102);

    let users = fs::read_to_string(h.orchestrator.workspace().dir().join("users.csv")).unwrap();
    assert_eq!(users, "user_id,name,age\n101,alice,25\n102,bob,30\n");
}

#[tokio::test]
async fn test_register_user_with_bad_age_leaves_nothing_behind() {
    let h = harness();

    let err = h.orchestrator.register_user("carol", 0).await.unwrap_err();
    assert!(matches!(err, SyncError::Catalog(CatalogError::InvalidAge(0))));
    assert!(h.catalog.principal_by_username("carol").is_none());
}

#[tokio::test]
async fn test_complete_profile_for_existing_principal() {
    let h = harness();
    let dave = h.catalog.create_principal("dave").unwrap();
    h.catalog.upsert_rating(dave.id, 1, 4.0).unwrap();

    let profile = h.orchestrator.complete_profile(dave.id, 40).await.unwrap();
    assert_eq!(profile.engine_user_id, 101);
    assert_eq!(profile.ratings_count, 1);

    let ratings = fs::read_to_string(h.orchestrator.workspace().dir().join("ratings.csv")).unwrap();
    assert_eq!(ratings, "user_id,movie_id,rating\n101,1,4.0\n");
}

#[tokio::test]
async fn test_principal_lookup_by_username() {
    let h = harness();
    let alice = h.orchestrator.register_user("alice", 25).await.unwrap();

    assert_eq!(h.orchestrator.principal_id("alice").unwrap(), alice.principal.id);
    assert!(matches!(
        h.orchestrator.principal_id("nobody"),
        Err(SyncError::Catalog(CatalogError::UnknownUsername(_)))
    ));
}

// ============================================================================
// Import and verify
// ============================================================================

#[tokio::test]
async fn test_import_movies_from_snapshot_dir() {
    let h = harness();
    let path = h.orchestrator.workspace().dir().join("movies.csv");

    fs::remove_file(&path).ok();
    assert_eq!(
        h.orchestrator.import_movies().await.unwrap(),
        ImportOutcome::MissingSource
    );

    fs::write(
        &path,
        "movie_id,title,genre,year\n3,The Dark Knight,Action,2008\n6,Inception,Sci-Fi,2010\n",
    )
    .unwrap();
    match h.orchestrator.import_movies().await.unwrap() {
        ImportOutcome::Applied(report) => {
            assert_eq!(report.inserted, 1);
            assert_eq!(report.unchanged, 1);
        }
        other => panic!("expected Applied, got {:?}", other),
    }
    assert_eq!(h.catalog.movie(6).unwrap().title, "Inception");
}

#[tokio::test]
async fn test_verify_after_sync_is_consistent() {
    let h = harness();
    let alice = h.orchestrator.register_user("alice", 25).await.unwrap();
    h.catalog.upsert_rating(alice.principal.id, 2, 4.0).unwrap();
    h.orchestrator.sync().await.unwrap();

    let report = h.orchestrator.verify().await.unwrap();
    assert_eq!((report.movies, report.users, report.ratings), (3, 1, 1));
    assert!(report.is_consistent());

    // A row the engine appended for a user the snapshot does not know
    let ratings = h.orchestrator.workspace().dir().join("ratings.csv");
    let mut text = fs::read_to_string(&ratings).unwrap();
    text.push_str("150,1,3.0\n");
    fs::write(&ratings, text).unwrap();

    assert!(!h.orchestrator.verify().await.unwrap().is_consistent());
}

// ============================================================================
// Population helpers
// ============================================================================

#[tokio::test]
async fn test_generate_users_respects_plan() {
    let h = harness();
    let mut rng = StdRng::seed_from_u64(7);
    let plan = GenerationPlan {
        users: 12,
        min_ratings: 1,
        max_ratings: 2,
    };

    let report = h.orchestrator.generate_users_with(&mut rng, plan).await.unwrap();

    assert_eq!(report.users_created, 12);
    assert!((12..=24).contains(&report.ratings_created));
    assert_eq!(report.export.users.written, 12);
    assert_eq!(report.export.ratings.written, report.ratings_created);
    assert_eq!(h.catalog.counts().1, 12);
}

#[tokio::test]
async fn test_generate_users_caps_ratings_at_catalog_size() {
    let h = harness();
    let mut rng = StdRng::seed_from_u64(11);
    let plan = GenerationPlan {
        users: 3,
        min_ratings: 10,
        max_ratings: 20,
    };

    let report = h.orchestrator.generate_users_with(&mut rng, plan).await.unwrap();
    // Only three movies to go around
    assert_eq!(report.ratings_created, 9);
}

#[tokio::test]
async fn test_generate_users_rejects_bad_plans() {
    let h = harness();
    let mut rng = StdRng::seed_from_u64(1);
    let plan = GenerationPlan {
        users: 1,
        min_ratings: 5,
        max_ratings: 2,
    };
    assert!(matches!(
        h.orchestrator.generate_users_with(&mut rng, plan).await,
        Err(SyncError::InvalidRequest(_))
    ));

    let empty = SyncOrchestrator::new(
        Arc::new(Catalog::new()),
        h.orchestrator.workspace().clone(),
        h.engine.clone(),
    );
    assert!(matches!(
        empty.generate_users_with(&mut rng, GenerationPlan::default()).await,
        Err(SyncError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_create_test_user_is_idempotent() {
    let h = harness();
    let mut rng = StdRng::seed_from_u64(3);

    let first = h.orchestrator.create_test_user_with(&mut rng).await.unwrap();
    assert!(first.created);
    assert_eq!(first.principal.username, TEST_USERNAME);
    assert_eq!(first.new_ratings, 3);
    assert_eq!(first.profile.ratings_count, 3);
    for rating in h.catalog.ratings_by(first.principal.id) {
        assert!((3.0..=5.0).contains(&rating.score));
    }

    let second = h.orchestrator.create_test_user_with(&mut rng).await.unwrap();
    assert!(!second.created);
    assert_eq!(second.new_ratings, 0);
    assert_eq!(second.profile.engine_user_id, first.profile.engine_user_id);
}

#[tokio::test]
async fn test_seed_demo_loads_sample_catalog() {
    let h = harness();

    let report = h.orchestrator.seed_demo().await.unwrap();
    assert_eq!((report.movies, report.users, report.ratings), (10, 5, 15));
    assert_eq!(report.export.ratings.written, 15);
    assert_eq!(h.catalog.counts(), (10, 5, 15));

    let users = fs::read_to_string(h.orchestrator.workspace().dir().join("users.csv")).unwrap();
    assert!(users.starts_with("user_id,name,age\n101,Alice,25\n102,Bob,30\n"));

    // Running it again changes nothing
    h.orchestrator.seed_demo().await.unwrap();
    assert_eq!(h.catalog.counts(), (10, 5, 15));
}

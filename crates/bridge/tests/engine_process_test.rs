//! Orchestrator driving a real engine process (a shell script).

#![cfg(unix)]

use std::fs;
use std::sync::Arc;

use bridge::{SyncError, SyncOrchestrator};
use catalog::{Catalog, CatalogStore, Movie};
use engine_client::{EngineError, GatewayConfig, SubprocessEngine};
use snapshot::SnapshotWorkspace;
use tempfile::{tempdir, TempDir};

/// Reads the snapshot like the real engine: fails unless all three files exist
/// and only accepts ratings from users present in users.csv.
const ENGINE_SCRIPT: &str = r#"
for f in movies.csv users.csv ratings.csv; do
  [ -f "$f" ] || { echo "missing $f" >&2; exit 2; }
done
case "$1" in
  recommend)
    echo '[{"movie_id":2,"predicted_rating":4.2,"reason":"Popular in Crime"}]'
    ;;
  add_rating)
    if grep -q "^$2," users.csv; then
      echo "$2,$3,$4" >> ratings.csv
      echo '{"status":"success"}'
    else
      echo "User or movie not found" >&2
      exit 1
    fi
    ;;
  *)
    echo "Unknown command: $1" >&2
    exit 1
    ;;
esac
"#;

const BROKEN_SCRIPT: &str = "echo 'User or movie not found' >&2\nexit 1\n";

struct Setup {
    _snapshot: TempDir,
    _scripts: TempDir,
    catalog: Arc<Catalog>,
    orchestrator: SyncOrchestrator,
}

fn setup(script: &str) -> Setup {
    let snapshot = tempdir().unwrap();
    let scripts = tempdir().unwrap();
    let script_path = scripts.path().join("c_interface.sh");
    fs::write(&script_path, script).unwrap();

    let workspace = SnapshotWorkspace::open(snapshot.path()).unwrap();
    let config = GatewayConfig::new("/bin/sh", workspace.dir())
        .with_leading_args([script_path.to_string_lossy().into_owned()]);

    let catalog = Arc::new(Catalog::new());
    catalog.upsert_movie(Movie::new(1, "The Shawshank Redemption", "Drama", 1994)).unwrap();
    catalog.upsert_movie(Movie::new(2, "The Godfather", "Crime", 1972)).unwrap();

    let orchestrator =
        SyncOrchestrator::new(catalog.clone(), workspace, Arc::new(SubprocessEngine::new(config)));
    Setup {
        _snapshot: snapshot,
        _scripts: scripts,
        catalog,
        orchestrator,
    }
}

#[tokio::test]
async fn test_rate_then_recommend_through_engine_process() {
    let s = setup(ENGINE_SCRIPT);
    let alice = s.orchestrator.register_user("alice", 25).await.unwrap();

    s.orchestrator.record_rating(alice.principal.id, 1, 5.0).await.unwrap();
    assert_eq!(s.catalog.rating(alice.principal.id, 1).unwrap().score, 5.0);

    let picks = s.orchestrator.recommend(alice.principal.id, 10).await.unwrap();
    assert_eq!(picks.len(), 1);
    assert_eq!(picks[0].movie.title, "The Godfather");
    assert_eq!(picks[0].reason.as_deref(), Some("Popular in Crime"));

    // The engine's appended row was replaced by the catalog's own copy
    let ratings = fs::read_to_string(s.orchestrator.workspace().dir().join("ratings.csv")).unwrap();
    assert_eq!(ratings, "user_id,movie_id,rating\n101,1,5.0\n");
}

#[tokio::test]
async fn test_engine_exit_failure_keeps_stderr_and_catalog() {
    let s = setup(BROKEN_SCRIPT);
    let bob = s.orchestrator.register_user("bob", 30).await.unwrap();

    let err = s.orchestrator.record_rating(bob.principal.id, 2, 4.0).await.unwrap_err();
    match err {
        SyncError::Engine(EngineError::Failure { exit_code, diagnostic, .. }) => {
            assert_eq!(exit_code, Some(1));
            assert!(diagnostic.contains("User or movie not found"));
        }
        other => panic!("expected engine failure, got {:?}", other),
    }
    assert!(s.catalog.rating(bob.principal.id, 2).is_none());
    assert_eq!(s.catalog.all_ratings().len(), 0);
}

//! The snapshot directory and its process-wide write lock.
//!
//! The three flat files are one shared mutable resource. Every handle opened
//! for the same directory shares one async mutex, and every export, import
//! or engine call that reads the files runs while holding a `SnapshotLease`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{Result, SnapshotError};
use crate::{MOVIES_FILE, RATINGS_FILE, USERS_FILE};

type LockRegistry = parking_lot::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>;

fn registry() -> &'static LockRegistry {
    static LOCKS: OnceLock<LockRegistry> = OnceLock::new();
    LOCKS.get_or_init(Default::default)
}

/// Handle to a snapshot directory.
///
/// Cheap to clone; clones and independently opened handles for the same
/// directory serialize against each other.
#[derive(Debug, Clone)]
pub struct SnapshotWorkspace {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl SnapshotWorkspace {
    /// Open (and create if needed) the snapshot directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let requested = dir.as_ref();
        let workspace_err = |source| SnapshotError::Workspace {
            path: requested.to_path_buf(),
            source,
        };
        fs::create_dir_all(requested).map_err(workspace_err)?;
        let dir = requested.canonicalize().map_err(workspace_err)?;

        let lock = registry()
            .lock()
            .entry(dir.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        Ok(Self { dir, lock })
    }

    /// Canonical path of the snapshot directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Wait for exclusive access to the snapshot files
    pub async fn acquire(&self) -> SnapshotLease {
        let started = Instant::now();
        let guard = self.lock.clone().lock_owned().await;
        debug!("Acquired snapshot lease on {:?} after {:.2?}", self.dir, started.elapsed());
        SnapshotLease {
            dir: self.dir.clone(),
            _guard: guard,
        }
    }

    /// Take the lease only if nobody holds it
    pub fn try_acquire(&self) -> Option<SnapshotLease> {
        let guard = self.lock.clone().try_lock_owned().ok()?;
        Some(SnapshotLease {
            dir: self.dir.clone(),
            _guard: guard,
        })
    }
}

/// Exclusive access to the snapshot files, released on drop.
///
/// Owned, so it can move into a blocking task and back.
#[derive(Debug)]
pub struct SnapshotLease {
    dir: PathBuf,
    _guard: OwnedMutexGuard<()>,
}

impl SnapshotLease {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn movies_path(&self) -> PathBuf {
        self.dir.join(MOVIES_FILE)
    }

    pub fn users_path(&self) -> PathBuf {
        self.dir.join(USERS_FILE)
    }

    pub fn ratings_path(&self) -> PathBuf {
        self.dir.join(RATINGS_FILE)
    }
}

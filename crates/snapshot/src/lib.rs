//! # Snapshot Crate
//!
//! The flat-file side of the bridge. The engine reads three tables from its
//! working directory; this crate writes them from the relational store and
//! reads the movie table back for catalog bootstrap.
//!
//! ## Main Components
//!
//! - **codec**: Delimited text encoding with header rows
//! - **workspace**: The snapshot directory and its process-wide lock
//! - **exporter**: `export_movies`, `export_users`, `export_ratings`, `sync_all`
//! - **importer**: `import_movies`
//! - **reader**: Parse tables back and validate what is on disk
//!
//! ## Example Usage
//!
//! ```ignore
//! use snapshot::{SnapshotExporter, SnapshotWorkspace};
//!
//! let workspace = SnapshotWorkspace::open("engine")?;
//! let exporter = SnapshotExporter::new(catalog.clone());
//!
//! let lease = workspace.acquire().await;
//! let report = exporter.sync_all(&lease)?;
//! println!("{} ratings written", report.ratings.written);
//! ```

pub mod codec;
pub mod error;
pub mod exporter;
pub mod importer;
pub mod reader;
pub mod workspace;

pub use error::{Result, SnapshotError};
pub use exporter::{ExportReport, RatingExport, ReferentialGap, SnapshotExporter, UserExport};
pub use importer::{ImportOutcome, ImportReport, SnapshotImporter};
pub use reader::{MovieRow, RatingRow, Snapshot, SnapshotIssue, UserRow};
pub use workspace::{SnapshotLease, SnapshotWorkspace};

/// File names the engine looks for in its working directory
pub const MOVIES_FILE: &str = "movies.csv";
pub const USERS_FILE: &str = "users.csv";
pub const RATINGS_FILE: &str = "ratings.csv";

/// Column order of each table
pub const MOVIES_HEADER: &[&str] = &["movie_id", "title", "genre", "year"];
pub const USERS_HEADER: &[&str] = &["user_id", "name", "age"];
pub const RATINGS_HEADER: &[&str] = &["user_id", "movie_id", "rating"];

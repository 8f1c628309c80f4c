//! # Bridge Crate
//!
//! Keeps the catalog and the external engine consistent.
//!
//! ## Main Components
//!
//! - **SyncOrchestrator**: Export-before-call policy for `recommend` and `record_rating`
//! - **population**: Test user, synthetic users and the demo catalog
//! - **AppConfig**: Environment-driven settings
//!
//! ## Example Usage
//!
//! ```ignore
//! use bridge::{AppConfig, SyncOrchestrator};
//!
//! let config = AppConfig::from_env()?;
//! let engine = Arc::new(SubprocessEngine::new(config.gateway_config()));
//! let workspace = SnapshotWorkspace::open(&config.snapshot_dir)?;
//! let orchestrator = SyncOrchestrator::new(catalog, workspace, engine);
//!
//! let principal = orchestrator.principal_id("alice")?;
//! for pick in orchestrator.recommend(principal, 10).await? {
//!     println!("{} ({:.1})", pick.movie.title, pick.predicted_score);
//! }
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod population;

pub use config::{AppConfig, ConfigError};
pub use error::{Result, SyncError};
pub use orchestrator::{
    MovieRecommendation, RecordedRating, Registration, SyncOrchestrator, VerifyReport,
};
pub use population::{GenerationPlan, GenerationReport, SeedReport, TestUserReport, TEST_USERNAME};

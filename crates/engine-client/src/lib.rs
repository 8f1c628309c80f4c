//! # Engine Client
//!
//! Invokes the external scoring engine and decodes what it prints.
//!
//! The engine is a black box that reads the snapshot files from its working
//! directory. It knows two verbs:
//!
//! - `recommend <user_id> <count>` prints a JSON array, best first
//! - `add_rating <user_id> <movie_id> <rating>` prints `{"status":"success"}`
//!
//! ## Main Components
//!
//! - **RecommendationEngine**: The async seam the orchestrator talks to
//! - **SubprocessEngine**: Runs the engine executable once per call, with a deadline
//! - **GatewayConfig**: Executable path, working directory and timeouts
//! - **EngineError**: Timeout, Failure, EmptyResponse, Launch
//!
//! ## Example Usage
//!
//! ```ignore
//! use engine_client::{GatewayConfig, RecommendationEngine, SubprocessEngine};
//!
//! let engine = SubprocessEngine::new(GatewayConfig::new("c_interface", "engine"));
//! let picks = engine.recommend(101, 10).await?;
//! for pick in picks {
//!     println!("{} ({:.2})", pick.movie_id, pick.predicted_score);
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod subprocess;

use async_trait::async_trait;
use catalog::{EngineUserId, MovieId};

pub use config::{GatewayConfig, DEFAULT_ADD_RATING_TIMEOUT, DEFAULT_RECOMMEND_TIMEOUT};
pub use error::{EngineError, Result, Verb};
pub use protocol::Recommendation;
pub use subprocess::SubprocessEngine;

/// Anything that can score movies for an engine user.
///
/// Implementations read the snapshot in place, so callers hold the snapshot
/// lease across every call.
#[async_trait]
pub trait RecommendationEngine: Send + Sync {
    /// Up to `count` recommendations in the engine's order.
    ///
    /// `count == 0` yields an empty list without contacting the engine.
    async fn recommend(&self, user: EngineUserId, count: usize) -> Result<Vec<Recommendation>>;

    /// Tell the engine about a new rating.
    ///
    /// `Ok(false)` means the engine answered but did not report success.
    async fn add_rating(&self, user: EngineUserId, movie: MovieId, score: f32) -> Result<bool>;
}

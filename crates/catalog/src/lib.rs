//! # Catalog Crate
//!
//! The relational side of the bridge: movies, login identities, profiles and
//! ratings. It is the source of truth that the flat-file snapshot is derived
//! from.
//!
//! ## Main Components
//!
//! - **types**: Domain types (Movie, Principal, UserProfile, RatingRecord)
//! - **store**: The `Catalog` store and the `CatalogStore` trait the snapshot
//!   layer consumes
//! - **stats**: Per-movie and per-profile rating aggregates
//! - **error**: Error types for the relational side
//!
//! ## Example Usage
//!
//! ```ignore
//! use catalog::{Catalog, Movie, CatalogStore};
//! use std::path::Path;
//!
//! let catalog = Catalog::load(Path::new("catalog.json"))?;
//! catalog.upsert_movie(Movie::new(1, "The Matrix", "Sci-Fi", 1999))?;
//!
//! let bob = catalog.create_principal("bob")?;
//! let profile = catalog.create_profile(bob.id, 30)?;
//! catalog.upsert_rating(bob.id, 1, 4.5)?;
//!
//! catalog.save(Path::new("catalog.json"))?;
//! ```

pub mod error;
pub mod types;
pub mod store;
mod stats;

pub use error::{CatalogError, Result};
pub use store::{Catalog, CatalogStore};
pub use types::{
    // Type aliases
    EngineUserId,
    MovieId,
    PrincipalId,
    // Entities
    Movie,
    Principal,
    RatingRecord,
    UserProfile,
    // Read paths
    CatalogView,
    ProfileRow,
    ResolvedRating,
    UpsertOutcome,
    // Bounds
    format_score,
    score_in_range,
    FIRST_ENGINE_USER_ID,
    MAX_AGE,
    MAX_SCORE,
    MIN_AGE,
    MIN_SCORE,
};

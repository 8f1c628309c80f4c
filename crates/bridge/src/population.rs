//! Bulk ways to put users and ratings into the catalog.
//!
//! All of these write to the catalog directly, without going through the
//! engine, and finish with one snapshot sync so the engine picks up
//! everything at once.

use catalog::{CatalogError, CatalogStore, Movie, Principal, PrincipalId, UserProfile};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use snapshot::ExportReport;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::orchestrator::SyncOrchestrator;

pub const TEST_USERNAME: &str = "testuser";
const TEST_USER_AGE: u32 = 25;
const TEST_USER_MOVIES: usize = 10;

/// Scores handed out to synthetic users, skewed toward the high end
const SCORE_SCALE: [f32; 9] = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5, 5.0];
const SCORE_WEIGHTS: [u32; 9] = [1, 1, 2, 3, 8, 12, 20, 25, 28];

const FIRST_NAMES: &[&str] = &[
    "John", "Jane", "Mike", "Sarah", "David", "Emma", "Chris", "Lisa", "Tom", "Anna", "James",
    "Mary", "Robert", "Patricia", "Michael", "Jennifer", "William", "Linda", "Richard", "Barbara",
    "Joseph", "Elizabeth", "Thomas", "Susan", "Charles", "Jessica", "Daniel", "Karen", "Matthew",
    "Nancy", "Anthony", "Betty", "Mark", "Helen", "Donald", "Sandra", "Steven", "Donna", "Paul",
    "Carol", "Andrew", "Ruth", "Joshua", "Sharon", "Kenneth", "Michelle", "Kevin", "Laura",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Thomas", "Taylor",
    "Moore", "Jackson", "Martin", "Lee", "Thompson", "White", "Harris", "Clark", "Lewis",
    "Robinson", "Walker", "Young", "Allen", "King", "Wright", "Scott", "Torres", "Nguyen", "Hill",
    "Flores", "Green", "Adams", "Nelson", "Baker",
];

/// Sample catalog: ten movies, five users, fifteen ratings
const DEMO_MOVIES: [(u32, &str, &str, i32); 10] = [
    (1, "The Shawshank Redemption", "Drama", 1994),
    (2, "The Godfather", "Crime", 1972),
    (3, "The Dark Knight", "Action", 2008),
    (4, "Pulp Fiction", "Crime", 1994),
    (5, "Forrest Gump", "Drama", 1994),
    (6, "Inception", "Sci-Fi", 2010),
    (7, "The Matrix", "Sci-Fi", 1999),
    (8, "Goodfellas", "Crime", 1990),
    (9, "Interstellar", "Sci-Fi", 2014),
    (10, "The Prestige", "Mystery", 2006),
];
const DEMO_USERS: [(&str, u32); 5] = [
    ("Alice", 25),
    ("Bob", 30),
    ("Charlie", 28),
    ("Diana", 35),
    ("Eve", 22),
];
/// (index into DEMO_USERS, movie_id, score)
const DEMO_RATINGS: [(usize, u32, f32); 15] = [
    (0, 1, 5.0),
    (0, 3, 4.5),
    (0, 6, 4.8),
    (1, 1, 4.5),
    (1, 2, 5.0),
    (1, 4, 4.7),
    (2, 3, 5.0),
    (2, 6, 4.5),
    (2, 7, 4.8),
    (3, 2, 4.9),
    (3, 4, 4.6),
    (3, 8, 4.8),
    (4, 5, 5.0),
    (4, 1, 4.7),
    (4, 9, 4.5),
];

/// How many synthetic users to make and how much each one rates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationPlan {
    pub users: usize,
    pub min_ratings: usize,
    pub max_ratings: usize,
}

impl Default for GenerationPlan {
    fn default() -> Self {
        Self {
            users: 50,
            min_ratings: 5,
            max_ratings: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub users_created: usize,
    pub ratings_created: usize,
    pub export: ExportReport,
}

impl GenerationReport {
    pub fn ratings_per_user(&self) -> f64 {
        if self.users_created == 0 {
            return 0.0;
        }
        self.ratings_created as f64 / self.users_created as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestUserReport {
    pub principal: Principal,
    pub profile: UserProfile,
    /// False when the user already existed
    pub created: bool,
    pub new_ratings: usize,
    /// `None` when there were no movies to rate, so nothing was synced
    pub export: Option<ExportReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedReport {
    pub movies: usize,
    pub users: usize,
    pub ratings: usize,
    pub export: ExportReport,
}

impl SyncOrchestrator {
    /// Make sure `testuser` exists and has rated the first ten movies
    pub async fn create_test_user(&self) -> Result<TestUserReport> {
        let mut rng = StdRng::from_os_rng();
        self.create_test_user_with(&mut rng).await
    }

    pub async fn create_test_user_with<R: Rng + Send>(&self, rng: &mut R) -> Result<TestUserReport> {
        let (principal, created) = self.principal_or_create(TEST_USERNAME)?;
        let profile = self.profile_or_create(principal.id, TEST_USER_AGE)?;

        let movies: Vec<Movie> = self
            .catalog
            .all_movies()
            .into_iter()
            .take(TEST_USER_MOVIES)
            .collect();
        if movies.is_empty() {
            info!("No movies in the catalog; import movies before rating");
            return Ok(TestUserReport {
                principal,
                profile,
                created,
                new_ratings: 0,
                export: None,
            });
        }

        let mut new_ratings = 0;
        for movie in &movies {
            if self.catalog.rating(principal.id, movie.movie_id).is_some() {
                continue;
            }
            let score = (rng.random_range(3.0f32..=5.0) * 10.0).round() / 10.0;
            self.catalog.upsert_rating(principal.id, movie.movie_id, score)?;
            debug!("Test user rated {}: {}", movie.title, score);
            new_ratings += 1;
        }

        let export = self.sync().await?;
        let profile = self.catalog.profile(principal.id).unwrap_or(profile);
        Ok(TestUserReport {
            principal,
            profile,
            created,
            new_ratings,
            export: Some(export),
        })
    }

    /// Create synthetic users with random ratings
    pub async fn generate_users(&self, plan: GenerationPlan) -> Result<GenerationReport> {
        let mut rng = StdRng::from_os_rng();
        self.generate_users_with(&mut rng, plan).await
    }

    pub async fn generate_users_with<R: Rng + Send>(
        &self,
        rng: &mut R,
        plan: GenerationPlan,
    ) -> Result<GenerationReport> {
        if plan.min_ratings > plan.max_ratings {
            return Err(SyncError::InvalidRequest(format!(
                "min ratings ({}) exceeds max ratings ({})",
                plan.min_ratings, plan.max_ratings
            )));
        }
        let movies = self.catalog.all_movies();
        if movies.is_empty() {
            return Err(SyncError::InvalidRequest(
                "no movies in the catalog; import movies first".to_string(),
            ));
        }
        let scores = WeightedIndex::new(SCORE_WEIGHTS)
            .map_err(|e| SyncError::InvalidRequest(e.to_string()))?;

        info!("Generating {} users over {} movies", plan.users, movies.len());
        let mut ratings_created = 0;
        for i in 0..plan.users {
            let principal = self.create_synthetic_principal(rng)?;
            self.catalog
                .create_profile(principal.id, rng.random_range(18..=65))?;

            let wanted = rng.random_range(plan.min_ratings..=plan.max_ratings);
            for movie in movies.choose_multiple(rng, wanted.min(movies.len())) {
                let score = SCORE_SCALE[scores.sample(rng)];
                self.catalog.upsert_rating(principal.id, movie.movie_id, score)?;
                ratings_created += 1;
            }

            if (i + 1) % 10 == 0 {
                info!("Created {}/{} users", i + 1, plan.users);
            }
        }

        let export = self.sync().await?;
        Ok(GenerationReport {
            users_created: plan.users,
            ratings_created,
            export,
        })
    }

    /// Load the ten-movie sample catalog with its five users and their ratings.
    ///
    /// Safe to run again: existing movies, users and ratings are reused.
    pub async fn seed_demo(&self) -> Result<SeedReport> {
        for (movie_id, title, genre, year) in DEMO_MOVIES {
            self.catalog
                .upsert_movie(Movie::new(movie_id, title, genre, year))?;
        }

        let mut principals: Vec<PrincipalId> = Vec::with_capacity(DEMO_USERS.len());
        for (name, age) in DEMO_USERS {
            let (principal, _) = self.principal_or_create(name)?;
            self.profile_or_create(principal.id, age)?;
            principals.push(principal.id);
        }

        for (user, movie_id, score) in DEMO_RATINGS {
            self.catalog.upsert_rating(principals[user], movie_id, score)?;
        }

        let export = self.sync().await?;
        info!("Seeded demo catalog");
        Ok(SeedReport {
            movies: DEMO_MOVIES.len(),
            users: DEMO_USERS.len(),
            ratings: DEMO_RATINGS.len(),
            export,
        })
    }

    fn principal_or_create(&self, username: &str) -> Result<(Principal, bool)> {
        match self.catalog.principal_by_username(username) {
            Some(principal) => Ok((principal, false)),
            None => Ok((self.catalog.create_principal(username)?, true)),
        }
    }

    fn profile_or_create(&self, principal_id: PrincipalId, age: u32) -> Result<UserProfile> {
        match self.catalog.profile(principal_id) {
            Some(profile) => Ok(profile),
            None => Ok(self.catalog.create_profile(principal_id, age)?),
        }
    }

    fn create_synthetic_principal<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Principal> {
        let (first, last) = match (FIRST_NAMES.choose(rng), LAST_NAMES.choose(rng)) {
            (Some(first), Some(last)) => (*first, *last),
            _ => ("user", "generated"),
        };
        let base = format!(
            "{}{}{}",
            first.to_lowercase(),
            last.to_lowercase(),
            rng.random_range(1..=999)
        );

        let mut username = base.clone();
        loop {
            match self.catalog.create_principal(&username) {
                Ok(principal) => return Ok(principal),
                Err(CatalogError::DuplicateUsername(_)) => {
                    username = format!("{}{}", base, rng.random_range(1000..=9999));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bridge::{AppConfig, GenerationPlan, MovieRecommendation, SyncOrchestrator};
use catalog::Catalog;
use clap::{Parser, Subcommand};
use colored::Colorize;
use engine_client::SubprocessEngine;
use snapshot::{ExportReport, ImportOutcome, SnapshotWorkspace};
use tracing::info;

/// reel-bridge - keeps the movie catalog and the scoring engine in sync
#[derive(Parser)]
#[command(name = "reel-bridge")]
#[command(about = "Sync a movie catalog with an external recommendation engine", long_about = None)]
struct Cli {
    /// Directory holding movies.csv, users.csv and ratings.csv
    #[arg(short, long)]
    snapshot_dir: Option<PathBuf>,

    /// Catalog file
    #[arg(short, long)]
    catalog: Option<PathBuf>,

    /// Engine executable, relative to the snapshot directory
    #[arg(short, long)]
    engine: Option<PathBuf>,

    /// Deadline for recommend calls, in seconds
    #[arg(long)]
    recommend_timeout: Option<u64>,

    /// Deadline for add_rating calls, in seconds
    #[arg(long)]
    add_rating_timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite the snapshot files from the catalog
    Sync,

    /// Load movies.csv from the snapshot directory into the catalog
    ImportMovies,

    /// Check the snapshot files on disk for integrity problems
    Verify,

    /// Get movie recommendations for a user
    Recommend {
        /// Username to get recommendations for
        #[arg(long)]
        user: String,

        /// Number of recommendations to return
        #[arg(long)]
        count: Option<usize>,

        /// Show the engine's reason for each recommendation
        #[arg(long)]
        explain: bool,
    },

    /// Rate a movie
    Rate {
        #[arg(long)]
        user: String,

        #[arg(long)]
        movie: u32,

        /// Score between 1.0 and 5.0
        #[arg(long)]
        score: f32,
    },

    /// Register a user with a profile
    Register {
        #[arg(long)]
        user: String,

        #[arg(long)]
        age: u32,
    },

    /// Show a user's profile and ratings
    User {
        #[arg(long)]
        user: String,
    },

    /// Create `testuser` with ratings for the first ten movies
    CreateTestUser,

    /// Generate users with random ratings
    GenerateUsers {
        /// Number of users to create
        #[arg(long, default_value = "50")]
        users: usize,

        /// Minimum ratings per user
        #[arg(long, default_value = "5")]
        min_ratings: usize,

        /// Maximum ratings per user
        #[arg(long, default_value = "20")]
        max_ratings: usize,
    },

    /// Load the ten-movie sample catalog
    SeedDemo,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    let start = Instant::now();
    let catalog = Arc::new(
        Catalog::load(&config.catalog_path)
            .with_context(|| format!("Failed to load catalog from {}", config.catalog_path.display()))?,
    );
    let (movies, profiles, ratings) = catalog.counts();
    info!(
        "Loaded catalog in {:?}: {} movies, {} profiles, {} ratings",
        start.elapsed(),
        movies,
        profiles,
        ratings
    );

    let workspace = SnapshotWorkspace::open(&config.snapshot_dir)
        .context("Failed to open snapshot directory")?;
    let engine = Arc::new(SubprocessEngine::new(config.gateway_config()));
    let orchestrator = SyncOrchestrator::new(catalog.clone(), workspace, engine);

    // Dispatch to appropriate command handler
    let mutated = match cli.command {
        Commands::Sync => handle_sync(&orchestrator).await?,
        Commands::ImportMovies => handle_import(&orchestrator).await?,
        Commands::Verify => handle_verify(&orchestrator).await?,
        Commands::Recommend {
            user,
            count,
            explain,
        } => {
            let count = count.unwrap_or(config.recommendation_count);
            handle_recommend(&orchestrator, &user, count, explain).await?
        }
        Commands::Rate { user, movie, score } => {
            handle_rate(&orchestrator, &user, movie, score).await?
        }
        Commands::Register { user, age } => handle_register(&orchestrator, &user, age).await?,
        Commands::User { user } => handle_user(&orchestrator, &user)?,
        Commands::CreateTestUser => handle_create_test_user(&orchestrator).await?,
        Commands::GenerateUsers {
            users,
            min_ratings,
            max_ratings,
        } => {
            let plan = GenerationPlan {
                users,
                min_ratings,
                max_ratings,
            };
            handle_generate_users(&orchestrator, plan).await?
        }
        Commands::SeedDemo => handle_seed_demo(&orchestrator).await?,
    };

    if mutated {
        catalog
            .save(&config.catalog_path)
            .with_context(|| format!("Failed to save catalog to {}", config.catalog_path.display()))?;
    }

    Ok(())
}

/// Environment first, then command-line overrides
fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(dir) = &cli.snapshot_dir {
        config.snapshot_dir = dir.clone();
    }
    if let Some(path) = &cli.catalog {
        config.catalog_path = path.clone();
    }
    if let Some(program) = &cli.engine {
        config.engine_program = program.clone();
    }
    if let Some(secs) = cli.recommend_timeout {
        config.recommend_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = cli.add_rating_timeout {
        config.add_rating_timeout = Duration::from_secs(secs);
    }
    Ok(config)
}

/// Handle the 'sync' command
async fn handle_sync(orchestrator: &SyncOrchestrator) -> Result<bool> {
    let report = orchestrator.sync().await.context("Snapshot sync failed")?;
    print_export(&report);
    Ok(false)
}

/// Handle the 'import-movies' command
async fn handle_import(orchestrator: &SyncOrchestrator) -> Result<bool> {
    match orchestrator.import_movies().await.context("Movie import failed")? {
        ImportOutcome::Applied(report) => {
            println!(
                "{} Imported {} movies ({} new, {} updated, {} unchanged)",
                "✓".green(),
                report.total(),
                report.inserted,
                report.updated,
                report.unchanged
            );
            Ok(report.inserted + report.updated > 0)
        }
        ImportOutcome::MissingSource => {
            println!("{} No movies.csv in the snapshot directory", "!".yellow());
            Ok(false)
        }
    }
}

/// Handle the 'verify' command
async fn handle_verify(orchestrator: &SyncOrchestrator) -> Result<bool> {
    let report = orchestrator.verify().await.context("Could not read snapshot")?;
    println!(
        "Snapshot: {} movies, {} users, {} ratings",
        report.movies, report.users, report.ratings
    );
    if report.is_consistent() {
        println!("{} Snapshot is consistent", "✓".green());
    } else {
        println!("{} {} issues found:", "✗".red(), report.issues.len());
        for issue in &report.issues {
            println!("  - {:?}", issue);
        }
    }
    Ok(false)
}

/// Handle the 'recommend' command
async fn handle_recommend(
    orchestrator: &SyncOrchestrator,
    username: &str,
    count: usize,
    explain: bool,
) -> Result<bool> {
    let principal_id = orchestrator.principal_id(username)?;

    let start = Instant::now();
    let recommendations = orchestrator
        .recommend(principal_id, count)
        .await
        .with_context(|| format!("Could not get recommendations for {}", username))?;
    info!("Recommendations took {:?}", start.elapsed());

    print_recommendations(&recommendations, explain);
    Ok(false)
}

/// Handle the 'rate' command
async fn handle_rate(
    orchestrator: &SyncOrchestrator,
    username: &str,
    movie_id: u32,
    score: f32,
) -> Result<bool> {
    let principal_id = orchestrator.principal_id(username)?;
    let recorded = orchestrator
        .record_rating(principal_id, movie_id, score)
        .await
        .with_context(|| format!("Could not record rating of movie {}", movie_id))?;

    let title = orchestrator
        .catalog()
        .movie(movie_id)
        .map(|m| m.title)
        .unwrap_or_else(|| movie_id.to_string());
    println!(
        "{} {} rated {} {:.1} ({:?})",
        "✓".green(),
        username,
        title.bold(),
        recorded.record.score,
        recorded.outcome
    );
    Ok(true)
}

/// Handle the 'register' command
async fn handle_register(orchestrator: &SyncOrchestrator, username: &str, age: u32) -> Result<bool> {
    let registration = orchestrator
        .register_user(username, age)
        .await
        .with_context(|| format!("Could not register {}", username))?;
    println!(
        "{} Registered {} with engine user id {}",
        "✓".green(),
        registration.principal.username.bold(),
        registration.profile.engine_user_id
    );
    Ok(true)
}

/// Handle the 'user' command
fn handle_user(orchestrator: &SyncOrchestrator, username: &str) -> Result<bool> {
    let catalog = orchestrator.catalog();
    let principal_id = orchestrator.principal_id(username)?;

    println!("{}", format!("User: {}", username).bold().blue());
    match catalog.profile(principal_id) {
        Some(profile) => {
            println!("{}Engine user id: {}", "• ".green(), profile.engine_user_id);
            println!("{}Age: {}", "• ".green(), profile.age);
            println!("{}Number of ratings: {}", "• ".cyan(), profile.ratings_count);
            println!("{}Average rating: {:.2}", "• ".cyan(), profile.avg_rating_given);
        }
        None => println!("{}No profile yet", "• ".yellow()),
    }

    let mut ratings = catalog.ratings_by(principal_id);
    ratings.sort_by(|a, b| b.score.total_cmp(&a.score));
    println!("Top rated movies:");
    for rating in ratings.iter().take(5) {
        if let Some(movie) = catalog.movie(rating.movie_id) {
            println!("  - {} ({}) rated {:.1}", movie.title, movie.year, rating.score);
        }
    }
    Ok(false)
}

/// Handle the 'create-test-user' command
async fn handle_create_test_user(orchestrator: &SyncOrchestrator) -> Result<bool> {
    let report = orchestrator
        .create_test_user()
        .await
        .context("Could not create test user")?;

    if report.created {
        println!("{} Created user {}", "✓".green(), report.principal.username.bold());
    } else {
        println!("User {} already exists", report.principal.username);
    }
    println!("Engine user id: {}", report.profile.engine_user_id);
    match report.export {
        Some(export) => {
            println!("{} Added {} ratings", "✓".green(), report.new_ratings);
            print_export(&export);
        }
        None => println!("{} No movies found. Import movies first.", "!".yellow()),
    }
    Ok(true)
}

/// Handle the 'generate-users' command
async fn handle_generate_users(orchestrator: &SyncOrchestrator, plan: GenerationPlan) -> Result<bool> {
    println!("Generating {} users...", plan.users);
    let report = orchestrator
        .generate_users(plan)
        .await
        .context("Could not generate users")?;

    println!("{} Created {} users", "✓".green(), report.users_created);
    println!("{} Generated {} ratings", "✓".green(), report.ratings_created);
    println!(
        "{} Average ratings per user: {:.1}",
        "✓".green(),
        report.ratings_per_user()
    );
    print_export(&report.export);
    Ok(true)
}

/// Handle the 'seed-demo' command
async fn handle_seed_demo(orchestrator: &SyncOrchestrator) -> Result<bool> {
    let report = orchestrator.seed_demo().await.context("Could not seed demo catalog")?;
    println!(
        "{} Seeded {} movies, {} users, {} ratings",
        "✓".green(),
        report.movies,
        report.users,
        report.ratings
    );
    print_export(&report.export);
    Ok(true)
}

fn print_export(report: &ExportReport) {
    println!(
        "{} Snapshot written: {} movies, {} users, {} ratings",
        "✓".green(),
        report.movies,
        report.users.written,
        report.ratings.written
    );
    if !report.users.skipped.is_empty() {
        println!(
            "{} Skipped {} profiles without a name",
            "!".yellow(),
            report.users.skipped.len()
        );
    }
    if report.ratings.omitted() > 0 {
        println!(
            "{} Omitted {} ratings ({} referential gaps, {} bad scores)",
            "!".yellow(),
            report.ratings.omitted(),
            report.ratings.gaps.len(),
            report.ratings.rejected_scores.len()
        );
    }
}

/// Print recommendations in rank order
fn print_recommendations(recommendations: &[MovieRecommendation], explain: bool) {
    if recommendations.is_empty() {
        println!("{}", "No recommendations yet. Rate a few movies first.".yellow());
        return;
    }

    println!("{}", "Movie Recommendations:".bold().blue());
    for (i, rec) in recommendations.iter().enumerate() {
        println!(
            "{}. {} ({}) [{}] - Predicted: {:.2}",
            (i + 1).to_string().green(),
            rec.movie.title,
            rec.movie.year,
            rec.movie.genre,
            rec.predicted_score
        );
        if explain {
            if let Some(reason) = &rec.reason {
                println!("   {}", reason);
            }
        }
    }
}

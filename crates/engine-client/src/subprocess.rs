//! Subprocess transport: one engine process per call.
//!
//! The engine is launched in the snapshot directory with the verb and its
//! arguments, runs to completion, and answers with one JSON document on
//! stdout. Every call has a deadline; a process that outlives it is killed.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use catalog::{format_score, EngineUserId, MovieId};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::error::{EngineError, Result, Verb};
use crate::protocol::{decode_acknowledgement, decode_recommendations, Recommendation};
use crate::RecommendationEngine;

/// What a finished engine process left behind
struct Completed {
    stdout: String,
    stderr: String,
}

/// Gateway that runs the engine executable for each request.
///
/// Callers must hold the snapshot lease for the duration of a call, since the
/// engine reads the flat files in its working directory.
#[derive(Debug, Clone)]
pub struct SubprocessEngine {
    config: GatewayConfig,
}

impl SubprocessEngine {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    async fn run(&self, verb: Verb, args: &[String], deadline: Duration) -> Result<Completed> {
        let program = self.config.resolved_program();
        debug!("Running engine {:?} {} {:?}", program, verb, args);

        let mut command = Command::new(&program);
        command
            .args(&self.config.leading_args)
            .arg(verb.as_str())
            .args(args)
            .current_dir(self.config.absolute_working_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| {
            error!("Failed to launch engine {:?}: {}", program, source);
            EngineError::Launch {
                program: program.clone(),
                source,
            }
        })?;

        let started = Instant::now();
        // Dropping the timed-out future drops the child, which kills it.
        let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| EngineError::Failure {
                verb,
                exit_code: None,
                diagnostic: format!("failed to collect engine output: {}", e),
            })?,
            Err(_) => {
                warn!("Engine {} exceeded {:?}, killed", verb, deadline);
                return Err(EngineError::Timeout { verb, after: deadline });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!("Engine {} finished in {:.2?} with {}", verb, started.elapsed(), output.status);

        if !output.status.success() {
            error!("Engine {} exited with {}: {}", verb, output.status, stderr.trim());
            return Err(EngineError::Failure {
                verb,
                exit_code: output.status.code(),
                diagnostic: stderr,
            });
        }

        if stdout.trim().is_empty() {
            error!("Engine {} exited cleanly but printed nothing", verb);
            return Err(EngineError::EmptyResponse { verb, stderr });
        }

        if !stderr.trim().is_empty() {
            debug!("Engine {} stderr: {}", verb, stderr.trim());
        }

        Ok(Completed { stdout, stderr })
    }
}

#[async_trait]
impl RecommendationEngine for SubprocessEngine {
    async fn recommend(&self, user: EngineUserId, count: usize) -> Result<Vec<Recommendation>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let args = [user.to_string(), count.to_string()];
        let done = self
            .run(Verb::Recommend, &args, self.config.recommend_timeout)
            .await?;
        let recommendations = decode_recommendations(&done.stdout, &done.stderr, count)?;

        info!("Engine returned {} recommendations for user {}", recommendations.len(), user);
        Ok(recommendations)
    }

    async fn add_rating(&self, user: EngineUserId, movie: MovieId, score: f32) -> Result<bool> {
        let args = [user.to_string(), movie.to_string(), format_score(score)];
        let done = self
            .run(Verb::AddRating, &args, self.config.add_rating_timeout)
            .await?;
        let acknowledged = decode_acknowledgement(&done.stdout, &done.stderr)?;

        if acknowledged {
            info!("Engine recorded rating {} for user {} movie {}", score, user, movie);
        }
        Ok(acknowledged)
    }
}

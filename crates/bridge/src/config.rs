//! Environment configuration.
//!
//! | Variable | Default |
//! |---|---|
//! | `REEL_SNAPSHOT_DIR` | `.` |
//! | `REEL_CATALOG_PATH` | `catalog.json` |
//! | `REEL_ENGINE_PROGRAM` | `c_interface` |
//! | `REEL_RECOMMEND_TIMEOUT_SECS` | `30` |
//! | `REEL_ADD_RATING_TIMEOUT_SECS` | `10` |
//! | `REEL_RECOMMENDATION_COUNT` | `10` |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use engine_client::GatewayConfig;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub snapshot_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub engine_program: PathBuf,
    pub recommend_timeout: Duration,
    pub add_rating_timeout: Duration,
    pub recommendation_count: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from("."),
            catalog_path: PathBuf::from("catalog.json"),
            engine_program: PathBuf::from("c_interface"),
            recommend_timeout: engine_client::DEFAULT_RECOMMEND_TIMEOUT,
            add_rating_timeout: engine_client::DEFAULT_ADD_RATING_TIMEOUT,
            recommendation_count: 10,
        }
    }
}

impl AppConfig {
    /// Read the process environment, after loading `.env` if present
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let path = |key: &str, default: PathBuf| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        };

        let recommend_secs: u64 = parse_positive(&lookup, "REEL_RECOMMEND_TIMEOUT_SECS", 30)?;
        let add_rating_secs: u64 = parse_positive(&lookup, "REEL_ADD_RATING_TIMEOUT_SECS", 10)?;

        Ok(Self {
            snapshot_dir: path("REEL_SNAPSHOT_DIR", defaults.snapshot_dir),
            catalog_path: path("REEL_CATALOG_PATH", defaults.catalog_path),
            engine_program: path("REEL_ENGINE_PROGRAM", defaults.engine_program),
            recommend_timeout: Duration::from_secs(recommend_secs),
            add_rating_timeout: Duration::from_secs(add_rating_secs),
            recommendation_count: parse_positive(
                &lookup,
                "REEL_RECOMMENDATION_COUNT",
                defaults.recommendation_count,
            )?,
        })
    }

    /// Gateway settings for the configured engine and snapshot directory
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::new(&self.engine_program, &self.snapshot_dir)
            .with_timeouts(self.recommend_timeout, self.add_rating_timeout)
    }
}

fn parse_positive<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw,
            expected: "a positive integer",
        }),
    }
}

//! Where the engine lives and how long each verb may take.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Ceiling for a `recommend` call
pub const DEFAULT_RECOMMEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Ceiling for an `add_rating` call
pub const DEFAULT_ADD_RATING_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Engine executable; relative paths resolve against `working_dir`
    pub program: PathBuf,
    /// Arguments placed before the verb, for launchers such as interpreters
    pub leading_args: Vec<String>,
    /// Directory holding the snapshot files; the engine runs here
    pub working_dir: PathBuf,
    pub recommend_timeout: Duration,
    pub add_rating_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            working_dir: working_dir.into(),
            recommend_timeout: DEFAULT_RECOMMEND_TIMEOUT,
            add_rating_timeout: DEFAULT_ADD_RATING_TIMEOUT,
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeouts(mut self, recommend: Duration, add_rating: Duration) -> Self {
        self.recommend_timeout = recommend;
        self.add_rating_timeout = add_rating;
        self
    }

    /// The executable that will actually be spawned.
    ///
    /// Relative paths are joined onto the absolute working directory, and the
    /// platform executable suffix is added when the name has no extension.
    pub fn resolved_program(&self) -> PathBuf {
        if self.program.is_absolute() {
            return self.program.clone();
        }
        let mut resolved = self.absolute_working_dir().join(&self.program);
        let suffix = std::env::consts::EXE_SUFFIX;
        if !suffix.is_empty() && resolved.extension().is_none() {
            resolved.set_extension(suffix.trim_start_matches('.'));
        }
        resolved
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// The working directory anchored at the current directory.
    ///
    /// The child runs inside this directory, so a relative program path must
    /// not be resolved against it a second time.
    pub fn absolute_working_dir(&self) -> PathBuf {
        std::path::absolute(&self.working_dir).unwrap_or_else(|_| self.working_dir.clone())
    }
}

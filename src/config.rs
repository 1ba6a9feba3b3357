//! Configuration module for testpulse.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Startup configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reports root {0} does not exist")]
    MissingRoot(PathBuf),
    #[error("reports root {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8000)
    pub http_port: u16,
    /// Directory holding `<category>/reports/*.json` (default: "testcases")
    pub reports_root: PathBuf,
    /// How long a query waits on a refresh before answering from the last snapshot
    pub refresh_timeout: Duration,
    /// Page size when a listing request has no `limit`
    pub default_limit: usize,
    /// Upper bound applied to any requested `limit`
    pub max_limit: usize,
    /// Number of points returned by history when no `limit` is given
    pub history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8000,
            reports_root: PathBuf::from("testcases"),
            refresh_timeout: Duration::from_millis(5000),
            default_limit: 50,
            max_limit: 500,
            history_limit: 10,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TESTPULSE_HTTP_PORT`: HTTP port (default: 8000)
    /// - `TESTPULSE_REPORTS_ROOT`: report tree root (default: "testcases")
    /// - `TESTPULSE_REFRESH_TIMEOUT_MS`: refresh wait bound (default: 5000)
    /// - `TESTPULSE_DEFAULT_LIMIT`: default page size (default: 50)
    /// - `TESTPULSE_MAX_LIMIT`: maximum page size (default: 500)
    /// - `TESTPULSE_HISTORY_LIMIT`: default history length (default: 10)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = lookup("TESTPULSE_HTTP_PORT").and_then(|s| s.parse().ok()) {
            cfg.http_port = port;
        }

        if let Some(root) = lookup("TESTPULSE_REPORTS_ROOT") {
            cfg.reports_root = PathBuf::from(root);
        }

        if let Some(ms) = lookup("TESTPULSE_REFRESH_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
            cfg.refresh_timeout = Duration::from_millis(ms);
        }

        if let Some(n) = lookup("TESTPULSE_DEFAULT_LIMIT").and_then(|s| s.parse().ok()) {
            cfg.default_limit = n;
        }

        if let Some(n) = lookup("TESTPULSE_MAX_LIMIT").and_then(|s| s.parse().ok()) {
            cfg.max_limit = n;
        }

        if let Some(n) = lookup("TESTPULSE_HISTORY_LIMIT").and_then(|s| s.parse().ok()) {
            cfg.history_limit = n;
        }

        cfg
    }

    /// Check that the report tree is usable before serving.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.reports_root.exists() {
            return Err(ConfigError::MissingRoot(self.reports_root.clone()));
        }
        if !self.reports_root.is_dir() {
            return Err(ConfigError::NotADirectory(self.reports_root.clone()));
        }
        if self.max_limit == 0 {
            return Err(ConfigError::Invalid("max limit must be positive".to_string()));
        }
        if self.default_limit > self.max_limit {
            return Err(ConfigError::Invalid(format!(
                "default limit {} exceeds max limit {}",
                self.default_limit, self.max_limit
            )));
        }
        Ok(())
    }
}

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::matching::types::Thresholds;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ReuniteConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub matching: MatchingConfig,
    pub scheduler: SchedulerConfig,
    pub notify: NotifyConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

/// Scan thresholds and work-list caps for a single pass.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum best-pair cosine similarity for a candidate.
    pub min_similarity: f64,
    /// Maximum great-circle distance in miles. `inf` disables the filter.
    pub max_distance_miles: f64,
    /// Cap on counterpart records loaded per pass.
    pub pool_size: usize,
    /// Cap on unresolved subjects scanned per pass.
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub run_on_start: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotifyConfig {
    pub provider: String,
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReportConfig {
    pub provider: String,
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_reunite_dir()
            .join("reunite.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.85,
            max_distance_miles: 50.0,
            pool_size: 1000,
            batch_size: 50,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            run_on_start: true,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            provider: "log".into(),
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            provider: "log".into(),
            endpoint: None,
            timeout_secs: 30,
        }
    }
}

impl MatchingConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_similarity: self.min_similarity,
            max_distance_miles: self.max_distance_miles,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Returns `~/.reunite/`
pub fn default_reunite_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".reunite")
}

/// Returns the default config file path: `~/.reunite/config.toml`
pub fn default_config_path() -> PathBuf {
    default_reunite_dir().join("config.toml")
}

impl ReuniteConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, apply env var overrides, then validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            ReuniteConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (REUNITE_DB, REUNITE_LOG_LEVEL,
    /// REUNITE_NOTIFY_URL, REUNITE_REPORT_URL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("REUNITE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("REUNITE_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("REUNITE_NOTIFY_URL") {
            self.notify.provider = "webhook".into();
            self.notify.webhook_url = Some(val);
        }
        if let Ok(val) = std::env::var("REUNITE_REPORT_URL") {
            self.report.provider = "webhook".into();
            self.report.endpoint = Some(val);
        }
    }

    /// Reject values that would make a pass meaningless.
    pub fn validate(&self) -> Result<()> {
        let m = &self.matching;
        ensure!(
            (-1.0..=1.0).contains(&m.min_similarity),
            "matching.min_similarity must be within [-1, 1], got {}",
            m.min_similarity
        );
        ensure!(
            m.max_distance_miles >= 0.0,
            "matching.max_distance_miles must be non-negative, got {}",
            m.max_distance_miles
        );
        ensure!(m.pool_size > 0, "matching.pool_size must be non-zero");
        ensure!(m.batch_size > 0, "matching.batch_size must be non-zero");
        ensure!(
            self.scheduler.interval_secs > 0,
            "scheduler.interval_secs must be non-zero"
        );
        ensure!(
            self.notify.timeout_secs > 0,
            "notify.timeout_secs must be non-zero"
        );
        ensure!(
            self.report.timeout_secs > 0,
            "report.timeout_secs must be non-zero"
        );
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::FailedPolicy;
use crate::retry::RetryPolicy;

/// Retry policy parameters for transport-level network calls (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per transfer (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// libcurl tuning shared by every HTTP adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    /// Whole-transfer timeout; large archives need a generous value.
    pub timeout_secs: u64,
    /// Optional receive cap in bytes per second.
    #[serde(default)]
    pub max_recv_speed: Option<u64>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            timeout_secs: 3600,
            max_recv_speed: None,
        }
    }
}

/// Credentials and endpoint for the asynchronous job API.
#[derive(Clone, Serialize, Deserialize)]
pub struct JobApiConfig {
    pub url: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

// The API key never reaches the logs.
impl std::fmt::Debug for JobApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobApiConfig")
            .field("url", &self.url)
            .field("uid", &self.uid)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Global configuration loaded from `~/.config/datafetch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatafetchConfig {
    /// Record database location; defaults to the XDG state dir.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Extension appended to the destination while a transfer is in flight.
    pub temp_extension: String,
    /// Fixed delay between two polls of a queued job.
    pub poll_interval_secs: u64,
    /// Hard cap on polls per `fetch` when waiting for completion.
    pub max_poll_tries: u32,
    /// What a `failed` record does on the next fetch.
    #[serde(default)]
    pub failed_policy: FailedPolicy,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub job_api: Option<JobApiConfig>,
}

impl Default for DatafetchConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            temp_extension: "tmp".to_string(),
            poll_interval_secs: 10,
            max_poll_tries: 60,
            failed_policy: FailedPolicy::default(),
            retry: None,
            http: HttpConfig::default(),
            job_api: None,
        }
    }
}

impl DatafetchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(RetryConfig::to_policy)
            .unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("datafetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DatafetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DatafetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: DatafetchConfig =
        toml::from_str(&data).with_context(|| format!("invalid config: {}", path.display()))?;
    Ok(cfg)
}

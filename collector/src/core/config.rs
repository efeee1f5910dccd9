use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::types::{Consistency, Destination, Precision};
use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_BATCH_SIZE, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_DATABASE, DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_INFLUX_URL, DEFAULT_RETENTION_POLICY,
    DEFAULT_WRITE_BASE_DELAY_MS, DEFAULT_WRITE_MAX_ATTEMPTS, STORE_REQUEST_TIMEOUT_SECS,
};

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// Metrics store connection section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct StoreFileConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Write destination section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DestinationFileConfig {
    pub database: Option<String>,
    pub retention_policy: Option<String>,
    pub precision: Option<Precision>,
    pub consistency: Option<Consistency>,
}

/// Dispatch loop section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PipelineFileConfig {
    pub channel_capacity: Option<usize>,
    pub batch_size: Option<usize>,
    pub flush_interval_ms: Option<u64>,
    pub write_max_attempts: Option<u32>,
    pub write_base_delay_ms: Option<u64>,
    pub use_event_time: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub store: Option<StoreFileConfig>,
    pub destination: Option<DestinationFileConfig>,
    pub pipeline: Option<PipelineFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(store) = other.store {
            let current = self.store.get_or_insert_with(StoreFileConfig::default);
            if store.url.is_some() {
                tracing::trace!(url = ?store.url, "Merging store.url");
                current.url = store.url;
            }
            if store.username.is_some() {
                current.username = store.username;
            }
            if store.password.is_some() {
                current.password = store.password;
            }
            if store.timeout_secs.is_some() {
                current.timeout_secs = store.timeout_secs;
            }
        }

        if let Some(dest) = other.destination {
            let current = self
                .destination
                .get_or_insert_with(DestinationFileConfig::default);
            if dest.database.is_some() {
                tracing::trace!(database = ?dest.database, "Merging destination.database");
                current.database = dest.database;
            }
            if dest.retention_policy.is_some() {
                current.retention_policy = dest.retention_policy;
            }
            if dest.precision.is_some() {
                current.precision = dest.precision;
            }
            if dest.consistency.is_some() {
                current.consistency = dest.consistency;
            }
        }

        if let Some(pipeline) = other.pipeline {
            let current = self
                .pipeline
                .get_or_insert_with(PipelineFileConfig::default);
            if pipeline.channel_capacity.is_some() {
                tracing::trace!(
                    channel_capacity = ?pipeline.channel_capacity,
                    "Merging pipeline.channel_capacity"
                );
                current.channel_capacity = pipeline.channel_capacity;
            }
            if pipeline.batch_size.is_some() {
                current.batch_size = pipeline.batch_size;
            }
            if pipeline.flush_interval_ms.is_some() {
                current.flush_interval_ms = pipeline.flush_interval_ms;
            }
            if pipeline.write_max_attempts.is_some() {
                current.write_max_attempts = pipeline.write_max_attempts;
            }
            if pipeline.write_base_delay_ms.is_some() {
                current.write_base_delay_ms = pipeline.write_base_delay_ms;
            }
            if pipeline.use_event_time.is_some() {
                current.use_event_time = pipeline.use_event_time;
            }
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// Metrics store connection
#[derive(Clone)]
pub struct StoreConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Dispatch loop tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Capacity of the notification and error channels
    pub channel_capacity: usize,
    /// Points per write; 1 means one write per notification
    pub batch_size: usize,
    /// Flush interval for a partially filled batch
    pub flush_interval_ms: u64,
    pub write_max_attempts: u32,
    pub write_base_delay_ms: u64,
    /// Timestamp points with the bus transition time when available
    pub use_event_time: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            write_max_attempts: DEFAULT_WRITE_MAX_ATTEMPTS,
            write_base_delay_ms: DEFAULT_WRITE_BASE_DELAY_MS,
            use_event_time: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub destination: Destination,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.statewatch/statewatch.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading collector configuration");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::resolve(cli, file_config);
        config.validate()?;
        tracing::debug!(config = ?config, "Configuration resolved");
        Ok(config)
    }

    /// Layer configs: defaults -> file config -> CLI/env overrides
    fn resolve(cli: &CliConfig, file_config: FileConfig) -> Self {
        let file_store = file_config.store.unwrap_or_default();
        let file_dest = file_config.destination.unwrap_or_default();
        let file_pipeline = file_config.pipeline.unwrap_or_default();
        let pipeline_defaults = PipelineConfig::default();

        let store = StoreConfig {
            url: cli
                .influx_url
                .clone()
                .or(file_store.url)
                .unwrap_or_else(|| DEFAULT_INFLUX_URL.to_string()),
            username: cli
                .influx_username
                .clone()
                .or(file_store.username)
                .filter(|u| !u.is_empty()),
            password: cli
                .influx_password
                .clone()
                .or(file_store.password)
                .filter(|p| !p.is_empty()),
            timeout_secs: file_store
                .timeout_secs
                .unwrap_or(STORE_REQUEST_TIMEOUT_SECS),
        };

        let destination = Destination {
            database: cli
                .database
                .clone()
                .or(file_dest.database)
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            retention_policy: cli
                .retention_policy
                .clone()
                .or(file_dest.retention_policy)
                .unwrap_or_else(|| DEFAULT_RETENTION_POLICY.to_string()),
            precision: cli.precision.or(file_dest.precision).unwrap_or_default(),
            consistency: cli
                .consistency
                .or(file_dest.consistency)
                .unwrap_or_default(),
        };

        let pipeline = PipelineConfig {
            channel_capacity: cli
                .channel_capacity
                .or(file_pipeline.channel_capacity)
                .unwrap_or(pipeline_defaults.channel_capacity),
            batch_size: cli
                .batch_size
                .or(file_pipeline.batch_size)
                .unwrap_or(pipeline_defaults.batch_size),
            flush_interval_ms: cli
                .flush_interval_ms
                .or(file_pipeline.flush_interval_ms)
                .unwrap_or(pipeline_defaults.flush_interval_ms),
            write_max_attempts: cli
                .write_max_attempts
                .or(file_pipeline.write_max_attempts)
                .unwrap_or(pipeline_defaults.write_max_attempts),
            write_base_delay_ms: cli
                .write_base_delay_ms
                .or(file_pipeline.write_base_delay_ms)
                .unwrap_or(pipeline_defaults.write_base_delay_ms),
            use_event_time: cli
                .use_event_time
                .or(file_pipeline.use_event_time)
                .unwrap_or(pipeline_defaults.use_event_time),
        };

        Self {
            store,
            destination,
            pipeline,
        }
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.store.url.trim().is_empty() {
            anyhow::bail!("Configuration error: store.url must not be empty");
        }
        if !(self.store.url.starts_with("http://") || self.store.url.starts_with("https://")) {
            anyhow::bail!(
                "Configuration error: store.url must start with http:// or https:// (got '{}')",
                self.store.url
            );
        }
        if self.store.timeout_secs == 0 {
            anyhow::bail!("Configuration error: store.timeout_secs must be greater than 0");
        }
        if self.store.password.is_some() && self.store.username.is_none() {
            tracing::warn!("store.password is set without store.username, credentials ignored");
        }

        if self.destination.database.trim().is_empty() {
            anyhow::bail!("Configuration error: destination.database must not be empty");
        }

        if self.pipeline.channel_capacity == 0 {
            anyhow::bail!("Configuration error: pipeline.channel_capacity must be greater than 0");
        }
        if self.pipeline.batch_size == 0 {
            anyhow::bail!("Configuration error: pipeline.batch_size must be greater than 0");
        }
        if self.pipeline.batch_size > 1 && self.pipeline.flush_interval_ms == 0 {
            anyhow::bail!(
                "Configuration error: pipeline.flush_interval_ms must be greater than 0 when batch_size > 1"
            );
        }
        if self.pipeline.write_max_attempts == 0 {
            anyhow::bail!(
                "Configuration error: pipeline.write_max_attempts must be greater than 0"
            );
        }

        Ok(())
    }
}

/// Get the profile config path (~/.statewatch/statewatch.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

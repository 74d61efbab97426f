// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{
    DEFAULT_LOG_INTERVAL, END_OF_STREAM_THRESHOLD, MAX_EFFORT, MAX_PARTITIONS, MAX_RETRIES,
    Quality, SchedulerLimits, SettingsError, UNSET_OVERRIDE, WAIT_TIMEOUT_TICKS, parse_override,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub host: HostConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Quality tier: fast, balanced or high
    #[serde(default = "default_quality")]
    pub quality: String,

    /// Encoder threads (0 = auto)
    #[serde(default)]
    pub jobs: u32,

    /// Partition-count override (-1 = use quality preset)
    #[serde(default = "default_override")]
    pub partitions: i64,

    /// Compression-effort override (-1 = use quality preset)
    #[serde(default = "default_override")]
    pub uber: i64,

    /// Extension used when no output path is given
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Ticks to wait on one decode request before reissuing it
    #[serde(default = "default_wait_timeout_ticks")]
    pub wait_timeout_ticks: u32,

    /// Reissues allowed per frame before the job is ended
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// A stall past this fraction of the reported frame count counts as a
    /// normal end rather than a decode failure
    #[serde(default = "default_end_of_stream_threshold")]
    pub end_of_stream_threshold: f64,

    /// Frames between progress log lines
    #[serde(default = "default_progress_log_interval")]
    pub progress_log_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Wall-clock length of one session tick
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_quality() -> String {
    Quality::default().label().to_string()
}

fn default_override() -> i64 {
    UNSET_OVERRIDE
}

fn default_output_extension() -> String {
    "mov".to_string()
}

fn default_wait_timeout_ticks() -> u32 {
    WAIT_TIMEOUT_TICKS
}

fn default_max_retries() -> u32 {
    MAX_RETRIES
}

fn default_end_of_stream_threshold() -> f64 {
    END_OF_STREAM_THRESHOLD
}

fn default_progress_log_interval() -> u64 {
    DEFAULT_LOG_INTERVAL
}

fn default_tick_interval_ms() -> u64 {
    16
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            jobs: 0,
            partitions: default_override(),
            uber: default_override(),
            output_extension: default_output_extension(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ticks: default_wait_timeout_ticks(),
            max_retries: default_max_retries(),
            end_of_stream_threshold: default_end_of_stream_threshold(),
            progress_log_interval: default_progress_log_interval(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl DefaultsConfig {
    pub fn quality(&self) -> Result<Quality, SettingsError> {
        self.quality.parse()
    }

    pub fn partitions_override(&self) -> Result<Option<u32>, SettingsError> {
        parse_override("partitions", self.partitions, MAX_PARTITIONS)
    }

    pub fn uber_override(&self) -> Result<Option<u32>, SettingsError> {
        parse_override("uber", self.uber, MAX_EFFORT)
    }
}

impl SchedulerConfig {
    pub fn limits(&self) -> SchedulerLimits {
        SchedulerLimits {
            wait_timeout_ticks: self.wait_timeout_ticks.max(1),
            max_retries: self.max_retries,
            end_of_stream_threshold: self.end_of_stream_threshold.clamp(0.0, 1.0),
            progress_log_interval: self.progress_log_interval,
        }
    }
}

impl HostConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("blockpress")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("blockpress")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();

            // Try to save the default config, but don't fail if we can't
            // (e.g., if the directory isn't writable)
            if let Err(e) = config.save_to(&config_path) {
                tracing::warn!(
                    path = %config_path.display(),
                    error = %format!("{e:#}"),
                    "could not create default config file, using built-in defaults"
                );
            }

            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::config_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Create a default config file if it doesn't exist
    pub fn ensure_default() -> Result<()> {
        if !Self::exists() {
            Config::default().save()?;
        }
        Ok(())
    }
}

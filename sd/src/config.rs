//! SlotDispatch configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DispatchError;

/// Main SlotDispatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Loop timing and failure handling
    pub dispatch: DispatchConfig,

    /// External programs used to reach the hosts
    pub remote: RemoteConfig,

    /// File the configuration was read from; `None` means defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,

    /// Fallback candidates that existed but failed to load
    ///
    /// Loading happens before logging is set up, so these are kept for the
    /// caller to report.
    #[serde(skip)]
    pub skipped: Vec<String>,
}

impl Config {
    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.dispatch.reload_every == 0 {
            return Err(DispatchError::config("reload-every must be at least 1"));
        }
        if self.remote.status_program.trim().is_empty() {
            return Err(DispatchError::config("status-program must not be empty"));
        }
        if self.remote.launch_program.trim().is_empty() {
            return Err(DispatchError::config("launch-program must not be empty"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// Logs nothing; see [`Config::source`] and [`Config::skipped`].
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local .slotdispatch.yml, then ~/.config/slotdispatch/slotdispatch.yml
        let mut candidates = vec![PathBuf::from(".slotdispatch.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("slotdispatch").join("slotdispatch.yml"));
        }

        Ok(Self::load_first(&candidates))
    }

    /// First candidate that exists and loads; defaults when none does
    fn load_first(candidates: &[PathBuf]) -> Self {
        let mut skipped = Vec::new();

        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(mut config) => {
                    config.skipped = skipped;
                    return config;
                }
                Err(e) => skipped.push(format!("Failed to load config from {}: {}", path.display(), e)),
            }
        }

        Self {
            skipped,
            ..Self::default()
        }
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .map_err(|e| DispatchError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: Self = serde_yaml::from_str(&content)
            .map_err(|e| DispatchError::config(format!("Failed to parse config file: {}", e)))?;

        config.source = Some(path.as_ref().to_path_buf());
        Ok(config)
    }
}

/// Loop timing and failure handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Seconds to wait between ticks
    #[serde(rename = "tick-interval-secs")]
    pub tick_interval_secs: u64,

    /// Reload the command file every N ticks, starting at tick 0
    #[serde(rename = "reload-every")]
    pub reload_every: u64,

    /// Put a command back on the queue when its launch fails
    #[serde(rename = "requeue-on-launch-failure")]
    pub requeue_on_launch_failure: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            reload_every: 5,
            requeue_on_launch_failure: true,
        }
    }
}

impl DispatchConfig {
    /// Get the tick interval as a Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Whether the command file is read on this tick
    pub fn is_reload_tick(&self, tick: u64) -> bool {
        self.reload_every > 0 && tick % self.reload_every == 0
    }
}

/// External programs used to reach the hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Program queried for a host's running tasks; the host is appended
    #[serde(rename = "status-program")]
    pub status_program: String,

    /// Arguments placed before the host
    #[serde(rename = "status-args")]
    pub status_args: Vec<String>,

    /// Program used to start commands on a host
    #[serde(rename = "launch-program")]
    pub launch_program: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            status_program: "wrexp".to_string(),
            status_args: vec!["ps".to_string()],
            launch_program: "ssh".to_string(),
        }
    }
}

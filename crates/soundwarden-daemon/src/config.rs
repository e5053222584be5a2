//! Daemon configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use soundwarden_core::{EngineConfig, VolumeDefaults};
use soundwarden_pipewire::BackendConfig;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Database path (optional, uses default if not set)
    pub path: Option<PathBuf>,
}

/// How to reach the audio server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSection {
    /// `pactl` binary
    #[serde(default = "default_pactl")]
    pub pactl: String,
    #[serde(default = "default_resubscribe_delay_ms")]
    pub resubscribe_delay_ms: u64,
    #[serde(default = "default_watchdog_retry_ms")]
    pub watchdog_retry_ms: u64,
    /// Kill a `pactl` call running longer than this
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            pactl: default_pactl(),
            resubscribe_delay_ms: default_resubscribe_delay_ms(),
            watchdog_retry_ms: default_watchdog_retry_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

fn default_pactl() -> String {
    "pactl".to_string()
}

fn default_resubscribe_delay_ms() -> u64 {
    1000
}

fn default_watchdog_retry_ms() -> u64 {
    2000
}

fn default_command_timeout_ms() -> u64 {
    5000
}

/// Default levels for new ports and for reset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolumeConfig {
    #[serde(default = "default_output")]
    pub output: f64,
    #[serde(default = "default_headphone_output")]
    pub headphone_output: f64,
    #[serde(default = "default_input")]
    pub input: f64,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self { output: default_output(), headphone_output: default_headphone_output(), input: default_input() }
    }
}

fn default_output() -> f64 {
    0.5
}

fn default_headphone_output() -> f64 {
    0.17
}

fn default_input() -> f64 {
    0.1
}

/// Port selection policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Switch to the highest priority port automatically
    #[serde(default = "default_true")]
    pub auto_switch: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { auto_switch: true }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    #[must_use]
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            auto_switch: self.policy.auto_switch,
            volume: VolumeDefaults {
                output: self.volume.output,
                headphone_output: self.volume.headphone_output,
                input: self.volume.input,
            },
        }
    }

    #[must_use]
    pub fn backend(&self) -> BackendConfig {
        BackendConfig {
            pactl: self.backend.pactl.clone(),
            resubscribe_delay: Duration::from_millis(self.backend.resubscribe_delay_ms),
            watchdog_retry: Duration::from_millis(self.backend.watchdog_retry_ms),
            command_timeout: Duration::from_millis(self.backend.command_timeout_ms),
        }
    }
}

/// Load configuration from the default file or defaults.
pub fn load_config() -> Result<Config> {
    load_from(&config_path()?)
}

/// Load configuration from `path`; a missing file means defaults.
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Get the configuration file path.
fn config_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("org", "soundwarden", "SoundWarden").context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

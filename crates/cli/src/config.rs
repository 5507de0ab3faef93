//! Configuration for the hare-gate host process.
//!
//! Config priority: explicit `--config` path > project (./hare-gate.toml) >
//! user (~/.config/hare-gate/config.toml) > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gate::GateConfig;
use serde::{Deserialize, Serialize};

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log file rotation options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
  #[default]
  Daily,
  Hourly,
  Never,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Log level: off, error, warn, info, debug, trace (RUST_LOG overrides)
  pub level: String,

  /// Write logs to this file instead of the console
  #[serde(skip_serializing_if = "Option::is_none")]
  pub file: Option<PathBuf>,

  /// Rotation for file logging
  pub rotation: LogRotation,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: None,
      rotation: LogRotation::Daily,
    }
  }
}

// ============================================================================
// Simulation Configuration
// ============================================================================

/// How the simulated downstream service phrases its `Retry-After` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HintStyle {
  /// Delta seconds, e.g. `3`
  #[default]
  Seconds,
  /// HTTP-date, e.g. `Wed, 21 Oct 2037 07:28:00 GMT`
  Date,
  /// RFC 3339 timestamp
  Timestamp,
  /// No header at all; rejections go back to the consumer
  None,
}

/// Simulated queue and downstream service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
  /// Number of concurrent queue consumers
  pub workers: usize,

  /// Number of work items to enqueue
  pub requests: usize,

  /// Calls the downstream service accepts per period
  pub burst: usize,

  /// Length of the downstream service's quota period in milliseconds
  pub period_ms: u64,

  /// Simulated latency of one downstream call in milliseconds
  pub latency_ms: u64,

  /// Retry-After format used in rejections
  pub hint_style: HintStyle,

  /// Every Nth accepted call fails with a 503 (0 disables)
  pub failure_every: usize,
}

impl Default for SimulationConfig {
  fn default() -> Self {
    Self {
      workers: 4,
      requests: 20,
      burst: 5,
      period_ms: 2_000,
      latency_ms: 50,
      hint_style: HintStyle::Seconds,
      failure_every: 0,
    }
  }
}

// ============================================================================
// Top-level Configuration
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub gate: GateConfig,
  pub log: LogConfig,
  pub simulation: SimulationConfig,
}

impl Config {
  /// Load configuration.
  ///
  /// An explicit path must exist and parse. Without one, the project and user
  /// config files are tried in order and anything unreadable is skipped.
  pub fn load(path: Option<&Path>) -> Result<Self> {
    if let Some(path) = path {
      return Self::load_file(path);
    }

    let project_config = Self::project_config_path();
    if project_config.exists()
      && let Ok(config) = Self::load_file(&project_config)
    {
      return Ok(config);
    }

    if let Some(user_config) = Self::user_config_path()
      && user_config.exists()
      && let Ok(config) = Self::load_file(&user_config)
    {
      return Ok(config);
    }

    Ok(Self::default())
  }

  fn load_file(path: &Path) -> Result<Self> {
    let content =
      std::fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
  }

  pub fn project_config_path() -> PathBuf {
    PathBuf::from("hare-gate.toml")
  }

  pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hare-gate").join("config.toml"))
  }

  /// Default configuration rendered as TOML
  pub fn generate_template() -> Result<String> {
    Ok(toml::to_string_pretty(&Self::default())?)
  }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Gate configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
  /// Maximum time from the start of an `execute` call until it is admitted,
  /// across all of its retries. Only checked while the caller is waiting.
  /// Unset means wait as long as the downstream service asks.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_wait_ms: Option<u64>,
}

impl GateConfig {
  /// Set the maximum admission wait
  pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
    self.max_wait_ms = Some(max_wait.as_millis().try_into().unwrap_or(u64::MAX));
    self
  }

  pub fn max_wait(&self) -> Option<Duration> {
    self.max_wait_ms.map(Duration::from_millis)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_is_unbounded() {
    assert_eq!(GateConfig::default().max_wait(), None);
  }

  #[test]
  fn test_parse_from_toml() {
    let config: GateConfig = toml::from_str("max_wait_ms = 90000").unwrap();
    assert_eq!(config.max_wait(), Some(Duration::from_secs(90)));
  }

  #[test]
  fn test_empty_toml_uses_defaults() {
    let config: GateConfig = toml::from_str("").unwrap();
    assert_eq!(config, GateConfig::default());
  }
}

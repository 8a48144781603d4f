//! Configuration types for the execution engine
//!
//! Supports a layered setup where every field has a sensible default: an
//! empty config file (or `ExecutorConfig::default()`) yields a working
//! engine, and deployments override only what they need. Scoring thresholds
//! are configuration rather than constants because the stock values are
//! tuning numbers, not derived quantities.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core_types::{ResourceLimits, SecurityLevel};
use crate::errors::ExecutorError;

/// Which isolation backend the orchestrator should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Docker when the daemon answers, local process otherwise.
    #[default]
    Auto,
    Docker,
    #[serde(rename = "local")]
    LocalProcess,
}

/// Thresholds and normalization bounds for the performance profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Wall-clock normalization bound for the time sub-score, seconds.
    #[serde(default = "default_time_norm_s")]
    pub time_norm_s: f64,
    /// Memory normalization bound for the memory sub-score, megabytes.
    #[serde(default = "default_memory_norm_mb")]
    pub memory_norm_mb: f64,
    #[serde(default = "default_fast_threshold_s")]
    pub fast_threshold_s: f64,
    #[serde(default = "default_slow_threshold_s")]
    pub slow_threshold_s: f64,
    #[serde(default = "default_light_memory_mb")]
    pub light_memory_mb: f64,
    #[serde(default = "default_heavy_memory_mb")]
    pub heavy_memory_mb: f64,
}

fn default_time_norm_s() -> f64 {
    30.0
}

fn default_memory_norm_mb() -> f64 {
    256.0
}

fn default_fast_threshold_s() -> f64 {
    1.0
}

fn default_slow_threshold_s() -> f64 {
    10.0
}

fn default_light_memory_mb() -> f64 {
    50.0
}

fn default_heavy_memory_mb() -> f64 {
    200.0
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            time_norm_s: default_time_norm_s(),
            memory_norm_mb: default_memory_norm_mb(),
            fast_threshold_s: default_fast_threshold_s(),
            slow_threshold_s: default_slow_threshold_s(),
            light_memory_mb: default_light_memory_mb(),
            heavy_memory_mb: default_heavy_memory_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_security_level")]
    pub security_level: SecurityLevel,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub default_limits: ResourceLimits,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

fn default_security_level() -> SecurityLevel {
    SecurityLevel::Medium
}

fn default_history_capacity() -> usize {
    1000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            security_level: default_security_level(),
            backend: BackendKind::default(),
            default_limits: ResourceLimits::default(),
            history_capacity: default_history_capacity(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ExecutorError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExecutorError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ExecutorError> {
        let config: ExecutorConfig = serde_yaml::from_str(content)
            .map_err(|e| ExecutorError::ConfigError(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExecutorError> {
        self.default_limits.validate()?;
        if self.history_capacity == 0 {
            return Err(ExecutorError::ConfigError(
                "history_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_yields_defaults() {
        let config = ExecutorConfig::from_yaml("{}").unwrap();
        assert_eq!(config.security_level, SecurityLevel::Medium);
        assert_eq!(config.backend, BackendKind::Auto);
        assert_eq!(config.history_capacity, 1000);
        assert_eq!(config.scoring.time_norm_s, 30.0);
        assert_eq!(config.scoring.memory_norm_mb, 256.0);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let yaml = r#"
security_level: maximum
backend: local
default_limits:
  max_memory_mb: 128
  max_cpu_percent: 25
  max_execution_time_s: 5
  max_disk_mb: 10
  max_processes: 4
  max_file_descriptors: 16
"#;
        let config = ExecutorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.security_level, SecurityLevel::Maximum);
        assert_eq!(config.backend, BackendKind::LocalProcess);
        assert_eq!(config.default_limits.max_memory_mb, 128);
        assert_eq!(config.history_capacity, 1000);
    }

    #[test]
    fn invalid_limits_fail_validation() {
        let yaml = r#"
default_limits:
  max_memory_mb: 0
  max_cpu_percent: 25
  max_execution_time_s: 5
  max_disk_mb: 10
  max_processes: 4
  max_file_descriptors: 16
"#;
        assert!(ExecutorConfig::from_yaml(yaml).is_err());
    }
}

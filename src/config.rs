/*!
 * Configuration types for Bulwark
 */

use bulwark_core_resilience::{CircuitBreakerConfig, ConfigError, RetryConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BulwarkError, Result};

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulwarkConfig {
    /// Diagnostic output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Default retry policy for every resource
    #[serde(default)]
    pub retry: RetrySettings,

    /// Protected resources
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level for diagnostic output
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stdout). Written as JSON lines.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Retry policy as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub jitter_floor_ms: u64,
    pub retryable: Vec<String>,
    pub non_retryable: Vec<String>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            backoff_factor: defaults.backoff_factor,
            jitter: defaults.jitter,
            jitter_floor_ms: defaults.jitter_floor.as_millis() as u64,
            retryable: defaults.retryable.into_iter().collect(),
            non_retryable: defaults.non_retryable.into_iter().collect(),
        }
    }
}

impl RetrySettings {
    /// Apply a per-resource override; fields it leaves out keep their value
    pub fn merged(&self, over: &RetryOverride) -> RetrySettings {
        RetrySettings {
            max_attempts: over.max_attempts.unwrap_or(self.max_attempts),
            base_delay_ms: over.base_delay_ms.unwrap_or(self.base_delay_ms),
            max_delay_ms: over.max_delay_ms.unwrap_or(self.max_delay_ms),
            backoff_factor: over.backoff_factor.unwrap_or(self.backoff_factor),
            jitter: over.jitter.unwrap_or(self.jitter),
            jitter_floor_ms: over.jitter_floor_ms.unwrap_or(self.jitter_floor_ms),
            retryable: over
                .retryable
                .clone()
                .unwrap_or_else(|| self.retryable.clone()),
            non_retryable: over
                .non_retryable
                .clone()
                .unwrap_or_else(|| self.non_retryable.clone()),
        }
    }

    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            jitter: self.jitter,
            jitter_floor: Duration::from_millis(self.jitter_floor_ms),
            retryable: self.retryable.iter().cloned().collect(),
            non_retryable: self.non_retryable.iter().cloned().collect(),
        }
    }
}

/// Partial retry policy for a single resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryOverride {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub jitter: Option<bool>,
    pub jitter_floor_ms: Option<u64>,
    pub retryable: Option<Vec<String>>,
    pub non_retryable: Option<Vec<String>>,
}

/// Circuit breaker settings for a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub half_open_required_successes: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            recovery_timeout_ms: defaults.recovery_timeout.as_millis() as u64,
            half_open_required_successes: defaults.half_open_required_successes,
        }
    }
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        CircuitBreakerConfig {
            failure_threshold: settings.failure_threshold,
            recovery_timeout: Duration::from_millis(settings.recovery_timeout_ms),
            half_open_required_successes: settings.half_open_required_successes,
        }
    }
}

/// Bulkhead settings for a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BulkheadSettings {
    pub max_concurrent_operations: usize,
}

impl Default for BulkheadSettings {
    fn default() -> Self {
        Self {
            max_concurrent_operations: 10,
        }
    }
}

/// One protected resource.
///
/// A missing `circuit_breaker` or `bulkhead` table disables that gate for the
/// resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    pub name: String,

    #[serde(default)]
    pub circuit_breaker: Option<BreakerSettings>,

    #[serde(default)]
    pub bulkhead: Option<BulkheadSettings>,

    /// Overrides applied on top of the top-level `[retry]` table
    #[serde(default)]
    pub retry: Option<RetryOverride>,
}

impl BulwarkConfig {
    /// Load, parse and validate a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| BulwarkError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BulwarkConfig =
            toml::from_str(&contents).map_err(|source| BulwarkError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Effective retry policy for a resource: the global table plus its override
    pub fn retry_for(&self, resource: &ResourceConfig) -> RetrySettings {
        match &resource.retry {
            Some(over) => self.retry.merged(over),
            None => self.retry.clone(),
        }
    }

    /// Check every section and report all problems at once
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        for e in self.retry.to_retry_config().problems() {
            problems.push(describe("retry", &e));
        }

        let mut seen = BTreeSet::new();
        for (index, resource) in self.resources.iter().enumerate() {
            let label = if resource.name.is_empty() {
                format!("resources[{}]", index)
            } else {
                format!("resources.{}", resource.name)
            };

            if resource.name.trim().is_empty() {
                problems.push(format!("{}.name: must not be empty", label));
            } else if !seen.insert(resource.name.as_str()) {
                problems.push(format!("{}: duplicate resource name", label));
            }

            if let Some(breaker) = &resource.circuit_breaker {
                let section = format!("{}.circuit_breaker", label);
                for e in CircuitBreakerConfig::from(breaker).problems() {
                    problems.push(describe(&section, &e));
                }
            }

            if let Some(bulkhead) = &resource.bulkhead {
                if bulkhead.max_concurrent_operations < 1 {
                    problems.push(format!(
                        "{}.bulkhead.max_concurrent_operations: must be at least 1",
                        label
                    ));
                }
            }

            if resource.retry.is_some() {
                let section = format!("{}.retry", label);
                for e in self.retry_for(resource).to_retry_config().problems() {
                    problems.push(describe(&section, &e));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(BulwarkError::Validation(problems))
        }
    }
}

fn describe(section: &str, error: &ConfigError) -> String {
    match error {
        ConfigError::Invalid { field, reason } => format!("{}.{}: {}", section, field, reason),
    }
}

/// Load, parse and validate the config file at `path`
pub fn load_config(path: &Path) -> Result<BulwarkConfig> {
    BulwarkConfig::from_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: BulwarkConfig = toml::from_str("").unwrap();

        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.logging.file.is_none());
        assert_eq!(config.retry, RetrySettings::default());
        assert!(config.resources.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_defaults_match_core() {
        assert_eq!(
            RetrySettings::default().to_retry_config(),
            RetryConfig::default()
        );
        assert_eq!(
            CircuitBreakerConfig::from(&BreakerSettings::default()),
            CircuitBreakerConfig::default()
        );
    }

    #[test]
    fn test_override_keeps_unset_fields() {
        let global = RetrySettings {
            base_delay_ms: 250,
            ..Default::default()
        };
        let merged = global.merged(&RetryOverride {
            max_attempts: Some(7),
            ..Default::default()
        });

        assert_eq!(merged.max_attempts, 7);
        assert_eq!(merged.base_delay_ms, 250);
        assert_eq!(merged.retryable, global.retryable);
    }

    #[test]
    fn test_validation_collects_all_problems() {
        let toml_str = r#"
            [retry]
            max_attempts = 0

            [[resources]]
            name = "db"
            [resources.circuit_breaker]
            failure_threshold = 0

            [[resources]]
            name = "db"
            [resources.bulkhead]
            max_concurrent_operations = 0
        "#;
        let config: BulwarkConfig = toml::from_str(toml_str).unwrap();

        match config.validate() {
            Err(BulwarkError::Validation(problems)) => {
                assert_eq!(problems.len(), 4, "{:?}", problems);
                assert!(problems[0].starts_with("retry.max_attempts"));
                assert!(problems.iter().any(|p| p.contains("duplicate")));
                assert!(problems
                    .iter()
                    .any(|p| p.contains("circuit_breaker.failure_threshold")));
                assert!(problems
                    .iter()
                    .any(|p| p.contains("bulkhead.max_concurrent_operations")));
            }
            other => panic!("Expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_every_bad_field_in_one_section() {
        let toml_str = r#"
            [retry]
            max_attempts = 0
            base_delay_ms = 0
            jitter_floor_ms = 0

            [[resources]]
            name = "db"
            [resources.circuit_breaker]
            failure_threshold = 0
            half_open_required_successes = 0
        "#;
        let config: BulwarkConfig = toml::from_str(toml_str).unwrap();

        match config.validate() {
            Err(BulwarkError::Validation(problems)) => {
                assert_eq!(
                    problems,
                    vec![
                        "retry.max_attempts: must be at least 1",
                        "retry.base_delay: must be greater than zero",
                        "retry.jitter_floor: must be greater than zero",
                        "resources.db.circuit_breaker.failure_threshold: must be at least 1",
                        "resources.db.circuit_breaker.half_open_required_successes: must be at least 1",
                    ]
                );
            }
            other => panic!("Expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<BulwarkConfig, _> =
            toml::from_str("[retry]\nmax_attempt = 3\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Info.to_tracing_level(), tracing::Level::INFO);
        assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}

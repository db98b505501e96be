/*!
 * Error types for Bulwark
 */

use bulwark_core_resilience::ConfigError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BulwarkError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

#[derive(Debug, Error)]
pub enum BulwarkError {
    /// Configuration file could not be read
    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration file is not valid TOML for the expected schema
    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic problems found during validation
    #[error("Invalid configuration:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),

    /// A resilience component rejected its configuration
    #[error("Invalid resilience settings for '{resource}': {source}")]
    Resilience {
        resource: String,
        #[source]
        source: ConfigError,
    },

    /// Requested resource is not defined in the configuration
    #[error("Unknown resource '{0}'")]
    UnknownResource(String),

    /// Logging could not be initialised
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// Output could not be rendered
    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),

    /// Command line arguments out of range
    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BulwarkError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_config_error() {
            EXIT_CONFIG
        } else {
            EXIT_FAILURE
        }
    }

    /// Whether the error comes from the configuration file or its contents
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            BulwarkError::ConfigRead { .. }
                | BulwarkError::ConfigParse { .. }
                | BulwarkError::Validation(_)
                | BulwarkError::Resilience { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_lists_every_problem() {
        let err = BulwarkError::Validation(vec![
            "retry.max_attempts: must be at least 1".to_string(),
            "resources[0].name: must not be empty".to_string(),
        ]);
        let msg = err.to_string();

        assert!(msg.contains("retry.max_attempts"));
        assert!(msg.contains("resources[0].name"));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            BulwarkError::UnknownResource("db".to_string()).exit_code(),
            EXIT_FAILURE
        );
        assert_eq!(BulwarkError::Validation(vec![]).exit_code(), EXIT_CONFIG);
    }
}

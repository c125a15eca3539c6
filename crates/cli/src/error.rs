//! Error types for CLI operations.

use contracts::SyncError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded or failed validation
    #[error("Invalid configuration in {path}: {source}")]
    InvalidConfig {
        path: String,
        #[source]
        source: SyncError,
    },

    /// Simulation could not be set up or run
    #[error("Simulation failed: {message}")]
    Simulation { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn invalid_config(path: impl Into<String>, source: SyncError) -> Self {
        Self::InvalidConfig {
            path: path.into(),
            source,
        }
    }

    pub fn simulation(message: impl Into<String>) -> Self {
        Self::Simulation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_path() {
        let err = CliError::config_not_found("missing.toml");
        assert!(err.to_string().contains("missing.toml"));

        let err = CliError::invalid_config(
            "bad.toml",
            SyncError::config_validation("buffer.buffer_size", "must be >= 5"),
        );
        let text = err.to_string();
        assert!(text.contains("bad.toml"));
        assert!(text.contains("buffer.buffer_size"));
    }
}

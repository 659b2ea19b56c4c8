//! Configuration Error Types

use thiserror::Error;

/// Configuration-related errors with enough context to fix the offending setting
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// File I/O or lookup errors during configuration loading
    #[error("Failed to read configuration file '{file_path}': {error}")]
    FileReadError { file_path: String, error: String },

    /// The merged sources could not be deserialized into settings
    #[error("Failed to parse configuration: {error}")]
    ParseError { error: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },
}

impl ConfigurationError {
    pub fn file_read_error(file_path: impl Into<String>, error: impl ToString) -> Self {
        Self::FileReadError {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }

    pub fn parse_error(error: impl ToString) -> Self {
        Self::ParseError {
            error: error.to_string(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;

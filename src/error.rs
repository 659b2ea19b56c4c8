//! Error types for the Tabula compute engine.
//!
//! Per-cell failures never surface here: they travel as `ComputeResult::error`
//! strings. `TabulaError` covers what stops a run before it starts (bad formula,
//! unknown column) and internal invariant violations that abort a run.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::state_machine::StateMachineError;
use crate::template::FormulaError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TabulaError {
    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("State transition error: {0}")]
    StateTransitionError(String),
    #[error("Persistence error: {0}")]
    PersistenceError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TabulaError {
    pub fn unknown_column(column_id: &str) -> Self {
        Self::ValidationError(format!("Column '{column_id}' does not exist"))
    }

    pub fn unknown_row(row_id: &str) -> Self {
        Self::ValidationError(format!("Row '{row_id}' does not exist"))
    }

    /// True for errors that indicate a broken internal invariant rather than bad input
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, Self::StateTransitionError(_) | Self::Internal(_))
    }
}

impl From<StateMachineError> for TabulaError {
    fn from(error: StateMachineError) -> Self {
        TabulaError::StateTransitionError(error.to_string())
    }
}

impl From<ConfigurationError> for TabulaError {
    fn from(error: ConfigurationError) -> Self {
        TabulaError::ConfigurationError(error.to_string())
    }
}

impl From<serde_json::Error> for TabulaError {
    fn from(error: serde_json::Error) -> Self {
        TabulaError::PersistenceError(format!("JSON serialization error: {error}"))
    }
}

impl From<std::io::Error> for TabulaError {
    fn from(error: std::io::Error) -> Self {
        TabulaError::PersistenceError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TabulaError>;

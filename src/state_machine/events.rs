use serde::{Deserialize, Serialize};

/// Events that drive cell state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CellEvent {
    /// Selected by a run (initial request, retry, or recompute)
    Enqueue,
    /// The scheduler is about to issue the network call
    Start,
    /// Completion produced a value
    Complete(String),
    /// Completion failed with the given message
    Fail(String),
    /// The run was stopped before this cell finished
    Interrupt,
    /// Rendered prompt was blank; resolved to an empty value without a network call
    ResolveVacuous,
    /// Manual clear back to idle
    Clear,
}

impl CellEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Enqueue => "enqueue",
            Self::Start => "start",
            Self::Complete(_) => "complete",
            Self::Fail(_) => "fail",
            Self::Interrupt => "interrupt",
            Self::ResolveVacuous => "resolve_vacuous",
            Self::Clear => "clear",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }

    pub fn complete_with_value(value: impl Into<String>) -> Self {
        Self::Complete(value.into())
    }
}

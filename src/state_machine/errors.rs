use thiserror::Error;

/// Errors raised by the cell state machine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Invalid cell transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Unknown cell: row {row_id}, column {column_id}")]
    UnknownCell { row_id: String, column_id: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;

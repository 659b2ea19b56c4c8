//! The one transition function every cell mutation goes through.
//!
//! Run callbacks, manual clears, and single-cell recomputes all call
//! [`transition`]; nothing else writes `CellMeta`.

use super::errors::{StateMachineError, StateMachineResult};
use super::events::CellEvent;
use super::states::CellState;
use crate::models::{CellValue, Row};

/// Determine the target state for `event` applied in `current_state`
pub fn determine_target_state(
    current_state: CellState,
    event: &CellEvent,
) -> StateMachineResult<CellState> {
    use CellState::*;

    let target = match (current_state, event) {
        // Selection by a run; a running cell belongs to another run
        (Idle | Queued | Done | Error, CellEvent::Enqueue) => Queued,

        (Queued, CellEvent::Start) => Running,

        (Running, CellEvent::Complete(_)) => Done,

        (Running | Queued, CellEvent::Fail(_)) => Error,

        // Stopped runs leave work requested-but-unfinished
        (Running | Queued, CellEvent::Interrupt) => Queued,

        (Idle | Queued | Done | Error, CellEvent::ResolveVacuous) => Done,

        (Idle | Queued | Done | Error, CellEvent::Clear) => Idle,

        (from_state, _) => {
            return Err(StateMachineError::InvalidTransition {
                from: from_state.to_string(),
                event: event.event_type().to_string(),
            })
        }
    };

    Ok(target)
}

/// Apply `event` to the cell `(row, column_id)`, including its value side effects
pub fn transition(
    row: &mut Row,
    column_id: &str,
    event: CellEvent,
) -> StateMachineResult<CellState> {
    let current_state = row.cell_state(column_id);
    let target_state = determine_target_state(current_state, &event)?;

    match event {
        CellEvent::Enqueue | CellEvent::Interrupt => {
            row.meta_mut(column_id).error = None;
        }
        CellEvent::Start => {}
        CellEvent::Complete(value) => {
            row.set_value(column_id, CellValue::Text(value));
            row.meta_mut(column_id).error = None;
        }
        CellEvent::Fail(message) => {
            row.meta_mut(column_id).error = Some(message);
        }
        CellEvent::ResolveVacuous => {
            row.set_value(column_id, CellValue::Text(String::new()));
            row.meta_mut(column_id).error = None;
        }
        CellEvent::Clear => {
            row.set_value(column_id, CellValue::Null);
            row.meta_mut(column_id).error = None;
        }
    }

    row.meta_mut(column_id).state = target_state;

    tracing::trace!(
        row_id = %row.id,
        column_id = %column_id,
        from = %current_state,
        to = %target_state,
        "Cell transition"
    );

    Ok(target_state)
}

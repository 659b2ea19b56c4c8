//! # Cell State Store
//!
//! Exclusive owner of the in-memory [`Sheet`] and the per-column
//! [`ComputeProgress`] rollups. During a run it is driven by exactly one
//! reducer consuming [`ComputeEvent`]s, so cell metadata and counters have a
//! single writer without any locking.
//!
//! Every cell mutation, whether from a run or from a manual clear, goes through
//! [`transition`]. Counters move in the same call as the cell, so the progress
//! invariant holds whenever the store is observed between calls.

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::batch_scheduler::ComputeEvent;
use super::task_builder::TaskPlan;
use crate::error::{Result, TabulaError};
use crate::logging::log_cell_operation;
use crate::models::{ColumnId, ComputeProgress, ComputeResult, ComputeTask, Row, RowId, Sheet};
use crate::state_machine::{transition, CellEvent, CellState, StateMachineError};

#[derive(Debug, Clone)]
pub struct CellStateStore {
    sheet: Sheet,
    row_index: HashMap<RowId, usize>,
    progress: HashMap<ColumnId, ComputeProgress>,
}

impl CellStateStore {
    /// Take ownership of `sheet`
    ///
    /// Cells persisted as `running` belong to a run that no longer exists and are
    /// returned to `queued`.
    pub fn new(mut sheet: Sheet) -> Self {
        let mut recovered = 0usize;
        for row in sheet.rows.iter_mut() {
            let stale: Vec<ColumnId> = row
                .cell_meta
                .iter()
                .filter(|(_, meta)| meta.state == CellState::Running)
                .map(|(column_id, _)| column_id.clone())
                .collect();
            for column_id in stale {
                if transition(row, &column_id, CellEvent::Interrupt).is_ok() {
                    recovered += 1;
                }
            }
        }

        if recovered > 0 {
            warn!(
                sheet_id = %sheet.id,
                recovered = recovered,
                "Recovered stale running cells as queued"
            );
        }

        let row_index = sheet.row_index();
        Self {
            sheet,
            row_index,
            progress: HashMap::new(),
        }
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }

    pub fn into_sheet(self) -> Sheet {
        self.sheet
    }

    pub fn progress(&self, column_id: &str) -> Option<ComputeProgress> {
        self.progress.get(column_id).copied()
    }

    pub fn cell_state(&self, row_id: &str, column_id: &str) -> Option<CellState> {
        self.row(row_id).map(|row| row.cell_state(column_id))
    }

    pub fn cell_error(&self, row_id: &str, column_id: &str) -> Option<&str> {
        self.row(row_id).and_then(|row| row.cell_error(column_id))
    }

    /// Rows whose cell in `column_id` is in `error`, in row order
    pub fn failed_rows(&self, column_id: &str) -> Vec<RowId> {
        self.sheet
            .rows
            .iter()
            .filter(|row| row.cell_state(column_id) == CellState::Error)
            .map(|row| row.id.clone())
            .collect()
    }

    /// Move every selected cell into its starting state and open a fresh rollup
    ///
    /// Rejected without side effects when any selected cell is `running`.
    pub fn begin_run(&mut self, plan: &TaskPlan, clear_prior: bool) -> Result<ComputeProgress> {
        let column_id = plan.column_id.as_str();

        for row_id in plan.selected_rows.iter() {
            let row = self.row(row_id).ok_or_else(|| unknown_cell(row_id, column_id))?;
            if row.cell_state(column_id) == CellState::Running {
                return Err(TabulaError::StateTransitionError(format!(
                    "Cell ({row_id}, {column_id}) is already running"
                )));
            }
        }

        let vacuous: HashSet<&RowId> = plan.vacuous_rows.iter().collect();

        for row_id in plan.selected_rows.iter() {
            let row = self.row_mut(row_id, column_id)?;
            if clear_prior {
                transition(row, column_id, CellEvent::Clear)?;
            }
            let event = if vacuous.contains(row_id) {
                CellEvent::ResolveVacuous
            } else {
                CellEvent::Enqueue
            };
            transition(row, column_id, event)?;
        }

        let progress = ComputeProgress::new(plan.tasks.len(), plan.vacuous_rows.len());
        self.progress.insert(column_id.to_string(), progress);

        debug!(
            column_id = %column_id,
            total = progress.total,
            queued = progress.queued,
            vacuous = plan.vacuous_rows.len(),
            cleared = clear_prior,
            "Run opened"
        );

        Ok(progress)
    }

    /// `queued -> running` for the task's cell
    pub fn on_task_start(&mut self, task: &ComputeTask) -> Result<()> {
        let row = self.row_mut(&task.row_id, &task.column_id)?;
        transition(row, &task.column_id, CellEvent::Start)?;
        self.progress_mut(&task.column_id)?.record_start();
        Ok(())
    }

    /// Apply one task outcome; returns the cell's resulting state
    ///
    /// Cancellation is an interruption, not a failure: a running cell goes back to
    /// `queued`, and a never-dispatched cell stays `queued`.
    pub fn on_result(&mut self, result: &ComputeResult) -> Result<CellState> {
        let column_id = result.column_id.as_str();
        let row = self.row_mut(&result.row_id, column_id)?;
        let current = row.cell_state(column_id);

        if result.is_cancellation() {
            if current == CellState::Running {
                let next = transition(row, column_id, CellEvent::Interrupt)?;
                self.progress_mut(column_id)?.record_interrupt();
                return Ok(next);
            }
            return Ok(current);
        }

        let was_running = current == CellState::Running;
        let next = match result.error.as_deref() {
            None => transition(
                row,
                column_id,
                CellEvent::complete_with_value(result.value.clone()),
            )?,
            Some(error) => transition(row, column_id, CellEvent::fail_with_error(error))?,
        };

        let progress = self.progress_mut(column_id)?;
        if result.is_success() {
            progress.record_success(was_running);
        } else {
            progress.record_failure(was_running);
        }

        Ok(next)
    }

    pub fn handle_event(&mut self, event: &ComputeEvent) -> Result<()> {
        match event {
            ComputeEvent::Started(task) => self.on_task_start(task),
            ComputeEvent::Finished(result) => self.on_result(result).map(|_| ()),
        }
    }

    /// Return any still-running cell of `column_id` to `queued` after a stop
    pub fn unwind_interrupted(&mut self, column_id: &str) -> usize {
        let mut unwound = 0usize;
        for row in self.sheet.rows.iter_mut() {
            if row.cell_state(column_id) == CellState::Running
                && transition(row, column_id, CellEvent::Interrupt).is_ok()
            {
                unwound += 1;
            }
        }

        if unwound > 0 {
            if let Some(progress) = self.progress.get_mut(column_id) {
                for _ in 0..unwound {
                    progress.record_interrupt();
                }
            }
            debug!(column_id = %column_id, unwound = unwound, "Unwound running cells");
        }

        unwound
    }

    /// Reset one cell to `idle` with no value
    pub fn clear_cell(&mut self, row_id: &str, column_id: &str) -> Result<()> {
        let row = self.row_mut(row_id, column_id)?;
        transition(row, column_id, CellEvent::Clear)?;
        log_cell_operation("clear", row_id, column_id, None);
        Ok(())
    }

    fn row(&self, row_id: &str) -> Option<&Row> {
        self.row_index
            .get(row_id)
            .and_then(|position| self.sheet.rows.get(*position))
    }

    fn row_mut(&mut self, row_id: &str, column_id: &str) -> Result<&mut Row> {
        self.row_index
            .get(row_id)
            .and_then(|position| self.sheet.rows.get_mut(*position))
            .ok_or_else(|| unknown_cell(row_id, column_id))
    }

    fn progress_mut(&mut self, column_id: &str) -> Result<&mut ComputeProgress> {
        self.progress.get_mut(column_id).ok_or_else(|| {
            TabulaError::Internal(format!("No active run for column '{column_id}'"))
        })
    }
}

fn unknown_cell(row_id: &str, column_id: &str) -> TabulaError {
    StateMachineError::UnknownCell {
        row_id: row_id.to_string(),
        column_id: column_id.to_string(),
    }
    .into()
}

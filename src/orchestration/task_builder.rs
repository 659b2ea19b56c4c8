//! # Task Builder
//!
//! Turns one AI column plus a row selection into the immutable work list for a run.
//!
//! The column formula is parsed once, up front: a formula error aborts the build
//! before any row is rendered, so a bad formula never produces tasks or network
//! calls. Each selected row is then rendered; rows whose prompt renders blank are
//! reported as vacuous and never become tasks.
//!
//! ## Parameter precedence
//!
//! For each of model, temperature, and max tokens the first set value wins:
//! formula option, then the column's `modelConfig`, then [`ComputeSettings`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::config::ComputeSettings;
use crate::error::{Result, TabulaError};
use crate::models::{Column, ColumnId, ComputeTask, Row, RowId, Sheet};
use crate::state_machine::CellState;
use crate::template::{parse_formula, render, ColumnCatalog, FormulaOptions, ParsedFormula};

/// Which rows of the target column a run picks up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RowSelection {
    /// Every row; prior values stay visible until overwritten
    All,
    /// Rows never computed, or computed to an empty value
    #[default]
    Unprocessed,
    /// Rows whose cell is in `error`
    #[serde(alias = "retry")]
    ErrorsOnly,
    /// Every row, clearing prior values and errors at enqueue
    ForceAll,
}

impl RowSelection {
    pub fn includes(&self, row: &Row, column_id: &str) -> bool {
        match self {
            Self::All | Self::ForceAll => true,
            Self::Unprocessed => {
                row.cell_state(column_id) != CellState::Done || row.value(column_id).is_blank()
            }
            Self::ErrorsOnly => row.cell_state(column_id) == CellState::Error,
        }
    }

    /// Whether enqueueing wipes the previous value and error
    pub fn clears_prior(&self) -> bool {
        matches!(self, Self::ForceAll)
    }
}

impl fmt::Display for RowSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Unprocessed => write!(f, "unprocessed"),
            Self::ErrorsOnly => write!(f, "retry"),
            Self::ForceAll => write!(f, "force-all"),
        }
    }
}

impl FromStr for RowSelection {
    type Err = TabulaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "unprocessed" => Ok(Self::Unprocessed),
            "retry" | "errors" | "errors-only" => Ok(Self::ErrorsOnly),
            "force-all" | "force" => Ok(Self::ForceAll),
            other => Err(TabulaError::ValidationError(format!(
                "Unknown row selection '{other}' (expected all, unprocessed, retry, or force-all)"
            ))),
        }
    }
}

/// Model parameters after applying formula, column, and global precedence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveModelParams {
    pub model_id: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

pub fn resolve_model_params(
    options: &FormulaOptions,
    column: &Column,
    settings: &ComputeSettings,
) -> EffectiveModelParams {
    let column_config = column.model_config.as_ref();

    let model_id = options
        .model
        .clone()
        .or_else(|| column_config.and_then(|config| config.model_id.clone()))
        .unwrap_or_else(|| settings.model_id.clone());

    let temperature = options
        .temperature
        .or_else(|| column_config.and_then(|config| config.temperature))
        .unwrap_or(settings.temperature);

    let max_tokens = options
        .max_tokens
        .or_else(|| column_config.and_then(|config| config.max_tokens))
        .unwrap_or(settings.max_tokens);

    EffectiveModelParams {
        model_id,
        temperature,
        max_tokens,
    }
}

/// Everything a run needs to know before dispatch
#[derive(Debug, Clone, Default)]
pub struct TaskPlan {
    /// Target column (resolved id, even when built by name)
    pub column_id: ColumnId,
    /// One task per selected row with a non-blank prompt, in row order
    pub tasks: Vec<ComputeTask>,
    /// Selected rows whose prompt rendered blank; resolved without a network call
    pub vacuous_rows: Vec<RowId>,
    /// All selected rows, tasks and vacuous alike, in row order
    pub selected_rows: Vec<RowId>,
    /// Deduplicated render warnings across all selected rows
    pub warnings: Vec<String>,
}

impl TaskPlan {
    pub fn is_empty(&self) -> bool {
        self.selected_rows.is_empty()
    }

    /// Cells this plan will account for in `ComputeProgress::total`
    pub fn total(&self) -> usize {
        self.tasks.len() + self.vacuous_rows.len()
    }
}

/// Builds [`TaskPlan`]s against a fixed set of global defaults
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    settings: ComputeSettings,
}

impl TaskBuilder {
    pub fn new(settings: &ComputeSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    /// Plan a run over the rows of `sheet` matching `selection`
    pub fn build(
        &self,
        sheet: &Sheet,
        column_id: &str,
        selection: RowSelection,
    ) -> Result<TaskPlan> {
        let (column, formula) = self.prepare_column(sheet, column_id)?;
        let rows = sheet
            .rows
            .iter()
            .filter(|row| selection.includes(row, &column.id));

        let plan = self.plan_rows(sheet, column, &formula, rows);

        debug!(
            column_id = %plan.column_id,
            selection = %selection,
            selected = plan.selected_rows.len(),
            tasks = plan.tasks.len(),
            vacuous = plan.vacuous_rows.len(),
            warnings = plan.warnings.len(),
            "Task plan built"
        );

        Ok(plan)
    }

    /// Plan a run over exactly the given rows, ignoring their current state
    pub fn build_for_rows(
        &self,
        sheet: &Sheet,
        column_id: &str,
        row_ids: &[RowId],
    ) -> Result<TaskPlan> {
        let (column, formula) = self.prepare_column(sheet, column_id)?;

        let mut rows = Vec::with_capacity(row_ids.len());
        for row_id in row_ids {
            let row = sheet
                .row(row_id)
                .ok_or_else(|| TabulaError::unknown_row(row_id))?;
            rows.push(row);
        }

        Ok(self.plan_rows(sheet, column, &formula, rows))
    }

    /// Resolve and validate the column, then parse its formula
    pub fn prepare_column<'a>(
        &self,
        sheet: &'a Sheet,
        column_id: &str,
    ) -> Result<(&'a Column, ParsedFormula)> {
        let column = sheet
            .resolve_column(column_id)
            .ok_or_else(|| TabulaError::unknown_column(column_id))?;

        if !column.is_ai() {
            return Err(TabulaError::ValidationError(format!(
                "Column '{}' is a {} column, not an AI column",
                column.name, column.kind
            )));
        }

        let source = column.formula.as_deref().ok_or_else(|| {
            TabulaError::ValidationError(format!("AI column '{}' has no formula", column.name))
        })?;

        let formula = parse_formula(source)?;
        Ok((column, formula))
    }

    pub fn settings(&self) -> &ComputeSettings {
        &self.settings
    }

    fn plan_rows<'a>(
        &self,
        sheet: &Sheet,
        column: &Column,
        formula: &ParsedFormula,
        rows: impl IntoIterator<Item = &'a Row>,
    ) -> TaskPlan {
        let catalog = ColumnCatalog::from_columns(&sheet.columns);
        let params = resolve_model_params(&formula.options, column, &self.settings);
        let max_chars = self.settings.max_input_chars();

        let mut plan = TaskPlan {
            column_id: column.id.clone(),
            ..TaskPlan::default()
        };

        for row in rows {
            let output = render(&formula.template, row, &catalog, max_chars);
            for warning in output.warnings.iter() {
                if !plan.warnings.contains(warning) {
                    plan.warnings.push(warning.clone());
                }
            }

            plan.selected_rows.push(row.id.clone());

            if output.is_blank() {
                plan.vacuous_rows.push(row.id.clone());
                continue;
            }

            plan.tasks.push(ComputeTask {
                row_id: row.id.clone(),
                column_id: column.id.clone(),
                rendered_prompt: output.rendered,
                model_id: params.model_id.clone(),
                temperature: params.temperature,
                max_tokens: params.max_tokens,
            });
        }

        plan
    }
}

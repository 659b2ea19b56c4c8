use serde::{Deserialize, Serialize};

use super::column::ColumnId;
use super::row::RowId;
use crate::constants::messages;

/// One cell's pending completion, fully self-contained
///
/// The prompt is rendered at build time so edits to the row during a run
/// cannot change what an in-flight request sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeTask {
    pub row_id: RowId,
    pub column_id: ColumnId,
    pub rendered_prompt: String,
    pub model_id: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Outcome of one task; `error` present means failure regardless of `value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeResult {
    pub row_id: RowId,
    pub column_id: ColumnId,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComputeResult {
    pub fn success(task: &ComputeTask, value: impl Into<String>) -> Self {
        Self {
            row_id: task.row_id.clone(),
            column_id: task.column_id.clone(),
            value: value.into(),
            error: None,
        }
    }

    pub fn failure(task: &ComputeTask, error: impl Into<String>) -> Self {
        Self {
            row_id: task.row_id.clone(),
            column_id: task.column_id.clone(),
            value: String::new(),
            error: Some(error.into()),
        }
    }

    /// Resolved locally because the run stopped before dispatch
    pub fn batch_cancelled(task: &ComputeTask) -> Self {
        Self::failure(task, messages::BATCH_CANCELLED)
    }

    /// Dispatched request that observed the stop signal
    pub fn request_cancelled(task: &ComputeTask) -> Self {
        Self::failure(task, messages::REQUEST_CANCELLED)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Interrupted by a stop rather than failed
    pub fn is_cancellation(&self) -> bool {
        self.error
            .as_deref()
            .is_some_and(messages::is_cancellation)
    }
}

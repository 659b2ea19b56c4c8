use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::column::ColumnId;
use crate::state_machine::CellState;

pub type RowId = String;

/// A stored cell value: text, number, or null
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Null or whitespace-only text
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(_) => false,
        }
    }

    /// Text used when the value is substituted into a prompt; null renders empty
    pub fn as_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Computation metadata for one cell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellMeta {
    pub state: CellState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

static NULL_VALUE: CellValue = CellValue::Null;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub id: RowId,
    #[serde(default)]
    pub values: HashMap<ColumnId, CellValue>,
    #[serde(default)]
    pub cell_meta: HashMap<ColumnId, CellMeta>,
}

impl Row {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: HashMap::new(),
            cell_meta: HashMap::new(),
        }
    }

    /// Builder-style value setter, mostly for fixtures
    pub fn with_value(mut self, column_id: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.values.insert(column_id.into(), value.into());
        self
    }

    pub fn value(&self, column_id: &str) -> &CellValue {
        self.values.get(column_id).unwrap_or(&NULL_VALUE)
    }

    pub fn set_value(&mut self, column_id: &str, value: CellValue) {
        if matches!(value, CellValue::Null) {
            self.values.remove(column_id);
        } else {
            self.values.insert(column_id.to_string(), value);
        }
    }

    pub fn meta(&self, column_id: &str) -> CellMeta {
        self.cell_meta.get(column_id).cloned().unwrap_or_default()
    }

    pub fn cell_state(&self, column_id: &str) -> CellState {
        self.cell_meta
            .get(column_id)
            .map(|meta| meta.state)
            .unwrap_or_default()
    }

    pub fn cell_error(&self, column_id: &str) -> Option<&str> {
        self.cell_meta
            .get(column_id)
            .and_then(|meta| meta.error.as_deref())
    }

    pub(crate) fn meta_mut(&mut self, column_id: &str) -> &mut CellMeta {
        self.cell_meta.entry(column_id.to_string()).or_default()
    }
}

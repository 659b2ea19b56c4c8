use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::column::{Column, ColumnId};
use super::row::{CellValue, Row, RowId};

/// In-memory snapshot of one sheet: the unit the persistence collaborator saves
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl Sheet {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn with_columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.id == column_id)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Resolve a column by id first, then by display name
    pub fn resolve_column(&self, id_or_name: &str) -> Option<&Column> {
        self.column(id_or_name)
            .or_else(|| self.column_by_name(id_or_name))
    }

    pub fn row(&self, row_id: &str) -> Option<&Row> {
        self.rows.iter().find(|row| row.id == row_id)
    }

    /// Position of every row by id
    pub fn row_index(&self) -> HashMap<RowId, usize> {
        self.rows
            .iter()
            .enumerate()
            .map(|(position, row)| (row.id.clone(), position))
            .collect()
    }

    /// Values to hand to an export codec, one entry per row in row order
    ///
    /// AI columns export their computed values; formulas never leave the sheet this way.
    pub fn export_values(&self) -> Vec<Vec<(ColumnId, CellValue)>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|column| (column.id.clone(), row.value(&column.id).clone()))
                    .collect()
            })
            .collect()
    }
}

//! # Sheet Data Model
//!
//! Columns, rows, and the immutable work items that flow through a compute run.

pub mod column;
pub mod progress;
pub mod row;
pub mod sheet;
pub mod task;

pub use column::{Column, ColumnId, ColumnKind, ModelConfig};
pub use progress::ComputeProgress;
pub use row::{CellMeta, CellValue, Row, RowId};
pub use sheet::Sheet;
pub use task::{ComputeResult, ComputeTask};

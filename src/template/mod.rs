//! Formula parsing and prompt rendering for AI columns.

pub mod formula;
pub mod renderer;

pub use formula::{is_ai_formula, parse_formula, FormulaError, FormulaOptions, ParsedFormula};
pub use renderer::{render, ColumnCatalog, RenderOutput};

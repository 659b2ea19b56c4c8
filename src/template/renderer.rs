//! # Template Renderer
//!
//! Substitutes `{{Column Name}}` placeholders with a row's cell values.
//! Rendering is pure and total: problems become warnings, never errors.
//!
//! `\{{` escapes a placeholder opener. Escapes are swapped for a sentinel before
//! substitution and restored as a literal `{{` afterwards, so an escaped
//! sequence is never itself matched as a placeholder.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::models::{Column, Row};

const ESCAPED_OPENER: &str = "\\{{";
const LITERAL_OPENER: &str = "{{";
// Private-use code point; never produced by cell text in practice
const ESCAPE_SENTINEL: &str = "\u{E000}";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("placeholder pattern is valid"))
}

/// Columns addressable from a template, keyed by display name
#[derive(Debug, Clone, Default)]
pub struct ColumnCatalog {
    by_name: HashMap<String, Column>,
}

impl ColumnCatalog {
    pub fn from_columns<'a>(columns: impl IntoIterator<Item = &'a Column>) -> Self {
        Self {
            by_name: columns
                .into_iter()
                .map(|column| (column.name.clone(), column.clone()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOutput {
    pub rendered: String,
    pub warnings: Vec<String>,
}

impl RenderOutput {
    /// Whitespace-only output never reaches the network
    pub fn is_blank(&self) -> bool {
        self.rendered.trim().is_empty()
    }
}

pub fn missing_column_warning(name: &str) -> String {
    format!("Column \"{name}\" not found")
}

pub fn truncation_warning(max_chars: usize, original_chars: usize) -> String {
    format!("Prompt truncated to {max_chars} characters (was {original_chars})")
}

/// Render `template` against `row`
///
/// `max_chars` of `None` or `Some(0)` means unlimited; otherwise the output is
/// cut to exactly that many characters.
pub fn render(
    template: &str,
    row: &Row,
    columns: &ColumnCatalog,
    max_chars: Option<usize>,
) -> RenderOutput {
    let mut warnings: Vec<String> = Vec::new();

    let protected = template.replace(ESCAPED_OPENER, ESCAPE_SENTINEL);

    let substituted = placeholder_pattern().replace_all(&protected, |captures: &regex::Captures<'_>| {
        let name = captures[1].trim();
        match columns.get(name) {
            Some(column) => row.value(&column.id).as_text(),
            None => {
                let warning = missing_column_warning(name);
                if !warnings.contains(&warning) {
                    warnings.push(warning);
                }
                String::new()
            }
        }
    });

    let mut rendered = substituted.replace(ESCAPE_SENTINEL, LITERAL_OPENER);

    if let Some(limit) = max_chars.filter(|limit| *limit > 0) {
        let char_count = rendered.chars().count();
        if char_count > limit {
            rendered = rendered.chars().take(limit).collect();
            warnings.push(truncation_warning(limit, char_count));
        }
    }

    RenderOutput { rendered, warnings }
}

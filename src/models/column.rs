use serde::{Deserialize, Serialize};
use std::fmt;

pub type ColumnId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    #[default]
    Text,
    Number,
    /// Computed from an `=AI(...)` formula
    Ai,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Number => write!(f, "number"),
            Self::Ai => write!(f, "ai"),
        }
    }
}

/// Per-column model overrides; unset fields fall through to the global settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    pub kind: ColumnKind,
    /// Only AI columns carry a formula
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_config: Option<ModelConfig>,
}

impl Column {
    pub fn text(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ColumnKind::Text,
            formula: None,
            model_config: None,
        }
    }

    pub fn number(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: ColumnKind::Number,
            ..Self::text(id, name)
        }
    }

    pub fn ai(id: impl Into<String>, name: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            kind: ColumnKind::Ai,
            formula: Some(formula.into()),
            ..Self::text(id, name)
        }
    }

    pub fn with_model_config(mut self, model_config: ModelConfig) -> Self {
        self.model_config = Some(model_config);
        self
    }

    pub fn is_ai(&self) -> bool {
        self.kind == ColumnKind::Ai
    }
}

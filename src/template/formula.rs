//! # AI Formula Parser
//!
//! Grammar: `=AI("<template>"[, <json-options>])`.
//!
//! The template is a double-quoted string scanned character by character:
//! `\"` and `\\` unescape, any other backslash sequence is kept verbatim so the
//! renderer still sees escapes such as `\{{`. Options are a JSON object whose
//! known keys are validated into [`FormulaOptions`]; unknown keys are ignored.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::constants::formula::{AI_PREFIX, OPTION_MAX_TOKENS, OPTION_MODEL, OPTION_TEMPERATURE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("formula must start with =AI(")]
    MissingPrefix,
    #[error("formula must end with ')'")]
    MissingClosingParen,
    #[error("template must be a double-quoted string")]
    UnquotedTemplate,
    #[error("template string is not terminated")]
    UnterminatedString,
    #[error("unexpected content after template: {0}")]
    UnexpectedContent(String),
    #[error("options must be a JSON object: {0}")]
    InvalidOptions(String),
}

/// Per-call overrides carried by the formula
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormulaOptions {
    pub model: Option<String>,
    /// Clamped to [0, 1]
    pub temperature: Option<f64>,
    /// At least 1
    pub max_tokens: Option<u32>,
}

impl FormulaOptions {
    fn from_json(object: &Map<String, Value>) -> Self {
        let model = object
            .get(OPTION_MODEL)
            .and_then(Value::as_str)
            .map(str::to_string);

        let temperature = object
            .get(OPTION_TEMPERATURE)
            .and_then(Value::as_f64)
            .map(|t| t.clamp(0.0, 1.0));

        let max_tokens = object
            .get(OPTION_MAX_TOKENS)
            .and_then(Value::as_f64)
            .map(|n| n.floor().max(1.0) as u32);

        Self {
            model,
            temperature,
            max_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFormula {
    pub template: String,
    pub options: FormulaOptions,
}

/// Cheap check used by column editors before a full parse
pub fn is_ai_formula(formula: &str) -> bool {
    formula.trim_start().starts_with(AI_PREFIX)
}

pub fn parse_formula(formula: &str) -> Result<ParsedFormula, FormulaError> {
    let trimmed = formula.trim();

    let inner = trimmed
        .strip_prefix(AI_PREFIX)
        .ok_or(FormulaError::MissingPrefix)?;
    let inner = inner
        .strip_suffix(')')
        .ok_or(FormulaError::MissingClosingParen)?
        .trim_start();

    let body = inner
        .strip_prefix('"')
        .ok_or(FormulaError::UnquotedTemplate)?;

    let (template, rest) = scan_quoted(body)?;

    let rest = rest.trim();
    let options = if rest.is_empty() {
        FormulaOptions::default()
    } else {
        let json = rest
            .strip_prefix(',')
            .ok_or_else(|| FormulaError::UnexpectedContent(rest.to_string()))?
            .trim();
        parse_options(json)?
    };

    Ok(ParsedFormula { template, options })
}

/// Scan up to the closing quote; returns the unescaped template and the remainder
fn scan_quoted(body: &str) -> Result<(String, &str), FormulaError> {
    let mut template = String::with_capacity(body.len());
    let mut escaped = false;

    for (offset, ch) in body.char_indices() {
        if escaped {
            match ch {
                '"' | '\\' => template.push(ch),
                other => {
                    template.push('\\');
                    template.push(other);
                }
            }
            escaped = false;
            continue;
        }

        match ch {
            '\\' => escaped = true,
            '"' => return Ok((template, &body[offset + ch.len_utf8()..])),
            other => template.push(other),
        }
    }

    Err(FormulaError::UnterminatedString)
}

fn parse_options(json: &str) -> Result<FormulaOptions, FormulaError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| FormulaError::InvalidOptions(e.to_string()))?;

    match value {
        Value::Object(object) => Ok(FormulaOptions::from_json(&object)),
        other => Err(FormulaError::InvalidOptions(format!(
            "expected an object, found {other}"
        ))),
    }
}

//! # Tabula Configuration
//!
//! One settings tree for the compute engine: global model defaults, the
//! completion endpoint and its credential, and run tuning.
//!
//! ## Sources (highest precedence first)
//!
//! 1. Environment: `TABULA__<SECTION>__<KEY>` (e.g. `TABULA__COMPUTE__CONCURRENCY=8`),
//!    plus `OPENAI_API_KEY` when no credential is otherwise set
//! 2. Config file: `$TABULA_CONFIG`, or `tabula.{toml,json,yaml}` in the working directory
//! 3. Built-in defaults
//!
//! ```rust,no_run
//! use tabula_core::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().load()?;
//! println!("concurrency = {}", config.compute.concurrency);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::defaults;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TabulaConfig {
    /// Global defaults, overridable per column and per formula call
    pub compute: ComputeSettings,

    /// Chat-completion endpoint and credential
    pub completion: CompletionEndpointConfig,

    /// Flush cadence, progress tick, optional per-task timeout
    pub run: RunConfig,
}

/// The global default settings object
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ComputeSettings {
    pub model_id: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Maximum completions in flight per run
    pub concurrency: usize,
    /// Rendered prompts longer than this are truncated; 0 means unlimited
    pub max_input_chars: usize,
}

impl Default for ComputeSettings {
    fn default() -> Self {
        Self {
            model_id: defaults::MODEL_ID.to_string(),
            temperature: defaults::TEMPERATURE,
            max_tokens: defaults::MAX_TOKENS,
            concurrency: defaults::CONCURRENCY,
            max_input_chars: defaults::MAX_INPUT_CHARS,
        }
    }
}

impl ComputeSettings {
    pub fn max_input_chars(&self) -> Option<usize> {
        (self.max_input_chars > 0).then_some(self.max_input_chars)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompletionEndpointConfig {
    /// Full URL of the chat-completion endpoint
    pub endpoint: String,
    /// Bearer credential
    pub api_key: Option<String>,
    pub connect_timeout_ms: u64,
}

impl Default for CompletionEndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::ENDPOINT.to_string(),
            api_key: None,
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
        }
    }
}

impl CompletionEndpointConfig {
    pub fn has_credential(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    /// Persist the sheet after this many processed results
    pub flush_every: usize,
    pub progress_tick_ms: u64,
    /// 0 disables the per-task timeout
    pub task_timeout_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            flush_every: defaults::FLUSH_EVERY,
            progress_tick_ms: defaults::PROGRESS_TICK_MS,
            task_timeout_ms: defaults::TASK_TIMEOUT_MS,
        }
    }
}

impl RunConfig {
    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        (self.task_timeout_ms > 0).then(|| Duration::from_millis(self.task_timeout_ms))
    }
}

impl TabulaConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let compute = &self.compute;
        if compute.concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "compute.concurrency",
                compute.concurrency,
                "must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&compute.temperature) {
            return Err(ConfigurationError::invalid_value(
                "compute.temperature",
                compute.temperature,
                "must be between 0 and 1",
            ));
        }
        if compute.max_tokens == 0 {
            return Err(ConfigurationError::invalid_value(
                "compute.max_tokens",
                compute.max_tokens,
                "must be at least 1",
            ));
        }
        if compute.model_id.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "compute.model_id",
                "",
                "must not be empty",
            ));
        }

        let endpoint = &self.completion.endpoint;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigurationError::invalid_value(
                "completion.endpoint",
                endpoint,
                "must be an http or https URL",
            ));
        }

        if self.run.flush_every == 0 {
            return Err(ConfigurationError::invalid_value(
                "run.flush_every",
                self.run.flush_every,
                "must be at least 1",
            ));
        }
        if self.run.progress_tick_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "run.progress_tick_ms",
                self.run.progress_tick_ms,
                "must be at least 1",
            ));
        }

        Ok(())
    }

    /// JSON view safe for logs: credential-like fields are masked
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::json!(self);
        sanitize_json_recursive(&mut value, &["key", "secret", "token", "password"]);
        value
    }
}

fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let is_sensitive = sensitive_patterns
                    .iter()
                    .any(|pattern| key_lower.contains(pattern));

                if is_sensitive {
                    if let serde_json::Value::String(s) = val {
                        *val = serde_json::Value::String(mask(s));
                    }
                } else {
                    sanitize_json_recursive(val, sensitive_patterns);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                sanitize_json_recursive(item, sensitive_patterns);
            }
        }
        _ => {}
    }
}

fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.is_empty() {
        "[EMPTY]".to_string()
    } else if chars.len() > 8 {
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("[MASKED: {head}***{tail}]")
    } else {
        "[MASKED]".to_string()
    }
}

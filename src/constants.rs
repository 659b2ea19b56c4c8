//! # System Constants
//!
//! Wire-level strings and operational defaults shared by the compute engine.
//! The cancellation messages are part of the cell-facing contract: the UI shows
//! them verbatim and the cell state store uses them to tell interruptions apart
//! from failures.

/// Result error strings produced by the engine itself
pub mod messages {
    /// A task that was never dispatched because the run was stopped first
    pub const BATCH_CANCELLED: &str = "Batch cancelled";
    /// A dispatched request that observed the stop signal mid-flight
    pub const REQUEST_CANCELLED: &str = "Request cancelled";
    /// No credential configured for the completion endpoint
    pub const MISSING_API_KEY: &str =
        "No API key configured. Add an API key in settings to run AI columns.";
    /// The concurrency limiter was torn down while a task waited for a slot
    pub const SCHEDULER_UNAVAILABLE: &str = "Scheduler unavailable: concurrency limiter closed";

    /// True when `error` is one of the interruption messages rather than a failure
    pub fn is_cancellation(error: &str) -> bool {
        error == BATCH_CANCELLED || error == REQUEST_CANCELLED
    }
}

/// Defaults for the global settings object and run tuning
pub mod defaults {
    pub const MODEL_ID: &str = "gpt-4o-mini";
    pub const TEMPERATURE: f64 = 0.7;
    pub const MAX_TOKENS: u32 = 1024;
    pub const CONCURRENCY: usize = 5;
    /// 0 means unlimited
    pub const MAX_INPUT_CHARS: usize = 0;
    pub const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
    pub const CONNECT_TIMEOUT_MS: u64 = 10_000;
    /// Results processed between persistence flushes
    pub const FLUSH_EVERY: usize = 10;
    pub const PROGRESS_TICK_MS: u64 = 500;
    /// 0 disables the per-task timeout
    pub const TASK_TIMEOUT_MS: u64 = 0;
}

/// Formula surface syntax
pub mod formula {
    pub const AI_PREFIX: &str = "=AI(";
    pub const OPTION_MODEL: &str = "model";
    pub const OPTION_TEMPERATURE: &str = "temperature";
    pub const OPTION_MAX_TOKENS: &str = "maxTokens";
}

/// Environment variables read by configuration and logging
pub mod env {
    pub const ENVIRONMENT: &str = "TABULA_ENV";
    pub const LOG_FORMAT: &str = "TABULA_LOG_FORMAT";
    pub const CONFIG_PATH: &str = "TABULA_CONFIG";
    pub const CONFIG_PREFIX: &str = "TABULA";
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
}

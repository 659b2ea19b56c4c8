//! # Structured Logging Module
//!
//! Environment-aware structured logging for compute runs.
//!
//! The default level comes from `TABULA_ENV` (`test` and `development` log at
//! debug, `production` at info) and `RUST_LOG` overrides it. Setting
//! `TABULA_LOG_FORMAT=json` switches the console output to JSON lines.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

use crate::constants::env;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process
///
/// Safe to call repeatedly; an already-installed global subscriber is kept.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = wants_json();

        let layer = if json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - keeping it");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Current environment name from `TABULA_ENV`
fn get_environment() -> String {
    std::env::var(env::ENVIRONMENT).unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

fn wants_json() -> bool {
    std::env::var(env::LOG_FORMAT)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log a run lifecycle step
pub fn log_run_operation(
    operation: &str,
    run_id: Uuid,
    column_id: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        run_id = %run_id,
        column_id = %column_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 RUN_OPERATION"
    );
}

/// Log a single-cell action outside a run (manual clear, preview)
pub fn log_cell_operation(operation: &str, row_id: &str, column_id: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        row_id = %row_id,
        column_id = %column_id,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔲 CELL_OPERATION"
    );
}

/// Log an error that aborted an operation
pub fn log_error(component: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

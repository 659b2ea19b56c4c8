//! # Completion Client
//!
//! One chat-completion request per [`ComputeTask`]. Implementations never fail:
//! every outcome, including a missing credential, an HTTP error, a transport
//! failure, or cancellation, resolves to a [`ComputeResult`].
//!
//! The request carries the rendered prompt as a single `user` message with no
//! injected system instruction.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CompletionEndpointConfig;
use crate::constants::messages;
use crate::error::{Result, TabulaError};
use crate::models::{ComputeResult, ComputeTask};

/// Resolves one task against a completion backend
#[async_trait]
pub trait CompletionClient: Send + Sync + 'static {
    /// Must observe `cancel` and resolve to a "Request cancelled" result when it fires
    async fn complete(&self, task: &ComputeTask, cancel: &CancellationToken) -> ComputeResult;

    fn name(&self) -> &str;
}

/// HTTP client for OpenAI-compatible chat-completion endpoints
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: Client,
    endpoint: Url,
    has_credential: bool,
}

impl ChatCompletionClient {
    pub fn new(config: CompletionEndpointConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            TabulaError::ConfigurationError(format!("Invalid completion endpoint: {e}"))
        })?;

        let mut client_builder = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(format!("tabula-core/{}", env!("CARGO_PKG_VERSION")));

        let has_credential = config.has_credential();
        if let Some(key) = config.api_key.as_deref().filter(|_| has_credential) {
            let mut default_headers = reqwest::header::HeaderMap::new();
            default_headers.insert(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", key.trim()).parse().map_err(|e| {
                    TabulaError::ConfigurationError(format!("Invalid API key: {e}"))
                })?,
            );
            client_builder = client_builder.default_headers(default_headers);
        }

        let client = client_builder.build().map_err(|e| {
            TabulaError::ConfigurationError(format!("Failed to create HTTP client: {e}"))
        })?;

        info!(
            endpoint = %endpoint,
            connect_timeout_ms = config.connect_timeout_ms,
            auth_enabled = has_credential,
            "Created chat completion client"
        );

        Ok(Self {
            client,
            endpoint,
            has_credential,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, task: &ComputeTask) -> ComputeResult {
        let body = build_request_body(task);

        let response = match self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(row_id = %task.row_id, error = %e, "Completion request failed");
                return ComputeResult::failure(task, e.to_string());
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return ComputeResult::failure(task, e.to_string()),
        };

        if !status.is_success() {
            let message = extract_error_message(&text)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            debug!(
                row_id = %task.row_id,
                status = %status,
                error = %message,
                "Completion endpoint returned an error"
            );
            return ComputeResult::failure(task, message);
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(payload) => ComputeResult::success(task, extract_completion(&payload)),
            Err(e) => ComputeResult::failure(task, format!("Invalid completion response: {e}")),
        }
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    async fn complete(&self, task: &ComputeTask, cancel: &CancellationToken) -> ComputeResult {
        if !self.has_credential {
            return ComputeResult::failure(task, messages::MISSING_API_KEY);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => ComputeResult::request_cancelled(task),
            result = self.send(task) => result,
        }
    }

    fn name(&self) -> &str {
        "chat_completion"
    }
}

pub fn build_request_body(task: &ComputeTask) -> Value {
    json!({
        "model": task.model_id,
        "messages": [
            { "role": "user", "content": task.rendered_prompt }
        ],
        "temperature": task.temperature,
        "max_tokens": task.max_tokens,
    })
}

/// `{"error": {"message": ...}}`, tolerating a bare string `error`
pub fn extract_error_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body).ok()?;
    let error = payload.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
        .filter(|message| !message.trim().is_empty())
}

/// First choice's message content, trimmed; empty when absent
pub fn extract_completion(payload: &Value) -> String {
    payload
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.pointer("/message/content"))
        .and_then(Value::as_str)
        .map(|content| content.trim().to_string())
        .unwrap_or_default()
}

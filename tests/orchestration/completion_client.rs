use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tabula_core::config::CompletionEndpointConfig;
use tabula_core::constants::messages;
use tabula_core::models::ComputeTask;
use tabula_core::orchestration::{ChatCompletionClient, CompletionClient};

use crate::common::CannedServer;

fn task() -> ComputeTask {
    ComputeTask {
        row_id: "r1".to_string(),
        column_id: "c_out".to_string(),
        rendered_prompt: "Say hi to Alice".to_string(),
        model_id: "gpt-4o-mini".to_string(),
        temperature: 0.2,
        max_tokens: 64,
    }
}

fn client_for(endpoint: String) -> ChatCompletionClient {
    ChatCompletionClient::new(CompletionEndpointConfig {
        endpoint,
        api_key: Some("sk-test-key".to_string()),
        connect_timeout_ms: 2_000,
    })
    .unwrap()
}

#[tokio::test]
async fn test_successful_completion_is_trimmed() {
    let server = CannedServer::start(
        200,
        r#"{"choices":[{"message":{"role":"assistant","content":"  Hi Alice!\n"}}]}"#,
    )
    .await;
    let client = client_for(server.endpoint());

    let result = client.complete(&task(), &CancellationToken::new()).await;

    assert!(result.is_success());
    assert_eq!(result.value, "Hi Alice!");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].header("authorization").as_deref(),
        Some("Bearer sk-test-key")
    );
    assert!(requests[0].head.starts_with("POST /v1/chat/completions"));

    let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["max_tokens"], 64);
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "Say hi to Alice");
}

#[tokio::test]
async fn test_empty_choices_resolve_to_empty_value() {
    let server = CannedServer::start(200, r#"{"choices":[]}"#).await;
    let client = client_for(server.endpoint());

    let result = client.complete(&task(), &CancellationToken::new()).await;

    assert!(result.is_success());
    assert_eq!(result.value, "");
}

#[tokio::test]
async fn test_error_body_message_is_surfaced() {
    let server = CannedServer::start(
        429,
        r#"{"error":{"message":"Rate limit reached for gpt-4o-mini","type":"requests"}}"#,
    )
    .await;
    let client = client_for(server.endpoint());

    let result = client.complete(&task(), &CancellationToken::new()).await;

    assert!(!result.is_success());
    assert_eq!(
        result.error.as_deref(),
        Some("Rate limit reached for gpt-4o-mini")
    );
}

#[tokio::test]
async fn test_unparseable_error_body_falls_back_to_status() {
    let server = CannedServer::start(500, "<html>upstream exploded</html>").await;
    let client = client_for(server.endpoint());

    let result = client.complete(&task(), &CancellationToken::new()).await;

    assert_eq!(result.error.as_deref(), Some("HTTP 500"));
}

#[tokio::test]
async fn test_invalid_success_body_is_a_failure() {
    let server = CannedServer::start(200, "not json").await;
    let client = client_for(server.endpoint());

    let result = client.complete(&task(), &CancellationToken::new()).await;

    let error = result.error.unwrap();
    assert!(error.starts_with("Invalid completion response"));
}

#[tokio::test]
async fn test_cancel_aborts_in_flight_request() {
    let server = CannedServer::start_with_delay(
        200,
        r#"{"choices":[{"message":{"content":"late"}}]}"#,
        Duration::from_secs(10),
    )
    .await;
    let client = client_for(server.endpoint());
    let cancel = CancellationToken::new();

    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.cancel();
    });

    let started = std::time::Instant::now();
    let result = client.complete(&task(), &cancel).await;

    assert_eq!(result.error.as_deref(), Some(messages::REQUEST_CANCELLED));
    assert!(result.is_cancellation());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_connection_refused_is_a_plain_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(format!("http://{addr}/v1/chat/completions"));
    let result = client.complete(&task(), &CancellationToken::new()).await;

    assert!(!result.is_success());
    assert!(!result.is_cancellation());
    assert!(!result.error.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_credential_sends_nothing() {
    let server = CannedServer::start(200, r#"{"choices":[]}"#).await;
    let client = ChatCompletionClient::new(CompletionEndpointConfig {
        endpoint: server.endpoint(),
        api_key: Some("   ".to_string()),
        connect_timeout_ms: 2_000,
    })
    .unwrap();

    let result = client.complete(&task(), &CancellationToken::new()).await;

    assert_eq!(result.error.as_deref(), Some(messages::MISSING_API_KEY));
    assert!(server.requests().is_empty());
}

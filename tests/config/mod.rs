//! Config files driving a real engine end to end

use std::io::Write;
use std::sync::Arc;

use tabula_core::config::{ConfigLoader, ConfigurationError};
use tabula_core::orchestration::{CellStateStore, ComputeEngine, RowSelection};
use tabula_core::persistence::{JsonFileSheetStore, SheetStore};
use tabula_core::state_machine::CellState;

use crate::common::{people_sheet, CannedServer, OUT};

fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(extension)
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_json_config_file() {
    let file = write_config(
        ".json",
        r#"{
            "compute": { "model_id": "gpt-4o", "temperature": 0.1, "concurrency": 2 },
            "completion": { "api_key": "sk-from-file" },
            "run": { "task_timeout_ms": 30000 }
        }"#,
    );

    let config = ConfigLoader::with_file(file.path())
        .without_environment()
        .load()
        .unwrap();

    assert_eq!(config.compute.model_id, "gpt-4o");
    assert_eq!(config.compute.concurrency, 2);
    assert!(config.completion.has_credential());
    assert_eq!(
        config.run.task_timeout(),
        Some(std::time::Duration::from_secs(30))
    );

    let sanitized = config.sanitized().to_string();
    assert!(!sanitized.contains("sk-from-file"));
}

#[test]
fn test_non_http_endpoint_is_rejected() {
    let file = write_config(
        ".toml",
        "[completion]\nendpoint = \"ftp://example.com/v1/chat/completions\"\n",
    );

    let result = ConfigLoader::with_file(file.path())
        .without_environment()
        .load();

    assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
}

#[test]
fn test_malformed_file_is_reported() {
    let file = write_config(".toml", "[compute\nconcurrency = ");

    let result = ConfigLoader::with_file(file.path())
        .without_environment()
        .load();

    assert!(result.is_err());
}

#[tokio::test]
async fn test_configured_engine_computes_and_persists_sheet() {
    let server = CannedServer::start(
        200,
        r#"{"choices":[{"message":{"content":"Hello there"}}]}"#,
    )
    .await;
    let file = write_config(
        ".toml",
        &format!(
            "[compute]\nconcurrency = 2\n\n[completion]\nendpoint = \"{}\"\napi_key = \"sk-local\"\n\n[run]\nflush_every = 1\n",
            server.endpoint()
        ),
    );
    let config = ConfigLoader::with_file(file.path())
        .without_environment()
        .load()
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let sheet_path = dir.path().join("people.json");
    let store = Arc::new(JsonFileSheetStore::new(&sheet_path));
    store
        .save(&people_sheet(r#"=AI("Greet {{Name}}")"#, &["Ada", "Grace"]))
        .await
        .unwrap();

    let engine = ComputeEngine::from_config(&config, store.clone()).unwrap();
    let mut cells = CellStateStore::new(store.load().await.unwrap());

    let outcome = engine
        .run(&mut cells, "Out", RowSelection::Unprocessed)
        .await
        .unwrap();

    assert_eq!(outcome.column_id, OUT);
    assert_eq!(outcome.progress.done, 2);
    assert!(outcome.persisted);
    assert_eq!(server.requests().len(), 2);

    let reloaded = store.load().await.unwrap();
    for row in &reloaded.rows {
        assert_eq!(row.cell_state(OUT), CellState::Done);
        assert_eq!(row.value(OUT).as_text(), "Hello there");
    }
}

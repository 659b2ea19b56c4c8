use std::sync::Arc;
use std::time::Duration;

use tabula_core::config::RunConfig;
use tabula_core::models::CellValue;
use tabula_core::orchestration::{CellStateStore, ProgressSnapshot, RowSelection};
use tabula_core::persistence::InMemorySheetStore;
use tabula_core::state_machine::CellState;
use tabula_core::TabulaError;

use crate::common::{engine, people_sheet, ScriptedClient, OUT};

#[tokio::test(start_paused = true)]
async fn test_whole_template_placeholder_short_circuits_blank_row() {
    let client = ScriptedClient::new(Duration::from_millis(100));
    let store = Arc::new(InMemorySheetStore::new());
    let engine = engine(client.clone(), store, 2, RunConfig::default());
    let mut cells = CellStateStore::new(people_sheet(r#"=AI("{{Name}}")"#, &["Alice", "", "Bob"]));

    let outcome = engine
        .run(&mut cells, OUT, RowSelection::All)
        .await
        .unwrap();

    assert_eq!(client.calls(), 2);
    assert!(client.peak_in_flight() <= 2);
    assert_eq!(outcome.vacuous_rows, vec!["r2".to_string()]);

    let sheet = cells.sheet();
    let r2 = sheet.row("r2").unwrap();
    assert_eq!(r2.value(OUT), &CellValue::text(""));
    assert_eq!(r2.cell_state(OUT), CellState::Done);
    assert_eq!(sheet.row("r1").unwrap().value(OUT).as_text(), "echo: Alice");
    assert_eq!(sheet.row("r3").unwrap().value(OUT).as_text(), "echo: Bob");
}

#[tokio::test(start_paused = true)]
async fn test_literal_template_dispatches_every_row() {
    let client = ScriptedClient::new(Duration::from_millis(100));
    let store = Arc::new(InMemorySheetStore::new());
    let engine = engine(client.clone(), store, 2, RunConfig::default());
    let mut cells = CellStateStore::new(people_sheet(
        r#"=AI("Say hi to {{Name}}")"#,
        &["Alice", "", "Bob"],
    ));

    let outcome = engine
        .run(&mut cells, OUT, RowSelection::All)
        .await
        .unwrap();

    assert_eq!(client.calls(), 3);
    assert_eq!(client.peak_in_flight(), 2);
    assert!(outcome.vacuous_rows.is_empty());
    assert_eq!(outcome.progress.done, 3);
}

#[tokio::test(start_paused = true)]
async fn test_retry_sends_exactly_the_failed_rows() {
    let client = ScriptedClient::new(Duration::from_millis(10));
    client.fail_when_prompt_contains("Bob");
    let store = Arc::new(InMemorySheetStore::new());
    let engine = engine(client.clone(), store, 2, RunConfig::default());
    let mut cells = CellStateStore::new(people_sheet(
        r#"=AI("Hi {{Name}}")"#,
        &["Alice", "Bob", "Carol"],
    ));

    let first = engine
        .run(&mut cells, OUT, RowSelection::All)
        .await
        .unwrap();
    assert_eq!(first.progress.failed, 1);
    assert_eq!(cells.failed_rows(OUT), vec!["r2".to_string()]);
    assert_eq!(cells.cell_error("r2", OUT), Some("HTTP 500"));

    client.clear_failures();
    let calls_before = client.calls();
    let retry = engine
        .run(&mut cells, OUT, RowSelection::ErrorsOnly)
        .await
        .unwrap();

    assert_eq!(client.calls() - calls_before, 1);
    assert_eq!(client.prompts().last().map(String::as_str), Some("Hi Bob"));
    assert_eq!(retry.progress.total, 1);
    assert_eq!(retry.progress.done, 1);
    assert!(cells.failed_rows(OUT).is_empty());
    assert_eq!(cells.cell_state("r1", OUT), Some(CellState::Done));
}

#[tokio::test(start_paused = true)]
async fn test_stop_returns_unfinished_cells_to_queued() {
    let client = ScriptedClient::new(Duration::from_secs(30));
    let store = Arc::new(InMemorySheetStore::new());
    let engine = engine(client.clone(), store.clone(), 2, RunConfig::default());
    let mut cells = CellStateStore::new(people_sheet(
        r#"=AI("Hi {{Name}}")"#,
        &["A", "B", "C", "D", "E"],
    ));

    let run = engine.prepare(OUT, RowSelection::All);
    let handle = run.handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();
    });

    let outcome = engine.execute(run, &mut cells).await.unwrap();

    assert!(outcome.cancelled);
    assert_eq!(client.calls(), 2);
    assert_eq!(outcome.results.len(), 5);
    assert_eq!(outcome.progress.queued, 5);
    assert_eq!(outcome.progress.failed, 0);
    assert!(outcome.progress.is_consistent());

    for row in cells.sheet().rows.iter() {
        assert_eq!(row.cell_state(OUT), CellState::Queued);
        assert_eq!(row.cell_error(OUT), None);
    }

    // final flush carries the unwound state
    let saved = store.latest().unwrap();
    assert!(saved
        .rows
        .iter()
        .all(|row| row.cell_state(OUT) == CellState::Queued));

    // an unprocessed pass picks every interrupted cell back up
    let resumed = engine
        .run(&mut cells, OUT, RowSelection::Unprocessed)
        .await
        .unwrap();
    assert_eq!(resumed.progress.total, 5);
}

#[tokio::test(start_paused = true)]
async fn test_flushes_every_k_results_plus_final() {
    let client = ScriptedClient::new(Duration::from_millis(10));
    let store = Arc::new(InMemorySheetStore::new());
    let run_config = RunConfig {
        flush_every: 2,
        ..RunConfig::default()
    };
    let engine = engine(client, store.clone(), 1, run_config);
    let mut cells = CellStateStore::new(people_sheet(
        r#"=AI("Hi {{Name}}")"#,
        &["A", "B", "C", "D", "E"],
    ));

    let outcome = engine
        .run(&mut cells, OUT, RowSelection::All)
        .await
        .unwrap();

    assert!(outcome.persisted);
    assert_eq!(store.save_count(), 3);
    assert_eq!(store.latest().unwrap(), cells.sheet().clone());
}

#[tokio::test(start_paused = true)]
async fn test_every_published_snapshot_is_consistent() {
    let client = ScriptedClient::new(Duration::from_millis(300));
    let store = Arc::new(InMemorySheetStore::new());
    let run_config = RunConfig {
        progress_tick_ms: 100,
        ..RunConfig::default()
    };
    let engine = engine(client, store, 2, run_config);
    let names: Vec<String> = (0..8).map(|i| format!("N{i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut cells = CellStateStore::new(people_sheet(r#"=AI("Hi {{Name}}")"#, &names));

    let run = engine.prepare(OUT, RowSelection::All);
    let mut progress_rx = run.handle().progress();
    let collector = tokio::spawn(async move {
        let mut seen: Vec<ProgressSnapshot> = Vec::new();
        while progress_rx.changed().await.is_ok() {
            if let Some(snapshot) = progress_rx.borrow_and_update().clone() {
                seen.push(snapshot);
            }
        }
        seen
    });

    engine.execute(run, &mut cells).await.unwrap();
    let seen = collector.await.unwrap();

    assert!(seen.len() > 2);
    assert!(seen.iter().all(|s| s.progress.is_consistent()));
    assert!(seen.iter().any(|s| s.progress.running > 0));

    let last = seen.last().unwrap();
    assert!(last.finished);
    assert_eq!(last.percent_complete, 100);
    assert_eq!(last.progress.done, 8);
}

#[tokio::test]
async fn test_malformed_formula_makes_no_calls() {
    let client = ScriptedClient::new(Duration::from_millis(10));
    let store = Arc::new(InMemorySheetStore::new());
    let engine = engine(client.clone(), store.clone(), 2, RunConfig::default());
    let mut cells = CellStateStore::new(people_sheet(r#"=AI("Hi {{Name}}", {oops})"#, &["A"]));

    let err = engine
        .run(&mut cells, OUT, RowSelection::All)
        .await
        .unwrap_err();

    assert!(matches!(err, TabulaError::Formula(_)));
    assert_eq!(client.calls(), 0);
    assert_eq!(store.save_count(), 0);
    assert_eq!(cells.cell_state("r1", OUT), Some(CellState::Idle));
}

#[tokio::test(start_paused = true)]
async fn test_force_all_recomputes_done_cells() {
    let client = ScriptedClient::new(Duration::from_millis(10));
    let store = Arc::new(InMemorySheetStore::new());
    let engine = engine(client.clone(), store, 2, RunConfig::default());
    let mut cells = CellStateStore::new(people_sheet(r#"=AI("Hi {{Name}}")"#, &["A", "B"]));

    engine
        .run(&mut cells, OUT, RowSelection::All)
        .await
        .unwrap();
    let skipped = engine
        .run(&mut cells, OUT, RowSelection::Unprocessed)
        .await
        .unwrap();
    assert_eq!(skipped.progress.total, 0);
    assert_eq!(client.calls(), 2);

    let forced = engine
        .run(&mut cells, OUT, RowSelection::ForceAll)
        .await
        .unwrap();
    assert_eq!(forced.progress.done, 2);
    assert_eq!(client.calls(), 4);
}

//! # Compute Engine
//!
//! Drives one run of one AI column end to end:
//!
//! 1. **Build**: parse the column formula and render the selected rows into a
//!    [`TaskPlan`]. Formula errors stop here, before any state changes.
//! 2. **Open**: move selected cells to `queued` (or straight to `done` when their
//!    prompt renders blank) and open a fresh [`ComputeProgress`].
//! 3. **Schedule**: the [`BatchScheduler`] resolves tasks with bounded concurrency
//!    and emits [`ComputeEvent`]s.
//! 4. **Reduce**: a single consumer applies events to the [`CellStateStore`],
//!    flushes the sheet every `flush_every` results, and publishes a
//!    [`ProgressSnapshot`] on a fixed tick.
//! 5. **Close**: after a stop, still-running cells go back to `queued`; the sheet
//!    is flushed one last time and a final snapshot is published.
//!
//! The store is passed in by the caller and borrowed exclusively for the run, so
//! only one run can touch a sheet at a time.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tabula_core::config::ConfigLoader;
//! use tabula_core::orchestration::{CellStateStore, ComputeEngine, RowSelection};
//! use tabula_core::persistence::JsonFileSheetStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().load()?;
//! let sheet_store = Arc::new(JsonFileSheetStore::new("sheet.json"));
//! let mut cells = CellStateStore::new(sheet_store.load().await?);
//!
//! let engine = ComputeEngine::from_config(&config, sheet_store)?;
//! let run = engine.prepare("Summary", RowSelection::Unprocessed);
//! let handle = run.handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     handle.stop();
//! });
//!
//! let outcome = engine.execute(run, &mut cells).await?;
//! println!("{} done, {} failed", outcome.progress.done, outcome.progress.failed);
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::batch_scheduler::{BatchScheduler, ComputeEvent, SchedulerConfig};
use super::cell_state_store::CellStateStore;
use super::completion_client::{ChatCompletionClient, CompletionClient};
use super::progress::{ProgressAggregator, ProgressSnapshot};
use super::task_builder::{resolve_model_params, EffectiveModelParams, RowSelection, TaskBuilder};
use crate::config::{ComputeSettings, RunConfig, TabulaConfig};
use crate::error::{Result, TabulaError};
use crate::logging::{log_error, log_run_operation};
use crate::models::{ColumnId, ComputeProgress, ComputeResult, RowId, Sheet};
use crate::persistence::SheetStore;
use crate::template::{render, ColumnCatalog};

/// Rows a prepared run will cover
#[derive(Debug, Clone, PartialEq)]
pub enum RunTarget {
    Selection(RowSelection),
    /// Exactly these rows, recomputed regardless of state
    Rows(Vec<RowId>),
}

/// A run that has been prepared but not executed
///
/// Hand out [`RunHandle`]s before passing the run to [`ComputeEngine::execute`].
#[derive(Debug)]
pub struct ComputeRun {
    run_id: Uuid,
    column_id: String,
    target: RunTarget,
    cancel: CancellationToken,
    progress_tx: watch::Sender<Option<ProgressSnapshot>>,
}

impl ComputeRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn target(&self) -> &RunTarget {
        &self.target
    }

    pub fn handle(&self) -> RunHandle {
        RunHandle {
            run_id: self.run_id,
            cancel: self.cancel.clone(),
            progress_rx: self.progress_tx.subscribe(),
        }
    }
}

/// Stop control and progress feed for a run; cheap to clone
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: Uuid,
    cancel: CancellationToken,
    progress_rx: watch::Receiver<Option<ProgressSnapshot>>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Signal the run to stop; in-flight requests abort, queued tasks never dispatch
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!(run_id = %self.run_id, "Stop requested");
        }
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Receiver that changes on every tick and once at run end
    pub fn progress(&self) -> watch::Receiver<Option<ProgressSnapshot>> {
        self.progress_rx.clone()
    }

    pub fn latest(&self) -> Option<ProgressSnapshot> {
        self.progress_rx.borrow().clone()
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub column_id: ColumnId,
    /// Column rollup after the run closed
    pub progress: ComputeProgress,
    /// One per dispatched-or-cancelled task, in completion order
    pub results: Vec<ComputeResult>,
    pub cancelled: bool,
    /// Rows resolved to an empty value without a request
    pub vacuous_rows: Vec<RowId>,
    /// Render warnings collected while building the run
    pub warnings: Vec<String>,
    /// Whether the final flush reached the sheet store
    pub persisted: bool,
    pub elapsed: Duration,
}

/// What a row would send, without sending it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptPreview {
    pub row_id: RowId,
    pub column_id: ColumnId,
    pub rendered: String,
    pub warnings: Vec<String>,
    pub params: EffectiveModelParams,
    /// The prompt is blank; the cell would resolve to an empty value
    pub vacuous: bool,
}

pub struct ComputeEngine {
    client: Arc<dyn CompletionClient>,
    sheet_store: Arc<dyn SheetStore>,
    settings: ComputeSettings,
    run_config: RunConfig,
}

impl std::fmt::Debug for ComputeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeEngine")
            .field("client", &self.client.name())
            .field("sheet_store", &self.sheet_store.name())
            .field("settings", &self.settings)
            .field("run_config", &self.run_config)
            .finish()
    }
}

impl ComputeEngine {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        sheet_store: Arc<dyn SheetStore>,
        settings: ComputeSettings,
        run_config: RunConfig,
    ) -> Self {
        Self {
            client,
            sheet_store,
            settings,
            run_config,
        }
    }

    /// Engine backed by the configured chat-completion endpoint
    pub fn from_config(config: &TabulaConfig, sheet_store: Arc<dyn SheetStore>) -> Result<Self> {
        let client = ChatCompletionClient::new(config.completion.clone())?;
        Ok(Self::new(
            Arc::new(client),
            sheet_store,
            config.compute.clone(),
            config.run.clone(),
        ))
    }

    pub fn settings(&self) -> &ComputeSettings {
        &self.settings
    }

    /// Prepare a run over the rows of `column_id` (id or display name) matching `selection`
    pub fn prepare(&self, column_id: &str, selection: RowSelection) -> ComputeRun {
        self.prepare_target(column_id, RunTarget::Selection(selection))
    }

    /// Prepare a recompute of exactly one cell
    pub fn prepare_cell(&self, column_id: &str, row_id: &str) -> ComputeRun {
        self.prepare_target(column_id, RunTarget::Rows(vec![row_id.to_string()]))
    }

    fn prepare_target(&self, column_id: &str, target: RunTarget) -> ComputeRun {
        let (progress_tx, _) = watch::channel(None);
        ComputeRun {
            run_id: Uuid::new_v4(),
            column_id: column_id.to_string(),
            target,
            cancel: CancellationToken::new(),
            progress_tx,
        }
    }

    /// Prepare and execute in one step, for callers that never stop the run
    pub async fn run(
        &self,
        cells: &mut CellStateStore,
        column_id: &str,
        selection: RowSelection,
    ) -> Result<RunOutcome> {
        self.execute(self.prepare(column_id, selection), cells).await
    }

    /// Recompute one cell through the same path as a full run
    pub async fn compute_cell(
        &self,
        cells: &mut CellStateStore,
        column_id: &str,
        row_id: &str,
    ) -> Result<RunOutcome> {
        self.execute(self.prepare_cell(column_id, row_id), cells)
            .await
    }

    pub async fn execute(&self, run: ComputeRun, cells: &mut CellStateStore) -> Result<RunOutcome> {
        let ComputeRun {
            run_id,
            column_id,
            target,
            cancel,
            progress_tx,
        } = run;
        let started_at = Instant::now();

        let builder = TaskBuilder::new(&self.settings);
        let (plan, clear_prior) = match &target {
            RunTarget::Selection(selection) => (
                builder.build(cells.sheet(), &column_id, *selection)?,
                selection.clears_prior(),
            ),
            RunTarget::Rows(row_ids) => {
                (builder.build_for_rows(cells.sheet(), &column_id, row_ids)?, true)
            }
        };

        cells.begin_run(&plan, clear_prior)?;
        let column_id = plan.column_id.clone();

        log_run_operation(
            "run_started",
            run_id,
            &column_id,
            "running",
            Some(&format!(
                "tasks={} vacuous={} concurrency={}",
                plan.tasks.len(),
                plan.vacuous_rows.len(),
                self.settings.concurrency
            )),
        );

        let aggregator = ProgressAggregator::started_at(column_id.clone(), started_at);
        publish(&progress_tx, &aggregator, cells, &column_id, false);

        let scheduler = BatchScheduler::new(
            Arc::clone(&self.client),
            SchedulerConfig {
                concurrency: self.settings.concurrency,
                task_timeout: self.run_config.task_timeout(),
                scheduler_id: format!("run-{run_id}"),
            },
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let schedule = scheduler.run(plan.tasks.clone(), cancel.clone(), events_tx);
        let reduce = async {
            let reduced = self
                .reduce(run_id, &column_id, events_rx, cells, &aggregator, &progress_tx)
                .await;
            if reduced.is_err() {
                // Remaining tasks resolve as cancelled so the scheduler can finish
                cancel.cancel();
            }
            reduced
        };

        let (results, reduced) = tokio::join!(schedule, reduce);
        let cancelled = cancel.is_cancelled();

        if cancelled || reduced.is_err() {
            cells.unwind_interrupted(&column_id);
        }

        let persisted = self.flush(run_id, cells).await;
        publish(&progress_tx, &aggregator, cells, &column_id, true);

        if let Err(e) = reduced {
            log_error("compute_engine", &e.to_string(), Some(&run_id.to_string()));
            return Err(e);
        }

        let progress = cells.progress(&column_id).unwrap_or_default();
        let outcome = RunOutcome {
            run_id,
            column_id,
            progress,
            results,
            cancelled,
            vacuous_rows: plan.vacuous_rows,
            warnings: plan.warnings,
            persisted,
            elapsed: started_at.elapsed(),
        };

        log_run_operation(
            "run_finished",
            run_id,
            &outcome.column_id,
            if cancelled { "stopped" } else { "complete" },
            Some(&format!(
                "done={} failed={} queued={} elapsed_ms={}",
                progress.done,
                progress.failed,
                progress.queued,
                outcome.elapsed.as_millis()
            )),
        );

        Ok(outcome)
    }

    /// Single writer for the run: applies events until the scheduler hangs up
    async fn reduce(
        &self,
        run_id: Uuid,
        column_id: &str,
        mut events: mpsc::UnboundedReceiver<ComputeEvent>,
        cells: &mut CellStateStore,
        aggregator: &ProgressAggregator,
        progress_tx: &watch::Sender<Option<ProgressSnapshot>>,
    ) -> Result<()> {
        let flush_every = self.run_config.flush_every.max(1);
        let mut since_flush = 0usize;

        let mut ticker = tokio::time::interval(self.run_config.progress_tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires immediately; the opening snapshot is already out
        ticker.tick().await;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    cells.handle_event(&event)?;

                    if let ComputeEvent::Finished(result) = &event {
                        debug!(
                            run_id = %run_id,
                            row_id = %result.row_id,
                            success = result.is_success(),
                            "Result applied"
                        );
                        since_flush += 1;
                        if since_flush >= flush_every {
                            since_flush = 0;
                            self.flush(run_id, cells).await;
                        }
                    }
                }
                _ = ticker.tick() => {
                    publish(progress_tx, aggregator, cells, column_id, false);
                }
            }
        }

        Ok(())
    }

    /// Persist the whole sheet; failures are logged, never fatal to the run
    async fn flush(&self, run_id: Uuid, cells: &CellStateStore) -> bool {
        match self.sheet_store.save(cells.sheet()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    run_id = %run_id,
                    store = self.sheet_store.name(),
                    error = %e,
                    "Sheet flush failed"
                );
                false
            }
        }
    }

    /// Render one row's prompt with the column's effective parameters
    pub fn preview(&self, sheet: &Sheet, column_id: &str, row_id: &str) -> Result<PromptPreview> {
        let builder = TaskBuilder::new(&self.settings);
        let (column, formula) = builder.prepare_column(sheet, column_id)?;
        let row = sheet
            .row(row_id)
            .ok_or_else(|| TabulaError::unknown_row(row_id))?;

        let catalog = ColumnCatalog::from_columns(&sheet.columns);
        let output = render(
            &formula.template,
            row,
            &catalog,
            self.settings.max_input_chars(),
        );

        Ok(PromptPreview {
            row_id: row.id.clone(),
            column_id: column.id.clone(),
            vacuous: output.is_blank(),
            params: resolve_model_params(&formula.options, column, &self.settings),
            rendered: output.rendered,
            warnings: output.warnings,
        })
    }
}

fn publish(
    progress_tx: &watch::Sender<Option<ProgressSnapshot>>,
    aggregator: &ProgressAggregator,
    cells: &CellStateStore,
    column_id: &str,
    finished: bool,
) {
    if let Some(progress) = cells.progress(column_id) {
        progress_tx.send_replace(Some(aggregator.snapshot(progress, finished)));
    }
}

//! # Compute Orchestration
//!
//! Batch computation of AI columns.
//!
//! ## Core Components
//!
//! - **TaskBuilder**: parses a column formula and turns selected rows into `ComputeTask`s
//! - **CompletionClient**: resolves one task against a chat-completion backend
//! - **BatchScheduler**: bounded-concurrency dispatch emitting `ComputeEvent`s
//! - **CellStateStore**: single-writer reducer over the sheet and per-column progress
//! - **ProgressAggregator**: percent complete and ETA for progress snapshots
//! - **ComputeEngine**: the run lifecycle tying the above together
//!
//! ## Data flow
//!
//! ```text
//! Sheet ─▶ TaskBuilder ─▶ TaskPlan ─▶ BatchScheduler ─▶ CompletionClient
//!                                          │
//!                                  ComputeEvent channel
//!                                          ▼
//!                        CellStateStore ─▶ SheetStore (periodic + final flush)
//! ```

pub mod batch_scheduler;
pub mod cell_state_store;
pub mod completion_client;
pub mod compute_engine;
pub mod progress;
pub mod task_builder;

pub use batch_scheduler::{BatchScheduler, ComputeEvent, SchedulerConfig};
pub use cell_state_store::CellStateStore;
pub use completion_client::{ChatCompletionClient, CompletionClient};
pub use compute_engine::{
    ComputeEngine, ComputeRun, PromptPreview, RunHandle, RunOutcome, RunTarget,
};
pub use progress::{ProgressAggregator, ProgressSnapshot};
pub use task_builder::{
    resolve_model_params, EffectiveModelParams, RowSelection, TaskBuilder, TaskPlan,
};

#![allow(clippy::doc_markdown)] // Allow technical terms like OpenAI, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tabula Core
//!
//! Batch compute engine for spreadsheet AI columns.
//!
//! ## Overview
//!
//! An AI column is defined by a formula such as
//! `=AI("Summarize {{Notes}} for {{Name}}", {"temperature":0.2})`. Computing the
//! column renders the template against each selected row, sends every non-blank
//! prompt to a chat-completion endpoint with bounded concurrency, and writes the
//! answers back into the sheet while tracking per-cell state and per-column
//! progress.
//!
//! ## Cell lifecycle
//!
//! `idle → queued → running → {done, error}`; retries go `error → queued`; a stop
//! returns `running` and `queued` cells to `queued`. Every transition goes through
//! [`state_machine::transition`].
//!
//! ## Module Organization
//!
//! - [`models`] - Sheet, columns, rows, tasks, results, progress
//! - [`state_machine`] - Cell states, events, and the transition table
//! - [`template`] - Formula parser and placeholder renderer
//! - [`orchestration`] - Task building, scheduling, state reduction, run lifecycle
//! - [`persistence`] - Sheet stores used for periodic and final flushes
//! - [`config`] - Layered settings (defaults, file, environment)
//! - [`logging`] - Structured logging setup and helpers
//! - [`error`] - Crate error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tabula_core::config::ConfigLoader;
//! use tabula_core::models::{Column, Row, Sheet};
//! use tabula_core::orchestration::{CellStateStore, ComputeEngine, RowSelection};
//! use tabula_core::persistence::InMemorySheetStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! tabula_core::logging::init_structured_logging();
//! let config = ConfigLoader::new().load()?;
//!
//! let sheet = Sheet::new("s1", "Contacts")
//!     .with_columns(vec![
//!         Column::text("name", "Name"),
//!         Column::ai("greeting", "Greeting", r#"=AI("Say hi to {{Name}}")"#),
//!     ])
//!     .with_rows(vec![Row::new("r1").with_value("name", "Ann")]);
//!
//! let engine = ComputeEngine::from_config(&config, Arc::new(InMemorySheetStore::new()))?;
//! let mut cells = CellStateStore::new(sheet);
//! let outcome = engine.run(&mut cells, "Greeting", RowSelection::All).await?;
//! println!("{} of {} cells done", outcome.progress.done, outcome.progress.total);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod state_machine;
pub mod template;

pub use config::{ComputeSettings, ConfigLoader, TabulaConfig};
pub use error::{Result, TabulaError};
pub use models::{
    CellMeta, CellValue, Column, ColumnKind, ComputeProgress, ComputeResult, ComputeTask,
    ModelConfig, Row, Sheet,
};
pub use orchestration::{
    CellStateStore, ComputeEngine, RowSelection, RunHandle, RunOutcome,
};
pub use persistence::{InMemorySheetStore, JsonFileSheetStore, SheetStore};
pub use state_machine::{CellEvent, CellState};

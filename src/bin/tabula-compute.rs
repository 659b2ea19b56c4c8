//! # Tabula Compute CLI
//!
//! Run an AI column of a JSON sheet file against the configured completion
//! endpoint, or inspect the effective configuration.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tabula_core::config::ConfigLoader;
use tabula_core::orchestration::{CellStateStore, ComputeEngine, ProgressSnapshot, RowSelection};
use tabula_core::persistence::JsonFileSheetStore;
use tabula_core::TabulaConfig;
use tracing::error;

#[derive(Parser)]
#[command(name = "tabula-compute")]
#[command(about = "Compute spreadsheet AI columns")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (defaults to $TABULA_CONFIG or ./tabula.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate configuration, then print it with secrets masked
    ValidateConfig,

    /// Compute one AI column and save the sheet back in place
    Run {
        /// Sheet JSON file
        #[arg(short, long)]
        sheet: PathBuf,

        /// Column id or display name
        #[arg(long)]
        column: String,

        /// Row selection: all, unprocessed, retry, force-all
        #[arg(short, long, default_value = "unprocessed")]
        mode: String,
    },

    /// Show the prompt one row would send, without sending it
    Preview {
        #[arg(short, long)]
        sheet: PathBuf,

        #[arg(long)]
        column: String,

        /// Row id
        #[arg(long)]
        row: String,
    },
}

#[tokio::main]
async fn main() {
    tabula_core::logging::init_structured_logging();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::ValidateConfig => validate_config(&cli),
        Commands::Run {
            sheet,
            column,
            mode,
        } => run_column(&cli, sheet, column, mode).await,
        Commands::Preview { sheet, column, row } => preview_row(&cli, sheet, column, row).await,
    };

    if let Err(e) = result {
        error!(error = %e, "tabula-compute failed");
        eprintln!("❌ {e:#}");
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<TabulaConfig> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_file(path),
        None => ConfigLoader::new(),
    };
    loader.load().context("failed to load configuration")
}

fn validate_config(cli: &Cli) -> anyhow::Result<()> {
    println!("🔧 Validating Tabula Configuration");
    let config = load_config(cli)?;
    println!("✅ Configuration loaded and validated");
    println!("{}", serde_json::to_string_pretty(&config.sanitized())?);
    if !config.completion.has_credential() {
        println!("⚠️  No API key configured: every task will fail until one is set");
    }
    Ok(())
}

async fn run_column(
    cli: &Cli,
    sheet_path: &Path,
    column: &str,
    mode: &str,
) -> anyhow::Result<()> {
    let selection: RowSelection = mode.parse()?;
    let config = load_config(cli)?;

    let sheet_store = Arc::new(JsonFileSheetStore::new(sheet_path));
    let sheet = sheet_store
        .load()
        .await
        .with_context(|| format!("failed to load sheet {}", sheet_path.display()))?;
    let mut cells = CellStateStore::new(sheet);

    let engine = ComputeEngine::from_config(&config, sheet_store)?;
    let run = engine.prepare(column, selection);
    let handle = run.handle();

    let stopper = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n⏹  Stopping run...");
            stopper.stop();
        }
    });

    let mut progress_rx = handle.progress();
    let reporter = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let snapshot = progress_rx.borrow_and_update().clone();
            if let Some(snapshot) = snapshot {
                print_progress(&snapshot);
            }
        }
    });

    let outcome = engine.execute(run, &mut cells).await?;
    let _ = reporter.await;

    for warning in outcome.warnings.iter() {
        println!("⚠️  {warning}");
    }
    let progress = outcome.progress;
    println!(
        "{} {} done, {} failed, {} queued of {} ({} ms)",
        if outcome.cancelled { "⏹ " } else { "✅" },
        progress.done,
        progress.failed,
        progress.queued,
        progress.total,
        outcome.elapsed.as_millis()
    );

    if !outcome.persisted {
        bail!("results were computed but the sheet could not be saved");
    }
    Ok(())
}

async fn preview_row(
    cli: &Cli,
    sheet_path: &Path,
    column: &str,
    row: &str,
) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let sheet_store = Arc::new(JsonFileSheetStore::new(sheet_path));
    let sheet = sheet_store.load().await?;

    let engine = ComputeEngine::from_config(&config, sheet_store)?;
    let preview = engine.preview(&sheet, column, row)?;
    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(())
}

fn print_progress(snapshot: &ProgressSnapshot) {
    let progress = snapshot.progress;
    let eta = snapshot
        .eta
        .map(|eta| format!("{:.1}s", eta.as_secs_f64()))
        .unwrap_or_else(|| "--".to_string());
    println!(
        "[{:>3}%] {} done, {} failed, {} running, {} queued | eta {}",
        snapshot.percent_complete,
        progress.done,
        progress.failed,
        progress.running,
        progress.queued,
        eta
    );
}

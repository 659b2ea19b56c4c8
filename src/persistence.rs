//! # Sheet Persistence
//!
//! The store a run flushes to: periodically while results arrive and once at the
//! end of every run. Saves are whole-sheet idempotent upserts; the engine never
//! reads back mid-run.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::error::{Result, TabulaError};
use crate::models::Sheet;

#[async_trait]
pub trait SheetStore: Send + Sync + 'static {
    async fn save(&self, sheet: &Sheet) -> Result<()>;

    fn name(&self) -> &str;
}

/// Keeps the latest saved sheet in memory
///
/// ```rust
/// use tabula_core::models::Sheet;
/// use tabula_core::persistence::{InMemorySheetStore, SheetStore};
///
/// # tokio_test::block_on(async {
/// let store = InMemorySheetStore::new();
/// store.save(&Sheet::new("s1", "Contacts")).await.unwrap();
/// assert_eq!(store.save_count(), 1);
/// assert_eq!(store.latest().map(|sheet| sheet.name), Some("Contacts".to_string()));
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemorySheetStore {
    latest: Mutex<Option<Sheet>>,
    saves: AtomicUsize,
}

impl InMemorySheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Sheet> {
        self.latest.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SheetStore for InMemorySheetStore {
    async fn save(&self, sheet: &Sheet) -> Result<()> {
        *self.latest.lock() = Some(sheet.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

/// One sheet per JSON file, replaced atomically on each save
#[derive(Debug, Clone)]
pub struct JsonFileSheetStore {
    path: PathBuf,
}

impl JsonFileSheetStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Sheet> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            TabulaError::PersistenceError(format!(
                "Failed to read sheet '{}': {e}",
                self.path.display()
            ))
        })?;
        let sheet = serde_json::from_slice(&bytes)?;
        Ok(sheet)
    }

    fn temp_path(&self) -> PathBuf {
        let mut file_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        file_name.push(".tmp");
        self.path.with_file_name(file_name)
    }
}

#[async_trait]
impl SheetStore for JsonFileSheetStore {
    async fn save(&self, sheet: &Sheet) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(sheet)?;
        let temp_path = self.temp_path();

        tokio::fs::write(&temp_path, &bytes).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        debug!(
            path = %self.path.display(),
            bytes = bytes.len(),
            rows = sheet.rows.len(),
            "Sheet saved"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "json_file"
    }
}

//! # Progress Aggregator
//!
//! Derives display figures from a column's [`ComputeProgress`]. The engine
//! samples on a fixed wall-clock tick rather than per event, so snapshot cost
//! is independent of task throughput.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::models::{ColumnId, ComputeProgress};

/// Point-in-time view of one column's run, published to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub column_id: ColumnId,
    pub progress: ComputeProgress,
    /// `round(100 * (done + failed) / total)`; 100 for an empty run
    pub percent_complete: u8,
    /// Remaining time at the observed rate; unknown until something completes
    pub eta: Option<Duration>,
    pub elapsed: Duration,
    /// True on the final snapshot of a run
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    column_id: ColumnId,
    started_at: Instant,
}

impl ProgressAggregator {
    pub fn new(column_id: impl Into<ColumnId>) -> Self {
        Self::started_at(column_id, Instant::now())
    }

    pub fn started_at(column_id: impl Into<ColumnId>, started_at: Instant) -> Self {
        Self {
            column_id: column_id.into(),
            started_at,
        }
    }

    pub fn snapshot(&self, progress: ComputeProgress, finished: bool) -> ProgressSnapshot {
        self.snapshot_at(progress, finished, Instant::now())
    }

    pub fn snapshot_at(
        &self,
        progress: ComputeProgress,
        finished: bool,
        now: Instant,
    ) -> ProgressSnapshot {
        let elapsed = now.saturating_duration_since(self.started_at);
        ProgressSnapshot {
            column_id: self.column_id.clone(),
            progress,
            percent_complete: percent_complete(&progress),
            eta: estimate_remaining(&progress, elapsed),
            elapsed,
            finished,
        }
    }
}

pub fn percent_complete(progress: &ComputeProgress) -> u8 {
    if progress.total == 0 {
        return 100;
    }
    let ratio = progress.completed() as f64 / progress.total as f64;
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

/// `elapsed / completed * remaining`
pub fn estimate_remaining(progress: &ComputeProgress, elapsed: Duration) -> Option<Duration> {
    let completed = progress.completed();
    if completed == 0 {
        return None;
    }
    let per_cell = elapsed.as_secs_f64() / completed as f64;
    Some(Duration::from_secs_f64(per_cell * progress.remaining() as f64))
}

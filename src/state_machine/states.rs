use serde::{Deserialize, Serialize};
use std::fmt;

/// Computation state of a single (row, column) cell
///
/// ```text
/// idle → queued → running → {done, error}
/// error → queued (retry)
/// running/queued → queued (run stopped)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    /// Never requested, or manually cleared
    #[default]
    Idle,
    /// Work was requested but has not completed
    Queued,
    /// A completion request is in flight
    Running,
    /// Holds a computed value (possibly empty)
    Done,
    /// Last attempt failed; the message lives in `CellMeta::error`
    Error,
}

impl CellState {
    /// Check if this is a terminal state for a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Check if a completion is in flight for this cell
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if work was requested but not finished
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for CellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for CellState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid cell state: {s}")),
        }
    }
}

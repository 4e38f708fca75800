//! Print task state as reported by the device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of the current print task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrintState {
    /// No task running
    Idle,
    /// Task is printing
    Working,
    /// Task paused by the user or the device
    Paused,
    /// Task completed
    Finished,
    /// Task aborted with an error
    Failed,
}

impl PrintState {
    /// Numeric code used on the wire
    pub fn code(self) -> i32 {
        match self {
            PrintState::Idle => 0,
            PrintState::Working => 1,
            PrintState::Paused => 2,
            PrintState::Finished => 3,
            PrintState::Failed => 4,
        }
    }

    /// Parse a wire code; unknown codes yield `None`
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PrintState::Idle),
            1 => Some(PrintState::Working),
            2 => Some(PrintState::Paused),
            3 => Some(PrintState::Finished),
            4 => Some(PrintState::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PrintState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrintState::Idle => write!(f, "idle"),
            PrintState::Working => write!(f, "working"),
            PrintState::Paused => write!(f, "paused"),
            PrintState::Finished => write!(f, "finished"),
            PrintState::Failed => write!(f, "failed"),
        }
    }
}

/// Raw task stage number reported by the device.
///
/// Stages are ordered; everything from `WORKING` upward counts as printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrintStage(pub i32);

impl PrintStage {
    /// First stage at which a task is considered to be printing
    pub const WORKING: PrintStage = PrintStage(1);

    /// Whether this stage means a print is under way
    pub fn is_printing(self) -> bool {
        self >= Self::WORKING
    }
}

/// One observed print-state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// Previous state, `None` before the first report
    pub from: Option<PrintState>,
    /// Newly reported state
    pub to: PrintState,
    /// When the report was mirrored
    pub at: DateTime<Utc>,
}

impl std::fmt::Display for StateTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.from {
            Some(from) => write!(f, "{} -> {}", from, self.to),
            None => write!(f, "(none) -> {}", self.to),
        }
    }
}

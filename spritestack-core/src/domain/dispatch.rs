//! Dispatch outcome types

use std::fmt;

/// Exit status reported upstream when the agent could not be started
///
/// Negative so it can never collide with a real process exit code.
pub const FAILED_TO_START_EXIT_STATUS: i32 = -1;

/// Terminal result of one dispatch attempt sequence for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The agent process was started on a node
    Dispatched { node: String, attempts: u32 },

    /// The agent could not be started; the job was reported upstream
    Failed {
        exit_status: i32,
        detail: String,
        attempts: u32,
    },
}

impl DispatchOutcome {
    pub fn failed(detail: impl Into<String>, attempts: u32) -> Self {
        Self::Failed {
            exit_status: FAILED_TO_START_EXIT_STATUS,
            detail: detail.into(),
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Dispatched { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            DispatchOutcome::Dispatched { attempts, .. } => *attempts,
            DispatchOutcome::Failed { attempts, .. } => *attempts,
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Dispatched { node, attempts } => {
                write!(f, "dispatched to {} after {} attempt(s)", node, attempts)
            }
            DispatchOutcome::Failed {
                exit_status,
                detail,
                attempts,
            } => write!(
                f,
                "failed after {} attempt(s) (exit status {}): {}",
                attempts, exit_status, detail
            ),
        }
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetKind {
    Rounds,
    Time,
}

impl std::fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rounds => write!(f, "rounds"),
            Self::Time => write!(f, "time"),
        }
    }
}

/// Error taxonomy of the orchestration engine. The first four are fed back to
/// the model as tool-result content and never abort a turn; the last three
/// decide the turn's terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineError {
    #[error("action blocked by policy: {reason}")]
    PolicyDenied { reason: String },
    #[error("the user declined to run {tool}")]
    ConfirmationDenied { tool: String },
    #[error("tool execution failed: {message}")]
    ToolExecutionFailed { message: String, retryable: bool },
    #[error("the target application could not be kept in the foreground")]
    ForegroundLockFailed,
    #[error("model client unavailable: {reason}")]
    ModelClientUnavailable { reason: String },
    #[error("budget exceeded: {0}")]
    BudgetExceeded(BudgetKind),
    #[error("stopped by the kill switch")]
    Cancelled,
}

impl EngineError {
    /// Whether the model gets to see this failure and re-plan around it.
    pub fn feeds_back_to_model(&self) -> bool {
        matches!(
            self,
            Self::PolicyDenied { .. }
                | Self::ConfirmationDenied { .. }
                | Self::ToolExecutionFailed { .. }
                | Self::ForegroundLockFailed
        )
    }
}

use agent_policy::{AutonomyLevel, ProposedAction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ui_control::ControlPath;

use crate::error::EngineError;

/// Terminal outcome of a turn. Exactly one is assigned when the loop exits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed,
    Stopped,
    Failed { error: EngineError },
    TimedOut,
}

impl TurnOutcome {
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::TimedOut)
    }
}

/// Phase of the orchestrator state machine, recorded for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    Understanding,
    Planning,
    Executing,
    Verifying,
    Responding,
    Failed,
    Stopped,
}

/// One entry of the conversation the model sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User { content: String },
    Assistant { content: String },
    ToolResult {
        tool: String,
        success: bool,
        content: Value,
    },
}

/// What was sent to the model for one round, kept with the round record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub message_count: usize,
    pub tool_count: usize,
    /// Autonomy level captured at round start; the gate never sees a newer one
    /// for this round.
    pub autonomy: AutonomyLevel,
}

/// Result of executing (or refusing to execute) one proposed action.
/// Immutable once appended to its round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: ProposedAction,
    pub success: bool,
    /// Result payload on success, the failure description otherwise.
    pub payload: Value,
    /// Error kind on failure.
    pub error: Option<EngineError>,
    /// Which control path carried a UI interaction.
    pub control_path: Option<ControlPath>,
    pub duration_ms: u64,
}

impl ActionOutcome {
    pub fn succeeded(action: ProposedAction, payload: Value, duration_ms: u64) -> Self {
        Self {
            action,
            success: true,
            payload,
            error: None,
            control_path: None,
            duration_ms,
        }
    }

    pub fn failed(action: ProposedAction, error: EngineError, duration_ms: u64) -> Self {
        let payload = Value::String(error.to_string());
        Self {
            action,
            success: false,
            payload,
            error: Some(error),
            control_path: None,
            duration_ms,
        }
    }

    pub fn with_control_path(mut self, path: ControlPath) -> Self {
        self.control_path = Some(path);
        self
    }
}

/// One model-request/tool-execution cycle within a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub sequence: u32,
    pub request: RequestSnapshot,
    pub proposed: Vec<ProposedAction>,
    pub outcomes: Vec<ActionOutcome>,
}

/// One full user-request-to-final-reply cycle. Owned exclusively by the
/// orchestrator while open; read-only for everyone afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub id: u64,
    pub input: String,
    pub rounds: Vec<Round>,
    pub outcome: TurnOutcome,
    /// The reply surfaced to the user. Always states which outcome occurred.
    pub reply: String,
}

impl Turn {
    pub fn outcome(&self) -> &TurnOutcome {
        &self.outcome
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }
}

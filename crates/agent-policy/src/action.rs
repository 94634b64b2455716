use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A candidate tool call emitted by the model. Immutable once created; the
/// gate judges it, the orchestrator executes it, nobody rewrites it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub tool: String,
    pub arguments: Value,
    /// Sequence number of the round that proposed this action.
    pub round: u32,
}

impl ProposedAction {
    pub fn new(tool: impl Into<String>, arguments: Value, round: u32) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            round,
        }
    }

    /// Short human-readable form used in confirmation prompts and audit records.
    pub fn describe(&self) -> String {
        format!(
            "{} {}",
            self.tool,
            serde_json::to_string(&self.arguments).unwrap_or_default()
        )
    }
}

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failure reported by a tool executor. `retryable` tells the model whether
/// proposing the same call again could ever help.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ToolFailure {
    pub message: String,
    pub retryable: bool,
}

impl ToolFailure {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// One concrete tool behind a catalog entry. Executors are black boxes: they
/// never see orchestrator state, only their own argument map.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, arguments: Value) -> Result<Value, ToolFailure>;
}

use agent_policy::ToolDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::turn::Message;

/// Sampling options forwarded to whichever backend serves the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            max_tokens: Some(768),
        }
    }
}

/// Everything the model needs for one round: instructions, the tool surface,
/// and the trailing conversation window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnContext {
    pub system_prompt: String,
    pub tools: Vec<ToolDescriptor>,
    pub messages: Vec<Message>,
    pub options: ModelOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// One piece of a model reply. The orchestrator partitions these into
/// buffered text and proposed actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyItem {
    Text { content: String },
    ToolCall { name: String, arguments: Value },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelReply {
    pub items: Vec<ReplyItem>,
    #[serde(default)]
    pub usage: ModelUsage,
}

impl ModelReply {
    pub fn from_items(items: Vec<ReplyItem>) -> Self {
        Self {
            items,
            usage: ModelUsage::default(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::from_items(vec![ReplyItem::Text {
            content: content.into(),
        }])
    }

    pub fn has_tool_calls(&self) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item, ReplyItem::ToolCall { .. }))
    }
}

/// Why a model call failed. Unavailable and Unauthorized abort the turn;
/// the rest are retried a bounded number of times within the round.
#[derive(Debug, Clone, Error)]
pub enum ModelClientError {
    #[error("model backend unavailable: {0}")]
    Unavailable(String),
    #[error("model backend rejected credentials: {0}")]
    Unauthorized(String),
    #[error("transient model failure: {0}")]
    Retryable(String),
    #[error("model reply could not be parsed: {0}")]
    Malformed(String),
}

impl ModelClientError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Unauthorized(_))
    }
}

/// Narrow seam to whichever inference backend serves the companion. The
/// orchestrator never learns whether the transport is HTTP, IPC, or an
/// in-process runtime.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn send(&self, context: &TurnContext) -> Result<ModelReply, ModelClientError>;
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::intent::{ElementQuery, UiIntent};

/// Failure of a single strategy attempt. Collected into the selector's report
/// so the caller can see why a fallback was taken.
#[derive(Debug, Clone, Error)]
pub enum StrategyError {
    #[error("element not found in accessibility tree: {0}")]
    ElementNotFound(String),
    #[error("no usable accessibility tree for {app}")]
    TreeUnavailable { app: String },
    #[error("no documented shortcut for this effect")]
    NoShortcut,
    #[error("vision model could not locate the target: {0}")]
    TargetNotLocated(String),
    #[error("input driver failure: {0}")]
    Driver(String),
}

impl StrategyError {
    /// Failures that mean the tree itself is unusable for this element class,
    /// so retrying strategy (1) within the same turn is pointless.
    pub fn marks_tree_unusable(&self) -> bool {
        matches!(self, Self::ElementNotFound(_) | Self::TreeUnavailable { .. })
    }
}

/// A resolved element handle inside an accessibility snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxElement {
    /// Stable reference the platform walker can act on later.
    pub reference: String,
    pub role: String,
    pub label: String,
}

/// Flattened accessibility-tree snapshot for one application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AxSnapshot {
    pub app: String,
    pub elements: Vec<AxElement>,
}

impl AxSnapshot {
    pub fn resolve(&self, query: &ElementQuery) -> Option<&AxElement> {
        self.elements
            .iter()
            .find(|element| element.role == query.role && element.label == query.label)
    }
}

/// Accessibility-tree walker provided by the platform layer.
#[async_trait]
pub trait AccessibilityBridge: Send + Sync {
    async fn snapshot(&self, app: &str) -> Result<AxSnapshot, StrategyError>;
    /// Perform the element's native press action.
    async fn press(&self, element: &AxElement) -> Result<Value, StrategyError>;
    /// Replace the element's value with `text`.
    async fn set_value(&self, element: &AxElement, text: &str) -> Result<Value, StrategyError>;
    /// Textual readout of the app's visible content.
    async fn read(&self, app: &str) -> Result<Value, StrategyError>;
}

/// A documented keyboard shortcut, e.g. "cmd+shift+n".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutChord(pub String);

/// Lookup from (app, intended effect) to a documented shortcut, when one
/// exists. Purely a table; no key events leave this trait.
pub trait ShortcutRegistry: Send + Sync {
    fn shortcut_for(&self, app: &str, intent: &UiIntent) -> Option<ShortcutChord>;
}

/// Synthesizes pointer and keyboard events.
#[async_trait]
pub trait InputDriver: Send + Sync {
    async fn press_chord(&self, chord: &ShortcutChord) -> Result<Value, StrategyError>;
    async fn click_at(&self, point: ScreenPoint) -> Result<Value, StrategyError>;
    async fn type_at(&self, point: ScreenPoint, text: &str) -> Result<Value, StrategyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// Screenshot-plus-vision collaborator: captures the screen and asks a
/// vision-capable model where the target is. The slow, billed path.
#[async_trait]
pub trait ScreenOracle: Send + Sync {
    async fn locate(&self, app: &str, description: &str) -> Result<ScreenPoint, StrategyError>;
    async fn read(&self, app: &str) -> Result<Value, StrategyError>;
}

/// Frontmost-application queries and activation.
#[async_trait]
pub trait WindowServer: Send + Sync {
    async fn frontmost(&self) -> Result<String, StrategyError>;
    async fn activate(&self, app: &str) -> Result<(), StrategyError>;
}

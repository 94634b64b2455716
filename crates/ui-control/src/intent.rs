use serde::{Deserialize, Serialize};

/// The strategy that ultimately performed a UI interaction. Recorded on every
/// outcome for telemetry and fallback bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlPath {
    Accessibility,
    KeyboardShortcut,
    VisionPointer,
}

impl ControlPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accessibility => "accessibility",
            Self::KeyboardShortcut => "keyboard_shortcut",
            Self::VisionPointer => "vision_pointer",
        }
    }
}

/// Stable reference to a UI element: the role the accessibility tree reports
/// plus the visible label. The same pair doubles as the description handed to
/// the vision fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementQuery {
    pub role: String,
    pub label: String,
}

impl ElementQuery {
    pub fn new(role: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            label: label.into(),
        }
    }

    pub fn describe(&self) -> String {
        format!("{} \"{}\"", self.role, self.label)
    }
}

/// A UI-interaction tool call, decoded from the tool's argument map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UiIntent {
    Click { app: String, element: ElementQuery },
    TypeText {
        app: String,
        element: ElementQuery,
        text: String,
    },
    ReadScreen { app: String },
}

impl UiIntent {
    pub fn app(&self) -> &str {
        match self {
            Self::Click { app, .. } | Self::TypeText { app, .. } | Self::ReadScreen { app } => app,
        }
    }

    pub fn element(&self) -> Option<&ElementQuery> {
        match self {
            Self::Click { element, .. } | Self::TypeText { element, .. } => Some(element),
            Self::ReadScreen { .. } => None,
        }
    }

    /// Mutating intents are subject to the foreground lock; reads are not.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::ReadScreen { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Click { app, element } => format!("click {} in {}", element.describe(), app),
            Self::TypeText { app, element, text } => format!(
                "type {} chars into {} in {}",
                text.chars().count(),
                element.describe(),
                app
            ),
            Self::ReadScreen { app } => format!("read the screen of {}", app),
        }
    }
}

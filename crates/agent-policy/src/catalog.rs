use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::schema::{validate_arguments, SchemaViolation};

/// Declared blast radius of a tool. Drives the gate's tier rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Safe,
    Caution,
    Dangerous,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Caution => "caution",
            Self::Dangerous => "dangerous",
        }
    }
}

/// Capability family a tool belongs to. Scopes pre-authorize one family at a
/// time, so a file scope never widens into app control or screen access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityClass {
    FileManagement,
    AppControl,
    UiInteraction,
    ScreenCapture,
    Communication,
}

impl CapabilityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileManagement => "file_management",
            Self::AppControl => "app_control",
            Self::UiInteraction => "ui_interaction",
            Self::ScreenCapture => "screen_capture",
            Self::Communication => "communication",
        }
    }
}

/// Immutable description of a tool the agent may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
    pub risk_tier: RiskTier,
    pub capability: CapabilityClass,
    /// Routed through the control-path selector instead of a plain executor.
    #[serde(default)]
    pub ui_interaction: bool,
    /// Argument holding the action's target path, when the tool has one.
    /// Scope matching only applies to tools that declare this.
    #[serde(default)]
    pub path_argument: Option<String>,
    /// Invocation quota per turn. `None` means unlimited.
    #[serde(default)]
    pub max_calls_per_turn: Option<u32>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        risk_tier: RiskTier,
        capability: CapabilityClass,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            risk_tier,
            capability,
            ui_interaction: false,
            path_argument: None,
            max_calls_per_turn: None,
        }
    }

    pub fn ui_interaction(mut self) -> Self {
        self.ui_interaction = true;
        self
    }

    pub fn with_path_argument(mut self, argument: impl Into<String>) -> Self {
        self.path_argument = Some(argument.into());
        self
    }

    pub fn with_call_quota(mut self, max_calls_per_turn: u32) -> Self {
        self.max_calls_per_turn = Some(max_calls_per_turn);
        self
    }
}

/// Registry of tool descriptors. Built once at startup and read-only from
/// then on; everything above it (gate, orchestrator) borrows it.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ToolCatalog {
    tools: IndexMap<String, ToolDescriptor>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self {
            tools: IndexMap::new(),
        }
    }

    /// Catalog covering the companion's built-in desktop tools.
    pub fn with_desktop_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.register(ToolDescriptor::new(
            "app_open",
            "Launch or focus an application by name.",
            json!({
                "type": "object",
                "required": ["target"],
                "properties": {
                    "target": { "type": "string" }
                },
                "additionalProperties": false
            }),
            RiskTier::Safe,
            CapabilityClass::AppControl,
        ));
        catalog.register(ToolDescriptor::new(
            "file_search",
            "Search file names and contents under the user's home directory.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": { "type": "string" },
                    "path": { "type": "string" }
                },
                "additionalProperties": false
            }),
            RiskTier::Safe,
            CapabilityClass::FileManagement,
        ));
        catalog.register(
            ToolDescriptor::new(
                "file_move",
                "Move or rename a file.",
                json!({
                    "type": "object",
                    "required": ["path", "destination"],
                    "properties": {
                        "path": { "type": "string" },
                        "destination": { "type": "string" }
                    },
                    "additionalProperties": false
                }),
                RiskTier::Caution,
                CapabilityClass::FileManagement,
            )
            .with_path_argument("path"),
        );
        catalog.register(
            ToolDescriptor::new(
                "file_delete",
                "Delete a file. Irreversible.",
                json!({
                    "type": "object",
                    "required": ["path"],
                    "properties": {
                        "path": { "type": "string" }
                    },
                    "additionalProperties": false
                }),
                RiskTier::Dangerous,
                CapabilityClass::FileManagement,
            )
            .with_path_argument("path"),
        );
        catalog.register(
            ToolDescriptor::new(
                "ui_click",
                "Click a control in the frontmost application.",
                json!({
                    "type": "object",
                    "required": ["app", "element"],
                    "properties": {
                        "app": { "type": "string" },
                        "element": { "type": "object" }
                    },
                    "additionalProperties": false
                }),
                RiskTier::Caution,
                CapabilityClass::UiInteraction,
            )
            .ui_interaction(),
        );
        catalog.register(
            ToolDescriptor::new(
                "ui_type",
                "Type text into a control in the frontmost application.",
                json!({
                    "type": "object",
                    "required": ["app", "element", "text"],
                    "properties": {
                        "app": { "type": "string" },
                        "element": { "type": "object" },
                        "text": { "type": "string" }
                    },
                    "additionalProperties": false
                }),
                RiskTier::Caution,
                CapabilityClass::UiInteraction,
            )
            .ui_interaction(),
        );
        catalog.register(
            ToolDescriptor::new(
                "screen_read",
                "Read the visible content of an application window.",
                json!({
                    "type": "object",
                    "required": ["app"],
                    "properties": {
                        "app": { "type": "string" }
                    },
                    "additionalProperties": false
                }),
                RiskTier::Safe,
                CapabilityClass::ScreenCapture,
            )
            .ui_interaction(),
        );
        catalog
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) {
        self.tools.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Tier used by the gate. Unknown tools are judged as dangerous.
    pub fn risk_tier(&self, name: &str) -> RiskTier {
        self.tools
            .get(name)
            .map(|descriptor| descriptor.risk_tier)
            .unwrap_or(RiskTier::Dangerous)
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Check an argument map against the declared schema before anything else
    /// sees it. Unknown tools fail closed.
    pub fn validate_arguments(&self, name: &str, arguments: &Value) -> Result<(), SchemaViolation> {
        let Some(descriptor) = self.tools.get(name) else {
            return Err(SchemaViolation::UnknownTool {
                tool: name.to_string(),
            });
        };
        validate_arguments(&descriptor.input_schema, arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_is_judged_dangerous() {
        let catalog = ToolCatalog::with_desktop_defaults();
        assert_eq!(catalog.risk_tier("format_disk"), RiskTier::Dangerous);
    }

    #[test]
    fn desktop_defaults_expose_ui_tools() {
        let catalog = ToolCatalog::with_desktop_defaults();
        let click = catalog.get("ui_click").expect("ui_click registered");
        assert!(click.ui_interaction);
        assert_eq!(click.capability, CapabilityClass::UiInteraction);
        assert!(!catalog.get("app_open").unwrap().ui_interaction);
    }

    #[test]
    fn validates_arguments_against_declared_schema() {
        let catalog = ToolCatalog::with_desktop_defaults();
        assert!(catalog
            .validate_arguments("app_open", &json!({ "target": "Safari" }))
            .is_ok());
        assert!(catalog
            .validate_arguments("app_open", &json!({ "app": "Safari" }))
            .is_err());
        assert!(catalog
            .validate_arguments("no_such_tool", &json!({}))
            .is_err());
    }
}

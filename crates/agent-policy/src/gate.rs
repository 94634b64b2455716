use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::action::ProposedAction;
use crate::catalog::{RiskTier, ToolCatalog, ToolDescriptor};
use crate::sanitize::sanitize_arguments;
use crate::scope::{AutonomyLevel, Scope};

/// The decision for a single proposed action. Produced once per action and
/// never cached across autonomy-level changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum PolicyVerdict {
    Allow,
    RequireConfirmation { reason: String, risk: RiskTier },
    Deny { reason: String },
}

impl PolicyVerdict {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Autonomy level and scopes frozen at round start, so a settings change
/// mid-round cannot retroactively alter verdicts already computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PolicySnapshot {
    pub autonomy: AutonomyLevel,
    pub scopes: Vec<Scope>,
}

impl PolicySnapshot {
    pub fn new(autonomy: AutonomyLevel, scopes: Vec<Scope>) -> Self {
        Self { autonomy, scopes }
    }
}

/// Pure decision function over (action, autonomy level, scopes, risk tier).
/// No I/O, no side effects; argument content is data, never instructions.
pub struct PolicyGate {
    catalog: Arc<ToolCatalog>,
}

impl PolicyGate {
    pub fn new(catalog: Arc<ToolCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn evaluate(&self, action: &ProposedAction, snapshot: &PolicySnapshot) -> PolicyVerdict {
        // Sanitation pre-empts tier logic entirely: a high trust tier can
        // never reach around a failed check.
        if let Err(err) = sanitize_arguments(&action.arguments) {
            return PolicyVerdict::Deny {
                reason: err.to_string(),
            };
        }

        let Some(descriptor) = self.catalog.get(&action.tool) else {
            // Unknown tool: deny-by-default posture, judged as dangerous.
            return PolicyVerdict::RequireConfirmation {
                reason: format!("{} is not a known tool", action.tool),
                risk: RiskTier::Dangerous,
            };
        };

        match descriptor.risk_tier {
            RiskTier::Dangerous => PolicyVerdict::RequireConfirmation {
                reason: format!("{} is a dangerous action", action.tool),
                risk: RiskTier::Dangerous,
            },
            RiskTier::Safe => {
                if snapshot.autonomy >= AutonomyLevel::Guided {
                    PolicyVerdict::Allow
                } else {
                    PolicyVerdict::RequireConfirmation {
                        reason: "supervised mode confirms every action".to_string(),
                        risk: RiskTier::Safe,
                    }
                }
            }
            RiskTier::Caution => {
                if snapshot.autonomy >= AutonomyLevel::Trusted
                    && target_in_scope(descriptor, action, &snapshot.scopes)
                {
                    PolicyVerdict::Allow
                } else {
                    PolicyVerdict::RequireConfirmation {
                        reason: format!("{} is outside the pre-approved scopes", action.tool),
                        risk: RiskTier::Caution,
                    }
                }
            }
        }
    }
}

/// An action with no declared target, or a target matching no active scope,
/// is evaluated as if no scope existed.
fn target_in_scope(descriptor: &ToolDescriptor, action: &ProposedAction, scopes: &[Scope]) -> bool {
    let Some(argument) = descriptor.path_argument.as_deref() else {
        return false;
    };
    let Some(target) = action.arguments.get(argument).and_then(|v| v.as_str()) else {
        return false;
    };
    scopes
        .iter()
        .any(|scope| scope.covers(descriptor.capability, Path::new(target)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CapabilityClass;
    use serde_json::json;

    fn gate() -> PolicyGate {
        PolicyGate::new(Arc::new(ToolCatalog::with_desktop_defaults()))
    }

    fn broad_scopes() -> Vec<Scope> {
        vec![
            Scope::new(CapabilityClass::FileManagement, "/"),
            Scope::new(CapabilityClass::AppControl, "/"),
            Scope::new(CapabilityClass::UiInteraction, "/"),
            Scope::new(CapabilityClass::ScreenCapture, "/"),
        ]
    }

    #[test]
    fn dangerous_never_allows_at_any_level_or_scope() {
        let gate = gate();
        let action = ProposedAction::new("file_delete", json!({ "path": "/tmp/x" }), 0);
        for autonomy in AutonomyLevel::all() {
            for scopes in [Vec::new(), broad_scopes()] {
                let verdict = gate.evaluate(&action, &PolicySnapshot::new(autonomy, scopes));
                assert!(
                    matches!(
                        verdict,
                        PolicyVerdict::RequireConfirmation {
                            risk: RiskTier::Dangerous,
                            ..
                        }
                    ),
                    "dangerous tier escaped confirmation at {autonomy:?}: {verdict:?}"
                );
            }
        }
    }

    #[test]
    fn traversal_denies_regardless_of_tier() {
        let gate = gate();
        for tool in ["file_search", "file_move", "file_delete"] {
            let action = ProposedAction::new(
                tool,
                json!({ "path": "../../etc/passwd", "query": "x", "destination": "/tmp" }),
                0,
            );
            let snapshot = PolicySnapshot::new(AutonomyLevel::Autonomous, broad_scopes());
            assert!(
                matches!(gate.evaluate(&action, &snapshot), PolicyVerdict::Deny { .. }),
                "traversal not denied for {tool}"
            );
        }
    }

    #[test]
    fn evaluation_is_idempotent() {
        let gate = gate();
        let action = ProposedAction::new("app_open", json!({ "target": "Safari" }), 0);
        let snapshot = PolicySnapshot::new(AutonomyLevel::Guided, Vec::new());
        assert_eq!(
            gate.evaluate(&action, &snapshot),
            gate.evaluate(&action, &snapshot)
        );
    }

    #[test]
    fn safe_allows_at_level_one_and_confirms_at_level_zero() {
        let gate = gate();
        let action = ProposedAction::new("app_open", json!({ "target": "Safari" }), 0);
        let guided = PolicySnapshot::new(AutonomyLevel::Guided, Vec::new());
        assert_eq!(gate.evaluate(&action, &guided), PolicyVerdict::Allow);

        let supervised = PolicySnapshot::new(AutonomyLevel::Supervised, Vec::new());
        assert!(matches!(
            gate.evaluate(&action, &supervised),
            PolicyVerdict::RequireConfirmation {
                risk: RiskTier::Safe,
                ..
            }
        ));
    }

    #[test]
    fn caution_requires_trusted_level_and_matching_scope() {
        let gate = gate();
        let action = ProposedAction::new(
            "file_move",
            json!({ "path": "/home/sam/Downloads/a.txt", "destination": "/home/sam/Downloads/b.txt" }),
            0,
        );
        let in_scope = vec![Scope::new(
            CapabilityClass::FileManagement,
            "/home/sam/Downloads",
        )];

        let trusted = PolicySnapshot::new(AutonomyLevel::Trusted, in_scope.clone());
        assert_eq!(gate.evaluate(&action, &trusted), PolicyVerdict::Allow);

        // Right scope, insufficient level.
        let guided = PolicySnapshot::new(AutonomyLevel::Guided, in_scope);
        assert!(!gate.evaluate(&action, &guided).is_allow());

        // Right level, no covering scope.
        let elsewhere = PolicySnapshot::new(
            AutonomyLevel::Trusted,
            vec![Scope::new(CapabilityClass::FileManagement, "/home/sam/Desktop")],
        );
        assert!(!gate.evaluate(&action, &elsewhere).is_allow());

        // Right level and path, wrong capability class.
        let wrong_class = PolicySnapshot::new(
            AutonomyLevel::Trusted,
            vec![Scope::new(CapabilityClass::ScreenCapture, "/home/sam/Downloads")],
        );
        assert!(!gate.evaluate(&action, &wrong_class).is_allow());
    }

    #[test]
    fn unknown_tool_requires_confirmation_as_dangerous() {
        let gate = gate();
        let action = ProposedAction::new("disk_wipe", json!({}), 0);
        let snapshot = PolicySnapshot::new(AutonomyLevel::Autonomous, broad_scopes());
        assert!(matches!(
            gate.evaluate(&action, &snapshot),
            PolicyVerdict::RequireConfirmation {
                risk: RiskTier::Dangerous,
                ..
            }
        ));
    }
}

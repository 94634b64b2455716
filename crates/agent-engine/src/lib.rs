//! Orchestration engine for the Valet desktop companion. Drives the
//! turn loop against a language-model client, routes every proposed tool call
//! through the policy gate, executes what may run (UI interactions via the
//! control-path selector), and reports a terminal outcome for every turn.

pub mod audit;
pub mod cancel;
pub mod client;
pub mod confirm;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod settings;
pub mod turn;

pub use audit::{AuditEvent, AuditLedger, AuditSink, LedgerEntry, NullAuditSink};
pub use cancel::KillSwitch;
pub use client::{
    ModelClient, ModelClientError, ModelOptions, ModelReply, ModelUsage, ReplyItem, TurnContext,
};
pub use confirm::ConfirmationUi;
pub use error::{BudgetKind, EngineError};
pub use executor::{ToolExecutor, ToolFailure};
pub use orchestrator::{EngineConfig, Orchestrator, OrchestratorBuilder};
pub use settings::{capture_snapshot, InMemorySettings, SettingsStore};
pub use turn::{
    ActionOutcome, Message, RequestSnapshot, Round, Turn, TurnOutcome, TurnPhase,
};

// Re-exported so hosts can wire the engine without naming every crate.
pub use agent_policy::{
    AutonomyLevel, CapabilityClass, PolicyGate, PolicySnapshot, PolicyVerdict, ProposedAction,
    RiskTier, Scope, ToolCatalog, ToolDescriptor,
};
pub use ui_control::{ControlPath, ControlPathSelector};

/// Rounds per turn before the loop fails with a budget error.
pub const DEFAULT_MAX_ROUNDS: u32 = 10;

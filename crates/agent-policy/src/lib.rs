//! Policy layer for the Valet desktop companion: the immutable tool catalog,
//! user-granted scopes, argument sanitation, and the pure policy gate that
//! decides whether a proposed action may run.

pub mod action;
pub mod catalog;
pub mod gate;
pub mod sanitize;
pub mod schema;
pub mod scope;

pub use action::ProposedAction;
pub use catalog::{CapabilityClass, RiskTier, ToolCatalog, ToolDescriptor};
pub use gate::{PolicyGate, PolicySnapshot, PolicyVerdict};
pub use sanitize::{sanitize_arguments, SanitationError};
pub use schema::{validate_arguments, SchemaViolation};
pub use scope::{normalize_path, AutonomyLevel, Scope};

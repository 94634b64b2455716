use std::sync::RwLock;

use agent_policy::{AutonomyLevel, PolicySnapshot, Scope};

/// Read-only view of the user's autonomy level and pre-approved scopes. The
/// engine only ever reads; mutation belongs to the host's settings surface.
pub trait SettingsStore: Send + Sync {
    fn autonomy_level(&self) -> AutonomyLevel;
    fn scopes(&self) -> Vec<Scope>;
}

/// Freeze the settings for one round, so a mid-round change cannot
/// retroactively alter verdicts already computed.
pub fn capture_snapshot(store: &dyn SettingsStore) -> PolicySnapshot {
    PolicySnapshot::new(store.autonomy_level(), store.scopes())
}

/// Process-local settings store, used by hosts without a settings service and
/// throughout the engine's tests.
#[derive(Debug, Default)]
pub struct InMemorySettings {
    inner: RwLock<(AutonomyLevel, Vec<Scope>)>,
}

impl InMemorySettings {
    pub fn new(autonomy: AutonomyLevel, scopes: Vec<Scope>) -> Self {
        Self {
            inner: RwLock::new((autonomy, scopes)),
        }
    }

    pub fn set_autonomy_level(&self, autonomy: AutonomyLevel) {
        if let Ok(mut guard) = self.inner.write() {
            guard.0 = autonomy;
        }
    }

    pub fn add_scope(&self, scope: Scope) {
        if let Ok(mut guard) = self.inner.write() {
            guard.1.push(scope);
        }
    }
}

impl SettingsStore for InMemorySettings {
    fn autonomy_level(&self) -> AutonomyLevel {
        self.inner
            .read()
            .map(|guard| guard.0)
            .unwrap_or_default()
    }

    fn scopes(&self) -> Vec<Scope> {
        self.inner
            .read()
            .map(|guard| guard.1.clone())
            .unwrap_or_default()
    }
}

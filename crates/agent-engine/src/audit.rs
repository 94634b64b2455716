use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use ui_control::ControlPath;

use crate::turn::{TurnOutcome, TurnPhase};

/// Record handed to the audit sink. Everything the host needs to reconstruct
/// what the agent did, including side effects that survived a stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    TurnStarted {
        turn: u64,
        input: String,
    },
    PhaseChanged {
        turn: u64,
        phase: TurnPhase,
    },
    ActionRecorded {
        turn: u64,
        round: u32,
        tool: String,
        success: bool,
        control_path: Option<ControlPath>,
        duration_ms: u64,
        /// True when the action's side effects were applied and kept. Effects
        /// already committed before a stop are never rolled back, and the
        /// record must say so.
        side_effects_kept: bool,
    },
    RoundClosed {
        turn: u64,
        round: u32,
        proposed: usize,
        executed: usize,
    },
    TurnClosed {
        turn: u64,
        outcome: TurnOutcome,
    },
}

/// Fire-and-forget audit writer. Implementations must never block the loop
/// and must swallow their own failures.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Sink for hosts that do their own persistence elsewhere.
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) {}
}

/// Entry in the hash-chained ledger. Each entry is hashed independently and
/// contributes to the running root hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub event: AuditEvent,
    pub hash: String,
}

/// Content-addressed, append-only ledger over audit events. The root hash
/// changes whenever any entry is altered, so a host can detect tampering
/// with the action history.
#[derive(Debug, Default)]
pub struct AuditLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl AuditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn root_hash(&self) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| compute_root_hash(&entries))
    }

    pub fn compute_root_snapshot(entries: &[LedgerEntry]) -> Option<String> {
        compute_root_hash(entries)
    }
}

impl AuditSink for AuditLedger {
    fn record(&self, event: AuditEvent) {
        let payload = json!({
            "event": event,
            "index": self.entries.lock().map(|entries| entries.len()).unwrap_or(0),
        });
        let hash = hash_json(&payload);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LedgerEntry { event, hash });
        }
    }
}

fn compute_root_hash(entries: &[LedgerEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }

    let mut digest = Sha256::new();
    digest.update(b"agent-audit-v1");
    for entry in entries {
        digest.update(entry.hash.as_bytes());
    }
    Some(hex::encode(digest.finalize()))
}

fn hash_json(value: &serde_json::Value) -> String {
    let mut sha = Sha256::new();
    let serialized = serde_json::to_vec(value).unwrap_or_default();
    sha.update(serialized);
    hex::encode(sha.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(round: u32) -> AuditEvent {
        AuditEvent::ActionRecorded {
            turn: 1,
            round,
            tool: "app_open".into(),
            success: true,
            control_path: None,
            duration_ms: 12,
            side_effects_kept: true,
        }
    }

    #[test]
    fn root_hash_covers_every_entry() {
        let ledger = AuditLedger::new();
        assert!(ledger.root_hash().is_none());

        ledger.record(sample_event(0));
        ledger.record(sample_event(1));
        let root = ledger.root_hash().expect("two entries hashed");

        let snapshot = AuditLedger::compute_root_snapshot(&ledger.entries()).unwrap();
        assert_eq!(root, snapshot);
    }

    #[test]
    fn tampering_changes_the_root() {
        let ledger = AuditLedger::new();
        ledger.record(sample_event(0));
        let root = ledger.root_hash().unwrap();

        let mut entries = ledger.entries();
        entries[0].hash = "tampered".to_string();
        let tampered = AuditLedger::compute_root_snapshot(&entries).unwrap();
        assert_ne!(root, tampered);
    }

    #[test]
    fn identical_events_hash_to_distinct_entries() {
        let ledger = AuditLedger::new();
        ledger.record(sample_event(0));
        ledger.record(sample_event(0));
        let entries = ledger.entries();
        assert_ne!(entries[0].hash, entries[1].hash);
    }
}

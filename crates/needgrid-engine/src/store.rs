//! State and audit store: one live [`NeedState`] per key, an append-only
//! hash-chained [`NeedAudit`] ledger, and the signal read path used by
//! the aggregator.
//!
//! The engine never assumes a storage technology; it talks to the narrow
//! [`NeedStore`] trait. The in-memory implementation here backs tests and
//! small deployments, keeps stable query ordering, and links every audit
//! record to its predecessor with a SHA-256 content hash so the decision
//! trail is tamper-evident and replayable.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::aggregate::{DimensionScores, ThresholdFlags};
use crate::config::NeedEngineConfig;
use crate::guardrail::Guardrail;
use crate::propose::StatusProposal;
use crate::signal::Signal;
use crate::status::{NeedLevel, NeedStatus};

// ---------------------------------------------------------------------------
// NeedKey
// ---------------------------------------------------------------------------

/// Identity of one tracked (sector, capability) pair within an event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NeedKey {
    pub event_id: String,
    pub sector_id: String,
    pub capability_id: String,
}

impl NeedKey {
    pub fn new(
        event_id: impl Into<String>,
        sector_id: impl Into<String>,
        capability_id: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            sector_id: sector_id.into(),
            capability_id: capability_id.into(),
        }
    }
}

impl fmt::Display for NeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.event_id, self.sector_id, self.capability_id)
    }
}

// ---------------------------------------------------------------------------
// NeedState
// ---------------------------------------------------------------------------

/// The single live record per key. Scores are windowed sums recomputed on
/// every evaluation; the record is updated in place and never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeedState {
    pub key: NeedKey,
    pub scores: DimensionScores,
    pub consecutive_stabilization_windows: u32,
    pub current_status: NeedStatus,
    pub last_window_id: u64,
    /// Accumulated bottleneck notes from insufficiency evidence.
    pub operational_requirements: Vec<String>,
    /// Accumulated notes from fragility evidence.
    pub fragility_notes: Vec<String>,
    pub last_updated_at_ms: u64,
    pub last_status_change_at_ms: u64,
}

impl NeedState {
    /// State of a key that has never seen evidence: WHITE, all zero.
    pub fn initial(key: NeedKey, now_ms: u64) -> Self {
        Self {
            key,
            scores: DimensionScores::zero(),
            consecutive_stabilization_windows: 0,
            current_status: NeedStatus::White,
            last_window_id: 0,
            operational_requirements: Vec::new(),
            fragility_notes: Vec::new(),
            last_updated_at_ms: now_ms,
            last_status_change_at_ms: now_ms,
        }
    }

    /// Coarse level for the persisted row consumed by maps and queues.
    pub fn need_level(&self) -> NeedLevel {
        self.current_status.need_level()
    }
}

// ---------------------------------------------------------------------------
// NeedAudit
// ---------------------------------------------------------------------------

/// One immutable audit record per evaluation call: everything needed to
/// replay the decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeedAudit {
    pub key: NeedKey,
    pub window_id: u64,
    pub previous_status: NeedStatus,
    /// The proposer's raw proposal, before guardrail review.
    pub proposal: StatusProposal,
    pub final_status: NeedStatus,
    pub guardrails_applied: Vec<Guardrail>,
    pub proposal_was_legal_transition: bool,
    /// Why the advisory path fell back to the rule baseline, if it did.
    pub advisory_fallback: Option<String>,
    pub scores: DimensionScores,
    pub flags: ThresholdFlags,
    pub consecutive_stabilization_windows: u32,
    /// Exact configuration the evaluation ran with.
    pub config: NeedEngineConfig,
    pub evaluated_at_ms: u64,
    /// RFC 3339 rendering of `evaluated_at_ms`.
    pub recorded_at: String,
}

/// Stored audit record: the audit plus its position in the hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub audit: NeedAudit,
    pub previous_hash: Option<String>,
    pub record_hash: String,
}

/// Receipt returned by a successful audit append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReceipt {
    pub sequence: u64,
    pub record_hash: String,
}

#[derive(Serialize)]
struct AuditPreimage<'a> {
    sequence: u64,
    previous_hash: Option<&'a str>,
    audit: &'a NeedAudit,
}

fn audit_record_hash(
    sequence: u64,
    previous_hash: Option<&str>,
    audit: &NeedAudit,
) -> Result<String, StoreError> {
    let preimage = AuditPreimage {
        sequence,
        previous_hash,
        audit,
    };
    let bytes = serde_json::to_vec(&preimage).map_err(|err| StoreError::Serialization {
        detail: err.to_string(),
    })?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

// ---------------------------------------------------------------------------
// StoreError / NeedStore
// ---------------------------------------------------------------------------

/// Failures at the store boundary. Write failures are fatal to the
/// evaluation call that hit them: losing an audit record breaks the
/// explainability guarantee.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    LockPoisoned,
    #[error("could not serialize audit record: {detail}")]
    Serialization { detail: String },
    #[error("audit chain violation at sequence {sequence}")]
    AuditChainViolation { sequence: u64 },
    #[error("storage backend failure during {operation}: {detail}")]
    Backend { operation: String, detail: String },
}

/// Narrow repository interface the engine evaluates against.
pub trait NeedStore {
    /// Current state for a key, or `None` if the key was never evaluated.
    fn load_state(&self, key: &NeedKey) -> Result<Option<NeedState>, StoreError>;

    /// Insert or replace the live state for its key.
    fn upsert_state(&self, state: &NeedState) -> Result<(), StoreError>;

    /// Append one immutable audit record.
    fn append_audit(&self, audit: &NeedAudit) -> Result<AuditReceipt, StoreError>;

    /// Record incoming signals for a key. Content-identical signals are
    /// the same evidence item and must not be double-counted, so
    /// duplicates are skipped.
    fn record_signals(&self, key: &NeedKey, signals: &[Signal]) -> Result<(), StoreError>;

    /// Signals for a key within `[from_ms, to_ms]`, in stable
    /// (timestamp, quote) order.
    fn signals_in_window(
        &self,
        key: &NeedKey,
        from_ms: u64,
        to_ms: u64,
    ) -> Result<Vec<Signal>, StoreError>;
}

// ---------------------------------------------------------------------------
// InMemoryNeedStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreInner {
    states: BTreeMap<NeedKey, NeedState>,
    signals: BTreeMap<NeedKey, Vec<Signal>>,
    audits: Vec<AuditEntry>,
}

/// Mutex-guarded in-memory store with a hash-chained audit ledger.
#[derive(Debug, Default)]
pub struct InMemoryNeedStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryNeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// All audit entries, in append order.
    pub fn audits(&self) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.lock()?.audits.clone())
    }

    /// All live states, in key order.
    pub fn states(&self) -> Result<Vec<NeedState>, StoreError> {
        Ok(self.lock()?.states.values().cloned().collect())
    }

    /// Recompute every link of the audit chain and verify it.
    pub fn verify_audit_chain(&self) -> Result<(), StoreError> {
        let inner = self.lock()?;
        let mut previous_hash: Option<String> = None;
        for entry in &inner.audits {
            if entry.previous_hash != previous_hash {
                return Err(StoreError::AuditChainViolation {
                    sequence: entry.sequence,
                });
            }
            let recomputed =
                audit_record_hash(entry.sequence, entry.previous_hash.as_deref(), &entry.audit)?;
            if recomputed != entry.record_hash {
                return Err(StoreError::AuditChainViolation {
                    sequence: entry.sequence,
                });
            }
            previous_hash = Some(entry.record_hash.clone());
        }
        Ok(())
    }
}

impl NeedStore for InMemoryNeedStore {
    fn load_state(&self, key: &NeedKey) -> Result<Option<NeedState>, StoreError> {
        Ok(self.lock()?.states.get(key).cloned())
    }

    fn upsert_state(&self, state: &NeedState) -> Result<(), StoreError> {
        self.lock()?
            .states
            .insert(state.key.clone(), state.clone());
        Ok(())
    }

    fn append_audit(&self, audit: &NeedAudit) -> Result<AuditReceipt, StoreError> {
        let mut inner = self.lock()?;
        let sequence = inner.audits.len() as u64;
        let previous_hash = inner.audits.last().map(|entry| entry.record_hash.clone());
        let record_hash = audit_record_hash(sequence, previous_hash.as_deref(), audit)?;
        inner.audits.push(AuditEntry {
            sequence,
            audit: audit.clone(),
            previous_hash,
            record_hash: record_hash.clone(),
        });
        Ok(AuditReceipt {
            sequence,
            record_hash,
        })
    }

    fn record_signals(&self, key: &NeedKey, signals: &[Signal]) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let stored = inner.signals.entry(key.clone()).or_default();
        for signal in signals {
            if !stored.contains(signal) {
                stored.push(signal.clone());
            }
        }
        Ok(())
    }

    fn signals_in_window(
        &self,
        key: &NeedKey,
        from_ms: u64,
        to_ms: u64,
    ) -> Result<Vec<Signal>, StoreError> {
        let inner = self.lock()?;
        let mut matching: Vec<Signal> = inner
            .signals
            .get(key)
            .map(|stored| {
                stored
                    .iter()
                    .filter(|s| s.timestamp_ms >= from_ms && s.timestamp_ms <= to_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matching.sort_by(|a, b| {
            a.timestamp_ms
                .cmp(&b.timestamp_ms)
                .then_with(|| a.short_quote.cmp(&b.short_quote))
        });
        Ok(matching)
    }
}

// ---------------------------------------------------------------------------
// Mocks — failure injection around any store
// ---------------------------------------------------------------------------

/// Test helper store wrappers with per-operation failure injection.
pub mod mocks {
    use super::*;

    /// Wraps a store and fails selected operations, for exercising the
    /// write-failures-are-fatal contract.
    #[derive(Debug, Default)]
    pub struct FailingStore<S> {
        inner: S,
        fail_load_state: bool,
        fail_upsert_state: bool,
        fail_append_audit: bool,
        fail_record_signals: bool,
        fail_signals_in_window: bool,
    }

    impl<S: NeedStore> FailingStore<S> {
        pub fn wrap(inner: S) -> Self {
            Self {
                inner,
                fail_load_state: false,
                fail_upsert_state: false,
                fail_append_audit: false,
                fail_record_signals: false,
                fail_signals_in_window: false,
            }
        }

        pub fn fail_load_state(mut self) -> Self {
            self.fail_load_state = true;
            self
        }

        pub fn fail_upsert_state(mut self) -> Self {
            self.fail_upsert_state = true;
            self
        }

        pub fn fail_append_audit(mut self) -> Self {
            self.fail_append_audit = true;
            self
        }

        pub fn fail_record_signals(mut self) -> Self {
            self.fail_record_signals = true;
            self
        }

        pub fn fail_signals_in_window(mut self) -> Self {
            self.fail_signals_in_window = true;
            self
        }

        pub fn inner(&self) -> &S {
            &self.inner
        }

        fn injected(operation: &str) -> StoreError {
            StoreError::Backend {
                operation: operation.to_string(),
                detail: "injected failure".to_string(),
            }
        }
    }

    impl<S: NeedStore> NeedStore for FailingStore<S> {
        fn load_state(&self, key: &NeedKey) -> Result<Option<NeedState>, StoreError> {
            if self.fail_load_state {
                return Err(Self::injected("load_state"));
            }
            self.inner.load_state(key)
        }

        fn upsert_state(&self, state: &NeedState) -> Result<(), StoreError> {
            if self.fail_upsert_state {
                return Err(Self::injected("upsert_state"));
            }
            self.inner.upsert_state(state)
        }

        fn append_audit(&self, audit: &NeedAudit) -> Result<AuditReceipt, StoreError> {
            if self.fail_append_audit {
                return Err(Self::injected("append_audit"));
            }
            self.inner.append_audit(audit)
        }

        fn record_signals(&self, key: &NeedKey, signals: &[Signal]) -> Result<(), StoreError> {
            if self.fail_record_signals {
                return Err(Self::injected("record_signals"));
            }
            self.inner.record_signals(key, signals)
        }

        fn signals_in_window(
            &self,
            key: &NeedKey,
            from_ms: u64,
            to_ms: u64,
        ) -> Result<Vec<Signal>, StoreError> {
            if self.fail_signals_in_window {
                return Err(Self::injected("signals_in_window"));
            }
            self.inner.signals_in_window(key, from_ms, to_ms)
        }
    }
}

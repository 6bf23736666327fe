//! Evaluation entry point: orchestrates normalize → aggregate → propose →
//! guardrail → persist for one (sector, capability) key.
//!
//! Evaluation is a read-modify-write over [`NeedState`], so calls for the
//! same key are serialized behind a per-key mutex held across the whole
//! sequence; different keys evaluate fully in parallel. The engine holds
//! no other mutable state — every threshold and weight comes from the
//! injected [`NeedEngineConfig`], validated once at construction.
//!
//! Storage write failures are fatal to the call that hit them and surface
//! as [`EngineError::Store`]: a dropped audit record would break the
//! explainability guarantee. Advisory failures are never fatal; they fall
//! back to the rule baseline and are recorded in the audit.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate_window, DimensionScores, WindowAggregate};
use crate::config::{ConfigError, NeedEngineConfig};
use crate::guardrail::{apply_guardrails, Guardrail, GuardrailOutcome};
use crate::propose::{
    build_advisory_request, rule_baseline, validate_advisory_response, AdvisoryClient,
    StatusProposal,
};
use crate::signal::{normalize_batch, validate_vocabulary, NormalizerError, RawEvidence};
use crate::status::{NeedLevel, NeedStatus};
use crate::store::{NeedAudit, NeedKey, NeedState, NeedStore, StoreError};

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// One evaluation call, as submitted by collaborators over any transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub event_id: String,
    pub sector_id: String,
    pub capacity_type_id: String,
    pub signals: Vec<RawEvidence>,
    /// Seeds the previous status for a key with no stored state.
    pub previous_status: Option<NeedStatus>,
    /// Evaluation instant; the trailing window ends here.
    pub now_ms: u64,
}

/// The evaluation result returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub status: NeedStatus,
    pub need_level: NeedLevel,
    pub reasoning: String,
    pub scores: DimensionScores,
    pub guardrails_applied: Vec<Guardrail>,
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Failures surfaced by [`NeedLevelEngine::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid engine configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid evidence vocabulary: {0}")]
    Vocabulary(#[from] NormalizerError),
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("evaluation lock poisoned for key {key}")]
    KeyLockPoisoned { key: String },
}

// ---------------------------------------------------------------------------
// NeedLevelEngine
// ---------------------------------------------------------------------------

/// The shared, configuration-driven evaluation engine. One instance is
/// injected everywhere evaluation is needed; threshold drift between call
/// sites is impossible by construction.
#[derive(Debug)]
pub struct NeedLevelEngine<S: NeedStore> {
    store: S,
    config: NeedEngineConfig,
    advisory: Option<Box<dyn AdvisoryClient>>,
    key_locks: Mutex<BTreeMap<NeedKey, Arc<Mutex<()>>>>,
}

impl<S: NeedStore> NeedLevelEngine<S> {
    /// Build an engine over a store with a validated configuration and no
    /// advisory client (rule baseline only).
    pub fn new(store: S, config: NeedEngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        validate_vocabulary()?;
        Ok(Self {
            store,
            config,
            advisory: None,
            key_locks: Mutex::new(BTreeMap::new()),
        })
    }

    /// Attach an advisory client. Its proposals remain subject to the full
    /// guardrail pipeline.
    pub fn with_advisory(mut self, client: Box<dyn AdvisoryClient>) -> Self {
        self.advisory = Some(client);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &NeedEngineConfig {
        &self.config
    }

    /// Evaluate one key. Serialized per key; independent across keys.
    pub fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationResponse, EngineError> {
        let key = NeedKey::new(
            request.event_id.clone(),
            request.sector_id.clone(),
            request.capacity_type_id.clone(),
        );
        let key_lock = self.key_lock(&key)?;
        let _guard = key_lock
            .lock()
            .map_err(|_| EngineError::KeyLockPoisoned {
                key: key.to_string(),
            })?;

        let now_ms = request.now_ms;
        let incoming = normalize_batch(&request.signals);
        self.store.record_signals(&key, &incoming)?;

        let stored_state = self.store.load_state(&key)?;
        let previous_status = stored_state
            .as_ref()
            .map(|state| state.current_status)
            .or(request.previous_status)
            .unwrap_or(NeedStatus::White);

        let window_start = now_ms.saturating_sub(self.config.window_ms());
        let window_signals = self.store.signals_in_window(&key, window_start, now_ms)?;
        let aggregate = aggregate_window(&window_signals, now_ms, &self.config);

        let (proposal, advisory_fallback) = self.propose(previous_status, &aggregate);
        let outcome = apply_guardrails(previous_status, &proposal, &aggregate, &self.config);
        if !outcome.applied.is_empty() {
            tracing::debug!(
                key = %key,
                previous = %previous_status,
                proposed = %proposal.status,
                decided = %outcome.final_status,
                guardrails = ?outcome.applied,
                "guardrails adjusted proposal"
            );
        }

        let state = next_state(
            stored_state,
            &key,
            previous_status,
            &aggregate,
            &outcome,
            now_ms,
        );
        let audit = NeedAudit {
            key: key.clone(),
            window_id: aggregate.window_id,
            previous_status,
            proposal: proposal.clone(),
            final_status: outcome.final_status,
            guardrails_applied: outcome.applied.clone(),
            proposal_was_legal_transition: outcome.raw_proposal_was_legal,
            advisory_fallback: advisory_fallback.clone(),
            scores: aggregate.scores,
            flags: aggregate.flags,
            consecutive_stabilization_windows: aggregate.consecutive_stabilization_windows,
            config: self.config.clone(),
            evaluated_at_ms: now_ms,
            recorded_at: rfc3339(now_ms),
        };

        self.store.upsert_state(&state)?;
        let receipt = self.store.append_audit(&audit)?;
        tracing::debug!(key = %key, sequence = receipt.sequence, "audit appended");

        Ok(EvaluationResponse {
            status: outcome.final_status,
            need_level: outcome.final_status.need_level(),
            reasoning: compose_reasoning(&proposal, &outcome, advisory_fallback.as_deref()),
            scores: aggregate.scores,
            guardrails_applied: outcome.applied,
        })
    }

    fn key_lock(&self, key: &NeedKey) -> Result<Arc<Mutex<()>>, EngineError> {
        let mut registry = self
            .key_locks
            .lock()
            .map_err(|_| EngineError::KeyLockPoisoned {
                key: key.to_string(),
            })?;
        Ok(Arc::clone(
            registry
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        ))
    }

    /// Run the configured proposer strategy. Any advisory failure falls
    /// back to the rule baseline and returns the reason for the audit.
    fn propose(
        &self,
        previous_status: NeedStatus,
        aggregate: &WindowAggregate,
    ) -> (StatusProposal, Option<String>) {
        let Some(client) = &self.advisory else {
            return (rule_baseline(&aggregate.flags), None);
        };
        let advisory_request = build_advisory_request(previous_status, aggregate);
        let fallback_reason = match client.propose(&advisory_request, self.config.advisory_timeout_ms)
        {
            Ok(response) => match validate_advisory_response(&response) {
                Ok(proposal) => return (proposal, None),
                Err(err) => err,
            },
            Err(err) => err,
        };
        tracing::warn!(
            error = %fallback_reason,
            "advisory unavailable, falling back to rule baseline"
        );
        (
            rule_baseline(&aggregate.flags),
            Some(fallback_reason.to_string()),
        )
    }
}

fn next_state(
    stored_state: Option<NeedState>,
    key: &NeedKey,
    previous_status: NeedStatus,
    aggregate: &WindowAggregate,
    outcome: &GuardrailOutcome,
    now_ms: u64,
) -> NeedState {
    let mut state = stored_state.unwrap_or_else(|| NeedState::initial(key.clone(), now_ms));
    state.scores = aggregate.scores;
    state.consecutive_stabilization_windows = aggregate.consecutive_stabilization_windows;
    if outcome.final_status != previous_status {
        state.last_status_change_at_ms = now_ms;
    }
    state.current_status = outcome.final_status;
    state.last_window_id = aggregate.window_id;
    for note in &aggregate.operational_requirements {
        push_unique(&mut state.operational_requirements, note);
    }
    for note in &aggregate.fragility_notes {
        push_unique(&mut state.fragility_notes, note);
    }
    state.last_updated_at_ms = now_ms;
    state
}

fn push_unique(notes: &mut Vec<String>, note: &str) {
    if !notes.iter().any(|existing| existing == note) {
        notes.push(note.to_string());
    }
}

fn compose_reasoning(
    proposal: &StatusProposal,
    outcome: &GuardrailOutcome,
    advisory_fallback: Option<&str>,
) -> String {
    let mut reasoning = format!("{} ({})", proposal.rationale, proposal.strategy);
    if let Some(reason) = advisory_fallback {
        reasoning.push_str("; advisory unavailable: ");
        reasoning.push_str(reason);
    }
    if !outcome.applied.is_empty() {
        let codes: Vec<&str> = outcome.applied.iter().map(|g| g.as_str()).collect();
        reasoning.push_str("; guardrails: ");
        reasoning.push_str(&codes.join(", "));
    }
    reasoning
}

fn rfc3339(now_ms: u64) -> String {
    let millis = i64::try_from(now_ms).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .to_rfc3339()
}

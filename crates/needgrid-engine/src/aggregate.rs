//! Dimensional aggregator: windowed signal reduction into five scalar
//! scores plus the consecutive-stabilization-window counter.
//!
//! Aggregation is a pure function of (signals in the trailing window,
//! evaluation time, config): identical inputs always produce identical
//! scores. Scores are recomputed from scratch on every evaluation — never
//! incrementally accumulated — so stale evidence ages out of the window
//! automatically.
//!
//! `score[dim] = Σ confidence(s) × source_weight(reliability(s))` over the
//! window, in millionths. Stabilization signals additionally land in
//! fixed-size time buckets keyed `floor(timestamp / bucket)`; the
//! consecutive counter walks backward from the current bucket while each
//! bucket's stabilization score stays at or above the downgrade threshold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{NeedEngineConfig, MILLION};
use crate::signal::{CoverageKind, Signal, SignalClassification, SourceReliability};

// ---------------------------------------------------------------------------
// DimensionScores
// ---------------------------------------------------------------------------

/// The five windowed scores, in millionths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub demand_millionths: i64,
    pub insufficiency_millionths: i64,
    pub stabilization_millionths: i64,
    pub fragility_millionths: i64,
    pub coverage_millionths: i64,
}

impl DimensionScores {
    /// All-zero scores: the steady state of a key with no evidence.
    pub fn zero() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// ThresholdFlags
// ---------------------------------------------------------------------------

/// Boolean view of the scores against the configured thresholds. Derived
/// once per evaluation and consumed by both proposer strategies and every
/// guardrail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdFlags {
    pub demand_strong: bool,
    pub insufficiency_strong: bool,
    pub stabilization_strong: bool,
    pub fragility_alert: bool,
    pub coverage_active: bool,
    /// Lower bar than `coverage_active`: coverage is visible but not yet
    /// at activation strength.
    pub coverage_intent: bool,
}

impl ThresholdFlags {
    /// Compare scores against the config thresholds.
    pub fn from_scores(scores: &DimensionScores, config: &NeedEngineConfig) -> Self {
        Self {
            demand_strong: scores.demand_millionths >= config.demand_escalation_millionths,
            insufficiency_strong: scores.insufficiency_millionths
                >= config.insufficiency_escalation_millionths,
            stabilization_strong: scores.stabilization_millionths
                >= config.stabilization_downgrade_millionths,
            fragility_alert: scores.fragility_millionths
                >= config.fragility_reactivation_millionths,
            coverage_active: scores.coverage_millionths >= config.coverage_activation_millionths,
            coverage_intent: scores.coverage_millionths >= config.coverage_intent_millionths,
        }
    }
}

// ---------------------------------------------------------------------------
// TopContribution — audit view of the heaviest evidence
// ---------------------------------------------------------------------------

/// One of the top-N signals by weighted contribution, surfaced for the
/// audit trail and the advisory request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopContribution {
    pub classification: SignalClassification,
    pub weighted_millionths: i64,
    pub timestamp_ms: u64,
    pub source_reliability: SourceReliability,
    pub short_quote: String,
}

// ---------------------------------------------------------------------------
// WindowAggregate
// ---------------------------------------------------------------------------

/// Everything the aggregator derives from one trailing window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowAggregate {
    pub scores: DimensionScores,
    pub flags: ThresholdFlags,
    pub consecutive_stabilization_windows: u32,
    /// Stabilization bucket id of the evaluation instant.
    pub window_id: u64,
    pub top_contributions: Vec<TopContribution>,
    /// Free-text notes from insufficiency evidence (bottleneck reports).
    pub operational_requirements: Vec<String>,
    /// Free-text notes from fragility evidence.
    pub fragility_notes: Vec<String>,
    /// Whether any coverage signal in the window was a new commitment.
    pub augmentation_detected: bool,
    /// Signals that fell inside the window.
    pub signal_count: usize,
}

/// Reduce the signals within `[now - window, now]` into a
/// [`WindowAggregate`].
pub fn aggregate_window(
    signals: &[Signal],
    now_ms: u64,
    config: &NeedEngineConfig,
) -> WindowAggregate {
    let window_start = now_ms.saturating_sub(config.window_ms());
    let bucket_ms = config.stabilization_window_ms();
    let current_bucket = now_ms / bucket_ms;

    let mut in_window: Vec<&Signal> = signals
        .iter()
        .filter(|s| s.timestamp_ms >= window_start && s.timestamp_ms <= now_ms)
        .collect();
    // Deterministic processing order regardless of arrival order.
    in_window.sort_by(|a, b| {
        a.timestamp_ms
            .cmp(&b.timestamp_ms)
            .then_with(|| a.short_quote.cmp(&b.short_quote))
    });

    let mut scores = DimensionScores::zero();
    let mut stabilization_buckets: BTreeMap<u64, i64> = BTreeMap::new();
    let mut weighted: Vec<(i64, &Signal)> = Vec::with_capacity(in_window.len());
    let mut operational_requirements: Vec<String> = Vec::new();
    let mut fragility_notes: Vec<String> = Vec::new();
    let mut augmentation_detected = false;

    for &signal in &in_window {
        let weight = config.source_weight_millionths(signal.source_reliability);
        let contribution = signal.confidence_millionths * weight / MILLION;
        weighted.push((contribution, signal));

        match signal.classification {
            SignalClassification::Insufficiency => {
                scores.insufficiency_millionths += contribution;
                push_unique(&mut operational_requirements, &signal.short_quote);
            }
            SignalClassification::Stabilization => {
                scores.stabilization_millionths += contribution;
                *stabilization_buckets
                    .entry(signal.timestamp_ms / bucket_ms)
                    .or_insert(0) += contribution;
            }
            SignalClassification::FragilityAlert => {
                scores.fragility_millionths += contribution;
                push_unique(&mut fragility_notes, &signal.short_quote);
            }
            SignalClassification::CoverageActivity => {
                scores.coverage_millionths += contribution;
                if signal.coverage_kind == Some(CoverageKind::Augmentation) {
                    augmentation_detected = true;
                }
            }
            // Demand is the fallback bucket for anything not classified
            // into the other four dimensions.
            SignalClassification::Demand => {
                scores.demand_millionths += contribution;
            }
        }
    }

    let consecutive_stabilization_windows = consecutive_windows(
        &stabilization_buckets,
        current_bucket,
        config.stabilization_downgrade_millionths,
    );

    weighted.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| a.1.timestamp_ms.cmp(&b.1.timestamp_ms))
            .then_with(|| a.1.short_quote.cmp(&b.1.short_quote))
    });
    let top_contributions = weighted
        .iter()
        .take(config.top_evidence_limit)
        .map(|(contribution, signal)| TopContribution {
            classification: signal.classification,
            weighted_millionths: *contribution,
            timestamp_ms: signal.timestamp_ms,
            source_reliability: signal.source_reliability,
            short_quote: signal.short_quote.clone(),
        })
        .collect();

    let flags = ThresholdFlags::from_scores(&scores, config);

    WindowAggregate {
        scores,
        flags,
        consecutive_stabilization_windows,
        window_id: current_bucket,
        top_contributions,
        operational_requirements,
        fragility_notes,
        augmentation_detected,
        signal_count: in_window.len(),
    }
}

/// Walk backward bucket-by-bucket from the current bucket while each
/// bucket's stabilization score stays at or above the threshold; stop at
/// the first bucket that falls below.
fn consecutive_windows(
    buckets: &BTreeMap<u64, i64>,
    current_bucket: u64,
    threshold_millionths: i64,
) -> u32 {
    let mut count = 0;
    let mut bucket = current_bucket;
    loop {
        let score = buckets.get(&bucket).copied().unwrap_or(0);
        if score < threshold_millionths {
            break;
        }
        count += 1;
        if bucket == 0 {
            break;
        }
        bucket -= 1;
    }
    count
}

fn push_unique(notes: &mut Vec<String>, note: &str) {
    if note.is_empty() {
        return;
    }
    if !notes.iter().any(|existing| existing == note) {
        notes.push(note.to_string());
    }
}

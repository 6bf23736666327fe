//! Evidence signal model and the table-driven evidence normalizer.
//!
//! Ingestion collaborators hand the engine heterogeneous extraction
//! payloads: state words and urgency words pulled from field-operator
//! notes, transcribed audio, social posts, official reports, and
//! deployment-status changes. The normalizer reduces every payload to one
//! uniform [`Signal`] with a closed classification tag, a fixed-point
//! confidence, a timestamp, and a source-reliability tier.
//!
//! The state→classification mapping is total: every input state maps to
//! exactly one classification, and unrecognized states classify as
//! [`SignalClassification::Insufficiency`] — the safe-escalation default.
//! Silently dropping unknown evidence is judged worse than over-weighting
//! it, so normalization never fails and never discards.
//!
//! Confidence derives from a 2-D table keyed by (state definiteness,
//! urgency tier) with values in [0.30, 0.95]; definite states under
//! immediate urgency land near 1.0, ambiguous combinations near 0.3.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::MILLION;

// ---------------------------------------------------------------------------
// SignalClassification — closed evidence tag
// ---------------------------------------------------------------------------

/// Closed classification tag carried by every signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalClassification {
    /// Evidence of unmet demand for the capability.
    Demand,
    /// Evidence that deployed resources are insufficient or depleted.
    Insufficiency,
    /// Evidence that conditions are stabilizing.
    Stabilization,
    /// Evidence that a previously stable situation is degrading.
    FragilityAlert,
    /// Evidence that response resources are deployed or committed.
    CoverageActivity,
}

impl SignalClassification {
    /// All variants in deterministic order.
    pub const ALL: [Self; 5] = [
        Self::Demand,
        Self::Insufficiency,
        Self::Stabilization,
        Self::FragilityAlert,
        Self::CoverageActivity,
    ];

    /// Stable lowercase name used in logs and audit reasoning.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Demand => "demand",
            Self::Insufficiency => "insufficiency",
            Self::Stabilization => "stabilization",
            Self::FragilityAlert => "fragility_alert",
            Self::CoverageActivity => "coverage_activity",
        }
    }
}

impl fmt::Display for SignalClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SourceReliability — trust tier of the originating stream
// ---------------------------------------------------------------------------

/// Reliability tier of the stream a signal arrived from. The tier maps to
/// a score weight through [`crate::config::NeedEngineConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceReliability {
    OfficialReport,
    FieldOperator,
    DeploymentFeed,
    TranscribedAudio,
    SocialMedia,
}

impl SourceReliability {
    /// All variants in deterministic order.
    pub const ALL: [Self; 5] = [
        Self::OfficialReport,
        Self::FieldOperator,
        Self::DeploymentFeed,
        Self::TranscribedAudio,
        Self::SocialMedia,
    ];

    /// Stable lowercase name used in logs and audit reasoning.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OfficialReport => "official_report",
            Self::FieldOperator => "field_operator",
            Self::DeploymentFeed => "deployment_feed",
            Self::TranscribedAudio => "transcribed_audio",
            Self::SocialMedia => "social_media",
        }
    }
}

impl fmt::Display for SourceReliability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CoverageKind — baseline deployment vs. new commitment
// ---------------------------------------------------------------------------

/// Refinement of coverage evidence: ongoing baseline deployment versus a
/// new commitment of additional resources. The guardrail layer requires an
/// augmentation signal (or positive stabilization) before it accepts an
/// ORANGE→YELLOW advisory de-escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageKind {
    Augmentation,
    Baseline,
}

impl CoverageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Augmentation => "augmentation",
            Self::Baseline => "baseline",
        }
    }
}

impl fmt::Display for CoverageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Signal — normalized evidence item
// ---------------------------------------------------------------------------

/// One normalized, immutable piece of weighted evidence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Signal {
    pub classification: SignalClassification,
    /// Confidence in millionths, always within `[0, 1_000_000]`.
    pub confidence_millionths: i64,
    pub timestamp_ms: u64,
    pub source_reliability: SourceReliability,
    /// Short supporting quote from the source material; may be empty.
    pub short_quote: String,
    /// Present only on coverage evidence.
    pub coverage_kind: Option<CoverageKind>,
}

// ---------------------------------------------------------------------------
// RawEvidence — ingestion input contract
// ---------------------------------------------------------------------------

/// Evidence as delivered by ingestion collaborators, before normalization.
///
/// `Extracted` carries the raw vocabulary route (state word plus optional
/// urgency word, with an optional explicit confidence that wins over the
/// table). `Classified` carries an already-classified signal and only needs
/// confidence clamping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawEvidence {
    Extracted {
        state: String,
        urgency: Option<String>,
        confidence: Option<f64>,
        timestamp_ms: u64,
        source_reliability: SourceReliability,
        quote: Option<String>,
    },
    Classified {
        classification: SignalClassification,
        confidence: f64,
        timestamp_ms: u64,
        source_reliability: SourceReliability,
        quote: Option<String>,
        coverage_kind: Option<CoverageKind>,
    },
}

// ---------------------------------------------------------------------------
// Vocabulary tables
// ---------------------------------------------------------------------------

/// How definite a state word is about the condition it describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateDefiniteness {
    Definite,
    Ambiguous,
}

/// Urgency tier derived from the extraction's urgency word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyTier {
    Immediate,
    Elevated,
    Routine,
    Unknown,
}

/// One row of the state vocabulary table.
#[derive(Debug, Clone, Copy)]
pub struct VocabularyEntry {
    pub state: &'static str,
    pub classification: SignalClassification,
    pub definiteness: StateDefiniteness,
    pub coverage_kind: Option<CoverageKind>,
}

const fn entry(
    state: &'static str,
    classification: SignalClassification,
    definiteness: StateDefiniteness,
    coverage_kind: Option<CoverageKind>,
) -> VocabularyEntry {
    VocabularyEntry {
        state,
        classification,
        definiteness,
        coverage_kind,
    }
}

/// Canonical state vocabulary. Lookup is case-insensitive on the trimmed
/// state word; anything absent from this table classifies as
/// `Insufficiency` with ambiguous definiteness.
pub const STATE_VOCABULARY: &[VocabularyEntry] = &[
    // demand
    entry(
        "requested",
        SignalClassification::Demand,
        StateDefiniteness::Definite,
        None,
    ),
    entry(
        "needed",
        SignalClassification::Demand,
        StateDefiniteness::Definite,
        None,
    ),
    entry(
        "urgent_request",
        SignalClassification::Demand,
        StateDefiniteness::Definite,
        None,
    ),
    entry(
        "appeal",
        SignalClassification::Demand,
        StateDefiniteness::Ambiguous,
        None,
    ),
    entry(
        "asking",
        SignalClassification::Demand,
        StateDefiniteness::Ambiguous,
        None,
    ),
    // insufficiency
    entry(
        "depleted",
        SignalClassification::Insufficiency,
        StateDefiniteness::Definite,
        None,
    ),
    entry(
        "exhausted",
        SignalClassification::Insufficiency,
        StateDefiniteness::Definite,
        None,
    ),
    entry(
        "shortage",
        SignalClassification::Insufficiency,
        StateDefiniteness::Definite,
        None,
    ),
    entry(
        "insufficient",
        SignalClassification::Insufficiency,
        StateDefiniteness::Definite,
        None,
    ),
    entry(
        "overwhelmed",
        SignalClassification::Insufficiency,
        StateDefiniteness::Definite,
        None,
    ),
    entry(
        "strained",
        SignalClassification::Insufficiency,
        StateDefiniteness::Ambiguous,
        None,
    ),
    entry(
        "limited",
        SignalClassification::Insufficiency,
        StateDefiniteness::Ambiguous,
        None,
    ),
    // stabilization
    entry(
        "stable",
        SignalClassification::Stabilization,
        StateDefiniteness::Definite,
        None,
    ),
    entry(
        "stabilized",
        SignalClassification::Stabilization,
        StateDefiniteness::Definite,
        None,
    ),
    entry(
        "resolved",
        SignalClassification::Stabilization,
        StateDefiniteness::Definite,
        None,
    ),
    entry(
        "improving",
        SignalClassification::Stabilization,
        StateDefiniteness::Ambiguous,
        None,
    ),
    entry(
        "recovering",
        SignalClassification::Stabilization,
        StateDefiniteness::Ambiguous,
        None,
    ),
    // fragility
    entry(
        "deteriorating",
        SignalClassification::FragilityAlert,
        StateDefiniteness::Definite,
        None,
    ),
    entry(
        "worsening",
        SignalClassification::FragilityAlert,
        StateDefiniteness::Definite,
        None,
    ),
    entry(
        "relapsing",
        SignalClassification::FragilityAlert,
        StateDefiniteness::Definite,
        None,
    ),
    entry(
        "at_risk",
        SignalClassification::FragilityAlert,
        StateDefiniteness::Ambiguous,
        None,
    ),
    entry(
        "fragile",
        SignalClassification::FragilityAlert,
        StateDefiniteness::Ambiguous,
        None,
    ),
    // coverage — baseline deployment
    entry(
        "deployed",
        SignalClassification::CoverageActivity,
        StateDefiniteness::Definite,
        Some(CoverageKind::Baseline),
    ),
    entry(
        "operational",
        SignalClassification::CoverageActivity,
        StateDefiniteness::Definite,
        Some(CoverageKind::Baseline),
    ),
    entry(
        "distributing",
        SignalClassification::CoverageActivity,
        StateDefiniteness::Definite,
        Some(CoverageKind::Baseline),
    ),
    entry(
        "en_route",
        SignalClassification::CoverageActivity,
        StateDefiniteness::Ambiguous,
        Some(CoverageKind::Baseline),
    ),
    // coverage — new commitment
    entry(
        "committed",
        SignalClassification::CoverageActivity,
        StateDefiniteness::Definite,
        Some(CoverageKind::Augmentation),
    ),
    entry(
        "reinforced",
        SignalClassification::CoverageActivity,
        StateDefiniteness::Definite,
        Some(CoverageKind::Augmentation),
    ),
    entry(
        "scaled_up",
        SignalClassification::CoverageActivity,
        StateDefiniteness::Definite,
        Some(CoverageKind::Augmentation),
    ),
    entry(
        "pledged",
        SignalClassification::CoverageActivity,
        StateDefiniteness::Ambiguous,
        Some(CoverageKind::Augmentation),
    ),
];

const URGENCY_IMMEDIATE: &[&str] = &["immediate", "critical", "now"];
const URGENCY_ELEVATED: &[&str] = &["high", "urgent", "elevated"];
const URGENCY_ROUTINE: &[&str] = &["moderate", "routine", "low"];

/// Confidence table keyed by (definiteness, urgency tier), in millionths.
/// Documented range: 300_000 (0.30) to 950_000 (0.95).
pub fn table_confidence_millionths(
    definiteness: StateDefiniteness,
    urgency: UrgencyTier,
) -> i64 {
    match (definiteness, urgency) {
        (StateDefiniteness::Definite, UrgencyTier::Immediate) => 950_000,
        (StateDefiniteness::Definite, UrgencyTier::Elevated) => 850_000,
        (StateDefiniteness::Definite, UrgencyTier::Routine) => 700_000,
        (StateDefiniteness::Definite, UrgencyTier::Unknown) => 600_000,
        (StateDefiniteness::Ambiguous, UrgencyTier::Immediate) => 550_000,
        (StateDefiniteness::Ambiguous, UrgencyTier::Elevated) => 450_000,
        (StateDefiniteness::Ambiguous, UrgencyTier::Routine) => 350_000,
        (StateDefiniteness::Ambiguous, UrgencyTier::Unknown) => 300_000,
    }
}

fn classify_state(state: &str) -> (SignalClassification, StateDefiniteness, Option<CoverageKind>) {
    let canonical = state.trim().to_ascii_lowercase();
    for row in STATE_VOCABULARY {
        if row.state == canonical {
            return (row.classification, row.definiteness, row.coverage_kind);
        }
    }
    // Safe-escalation default: unknown evidence is never dropped.
    (
        SignalClassification::Insufficiency,
        StateDefiniteness::Ambiguous,
        None,
    )
}

fn urgency_tier(urgency: Option<&str>) -> UrgencyTier {
    let Some(word) = urgency else {
        return UrgencyTier::Unknown;
    };
    let canonical = word.trim().to_ascii_lowercase();
    if URGENCY_IMMEDIATE.contains(&canonical.as_str()) {
        UrgencyTier::Immediate
    } else if URGENCY_ELEVATED.contains(&canonical.as_str()) {
        UrgencyTier::Elevated
    } else if URGENCY_ROUTINE.contains(&canonical.as_str()) {
        UrgencyTier::Routine
    } else {
        UrgencyTier::Unknown
    }
}

/// Clamp a unit-interval float into millionths. Non-finite input
/// contributes nothing rather than poisoning downstream sums.
pub fn clamp_unit_to_millionths(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    let scaled = (value * MILLION as f64).round();
    (scaled as i64).clamp(0, MILLION)
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize one raw evidence payload into a [`Signal`]. Total: every
/// input produces a signal.
pub fn normalize(raw: &RawEvidence) -> Signal {
    match raw {
        RawEvidence::Extracted {
            state,
            urgency,
            confidence,
            timestamp_ms,
            source_reliability,
            quote,
        } => {
            let (classification, definiteness, coverage_kind) = classify_state(state);
            let confidence_millionths = match confidence {
                Some(value) if value.is_finite() => clamp_unit_to_millionths(*value),
                _ => table_confidence_millionths(definiteness, urgency_tier(urgency.as_deref())),
            };
            Signal {
                classification,
                confidence_millionths,
                timestamp_ms: *timestamp_ms,
                source_reliability: *source_reliability,
                short_quote: quote.clone().unwrap_or_default(),
                coverage_kind,
            }
        }
        RawEvidence::Classified {
            classification,
            confidence,
            timestamp_ms,
            source_reliability,
            quote,
            coverage_kind,
        } => Signal {
            classification: *classification,
            confidence_millionths: clamp_unit_to_millionths(*confidence),
            timestamp_ms: *timestamp_ms,
            source_reliability: *source_reliability,
            short_quote: quote.clone().unwrap_or_default(),
            coverage_kind: *coverage_kind,
        },
    }
}

/// Normalize a batch in input order.
pub fn normalize_batch(raws: &[RawEvidence]) -> Vec<Signal> {
    raws.iter().map(normalize).collect()
}

// ---------------------------------------------------------------------------
// Vocabulary validation
// ---------------------------------------------------------------------------

/// Errors detected while validating the vocabulary tables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizerError {
    #[error("duplicate state word '{word}' in vocabulary table")]
    DuplicateStateWord { word: String },
    #[error("state word '{word}' is empty or not canonical lowercase")]
    NonCanonicalStateWord { word: String },
    #[error("coverage kind present on non-coverage state word '{word}'")]
    MisplacedCoverageKind { word: String },
    #[error("coverage state word '{word}' is missing its coverage kind")]
    MissingCoverageKind { word: String },
}

/// Validate the vocabulary tables exhaustively. Called once at engine
/// construction; the tables are static, so a passing run holds for the
/// process lifetime.
pub fn validate_vocabulary() -> Result<(), NormalizerError> {
    let mut seen = BTreeSet::new();
    for row in STATE_VOCABULARY {
        if row.state.is_empty() || row.state != row.state.trim().to_ascii_lowercase() {
            return Err(NormalizerError::NonCanonicalStateWord {
                word: row.state.to_string(),
            });
        }
        if !seen.insert(row.state) {
            return Err(NormalizerError::DuplicateStateWord {
                word: row.state.to_string(),
            });
        }
        let is_coverage = row.classification == SignalClassification::CoverageActivity;
        if is_coverage && row.coverage_kind.is_none() {
            return Err(NormalizerError::MissingCoverageKind {
                word: row.state.to_string(),
            });
        }
        if !is_coverage && row.coverage_kind.is_some() {
            return Err(NormalizerError::MisplacedCoverageKind {
                word: row.state.to_string(),
            });
        }
    }
    Ok(())
}

//! Engine configuration: source-reliability weights, thresholds, and
//! window parameters.
//!
//! Every evaluation receives an explicit [`NeedEngineConfig`]; nothing is
//! read from global or mutable state. The `Default` impl is the single
//! canonical threshold set: one table, injected into every call site, so
//! threshold drift between deployments is impossible by construction.
//!
//! All thresholds and weights are fixed-point millionths
//! ([`MILLION`]` = 1.0`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::signal::SourceReliability;

/// Fixed-point scale: 1_000_000 millionths = 1.0.
pub const MILLION: i64 = 1_000_000;

// ---------------------------------------------------------------------------
// NeedEngineConfig
// ---------------------------------------------------------------------------

/// Complete configuration for one evaluation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeedEngineConfig {
    /// Per-tier score weight in millionths. Tiers absent from the table
    /// weigh 1.0, so unlisted evidence is never silently discounted.
    pub source_weights_millionths: BTreeMap<SourceReliability, i64>,
    /// Demand score at or above which demand counts as strong.
    pub demand_escalation_millionths: i64,
    /// Insufficiency score at or above which insufficiency counts as strong.
    pub insufficiency_escalation_millionths: i64,
    /// Stabilization score at or above which stabilization counts as
    /// strong; also the per-bucket bar for the consecutive-window walk.
    pub stabilization_downgrade_millionths: i64,
    /// Fragility score at or above which the fragility alert raises.
    pub fragility_reactivation_millionths: i64,
    /// Coverage score at or above which coverage counts as active.
    pub coverage_activation_millionths: i64,
    /// Coverage score at or above which coverage intent is visible; a
    /// strictly lower bar than activation.
    pub coverage_intent_millionths: i64,
    /// Advisory proposals below this confidence are discarded.
    pub min_advisory_confidence_millionths: i64,
    /// Trailing evidence window, in hours.
    pub window_hours: u64,
    /// Stabilization bucket size, in minutes.
    pub stabilization_window_minutes: u64,
    /// Consecutive stabilization windows required before GREEN is eligible.
    pub stabilization_min_consecutive_windows: u32,
    /// Hard ceiling on one advisory call.
    pub advisory_timeout_ms: u64,
    /// Number of top weighted contributions surfaced for audit.
    pub top_evidence_limit: usize,
}

impl Default for NeedEngineConfig {
    fn default() -> Self {
        let mut source_weights_millionths = BTreeMap::new();
        source_weights_millionths.insert(SourceReliability::OfficialReport, MILLION);
        source_weights_millionths.insert(SourceReliability::FieldOperator, MILLION);
        source_weights_millionths.insert(SourceReliability::DeploymentFeed, 900_000);
        source_weights_millionths.insert(SourceReliability::TranscribedAudio, 750_000);
        source_weights_millionths.insert(SourceReliability::SocialMedia, 500_000);
        Self {
            source_weights_millionths,
            demand_escalation_millionths: MILLION,
            insufficiency_escalation_millionths: 750_000,
            stabilization_downgrade_millionths: 700_000,
            fragility_reactivation_millionths: 600_000,
            coverage_activation_millionths: 900_000,
            coverage_intent_millionths: 400_000,
            min_advisory_confidence_millionths: 600_000,
            window_hours: 12,
            stabilization_window_minutes: 60,
            stabilization_min_consecutive_windows: 2,
            advisory_timeout_ms: 8_000,
            top_evidence_limit: 5,
        }
    }
}

impl NeedEngineConfig {
    /// Weight for a reliability tier; unlisted tiers weigh 1.0.
    pub fn source_weight_millionths(&self, reliability: SourceReliability) -> i64 {
        self.source_weights_millionths
            .get(&reliability)
            .copied()
            .unwrap_or(MILLION)
    }

    /// Trailing window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_hours * 3_600_000
    }

    /// Stabilization bucket size in milliseconds.
    pub fn stabilization_window_ms(&self) -> u64 {
        self.stabilization_window_minutes * 60_000
    }

    /// Validate the configuration. Called once at engine construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds: [(&str, i64); 6] = [
            ("demand_escalation", self.demand_escalation_millionths),
            (
                "insufficiency_escalation",
                self.insufficiency_escalation_millionths,
            ),
            (
                "stabilization_downgrade",
                self.stabilization_downgrade_millionths,
            ),
            (
                "fragility_reactivation",
                self.fragility_reactivation_millionths,
            ),
            ("coverage_activation", self.coverage_activation_millionths),
            ("coverage_intent", self.coverage_intent_millionths),
        ];
        for (name, value) in thresholds {
            if value <= 0 {
                return Err(ConfigError::NonPositiveThreshold {
                    name: name.to_string(),
                });
            }
        }
        if self.coverage_intent_millionths > self.coverage_activation_millionths {
            return Err(ConfigError::CoverageIntentAboveActivation {
                intent_millionths: self.coverage_intent_millionths,
                activation_millionths: self.coverage_activation_millionths,
            });
        }
        if !(0..=MILLION).contains(&self.min_advisory_confidence_millionths) {
            return Err(ConfigError::ConfidenceGateOutOfRange {
                value_millionths: self.min_advisory_confidence_millionths,
            });
        }
        for (tier, weight) in &self.source_weights_millionths {
            if !(0..=MILLION).contains(weight) {
                return Err(ConfigError::WeightOutOfRange {
                    tier: tier.as_str().to_string(),
                    weight_millionths: *weight,
                });
            }
        }
        if self.window_hours == 0 {
            return Err(ConfigError::ZeroWindow {
                name: "window_hours".to_string(),
            });
        }
        if self.stabilization_window_minutes == 0 {
            return Err(ConfigError::ZeroWindow {
                name: "stabilization_window_minutes".to_string(),
            });
        }
        if self.stabilization_min_consecutive_windows == 0 {
            return Err(ConfigError::ZeroWindow {
                name: "stabilization_min_consecutive_windows".to_string(),
            });
        }
        if self.top_evidence_limit == 0 {
            return Err(ConfigError::ZeroWindow {
                name: "top_evidence_limit".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("threshold '{name}' must be positive")]
    NonPositiveThreshold { name: String },
    #[error(
        "coverage intent ({intent_millionths}) must not exceed coverage \
         activation ({activation_millionths})"
    )]
    CoverageIntentAboveActivation {
        intent_millionths: i64,
        activation_millionths: i64,
    },
    #[error("min advisory confidence {value_millionths} outside [0, 1_000_000]")]
    ConfidenceGateOutOfRange { value_millionths: i64 },
    #[error("source weight for tier '{tier}' is {weight_millionths}, outside [0, 1_000_000]")]
    WeightOutOfRange { tier: String, weight_millionths: i64 },
    #[error("'{name}' must be non-zero")]
    ZeroWindow { name: String },
}

//! Guardrail validator: the fixed, ordered safety pipeline applied to
//! every proposal before it is accepted.
//!
//! Guardrails run in one exact order and share a `hard_forced` latch:
//! once a floor guardrail fires (forcing RED), later guardrails that
//! would only soften the status are skipped, while later escalations may
//! still apply. The pipeline's output is always a legal transition from
//! the previous status, and every guardrail that fires is recorded, in
//! order, for the audit trail.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::WindowAggregate;
use crate::config::NeedEngineConfig;
use crate::propose::{ProposerKind, StatusProposal};
use crate::status::NeedStatus;

// ---------------------------------------------------------------------------
// Guardrail — stable identifiers for the audit trail
// ---------------------------------------------------------------------------

/// Identifier of one guardrail in the pipeline, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guardrail {
    /// Illegal proposed transition corrected (clamped or replaced).
    TransitionLegality,
    /// Strong demand with no active coverage forces RED.
    RedFloor,
    /// Strong insufficiency floors to RED without coverage, or demotes a
    /// GREEN proposal to ORANGE under coverage.
    InsufficiencyFloor,
    /// GREEN requires validated, consistent stabilization.
    GreenEligibility,
    /// Fragility evidence blocks optimistic statuses.
    FragilityBlock,
    /// Low-confidence advisory proposals are discarded.
    ConfidenceGate,
    /// ORANGE→YELLOW de-escalation needs fresh coverage commitment or
    /// positive stabilization.
    OrangeYellowEvidence,
    /// Strong demand escalates anything milder than ORANGE.
    WorseningEscalation,
}

impl Guardrail {
    /// All guardrails in pipeline order.
    pub const ALL: [Self; 8] = [
        Self::TransitionLegality,
        Self::RedFloor,
        Self::InsufficiencyFloor,
        Self::GreenEligibility,
        Self::FragilityBlock,
        Self::ConfidenceGate,
        Self::OrangeYellowEvidence,
        Self::WorseningEscalation,
    ];

    /// Stable snake_case code used in audits and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransitionLegality => "transition_legality",
            Self::RedFloor => "red_floor",
            Self::InsufficiencyFloor => "insufficiency_floor",
            Self::GreenEligibility => "green_eligibility",
            Self::FragilityBlock => "fragility_block",
            Self::ConfidenceGate => "confidence_gate",
            Self::OrangeYellowEvidence => "orange_yellow_evidence",
            Self::WorseningEscalation => "worsening_escalation",
        }
    }
}

impl fmt::Display for Guardrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GuardrailOutcome
// ---------------------------------------------------------------------------

/// Result of running the guardrail pipeline over one proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailOutcome {
    pub final_status: NeedStatus,
    /// Guardrails that fired, in application order.
    pub applied: Vec<Guardrail>,
    /// Whether the raw proposal was already a legal transition.
    pub raw_proposal_was_legal: bool,
    /// Whether a floor guardrail latched.
    pub hard_forced: bool,
}

/// Run the full guardrail pipeline.
pub fn apply_guardrails(
    previous_status: NeedStatus,
    proposal: &StatusProposal,
    aggregate: &WindowAggregate,
    config: &NeedEngineConfig,
) -> GuardrailOutcome {
    let flags = &aggregate.flags;
    let advisory = proposal.strategy == ProposerKind::Advisory;
    let mut applied = Vec::new();
    let mut hard_forced = false;

    // Transition legality. The rule baseline clamps one step at a time
    // along the severity ladder toward the proposal; the advisory path
    // falls back to the previous status outright.
    let raw_proposal_was_legal = previous_status.is_legal_transition_to(proposal.status);
    let mut current = proposal.status;
    if !raw_proposal_was_legal {
        applied.push(Guardrail::TransitionLegality);
        current = if advisory {
            previous_status
        } else {
            previous_status
                .step_toward(proposal.status)
                .unwrap_or(previous_status)
        };
    }

    // Guardrail A: RED floor.
    if flags.demand_strong && !flags.coverage_active {
        if current != NeedStatus::Red {
            current = NeedStatus::Red;
        }
        applied.push(Guardrail::RedFloor);
        hard_forced = true;
    }

    // Guardrail B: insufficiency floor / GREEN block.
    if !hard_forced && flags.insufficiency_strong {
        if !flags.coverage_active {
            current = NeedStatus::Red;
            applied.push(Guardrail::InsufficiencyFloor);
            hard_forced = true;
        } else if current == NeedStatus::Green {
            current = NeedStatus::Orange;
            applied.push(Guardrail::InsufficiencyFloor);
        }
    }

    // Guardrail C: GREEN eligibility gate.
    if !hard_forced && current == NeedStatus::Green {
        let eligible = flags.stabilization_strong
            && aggregate.consecutive_stabilization_windows
                >= config.stabilization_min_consecutive_windows
            && !flags.fragility_alert
            && !flags.demand_strong
            && !flags.insufficiency_strong;
        if !eligible {
            current = NeedStatus::Yellow;
            applied.push(Guardrail::GreenEligibility);
        }
    }

    // Guardrail D: fragility block.
    if !hard_forced && flags.fragility_alert {
        let mut fired = false;
        if current == NeedStatus::Green || (advisory && current == NeedStatus::White) {
            current = NeedStatus::Yellow;
            fired = true;
        }
        if previous_status == NeedStatus::Green && current != NeedStatus::Yellow {
            current = NeedStatus::Yellow;
            fired = true;
        }
        if fired {
            applied.push(Guardrail::FragilityBlock);
        }
    }

    // Guardrail E: advisory confidence gate.
    if !hard_forced
        && advisory
        && proposal.confidence_millionths < config.min_advisory_confidence_millionths
    {
        current = previous_status;
        applied.push(Guardrail::ConfidenceGate);
    }

    // Guardrail F: ORANGE→YELLOW evidence requirement (advisory only).
    if !hard_forced
        && advisory
        && previous_status == NeedStatus::Orange
        && current == NeedStatus::Yellow
        && !(aggregate.augmentation_detected || aggregate.scores.stabilization_millionths > 0)
    {
        current = NeedStatus::Orange;
        applied.push(Guardrail::OrangeYellowEvidence);
    }

    // Guardrail G: worsening escalation floor.
    if !hard_forced
        && flags.demand_strong
        && current != NeedStatus::Red
        && current != NeedStatus::Orange
    {
        current = NeedStatus::Orange;
        applied.push(Guardrail::WorseningEscalation);
    }

    GuardrailOutcome {
        final_status: current,
        applied,
        raw_proposal_was_legal,
        hard_forced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate_window, DimensionScores, ThresholdFlags};
    use crate::config::MILLION;
    use crate::propose::rule_baseline;
    use crate::signal::{CoverageKind, Signal, SignalClassification, SourceReliability};

    const NOW_MS: u64 = 1_700_000_000_000;

    fn signal(
        classification: SignalClassification,
        confidence_millionths: i64,
        coverage_kind: Option<CoverageKind>,
    ) -> Signal {
        Signal {
            classification,
            confidence_millionths,
            timestamp_ms: NOW_MS - 1_000,
            source_reliability: SourceReliability::OfficialReport,
            short_quote: String::new(),
            coverage_kind,
        }
    }

    fn aggregate_of(signals: &[Signal]) -> WindowAggregate {
        aggregate_window(signals, NOW_MS, &NeedEngineConfig::default())
    }

    fn advisory_proposal(status: NeedStatus, confidence_millionths: i64) -> StatusProposal {
        StatusProposal {
            status,
            confidence_millionths,
            rationale: "advisory".to_string(),
            strategy: ProposerKind::Advisory,
        }
    }

    // ── Guardrail A ────────────────────────────────────────────────

    #[test]
    fn red_floor_fires_for_both_strategies() {
        let aggregate = aggregate_of(&[signal(SignalClassification::Demand, MILLION, None)]);
        let config = NeedEngineConfig::default();

        let rule = rule_baseline(&aggregate.flags);
        let outcome = apply_guardrails(NeedStatus::White, &rule, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Red);
        assert!(outcome.applied.contains(&Guardrail::RedFloor));
        assert!(outcome.hard_forced);

        let advisory = advisory_proposal(NeedStatus::Yellow, 900_000);
        let outcome = apply_guardrails(NeedStatus::White, &advisory, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Red);
        assert!(outcome.hard_forced);
    }

    #[test]
    fn red_floor_latch_skips_softening_guardrails() {
        // demand strong, no coverage, fragility alerting: the RED floor
        // latches and fragility must not soften it.
        let aggregate = aggregate_of(&[
            signal(SignalClassification::Demand, MILLION, None),
            signal(SignalClassification::FragilityAlert, 700_000, None),
        ]);
        let config = NeedEngineConfig::default();
        let proposal = advisory_proposal(NeedStatus::Green, 950_000);
        let outcome = apply_guardrails(NeedStatus::Green, &proposal, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Red);
        assert!(!outcome.applied.contains(&Guardrail::FragilityBlock));
        assert!(!outcome.applied.contains(&Guardrail::ConfidenceGate));
    }

    // ── Guardrail B ────────────────────────────────────────────────

    #[test]
    fn insufficiency_without_coverage_floors_to_red() {
        let aggregate = aggregate_of(&[signal(SignalClassification::Insufficiency, 800_000, None)]);
        let config = NeedEngineConfig::default();
        let rule = rule_baseline(&aggregate.flags);
        let outcome = apply_guardrails(NeedStatus::White, &rule, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Red);
        assert_eq!(outcome.applied, vec![Guardrail::InsufficiencyFloor]);
        assert!(outcome.hard_forced);
    }

    #[test]
    fn insufficiency_under_coverage_demotes_green_proposal_to_orange() {
        let aggregate = aggregate_of(&[
            signal(SignalClassification::Insufficiency, 800_000, None),
            signal(
                SignalClassification::CoverageActivity,
                MILLION,
                Some(CoverageKind::Baseline),
            ),
        ]);
        let config = NeedEngineConfig::default();
        let proposal = advisory_proposal(NeedStatus::Green, 950_000);
        let outcome = apply_guardrails(NeedStatus::Yellow, &proposal, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Orange);
        assert!(outcome.applied.contains(&Guardrail::InsufficiencyFloor));
        assert!(!outcome.hard_forced);
    }

    #[test]
    fn red_floor_preempts_insufficiency_floor() {
        let aggregate = aggregate_of(&[
            signal(SignalClassification::Demand, MILLION, None),
            signal(SignalClassification::Insufficiency, 800_000, None),
        ]);
        let config = NeedEngineConfig::default();
        let rule = rule_baseline(&aggregate.flags);
        let outcome = apply_guardrails(NeedStatus::White, &rule, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Red);
        assert!(outcome.applied.contains(&Guardrail::RedFloor));
        assert!(!outcome.applied.contains(&Guardrail::InsufficiencyFloor));
    }

    // ── Guardrail C ────────────────────────────────────────────────

    #[test]
    fn green_needs_enough_consecutive_windows() {
        let mut config = NeedEngineConfig::default();
        config.stabilization_min_consecutive_windows = 2;
        // One strong bucket only.
        let aggregate = aggregate_of(&[signal(SignalClassification::Stabilization, 800_000, None)]);
        assert_eq!(aggregate.consecutive_stabilization_windows, 1);
        let rule = rule_baseline(&aggregate.flags);
        assert_eq!(rule.status, NeedStatus::Green);
        let outcome = apply_guardrails(NeedStatus::Yellow, &rule, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Yellow);
        assert_eq!(outcome.applied, vec![Guardrail::GreenEligibility]);
    }

    #[test]
    fn green_passes_when_every_eligibility_condition_holds() {
        let mut config = NeedEngineConfig::default();
        config.stabilization_min_consecutive_windows = 1;
        let aggregate = aggregate_of(&[signal(SignalClassification::Stabilization, 800_000, None)]);
        let rule = rule_baseline(&aggregate.flags);
        let outcome = apply_guardrails(NeedStatus::Yellow, &rule, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Green);
        assert!(outcome.applied.is_empty());
    }

    #[test]
    fn advisory_green_without_stabilization_demotes_to_yellow() {
        let aggregate = aggregate_of(&[signal(
            SignalClassification::CoverageActivity,
            MILLION,
            Some(CoverageKind::Baseline),
        )]);
        let config = NeedEngineConfig::default();
        let proposal = advisory_proposal(NeedStatus::Green, 950_000);
        let outcome = apply_guardrails(NeedStatus::Yellow, &proposal, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Yellow);
        assert!(outcome.applied.contains(&Guardrail::GreenEligibility));
    }

    // ── Guardrail D ────────────────────────────────────────────────

    #[test]
    fn fragility_demotes_green_proposal_to_yellow() {
        let mut config = NeedEngineConfig::default();
        config.stabilization_min_consecutive_windows = 1;
        let aggregate = aggregate_of(&[
            signal(SignalClassification::Stabilization, 800_000, None),
            signal(SignalClassification::FragilityAlert, 700_000, None),
        ]);
        // Fragility already blocks the rule baseline's GREEN branch, so use
        // an advisory GREEN to exercise the guardrail itself.
        let proposal = advisory_proposal(NeedStatus::Green, 950_000);
        let outcome = apply_guardrails(NeedStatus::Yellow, &proposal, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Yellow);
        assert!(outcome.applied.contains(&Guardrail::FragilityBlock));
    }

    #[test]
    fn fragility_demotes_advisory_white_to_yellow() {
        let aggregate = aggregate_of(&[signal(SignalClassification::FragilityAlert, 700_000, None)]);
        let config = NeedEngineConfig::default();
        let proposal = advisory_proposal(NeedStatus::White, 950_000);
        let outcome = apply_guardrails(NeedStatus::White, &proposal, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Yellow);
        assert!(outcome.applied.contains(&Guardrail::FragilityBlock));
    }

    #[test]
    fn fragility_leaves_rule_baseline_white_alone() {
        let aggregate = aggregate_of(&[signal(SignalClassification::FragilityAlert, 700_000, None)]);
        let config = NeedEngineConfig::default();
        let rule = rule_baseline(&aggregate.flags);
        assert_eq!(rule.status, NeedStatus::White);
        let outcome = apply_guardrails(NeedStatus::White, &rule, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::White);
    }

    #[test]
    fn fragility_after_green_forces_yellow_regardless_of_proposal() {
        let aggregate = aggregate_of(&[signal(SignalClassification::FragilityAlert, 700_000, None)]);
        let config = NeedEngineConfig::default();
        let proposal = advisory_proposal(NeedStatus::Orange, 950_000);
        let outcome = apply_guardrails(NeedStatus::Green, &proposal, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Yellow);
        assert!(outcome.applied.contains(&Guardrail::FragilityBlock));
    }

    // ── Guardrail E ────────────────────────────────────────────────

    #[test]
    fn low_confidence_advisory_keeps_previous_status() {
        let aggregate = aggregate_of(&[signal(
            SignalClassification::CoverageActivity,
            MILLION,
            Some(CoverageKind::Baseline),
        )]);
        let config = NeedEngineConfig::default();
        let proposal = advisory_proposal(NeedStatus::Orange, 400_000);
        let outcome = apply_guardrails(NeedStatus::Yellow, &proposal, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Yellow);
        assert!(outcome.applied.contains(&Guardrail::ConfidenceGate));
    }

    #[test]
    fn confidence_gate_does_not_apply_to_the_rule_baseline() {
        let aggregate = aggregate_of(&[]);
        let config = NeedEngineConfig::default();
        let rule = rule_baseline(&aggregate.flags);
        let outcome = apply_guardrails(NeedStatus::White, &rule, &aggregate, &config);
        assert!(!outcome.applied.contains(&Guardrail::ConfidenceGate));
    }

    // ── Guardrail F ────────────────────────────────────────────────

    #[test]
    fn orange_to_yellow_needs_augmentation_or_stabilization() {
        let aggregate = aggregate_of(&[signal(
            SignalClassification::CoverageActivity,
            MILLION,
            Some(CoverageKind::Baseline),
        )]);
        let config = NeedEngineConfig::default();
        let proposal = advisory_proposal(NeedStatus::Yellow, 900_000);
        let outcome = apply_guardrails(NeedStatus::Orange, &proposal, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Orange);
        assert!(outcome.applied.contains(&Guardrail::OrangeYellowEvidence));
    }

    #[test]
    fn orange_to_yellow_passes_with_augmentation() {
        let aggregate = aggregate_of(&[signal(
            SignalClassification::CoverageActivity,
            MILLION,
            Some(CoverageKind::Augmentation),
        )]);
        let config = NeedEngineConfig::default();
        let proposal = advisory_proposal(NeedStatus::Yellow, 900_000);
        let outcome = apply_guardrails(NeedStatus::Orange, &proposal, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Yellow);
        assert!(!outcome.applied.contains(&Guardrail::OrangeYellowEvidence));
    }

    #[test]
    fn orange_to_yellow_passes_with_positive_stabilization() {
        let aggregate = aggregate_of(&[
            signal(
                SignalClassification::CoverageActivity,
                MILLION,
                Some(CoverageKind::Baseline),
            ),
            signal(SignalClassification::Stabilization, 100_000, None),
        ]);
        let config = NeedEngineConfig::default();
        let proposal = advisory_proposal(NeedStatus::Yellow, 900_000);
        let outcome = apply_guardrails(NeedStatus::Orange, &proposal, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Yellow);
    }

    #[test]
    fn orange_to_yellow_requirement_is_advisory_only() {
        let aggregate = aggregate_of(&[signal(
            SignalClassification::CoverageActivity,
            MILLION,
            Some(CoverageKind::Baseline),
        )]);
        let config = NeedEngineConfig::default();
        let rule = rule_baseline(&aggregate.flags);
        assert_eq!(rule.status, NeedStatus::Yellow);
        let outcome = apply_guardrails(NeedStatus::Orange, &rule, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Yellow);
        assert!(!outcome.applied.contains(&Guardrail::OrangeYellowEvidence));
    }

    // ── Guardrail G ────────────────────────────────────────────────

    #[test]
    fn strong_demand_escalates_mild_statuses_to_orange() {
        // Strong demand with coverage active: A does not fire, and a
        // YELLOW proposal must still escalate.
        let aggregate = aggregate_of(&[
            signal(SignalClassification::Demand, MILLION, None),
            signal(
                SignalClassification::CoverageActivity,
                MILLION,
                Some(CoverageKind::Baseline),
            ),
        ]);
        let config = NeedEngineConfig::default();
        let proposal = advisory_proposal(NeedStatus::Yellow, 900_000);
        let outcome = apply_guardrails(NeedStatus::Yellow, &proposal, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Orange);
        assert!(outcome.applied.contains(&Guardrail::WorseningEscalation));
    }

    // ── Transition legality ────────────────────────────────────────

    #[test]
    fn illegal_advisory_transition_reverts_to_previous_status() {
        let aggregate = aggregate_of(&[]);
        let config = NeedEngineConfig::default();
        let proposal = advisory_proposal(NeedStatus::Green, 950_000);
        let outcome = apply_guardrails(NeedStatus::White, &proposal, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::White);
        assert!(!outcome.raw_proposal_was_legal);
        assert!(outcome.applied.contains(&Guardrail::TransitionLegality));
    }

    #[test]
    fn illegal_rule_transition_clamps_along_the_severity_ladder() {
        let mut config = NeedEngineConfig::default();
        config.stabilization_min_consecutive_windows = 1;
        let aggregate = aggregate_of(&[signal(SignalClassification::Stabilization, 800_000, None)]);
        let rule = rule_baseline(&aggregate.flags);
        assert_eq!(rule.status, NeedStatus::Green);
        // RED→GREEN is illegal; the clamp lands on ORANGE.
        let outcome = apply_guardrails(NeedStatus::Red, &rule, &aggregate, &config);
        assert_eq!(outcome.final_status, NeedStatus::Orange);
        assert!(outcome.applied.contains(&Guardrail::TransitionLegality));
        assert!(!outcome.raw_proposal_was_legal);
    }

    // ── Output legality property ───────────────────────────────────

    #[test]
    fn final_status_is_always_a_legal_transition() {
        let evidence_mixes: Vec<Vec<Signal>> = vec![
            vec![],
            vec![signal(SignalClassification::Demand, MILLION, None)],
            vec![signal(SignalClassification::Insufficiency, 800_000, None)],
            vec![
                signal(SignalClassification::Demand, MILLION, None),
                signal(
                    SignalClassification::CoverageActivity,
                    MILLION,
                    Some(CoverageKind::Baseline),
                ),
            ],
            vec![signal(SignalClassification::Stabilization, 800_000, None)],
            vec![signal(SignalClassification::FragilityAlert, 700_000, None)],
            vec![signal(
                SignalClassification::CoverageActivity,
                MILLION,
                Some(CoverageKind::Augmentation),
            )],
        ];
        let config = NeedEngineConfig::default();
        for signals in &evidence_mixes {
            let aggregate = aggregate_of(signals);
            for previous in NeedStatus::ALL {
                for proposed in NeedStatus::ALL {
                    for strategy in [ProposerKind::RuleBaseline, ProposerKind::Advisory] {
                        let proposal = StatusProposal {
                            status: proposed,
                            confidence_millionths: 900_000,
                            rationale: String::new(),
                            strategy,
                        };
                        let outcome =
                            apply_guardrails(previous, &proposal, &aggregate, &config);
                        assert!(
                            previous.is_legal_transition_to(outcome.final_status),
                            "illegal {previous}→{} (proposed {proposed}, {strategy:?})",
                            outcome.final_status
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn fragility_never_yields_green() {
        let config = NeedEngineConfig::default();
        let aggregate = aggregate_of(&[
            signal(SignalClassification::Stabilization, 800_000, None),
            signal(SignalClassification::FragilityAlert, 700_000, None),
        ]);
        for previous in NeedStatus::ALL {
            for proposed in NeedStatus::ALL {
                for strategy in [ProposerKind::RuleBaseline, ProposerKind::Advisory] {
                    let proposal = StatusProposal {
                        status: proposed,
                        confidence_millionths: 900_000,
                        rationale: String::new(),
                        strategy,
                    };
                    let outcome = apply_guardrails(previous, &proposal, &aggregate, &config);
                    assert_ne!(outcome.final_status, NeedStatus::Green);
                }
            }
        }
    }

    #[test]
    fn guardrail_outcome_serde_round_trip() {
        let outcome = GuardrailOutcome {
            final_status: NeedStatus::Red,
            applied: vec![Guardrail::TransitionLegality, Guardrail::RedFloor],
            raw_proposal_was_legal: false,
            hard_forced: true,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        let back: GuardrailOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(outcome, back);
    }

    #[test]
    fn guardrail_codes_are_distinct() {
        let codes: std::collections::BTreeSet<&str> =
            Guardrail::ALL.iter().map(|g| g.as_str()).collect();
        assert_eq!(codes.len(), Guardrail::ALL.len());
    }

    // ── Flag construction sanity for the scenarios above ───────────

    #[test]
    fn threshold_flags_reflect_default_config() {
        let aggregate = aggregate_of(&[
            signal(SignalClassification::Demand, 600_000, None),
            signal(SignalClassification::Demand, 600_000, None),
        ]);
        let expected = ThresholdFlags {
            demand_strong: true,
            ..ThresholdFlags::default()
        };
        assert_eq!(aggregate.flags, expected);
        assert_eq!(
            aggregate.scores,
            DimensionScores {
                demand_millionths: 1_200_000,
                ..DimensionScores::zero()
            }
        );
    }
}

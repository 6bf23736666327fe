//! Status proposer: the deterministic rule baseline and the advisory
//! strategy boundary.
//!
//! Both strategies produce a [`StatusProposal`]; the guardrail layer
//! reviews every proposal regardless of where it came from. The rule
//! baseline is always available and has zero external dependencies. The
//! advisory strategy calls out through [`AdvisoryClient`] — the only
//! operation in the engine allowed to block on I/O — and any failure,
//! timeout, or malformed response is treated as "advisory unavailable":
//! the engine silently falls back to the rule baseline for that call and
//! records the fallback in the audit, never surfacing it as an error.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::{DimensionScores, ThresholdFlags, WindowAggregate};
use crate::config::MILLION;
use crate::signal::clamp_unit_to_millionths;
use crate::status::NeedStatus;

// ---------------------------------------------------------------------------
// ProposerKind / StatusProposal
// ---------------------------------------------------------------------------

/// Which strategy produced a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposerKind {
    RuleBaseline,
    Advisory,
}

impl ProposerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RuleBaseline => "rule_baseline",
            Self::Advisory => "advisory",
        }
    }
}

impl fmt::Display for ProposerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate status before guardrail review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusProposal {
    pub status: NeedStatus,
    /// In millionths. The rule baseline always reports 1.0; advisory
    /// confidence passes through the guardrail confidence gate.
    pub confidence_millionths: i64,
    pub rationale: String,
    pub strategy: ProposerKind,
}

// ---------------------------------------------------------------------------
// Rule baseline
// ---------------------------------------------------------------------------

/// Deterministic rule baseline over the threshold flags.
///
/// Branch order is load-bearing: unmet strong demand dominates, then
/// insufficient-but-covered, then validated stabilization, then visible
/// coverage, then monitoring.
pub fn rule_baseline(flags: &ThresholdFlags) -> StatusProposal {
    let (status, rationale) = if flags.demand_strong && !flags.coverage_active {
        (
            NeedStatus::Red,
            "strong demand with no active coverage".to_string(),
        )
    } else if (flags.insufficiency_strong || flags.demand_strong) && flags.coverage_active {
        (
            NeedStatus::Orange,
            "coverage active but demand or insufficiency remains strong".to_string(),
        )
    } else if flags.stabilization_strong
        && !flags.fragility_alert
        && !flags.demand_strong
        && !flags.insufficiency_strong
    {
        (
            NeedStatus::Green,
            "stabilization strong with no contradicting pressure".to_string(),
        )
    } else if flags.coverage_active
        || (flags.coverage_intent && !flags.demand_strong && !flags.insufficiency_strong)
    {
        (
            NeedStatus::Yellow,
            "coverage visible, outcomes not yet validated".to_string(),
        )
    } else {
        (
            NeedStatus::White,
            "evidence too weak to assert a stronger status".to_string(),
        )
    };
    StatusProposal {
        status,
        confidence_millionths: MILLION,
        rationale,
        strategy: ProposerKind::RuleBaseline,
    }
}

// ---------------------------------------------------------------------------
// Advisory wire contract
// ---------------------------------------------------------------------------

/// Unit-interval float view of the scores for the advisory wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryScores {
    pub demand: f64,
    pub insufficiency: f64,
    pub stabilization: f64,
    pub fragility: f64,
    pub coverage: f64,
}

impl From<&DimensionScores> for AdvisoryScores {
    fn from(scores: &DimensionScores) -> Self {
        let unit = |millionths: i64| millionths as f64 / MILLION as f64;
        Self {
            demand: unit(scores.demand_millionths),
            insufficiency: unit(scores.insufficiency_millionths),
            stabilization: unit(scores.stabilization_millionths),
            fragility: unit(scores.fragility_millionths),
            coverage: unit(scores.coverage_millionths),
        }
    }
}

/// Request sent to the external advisory service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRequest {
    pub previous_status: NeedStatus,
    pub scores: AdvisoryScores,
    pub flags: ThresholdFlags,
    pub window_id: u64,
    pub top_evidence: Vec<String>,
    /// Legally reachable next statuses, self-edge included.
    pub allowed_transitions: Vec<NeedStatus>,
    pub status_definitions: String,
}

/// Response parsed back from the advisory service. A payload whose status
/// falls outside the five-status enum fails deserialization, which the
/// client surfaces as [`AdvisoryError::Malformed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryResponse {
    pub proposed_status: NeedStatus,
    pub confidence: f64,
    pub reasoning_summary: String,
    pub contradiction_detected: bool,
    pub key_evidence: Vec<String>,
}

/// Failures at the advisory boundary. All variants collapse to the same
/// engine behavior: fall back to the rule baseline and record why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdvisoryError {
    #[error("advisory call exceeded {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("advisory transport failure: {detail}")]
    Transport { detail: String },
    #[error("malformed advisory response: {detail}")]
    Malformed { detail: String },
}

/// Boundary to the external decision service. Implementations own the
/// transport and must enforce the passed timeout; the engine never blocks
/// on anything else.
pub trait AdvisoryClient: fmt::Debug + Send + Sync {
    fn propose(
        &self,
        request: &AdvisoryRequest,
        timeout_ms: u64,
    ) -> Result<AdvisoryResponse, AdvisoryError>;
}

/// Build the advisory request for one evaluation.
pub fn build_advisory_request(
    previous_status: NeedStatus,
    aggregate: &WindowAggregate,
) -> AdvisoryRequest {
    AdvisoryRequest {
        previous_status,
        scores: AdvisoryScores::from(&aggregate.scores),
        flags: aggregate.flags,
        window_id: aggregate.window_id,
        top_evidence: aggregate
            .top_contributions
            .iter()
            .filter(|contribution| !contribution.short_quote.is_empty())
            .map(|contribution| contribution.short_quote.clone())
            .collect(),
        allowed_transitions: previous_status.allowed_next(),
        status_definitions: STATUS_DEFINITIONS.to_string(),
    }
}

/// Human-readable status definitions sent alongside every advisory
/// request.
pub const STATUS_DEFINITIONS: &str = "\
WHITE: monitoring; evidence too weak to assert anything stronger.\n\
RED: critical; unmet demand with no active coverage.\n\
ORANGE: coverage active but still insufficient for the demand.\n\
YELLOW: coverage active; outcomes not yet validated.\n\
GREEN: validated, consistent stabilization across recent windows.";

/// Check an advisory response and convert it into a [`StatusProposal`].
///
/// Out-of-range or non-finite confidence makes the response unusable;
/// transition legality is deliberately not checked here — that is the
/// guardrail layer's job.
pub fn validate_advisory_response(
    response: &AdvisoryResponse,
) -> Result<StatusProposal, AdvisoryError> {
    if !response.confidence.is_finite() || !(0.0..=1.0).contains(&response.confidence) {
        return Err(AdvisoryError::Malformed {
            detail: format!("confidence {} outside [0, 1]", response.confidence),
        });
    }
    let mut rationale = response.reasoning_summary.clone();
    if response.contradiction_detected {
        rationale.push_str(" [advisory flagged contradicting evidence]");
    }
    Ok(StatusProposal {
        status: response.proposed_status,
        confidence_millionths: clamp_unit_to_millionths(response.confidence),
        rationale,
        strategy: ProposerKind::Advisory,
    })
}

// ---------------------------------------------------------------------------
// Mocks — deterministic advisory clients for tests and harnesses
// ---------------------------------------------------------------------------

/// Test helper advisory clients with scripted responses and failure
/// injection.
pub mod mocks {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    use super::*;

    /// Failure behavior applied before each scripted response.
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub enum MockFailureMode {
        #[default]
        Never,
        FailAlways {
            detail: &'static str,
        },
        FailAfterN {
            remaining_successes: u32,
            detail: &'static str,
        },
        LatencyInjection {
            millis: u64,
        },
    }

    fn apply_failure_mode(mode: &mut MockFailureMode) -> Result<(), &'static str> {
        match mode {
            MockFailureMode::Never => Ok(()),
            MockFailureMode::FailAlways { detail } => Err(detail),
            MockFailureMode::FailAfterN {
                remaining_successes,
                detail,
            } => {
                if *remaining_successes == 0 {
                    Err(detail)
                } else {
                    *remaining_successes -= 1;
                    Ok(())
                }
            }
            MockFailureMode::LatencyInjection { millis } => {
                thread::sleep(Duration::from_millis(*millis));
                Ok(())
            }
        }
    }

    /// Advisory client that replays a scripted queue of responses and
    /// records every request it received. An exhausted queue behaves as a
    /// timeout.
    #[derive(Debug, Default)]
    pub struct ScriptedAdvisoryClient {
        responses: Mutex<VecDeque<AdvisoryResponse>>,
        failure_mode: Mutex<MockFailureMode>,
        requests: Mutex<Vec<AdvisoryRequest>>,
    }

    impl ScriptedAdvisoryClient {
        pub fn new(responses: impl IntoIterator<Item = AdvisoryResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                failure_mode: Mutex::new(MockFailureMode::Never),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn with_failure_mode(self, failure_mode: MockFailureMode) -> Self {
            *self.failure_mode.lock().expect("mock state poisoned") = failure_mode;
            self
        }

        /// Requests captured so far, in call order.
        pub fn requests(&self) -> Vec<AdvisoryRequest> {
            self.requests.lock().expect("mock state poisoned").clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().expect("mock state poisoned").len()
        }
    }

    impl AdvisoryClient for ScriptedAdvisoryClient {
        fn propose(
            &self,
            request: &AdvisoryRequest,
            timeout_ms: u64,
        ) -> Result<AdvisoryResponse, AdvisoryError> {
            self.requests
                .lock()
                .expect("mock state poisoned")
                .push(request.clone());
            let mut mode = self.failure_mode.lock().expect("mock state poisoned");
            if let Err(detail) = apply_failure_mode(&mut mode) {
                return Err(AdvisoryError::Transport {
                    detail: detail.to_string(),
                });
            }
            self.responses
                .lock()
                .expect("mock state poisoned")
                .pop_front()
                .ok_or(AdvisoryError::Timeout { timeout_ms })
        }
    }

    /// Convenience constructor for a well-formed advisory response.
    pub fn advisory_response(status: NeedStatus, confidence: f64) -> AdvisoryResponse {
        AdvisoryResponse {
            proposed_status: status,
            confidence,
            reasoning_summary: format!("advisory proposes {status}"),
            contradiction_detected: false,
            key_evidence: Vec::new(),
        }
    }
}

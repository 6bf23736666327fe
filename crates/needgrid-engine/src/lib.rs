//! Need-level evaluation engine for emergency response coordination.
//!
//! Converts timestamped, weighted evidence signals per
//! (sector, capability) key into one canonical severity status using
//! windowed score aggregation, an optional advisory proposal step, and an
//! ordered guardrail pipeline that enforces safety invariants (never
//! silently escalate risk by omission, never flicker between unrelated
//! statuses, never trust low-confidence proposals).
//!
//! Data flows strictly downward through the modules:
//!
//! ```text
//!   signal (normalizer) ─> aggregate ─> propose ─> guardrail ─> store
//! ```
//!
//! Only the proposer boundary ([`propose::AdvisoryClient`]) may block on
//! I/O; every other component is a pure function of its inputs plus an
//! injected [`config::NeedEngineConfig`]. All confidences, scores, and
//! thresholds use fixed-point millionths (`1_000_000 = 1.0`) internally
//! for deterministic, replay-stable arithmetic.

#![forbid(unsafe_code)]

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod guardrail;
pub mod propose;
pub mod signal;
pub mod status;
pub mod store;

pub use engine::{EvaluationRequest, EvaluationResponse, NeedLevelEngine};
pub use status::{NeedLevel, NeedStatus};

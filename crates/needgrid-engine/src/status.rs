//! Severity statuses, the coarse need-level mapping, and the transition
//! legality state machine.
//!
//! The five statuses form a severity ladder used for clamping
//! (WHITE < GREEN < YELLOW < ORANGE < RED) and a directed legality graph
//! for status transitions:
//!
//! ```text
//!   WHITE  ──> {RED, YELLOW, ORANGE}
//!   RED    ──> {YELLOW, ORANGE}
//!   YELLOW ──> {ORANGE, GREEN, RED, WHITE}
//!   ORANGE ──> {GREEN, RED, YELLOW}
//!   GREEN  ──> {YELLOW, ORANGE, RED}
//! ```
//!
//! Staying in the same status is always legal. WHITE→GREEN and RED→GREEN
//! are deliberately absent: a sector must pass through an intermediate
//! validating status before it can be declared stabilized.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// NeedStatus — five-state severity status
// ---------------------------------------------------------------------------

/// Canonical severity status for a (sector, capability) key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NeedStatus {
    /// Monitoring: evidence too weak to assert anything stronger.
    White,
    /// Validated, consistent stabilization.
    Green,
    /// Coverage active, outcomes not yet validated.
    Yellow,
    /// Coverage active but still insufficient.
    Orange,
    /// Critical: unmet demand with no coverage.
    Red,
}

impl NeedStatus {
    /// All variants in severity order (least to most severe).
    pub const ALL: [Self; 5] = [
        Self::White,
        Self::Green,
        Self::Yellow,
        Self::Orange,
        Self::Red,
    ];

    /// Stable lowercase name used in logs and audit reasoning.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Orange => "orange",
            Self::Red => "red",
        }
    }

    /// Position on the severity ladder: WHITE(0) < GREEN(1) < YELLOW(2) <
    /// ORANGE(3) < RED(4).
    pub fn severity_rank(self) -> u8 {
        match self {
            Self::White => 0,
            Self::Green => 1,
            Self::Yellow => 2,
            Self::Orange => 3,
            Self::Red => 4,
        }
    }

    /// Inverse of [`severity_rank`](Self::severity_rank).
    pub fn from_severity_rank(rank: u8) -> Option<Self> {
        match rank {
            0 => Some(Self::White),
            1 => Some(Self::Green),
            2 => Some(Self::Yellow),
            3 => Some(Self::Orange),
            4 => Some(Self::Red),
            _ => None,
        }
    }

    /// Coarse 4-value mapping consumed by maps and coordination queues.
    pub fn need_level(self) -> NeedLevel {
        match self {
            Self::Red => NeedLevel::Critical,
            Self::Orange => NeedLevel::High,
            Self::Yellow => NeedLevel::Medium,
            Self::Green | Self::White => NeedLevel::Low,
        }
    }

    /// Directed legality edges out of this status, excluding the always
    /// legal self-edge.
    pub fn legal_targets(self) -> &'static [NeedStatus] {
        match self {
            Self::White => &[Self::Red, Self::Yellow, Self::Orange],
            Self::Red => &[Self::Yellow, Self::Orange],
            Self::Yellow => &[Self::Orange, Self::Green, Self::Red, Self::White],
            Self::Orange => &[Self::Green, Self::Red, Self::Yellow],
            Self::Green => &[Self::Yellow, Self::Orange, Self::Red],
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn is_legal_transition_to(self, next: NeedStatus) -> bool {
        self == next || self.legal_targets().contains(&next)
    }

    /// All legal next statuses, self-edge included, in severity order.
    pub fn allowed_next(self) -> Vec<NeedStatus> {
        Self::ALL
            .into_iter()
            .filter(|next| self.is_legal_transition_to(*next))
            .collect()
    }

    /// Nearest legal status stepping one rank at a time from `self` toward
    /// `toward` along the severity ladder.
    ///
    /// Used by the legality guardrail to clamp an illegal rule-baseline
    /// proposal onto the closest legal intermediate. Returns `None` when no
    /// status between `self` and `toward` (inclusive) is legally reachable,
    /// in which case the caller keeps the previous status.
    pub fn step_toward(self, toward: NeedStatus) -> Option<NeedStatus> {
        if self == toward {
            return Some(self);
        }
        let toward_rank = i16::from(toward.severity_rank());
        let step: i16 = if toward_rank > i16::from(self.severity_rank()) {
            1
        } else {
            -1
        };
        let mut rank = i16::from(self.severity_rank()) + step;
        loop {
            let candidate = Self::from_severity_rank(rank as u8)?;
            if self.is_legal_transition_to(candidate) {
                return Some(candidate);
            }
            if rank == toward_rank {
                return None;
            }
            rank += step;
        }
    }
}

impl fmt::Display for NeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// NeedLevel — coarse 4-value mapping
// ---------------------------------------------------------------------------

/// Coarse need level: RED→critical, ORANGE→high, YELLOW→medium,
/// GREEN|WHITE→low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl NeedLevel {
    /// Stable lowercase name used in persisted rows and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for NeedLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

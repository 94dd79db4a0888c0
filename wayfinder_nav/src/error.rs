// Error types for the navigation core.
//
// Nothing in this crate is fatal to the host. Every failure either means
// "fall back to unassisted steering and retry later" (planning) or "move on
// to the next eligible tier" (recovery). The variants carry enough context
// for rate-limited logging and for the ladder to decide what to do next.
//
// See also: `log.rs` for the throttle that keeps persistent failures from
// flooding the log.

use crate::recovery::Tier;
use crate::types::CellPos;
use std::fmt;

/// Why planning could not produce waypoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlanFailure {
    /// The owning context could not capture the window (unloaded start,
    /// tracked target gone).
    NoSnapshot,
    /// Start and goal are farther apart than any bounded window allows.
    SeparationTooLarge,
    /// The owning context did not answer within the capture timeout.
    CaptureTimedOut,
    /// No standable cell near the agent.
    NoStandableStart,
    /// Neither the goal search nor the escape fallback found a route.
    NoRoute,
    /// The pursuit changed while the plan was computed.
    Stale,
    /// The host implements a different `WorldQuery` version.
    IncompatibleHost,
}

impl fmt::Display for PlanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PlanFailure::NoSnapshot => "no snapshot",
            PlanFailure::SeparationTooLarge => "start and goal too far apart",
            PlanFailure::CaptureTimedOut => "snapshot capture timed out",
            PlanFailure::NoStandableStart => "no standable start cell",
            PlanFailure::NoRoute => "no route",
            PlanFailure::Stale => "pursuit changed during planning",
            PlanFailure::IncompatibleHost => "host world interface version mismatch",
        };
        f.write_str(text)
    }
}

/// Main navigation error type.
#[derive(Debug, thiserror::Error)]
pub enum NavError {
    /// Planning produced nothing; the caller steers unassisted.
    #[error("planning unavailable: {0}")]
    PlanningUnavailable(PlanFailure),

    /// A recovery tier's precondition was unmet or its action had no effect.
    #[error("recovery tier {tier:?} failed: {reason}")]
    RecoveryTierFailed { tier: Tier, reason: &'static str },

    /// The action would touch a protected or hazardous cell.
    #[error("hazard or protected cell at {cell}")]
    HazardBlocked { cell: CellPos },

    /// A tier spent its time or action budget.
    #[error("recovery tier {tier:?} exhausted its budget")]
    ResourceExhausted { tier: Tier },

    /// The owning context did not run a marshalled job in time.
    #[error("owning context unavailable")]
    OwnerUnavailable,

    #[error("configuration error: {0}")]
    Config(String),
}

impl NavError {
    /// Whether retrying later (after a cooldown) can succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, NavError::Config(_))
    }

    /// The recovery tier this error belongs to, if any.
    #[must_use]
    pub fn tier(&self) -> Option<Tier> {
        match self {
            NavError::RecoveryTierFailed { tier, .. } | NavError::ResourceExhausted { tier } => {
                Some(*tier)
            }
            _ => None,
        }
    }

    pub(crate) fn tier_failed(tier: Tier, reason: &'static str) -> Self {
        NavError::RecoveryTierFailed { tier, reason }
    }
}

impl From<PlanFailure> for NavError {
    fn from(failure: PlanFailure) -> Self {
        NavError::PlanningUnavailable(failure)
    }
}

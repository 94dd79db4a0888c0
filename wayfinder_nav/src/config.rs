// Data-driven navigation configuration.
//
// Every tunable threshold of the navigation core lives in `NavConfig`, loaded
// from JSON by the host (or built from `Default`). The core never uses magic
// numbers: progress deltas, window sizes, tier thresholds, cooldowns and
// budgets are all read from here. The values were tuned empirically and have
// no derivation beyond play-testing, so hosts are expected to override them.
//
// Parameters are grouped per component: `SnapshotParams`, `PlannerParams`,
// `OrchestratorParams`, `ProgressParams`, and `RecoveryParams` (which nests
// one group per recovery tier plus `DistressParams`). Every group is
// `#[serde(default)]`, so a JSON document only needs the fields it changes.
//
// See also: `navigator.rs` which owns the config, `recovery/mod.rs` for how
// tier thresholds drive tier selection.

use crate::error::NavError;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Component parameter groups
// ---------------------------------------------------------------------------

/// Largest snapshot width/depth any config may ask for.
pub const WINDOW_LIMIT_XZ: i32 = 49;
/// Largest snapshot height any config may ask for.
pub const WINDOW_LIMIT_Y: i32 = 7;

/// Window selection for `VoxelSnapshot::capture`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotParams {
    /// Horizontal half-extent of the start-centered window.
    pub centered_half_xz: i32,
    /// Vertical half-extent of the start-centered window.
    pub centered_half_y: i32,
    /// Horizontal padding around the start/goal bounding box.
    pub margin_xz: i32,
    /// Vertical padding around the start/goal bounding box.
    pub margin_y: i32,
    /// Cap on window width/depth in cells, at most `WINDOW_LIMIT_XZ`.
    pub max_extent_xz: i32,
    /// Cap on window height in cells, at most `WINDOW_LIMIT_Y`.
    pub max_extent_y: i32,
    /// Start/goal horizontal separation above which no snapshot is taken.
    pub max_separation: f64,
}

impl Default for SnapshotParams {
    fn default() -> Self {
        Self {
            centered_half_xz: 24,
            centered_half_y: 3,
            margin_xz: 6,
            margin_y: 2,
            max_extent_xz: WINDOW_LIMIT_XZ,
            max_extent_y: WINDOW_LIMIT_Y,
            max_separation: 60.0,
        }
    }
}

/// Search costs and waypoint compression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerParams {
    /// Cost of one horizontal step.
    pub step_cost: u32,
    /// Extra cost when the step also climbs or drops one level.
    pub vertical_extra_cost: u32,
    /// How far from the agent's cell to look for a standable start cell.
    pub start_search_radius: i32,
    /// Standable cells within this radius of the goal all count as arrival.
    pub goal_radius: i32,
    /// A waypoint is kept after this much travel since the previous one.
    pub keep_distance: f64,
    /// Cap on the compressed waypoint list.
    pub max_waypoints: usize,
    /// Weight of path cost against goal improvement when scoring doors.
    pub escape_cost_weight: f64,
    /// Upper bound on node expansions per search.
    pub max_expansions: usize,
}

impl Default for PlannerParams {
    fn default() -> Self {
        Self {
            step_cost: 10,
            vertical_extra_cost: 4,
            start_search_radius: 2,
            goal_radius: 2,
            keep_distance: 3.0,
            max_waypoints: 7,
            escape_cost_weight: 1.0,
            max_expansions: 20_000,
        }
    }
}

/// Plan scheduling, rate limiting and the owning-context round-trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorParams {
    pub min_interval_ms: u64,
    /// Minimum interval for forced requests.
    pub forced_interval_ms: u64,
    /// A request whose target lies within this many cells of the last planned
    /// target is suppressed while that plan is fresh.
    pub retarget_tolerance: f64,
    /// How long a worker waits for the owning context to capture a snapshot.
    pub capture_timeout_ms: u64,
    /// Minimum interval between start-centered escape plans.
    pub escape_interval_ms: u64,
    /// How long a crossed door stays excluded from escape planning.
    pub door_memory_ms: u64,
    pub worker_threads: usize,
    /// Minimum interval between repeated failure logs per agent and kind.
    pub failure_log_interval_ms: u64,
}

impl Default for OrchestratorParams {
    fn default() -> Self {
        Self {
            min_interval_ms: 1200,
            forced_interval_ms: 650,
            retarget_tolerance: 2.0,
            capture_timeout_ms: 900,
            escape_interval_ms: 2500,
            door_memory_ms: 8000,
            worker_threads: 2,
            failure_log_interval_ms: 5000,
        }
    }
}

/// Stuck detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressParams {
    /// Distance-to-goal improvement that counts as progress.
    pub min_progress_delta: f64,
    /// Distance from the anchor that counts as a true escape.
    pub escape_distance: f64,
    /// Stagnant ticks after which the anchor is recorded.
    pub anchor_after_ticks: u32,
    /// Capacity of the failed-direction ring.
    pub failed_direction_capacity: usize,
    /// Goal displacement that starts a fresh episode.
    pub goal_reset_distance: f64,
    /// Distance to goal at which the pursuit counts as arrived.
    pub arrival_radius: f64,
}

impl Default for ProgressParams {
    fn default() -> Self {
        Self {
            min_progress_delta: 0.35,
            escape_distance: 2.0,
            anchor_after_ticks: 10,
            failed_direction_capacity: 6,
            goal_reset_distance: 1.5,
            arrival_radius: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Recovery tiers
// ---------------------------------------------------------------------------

/// Tier 1: quick nudge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgeParams {
    pub min_ticks: u32,
    pub cooldown_ms: u64,
    /// Bonus per unit of openness (fraction of open neighbors, 0..1).
    pub openness_weight: f64,
    /// Stagnation after which heading straight at the goal is penalized.
    pub long_stuck_ticks: u32,
    pub stuck_penalty: f64,
    /// Penalty per recent failure in the same direction.
    pub failed_direction_penalty: f64,
    /// Stagnation after which random exploration noise is added.
    pub very_stuck_ticks: u32,
    pub exploration_noise: f64,
    pub diagonal_cost: f64,
    pub climb_cost: f64,
}

impl Default for NudgeParams {
    fn default() -> Self {
        Self {
            min_ticks: 30,
            cooldown_ms: 900,
            openness_weight: 1.5,
            long_stuck_ticks: 60,
            stuck_penalty: 1.5,
            failed_direction_penalty: 2.0,
            very_stuck_ticks: 90,
            exploration_noise: 1.0,
            diagonal_cost: 1.41,
            climb_cost: 0.5,
        }
    }
}

/// Tier 2: backup and sidestep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SidestepParams {
    pub min_ticks: u32,
    /// Farthest sidestep distance tried, in cells.
    pub max_distance: i32,
    /// Impulses spent steering toward the chosen sidestep cell.
    pub steer_steps: u32,
    /// Impulses per direction in the jump+sprint fallback.
    pub burst_steps: u32,
}

impl Default for SidestepParams {
    fn default() -> Self {
        Self {
            min_ticks: 60,
            max_distance: 4,
            steer_steps: 12,
            burst_steps: 3,
        }
    }
}

/// Tier 3: obstruction mining.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningParams {
    pub min_ticks: u32,
    pub cooldown_ms: u64,
    pub budget_ms: u64,
    pub max_cells: u32,
    /// Re-checks for cascading loose material above an opened cell.
    pub stabilize_attempts: u32,
}

impl Default for MiningParams {
    fn default() -> Self {
        Self {
            min_ticks: 45,
            cooldown_ms: 1200,
            budget_ms: 9000,
            max_cells: 12,
            stabilize_attempts: 4,
        }
    }
}

/// Tier 4: panic flee.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleeParams {
    pub min_ticks: u32,
    pub retry_cooldown_ms: u64,
    pub samples: u32,
    pub min_distance: f64,
    pub max_distance: f64,
    /// How long the goal stays detached while fleeing.
    pub duration_ms: u64,
    pub openness_weight: f64,
    pub away_weight: f64,
    pub jitter: f64,
}

impl Default for FleeParams {
    fn default() -> Self {
        Self {
            min_ticks: 90,
            retry_cooldown_ms: 5000,
            samples: 12,
            min_distance: 4.0,
            max_distance: 8.0,
            duration_ms: 3000,
            openness_weight: 1.0,
            away_weight: 1.5,
            jitter: 0.25,
        }
    }
}

/// Tier 5: pillar/mine escalation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationParams {
    pub min_ticks: u32,
    /// Blocked horizontal neighbors (of 4) that count as enclosure.
    pub enclosure_threshold: u32,
    /// Maximum pillar height in cells.
    pub max_pillar: u32,
    pub budget_ms: u64,
}

impl Default for EscalationParams {
    fn default() -> Self {
        Self {
            min_ticks: 120,
            enclosure_threshold: 2,
            max_pillar: 2,
            budget_ms: 12_000,
        }
    }
}

/// Tier 6: mine to surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceParams {
    pub min_ticks: u32,
    pub cooldown_ms: u64,
    pub budget_ms: u64,
    pub max_steps: u32,
    /// Weight of goal alignment when choosing the staircase direction.
    pub goal_bias: f64,
    /// Radius scanned for constructed material before each step.
    pub constructed_radius: i32,
    /// Constructed cells within the radius that abort the climb.
    pub constructed_limit: u32,
    /// Consecutive steps without upward movement before giving up.
    pub stall_limit: u32,
}

impl Default for SurfaceParams {
    fn default() -> Self {
        Self {
            min_ticks: 135,
            cooldown_ms: 30_000,
            budget_ms: 45_000,
            max_steps: 64,
            goal_bias: 0.25,
            constructed_radius: 4,
            constructed_limit: 3,
            stall_limit: 3,
        }
    }
}

/// The externally handled distress signal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistressParams {
    pub stagnant_ticks: u32,
    /// Distress is only raised when the goal is at least this far away.
    pub min_distance: f64,
    pub cooldown_ms: u64,
}

impl Default for DistressParams {
    fn default() -> Self {
        Self {
            stagnant_ticks: 200,
            min_distance: 12.0,
            cooldown_ms: 60_000,
        }
    }
}

/// All recovery ladder parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryParams {
    pub nudge: NudgeParams,
    pub sidestep: SidestepParams,
    pub mining: MiningParams,
    pub flee: FleeParams,
    pub escalation: EscalationParams,
    pub surface: SurfaceParams,
    pub distress: DistressParams,
    /// Pause between discrete worker-side actions (face/break/step).
    pub action_pacing_ms: u64,
    /// How long a cell stays off-limits to mining after being targeted.
    pub mine_retarget_ms: u64,
}

impl Default for RecoveryParams {
    fn default() -> Self {
        Self {
            nudge: NudgeParams::default(),
            sidestep: SidestepParams::default(),
            mining: MiningParams::default(),
            flee: FleeParams::default(),
            escalation: EscalationParams::default(),
            surface: SurfaceParams::default(),
            distress: DistressParams::default(),
            action_pacing_ms: 150,
            mine_retarget_ms: 1500,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Complete navigation configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    pub snapshot: SnapshotParams,
    pub planner: PlannerParams,
    pub orchestrator: OrchestratorParams,
    pub progress: ProgressParams,
    pub recovery: RecoveryParams,
    /// Seed for per-agent exploration randomness.
    pub seed: u64,
}

impl NavConfig {
    /// Parse a (possibly partial) JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self, NavError> {
        let config: NavConfig =
            serde_json::from_str(json).map_err(|e| NavError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, NavError> {
        serde_json::to_string_pretty(self).map_err(|e| NavError::Config(e.to_string()))
    }

    /// Reject values the components cannot work with.
    pub fn validate(&self) -> Result<(), NavError> {
        let s = &self.snapshot;
        if s.max_extent_xz < 1 || s.max_extent_y < 1 {
            return Err(NavError::Config("snapshot extents must be positive".into()));
        }
        if s.max_extent_xz > WINDOW_LIMIT_XZ || s.max_extent_y > WINDOW_LIMIT_Y {
            return Err(NavError::Config(format!(
                "snapshot extents are capped at {WINDOW_LIMIT_XZ}x{WINDOW_LIMIT_Y}x{WINDOW_LIMIT_XZ}"
            )));
        }
        if s.centered_half_xz < 1 || s.centered_half_y < 1 {
            return Err(NavError::Config("snapshot half-extents must be positive".into()));
        }
        if 2 * s.centered_half_xz + 1 > s.max_extent_xz
            || 2 * s.centered_half_y + 1 > s.max_extent_y
        {
            return Err(NavError::Config(
                "start-centered window exceeds the maximum snapshot extent".into(),
            ));
        }
        if s.max_separation <= 0.0 {
            return Err(NavError::Config("max_separation must be positive".into()));
        }

        let p = &self.planner;
        if p.step_cost == 0 || p.max_waypoints == 0 || p.max_expansions == 0 {
            return Err(NavError::Config(
                "planner step cost, waypoint cap and expansion cap must be non-zero".into(),
            ));
        }

        if self.orchestrator.worker_threads == 0 {
            return Err(NavError::Config("worker_threads must be at least 1".into()));
        }
        if self.orchestrator.forced_interval_ms > self.orchestrator.min_interval_ms {
            return Err(NavError::Config(
                "forced_interval_ms must not exceed min_interval_ms".into(),
            ));
        }

        let g = &self.progress;
        if g.min_progress_delta <= 0.0 || g.escape_distance <= 0.0 {
            return Err(NavError::Config(
                "progress delta and escape distance must be positive".into(),
            ));
        }
        if g.failed_direction_capacity == 0 {
            return Err(NavError::Config("failed_direction_capacity must be non-zero".into()));
        }

        let f = &self.recovery.flee;
        if f.samples == 0 || f.min_distance <= 0.0 || f.min_distance > f.max_distance {
            return Err(NavError::Config(
                "flee needs samples and a positive distance range".into(),
            ));
        }
        if self.recovery.surface.max_steps == 0 || self.recovery.mining.max_cells == 0 {
            return Err(NavError::Config("recovery budgets must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        NavConfig::default().validate().unwrap();
    }

    #[test]
    fn default_config_roundtrips_through_json() {
        let config = NavConfig::default();
        let json = config.to_json().unwrap();
        let restored = NavConfig::from_json(&json).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let json = r#"{
            "planner": { "max_waypoints": 5 },
            "recovery": { "nudge": { "min_ticks": 20 } }
        }"#;
        let config = NavConfig::from_json(json).unwrap();
        assert_eq!(config.planner.max_waypoints, 5);
        assert_eq!(config.planner.step_cost, 10);
        assert_eq!(config.recovery.nudge.min_ticks, 20);
        assert_eq!(config.recovery.nudge.cooldown_ms, 900);
        assert_eq!(config.recovery.mining.min_ticks, 45);
        assert_eq!(config.orchestrator.capture_timeout_ms, 900);
    }

    #[test]
    fn oversized_window_rejected() {
        let json = r#"{ "snapshot": { "centered_half_xz": 40 } }"#;
        let err = NavConfig::from_json(json).unwrap_err();
        assert!(matches!(err, NavError::Config(_)));
    }

    #[test]
    fn extents_beyond_the_window_limit_rejected() {
        for json in [
            r#"{ "snapshot": { "max_extent_xz": 64 } }"#,
            r#"{ "snapshot": { "max_extent_y": 9 } }"#,
        ] {
            let err = NavConfig::from_json(json).unwrap_err();
            assert!(err.to_string().contains("capped at 49x7x49"), "{json}: {err}");
        }
    }

    #[test]
    fn zero_extents_rejected() {
        for json in [
            r#"{ "snapshot": { "max_extent_xz": 0 } }"#,
            r#"{ "snapshot": { "max_extent_y": 0 } }"#,
        ] {
            let err = NavConfig::from_json(json).unwrap_err();
            assert!(err.to_string().contains("must be positive"), "{json}: {err}");
        }
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(matches!(
            NavConfig::from_json("{ not json"),
            Err(NavError::Config(_))
        ));
    }

    #[test]
    fn tier_thresholds_default_to_ladder_order() {
        let r = RecoveryParams::default();
        assert!(r.nudge.min_ticks < r.mining.min_ticks);
        assert!(r.mining.min_ticks < r.sidestep.min_ticks);
        assert!(r.sidestep.min_ticks < r.flee.min_ticks);
        assert!(r.flee.min_ticks < r.escalation.min_ticks);
        assert!(r.escalation.min_ticks < r.surface.min_ticks);
    }
}

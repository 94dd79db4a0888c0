// Per-agent navigation state and the registry that owns it.
//
// Every agent gets one `AgentNav` record, created on first use and shared by
// `Arc` between the owning context and any worker currently planning or
// recovering for that agent. Each group of fields has its own
// `parking_lot::Mutex` so a worker reading the intent never contends with
// steering advancing the waypoint cursor.
//
// Write discipline:
// - Bulk clears on goal/mode change and waypoint installs happen only on the
//   owning context.
// - Workers write only through jobs marshalled onto the owning context
//   (tier ledger updates, the flee override, mining retarget cooldowns).
// - The two in-flight flags are atomics, claimed with `InFlightGuard`.
//
// The intent epoch is the optimistic-concurrency token: it is bumped on
// every goal or mode change, captured when a plan starts, and compared again
// before the plan is installed.
//
// See also: `orchestrator.rs` which installs waypoints, `progress.rs` which
// updates `StuckTrackState`, `recovery/mod.rs` for `TierLedger`.

use crate::config::RecoveryParams;
use crate::recovery::{Tier, TierLedger};
use crate::types::{AgentId, CellPos, HorizontalDir, NavGoal, Point3, PursuitMode};
use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

/// What the agent is currently trying to do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Intent {
    pub goal: Option<NavGoal>,
    pub mode: PursuitMode,
    /// Bumped on every goal or mode change.
    pub epoch: u64,
}

impl Intent {
    /// Set the goal. Returns `true` if it changed (and the epoch moved).
    pub fn set_goal(&mut self, goal: Option<NavGoal>) -> bool {
        if self.goal == goal {
            return false;
        }
        self.goal = goal;
        self.epoch += 1;
        true
    }

    pub fn set_mode(&mut self, mode: PursuitMode) -> bool {
        if self.mode == mode {
            return false;
        }
        self.mode = mode;
        self.epoch += 1;
        true
    }

    /// Whether a plan started under `epoch` for `goal` may still be applied.
    pub fn still_wants(&self, epoch: u64, goal: NavGoal) -> bool {
        self.epoch == epoch && self.goal == Some(goal)
    }
}

// ---------------------------------------------------------------------------
// Waypoints
// ---------------------------------------------------------------------------

/// The cells steering should move through, in order.
///
/// The cell list is only ever replaced as a whole. Steering consumes it by
/// moving the cursor forward.
#[derive(Clone, Debug, Default)]
pub struct WaypointQueue {
    cells: Vec<CellPos>,
    cursor: usize,
}

impl WaypointQueue {
    pub fn replace(&mut self, cells: Vec<CellPos>) {
        self.cells = cells;
        self.cursor = 0;
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.cursor = 0;
    }

    pub fn current(&self) -> Option<CellPos> {
        self.cells.get(self.cursor).copied()
    }

    pub fn advance(&mut self) {
        if self.cursor < self.cells.len() {
            self.cursor += 1;
        }
    }

    /// Waypoints not yet reached.
    pub fn remaining(&self) -> &[CellPos] {
        &self.cells[self.cursor..]
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.cells.len()
    }
}

// ---------------------------------------------------------------------------
// Cooldowns
// ---------------------------------------------------------------------------

/// Plan scheduling memory. The in-flight handle is `AgentNav::plan_in_flight`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NavCooldownState {
    pub last_plan_at: Option<u64>,
    pub last_planned_target: Option<CellPos>,
    /// Last soft door the agent stood in, and when.
    pub last_door: Option<(CellPos, u64)>,
    pub last_escape_at: Option<u64>,
}

impl NavCooldownState {
    /// The recently crossed door, if it is still remembered at `now`.
    pub fn remembered_door(&self, now: u64, memory_ms: u64) -> Option<CellPos> {
        self.last_door
            .filter(|&(_, at)| now.saturating_sub(at) < memory_ms)
            .map(|(cell, _)| cell)
    }

    pub fn escape_allowed(&self, now: u64, interval_ms: u64) -> bool {
        self.last_escape_at
            .is_none_or(|at| now.saturating_sub(at) >= interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Stuck tracking
// ---------------------------------------------------------------------------

/// Bounded ring of recently failed nudge directions, oldest first.
#[derive(Clone, Debug, Default)]
pub struct FailedDirections {
    dirs: SmallVec<[HorizontalDir; 8]>,
}

impl FailedDirections {
    pub fn push(&mut self, dir: HorizontalDir, capacity: usize) {
        while self.dirs.len() >= capacity.max(1) {
            self.dirs.remove(0);
        }
        self.dirs.push(dir);
    }

    pub fn count(&self, dir: HorizontalDir) -> usize {
        self.dirs.iter().filter(|&&d| d == dir).count()
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn clear(&mut self) {
        self.dirs.clear();
    }
}

/// Progress model for one pursuit episode.
#[derive(Clone, Debug, Default)]
pub struct StuckTrackState {
    pub stagnant_ticks: u32,
    pub best_distance: Option<f64>,
    pub anchor: Option<Point3>,
    /// Goal position this episode is measured against.
    pub goal: Option<Point3>,
    pub failed_directions: FailedDirections,
    pub tiers: TierLedger,
    pub last_distress_at: Option<u64>,
}

impl StuckTrackState {
    /// Start a fresh episode. Distress history survives.
    pub fn reset_episode(&mut self) {
        let last_distress_at = self.last_distress_at;
        *self = Self {
            last_distress_at,
            ..Self::default()
        };
    }
}

// ---------------------------------------------------------------------------
// Recovery bookkeeping
// ---------------------------------------------------------------------------

/// The recovery tier currently running on a worker. Its deadline is fixed
/// when the tier is launched, so time spent waiting for the pool or the
/// owning context counts against the budget.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecoveryAttempt {
    pub tier: Tier,
    pub started_at: u64,
    pub deadline: u64,
    /// Cells the tier may break or place.
    pub cell_budget: u32,
}

impl RecoveryAttempt {
    pub fn new(tier: Tier, now: u64, params: &RecoveryParams) -> Self {
        let (budget_ms, cell_budget) = tier.budget(params);
        Self {
            tier,
            started_at: now,
            deadline: now + budget_ms,
            cell_budget,
        }
    }
}

/// A temporary steering target that replaces the goal while fleeing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FleeOverride {
    pub target: Point3,
    pub until: u64,
}

// ---------------------------------------------------------------------------
// The per-agent record
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AgentNav {
    pub agent: AgentId,
    pub intent: Mutex<Intent>,
    pub waypoints: Mutex<WaypointQueue>,
    pub cooldown: Mutex<NavCooldownState>,
    pub stuck: Mutex<StuckTrackState>,
    pub attempt: Mutex<Option<RecoveryAttempt>>,
    pub flee: Mutex<Option<FleeOverride>>,
    /// Cell -> time until which mining tiers leave it alone.
    pub mine_cooldowns: Mutex<FxHashMap<CellPos, u64>>,
    pub rng: Mutex<StdRng>,
    plan_in_flight: AtomicBool,
    recovery_in_flight: AtomicBool,
}

impl AgentNav {
    pub fn new(agent: AgentId, seed: u64) -> Self {
        Self {
            agent,
            intent: Mutex::new(Intent::default()),
            waypoints: Mutex::new(WaypointQueue::default()),
            cooldown: Mutex::new(NavCooldownState::default()),
            stuck: Mutex::new(StuckTrackState::default()),
            attempt: Mutex::new(None),
            flee: Mutex::new(None),
            mine_cooldowns: Mutex::new(FxHashMap::default()),
            rng: Mutex::new(StdRng::seed_from_u64(seed ^ agent.0)),
            plan_in_flight: AtomicBool::new(false),
            recovery_in_flight: AtomicBool::new(false),
        }
    }

    pub fn plan_in_flight(&self) -> bool {
        self.plan_in_flight.load(Ordering::Acquire)
    }

    pub fn recovery_in_flight(&self) -> bool {
        self.recovery_in_flight.load(Ordering::Acquire)
    }

    /// Drop everything tied to the current pursuit. Owning context only.
    pub fn reset_pursuit(&self) {
        self.waypoints.lock().clear();
        {
            let mut cooldown = self.cooldown.lock();
            // Door memory outlives the pursuit: it describes where the agent
            // has been, not where it is going.
            let last_door = cooldown.last_door;
            *cooldown = NavCooldownState {
                last_door,
                ..NavCooldownState::default()
            };
        }
        self.stuck.lock().reset_episode();
        *self.flee.lock() = None;
    }

    /// Whether a mining tier may target `cell` at `now`.
    pub fn may_mine(&self, cell: CellPos, now: u64) -> bool {
        self.mine_cooldowns
            .lock()
            .get(&cell)
            .is_none_or(|&until| now >= until)
    }

    pub fn note_mined(&self, cell: CellPos, until: u64, now: u64) {
        let mut map = self.mine_cooldowns.lock();
        map.retain(|_, &mut u| u > now);
        map.insert(cell, until);
    }
}

/// Which in-flight flag a guard holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flight {
    Plan,
    Recovery,
}

/// Holds one of an agent's in-flight flags and releases it on drop, so a
/// worker that errors out or panics never leaves the agent locked.
#[derive(Debug)]
pub struct InFlightGuard {
    nav: Arc<AgentNav>,
    flight: Flight,
}

impl InFlightGuard {
    /// Claim the flag, or `None` if it is already held.
    pub fn try_acquire(nav: &Arc<AgentNav>, flight: Flight) -> Option<Self> {
        let flag = Self::flag(nav, flight);
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self {
            nav: Arc::clone(nav),
            flight,
        })
    }

    pub fn nav(&self) -> &Arc<AgentNav> {
        &self.nav
    }

    fn flag(nav: &AgentNav, flight: Flight) -> &AtomicBool {
        match flight {
            Flight::Plan => &nav.plan_in_flight,
            Flight::Recovery => &nav.recovery_in_flight,
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        Self::flag(&self.nav, self.flight).store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// All per-agent records, keyed by agent identity.
#[derive(Debug)]
pub struct NavRegistry {
    agents: RwLock<FxHashMap<AgentId, Arc<AgentNav>>>,
    seed: u64,
}

impl NavRegistry {
    pub fn new(seed: u64) -> Self {
        Self {
            agents: RwLock::new(FxHashMap::default()),
            seed,
        }
    }

    pub fn get(&self, agent: AgentId) -> Option<Arc<AgentNav>> {
        self.agents.read().get(&agent).cloned()
    }

    pub fn get_or_insert(&self, agent: AgentId) -> Arc<AgentNav> {
        if let Some(nav) = self.get(agent) {
            return nav;
        }
        let mut agents = self.agents.write();
        Arc::clone(
            agents
                .entry(agent)
                .or_insert_with(|| Arc::new(AgentNav::new(agent, self.seed))),
        )
    }

    /// Forget an agent. Workers still holding its record finish against the
    /// detached copy and their results fail revalidation.
    pub fn remove(&self, agent: AgentId) -> Option<Arc<AgentNav>> {
        self.agents.write().remove(&agent)
    }

    /// Whether `nav` is still the live record for its agent.
    pub fn is_current(&self, nav: &Arc<AgentNav>) -> bool {
        self.get(nav.agent).is_some_and(|live| Arc::ptr_eq(&live, nav))
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

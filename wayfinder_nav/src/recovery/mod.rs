// The stuck-recovery ladder: tier selection, shared safety rules and the
// worker-side action context.
//
// Six tiers, each unlocked by a stagnation threshold and gated by its own
// cooldown or once-per-episode flag:
//
//   Nudge (30)      impulse toward the best-scoring neighbor; owning context
//   Mining (45)     clear a prioritized set of obstructing cells
//   Sidestep (60)   back up or step aside along a clear lane
//   Flee (90)       detach from the goal and run to an open spot
//   Escalation (120) dig or pillar out of an enclosure
//   Surface (135)   staircase upward until the sky is visible
//
// Mining unlocks before Sidestep and both stay eligible side by side; the
// two are independent layers, not a sequence. `select_tier` is a pure
// function of (stagnant ticks, ledger, now): among eligible tiers it picks
// the one with the highest threshold, so the longer the agent has been
// stuck the heavier the intervention.
//
// Nudge runs synchronously inside the tick. Every other tier runs on a
// worker while the agent's recovery flag is held, which suppresses the whole
// ladder for that agent. Workers reach the world only through
// `RecoveryCtx`, whose helpers marshal each action onto the owning context
// via `OwnerAccess` and re-check the shared hazard filter against the live
// world right before breaking anything.
//
// See also: `progress.rs` for the stagnation counter, `navigator.rs` which
// drives the ladder each tick, and the per-tier modules below.

pub mod escalate;
pub mod flee;
pub mod mining;
pub mod nudge;
pub mod sidestep;
pub mod surface;

use crate::clock::Clock;
use crate::config::RecoveryParams;
use crate::error::NavError;
use crate::owner::OwnerAccess;
use crate::state::{AgentNav, RecoveryAttempt};
use crate::survey::LocalSurvey;
use crate::types::{AgentId, CellPos, DoorKind, HorizontalDir, Point3};
use crate::world::{NavHost, WorldQuery, body_fits};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

/// One rung of the recovery ladder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Nudge,
    Sidestep,
    Mining,
    Flee,
    Escalation,
    Surface,
}

impl Tier {
    pub const ALL: [Tier; 6] = [
        Tier::Nudge,
        Tier::Sidestep,
        Tier::Mining,
        Tier::Flee,
        Tier::Escalation,
        Tier::Surface,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Stagnant ticks at which the tier unlocks.
    pub fn min_ticks(self, params: &RecoveryParams) -> u32 {
        match self {
            Tier::Nudge => params.nudge.min_ticks,
            Tier::Sidestep => params.sidestep.min_ticks,
            Tier::Mining => params.mining.min_ticks,
            Tier::Flee => params.flee.min_ticks,
            Tier::Escalation => params.escalation.min_ticks,
            Tier::Surface => params.surface.min_ticks,
        }
    }

    /// Tiers that fire at most once per stagnation episode.
    pub fn once_per_episode(self) -> bool {
        matches!(self, Tier::Sidestep | Tier::Flee | Tier::Escalation)
    }

    /// Wall-clock budget and cell budget for worker tiers.
    pub fn budget(self, params: &RecoveryParams) -> (u64, u32) {
        match self {
            Tier::Nudge => (0, 0),
            Tier::Sidestep => (
                params.action_pacing_ms
                    * u64::from(params.sidestep.steer_steps + 4 * 2 * params.sidestep.burst_steps),
                0,
            ),
            Tier::Mining => (params.mining.budget_ms, params.mining.max_cells),
            Tier::Flee => (params.flee.duration_ms, 0),
            Tier::Escalation => (params.escalation.budget_ms, 2 + params.escalation.max_pillar),
            Tier::Surface => (params.surface.budget_ms, 3 * params.surface.max_steps),
        }
    }
}

/// Per-tier attempted flags and cooldown deadlines for one episode.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TierLedger {
    attempted: [bool; 6],
    next_allowed: [u64; 6],
}

impl TierLedger {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn attempted(&self, tier: Tier) -> bool {
        self.attempted[tier.index()]
    }

    pub fn mark_attempted(&mut self, tier: Tier) {
        self.attempted[tier.index()] = true;
    }

    pub fn cool_down(&mut self, tier: Tier, until: u64) {
        let slot = &mut self.next_allowed[tier.index()];
        *slot = (*slot).max(until);
    }

    /// Whether the tier's gate is open at `now`.
    pub fn ready(&self, tier: Tier, now: u64) -> bool {
        !(tier.once_per_episode() && self.attempted(tier)) && now >= self.next_allowed[tier.index()]
    }

    /// Close the tier's gate after it ran.
    pub fn record(&mut self, tier: Tier, succeeded: bool, now: u64, params: &RecoveryParams) {
        match tier {
            Tier::Nudge => self.cool_down(tier, now + params.nudge.cooldown_ms),
            Tier::Sidestep | Tier::Escalation => self.mark_attempted(tier),
            Tier::Mining => self.cool_down(tier, now + params.mining.cooldown_ms),
            Tier::Flee if succeeded => self.mark_attempted(tier),
            Tier::Flee => self.cool_down(tier, now + params.flee.retry_cooldown_ms),
            Tier::Surface => self.cool_down(tier, now + params.surface.cooldown_ms),
        }
    }
}

/// The tier to run this tick, if any: the eligible tier with the highest
/// threshold.
pub fn select_tier(
    stagnant_ticks: u32,
    ledger: &TierLedger,
    now: u64,
    params: &RecoveryParams,
) -> Option<Tier> {
    Tier::ALL
        .into_iter()
        .filter(|&t| stagnant_ticks >= t.min_ticks(params) && ledger.ready(t, now))
        .max_by_key(|&t| (t.min_ticks(params), t))
}

// ---------------------------------------------------------------------------
// Shared predicates
// ---------------------------------------------------------------------------

/// The hazard/protection filter every mining-capable tier goes through.
///
/// `Ok(true)`: the cell is solid and safe to break. `Ok(false)`: nothing to
/// break (air, unloaded, a door). `Err(HazardBlocked)`: the cell is
/// protected or hazardous, or opening it would expose a hazard.
pub fn breakable<W: WorldQuery + ?Sized>(world: &W, cell: CellPos) -> Result<bool, NavError> {
    if !world.is_loaded(cell) || world.door_kind(cell) != DoorKind::None {
        return Ok(false);
    }
    if world.is_protected(cell) || world.is_hazard(cell) {
        return Err(NavError::HazardBlocked { cell });
    }
    if !world.is_solid(cell) {
        return Ok(false);
    }
    let exposes = [
        cell.up(1),
        cell.down(1),
        cell.offset(1, 0, 0),
        cell.offset(-1, 0, 0),
        cell.offset(0, 0, 1),
        cell.offset(0, 0, -1),
    ]
    .into_iter()
    .any(|n| world.is_hazard(n));
    if exposes {
        return Err(NavError::HazardBlocked { cell });
    }
    Ok(true)
}

/// `true` if the cell is either open already or safe to break.
pub fn clearable<W: WorldQuery + ?Sized>(world: &W, cell: CellPos) -> bool {
    world.is_passable(cell) || matches!(breakable(world, cell), Ok(true))
}

/// Fraction of the eight horizontal neighbors a body fits into.
pub fn openness<W: WorldQuery + ?Sized>(world: &W, cell: CellPos) -> f64 {
    let open = HorizontalDir::ALL
        .into_iter()
        .filter(|&d| body_fits(world, cell.step(d)))
        .count();
    open as f64 / 8.0
}

/// Horizontal unit vector from `from` toward `goal`, defaulting to east when
/// they share a column.
pub fn goal_heading(from: Point3, goal: Point3) -> (f64, f64) {
    from.horizontal_direction_to(goal).unwrap_or((1.0, 0.0))
}

// ---------------------------------------------------------------------------
// Worker-side context
// ---------------------------------------------------------------------------

/// Wall-clock and action budget of one tier run.
#[derive(Debug)]
pub struct Budget {
    tier: Tier,
    deadline: u64,
    max_actions: u32,
    actions: u32,
}

impl Budget {
    pub fn new(tier: Tier, now: u64, duration_ms: u64, max_actions: u32) -> Self {
        Self {
            tier,
            deadline: now + duration_ms,
            max_actions,
            actions: 0,
        }
    }

    /// Whether time remains at `now`.
    pub fn has_time(&self, now: u64) -> bool {
        now < self.deadline
    }

    /// Account for one world-mutating action.
    pub fn spend(&mut self, now: u64) -> Result<(), NavError> {
        if !self.has_time(now) || self.actions >= self.max_actions {
            return Err(NavError::ResourceExhausted { tier: self.tier });
        }
        self.actions += 1;
        Ok(())
    }

    pub fn actions(&self) -> u32 {
        self.actions
    }

    pub fn deadline(&self) -> u64 {
        self.deadline
    }
}

/// Everything a worker-side tier needs. All world access goes through
/// `owner`.
pub struct RecoveryCtx<'a, H, A> {
    pub tier: Tier,
    pub agent: AgentId,
    pub nav: Arc<AgentNav>,
    pub owner: &'a A,
    pub clock: &'a dyn Clock,
    pub params: &'a RecoveryParams,
    pub goal: Point3,
    _host: PhantomData<fn(&mut H)>,
}

impl<'a, H, A> RecoveryCtx<'a, H, A>
where
    H: NavHost,
    A: OwnerAccess<H>,
{
    pub fn new(
        tier: Tier,
        nav: Arc<AgentNav>,
        owner: &'a A,
        clock: &'a dyn Clock,
        params: &'a RecoveryParams,
        goal: Point3,
    ) -> Self {
        Self {
            tier,
            agent: nav.agent,
            nav,
            owner,
            clock,
            params,
            goal,
            _host: PhantomData,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// The budget of the attempt the navigator launched this tier under, or
    /// a fresh one when the tier is driven directly.
    pub fn budget(&self) -> Budget {
        let attempt = (*self.nav.attempt.lock())
            .filter(|a| a.tier == self.tier)
            .unwrap_or_else(|| RecoveryAttempt::new(self.tier, self.now(), self.params));
        Budget::new(
            self.tier,
            attempt.started_at,
            attempt.deadline.saturating_sub(attempt.started_at),
            attempt.cell_budget,
        )
    }

    pub fn fail(&self, reason: &'static str) -> NavError {
        NavError::tier_failed(self.tier, reason)
    }

    /// Pause between discrete actions.
    pub fn pace(&self) {
        self.clock
            .sleep(Duration::from_millis(self.params.action_pacing_ms));
    }

    pub fn position(&self) -> Result<Point3, NavError> {
        let agent = self.agent;
        self.owner
            .run(move |h: &mut H| h.position(agent))?
            .ok_or_else(|| self.fail("agent has no position"))
    }

    /// The agent's position and a survey of the box around its feet.
    pub fn observe(&self, radius_xz: i32, radius_y: i32) -> Result<(Point3, LocalSurvey), NavError> {
        let agent = self.agent;
        self.owner
            .run(move |h: &mut H| {
                h.position(agent)
                    .map(|p| (p, LocalSurvey::capture(&*h, p.cell(), radius_xz, radius_y)))
            })?
            .ok_or_else(|| self.fail("agent has no position"))
    }

    /// One impulse toward `point`. Returns the position afterwards.
    pub fn impulse(&self, point: Point3, jump: bool, sprint: bool) -> Result<Point3, NavError> {
        let agent = self.agent;
        let moved = self.owner.run(move |h: &mut H| {
            h.set_sprinting(agent, sprint);
            if jump {
                h.jump(agent);
            }
            h.apply_impulse_toward(agent, point);
            if sprint {
                h.set_sprinting(agent, false);
            }
            h.position(agent)
        })?;
        self.pace();
        moved.ok_or_else(|| self.fail("agent has no position"))
    }

    /// Steer toward `point` for up to `steps` impulses, stopping on arrival.
    pub fn walk_to(&self, point: Point3, steps: u32) -> Result<Point3, NavError> {
        let mut at = self.position()?;
        for _ in 0..steps {
            if at.horizontal_distance(point) < 0.3 {
                break;
            }
            let climb = point.y > at.y + 0.5;
            at = self.impulse(point, climb, false)?;
        }
        Ok(at)
    }

    /// Break `cell` on the owning context after re-running the hazard
    /// filter and the per-cell retarget cooldown against the live world.
    /// `Ok(false)` means there was nothing (allowed) to break.
    pub fn break_cell(&self, cell: CellPos, budget: &mut Budget) -> Result<bool, NavError> {
        budget.spend(self.now())?;
        let agent = self.agent;
        let nav = Arc::clone(&self.nav);
        let now = self.now();
        let until = now + self.params.mine_retarget_ms;
        let broke = self.owner.run(move |h: &mut H| {
            if !nav.may_mine(cell, now) || !breakable(&*h, cell)? {
                return Ok::<bool, NavError>(false);
            }
            h.face(agent, cell);
            let broke = h.try_break(agent, cell);
            nav.note_mined(cell, until, now);
            Ok(broke)
        })??;
        self.pace();
        Ok(broke)
    }

    /// Jump and place disposable material underfoot. Returns `false` when
    /// the agent has nothing to place or the host refused.
    pub fn pillar_step(&self, budget: &mut Budget) -> Result<bool, NavError> {
        budget.spend(self.now())?;
        let agent = self.agent;
        let placed = self.owner.run(move |h: &mut H| {
            let Some(at) = h.position(agent) else {
                return false;
            };
            let feet = at.cell();
            if !h.has_placeable(agent) || !body_fits(&*h, feet.up(1)) {
                return false;
            }
            h.jump(agent);
            h.place_block(agent, feet)
        })?;
        self.pace();
        Ok(placed)
    }
}

/// Run a worker-side tier to completion.
pub fn run_worker_tier<H, A>(ctx: &RecoveryCtx<'_, H, A>) -> Result<(), NavError>
where
    H: NavHost,
    A: OwnerAccess<H>,
{
    match ctx.tier {
        Tier::Nudge => Err(ctx.fail("nudge runs on the owning context")),
        Tier::Sidestep => sidestep::run(ctx),
        Tier::Mining => mining::run(ctx),
        Tier::Flee => flee::run(ctx),
        Tier::Escalation => escalate::run(ctx),
        Tier::Surface => surface::run(ctx),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::SparseWorld;
    use crate::types::AgentId;
    use crate::world::AgentBody;
    use parking_lot::Mutex;

    pub const AGENT: AgentId = AgentId(1);

    /// A world, clock and agent record for driving a worker tier inline.
    pub struct Rig {
        pub world: Mutex<SparseWorld>,
        pub clock: ManualClock,
        pub params: RecoveryParams,
        pub nav: Arc<AgentNav>,
    }

    impl Rig {
        pub fn new(world: SparseWorld, feet: CellPos) -> Self {
            let mut world = world;
            world.place_agent(AGENT, feet.center());
            Self {
                world: Mutex::new(world),
                clock: ManualClock::new(10_000),
                params: RecoveryParams::default(),
                nav: Arc::new(AgentNav::new(AGENT, 42)),
            }
        }

        pub fn run(&self, tier: Tier, goal: Point3) -> Result<(), NavError> {
            let ctx = RecoveryCtx::<'_, SparseWorld, _>::new(
                tier,
                Arc::clone(&self.nav),
                &self.world,
                &self.clock,
                &self.params,
                goal,
            );
            run_worker_tier(&ctx)
        }

        pub fn position(&self) -> Point3 {
            self.world.lock().position(AGENT).unwrap()
        }
    }

    /// Floor at 63 with protected walls and ceiling boxing in the cell at
    /// (0, 64, 0). Everything the agent could touch is protected.
    pub fn protected_cell() -> SparseWorld {
        let mut world = SparseWorld::flat(-6, 6, 63);
        for x in -1..=1 {
            for z in -1..=1 {
                world.protect(CellPos::new(x, 63, z));
                world.protect(CellPos::new(x, 66, z));
                if x != 0 || z != 0 {
                    world.protect(CellPos::new(x, 64, z));
                    world.protect(CellPos::new(x, 65, z));
                }
            }
        }
        world
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::testing::SparseWorld;

    fn params() -> RecoveryParams {
        RecoveryParams::default()
    }

    #[test]
    fn nothing_below_first_threshold() {
        assert_eq!(select_tier(29, &TierLedger::default(), 0, &params()), None);
        assert_eq!(
            select_tier(30, &TierLedger::default(), 0, &params()),
            Some(Tier::Nudge)
        );
    }

    #[test]
    fn highest_eligible_threshold_wins() {
        let ledger = TierLedger::default();
        assert_eq!(select_tier(50, &ledger, 0, &params()), Some(Tier::Mining));
        assert_eq!(select_tier(65, &ledger, 0, &params()), Some(Tier::Sidestep));
        assert_eq!(select_tier(95, &ledger, 0, &params()), Some(Tier::Flee));
        assert_eq!(select_tier(500, &ledger, 0, &params()), Some(Tier::Surface));
    }

    #[test]
    fn gated_tiers_fall_through_to_lower_ones() {
        let p = params();
        let mut ledger = TierLedger::default();
        ledger.record(Tier::Sidestep, false, 0, &p);
        assert_eq!(select_tier(65, &ledger, 0, &p), Some(Tier::Mining));
        ledger.record(Tier::Mining, true, 0, &p);
        assert_eq!(select_tier(65, &ledger, 100, &p), Some(Tier::Nudge));
        // Mining's cooldown elapses; sidestep stays spent for the episode.
        assert_eq!(select_tier(65, &ledger, 1200, &p), Some(Tier::Mining));
        ledger.clear();
        assert_eq!(select_tier(65, &ledger, 0, &p), Some(Tier::Sidestep));
    }

    #[test]
    fn flee_failure_retries_after_cooldown_success_is_final() {
        let p = params();
        let mut ledger = TierLedger::default();
        ledger.record(Tier::Flee, false, 1000, &p);
        assert!(!ledger.ready(Tier::Flee, 5999));
        assert!(ledger.ready(Tier::Flee, 6000));
        ledger.record(Tier::Flee, true, 6000, &p);
        assert!(!ledger.ready(Tier::Flee, 1_000_000));
    }

    #[test]
    fn hazard_filter() {
        let mut world = SparseWorld::flat(-5, 5, 63);
        world.protect(CellPos::new(1, 64, 0));
        world.solid(CellPos::new(2, 64, 0));
        world.solid(CellPos::new(3, 64, 0));
        world.hazard(CellPos::new(4, 64, 0));
        assert!(matches!(
            breakable(&world, CellPos::new(1, 64, 0)),
            Err(NavError::HazardBlocked { .. })
        ));
        assert!(breakable(&world, CellPos::new(2, 64, 0)).unwrap());
        // Breaking next to lava would let it in.
        assert!(breakable(&world, CellPos::new(3, 64, 0)).is_err());
        assert!(!breakable(&world, CellPos::new(0, 64, 0)).unwrap());
        assert!(clearable(&world, CellPos::new(0, 64, 0)));
        assert!(!clearable(&world, CellPos::new(1, 64, 0)));
    }

    #[test]
    fn openness_counts_fitting_neighbors() {
        let mut world = SparseWorld::flat(-5, 5, 63);
        let c = CellPos::new(0, 64, 0);
        assert_eq!(openness(&world, c), 1.0);
        world.solid(CellPos::new(1, 65, 0));
        world.solid(CellPos::new(-1, 64, 0));
        assert_eq!(openness(&world, c), 0.75);
    }

    #[test]
    fn budget_limits_time_and_actions() {
        let mut b = Budget::new(Tier::Mining, 100, 50, 2);
        assert!(b.spend(100).is_ok());
        assert!(b.spend(120).is_ok());
        assert!(matches!(
            b.spend(120),
            Err(NavError::ResourceExhausted { tier: Tier::Mining })
        ));
        let mut b = Budget::new(Tier::Surface, 100, 50, 10);
        assert!(b.spend(150).is_err());
    }

    #[test]
    fn budget_deadline_comes_from_the_launched_attempt() {
        let rig = Rig::new(SparseWorld::flat(-5, 5, 63), CellPos::new(0, 64, 0));
        let now = rig.clock.now_ms();
        let ctx: RecoveryCtx<'_, SparseWorld, _> = RecoveryCtx::new(
            Tier::Mining,
            Arc::clone(&rig.nav),
            &rig.world,
            &rig.clock,
            &rig.params,
            Point3::new(10.0, 64.0, 0.5),
        );
        assert!(ctx.budget().spend(now).is_ok());

        // Launched long enough ago that the budget ran out while queued.
        let launched = now - rig.params.mining.budget_ms - 1;
        *rig.nav.attempt.lock() = Some(RecoveryAttempt::new(Tier::Mining, launched, &rig.params));
        let mut budget = ctx.budget();
        assert_eq!(budget.deadline(), now - 1);
        assert!(matches!(
            budget.spend(now),
            Err(NavError::ResourceExhausted { tier: Tier::Mining })
        ));
    }

    #[test]
    fn break_cell_rechecks_live_world_and_cooldown() {
        let mut world = SparseWorld::flat(-5, 5, 63);
        world.solid(CellPos::new(1, 64, 0));
        world.protect(CellPos::new(-1, 64, 0));
        let rig = Rig::new(world, CellPos::new(0, 64, 0));
        let ctx: RecoveryCtx<'_, SparseWorld, _> = RecoveryCtx::new(
            Tier::Mining,
            Arc::clone(&rig.nav),
            &rig.world,
            &rig.clock,
            &rig.params,
            Point3::new(10.0, 64.0, 0.5),
        );
        let mut budget = ctx.budget();
        assert!(ctx.break_cell(CellPos::new(1, 64, 0), &mut budget).unwrap());
        assert!(matches!(
            ctx.break_cell(CellPos::new(-1, 64, 0), &mut budget),
            Err(NavError::HazardBlocked { .. })
        ));
        // Re-solidified within the retarget window: left alone.
        rig.world.lock().solid(CellPos::new(1, 64, 0));
        assert!(!ctx.break_cell(CellPos::new(1, 64, 0), &mut budget).unwrap());
        assert_eq!(rig.world.lock().broken, vec![CellPos::new(1, 64, 0)]);
    }
}

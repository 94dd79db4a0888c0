// The navigation facade a host drives once per tick.
//
// `Navigator<H>` owns everything the navigation core shares between the
// owning context and its workers: the config, the clock, the per-agent
// registry, the rayon worker pool, the channel back onto the owning context,
// the failure-log throttle and a set of counters. The host calls, from its
// tick thread:
//
// - `request_plan_to_goal` / `request_plan_to_target` when it wants a route,
// - `tick_and_check_stuck` every tick per moving agent (progress tracking,
//   door memory and opening, the recovery ladder; returns the distress
//   signal),
// - `steer_target` to learn where to push the agent next,
// - `pump` to run jobs workers have marshalled onto the owning context.
//
// Nothing here blocks the owning context. Plan searches and recovery tiers
// above the first run on the pool; their world access comes back through
// `pump`.
//
// See also: `orchestrator.rs` for the plan pipeline, `recovery/mod.rs` for
// the ladder, `state.rs` for the per-agent record.

use crate::clock::Clock;
use crate::config::NavConfig;
use crate::error::NavError;
use crate::log::LogThrottle;
use crate::orchestrator::{self, PlanRequest, Skip};
use crate::owner::{OwnerLink, OwnerQueue};
use crate::progress::track_progress;
use crate::recovery::{RecoveryCtx, Tier, nudge, run_worker_tier, select_tier};
use crate::state::{AgentNav, Flight, InFlightGuard, NavRegistry, RecoveryAttempt};
use crate::types::{AgentId, CellPos, DoorKind, NavGoal, PlanReason, Point3, PursuitMode, TargetId};
use crate::world::{NavHost, is_compatible};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A waypoint counts as reached within this horizontal distance of its
/// center...
const REACHED_XZ: f64 = 0.75;
/// ...and this vertical distance.
const REACHED_Y: f64 = 1.5;
/// A closed soft door on the next waypoint is opened within this horizontal
/// distance.
const DOOR_REACH: f64 = 1.5;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) requests: AtomicU64,
    pub(crate) skipped: AtomicU64,
    pub(crate) searches: AtomicU64,
    pub(crate) installed: AtomicU64,
    pub(crate) stale: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) recoveries_started: AtomicU64,
    pub(crate) recoveries_succeeded: AtomicU64,
    pub(crate) distress: AtomicU64,
}

/// Point-in-time copy of the navigator's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NavStats {
    /// Plan requests received.
    pub requests: u64,
    /// Requests (or captures) suppressed before any search ran.
    pub skipped: u64,
    /// Planner searches run, escape retries included.
    pub searches: u64,
    pub installed: u64,
    /// Results discarded because the pursuit changed underneath them.
    pub stale: u64,
    pub failed: u64,
    pub recoveries_started: u64,
    pub recoveries_succeeded: u64,
    pub distress: u64,
}

impl Counters {
    fn snapshot(&self) -> NavStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        NavStats {
            requests: get(&self.requests),
            skipped: get(&self.skipped),
            searches: get(&self.searches),
            installed: get(&self.installed),
            stale: get(&self.stale),
            failed: get(&self.failed),
            recoveries_started: get(&self.recoveries_started),
            recoveries_succeeded: get(&self.recoveries_succeeded),
            distress: get(&self.distress),
        }
    }
}

// ---------------------------------------------------------------------------
// Navigator
// ---------------------------------------------------------------------------

/// State shared between the owning context and workers.
pub(crate) struct NavShared<H> {
    pub(crate) config: NavConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) registry: NavRegistry,
    pub(crate) link: OwnerLink<H>,
    pub(crate) pool: rayon::ThreadPool,
    pub(crate) throttle: LogThrottle,
    pub(crate) counters: Counters,
}

/// Where steering should push the agent next.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SteerTarget {
    /// The next unreached waypoint.
    Waypoint(CellPos),
    /// A flee destination that temporarily replaces the goal.
    Flee(Point3),
}

pub struct Navigator<H: NavHost + 'static> {
    shared: Arc<NavShared<H>>,
    queue: OwnerQueue<H>,
}

impl<H: NavHost + 'static> Navigator<H> {
    /// Validate `config` and start the worker pool.
    pub fn new(config: NavConfig, clock: Arc<dyn Clock>) -> Result<Self, NavError> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.orchestrator.worker_threads)
            .thread_name(|i| format!("wayfinder-worker-{i}"))
            .build()
            .map_err(|e| NavError::Config(e.to_string()))?;
        let queue = OwnerQueue::new(Duration::from_millis(
            config.orchestrator.capture_timeout_ms,
        ));
        let shared = NavShared {
            registry: NavRegistry::new(config.seed),
            throttle: LogThrottle::new(config.orchestrator.failure_log_interval_ms),
            link: queue.link(),
            pool,
            clock,
            counters: Counters::default(),
            config,
        };
        Ok(Self {
            shared: Arc::new(shared),
            queue,
        })
    }

    pub fn config(&self) -> &NavConfig {
        &self.shared.config
    }

    fn now(&self) -> u64 {
        self.shared.clock.now_ms()
    }

    /// Run every job workers have queued for the owning context.
    pub fn pump(&self, host: &mut H) -> usize {
        self.queue.drain(host)
    }

    pub fn stats(&self) -> NavStats {
        self.shared.counters.snapshot()
    }

    // -- Plan requests ------------------------------------------------------

    pub fn request_plan_to_goal(
        &self,
        agent: AgentId,
        cell: CellPos,
        force: bool,
        reason: PlanReason,
    ) -> Result<(), Skip> {
        self.request_plan(PlanRequest {
            agent,
            goal: NavGoal::Fixed(cell),
            force,
            reason,
        })
    }

    pub fn request_plan_to_target(
        &self,
        agent: AgentId,
        target: TargetId,
        force: bool,
        reason: PlanReason,
    ) -> Result<(), Skip> {
        self.request_plan(PlanRequest {
            agent,
            goal: NavGoal::Tracked(target),
            force,
            reason,
        })
    }

    /// Admit a request and start its search, or report why it was skipped.
    pub fn request_plan(&self, request: PlanRequest) -> Result<(), Skip> {
        let counters = &self.shared.counters;
        counters.requests.fetch_add(1, Ordering::Relaxed);
        let nav = self.shared.registry.get_or_insert(request.agent);
        match orchestrator::admit(&nav, request, self.now(), &self.shared.config.orchestrator) {
            Ok(ticket) => {
                tracing::debug!(agent = %request.agent, reason = ?request.reason, "plan admitted");
                orchestrator::launch(&self.shared, ticket);
                Ok(())
            }
            Err(skip) => {
                counters.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(agent = %request.agent, ?skip, "plan request skipped");
                Err(skip)
            }
        }
    }

    /// Change the behavior driving the agent. A change abandons the current
    /// pursuit's waypoints and cooldowns.
    pub fn set_mode(&self, agent: AgentId, mode: PursuitMode) {
        let nav = self.shared.registry.get_or_insert(agent);
        let changed = nav.intent.lock().set_mode(mode);
        if changed {
            nav.reset_pursuit();
            tracing::debug!(agent = %agent, ?mode, "pursuit mode changed");
        }
    }

    /// Forget everything about an agent. Work in flight for it finishes
    /// against the detached record and is discarded.
    pub fn clear(&self, agent: AgentId) {
        if self.shared.registry.remove(agent).is_some() {
            tracing::debug!(agent = %agent, "navigation state cleared");
        }
        self.shared.throttle.forget(agent);
    }

    // -- Queries ------------------------------------------------------------

    /// Waypoints the agent has not reached yet.
    pub fn waypoints(&self, agent: AgentId) -> Vec<CellPos> {
        self.shared
            .registry
            .get(agent)
            .map(|nav| nav.waypoints.lock().remaining().to_vec())
            .unwrap_or_default()
    }

    /// The soft door the agent last stood in, while it is still remembered.
    pub fn last_crossed_door(&self, agent: AgentId) -> Option<CellPos> {
        let nav = self.shared.registry.get(agent)?;
        let memory = self.shared.config.orchestrator.door_memory_ms;
        nav.cooldown.lock().remembered_door(self.now(), memory)
    }

    /// No plan and no recovery running for the agent.
    pub fn is_idle(&self, agent: AgentId) -> bool {
        self.shared
            .registry
            .get(agent)
            .is_none_or(|nav| !nav.plan_in_flight() && !nav.recovery_in_flight())
    }

    /// Where to steer an agent standing at `position`. Reached waypoints are
    /// consumed; an active flee overrides the waypoints.
    pub fn steer_target(&self, agent: AgentId, position: Point3) -> Option<SteerTarget> {
        let nav = self.shared.registry.get(agent)?;
        let now = self.now();
        {
            let mut flee = nav.flee.lock();
            match *flee {
                Some(f) if now < f.until => return Some(SteerTarget::Flee(f.target)),
                Some(_) => *flee = None,
                None => {}
            }
        }
        let mut waypoints = nav.waypoints.lock();
        while let Some(cell) = waypoints.current() {
            let center = cell.center();
            let reached = position.horizontal_distance(center) < REACHED_XZ
                && (position.y - center.y).abs() < REACHED_Y;
            if !reached {
                return Some(SteerTarget::Waypoint(cell));
            }
            waypoints.advance();
        }
        None
    }

    // -- Per-tick stuck handling --------------------------------------------

    /// Track progress toward `goal`, run the recovery ladder, and report
    /// whether the agent should raise a distress signal.
    pub fn tick_and_check_stuck(&self, host: &mut H, agent: AgentId, goal: Point3) -> bool {
        let config = &self.shared.config;
        let nav = self.shared.registry.get_or_insert(agent);
        let now = self.now();
        if !is_compatible(&*host) {
            if self.shared.throttle.allow(agent, "host_version", now) {
                tracing::warn!(agent = %agent, "host world interface version mismatch; navigation idle");
            }
            return false;
        }
        let Some(position) = host.position(agent) else {
            return false;
        };

        let cell = position.cell();
        if host.door_kind(cell) == DoorKind::Soft {
            nav.cooldown.lock().last_door = Some((cell, now));
        }
        self.open_door_ahead(host, &nav, position);

        if position.distance(goal) <= config.progress.arrival_radius {
            nav.waypoints.lock().clear();
            nav.stuck.lock().reset_episode();
            return false;
        }

        let (stagnant, distance, distress, tier) = {
            let mut stuck = nav.stuck.lock();
            let report = track_progress(&mut stuck, position, goal, &config.progress);
            let d = &config.recovery.distress;
            let distress = report.stagnant_ticks >= d.stagnant_ticks
                && report.distance >= d.min_distance
                && stuck
                    .last_distress_at
                    .is_none_or(|at| now.saturating_sub(at) >= d.cooldown_ms);
            if distress {
                stuck.last_distress_at = Some(now);
            }
            let busy = nav.recovery_in_flight() || nav.flee.lock().is_some();
            let tier = if busy {
                None
            } else {
                select_tier(report.stagnant_ticks, &stuck.tiers, now, &config.recovery)
            };
            (report.stagnant_ticks, report.distance, distress, tier)
        };

        if distress {
            self.shared.counters.distress.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(agent = %agent, stagnant, distance, "agent stuck; raising distress");
        }
        match tier {
            Some(Tier::Nudge) => self.run_nudge(host, &nav, goal, now),
            Some(tier) => self.start_recovery(&nav, tier, goal, now),
            None => {}
        }
        distress
    }

    /// Open the closed soft door the next waypoint runs through, once the
    /// agent is close enough to reach it.
    fn open_door_ahead(&self, host: &mut H, nav: &AgentNav, position: Point3) {
        let Some(next) = nav.waypoints.lock().current() else {
            return;
        };
        if position.horizontal_distance(next.center()) > DOOR_REACH {
            return;
        }
        for cell in [next, next.up(1)] {
            if host.door_kind(cell) == DoorKind::Soft
                && !host.is_passable(cell)
                && host.try_open_door(nav.agent, cell)
            {
                tracing::debug!(agent = %nav.agent, %cell, "opened door on route");
            }
        }
    }

    fn run_nudge(&self, host: &mut H, nav: &Arc<AgentNav>, goal: Point3, now: u64) {
        let config = &self.shared.config;
        let result = {
            let mut stuck = nav.stuck.lock();
            let stagnant = stuck.stagnant_ticks;
            let mut rng = nav.rng.lock();
            let result = nudge::run(
                host,
                nav.agent,
                goal,
                stagnant,
                &mut stuck.failed_directions,
                config.progress.failed_direction_capacity,
                &mut *rng,
                &config.recovery.nudge,
            );
            stuck.tiers.record(Tier::Nudge, result.is_ok(), now, &config.recovery);
            result
        };
        match result {
            Ok(dir) => tracing::debug!(agent = %nav.agent, ?dir, "nudged"),
            Err(e) => tracing::debug!(agent = %nav.agent, error = %e, "nudge found no opening"),
        }
    }

    fn start_recovery(&self, nav: &Arc<AgentNav>, tier: Tier, goal: Point3, now: u64) {
        let Some(guard) = InFlightGuard::try_acquire(nav, Flight::Recovery) else {
            return;
        };
        *nav.attempt.lock() = Some(RecoveryAttempt::new(tier, now, &self.shared.config.recovery));
        self.shared
            .counters
            .recoveries_started
            .fetch_add(1, Ordering::Relaxed);
        tracing::debug!(agent = %nav.agent, ?tier, "starting recovery tier");

        let shared = Arc::clone(&self.shared);
        self.shared.pool.spawn(move || {
            let result = {
                let ctx = RecoveryCtx::<'_, H, OwnerLink<H>>::new(
                    tier,
                    Arc::clone(guard.nav()),
                    &shared.link,
                    shared.clock.as_ref(),
                    &shared.config.recovery,
                    goal,
                );
                run_worker_tier(&ctx)
            };
            let owner = Arc::clone(&shared);
            let posted = shared
                .link
                .post(move |_host: &mut H| finish_recovery(&owner, guard, tier, result));
            if posted.is_err() {
                tracing::debug!(?tier, "owning context gone; recovery result dropped");
            }
        });
    }
}

/// Record a finished tier on the owning context and release the flag.
fn finish_recovery<H>(
    shared: &NavShared<H>,
    guard: InFlightGuard,
    tier: Tier,
    result: Result<(), NavError>,
) {
    let nav = guard.nav();
    let agent = nav.agent;
    let now = shared.clock.now_ms();
    *nav.attempt.lock() = None;
    if !shared.registry.is_current(nav) {
        return;
    }
    {
        let mut stuck = nav.stuck.lock();
        stuck
            .tiers
            .record(tier, result.is_ok(), now, &shared.config.recovery);
        // A flee that chose a destination has run its course; whatever
        // happened, the agent starts over.
        if result.is_ok() && tier == Tier::Flee {
            stuck.reset_episode();
        }
    }
    match result {
        Ok(()) => {
            shared
                .counters
                .recoveries_succeeded
                .fetch_add(1, Ordering::Relaxed);
            tracing::info!(agent = %agent, ?tier, "recovery tier succeeded");
        }
        Err(e @ NavError::RecoveryTierFailed { .. }) => {
            tracing::debug!(agent = %agent, ?tier, error = %e, "recovery tier failed");
        }
        Err(e) => {
            if shared.throttle.allow(agent, "recovery_failed", now) {
                tracing::warn!(agent = %agent, ?tier, error = %e, "recovery tier failed");
            }
        }
    }
}

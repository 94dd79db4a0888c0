// Plan orchestration: admission, capture, off-thread search and install.
//
// A plan request moves through four stages:
//
// 1. Admission (owning context, synchronous). `admit` records the goal in the
//    agent's intent, applies the rate limits and claims the agent's plan
//    flag. A goal change resets the pursuit first, so it always gets through
//    the rate limit. Re-aiming a fixed goal by a cell or two is a retarget,
//    not a new pursuit: it keeps the cooldowns, so hosts can re-request
//    every tick without flooding the pool.
// 2. Capture (owning context, via `OwnerLink`). A worker asks the owning
//    context for a `VoxelSnapshot`. The job revalidates the intent, resolves
//    a tracked target to a cell, and reads the door memory and escape gate.
//    If the owning context does not answer within `capture_timeout_ms` the
//    plan is abandoned without fuss.
// 3. Search (worker). `plan_waypoints` over the snapshot. If there is no
//    route and the escape gate is open, a second, start-centered capture is
//    requested and searched for a door only.
// 4. Install (owning context). The result is applied only if the agent
//    record is still live and its intent still has the epoch and goal the
//    request was admitted under. Otherwise it is counted as stale and
//    dropped; nothing is ever cancelled mid-flight.
//
// The plan flag is held by an `InFlightGuard` that travels with the request
// into the install job, so the agent cannot start a second plan until the
// first one has been installed or thrown away.
//
// See also: `navigator.rs` which owns the shared state this module runs
// against, `planner.rs` for the search, `snapshot.rs` for the capture.

use crate::config::OrchestratorParams;
use crate::error::PlanFailure;
use crate::navigator::NavShared;
use crate::planner::{PlanMode, PlanOutcome, plan_waypoints};
use crate::snapshot::VoxelSnapshot;
use crate::state::{AgentNav, Flight, InFlightGuard};
use crate::types::{AgentId, CellPos, NavGoal, PlanReason};
use crate::world::{NavHost, is_compatible};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// An inbound plan request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanRequest {
    pub agent: AgentId,
    pub goal: NavGoal,
    /// Use the shorter forced interval and skip proximity suppression.
    pub force: bool,
    pub reason: PlanReason,
}

/// Why a request did not start a search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Skip {
    /// Inside the minimum interval since the last plan.
    RateLimited,
    /// The target is within tolerance of a plan that is still fresh.
    NearLastTarget,
    /// A plan for this agent is already running.
    InFlight,
}

/// An admitted request, holding the agent's plan flag.
#[derive(Debug)]
pub struct PlanTicket {
    pub guard: InFlightGuard,
    pub request: PlanRequest,
    /// Intent epoch the request was admitted under.
    pub epoch: u64,
    /// Target cell and time of the previous plan. Tracked targets are only
    /// resolved at capture time, so their proximity check happens there.
    pub previous: Option<(CellPos, u64)>,
}

fn cell_distance(a: CellPos, b: CellPos) -> f64 {
    (a.distance_sq(b) as f64).sqrt()
}

/// Admit or skip a request. Owning context only.
pub fn admit(
    nav: &Arc<AgentNav>,
    request: PlanRequest,
    now: u64,
    params: &OrchestratorParams,
) -> Result<PlanTicket, Skip> {
    let (retarget, changed) = {
        let mut intent = nav.intent.lock();
        let retarget = match (intent.goal, request.goal) {
            (Some(NavGoal::Fixed(current)), NavGoal::Fixed(cell)) => {
                cell_distance(current, cell) <= params.retarget_tolerance
            }
            _ => false,
        };
        let changed = !retarget && intent.set_goal(Some(request.goal));
        (retarget, changed)
    };
    if changed {
        nav.reset_pursuit();
    }

    let previous = {
        let cooldown = nav.cooldown.lock();
        if let Some(at) = cooldown.last_plan_at {
            let elapsed = now.saturating_sub(at);
            let interval = if request.force {
                params.forced_interval_ms
            } else {
                params.min_interval_ms
            };
            if elapsed < interval {
                return Err(Skip::RateLimited);
            }
            let near = match (request.goal, cooldown.last_planned_target) {
                (NavGoal::Fixed(cell), Some(last)) => {
                    cell_distance(cell, last) <= params.retarget_tolerance
                }
                _ => false,
            };
            if near && !request.force && elapsed < 2 * params.min_interval_ms {
                return Err(Skip::NearLastTarget);
            }
        }
        cooldown.last_planned_target.zip(cooldown.last_plan_at)
    };

    let guard = InFlightGuard::try_acquire(nav, Flight::Plan).ok_or(Skip::InFlight)?;
    let epoch = {
        let mut intent = nav.intent.lock();
        if retarget {
            intent.set_goal(Some(request.goal));
        }
        intent.epoch
    };
    {
        let mut cooldown = nav.cooldown.lock();
        cooldown.last_plan_at = Some(now);
        if let NavGoal::Fixed(cell) = request.goal {
            cooldown.last_planned_target = Some(cell);
        }
    }
    Ok(PlanTicket {
        guard,
        request,
        epoch,
        previous,
    })
}

/// Run an admitted request on the worker pool.
pub(crate) fn launch<H: NavHost + 'static>(shared: &Arc<NavShared<H>>, ticket: PlanTicket) {
    let worker = Arc::clone(shared);
    shared.pool.spawn(move || run_plan(&worker, ticket));
}

/// What the owning context hands the worker.
struct Capture {
    snapshot: VoxelSnapshot,
    avoid_door: Option<CellPos>,
    escape_allowed: bool,
}

fn run_plan<H: NavHost + 'static>(shared: &Arc<NavShared<H>>, ticket: PlanTicket) {
    let PlanTicket {
        guard,
        request,
        epoch,
        previous,
    } = ticket;
    let nav = Arc::clone(guard.nav());
    match search(shared, &nav, request, epoch, previous) {
        Ok(Some(plan)) => install(shared, guard, request, epoch, plan),
        Ok(None) => {
            shared.counters.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(agent = %request.agent, "tracked target barely moved; plan suppressed");
        }
        Err(failure) => report_failure(shared, request, failure),
    }
}

fn search<H: NavHost + 'static>(
    shared: &Arc<NavShared<H>>,
    nav: &Arc<AgentNav>,
    request: PlanRequest,
    epoch: u64,
    previous: Option<(CellPos, u64)>,
) -> Result<Option<PlanOutcome>, PlanFailure> {
    let timeout = Duration::from_millis(shared.config.orchestrator.capture_timeout_ms);
    let planner = &shared.config.planner;

    let job = capture_job(Arc::clone(shared), Arc::clone(nav), request, epoch, previous, false);
    let Some(capture) = shared
        .link
        .call_with_timeout(job, timeout)
        .map_err(|_| PlanFailure::CaptureTimedOut)??
    else {
        return Ok(None);
    };

    shared.counters.searches.fetch_add(1, Ordering::Relaxed);
    match plan_waypoints(&capture.snapshot, capture.avoid_door, PlanMode::Full, planner) {
        Err(PlanFailure::NoRoute) if capture.escape_allowed => {}
        result => return result.map(Some),
    }

    tracing::debug!(agent = %request.agent, "no route in window; trying an escape plan");
    let job = capture_job(Arc::clone(shared), Arc::clone(nav), request, epoch, previous, true);
    let Some(capture) = shared
        .link
        .call_with_timeout(job, timeout)
        .map_err(|_| PlanFailure::CaptureTimedOut)??
    else {
        return Ok(None);
    };
    shared.counters.searches.fetch_add(1, Ordering::Relaxed);
    plan_waypoints(&capture.snapshot, capture.avoid_door, PlanMode::EscapeOnly, planner).map(Some)
}

/// The owning-context half of a capture. `Ok(None)` means a tracked target
/// has not moved enough to be worth a new plan.
fn capture_job<H: NavHost + 'static>(
    shared: Arc<NavShared<H>>,
    nav: Arc<AgentNav>,
    request: PlanRequest,
    epoch: u64,
    previous: Option<(CellPos, u64)>,
    centered: bool,
) -> impl FnOnce(&mut H) -> Result<Option<Capture>, PlanFailure> + Send + 'static {
    move |host: &mut H| {
        if !shared.registry.is_current(&nav) || !nav.intent.lock().still_wants(epoch, request.goal) {
            return Err(PlanFailure::Stale);
        }
        if !is_compatible(&*host) {
            return Err(PlanFailure::IncompatibleHost);
        }
        let params = &shared.config.orchestrator;
        let now = shared.clock.now_ms();
        let goal = match request.goal {
            NavGoal::Fixed(cell) => cell,
            NavGoal::Tracked(target) => {
                let cell = host
                    .entity_position(target)
                    .ok_or(PlanFailure::NoSnapshot)?
                    .cell();
                if !centered {
                    let barely_moved = !request.force
                        && previous.is_some_and(|(last, at)| {
                            cell_distance(cell, last) <= params.retarget_tolerance
                                && now.saturating_sub(at) < 2 * params.min_interval_ms
                        });
                    if barely_moved {
                        return Ok(None);
                    }
                    nav.cooldown.lock().last_planned_target = Some(cell);
                }
                cell
            }
        };
        let start = host
            .position(nav.agent)
            .ok_or(PlanFailure::NoSnapshot)?
            .cell();
        let (avoid_door, escape_allowed) = {
            let mut cooldown = nav.cooldown.lock();
            if centered {
                cooldown.last_escape_at = Some(now);
            }
            (
                cooldown.remembered_door(now, params.door_memory_ms),
                cooldown.escape_allowed(now, params.escape_interval_ms),
            )
        };
        let snapshot =
            VoxelSnapshot::capture(&*host, start, goal, centered, &shared.config.snapshot)?;
        Ok(Some(Capture {
            snapshot,
            avoid_door,
            escape_allowed,
        }))
    }
}

fn install<H: NavHost + 'static>(
    shared: &Arc<NavShared<H>>,
    guard: InFlightGuard,
    request: PlanRequest,
    epoch: u64,
    plan: PlanOutcome,
) {
    let owner = Arc::clone(shared);
    let posted = shared.link.post(move |_host: &mut H| {
        let nav = guard.nav();
        if !owner.registry.is_current(nav) || !nav.intent.lock().still_wants(epoch, request.goal) {
            owner.counters.stale.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(agent = %request.agent, "discarding plan for an abandoned pursuit");
            return;
        }
        let count = plan.waypoints.len();
        nav.waypoints.lock().replace(plan.waypoints);
        owner.counters.installed.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            agent = %request.agent,
            reason = ?request.reason,
            waypoints = count,
            cost = plan.cost,
            escape = plan.escape,
            "plan installed"
        );
    });
    if posted.is_err() {
        tracing::debug!(agent = %request.agent, "owning context gone; plan dropped");
    }
}

fn report_failure<H: NavHost + 'static>(
    shared: &Arc<NavShared<H>>,
    request: PlanRequest,
    failure: PlanFailure,
) {
    let agent = request.agent;
    match failure {
        PlanFailure::Stale => {
            shared.counters.stale.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(agent = %agent, "pursuit changed before capture");
        }
        PlanFailure::CaptureTimedOut | PlanFailure::NoSnapshot => {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(agent = %agent, %failure, "capture aborted");
        }
        _ => {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            if shared
                .throttle
                .allow(agent, "plan_failed", shared.clock.now_ms())
            {
                tracing::warn!(agent = %agent, reason = ?request.reason, %failure, "planning unavailable");
            }
        }
    }
}

// Headless tick loop driving a `Navigator` against a `GridWorld`.
//
// The harness plays the host: it owns the world on the current thread,
// steers agents toward their waypoints, feeds the per-tick stuck check (which
// also opens soft doors on the route), and pumps the jobs workers marshal
// back.
// Time is a `ManualClock` advanced by a fixed amount per tick, so rate
// limits and cooldowns behave the same on every run.
//
// Each tick first waits until the agent has no plan or recovery in flight.
// That serializes worker output into the tick stream and keeps scenario runs
// reproducible; a real host would keep ticking instead.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use wayfinder_nav::{
    AgentBody, AgentId, CellPos, ManualClock, NavConfig, NavError, Navigator, PlanReason, Point3,
    Skip, SteerTarget,
};

use crate::world::GridWorld;

/// Virtual time per tick.
pub const TICK_MS: u64 = 50;
const START_MS: u64 = 1_000_000;
/// Upper bound on real time spent waiting for workers in one settle.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(20);

/// What happened during `Harness::walk_to`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkReport {
    pub arrived: bool,
    pub ticks: u32,
    /// Ticks on which the navigator raised distress.
    pub distress: u32,
}

pub struct Harness {
    pub world: GridWorld,
    navigator: Navigator<GridWorld>,
    clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(world: GridWorld, config: NavConfig) -> Result<Self, NavError> {
        let clock = Arc::new(ManualClock::new(START_MS));
        let navigator = Navigator::new(config, clock.clone())?;
        Ok(Self {
            world,
            navigator,
            clock,
        })
    }

    pub fn navigator(&self) -> &Navigator<GridWorld> {
        &self.navigator
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Pump until `agent` has nothing in flight. Returns `false` if workers
    /// did not finish within the timeout.
    pub fn settle(&mut self, agent: AgentId) -> bool {
        let started = std::time::Instant::now();
        loop {
            self.navigator.pump(&mut self.world);
            if self.navigator.is_idle(agent) {
                self.navigator.pump(&mut self.world);
                return true;
            }
            if started.elapsed() > SETTLE_TIMEOUT {
                tracing::warn!(agent = %agent, "workers did not settle");
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Request a plan and wait for its result.
    pub fn request(
        &mut self,
        agent: AgentId,
        goal: CellPos,
        force: bool,
        reason: PlanReason,
    ) -> Result<(), Skip> {
        let admitted = self
            .navigator
            .request_plan_to_goal(agent, goal, force, reason);
        self.settle(agent);
        admitted
    }

    /// One host tick for `agent` pursuing `goal`. Returns the distress flag.
    pub fn tick(&mut self, agent: AgentId, goal: CellPos) -> bool {
        self.settle(agent);
        let Some(position) = self.world.position(agent) else {
            return false;
        };
        let target = goal.center();
        let distress = self
            .navigator
            .tick_and_check_stuck(&mut self.world, agent, target);

        let arrived = position.distance(target) <= self.navigator.config().progress.arrival_radius;
        if !arrived {
            match self.navigator.steer_target(agent, position) {
                Some(SteerTarget::Waypoint(cell)) => self.step_toward(agent, position, cell.center()),
                Some(SteerTarget::Flee(point)) => self.world.apply_impulse_toward(agent, point),
                None => {
                    if let Err(skip) = self.navigator.request_plan_to_goal(
                        agent,
                        goal,
                        false,
                        PlanReason::PathExhausted,
                    ) {
                        tracing::trace!(agent = %agent, ?skip, "replan skipped");
                    }
                    self.step_toward(agent, position, target);
                }
            }
        }

        self.clock.advance(TICK_MS);
        self.navigator.pump(&mut self.world);
        distress
    }

    /// Drive `agent` toward `goal` for up to `max_ticks` ticks.
    pub fn walk_to(&mut self, agent: AgentId, goal: CellPos, max_ticks: u32) -> WalkReport {
        let mut report = WalkReport::default();
        if let Err(skip) = self.request(agent, goal, true, PlanReason::NewGoal) {
            tracing::debug!(agent = %agent, ?skip, "initial plan skipped");
        }
        let radius = self.navigator.config().progress.arrival_radius;
        while report.ticks < max_ticks {
            let at_goal = self
                .world
                .position(agent)
                .is_some_and(|p| p.distance(goal.center()) <= radius);
            if at_goal {
                report.arrived = true;
                break;
            }
            if self.tick(agent, goal) {
                report.distress += 1;
            }
            report.ticks += 1;
        }
        self.settle(agent);
        report
    }

    /// Face and push toward `point`.
    fn step_toward(&mut self, agent: AgentId, position: Point3, point: Point3) {
        if let Some((ux, uz)) = position.horizontal_direction_to(point) {
            let ahead = Point3::new(position.x + ux * 0.6, position.y, position.z + uz * 0.6).cell();
            self.world.face(agent, ahead);
        }
        self.world.apply_impulse_toward(agent, point);
    }
}

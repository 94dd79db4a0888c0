// Tier 1: quick nudge.
//
// Scores the eight horizontal neighbors of the agent's feet and pushes the
// agent one small impulse toward the cheapest. Lower cost is better:
//
//   cost = distance to goal + move cost - openness * weight
//          + stuck penalty + failed-direction penalty + exploration noise
//
// A neighbor is rejected outright (infinite cost) when the body does not fit
// there at the same level, one up (with headroom to jump) or one down, or
// when a diagonal would cut a blocked corner. The stuck penalty discourages
// heading straight at the goal once that has clearly not worked, and the
// noise breaks ties between equally bad options when the agent is very
// stuck. The chosen direction goes into the failed-direction ring right
// away; if it works, the anchor escape clears the ring anyway.
//
// Runs synchronously on the owning context: it is one world read and one
// impulse.

use crate::config::NudgeParams;
use crate::error::NavError;
use crate::recovery::{Tier, goal_heading, openness};
use crate::state::FailedDirections;
use crate::types::{AgentId, CellPos, HorizontalDir, Point3};
use crate::world::{NavHost, WorldQuery, body_fits};
use rand::Rng;

/// One scored neighbor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NudgeCandidate {
    pub dir: HorizontalDir,
    /// The feet cell the agent would end up in.
    pub target: CellPos,
    /// `f64::INFINITY` when the move is impossible.
    pub cost: f64,
}

impl NudgeCandidate {
    pub fn is_viable(&self) -> bool {
        self.cost.is_finite()
    }
}

/// Where a body stepping from `feet` toward `dir` would land, if anywhere.
fn landing<W: WorldQuery + ?Sized>(world: &W, feet: CellPos, dir: HorizontalDir) -> Option<CellPos> {
    if dir.is_diagonal() {
        let corners_clear = dir
            .components()
            .into_iter()
            .all(|c| body_fits(world, feet.step(c)));
        if !corners_clear {
            return None;
        }
    }
    let level = feet.step(dir);
    if body_fits(world, level) {
        if world.is_solid_below(level) {
            return Some(level);
        }
        let lower = level.down(1);
        return (body_fits(world, lower) && world.is_solid_below(lower)).then_some(lower);
    }
    let upper = level.up(1);
    let can_climb = body_fits(world, upper)
        && world.is_solid_below(upper)
        && world.is_passable(feet.up(2));
    can_climb.then_some(upper)
}

/// Score all eight neighbors of the agent's feet.
pub fn score_nudge_candidates<W: WorldQuery + ?Sized>(
    world: &W,
    position: Point3,
    goal: Point3,
    stagnant_ticks: u32,
    failed: &FailedDirections,
    params: &NudgeParams,
    mut noise: impl FnMut() -> f64,
) -> [NudgeCandidate; 8] {
    let feet = position.cell();
    let (gx, gz) = goal_heading(position, goal);
    HorizontalDir::ALL.map(|dir| {
        let Some(target) = landing(world, feet, dir) else {
            return NudgeCandidate {
                dir,
                target: feet.step(dir),
                cost: f64::INFINITY,
            };
        };
        let distance = target.center().distance(goal);
        let mut move_cost = if dir.is_diagonal() {
            params.diagonal_cost
        } else {
            1.0
        };
        if target.y != feet.y {
            move_cost += params.climb_cost;
        }
        let (ux, uz) = dir.unit();
        let toward_goal = ux * gx + uz * gz > 0.7;
        let stuck_penalty = if stagnant_ticks >= params.long_stuck_ticks && toward_goal {
            params.stuck_penalty
        } else {
            0.0
        };
        let failed_penalty = failed.count(dir) as f64 * params.failed_direction_penalty;
        let exploration = if stagnant_ticks >= params.very_stuck_ticks {
            noise() * params.exploration_noise
        } else {
            0.0
        };
        let cost = distance + move_cost - openness(world, target) * params.openness_weight
            + stuck_penalty
            + failed_penalty
            + exploration;
        NudgeCandidate { dir, target, cost }
    })
}

/// The cheapest viable candidate. Ties go to the earlier direction.
pub fn best_candidate(candidates: &[NudgeCandidate]) -> Option<NudgeCandidate> {
    candidates
        .iter()
        .filter(|c| c.is_viable())
        .fold(None, |best: Option<NudgeCandidate>, &c| match best {
            Some(b) if b.cost <= c.cost => Some(b),
            _ => Some(c),
        })
}

/// Score, pick and push. Returns the direction taken.
#[allow(clippy::too_many_arguments)]
pub fn run<H: NavHost + ?Sized>(
    host: &mut H,
    agent: AgentId,
    goal: Point3,
    stagnant_ticks: u32,
    failed: &mut FailedDirections,
    failed_capacity: usize,
    rng: &mut impl Rng,
    params: &NudgeParams,
) -> Result<HorizontalDir, NavError> {
    let position = host
        .position(agent)
        .ok_or_else(|| NavError::tier_failed(Tier::Nudge, "agent has no position"))?;
    let candidates = score_nudge_candidates(
        &*host,
        position,
        goal,
        stagnant_ticks,
        failed,
        params,
        || rng.random::<f64>(),
    );
    let best = best_candidate(&candidates)
        .ok_or_else(|| NavError::tier_failed(Tier::Nudge, "every neighbor is blocked"))?;

    host.face(agent, best.target);
    if best.target.y > position.cell().y {
        host.jump(agent);
    }
    host.apply_impulse_toward(agent, best.target.center());
    failed.push(best.dir, failed_capacity);
    Ok(best.dir)
}

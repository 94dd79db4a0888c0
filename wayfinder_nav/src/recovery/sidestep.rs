// Tier 2: back up and sidestep.
//
// Tries the four cardinal directions in the order away from the goal, left,
// right, toward the goal. Along each it looks for the farthest cell, up to
// `max_distance`, reachable in a straight lane where the two-high body fits
// at every step and there is floor at the end. The first direction with such
// a lane wins and the agent is steered there.
//
// When no lane exists it falls back to short jump+sprint bursts in the same
// direction order, which is sometimes enough to hop a lip the survey
// considered blocked.
//
// Success means the agent ended up at least one cell from where it started.

use crate::error::NavError;
use crate::owner::OwnerAccess;
use crate::recovery::{RecoveryCtx, goal_heading};
use crate::survey::LocalSurvey;
use crate::types::{CellPos, HorizontalDir, Point3};
use crate::world::{NavHost, WorldQuery, body_fits};

/// Direction order: away from the goal, left, right, toward the goal.
pub fn direction_order(position: Point3, goal: Point3) -> [HorizontalDir; 4] {
    let (gx, gz) = goal_heading(position, goal);
    let toward = HorizontalDir::cardinal_toward(gx, gz);
    [toward.opposite(), toward.left(), toward.right(), toward]
}

/// The farthest clear lane end along `dir`, if any.
pub fn lane_end<W: WorldQuery + ?Sized>(
    world: &W,
    feet: CellPos,
    dir: HorizontalDir,
    max_distance: i32,
) -> Option<CellPos> {
    let mut end = None;
    let mut cell = feet;
    for _ in 0..max_distance {
        cell = cell.step(dir);
        if !body_fits(world, cell) {
            break;
        }
        if world.is_solid_below(cell) {
            end = Some(cell);
        }
    }
    end
}

pub fn run<H, A>(ctx: &RecoveryCtx<'_, H, A>) -> Result<(), NavError>
where
    H: NavHost,
    A: OwnerAccess<H>,
{
    let p = &ctx.params.sidestep;
    let (start, survey): (Point3, LocalSurvey) = ctx.observe(p.max_distance + 1, 2)?;
    let feet = start.cell();
    let order = direction_order(start, ctx.goal);

    let lane = order
        .into_iter()
        .find_map(|dir| lane_end(&survey, feet, dir, p.max_distance).map(|end| (dir, end)));
    if let Some((dir, end)) = lane {
        tracing::debug!(agent = %ctx.agent, ?dir, %end, "sidestep lane");
        let at = ctx.walk_to(end.center(), p.steer_steps)?;
        if at.horizontal_distance(start) >= 1.0 {
            return Ok(());
        }
    }

    for dir in order {
        let mut at = start;
        for _ in 0..p.burst_steps {
            at = ctx.impulse(feet.step(dir).center(), true, true)?;
        }
        if at.horizontal_distance(start) >= 1.0 {
            return Ok(());
        }
    }
    Err(ctx.fail("no displacement"))
}

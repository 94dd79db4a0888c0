// Tier 3: obstruction mining.
//
// Clears a short, prioritized list of cells around the agent:
//
// 1. the cell above the head (room to jump),
// 2. the feet and head cells themselves (the agent is embedded),
// 3. a staircase toward the goal: the next cell at foot, head and jump height,
// 4. foot and head cells to either side.
//
// Candidates come from a survey and go through the shared hazard filter;
// `RecoveryCtx::break_cell` re-checks each one against the live world
// before breaking it. After opening a cell beside the agent it pushes the
// agent into it. Loose material (sand, gravel) can slide into an opened
// cell, so the cell is re-checked and re-broken a few times before moving
// on.
//
// The burst stops at the time budget or the cell budget, whichever comes
// first. Breaking at least one cell counts as success.

use crate::error::NavError;
use crate::owner::OwnerAccess;
use crate::recovery::{RecoveryCtx, breakable, goal_heading};
use crate::types::{CellPos, HorizontalDir};
use crate::world::NavHost;
use smallvec::SmallVec;

/// Cells to clear, highest priority first, before any filtering.
pub fn priority_cells(feet: CellPos, toward: HorizontalDir) -> SmallVec<[CellPos; 12]> {
    let ahead = feet.step(toward);
    let left = feet.step(toward.left());
    let right = feet.step(toward.right());
    let mut cells: SmallVec<[CellPos; 12]> = SmallVec::new();
    cells.extend([
        feet.up(2),
        feet,
        feet.up(1),
        ahead,
        ahead.up(1),
        ahead.up(2),
        left,
        left.up(1),
        right,
        right.up(1),
    ]);
    cells
}

pub fn run<H, A>(ctx: &RecoveryCtx<'_, H, A>) -> Result<(), NavError>
where
    H: NavHost,
    A: OwnerAccess<H>,
{
    let (position, survey) = ctx.observe(2, 3)?;
    let feet = position.cell();
    let (gx, gz) = goal_heading(position, ctx.goal);
    let toward = HorizontalDir::cardinal_toward(gx, gz);

    let now = ctx.now();
    let targets: SmallVec<[CellPos; 12]> = priority_cells(feet, toward)
        .into_iter()
        .filter(|&c| matches!(breakable(&survey, c), Ok(true)) && ctx.nav.may_mine(c, now))
        .collect();
    if targets.is_empty() {
        return Err(ctx.fail("nothing mineable"));
    }

    let mut budget = ctx.budget();
    let mut broken = 0;
    for cell in targets {
        match ctx.break_cell(cell, &mut budget) {
            Ok(true) => broken += 1,
            Ok(false) => continue,
            Err(NavError::HazardBlocked { cell }) => {
                tracing::debug!(agent = %ctx.agent, %cell, "mining skipped hazardous cell");
                continue;
            }
            Err(e @ NavError::ResourceExhausted { .. }) if broken == 0 => return Err(e),
            Err(NavError::ResourceExhausted { .. }) => break,
            Err(e) => return Err(e),
        }

        if stabilize(ctx, cell, &mut budget)? && cell.horizontal_manhattan(feet) == 1 {
            let entry = CellPos::new(cell.x, feet.y, cell.z);
            ctx.impulse(entry.center(), cell.y > feet.y + 1, false)?;
        }
    }

    if broken == 0 {
        return Err(ctx.fail("every candidate was refused"));
    }
    tracing::debug!(agent = %ctx.agent, broken, "mining burst done");
    Ok(())
}

/// Re-break `cell` while loose material keeps sliding into it. Returns
/// whether the cell ended up open.
fn stabilize<H, A>(
    ctx: &RecoveryCtx<'_, H, A>,
    cell: CellPos,
    budget: &mut super::Budget,
) -> Result<bool, NavError>
where
    H: NavHost,
    A: OwnerAccess<H>,
{
    for _ in 0..ctx.params.mining.stabilize_attempts {
        let refilled = ctx
            .owner
            .run(move |h: &mut H| h.is_solid(cell).then(|| h.is_loose(cell)))?;
        match refilled {
            None => return Ok(true),
            Some(false) => return Ok(false),
            Some(true) => {
                if budget.spend(ctx.now()).is_err() {
                    return Ok(false);
                }
                let agent = ctx.agent;
                ctx.owner.run(move |h: &mut H| h.try_break(agent, cell))?;
                ctx.pace();
            }
        }
    }
    Ok(false)
}

// Tier 5: pillar/mine escalation.
//
// For agents that are properly enclosed (at least `enclosure_threshold` of
// the four cardinal neighbors blocked for a two-high body). Three moves, in
// order of preference:
//
// 1. Ceiling solid and no horizontal neighbor can be mined open: break the
//    ceiling (and the cell above it), then pillar up.
// 2. Some horizontal neighbor can be mined open: mine the most-blocked one,
//    preferring directions toward the goal, and step through.
// 3. Otherwise, with headroom, pillar up to `max_pillar` cells.
//
// A horizontal neighbor counts as minable when both its foot and head cells
// are open or pass the hazard filter and it has floor. Fires once per
// episode.

use crate::error::NavError;
use crate::owner::OwnerAccess;
use crate::recovery::{Budget, RecoveryCtx, breakable, clearable, goal_heading};
use crate::survey::LocalSurvey;
use crate::types::{CellPos, HorizontalDir};
use crate::world::{NavHost, WorldQuery, body_fits};

/// Cardinal neighbors a two-high body cannot step into.
pub fn blocked_cardinals<W: WorldQuery + ?Sized>(world: &W, feet: CellPos) -> u32 {
    HorizontalDir::CARDINALS
        .into_iter()
        .filter(|&d| !body_fits(world, feet.step(d)))
        .count() as u32
}

/// Solid cells to break to open `feet.step(dir)`, or `None` if it cannot be
/// opened.
fn opening<W: WorldQuery + ?Sized>(world: &W, feet: CellPos, dir: HorizontalDir) -> Option<Vec<CellPos>> {
    let foot = feet.step(dir);
    let head = foot.up(1);
    if !clearable(world, foot) || !clearable(world, head) || !world.is_solid_below(foot) {
        return None;
    }
    Some(
        [foot, head]
            .into_iter()
            .filter(|&c| !world.is_passable(c))
            .collect(),
    )
}

pub fn run<H, A>(ctx: &RecoveryCtx<'_, H, A>) -> Result<(), NavError>
where
    H: NavHost,
    A: OwnerAccess<H>,
{
    let p = &ctx.params.escalation;
    let (start, survey) = ctx.observe(2, 3)?;
    let feet = start.cell();
    let blocked = blocked_cardinals(&survey, feet);
    if blocked < p.enclosure_threshold {
        return Err(ctx.fail("not enclosed"));
    }

    let (gx, gz) = goal_heading(start, ctx.goal);
    let mut dirs = HorizontalDir::CARDINALS;
    dirs.sort_by(|a, b| {
        let (ax, az) = a.unit();
        let (bx, bz) = b.unit();
        (bx * gx + bz * gz).total_cmp(&(ax * gx + az * gz))
    });
    let mut best: Option<(HorizontalDir, Vec<CellPos>)> = None;
    for dir in dirs {
        let Some(cells) = opening(&survey, feet, dir) else {
            continue;
        };
        if best.as_ref().is_none_or(|(_, b)| cells.len() > b.len()) {
            best = Some((dir, cells));
        }
    }

    let mut budget = ctx.budget();
    let ceiling = feet.up(2);
    tracing::debug!(agent = %ctx.agent, blocked, "escalating");
    match best {
        None if survey.is_solid(ceiling) => mine_up(ctx, &survey, feet, &mut budget),
        Some((dir, cells)) => mine_through(ctx, feet, dir, &cells, &mut budget),
        None if body_fits(&survey, feet.up(1)) => pillar(ctx, feet, &mut budget),
        None => Err(ctx.fail("no headroom and nothing to mine")),
    }
}

fn mine_up<H, A>(
    ctx: &RecoveryCtx<'_, H, A>,
    survey: &LocalSurvey,
    feet: CellPos,
    budget: &mut Budget,
) -> Result<(), NavError>
where
    H: NavHost,
    A: OwnerAccess<H>,
{
    let ceiling = feet.up(2);
    if !matches!(breakable(survey, ceiling), Ok(true)) || !ctx.break_cell(ceiling, budget)? {
        return Err(ctx.fail("ceiling cannot be mined"));
    }
    let above = ceiling.up(1);
    if matches!(breakable(survey, above), Ok(true)) {
        ctx.break_cell(above, budget)?;
    }
    // The opened shaft is progress on its own; pillaring is a bonus.
    if let Err(e) = pillar(ctx, feet, budget) {
        tracing::debug!(agent = %ctx.agent, error = %e, "no pillar after mining up");
    }
    Ok(())
}

fn mine_through<H, A>(
    ctx: &RecoveryCtx<'_, H, A>,
    feet: CellPos,
    dir: HorizontalDir,
    cells: &[CellPos],
    budget: &mut Budget,
) -> Result<(), NavError>
where
    H: NavHost,
    A: OwnerAccess<H>,
{
    for &cell in cells {
        if !ctx.break_cell(cell, budget)? {
            return Err(ctx.fail("neighbor could not be opened"));
        }
    }
    let start = ctx.position()?;
    let at = ctx.walk_to(feet.step(dir).center(), 6)?;
    if at.horizontal_distance(start) < 0.8 {
        return Err(ctx.fail("could not step through"));
    }
    Ok(())
}

fn pillar<H, A>(
    ctx: &RecoveryCtx<'_, H, A>,
    feet: CellPos,
    budget: &mut Budget,
) -> Result<(), NavError>
where
    H: NavHost,
    A: OwnerAccess<H>,
{
    let mut placed = 0;
    for _ in 0..ctx.params.escalation.max_pillar {
        if !ctx.pillar_step(budget)? {
            break;
        }
        placed += 1;
    }
    let at = ctx.position()?;
    if placed == 0 || at.cell().y <= feet.y {
        return Err(ctx.fail("pillar did not gain height"));
    }
    Ok(())
}

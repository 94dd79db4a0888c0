// Tier 6: mine to surface.
//
// Last resort for a buried agent. Digs a staircase upward, one level per
// step, until the surface predicate holds: sky visible above the head, or
// natural ground cover underfoot. Each step picks a cardinal direction and
// needs three cells open (above the head, plus foot and head of the next
// stair) over a solid stair block. Directions are scored by how much of the
// volume ahead could be mined at all, plus a goal bias so the climb drifts
// toward where the agent wanted to go.
//
// Stops early, without mining, when the agent is close to constructed
// material (someone's base), when no direction works, or after
// `stall_limit` steps in a row that gained no height.

use crate::error::NavError;
use crate::owner::OwnerAccess;
use crate::recovery::{RecoveryCtx, clearable, goal_heading};
use crate::survey::LocalSurvey;
use crate::types::{CellPos, HorizontalDir};
use crate::world::{NavHost, WorldQuery};

/// Whether the agent standing at `feet` has reached the surface.
pub fn at_surface<W: WorldQuery + ?Sized>(world: &W, feet: CellPos) -> bool {
    world.sky_visible(feet.up(1)) || world.is_ground_cover(feet.down(1))
}

/// One staircase step: the direction and the cells that must be open.
#[derive(Clone, Debug, PartialEq)]
pub struct Stair {
    pub dir: HorizontalDir,
    pub cells: [CellPos; 3],
    /// Where the feet end up.
    pub landing: CellPos,
    pub score: f64,
}

/// Best staircase direction from `feet`, if any.
pub fn choose_stair(
    survey: &LocalSurvey,
    feet: CellPos,
    heading: (f64, f64),
    goal_bias: f64,
) -> Option<Stair> {
    let mut best: Option<Stair> = None;
    for dir in HorizontalDir::CARDINALS {
        let step = feet.step(dir);
        let cells = [feet.up(2), step.up(1), step.up(2)];
        if !survey.is_solid(step) || !cells.iter().all(|&c| clearable(survey, c)) {
            continue;
        }
        let mut volume = 0;
        let mut minable = 0;
        for k in 1..=2 {
            let column = feet.offset(dir.offset().0 * k, 0, dir.offset().1 * k);
            for dy in 1..=3 {
                volume += 1;
                if clearable(survey, column.up(dy)) {
                    minable += 1;
                }
            }
        }
        let (ux, uz) = dir.unit();
        let score = f64::from(minable) / f64::from(volume)
            + goal_bias * (ux * heading.0 + uz * heading.1);
        if best.as_ref().is_none_or(|b| score > b.score) {
            best = Some(Stair {
                dir,
                cells,
                landing: step.up(1),
                score,
            });
        }
    }
    best
}

pub fn run<H, A>(ctx: &RecoveryCtx<'_, H, A>) -> Result<(), NavError>
where
    H: NavHost,
    A: OwnerAccess<H>,
{
    let p = &ctx.params.surface;
    let mut budget = ctx.budget();
    let mut stalls = 0;
    for step in 0..p.max_steps {
        if !budget.has_time(ctx.now()) {
            return Err(NavError::ResourceExhausted { tier: ctx.tier });
        }
        let (at, survey) = ctx.observe(p.constructed_radius.max(2), 3)?;
        let feet = at.cell();
        if at_surface(&survey, feet) {
            tracing::debug!(agent = %ctx.agent, step, %feet, "reached surface");
            return Ok(());
        }
        let built = survey.count_within(p.constructed_radius, |c| survey.is_constructed(c));
        if built >= p.constructed_limit {
            return Err(ctx.fail("constructed area nearby"));
        }
        let Some(stair) = choose_stair(&survey, feet, goal_heading(at, ctx.goal), p.goal_bias)
        else {
            return Err(ctx.fail("no staircase direction"));
        };

        for cell in stair.cells {
            if survey.is_passable(cell) {
                continue;
            }
            if !ctx.break_cell(cell, &mut budget)? {
                return Err(ctx.fail("stair cell could not be opened"));
            }
        }
        let after = ctx.walk_to(stair.landing.center(), 4)?;
        if after.cell().y > feet.y {
            stalls = 0;
        } else {
            stalls += 1;
            if stalls >= p.stall_limit {
                return Err(ctx.fail("climb stalled"));
            }
        }
    }
    Err(ctx.fail("step limit reached"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::Tier;
    use crate::recovery::test_support::{Rig, protected_cell};
    use crate::testing::SparseWorld;
    use crate::types::Point3;

    const GOAL: Point3 = Point3::new(20.5, 64.0, 0.5);

    /// A stone slab from y 63 to 67 topped with grass at 68, with the agent
    /// in a two-high pocket at (0, 64, 0).
    fn buried() -> SparseWorld {
        let mut world = SparseWorld::default();
        for x in -6..=6 {
            for z in -2..=2 {
                for y in 63..=67 {
                    world.solid(CellPos::new(x, y, z));
                }
                world.ground_cover(CellPos::new(x, 68, z));
            }
        }
        world.clear(CellPos::new(0, 64, 0));
        world.clear(CellPos::new(0, 65, 0));
        world
    }

    #[test]
    fn surface_predicate() {
        let mut world = SparseWorld::flat(-3, 3, 63);
        let feet = CellPos::new(0, 64, 0);
        assert!(at_surface(&world, feet));
        world.solid(CellPos::new(0, 70, 0));
        assert!(!at_surface(&world, feet));
        world.ground_cover(CellPos::new(0, 63, 0));
        assert!(at_surface(&world, feet));
    }

    #[test]
    fn stair_prefers_goal_side() {
        let world = buried();
        let feet = CellPos::new(0, 64, 0);
        let survey = LocalSurvey::capture(&world, feet, 4, 3);
        let stair = choose_stair(&survey, feet, (1.0, 0.0), 0.25).unwrap();
        assert_eq!(stair.dir, HorizontalDir::East);
        assert_eq!(stair.landing, CellPos::new(1, 65, 0));
        let stair = choose_stair(&survey, feet, (-1.0, 0.0), 0.25).unwrap();
        assert_eq!(stair.dir, HorizontalDir::West);
    }

    #[test]
    fn digs_a_staircase_to_the_surface() {
        let rig = Rig::new(buried(), CellPos::new(0, 64, 0));
        rig.run(Tier::Surface, GOAL).unwrap();
        let at = rig.position();
        assert!(at.y >= 67.0, "agent at {at}");
        assert!(at.x > 2.0, "climb drifted away from the goal: {at}");
        let world = rig.world.lock();
        assert!(world.broken.contains(&CellPos::new(0, 66, 0)));
        assert!(world.placed.is_empty());
    }

    #[test]
    fn already_on_the_surface_does_nothing() {
        let rig = Rig::new(SparseWorld::flat(-3, 3, 63), CellPos::new(0, 64, 0));
        rig.run(Tier::Surface, GOAL).unwrap();
        assert_eq!(rig.world.lock().mutation_count(), 0);
    }

    #[test]
    fn refuses_to_dig_near_constructed_material() {
        let mut world = buried();
        for z in -2..=0 {
            world.constructed(CellPos::new(-2, 65, z));
        }
        let rig = Rig::new(world, CellPos::new(0, 64, 0));
        let err = rig.run(Tier::Surface, GOAL).unwrap_err();
        assert_eq!(err.tier(), Some(Tier::Surface));
        assert_eq!(rig.world.lock().mutation_count(), 0);
    }

    #[test]
    fn protected_enclosure_is_left_intact() {
        let rig = Rig::new(protected_cell(), CellPos::new(0, 64, 0));
        // The protected ceiling hides the sky.
        let err = rig.run(Tier::Surface, GOAL).unwrap_err();
        assert_eq!(err.tier(), Some(Tier::Surface));
        assert_eq!(rig.world.lock().mutation_count(), 0);
    }
}

// Tier 4: panic flee.
//
// Detaches the agent from its goal for a few seconds and runs it to an open
// spot roughly away from the goal. Destinations are sampled in a half-circle
// centered on the away heading, at a random distance within the configured
// range, then snapped to a standable cell in the sampled column. Each
// candidate is scored as
//
//   openness * openness_weight + away alignment * away_weight + jitter
//
// and the best one becomes a `FleeOverride` on the agent record, which the
// navigator's steering reads instead of the waypoint queue. The override is
// installed and removed by jobs on the owning context, like every other
// write a worker makes.
//
// Once a destination is chosen the flee runs for the full duration whether
// or not the agent gets there, and it counts as done for the episode: the
// navigator starts a fresh stagnation episode when it records the result.
// Only failing to find any destination is an error, which the ladder retries
// after `retry_cooldown_ms`.

use crate::config::FleeParams;
use crate::error::NavError;
use crate::owner::OwnerAccess;
use crate::recovery::{RecoveryCtx, goal_heading, openness};
use crate::state::FleeOverride;
use crate::types::{CellPos, Point3};
use crate::world::{NavHost, WorldQuery, is_standable_now};
use rand::Rng;
use std::f64::consts::PI;
use std::sync::Arc;

/// Vertical offsets tried, in order, when snapping a sample to the ground.
const SNAP_DY: [i32; 5] = [0, 1, -1, 2, -2];

/// Sample and score flee destinations. Returns the best cell and its score.
pub fn pick_destination<W: WorldQuery + ?Sized>(
    world: &W,
    position: Point3,
    goal: Point3,
    params: &FleeParams,
    rng: &mut impl Rng,
) -> Option<(CellPos, f64)> {
    let (gx, gz) = goal_heading(position, goal);
    let (ax, az) = (-gx, -gz);
    let away_angle = az.atan2(ax);
    let feet = position.cell();

    let mut best: Option<(CellPos, f64)> = None;
    for _ in 0..params.samples {
        let angle = away_angle + (rng.random::<f64>() - 0.5) * PI;
        let distance = rng.random_range(params.min_distance..=params.max_distance);
        let column = Point3::new(
            position.x + angle.cos() * distance,
            position.y,
            position.z + angle.sin() * distance,
        )
        .cell();
        let Some(cell) = SNAP_DY
            .iter()
            .map(|&dy| CellPos::new(column.x, feet.y + dy, column.z))
            .find(|&c| is_standable_now(world, c))
        else {
            continue;
        };
        let alignment = position
            .horizontal_direction_to(cell.center())
            .map_or(0.0, |(dx, dz)| dx * ax + dz * az);
        let score = openness(world, cell) * params.openness_weight
            + alignment * params.away_weight
            + rng.random::<f64>() * params.jitter;
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((cell, score));
        }
    }
    best
}

pub fn run<H, A>(ctx: &RecoveryCtx<'_, H, A>) -> Result<(), NavError>
where
    H: NavHost,
    A: OwnerAccess<H>,
{
    let p = &ctx.params.flee;
    let radius = p.max_distance.ceil() as i32 + 1;
    let (start, survey) = ctx.observe(radius, 3)?;
    let picked = {
        let mut rng = ctx.nav.rng.lock();
        pick_destination(&survey, start, ctx.goal, p, &mut *rng)
    };
    let Some((cell, score)) = picked else {
        return Err(ctx.fail("no open destination"));
    };

    let target = cell.center();
    let until = ctx.now() + p.duration_ms;
    set_override(ctx, Some(FleeOverride { target, until }))?;
    tracing::debug!(agent = %ctx.agent, %cell, score, "fleeing");

    let mut at = start;
    while ctx.now() < until {
        if at.horizontal_distance(target) < 0.5 {
            ctx.pace();
            continue;
        }
        let climb = target.y > at.y + 0.5;
        match ctx.impulse(target, climb, true) {
            Ok(next) => at = next,
            Err(e) => {
                tracing::debug!(agent = %ctx.agent, error = %e, "flee steering interrupted");
                break;
            }
        }
    }
    // Steering drops an expired override on its own if this job never runs.
    if let Err(e) = set_override(ctx, None) {
        tracing::debug!(agent = %ctx.agent, error = %e, "flee override left to expire");
    }
    tracing::debug!(
        agent = %ctx.agent,
        moved = at.horizontal_distance(start),
        "flee finished"
    );
    Ok(())
}

/// Install or remove the agent's flee override on the owning context.
fn set_override<H, A>(ctx: &RecoveryCtx<'_, H, A>, value: Option<FleeOverride>) -> Result<(), NavError>
where
    H: NavHost,
    A: OwnerAccess<H>,
{
    let nav = Arc::clone(&ctx.nav);
    ctx.owner.run(move |_host: &mut H| *nav.flee.lock() = value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::RecoveryParams;
    use crate::owner::OwnerQueue;
    use crate::recovery::Tier;
    use crate::recovery::test_support::{AGENT, Rig, protected_cell};
    use crate::state::AgentNav;
    use crate::testing::SparseWorld;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::thread;
    use std::time::Duration;

    const GOAL: Point3 = Point3::new(20.5, 64.0, 0.5);

    #[test]
    fn destinations_lie_away_from_the_goal() {
        let world = SparseWorld::flat(-12, 12, 63);
        let start = Point3::new(0.5, 64.0, 0.5);
        let params = FleeParams::default();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (cell, _) = pick_destination(&world, start, GOAL, &params, &mut rng).unwrap();
            assert!(cell.x <= 0, "seed {seed} picked {cell}");
            assert_eq!(cell.y, 64);
            let d = cell.center().horizontal_distance(start);
            assert!(d >= params.min_distance - 1.5 && d <= params.max_distance + 1.5);
        }
    }

    #[test]
    fn snaps_to_ground_in_the_sampled_column() {
        // Floor one level lower on the away side.
        let mut world = SparseWorld::flat(1, 12, 63);
        for x in -12..=0 {
            for z in -12..=12 {
                world.solid(CellPos::new(x, 62, z));
            }
        }
        let mut rng = StdRng::seed_from_u64(3);
        let (cell, _) = pick_destination(
            &world,
            Point3::new(0.5, 64.0, 0.5),
            GOAL,
            &FleeParams::default(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(cell.y, 63);
    }

    #[test]
    fn nowhere_to_stand_yields_nothing() {
        let world = SparseWorld::default();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(
            pick_destination(
                &world,
                Point3::new(0.5, 64.0, 0.5),
                GOAL,
                &FleeParams::default(),
                &mut rng
            )
            .is_none()
        );
    }

    #[test]
    fn runs_away_for_the_full_duration_and_clears_override() {
        let rig = Rig::new(SparseWorld::flat(-12, 12, 63), CellPos::new(0, 64, 0));
        let started = rig.clock.now_ms();
        rig.run(Tier::Flee, GOAL).unwrap();
        let at = rig.position();
        assert!(at.x < -1.0, "agent at {at}");
        assert!(rig.clock.now_ms() >= started + rig.params.flee.duration_ms);
        assert!(rig.nav.flee.lock().is_none());
        assert_eq!(rig.world.lock().mutation_count(), 0);
    }

    #[test]
    fn boxed_in_agent_still_completes_the_flee() {
        // Open ground lies past the protected box, so a destination is
        // chosen even though the agent cannot reach it.
        let rig = Rig::new(protected_cell(), CellPos::new(0, 64, 0));
        rig.run(Tier::Flee, GOAL).unwrap();
        assert_eq!(rig.position().cell(), CellPos::new(0, 64, 0));
        assert!(rig.nav.flee.lock().is_none());
        assert_eq!(rig.world.lock().mutation_count(), 0);
    }

    #[test]
    fn no_destination_is_a_tier_failure() {
        let mut world = SparseWorld::default();
        world.solid(CellPos::new(0, 63, 0));
        let rig = Rig::new(world, CellPos::new(0, 64, 0));
        let err = rig.run(Tier::Flee, GOAL).unwrap_err();
        assert_eq!(err.tier(), Some(Tier::Flee));
        assert!(rig.nav.flee.lock().is_none());
    }

    #[test]
    fn override_changes_only_when_the_owner_runs_jobs() {
        let queue = OwnerQueue::new(Duration::from_secs(5));
        let link = queue.link();
        let clock = ManualClock::new(10_000);
        let params = RecoveryParams::default();
        let nav = Arc::new(AgentNav::new(AGENT, 42));
        let mut world = SparseWorld::flat(-12, 12, 63);
        world.place_agent(AGENT, CellPos::new(0, 64, 0).center());

        let mut installed = None;
        thread::scope(|s| {
            let worker = s.spawn(|| {
                let ctx = RecoveryCtx::<'_, SparseWorld, _>::new(
                    Tier::Flee,
                    Arc::clone(&nav),
                    &link,
                    &clock,
                    &params,
                    GOAL,
                );
                run(&ctx)
            });
            for _ in 0..20_000 {
                let before = *nav.flee.lock();
                thread::sleep(Duration::from_millis(1));
                // The worker is parked on the owner; nothing may have moved.
                assert_eq!(*nav.flee.lock(), before);
                queue.drain(&mut world);
                if installed.is_none() {
                    installed = *nav.flee.lock();
                }
                if worker.is_finished() {
                    break;
                }
            }
            worker.join().unwrap().unwrap();
        });
        queue.drain(&mut world);

        assert!(installed.is_some());
        assert!(nav.flee.lock().is_none());
    }
}

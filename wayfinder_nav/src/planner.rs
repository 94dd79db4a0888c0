// Bounded A* over a voxel snapshot, with an escape-door fallback and
// waypoint compression.
//
// The search graph is implicit: nodes are standable cells of the snapshot,
// edges are one cardinal step that may climb or drop one level. Climbing
// needs headroom above the current cell (the body jumps through it);
// dropping needs headroom above the landing cell (the body walks over it
// before falling). Scores, came-from links and the closed set are `Vec`s
// indexed by the snapshot's flat cell index, and the open set is a
// `BinaryHeap` min-heap via reversed ordering. Equal f-scores pop level moves
// before climbs and climbs before drops, then by cell index, so a search is a
// pure function of the snapshot and prefers flat routes among equals.
//
// Costs are integers: `step_cost` per horizontal step plus
// `vertical_extra_cost` when the step changes level. The heuristic is the
// horizontal Manhattan distance times `step_cost` plus the vertical distance
// times `vertical_extra_cost`, minimized over the goal candidates. Each step
// reduces the horizontal term by at most `step_cost` and the vertical term by
// at most `vertical_extra_cost`, so it never overestimates and is consistent.
//
// Escape fallback: when the goal is outside the window (or the caller asks
// for escape-only planning, or the search reaches the goal without moving),
// the planner floods the reachable region and picks the soft door whose
// crossing brings the agent closest to the goal for the least path cost. The
// door the agent crossed most recently is excluded so two rooms cannot
// bounce it back and forth.
//
// See also: `snapshot.rs` for the grid being searched, `orchestrator.rs`
// which runs the planner on a worker thread.
//
// **Critical constraint: determinism.** Identical snapshots give identical
// waypoints. Iteration is in index order and every tie is broken on cell
// index or coordinate.

use crate::config::PlannerParams;
use crate::error::PlanFailure;
use crate::snapshot::VoxelSnapshot;
use crate::types::{CellPos, DoorKind, HorizontalDir};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Which searches `plan_waypoints` may run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanMode {
    /// Search for the goal, falling back to a door when the goal is out of
    /// reach of the window.
    Full,
    /// Only look for a door to escape through.
    EscapeOnly,
}

/// A successful plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanOutcome {
    /// Every cell from the start cell to the final cell, inclusive.
    pub raw: Vec<CellPos>,
    /// The compressed list the steering layer follows (start excluded).
    pub waypoints: Vec<CellPos>,
    /// Total path cost of `raw`.
    pub cost: u32,
    /// The plan leads through a door rather than to the goal.
    pub escape: bool,
    /// The door the escape plan crosses.
    pub door: Option<CellPos>,
}

/// Entry in the open set (min-heap via reversed ordering).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct OpenEntry {
    index: usize,
    f_score: u32,
    /// Elevation change of the step that reached the cell: 0 level, 1 up,
    /// 2 down.
    rise: u8,
}

fn rise(from: CellPos, to: CellPos) -> u8 {
    match to.y.cmp(&from.y) {
        Ordering::Equal => 0,
        Ordering::Greater => 1,
        Ordering::Less => 2,
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f_score is "greatest".
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.rise.cmp(&self.rise))
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Plan from the snapshot's start toward its goal.
///
/// Returns `NoStandableStart` when no standable cell lies within
/// `start_search_radius` of the start, and `NoRoute` when neither the goal
/// search nor the escape fallback produced a path.
pub fn plan_waypoints(
    snapshot: &VoxelSnapshot,
    avoid_door: Option<CellPos>,
    mode: PlanMode,
    params: &PlannerParams,
) -> Result<PlanOutcome, PlanFailure> {
    let start = nearest_standable(snapshot, snapshot.start(), params.start_search_radius)
        .ok_or(PlanFailure::NoStandableStart)?;

    if mode == PlanMode::Full && snapshot.goal_in_window() {
        let candidates = goal_candidates(snapshot, params.goal_radius);
        if candidates.is_empty() {
            return Err(PlanFailure::NoRoute);
        }
        let (raw, cost) = astar(snapshot, start, &candidates, params).ok_or(PlanFailure::NoRoute)?;
        if raw.len() > 1 {
            let waypoints = compress_path(snapshot, &raw, params);
            return Ok(PlanOutcome {
                raw,
                waypoints,
                cost,
                escape: false,
                door: None,
            });
        }
        // Already inside the goal radius: only a door can improve on it.
    }

    escape_through_door(snapshot, start, avoid_door, params).ok_or(PlanFailure::NoRoute)
}

/// The standable cell nearest `center` within a cube of `radius`, ties broken
/// by coordinate.
fn nearest_standable(snapshot: &VoxelSnapshot, center: CellPos, radius: i32) -> Option<CellPos> {
    let mut best: Option<(i64, CellPos)> = None;
    for dy in -radius..=radius {
        for dz in -radius..=radius {
            for dx in -radius..=radius {
                let cell = center.offset(dx, dy, dz);
                if !snapshot.is_standable(cell) {
                    continue;
                }
                let key = (center.distance_sq(cell), cell);
                if best.is_none_or(|b| key < b) {
                    best = Some(key);
                }
            }
        }
    }
    best.map(|(_, cell)| cell)
}

/// Standable cells within `radius` of the goal, nearest first.
fn goal_candidates(snapshot: &VoxelSnapshot, radius: i32) -> Vec<CellPos> {
    let goal = snapshot.goal();
    let r2 = i64::from(radius) * i64::from(radius);
    let mut candidates: Vec<(i64, CellPos)> = Vec::new();
    for dy in -radius..=radius {
        for dz in -radius..=radius {
            for dx in -radius..=radius {
                let cell = goal.offset(dx, dy, dz);
                let d2 = goal.distance_sq(cell);
                if d2 <= r2 && snapshot.is_standable(cell) {
                    candidates.push((d2, cell));
                }
            }
        }
    }
    candidates.sort_unstable();
    candidates.into_iter().map(|(_, cell)| cell).collect()
}

/// Walking moves out of `cell`, in expansion order: for each cardinal
/// direction same level first, then up, then down.
fn neighbors(snapshot: &VoxelSnapshot, cell: CellPos) -> impl Iterator<Item = CellPos> + '_ {
    HorizontalDir::CARDINALS.into_iter().flat_map(move |dir| {
        let level = cell.step(dir);
        [0, 1, -1].into_iter().filter_map(move |dy| {
            let next = level.up(dy);
            if !snapshot.is_standable(next) {
                return None;
            }
            let clear = match dy {
                1 => snapshot.is_passable(cell.up(2)),
                -1 => snapshot.is_passable(next.up(2)),
                _ => true,
            };
            clear.then_some(next)
        })
    })
}

fn step_cost(from: CellPos, to: CellPos, params: &PlannerParams) -> u32 {
    if from.y == to.y {
        params.step_cost
    } else {
        params.step_cost + params.vertical_extra_cost
    }
}

/// Lower bound on the cost from `cell` to the nearest candidate.
///
/// Admissible: every step, climbs and drops included, moves one cell
/// horizontally for `step_cost`, so the Manhattan term never exceeds the
/// horizontal cost still to pay; each level changed costs exactly
/// `vertical_extra_cost` on top.
fn heuristic(cell: CellPos, candidates: &[CellPos], params: &PlannerParams) -> u32 {
    candidates
        .iter()
        .map(|&c| {
            cell.horizontal_manhattan(c) * params.step_cost
                + (cell.y - c.y).unsigned_abs() * params.vertical_extra_cost
        })
        .min()
        .unwrap_or(0)
}

fn astar(
    snapshot: &VoxelSnapshot,
    start: CellPos,
    candidates: &[CellPos],
    params: &PlannerParams,
) -> Option<(Vec<CellPos>, u32)> {
    let n = snapshot.cell_count();
    let start_idx = snapshot.index(start)?;

    let mut is_goal = vec![false; n];
    for &c in candidates {
        if let Some(i) = snapshot.index(c) {
            is_goal[i] = true;
        }
    }

    let mut g_score = vec![u32::MAX; n];
    let mut came_from: Vec<Option<usize>> = vec![None; n];
    let mut closed = vec![false; n];
    g_score[start_idx] = 0;

    let mut open = BinaryHeap::new();
    open.push(OpenEntry {
        index: start_idx,
        f_score: heuristic(start, candidates, params),
        rise: 0,
    });

    let mut expansions = 0;
    while let Some(current) = open.pop() {
        let ci = current.index;
        if is_goal[ci] {
            return Some((reconstruct_path(snapshot, &came_from, ci), g_score[ci]));
        }
        if closed[ci] {
            continue;
        }
        closed[ci] = true;
        expansions += 1;
        if expansions > params.max_expansions {
            return None;
        }

        let cell = snapshot.coord(ci);
        let current_g = g_score[ci];
        for next in neighbors(snapshot, cell) {
            let Some(ni) = snapshot.index(next) else {
                continue;
            };
            if closed[ni] {
                continue;
            }
            let tentative_g = current_g + step_cost(cell, next, params);
            if tentative_g < g_score[ni] {
                g_score[ni] = tentative_g;
                came_from[ni] = Some(ci);
                open.push(OpenEntry {
                    index: ni,
                    f_score: tentative_g + heuristic(next, candidates, params),
                    rise: rise(cell, next),
                });
            }
        }
    }

    None
}

fn reconstruct_path(snapshot: &VoxelSnapshot, came_from: &[Option<usize>], end: usize) -> Vec<CellPos> {
    let mut path = vec![snapshot.coord(end)];
    let mut current = end;
    while let Some(prev) = came_from[current] {
        path.push(snapshot.coord(prev));
        current = prev;
    }
    path.reverse();
    path
}

/// Flood the reachable region and route through the best soft door.
fn escape_through_door(
    snapshot: &VoxelSnapshot,
    start: CellPos,
    avoid_door: Option<CellPos>,
    params: &PlannerParams,
) -> Option<PlanOutcome> {
    let n = snapshot.cell_count();
    let start_idx = snapshot.index(start)?;

    // Uniform-cost flood: A* with a zero heuristic and no goal.
    let mut g_score = vec![u32::MAX; n];
    let mut came_from: Vec<Option<usize>> = vec![None; n];
    let mut closed = vec![false; n];
    g_score[start_idx] = 0;
    let mut open = BinaryHeap::new();
    open.push(OpenEntry {
        index: start_idx,
        f_score: 0,
        rise: 0,
    });
    let mut expansions = 0;
    while let Some(current) = open.pop() {
        let ci = current.index;
        if closed[ci] {
            continue;
        }
        closed[ci] = true;
        expansions += 1;
        if expansions > params.max_expansions {
            break;
        }
        let cell = snapshot.coord(ci);
        for next in neighbors(snapshot, cell) {
            let Some(ni) = snapshot.index(next) else {
                continue;
            };
            let tentative_g = g_score[ci] + step_cost(cell, next, params);
            if !closed[ni] && tentative_g < g_score[ni] {
                g_score[ni] = tentative_g;
                came_from[ni] = Some(ci);
                open.push(OpenEntry {
                    index: ni,
                    f_score: tentative_g,
                    rise: rise(cell, next),
                });
            }
        }
    }

    let goal = snapshot.goal();
    let baseline = start.horizontal_distance(goal);
    let is_avoided = |door: CellPos| avoid_door.is_some_and(|a| a == door || a == door.up(1));

    let mut best: Option<(f64, usize, CellPos)> = None;
    for di in 0..n {
        if !closed[di] || snapshot.flags_at(di).door != DoorKind::Soft {
            continue;
        }
        let Some(approach_idx) = came_from[di] else {
            continue;
        };
        let door = snapshot.coord(di);
        if is_avoided(door) {
            continue;
        }
        let approach = snapshot.coord(approach_idx);
        let Some(through) = through_cell(snapshot, approach, door) else {
            continue;
        };
        let improvement = (baseline - through.horizontal_distance(goal)) * f64::from(params.step_cost);
        let score = improvement - params.escape_cost_weight * f64::from(g_score[di]);
        if best.is_none_or(|(s, _, _)| score > s) {
            best = Some((score, di, through));
        }
    }

    let (_, door_idx, through) = best?;
    let door = snapshot.coord(door_idx);
    let mut raw = reconstruct_path(snapshot, &came_from, door_idx);
    raw.push(through);
    let cost = g_score[door_idx] + step_cost(door, through, params);
    let waypoints = compress_path(snapshot, &raw, params);
    Some(PlanOutcome {
        raw,
        waypoints,
        cost,
        escape: true,
        door: Some(door),
    })
}

/// The standable cell on the far side of `door`, continuing the approach
/// direction, or `None` if the far side is blocked.
fn through_cell(snapshot: &VoxelSnapshot, approach: CellPos, door: CellPos) -> Option<CellPos> {
    let dx = door.x - approach.x;
    let dz = door.z - approach.z;
    let level = door.offset(dx, 0, dz);
    [0, 1, -1].into_iter().map(|dy| level.up(dy)).find(|&c| {
        c != approach
            && snapshot.is_standable(c)
            && match c.y - door.y {
                1 => snapshot.is_passable(door.up(2)),
                -1 => snapshot.is_passable(c.up(2)),
                _ => true,
            }
    })
}

/// Reduce a raw cell path to the waypoints steering needs.
///
/// The start cell is dropped. A cell is kept when the path turns there, when
/// more than `keep_distance` cells were travelled since the last kept cell,
/// or when it is a door. The final cell is always kept. If more than
/// `max_waypoints` remain, doors and the final cell are kept first and the
/// rest are sampled uniformly.
pub fn compress_path(snapshot: &VoxelSnapshot, raw: &[CellPos], params: &PlannerParams) -> Vec<CellPos> {
    if raw.len() < 2 {
        return Vec::new();
    }
    let last = raw.len() - 1;
    let mut kept: Vec<(CellPos, bool)> = Vec::new();
    let mut travelled = 0.0;
    for i in 1..=last {
        let cell = raw[i];
        let prev = raw[i - 1];
        travelled += 1.0;
        let is_door = snapshot.door_kind(cell) != DoorKind::None;
        let turns = i < last && delta(prev, cell) != delta(cell, raw[i + 1]);
        if i == last || is_door || turns || travelled > params.keep_distance {
            kept.push((cell, is_door));
            travelled = 0.0;
        }
    }
    downsample(kept, params.max_waypoints)
}

fn delta(a: CellPos, b: CellPos) -> (i32, i32, i32) {
    (b.x - a.x, b.y - a.y, b.z - a.z)
}

fn downsample(kept: Vec<(CellPos, bool)>, cap: usize) -> Vec<CellPos> {
    if kept.len() <= cap {
        return kept.into_iter().map(|(c, _)| c).collect();
    }
    let last = kept.len() - 1;
    let mut chosen = vec![false; kept.len()];
    chosen[last] = true;
    let mut used = 1;
    for (i, &(_, is_door)) in kept.iter().enumerate().take(last) {
        if is_door && used < cap {
            chosen[i] = true;
            used += 1;
        }
    }
    let others: Vec<usize> = (0..last).filter(|&i| !chosen[i]).collect();
    let slots = cap - used;
    if slots > 0 && !others.is_empty() {
        let stride = others.len() as f64 / slots as f64;
        for k in 0..slots {
            let pick = ((k as f64 + 1.0) * stride).ceil() as usize - 1;
            chosen[others[pick.min(others.len() - 1)]] = true;
        }
    }
    kept.into_iter()
        .zip(chosen)
        .filter(|(_, keep)| *keep)
        .map(|((c, _), _)| c)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnapshotParams;
    use crate::testing::SparseWorld;

    fn snap(world: &SparseWorld, start: CellPos, goal: CellPos) -> VoxelSnapshot {
        VoxelSnapshot::capture(world, start, goal, false, &SnapshotParams::default()).unwrap()
    }

    fn params() -> PlannerParams {
        PlannerParams::default()
    }

    #[test]
    fn open_set_pops_lowest_score_then_level_up_down() {
        let mut open = BinaryHeap::new();
        for (index, rise) in [(3, 2), (9, 0), (1, 1), (4, 0)] {
            open.push(OpenEntry {
                index,
                f_score: 50,
                rise,
            });
        }
        open.push(OpenEntry {
            index: 0,
            f_score: 60,
            rise: 0,
        });
        let order: Vec<usize> = std::iter::from_fn(|| open.pop().map(|e| e.index)).collect();
        assert_eq!(order, vec![4, 9, 1, 3, 0]);
    }

    /// Walls x = -4 and x = 4, z = -4 and z = 4 around a flat floor, two high.
    fn walled_room(world: &mut SparseWorld) {
        for i in -4..=4 {
            for y in 64..=65 {
                world.solid(CellPos::new(i, y, -4));
                world.solid(CellPos::new(i, y, 4));
                world.solid(CellPos::new(-4, y, i));
                world.solid(CellPos::new(4, y, i));
            }
        }
    }

    fn assert_walkable(snapshot: &VoxelSnapshot, raw: &[CellPos]) {
        for cell in raw {
            assert!(snapshot.is_standable(*cell), "{cell} not standable");
        }
        for pair in raw.windows(2) {
            assert!(pair[0].is_single_step(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn corridor_reaches_goal_radius() {
        let world = SparseWorld::flat(-10, 10, 63);
        let goal = CellPos::new(3, 64, 0);
        let s = snap(&world, CellPos::new(0, 64, 0), goal);
        let plan = plan_waypoints(&s, None, PlanMode::Full, &params()).unwrap();
        assert!(!plan.escape);
        let last = *plan.waypoints.last().unwrap();
        assert!(last.distance_sq(goal) <= 4);
        assert!(plan.waypoints.len() <= params().max_waypoints);
        assert_walkable(&s, &plan.raw);
    }

    #[test]
    fn search_stops_at_nearest_goal_candidate() {
        let world = SparseWorld::flat(-10, 10, 63);
        let s = snap(&world, CellPos::new(0, 64, 0), CellPos::new(6, 64, 0));
        let plan = plan_waypoints(&s, None, PlanMode::Full, &params()).unwrap();
        // Cells within radius 2 of the goal count as arrival.
        assert_eq!(plan.raw.last(), Some(&CellPos::new(4, 64, 0)));
        assert_eq!(plan.cost, 40);
    }

    #[test]
    fn climbing_costs_extra_and_needs_headroom() {
        let mut world = SparseWorld::flat(-10, 10, 63);
        // A raised platform from x = 2 onward.
        for x in 2..=10 {
            for z in -10..=10 {
                world.solid(CellPos::new(x, 64, z));
            }
        }
        let start = CellPos::new(0, 64, 0);
        let goal = CellPos::new(6, 65, 0);
        let s = snap(&world, start, goal);
        let plan = plan_waypoints(&s, None, PlanMode::Full, &params()).unwrap();
        assert_walkable(&s, &plan.raw);
        assert_eq!(plan.cost, 10 + 14 + 10 + 10);

        // Block the headroom above the whole lower floor: no jump is possible.
        for z in -10..=10 {
            for x in -10..=1 {
                world.solid(CellPos::new(x, 66, z));
            }
        }
        let s = snap(&world, start, goal);
        assert_eq!(
            plan_waypoints(&s, None, PlanMode::Full, &params()),
            Err(PlanFailure::NoRoute)
        );
    }

    #[test]
    fn closed_soft_door_is_the_only_route() {
        let mut world = SparseWorld::flat(-10, 10, 63);
        walled_room(&mut world);
        // Replace one wall section with a closed soft door.
        let door = CellPos::new(4, 64, 0);
        world.clear(door);
        world.clear(door.up(1));
        world.door(door, DoorKind::Soft, false);
        world.door(door.up(1), DoorKind::Soft, false);

        let s = snap(&world, CellPos::new(0, 64, 0), CellPos::new(7, 64, 0));
        let plan = plan_waypoints(&s, None, PlanMode::Full, &params()).unwrap();
        assert!(plan.raw.contains(&door));
        assert!(plan.waypoints.contains(&door));
        assert_walkable(&s, &plan.raw);
    }

    #[test]
    fn closed_hard_door_blocks() {
        let mut world = SparseWorld::flat(-10, 10, 63);
        walled_room(&mut world);
        let door = CellPos::new(4, 64, 0);
        world.clear(door);
        world.clear(door.up(1));
        world.door(door, DoorKind::Hard, false);
        world.door(door.up(1), DoorKind::Hard, false);
        let s = snap(&world, CellPos::new(0, 64, 0), CellPos::new(7, 64, 0));
        assert_eq!(
            plan_waypoints(&s, None, PlanMode::Full, &params()),
            Err(PlanFailure::NoRoute)
        );
    }

    #[test]
    fn escape_picks_door_toward_goal() {
        let mut world = SparseWorld::flat(-40, 40, 63);
        walled_room(&mut world);
        let east = CellPos::new(4, 64, 0);
        let west = CellPos::new(-4, 64, 0);
        for door in [east, west] {
            world.clear(door);
            world.clear(door.up(1));
            world.door(door, DoorKind::Soft, false);
            world.door(door.up(1), DoorKind::Soft, false);
        }
        let start = CellPos::new(0, 64, 0);
        let goal = CellPos::new(100, 64, 0);
        let s = VoxelSnapshot::capture(&world, start, goal, true, &SnapshotParams::default())
            .unwrap();
        let plan = plan_waypoints(&s, None, PlanMode::Full, &params()).unwrap();
        assert!(plan.escape);
        assert_eq!(plan.door, Some(east));
        assert_eq!(plan.raw.last(), Some(&CellPos::new(5, 64, 0)));

        // Having just come through the east door, the west one is chosen.
        let plan = plan_waypoints(&s, Some(east), PlanMode::EscapeOnly, &params()).unwrap();
        assert_eq!(plan.door, Some(west));
        assert_walkable(&s, &plan.raw);
    }

    #[test]
    fn escape_without_doors_fails() {
        let mut world = SparseWorld::flat(-40, 40, 63);
        walled_room(&mut world);
        let start = CellPos::new(0, 64, 0);
        let goal = CellPos::new(100, 64, 0);
        let s = VoxelSnapshot::capture(&world, start, goal, true, &SnapshotParams::default())
            .unwrap();
        assert_eq!(
            plan_waypoints(&s, None, PlanMode::Full, &params()),
            Err(PlanFailure::NoRoute)
        );
    }

    #[test]
    fn no_standable_start() {
        let world = SparseWorld::flat(-10, 10, 63);
        // Start high in the air.
        let s = snap(&world, CellPos::new(0, 67, 0), CellPos::new(3, 67, 0));
        assert_eq!(
            plan_waypoints(&s, None, PlanMode::Full, &params()),
            Err(PlanFailure::NoStandableStart)
        );
    }

    #[test]
    fn start_snaps_to_nearby_standable_cell() {
        let world = SparseWorld::flat(-10, 10, 63);
        // Mid-jump, one cell above the floor.
        let s = snap(&world, CellPos::new(0, 65, 0), CellPos::new(5, 64, 0));
        let plan = plan_waypoints(&s, None, PlanMode::Full, &params()).unwrap();
        assert_eq!(plan.raw[0], CellPos::new(0, 64, 0));
    }

    #[test]
    fn compression_keeps_turns_and_caps_length() {
        let world = SparseWorld::flat(-30, 30, 63);
        let s = snap(&world, CellPos::new(0, 64, 0), CellPos::new(20, 64, 0));
        let raw: Vec<CellPos> = (0..=18).map(|x| CellPos::new(x, 64, 0)).collect();
        let w = compress_path(&s, &raw, &params());
        // Straight line: every fourth cell plus the last.
        assert_eq!(
            w,
            vec![
                CellPos::new(4, 64, 0),
                CellPos::new(8, 64, 0),
                CellPos::new(12, 64, 0),
                CellPos::new(16, 64, 0),
                CellPos::new(18, 64, 0),
            ]
        );

        let mut zigzag = vec![CellPos::new(0, 64, 0)];
        for i in 0..10 {
            let prev = *zigzag.last().unwrap();
            let next = if i % 2 == 0 {
                prev.offset(1, 0, 0)
            } else {
                prev.offset(0, 0, 1)
            };
            zigzag.push(next);
        }
        let w = compress_path(&s, &zigzag, &params());
        assert_eq!(w.len(), params().max_waypoints);
        assert_eq!(w.last(), zigzag.last());
    }

    #[test]
    fn downsample_keeps_doors_and_last() {
        let kept: Vec<(CellPos, bool)> = (0..12)
            .map(|x| (CellPos::new(x, 0, 0), x == 2 || x == 9))
            .collect();
        let out = downsample(kept, 5);
        assert_eq!(out.len(), 5);
        assert!(out.contains(&CellPos::new(2, 0, 0)));
        assert!(out.contains(&CellPos::new(9, 0, 0)));
        assert_eq!(out.last(), Some(&CellPos::new(11, 0, 0)));
        assert!(out.windows(2).all(|w| w[0].x < w[1].x));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn obstacle_world(obstacles: &[(i32, i32)], bumps: &[(i32, i32)]) -> SparseWorld {
            let mut world = SparseWorld::flat(-12, 12, 63);
            for &(x, z) in obstacles {
                world.solid(CellPos::new(x, 64, z));
                world.solid(CellPos::new(x, 65, z));
            }
            for &(x, z) in bumps {
                world.solid(CellPos::new(x, 64, z));
            }
            world
        }

        proptest! {
            #[test]
            fn raw_paths_are_walkable_and_deterministic(
                obstacles in prop::collection::vec((-8i32..=8, -8i32..=8), 0..40),
                bumps in prop::collection::vec((-8i32..=8, -8i32..=8), 0..20),
                gx in -8i32..=8,
                gz in -8i32..=8,
            ) {
                let world = obstacle_world(&obstacles, &bumps);
                let start = CellPos::new(0, 64, 0);
                let goal = CellPos::new(gx, 64, gz);
                let s = VoxelSnapshot::capture(&world, start, goal, false, &SnapshotParams::default()).unwrap();
                let first = plan_waypoints(&s, None, PlanMode::Full, &PlannerParams::default());
                let second = plan_waypoints(&s, None, PlanMode::Full, &PlannerParams::default());
                prop_assert_eq!(&first, &second);
                if let Ok(plan) = first {
                    for cell in &plan.raw {
                        prop_assert!(s.is_standable(*cell));
                    }
                    for pair in plan.raw.windows(2) {
                        prop_assert!(pair[0].is_single_step(pair[1]));
                    }
                    prop_assert!(plan.waypoints.len() <= PlannerParams::default().max_waypoints);
                    prop_assert_eq!(plan.waypoints.last(), plan.raw.last());
                }
            }
        }
    }
}

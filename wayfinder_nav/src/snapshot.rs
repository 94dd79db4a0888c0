// Immutable bounded capture of cell classifications for one planning call.
//
// `VoxelSnapshot::capture` runs on the owning context and reads the world
// once per cell in a bounded window (at most 49×7×49 with default config).
// The result is plain data: it can be sent to a worker and searched without
// any further access to the world, then dropped.
//
// Storage is a flat `Vec<CellFlags>` indexed by
// `x + z * size_x + y * size_x * size_z` (relative to the window origin),
// the same layout as a dense voxel grid. Out-of-window reads return the
// all-false default.
//
// Classification:
// - passable (for planning): the world says the body may occupy the cell, or
//   the cell is a soft door (closed or not). Hard doors count only when the
//   world already reports them passable (open).
// - standable: the cell and the one above are passable, and the cell below is
//   solid.
//
// See also: `planner.rs` which searches a snapshot, `orchestrator.rs` which
// schedules capture on the owning context.

use crate::config::SnapshotParams;
use crate::error::PlanFailure;
use crate::types::{CellPos, DoorKind};
use crate::world::WorldQuery;

/// Planning classification of one cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellFlags {
    pub passable: bool,
    pub standable: bool,
    pub door: DoorKind,
}

/// An immutable bounded window of cell classifications.
#[derive(Clone, Debug)]
pub struct VoxelSnapshot {
    origin: CellPos,
    size_x: i32,
    size_y: i32,
    size_z: i32,
    cells: Vec<CellFlags>,
    start: CellPos,
    goal: CellPos,
}

impl VoxelSnapshot {
    /// Capture the window for a plan from `start` to `goal`.
    ///
    /// With `center_on_start` the window is a fixed box around `start` and the
    /// goal may lie outside it (escape planning). Otherwise the window covers
    /// both endpoints plus margin, clipped to the maximum extent; if the
    /// endpoints are too far apart horizontally no snapshot is taken.
    pub fn capture<W: WorldQuery + ?Sized>(
        world: &W,
        start: CellPos,
        goal: CellPos,
        center_on_start: bool,
        params: &SnapshotParams,
    ) -> Result<Self, PlanFailure> {
        if !world.is_loaded(start) {
            return Err(PlanFailure::NoSnapshot);
        }

        let (origin, size_x, size_y, size_z) = if center_on_start {
            let hxz = params.centered_half_xz;
            let hy = params.centered_half_y;
            (
                start.offset(-hxz, -hy, -hxz),
                2 * hxz + 1,
                2 * hy + 1,
                2 * hxz + 1,
            )
        } else {
            if start.horizontal_distance(goal) > params.max_separation {
                return Err(PlanFailure::SeparationTooLarge);
            }
            let (x0, sx) = axis_window(start.x, goal.x, params.margin_xz, params.max_extent_xz);
            let (y0, sy) = axis_window(start.y, goal.y, params.margin_y, params.max_extent_y);
            let (z0, sz) = axis_window(start.z, goal.z, params.margin_xz, params.max_extent_xz);
            (CellPos::new(x0, y0, z0), sx, sy, sz)
        };

        let total = (size_x * size_y * size_z) as usize;
        let mut cells = Vec::with_capacity(total);
        for dy in 0..size_y {
            for dz in 0..size_z {
                for dx in 0..size_x {
                    let cell = origin.offset(dx, dy, dz);
                    cells.push(classify(world, cell));
                }
            }
        }

        Ok(Self {
            origin,
            size_x,
            size_y,
            size_z,
            cells,
            start,
            goal,
        })
    }

    pub fn start(&self) -> CellPos {
        self.start
    }

    pub fn goal(&self) -> CellPos {
        self.goal
    }

    /// Minimum corner of the window.
    pub fn origin(&self) -> CellPos {
        self.origin
    }

    /// Window size `(x, y, z)` in cells.
    pub fn dims(&self) -> (i32, i32, i32) {
        (self.size_x, self.size_y, self.size_z)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn contains(&self, cell: CellPos) -> bool {
        let rx = cell.x - self.origin.x;
        let ry = cell.y - self.origin.y;
        let rz = cell.z - self.origin.z;
        (0..self.size_x).contains(&rx) && (0..self.size_y).contains(&ry) && (0..self.size_z).contains(&rz)
    }

    /// Flat index of a cell. Returns `None` outside the window.
    pub fn index(&self, cell: CellPos) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let rx = (cell.x - self.origin.x) as usize;
        let ry = (cell.y - self.origin.y) as usize;
        let rz = (cell.z - self.origin.z) as usize;
        let sx = self.size_x as usize;
        let sz = self.size_z as usize;
        Some(rx + rz * sx + ry * sx * sz)
    }

    /// Inverse of `index`.
    pub fn coord(&self, index: usize) -> CellPos {
        let sx = self.size_x as usize;
        let sz = self.size_z as usize;
        let rx = index % sx;
        let rz = (index / sx) % sz;
        let ry = index / (sx * sz);
        self.origin.offset(rx as i32, ry as i32, rz as i32)
    }

    /// Flags of a cell; all-false outside the window.
    pub fn flags(&self, cell: CellPos) -> CellFlags {
        self.index(cell).map(|i| self.cells[i]).unwrap_or_default()
    }

    pub fn flags_at(&self, index: usize) -> CellFlags {
        self.cells[index]
    }

    pub fn is_standable(&self, cell: CellPos) -> bool {
        self.flags(cell).standable
    }

    pub fn is_passable(&self, cell: CellPos) -> bool {
        self.flags(cell).passable
    }

    pub fn door_kind(&self, cell: CellPos) -> DoorKind {
        self.flags(cell).door
    }

    /// Whether the goal cell lies inside the window.
    pub fn goal_in_window(&self) -> bool {
        self.contains(self.goal)
    }
}

/// Planning passability: soft doors are assumed openable.
fn plan_passable<W: WorldQuery + ?Sized>(world: &W, cell: CellPos) -> bool {
    if !world.is_loaded(cell) {
        return false;
    }
    match world.door_kind(cell) {
        DoorKind::Soft => true,
        DoorKind::Hard | DoorKind::None => world.is_passable(cell),
    }
}

fn classify<W: WorldQuery + ?Sized>(world: &W, cell: CellPos) -> CellFlags {
    if !world.is_loaded(cell) {
        return CellFlags::default();
    }
    let door = world.door_kind(cell);
    let passable = plan_passable(world, cell);
    let standable = passable && plan_passable(world, cell.up(1)) && world.is_solid_below(cell);
    CellFlags {
        passable,
        standable,
        door,
    }
}

/// One axis of a start/goal window: `(min, size)`.
///
/// Covers both endpoints plus margin when that fits in `max_extent`;
/// otherwise keeps `margin` cells behind the start and spends the rest of the
/// extent toward the goal.
fn axis_window(start: i32, goal: i32, margin: i32, max_extent: i32) -> (i32, i32) {
    let lo = start.min(goal) - margin;
    let hi = start.max(goal) + margin;
    if hi - lo < max_extent {
        return (lo, hi - lo + 1);
    }
    let margin = margin.min(max_extent - 1);
    if goal >= start {
        (start - margin, max_extent)
    } else {
        (start + margin - (max_extent - 1), max_extent)
    }
}

// Raw world facts around an agent, captured for worker-side recovery logic.
//
// Recovery tiers decide what to do on a worker thread but may only touch the
// world on the owning context. A tier asks the owning context for a
// `LocalSurvey` of a small box around the agent, then makes its decision
// against the survey. The survey implements `WorldQuery` itself, so the same
// predicates (`body_fits`, the hazard filter, openness) run unchanged against
// the live world and against a survey.
//
// Cells outside the box read as unloaded. Every action a tier takes is
// re-checked against the live world on the owning context before it
// happens, so a stale survey can cost a wasted action but never an unsafe
// one.

use crate::types::{CellPos, DoorKind, Point3, TargetId};
use crate::world::WorldQuery;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct SurveyCell {
    loaded: bool,
    passable: bool,
    solid: bool,
    door: DoorKind,
    protected: bool,
    hazard: bool,
    loose: bool,
    ground_cover: bool,
    constructed: bool,
    sky: bool,
}

/// An immutable box of raw cell facts.
#[derive(Clone, Debug)]
pub struct LocalSurvey {
    center: CellPos,
    origin: CellPos,
    size_x: i32,
    size_y: i32,
    size_z: i32,
    cells: Vec<SurveyCell>,
}

impl LocalSurvey {
    /// Capture every cell within `radius_xz` horizontally and `radius_y`
    /// vertically of `center`, plus one extra layer below so
    /// `is_solid_below` answers for the bottom row.
    pub fn capture<W: WorldQuery + ?Sized>(
        world: &W,
        center: CellPos,
        radius_xz: i32,
        radius_y: i32,
    ) -> Self {
        let origin = center.offset(-radius_xz, -radius_y - 1, -radius_xz);
        let size_x = 2 * radius_xz + 1;
        let size_y = 2 * radius_y + 2;
        let size_z = 2 * radius_xz + 1;
        let mut cells = Vec::with_capacity((size_x * size_y * size_z) as usize);
        for dy in 0..size_y {
            for dz in 0..size_z {
                for dx in 0..size_x {
                    let cell = origin.offset(dx, dy, dz);
                    cells.push(if world.is_loaded(cell) {
                        SurveyCell {
                            loaded: true,
                            passable: world.is_passable(cell),
                            solid: world.is_solid(cell),
                            door: world.door_kind(cell),
                            protected: world.is_protected(cell),
                            hazard: world.is_hazard(cell),
                            loose: world.is_loose(cell),
                            ground_cover: world.is_ground_cover(cell),
                            constructed: world.is_constructed(cell),
                            sky: world.sky_visible(cell),
                        }
                    } else {
                        SurveyCell::default()
                    });
                }
            }
        }
        Self {
            center,
            origin,
            size_x,
            size_y,
            size_z,
            cells,
        }
    }

    /// The cell the survey was centered on (the agent's feet).
    pub fn center(&self) -> CellPos {
        self.center
    }

    fn get(&self, cell: CellPos) -> SurveyCell {
        let rx = cell.x - self.origin.x;
        let ry = cell.y - self.origin.y;
        let rz = cell.z - self.origin.z;
        if !(0..self.size_x).contains(&rx)
            || !(0..self.size_y).contains(&ry)
            || !(0..self.size_z).contains(&rz)
        {
            return SurveyCell::default();
        }
        let index = rx + rz * self.size_x + ry * self.size_x * self.size_z;
        self.cells[index as usize]
    }

    /// Cells within `radius` of the center (horizontal and vertical) that
    /// satisfy `pred`.
    pub fn count_within(&self, radius: i32, pred: impl Fn(CellPos) -> bool) -> u32 {
        let mut n = 0;
        for dy in -radius..=radius {
            for dz in -radius..=radius {
                for dx in -radius..=radius {
                    if pred(self.center.offset(dx, dy, dz)) {
                        n += 1;
                    }
                }
            }
        }
        n
    }
}

impl WorldQuery for LocalSurvey {
    fn is_loaded(&self, cell: CellPos) -> bool {
        self.get(cell).loaded
    }

    fn is_passable(&self, cell: CellPos) -> bool {
        self.get(cell).passable
    }

    fn is_solid_below(&self, cell: CellPos) -> bool {
        self.get(cell.down(1)).solid
    }

    fn door_kind(&self, cell: CellPos) -> DoorKind {
        self.get(cell).door
    }

    fn is_protected(&self, cell: CellPos) -> bool {
        self.get(cell).protected
    }

    fn is_hazard(&self, cell: CellPos) -> bool {
        self.get(cell).hazard
    }

    fn sky_visible(&self, cell: CellPos) -> bool {
        self.get(cell).sky
    }

    fn is_loose(&self, cell: CellPos) -> bool {
        self.get(cell).loose
    }

    fn is_ground_cover(&self, cell: CellPos) -> bool {
        self.get(cell).ground_cover
    }

    fn is_constructed(&self, cell: CellPos) -> bool {
        self.get(cell).constructed
    }

    fn entity_position(&self, _target: TargetId) -> Option<Point3> {
        None
    }

    fn is_solid(&self, cell: CellPos) -> bool {
        self.get(cell).solid
    }
}

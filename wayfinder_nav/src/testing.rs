// Sparse in-memory host used by this crate's unit tests.
//
// Cells default to air. Solid cells, doors and the special classifications
// (protected, hazard, loose, ground cover, constructed) are kept in hash
// sets. Agent bodies have trivial kinematics: an impulse moves the body half
// a cell toward the point if its two-high footprint fits there, then the body
// drops until it rests on something solid. Every world mutation is recorded
// so tests can assert on what a tier did.

use crate::types::{AgentId, CellPos, DoorKind, Point3, TargetId};
use crate::world::{AgentBody, WORLD_QUERY_VERSION, WorldQuery};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Default)]
pub(crate) struct SparseWorld {
    solids: FxHashSet<CellPos>,
    doors: FxHashMap<CellPos, (DoorKind, bool)>,
    protected: FxHashSet<CellPos>,
    hazards: FxHashSet<CellPos>,
    loose: FxHashSet<CellPos>,
    ground_cover: FxHashSet<CellPos>,
    constructed: FxHashSet<CellPos>,
    unloaded: bool,
    /// Reported interface version; `None` reports the current one.
    pub interface_version: Option<u32>,
    entities: FxHashMap<TargetId, Point3>,
    agents: FxHashMap<AgentId, Point3>,
    pub inventory: u32,
    pub impulses: Vec<(AgentId, Point3)>,
    pub broken: Vec<CellPos>,
    pub placed: Vec<CellPos>,
    pub opened: Vec<CellPos>,
    pub jumps: u32,
}

impl SparseWorld {
    /// A square stone floor at height `y` spanning `lo..=hi` on x and z.
    pub fn flat(lo: i32, hi: i32, y: i32) -> Self {
        let mut world = Self::default();
        for x in lo..=hi {
            for z in lo..=hi {
                world.solids.insert(CellPos::new(x, y, z));
            }
        }
        world
    }

    pub fn solid(&mut self, cell: CellPos) {
        self.solids.insert(cell);
    }

    pub fn clear(&mut self, cell: CellPos) {
        self.solids.remove(&cell);
    }

    pub fn door(&mut self, cell: CellPos, kind: DoorKind, open: bool) {
        self.doors.insert(cell, (kind, open));
    }

    /// Solid and unbreakable.
    pub fn protect(&mut self, cell: CellPos) {
        self.solids.insert(cell);
        self.protected.insert(cell);
    }

    pub fn hazard(&mut self, cell: CellPos) {
        self.hazards.insert(cell);
    }

    pub fn loose(&mut self, cell: CellPos) {
        self.solids.insert(cell);
        self.loose.insert(cell);
    }

    pub fn ground_cover(&mut self, cell: CellPos) {
        self.solids.insert(cell);
        self.ground_cover.insert(cell);
    }

    pub fn constructed(&mut self, cell: CellPos) {
        self.solids.insert(cell);
        self.constructed.insert(cell);
    }

    pub fn unload_all(&mut self) {
        self.unloaded = true;
    }

    pub fn place_agent(&mut self, agent: AgentId, at: Point3) {
        self.agents.insert(agent, at);
    }

    pub fn place_entity(&mut self, target: TargetId, at: Point3) {
        self.entities.insert(target, at);
    }

    pub fn mutation_count(&self) -> usize {
        self.broken.len() + self.placed.len()
    }

    fn fits(&self, cell: CellPos) -> bool {
        self.is_passable(cell) && self.is_passable(cell.up(1))
    }

    fn settle(&self, mut at: Point3) -> Point3 {
        for _ in 0..16 {
            if self.is_solid_below(at.cell()) {
                break;
            }
            at.y -= 1.0;
        }
        at
    }
}

impl WorldQuery for SparseWorld {
    fn version(&self) -> u32 {
        self.interface_version.unwrap_or(WORLD_QUERY_VERSION)
    }

    fn is_loaded(&self, _cell: CellPos) -> bool {
        !self.unloaded
    }

    fn is_passable(&self, cell: CellPos) -> bool {
        if self.solids.contains(&cell) || self.hazards.contains(&cell) {
            return false;
        }
        match self.doors.get(&cell) {
            Some(&(_, open)) => open,
            None => true,
        }
    }

    fn is_solid_below(&self, cell: CellPos) -> bool {
        self.solids.contains(&cell.down(1))
    }

    fn door_kind(&self, cell: CellPos) -> DoorKind {
        self.doors.get(&cell).map(|&(k, _)| k).unwrap_or_default()
    }

    fn is_protected(&self, cell: CellPos) -> bool {
        self.protected.contains(&cell)
    }

    fn is_hazard(&self, cell: CellPos) -> bool {
        self.hazards.contains(&cell)
    }

    fn sky_visible(&self, cell: CellPos) -> bool {
        (1..=48).all(|dy| !self.solids.contains(&cell.up(dy)))
    }

    fn is_loose(&self, cell: CellPos) -> bool {
        self.loose.contains(&cell)
    }

    fn is_ground_cover(&self, cell: CellPos) -> bool {
        self.ground_cover.contains(&cell)
    }

    fn is_constructed(&self, cell: CellPos) -> bool {
        self.constructed.contains(&cell)
    }

    fn entity_position(&self, target: TargetId) -> Option<Point3> {
        self.entities.get(&target).copied()
    }
}

impl AgentBody for SparseWorld {
    fn position(&self, agent: AgentId) -> Option<Point3> {
        self.agents.get(&agent).copied()
    }

    fn apply_impulse_toward(&mut self, agent: AgentId, point: Point3) {
        self.impulses.push((agent, point));
        let Some(at) = self.agents.get(&agent).copied() else {
            return;
        };
        let Some((ux, uz)) = at.horizontal_direction_to(point) else {
            return;
        };
        let step = at.horizontal_distance(point).min(0.5);
        let mut next = Point3::new(at.x + ux * step, at.y, at.z + uz * step);
        if !self.fits(next.cell()) {
            let climbed = Point3::new(next.x, next.y + 1.0, next.z);
            if self.fits(climbed.cell()) && self.fits(at.cell().up(1)) {
                next = climbed;
            } else {
                return;
            }
        }
        let settled = self.settle(next);
        self.agents.insert(agent, settled);
    }

    fn face(&mut self, _agent: AgentId, _cell: CellPos) {}

    fn jump(&mut self, agent: AgentId) {
        self.jumps += 1;
        if let Some(at) = self.agents.get(&agent).copied() {
            let up = Point3::new(at.x, at.y + 1.0, at.z);
            if self.fits(up.cell()) {
                self.agents.insert(agent, up);
            }
        }
    }

    fn set_sprinting(&mut self, _agent: AgentId, _sprinting: bool) {}

    fn try_break(&mut self, _agent: AgentId, cell: CellPos) -> bool {
        if self.protected.contains(&cell) || !self.solids.remove(&cell) {
            return false;
        }
        self.loose.remove(&cell);
        self.ground_cover.remove(&cell);
        self.constructed.remove(&cell);
        self.broken.push(cell);
        true
    }

    fn try_open_door(&mut self, _agent: AgentId, cell: CellPos) -> bool {
        match self.doors.get_mut(&cell) {
            Some((DoorKind::Soft, open)) if !*open => {
                *open = true;
                self.opened.push(cell);
                true
            }
            _ => false,
        }
    }

    fn place_block(&mut self, agent: AgentId, cell: CellPos) -> bool {
        if self.inventory == 0 || self.solids.contains(&cell) {
            return false;
        }
        if let Some(at) = self.agents.get(&agent).copied() {
            if at.cell() == cell {
                if !self.fits(cell.up(1)) {
                    return false;
                }
                self.agents.insert(agent, Point3::new(at.x, at.y + 1.0, at.z));
            }
        }
        self.inventory -= 1;
        self.solids.insert(cell);
        self.placed.push(cell);
        true
    }

    fn has_placeable(&self, _agent: AgentId) -> bool {
        self.inventory > 0
    }
}

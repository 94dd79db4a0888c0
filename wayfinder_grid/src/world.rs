// Dense voxel world implementing the navigation host traits.
//
// Blocks live in a flat `Vec<Block>` indexed by
// `dx + dz * size_x + dy * size_x * size_z` relative to `origin`, so the
// grid can sit anywhere in cell space (negative coordinates included).
// Cells outside the grid are unloaded: they read as `Air` but
// `is_loaded` reports `false`, which the navigation core treats as
// impassable.
//
// Bodies have deliberately simple kinematics. An impulse moves the body
// half a cell (0.7 sprinting) toward the point if its two-high footprint
// fits there, steps up one level if the way is blocked but the level above
// is free, then drops it until it rests on something solid. Jumps lift a
// supported body one level. Breaking a block under loose material (sand)
// lets the column above fall into the hole.
//
// See also: `harness.rs`, which drives a `Navigator` against this world.

use rustc_hash::FxHashMap;
use wayfinder_nav::{AgentBody, AgentId, CellPos, DoorKind, Point3, TargetId, WorldQuery};

/// Horizontal travel per impulse.
const STRIDE: f64 = 0.5;
const SPRINT_STRIDE: f64 = 0.7;
/// Settling never drops a body further than this in one step.
const MAX_FALL: i32 = 32;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Block {
    #[default]
    Air,
    Stone,
    Dirt,
    /// Natural topsoil; marks the surface.
    Grass,
    /// Falls when the block below opens.
    Sand,
    /// Player-built.
    Planks,
    /// Unbreakable.
    Bedrock,
    /// Blocks movement and must not be exposed.
    Lava,
    Door { kind: DoorKind, open: bool },
}

impl Block {
    pub fn is_solid(self) -> bool {
        matches!(
            self,
            Block::Stone | Block::Dirt | Block::Grass | Block::Sand | Block::Planks | Block::Bedrock
        )
    }

    fn blocks_body(self) -> bool {
        match self {
            Block::Door { open, .. } => !open,
            Block::Lava => true,
            other => other.is_solid(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Body {
    position: Point3,
    inventory: u32,
    sprinting: bool,
}

/// Dense voxel grid plus the bodies and entities moving through it.
#[derive(Clone, Debug, Default)]
pub struct GridWorld {
    origin: CellPos,
    size_x: i32,
    size_y: i32,
    size_z: i32,
    blocks: Vec<Block>,
    bodies: FxHashMap<AgentId, Body>,
    entities: FxHashMap<TargetId, Point3>,
    /// Every cell an agent broke, in order.
    pub broken: Vec<CellPos>,
    /// Every cell an agent placed a block in, in order.
    pub placed: Vec<CellPos>,
}

impl GridWorld {
    /// An all-air grid of the given size with its low corner at `origin`.
    pub fn new(origin: CellPos, size_x: i32, size_y: i32, size_z: i32) -> Self {
        let total = (size_x.max(0) * size_y.max(0) * size_z.max(0)) as usize;
        Self {
            origin,
            size_x,
            size_y,
            size_z,
            blocks: vec![Block::Air; total],
            ..Self::default()
        }
    }

    /// A square world `2 * half + 1` cells across centered on x = z = 0:
    /// bedrock at the bottom, stone up to `surface_y - 1`, grass at
    /// `surface_y`, and 16 levels of air above.
    pub fn flat(half: i32, surface_y: i32) -> Self {
        let floor = surface_y - 4;
        let mut world = Self::new(
            CellPos::new(-half, floor, -half),
            2 * half + 1,
            surface_y - floor + 17,
            2 * half + 1,
        );
        let lo = CellPos::new(-half, floor, -half);
        let hi = CellPos::new(half, surface_y, half);
        world.fill(lo, hi, Block::Stone);
        world.fill(lo, CellPos::new(half, floor, half), Block::Bedrock);
        world.fill(
            CellPos::new(-half, surface_y, -half),
            hi,
            Block::Grass,
        );
        world
    }

    pub fn in_bounds(&self, cell: CellPos) -> bool {
        let (dx, dy, dz) = (
            cell.x - self.origin.x,
            cell.y - self.origin.y,
            cell.z - self.origin.z,
        );
        (0..self.size_x).contains(&dx) && (0..self.size_y).contains(&dy) && (0..self.size_z).contains(&dz)
    }

    fn index(&self, cell: CellPos) -> Option<usize> {
        if !self.in_bounds(cell) {
            return None;
        }
        let dx = (cell.x - self.origin.x) as usize;
        let dy = (cell.y - self.origin.y) as usize;
        let dz = (cell.z - self.origin.z) as usize;
        let sx = self.size_x as usize;
        let sz = self.size_z as usize;
        Some(dx + dz * sx + dy * sx * sz)
    }

    /// Read a block. `Air` outside the grid.
    pub fn get(&self, cell: CellPos) -> Block {
        self.index(cell).map_or(Block::Air, |i| self.blocks[i])
    }

    /// Write a block. No-op outside the grid.
    pub fn set(&mut self, cell: CellPos, block: Block) {
        if let Some(i) = self.index(cell) {
            self.blocks[i] = block;
        }
    }

    /// Fill the inclusive box between two corners.
    pub fn fill(&mut self, a: CellPos, b: CellPos, block: Block) {
        for y in a.y.min(b.y)..=a.y.max(b.y) {
            for z in a.z.min(b.z)..=a.z.max(b.z) {
                for x in a.x.min(b.x)..=a.x.max(b.x) {
                    self.set(CellPos::new(x, y, z), block);
                }
            }
        }
    }

    /// Put an agent at `at` carrying `inventory` placeable blocks.
    pub fn spawn(&mut self, agent: AgentId, at: Point3, inventory: u32) {
        self.bodies.insert(
            agent,
            Body {
                position: at,
                inventory,
                sprinting: false,
            },
        );
    }

    pub fn inventory(&self, agent: AgentId) -> u32 {
        self.bodies.get(&agent).map_or(0, |b| b.inventory)
    }

    pub fn place_entity(&mut self, target: TargetId, at: Point3) {
        self.entities.insert(target, at);
    }

    pub fn mutation_count(&self) -> usize {
        self.broken.len() + self.placed.len()
    }

    fn fits(&self, cell: CellPos) -> bool {
        self.in_bounds(cell) && self.is_passable(cell) && self.is_passable(cell.up(1))
    }

    fn settle(&self, mut at: Point3) -> Point3 {
        for _ in 0..MAX_FALL {
            let cell = at.cell();
            if self.is_solid_below(cell) || !self.in_bounds(cell.down(1)) {
                break;
            }
            at.y -= 1.0;
        }
        at
    }

    /// Let loose blocks stacked above `hole` fall into it.
    fn drop_loose(&mut self, hole: CellPos) {
        let mut hole = hole;
        while self.get(hole.up(1)) == Block::Sand {
            self.set(hole, Block::Sand);
            self.set(hole.up(1), Block::Air);
            hole = hole.up(1);
        }
    }
}

impl WorldQuery for GridWorld {
    fn is_loaded(&self, cell: CellPos) -> bool {
        self.in_bounds(cell)
    }

    fn is_passable(&self, cell: CellPos) -> bool {
        !self.get(cell).blocks_body()
    }

    fn is_solid_below(&self, cell: CellPos) -> bool {
        self.get(cell.down(1)).is_solid()
    }

    fn door_kind(&self, cell: CellPos) -> DoorKind {
        match self.get(cell) {
            Block::Door { kind, .. } => kind,
            _ => DoorKind::None,
        }
    }

    fn is_protected(&self, cell: CellPos) -> bool {
        self.get(cell) == Block::Bedrock
    }

    fn is_hazard(&self, cell: CellPos) -> bool {
        self.get(cell) == Block::Lava
    }

    fn sky_visible(&self, cell: CellPos) -> bool {
        let top = self.origin.y + self.size_y;
        (cell.y + 1..top).all(|y| !self.get(CellPos::new(cell.x, y, cell.z)).is_solid())
    }

    fn is_loose(&self, cell: CellPos) -> bool {
        self.get(cell) == Block::Sand
    }

    fn is_ground_cover(&self, cell: CellPos) -> bool {
        self.get(cell) == Block::Grass
    }

    fn is_constructed(&self, cell: CellPos) -> bool {
        self.get(cell) == Block::Planks
    }

    fn entity_position(&self, target: TargetId) -> Option<Point3> {
        self.entities.get(&target).copied()
    }
}

impl AgentBody for GridWorld {
    fn position(&self, agent: AgentId) -> Option<Point3> {
        self.bodies.get(&agent).map(|b| b.position)
    }

    fn apply_impulse_toward(&mut self, agent: AgentId, point: Point3) {
        let Some(body) = self.bodies.get(&agent).copied() else {
            return;
        };
        let at = body.position;
        let Some((ux, uz)) = at.horizontal_direction_to(point) else {
            return;
        };
        let stride = if body.sprinting { SPRINT_STRIDE } else { STRIDE };
        let step = at.horizontal_distance(point).min(stride);
        let mut next = Point3::new(at.x + ux * step, at.y, at.z + uz * step);
        if !self.fits(next.cell()) {
            let climbed = Point3::new(next.x, next.y + 1.0, next.z);
            if self.fits(climbed.cell()) && self.fits(at.cell().up(1)) {
                next = climbed;
            } else {
                // Blocked: a body left in the air by a jump falls back.
                next = at;
            }
        }
        let settled = self.settle(next);
        if let Some(body) = self.bodies.get_mut(&agent) {
            body.position = settled;
        }
    }

    fn face(&mut self, _agent: AgentId, _cell: CellPos) {}

    fn jump(&mut self, agent: AgentId) {
        let Some(at) = self.position(agent) else {
            return;
        };
        let up = Point3::new(at.x, at.y + 1.0, at.z);
        if !self.is_solid_below(at.cell()) || !self.fits(up.cell()) {
            return;
        }
        if let Some(body) = self.bodies.get_mut(&agent) {
            body.position = up;
        }
    }

    fn set_sprinting(&mut self, agent: AgentId, sprinting: bool) {
        if let Some(body) = self.bodies.get_mut(&agent) {
            body.sprinting = sprinting;
        }
    }

    fn try_break(&mut self, _agent: AgentId, cell: CellPos) -> bool {
        let block = self.get(cell);
        if !block.is_solid() || block == Block::Bedrock {
            return false;
        }
        self.set(cell, Block::Air);
        self.broken.push(cell);
        self.drop_loose(cell);
        true
    }

    fn try_open_door(&mut self, _agent: AgentId, cell: CellPos) -> bool {
        match self.get(cell) {
            Block::Door {
                kind: DoorKind::Soft,
                open: false,
            } => {
                self.set(
                    cell,
                    Block::Door {
                        kind: DoorKind::Soft,
                        open: true,
                    },
                );
                true
            }
            _ => false,
        }
    }

    fn place_block(&mut self, agent: AgentId, cell: CellPos) -> bool {
        let Some(body) = self.bodies.get(&agent).copied() else {
            return false;
        };
        if body.inventory == 0 || !self.in_bounds(cell) || self.get(cell).blocks_body() {
            return false;
        }
        let mut position = body.position;
        if position.cell() == cell {
            if !self.fits(cell.up(1)) {
                return false;
            }
            position.y += 1.0;
        }
        self.set(cell, Block::Dirt);
        self.placed.push(cell);
        if let Some(body) = self.bodies.get_mut(&agent) {
            body.inventory -= 1;
            body.position = position;
        }
        true
    }

    fn has_placeable(&self, agent: AgentId) -> bool {
        self.inventory(agent) > 0
    }
}

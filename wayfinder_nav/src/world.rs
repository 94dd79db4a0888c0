// Collaborator interfaces: what the navigation core reads from the world and
// what it asks the agent's body to do.
//
// The host implements `WorldQuery` (read-only cell facts) and `AgentBody`
// (movement primitives). Anything implementing both is a `NavHost`. The core
// never discovers host capabilities at runtime; the trait surface is the
// contract, and `WORLD_QUERY_VERSION` is bumped whenever it changes shape.
// Captures and the per-tick stuck check refuse to run against a host that
// reports a different version.
//
// All calls on a `NavHost` happen on the owning context (the thread that
// owns world mutation). Worker-side code reaches the host only through
// `owner::OwnerAccess`.
//
// See also: `owner.rs` for marshalling onto the owning context,
// `snapshot.rs` and `survey.rs` which capture facts from a `WorldQuery`.

use crate::types::{AgentId, CellPos, DoorKind, Point3, TargetId};

/// Shape version of `WorldQuery` + `AgentBody`.
pub const WORLD_QUERY_VERSION: u32 = 1;

/// Read-only world facts.
pub trait WorldQuery {
    /// The interface version the host was written against.
    fn version(&self) -> u32 {
        WORLD_QUERY_VERSION
    }

    /// Whether the chunk holding `cell` is loaded. Unloaded cells are treated
    /// as impassable and non-standable.
    fn is_loaded(&self, cell: CellPos) -> bool;

    /// Whether an agent's body may occupy `cell` right now (air, plants, open
    /// doors).
    fn is_passable(&self, cell: CellPos) -> bool;

    /// Whether the cell directly below `cell` can carry the agent's weight.
    fn is_solid_below(&self, cell: CellPos) -> bool;

    fn door_kind(&self, cell: CellPos) -> DoorKind;

    /// Cells that must never be broken (bedrock, other players' builds, ...).
    fn is_protected(&self, cell: CellPos) -> bool;

    /// Cells that hurt to touch or expose (lava, fire, fluids).
    fn is_hazard(&self, cell: CellPos) -> bool;

    fn sky_visible(&self, cell: CellPos) -> bool;

    /// Gravity-affected materials that cascade when the cell below opens.
    fn is_loose(&self, _cell: CellPos) -> bool {
        false
    }

    /// Natural topsoil (grass, snow layer) that marks the surface.
    fn is_ground_cover(&self, _cell: CellPos) -> bool {
        false
    }

    /// Player-built material: planks, glass, bricks.
    fn is_constructed(&self, _cell: CellPos) -> bool {
        false
    }

    /// Current position of a tracked entity, if it still exists.
    fn entity_position(&self, target: TargetId) -> Option<Point3>;

    /// A loaded, impassable, non-door cell.
    fn is_solid(&self, cell: CellPos) -> bool {
        self.is_solid_below(cell.up(1))
    }
}

/// Per-tick movement primitives for one agent.
pub trait AgentBody {
    fn position(&self, agent: AgentId) -> Option<Point3>;

    fn apply_impulse_toward(&mut self, agent: AgentId, point: Point3);

    fn face(&mut self, agent: AgentId, cell: CellPos);

    fn jump(&mut self, agent: AgentId);

    fn set_sprinting(&mut self, agent: AgentId, sprinting: bool);

    /// Break `cell`. Returns `false` if the host refused or nothing broke.
    fn try_break(&mut self, agent: AgentId, cell: CellPos) -> bool;

    /// Open a closed soft door. Returns `false` if there was nothing to open.
    fn try_open_door(&mut self, agent: AgentId, cell: CellPos) -> bool;

    /// Place one unit of disposable material from the agent's inventory.
    fn place_block(&mut self, agent: AgentId, cell: CellPos) -> bool;

    /// Whether the agent carries disposable material for `place_block`.
    fn has_placeable(&self, agent: AgentId) -> bool;
}

/// Everything the navigation core needs from its host.
pub trait NavHost: WorldQuery + AgentBody {}

impl<T: WorldQuery + AgentBody> NavHost for T {}

/// Whether the host was written against this crate's `WorldQuery` shape.
pub fn is_compatible<W: WorldQuery + ?Sized>(world: &W) -> bool {
    world.version() == WORLD_QUERY_VERSION
}

/// Whether a two-high body fits with its feet in `cell`.
pub fn body_fits<W: WorldQuery + ?Sized>(world: &W, cell: CellPos) -> bool {
    world.is_loaded(cell) && world.is_passable(cell) && world.is_passable(cell.up(1))
}

/// Whether the agent can stand with its feet in `cell` using the world's
/// current passability (doors count as they are right now).
pub fn is_standable_now<W: WorldQuery + ?Sized>(world: &W, cell: CellPos) -> bool {
    body_fits(world, cell) && world.is_solid_below(cell)
}

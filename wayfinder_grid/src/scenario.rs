// Named test worlds.
//
// Every scenario is a `GridWorld::flat` meadow (grass at y 63, agents stand
// at y 64) with one feature added, an agent spawned, and a goal cell. The
// `wayfinder-sim` binary runs them by name; the integration tests build them
// directly.

use wayfinder_nav::{AgentId, CellPos, DoorKind};

use crate::world::{Block, GridWorld};

pub const AGENT: AgentId = AgentId(1);

/// Every scenario name `build` accepts.
pub const NAMES: [&str; 5] = ["corridor", "door", "pit", "sealed", "buried"];

pub struct Scenario {
    pub name: &'static str,
    pub world: GridWorld,
    pub goal: CellPos,
    /// Tick budget the runner gives the agent.
    pub max_ticks: u32,
}

/// Build the scenario called `name`.
pub fn build(name: &str) -> Option<Scenario> {
    let scenario = match name {
        "corridor" => corridor(),
        "door" => door(),
        "pit" => pit(),
        "sealed" => sealed(),
        "buried" => buried(),
        _ => return None,
    };
    Some(scenario)
}

fn spawn_at(world: &mut GridWorld, cell: CellPos, inventory: u32) {
    world.spawn(AGENT, cell.center(), inventory);
}

/// Straight stone-walled corridor along +x.
pub fn corridor() -> Scenario {
    let mut world = GridWorld::flat(10, 63);
    world.fill(CellPos::new(-10, 64, -1), CellPos::new(10, 66, -1), Block::Stone);
    world.fill(CellPos::new(-10, 64, 1), CellPos::new(10, 66, 1), Block::Stone);
    spawn_at(&mut world, CellPos::new(0, 64, 0), 0);
    Scenario {
        name: "corridor",
        world,
        goal: CellPos::new(6, 64, 0),
        max_ticks: 300,
    }
}

/// A wall across the meadow at x = 1 whose only gap is a closed soft door.
pub fn door() -> Scenario {
    let mut world = GridWorld::flat(10, 63);
    world.fill(CellPos::new(1, 64, -10), CellPos::new(1, 66, 10), Block::Stone);
    let closed = Block::Door {
        kind: DoorKind::Soft,
        open: false,
    };
    world.set(CellPos::new(1, 64, 0), closed);
    world.set(CellPos::new(1, 65, 0), closed);
    spawn_at(&mut world, CellPos::new(-3, 64, 0), 0);
    Scenario {
        name: "door",
        world,
        goal: CellPos::new(4, 64, 0),
        max_ticks: 300,
    }
}

/// Open-topped bedrock pit, three high, with building material on hand.
pub fn pit() -> Scenario {
    let mut world = GridWorld::flat(10, 63);
    wall_in(&mut world, CellPos::new(0, 64, 0), 66);
    spawn_at(&mut world, CellPos::new(0, 64, 0), 4);
    Scenario {
        name: "pit",
        world,
        goal: CellPos::new(6, 64, 0),
        max_ticks: 800,
    }
}

/// The pit with a bedrock floor and lid: nothing can be mined or built.
pub fn sealed() -> Scenario {
    let mut world = GridWorld::flat(10, 63);
    wall_in(&mut world, CellPos::new(0, 64, 0), 65);
    world.fill(CellPos::new(-1, 66, -1), CellPos::new(1, 66, 1), Block::Bedrock);
    world.fill(CellPos::new(-1, 63, -1), CellPos::new(1, 63, 1), Block::Bedrock);
    spawn_at(&mut world, CellPos::new(0, 64, 0), 4);
    Scenario {
        name: "sealed",
        world,
        goal: CellPos::new(6, 64, 0),
        max_ticks: 600,
    }
}

/// Agent in a two-high pocket under four levels of stone and a grass top.
pub fn buried() -> Scenario {
    let mut world = GridWorld::flat(10, 63);
    world.fill(CellPos::new(-10, 64, -4), CellPos::new(10, 67, 4), Block::Stone);
    world.fill(CellPos::new(-10, 68, -4), CellPos::new(10, 68, 4), Block::Grass);
    world.set(CellPos::new(0, 64, 0), Block::Air);
    world.set(CellPos::new(0, 65, 0), Block::Air);
    spawn_at(&mut world, CellPos::new(0, 64, 0), 0);
    Scenario {
        name: "buried",
        world,
        goal: CellPos::new(6, 64, 0),
        max_ticks: 1500,
    }
}

/// Ring the eight neighbors of `feet` with bedrock up to `top`.
fn wall_in(world: &mut GridWorld, feet: CellPos, top: i32) {
    for dx in -1..=1 {
        for dz in -1..=1 {
            if dx == 0 && dz == 0 {
                continue;
            }
            let column = feet.offset(dx, 0, dz);
            world.fill(column, CellPos::new(column.x, top, column.z), Block::Bedrock);
        }
    }
}

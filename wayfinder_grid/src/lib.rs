// wayfinder_grid: a dense voxel host for `wayfinder_nav`.
//
// Companion crate to the navigation core: a concrete world that implements
// `WorldQuery` and `AgentBody`, plus a tick-loop harness that plays the host
// role. Used by the integration tests under `tests/` and by the
// `wayfinder-sim` scenario runner.
//
// Module overview:
// - `world.rs`:     `GridWorld`, block types, toy kinematics.
// - `harness.rs`:   `Harness`, the single-threaded host tick loop.
// - `scenario.rs`:  Named worlds (corridor, door, pit, sealed, buried) shared by
//                   the binary and the tests.

pub mod harness;
pub mod scenario;
pub mod world;

pub use harness::{Harness, WalkReport};
pub use world::{Block, GridWorld};

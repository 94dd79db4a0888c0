// wayfinder_nav: navigation core for agents in a voxel world.
//
// This crate plans routes for autonomous agents through a block world it
// does not own, and gets them moving again when they stop making progress.
// It never touches the world directly: the host implements `WorldQuery` and
// `AgentBody` for its world type, and every read or write happens on the
// host's owning context (usually the tick thread). Searches and the heavier
// recovery tiers run on a rayon pool and marshal their world access back
// through a job queue the host drains with `Navigator::pump`.
//
// Module overview:
// - `navigator.rs`:    `Navigator`, the facade the host drives per tick.
// - `orchestrator.rs`: Plan admission (rate limits, retarget suppression) and
//                      the capture -> search -> install pipeline.
// - `snapshot.rs`:     `VoxelSnapshot`, the bounded copy of the world a
//                      search runs against.
// - `planner.rs`:      Bounded A* over a snapshot, escape-door fallback,
//                      path compression into waypoints.
// - `progress.rs`:     Per-tick stagnation tracking.
// - `recovery/`:       The six-tier stuck-recovery ladder.
// - `survey.rs`:       `LocalSurvey`, a small world copy recovery tiers plan
//                      against.
// - `state.rs`:        Per-agent records and the registry that owns them.
// - `owner.rs`:        Marshalling work onto the owning context.
// - `world.rs`:        The host-facing traits.
// - `config.rs`:       `NavConfig`, every tunable, loadable from JSON.
// - `clock.rs`:        Wall-clock abstraction; `ManualClock` for tests.
// - `log.rs`:          Per-agent log throttling.
// - `error.rs`:        `PlanFailure` and `NavError`.
// - `types.rs`:        Cell and point geometry, ids, small enums.
//
// **Safety constraint:** no recovery action may break a protected cell or
// a cell next to a hazard. Every break re-checks that against the live world
// on the owning context, not against a worker's copy.

pub mod clock;
pub mod config;
pub mod error;
pub mod log;
pub mod navigator;
pub mod orchestrator;
pub mod owner;
pub mod planner;
pub mod progress;
pub mod recovery;
pub mod snapshot;
pub mod state;
pub mod survey;
pub mod types;
pub mod world;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::NavConfig;
pub use error::{NavError, PlanFailure};
pub use navigator::{NavStats, Navigator, SteerTarget};
pub use orchestrator::{PlanRequest, Skip};
pub use types::{
    AgentId, CellPos, DoorKind, HorizontalDir, NavGoal, PlanReason, Point3, PursuitMode, TargetId,
};
pub use world::{AgentBody, NavHost, WorldQuery};

// End-to-end scenarios: the full owning-thread / worker pipeline against a
// `GridWorld`, driven by `Harness`.

use wayfinder_grid::scenario::{self, AGENT};
use wayfinder_grid::{Block, Harness};
use wayfinder_nav::{AgentBody, CellPos, DoorKind, NavConfig, PlanReason, Skip};

fn harness(scenario: &scenario::Scenario) -> Harness {
    Harness::new(scenario.world.clone(), NavConfig::default()).unwrap()
}

#[test]
fn corridor_plan_ends_near_goal() {
    let scenario = scenario::corridor();
    let mut h = harness(&scenario);
    let goal = CellPos::new(3, 64, 0);
    h.request(AGENT, goal, false, PlanReason::NewGoal).unwrap();

    let waypoints = h.navigator().waypoints(AGENT);
    let last = *waypoints.last().unwrap();
    assert!(last.horizontal_distance(goal) <= 2.0, "last waypoint {last}");
    assert!(waypoints.len() <= NavConfig::default().planner.max_waypoints);
    assert!(waypoints.iter().all(|c| c.y == 64 && c.z == 0));
}

#[test]
fn corridor_walk_arrives_without_touching_the_world() {
    let scenario = scenario::corridor();
    let mut h = harness(&scenario);
    let report = h.walk_to(AGENT, scenario.goal, scenario.max_ticks);
    assert!(report.arrived, "{report:?}");
    assert_eq!(report.distress, 0);
    assert_eq!(h.world.mutation_count(), 0);
    assert_eq!(h.navigator().stats().recoveries_started, 0);
}

#[test]
fn second_request_within_cooldown_does_not_search() {
    let scenario = scenario::corridor();
    let mut h = harness(&scenario);
    h.request(AGENT, CellPos::new(5, 64, 0), false, PlanReason::NewGoal)
        .unwrap();
    h.clock().advance(400);
    let skip = h
        .request(AGENT, CellPos::new(6, 64, 0), false, PlanReason::TargetMoved)
        .unwrap_err();
    assert_eq!(skip, Skip::RateLimited);
    assert_eq!(h.navigator().stats().searches, 1);
}

#[test]
fn route_through_a_closed_soft_door() {
    let scenario = scenario::door();
    let door = CellPos::new(1, 64, 0);
    let mut h = harness(&scenario);
    h.request(AGENT, scenario.goal, false, PlanReason::NewGoal)
        .unwrap();
    assert!(h.navigator().waypoints(AGENT).contains(&door));

    let report = h.walk_to(AGENT, scenario.goal, scenario.max_ticks);
    assert!(report.arrived, "{report:?}");
    assert_eq!(
        h.world.get(door),
        Block::Door {
            kind: DoorKind::Soft,
            open: true
        }
    );
    assert_eq!(h.world.mutation_count(), 0);
}

#[test]
fn door_crossing_is_remembered() {
    let scenario = scenario::door();
    let mut h = harness(&scenario);
    let report = h.walk_to(AGENT, scenario.goal, scenario.max_ticks);
    assert!(report.arrived);
    assert_eq!(
        h.navigator().last_crossed_door(AGENT),
        Some(CellPos::new(1, 64, 0))
    );
}

#[test]
fn sealed_agent_raises_distress_and_leaves_the_world_alone() {
    let scenario = scenario::sealed();
    let mut h = harness(&scenario);
    let report = h.walk_to(AGENT, scenario.goal, scenario.max_ticks);

    assert!(!report.arrived);
    assert_eq!(report.distress, 1);
    assert_eq!(h.world.mutation_count(), 0);
    assert_eq!(h.world.inventory(AGENT), 4);
    let at = h.world.position(AGENT).unwrap();
    assert_eq!(at.cell(), CellPos::new(0, 64, 0));
    let stats = h.navigator().stats();
    assert!(stats.recoveries_started >= 3);
}

#[test]
fn pit_agent_pillars_out_and_arrives() {
    let scenario = scenario::pit();
    let mut h = harness(&scenario);
    let report = h.walk_to(AGENT, scenario.goal, scenario.max_ticks);

    assert!(report.arrived, "{report:?}");
    assert_eq!(
        h.world.placed,
        vec![CellPos::new(0, 64, 0), CellPos::new(0, 65, 0)]
    );
    assert!(h.world.broken.is_empty());
    assert_eq!(h.world.inventory(AGENT), 2);
}

#[test]
fn buried_agent_mines_but_never_touches_bedrock() {
    let scenario = scenario::buried();
    let mut h = harness(&scenario);
    h.walk_to(AGENT, scenario.goal, 200);

    assert!(!h.world.broken.is_empty());
    assert!(h.world.broken.iter().all(|c| c.y >= 64));
}

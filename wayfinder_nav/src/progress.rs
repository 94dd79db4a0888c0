// Per-tick progress model producing the stagnation counter.
//
// Progress is measured two ways: the distance to the goal improving by at
// least `min_progress_delta` on the best distance seen this episode, or the
// agent getting `escape_distance` away from its stagnation anchor. The
// second catches escapes that first lead away from the goal (around a wall,
// out through a door).
//
// Any progress zeroes the counter and wipes the recovery tier ledger so the
// ladder starts from the bottom next time. Only a true anchor escape clears
// the failed-direction memory and the anchor itself: jitter that happens to
// shave a little distance off must not make the nudge tier forget which
// directions already failed.
//
// A goal that moves more than `goal_reset_distance` starts a new episode.
//
// See also: `state.rs` for `StuckTrackState`, `recovery/mod.rs` which reads
// the counter to select a tier.

use crate::config::ProgressParams;
use crate::state::StuckTrackState;
use crate::types::Point3;

/// What one tick of tracking observed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickReport {
    pub stagnant_ticks: u32,
    pub distance: f64,
    pub progressed: bool,
    pub escaped_anchor: bool,
    /// The goal moved enough to start a new episode this tick.
    pub new_episode: bool,
}

/// Advance the progress model by one tick.
pub fn track_progress(
    state: &mut StuckTrackState,
    position: Point3,
    goal: Point3,
    params: &ProgressParams,
) -> TickReport {
    let new_episode = state
        .goal
        .is_none_or(|g| g.distance(goal) > params.goal_reset_distance);
    if new_episode {
        state.reset_episode();
        state.goal = Some(goal);
    }

    let distance = position.distance(goal);
    let improved = state
        .best_distance
        .is_none_or(|best| best - distance >= params.min_progress_delta);
    let escaped_anchor = state
        .anchor
        .is_some_and(|anchor| position.distance(anchor) >= params.escape_distance);

    let progressed = improved || escaped_anchor;
    if progressed {
        state.stagnant_ticks = 0;
        state.best_distance = Some(state.best_distance.map_or(distance, |b| b.min(distance)));
        state.tiers.clear();
        if escaped_anchor {
            state.anchor = None;
            state.failed_directions.clear();
        }
    } else {
        state.stagnant_ticks = state.stagnant_ticks.saturating_add(1);
        if state.stagnant_ticks >= params.anchor_after_ticks && state.anchor.is_none() {
            state.anchor = Some(position);
        }
    }

    TickReport {
        stagnant_ticks: state.stagnant_ticks,
        distance,
        progressed,
        escaped_anchor,
        new_episode,
    }
}

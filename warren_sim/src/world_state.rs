// Planning-time snapshot of one character's condition.
//
// A `WorldState` is what the planner reasons over: where the character
// stands, its needs, and a couple of flags that gate tasks. Each real
// character carries one that the scheduler keeps current; the planner
// copies it and predicts how each task in a chain would change it.
//
// See also: `planner.rs` which predicts successor states, `task.rs` whose
// `apply` writes task outcomes, `config.rs` for need drift.

use crate::config::NeedConfig;
use crate::types::WorldCoord;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub position: WorldCoord,
    pub hunger: f32,
    pub fatigue: f32,
    pub loneliness: f32,
    pub has_food: bool,
    pub in_conversation: bool,
}

impl WorldState {
    pub fn new(position: WorldCoord) -> Self {
        Self {
            position,
            hunger: 0.0,
            fatigue: 0.0,
            loneliness: 0.0,
            has_food: false,
            in_conversation: false,
        }
    }

    /// Grow every need by `ticks` worth of drift, capped at `max_need`.
    pub fn drift(&mut self, needs: &NeedConfig, ticks: f32) {
        let max = needs.max_need;
        self.hunger = (self.hunger + needs.hunger_per_tick * ticks).min(max);
        self.fatigue = (self.fatigue + needs.fatigue_per_tick * ticks).min(max);
        self.loneliness = (self.loneliness + needs.loneliness_per_tick * ticks).min(max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_is_capped() {
        let needs = NeedConfig::default();
        let mut state = WorldState::new(WorldCoord::new(0, 0, 0));
        state.drift(&needs, 100.0);
        assert!((state.hunger - needs.hunger_per_tick * 100.0).abs() < 1e-5);
        state.drift(&needs, 1e9);
        assert_eq!(state.hunger, needs.max_need);
        assert_eq!(state.loneliness, needs.max_need);
    }
}

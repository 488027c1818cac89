// Interactables: furniture and fixtures characters use.
//
// An interactable has a kind, a world position and the cells a character
// must stand on to use it (its interaction points). At most one character
// holds a claim on it at a time; claims are taken when a task starts
// executing and released when the task ends, fails over or is overridden.
//
// Placement registers the interaction points as points of interest with the
// navigation layer so rooms can keep distance tables for them.
//
// See also: `task.rs` (targets), `planner.rs` which resolves the nearest
// unclaimed instance, `sim.rs` for placement.

use crate::types::{CharacterId, InteractableId, InteractableKind, WorldCoord};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interactable {
    pub id: InteractableId,
    pub kind: InteractableKind,
    pub position: WorldCoord,
    pub interaction_points: Vec<WorldCoord>,
    pub claimed_by: Option<CharacterId>,
}

impl Interactable {
    /// Whether `who` may use this now.
    pub fn is_available_to(&self, who: CharacterId) -> bool {
        self.claimed_by.is_none_or(|c| c == who)
    }

    pub fn can_use_from(&self, at: WorldCoord) -> bool {
        self.interaction_points.contains(&at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_exclude_others() {
        let mut bed = Interactable {
            id: InteractableId(0),
            kind: InteractableKind::Bed,
            position: WorldCoord::new(2, 2, 0),
            interaction_points: vec![WorldCoord::new(1, 2, 0)],
            claimed_by: None,
        };
        assert!(bed.is_available_to(CharacterId(4)));
        bed.claimed_by = Some(CharacterId(3));
        assert!(bed.is_available_to(CharacterId(3)));
        assert!(!bed.is_available_to(CharacterId(4)));
        assert!(bed.can_use_from(WorldCoord::new(1, 2, 0)));
        assert!(!bed.can_use_from(WorldCoord::new(2, 2, 0)));
    }
}

// Goals: what a search is trying to reach.
//
// The `Goal` trait is the capability the router and the incremental
// pathfinder consume: a set of endpoint cells, an admissible heuristic, and
// a completion test. `PointGoal` is the degenerate single-cell goal used for
// plain travel; `RegionGoal` is any-of-several cells, typically the
// interaction points of a piece of furniture.
//
// See also: `router.rs`, `dlite.rs`.

use crate::map::MapGrid;
use crate::types::WorldCoord;
use serde::{Deserialize, Serialize};

/// Where a mover stands relative to its goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalStatus {
    Reached,
    /// The mover is in a room that holds none of the endpoints; in-room
    /// pathing cannot help.
    OutOfRoom,
    Pending,
}

pub trait Goal {
    fn endpoints(&self) -> &[WorldCoord];

    /// Straight-line distance to the nearest endpoint, scaled by the
    /// cheapest possible cost per tile.
    fn heuristic(&self, from: WorldCoord, min_inverse_speed: f32) -> f32 {
        self.endpoints()
            .iter()
            .map(|&e| from.euclidean_distance(e))
            .fold(f32::INFINITY, f32::min)
            * min_inverse_speed
    }

    fn status(&self, at: WorldCoord, map: &MapGrid) -> GoalStatus {
        if self.endpoints().contains(&at) {
            return GoalStatus::Reached;
        }
        let room = map.room_id_of(at);
        let shares_room = room.is_some()
            && self
                .endpoints()
                .iter()
                .any(|&e| map.room_id_of(e) == room);
        if shares_room {
            GoalStatus::Pending
        } else {
            GoalStatus::OutOfRoom
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointGoal {
    cell: [WorldCoord; 1],
}

impl PointGoal {
    pub fn new(at: WorldCoord) -> Self {
        Self { cell: [at] }
    }

    pub fn at(&self) -> WorldCoord {
        self.cell[0]
    }
}

impl Goal for PointGoal {
    fn endpoints(&self) -> &[WorldCoord] {
        &self.cell
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionGoal {
    cells: Vec<WorldCoord>,
}

impl RegionGoal {
    pub fn new(cells: impl IntoIterator<Item = WorldCoord>) -> Self {
        let mut cells: Vec<WorldCoord> = cells.into_iter().collect();
        cells.sort();
        cells.dedup();
        Self { cells }
    }
}

impl Goal for RegionGoal {
    fn endpoints(&self) -> &[WorldCoord] {
        &self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavConfig;
    use crate::map::tests::rect;

    #[test]
    fn status_distinguishes_rooms() {
        let mut map = MapGrid::new(&NavConfig::default());
        map.add_cells(rect(0, 0, 0, 3, 3), true).unwrap();
        map.add_cells(rect(3, 0, 0, 3, 3), true).unwrap();
        let goal = RegionGoal::new([WorldCoord::new(1, 1, 0), WorldCoord::new(2, 2, 0)]);
        assert_eq!(goal.status(WorldCoord::new(2, 2, 0), &map), GoalStatus::Reached);
        assert_eq!(goal.status(WorldCoord::new(0, 0, 0), &map), GoalStatus::Pending);
        assert_eq!(goal.status(WorldCoord::new(4, 0, 0), &map), GoalStatus::OutOfRoom);
    }

    #[test]
    fn heuristic_takes_nearest_endpoint() {
        let goal = RegionGoal::new([WorldCoord::new(10, 0, 0), WorldCoord::new(3, 4, 0)]);
        let h = goal.heuristic(WorldCoord::new(0, 0, 0), 0.5);
        assert!((h - 2.5).abs() < 1e-6);
        assert_eq!(PointGoal::new(WorldCoord::new(1, 1, 0)).endpoints().len(), 1);
    }
}

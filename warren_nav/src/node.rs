// Per-cell navigation data.
//
// A `GridNode` is one floor cell. It stores the authored facts about the
// cell (its four sides, floor speed, furniture, occupant) plus three lazily
// derived values that depend on the surrounding cells:
//
// - `traversable`: the cell and every floor cell in its 3x3 neighborhood are
//   unobstructed. Characters occupy more than one cell, so a blocked corner
//   keeps the whole footprint out.
// - `speed`: the slowest base speed in the 3x3 neighborhood.
// - `edges`: the outgoing movement edges (cardinal, diagonal, knight).
//
// The derived values live in `OnceLock`s and are filled on first read by the
// owning `RoomGraph`, which has the neighborhood at hand. Any change to a
// cell resets derived values around it through `&mut` access (speed and
// traversable within one tile, edges within three), so a read can never see
// a stale value: it either finds a value computed after the last change or
// computes a fresh one.
//
// See also: `room.rs` for the derivation rules and edge costs,
// `types.rs` for `Direction` indexing of `sides`.

use crate::types::{ConnectorId, Direction, GridCoord, WorldCoord};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::OnceLock;

/// What lies across one side of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Another floor cell of the same room.
    Open,
    /// Nothing: the cell faces void.
    Boundary,
    /// A built wall. Unlike `Boundary`, it survives flooring the far side.
    Wall,
    /// A door set into this side.
    Connector(ConnectorId),
}

impl Side {
    pub fn is_open(self) -> bool {
        self == Side::Open
    }
}

/// Furniture or another static object on a cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Obstruction {
    /// Whether the cell becomes obstructed.
    pub blocks: bool,
    /// Multiplies the floor speed when the object does not block.
    pub speed_multiplier: f32,
}

/// The single entity standing on a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub id: u64,
    /// Whether the occupant keeps others out of the cell.
    pub blocks: bool,
}

/// The shape of a movement edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    Cardinal,
    Diagonal,
    /// Two-step diagonal: two tiles along one axis, one along the other.
    Knight,
}

/// An outgoing movement edge within one room.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    pub to: GridCoord,
    pub cost: f32,
    pub kind: EdgeKind,
}

/// Up to 4 cardinal + 4 diagonal + 4 knight edges.
pub type EdgeList = SmallVec<[Edge; 12]>;

#[derive(Clone, Debug)]
pub struct GridNode {
    pub world: WorldCoord,
    sides: [Side; 4],
    floor_speed: f32,
    furniture: Option<Obstruction>,
    occupant: Option<Occupant>,
    pub(crate) traversable: OnceLock<bool>,
    pub(crate) speed: OnceLock<f32>,
    pub(crate) edges: OnceLock<EdgeList>,
}

impl GridNode {
    pub fn new(world: WorldCoord) -> Self {
        Self {
            world,
            sides: [Side::Boundary; 4],
            floor_speed: 1.0,
            furniture: None,
            occupant: None,
            traversable: OnceLock::new(),
            speed: OnceLock::new(),
            edges: OnceLock::new(),
        }
    }

    pub fn side(&self, dir: Direction) -> Side {
        self.sides[dir.index()]
    }

    pub fn sides(&self) -> [Side; 4] {
        self.sides
    }

    pub fn floor_speed(&self) -> f32 {
        self.floor_speed
    }

    pub fn furniture(&self) -> Option<Obstruction> {
        self.furniture
    }

    pub fn occupant(&self) -> Option<Occupant> {
        self.occupant
    }

    /// Blocked by its own contents, independent of the neighborhood.
    pub fn is_obstructed(&self) -> bool {
        self.furniture.is_some_and(|f| f.blocks) || self.occupant.is_some_and(|o| o.blocks)
    }

    /// Speed of this cell alone: floor speed scaled by non-blocking furniture.
    pub fn base_speed(&self) -> f32 {
        match self.furniture {
            Some(f) if !f.blocks => self.floor_speed * f.speed_multiplier,
            _ => self.floor_speed,
        }
    }

    /// The connector set into one of this cell's sides, if any.
    pub fn door(&self) -> Option<(Direction, ConnectorId)> {
        Direction::ALL.into_iter().find_map(|dir| match self.side(dir) {
            Side::Connector(id) => Some((dir, id)),
            _ => None,
        })
    }

    // Setters touch only authored data. The caller (`RoomGraph`) resets the
    // derived caches of the whole affected neighborhood.

    pub(crate) fn set_side(&mut self, dir: Direction, side: Side) {
        self.sides[dir.index()] = side;
    }

    pub(crate) fn set_floor_speed(&mut self, speed: f32) {
        self.floor_speed = speed;
    }

    pub(crate) fn set_furniture(&mut self, furniture: Option<Obstruction>) {
        self.furniture = furniture;
    }

    pub(crate) fn set_occupant(&mut self, occupant: Option<Occupant>) {
        self.occupant = occupant;
    }

    pub(crate) fn reset_local(&mut self) {
        self.traversable = OnceLock::new();
        self.speed = OnceLock::new();
    }

    pub(crate) fn reset_edges(&mut self) {
        self.edges = OnceLock::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn furniture_and_occupants_obstruct_only_when_blocking() {
        let mut node = GridNode::new(WorldCoord::new(0, 0, 0));
        assert!(!node.is_obstructed());
        node.set_furniture(Some(Obstruction {
            blocks: false,
            speed_multiplier: 0.5,
        }));
        assert!(!node.is_obstructed());
        assert_eq!(node.base_speed(), 0.5);
        node.set_occupant(Some(Occupant { id: 7, blocks: true }));
        assert!(node.is_obstructed());
        node.set_occupant(Some(Occupant { id: 7, blocks: false }));
        assert!(!node.is_obstructed());
    }

    #[test]
    fn door_reports_connector_side() {
        let mut node = GridNode::new(WorldCoord::new(0, 0, 0));
        assert_eq!(node.door(), None);
        node.set_side(Direction::West, Side::Connector(ConnectorId(4)));
        assert_eq!(node.door(), Some((Direction::West, ConnectorId(4))));
    }
}

// Connectors: doors and stairs joining two floor cells.
//
// A `Connector` joins end `A` and end `B`, each a floor cell. Doors join
// cardinal neighbors on one level and are set into the shared side of both
// cells; stairs join cells on different levels and have no side. A locked
// connector cannot be crossed.
//
// Each connector keeps a hop cache: for a walk starting at one of its ends,
// the cheapest known path (and cost) to another connector endpoint in the
// same room. Entries are never trusted blindly. Each one is stamped with the
// room id and revision it was computed against; any later change to the
// room (a cleared obstacle can open a shorter walk) makes it a miss.
// `cached_hop` also re-walks the stored path against the live room and
// returns its current cost only if every step is still an edge. A miss drops
// the entry and the caller recomputes it from the room's distance table.
//
// See also: `room.rs` for connector distance tables, `router.rs` which reads
// and fills hop caches, `map.rs` which owns connectors and keeps endpoint
// cells' sides in sync.

use crate::lock;
use crate::room::RoomGraph;
use crate::types::{ConnectorId, Direction, End, GridCoord, RoomId, WorldCoord};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// How a connector's two ends relate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alignment {
    /// A door; end `B` lies in this direction from end `A`.
    Horizontal(Direction),
    /// A stair between levels.
    Vertical,
}

/// A cached walk from one end of this connector to another port.
#[derive(Clone, Debug, PartialEq)]
pub struct Hop {
    pub cost: f32,
    /// Room-local cells, starting at this connector's end.
    pub path: Vec<GridCoord>,
}

type HopKey = (End, ConnectorId, End);

#[derive(Clone, Debug)]
struct StampedHop {
    room: RoomId,
    revision: u64,
    hop: Hop,
}

#[derive(Debug)]
pub struct Connector {
    pub id: ConnectorId,
    ends: [WorldCoord; 2],
    pub alignment: Alignment,
    locked: bool,
    hops: Mutex<FxHashMap<HopKey, StampedHop>>,
}

impl Clone for Connector {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            ends: self.ends,
            alignment: self.alignment,
            locked: self.locked,
            hops: Mutex::new(lock(&self.hops).clone()),
        }
    }
}

impl Connector {
    pub fn new(id: ConnectorId, a: WorldCoord, b: WorldCoord, alignment: Alignment) -> Self {
        Self {
            id,
            ends: [a, b],
            alignment,
            locked: false,
            hops: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn end(&self, end: End) -> WorldCoord {
        match end {
            End::A => self.ends[0],
            End::B => self.ends[1],
        }
    }

    /// Which end sits on `at`, if either.
    pub fn end_at(&self, at: WorldCoord) -> Option<End> {
        if self.ends[0] == at {
            Some(End::A)
        } else if self.ends[1] == at {
            Some(End::B)
        } else {
            None
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn is_stair(&self) -> bool {
        self.alignment == Alignment::Vertical
    }

    /// The door side of end `end`'s cell, if this is a door.
    pub fn side_of(&self, end: End) -> Option<Direction> {
        match (self.alignment, end) {
            (Alignment::Horizontal(dir), End::A) => Some(dir),
            (Alignment::Horizontal(dir), End::B) => Some(dir.opposite()),
            (Alignment::Vertical, _) => None,
        }
    }

    /// The cached hop from `from` to `(to, to_end)`, re-verified against
    /// `room`. Returns the hop with its cost refreshed from the live room, or
    /// `None` (dropping the entry) if the room changed since the hop was
    /// stored or the path broke.
    pub fn cached_hop(&self, room: &RoomGraph, from: End, to: ConnectorId, to_end: End) -> Option<Hop> {
        let key = (from, to, to_end);
        let mut hops = lock(&self.hops);
        let stamped = hops.get(&key)?;
        let current = stamped.room == room.id() && stamped.revision == room.revision();
        let hop = &stamped.hop;
        let start = room.to_local(self.end(from));
        let target = room.port(to, to_end);
        let valid = current && start == hop.path.first().copied() && target == hop.path.last().copied();
        match room.verify_path(&hop.path) {
            Some(cost) if valid => Some(Hop {
                cost,
                path: hop.path.clone(),
            }),
            _ => {
                hops.remove(&key);
                None
            }
        }
    }

    /// Cache `hop`, computed against `room` as it is now.
    pub fn store_hop(&self, room: &RoomGraph, from: End, to: ConnectorId, to_end: End, hop: Hop) {
        let stamped = StampedHop {
            room: room.id(),
            revision: room.revision(),
            hop,
        };
        lock(&self.hops).insert((from, to, to_end), stamped);
    }

    pub fn cached_hop_count(&self) -> usize {
        lock(&self.hops).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::tests::open_room;

    #[test]
    fn door_sides_face_each_other() {
        let c = Connector::new(
            ConnectorId(0),
            WorldCoord::new(0, 0, 0),
            WorldCoord::new(1, 0, 0),
            Alignment::Horizontal(Direction::East),
        );
        assert_eq!(c.side_of(End::A), Some(Direction::East));
        assert_eq!(c.side_of(End::B), Some(Direction::West));
        assert_eq!(c.end_at(WorldCoord::new(1, 0, 0)), Some(End::B));
        assert!(!c.is_stair());
    }

    #[test]
    fn cached_hop_is_dropped_when_path_breaks() {
        let mut room = open_room(6, 3);
        room.set_connector_end(ConnectorId(0), End::A, GridCoord::new(0, 1));
        room.set_connector_end(ConnectorId(1), End::A, GridCoord::new(5, 1));
        let c = Connector::new(
            ConnectorId(0),
            WorldCoord::new(0, 1, 0),
            WorldCoord::new(-1, 1, 0),
            Alignment::Horizontal(Direction::West),
        );
        let path: Vec<GridCoord> = (0..6).map(|x| GridCoord::new(x, 1)).collect();
        c.store_hop(&room, End::A, ConnectorId(1), End::A, Hop { cost: 5.0, path });

        let hop = c.cached_hop(&room, End::A, ConnectorId(1), End::A).unwrap();
        assert!((hop.cost - 5.0).abs() < 1e-5);

        room.node_mut(GridCoord::new(3, 1))
            .unwrap()
            .set_furniture(Some(crate::node::Obstruction {
                blocks: true,
                speed_multiplier: 1.0,
            }));
        room.note_change(GridCoord::new(3, 1));
        assert!(c.cached_hop(&room, End::A, ConnectorId(1), End::A).is_none());
        assert_eq!(c.cached_hop_count(), 0);
    }

    #[test]
    fn cached_hop_is_dropped_after_any_room_change() {
        let mut room = open_room(4, 1);
        room.set_connector_end(ConnectorId(0), End::B, GridCoord::new(0, 0));
        room.set_connector_end(ConnectorId(1), End::A, GridCoord::new(3, 0));
        let c = Connector::new(
            ConnectorId(0),
            WorldCoord::new(0, 5, 0),
            WorldCoord::new(0, 0, 0),
            Alignment::Vertical,
        );
        let path: Vec<GridCoord> = (0..4).map(|x| GridCoord::new(x, 0)).collect();
        c.store_hop(&room, End::B, ConnectorId(1), End::A, Hop { cost: 3.0, path });
        assert!(c.cached_hop(&room, End::B, ConnectorId(1), End::A).is_some());

        // The stored path is still walkable, but the room is not the one it
        // was computed against.
        room.node_mut(GridCoord::new(1, 0)).unwrap().set_floor_speed(0.5);
        room.note_change(GridCoord::new(1, 0));
        assert!(c.cached_hop(&room, End::B, ConnectorId(1), End::A).is_none());
        assert_eq!(c.cached_hop_count(), 0);
    }
}

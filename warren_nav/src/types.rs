// Core navigation types shared across the crate.
//
// Defines world-space and room-local coordinates (`WorldCoord`, `GridCoord`),
// the sequential index IDs for rooms, connectors and sectors, the cardinal
// `Direction` enum with its offset helpers, and the point-of-interest
// categories rooms keep distance tables for.
//
// Coordinate conventions:
// - X: east  (positive) / west  (negative)
// - Y: north (positive) / south (negative)
// - Z: floor level. Rooms never span levels; stairs join levels.
//
// See also: `node.rs` for the per-cell data, `room.rs` for how `GridCoord`
// indexes a room's flat cell array, `map.rs` for the world-to-room index.
//
// **Critical constraint: determinism.** IDs are sequential integers handed
// out in edit order, so two maps built by the same edit sequence have
// identical IDs and identical iteration order.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A cell position in the world grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl WorldCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Offset within the same floor level.
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z)
    }

    /// The cardinal neighbor in `dir` on the same level.
    pub const fn step(self, dir: Direction) -> Self {
        let (dx, dy) = dir.offset();
        self.offset(dx, dy)
    }

    /// Straight-line distance in tile units. Level changes count as one tile
    /// per level so stairs never make the heuristic overestimate.
    pub fn euclidean_distance(self, other: Self) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        let dz = (self.z - other.z) as f32;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for WorldCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A cell position local to one room's array. `(0, 0)` is the room origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
}

impl GridCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub const fn step(self, dir: Direction) -> Self {
        let (dx, dy) = dir.offset();
        self.offset(dx, dy)
    }

    /// Chebyshev (king-move) distance.
    pub fn chebyshev_distance(self, other: Self) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn euclidean_distance(self, other: Self) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

// ---------------------------------------------------------------------------
// Directions
// ---------------------------------------------------------------------------

/// The four cardinal directions. `repr(u8)` so a direction doubles as an
/// index into a node's `sides` array.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::East => (1, 0),
            Direction::South => (0, -1),
            Direction::West => (-1, 0),
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    pub const fn clockwise(self) -> Self {
        match self {
            Direction::North => Direction::East,
            Direction::East => Direction::South,
            Direction::South => Direction::West,
            Direction::West => Direction::North,
        }
    }

    /// The direction from `a` to `b` if they are cardinal neighbors on the
    /// same level.
    pub fn between(a: WorldCoord, b: WorldCoord) -> Option<Self> {
        if a.z != b.z {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|&dir| a.step(dir) == b)
    }
}

// ---------------------------------------------------------------------------
// IDs
// ---------------------------------------------------------------------------

macro_rules! index_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

index_id!(
    /// Identifies a `RoomGraph`. Merged and split rooms get fresh IDs.
    RoomId
);
index_id!(
    /// Identifies a `Connector` (door or stair).
    ConnectorId
);
index_id!(
    /// Identifies a connectivity component. Only meaningful for the epoch
    /// whose settle produced it.
    SectorId
);

/// Which of a connector's two endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum End {
    A,
    B,
}

impl End {
    pub const fn other(self) -> Self {
        match self {
            End::A => End::B,
            End::B => End::A,
        }
    }
}

/// Categories of interaction targets whose distance tables rooms cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PoiKind {
    Bed,
    FoodSource,
    Seat,
    Workbench,
}

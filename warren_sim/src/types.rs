// Core types for the simulation layer.
//
// Entity IDs for characters and interactables, the catalogue of task kinds,
// interactable kinds and body stances. Coordinates and navigation IDs come
// from `warren_nav` and are re-exported here so simulation code has one
// place to import from.
//
// See also: `task.rs` for what each `TaskKind` does, `interactable.rs`,
// `character.rs`.
//
// **Critical constraint: determinism.** IDs are sequential, handed out in
// command order, and every ID type is `Ord` so it can key a `BTreeMap`.

use serde::{Deserialize, Serialize};
use std::fmt;
use warren_nav::PoiKind;

pub use warren_nav::{ConnectorId, Direction, RoomId, WorldCoord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(pub u32);

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CharacterId({})", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InteractableId(pub u32);

impl fmt::Display for InteractableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InteractableId({})", self.0)
    }
}

/// Every task a character can plan. Declaration order is the catalogue
/// order, which is also the planner's tie-break order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskKind {
    Wait,
    FetchFood,
    Eat,
    Sleep,
    Sit,
    Chat,
    Farewell,
    Directive,
}

impl TaskKind {
    pub const ALL: [TaskKind; 8] = [
        TaskKind::Wait,
        TaskKind::FetchFood,
        TaskKind::Eat,
        TaskKind::Sleep,
        TaskKind::Sit,
        TaskKind::Chat,
        TaskKind::Farewell,
        TaskKind::Directive,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InteractableKind {
    Bed,
    FoodSource,
    Seat,
}

impl InteractableKind {
    /// The point-of-interest registry a placed interactable joins.
    pub fn poi_kind(self) -> PoiKind {
        match self {
            InteractableKind::Bed => PoiKind::Bed,
            InteractableKind::FoodSource => PoiKind::FoodSource,
            InteractableKind::Seat => PoiKind::Seat,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stance {
    #[default]
    Standing,
    Sitting,
    Lying,
}

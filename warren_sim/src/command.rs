// Commands that mutate simulation state.
//
// All external mutations go through `SimCommand`: the sim is a function
// `(state, commands) -> (new state, events)`. A command carries the tick
// it applies at and a `SimAction`:
//
// - character and furniture placement: `SpawnCharacter`,
//   `PlaceInteractable`;
// - map edits, each applied as its own batch through `NavWorld::edit`
//   (`AddRoom`, `AddFloor`, `RemoveFloor`, `AddWall`, `RemoveWall`,
//   `AddDoor`, `AddStairs`, `RemoveConnector`, `PlaceFurniture`,
//   `ClearFurniture`, `SetFloorSpeed`) or immediately (`SetDoorLocked`);
// - orders to characters: `DirectTask` overrides whatever the character is
//   doing with a trip to a destination; `SetQuest` sets or clears a
//   standing destination the character heads for whenever it is idle.
//
// A command that cannot be applied (unknown ID, edit the map rejects) is
// reported as a `CommandRejected` event and otherwise ignored.
//
// See also: `sim.rs` for `apply_command`, `event.rs`.
//
// **Critical constraint: determinism.** Commands are the sole external
// input to the sim; they are applied in slice order.

use crate::types::{CharacterId, ConnectorId, Direction, InteractableKind, WorldCoord};
use serde::{Deserialize, Serialize};
use warren_nav::node::Obstruction;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimCommand {
    pub tick: u64,
    pub action: SimAction,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimAction {
    SpawnCharacter {
        name: String,
        position: WorldCoord,
    },
    PlaceInteractable {
        kind: InteractableKind,
        position: WorldCoord,
        interaction_points: Vec<WorldCoord>,
    },
    AddRoom {
        origin: WorldCoord,
        width: i32,
        length: i32,
    },
    AddFloor {
        cells: Vec<WorldCoord>,
    },
    RemoveFloor {
        at: WorldCoord,
    },
    AddWall {
        at: WorldCoord,
        dir: Direction,
    },
    RemoveWall {
        at: WorldCoord,
        dir: Direction,
    },
    AddDoor {
        a: WorldCoord,
        b: WorldCoord,
    },
    AddStairs {
        a: WorldCoord,
        b: WorldCoord,
    },
    RemoveConnector {
        id: ConnectorId,
    },
    SetDoorLocked {
        id: ConnectorId,
        locked: bool,
    },
    PlaceFurniture {
        at: WorldCoord,
        furniture: Obstruction,
    },
    ClearFurniture {
        at: WorldCoord,
    },
    SetFloorSpeed {
        at: WorldCoord,
        speed: f32,
    },
    DirectTask {
        character: CharacterId,
        destination: WorldCoord,
    },
    SetQuest {
        character: CharacterId,
        destination: Option<WorldCoord>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_serialize_for_replay() {
        let commands = vec![
            SimCommand {
                tick: 3,
                action: SimAction::AddDoor {
                    a: WorldCoord::new(4, 1, 0),
                    b: WorldCoord::new(5, 1, 0),
                },
            },
            SimCommand {
                tick: 9,
                action: SimAction::SetQuest {
                    character: CharacterId(2),
                    destination: None,
                },
            },
        ];
        let json = serde_json::to_string(&commands).unwrap();
        let back: Vec<SimCommand> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, commands);
    }
}

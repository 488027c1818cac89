// Narrative events emitted by the simulation.
//
// `SimState::step` returns every `SimEvent` produced while advancing, in
// the order they happened. They are output only: nothing in the sim reads
// them back. A front end uses them to drive logs, speech bubbles and
// animation; tests use them to observe behavior without reaching into
// character internals.
//
// See also: `sim.rs` which emits map and command events, `character.rs`
// which emits task lifecycle events.
//
// **Critical constraint: determinism.** Events are pushed in processing
// order (commands first, then the settle, then characters in ID order), so
// two runs with the same inputs produce identical event lists.

use crate::types::{CharacterId, InteractableId, TaskKind, WorldCoord};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub kind: SimEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimEventKind {
    CharacterSpawned {
        character: CharacterId,
        at: WorldCoord,
    },
    InteractablePlaced {
        interactable: InteractableId,
        at: WorldCoord,
    },
    /// A travel action reached its goal.
    CharacterArrived {
        character: CharacterId,
        at: WorldCoord,
    },
    TaskStarted {
        character: CharacterId,
        task: TaskKind,
    },
    TaskCompleted {
        character: CharacterId,
        task: TaskKind,
    },
    /// An action failed; `attempt` counts failures of this task so far.
    TaskFailed {
        character: CharacterId,
        task: TaskKind,
        attempt: u32,
    },
    /// The task was abandoned for the wait task.
    FellBack {
        character: CharacterId,
        task: TaskKind,
    },
    MapSettled {
        epoch: u64,
        sectors: usize,
        bottlenecks: usize,
    },
    /// A command could not be applied. The sim state is unchanged.
    CommandRejected { reason: String },
}

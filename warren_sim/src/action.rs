// Primitive actions: the command surface tasks compile down to.
//
// A started task becomes an ordered queue of primitive actions that the
// character drains one at a time: travel to a goal region, take a stance,
// wait some ticks, or interact with a target. Each tick the front action
// reports `Pending`, `Done` (pop it and continue next tick) or `Failed`
// (hand control back to the task loop, which retries or falls back).
//
// See also: `task.rs` which builds action queues, `character.rs` which
// executes them, `travel.rs` for the travel action's movement state.

use crate::types::{CharacterId, InteractableId, Stance, WorldCoord};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    Pending,
    Done,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractWith {
    Interactable(InteractableId),
    Character(CharacterId),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PrimitiveAction {
    /// Walk until standing on any of the cells.
    TravelTo { goal: Vec<WorldCoord> },
    AssumeStance(Stance),
    /// Idle in place; the count runs down one per tick.
    WaitFor { ticks: u64 },
    /// Use the target. Fails if it is gone, claimed by someone else or out
    /// of reach.
    Interact { with: InteractWith },
}

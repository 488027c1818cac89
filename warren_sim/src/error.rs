// Errors for misuse of the simulation API.
//
// As in the navigation layer, data-dependent failures (no route, a target
// taken by someone else, a blocked path) are not errors: they surface as
// failed primitive actions and are recovered inside the character's task
// loop. `SimError` covers inputs that cannot be applied at all.

use crate::types::{CharacterId, InteractableId, WorldCoord};
use thiserror::Error;
use warren_nav::NavError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("unknown character {0}")]
    UnknownCharacter(CharacterId),
    #[error("unknown interactable {0}")]
    UnknownInteractable(InteractableId),
    #[error("{0} is not a floor cell")]
    NotFloor(WorldCoord),
    #[error(transparent)]
    Nav(#[from] NavError),
}

pub type Result<T> = std::result::Result<T, SimError>;

// Errors for misuse of the navigation API.
//
// Data-dependent outcomes (no route, stale cache, exhausted search budget)
// are never errors here: queries report them as `f32::INFINITY` or `None`.
// `NavError` covers only requests that cannot be applied to the map as it
// stands, such as flooring a cell twice or hanging a door between cells
// that are not neighbors.

use crate::types::{ConnectorId, Direction, WorldCoord};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NavError {
    #[error("no floor at {0}")]
    NoFloor(WorldCoord),
    #[error("cell {0} already has floor")]
    AlreadyFloored(WorldCoord),
    #[error("door endpoints {0} and {1} are not cardinal neighbors on one level")]
    NotAdjacent(WorldCoord, WorldCoord),
    #[error("stair endpoints {0} and {1} must be on different levels")]
    SameLevel(WorldCoord, WorldCoord),
    #[error("cell {0} already carries a connector")]
    EndpointTaken(WorldCoord),
    #[error("side {1:?} of {0} is not a wall between two floor cells")]
    NotAWall(WorldCoord, Direction),
    #[error("side {1:?} of {0} is not open")]
    SideNotOpen(WorldCoord, Direction),
    #[error("unknown connector {0}")]
    UnknownConnector(ConnectorId),
    #[error("speed multiplier {0} must be positive and finite")]
    InvalidSpeed(f32),
    #[error("room dimensions must be positive, got {0}x{1}")]
    EmptyRoom(i32, i32),
    #[error("failed to start route worker pool: {0}")]
    WorkerPool(String),
}

pub type Result<T> = std::result::Result<T, NavError>;

// warren_nav: navigation substrate for Warren.
//
// This crate owns the walkable world: floor cells grouped into rooms,
// doors and stairs between rooms, the distance tables and searches built on
// top of them, and the edit batches that keep all of it consistent while
// the map changes under the characters' feet. It knows nothing about
// characters or tasks; the `warren_sim` crate drives it.
//
// Module overview:
// - `types.rs`:     WorldCoord / GridCoord, Direction, id newtypes, PoiKind.
// - `config.rs`:    NavConfig: search budgets, cache sizes, tolerances, pool size.
// - `error.rs`:     NavError for misuse of the edit API.
// - `node.rs`:      GridNode: authored cell data plus lazily derived values.
// - `room.rs`:      RoomGraph: per-room edges, distance tables, change history.
// - `connector.rs`: Doors and stairs, with their cached room-crossing hops.
// - `map.rs`:       MapGrid: all rooms and connectors; merge/split restructuring.
// - `sector.rs`:    Sector partition and bottleneck (articulation) detection.
// - `goal.rs`:      Goal capability, PointGoal, RegionGoal.
// - `router.rs`:    CrossRoomRouter: distance and routes over the connector graph.
// - `route_job.rs`: Off-thread route materialization with pollable handles.
// - `dlite.rs`:     IncrementalPathfinder: D*-Lite within one room.
// - `world.rs`:     NavWorld: edit batches, phase hooks, settle, snapshots.
//
// **Critical constraint: determinism.** Every query and every edit is a
// pure function of the map and its edit history. Anything iterated is a
// `BTreeMap`, `BTreeSet` or `Vec`; hash maps are used only for lookups.
// Route jobs on the worker pool read immutable snapshots and never write
// back into the map.

pub mod config;
pub mod connector;
pub mod dlite;
pub mod error;
pub mod goal;
pub mod map;
pub mod node;
pub mod room;
pub mod route_job;
pub mod router;
pub mod sector;
pub mod types;
pub mod world;

pub use config::NavConfig;
pub use error::{NavError, Result};
pub use goal::{Goal, GoalStatus, PointGoal, RegionGoal};
pub use types::{ConnectorId, Direction, End, GridCoord, PoiKind, RoomId, SectorId, WorldCoord};
pub use world::{NavWorld, SettleReport};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a cache mutex. A poisoned cache is still a valid cache: every
/// writer leaves it holding either the old or the new table.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

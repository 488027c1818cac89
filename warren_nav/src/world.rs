// NavWorld: the edited map, its settled sectors and the edit phases.
//
// `NavWorld` is the navigation layer's entry point for everything that
// changes the map. Structural edits (floor, walls, doors, stairs, furniture,
// floor speed, points of interest) are made in batches through `edit`,
// which runs three phases in order:
//
// 1. `BeginEdit`: hooks see the map as it was.
// 2. `Reconcile`: the batch has been applied to a draft copy, rooms that
//    may have split are restructured, and the draft replaces the map.
// 3. `Settle`: sectors and bottlenecks are rebuilt from scratch and the
//    epoch is bumped.
//
// A batch whose closure returns an error is dropped whole: the draft is
// discarded and the map, sectors and epoch are untouched. Readers therefore
// only ever see a fully settled map.
//
// Occupancy and door locking are the two immediate edits. They update the
// map in place (copy-on-write through `Arc::make_mut`, so snapshots handed
// to route jobs keep their view) and mark a settle as pending; the
// scheduler calls `settle_pending` once per tick.
//
// Hooks are registered once with `add_hook` and fire on every batch in
// registration order.
//
// See also: `map.rs` for the operations themselves, `sector.rs`,
// `route_job.rs` for snapshots, the simulation's `SimState::step` which
// settles pending changes at the start of each tick.
//
// **Critical constraint: determinism.** Changed coordinates and room lists
// in reports are sorted; hooks run in registration order.

use crate::config::NavConfig;
use crate::error::{NavError, Result};
use crate::map::{MapGrid, Restructure};
use crate::node::{Obstruction, Occupant};
use crate::route_job::NavSnapshot;
use crate::router::CrossRoomRouter;
use crate::sector::SectorMap;
use crate::types::{ConnectorId, Direction, PoiKind, RoomId, WorldCoord};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditPhase {
    BeginEdit,
    Reconcile,
    Settle,
}

/// What a hook can see during a phase. `report` is filled in as the batch
/// progresses; during `BeginEdit` it is empty.
pub struct PhaseContext<'a> {
    pub map: &'a MapGrid,
    pub sectors: &'a SectorMap,
    pub report: &'a SettleReport,
}

pub trait EditPhaseHook: Send {
    fn on_phase(&mut self, phase: EditPhase, ctx: &PhaseContext<'_>);
}

/// Summary of one settled batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SettleReport {
    pub epoch: u64,
    pub changed: Vec<WorldCoord>,
    /// Rooms created or rebuilt by the batch.
    pub rebuilt_rooms: Vec<RoomId>,
    /// Rooms that no longer exist.
    pub retired_rooms: Vec<RoomId>,
    pub sector_count: usize,
    pub bottleneck_count: usize,
}

// ---------------------------------------------------------------------------
// MapEdit
// ---------------------------------------------------------------------------

/// One batch of structural edits, applied to a draft of the map.
pub struct MapEdit<'a> {
    map: &'a mut MapGrid,
    changed: BTreeSet<WorldCoord>,
    split_candidates: BTreeSet<RoomId>,
    rebuilt: BTreeSet<RoomId>,
    retired: BTreeSet<RoomId>,
}

impl<'a> MapEdit<'a> {
    fn new(map: &'a mut MapGrid) -> Self {
        Self {
            map,
            changed: BTreeSet::new(),
            split_candidates: BTreeSet::new(),
            rebuilt: BTreeSet::new(),
            retired: BTreeSet::new(),
        }
    }

    /// The draft as edited so far.
    pub fn map(&self) -> &MapGrid {
        self.map
    }

    fn absorb(&mut self, r: Restructure) {
        for id in r.retired {
            self.rebuilt.remove(&id);
            self.split_candidates.remove(&id);
            self.retired.insert(id);
        }
        self.rebuilt.extend(r.rooms);
    }

    /// Floor a walled `width` x `length` rectangle with its south-west
    /// corner at `origin`. The new room never merges with its neighbors.
    pub fn add_room(&mut self, origin: WorldCoord, width: i32, length: i32) -> Result<RoomId> {
        if width <= 0 || length <= 0 {
            return Err(NavError::EmptyRoom(width, length));
        }
        let cells: Vec<WorldCoord> = (0..length)
            .flat_map(|dy| (0..width).map(move |dx| origin.offset(dx, dy)))
            .collect();
        let r = self.map.add_cells(cells.iter().copied(), true)?;
        self.changed.extend(cells);
        let id = self.map.room_id_of(origin).ok_or(NavError::NoFloor(origin))?;
        self.absorb(r);
        Ok(id)
    }

    /// Floor loose cells. They open onto any neighboring floor that is not
    /// walled off, enveloping those rooms.
    pub fn add_floor(&mut self, cells: impl IntoIterator<Item = WorldCoord>) -> Result<()> {
        let cells: Vec<WorldCoord> = cells.into_iter().collect();
        let r = self.map.add_cells(cells.iter().copied(), false)?;
        self.changed.extend(cells);
        self.absorb(r);
        Ok(())
    }

    pub fn remove_floor(&mut self, at: WorldCoord) -> Result<()> {
        let room = self.map.remove_cell(at)?;
        self.changed.insert(at);
        self.split_candidates.insert(room);
        Ok(())
    }

    pub fn add_wall(&mut self, at: WorldCoord, dir: Direction) -> Result<()> {
        let room = self.map.add_wall(at, dir)?;
        self.changed.extend([at, at.step(dir)]);
        self.split_candidates.insert(room);
        Ok(())
    }

    pub fn remove_wall(&mut self, at: WorldCoord, dir: Direction) -> Result<()> {
        let r = self.map.remove_wall(at, dir)?;
        self.changed.extend([at, at.step(dir)]);
        self.absorb(r);
        Ok(())
    }

    /// Hang a door between two cardinal neighbors on one level.
    pub fn add_door(&mut self, a: WorldCoord, b: WorldCoord) -> Result<ConnectorId> {
        if a.z != b.z {
            return Err(NavError::NotAdjacent(a, b));
        }
        self.add_connector(a, b)
    }

    /// Join two cells on different levels.
    pub fn add_stairs(&mut self, a: WorldCoord, b: WorldCoord) -> Result<ConnectorId> {
        if a.z == b.z {
            return Err(NavError::SameLevel(a, b));
        }
        self.add_connector(a, b)
    }

    fn add_connector(&mut self, a: WorldCoord, b: WorldCoord) -> Result<ConnectorId> {
        let (id, split) = self.map.add_connector(a, b)?;
        self.changed.extend([a, b]);
        self.split_candidates.extend(split);
        Ok(id)
    }

    pub fn remove_connector(&mut self, id: ConnectorId) -> Result<()> {
        let ends = self.map.remove_connector(id)?;
        self.changed.extend(ends);
        Ok(())
    }

    pub fn place_furniture(&mut self, at: WorldCoord, furniture: Obstruction) -> Result<()> {
        self.map.set_furniture(at, Some(furniture))?;
        self.changed.insert(at);
        Ok(())
    }

    pub fn clear_furniture(&mut self, at: WorldCoord) -> Result<()> {
        self.map.set_furniture(at, None)?;
        self.changed.insert(at);
        Ok(())
    }

    pub fn set_floor_speed(&mut self, at: WorldCoord, speed: f32) -> Result<()> {
        self.map.set_floor_speed(at, speed)?;
        self.changed.insert(at);
        Ok(())
    }

    pub fn register_poi(&mut self, kind: PoiKind, at: WorldCoord) -> Result<()> {
        self.map.add_poi(kind, at)
    }

    pub fn unregister_poi(&mut self, kind: PoiKind, at: WorldCoord) {
        self.map.remove_poi(kind, at);
    }

    /// Restructure every room that may have split.
    fn reconcile(&mut self) {
        let candidates: BTreeSet<RoomId> = std::mem::take(&mut self.split_candidates)
            .into_iter()
            .filter(|id| self.map.room(*id).is_some())
            .collect();
        if !candidates.is_empty() {
            let r = self.map.restructure(&candidates, Vec::new());
            self.absorb(r);
        }
    }

    fn into_report(self) -> SettleReport {
        SettleReport {
            changed: self.changed.into_iter().collect(),
            rebuilt_rooms: self
                .rebuilt
                .into_iter()
                .filter(|id| self.map.room(*id).is_some())
                .collect(),
            retired_rooms: self.retired.into_iter().collect(),
            ..SettleReport::default()
        }
    }
}

// ---------------------------------------------------------------------------
// NavWorld
// ---------------------------------------------------------------------------

pub struct NavWorld {
    config: Arc<NavConfig>,
    map: Arc<MapGrid>,
    sectors: Arc<SectorMap>,
    epoch: u64,
    pending: BTreeSet<WorldCoord>,
    settle_pending: bool,
    hooks: Vec<Box<dyn EditPhaseHook>>,
}

fn run_hooks(hooks: &mut [Box<dyn EditPhaseHook>], phase: EditPhase, ctx: &PhaseContext<'_>) {
    for hook in hooks {
        hook.on_phase(phase, ctx);
    }
}

impl NavWorld {
    pub fn new(config: NavConfig) -> Self {
        let map = MapGrid::new(&config);
        Self {
            config: Arc::new(config),
            map: Arc::new(map),
            sectors: Arc::new(SectorMap::default()),
            epoch: 0,
            pending: BTreeSet::new(),
            settle_pending: false,
            hooks: Vec::new(),
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn map(&self) -> &MapGrid {
        &self.map
    }

    pub fn sectors(&self) -> &SectorMap {
        &self.sectors
    }

    /// Number of settles so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_settle_pending(&self) -> bool {
        self.settle_pending
    }

    pub fn add_hook(&mut self, hook: Box<dyn EditPhaseHook>) {
        self.hooks.push(hook);
    }

    pub fn router(&self) -> CrossRoomRouter<'_> {
        CrossRoomRouter::new(&self.map, &self.sectors, &self.config)
    }

    /// Cheap shared view of the current settled state.
    pub fn snapshot(&self) -> NavSnapshot {
        NavSnapshot {
            map: Arc::clone(&self.map),
            sectors: Arc::clone(&self.sectors),
            config: Arc::clone(&self.config),
            epoch: self.epoch,
        }
    }

    /// Apply a batch of structural edits and settle.
    pub fn edit<F>(&mut self, f: F) -> Result<SettleReport>
    where
        F: FnOnce(&mut MapEdit<'_>) -> Result<()>,
    {
        let mut report = SettleReport {
            epoch: self.epoch,
            ..SettleReport::default()
        };
        run_hooks(
            &mut self.hooks,
            EditPhase::BeginEdit,
            &PhaseContext {
                map: &self.map,
                sectors: &self.sectors,
                report: &report,
            },
        );

        let mut draft = (*self.map).clone();
        let mut edit = MapEdit::new(&mut draft);
        f(&mut edit)?;
        edit.reconcile();
        let edited = edit.into_report();
        report.changed = edited.changed;
        report.rebuilt_rooms = edited.rebuilt_rooms;
        report.retired_rooms = edited.retired_rooms;

        self.map = Arc::new(draft);
        run_hooks(
            &mut self.hooks,
            EditPhase::Reconcile,
            &PhaseContext {
                map: &self.map,
                sectors: &self.sectors,
                report: &report,
            },
        );

        report
            .changed
            .extend(std::mem::take(&mut self.pending));
        report.changed.sort();
        report.changed.dedup();
        Ok(self.settle(report))
    }

    /// Run the settle phase if immediate edits happened since the last one.
    pub fn settle_pending(&mut self) -> Option<SettleReport> {
        if !self.settle_pending {
            return None;
        }
        let report = SettleReport {
            changed: std::mem::take(&mut self.pending).into_iter().collect(),
            ..SettleReport::default()
        };
        Some(self.settle(report))
    }

    fn settle(&mut self, mut report: SettleReport) -> SettleReport {
        self.sectors = Arc::new(SectorMap::build(&self.map));
        self.epoch += 1;
        self.settle_pending = false;
        report.epoch = self.epoch;
        report.sector_count = self.sectors.sector_count();
        report.bottleneck_count = self.sectors.bottleneck_count();
        debug!(
            epoch = report.epoch,
            changed = report.changed.len(),
            rebuilt = report.rebuilt_rooms.len(),
            retired = report.retired_rooms.len(),
            sectors = report.sector_count,
            bottlenecks = report.bottleneck_count,
            "map settled"
        );
        run_hooks(
            &mut self.hooks,
            EditPhase::Settle,
            &PhaseContext {
                map: &self.map,
                sectors: &self.sectors,
                report: &report,
            },
        );
        report
    }

    // -----------------------------------------------------------------------
    // Immediate edits
    // -----------------------------------------------------------------------

    /// Enter or leave a cell. Derived values around the cell are reset at
    /// once; sectors catch up at the next settle.
    pub fn set_occupant(&mut self, at: WorldCoord, occupant: Option<Occupant>) -> Result<()> {
        Arc::make_mut(&mut self.map).set_occupant(at, occupant)?;
        self.pending.insert(at);
        self.settle_pending = true;
        Ok(())
    }

    pub fn set_connector_locked(&mut self, id: ConnectorId, locked: bool) -> Result<()> {
        let ends = Arc::make_mut(&mut self.map).set_locked(id, locked)?;
        self.pending.extend(ends);
        self.settle_pending = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Arc<Mutex<Vec<(EditPhase, u64, usize)>>>);

    impl EditPhaseHook for Recorder {
        fn on_phase(&mut self, phase: EditPhase, ctx: &PhaseContext<'_>) {
            self.0
                .lock()
                .unwrap()
                .push((phase, ctx.report.epoch, ctx.map.room_count()));
        }
    }

    fn world() -> NavWorld {
        NavWorld::new(NavConfig {
            route_worker_threads: 0,
            ..NavConfig::default()
        })
    }

    fn at(x: i32, y: i32) -> WorldCoord {
        WorldCoord::new(x, y, 0)
    }

    #[test]
    fn phases_fire_in_order_once_per_batch() {
        let mut world = world();
        let log = Arc::new(Mutex::new(Vec::new()));
        world.add_hook(Box::new(Recorder(Arc::clone(&log))));
        let report = world
            .edit(|e| {
                e.add_room(at(0, 0), 3, 3)?;
                e.add_room(at(3, 0), 3, 3)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(report.epoch, 1);
        assert_eq!(report.rebuilt_rooms.len(), 2);
        assert_eq!(report.changed.len(), 18);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (EditPhase::BeginEdit, 0, 0),
                (EditPhase::Reconcile, 0, 2),
                (EditPhase::Settle, 1, 2),
            ]
        );
    }

    #[test]
    fn failed_batch_leaves_map_untouched() {
        let mut world = world();
        world.edit(|e| e.add_room(at(0, 0), 3, 3).map(|_| ())).unwrap();
        let err = world
            .edit(|e| {
                e.add_room(at(10, 0), 2, 2)?;
                e.add_stairs(at(0, 0), at(1, 0))?;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err, NavError::SameLevel(at(0, 0), at(1, 0)));
        assert_eq!(world.epoch(), 1);
        assert_eq!(world.map().room_count(), 1);
        assert!(!world.map().is_floor(at(10, 0)));
    }

    #[test]
    fn wall_across_room_splits_it() {
        let mut world = world();
        let first = world.edit(|e| e.add_room(at(0, 0), 5, 3).map(|_| ())).unwrap();
        let original = first.rebuilt_rooms[0];
        let report = world
            .edit(|e| {
                for y in 0..3 {
                    e.add_wall(at(2, y), Direction::East)?;
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(report.retired_rooms, vec![original]);
        assert_eq!(report.rebuilt_rooms.len(), 2);
        assert_eq!(world.map().room_count(), 2);
        assert_eq!(report.sector_count, 2);
        assert!(!world.sectors().same_sector(at(0, 0), at(4, 0)));
    }

    #[test]
    fn door_and_wall_removal_reconnect() {
        let mut world = world();
        world
            .edit(|e| {
                e.add_room(at(0, 0), 3, 3)?;
                e.add_room(at(3, 0), 3, 3)?;
                Ok(())
            })
            .unwrap();
        assert!(!world.sectors().same_sector(at(0, 0), at(5, 0)));

        world
            .edit(|e| e.add_door(at(2, 1), at(3, 1)).map(|_| ()))
            .unwrap();
        assert!(world.sectors().same_sector(at(0, 0), at(5, 0)));
        assert_eq!(world.map().room_count(), 2);

        let report = world
            .edit(|e| e.remove_wall(at(2, 0), Direction::East))
            .unwrap();
        assert_eq!(report.retired_rooms.len(), 2);
        assert_eq!(world.map().room_count(), 1);
    }

    #[test]
    fn occupancy_is_immediate_and_settles_once() {
        let mut world = world();
        world.edit(|e| e.add_room(at(0, 0), 5, 5).map(|_| ())).unwrap();
        let before = world.snapshot();

        world
            .set_occupant(at(2, 2), Some(Occupant { id: 7, blocks: true }))
            .unwrap();
        assert!(!world.map().is_traversable(at(1, 1)));
        assert!(world.map().is_traversable(at(0, 0)));
        // The earlier snapshot keeps its view.
        assert!(before.map.is_traversable(at(1, 1)));
        assert!(world.is_settle_pending());

        let report = world.settle_pending().unwrap();
        assert_eq!(report.epoch, 2);
        assert_eq!(report.changed, vec![at(2, 2)]);
        assert_eq!(world.settle_pending(), None);
    }

    #[test]
    fn locking_a_door_separates_sectors_after_settle() {
        let mut world = world();
        let mut door = None;
        world
            .edit(|e| {
                e.add_room(at(0, 0), 3, 3)?;
                e.add_room(at(3, 0), 3, 3)?;
                door = Some(e.add_door(at(2, 1), at(3, 1))?);
                Ok(())
            })
            .unwrap();
        let door = door.unwrap();
        world.set_connector_locked(door, true).unwrap();
        assert!(world.sectors().same_sector(at(0, 0), at(5, 0)));
        world.settle_pending();
        assert!(!world.sectors().same_sector(at(0, 0), at(5, 0)));
        assert_eq!(
            world.router().distance(at(0, 0), &crate::goal::PointGoal::new(at(5, 0))),
            f32::INFINITY
        );
    }
}

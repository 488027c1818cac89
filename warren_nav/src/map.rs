// The map: every room and connector in the world.
//
// `MapGrid` owns the rooms (`BTreeMap<RoomId, RoomGraph>`), the connectors,
// the registered points of interest and a world-coordinate index that finds
// the room holding any floor cell. It is the structure `NavWorld` edits and
// every query reads.
//
// Room structure is kept as "connected components of floor cells through
// open sides". All structural changes go through `restructure`, which pulls
// the nodes out of a set of rooms, adds any new nodes, recomputes the
// components and builds one room per component:
//
// - a component with exactly the cell set of one of the old rooms keeps
//   that room's id (its caches are rebuilt lazily);
// - any other component gets a fresh id. Merged rooms ("envelop") and the
//   pieces of a split room are therefore always new rooms.
//
// Merges run immediately (adding floor beside open floor, removing a wall
// between two rooms). Edits that can only split a room (removing floor,
// adding a wall or a door in an open side) return the room as a split
// candidate; `NavWorld` restructures candidates in its reconcile phase.
//
// Sides are kept symmetric: if a cell's side is `Open` the neighbor exists,
// lives in the same room and its opposite side is `Open` too; walls and
// doors are written to both cells.
//
// See also: `room.rs` for the per-room data, `connector.rs`, `world.rs` for
// the edit batches that drive these operations, `sector.rs` which reads the
// settled map.
//
// **Critical constraint: determinism.** Room and connector ids are handed
// out sequentially in edit order; components are discovered in coordinate
// order. The coordinate index is lookup only.

use crate::config::NavConfig;
use crate::connector::{Alignment, Connector};
use crate::error::{NavError, Result};
use crate::node::{GridNode, Obstruction, Occupant, Side};
use crate::room::{RoomGraph, RoomParams};
use crate::types::{ConnectorId, Direction, End, GridCoord, PoiKind, RoomId, WorldCoord};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Clone, Debug)]
pub struct MapGrid {
    params: RoomParams,
    rooms: BTreeMap<RoomId, RoomGraph>,
    connectors: BTreeMap<ConnectorId, Connector>,
    pois: BTreeMap<PoiKind, BTreeSet<WorldCoord>>,
    index: FxHashMap<WorldCoord, RoomId>,
    next_room: u32,
    next_connector: u32,
}

/// Result of a restructure: rooms that disappeared and rooms now holding
/// the affected cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Restructure {
    pub retired: Vec<RoomId>,
    pub rooms: Vec<RoomId>,
}

impl MapGrid {
    pub fn new(config: &NavConfig) -> Self {
        Self {
            params: RoomParams::from_config(config),
            rooms: BTreeMap::new(),
            connectors: BTreeMap::new(),
            pois: BTreeMap::new(),
            index: FxHashMap::default(),
            next_room: 0,
            next_connector: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn room(&self, id: RoomId) -> Option<&RoomGraph> {
        self.rooms.get(&id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &RoomGraph> {
        self.rooms.values()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_id_of(&self, at: WorldCoord) -> Option<RoomId> {
        self.index.get(&at).copied()
    }

    /// The room holding `at` and the cell's room-local coordinate.
    pub fn locate(&self, at: WorldCoord) -> Option<(&RoomGraph, GridCoord)> {
        let room = self.rooms.get(&self.room_id_of(at)?)?;
        Some((room, room.to_local(at)?))
    }

    fn locate_mut(&mut self, at: WorldCoord) -> Option<(&mut RoomGraph, GridCoord)> {
        let id = self.room_id_of(at)?;
        let room = self.rooms.get_mut(&id)?;
        let local = room.to_local(at)?;
        Some((room, local))
    }

    pub fn node(&self, at: WorldCoord) -> Option<&GridNode> {
        let (room, local) = self.locate(at)?;
        room.node(local)
    }

    pub fn is_floor(&self, at: WorldCoord) -> bool {
        self.index.contains_key(&at)
    }

    pub fn is_traversable(&self, at: WorldCoord) -> bool {
        self.locate(at)
            .is_some_and(|(room, local)| room.is_traversable(local))
    }

    pub fn inverse_speed(&self, at: WorldCoord) -> f32 {
        self.locate(at)
            .map_or(f32::INFINITY, |(room, local)| room.inverse_speed(local))
    }

    pub fn connector(&self, id: ConnectorId) -> Option<&Connector> {
        self.connectors.get(&id)
    }

    pub fn connectors(&self) -> impl Iterator<Item = &Connector> {
        self.connectors.values()
    }

    /// The connector with an end on `at`, if any.
    pub fn connector_at(&self, at: WorldCoord) -> Option<(ConnectorId, End)> {
        self.connectors
            .values()
            .find_map(|c| c.end_at(at).map(|end| (c.id, end)))
    }

    pub fn pois(&self, kind: PoiKind) -> impl Iterator<Item = WorldCoord> + '_ {
        self.pois.get(&kind).into_iter().flatten().copied()
    }

    /// Cost of stepping across a connector from `end` to the other end, or
    /// `None` if it is locked or either end is not traversable.
    pub fn crossing_cost(&self, id: ConnectorId, stair_multiplier: f32) -> Option<f32> {
        let c = self.connectors.get(&id)?;
        if c.is_locked() {
            return None;
        }
        let (a, b) = (c.end(End::A), c.end(End::B));
        if !self.is_traversable(a) || !self.is_traversable(b) {
            return None;
        }
        let base = (self.inverse_speed(a) + self.inverse_speed(b)) / 2.0;
        Some(if c.is_stair() { base * stair_multiplier } else { base })
    }

    // -----------------------------------------------------------------------
    // Cell edits (authored data only; structure unchanged)
    // -----------------------------------------------------------------------

    fn edit_node(&mut self, at: WorldCoord, f: impl FnOnce(&mut GridNode)) -> Result<()> {
        let (room, local) = self.locate_mut(at).ok_or(NavError::NoFloor(at))?;
        let node = room.node_mut(local).ok_or(NavError::NoFloor(at))?;
        f(node);
        room.note_change(local);
        Ok(())
    }

    pub(crate) fn set_floor_speed(&mut self, at: WorldCoord, speed: f32) -> Result<()> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(NavError::InvalidSpeed(speed));
        }
        self.edit_node(at, |n| n.set_floor_speed(speed))
    }

    pub(crate) fn set_furniture(&mut self, at: WorldCoord, furniture: Option<Obstruction>) -> Result<()> {
        if let Some(f) = furniture
            && !(f.speed_multiplier.is_finite() && f.speed_multiplier > 0.0)
        {
            return Err(NavError::InvalidSpeed(f.speed_multiplier));
        }
        self.edit_node(at, |n| n.set_furniture(furniture))
    }

    pub(crate) fn set_occupant(&mut self, at: WorldCoord, occupant: Option<Occupant>) -> Result<()> {
        self.edit_node(at, |n| n.set_occupant(occupant))
    }

    /// Callers only pass floored cells.
    fn set_side(&mut self, at: WorldCoord, dir: Direction, side: Side) {
        let edited = self.edit_node(at, |n| n.set_side(dir, side));
        debug_assert!(edited.is_ok(), "side {dir:?} of {at} set on a cell with no floor");
    }

    pub(crate) fn set_locked(&mut self, id: ConnectorId, locked: bool) -> Result<[WorldCoord; 2]> {
        let c = self
            .connectors
            .get_mut(&id)
            .ok_or(NavError::UnknownConnector(id))?;
        c.set_locked(locked);
        Ok([c.end(End::A), c.end(End::B)])
    }

    pub(crate) fn add_poi(&mut self, kind: PoiKind, at: WorldCoord) -> Result<()> {
        let (room, local) = self.locate_mut(at).ok_or(NavError::NoFloor(at))?;
        room.add_poi(kind, local);
        self.pois.entry(kind).or_default().insert(at);
        Ok(())
    }

    pub(crate) fn remove_poi(&mut self, kind: PoiKind, at: WorldCoord) {
        if let Some((room, local)) = self.locate_mut(at) {
            room.remove_poi(kind, local);
        }
        if let Some(set) = self.pois.get_mut(&kind) {
            set.remove(&at);
        }
    }

    // -----------------------------------------------------------------------
    // Structural edits
    // -----------------------------------------------------------------------

    /// Floor new cells. With `walled`, every side facing outside the new set
    /// becomes a wall; otherwise the cells open onto neighboring floor
    /// (merging with those rooms) and face void with plain boundaries.
    pub(crate) fn add_cells(
        &mut self,
        cells: impl IntoIterator<Item = WorldCoord>,
        walled: bool,
    ) -> Result<Restructure> {
        let cells: BTreeSet<WorldCoord> = cells.into_iter().collect();
        if let Some(&taken) = cells.iter().find(|c| self.is_floor(**c)) {
            return Err(NavError::AlreadyFloored(taken));
        }

        let mut touched = BTreeSet::new();
        let mut nodes = Vec::with_capacity(cells.len());
        for &at in &cells {
            let mut node = GridNode::new(at);
            for dir in Direction::ALL {
                let beyond = at.step(dir);
                let side = if cells.contains(&beyond) {
                    Side::Open
                } else if let Some(existing) = self.node(beyond) {
                    match existing.side(dir.opposite()) {
                        Side::Wall => Side::Wall,
                        _ if walled => Side::Wall,
                        _ => Side::Open,
                    }
                } else if walled {
                    Side::Wall
                } else {
                    Side::Boundary
                };
                if self.is_floor(beyond) {
                    self.set_side(beyond, dir.opposite(), side);
                    if side == Side::Open
                        && let Some(id) = self.room_id_of(beyond)
                    {
                        touched.insert(id);
                    }
                }
                node.set_side(dir, side);
            }
            nodes.push(node);
        }
        Ok(self.restructure(&touched, nodes))
    }

    /// Remove floor. Connectors ending on the cell and points of interest on
    /// it go too. Returns the room the cell belonged to, now a split
    /// candidate.
    pub(crate) fn remove_cell(&mut self, at: WorldCoord) -> Result<RoomId> {
        let id = self.room_id_of(at).ok_or(NavError::NoFloor(at))?;
        let doomed: Vec<ConnectorId> = self
            .connectors
            .values()
            .filter(|c| c.end_at(at).is_some())
            .map(|c| c.id)
            .collect();
        for cid in doomed {
            self.remove_connector(cid)?;
        }
        for set in self.pois.values_mut() {
            set.remove(&at);
        }
        for dir in Direction::ALL {
            let beyond = at.step(dir);
            if let Some(node) = self.node(beyond)
                && node.side(dir.opposite()) == Side::Open
            {
                self.set_side(beyond, dir.opposite(), Side::Boundary);
            }
        }
        if let Some((room, local)) = self.locate_mut(at) {
            room.take_node(local);
        }
        self.index.remove(&at);
        Ok(id)
    }

    /// Build a wall between `at` and its neighbor in `dir`. Returns the room
    /// as a split candidate.
    pub(crate) fn add_wall(&mut self, at: WorldCoord, dir: Direction) -> Result<RoomId> {
        let beyond = at.step(dir);
        let node = self.node(at).ok_or(NavError::NoFloor(at))?;
        if !self.is_floor(beyond) || node.side(dir) != Side::Open {
            return Err(NavError::SideNotOpen(at, dir));
        }
        self.set_side(at, dir, Side::Wall);
        self.set_side(beyond, dir.opposite(), Side::Wall);
        self.room_id_of(at).ok_or(NavError::NoFloor(at))
    }

    /// Tear down the wall between `at` and its neighbor in `dir`. Two rooms
    /// joined this way are enveloped into one immediately.
    pub(crate) fn remove_wall(&mut self, at: WorldCoord, dir: Direction) -> Result<Restructure> {
        let beyond = at.step(dir);
        let node = self.node(at).ok_or(NavError::NoFloor(at))?;
        if !self.is_floor(beyond) || node.side(dir) != Side::Wall {
            return Err(NavError::NotAWall(at, dir));
        }
        self.set_side(at, dir, Side::Open);
        self.set_side(beyond, dir.opposite(), Side::Open);
        let (a, b) = (self.room_id_of(at), self.room_id_of(beyond));
        match (a, b) {
            (Some(a), Some(b)) if a != b => Ok(self.restructure(&BTreeSet::from([a, b]), Vec::new())),
            (Some(a), _) => Ok(Restructure {
                retired: Vec::new(),
                rooms: vec![a],
            }),
            _ => Err(NavError::NoFloor(at)),
        }
    }

    /// Hang a door between two cardinal neighbors, or a stair between two
    /// levels. Returns the new connector and, for a door set into an open
    /// side, the room to check for a split.
    pub(crate) fn add_connector(
        &mut self,
        a: WorldCoord,
        b: WorldCoord,
    ) -> Result<(ConnectorId, Option<RoomId>)> {
        for at in [a, b] {
            if !self.is_floor(at) {
                return Err(NavError::NoFloor(at));
            }
            if self.connector_at(at).is_some() {
                return Err(NavError::EndpointTaken(at));
            }
        }
        let alignment = if a.z != b.z {
            Alignment::Vertical
        } else {
            Alignment::Horizontal(Direction::between(a, b).ok_or(NavError::NotAdjacent(a, b))?)
        };

        let id = ConnectorId(self.next_connector);
        self.next_connector += 1;

        let mut split_candidate = None;
        if let Alignment::Horizontal(dir) = alignment {
            let was_open = self.node(a).is_some_and(|n| n.side(dir).is_open());
            if was_open {
                split_candidate = self.room_id_of(a);
            }
            self.set_side(a, dir, Side::Connector(id));
            self.set_side(b, dir.opposite(), Side::Connector(id));
        }
        self.connectors.insert(id, Connector::new(id, a, b, alignment));
        for (end, at) in [(End::A, a), (End::B, b)] {
            if let Some((room, local)) = self.locate_mut(at) {
                room.set_connector_end(id, end, local);
            }
        }
        Ok((id, split_candidate))
    }

    /// Remove a connector. A door's side reverts to a wall.
    pub(crate) fn remove_connector(&mut self, id: ConnectorId) -> Result<[WorldCoord; 2]> {
        let c = self
            .connectors
            .remove(&id)
            .ok_or(NavError::UnknownConnector(id))?;
        for end in [End::A, End::B] {
            let at = c.end(end);
            if let Some(dir) = c.side_of(end) {
                self.set_side(at, dir, Side::Wall);
            }
            if let Some((room, _)) = self.locate_mut(at) {
                room.remove_connector_end(id, end);
            }
        }
        Ok([c.end(End::A), c.end(End::B)])
    }

    /// Rebuild the given rooms (plus `extra` new nodes) as one room per
    /// connected component.
    pub(crate) fn restructure(&mut self, old: &BTreeSet<RoomId>, extra: Vec<GridNode>) -> Restructure {
        let mut previous: Vec<(RoomId, u64, BTreeSet<WorldCoord>)> = Vec::new();
        let mut nodes: BTreeMap<WorldCoord, GridNode> = BTreeMap::new();
        for id in old {
            let Some(room) = self.rooms.remove(id) else {
                continue;
            };
            let revision = room.revision();
            let cells: BTreeSet<WorldCoord> = room.nodes().map(|n| n.world).collect();
            previous.push((*id, revision, cells));
            for node in room.into_nodes() {
                self.index.remove(&node.world);
                nodes.insert(node.world, node);
            }
        }
        for node in extra {
            nodes.insert(node.world, node);
        }

        let components = components(&nodes);
        let mut result = Restructure::default();
        for component in components {
            let reused = previous.iter().find(|(_, _, cells)| *cells == component);
            let (id, revision) = match reused {
                Some(&(id, revision, _)) => (id, Some(revision)),
                None => {
                    let id = RoomId(self.next_room);
                    self.next_room += 1;
                    (id, None)
                }
            };
            let mut members = Vec::with_capacity(component.len());
            for at in &component {
                if let Some(mut node) = nodes.remove(at) {
                    node.reset_local();
                    node.reset_edges();
                    members.push(node);
                }
            }
            let Some(mut room) = RoomGraph::from_nodes(id, members, self.params) else {
                continue;
            };
            if let Some(revision) = revision {
                room.succeed(revision);
            }
            for c in self.connectors.values() {
                for end in [End::A, End::B] {
                    if let Some(local) = room.to_local(c.end(end)) {
                        room.set_connector_end(c.id, end, local);
                    }
                }
            }
            for (&kind, cells) in &self.pois {
                for &at in cells {
                    if let Some(local) = room.to_local(at) {
                        room.add_poi(kind, local);
                    }
                }
            }
            for at in &component {
                self.index.insert(*at, id);
            }
            self.rooms.insert(id, room);
            result.rooms.push(id);
        }
        result.retired = previous
            .into_iter()
            .map(|(id, _, _)| id)
            .filter(|id| !result.rooms.contains(id))
            .collect();
        result
    }
}

/// Components of floor cells connected through open sides, in coordinate
/// order.
fn components(nodes: &BTreeMap<WorldCoord, GridNode>) -> Vec<BTreeSet<WorldCoord>> {
    let mut seen: BTreeSet<WorldCoord> = BTreeSet::new();
    let mut out = Vec::new();
    for &seed in nodes.keys() {
        if seen.contains(&seed) {
            continue;
        }
        let mut component = BTreeSet::new();
        let mut queue = VecDeque::from([seed]);
        seen.insert(seed);
        while let Some(at) = queue.pop_front() {
            component.insert(at);
            let Some(node) = nodes.get(&at) else { continue };
            for dir in Direction::ALL {
                let beyond = at.step(dir);
                if node.side(dir).is_open() && nodes.contains_key(&beyond) && seen.insert(beyond) {
                    queue.push_back(beyond);
                }
            }
        }
        out.push(component);
    }
    out
}

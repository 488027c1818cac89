// Rooms: contiguous floor patches with cached distance tables.
//
// A `RoomGraph` owns a rectangular array of optional `GridNode`s (holes are
// `None`), an origin that places cell (0, 0) in the world, the connector
// endpoints and points of interest that lie inside it, and two caches:
//
// - one distance table per connector endpoint, built on first query;
// - an LRU of point-of-interest tables (`RoomParams::poi_cache_capacity`).
//
// Distance tables come from `create_gscore_table`, a label-correcting sweep
// seeded at every traversable endpoint with score 0 and relaxed outward over
// each cell's edge set through a FIFO queue. Edge costs are in inverse-speed
// units, so a table value is the walking time to the nearest endpoint.
// Edges are symmetric (the same cells and the same cost in both
// directions), which lets the sweep relax along outgoing edges.
//
// Edge rules for a traversable cell `c` and each direction `d` with
// `cw = d.clockwise()`:
// - cardinal `c+d`: side open, target traversable;
//   cost = (inv(c) + inv(c+d)) / 2.
// - diagonal `c+d+cw`: both flanking cells traversable and all four sides
//   around the corner open; cost = sqrt(2)/2 * (inv(c) + inv(target)).
// - knight `c+2d+cw` via `c+d` and `c+d+cw`: every cell traversable and the
//   three crossed sides open; cost = sqrt(5)/4 * sum of the four inverses.
//
// Any cell edit goes through `note_change`, which resets the derived node
// values around the cell, drops every cached table and records the change
// in a short history that incremental pathfinders replay.
//
// See also: `node.rs` for the cell data, `map.rs` which builds, merges and
// splits rooms, `router.rs` which reads connector tables,
// `dlite.rs` which consumes `changes_since`.
//
// **Critical constraint: determinism.** Tables are pure functions of the
// room's cells. Cells are iterated in index order; the caches are lookup
// only and never iterated.

use crate::config::NavConfig;
use crate::lock;
use crate::node::{Edge, EdgeKind, EdgeList, GridNode};
use crate::types::{ConnectorId, Direction, End, GridCoord, PoiKind, RoomId, WorldCoord};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};
use std::sync::{Arc, Mutex};

const DIAGONAL_FACTOR: f32 = std::f32::consts::FRAC_1_SQRT_2;
// sqrt(5) / 4
const KNIGHT_FACTOR: f32 = 0.559_017;
const MIN_SPEED: f32 = 0.01;
const CHANGE_HISTORY: usize = 256;

/// Per-room settings copied from `NavConfig` when the room is built.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoomParams {
    pub max_speed: f32,
    pub poi_cache_capacity: usize,
}

impl RoomParams {
    pub fn from_config(config: &NavConfig) -> Self {
        Self {
            max_speed: config.max_speed_multiplier,
            poi_cache_capacity: config.poi_cache_capacity,
        }
    }
}

impl Default for RoomParams {
    fn default() -> Self {
        Self::from_config(&NavConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Distance tables
// ---------------------------------------------------------------------------

/// Walking time from every cell of a room to the nearest of a set of
/// endpoints. Unreachable cells (and holes) hold `f32::INFINITY`.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceTable {
    width: i32,
    length: i32,
    scores: Vec<f32>,
}

impl DistanceTable {
    pub fn get(&self, c: GridCoord) -> f32 {
        if c.x < 0 || c.y < 0 || c.x >= self.width || c.y >= self.length {
            return f32::INFINITY;
        }
        self.scores[(c.y * self.width + c.x) as usize]
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn length(&self) -> i32 {
        self.length
    }
}

/// A walkable cell sequence inside one room, endpoints inclusive.
#[derive(Clone, Debug, PartialEq)]
pub struct RoomPath {
    pub cells: Vec<GridCoord>,
    pub cost: f32,
}

// ---------------------------------------------------------------------------
// RoomGraph
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RoomGraph {
    id: RoomId,
    origin: WorldCoord,
    width: i32,
    length: i32,
    cells: Vec<Option<GridNode>>,
    params: RoomParams,
    connector_ends: BTreeMap<(ConnectorId, End), GridCoord>,
    pois: BTreeMap<PoiKind, BTreeSet<GridCoord>>,
    revision: u64,
    history: VecDeque<(u64, GridCoord)>,
    connector_tables: Mutex<FxHashMap<(ConnectorId, End), Arc<DistanceTable>>>,
    poi_tables: Mutex<VecDeque<(PoiKind, Arc<DistanceTable>)>>,
}

impl Clone for RoomGraph {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            origin: self.origin,
            width: self.width,
            length: self.length,
            cells: self.cells.clone(),
            params: self.params,
            connector_ends: self.connector_ends.clone(),
            pois: self.pois.clone(),
            revision: self.revision,
            history: self.history.clone(),
            connector_tables: Mutex::new(lock(&self.connector_tables).clone()),
            poi_tables: Mutex::new(lock(&self.poi_tables).clone()),
        }
    }
}

impl RoomGraph {
    /// Build a room from floor nodes on a single level. The array is the
    /// bounding box of the nodes. Returns `None` for an empty node set.
    pub fn from_nodes(id: RoomId, nodes: Vec<GridNode>, params: RoomParams) -> Option<Self> {
        let first = nodes.first()?.world;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for node in &nodes {
            min_x = min_x.min(node.world.x);
            min_y = min_y.min(node.world.y);
            max_x = max_x.max(node.world.x);
            max_y = max_y.max(node.world.y);
        }
        let width = max_x - min_x + 1;
        let length = max_y - min_y + 1;
        let mut cells = vec![None; (width * length) as usize];
        for node in nodes {
            let i = ((node.world.y - min_y) * width + (node.world.x - min_x)) as usize;
            cells[i] = Some(node);
        }
        Some(Self {
            id,
            origin: WorldCoord::new(min_x, min_y, first.z),
            width,
            length,
            cells,
            params,
            connector_ends: BTreeMap::new(),
            pois: BTreeMap::new(),
            revision: 0,
            history: VecDeque::new(),
            connector_tables: Mutex::new(FxHashMap::default()),
            poi_tables: Mutex::new(VecDeque::new()),
        })
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn origin(&self) -> WorldCoord {
        self.origin
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn length(&self) -> i32 {
        self.length
    }

    pub fn level(&self) -> i32 {
        self.origin.z
    }

    /// Bumped by every cell change; see `changes_since`.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn index(&self, c: GridCoord) -> Option<usize> {
        if c.x < 0 || c.y < 0 || c.x >= self.width || c.y >= self.length {
            None
        } else {
            Some((c.y * self.width + c.x) as usize)
        }
    }

    pub fn to_local(&self, world: WorldCoord) -> Option<GridCoord> {
        if world.z != self.origin.z {
            return None;
        }
        let local = GridCoord::new(world.x - self.origin.x, world.y - self.origin.y);
        self.node(local).map(|_| local)
    }

    pub fn to_world(&self, c: GridCoord) -> WorldCoord {
        WorldCoord::new(self.origin.x + c.x, self.origin.y + c.y, self.origin.z)
    }

    pub fn contains(&self, world: WorldCoord) -> bool {
        self.to_local(world).is_some()
    }

    pub fn node(&self, c: GridCoord) -> Option<&GridNode> {
        self.index(c).and_then(|i| self.cells[i].as_ref())
    }

    pub(crate) fn node_mut(&mut self, c: GridCoord) -> Option<&mut GridNode> {
        self.index(c).and_then(|i| self.cells[i].as_mut())
    }

    /// Floor cells in index order.
    pub fn coords(&self) -> impl Iterator<Item = GridCoord> + '_ {
        self.cells.iter().enumerate().filter_map(|(i, cell)| {
            cell.as_ref().map(|_| {
                let i = i as i32;
                GridCoord::new(i % self.width, i / self.width)
            })
        })
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GridNode> {
        self.cells.iter().flatten()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.iter().flatten().count()
    }

    /// Hand the nodes back for restructuring.
    pub(crate) fn into_nodes(self) -> Vec<GridNode> {
        self.cells.into_iter().flatten().collect()
    }

    // -----------------------------------------------------------------------
    // Derived per-cell values
    // -----------------------------------------------------------------------

    fn side_open(&self, c: GridCoord, dir: Direction) -> bool {
        self.node(c).is_some_and(|n| n.side(dir).is_open())
    }

    fn neighborhood(&self, c: GridCoord, radius: i32) -> impl Iterator<Item = GridCoord> + '_ {
        (-radius..=radius)
            .flat_map(move |dy| (-radius..=radius).map(move |dx| c.offset(dx, dy)))
            .filter(|&n| self.node(n).is_some())
    }

    pub fn is_traversable(&self, c: GridCoord) -> bool {
        let Some(node) = self.node(c) else {
            return false;
        };
        *node.traversable.get_or_init(|| {
            self.neighborhood(c, 1)
                .all(|n| self.node(n).is_some_and(|n| !n.is_obstructed()))
        })
    }

    /// Local speed multiplier: the slowest base speed in the 3x3
    /// neighborhood, clamped to `(MIN_SPEED, max_speed)`.
    pub fn speed(&self, c: GridCoord) -> f32 {
        let Some(node) = self.node(c) else {
            return MIN_SPEED;
        };
        *node.speed.get_or_init(|| {
            let slowest = self
                .neighborhood(c, 1)
                .filter_map(|n| self.node(n))
                .map(GridNode::base_speed)
                .fold(f32::INFINITY, f32::min);
            slowest.clamp(MIN_SPEED, self.params.max_speed)
        })
    }

    pub fn inverse_speed(&self, c: GridCoord) -> f32 {
        1.0 / self.speed(c)
    }

    pub fn edges(&self, c: GridCoord) -> &[Edge] {
        match self.node(c) {
            Some(node) => node.edges.get_or_init(|| self.compute_edges(c)).as_slice(),
            None => &[],
        }
    }

    fn compute_edges(&self, c: GridCoord) -> EdgeList {
        let mut edges = EdgeList::new();
        if !self.is_traversable(c) {
            return edges;
        }
        let inv_c = self.inverse_speed(c);
        for d in Direction::ALL {
            let cw = d.clockwise();

            let ahead = c.step(d);
            if !self.side_open(c, d) || !self.is_traversable(ahead) {
                continue;
            }
            let inv_ahead = self.inverse_speed(ahead);
            edges.push(Edge {
                to: ahead,
                cost: (inv_c + inv_ahead) / 2.0,
                kind: EdgeKind::Cardinal,
            });

            let corner = ahead.step(cw);
            let flank = c.step(cw);
            let corner_ok = self.side_open(c, cw)
                && self.side_open(ahead, cw)
                && self.side_open(flank, d)
                && self.is_traversable(flank)
                && self.is_traversable(corner);
            if corner_ok {
                edges.push(Edge {
                    to: corner,
                    cost: DIAGONAL_FACTOR * (inv_c + self.inverse_speed(corner)),
                    kind: EdgeKind::Diagonal,
                });
            }

            // The knight path only crosses ahead -> corner -> far, so it does
            // not need the flank.
            let far = corner.step(d);
            let knight_ok = self.side_open(ahead, cw)
                && self.is_traversable(corner)
                && self.side_open(corner, d)
                && self.is_traversable(far);
            if knight_ok {
                let sum = inv_c + inv_ahead + self.inverse_speed(corner) + self.inverse_speed(far);
                edges.push(Edge {
                    to: far,
                    cost: KNIGHT_FACTOR * sum,
                    kind: EdgeKind::Knight,
                });
            }
        }
        edges
    }

    /// Cost of the direct edge `from -> to`, if one exists.
    pub fn edge_cost(&self, from: GridCoord, to: GridCoord) -> Option<f32> {
        self.edges(from).iter().find(|e| e.to == to).map(|e| e.cost)
    }

    // -----------------------------------------------------------------------
    // Mutation bookkeeping
    // -----------------------------------------------------------------------

    /// Reset derived values around `c`, drop cached tables and record the
    /// change. Must follow every edit of a node's authored data.
    pub(crate) fn note_change(&mut self, c: GridCoord) {
        for dy in -3..=3 {
            for dx in -3..=3 {
                let n = c.offset(dx, dy);
                let local = dx.abs() <= 1 && dy.abs() <= 1;
                if let Some(node) = self.node_mut(n) {
                    if local {
                        node.reset_local();
                    }
                    node.reset_edges();
                }
            }
        }
        self.clear_tables();
        self.revision += 1;
        self.history.push_back((self.revision, c));
        if self.history.len() > CHANGE_HISTORY {
            self.history.pop_front();
        }
    }

    /// Remove a cell, leaving a hole.
    pub(crate) fn take_node(&mut self, c: GridCoord) -> Option<GridNode> {
        let i = self.index(c)?;
        let node = self.cells[i].take();
        if node.is_some() {
            self.note_change(c);
        }
        node
    }

    /// Continue the revision count of a room this one replaces. The history
    /// starts empty, so pathfinders that knew the old room start over.
    pub(crate) fn succeed(&mut self, revision: u64) {
        self.revision = revision + 1;
        self.history.clear();
    }

    pub(crate) fn clear_tables(&mut self) {
        self.connector_tables
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        self.poi_tables
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }

    /// Cells changed after `revision`, oldest first. `None` when the history
    /// no longer reaches back that far and the caller must start over.
    pub fn changes_since(&self, revision: u64) -> Option<Vec<GridCoord>> {
        if revision >= self.revision {
            return Some(Vec::new());
        }
        match self.history.front() {
            Some(&(oldest, _)) if oldest <= revision + 1 => Some(
                self.history
                    .iter()
                    .filter(|(r, _)| *r > revision)
                    .map(|&(_, c)| c)
                    .collect(),
            ),
            _ => None,
        }
    }

    pub(crate) fn set_connector_end(&mut self, id: ConnectorId, end: End, at: GridCoord) {
        self.connector_ends.insert((id, end), at);
        lock(&self.connector_tables).remove(&(id, end));
    }

    pub(crate) fn remove_connector_end(&mut self, id: ConnectorId, end: End) {
        self.connector_ends.remove(&(id, end));
        lock(&self.connector_tables).remove(&(id, end));
    }

    pub(crate) fn add_poi(&mut self, kind: PoiKind, at: GridCoord) {
        self.pois.entry(kind).or_default().insert(at);
        lock(&self.poi_tables).retain(|(k, _)| *k != kind);
    }

    pub(crate) fn remove_poi(&mut self, kind: PoiKind, at: GridCoord) {
        if let Some(set) = self.pois.get_mut(&kind) {
            set.remove(&at);
            if set.is_empty() {
                self.pois.remove(&kind);
            }
        }
        lock(&self.poi_tables).retain(|(k, _)| *k != kind);
    }

    /// Connector endpoints inside this room, in id order.
    pub fn ports(&self) -> impl Iterator<Item = ((ConnectorId, End), GridCoord)> + '_ {
        self.connector_ends.iter().map(|(&k, &c)| (k, c))
    }

    pub fn port(&self, id: ConnectorId, end: End) -> Option<GridCoord> {
        self.connector_ends.get(&(id, end)).copied()
    }

    pub fn pois(&self, kind: PoiKind) -> impl Iterator<Item = GridCoord> + '_ {
        self.pois.get(&kind).into_iter().flatten().copied()
    }

    // -----------------------------------------------------------------------
    // Distance tables
    // -----------------------------------------------------------------------

    /// Label-correcting sweep from every traversable endpoint. Endpoints
    /// that are not traversable are ignored; if none remain the table is all
    /// infinite.
    pub fn create_gscore_table(&self, endpoints: impl IntoIterator<Item = GridCoord>) -> DistanceTable {
        let mut scores = vec![f32::INFINITY; self.cells.len()];
        let mut queued = vec![false; self.cells.len()];
        let mut queue = VecDeque::new();

        for e in endpoints {
            let Some(i) = self.index(e) else { continue };
            if self.is_traversable(e) && !queued[i] {
                scores[i] = 0.0;
                queued[i] = true;
                queue.push_back(e);
            }
        }

        while let Some(c) = queue.pop_front() {
            let Some(ci) = self.index(c) else { continue };
            queued[ci] = false;
            let base = scores[ci];
            for edge in self.edges(c) {
                let Some(ni) = self.index(edge.to) else { continue };
                let candidate = base + edge.cost;
                if candidate < scores[ni] {
                    scores[ni] = candidate;
                    if !queued[ni] {
                        queued[ni] = true;
                        queue.push_back(edge.to);
                    }
                }
            }
        }

        DistanceTable {
            width: self.width,
            length: self.length,
            scores,
        }
    }

    /// Table of distances to one connector endpoint in this room, built on
    /// first use and cached until the room changes.
    pub fn connector_table(&self, id: ConnectorId, end: End) -> Option<Arc<DistanceTable>> {
        let at = self.port(id, end)?;
        if let Some(table) = lock(&self.connector_tables).get(&(id, end)) {
            return Some(Arc::clone(table));
        }
        let table = Arc::new(self.create_gscore_table([at]));
        let mut cache = lock(&self.connector_tables);
        Some(Arc::clone(cache.entry((id, end)).or_insert(table)))
    }

    pub fn connector_distance(&self, from: GridCoord, id: ConnectorId, end: End) -> f32 {
        self.connector_table(id, end)
            .map_or(f32::INFINITY, |table| table.get(from))
    }

    /// Table of distances to the nearest registered point of the given kind.
    /// Only the most recently used `poi_cache_capacity` tables are kept.
    pub fn poi_table(&self, kind: PoiKind) -> Option<Arc<DistanceTable>> {
        let endpoints: Vec<GridCoord> = self.pois(kind).collect();
        if endpoints.is_empty() {
            return None;
        }
        {
            let mut cache = lock(&self.poi_tables);
            if let Some(pos) = cache.iter().position(|(k, _)| *k == kind) {
                let entry = cache.remove(pos)?;
                let table = Arc::clone(&entry.1);
                cache.push_front(entry);
                return Some(table);
            }
        }
        let table = Arc::new(self.create_gscore_table(endpoints));
        let mut cache = lock(&self.poi_tables);
        cache.retain(|(k, _)| *k != kind);
        cache.push_front((kind, Arc::clone(&table)));
        cache.truncate(self.params.poi_cache_capacity.max(1));
        Some(table)
    }

    pub fn poi_distance(&self, kind: PoiKind, from: GridCoord) -> f32 {
        self.poi_table(kind)
            .map_or(f32::INFINITY, |table| table.get(from))
    }

    pub(crate) fn cached_poi_kinds(&self) -> Vec<PoiKind> {
        lock(&self.poi_tables).iter().map(|(k, _)| *k).collect()
    }

    /// Follow a table downhill from `from` to an endpoint. Each step takes
    /// the edge minimizing `cost + score(target)`.
    pub fn descend(&self, table: &DistanceTable, from: GridCoord) -> Option<RoomPath> {
        let cost = table.get(from);
        if !cost.is_finite() {
            return None;
        }
        let mut cells = vec![from];
        let mut current = from;
        for _ in 0..self.cells.len() {
            let here = table.get(current);
            if here == 0.0 {
                return Some(RoomPath { cells, cost });
            }
            let next = self
                .edges(current)
                .iter()
                .filter(|e| table.get(e.to) < here)
                .min_by(|a, b| {
                    (a.cost + table.get(a.to))
                        .total_cmp(&(b.cost + table.get(b.to)))
                        .then_with(|| a.to.cmp(&b.to))
                })?;
            current = next.to;
            cells.push(current);
        }
        None
    }

    /// A* between two cells of this room. The heuristic is straight-line
    /// distance over the maximum speed, which never overestimates.
    pub fn find_path(&self, start: GridCoord, goal: GridCoord) -> Option<RoomPath> {
        if !self.is_traversable(start) || !self.is_traversable(goal) {
            return None;
        }
        if start == goal {
            return Some(RoomPath {
                cells: vec![start],
                cost: 0.0,
            });
        }
        let min_inverse = 1.0 / self.params.max_speed;
        let n = self.cells.len();
        let mut g_score = vec![f32::INFINITY; n];
        let mut came_from: Vec<Option<GridCoord>> = vec![None; n];
        let mut closed = vec![false; n];
        let si = self.index(start)?;
        g_score[si] = 0.0;

        let mut open = BinaryHeap::new();
        open.push(OpenEntry {
            cell: start,
            f_score: start.euclidean_distance(goal) * min_inverse,
        });

        while let Some(current) = open.pop() {
            let Some(ci) = self.index(current.cell) else {
                continue;
            };
            if current.cell == goal {
                return Some(self.reconstruct(&came_from, start, goal, g_score[ci]));
            }
            if closed[ci] {
                continue;
            }
            closed[ci] = true;
            let current_g = g_score[ci];
            for edge in self.edges(current.cell) {
                let Some(ni) = self.index(edge.to) else { continue };
                if closed[ni] {
                    continue;
                }
                let tentative = current_g + edge.cost;
                if tentative < g_score[ni] {
                    g_score[ni] = tentative;
                    came_from[ni] = Some(current.cell);
                    open.push(OpenEntry {
                        cell: edge.to,
                        f_score: tentative + edge.to.euclidean_distance(goal) * min_inverse,
                    });
                }
            }
        }
        None
    }

    fn reconstruct(
        &self,
        came_from: &[Option<GridCoord>],
        start: GridCoord,
        goal: GridCoord,
        cost: f32,
    ) -> RoomPath {
        let mut cells = vec![goal];
        let mut current = goal;
        while current != start {
            match self.index(current).and_then(|i| came_from[i]) {
                Some(prev) => {
                    cells.push(prev);
                    current = prev;
                }
                None => break,
            }
        }
        cells.reverse();
        RoomPath { cells, cost }
    }

    /// Whether `cells` is still a walkable chain in this room; returns its
    /// current cost when it is.
    pub fn verify_path(&self, cells: &[GridCoord]) -> Option<f32> {
        let first = cells.first()?;
        if !self.is_traversable(*first) {
            return None;
        }
        cells
            .windows(2)
            .map(|pair| self.edge_cost(pair[0], pair[1]))
            .sum()
    }
}

/// Entry in the A* open set (min-heap via reversed ordering).
struct OpenEntry {
    cell: GridCoord,
    f_score: f32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::node::{Obstruction, Side};

    /// An open rectangular room at the world origin, all sides between
    /// cells open and the perimeter facing void.
    pub(crate) fn open_room(width: i32, length: i32) -> RoomGraph {
        let mut nodes = Vec::new();
        for y in 0..length {
            for x in 0..width {
                let mut node = GridNode::new(WorldCoord::new(x, y, 0));
                for dir in Direction::ALL {
                    let (dx, dy) = dir.offset();
                    let (nx, ny) = (x + dx, y + dy);
                    if nx >= 0 && ny >= 0 && nx < width && ny < length {
                        node.set_side(dir, Side::Open);
                    }
                }
                nodes.push(node);
            }
        }
        RoomGraph::from_nodes(RoomId(0), nodes, RoomParams::default()).unwrap()
    }

    fn block(room: &mut RoomGraph, c: GridCoord) {
        room.node_mut(c).unwrap().set_furniture(Some(Obstruction {
            blocks: true,
            speed_multiplier: 1.0,
        }));
        room.note_change(c);
    }

    /// Plain Dijkstra over the room's edge set from a single source.
    fn brute_force(room: &RoomGraph, source: GridCoord) -> BTreeMap<GridCoord, f32> {
        let mut dist: BTreeMap<GridCoord, f32> = room.coords().map(|c| (c, f32::INFINITY)).collect();
        let mut done = BTreeSet::new();
        dist.insert(source, 0.0);
        loop {
            let next = dist
                .iter()
                .filter(|(c, d)| !done.contains(*c) && d.is_finite())
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map(|(c, d)| (*c, *d));
            let Some((c, d)) = next else { break };
            done.insert(c);
            for edge in room.edges(c) {
                let entry = dist.get_mut(&edge.to).unwrap();
                if d + edge.cost < *entry {
                    *entry = d + edge.cost;
                }
            }
        }
        dist
    }

    #[test]
    fn five_by_five_corner_to_center_matches_brute_force() {
        let room = open_room(5, 5);
        let center = GridCoord::new(2, 2);
        let corner = GridCoord::new(0, 0);
        let table = room.create_gscore_table([center]);
        let expected = brute_force(&room, center)[&corner];
        assert!((table.get(corner) - expected).abs() < 1e-5);
        // With uniform speed the best route is two straight diagonals.
        assert!((expected - 2.0 * std::f32::consts::SQRT_2).abs() < 1e-5);
        for c in room.coords() {
            assert!((table.get(c) - brute_force(&room, c)[&center]).abs() < 1e-4);
        }
    }

    #[test]
    fn knight_edges_have_sqrt5_cost_on_uniform_floor() {
        let room = open_room(5, 5);
        let c = GridCoord::new(1, 1);
        let knights: Vec<&Edge> = room
            .edges(c)
            .iter()
            .filter(|e| e.kind == EdgeKind::Knight)
            .collect();
        assert!(!knights.is_empty());
        for edge in knights {
            assert!((edge.cost - 5f32.sqrt()).abs() < 1e-4);
            let back = room.edge_cost(edge.to, c).unwrap();
            assert!((back - edge.cost).abs() < 1e-6);
        }
    }

    #[test]
    fn distance_table_is_locally_consistent() {
        let mut room = open_room(7, 6);
        block(&mut room, GridCoord::new(3, 3));
        room.node_mut(GridCoord::new(5, 1)).unwrap().set_floor_speed(0.5);
        room.note_change(GridCoord::new(5, 1));
        let endpoint = GridCoord::new(6, 0);
        let table = room.create_gscore_table([endpoint]);

        for c in room.coords() {
            let score = table.get(c);
            if c == endpoint {
                assert_eq!(score, 0.0);
                continue;
            }
            assert!(score != 0.0);
            let best = room
                .edges(c)
                .iter()
                .map(|e| e.cost + table.get(e.to))
                .fold(f32::INFINITY, f32::min);
            if best.is_finite() {
                assert!((score - best).abs() < 1e-4, "{c:?}: {score} vs {best}");
            } else {
                assert_eq!(score, f32::INFINITY);
            }
        }
        // The blocked furniture's footprint is unreachable.
        assert_eq!(table.get(GridCoord::new(3, 3)), f32::INFINITY);
        assert_eq!(table.get(GridCoord::new(2, 2)), f32::INFINITY);
    }

    #[test]
    fn obstruction_blocks_whole_footprint() {
        let mut room = open_room(5, 5);
        assert!(room.is_traversable(GridCoord::new(1, 1)));
        block(&mut room, GridCoord::new(2, 2));
        for dy in -1..=1 {
            for dx in -1..=1 {
                assert!(!room.is_traversable(GridCoord::new(2 + dx, 2 + dy)));
            }
        }
        assert!(room.is_traversable(GridCoord::new(0, 0)));
    }

    #[test]
    fn slow_cell_slows_its_neighborhood() {
        let mut room = open_room(5, 5);
        room.node_mut(GridCoord::new(2, 2)).unwrap().set_floor_speed(0.25);
        room.note_change(GridCoord::new(2, 2));
        assert_eq!(room.speed(GridCoord::new(1, 1)), 0.25);
        assert_eq!(room.speed(GridCoord::new(0, 0)), 1.0);
    }

    #[test]
    fn connector_table_is_cached_until_change() {
        let mut room = open_room(4, 4);
        room.set_connector_end(ConnectorId(1), End::A, GridCoord::new(3, 0));
        let first = room.connector_table(ConnectorId(1), End::A).unwrap();
        let second = room.connector_table(ConnectorId(1), End::A).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        room.note_change(GridCoord::new(0, 3));
        let third = room.connector_table(ConnectorId(1), End::A).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn poi_cache_evicts_least_recent() {
        let mut room = open_room(6, 6);
        room.add_poi(PoiKind::Bed, GridCoord::new(0, 0));
        room.add_poi(PoiKind::Seat, GridCoord::new(5, 5));
        room.add_poi(PoiKind::FoodSource, GridCoord::new(0, 5));
        room.add_poi(PoiKind::Workbench, GridCoord::new(5, 0));
        room.poi_table(PoiKind::Bed);
        room.poi_table(PoiKind::Seat);
        room.poi_table(PoiKind::FoodSource);
        room.poi_table(PoiKind::Bed);
        room.poi_table(PoiKind::Workbench);
        let cached = room.cached_poi_kinds();
        assert_eq!(cached, vec![PoiKind::Workbench, PoiKind::Bed, PoiKind::FoodSource]);
        assert_eq!(room.poi_distance(PoiKind::Bed, GridCoord::new(0, 0)), 0.0);
    }

    #[test]
    fn descend_follows_table_to_endpoint() {
        let room = open_room(6, 6);
        let table = room.create_gscore_table([GridCoord::new(5, 5)]);
        let path = room.descend(&table, GridCoord::new(0, 0)).unwrap();
        assert_eq!(path.cells.first(), Some(&GridCoord::new(0, 0)));
        assert_eq!(path.cells.last(), Some(&GridCoord::new(5, 5)));
        let walked = room.verify_path(&path.cells).unwrap();
        assert!((walked - path.cost).abs() < 1e-4);
    }

    #[test]
    fn find_path_agrees_with_table() {
        let mut room = open_room(8, 5);
        block(&mut room, GridCoord::new(4, 2));
        let start = GridCoord::new(0, 2);
        let goal = GridCoord::new(7, 2);
        let path = room.find_path(start, goal).unwrap();
        let table = room.create_gscore_table([goal]);
        assert!((path.cost - table.get(start)).abs() < 1e-4);
        let walked = room.verify_path(&path.cells).unwrap();
        assert!((walked - path.cost).abs() < 1e-4);
        assert!(!path.cells.contains(&GridCoord::new(4, 2)));
    }

    #[test]
    fn changes_since_reports_history_gaps() {
        let mut room = open_room(4, 4);
        let start = room.revision();
        room.note_change(GridCoord::new(1, 1));
        room.note_change(GridCoord::new(2, 2));
        assert_eq!(
            room.changes_since(start),
            Some(vec![GridCoord::new(1, 1), GridCoord::new(2, 2)])
        );
        assert_eq!(room.changes_since(room.revision()), Some(Vec::new()));
        for _ in 0..CHANGE_HISTORY + 1 {
            room.note_change(GridCoord::new(0, 0));
        }
        assert_eq!(room.changes_since(start), None);
    }
}

// Incremental single-room pathfinding (D*-Lite).
//
// `IncrementalPathfinder` keeps, for one mover and one goal region inside
// one room, a shortest-path field that is repaired rather than recomputed
// when the room changes. Scores run backward from the goal: `g` is the
// current best distance to the goal, `rhs` the one-step lookahead
// (`min over edges of cost + g(target)`), and a cell is queued while the two
// disagree.
//
// Keys are `(min(g, rhs) + h(start, cell) + km, min(g, rhs))` compared
// lexicographically with a tolerance (`dlite_epsilon`). `h` is straight-line
// distance over the maximum speed, which never exceeds an edge's cost, so
// moving the start only bumps the scalar `km` instead of re-keying the
// queue. The queue is a min-heap with lazy deletion: every cell remembers
// the sequence number of its live entry, and entries with any other number
// are skipped when popped.
//
// The pathfinder owns its score arrays, separate from the room's distance
// tables, and follows the room through `RoomGraph::changes_since`: each
// recorded change re-evaluates every cell within three tiles (the reach of
// a change on edge sets). A gap in that history, a different room, or a
// resized room forces a full reinitialize.
//
// See also: `room.rs` for edges and change history, `goal.rs`, and the
// simulation's travel action, which asks this for every in-room step.
//
// **Critical constraint: determinism.** Heap ties break on insertion
// sequence and neighbor ties on coordinate order.

use crate::config::NavConfig;
use crate::goal::Goal;
use crate::room::RoomGraph;
use crate::types::{GridCoord, RoomId, WorldCoord};
use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

type Key = (f32, f32);

struct QueueEntry {
    key: Key,
    sequence: u64,
    cell: GridCoord,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest key is "greatest".
        other
            .key
            .0
            .total_cmp(&self.key.0)
            .then_with(|| other.key.1.total_cmp(&self.key.1))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// What the pathfinder could do on its last sync.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Replayed the room's recorded changes.
    Repaired,
    /// Started over from scratch.
    Reinitialized,
    /// The start is not in a room this pathfinder can follow.
    OutOfRoom,
}

pub struct IncrementalPathfinder {
    epsilon: f32,
    min_inverse_speed: f32,
    room: Option<RoomId>,
    revision: u64,
    width: i32,
    length: i32,
    g: Vec<f32>,
    rhs: Vec<f32>,
    handle: Vec<Option<u64>>,
    is_goal: Vec<bool>,
    goal_cells: Vec<WorldCoord>,
    start: GridCoord,
    km: f32,
    open: BinaryHeap<QueueEntry>,
    next_sequence: u64,
}

impl IncrementalPathfinder {
    pub fn new(config: &NavConfig) -> Self {
        Self {
            epsilon: config.dlite_epsilon,
            min_inverse_speed: config.min_inverse_speed(),
            room: None,
            revision: 0,
            width: 0,
            length: 0,
            g: Vec::new(),
            rhs: Vec::new(),
            handle: Vec::new(),
            is_goal: Vec::new(),
            goal_cells: Vec::new(),
            start: GridCoord::new(0, 0),
            km: 0.0,
            open: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    pub fn room(&self) -> Option<RoomId> {
        self.room
    }

    pub fn start(&self) -> GridCoord {
        self.start
    }

    pub fn goal_cells(&self) -> &[WorldCoord] {
        &self.goal_cells
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Start over for a new goal. Endpoints outside `room` are remembered
    /// but contribute nothing until the pathfinder follows their room.
    pub fn set_goal<G: Goal + ?Sized>(&mut self, room: &RoomGraph, start: WorldCoord, goal: &G) -> bool {
        self.goal_cells = goal.endpoints().to_vec();
        self.reinitialize(room, start)
    }

    /// Reset every score for `room` and seed the goal cells in it. Returns
    /// `false` if `start` is not in the room.
    pub fn reinitialize(&mut self, room: &RoomGraph, start: WorldCoord) -> bool {
        let Some(local) = room.to_local(start) else {
            self.room = None;
            return false;
        };
        let cells = (room.width() * room.length()) as usize;
        self.room = Some(room.id());
        self.revision = room.revision();
        self.width = room.width();
        self.length = room.length();
        self.g = vec![f32::INFINITY; cells];
        self.rhs = vec![f32::INFINITY; cells];
        self.handle = vec![None; cells];
        self.is_goal = vec![false; cells];
        self.start = local;
        self.km = 0.0;
        self.open.clear();

        let goals: Vec<GridCoord> = self
            .goal_cells
            .iter()
            .filter_map(|&e| room.to_local(e))
            .collect();
        for c in goals {
            if let Some(i) = self.index(c) {
                self.is_goal[i] = true;
                if room.is_traversable(c) {
                    self.rhs[i] = 0.0;
                    self.insert(c);
                }
            }
        }
        true
    }

    /// Bring the scores up to date with `room` and move the start to
    /// `start`. Cheap when only local changes happened since the last sync.
    pub fn sync(&mut self, room: &RoomGraph, start: WorldCoord) -> SyncOutcome {
        let same_room = self.room == Some(room.id())
            && self.width == room.width()
            && self.length == room.length();
        let changes = if same_room {
            room.changes_since(self.revision)
        } else {
            None
        };
        let Some(changes) = changes else {
            return if self.reinitialize(room, start) {
                SyncOutcome::Reinitialized
            } else {
                SyncOutcome::OutOfRoom
            };
        };
        if !self.move_start(room, start) {
            return SyncOutcome::OutOfRoom;
        }
        self.revision = room.revision();
        self.notify_changed(room, &changes);
        SyncOutcome::Repaired
    }

    /// Move the start within the room, shifting `km` by the heuristic
    /// distance moved.
    pub fn move_start(&mut self, room: &RoomGraph, start: WorldCoord) -> bool {
        let Some(local) = room.to_local(start) else {
            return false;
        };
        if local != self.start {
            self.km += self.h(self.start, local);
            self.start = local;
        }
        true
    }

    /// Re-evaluate every cell whose edges may have changed because of the
    /// given cell changes.
    pub fn notify_changed(&mut self, room: &RoomGraph, changed: &[GridCoord]) {
        let mut affected = BTreeSet::new();
        for c in changed {
            for dy in -3..=3 {
                for dx in -3..=3 {
                    let n = c.offset(dx, dy);
                    if self.index(n).is_some() {
                        affected.insert(n);
                    }
                }
            }
        }
        for c in affected {
            self.update_vertex(room, c);
        }
    }

    // -----------------------------------------------------------------------
    // Core
    // -----------------------------------------------------------------------

    fn index(&self, c: GridCoord) -> Option<usize> {
        if c.x < 0 || c.y < 0 || c.x >= self.width || c.y >= self.length {
            None
        } else {
            Some((c.y * self.width + c.x) as usize)
        }
    }

    fn h(&self, a: GridCoord, b: GridCoord) -> f32 {
        a.euclidean_distance(b) * self.min_inverse_speed
    }

    fn approx_eq(&self, a: f32, b: f32) -> bool {
        a == b || (a - b).abs() <= self.epsilon
    }

    /// `a` is less than `b` by more than the tolerance, lexicographically.
    fn key_less(&self, a: Key, b: Key) -> bool {
        if self.approx_eq(a.0, b.0) {
            a.1 < b.1 && !self.approx_eq(a.1, b.1)
        } else {
            a.0 < b.0
        }
    }

    fn key(&self, c: GridCoord) -> Key {
        let Some(i) = self.index(c) else {
            return (f32::INFINITY, f32::INFINITY);
        };
        let m = self.g[i].min(self.rhs[i]);
        (m + self.h(self.start, c) + self.km, m)
    }

    fn insert(&mut self, c: GridCoord) {
        let Some(i) = self.index(c) else { return };
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.handle[i] = Some(sequence);
        self.open.push(QueueEntry {
            key: self.key(c),
            sequence,
            cell: c,
        });
    }

    fn update_vertex(&mut self, room: &RoomGraph, c: GridCoord) {
        let Some(i) = self.index(c) else { return };
        self.rhs[i] = if self.is_goal[i] && room.is_traversable(c) {
            0.0
        } else {
            room.edges(c)
                .iter()
                .filter_map(|e| self.index(e.to).map(|j| e.cost + self.g[j]))
                .fold(f32::INFINITY, f32::min)
        };
        self.handle[i] = None;
        if !self.approx_eq(self.g[i], self.rhs[i]) {
            self.insert(c);
        }
    }

    /// Drop dead entries off the top of the queue.
    fn peek_live(&mut self) -> Option<(Key, GridCoord)> {
        while let Some(top) = self.open.peek() {
            let live = self
                .index(top.cell)
                .is_some_and(|i| self.handle[i] == Some(top.sequence));
            if live {
                return Some((top.key, top.cell));
            }
            self.open.pop();
        }
        None
    }

    /// Repair scores until the start is consistent and nothing queued can
    /// still improve it.
    pub fn establish_pathing(&mut self, room: &RoomGraph) {
        if self.room != Some(room.id()) {
            return;
        }
        let Some(si) = self.index(self.start) else {
            return;
        };
        while let Some((k_old, u)) = self.peek_live() {
            let start_key = self.key(self.start);
            let start_settled = self.approx_eq(self.g[si], self.rhs[si]);
            if !self.key_less(k_old, start_key) && start_settled {
                break;
            }
            self.open.pop();
            let Some(ui) = self.index(u) else { continue };
            self.handle[ui] = None;

            let k_new = self.key(u);
            if self.key_less(k_old, k_new) {
                self.insert(u);
            } else if self.g[ui] > self.rhs[ui] {
                self.g[ui] = self.rhs[ui];
                for edge in room.edges(u) {
                    self.update_vertex(room, edge.to);
                }
            } else {
                self.g[ui] = f32::INFINITY;
                self.update_vertex(room, u);
                for edge in room.edges(u) {
                    self.update_vertex(room, edge.to);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn g_score(&self, c: GridCoord) -> f32 {
        self.index(c).map_or(f32::INFINITY, |i| self.g[i])
    }

    pub fn is_goal_reachable(&self, c: GridCoord) -> bool {
        self.g_score(c).is_finite()
    }

    pub fn is_goal_cell(&self, c: GridCoord) -> bool {
        self.index(c).is_some_and(|i| self.is_goal[i])
    }

    /// The neighbor of `from` minimizing `edge cost + g`. `None` at the goal
    /// or when the goal is unreachable.
    pub fn next_step(&self, room: &RoomGraph, from: GridCoord) -> Option<GridCoord> {
        if self.is_goal_cell(from) {
            return None;
        }
        room.edges(from)
            .iter()
            .map(|e| (e.cost + self.g_score(e.to), e.to))
            .filter(|(cost, _)| cost.is_finite())
            .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, to)| to)
    }

    /// Follow `next_step` from `from` to the goal, for inspection.
    pub fn path(&self, room: &RoomGraph, from: GridCoord) -> Option<Vec<GridCoord>> {
        if !self.is_goal_reachable(from) {
            return None;
        }
        let mut cells = vec![from];
        let mut current = from;
        for _ in 0..self.g.len() {
            if self.is_goal_cell(current) {
                return Some(cells);
            }
            current = self.next_step(room, current)?;
            cells.push(current);
        }
        None
    }
}

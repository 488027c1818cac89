// Sector partitioning and bottleneck detection.
//
// A sector is a maximal set of traversable cells that can reach each other
// on foot: through open cardinal sides within a room, and across unlocked
// connectors whose two ends are both traversable. Sector membership is kept
// in a separate map (`SectorMap::sector_of`) rebuilt wholesale at every
// settle, never stored on the cells themselves, so "stale until settle" is
// explicit.
//
// Bottlenecks are the cells every path between some pair of sector members
// must cross (articulation points). For each sector we run an iterative DFS
// from a seed and compute, for every member, its chain of "sources": the
// cells that must be traversed to reach it from the seed. That chain is the
// dominator tree, built with the Cooper-Harvey-Kennedy iteration over DFS
// postorder. A non-seed cell is a bottleneck iff it is the immediate source
// of some other cell; the seed is a bottleneck iff the DFS leaves it with
// two or more subtrees.
//
// Seeds prefer cells on a 2x2 loop (which can never be bottlenecks), so the
// seed rule rarely applies.
//
// An obstruction takes its whole 3x3 footprint out of the walkable set, so a
// cell that is not a bottleneck can still be unsafe to block (the middle of
// a three-wide corridor). `footprint_keeps_connectivity` answers that
// question locally against the live map, between settles.
//
// See also: `world.rs` which rebuilds the map at the settle phase,
// `router.rs` which rejects cross-sector queries before searching,
// the simulation's idle logic which avoids blocking bottlenecks.
//
// **Critical constraint: determinism.** Cells are visited in room-id then
// index order and neighbors in a fixed direction order, so sector ids and
// bottleneck lists are reproducible.

use crate::map::MapGrid;
use crate::types::{Direction, End, SectorId, WorldCoord};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// One connected component of traversable cells.
#[derive(Clone, Debug, PartialEq)]
pub struct Sector {
    pub id: SectorId,
    /// Members in discovery order.
    pub nodes: Vec<WorldCoord>,
    /// Cells whose blocking would disconnect part of this sector, sorted.
    pub bottlenecks: Vec<WorldCoord>,
}

#[derive(Clone, Debug, Default)]
pub struct SectorMap {
    sector_of: FxHashMap<WorldCoord, SectorId>,
    bottlenecks: BTreeSet<WorldCoord>,
    sectors: Vec<Sector>,
}

type Neighbors = SmallVec<[u32; 5]>;

impl SectorMap {
    /// Partition every traversable cell of `map`.
    pub fn build(map: &MapGrid) -> Self {
        let cells: Vec<WorldCoord> = map
            .rooms()
            .flat_map(|room| {
                room.coords()
                    .filter(|&c| room.is_traversable(c))
                    .map(|c| room.to_world(c))
                    .collect::<Vec<_>>()
            })
            .collect();
        let slot: FxHashMap<WorldCoord, u32> = cells
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as u32))
            .collect();

        let mut adjacency: Vec<Neighbors> = vec![Neighbors::new(); cells.len()];
        for (i, &at) in cells.iter().enumerate() {
            let Some(node) = map.node(at) else { continue };
            for dir in Direction::ALL {
                if node.side(dir).is_open()
                    && let Some(&j) = slot.get(&at.step(dir))
                {
                    adjacency[i].push(j);
                }
            }
        }
        for c in map.connectors().filter(|c| !c.is_locked()) {
            let a = slot.get(&c.end(End::A));
            let b = slot.get(&c.end(End::B));
            if let (Some(&a), Some(&b)) = (a, b)
                && a != b
            {
                adjacency[a as usize].push(b);
                adjacency[b as usize].push(a);
            }
        }

        let mut sector_of = FxHashMap::default();
        let mut all_bottlenecks = BTreeSet::new();
        let mut sectors = Vec::new();
        let mut assigned = vec![false; cells.len()];

        loop {
            let seed = (0..cells.len())
                .find(|&i| !assigned[i] && on_loop(i, &cells, &slot, &adjacency))
                .or_else(|| (0..cells.len()).find(|&i| !assigned[i]));
            let Some(seed) = seed else { break };

            let id = SectorId(sectors.len() as u32);
            let search = DominatorSearch::run(seed as u32, &adjacency);
            let nodes: Vec<WorldCoord> = search.order.iter().map(|&i| cells[i as usize]).collect();
            for &i in &search.order {
                assigned[i as usize] = true;
                sector_of.insert(cells[i as usize], id);
            }
            let mut bottlenecks: Vec<WorldCoord> =
                search.bottlenecks().into_iter().map(|i| cells[i as usize]).collect();
            bottlenecks.sort();
            all_bottlenecks.extend(bottlenecks.iter().copied());
            sectors.push(Sector {
                id,
                nodes,
                bottlenecks,
            });
        }

        Self {
            sector_of,
            bottlenecks: all_bottlenecks,
            sectors,
        }
    }

    pub fn sector_of(&self, at: WorldCoord) -> Option<SectorId> {
        self.sector_of.get(&at).copied()
    }

    /// Whether two cells can reach each other. Cells outside every sector
    /// (not traversable at the last settle) reach nothing.
    pub fn same_sector(&self, a: WorldCoord, b: WorldCoord) -> bool {
        match (self.sector_of(a), self.sector_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    pub fn is_bottleneck(&self, at: WorldCoord) -> bool {
        self.bottlenecks.contains(&at)
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn sector(&self, id: SectorId) -> Option<&Sector> {
        self.sectors.get(id.0 as usize)
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    pub fn bottleneck_count(&self) -> usize {
        self.bottlenecks.len()
    }
}

/// Half-width of the square searched for a detour around a footprint.
const FOOTPRINT_WINDOW: i32 = 6;

/// Whether obstructing `at` leaves every walkable cell around its 3x3
/// footprint mutually reachable without passing through the footprint.
///
/// Conservative: the detour must fit inside a window of
/// `FOOTPRINT_WINDOW` cells around `at`, and a footprint covering a
/// connector end is refused outright.
pub fn footprint_keeps_connectivity(map: &MapGrid, at: WorldCoord) -> bool {
    let in_footprint = |c: WorldCoord| c.z == at.z && (c.x - at.x).abs() <= 1 && (c.y - at.y).abs() <= 1;
    let footprint: Vec<WorldCoord> = (-1..=1)
        .flat_map(|dy| (-1..=1).map(move |dx| WorldCoord::new(at.x + dx, at.y + dy, at.z)))
        .filter(|&c| map.is_floor(c))
        .collect();
    if footprint.iter().any(|&c| map.connector_at(c).is_some()) {
        return false;
    }

    // Walkable cells that currently step into the footprint.
    let mut rim: BTreeSet<WorldCoord> = BTreeSet::new();
    for &f in footprint.iter().filter(|&&f| map.is_traversable(f)) {
        for dir in Direction::ALL {
            let beyond = f.step(dir);
            if in_footprint(beyond) || !map.is_traversable(beyond) {
                continue;
            }
            if map.node(f).is_some_and(|n| n.side(dir).is_open()) {
                rim.insert(beyond);
            }
        }
    }
    let Some(&first) = rim.iter().next() else {
        return true;
    };

    let in_window = |c: WorldCoord| c.z == at.z && (c.x - at.x).abs() <= FOOTPRINT_WINDOW && (c.y - at.y).abs() <= FOOTPRINT_WINDOW;
    let mut seen = BTreeSet::from([first]);
    let mut queue = vec![first];
    let mut found = 1;
    while let Some(c) = queue.pop() {
        let Some(node) = map.node(c) else { continue };
        for dir in Direction::ALL {
            let next = c.step(dir);
            if !node.side(dir).is_open()
                || in_footprint(next)
                || !in_window(next)
                || !map.is_traversable(next)
                || !seen.insert(next)
            {
                continue;
            }
            if rim.contains(&next) {
                found += 1;
                if found == rim.len() {
                    return true;
                }
            }
            queue.push(next);
        }
    }
    found == rim.len()
}

/// Whether cell `i` is a corner of a 2x2 block whose four cells are
/// cardinally connected in a cycle.
fn on_loop(
    i: usize,
    cells: &[WorldCoord],
    slot: &FxHashMap<WorldCoord, u32>,
    adjacency: &[Neighbors],
) -> bool {
    let at = cells[i];
    let linked = |a: WorldCoord, b: WorldCoord| match (slot.get(&a), slot.get(&b)) {
        (Some(&a), Some(&b)) => adjacency[a as usize].contains(&b),
        _ => false,
    };
    Direction::ALL.into_iter().any(|d| {
        let cw = d.clockwise();
        let ahead = at.step(d);
        let corner = ahead.step(cw);
        let flank = at.step(cw);
        linked(at, ahead) && linked(ahead, corner) && linked(corner, flank) && linked(flank, at)
    })
}

// ---------------------------------------------------------------------------
// Dominator ("sources") search
// ---------------------------------------------------------------------------

const UNDEFINED: u32 = u32::MAX;

struct DominatorSearch {
    seed: u32,
    /// Members in DFS preorder.
    order: Vec<u32>,
    /// Immediate source (dominator) per member, keyed by global slot.
    idom: FxHashMap<u32, u32>,
    seed_children: usize,
}

impl DominatorSearch {
    fn run(seed: u32, adjacency: &[Neighbors]) -> Self {
        // Iterative DFS recording preorder, postorder and the number of
        // subtrees hanging off the seed.
        let mut order = Vec::new();
        let mut postorder: Vec<u32> = Vec::new();
        let mut visited: FxHashSet<u32> = FxHashSet::default();
        let mut stack: Vec<(u32, usize)> = vec![(seed, 0)];
        let mut seed_children = 0;
        visited.insert(seed);
        order.push(seed);
        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            let neighbors = &adjacency[node as usize];
            if next < neighbors.len() {
                frame.1 += 1;
                let child = neighbors[next];
                if visited.insert(child) {
                    if node == seed {
                        seed_children += 1;
                    }
                    order.push(child);
                    stack.push((child, 0));
                }
            } else {
                postorder.push(node);
                stack.pop();
            }
        }

        let post_index: FxHashMap<u32, usize> =
            postorder.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let mut idom: FxHashMap<u32, u32> = postorder.iter().map(|&n| (n, UNDEFINED)).collect();
        idom.insert(seed, seed);

        let intersect = |idom: &FxHashMap<u32, u32>, mut a: u32, mut b: u32| -> u32 {
            while a != b {
                while post_index[&a] < post_index[&b] {
                    a = idom[&a];
                }
                while post_index[&b] < post_index[&a] {
                    b = idom[&b];
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &node in postorder.iter().rev() {
                if node == seed {
                    continue;
                }
                let mut new_idom = UNDEFINED;
                for &pred in &adjacency[node as usize] {
                    if idom.get(&pred).copied().unwrap_or(UNDEFINED) == UNDEFINED {
                        continue;
                    }
                    new_idom = if new_idom == UNDEFINED {
                        pred
                    } else {
                        intersect(&idom, pred, new_idom)
                    };
                }
                if idom[&node] != new_idom {
                    idom.insert(node, new_idom);
                    changed = true;
                }
            }
        }

        Self {
            seed,
            order,
            idom,
            seed_children,
        }
    }

    fn bottlenecks(&self) -> Vec<u32> {
        let mut out: BTreeSet<u32> = self
            .idom
            .iter()
            .filter(|&(&node, &dom)| node != self.seed && dom != self.seed && dom != UNDEFINED)
            .map(|(_, &dom)| dom)
            .collect();
        if self.seed_children >= 2 {
            out.insert(self.seed);
        }
        out.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavConfig;
    use crate::map::tests::rect;
    use crate::node::{Obstruction, Occupant};

    fn map() -> MapGrid {
        MapGrid::new(&NavConfig::default())
    }

    /// Two 3x3 areas joined by a one-tile corridor along y = 1.
    fn dumbbell() -> MapGrid {
        let mut map = map();
        map.add_cells(rect(0, 0, 0, 3, 3), false).unwrap();
        map.add_cells(rect(3, 1, 0, 3, 1), false).unwrap();
        map.add_cells(rect(6, 0, 0, 3, 3), false).unwrap();
        map
    }

    /// Exhaustive BFS reachability over the same adjacency the partitioner
    /// uses, for checking sector cover.
    fn reachable(map: &MapGrid, from: WorldCoord) -> BTreeSet<WorldCoord> {
        let mut seen = BTreeSet::from([from]);
        let mut queue = vec![from];
        while let Some(at) = queue.pop() {
            let node = map.node(at).unwrap();
            let mut next: Vec<WorldCoord> = Direction::ALL
                .into_iter()
                .filter(|&d| node.side(d).is_open())
                .map(|d| at.step(d))
                .collect();
            for c in map.connectors().filter(|c| !c.is_locked()) {
                if let Some(end) = c.end_at(at) {
                    next.push(c.end(end.other()));
                }
            }
            for n in next {
                if map.is_traversable(n) && seen.insert(n) {
                    queue.push(n);
                }
            }
        }
        seen
    }

    #[test]
    fn corridor_tiles_are_bottlenecks() {
        let map = dumbbell();
        let sectors = SectorMap::build(&map);
        assert_eq!(sectors.sector_count(), 1);
        for x in 2..=6 {
            assert!(sectors.is_bottleneck(WorldCoord::new(x, 1, 0)), "x = {x}");
        }
        for at in [
            WorldCoord::new(0, 0, 0),
            WorldCoord::new(1, 1, 0),
            WorldCoord::new(7, 2, 0),
            WorldCoord::new(8, 0, 0),
        ] {
            assert!(!sectors.is_bottleneck(at), "{at}");
        }
    }

    #[test]
    fn blocking_a_bottleneck_disconnects_but_a_loop_cell_does_not() {
        let mut map = dumbbell();
        map.set_furniture(
            WorldCoord::new(0, 0, 0),
            Some(Obstruction {
                blocks: true,
                speed_multiplier: 1.0,
            }),
        )
        .unwrap();
        assert_eq!(SectorMap::build(&map).sector_count(), 1);

        map.set_furniture(
            WorldCoord::new(4, 1, 0),
            Some(Obstruction {
                blocks: true,
                speed_multiplier: 1.0,
            }),
        )
        .unwrap();
        assert_eq!(SectorMap::build(&map).sector_count(), 2);
    }

    #[test]
    fn sectors_cover_traversable_cells_exactly() {
        let mut map = map();
        map.add_cells(rect(0, 0, 0, 4, 4), true).unwrap();
        map.add_cells(rect(4, 0, 0, 4, 4), true).unwrap();
        map.add_cells(rect(10, 0, 0, 3, 3), true).unwrap();
        let (door, _) = map
            .add_connector(WorldCoord::new(3, 1, 0), WorldCoord::new(4, 1, 0))
            .unwrap();
        map.set_furniture(
            WorldCoord::new(11, 1, 0),
            Some(Obstruction {
                blocks: true,
                speed_multiplier: 1.0,
            }),
        )
        .unwrap();

        let sectors = SectorMap::build(&map);
        let mut covered = BTreeSet::new();
        for sector in sectors.sectors() {
            for &at in &sector.nodes {
                assert!(covered.insert(at), "{at} in two sectors");
            }
        }
        let traversable: BTreeSet<WorldCoord> = map
            .rooms()
            .flat_map(|r| r.coords().filter(|&c| r.is_traversable(c)).map(|c| r.to_world(c)).collect::<Vec<_>>())
            .collect();
        assert_eq!(covered, traversable);

        let probe = [
            WorldCoord::new(0, 0, 0),
            WorldCoord::new(7, 3, 0),
            WorldCoord::new(3, 1, 0),
        ];
        for &a in &probe {
            let reach = reachable(&map, a);
            for &b in &traversable {
                assert_eq!(reach.contains(&b), sectors.same_sector(a, b), "{a} -> {b}");
            }
        }

        map.set_locked(door, true).unwrap();
        let locked = SectorMap::build(&map);
        assert!(!locked.same_sector(WorldCoord::new(0, 0, 0), WorldCoord::new(7, 3, 0)));
    }

    /// Two 5x5 areas joined by a three-wide corridor, all one room.
    fn wide_corridor() -> MapGrid {
        let mut map = map();
        map.add_cells(rect(0, 0, 0, 5, 5), false).unwrap();
        map.add_cells(rect(5, 1, 0, 5, 3), false).unwrap();
        map.add_cells(rect(10, 0, 0, 5, 5), false).unwrap();
        map
    }

    #[test]
    fn wide_corridor_centre_is_unsafe_to_block_though_not_a_bottleneck() {
        let mut map = wide_corridor();
        assert_eq!(map.room_count(), 1);
        let sectors = SectorMap::build(&map);
        assert_eq!(sectors.sector_count(), 1);
        let centre = WorldCoord::new(7, 2, 0);
        assert!(!sectors.is_bottleneck(centre));

        assert!(!footprint_keeps_connectivity(&map, centre));
        let open = WorldCoord::new(2, 2, 0);
        assert!(footprint_keeps_connectivity(&map, open));

        let occupant = Some(Occupant { id: 1, blocks: true });
        map.set_occupant(open, occupant).unwrap();
        assert_eq!(SectorMap::build(&map).sector_count(), 1);
        map.set_occupant(open, None).unwrap();
        map.set_occupant(centre, occupant).unwrap();
        assert_eq!(SectorMap::build(&map).sector_count(), 2);
    }

    #[test]
    fn footprint_on_a_door_end_is_refused() {
        let mut map = map();
        map.add_cells(rect(0, 0, 0, 5, 5), true).unwrap();
        map.add_cells(rect(5, 0, 0, 5, 5), true).unwrap();
        map.add_connector(WorldCoord::new(4, 2, 0), WorldCoord::new(5, 2, 0))
            .unwrap();
        assert!(!footprint_keeps_connectivity(&map, WorldCoord::new(3, 2, 0)));
        assert!(footprint_keeps_connectivity(&map, WorldCoord::new(2, 2, 0)));
    }

    #[test]
    fn open_room_has_no_bottlenecks() {
        let mut map = map();
        map.add_cells(rect(0, 0, 0, 5, 4), false).unwrap();
        let sectors = SectorMap::build(&map);
        assert_eq!(sectors.sector_count(), 1);
        assert_eq!(sectors.bottleneck_count(), 0);
    }

    #[test]
    fn middle_of_a_line_is_a_bottleneck() {
        let mut map = map();
        map.add_cells(rect(0, 0, 0, 3, 1), false).unwrap();
        let sectors = SectorMap::build(&map);
        assert_eq!(
            sectors.sectors()[0].bottlenecks,
            vec![WorldCoord::new(1, 0, 0)]
        );
    }
}

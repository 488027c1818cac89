// Cross-room routing over the connector graph.
//
// `CrossRoomRouter` answers "how far from here to that goal" and "which way"
// for positions in different rooms. It borrows a settled map and its sector
// partition and runs Dijkstra over an implicit graph whose nodes are
// connector endpoints ("ports") plus a single goal node:
//
// - from the start cell, one edge to every unlocked port of the start room
//   (cost = that port's distance table at the start cell) and, if the start
//   room holds goal endpoints, one edge to the goal;
// - from a port, one edge across its connector to the other end (average
//   inverse speed of the two ends, times the stair multiplier for stairs);
// - from a port, one edge to every other unlocked port of the same room
//   (cost from the connector's hop cache, re-verified before use) and one
//   edge to the goal if that room holds goal endpoints.
//
// Goal costs come from a per-query distance table over the goal endpoints
// in each room touched. Before any search, a sector check rejects start and
// goal cells that cannot reach each other, which is the common way to learn
// a destination is unreachable. A pop budget (`router_max_pops`) bounds
// every search; running out counts as unreachable.
//
// `route` runs the same search keeping predecessors and materializes the
// walk as steps and per-room legs. It is the expensive variant and is meant
// to run on the route worker (`route_job.rs`).
//
// See also: `room.rs` for distance tables and `descend`, `connector.rs` for
// the hop cache, `sector.rs`, `goal.rs`.
//
// **Critical constraint: determinism.** Frontier ties break on insertion
// sequence, and ports are expanded in id order.

use crate::config::NavConfig;
use crate::connector::{Connector, Hop};
use crate::goal::Goal;
use crate::map::MapGrid;
use crate::room::{DistanceTable, RoomGraph};
use crate::sector::SectorMap;
use crate::types::{ConnectorId, End, GridCoord, RoomId, WorldCoord};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use tracing::warn;

/// How a route step is entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepVia {
    Walk,
    Cross(ConnectorId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStep {
    pub at: WorldCoord,
    pub via: StepVia,
}

/// One in-room stretch of a route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub room: RoomId,
    pub from: WorldCoord,
    pub to: WorldCoord,
    /// The connector crossed at `to`, or `None` on the final leg.
    pub exit: Option<ConnectorId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub cost: f32,
    /// Cells to move into, in order, excluding the start cell. At most
    /// `route_buffer_capacity` long.
    pub steps: Vec<RouteStep>,
    pub legs: Vec<RouteLeg>,
    /// Whether `steps` was cut short by the buffer capacity.
    pub truncated: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum RouteNode {
    Port(ConnectorId, End),
    Goal,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Link {
    Start,
    Walk(RouteNode),
    Cross(RouteNode),
}

/// Frontier entry (min-heap via reversed ordering).
struct Frontier {
    cost: f32,
    sequence: u64,
    node: RouteNode,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct Search {
    cost: f32,
    /// Nodes from the first hop to `Goal`, each with the link that reached it.
    chain: Vec<(RouteNode, Link)>,
}

pub struct CrossRoomRouter<'a> {
    map: &'a MapGrid,
    sectors: &'a SectorMap,
    config: &'a NavConfig,
    goal_tables: RefCell<FxHashMap<RoomId, Option<DistanceTable>>>,
    goal_cells: Vec<WorldCoord>,
}

impl<'a> CrossRoomRouter<'a> {
    pub fn new(map: &'a MapGrid, sectors: &'a SectorMap, config: &'a NavConfig) -> Self {
        Self {
            map,
            sectors,
            config,
            goal_tables: RefCell::new(FxHashMap::default()),
            goal_cells: Vec::new(),
        }
    }

    /// Shortest known walking time from `from` to the nearest goal endpoint,
    /// or `f32::INFINITY`.
    pub fn distance<G: Goal + ?Sized>(&mut self, from: WorldCoord, goal: &G) -> f32 {
        self.search(from, goal).map_or(f32::INFINITY, |s| s.cost)
    }

    /// The cheapest route, materialized.
    pub fn route<G: Goal + ?Sized>(&mut self, from: WorldCoord, goal: &G) -> Option<Route> {
        let search = self.search(from, goal)?;
        self.materialize(from, &search)
    }

    fn reset_goal<G: Goal + ?Sized>(&mut self, from: WorldCoord, goal: &G) -> bool {
        self.goal_tables.borrow_mut().clear();
        self.goal_cells.clear();
        let Some(sector) = self.sectors.sector_of(from) else {
            return false;
        };
        self.goal_cells.extend(
            goal.endpoints()
                .iter()
                .copied()
                .filter(|&e| self.sectors.sector_of(e) == Some(sector)),
        );
        !self.goal_cells.is_empty()
    }

    /// Distance from `local` in `room` to the nearest goal endpoint in that
    /// room.
    fn goal_cost(&self, room: &RoomGraph, local: GridCoord) -> f32 {
        let mut tables = self.goal_tables.borrow_mut();
        let table = tables.entry(room.id()).or_insert_with(|| {
            let endpoints: Vec<GridCoord> = self
                .goal_cells
                .iter()
                .filter_map(|&e| room.to_local(e))
                .collect();
            (!endpoints.is_empty()).then(|| room.create_gscore_table(endpoints))
        });
        table.as_ref().map_or(f32::INFINITY, |t| t.get(local))
    }

    fn goal_path(&self, room: &RoomGraph, local: GridCoord) -> Option<Vec<GridCoord>> {
        self.goal_cost(room, local);
        let tables = self.goal_tables.borrow();
        let table = tables.get(&room.id())?.as_ref()?;
        room.descend(table, local).map(|p| p.cells)
    }

    /// The walk from one end of `connector` to another port of the same
    /// room, from the hop cache when the cached path still holds.
    fn hop(&self, connector: &Connector, from: End, room: &RoomGraph, to: ConnectorId, to_end: End) -> Option<Hop> {
        if let Some(hop) = connector.cached_hop(room, from, to, to_end) {
            return Some(hop);
        }
        let table = room.connector_table(to, to_end)?;
        let start = room.to_local(connector.end(from))?;
        let path = room.descend(&table, start)?;
        let hop = Hop {
            cost: path.cost,
            path: path.cells,
        };
        connector.store_hop(room, from, to, to_end, hop.clone());
        Some(hop)
    }

    fn is_open(&self, id: ConnectorId) -> bool {
        self.map.connector(id).is_some_and(|c| !c.is_locked())
    }

    fn search<G: Goal + ?Sized>(&mut self, from: WorldCoord, goal: &G) -> Option<Search> {
        if !self.reset_goal(from, goal) {
            return None;
        }
        let map = self.map;
        let (start_room, start_local) = map.locate(from)?;

        let mut best: BTreeMap<RouteNode, (f32, Link)> = BTreeMap::new();
        let mut frontier = BinaryHeap::new();
        let mut sequence = 0u64;
        let mut relax = |best: &mut BTreeMap<RouteNode, (f32, Link)>,
                         frontier: &mut BinaryHeap<Frontier>,
                         node: RouteNode,
                         cost: f32,
                         link: Link| {
            if !cost.is_finite() {
                return;
            }
            if best.get(&node).is_some_and(|&(known, _)| known <= cost) {
                return;
            }
            best.insert(node, (cost, link));
            frontier.push(Frontier {
                cost,
                sequence,
                node,
            });
            sequence += 1;
        };

        for ((id, end), _) in start_room.ports() {
            if self.is_open(id) {
                let cost = start_room.connector_distance(start_local, id, end);
                relax(&mut best, &mut frontier, RouteNode::Port(id, end), cost, Link::Start);
            }
        }
        let direct = self.goal_cost(start_room, start_local);
        relax(&mut best, &mut frontier, RouteNode::Goal, direct, Link::Start);

        let mut pops = 0;
        while let Some(Frontier { cost, node, .. }) = frontier.pop() {
            if best.get(&node).is_some_and(|&(known, _)| known < cost) {
                continue;
            }
            pops += 1;
            if pops > self.config.router_max_pops {
                warn!(%from, pops, "router pop budget exhausted");
                return None;
            }
            let RouteNode::Port(id, end) = node else {
                return Some(Search {
                    cost,
                    chain: unwind(&best),
                });
            };
            let Some(connector) = map.connector(id) else {
                continue;
            };

            if let Some(crossing) = map.crossing_cost(id, self.config.stair_cost_multiplier) {
                relax(
                    &mut best,
                    &mut frontier,
                    RouteNode::Port(id, end.other()),
                    cost + crossing,
                    Link::Cross(node),
                );
            }

            let Some((room, local)) = map.locate(connector.end(end)) else {
                continue;
            };
            for ((next, next_end), _) in room.ports() {
                if (next, next_end) == (id, end) || !self.is_open(next) {
                    continue;
                }
                if let Some(hop) = self.hop(connector, end, room, next, next_end) {
                    relax(
                        &mut best,
                        &mut frontier,
                        RouteNode::Port(next, next_end),
                        cost + hop.cost,
                        Link::Walk(node),
                    );
                }
            }
            let to_goal = self.goal_cost(room, local);
            relax(&mut best, &mut frontier, RouteNode::Goal, cost + to_goal, Link::Walk(node));
        }
        None
    }

    fn port_cell(&self, node: RouteNode) -> Option<WorldCoord> {
        match node {
            RouteNode::Port(id, end) => self.map.connector(id).map(|c| c.end(end)),
            RouteNode::Goal => None,
        }
    }

    /// Cells walked from `at` to reach `node` inside `at`'s room, excluding
    /// `at` itself.
    fn walk(&self, at: WorldCoord, from_port: Option<RouteNode>, node: RouteNode) -> Option<Vec<WorldCoord>> {
        let (room, local) = self.map.locate(at)?;
        let cells = match (from_port, node) {
            (_, RouteNode::Goal) => self.goal_path(room, local)?,
            (Some(RouteNode::Port(id, end)), RouteNode::Port(next, next_end)) => {
                let connector = self.map.connector(id)?;
                self.hop(connector, end, room, next, next_end)?.path
            }
            (_, RouteNode::Port(next, next_end)) => {
                let table = room.connector_table(next, next_end)?;
                room.descend(&table, local)?.cells
            }
        };
        Some(cells.into_iter().skip(1).map(|c| room.to_world(c)).collect())
    }

    fn materialize(&self, from: WorldCoord, search: &Search) -> Option<Route> {
        let mut steps = Vec::new();
        let mut legs: Vec<RouteLeg> = Vec::new();
        let mut at = from;
        let mut previous: Option<RouteNode> = None;
        let mut leg_start = from;

        for &(node, link) in &search.chain {
            match link {
                Link::Cross(_) => {
                    let RouteNode::Port(id, _) = node else {
                        return None;
                    };
                    let target = self.port_cell(node)?;
                    legs.push(RouteLeg {
                        room: self.map.room_id_of(leg_start)?,
                        from: leg_start,
                        to: at,
                        exit: Some(id),
                    });
                    steps.push(RouteStep {
                        at: target,
                        via: StepVia::Cross(id),
                    });
                    at = target;
                    leg_start = target;
                }
                Link::Start | Link::Walk(_) => {
                    for cell in self.walk(at, previous, node)? {
                        steps.push(RouteStep {
                            at: cell,
                            via: StepVia::Walk,
                        });
                        at = cell;
                    }
                }
            }
            previous = Some(node);
        }
        legs.push(RouteLeg {
            room: self.map.room_id_of(leg_start)?,
            from: leg_start,
            to: at,
            exit: None,
        });

        let capacity = self.config.route_buffer_capacity;
        let truncated = steps.len() > capacity;
        steps.truncate(capacity);
        Some(Route {
            cost: search.cost,
            steps,
            legs,
            truncated,
        })
    }
}

/// Follow predecessor links back from the goal.
fn unwind(best: &BTreeMap<RouteNode, (f32, Link)>) -> Vec<(RouteNode, Link)> {
    let mut chain = Vec::new();
    let mut node = RouteNode::Goal;
    // Each node appears at most once on a shortest-path chain.
    for _ in 0..=best.len() {
        let Some(&(_, link)) = best.get(&node) else {
            break;
        };
        chain.push((node, link));
        match link {
            Link::Start => break,
            Link::Walk(prev) | Link::Cross(prev) => node = prev,
        }
    }
    chain.reverse();
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::{PointGoal, RegionGoal};
    use crate::map::tests::rect;

    struct Fixture {
        map: MapGrid,
        sectors: SectorMap,
        config: NavConfig,
        door: ConnectorId,
    }

    impl Fixture {
        fn two_rooms() -> Self {
            let config = NavConfig::default();
            let mut map = MapGrid::new(&config);
            map.add_cells(rect(0, 0, 0, 4, 4), true).unwrap();
            map.add_cells(rect(4, 0, 0, 4, 4), true).unwrap();
            let (door, _) = map
                .add_connector(WorldCoord::new(3, 2, 0), WorldCoord::new(4, 2, 0))
                .unwrap();
            let sectors = SectorMap::build(&map);
            Self {
                map,
                sectors,
                config,
                door,
            }
        }

        fn resettle(&mut self) {
            self.sectors = SectorMap::build(&self.map);
        }

        fn router(&self) -> CrossRoomRouter<'_> {
            CrossRoomRouter::new(&self.map, &self.sectors, &self.config)
        }
    }

    #[test]
    fn distance_between_rooms_goes_through_door() {
        let f = Fixture::two_rooms();
        let from = WorldCoord::new(0, 0, 0);
        let to = WorldCoord::new(7, 3, 0);
        let distance = f.router().distance(from, &PointGoal::new(to));

        let (left, left_local) = f.map.locate(from).unwrap();
        let (right, right_local) = f.map.locate(to).unwrap();
        let expected = left.connector_distance(left_local, f.door, End::A)
            + 1.0
            + right.connector_distance(right_local, f.door, End::B);
        assert!((distance - expected).abs() < 1e-4, "{distance} vs {expected}");

        let route = f.router().route(from, &PointGoal::new(to)).unwrap();
        assert!(route.steps.contains(&RouteStep {
            at: WorldCoord::new(4, 2, 0),
            via: StepVia::Cross(f.door),
        }));
        assert_eq!(route.steps.last().map(|s| s.at), Some(to));
        assert_eq!(route.legs.len(), 2);
        assert_eq!(route.legs[0].exit, Some(f.door));
        assert_eq!(route.legs[0].to, WorldCoord::new(3, 2, 0));
        assert_eq!(route.legs[1].from, WorldCoord::new(4, 2, 0));
        assert!(!route.truncated);
    }

    #[test]
    fn locked_door_makes_other_room_unreachable() {
        let mut f = Fixture::two_rooms();
        f.map.set_locked(f.door, true).unwrap();
        let goal = PointGoal::new(WorldCoord::new(7, 3, 0));
        // Even with stale sectors the search itself refuses the door.
        assert_eq!(f.router().distance(WorldCoord::new(0, 0, 0), &goal), f32::INFINITY);
        f.resettle();
        assert_eq!(f.router().distance(WorldCoord::new(0, 0, 0), &goal), f32::INFINITY);
        assert!(f.router().route(WorldCoord::new(0, 0, 0), &goal).is_none());
    }

    #[test]
    fn same_room_goal_uses_direct_table() {
        let f = Fixture::two_rooms();
        let from = WorldCoord::new(0, 0, 0);
        let to = WorldCoord::new(2, 1, 0);
        let d = f.router().distance(from, &PointGoal::new(to));
        let (room, local) = f.map.locate(from).unwrap();
        let path = room.find_path(local, room.to_local(to).unwrap()).unwrap();
        assert!((d - path.cost).abs() < 1e-4);
    }

    #[test]
    fn region_goal_takes_nearest_endpoint() {
        let f = Fixture::two_rooms();
        let from = WorldCoord::new(0, 0, 0);
        let near = WorldCoord::new(1, 0, 0);
        let far = WorldCoord::new(7, 3, 0);
        let region = RegionGoal::new([near, far]);
        let d = f.router().distance(from, &region);
        assert!((d - 1.0).abs() < 1e-4);
    }

    #[test]
    fn stairs_cost_more_than_doors() {
        let config = NavConfig::default();
        let mut map = MapGrid::new(&config);
        map.add_cells(rect(0, 0, 0, 3, 3), true).unwrap();
        map.add_cells(rect(0, 0, 1, 3, 3), true).unwrap();
        map.add_connector(WorldCoord::new(2, 2, 0), WorldCoord::new(2, 2, 1))
            .unwrap();
        let sectors = SectorMap::build(&map);
        let mut router = CrossRoomRouter::new(&map, &sectors, &config);
        let d = router.distance(WorldCoord::new(2, 2, 0), &PointGoal::new(WorldCoord::new(2, 2, 1)));
        assert!((d - config.stair_cost_multiplier).abs() < 1e-4);
    }

    #[test]
    fn pop_budget_fails_closed() {
        let mut f = Fixture::two_rooms();
        f.config.router_max_pops = 1;
        let goal = PointGoal::new(WorldCoord::new(7, 3, 0));
        assert_eq!(f.router().distance(WorldCoord::new(0, 0, 0), &goal), f32::INFINITY);
    }

    #[test]
    fn route_buffer_truncates() {
        let mut f = Fixture::two_rooms();
        f.config.route_buffer_capacity = 2;
        let route = f
            .router()
            .route(WorldCoord::new(0, 0, 0), &PointGoal::new(WorldCoord::new(7, 3, 0)))
            .unwrap();
        assert_eq!(route.steps.len(), 2);
        assert!(route.truncated);
    }

    #[test]
    fn hop_cache_is_filled_and_reverified() {
        let config = NavConfig::default();
        let mut map = MapGrid::new(&config);
        map.add_cells(rect(0, 0, 0, 3, 3), true).unwrap();
        map.add_cells(rect(3, 0, 0, 5, 3), true).unwrap();
        map.add_cells(rect(8, 0, 0, 3, 3), true).unwrap();
        let (first, _) = map
            .add_connector(WorldCoord::new(2, 1, 0), WorldCoord::new(3, 1, 0))
            .unwrap();
        map.add_connector(WorldCoord::new(7, 1, 0), WorldCoord::new(8, 1, 0))
            .unwrap();
        let sectors = SectorMap::build(&map);
        let from = WorldCoord::new(0, 1, 0);
        let goal = PointGoal::new(WorldCoord::new(10, 1, 0));
        let before = CrossRoomRouter::new(&map, &sectors, &config).distance(from, &goal);
        assert!(before.is_finite());
        assert!(map.connector(first).unwrap().cached_hop_count() > 0);

        // Slow the middle room; the cached hop is recomputed, not reused.
        for at in rect(3, 0, 0, 5, 3) {
            map.set_floor_speed(at, 0.5).unwrap();
        }
        let after = CrossRoomRouter::new(&map, &sectors, &config).distance(from, &goal);
        assert!(after > before + 1.0, "{before} -> {after}");
    }

    /// Three walled rooms in a row, doors at y = 2. With `table`, furniture
    /// in the middle room forces a detour around its footprint.
    fn corridor_of_rooms(config: &NavConfig, table: bool) -> MapGrid {
        let mut map = MapGrid::new(config);
        map.add_cells(rect(0, 0, 0, 3, 5), true).unwrap();
        map.add_cells(rect(3, 0, 0, 7, 5), true).unwrap();
        map.add_cells(rect(10, 0, 0, 3, 5), true).unwrap();
        map.add_connector(WorldCoord::new(2, 2, 0), WorldCoord::new(3, 2, 0))
            .unwrap();
        map.add_connector(WorldCoord::new(9, 2, 0), WorldCoord::new(10, 2, 0))
            .unwrap();
        if table {
            map.set_furniture(WorldCoord::new(6, 2, 0), Some(blocking())).unwrap();
        }
        map
    }

    fn blocking() -> crate::node::Obstruction {
        crate::node::Obstruction {
            blocks: true,
            speed_multiplier: 1.0,
        }
    }

    #[test]
    fn cleared_obstacle_shortens_cached_hops() {
        let config = NavConfig::default();
        let from = WorldCoord::new(1, 2, 0);
        let goal = PointGoal::new(WorldCoord::new(11, 2, 0));

        let mut map = corridor_of_rooms(&config, true);
        let sectors = SectorMap::build(&map);
        let detour = CrossRoomRouter::new(&map, &sectors, &config).distance(from, &goal);
        assert!(detour.is_finite());

        map.set_furniture(WorldCoord::new(6, 2, 0), None).unwrap();
        let sectors = SectorMap::build(&map);
        let after_clear = CrossRoomRouter::new(&map, &sectors, &config).distance(from, &goal);

        let fresh = corridor_of_rooms(&config, false);
        let fresh_sectors = SectorMap::build(&fresh);
        let shortest = CrossRoomRouter::new(&fresh, &fresh_sectors, &config).distance(from, &goal);

        assert!(after_clear < detour, "{detour} -> {after_clear}");
        assert!((after_clear - shortest).abs() < 1e-4, "{after_clear} vs {shortest}");
    }
}

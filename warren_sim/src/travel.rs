// Movement state for one travel action.
//
// Travel combines the two navigation layers the way they are meant to be
// used together:
//
// 1. The cross-room route (which connectors to take, in order) is requested
//    from the route worker on the first tick and polled on every tick after.
//    A result computed against an older map epoch is re-validated (every
//    step cell still traversable, every crossed connector still unlocked)
//    and re-requested if that fails.
// 2. Within a room, every step comes from an `IncrementalPathfinder` aimed
//    at the current leg's exit port (or, on the final leg, the goal cells).
//    It is repaired, not rebuilt, when the room changes under it.
//
// Crossing a connector takes its crossing cost in time and moves the
// character to the far end, starting the next leg. A step takes
// `edge cost * ticks_per_tile` ticks, at least one.
//
// Travel gives up (`Failed`) when the goal is unreachable, when the
// in-room pathfinder has no way forward, or after `max_route_requests`
// route requests. The task loop decides what to do next.
//
// See also: `character.rs` which owns one `Travel` per travel action,
// `warren_nav`'s `route_job.rs`, `router.rs` and `dlite.rs`.

use crate::action::ActionStatus;
use crate::config::ExecutionConfig;
use crate::types::WorldCoord;
use warren_nav::dlite::{IncrementalPathfinder, SyncOutcome};
use warren_nav::map::MapGrid;
use warren_nav::route_job::{RouteHandle, RoutePoll, RouteWorker};
use warren_nav::router::{Route, StepVia};
use warren_nav::{Goal, NavConfig, NavWorld, RegionGoal};

pub struct Travel {
    goal: RegionGoal,
    job: Option<RouteHandle>,
    route: Option<Route>,
    leg: usize,
    pathfinder: IncrementalPathfinder,
    leg_target: Vec<WorldCoord>,
    progress: f32,
    requests: u32,
}

/// A stale route is still usable if nothing on it has been blocked.
fn still_valid(route: &Route, map: &MapGrid) -> bool {
    route.steps.iter().all(|step| {
        let connector_open = match step.via {
            StepVia::Walk => true,
            StepVia::Cross(id) => map.connector(id).is_some_and(|c| !c.is_locked()),
        };
        connector_open && map.is_traversable(step.at)
    })
}

impl Travel {
    pub fn new(goal: Vec<WorldCoord>, config: &NavConfig) -> Self {
        Self {
            goal: RegionGoal::new(goal),
            job: None,
            route: None,
            leg: 0,
            pathfinder: IncrementalPathfinder::new(config),
            leg_target: Vec::new(),
            progress: 0.0,
            requests: 0,
        }
    }

    pub fn goal(&self) -> &RegionGoal {
        &self.goal
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    /// Advance one tick, moving `position` when a step completes.
    pub fn advance(
        &mut self,
        position: &mut WorldCoord,
        nav: &NavWorld,
        worker: &RouteWorker,
        exec: &ExecutionConfig,
    ) -> ActionStatus {
        if self.goal.endpoints().contains(position) {
            return ActionStatus::Done;
        }
        if self.goal.endpoints().is_empty() {
            return ActionStatus::Failed;
        }
        if let Some(status) = self.poll_route(*position, nav, worker, exec) {
            return status;
        }
        self.walk(position, nav, exec)
    }

    /// Make sure a route is in hand. `Some` ends the tick with that status.
    fn poll_route(
        &mut self,
        from: WorldCoord,
        nav: &NavWorld,
        worker: &RouteWorker,
        exec: &ExecutionConfig,
    ) -> Option<ActionStatus> {
        if self.route.is_some() {
            return None;
        }
        if self.job.is_none() {
            if self.requests >= exec.max_route_requests {
                return Some(ActionStatus::Failed);
            }
            self.requests += 1;
            self.job = Some(worker.submit(nav.snapshot(), from, self.goal.clone()));
        }
        let poll = match self.job.as_mut() {
            Some(handle) => handle.poll(nav.epoch()),
            None => return Some(ActionStatus::Pending),
        };
        match poll {
            RoutePoll::Pending => Some(ActionStatus::Pending),
            RoutePoll::Ready(Some(route)) => {
                self.accept(route);
                None
            }
            RoutePoll::Stale(Some(route)) if still_valid(&route, nav.map()) => {
                self.accept(route);
                None
            }
            RoutePoll::Stale(_) | RoutePoll::Taken => {
                self.job = None;
                Some(ActionStatus::Pending)
            }
            RoutePoll::Ready(None) => {
                self.job = None;
                Some(ActionStatus::Failed)
            }
        }
    }

    fn accept(&mut self, route: Route) {
        self.route = Some(route);
        self.leg = 0;
        self.job = None;
        self.leg_target.clear();
    }

    /// Forget the route; the next tick asks for a new one.
    fn invalidate(&mut self) -> ActionStatus {
        self.route = None;
        self.job = None;
        ActionStatus::Pending
    }

    fn tick_toward(&mut self, cost: f32, exec: &ExecutionConfig) -> bool {
        self.progress += 1.0;
        if self.progress >= (cost * exec.ticks_per_tile).max(1.0) {
            self.progress = 0.0;
            true
        } else {
            false
        }
    }

    fn walk(&mut self, position: &mut WorldCoord, nav: &NavWorld, exec: &ExecutionConfig) -> ActionStatus {
        let map = nav.map();
        let Some(leg) = self.route.as_ref().and_then(|r| r.legs.get(self.leg)).cloned() else {
            return self.invalidate();
        };

        if let Some(exit) = leg.exit
            && *position == leg.to
        {
            let far = map
                .connector(exit)
                .and_then(|c| c.end_at(*position).map(|end| c.end(end.other())));
            let cost = map.crossing_cost(exit, nav.config().stair_cost_multiplier);
            let (Some(far), Some(cost)) = (far, cost) else {
                return self.invalidate();
            };
            if self.tick_toward(cost, exec) {
                *position = far;
                self.leg += 1;
            }
            return ActionStatus::Pending;
        }

        let Some((room, local)) = map.locate(*position) else {
            return ActionStatus::Failed;
        };
        let targets: Vec<WorldCoord> = match leg.exit {
            Some(_) => vec![leg.to],
            None => self.goal.endpoints().to_vec(),
        };
        if !targets.iter().any(|&t| room.contains(t)) {
            // The rooms were restructured since the route was computed.
            return self.invalidate();
        }
        if self.leg_target != targets || self.pathfinder.room() != Some(room.id()) {
            self.pathfinder
                .set_goal(room, *position, &RegionGoal::new(targets.iter().copied()));
            self.leg_target = targets;
        } else if self.pathfinder.sync(room, *position) == SyncOutcome::OutOfRoom {
            return ActionStatus::Failed;
        }
        self.pathfinder.establish_pathing(room);

        let Some(next) = self.pathfinder.next_step(room, local) else {
            return ActionStatus::Failed;
        };
        let cost = room.edge_cost(local, next).unwrap_or(1.0);
        if self.tick_toward(cost, exec) {
            *position = room.to_world(next);
        }
        ActionStatus::Pending
    }
}

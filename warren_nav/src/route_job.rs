// Asynchronous route materialization.
//
// Materializing a cross-room route is the one navigation query that runs off
// the scheduling step. A `RouteWorker` owns an optional rayon pool; `submit`
// hands it a `NavSnapshot` (reference-counted map and sectors plus the epoch
// they were settled at) and returns a `RouteHandle`. The job writes its
// result once into a shared `OnceLock` slot; the requester polls the handle
// every tick and takes the result when it is there.
//
// Jobs cannot be cancelled. A result computed against an epoch older than
// the requester's current one is reported as `Stale` so the caller can
// re-validate or re-request; dropping a handle simply discards the result.
//
// With zero worker threads the route is computed inline during `submit`,
// which keeps tests and deterministic headless runs single-threaded.
//
// See also: `router.rs` for the search itself, `world.rs` which produces
// snapshots.

use crate::config::NavConfig;
use crate::error::{NavError, Result};
use crate::goal::Goal;
use crate::map::MapGrid;
use crate::router::{CrossRoomRouter, Route};
use crate::sector::SectorMap;
use crate::types::WorldCoord;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// An immutable view of the navigation state at one settle epoch.
#[derive(Clone, Debug)]
pub struct NavSnapshot {
    pub map: Arc<MapGrid>,
    pub sectors: Arc<SectorMap>,
    pub config: Arc<NavConfig>,
    pub epoch: u64,
}

impl NavSnapshot {
    pub fn router(&self) -> CrossRoomRouter<'_> {
        CrossRoomRouter::new(&self.map, &self.sectors, &self.config)
    }
}

/// Outcome of polling a route job.
#[derive(Clone, Debug, PartialEq)]
pub enum RoutePoll {
    Pending,
    /// Computed against the current epoch. `None` means unreachable.
    Ready(Option<Route>),
    /// Computed against an older epoch; the map has changed since.
    Stale(Option<Route>),
    /// The result was already taken.
    Taken,
}

pub struct RouteHandle {
    slot: Arc<OnceLock<Option<Route>>>,
    epoch: u64,
    taken: bool,
}

impl RouteHandle {
    pub fn is_complete(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Epoch of the snapshot the job runs against.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Take the result if the job has finished.
    pub fn poll(&mut self, current_epoch: u64) -> RoutePoll {
        if self.taken {
            return RoutePoll::Taken;
        }
        let Some(result) = self.slot.get() else {
            return RoutePoll::Pending;
        };
        self.taken = true;
        if self.epoch == current_epoch {
            RoutePoll::Ready(result.clone())
        } else {
            RoutePoll::Stale(result.clone())
        }
    }
}

pub struct RouteWorker {
    pool: Option<rayon::ThreadPool>,
}

impl RouteWorker {
    pub fn new(threads: usize) -> Result<Self> {
        let pool = if threads == 0 {
            None
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("route-worker-{i}"))
                .build()
                .map_err(|e| NavError::WorkerPool(e.to_string()))?;
            Some(pool)
        };
        Ok(Self { pool })
    }

    pub fn is_inline(&self) -> bool {
        self.pool.is_none()
    }

    pub fn submit<G>(&self, snapshot: NavSnapshot, from: WorldCoord, goal: G) -> RouteHandle
    where
        G: Goal + Send + 'static,
    {
        let slot = Arc::new(OnceLock::new());
        let epoch = snapshot.epoch;
        debug!(%from, epoch, inline = self.is_inline(), "route job submitted");
        let job = {
            let slot = Arc::clone(&slot);
            move || {
                let route = snapshot.router().route(from, &goal);
                debug!(
                    %from,
                    epoch,
                    found = route.is_some(),
                    "route job finished"
                );
                // The slot is written exactly once, here.
                let _ = slot.set(route);
            }
        };
        match &self.pool {
            Some(pool) => pool.spawn(job),
            None => job(),
        }
        RouteHandle {
            slot,
            epoch,
            taken: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::PointGoal;
    use crate::map::tests::rect;

    fn snapshot(epoch: u64) -> NavSnapshot {
        let config = NavConfig::default();
        let mut map = MapGrid::new(&config);
        map.add_cells(rect(0, 0, 0, 4, 4), true).unwrap();
        map.add_cells(rect(4, 0, 0, 4, 4), true).unwrap();
        map.add_connector(WorldCoord::new(3, 2, 0), WorldCoord::new(4, 2, 0))
            .unwrap();
        let sectors = SectorMap::build(&map);
        NavSnapshot {
            map: Arc::new(map),
            sectors: Arc::new(sectors),
            config: Arc::new(config),
            epoch,
        }
    }

    #[test]
    fn inline_job_is_ready_immediately() {
        let worker = RouteWorker::new(0).unwrap();
        let mut handle = worker.submit(
            snapshot(3),
            WorldCoord::new(0, 0, 0),
            PointGoal::new(WorldCoord::new(7, 3, 0)),
        );
        assert!(handle.is_complete());
        match handle.poll(3) {
            RoutePoll::Ready(Some(route)) => assert!(route.cost.is_finite()),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(handle.poll(3), RoutePoll::Taken);
    }

    #[test]
    fn result_from_older_epoch_is_stale() {
        let worker = RouteWorker::new(0).unwrap();
        let mut handle = worker.submit(
            snapshot(1),
            WorldCoord::new(0, 0, 0),
            PointGoal::new(WorldCoord::new(7, 3, 0)),
        );
        assert!(matches!(handle.poll(2), RoutePoll::Stale(Some(_))));
    }

    #[test]
    fn pooled_job_completes() {
        let worker = RouteWorker::new(1).unwrap();
        let mut handle = worker.submit(
            snapshot(0),
            WorldCoord::new(0, 0, 0),
            PointGoal::new(WorldCoord::new(7, 3, 0)),
        );
        let mut result = RoutePoll::Pending;
        for _ in 0..1000 {
            result = handle.poll(0);
            if result != RoutePoll::Pending {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(matches!(result, RoutePoll::Ready(Some(_))));
    }
}

// Navigation tuning parameters.
//
// `NavConfig` groups every tunable the navigation layer reads: search
// budgets, cache sizes, float tolerances and worker pool sizing. It is
// plain serde data, embedded in the simulation's `GameConfig` and loadable
// on its own from JSON for tools and benchmarks.
//
// See also: `world.rs` which owns a `NavConfig`, `router.rs` (pop budget,
// stair multiplier, buffer capacity), `dlite.rs` (tolerance, heuristic
// scaling), `route_job.rs` (thread count).
//
// **Critical constraint: determinism.** Every client must run with the same
// values; none of these are read from the environment.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Maximum frontier pops before the cross-room router gives up and
    /// reports the destination unreachable.
    pub router_max_pops: u32,
    /// Number of point-of-interest distance tables each room keeps.
    pub poi_cache_capacity: usize,
    /// Tolerance used when comparing D*-Lite scores and keys.
    pub dlite_epsilon: f32,
    /// Upper bound on any cell's speed multiplier. Heuristics divide by this
    /// so they never overestimate; faster floors are clamped to it.
    pub max_speed_multiplier: f32,
    /// Crossing-cost multiplier for stair connectors.
    pub stair_cost_multiplier: f32,
    /// Maximum number of steps a materialized route carries.
    pub route_buffer_capacity: usize,
    /// Threads in the route worker pool. `0` computes routes inline on
    /// submission, which keeps tests and headless runs deterministic.
    pub route_worker_threads: usize,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            router_max_pops: 1000,
            poi_cache_capacity: 3,
            dlite_epsilon: 1e-4,
            max_speed_multiplier: 2.0,
            stair_cost_multiplier: 2.0,
            route_buffer_capacity: 512,
            route_worker_threads: 2,
        }
    }
}

impl NavConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Inverse of the fastest possible cell; the cost of one tile of
    /// straight movement on the fastest floor.
    pub fn min_inverse_speed(&self) -> f32 {
        1.0 / self.max_speed_multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = NavConfig::from_json(r#"{ "router_max_pops": 50 }"#).unwrap();
        assert_eq!(config.router_max_pops, 50);
        assert_eq!(config.poi_cache_capacity, 3);
        assert_eq!(config.route_buffer_capacity, 512);
    }

    #[test]
    fn json_roundtrip() {
        let config = NavConfig {
            route_worker_threads: 0,
            ..NavConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(NavConfig::from_json(&json).unwrap(), config);
    }
}

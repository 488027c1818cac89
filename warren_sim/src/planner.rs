// Utility planner: anytime best-first search over task chains.
//
// Each character owns one `UtilityPlanner`. It searches chains of up to
// `max_depth` tasks for the best average reward, `accumulated utility /
// accumulated time`, so short efficient plans beat long low-value ones.
//
// Search state is an arena of `PlanNode`s (each holding its parent index,
// the task choice, the predicted `WorldState` after the chain so far, and
// the running utility and time) plus a max-heap frontier keyed by score.
// `restart` seeds one depth-1 node per applicable task; every call to
// `step` pops the best frontier node and adds one child per task applicable
// in its predicted state. The best node ever seen is tracked separately;
// `best_chain` walks its parents back to the root.
//
// Scoring folds in two things beyond the plain ratio:
// - risk: a task's utility is `p * utility + (1 - p) * failure_utility`
//   with `p` and the failure utility from its `TaskTuning`;
// - payoff: a task may name a follow-up task (fetching food names eating).
//   When a node is scored, the follow-up is evaluated in the node's
//   predicted state and its utility and time are folded in if it applies
//   and raises the ratio. A follow-up that fails the test is dropped from
//   the node.
//
// `get_task` hands out the head of the best chain (re-checked against the
// real state; if it no longer applies the planner restarts from the real
// state and takes the best depth-1 task, which always exists because wait
// is always applicable) and then restarts the search from the state that
// head task is predicted to produce. `override_task` restarts the same way
// from an externally chosen task.
//
// Target resolution (nearest unclaimed interactable, nearest other
// character) goes through `PlanContext::resolve` and is cached per
// (task kind, position) until the next restart.
//
// See also: `task.rs` for the task catalogue, `character.rs` which steps
// the planner once per tick and asks it for tasks, `config.rs` for
// `PlannerConfig` and `TaskTuning`.
//
// **Critical constraint: determinism.** Frontier ties break on insertion
// sequence, children are generated in catalogue order, and a later node
// only replaces the best node if its score is strictly higher. Targets tie
// on ID order.

use crate::config::{GameConfig, PlannerConfig};
use crate::interactable::Interactable;
use crate::task::{Target, TargetNeed, TargetRef, Task, TaskCatalogue, TaskChoice};
use crate::types::{CharacterId, InteractableId, TaskKind, WorldCoord};
use crate::world_state::WorldState;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use tracing::{debug, trace};
use warren_nav::{Goal, NavWorld, RegionGoal};

/// Everything a planner may read about the world outside its character.
pub struct PlanContext<'a> {
    pub me: CharacterId,
    pub config: &'a GameConfig,
    pub nav: &'a NavWorld,
    pub interactables: &'a BTreeMap<InteractableId, Interactable>,
    /// Other characters and where they stand.
    pub others: &'a [(CharacterId, WorldCoord)],
    pub catalogue: &'a TaskCatalogue,
}

impl PlanContext<'_> {
    /// Resolve a target need from `from`, uncached. Nearest by router
    /// distance; unreachable candidates are skipped.
    pub fn resolve(&self, need: TargetNeed, from: WorldCoord) -> Option<Target> {
        let candidates: Vec<(TargetRef, Vec<WorldCoord>)> = match need {
            TargetNeed::None | TargetNeed::Fixed => return None,
            TargetNeed::Interactable(kind) => self
                .interactables
                .values()
                .filter(|i| i.kind == kind && i.is_available_to(self.me))
                .map(|i| (TargetRef::Interactable(i.id), i.interaction_points.clone()))
                .collect(),
            TargetNeed::Partner => self
                .others
                .iter()
                .map(|&(id, at)| {
                    let near = conversation_ring(at)
                        .filter(|&c| self.nav.map().is_traversable(c))
                        .collect();
                    (TargetRef::Character(id), near)
                })
                .collect(),
        };

        let mut router = self.nav.router();
        let mut best: Option<Target> = None;
        for (what, points) in candidates {
            if points.is_empty() {
                continue;
            }
            let goal = RegionGoal::new(points);
            let distance = router.distance(from, &goal);
            if !distance.is_finite() || best.as_ref().is_some_and(|b| b.distance <= distance) {
                continue;
            }
            let approach = goal
                .endpoints()
                .iter()
                .copied()
                .min_by(|a, b| {
                    from.euclidean_distance(*a)
                        .total_cmp(&from.euclidean_distance(*b))
                        .then_with(|| a.cmp(b))
                })
                .unwrap_or(from);
            best = Some(Target {
                what,
                points: goal.endpoints().to_vec(),
                approach,
                distance,
            });
        }
        best
    }
}

/// Cells a conversation partner of someone at `at` may stand on: the ring
/// two tiles out, which stays clear of an idle character's footprint.
pub fn conversation_ring(at: WorldCoord) -> impl Iterator<Item = WorldCoord> {
    (-CHAT_RANGE..=CHAT_RANGE).flat_map(move |dy| {
        (-CHAT_RANGE..=CHAT_RANGE)
            .filter(move |dx| dx.abs().max(dy.abs()) == CHAT_RANGE)
            .map(move |dx| at.offset(dx, dy))
    })
}

/// Chebyshev distance at which two characters can talk.
pub const CHAT_RANGE: i32 = 2;

/// Utility, time and predicted successor state of doing `task` in `state`.
fn evaluate(
    task: &dyn Task,
    state: &WorldState,
    target: Option<&Target>,
    config: &GameConfig,
) -> (f32, f32, WorldState) {
    let tuning = config.tuning(task.kind());
    let p = tuning.success_probability.clamp(0.0, 1.0);
    let utility = p * task.utility(state, &tuning) + (1.0 - p) * tuning.failure_utility;
    let travel = target.map_or(0.0, |t| t.distance * config.execution.ticks_per_tile);
    let time = (travel + tuning.duration).max(config.planner.min_task_time);

    let mut next = state.clone();
    next.drift(&config.needs, time);
    if let Some(t) = target {
        next.position = t.approach;
    }
    task.apply(&mut next);
    (utility, time, next)
}

/// The state `choice` is predicted to leave behind.
pub fn predict(choice: &TaskChoice, state: &WorldState, ctx: &PlanContext<'_>) -> WorldState {
    match ctx.catalogue.get(choice.kind) {
        Some(task) => evaluate(task, state, choice.target.as_ref(), ctx.config).2,
        None => state.clone(),
    }
}

#[derive(Clone, Debug)]
struct PlanNode {
    parent: Option<usize>,
    choice: TaskChoice,
    depth: u32,
    state: WorldState,
    utility: f32,
    time: f32,
    payoff: Option<TaskKind>,
    score: f32,
}

/// Frontier entry; the heap pops the highest score, oldest first on ties.
struct Frontier {
    score: f32,
    sequence: u64,
    node: usize,
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
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

pub struct UtilityPlanner {
    max_depth: u32,
    start: WorldState,
    nodes: Vec<PlanNode>,
    open: BinaryHeap<Frontier>,
    best: Option<usize>,
    targets: FxHashMap<(TaskKind, WorldCoord), Option<Target>>,
    next_sequence: u64,
    expansions: u64,
}

impl UtilityPlanner {
    /// An idle planner. Call `restart` to seed the search.
    pub fn new(start: WorldState, config: &PlannerConfig) -> Self {
        Self {
            max_depth: config.max_depth.max(1),
            start,
            nodes: Vec::new(),
            open: BinaryHeap::new(),
            best: None,
            targets: FxHashMap::default(),
            next_sequence: 0,
            expansions: 0,
        }
    }

    pub fn start_state(&self) -> &WorldState {
        &self.start
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Expansions since the last restart.
    pub fn expansions(&self) -> u64 {
        self.expansions
    }

    pub fn is_exhausted(&self) -> bool {
        self.open.is_empty()
    }

    pub fn best_score(&self) -> Option<f32> {
        self.best.map(|i| self.nodes[i].score)
    }

    /// The best chain found so far, head first.
    pub fn best_chain(&self) -> Vec<TaskChoice> {
        let mut chain = Vec::new();
        let mut at = self.best;
        while let Some(i) = at {
            chain.push(self.nodes[i].choice.clone());
            at = self.nodes[i].parent;
        }
        chain.reverse();
        chain
    }

    /// Discard the search and seed it again from `start`.
    pub fn restart(&mut self, start: WorldState, ctx: &PlanContext<'_>) {
        self.start = start;
        self.nodes.clear();
        self.open.clear();
        self.best = None;
        self.targets.clear();
        self.expansions = 0;
        self.expand(None, ctx);
        debug!(
            character = %ctx.me,
            seeds = self.nodes.len(),
            best = ?self.best_chain().first().map(|c| c.kind),
            "planner restarted"
        );
    }

    /// One expansion. Returns `false` once the frontier is empty.
    pub fn step(&mut self, ctx: &PlanContext<'_>) -> bool {
        let Some(top) = self.open.pop() else {
            return false;
        };
        self.expansions += 1;
        trace!(
            character = %ctx.me,
            node = top.node,
            depth = self.nodes[top.node].depth,
            score = top.score,
            "planner expansion"
        );
        self.expand(Some(top.node), ctx);
        true
    }

    fn target_for(&mut self, task: &dyn Task, at: WorldCoord, ctx: &PlanContext<'_>) -> Option<Target> {
        let need = task.target_need();
        if matches!(need, TargetNeed::None | TargetNeed::Fixed) {
            return None;
        }
        self.targets
            .entry((task.kind(), at))
            .or_insert_with(|| ctx.resolve(need, at))
            .clone()
    }

    fn expand(&mut self, parent: Option<usize>, ctx: &PlanContext<'_>) {
        let (state, depth, utility, time) = match parent {
            Some(i) => {
                let n = &self.nodes[i];
                (n.state.clone(), n.depth, n.utility, n.time)
            }
            None => (self.start.clone(), 0, 0.0, 0.0),
        };
        for task in ctx.catalogue.iter() {
            // Directives carry their own target and are never planned.
            if task.target_need() == TargetNeed::Fixed {
                continue;
            }
            let target = self.target_for(task, state.position, ctx);
            if !task.applicable(&state, target.as_ref()) {
                continue;
            }
            let (u, t, next) = evaluate(task, &state, target.as_ref(), ctx.config);
            let mut node = PlanNode {
                parent,
                choice: TaskChoice {
                    kind: task.kind(),
                    target,
                },
                depth: depth + 1,
                state: next,
                utility: utility + u,
                time: time + t,
                payoff: task.payoff(),
                score: 0.0,
            };
            node.score = self.score(&mut node, ctx);

            let index = self.nodes.len();
            let (score, expandable) = (node.score, node.depth < self.max_depth);
            self.nodes.push(node);
            if expandable {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                self.open.push(Frontier {
                    score,
                    sequence,
                    node: index,
                });
            }
            if self.best.is_none_or(|b| score > self.nodes[b].score) {
                self.best = Some(index);
            }
        }
    }

    /// Utility per unit time, with the node's payoff folded in when it
    /// still applies and helps. A payoff that does not is dropped.
    fn score(&mut self, node: &mut PlanNode, ctx: &PlanContext<'_>) -> f32 {
        let base = node.utility / node.time;
        let Some(task) = node.payoff.and_then(|kind| ctx.catalogue.get(kind)) else {
            node.payoff = None;
            return base;
        };
        let target = self.target_for(task, node.state.position, ctx);
        if task.applicable(&node.state, target.as_ref()) {
            let (u, t, _) = evaluate(task, &node.state, target.as_ref(), ctx.config);
            let folded = (node.utility + u) / (node.time + t);
            if folded > base {
                return folded;
            }
        }
        node.payoff = None;
        base
    }

    /// Hand out the next task for a character in `real` and restart the
    /// search from the state that task should produce.
    pub fn get_task(&mut self, real: &WorldState, ctx: &PlanContext<'_>) -> TaskChoice {
        let head = self.best_chain().into_iter().next().and_then(|planned| {
            let task = ctx.catalogue.get(planned.kind)?;
            let target = self.target_for(task, real.position, ctx);
            task.applicable(real, target.as_ref()).then_some(TaskChoice {
                kind: planned.kind,
                target,
            })
        });
        let choice = match head {
            Some(choice) => choice,
            None => {
                self.restart(real.clone(), ctx);
                self.best
                    .map(|i| self.nodes[i].choice.clone())
                    .unwrap_or_else(TaskChoice::wait)
            }
        };
        debug!(character = %ctx.me, task = ?choice.kind, "task handed out");
        let next = predict(&choice, real, ctx);
        self.restart(next, ctx);
        choice
    }

    /// The character was put on `choice` from outside; plan onward from
    /// where it will leave them.
    pub fn override_task(&mut self, choice: &TaskChoice, real: &WorldState, ctx: &PlanContext<'_>) {
        debug!(character = %ctx.me, task = ?choice.kind, "task overridden");
        let next = predict(choice, real, ctx);
        self.restart(next, ctx);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::TaskTuning;
    use crate::types::InteractableKind;

    pub(crate) struct Fixture {
        pub config: GameConfig,
        pub nav: NavWorld,
        pub interactables: BTreeMap<InteractableId, Interactable>,
        pub catalogue: TaskCatalogue,
        pub others: Vec<(CharacterId, WorldCoord)>,
    }

    impl Fixture {
        /// A walled 8x6 room with a bed against the east wall and a food
        /// source in the north-west corner.
        pub(crate) fn new(config: GameConfig) -> Self {
            let mut nav = NavWorld::new(config.nav.clone());
            nav.edit(|e| e.add_room(WorldCoord::new(0, 0, 0), 8, 6).map(|_| ()))
                .unwrap();
            let mut interactables = BTreeMap::new();
            interactables.insert(
                InteractableId(0),
                Interactable {
                    id: InteractableId(0),
                    kind: InteractableKind::Bed,
                    position: WorldCoord::new(7, 3, 0),
                    interaction_points: vec![WorldCoord::new(6, 3, 0)],
                    claimed_by: None,
                },
            );
            interactables.insert(
                InteractableId(1),
                Interactable {
                    id: InteractableId(1),
                    kind: InteractableKind::FoodSource,
                    position: WorldCoord::new(0, 5, 0),
                    interaction_points: vec![WorldCoord::new(1, 4, 0)],
                    claimed_by: None,
                },
            );
            Self {
                config,
                nav,
                interactables,
                catalogue: TaskCatalogue::standard(),
                others: Vec::new(),
            }
        }

        pub(crate) fn ctx(&self) -> PlanContext<'_> {
            PlanContext {
                me: CharacterId(0),
                config: &self.config,
                nav: &self.nav,
                interactables: &self.interactables,
                others: &self.others,
                catalogue: &self.catalogue,
            }
        }
    }

    fn test_config() -> GameConfig {
        let mut config = GameConfig::default();
        config.nav.route_worker_threads = 0;
        config.tasks.insert(TaskKind::Eat, TaskTuning {
            weight: 10.0,
            duration: 40.0,
            success_probability: 1.0,
            failure_utility: 0.0,
        });
        config.tasks.insert(TaskKind::Sleep, TaskTuning {
            weight: 2.0,
            duration: 300.0,
            success_probability: 1.0,
            failure_utility: 0.0,
        });
        config
    }

    fn state(hunger: f32, fatigue: f32, has_food: bool) -> WorldState {
        WorldState {
            hunger,
            fatigue,
            has_food,
            ..WorldState::new(WorldCoord::new(2, 2, 0))
        }
    }

    #[test]
    fn hungry_with_food_prefers_eating_over_sleep() {
        let f = Fixture::new(test_config());
        let ctx = f.ctx();
        let mut planner = UtilityPlanner::new(state(9.0, 5.0, true), &f.config.planner);
        planner.restart(state(9.0, 5.0, true), &ctx);
        for _ in 0..40 {
            planner.step(&ctx);
        }
        let chain = planner.best_chain();
        assert_eq!(chain[0].kind, TaskKind::Eat);
        let choice = planner.get_task(&state(9.0, 5.0, true), &ctx);
        assert_eq!(choice.kind, TaskKind::Eat);
    }

    #[test]
    fn seeds_are_applicable_tasks_only() {
        let f = Fixture::new(test_config());
        let ctx = f.ctx();
        let mut planner = UtilityPlanner::new(state(1.0, 1.0, false), &f.config.planner);
        planner.restart(state(1.0, 1.0, false), &ctx);
        let kinds: Vec<TaskKind> = planner.nodes.iter().map(|n| n.choice.kind).collect();
        // No food carried, no partner, no seat: eat, chat, sit and farewell
        // are out.
        assert_eq!(kinds, vec![TaskKind::Wait, TaskKind::FetchFood, TaskKind::Sleep]);
        let bed = planner.nodes[2].choice.target.as_ref().unwrap();
        assert_eq!(bed.what, TargetRef::Interactable(InteractableId(0)));
        assert_eq!(bed.approach, WorldCoord::new(6, 3, 0));
    }

    #[test]
    fn partner_target_rings_the_other_character() {
        let mut f = Fixture::new(test_config());
        f.others.push((CharacterId(1), WorldCoord::new(5, 3, 0)));
        let ctx = f.ctx();
        let target = ctx.resolve(TargetNeed::Partner, WorldCoord::new(1, 1, 0)).unwrap();
        assert_eq!(target.what, TargetRef::Character(CharacterId(1)));
        assert!(!target.points.is_empty());
        for p in &target.points {
            assert_eq!((p.x - 5).abs().max((p.y - 3).abs()), CHAT_RANGE);
        }
        assert!(target.points.contains(&target.approach));
    }

    #[test]
    fn search_respects_depth_cap() {
        let mut config = test_config();
        config.planner.max_depth = 2;
        let f = Fixture::new(config);
        let ctx = f.ctx();
        let mut planner = UtilityPlanner::new(state(3.0, 3.0, false), &f.config.planner);
        planner.restart(state(3.0, 3.0, false), &ctx);
        let mut steps = 0;
        while planner.step(&ctx) {
            steps += 1;
            assert!(steps < 100);
        }
        assert!(planner.is_exhausted());
        assert!(planner.nodes.iter().all(|n| n.depth <= 2));
        assert!(planner.best_chain().len() <= 2);
    }

    #[test]
    fn fetching_food_folds_in_eating() {
        let f = Fixture::new(test_config());
        let ctx = f.ctx();
        let mut planner = UtilityPlanner::new(state(8.0, 0.0, false), &f.config.planner);
        planner.restart(state(8.0, 0.0, false), &ctx);
        let fetch = planner
            .nodes
            .iter()
            .find(|n| n.choice.kind == TaskKind::FetchFood)
            .unwrap();
        assert_eq!(fetch.payoff, Some(TaskKind::Eat));
        assert!(fetch.score > fetch.utility / fetch.time);
        // Waiting has no payoff to fold.
        let wait = &planner.nodes[0];
        assert_eq!(wait.payoff, None);
        assert!((wait.score - wait.utility / wait.time).abs() < 1e-6);
    }

    #[test]
    fn risky_task_discounts_utility() {
        let f = Fixture::new(test_config());
        let mut s = state(0.0, 0.0, false);
        s.loneliness = 5.0;
        let partner = Target::spot(WorldCoord::new(3, 2, 0));
        let (u, _, next) = evaluate(
            f.catalogue.get(TaskKind::Chat).unwrap(),
            &s,
            Some(&partner),
            &f.config,
        );
        let tuning = f.config.tuning(TaskKind::Chat);
        let expected = tuning.success_probability * tuning.weight * 5.0
            + (1.0 - tuning.success_probability) * tuning.failure_utility;
        assert!((u - expected).abs() < 1e-5);
        assert!(next.in_conversation);
        assert_eq!(next.position, WorldCoord::new(3, 2, 0));
    }

    #[test]
    fn identical_inputs_plan_identically() {
        let f = Fixture::new(test_config());
        let ctx = f.ctx();
        let run = || {
            let mut planner = UtilityPlanner::new(state(4.0, 6.0, false), &f.config.planner);
            planner.restart(state(4.0, 6.0, false), &ctx);
            for _ in 0..25 {
                planner.step(&ctx);
            }
            (planner.best_chain(), planner.node_count())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn handed_out_task_always_applies() {
        let f = Fixture::new(test_config());
        let ctx = f.ctx();
        let mut rng = fastrand::Rng::with_seed(11);
        let mut planner = UtilityPlanner::new(state(0.0, 0.0, false), &f.config.planner);
        planner.restart(state(0.0, 0.0, false), &ctx);
        for _ in 0..30 {
            let real = WorldState {
                hunger: rng.f32() * 10.0,
                fatigue: rng.f32() * 10.0,
                loneliness: rng.f32() * 10.0,
                has_food: rng.bool(),
                in_conversation: rng.bool(),
                position: WorldCoord::new(rng.i32(0..8), rng.i32(0..6), 0),
            };
            for _ in 0..rng.usize(0..10) {
                planner.step(&ctx);
            }
            let choice = planner.get_task(&real, &ctx);
            let task = f.catalogue.get(choice.kind).unwrap();
            assert!(task.applicable(&real, choice.target.as_ref()), "{choice:?}");
        }
    }

    #[test]
    fn override_restarts_from_predicted_state() {
        let f = Fixture::new(test_config());
        let ctx = f.ctx();
        let mut planner = UtilityPlanner::new(state(2.0, 2.0, false), &f.config.planner);
        let choice = TaskChoice::directive(WorldCoord::new(5, 5, 0));
        planner.override_task(&choice, &state(2.0, 2.0, false), &ctx);
        assert_eq!(planner.start_state().position, WorldCoord::new(5, 5, 0));
        assert!(planner.start_state().hunger > 2.0);
        assert!(planner.node_count() > 0);
    }
}

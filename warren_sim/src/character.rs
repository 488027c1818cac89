// Characters and their task execution loop.
//
// A `Character` owns its real `WorldState`, a `UtilityPlanner` that keeps
// searching in the background, and at most one active task. The scheduler
// calls `tick` once per sim tick, which:
//
// 1. drifts needs by one tick;
// 2. runs one planner expansion (restarting first if the character just
//    stopped blocking its cell, so targets are resolved from an open cell);
// 3. if a directive is pending, drops the current task for it;
// 4. if idle, starts the next task: a standing quest destination when one is
//    set and not yet reached, otherwise the planner's pick;
// 5. advances the front primitive action of the active task.
//
// When the last action finishes, the task's outcome is applied to the real
// state (eating clears hunger, fetching food puts food in hand) and its
// claim is released. When an action fails, the task re-resolves its target
// from where the character now stands and rebuilds its whole action queue;
// after `max_retries` failures (or when no target can be found) the task is
// abandoned for the wait task.
//
// A character waiting idly may block its cell for others. The scheduler
// decides that (see `SimState::update_blocking`); the character only
// reports where it idles.
//
// See also: `task.rs` (action lists), `travel.rs`, `planner.rs`, `sim.rs`
// which owns every character and builds the `TickEnv`.
//
// **Critical constraint: determinism.** Everything a tick reads comes from
// `TickEnv`, which the scheduler builds in character ID order.

use crate::action::{ActionStatus, InteractWith, PrimitiveAction};
use crate::config::{GameConfig, PlannerConfig};
use crate::event::{SimEvent, SimEventKind};
use crate::interactable::Interactable;
use crate::planner::{CHAT_RANGE, PlanContext, UtilityPlanner};
use crate::task::{TargetNeed, TargetRef, TaskCatalogue, TaskChoice};
use crate::travel::Travel;
use crate::types::{CharacterId, InteractableId, Stance, TaskKind, WorldCoord};
use crate::world_state::WorldState;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, warn};
use warren_nav::NavWorld;
use warren_nav::route_job::RouteWorker;

/// What one character's tick may read and touch.
pub struct TickEnv<'a> {
    pub tick: u64,
    pub config: &'a GameConfig,
    pub nav: &'a NavWorld,
    pub worker: &'a RouteWorker,
    pub catalogue: &'a TaskCatalogue,
    pub interactables: &'a mut BTreeMap<InteractableId, Interactable>,
    /// Every other character, in ID order.
    pub others: &'a [(CharacterId, WorldCoord)],
    pub events: &'a mut Vec<SimEvent>,
}

impl TickEnv<'_> {
    fn plan_context(&self, me: CharacterId) -> PlanContext<'_> {
        PlanContext {
            me,
            config: self.config,
            nav: self.nav,
            interactables: &*self.interactables,
            others: self.others,
            catalogue: self.catalogue,
        }
    }

    fn emit(&mut self, kind: SimEventKind) {
        self.events.push(SimEvent {
            tick: self.tick,
            kind,
        });
    }
}

fn chebyshev(a: WorldCoord, b: WorldCoord) -> i32 {
    (a.x - b.x).abs().max((a.y - b.y).abs())
}

/// Whether the target of an interact action can be used from `at` now.
fn can_interact(me: CharacterId, at: WorldCoord, with: InteractWith, env: &TickEnv<'_>) -> bool {
    match with {
        InteractWith::Interactable(id) => env
            .interactables
            .get(&id)
            .is_some_and(|i| i.is_available_to(me) && i.can_use_from(at)),
        InteractWith::Character(id) => env
            .others
            .iter()
            .any(|&(other, pos)| other == id && pos.z == at.z && chebyshev(pos, at) <= CHAT_RANGE),
    }
}

struct ActiveTask {
    choice: TaskChoice,
    actions: VecDeque<PrimitiveAction>,
    travel: Option<Travel>,
    wait_left: Option<u64>,
    claimed: Option<InteractableId>,
    failures: u32,
}

impl ActiveTask {
    /// Claim the target interactable, if any. `false` if someone else holds
    /// it or it is gone.
    fn claim(&mut self, me: CharacterId, interactables: &mut BTreeMap<InteractableId, Interactable>) -> bool {
        let Some(TargetRef::Interactable(id)) = self.choice.target.as_ref().map(|t| t.what) else {
            return true;
        };
        match interactables.get_mut(&id) {
            Some(i) if i.is_available_to(me) => {
                i.claimed_by = Some(me);
                self.claimed = Some(id);
                true
            }
            _ => false,
        }
    }

    fn release(&mut self, me: CharacterId, interactables: &mut BTreeMap<InteractableId, Interactable>) {
        if let Some(id) = self.claimed.take()
            && let Some(i) = interactables.get_mut(&id)
            && i.claimed_by == Some(me)
        {
            i.claimed_by = None;
        }
    }
}

pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub state: WorldState,
    pub stance: Stance,
    planner: UtilityPlanner,
    current: Option<ActiveTask>,
    quest: Option<WorldCoord>,
    directed: Option<WorldCoord>,
    blocking: Option<WorldCoord>,
    replan: bool,
}

impl Character {
    pub fn new(id: CharacterId, name: String, position: WorldCoord, config: &PlannerConfig) -> Self {
        let state = WorldState::new(position);
        Self {
            id,
            name,
            planner: UtilityPlanner::new(state.clone(), config),
            state,
            stance: Stance::default(),
            current: None,
            quest: None,
            directed: None,
            blocking: None,
            replan: true,
        }
    }

    pub fn position(&self) -> WorldCoord {
        self.state.position
    }

    pub fn current_task(&self) -> Option<TaskKind> {
        self.current.as_ref().map(|a| a.choice.kind)
    }

    pub fn current_choice(&self) -> Option<&TaskChoice> {
        self.current.as_ref().map(|a| &a.choice)
    }

    pub fn planner(&self) -> &UtilityPlanner {
        &self.planner
    }

    pub fn quest(&self) -> Option<WorldCoord> {
        self.quest
    }

    pub fn set_quest(&mut self, destination: Option<WorldCoord>) {
        self.quest = destination;
    }

    /// Send the character to `destination` on its next tick, dropping
    /// whatever it is doing.
    pub fn direct(&mut self, destination: WorldCoord) {
        self.directed = Some(destination);
    }

    /// The cell this character holds blocked, if any.
    pub fn blocking(&self) -> Option<WorldCoord> {
        self.blocking
    }

    pub fn set_blocking(&mut self, at: Option<WorldCoord>) {
        if self.blocking.is_some() && at.is_none() {
            self.replan = true;
        }
        self.blocking = at;
    }

    /// Where the character is idling, if it is.
    pub fn idle_spot(&self) -> Option<WorldCoord> {
        self.current
            .as_ref()
            .filter(|a| {
                a.choice.kind == TaskKind::Wait
                    && matches!(a.actions.front(), Some(PrimitiveAction::WaitFor { .. }))
            })
            .map(|_| self.state.position)
    }

    pub fn tick(&mut self, env: &mut TickEnv<'_>) {
        self.state.drift(&env.config.needs, 1.0);
        {
            let ctx = env.plan_context(self.id);
            if std::mem::take(&mut self.replan) {
                self.planner.restart(self.state.clone(), &ctx);
            }
            self.planner.step(&ctx);
        }

        if let Some(destination) = self.directed.take() {
            self.abandon(env);
            self.begin(TaskChoice::directive(destination), true, env);
        }
        if self.current.is_none() {
            self.pick_next(env);
        }
        self.advance(env);
    }

    fn pick_next(&mut self, env: &mut TickEnv<'_>) {
        if self.quest == Some(self.state.position) {
            self.quest = None;
        }
        match self.quest {
            Some(destination) => self.begin(TaskChoice::directive(destination), true, env),
            None => {
                let choice = {
                    let ctx = env.plan_context(self.id);
                    self.planner.get_task(&self.state, &ctx)
                };
                self.begin(choice, false, env);
            }
        }
    }

    /// Start `choice`. External choices restart the planner from the state
    /// they are predicted to produce; planner picks already did.
    fn begin(&mut self, choice: TaskChoice, external: bool, env: &mut TickEnv<'_>) {
        let catalogue = env.catalogue;
        let (choice, task) = match catalogue.get(choice.kind) {
            Some(task) => (choice, task),
            None => (TaskChoice::wait(), catalogue.fallback()),
        };
        if external {
            let ctx = env.plan_context(self.id);
            self.planner.override_task(&choice, &self.state, &ctx);
        }
        let tuning = env.config.tuning(choice.kind);
        let actions = task.actions(choice.target.as_ref(), &tuning);
        env.emit(SimEventKind::TaskStarted {
            character: self.id,
            task: choice.kind,
        });
        let mut active = ActiveTask {
            choice,
            actions: actions.into_iter().collect(),
            travel: None,
            wait_left: None,
            claimed: None,
            failures: 0,
        };
        let claimed = active.claim(self.id, env.interactables);
        self.current = Some(active);
        if !claimed {
            self.fail(env);
        }
    }

    /// Drop the current task without applying it.
    fn abandon(&mut self, env: &mut TickEnv<'_>) {
        if let Some(mut active) = self.current.take() {
            debug!(character = %self.id, task = ?active.choice.kind, "task abandoned");
            active.release(self.id, env.interactables);
        }
    }

    fn advance(&mut self, env: &mut TickEnv<'_>) {
        let me = self.id;
        let Some(active) = self.current.as_mut() else {
            return;
        };
        let Some(action) = active.actions.front() else {
            self.complete(env);
            return;
        };
        let status = match action {
            PrimitiveAction::TravelTo { goal } => {
                let travel = active
                    .travel
                    .get_or_insert_with(|| Travel::new(goal.clone(), &env.config.nav));
                let status = travel.advance(
                    &mut self.state.position,
                    env.nav,
                    env.worker,
                    &env.config.execution,
                );
                if status == ActionStatus::Done {
                    env.emit(SimEventKind::CharacterArrived {
                        character: me,
                        at: self.state.position,
                    });
                }
                status
            }
            PrimitiveAction::AssumeStance(stance) => {
                self.stance = *stance;
                ActionStatus::Done
            }
            PrimitiveAction::WaitFor { ticks } => {
                let left = active.wait_left.get_or_insert(*ticks);
                *left = left.saturating_sub(1);
                if *left == 0 {
                    ActionStatus::Done
                } else {
                    ActionStatus::Pending
                }
            }
            PrimitiveAction::Interact { with } => {
                if can_interact(me, self.state.position, *with, env) {
                    ActionStatus::Done
                } else {
                    ActionStatus::Failed
                }
            }
        };

        match status {
            ActionStatus::Pending => {}
            ActionStatus::Done => {
                active.actions.pop_front();
                active.travel = None;
                active.wait_left = None;
                if active.actions.is_empty() {
                    self.complete(env);
                }
            }
            ActionStatus::Failed => self.fail(env),
        }
    }

    fn complete(&mut self, env: &mut TickEnv<'_>) {
        let Some(mut active) = self.current.take() else {
            return;
        };
        active.release(self.id, env.interactables);
        let kind = active.choice.kind;
        if let Some(task) = env.catalogue.get(kind) {
            task.apply(&mut self.state);
        }
        if kind == TaskKind::Directive && self.quest == Some(self.state.position) {
            self.quest = None;
        }
        env.emit(SimEventKind::TaskCompleted {
            character: self.id,
            task: kind,
        });
    }

    fn fail(&mut self, env: &mut TickEnv<'_>) {
        let Some(mut active) = self.current.take() else {
            return;
        };
        active.failures += 1;
        let kind = active.choice.kind;
        env.emit(SimEventKind::TaskFailed {
            character: self.id,
            task: kind,
            attempt: active.failures,
        });
        active.release(self.id, env.interactables);
        if active.failures <= env.config.execution.max_retries && self.retarget(&mut active, env) {
            self.current = Some(active);
            return;
        }

        warn!(
            character = %self.id,
            task = ?kind,
            failures = active.failures,
            "task abandoned, falling back to wait"
        );
        env.emit(SimEventKind::FellBack {
            character: self.id,
            task: kind,
        });
        self.begin(TaskChoice::wait(), true, env);
    }

    /// Re-resolve the task's target from the current position and rebuild
    /// its actions. `false` if the task no longer applies.
    fn retarget(&self, active: &mut ActiveTask, env: &mut TickEnv<'_>) -> bool {
        let catalogue = env.catalogue;
        let Some(task) = catalogue.get(active.choice.kind) else {
            return false;
        };
        let target = match task.target_need() {
            TargetNeed::None | TargetNeed::Fixed => active.choice.target.clone(),
            need => env.plan_context(self.id).resolve(need, self.state.position),
        };
        if !task.applicable(&self.state, target.as_ref()) {
            return false;
        }
        let tuning = env.config.tuning(active.choice.kind);
        active.choice.target = target;
        active.actions = task
            .actions(active.choice.target.as_ref(), &tuning)
            .into_iter()
            .collect();
        active.travel = None;
        active.wait_left = None;
        active.claim(self.id, env.interactables)
    }
}

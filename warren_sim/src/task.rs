// Tasks: the activities characters plan over.
//
// A `Task` is a candidate activity described by a handful of pure
// functions over a `WorldState`: whether it applies, how much utility it
// yields, what it changes when it succeeds, an optional follow-up task
// whose utility may be folded into a chain ("payoff"), and the primitive
// actions that carry it out. Durations, weights and success probabilities
// come from `TaskTuning` in the config, so the task implementations hold
// no numbers of their own.
//
// Tasks that need somewhere to go declare a `TargetNeed`. The planner
// resolves it (nearest unclaimed interactable of a kind, or the nearest
// other character) into a `Target` before asking anything else, and passes
// that target to every call. Travel time to the target counts toward the
// task's time.
//
// The standard catalogue:
// - `Wait`:      always applicable; the planner's guaranteed fallback.
// - `FetchFood`: go to a food source and pick up food; payoff `Eat`.
// - `Eat`:       eat carried food.
// - `Sleep`:     go to a bed and sleep off all fatigue.
// - `Sit`:       go to a seat and rest a little.
// - `Chat`:      go to another character and talk; risky (may fail);
//                payoff `Farewell`.
// - `Farewell`:  leave a conversation.
// - `Directive`: go where told. Never planned; issued by quests and
//                direct commands with a fixed target.
//
// See also: `planner.rs` (search, risk and payoff scoring), `character.rs`
// (execution), `config.rs` (`TaskTuning`), `action.rs`.
//
// **Critical constraint: determinism.** The catalogue is iterated in
// `TaskKind` order, which is the planner's tie-break order.

use crate::action::{InteractWith, PrimitiveAction};
use crate::config::TaskTuning;
use crate::types::{CharacterId, InteractableId, InteractableKind, Stance, TaskKind, WorldCoord};
use crate::world_state::WorldState;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

/// Action lists are short; six covers every standard task.
pub type ActionList = SmallVec<[PrimitiveAction; 6]>;

/// What a task needs resolved before it can be evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetNeed {
    None,
    Interactable(InteractableKind),
    Partner,
    /// Supplied by whoever issues the task.
    Fixed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetRef {
    Interactable(InteractableId),
    Character(CharacterId),
    Spot,
}

/// A resolved destination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub what: TargetRef,
    /// Cells to stand on.
    pub points: Vec<WorldCoord>,
    /// The cell assumed reached when predicting the outcome.
    pub approach: WorldCoord,
    /// Router distance from where the target was resolved.
    pub distance: f32,
}

impl Target {
    /// A fixed spot, as used by directives.
    pub fn spot(at: WorldCoord) -> Self {
        Self {
            what: TargetRef::Spot,
            points: vec![at],
            approach: at,
            distance: 0.0,
        }
    }
}

/// A task picked for execution, with its target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskChoice {
    pub kind: TaskKind,
    pub target: Option<Target>,
}

impl TaskChoice {
    pub fn wait() -> Self {
        Self {
            kind: TaskKind::Wait,
            target: None,
        }
    }

    pub fn directive(at: WorldCoord) -> Self {
        Self {
            kind: TaskKind::Directive,
            target: Some(Target::spot(at)),
        }
    }
}

pub trait Task: Send + Sync {
    fn kind(&self) -> TaskKind;

    fn target_need(&self) -> TargetNeed {
        TargetNeed::None
    }

    fn applicable(&self, state: &WorldState, target: Option<&Target>) -> bool;

    /// Utility on success, before risk.
    fn utility(&self, state: &WorldState, tuning: &TaskTuning) -> f32;

    /// Outcome of success. Position and need drift are handled by the
    /// caller.
    fn apply(&self, _state: &mut WorldState) {}

    fn payoff(&self) -> Option<TaskKind> {
        None
    }

    fn actions(&self, target: Option<&Target>, tuning: &TaskTuning) -> ActionList;
}

fn wait_ticks(tuning: &TaskTuning) -> PrimitiveAction {
    PrimitiveAction::WaitFor {
        ticks: tuning.duration.max(0.0).ceil() as u64,
    }
}

fn travel(target: Option<&Target>) -> PrimitiveAction {
    PrimitiveAction::TravelTo {
        goal: target.map(|t| t.points.clone()).unwrap_or_default(),
    }
}

fn interact(target: Option<&Target>) -> Option<PrimitiveAction> {
    let with = match target?.what {
        TargetRef::Interactable(id) => InteractWith::Interactable(id),
        TargetRef::Character(id) => InteractWith::Character(id),
        TargetRef::Spot => return None,
    };
    Some(PrimitiveAction::Interact { with })
}

// ---------------------------------------------------------------------------
// Standard tasks
// ---------------------------------------------------------------------------

pub struct Wait;

impl Task for Wait {
    fn kind(&self) -> TaskKind {
        TaskKind::Wait
    }

    fn applicable(&self, _state: &WorldState, _target: Option<&Target>) -> bool {
        true
    }

    fn utility(&self, _state: &WorldState, tuning: &TaskTuning) -> f32 {
        tuning.weight
    }

    fn actions(&self, _target: Option<&Target>, tuning: &TaskTuning) -> ActionList {
        smallvec![PrimitiveAction::AssumeStance(Stance::Standing), wait_ticks(tuning)]
    }
}

pub struct FetchFood;

impl Task for FetchFood {
    fn kind(&self) -> TaskKind {
        TaskKind::FetchFood
    }

    fn target_need(&self) -> TargetNeed {
        TargetNeed::Interactable(InteractableKind::FoodSource)
    }

    fn applicable(&self, state: &WorldState, target: Option<&Target>) -> bool {
        !state.has_food && target.is_some()
    }

    fn utility(&self, state: &WorldState, tuning: &TaskTuning) -> f32 {
        tuning.weight * state.hunger
    }

    fn apply(&self, state: &mut WorldState) {
        state.has_food = true;
    }

    fn payoff(&self) -> Option<TaskKind> {
        Some(TaskKind::Eat)
    }

    fn actions(&self, target: Option<&Target>, tuning: &TaskTuning) -> ActionList {
        let mut actions: ActionList = smallvec![travel(target)];
        actions.extend(interact(target));
        actions.push(wait_ticks(tuning));
        actions
    }
}

pub struct Eat;

impl Task for Eat {
    fn kind(&self) -> TaskKind {
        TaskKind::Eat
    }

    fn applicable(&self, state: &WorldState, _target: Option<&Target>) -> bool {
        state.has_food
    }

    fn utility(&self, state: &WorldState, tuning: &TaskTuning) -> f32 {
        tuning.weight * state.hunger
    }

    fn apply(&self, state: &mut WorldState) {
        state.hunger = 0.0;
        state.has_food = false;
    }

    fn actions(&self, _target: Option<&Target>, tuning: &TaskTuning) -> ActionList {
        smallvec![
            PrimitiveAction::AssumeStance(Stance::Sitting),
            wait_ticks(tuning),
            PrimitiveAction::AssumeStance(Stance::Standing),
        ]
    }
}

pub struct Sleep;

impl Task for Sleep {
    fn kind(&self) -> TaskKind {
        TaskKind::Sleep
    }

    fn target_need(&self) -> TargetNeed {
        TargetNeed::Interactable(InteractableKind::Bed)
    }

    fn applicable(&self, _state: &WorldState, target: Option<&Target>) -> bool {
        target.is_some()
    }

    fn utility(&self, state: &WorldState, tuning: &TaskTuning) -> f32 {
        tuning.weight * state.fatigue
    }

    fn apply(&self, state: &mut WorldState) {
        state.fatigue = 0.0;
    }

    fn actions(&self, target: Option<&Target>, tuning: &TaskTuning) -> ActionList {
        let mut actions: ActionList = smallvec![travel(target)];
        actions.extend(interact(target));
        actions.extend([
            PrimitiveAction::AssumeStance(Stance::Lying),
            wait_ticks(tuning),
            PrimitiveAction::AssumeStance(Stance::Standing),
        ]);
        actions
    }
}

/// Fatigue one sit removes.
const SIT_RELIEF: f32 = 3.0;

pub struct Sit;

impl Task for Sit {
    fn kind(&self) -> TaskKind {
        TaskKind::Sit
    }

    fn target_need(&self) -> TargetNeed {
        TargetNeed::Interactable(InteractableKind::Seat)
    }

    fn applicable(&self, _state: &WorldState, target: Option<&Target>) -> bool {
        target.is_some()
    }

    fn utility(&self, state: &WorldState, tuning: &TaskTuning) -> f32 {
        tuning.weight * state.fatigue.min(SIT_RELIEF)
    }

    fn apply(&self, state: &mut WorldState) {
        state.fatigue = (state.fatigue - SIT_RELIEF).max(0.0);
    }

    fn actions(&self, target: Option<&Target>, tuning: &TaskTuning) -> ActionList {
        let mut actions: ActionList = smallvec![travel(target)];
        actions.extend(interact(target));
        actions.extend([
            PrimitiveAction::AssumeStance(Stance::Sitting),
            wait_ticks(tuning),
            PrimitiveAction::AssumeStance(Stance::Standing),
        ]);
        actions
    }
}

pub struct Chat;

impl Task for Chat {
    fn kind(&self) -> TaskKind {
        TaskKind::Chat
    }

    fn target_need(&self) -> TargetNeed {
        TargetNeed::Partner
    }

    fn applicable(&self, state: &WorldState, target: Option<&Target>) -> bool {
        !state.in_conversation && target.is_some()
    }

    fn utility(&self, state: &WorldState, tuning: &TaskTuning) -> f32 {
        tuning.weight * state.loneliness
    }

    fn apply(&self, state: &mut WorldState) {
        state.loneliness = 0.0;
        state.in_conversation = true;
    }

    fn payoff(&self) -> Option<TaskKind> {
        Some(TaskKind::Farewell)
    }

    fn actions(&self, target: Option<&Target>, tuning: &TaskTuning) -> ActionList {
        let mut actions: ActionList = smallvec![travel(target)];
        actions.extend(interact(target));
        actions.push(wait_ticks(tuning));
        actions
    }
}

pub struct Farewell;

impl Task for Farewell {
    fn kind(&self) -> TaskKind {
        TaskKind::Farewell
    }

    fn applicable(&self, state: &WorldState, _target: Option<&Target>) -> bool {
        state.in_conversation
    }

    fn utility(&self, _state: &WorldState, tuning: &TaskTuning) -> f32 {
        tuning.weight
    }

    fn apply(&self, state: &mut WorldState) {
        state.in_conversation = false;
    }

    fn actions(&self, _target: Option<&Target>, tuning: &TaskTuning) -> ActionList {
        smallvec![wait_ticks(tuning)]
    }
}

pub struct Directive;

impl Task for Directive {
    fn kind(&self) -> TaskKind {
        TaskKind::Directive
    }

    fn target_need(&self) -> TargetNeed {
        TargetNeed::Fixed
    }

    fn applicable(&self, _state: &WorldState, target: Option<&Target>) -> bool {
        target.is_some()
    }

    fn utility(&self, _state: &WorldState, tuning: &TaskTuning) -> f32 {
        tuning.weight
    }

    fn actions(&self, target: Option<&Target>, tuning: &TaskTuning) -> ActionList {
        smallvec![travel(target), wait_ticks(tuning)]
    }
}

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

/// The task set characters plan over, in `TaskKind` order.
pub struct TaskCatalogue {
    tasks: Vec<Box<dyn Task>>,
}

impl TaskCatalogue {
    pub fn standard() -> Self {
        Self::from_tasks(vec![
            Box::new(Wait),
            Box::new(FetchFood),
            Box::new(Eat),
            Box::new(Sleep),
            Box::new(Sit),
            Box::new(Chat),
            Box::new(Farewell),
            Box::new(Directive),
        ])
    }

    /// Build a catalogue from any task set. `Wait` is added if missing so
    /// planning always has a candidate.
    pub fn from_tasks(mut tasks: Vec<Box<dyn Task>>) -> Self {
        if !tasks.iter().any(|t| t.kind() == TaskKind::Wait) {
            tasks.push(Box::new(Wait));
        }
        tasks.sort_by_key(|t| t.kind());
        tasks.dedup_by_key(|t| t.kind());
        Self { tasks }
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Task> {
        self.tasks.iter().map(|t| t.as_ref())
    }

    pub fn get(&self, kind: TaskKind) -> Option<&dyn Task> {
        self.iter().find(|t| t.kind() == kind)
    }

    /// The wait task, which every catalogue carries.
    pub fn fallback(&self) -> &dyn Task {
        self.get(TaskKind::Wait).unwrap_or(&Wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    fn state() -> WorldState {
        WorldState::new(WorldCoord::new(0, 0, 0))
    }

    #[test]
    fn wait_is_always_applicable() {
        let mut s = state();
        assert!(Wait.applicable(&s, None));
        s.hunger = 10.0;
        s.in_conversation = true;
        s.has_food = true;
        assert!(Wait.applicable(&s, None));
    }

    #[test]
    fn eat_requires_food_and_clears_hunger() {
        let mut s = state();
        assert!(!Eat.applicable(&s, None));
        s.has_food = true;
        s.hunger = 7.0;
        assert!(Eat.applicable(&s, None));
        Eat.apply(&mut s);
        assert_eq!(s.hunger, 0.0);
        assert!(!s.has_food);
    }

    #[test]
    fn targeted_tasks_need_a_target() {
        let s = state();
        let bed = Target {
            what: TargetRef::Interactable(InteractableId(2)),
            points: vec![WorldCoord::new(1, 0, 0)],
            approach: WorldCoord::new(1, 0, 0),
            distance: 1.0,
        };
        assert!(!Sleep.applicable(&s, None));
        assert!(Sleep.applicable(&s, Some(&bed)));
        let tuning = GameConfig::default().tuning(TaskKind::Sleep);
        let actions = Sleep.actions(Some(&bed), &tuning);
        assert_eq!(
            actions[0],
            PrimitiveAction::TravelTo {
                goal: vec![WorldCoord::new(1, 0, 0)]
            }
        );
        assert_eq!(
            actions[1],
            PrimitiveAction::Interact {
                with: InteractWith::Interactable(InteractableId(2))
            }
        );
    }

    #[test]
    fn catalogue_is_ordered_and_always_has_wait() {
        let catalogue = TaskCatalogue::from_tasks(vec![Box::new(Sleep), Box::new(Eat)]);
        let kinds: Vec<TaskKind> = catalogue.iter().map(|t| t.kind()).collect();
        assert_eq!(kinds, vec![TaskKind::Wait, TaskKind::Eat, TaskKind::Sleep]);
        assert_eq!(catalogue.fallback().kind(), TaskKind::Wait);
        assert_eq!(TaskCatalogue::standard().iter().count(), TaskKind::ALL.len());
    }
}

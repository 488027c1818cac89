// warren_sim: characters, utility planning and the tick scheduler.
//
// This crate sits on top of `warren_nav`. It decides what each character
// wants to do (a utility planner searching chains of tasks), turns the
// chosen task into primitive actions, and executes them tick by tick using
// the navigation layer for movement. It has no rendering or platform
// dependencies and runs headless.
//
// Module overview:
// - `sim.rs`:          SimState, the tick loop, command processing, idle blocking.
// - `character.rs`:    Character and the per-tick task execution loop.
// - `planner.rs`:      UtilityPlanner, anytime best-first search over task chains.
// - `task.rs`:         The Task trait, the standard tasks and the catalogue.
// - `action.rs`:       Primitive actions and their status.
// - `travel.rs`:       The travel action: route jobs plus in-room D*-Lite.
// - `world_state.rs`:  WorldState, what the planner reasons over.
// - `interactable.rs`: Beds, food sources and seats, with claims.
// - `command.rs`:      SimCommand / SimAction, all external mutations.
// - `event.rs`:        Narrative SimEvents.
// - `config.rs`:       GameConfig and its sections, loaded from JSON.
// - `error.rs`:        SimError.
// - `demo.rs`:         A furnished demo house.
// - `types.rs`:        IDs, TaskKind, InteractableKind, Stance.
//
// **Critical constraint: determinism.** Given the same config and commands
// (and inline route jobs), a run produces the same events. No `HashMap`
// iteration, no system time, no OS entropy; ordered collections are
// `BTreeMap`s.

pub mod action;
pub mod character;
pub mod command;
pub mod config;
pub mod demo;
pub mod error;
pub mod event;
pub mod interactable;
pub mod planner;
pub mod sim;
pub mod task;
pub mod travel;
pub mod types;
pub mod world_state;

pub use config::GameConfig;
pub use error::{Result, SimError};
pub use sim::{SimState, StepResult};

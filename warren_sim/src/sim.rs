// Core simulation state and tick loop.
//
// `SimState` is the single source of truth for the simulated household. It
// owns the navigation world, the route worker, the task catalogue, every
// character and interactable, and the game config. The sim is a function
// `(state, commands) -> (new state, events)`.
//
// ## Tick loop
//
// `step(commands, target_tick)` advances one tick at a time until
// `target_tick`. Each tick:
//
// 1. applies every command whose tick has come, in slice order;
// 2. settles pending immediate map edits (occupancy, door locks), emitting
//    `MapSettled` when that ran;
// 3. runs each character's `tick` in `CharacterId` order. The character is
//    taken out of the map for its turn, so its `TickEnv` can list every
//    other character's position without aliasing it;
// 4. after each character's turn, updates whether it blocks its cell.
//
// ## Idle blocking
//
// A character that is waiting idly blocks its cell so others path around
// it, unless blocking would cut a region in two or another character
// stands within conversation range (the blocked footprint would swallow
// them). Cutting is checked twice: the cell must not be a sector
// bottleneck, and the cells around its 3x3 footprint must stay connected
// without it. A held block is kept until the character stops idling.
//
// Map edits arriving as commands are applied as one batch each and settle
// immediately. A command that fails is reported as `CommandRejected`.
//
// See also: `character.rs` for the per-character tick, `command.rs`,
// `event.rs`, `warren_nav`'s `world.rs` for edits and settling.
//
// **Critical constraint: determinism.** Commands apply in slice order,
// characters run in ID order, and every collection iterated here is a
// `BTreeMap`. With `route_worker_threads = 0` route jobs complete inline,
// so the same commands always produce the same events. With a thread pool,
// a route may arrive a tick later on one run than another.

use crate::character::{Character, TickEnv};
use crate::command::{SimAction, SimCommand};
use crate::config::GameConfig;
use crate::error::{Result, SimError};
use crate::event::{SimEvent, SimEventKind};
use crate::interactable::Interactable;
use crate::planner::CHAT_RANGE;
use crate::task::TaskCatalogue;
use crate::types::{CharacterId, InteractableId, InteractableKind, WorldCoord};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use warren_nav::node::Occupant;
use warren_nav::route_job::RouteWorker;
use warren_nav::sector::footprint_keeps_connectivity;
use warren_nav::world::MapEdit;
use warren_nav::{NavWorld, SettleReport};

/// Output of one `step` call.
#[derive(Clone, Debug, Default)]
pub struct StepResult {
    pub events: Vec<SimEvent>,
}

pub struct SimState {
    pub tick: u64,
    pub config: GameConfig,
    nav: NavWorld,
    worker: RouteWorker,
    catalogue: TaskCatalogue,
    characters: BTreeMap<CharacterId, Character>,
    interactables: BTreeMap<InteractableId, Interactable>,
    next_character_id: u32,
    next_interactable_id: u32,
}

fn settled(tick: u64, report: &SettleReport) -> SimEvent {
    SimEvent {
        tick,
        kind: SimEventKind::MapSettled {
            epoch: report.epoch,
            sectors: report.sector_count,
            bottlenecks: report.bottleneck_count,
        },
    }
}

impl SimState {
    pub fn new(config: GameConfig) -> Result<Self> {
        let worker = RouteWorker::new(config.nav.route_worker_threads)?;
        Ok(Self {
            tick: 0,
            nav: NavWorld::new(config.nav.clone()),
            worker,
            catalogue: TaskCatalogue::standard(),
            characters: BTreeMap::new(),
            interactables: BTreeMap::new(),
            next_character_id: 0,
            next_interactable_id: 0,
            config,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::new(GameConfig::from_json(json)?)
    }

    pub fn nav(&self) -> &NavWorld {
        &self.nav
    }

    pub fn catalogue(&self) -> &TaskCatalogue {
        &self.catalogue
    }

    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(&id)
    }

    pub fn interactables(&self) -> impl Iterator<Item = &Interactable> {
        self.interactables.values()
    }

    pub fn interactable(&self, id: InteractableId) -> Option<&Interactable> {
        self.interactables.get(&id)
    }

    /// Apply one batch of map edits and settle.
    pub fn edit_map<F>(&mut self, f: F) -> Result<SettleReport>
    where
        F: FnOnce(&mut MapEdit<'_>) -> warren_nav::Result<()>,
    {
        Ok(self.nav.edit(f)?)
    }

    pub fn spawn_character(&mut self, name: impl Into<String>, position: WorldCoord) -> Result<CharacterId> {
        if !self.nav.map().is_floor(position) {
            return Err(SimError::NotFloor(position));
        }
        let id = CharacterId(self.next_character_id);
        self.next_character_id += 1;
        let character = Character::new(id, name.into(), position, &self.config.planner);
        debug!(character = %id, name = %character.name, %position, "character spawned");
        self.characters.insert(id, character);
        Ok(id)
    }

    /// Place an interactable and register its interaction points with the
    /// navigation layer.
    pub fn place_interactable(
        &mut self,
        kind: InteractableKind,
        position: WorldCoord,
        interaction_points: Vec<WorldCoord>,
    ) -> Result<InteractableId> {
        if let Some(&bad) = interaction_points.iter().find(|&&p| !self.nav.map().is_floor(p)) {
            return Err(SimError::NotFloor(bad));
        }
        self.nav.edit(|e| {
            for &p in &interaction_points {
                e.register_poi(kind.poi_kind(), p)?;
            }
            Ok(())
        })?;
        let id = InteractableId(self.next_interactable_id);
        self.next_interactable_id += 1;
        self.interactables.insert(
            id,
            Interactable {
                id,
                kind,
                position,
                interaction_points,
                claimed_by: None,
            },
        );
        Ok(id)
    }

    pub fn direct_task(&mut self, character: CharacterId, destination: WorldCoord) -> Result<()> {
        self.characters
            .get_mut(&character)
            .ok_or(SimError::UnknownCharacter(character))?
            .direct(destination);
        Ok(())
    }

    pub fn set_quest(&mut self, character: CharacterId, destination: Option<WorldCoord>) -> Result<()> {
        self.characters
            .get_mut(&character)
            .ok_or(SimError::UnknownCharacter(character))?
            .set_quest(destination);
        Ok(())
    }

    /// Apply commands and advance to `target_tick`. Commands must be sorted
    /// by tick; those past `target_tick` are left for a later call.
    pub fn step(&mut self, commands: &[SimCommand], target_tick: u64) -> StepResult {
        let mut events = Vec::new();
        let mut next_command = commands.iter().take_while(|c| c.tick <= target_tick).peekable();
        while self.tick < target_tick {
            self.tick += 1;
            while let Some(cmd) = next_command.next_if(|c| c.tick <= self.tick) {
                self.apply_command(cmd, &mut events);
            }
            self.run_tick(&mut events);
        }
        StepResult { events }
    }

    fn apply_command(&mut self, cmd: &SimCommand, events: &mut Vec<SimEvent>) {
        if let Err(e) = self.try_apply(&cmd.action, events) {
            warn!(tick = self.tick, error = %e, "command rejected");
            events.push(SimEvent {
                tick: self.tick,
                kind: SimEventKind::CommandRejected {
                    reason: e.to_string(),
                },
            });
        }
    }

    fn try_apply(&mut self, action: &SimAction, events: &mut Vec<SimEvent>) -> Result<()> {
        let tick = self.tick;
        let report = match action {
            SimAction::SpawnCharacter { name, position } => {
                let character = self.spawn_character(name.clone(), *position)?;
                events.push(SimEvent {
                    tick,
                    kind: SimEventKind::CharacterSpawned {
                        character,
                        at: *position,
                    },
                });
                None
            }
            SimAction::PlaceInteractable {
                kind,
                position,
                interaction_points,
            } => {
                let interactable = self.place_interactable(*kind, *position, interaction_points.clone())?;
                events.push(SimEvent {
                    tick,
                    kind: SimEventKind::InteractablePlaced {
                        interactable,
                        at: *position,
                    },
                });
                None
            }
            SimAction::AddRoom {
                origin,
                width,
                length,
            } => Some(self.edit_map(|e| e.add_room(*origin, *width, *length).map(|_| ()))?),
            SimAction::AddFloor { cells } => Some(self.edit_map(|e| e.add_floor(cells.iter().copied()))?),
            SimAction::RemoveFloor { at } => Some(self.edit_map(|e| e.remove_floor(*at))?),
            SimAction::AddWall { at, dir } => Some(self.edit_map(|e| e.add_wall(*at, *dir))?),
            SimAction::RemoveWall { at, dir } => Some(self.edit_map(|e| e.remove_wall(*at, *dir))?),
            SimAction::AddDoor { a, b } => Some(self.edit_map(|e| e.add_door(*a, *b).map(|_| ()))?),
            SimAction::AddStairs { a, b } => Some(self.edit_map(|e| e.add_stairs(*a, *b).map(|_| ()))?),
            SimAction::RemoveConnector { id } => Some(self.edit_map(|e| e.remove_connector(*id))?),
            SimAction::SetDoorLocked { id, locked } => {
                // Settles with the next tick like any immediate edit.
                self.nav.set_connector_locked(*id, *locked)?;
                None
            }
            SimAction::PlaceFurniture { at, furniture } => {
                Some(self.edit_map(|e| e.place_furniture(*at, *furniture))?)
            }
            SimAction::ClearFurniture { at } => Some(self.edit_map(|e| e.clear_furniture(*at))?),
            SimAction::SetFloorSpeed { at, speed } => Some(self.edit_map(|e| e.set_floor_speed(*at, *speed))?),
            SimAction::DirectTask {
                character,
                destination,
            } => {
                self.direct_task(*character, *destination)?;
                None
            }
            SimAction::SetQuest {
                character,
                destination,
            } => {
                self.set_quest(*character, *destination)?;
                None
            }
        };
        if let Some(report) = report {
            events.push(settled(tick, &report));
        }
        Ok(())
    }

    fn run_tick(&mut self, events: &mut Vec<SimEvent>) {
        if let Some(report) = self.nav.settle_pending() {
            events.push(settled(self.tick, &report));
        }

        let ids: Vec<CharacterId> = self.characters.keys().copied().collect();
        for id in ids {
            let Some(mut character) = self.characters.remove(&id) else {
                continue;
            };
            let others: Vec<(CharacterId, WorldCoord)> = self
                .characters
                .values()
                .map(|c| (c.id, c.position()))
                .collect();
            let mut env = TickEnv {
                tick: self.tick,
                config: &self.config,
                nav: &self.nav,
                worker: &self.worker,
                catalogue: &self.catalogue,
                interactables: &mut self.interactables,
                others: &others,
                events: &mut *events,
            };
            character.tick(&mut env);
            self.update_blocking(&mut character, &others);
            self.characters.insert(id, character);
        }
    }

    fn can_block(&self, at: WorldCoord, others: &[(CharacterId, WorldCoord)]) -> bool {
        self.nav.map().is_traversable(at)
            && !self.nav.sectors().is_bottleneck(at)
            && footprint_keeps_connectivity(self.nav.map(), at)
            && others.iter().all(|&(_, p)| {
                p.z != at.z || (p.x - at.x).abs().max((p.y - at.y).abs()) > CHAT_RANGE
            })
    }

    fn update_blocking(&mut self, character: &mut Character, others: &[(CharacterId, WorldCoord)]) {
        let held = character.blocking();
        let wanted = match (character.idle_spot(), held) {
            (Some(at), Some(h)) if at == h => Some(h),
            (Some(at), _) if self.can_block(at, others) => Some(at),
            _ => None,
        };
        if wanted == held {
            return;
        }
        if let Some(h) = held
            && let Err(e) = self.nav.set_occupant(h, None)
        {
            warn!(character = %character.id, error = %e, "failed to release cell");
        }
        let occupant = Occupant {
            id: u64::from(character.id.0),
            blocks: true,
        };
        let placed = wanted.filter(|&at| match self.nav.set_occupant(at, Some(occupant)) {
            Ok(()) => true,
            Err(e) => {
                warn!(character = %character.id, error = %e, "failed to block cell");
                false
            }
        });
        character.set_blocking(placed);
    }
}

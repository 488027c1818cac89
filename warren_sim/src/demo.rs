// A small furnished house for the headless runner and integration tests.
//
// Layout, all on level 0 (x east, y north):
//
//   bedroom  (0,0)..(7,5)   two beds along the north wall, a seat by the
//                           south wall
//   corridor (8,1)..(11,3)  doors at (7,2)-(8,2) and (11,2)-(12,2)
//   kitchen  (12,0)..(19,5) two food sources on the east wall, a seat, and
//                           a table that blocks its footprint
//
// Every room is walled, so the doors are the only way between them.
//
// See also: `main.rs` (the headless runner), `tests/`.

use crate::error::Result;
use crate::sim::SimState;
use crate::types::{ConnectorId, InteractableId, InteractableKind, WorldCoord};
use warren_nav::node::Obstruction;

pub const BEDROOM: WorldCoord = WorldCoord::new(0, 0, 0);
pub const CORRIDOR: WorldCoord = WorldCoord::new(8, 1, 0);
pub const KITCHEN: WorldCoord = WorldCoord::new(12, 0, 0);
pub const TABLE: WorldCoord = WorldCoord::new(16, 3, 0);

pub struct DemoHouse {
    pub bedroom_door: ConnectorId,
    pub kitchen_door: ConnectorId,
    pub beds: Vec<InteractableId>,
    pub food: Vec<InteractableId>,
    pub seats: Vec<InteractableId>,
    /// Open cells to spawn characters on, bedroom first.
    pub spawn_points: Vec<WorldCoord>,
}

pub fn build_demo_house(sim: &mut SimState) -> Result<DemoHouse> {
    let (mut bedroom_door, mut kitchen_door) = (ConnectorId(0), ConnectorId(0));
    sim.edit_map(|e| {
        e.add_room(BEDROOM, 8, 6)?;
        e.add_room(CORRIDOR, 4, 3)?;
        e.add_room(KITCHEN, 8, 6)?;
        bedroom_door = e.add_door(WorldCoord::new(7, 2, 0), WorldCoord::new(8, 2, 0))?;
        kitchen_door = e.add_door(WorldCoord::new(11, 2, 0), WorldCoord::new(12, 2, 0))?;
        e.place_furniture(
            TABLE,
            Obstruction {
                blocks: true,
                speed_multiplier: 1.0,
            },
        )?;
        Ok(())
    })?;

    let mut place = |kind, at: WorldCoord, point: WorldCoord| sim.place_interactable(kind, at, vec![point]);
    let beds = vec![
        place(InteractableKind::Bed, WorldCoord::new(1, 5, 0), WorldCoord::new(1, 4, 0))?,
        place(InteractableKind::Bed, WorldCoord::new(4, 5, 0), WorldCoord::new(4, 4, 0))?,
    ];
    let food = vec![
        place(InteractableKind::FoodSource, WorldCoord::new(19, 5, 0), WorldCoord::new(18, 5, 0))?,
        place(InteractableKind::FoodSource, WorldCoord::new(19, 0, 0), WorldCoord::new(18, 0, 0))?,
    ];
    let seats = vec![
        place(InteractableKind::Seat, WorldCoord::new(6, 0, 0), WorldCoord::new(6, 1, 0))?,
        place(InteractableKind::Seat, WorldCoord::new(13, 5, 0), WorldCoord::new(13, 4, 0))?,
    ];

    Ok(DemoHouse {
        bedroom_door,
        kitchen_door,
        beds,
        food,
        seats,
        spawn_points: vec![
            WorldCoord::new(2, 2, 0),
            WorldCoord::new(5, 2, 0),
            WorldCoord::new(13, 1, 0),
            WorldCoord::new(14, 3, 0),
            WorldCoord::new(3, 0, 0),
            WorldCoord::new(19, 2, 0),
        ],
    })
}

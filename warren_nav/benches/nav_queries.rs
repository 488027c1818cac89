// Benchmarks for the navigation queries the scheduler runs every tick.
//
// Run with: cargo bench -p warren_nav
//
// - `gscore_table`: building a room distance table from scratch.
// - `router_distance`: a cross-room distance through a row of rooms joined
//   by doors, with warm and cold connector caches.
// - `dlite_repair`: toggling a piece of furniture and repairing an
//   incremental pathfinder, against rebuilding the table from scratch.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use warren_nav::dlite::IncrementalPathfinder;
use warren_nav::node::Obstruction;
use warren_nav::{GridCoord, NavConfig, NavWorld, PointGoal, WorldCoord};

const BLOCK: Obstruction = Obstruction {
    blocks: true,
    speed_multiplier: 1.0,
};

fn config() -> NavConfig {
    NavConfig {
        route_worker_threads: 0,
        ..NavConfig::default()
    }
}

/// `rooms` square rooms of side `size` in a row, each joined to the next by
/// a door halfway up the shared wall.
fn row_of_rooms(rooms: i32, size: i32) -> NavWorld {
    let mut world = NavWorld::new(config());
    world
        .edit(|e| {
            for i in 0..rooms {
                e.add_room(WorldCoord::new(i * size, 0, 0), size, size)?;
            }
            for i in 1..rooms {
                let x = i * size;
                e.add_door(WorldCoord::new(x - 1, size / 2, 0), WorldCoord::new(x, size / 2, 0))?;
            }
            Ok(())
        })
        .expect("demo map is valid");
    world
}

fn bench_gscore_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("gscore_table");
    for size in [8, 16, 32] {
        let world = row_of_rooms(1, size);
        let room = world.map().rooms().next().expect("one room");
        let goal = GridCoord::new(size - 1, size - 1);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(room.create_gscore_table([goal])));
        });
    }
    group.finish();
}

fn bench_router_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("router_distance");
    for rooms in [2, 6, 12] {
        let world = row_of_rooms(rooms, 8);
        let goal = PointGoal::new(WorldCoord::new(rooms * 8 - 2, 6, 0));
        let from = WorldCoord::new(1, 1, 0);
        group.bench_with_input(BenchmarkId::new("warm", rooms), &rooms, |b, _| {
            b.iter(|| black_box(world.router().distance(from, &goal)));
        });
        group.bench_with_input(BenchmarkId::new("route", rooms), &rooms, |b, _| {
            b.iter(|| black_box(world.router().route(from, &goal)));
        });
    }
    group.finish();
}

fn bench_dlite_repair(c: &mut Criterion) {
    let mut group = c.benchmark_group("dlite_repair");
    let size = 24;
    let mut world = row_of_rooms(1, size);
    let start = WorldCoord::new(0, 0, 0);
    let goal = WorldCoord::new(size - 1, size - 1, 0);
    let toggled = WorldCoord::new(size / 2, size / 2, 0);

    let mut pf = IncrementalPathfinder::new(world.config());
    {
        let room = world.map().rooms().next().expect("one room");
        pf.set_goal(room, start, &PointGoal::new(goal));
        pf.establish_pathing(room);
    }

    let mut blocked = false;
    group.bench_function("toggle_and_repair", |b| {
        b.iter(|| {
            blocked = !blocked;
            world
                .edit(|e| {
                    if blocked {
                        e.place_furniture(toggled, BLOCK)
                    } else {
                        e.clear_furniture(toggled)
                    }
                })
                .expect("toggle is valid");
            let room = world.map().rooms().next().expect("one room");
            pf.sync(room, start);
            pf.establish_pathing(room);
            black_box(pf.g_score(GridCoord::new(0, 0)))
        });
    });

    let room = world.map().rooms().next().expect("one room");
    let local_goal = room.to_local(goal).expect("goal in room");
    group.bench_function("recompute_table", |b| {
        b.iter(|| black_box(room.create_gscore_table([local_goal]).get(GridCoord::new(0, 0))));
    });
    group.finish();
}

criterion_group!(benches, bench_gscore_table, bench_router_distance, bench_dlite_repair);
criterion_main!(benches);

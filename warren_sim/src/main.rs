// Headless runner for the Warren simulation.
//
// Builds the demo house (see `demo.rs`), spawns characters, runs the
// scheduler and prints what happened. Task decisions are logged at `info`;
// set `RUST_LOG=warren_sim=debug` (or `trace`) to watch planner restarts
// and expansions.
//
// Usage:
//   warren_headless [OPTIONS]
//     --ticks <N>          Ticks to run (default: 2000)
//     --characters <N>     Characters to spawn (default: 3)
//     --config <PATH>      GameConfig JSON (default: built-in values)
//     --deterministic      Compute routes inline instead of on the pool

use std::collections::BTreeMap;
use tracing::info;
use tracing_subscriber::EnvFilter;
use warren_sim::demo::build_demo_house;
use warren_sim::event::{SimEvent, SimEventKind};
use warren_sim::{GameConfig, SimState};

const NAMES: [&str; 8] = [
    "Bramble", "Thistle", "Moss", "Fern", "Hazel", "Rowan", "Sorrel", "Wren",
];

struct Args {
    ticks: u64,
    characters: usize,
    config: Option<String>,
    deterministic: bool,
}

fn main() {
    let args = parse_args();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = match &args.config {
        Some(path) => load_config(path),
        None => GameConfig::default(),
    };
    if args.deterministic {
        config.nav.route_worker_threads = 0;
    }

    let mut sim = match SimState::new(config) {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("Failed to start simulation: {e}");
            std::process::exit(1);
        }
    };
    let house = match build_demo_house(&mut sim) {
        Ok(house) => house,
        Err(e) => {
            eprintln!("Failed to build demo house: {e}");
            std::process::exit(1);
        }
    };
    for i in 0..args.characters {
        let name = match NAMES.get(i) {
            Some(name) => (*name).to_string(),
            None => format!("{} {}", NAMES[i % NAMES.len()], i / NAMES.len() + 1),
        };
        let at = house.spawn_points[i % house.spawn_points.len()];
        if let Err(e) = sim.spawn_character(name, at) {
            eprintln!("Failed to spawn character at {at}: {e}");
            std::process::exit(1);
        }
    }

    let result = sim.step(&[], args.ticks);
    for event in &result.events {
        log_event(&sim, event);
    }
    print_summary(&sim, &result.events);
}

fn load_config(path: &str) -> GameConfig {
    let json = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {path}: {e}");
        std::process::exit(1);
    });
    GameConfig::from_json(&json).unwrap_or_else(|e| {
        eprintln!("Failed to parse {path}: {e}");
        std::process::exit(1);
    })
}

fn name_of(sim: &SimState, id: warren_sim::types::CharacterId) -> &str {
    sim.character(id).map_or("?", |c| c.name.as_str())
}

fn log_event(sim: &SimState, event: &SimEvent) {
    match &event.kind {
        SimEventKind::TaskStarted { character, task } => {
            info!(tick = event.tick, who = name_of(sim, *character), ?task, "task started");
        }
        SimEventKind::FellBack { character, task } => {
            info!(tick = event.tick, who = name_of(sim, *character), ?task, "gave up on task");
        }
        SimEventKind::CommandRejected { reason } => {
            info!(tick = event.tick, %reason, "command rejected");
        }
        _ => {}
    }
}

fn label(kind: &SimEventKind) -> &'static str {
    match kind {
        SimEventKind::CharacterSpawned { .. } => "character spawned",
        SimEventKind::InteractablePlaced { .. } => "interactable placed",
        SimEventKind::CharacterArrived { .. } => "arrivals",
        SimEventKind::TaskStarted { .. } => "tasks started",
        SimEventKind::TaskCompleted { .. } => "tasks completed",
        SimEventKind::TaskFailed { .. } => "task failures",
        SimEventKind::FellBack { .. } => "fallbacks",
        SimEventKind::MapSettled { .. } => "map settles",
        SimEventKind::CommandRejected { .. } => "rejected commands",
    }
}

fn print_summary(sim: &SimState, events: &[SimEvent]) {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for event in events {
        *counts.entry(label(&event.kind)).or_default() += 1;
    }

    println!();
    println!("After {} ticks (map epoch {}):", sim.tick, sim.nav().epoch());
    for (what, n) in &counts {
        println!("  {what:<20} {n}");
    }
    println!();
    for c in sim.characters() {
        println!(
            "  {:<10} at {}  task {:<10} hunger {:>4.1}  fatigue {:>4.1}  loneliness {:>4.1}",
            c.name,
            c.position(),
            c.current_task().map_or_else(|| "-".to_string(), |t| format!("{t:?}")),
            c.state.hunger,
            c.state.fatigue,
            c.state.loneliness,
        );
    }
}

/// Parse command-line arguments. Uses simple `std::env::args()` matching.
fn parse_args() -> Args {
    let mut parsed = Args {
        ticks: 2000,
        characters: 3,
        config: None,
        deterministic: false,
    };
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--ticks" => {
                i += 1;
                parsed.ticks = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--ticks requires a valid number");
                    std::process::exit(1);
                });
            }
            "--characters" => {
                i += 1;
                parsed.characters = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--characters requires a valid number");
                    std::process::exit(1);
                });
            }
            "--config" => {
                i += 1;
                parsed.config = args.get(i).cloned().or_else(|| {
                    eprintln!("--config requires a path");
                    std::process::exit(1);
                });
            }
            "--deterministic" => parsed.deterministic = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_usage() {
    println!("Usage: warren_headless [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --ticks <N>          Ticks to run (default: 2000)");
    println!("  --characters <N>     Characters to spawn (default: 3)");
    println!("  --config <PATH>      GameConfig JSON (default: built-in values)");
    println!("  --deterministic      Compute routes inline instead of on the pool");
    println!("  --help, -h           Show this help");
}

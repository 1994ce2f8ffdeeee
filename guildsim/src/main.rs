use anyhow::{Context, Result};
use clap::Parser;
use guildsim_core::optimizer::{self, OptimizerOptions};
use guildsim_core::resources::{ResourceKind, Resources};
use guildsim_core::testing::WorldStateBuilder;
use guildsim_core::{files, routes, snapshot, TickDigest, TickEngine, WorldState};
use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

/// Guild territorial economy simulator.
#[derive(Parser)]
#[command(name = "guildsim")]
struct Args {
    /// Territory map file (JSON). Without map files a small built-in demo
    /// world is used.
    #[arg(long)]
    territories: Option<PathBuf>,

    /// Guild roster file (JSON)
    #[arg(long)]
    guilds: Option<PathBuf>,

    /// Simulation ticks per second
    #[arg(long, default_value_t = 10.0)]
    tps: f64,

    /// Stop after this many ticks
    #[arg(long, default_value_t = 120)]
    ticks: u64,

    /// Run one optimizer pass for this guild tag before starting
    #[arg(long)]
    optimize: Option<String>,

    /// Write a state snapshot to this file on exit
    #[arg(long)]
    save: Option<PathBuf>,

    /// Print a digest line every N ticks
    #[arg(long, default_value_t = 10)]
    report_every: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut state = match (&args.territories, &args.guilds) {
        (Some(territories), Some(guilds)) => {
            let territory_json = std::fs::read_to_string(territories)
                .with_context(|| format!("reading {}", territories.display()))?;
            let guild_json = std::fs::read_to_string(guilds)
                .with_context(|| format!("reading {}", guilds.display()))?;
            files::load_world(&territory_json, &guild_json)?
        }
        _ => {
            log::info!("no map files given; using the built-in demo world");
            demo_world()
        }
    };
    state.tick_rate = args.tps;
    routes::update_routes(&mut state);

    let mut engine = TickEngine::spawn(state);

    if let Some(tag) = &args.optimize {
        let report = engine.with_state_mut(|state| {
            let report = optimizer::run_pass(state, &OptimizerOptions::new(tag.clone()));
            if state.routes_dirty {
                routes::update_routes(state);
            }
            report
        });
        for action in &report.actions {
            println!("optimizer: {}", action);
        }
        for warning in &report.warnings {
            eprintln!("optimizer warning: {}", warning);
        }
    }

    let rx = engine.subscribe(32);
    loop {
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(digest) => {
                if digest.tick % args.report_every.max(1) == 0 {
                    print_digest(&digest);
                }
                if digest.tick >= args.ticks {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let stats = engine.stats();
                if let Some(fatal) = stats.fatal {
                    anyhow::bail!("engine stopped: {}", fatal);
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let stats = engine.stats();
    println!(
        "ran {} ticks ({:.1} tps achieved, last tick {:.2} ms, {} digests dropped)",
        stats.current_tick, stats.actual_tps, stats.last_tick_ms, stats.broadcast_drops
    );

    if let Some(path) = &args.save {
        let document = engine.with_state(snapshot::capture);
        std::fs::write(path, snapshot::to_json(&document)?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("state saved to {}", path.display());
    }

    engine.shutdown();
    Ok(())
}

fn print_digest(digest: &TickDigest) {
    let mut stored = Resources::ZERO;
    let mut in_transit = 0usize;
    for territory in digest.state.territories.values() {
        stored += territory.storage.current;
        in_transit += territory.transit.len();
    }
    println!(
        "tick {:>6}  stored: {:>10.0} em {:>8.0} ore {:>8.0} wood {:>8.0} fish {:>8.0} crop  packets: {}",
        digest.tick, stored.emeralds, stored.ores, stored.wood, stored.fish, stored.crops, in_transit
    );
}

/// A small claim for exercising the engine without map files.
fn demo_world() -> WorldState {
    WorldStateBuilder::new()
        .with_guild("Avos", "AVO")
        .with_territory("Citadel", "AVO")
        .with_territory("Market", "AVO")
        .with_territory("Mines", "AVO")
        .with_territory("Grove", "AVO")
        .with_territory("Shoals", "AVO")
        .with_territory("Fields", "AVO")
        .with_hq("Citadel")
        .with_link("Citadel", "Market")
        .with_link("Citadel", "Mines")
        .with_link("Citadel", "Grove")
        .with_link("Grove", "Shoals")
        .with_link("Mines", "Fields")
        .with_generation("Market", Resources::only(ResourceKind::Emeralds, 18000.0))
        .with_generation("Mines", Resources::only(ResourceKind::Ores, 3600.0))
        .with_generation("Grove", Resources::only(ResourceKind::Wood, 3600.0))
        .with_generation("Shoals", Resources::only(ResourceKind::Fish, 3600.0))
        .with_generation("Fields", Resources::only(ResourceKind::Crops, 3600.0))
        .build()
}

use anyhow::{Result, anyhow};
use clap::Parser;
use moonshot_app::{
    create_command_bus, make_command_drain, make_command_submit, spawn_simulation_thread,
};
use moonshot_brain::random_controller;
use moonshot_core::{
    ControlCommand, SimConfig, Simulation, SnapshotCell, SpriteHandle, SpriteSet,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

/// Headless driver evolving rocket controllers toward a soft moon landing.
#[derive(Debug, Parser)]
#[command(name = "moonshot", version, about)]
struct Args {
    /// Number of rockets in the population.
    #[arg(long, default_value_t = 1_000)]
    population: usize,

    /// Number of generations to simulate before exiting.
    #[arg(long, default_value_t = 50)]
    generations: u64,

    /// RNG seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// Run several physics steps per frame.
    #[arg(long)]
    fast_forward: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let sim = bootstrap_simulation(&args)?;
    let population = sim.config().population_size;
    let frame_interval = Duration::from_secs(1) / sim.config().ticks_per_second;
    let snapshots = sim.snapshot_cell();

    let (sender, receiver) = create_command_bus(64);
    let submit = make_command_submit(sender);
    let drain = make_command_drain(receiver);
    submit(ControlCommand::TogglePause);
    if args.fast_forward {
        submit(ControlCommand::ToggleFastForward);
    }

    info!(
        population,
        generations = args.generations,
        "starting moonshot evolution"
    );
    let worker = spawn_simulation_thread(sim, drain, args.generations, frame_interval);
    observe_generations(&snapshots, args.generations, frame_interval);
    let sim = worker
        .join()
        .map_err(|_| anyhow!("simulation thread panicked"))?;
    info!(
        generation = sim.generation(),
        high_score = sim.high_score(),
        "evolution finished"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn bootstrap_simulation(args: &Args) -> Result<Simulation> {
    let config = SimConfig {
        population_size: args.population,
        rng_seed: args.seed,
        ..SimConfig::default()
    };
    // Stable placeholder handles; the headless driver never rasterizes.
    let sprites = SpriteSet {
        earth: SpriteHandle(0),
        moon: SpriteHandle(1),
        rocket: SpriteHandle(2),
        flame: SpriteHandle(3),
    };
    Ok(Simulation::new(config, sprites, random_controller)?)
}

/// Follows published snapshots and logs each completed generation until the
/// simulation thread reaches its target.
fn observe_generations(
    snapshots: &Arc<SnapshotCell>,
    target_generations: u64,
    frame_interval: Duration,
) {
    let mut reported = 0;
    loop {
        let frame = snapshots.load();
        if let Some(summary) = frame.last_summary
            && summary.generation > reported
        {
            reported = summary.generation;
            info!(
                generation = summary.generation,
                best_score = summary.best_score,
                high_score = summary.high_score,
                new_high_score = summary.new_high_score,
                "generation complete"
            );
        }
        if frame.generation >= target_generations {
            break;
        }
        thread::sleep(frame_interval);
    }
}

//! Shared application plumbing for Moonshot control surfaces.

use std::thread;
use std::time::{Duration, Instant};

use moonshot_core::Simulation;

pub mod command;

pub use command::{
    CommandDrain, CommandReceiver, CommandSender, CommandSubmit, create_command_bus,
    drain_pending_commands, make_command_drain, make_command_submit,
};

/// Runs the simulation on its own thread at a fixed frame rate until the
/// target generation is reached, draining queued control commands before
/// every frame. The finished simulation is returned through the handle;
/// observers follow progress via the core's snapshot cell.
pub fn spawn_simulation_thread(
    mut sim: Simulation,
    drain: CommandDrain,
    target_generations: u64,
    frame_interval: Duration,
) -> thread::JoinHandle<Simulation> {
    thread::spawn(move || {
        while sim.generation() < target_generations {
            let frame_start = Instant::now();
            drain(&mut sim);
            sim.tick();
            if let Some(remaining) = frame_interval.checked_sub(frame_start.elapsed()) {
                thread::sleep(remaining);
            }
        }
        sim
    })
}

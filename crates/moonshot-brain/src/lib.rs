//! Neural controllers for Moonshot rockets.
//!
//! The crate provides the feed-forward network behind the default rocket
//! population. Controllers implement [`moonshot_core::Controller`] and are
//! consumed by the simulation as trait objects.

mod dnn;

pub use dnn::DnnController;

use moonshot_core::Controller;
use rand::RngCore;

/// Seeds a boxed feed-forward controller with random parameters.
///
/// Convenience for wiring populations: matches the `seed_controller`
/// signature of [`moonshot_core::Simulation::new`].
#[must_use]
pub fn random_controller(rng: &mut dyn RngCore) -> Box<dyn Controller> {
    Box::new(DnnController::random(rng))
}

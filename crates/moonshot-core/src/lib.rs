//! Core types shared across the Moonshot workspace.
//!
//! One distance unit corresponds to one kilometre, one mass unit to one
//! metric ton, one tick to one fixed-rate physics step. The crate owns the
//! rocket physics and sensor model, the fitness scoring, and the
//! population manager that evolves rocket controllers across generations.
//! Rendering, input handling, and asset loading live behind the snapshot
//! and command boundaries defined here.

use glam::DVec2;
use ordered_float::OrderedFloat;
use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::VecDeque;
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Number of sensor inputs wired into each rocket controller.
pub const INPUT_SIZE: usize = 8;
/// Number of actuation outputs produced by each rocket controller.
pub const OUTPUT_SIZE: usize = 4;
/// Neuron counts per controller layer, fixed for the process lifetime.
pub const LAYER_SIZES: [usize; 3] = [8, 6, 4];
/// Number of addressable camera-focus slots.
pub const FOCUS_SLOTS: usize = 9;

/// Width and height of a rocket.
const ROCKET_SIZE: DVec2 = DVec2::new(400.0, 800.0);
/// Mass of a rocket in metric tons.
const ROCKET_MASS: f64 = 30.0;
/// Maximum thrust force of a rocket.
const MAX_THRUST: f64 = 261.0;
/// Maximum rotation force of a rocket.
const MAX_ROTATION_FORCE: f64 = 0.02;
/// Impact speeds above this mark a moon contact as a crash.
const CRASH_SPEED: f64 = 100.0;
/// Numerator of the one-time landing bonus `K / impact_speed`.
const LANDING_BONUS: f64 = 150_000.0;

/// Clamped linear map underlying both sensing and scoring.
///
/// Values below `in_min` floor to `out_min`, values above `in_max` ceil to
/// `out_max`, values inside interpolate linearly. The output range may be
/// descending (`out_min > out_max`). Callers supply `in_min < in_max`.
#[must_use]
pub fn map_range(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    if value < in_min {
        return out_min;
    }
    if value > in_max {
        return out_max;
    }
    let relative = (value - in_min) / (in_max - in_min);
    out_min + relative * (out_max - out_min)
}

/// Wraps an angle into `[0, 2π)`.
fn wrap_unsigned_angle(mut angle: f64) -> f64 {
    if angle.is_nan() {
        return 0.0;
    }
    while angle < 0.0 {
        angle += TAU;
    }
    while angle >= TAU {
        angle -= TAU;
    }
    angle
}

/// Signed angle from `a` to `b` in `[-π, π]`.
#[must_use]
pub fn angle_between(a: DVec2, b: DVec2) -> f64 {
    a.perp_dot(b).atan2(a.dot(b))
}

/// Opaque visual-resource handle supplied by the asset layer.
///
/// The core never interprets the referenced contents; it only threads the
/// handle through to render snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpriteHandle(pub u32);

/// Sprite handles required to construct a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteSet {
    pub earth: SpriteHandle,
    pub moon: SpriteHandle,
    pub rocket: SpriteHandle,
    pub flame: SpriteHandle,
}

/// Capability interface shared by every physically simulated entity.
pub trait Kinetic {
    fn position(&self) -> DVec2;
    fn velocity(&self) -> DVec2;
    fn rotation(&self) -> f64;
    fn mass(&self) -> f64;
    /// Advances kinematics by one tick.
    fn integrate(&mut self);
}

/// Physical state embedded by rockets and celestial bodies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub position: DVec2,
    pub velocity: DVec2,
    /// Rotation in radians, normalized into `[0, 2π)` after integration.
    pub rotation: f64,
    pub rotational_velocity: f64,
    pub mass: f64,
    pub size: DVec2,
}

impl Body {
    #[must_use]
    pub fn new(
        position: DVec2,
        velocity: DVec2,
        size: DVec2,
        rotation: f64,
        rotational_velocity: f64,
        mass: f64,
    ) -> Self {
        Self {
            position,
            velocity,
            rotation: wrap_unsigned_angle(rotation),
            rotational_velocity,
            mass,
            size,
        }
    }

    /// Applies velocities for one tick and normalizes the rotation.
    pub fn integrate(&mut self) {
        self.position += self.velocity;
        self.rotation = wrap_unsigned_angle(self.rotation + self.rotational_velocity);
    }

    #[must_use]
    pub fn speed(&self) -> f64 {
        self.velocity.length()
    }
}

/// A gravity source such as the earth or the moon.
///
/// Created once at simulation start; immobile in the default configuration
/// even though its kinematics are integrated every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CelestialBody {
    body: Body,
    sprite: SpriteHandle,
}

impl CelestialBody {
    #[must_use]
    pub fn new(
        position: DVec2,
        velocity: DVec2,
        diameter: f64,
        rotation: f64,
        rotational_velocity: f64,
        mass: f64,
        sprite: SpriteHandle,
    ) -> Self {
        Self {
            body: Body::new(
                position,
                velocity,
                DVec2::new(diameter, diameter),
                rotation,
                rotational_velocity,
                mass,
            ),
            sprite,
        }
    }

    #[must_use]
    pub fn radius(&self) -> f64 {
        self.body.size.x * 0.5
    }

    #[must_use]
    pub fn sprite(&self) -> SpriteHandle {
        self.sprite
    }
}

impl Kinetic for CelestialBody {
    fn position(&self) -> DVec2 {
        self.body.position
    }

    fn velocity(&self) -> DVec2 {
        self.body.velocity
    }

    fn rotation(&self) -> f64 {
        self.body.rotation
    }

    fn mass(&self) -> f64 {
        self.body.mass
    }

    fn integrate(&mut self) {
        self.body.integrate();
    }
}

/// Inverse-square gravitational acceleration toward `body` at `point`.
///
/// Coincident positions yield exactly zero rather than a division by zero.
#[must_use]
pub fn gravity_accel(point: DVec2, body: &impl Kinetic, scale: f64) -> DVec2 {
    let offset = body.position() - point;
    let dist_sq = offset.length_squared();
    if dist_sq == 0.0 {
        return DVec2::ZERO;
    }
    offset * (scale * body.mass() / (dist_sq * dist_sq.sqrt()))
}

/// Interface implemented by rocket controllers.
///
/// `evaluate` is a pure function of the controller parameters and the input
/// vector; `mutate` returns an independent controller sharing no mutable
/// state with the receiver. Neither suspends or blocks.
pub trait Controller: Send + Sync {
    /// Maps an 8-element observation onto 4 actuation outputs.
    fn evaluate(&self, inputs: &[f64; INPUT_SIZE]) -> [f64; OUTPUT_SIZE];

    /// Produces a cloned controller perturbed by noise scaled by `rate`.
    fn mutate(&self, rate: f64, rng: &mut dyn RngCore) -> Box<dyn Controller>;
}

/// Read-only world data a rocket ticks against.
#[derive(Debug, Clone, Copy)]
pub struct WorldContext {
    pub earth: CelestialBody,
    pub moon: CelestialBody,
    pub gravity_scale: f64,
    pub launch_position: DVec2,
}

/// A controller-driven rocket competing for score.
pub struct Rocket {
    body: Body,
    controller: Box<dyn Controller>,
    thrust: f64,
    rotation_force: f64,
    score: f64,
    landed: bool,
    crashed: bool,
    sprite: SpriteHandle,
    flame_sprite: SpriteHandle,
}

impl fmt::Debug for Rocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rocket")
            .field("body", &self.body)
            .field("thrust", &self.thrust)
            .field("score", &self.score)
            .field("landed", &self.landed)
            .field("crashed", &self.crashed)
            .finish()
    }
}

impl Rocket {
    #[must_use]
    pub fn new(
        position: DVec2,
        rotation: f64,
        controller: Box<dyn Controller>,
        sprite: SpriteHandle,
        flame_sprite: SpriteHandle,
    ) -> Self {
        Self {
            body: Body::new(position, DVec2::ZERO, ROCKET_SIZE, rotation, 0.0, ROCKET_MASS),
            controller,
            thrust: 0.0,
            rotation_force: 0.0,
            score: 0.0,
            landed: false,
            crashed: false,
            sprite,
            flame_sprite,
        }
    }

    /// Runs one full sense/infer/actuate/integrate/collide/score cycle.
    pub fn tick(&mut self, world: &WorldContext) {
        let inputs = self.sense(world);
        let outputs = self.controller.evaluate(&inputs);
        self.apply_outputs(outputs);

        self.body.velocity += gravity_accel(self.body.position, &world.earth, world.gravity_scale)
            + gravity_accel(self.body.position, &world.moon, world.gravity_scale)
            + DVec2::from_angle(self.body.rotation - FRAC_PI_2) * (self.thrust / self.body.mass);
        self.body.rotational_velocity += self.rotation_force / self.body.mass;
        self.body.integrate();

        self.tick_collisions(world);
        self.tick_score(&world.moon);
    }

    /// Builds the 8-element observation vector, each channel rescaled into
    /// `[0, 1]` by the clamped linear map.
    fn sense(&self, world: &WorldContext) -> [f64; INPUT_SIZE] {
        let moon_offset = world.moon.position() - self.body.position;
        let earth_offset = world.earth.position() - self.body.position;
        [
            map_range(self.body.speed(), 0.0, 10_000.0, 0.0, 1.0),
            map_range(self.body.velocity.to_angle(), -PI, PI, 0.0, 1.0),
            map_range(self.body.rotation, 0.0, TAU, 0.0, 1.0),
            map_range(self.body.rotational_velocity, -10.0, 10.0, 0.0, 1.0),
            map_range(moon_offset.length(), 0.0, 1_000_000.0, 0.0, 1.0),
            map_range(moon_offset.to_angle(), -PI, PI, 0.0, 1.0),
            map_range(earth_offset.length(), 0.0, 1_000_000.0, 0.0, 1.0),
            map_range(earth_offset.to_angle(), -PI, PI, 0.0, 1.0),
        ]
    }

    /// Converts controller outputs into thrust and rotation force.
    fn apply_outputs(&mut self, outputs: [f64; OUTPUT_SIZE]) {
        self.thrust = thrust_for(outputs[0]);

        let accel_left = map_range(outputs[1], 0.0, 1.0, 0.0, 1.0);
        let accel_right = map_range(outputs[2], 0.0, 1.0, 0.0, 1.0);
        let brake = map_range(outputs[3], 0.0, 1.0, 0.0, 1.0);

        self.rotation_force = if brake > 0.5 {
            // Proportional brake damping existing spin toward zero.
            map_range(
                self.body.rotational_velocity,
                -10.0,
                10.0,
                MAX_ROTATION_FORCE / self.body.mass,
                -MAX_ROTATION_FORCE / self.body.mass,
            )
        } else if accel_left > accel_right {
            accel_left * MAX_ROTATION_FORCE
        } else {
            -accel_right * MAX_ROTATION_FORCE
        };
    }

    /// Handles contact with the earth (hard launch reset) and the moon
    /// (crash or one-time landing bonus).
    fn tick_collisions(&mut self, world: &WorldContext) {
        let earth_offset = world.earth.position() - self.body.position;
        if earth_offset.length_squared() < world.earth.radius().powi(2) {
            self.body.position = world.launch_position;
            self.body.rotation = 0.0;
            self.body.rotational_velocity = 0.0;
            self.body.velocity = DVec2::ZERO;
        }

        let moon_offset = world.moon.position() - self.body.position;
        if moon_offset.length_squared() < world.moon.radius().powi(2) {
            let impact_speed = self.body.speed();
            if impact_speed > CRASH_SPEED {
                self.crashed = true;
            } else if !self.landed {
                self.score += LANDING_BONUS / impact_speed;
            }
            self.landed = true;

            self.body.velocity = DVec2::ZERO;
            self.body.rotational_velocity = 0.0;
            self.thrust = 0.0;
        }
    }

    /// Accumulates the shaped reward terms for this tick.
    fn tick_score(&mut self, moon: &CelestialBody) {
        let moon_offset = moon.position() - self.body.position;
        let moon_distance = moon_offset.length();
        let moon_radius = moon.radius();

        // Distance to moon.
        let score_dtm = if moon_distance < moon_radius {
            0.0
        } else {
            map_range(moon_distance, moon_radius, 300_000.0, 5.0, 0.0)
        };

        // Angle between facing direction and moon.
        let facing = DVec2::from_angle(self.body.rotation).rotate(DVec2::Y);
        let score_fdm = map_range(angle_between(moon_offset, facing).abs(), 0.0, PI, 20.0, 0.0);

        // Angle between moving direction and moon.
        let score_mdm = if self.body.velocity.length_squared() == 0.0 {
            0.0
        } else {
            map_range(
                angle_between(moon_offset, self.body.velocity).abs(),
                0.0,
                PI,
                40.0,
                0.0,
            )
        };

        // Speed.
        let score_spd = map_range(self.body.speed(), 0.0, 10_000.0, 80.0, 0.0);

        // Rotation speed.
        let score_rts = map_range(self.body.rotational_velocity.abs(), 0.0, 10.0, 40.0, 0.0);

        if moon_distance >= moon_radius {
            self.score += score_dtm + score_mdm + score_rts;
        }
        if moon_distance < 100_000.0 && moon_distance >= moon_radius {
            self.score += score_spd;
        }
        // The speed term intentionally counts a second time inside 20,000.
        if moon_distance < 20_000.0 && moon_distance >= moon_radius {
            self.score += score_fdm + score_spd;
        }
    }

    /// Restores launch state while preserving the controller.
    pub fn reset(&mut self, launch_position: DVec2) {
        self.body.position = launch_position;
        self.body.velocity = DVec2::ZERO;
        self.body.rotation = 0.0;
        self.body.rotational_velocity = 0.0;
        self.thrust = 0.0;
        self.rotation_force = 0.0;
        self.score = 0.0;
        self.landed = false;
        self.crashed = false;
    }

    /// Creates a fresh rocket at launch state with a cloned-and-perturbed
    /// controller. The receiver is left unmodified.
    #[must_use]
    pub fn mutated(&self, rate: f64, rng: &mut dyn RngCore, launch_position: DVec2) -> Self {
        Self::new(
            launch_position,
            0.0,
            self.controller.mutate(rate, rng),
            self.sprite,
            self.flame_sprite,
        )
    }

    /// Scalar state copied into render snapshots.
    #[must_use]
    pub fn snapshot(&self) -> RocketSnapshot {
        RocketSnapshot {
            position: self.body.position,
            velocity: self.body.velocity,
            rotation: self.body.rotation,
            thrust: self.thrust,
            score: self.score,
            landed: self.landed,
            crashed: self.crashed,
        }
    }

    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn thrust(&self) -> f64 {
        self.thrust
    }

    #[must_use]
    pub fn landed(&self) -> bool {
        self.landed
    }

    #[must_use]
    pub fn crashed(&self) -> bool {
        self.crashed
    }

    #[must_use]
    pub fn rotational_velocity(&self) -> f64 {
        self.body.rotational_velocity
    }

    #[must_use]
    pub fn controller(&self) -> &dyn Controller {
        &*self.controller
    }

    #[must_use]
    pub fn sprite(&self) -> SpriteHandle {
        self.sprite
    }

    #[must_use]
    pub fn flame_sprite(&self) -> SpriteHandle {
        self.flame_sprite
    }
}

impl Kinetic for Rocket {
    fn position(&self) -> DVec2 {
        self.body.position
    }

    fn velocity(&self) -> DVec2 {
        self.body.velocity
    }

    fn rotation(&self) -> f64 {
        self.body.rotation
    }

    fn mass(&self) -> f64 {
        self.body.mass
    }

    fn integrate(&mut self) {
        self.body.integrate();
    }
}

/// Geometric walk selecting a removal index: start at the tail, step one
/// position toward the head with probability 1/2 per step, and wrap back
/// to the tail if the walk runs past index 0.
fn cull_index(len: usize, rng: &mut (impl Rng + ?Sized)) -> usize {
    let mut index = len as i64 - 1;
    while rng.random::<f64>() > 0.5 {
        index -= 1;
    }
    if index < 0 {
        index = len as i64 - 1;
    }
    index as usize
}

/// Thrust response to the first controller output: off below 0.5, full up
/// to 0.75, then linearly decreasing back to zero. The cutoff above 0.75 is
/// part of the observed control surface, not an error.
fn thrust_for(signal: f64) -> f64 {
    if signal < 0.5 {
        0.0
    } else if signal < 0.75 {
        MAX_THRUST
    } else {
        map_range(signal, 0.75, 1.0, MAX_THRUST, 0.0)
    }
}

/// Errors produced by simulation construction.
#[derive(Debug, Error)]
pub enum SimError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A focus list was built with more targets than addressable slots.
    #[error("focus list holds {count} targets but only {FOCUS_SLOTS} slots are addressable")]
    TooManyFocusTargets { count: usize },
}

/// Static configuration for a Moonshot simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of rockets in the population.
    pub population_size: usize,
    /// Canonical launch position for every rocket.
    pub launch_position: DVec2,
    /// Centre position of the earth.
    pub earth_position: DVec2,
    /// Diameter of the earth in kilometres.
    pub earth_diameter: f64,
    /// Mass of the earth in metric tons.
    pub earth_mass: f64,
    /// Centre position of the moon.
    pub moon_position: DVec2,
    /// Diameter of the moon in kilometres.
    pub moon_diameter: f64,
    /// Mass of the moon in metric tons.
    pub moon_mass: f64,
    /// Per-tick gravitational constant for km/ton units.
    pub gravity_scale: f64,
    /// Fixed physics rate driven by the outer clock.
    pub ticks_per_second: u32,
    /// Seconds of simulated time between generation rollovers.
    pub generation_seconds: u32,
    /// Inner steps per frame while fast-forward is active.
    pub fast_forward_factor: u32,
    /// Upper bound of the uniform mutation magnitude draw.
    pub mutation_magnitude: f64,
    /// Maximum number of generation summaries retained in memory.
    pub history_capacity: usize,
    /// Optional RNG seed; entropy-seeded when absent.
    pub rng_seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            population_size: 1_000,
            launch_position: DVec2::new(0.0, -0.5 * 12_742.0 - 400.0),
            earth_position: DVec2::ZERO,
            earth_diameter: 12_742.0,
            earth_mass: 5.972e21,
            moon_position: DVec2::new(0.0, -384_400.0),
            moon_diameter: 3_474.2,
            moon_mass: 7.349e19,
            gravity_scale: 4.0e-14,
            ticks_per_second: 60,
            generation_seconds: 20,
            fast_forward_factor: 4,
            mutation_magnitude: 0.1,
            history_capacity: 256,
            rng_seed: None,
        }
    }
}

impl SimConfig {
    fn validate(&self) -> Result<(), SimError> {
        if self.population_size == 0 {
            return Err(SimError::InvalidConfig("population_size must be non-zero"));
        }
        if self.earth_diameter <= 0.0 || self.moon_diameter <= 0.0 {
            return Err(SimError::InvalidConfig("body diameters must be positive"));
        }
        if self.earth_mass <= 0.0 || self.moon_mass <= 0.0 {
            return Err(SimError::InvalidConfig("body masses must be positive"));
        }
        if self.gravity_scale <= 0.0 {
            return Err(SimError::InvalidConfig("gravity_scale must be positive"));
        }
        if self.ticks_per_second == 0 || self.generation_seconds == 0 {
            return Err(SimError::InvalidConfig(
                "tick rate and generation period must be non-zero",
            ));
        }
        if self.fast_forward_factor == 0 {
            return Err(SimError::InvalidConfig(
                "fast_forward_factor must be at least one",
            ));
        }
        if self.mutation_magnitude <= 0.0 || self.mutation_magnitude >= 1.0 {
            return Err(SimError::InvalidConfig(
                "mutation_magnitude must lie in (0, 1)",
            ));
        }
        if self.history_capacity == 0 {
            return Err(SimError::InvalidConfig("history_capacity must be non-zero"));
        }
        Ok(())
    }

    /// Simulated ticks between generation rollovers.
    #[must_use]
    pub fn generation_period_ticks(&self) -> u64 {
        u64::from(self.ticks_per_second) * u64::from(self.generation_seconds)
    }

    /// Returns the configured RNG, seeding from entropy if no seed is set.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// A named camera-focus target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusTarget {
    pub name: String,
    pub position: DVec2,
}

/// Fixed list of focusable positions addressed by slot index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusTargets {
    targets: Vec<FocusTarget>,
}

impl FocusTargets {
    /// Builds a focus list. More than [`FOCUS_SLOTS`] targets is a fatal
    /// construction-time error.
    pub fn new(targets: Vec<FocusTarget>) -> Result<Self, SimError> {
        if targets.len() > FOCUS_SLOTS {
            return Err(SimError::TooManyFocusTargets {
                count: targets.len(),
            });
        }
        Ok(Self { targets })
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&FocusTarget> {
        self.targets.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Scalar rocket state published to the render path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocketSnapshot {
    pub position: DVec2,
    pub velocity: DVec2,
    pub rotation: f64,
    pub thrust: f64,
    pub score: f64,
    pub landed: bool,
    pub crashed: bool,
}

/// Record emitted at each generation rollover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: u64,
    pub tick: u64,
    pub best_score: f64,
    pub high_score: f64,
    pub new_high_score: bool,
    pub population: usize,
}

/// Complete, consistent view of the simulation published after each frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub tick: u64,
    pub generation: u64,
    pub high_score: f64,
    pub paused: bool,
    pub auto_cam: bool,
    pub fast_forward: bool,
    pub render_all: bool,
    pub show_gravity_field: bool,
    pub show_grid: bool,
    pub camera_aim: Option<DVec2>,
    pub rockets: Vec<RocketSnapshot>,
    pub best_index: Option<usize>,
    pub prev_best: Option<RocketSnapshot>,
    pub last_summary: Option<GenerationSummary>,
}

/// Atomically swapped snapshot cell bridging the simulation and render
/// paths.
///
/// The writer publishes a freshly built immutable snapshot; readers clone
/// the current `Arc` and never observe torn state. The lock is held only
/// for the pointer swap, so no reader blocks on a generation rollover.
#[derive(Debug)]
pub struct SnapshotCell {
    current: RwLock<Arc<FrameSnapshot>>,
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCell {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(FrameSnapshot::default())),
        }
    }

    pub fn publish(&self, snapshot: FrameSnapshot) {
        let next = Arc::new(snapshot);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = next;
    }

    #[must_use]
    pub fn load(&self) -> Arc<FrameSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Imperative commands accepted from input surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCommand {
    /// Aim the camera at the focus target in the given slot.
    Focus(usize),
    TogglePause,
    ToggleAutoCam,
    ToggleFastForward,
    ToggleRenderAll,
    ToggleGravityField,
    ToggleGrid,
    /// Manually trigger a generation rollover.
    NextGeneration,
}

/// Applies a control command to the simulation. Commands are plain state
/// mutations with no return value.
pub fn apply_control_command(sim: &mut Simulation, command: ControlCommand) {
    match command {
        ControlCommand::Focus(index) => sim.focus(index),
        ControlCommand::TogglePause => sim.toggle_pause(),
        ControlCommand::ToggleAutoCam => sim.toggle_auto_cam(),
        ControlCommand::ToggleFastForward => sim.toggle_fast_forward(),
        ControlCommand::ToggleRenderAll => sim.toggle_render_all(),
        ControlCommand::ToggleGravityField => sim.toggle_gravity_field(),
        ControlCommand::ToggleGrid => sim.toggle_grid(),
        ControlCommand::NextGeneration => sim.request_next_generation(),
    }
}

/// The simulation context: celestial bodies, the rocket population, and the
/// genetic-algorithm generation cycle.
///
/// All mutable state is owned by the simulation thread; the render path
/// observes it exclusively through [`SnapshotCell`].
pub struct Simulation {
    config: SimConfig,
    rng: SmallRng,
    earth: CelestialBody,
    moon: CelestialBody,
    rockets: Vec<Rocket>,
    focus_targets: FocusTargets,
    camera_aim: Option<DVec2>,
    paused: bool,
    auto_cam: bool,
    fast_forward: bool,
    render_all: bool,
    show_gravity_field: bool,
    show_grid: bool,
    ticks: u64,
    generation: u64,
    prev_best: Option<RocketSnapshot>,
    high_score: f64,
    history: VecDeque<GenerationSummary>,
    snapshots: Arc<SnapshotCell>,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .field("ticks", &self.ticks)
            .field("generation", &self.generation)
            .field("population", &self.rockets.len())
            .field("high_score", &self.high_score)
            .finish()
    }
}

impl Simulation {
    /// Builds a simulation with a full population seeded by `seed_controller`.
    pub fn new(
        config: SimConfig,
        sprites: SpriteSet,
        mut seed_controller: impl FnMut(&mut dyn RngCore) -> Box<dyn Controller>,
    ) -> Result<Self, SimError> {
        config.validate()?;
        let mut rng = config.seeded_rng();

        let earth = CelestialBody::new(
            config.earth_position,
            DVec2::ZERO,
            config.earth_diameter,
            0.0,
            0.0,
            config.earth_mass,
            sprites.earth,
        );
        let moon = CelestialBody::new(
            config.moon_position,
            DVec2::ZERO,
            config.moon_diameter,
            0.0,
            0.0,
            config.moon_mass,
            sprites.moon,
        );

        let mut rockets = Vec::with_capacity(config.population_size);
        while rockets.len() < config.population_size {
            rockets.push(Rocket::new(
                config.launch_position,
                0.0,
                seed_controller(&mut rng),
                sprites.rocket,
                sprites.flame,
            ));
        }

        let focus_targets = FocusTargets::new(vec![
            FocusTarget {
                name: "earth".to_string(),
                position: earth.position(),
            },
            FocusTarget {
                name: "moon".to_string(),
                position: moon.position(),
            },
        ])?;

        let history_capacity = config.history_capacity;
        let sim = Self {
            config,
            rng,
            earth,
            moon,
            rockets,
            focus_targets,
            camera_aim: None,
            paused: true,
            auto_cam: true,
            fast_forward: false,
            render_all: true,
            show_gravity_field: false,
            show_grid: true,
            ticks: 0,
            generation: 0,
            prev_best: None,
            high_score: f64::NEG_INFINITY,
            history: VecDeque::with_capacity(history_capacity),
            snapshots: Arc::new(SnapshotCell::new()),
        };
        sim.publish();
        Ok(sim)
    }

    /// Advances one frame: camera bookkeeping always runs, physics only
    /// while unpaused (several inner steps in fast-forward), and a fresh
    /// snapshot is published at the end.
    pub fn tick(&mut self) {
        self.tick_auto_cam();

        if !self.paused {
            let steps = if self.fast_forward {
                self.config.fast_forward_factor
            } else {
                1
            };
            for _ in 0..steps {
                self.tick_simulation();
            }
        }

        self.publish();
    }

    /// One simulated physics step across all bodies and rockets.
    fn tick_simulation(&mut self) {
        self.ticks += 1;
        self.earth.integrate();
        self.moon.integrate();

        // Rocket ticks are independent of one another; the only shared
        // state is the read-only pair of gravity sources.
        let world = self.world_context();
        self.rockets
            .par_iter_mut()
            .for_each(|rocket| rocket.tick(&world));

        if self.ticks % self.config.generation_period_ticks() == 0 {
            self.next_generation();
        }
    }

    /// Runs the select/cull/repopulate/reset cycle and increments the
    /// generation counter unconditionally.
    fn next_generation(&mut self) {
        self.generation += 1;

        self.rockets
            .sort_by_key(|rocket| Reverse(OrderedFloat(rocket.score())));
        self.cull_weak();
        self.repopulate();

        let best = self.rockets.first().map(Rocket::snapshot);
        if let Some(snapshot) = best {
            let new_high_score = snapshot.score > self.high_score;
            if new_high_score {
                self.high_score = snapshot.score;
            }
            let summary = GenerationSummary {
                generation: self.generation,
                tick: self.ticks,
                best_score: snapshot.score,
                high_score: self.high_score,
                new_high_score,
                population: self.rockets.len(),
            };
            if self.history.len() == self.config.history_capacity {
                self.history.pop_front();
            }
            self.history.push_back(summary);
        }
        self.prev_best = best;

        let launch = self.config.launch_position;
        for rocket in &mut self.rockets {
            rocket.reset(launch);
        }
    }

    /// Removes a third of the population, biased toward the low-score tail
    /// via an unbounded geometric walk that wraps past the head back to the
    /// tail. The wrap is part of the selection-pressure shape.
    fn cull_weak(&mut self) {
        let removals = self.config.population_size / 3;
        for _ in 0..removals {
            let index = cull_index(self.rockets.len(), &mut self.rng);
            self.rockets.remove(index);
        }
    }

    /// Refills the population to capacity with mutations of the best
    /// survivor, each drawn with a fresh uniform mutation magnitude.
    fn repopulate(&mut self) {
        while self.rockets.len() < self.config.population_size {
            let rate = self.rng.random::<f64>() * self.config.mutation_magnitude;
            let child = match self.rockets.first() {
                Some(best) => best.mutated(rate, &mut self.rng, self.config.launch_position),
                None => return,
            };
            self.rockets.push(child);
        }
    }

    /// Centres the camera aim on the interest bounds: previous best and the
    /// moon when a previous best exists, otherwise the whole population.
    fn tick_auto_cam(&mut self) {
        if !self.auto_cam {
            return;
        }

        self.camera_aim = if let Some(prev) = &self.prev_best {
            let min = prev.position.min(self.moon.position());
            let max = prev.position.max(self.moon.position());
            Some((min + max) * 0.5)
        } else {
            let mut min = DVec2::splat(f64::MAX);
            let mut max = DVec2::splat(f64::MIN);
            for rocket in &self.rockets {
                min = min.min(rocket.position());
                max = max.max(rocket.position());
            }
            if self.rockets.is_empty() {
                None
            } else {
                Some((min + max) * 0.5)
            }
        };
    }

    fn world_context(&self) -> WorldContext {
        WorldContext {
            earth: self.earth,
            moon: self.moon,
            gravity_scale: self.config.gravity_scale,
            launch_position: self.config.launch_position,
        }
    }

    fn publish(&self) {
        let rockets: Vec<RocketSnapshot> = self.rockets.iter().map(Rocket::snapshot).collect();
        let best_index = rockets
            .iter()
            .enumerate()
            .max_by_key(|(_, rocket)| OrderedFloat(rocket.score))
            .map(|(index, _)| index);
        self.snapshots.publish(FrameSnapshot {
            tick: self.ticks,
            generation: self.generation,
            high_score: self.high_score,
            paused: self.paused,
            auto_cam: self.auto_cam,
            fast_forward: self.fast_forward,
            render_all: self.render_all,
            show_gravity_field: self.show_gravity_field,
            show_grid: self.show_grid,
            camera_aim: self.camera_aim,
            rockets,
            best_index,
            prev_best: self.prev_best,
            last_summary: self.history.back().copied(),
        });
    }

    /// Handle readers use to observe published frames.
    #[must_use]
    pub fn snapshot_cell(&self) -> Arc<SnapshotCell> {
        Arc::clone(&self.snapshots)
    }

    /// Total gravitational acceleration at an arbitrary point, for field
    /// visualization.
    #[must_use]
    pub fn gravity_sample(&self, point: DVec2) -> DVec2 {
        gravity_accel(point, &self.earth, self.config.gravity_scale)
            + gravity_accel(point, &self.moon, self.config.gravity_scale)
    }

    /// Aims the camera at a focus slot; out-of-range slots are ignored.
    pub fn focus(&mut self, index: usize) {
        if let Some(target) = self.focus_targets.get(index) {
            self.camera_aim = Some(target.position);
        }
    }

    /// Manually triggers a generation rollover.
    pub fn request_next_generation(&mut self) {
        self.next_generation();
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn toggle_auto_cam(&mut self) {
        self.auto_cam = !self.auto_cam;
    }

    pub fn toggle_fast_forward(&mut self) {
        self.fast_forward = !self.fast_forward;
    }

    pub fn toggle_render_all(&mut self) {
        self.render_all = !self.render_all;
    }

    pub fn toggle_gravity_field(&mut self) {
        self.show_gravity_field = !self.show_gravity_field;
    }

    pub fn toggle_grid(&mut self) {
        self.show_grid = !self.show_grid;
    }

    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    #[must_use]
    pub fn earth(&self) -> &CelestialBody {
        &self.earth
    }

    #[must_use]
    pub fn moon(&self) -> &CelestialBody {
        &self.moon
    }

    #[must_use]
    pub fn rockets(&self) -> &[Rocket] {
        &self.rockets
    }

    #[must_use]
    pub fn focus_targets(&self) -> &FocusTargets {
        &self.focus_targets
    }

    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn high_score(&self) -> f64 {
        self.high_score
    }

    #[must_use]
    pub fn prev_best(&self) -> Option<&RocketSnapshot> {
        self.prev_best.as_ref()
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub const fn is_fast_forward(&self) -> bool {
        self.fast_forward
    }

    /// Iterate over retained generation summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &GenerationSummary> {
        self.history.iter()
    }
}

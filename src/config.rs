//! World and solver tuning.
//!
//! Both structs are plain data with public fields and `with_*` builders. The
//! world reads them at the start of every step, so fields may be changed in
//! place between steps.

use nalgebra::Vector3;

use crate::collision::BoxContactMode;

/// Sequential-impulse solver parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// Velocity iterations per step (contacts then joints each iteration).
    pub iterations: u32,
    /// Fraction of the penetration error fed back as velocity bias.
    pub baumgarte: f32,
    /// Allowed penetration before bias or positional correction kicks in.
    pub slop: f32,
    /// Closing speed above which restitution is applied.
    pub restitution_threshold: f32,
    /// Share of the remaining overlap removed by each positional correction pass.
    pub correction_percent: f32,
    /// Most positional correction passes per step.
    pub position_iterations: u32,
    /// Solve Baumgarte feedback on a position-only velocity instead of the
    /// real one, so resting contacts end the step without a separating speed.
    pub split_impulse: bool,
    /// Max distance between old and new contact points for impulse carry-over.
    pub warm_start_radius: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            iterations: 8,
            baumgarte: 0.2,
            slop: 0.001,
            restitution_threshold: 1.0,
            correction_percent: 0.4,
            position_iterations: 20,
            split_impulse: true,
            warm_start_radius: 0.01,
        }
    }
}

impl SolverConfig {
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_baumgarte(mut self, baumgarte: f32) -> Self {
        self.baumgarte = baumgarte.max(0.0);
        self
    }

    pub fn with_slop(mut self, slop: f32) -> Self {
        self.slop = slop.max(0.0);
        self
    }

    pub fn with_restitution_threshold(mut self, threshold: f32) -> Self {
        self.restitution_threshold = threshold.max(0.0);
        self
    }

    /// Clamped to `0.0..=1.0`.
    pub fn with_correction_percent(mut self, percent: f32) -> Self {
        self.correction_percent = percent.clamp(0.0, 1.0);
        self
    }

    pub fn with_position_iterations(mut self, iterations: u32) -> Self {
        self.position_iterations = iterations;
        self
    }

    pub fn with_split_impulse(mut self, split: bool) -> Self {
        self.split_impulse = split;
        self
    }

    pub fn with_warm_start_radius(mut self, radius: f32) -> Self {
        self.warm_start_radius = radius.max(0.0);
        self
    }
}

/// Top-level simulation parameters for a [`PhysicsWorld`](crate::world::PhysicsWorld).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldConfig {
    pub gravity: Vector3<f32>,
    /// Fixed step size in seconds. `0.0` makes `update_fixed` take one
    /// variable step of the frame delta instead.
    pub fixed_time_step: f32,
    /// Most fixed steps drained by one `update_fixed` call.
    pub max_substeps: u32,
    pub solver: SolverConfig,
    /// Seconds a body must stay below both sleep thresholds before it sleeps.
    pub sleep_time: f32,
    /// Squared linear speed below which a body counts as resting.
    pub sleep_linear_threshold: f32,
    /// Squared angular speed below which a body counts as resting.
    pub sleep_angular_threshold: f32,
    /// A sleeping body touched with at least this relative normal speed wakes up.
    pub wake_relative_speed: f32,
    /// Contact generation for box/box pairs.
    pub box_contacts: BoxContactMode,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, -9.81, 0.0),
            fixed_time_step: 1.0 / 60.0,
            max_substeps: 3,
            solver: SolverConfig::default(),
            sleep_time: 0.5,
            sleep_linear_threshold: 1e-4,
            sleep_angular_threshold: 1e-4,
            wake_relative_speed: 0.1,
            box_contacts: BoxContactMode::ReferenceOnA,
        }
    }
}

impl WorldConfig {
    pub fn with_gravity(mut self, gravity: Vector3<f32>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Negative values are treated as `0.0` (variable stepping).
    pub fn with_fixed_time_step(mut self, dt: f32) -> Self {
        self.fixed_time_step = dt.max(0.0);
        self
    }

    pub fn with_max_substeps(mut self, max_substeps: u32) -> Self {
        self.max_substeps = max_substeps;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_sleep_time(mut self, seconds: f32) -> Self {
        self.sleep_time = seconds.max(0.0);
        self
    }

    pub fn with_sleep_thresholds(mut self, linear: f32, angular: f32) -> Self {
        self.sleep_linear_threshold = linear.max(0.0);
        self.sleep_angular_threshold = angular.max(0.0);
        self
    }

    pub fn with_wake_relative_speed(mut self, speed: f32) -> Self {
        self.wake_relative_speed = speed.max(0.0);
        self
    }

    pub fn with_box_contacts(mut self, mode: BoxContactMode) -> Self {
        self.box_contacts = mode;
        self
    }
}

//! The physics world: body and joint storage, the fixed-timestep accumulator
//! and the per-step pipeline.
//!
//! # Example
//! ```
//! use embedded_3dphysics::{PhysicsWorld, RigidBody, Shape};
//! use nalgebra::Vector3;
//!
//! // Up to 8 bodies, 2 joints and 16 manifolds per step.
//! let mut world = PhysicsWorld::<8, 2, 16>::new();
//!
//! let ground = world
//!     .add_body(RigidBody::new_static(Shape::cuboid(10.0, 0.5, 10.0)).with_position(Vector3::new(0.0, -0.5, 0.0)))
//!     .unwrap();
//! let ball = world
//!     .add_body(RigidBody::new(Shape::sphere(0.5), 1.0).with_position(Vector3::new(0.0, 3.0, 0.0)))
//!     .unwrap();
//!
//! for _ in 0..120 {
//!     world.update_fixed(1.0 / 60.0);
//! }
//! assert!(world.body(ball).unwrap().position.y < 3.0);
//! assert!(world.body(ground).is_some());
//! ```

use log::{debug, trace, warn};
use nalgebra::Vector3;

use crate::arena::Arena;
use crate::body::{BodyHandle, RigidBody};
use crate::collision::{bounds_overlap, collide_with, should_test_pair};
use crate::config::WorldConfig;
use crate::constraint::{Constraint, ConstraintHandle, DistanceConstraint};
use crate::contact::CollisionInfo;
use crate::perfcounter::{StepTimings, Stopwatch};
use crate::raycast::{self, Ray, RaycastHit};
use crate::solver::ContactSolver;

/// Rigid-body simulation with fixed capacities.
///
/// # Type Parameters
/// * `N` - Maximum number of bodies.
/// * `M` - Maximum number of joints.
/// * `C` - Maximum number of contact manifolds per step. Pairs beyond this
///   are dropped for the step with a warning.
pub struct PhysicsWorld<const N: usize, const M: usize = 0, const C: usize = 32> {
    bodies: Arena<RigidBody, N>,
    constraints: Arena<Constraint, M>,
    manifolds: heapless::Vec<CollisionInfo, C>,
    previous_manifolds: heapless::Vec<CollisionInfo, C>,
    pub config: WorldConfig,
    accumulator: f32,
    step_count: u64,
    timings: StepTimings,
}

impl<const N: usize, const M: usize, const C: usize> Default for PhysicsWorld<N, M, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, const M: usize, const C: usize> PhysicsWorld<N, M, C> {
    /// Create an empty world with [`WorldConfig::default`] (earth gravity, 60 Hz).
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            bodies: Arena::new(),
            constraints: Arena::new(),
            manifolds: heapless::Vec::new(),
            previous_manifolds: heapless::Vec::new(),
            config,
            accumulator: 0.0,
            step_count: 0,
            timings: StepTimings::default(),
        }
    }

    // -- Configuration --

    pub fn set_gravity(&mut self, gravity: Vector3<f32>) {
        self.config.gravity = gravity;
    }

    pub fn gravity(&self) -> Vector3<f32> {
        self.config.gravity
    }

    /// `0.0` switches `update_fixed` to variable stepping.
    pub fn set_fixed_time_step(&mut self, dt: f32) {
        self.config.fixed_time_step = dt.max(0.0);
    }

    pub fn fixed_time_step(&self) -> f32 {
        self.config.fixed_time_step
    }

    // -- Bodies --

    /// Add a body. Returns `None` if the world is full.
    pub fn add_body(&mut self, body: RigidBody) -> Option<BodyHandle> {
        let handle = self.bodies.insert(body).map(BodyHandle);
        if handle.is_none() {
            warn!("body capacity {} reached, body not added", N);
        }
        handle
    }

    /// Remove a body and every manifold that references it.
    ///
    /// Joints attached to the body stay registered but stop doing anything.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        if self.bodies.remove(handle.0).is_none() {
            return false;
        }
        self.manifolds.retain(|m| !m.involves(handle));
        self.previous_manifolds.retain(|m| !m.involves(handle));
        true
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle.0)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle.0)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> {
        self.bodies.iter().map(|(i, b)| (BodyHandle(i), b))
    }

    pub fn bodies_mut(&mut self) -> impl Iterator<Item = (BodyHandle, &mut RigidBody)> {
        self.bodies.iter_mut().map(|(i, b)| (BodyHandle(i), b))
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Bodies that are dynamic and not asleep.
    pub fn awake_body_count(&self) -> usize {
        self.bodies.iter().filter(|(_, b)| b.is_awake_dynamic()).count()
    }

    // -- Constraints --

    /// Register a joint. Returns `None` if the joint storage is full.
    pub fn add_constraint(&mut self, constraint: Constraint) -> Option<ConstraintHandle> {
        let handle = self.constraints.insert(constraint).map(ConstraintHandle);
        if handle.is_none() {
            warn!("constraint capacity {} reached, joint not added", M);
        }
        handle
    }

    /// Rod joint whose rest length is the current anchor distance.
    ///
    /// Anchors are in each body's local space. Returns `None` if either body
    /// is missing or the joint storage is full.
    pub fn add_distance_constraint(
        &mut self,
        body_a: BodyHandle,
        body_b: BodyHandle,
        local_anchor_a: Vector3<f32>,
        local_anchor_b: Vector3<f32>,
    ) -> Option<ConstraintHandle> {
        let a = self.bodies.get(body_a.0)?;
        let b = self.bodies.get(body_b.0)?;
        let joint = DistanceConstraint::from_current(body_a, a, body_b, b, local_anchor_a, local_anchor_b);
        self.add_constraint(Constraint::Distance(joint))
    }

    /// Ball-socket joint pinning both bodies at the world-space `pivot`.
    pub fn add_point_constraint(
        &mut self,
        body_a: BodyHandle,
        body_b: BodyHandle,
        pivot: Vector3<f32>,
    ) -> Option<ConstraintHandle> {
        let local_a = self.bodies.get(body_a.0)?.world_to_local(&pivot);
        let local_b = self.bodies.get(body_b.0)?.world_to_local(&pivot);
        self.add_constraint(Constraint::point(body_a, body_b, local_a, local_b))
    }

    pub fn remove_constraint(&mut self, handle: ConstraintHandle) -> bool {
        self.constraints.remove(handle.0).is_some()
    }

    pub fn constraint(&self, handle: ConstraintHandle) -> Option<&Constraint> {
        self.constraints.get(handle.0)
    }

    pub fn constraint_mut(&mut self, handle: ConstraintHandle) -> Option<&mut Constraint> {
        self.constraints.get_mut(handle.0)
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    // -- Queries --

    /// Manifolds built by the most recent step, triggers included.
    pub fn manifolds(&self) -> &[CollisionInfo] {
        &self.manifolds
    }

    /// Manifolds kept from the last completed step for warm starting.
    pub fn previous_manifolds(&self) -> &[CollisionInfo] {
        &self.previous_manifolds
    }

    /// Closest body hit by `ray` within `max_distance`.
    pub fn raycast(&self, ray: &Ray, max_distance: f32) -> Option<RaycastHit> {
        raycast::raycast(&self.bodies, ray, max_distance)
    }

    pub fn wake_all(&mut self) {
        for body in self.bodies.values_mut() {
            if !body.is_static() {
                body.wake();
            }
        }
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn timings(&self) -> &StepTimings {
        &self.timings
    }

    /// Unsimulated time as a fraction of the fixed step, for render interpolation.
    pub fn interpolation_alpha(&self) -> f32 {
        if self.config.fixed_time_step > 0.0 {
            self.accumulator / self.config.fixed_time_step
        } else {
            0.0
        }
    }

    // -- Stepping --

    /// Advance by a frame's elapsed time. Returns the number of steps run.
    ///
    /// With a fixed step configured, whole steps are drained from the
    /// accumulator, at most `max_substeps` per call; time beyond the cap is
    /// discarded down to the sub-step remainder. Without one, a single
    /// variable step of `frame_dt` runs.
    pub fn update_fixed(&mut self, frame_dt: f32) -> u32 {
        if !(frame_dt > 0.0) {
            return 0;
        }

        let fixed = self.config.fixed_time_step;
        if fixed <= 0.0 {
            self.step(frame_dt);
            return 1;
        }

        self.accumulator += frame_dt;
        let mut steps = 0;
        while self.accumulator >= fixed && steps < self.config.max_substeps {
            self.step(fixed);
            self.accumulator -= fixed;
            steps += 1;
        }

        if self.accumulator >= fixed {
            let backlog = self.accumulator;
            self.accumulator %= fixed;
            debug!(
                "substep cap {} hit, discarding {:.4}s of accumulated time",
                self.config.max_substeps,
                backlog - self.accumulator
            );
        }
        steps
    }

    /// Run one self-contained simulation step of `dt` seconds.
    ///
    /// A non-positive `dt` returns immediately without touching any state.
    pub fn step(&mut self, dt: f32) {
        if !(dt > 0.0) {
            return;
        }
        let mut watch = Stopwatch::start();

        self.integrate(dt);
        let integrate_us = watch.lap();

        self.detect_collisions();
        self.rewind_to_impact();
        self.wake_touched_bodies();
        let broad_narrow_us = watch.lap();

        self.solve(dt);
        self.previous_manifolds.clone_from(&self.manifolds);
        self.update_sleep(dt);
        let solve_us = watch.lap();

        self.step_count += 1;
        self.timings = StepTimings {
            integrate_us,
            broad_narrow_us,
            solve_us,
            total_us: watch.total(),
            manifolds: self.manifolds.len(),
        };
        trace!(
            "step {}: {} manifolds, {} awake",
            self.step_count,
            self.manifolds.len(),
            self.awake_body_count()
        );
    }

    fn integrate(&mut self, dt: f32) {
        let gravity = self.config.gravity;
        for body in self.bodies.values_mut() {
            body.prev_position = body.position;
            body.accumulate_gravity(gravity);
            if body.is_static() || body.is_sleeping() {
                // Positions may have been edited directly; keep bounds current.
                body.update_bounds();
            } else {
                body.update(dt);
            }
        }
    }

    /// Exhaustive pair scan over slot order, so `body_a` always has the lower slot.
    fn detect_collisions(&mut self) {
        self.manifolds.clear();
        let box_contacts = self.config.box_contacts;
        let mut dropped = 0usize;

        let slots = self.bodies.slot_count();
        for i in 0..slots {
            let Some((index_a, a)) = self.bodies.get_by_slot(i) else {
                continue;
            };
            for j in (i + 1)..slots {
                let Some((index_b, b)) = self.bodies.get_by_slot(j) else {
                    continue;
                };
                if !should_test_pair(a, b) || !bounds_overlap(a, b) {
                    continue;
                }
                if let Some(info) = collide_with(BodyHandle(index_a), a, BodyHandle(index_b), b, box_contacts) {
                    if self.manifolds.push(info).is_err() {
                        dropped += 1;
                    }
                }
            }
        }

        if dropped > 0 {
            warn!("manifold capacity {} reached, {} pairs dropped this step", C, dropped);
        }
    }

    /// Pull bodies caught by a swept test back to their time of impact.
    ///
    /// Without this a fast body keeps the position it tunnelled to and only
    /// its velocity is corrected. A body in several swept hits stops at the
    /// earliest one.
    fn rewind_to_impact(&mut self) {
        let mut applied = [1.0f32; N];

        for manifold in self.manifolds.iter() {
            let Some(t) = manifold.time_of_impact else {
                continue;
            };
            if manifold.is_trigger {
                continue;
            }
            for handle in [manifold.body_a, manifold.body_b] {
                let slot = handle.0.slot();
                let Some(body) = self.bodies.get_mut(handle.0) else {
                    continue;
                };
                if !body.is_awake_dynamic() || body.is_kinematic() || t >= applied[slot] {
                    continue;
                }
                let motion = body.position - body.prev_position;
                body.position = body.prev_position + motion * (t / applied[slot]);
                applied[slot] = t;
                body.update_bounds();
                trace!("body {:?} rewound to t={:.3}", handle, t);
            }
        }
    }

    /// Wake sleepers hit hard enough, and sleepers jointed to moving bodies.
    fn wake_touched_bodies(&mut self) {
        let wake_speed = self.config.wake_relative_speed;

        for manifold in self.manifolds.iter() {
            if manifold.is_trigger {
                continue;
            }
            let (Some(a), Some(b)) = (
                self.bodies.get(manifold.body_a.0),
                self.bodies.get(manifold.body_b.0),
            ) else {
                continue;
            };
            if a.is_sleeping() == b.is_sleeping() {
                continue;
            }
            let closing = (b.velocity - a.velocity).dot(&manifold.normal).abs();
            if closing < wake_speed {
                continue;
            }
            let sleeper = if a.is_sleeping() { manifold.body_a } else { manifold.body_b };
            if let Some(body) = self.bodies.get_mut(sleeper.0) {
                body.wake();
                debug!("body {:?} woken by contact ({:.3} m/s)", sleeper, closing);
            }
        }

        for (_, constraint) in self.constraints.iter() {
            if !constraint.is_enabled() {
                continue;
            }
            let (ha, hb) = constraint.bodies();
            let (Some(a), Some(b)) = (self.bodies.get(ha.0), self.bodies.get(hb.0)) else {
                continue;
            };
            let sleeper = if a.is_sleeping() && is_moving(b) {
                ha
            } else if b.is_sleeping() && is_moving(a) {
                hb
            } else {
                continue;
            };
            if let Some(body) = self.bodies.get_mut(sleeper.0) {
                body.wake();
                debug!("body {:?} woken by joint", sleeper);
            }
        }
    }

    fn solve(&mut self, dt: f32) {
        let solver = ContactSolver::new(self.config.solver);

        solver.match_warm_start(&mut self.manifolds, &self.previous_manifolds);
        solver.pre_step(&self.bodies, &mut self.manifolds, dt);
        for constraint in self.constraints.values_mut() {
            constraint.pre_step(&self.bodies, dt, &self.config.solver);
        }

        solver.apply_warm_start(&mut self.bodies, &self.manifolds);
        for (_, constraint) in self.constraints.iter() {
            constraint.warm_start(&mut self.bodies);
        }

        for _ in 0..self.config.solver.iterations {
            solver.solve_velocity(&mut self.bodies, &mut self.manifolds);
            solver.solve_push(&mut self.bodies, &mut self.manifolds);
            for constraint in self.constraints.values_mut() {
                constraint.solve(&mut self.bodies);
            }
        }

        solver.apply_push(&mut self.bodies, dt);
        solver.correct_positions(&mut self.bodies, &mut self.manifolds);
    }

    /// Sleep bookkeeping: a body resting below both squared-speed thresholds
    /// for `sleep_time` seconds is put to sleep.
    fn update_sleep(&mut self, dt: f32) {
        let cfg = self.config;

        for body in self.bodies.values_mut() {
            if !body.is_awake_dynamic() {
                continue;
            }
            if !body.can_sleep {
                body.sleep_timer = 0.0;
                continue;
            }
            if body.velocity.norm_squared() < cfg.sleep_linear_threshold
                && body.angular_velocity.norm_squared() < cfg.sleep_angular_threshold
            {
                body.sleep_timer += dt;
            } else {
                body.sleep_timer = 0.0;
            }
        }

        // A body jointed to something still moving may not fall asleep.
        for (_, constraint) in self.constraints.iter() {
            if !constraint.is_enabled() {
                continue;
            }
            let (ha, hb) = constraint.bodies();
            let (Some(a), Some(b)) = (self.bodies.get(ha.0), self.bodies.get(hb.0)) else {
                continue;
            };
            let a_ready = ready_to_sleep(a, cfg.sleep_time);
            let b_ready = ready_to_sleep(b, cfg.sleep_time);
            if !a_ready {
                if let Some(b) = self.bodies.get_mut(hb.0) {
                    b.sleep_timer = 0.0;
                }
            }
            if !b_ready {
                if let Some(a) = self.bodies.get_mut(ha.0) {
                    a.sleep_timer = 0.0;
                }
            }
        }

        for (index, body) in self.bodies.iter_mut() {
            if body.is_awake_dynamic() && body.can_sleep && body.sleep_timer >= cfg.sleep_time {
                body.put_to_sleep();
                debug!("body {:?} asleep", index);
            }
        }
    }
}

/// Awake and able to drag a jointed partner along.
fn is_moving(body: &RigidBody) -> bool {
    if body.is_static() || body.is_sleeping() {
        return false;
    }
    if body.is_kinematic() {
        return body.velocity != Vector3::zeros() || body.angular_velocity != Vector3::zeros();
    }
    body.inv_mass() > 0.0
}

fn ready_to_sleep(body: &RigidBody, sleep_time: f32) -> bool {
    if !is_moving(body) {
        return true;
    }
    body.is_awake_dynamic() && body.can_sleep && body.sleep_timer >= sleep_time
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use crate::body::Shape;
    use crate::collision::BoxContactMode;
    use crate::config::SolverConfig;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn no_gravity() -> WorldConfig {
        WorldConfig::default().with_gravity(Vector3::zeros())
    }

    #[test]
    fn test_add_remove_and_stale_handles() {
        let mut world = PhysicsWorld::<2>::new();
        let a = world.add_body(RigidBody::new(Shape::sphere(1.0), 1.0)).unwrap();
        let b = world.add_body(RigidBody::new(Shape::sphere(1.0), 1.0)).unwrap();
        assert!(world.add_body(RigidBody::new(Shape::sphere(1.0), 1.0)).is_none());
        assert_eq!(world.body_count(), 2);

        assert!(world.remove_body(a));
        assert!(!world.remove_body(a));
        assert!(world.body(a).is_none());

        let c = world.add_body(RigidBody::new(Shape::sphere(1.0), 1.0)).unwrap();
        assert_ne!(a, c);
        assert!(world.body(a).is_none());
        assert!(world.body(b).is_some());
    }

    #[test]
    fn test_gravity_integration() {
        let mut world = PhysicsWorld::<4>::new();
        let h = world
            .add_body(RigidBody::new(Shape::sphere(0.5), 1.0).with_damping(0.0).with_position(Vector3::new(0.0, 10.0, 0.0)))
            .unwrap();
        world.step(0.1);
        let body = world.body(h).unwrap();
        assert!(approx_eq(body.velocity.y, -0.981));
        assert!(approx_eq(body.position.y, 10.0 - 0.0981));
        assert!(approx_eq(body.prev_position.y, 10.0));
        assert_eq!(world.step_count(), 1);
    }

    #[test]
    fn test_update_fixed_caps_substeps() {
        let mut world = PhysicsWorld::<4>::new();
        world.add_body(RigidBody::new(Shape::sphere(0.5), 1.0)).unwrap();

        assert_eq!(world.update_fixed(1.0 / 120.0), 0);
        assert_eq!(world.update_fixed(1.0 / 120.0), 1);
        assert_eq!(world.step_count(), 1);

        // A long frame only runs the capped number of steps.
        assert_eq!(world.update_fixed(1.0), 3);
        assert!(world.interpolation_alpha() < 1.0);
        assert_eq!(world.update_fixed(0.0), 0);
        assert_eq!(world.step_count(), 4);
    }

    #[test]
    fn test_variable_step_without_fixed_dt() {
        let mut world = PhysicsWorld::<4>::with_config(WorldConfig::default().with_fixed_time_step(0.0));
        world.add_body(RigidBody::new(Shape::sphere(0.5), 1.0)).unwrap();
        assert_eq!(world.update_fixed(0.5), 1);
        assert_eq!(world.step_count(), 1);
    }

    #[test]
    fn test_remove_body_drops_manifolds() {
        let mut world = PhysicsWorld::<4>::with_config(no_gravity());
        let a = world.add_body(RigidBody::new(Shape::sphere(1.0), 1.0)).unwrap();
        let b = world
            .add_body(RigidBody::new(Shape::sphere(1.0), 1.0).with_position(Vector3::new(1.5, 0.0, 0.0)))
            .unwrap();
        world.step(1.0 / 60.0);
        assert_eq!(world.manifolds().len(), 1);
        assert_eq!(world.previous_manifolds().len(), 1);

        world.remove_body(b);
        assert!(world.manifolds().is_empty());
        assert!(world.previous_manifolds().is_empty());
        assert!(world.body(a).is_some());
    }

    #[test]
    fn test_manifold_capacity_drops_extra_pairs() {
        let mut world = PhysicsWorld::<4, 0, 1>::with_config(no_gravity());
        for i in 0..3 {
            world
                .add_body(RigidBody::new(Shape::sphere(1.0), 1.0).with_position(Vector3::new(i as f32 * 0.5, 0.0, 0.0)))
                .unwrap();
        }
        world.step(1.0 / 60.0);
        assert_eq!(world.manifolds().len(), 1);
    }

    #[test]
    fn test_trigger_reported_but_not_solved() {
        let mut world = PhysicsWorld::<4>::with_config(no_gravity());
        let sensor = world
            .add_body(RigidBody::new_static(Shape::cuboid(1.0, 1.0, 1.0)).with_trigger(true))
            .unwrap();
        let ball = world
            .add_body(
                RigidBody::new(Shape::sphere(0.5), 1.0)
                    .with_damping(0.0)
                    .with_position(Vector3::new(0.0, 1.2, 0.0))
                    .with_velocity(Vector3::new(0.0, -1.0, 0.0)),
            )
            .unwrap();
        world.step(1.0 / 60.0);

        assert_eq!(world.manifolds().len(), 1);
        assert!(world.manifolds()[0].is_trigger);
        assert!(world.manifolds()[0].involves(sensor));
        assert!(approx_eq(world.body(ball).unwrap().velocity.y, -1.0));
    }

    #[test]
    fn test_sleeping_body_woken_by_impact() {
        let mut world = PhysicsWorld::<4>::with_config(no_gravity());
        let sleeper = world.add_body(RigidBody::new(Shape::sphere(0.5), 1.0)).unwrap();
        world.body_mut(sleeper).unwrap().put_to_sleep();

        let dt = 1.0 / 60.0;
        let striker = world
            .add_body(
                RigidBody::new(Shape::sphere(0.5), 1.0)
                    .with_position(Vector3::new(1.0 + 2.0 * dt, 0.0, 0.0))
                    .with_velocity(Vector3::new(-2.0, 0.0, 0.0)),
            )
            .unwrap();
        world.step(dt);

        assert!(world.body(sleeper).unwrap().is_awake());
        assert!(world.body(sleeper).unwrap().velocity.x < 0.0);
        assert!(world.body(striker).unwrap().velocity.x > -2.0);
    }

    #[test]
    fn test_free_body_falls_asleep() {
        let config = no_gravity();
        let mut world = PhysicsWorld::<4>::with_config(config);
        let h = world.add_body(RigidBody::new(Shape::sphere(0.5), 1.0)).unwrap();
        let steps = (config.sleep_time / config.fixed_time_step) as usize + 2;
        for _ in 0..steps {
            world.step(config.fixed_time_step);
        }
        assert!(world.body(h).unwrap().is_sleeping());
        assert_eq!(world.awake_body_count(), 0);

        world.body_mut(h).unwrap().apply_force(Vector3::new(1.0, 0.0, 0.0));
        assert!(world.body(h).unwrap().is_awake());
    }

    #[test]
    fn test_resting_body_sleeps_under_gravity() {
        let mut world = PhysicsWorld::<4>::new();
        world
            .add_body(RigidBody::new_static(Shape::cuboid(5.0, 0.5, 5.0)).with_position(Vector3::new(0.0, -0.5, 0.0)))
            .unwrap();
        let ball = world
            .add_body(
                RigidBody::new(Shape::sphere(0.5), 1.0)
                    .with_restitution(0.0)
                    .with_position(Vector3::new(0.0, 0.5, 0.0)),
            )
            .unwrap();

        let dt = world.fixed_time_step();
        let mut steps = 0;
        while world.body(ball).unwrap().is_awake() && steps < 120 {
            world.step(dt);
            steps += 1;
        }
        let body = world.body(ball).unwrap();
        assert!(body.is_sleeping());
        assert_eq!(body.velocity, Vector3::zeros());

        // Later steps keep applying gravity without waking it.
        let y = body.position.y;
        for _ in 0..30 {
            world.step(dt);
        }
        assert!(world.body(ball).unwrap().is_sleeping());
        assert_eq!(world.body(ball).unwrap().position.y, y);
    }

    #[test]
    fn test_box_contact_mode_is_configurable() {
        let build = |mode| {
            let mut world = PhysicsWorld::<4>::with_config(no_gravity().with_box_contacts(mode));
            // The small box takes the lower slot, so it is body A.
            world
                .add_body(RigidBody::new(Shape::cuboid(0.5, 0.5, 0.5), 1.0).with_position(Vector3::new(0.0, 0.49, 0.0)))
                .unwrap();
            world
                .add_body(RigidBody::new_static(Shape::cuboid(5.0, 0.5, 5.0)).with_position(Vector3::new(0.0, -0.5, 0.0)))
                .unwrap();
            world.step(1.0 / 60.0);
            world.manifolds()[0].clone()
        };

        let on_a = build(BoxContactMode::ReferenceOnA);
        assert!(on_a.contacts.iter().all(|c| approx_eq(c.position.x.abs(), 5.0)));
        let least = build(BoxContactMode::LeastOverlap);
        assert!(least.contacts.iter().all(|c| c.position.x.abs() <= 0.5 + EPSILON));
    }

    #[test]
    fn test_can_sleep_false_stays_awake() {
        let mut world = PhysicsWorld::<4>::with_config(no_gravity());
        let h = world
            .add_body(RigidBody::new(Shape::sphere(0.5), 1.0).with_can_sleep(false))
            .unwrap();
        for _ in 0..120 {
            world.step(1.0 / 60.0);
        }
        assert!(world.body(h).unwrap().is_awake());
    }

    #[test]
    fn test_pendulum_keeps_length() {
        let mut world = PhysicsWorld::<4, 2>::new();
        let pivot = world
            .add_body(RigidBody::new_static(Shape::sphere(0.05)).with_position(Vector3::new(0.0, 5.0, 0.0)))
            .unwrap();
        let bob = world
            .add_body(RigidBody::new(Shape::sphere(0.1), 1.0).with_position(Vector3::new(2.0, 5.0, 0.0)))
            .unwrap();
        let joint = world
            .add_distance_constraint(pivot, bob, Vector3::zeros(), Vector3::zeros())
            .unwrap();

        for _ in 0..120 {
            world.step(1.0 / 60.0);
        }
        let length = world.constraint(joint).unwrap().joint().current_length(&world.bodies).unwrap();
        assert!((length - 2.0).abs() < 0.05);
        // The bob swung down under gravity.
        assert!(world.body(bob).unwrap().position.y < 5.0);
    }

    #[test]
    fn test_joint_to_removed_body_is_inert() {
        let mut world = PhysicsWorld::<4, 2>::with_config(no_gravity());
        let a = world.add_body(RigidBody::new(Shape::sphere(0.1), 1.0)).unwrap();
        let b = world
            .add_body(RigidBody::new(Shape::sphere(0.1), 1.0).with_position(Vector3::new(3.0, 0.0, 0.0)))
            .unwrap();
        let joint = world.add_point_constraint(a, b, Vector3::new(1.5, 0.0, 0.0)).unwrap();
        world.remove_body(a);
        world.step(1.0 / 60.0);
        assert!(approx_eq(world.body(b).unwrap().position.x, 3.0));
        assert!(world.remove_constraint(joint));
        assert!(world.constraint(joint).is_none());
    }

    #[test]
    fn test_solver_config_is_used() {
        let config = no_gravity().with_solver(SolverConfig::default().with_iterations(0));
        let mut world = PhysicsWorld::<4>::with_config(config);
        let a = world
            .add_body(RigidBody::new(Shape::sphere(1.0), 1.0).with_velocity(Vector3::new(1.0, 0.0, 0.0)).with_damping(0.0))
            .unwrap();
        world
            .add_body(RigidBody::new(Shape::sphere(1.0), 1.0).with_position(Vector3::new(1.999, 0.0, 0.0)))
            .unwrap();
        world.step(1.0 / 60.0);
        // No velocity iterations: the contact is detected but nothing is exchanged.
        assert_eq!(world.manifolds().len(), 1);
        assert!(approx_eq(world.body(a).unwrap().velocity.x, 1.0));
    }

    #[test]
    fn test_fast_sphere_rewound_to_wall() {
        let mut world = PhysicsWorld::<4>::with_config(no_gravity());
        world.add_body(RigidBody::new_static(Shape::cuboid(0.02, 1.0, 1.0))).unwrap();
        let ball = world
            .add_body(
                RigidBody::new(Shape::sphere(0.1), 1.0)
                    .with_damping(0.0)
                    .with_restitution(0.0)
                    .with_position(Vector3::new(-0.5, 0.0, 0.0))
                    .with_velocity(Vector3::new(40.0, 0.0, 0.0)),
            )
            .unwrap();
        world.step(1.0 / 60.0);

        assert!(world.manifolds()[0].time_of_impact.is_some());
        let body = world.body(ball).unwrap();
        // Stopped touching the near face instead of past the wall.
        assert!((body.position.x + 0.12).abs() < 1e-3);
        assert!(body.velocity.x <= 1e-3);

        for _ in 0..30 {
            world.step(1.0 / 60.0);
        }
        assert!(world.body(ball).unwrap().position.x < 0.0);
    }

    #[test]
    fn test_raycast_through_world() {
        let mut world = PhysicsWorld::<4>::new();
        let h = world.add_body(RigidBody::new_static(Shape::sphere(1.0))).unwrap();
        let hit = world
            .raycast(&Ray::new(Vector3::new(0.0, 5.0, 0.0), Vector3::new(0.0, -1.0, 0.0)), 100.0)
            .unwrap();
        assert_eq!(hit.body, h);
        assert!(approx_eq(hit.distance, 4.0));
    }
}

//! Two-body joints solved alongside contacts.
//!
//! Joints reuse the contact solver's pattern: `pre_step` caches the effective
//! mass and a Baumgarte bias from the current anchors, `warm_start` re-applies
//! last step's accumulated impulse, and `solve` applies one velocity-space
//! correction per iteration. Unlike contacts the impulse is not clamped, so a
//! joint can pull as well as push.
//!
//! A joint whose body has been removed from the world, or which is disabled,
//! does nothing.

use nalgebra::Vector3;

#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::arena::{Arena, Index};
use crate::body::{BodyHandle, RigidBody};
use crate::config::SolverConfig;

/// Generation-checked handle to a constraint stored in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintHandle(pub(crate) Index);

impl ConstraintHandle {
    #[inline]
    pub fn index(&self) -> Index {
        self.0
    }
}

/// Keeps two body-local anchor points `rest_length` apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceConstraint {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Anchor offset in body A's local space.
    pub local_anchor_a: Vector3<f32>,
    /// Anchor offset in body B's local space.
    pub local_anchor_b: Vector3<f32>,
    pub rest_length: f32,
    enabled: bool,
    accumulated_impulse: f32,

    // Step-local scratch, filled by pre_step.
    active: bool,
    effective_mass: f32,
    bias: f32,
    r_a: Vector3<f32>,
    r_b: Vector3<f32>,
    normal: Vector3<f32>,
}

impl DistanceConstraint {
    pub fn new(
        body_a: BodyHandle,
        body_b: BodyHandle,
        local_anchor_a: Vector3<f32>,
        local_anchor_b: Vector3<f32>,
        rest_length: f32,
    ) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            rest_length: rest_length.max(0.0),
            enabled: true,
            accumulated_impulse: 0.0,
            active: false,
            effective_mass: 0.0,
            bias: 0.0,
            r_a: Vector3::zeros(),
            r_b: Vector3::zeros(),
            normal: Vector3::new(0.0, 1.0, 0.0),
        }
    }

    /// Joint whose rest length is the current distance between the two anchors.
    pub fn from_current(
        handle_a: BodyHandle,
        a: &RigidBody,
        handle_b: BodyHandle,
        b: &RigidBody,
        local_anchor_a: Vector3<f32>,
        local_anchor_b: Vector3<f32>,
    ) -> Self {
        let rest_length = (b.local_to_world(&local_anchor_b) - a.local_to_world(&local_anchor_a)).norm();
        Self::new(handle_a, handle_b, local_anchor_a, local_anchor_b, rest_length)
    }

    /// Current anchor separation, or `None` if either body is gone.
    pub fn current_length<const N: usize>(&self, bodies: &Arena<RigidBody, N>) -> Option<f32> {
        let a = bodies.get(self.body_a.0)?;
        let b = bodies.get(self.body_b.0)?;
        Some((b.local_to_world(&self.local_anchor_b) - a.local_to_world(&self.local_anchor_a)).norm())
    }

    #[inline]
    pub fn accumulated_impulse(&self) -> f32 {
        self.accumulated_impulse
    }

    fn pre_step<const N: usize>(&mut self, bodies: &Arena<RigidBody, N>, dt: f32, config: &SolverConfig) {
        self.active = false;
        if !self.enabled || dt <= 0.0 {
            return;
        }
        let (Some(a), Some(b)) = (bodies.get(self.body_a.0), bodies.get(self.body_b.0)) else {
            return;
        };

        self.r_a = a.orientation * self.local_anchor_a;
        self.r_b = b.orientation * self.local_anchor_b;
        let delta = (b.position + self.r_b) - (a.position + self.r_a);
        let length = delta.norm();
        self.normal = if length > 1e-6 {
            delta / length
        } else {
            // Coincident anchors (point joint at rest): keep the last axis.
            self.normal
        };

        let rn_a = self.r_a.cross(&self.normal);
        let rn_b = self.r_b.cross(&self.normal);
        let k = a.solver_inv_mass()
            + b.solver_inv_mass()
            + rn_a.dot(&(a.solver_inv_inertia_world() * rn_a))
            + rn_b.dot(&(b.solver_inv_inertia_world() * rn_b));
        self.effective_mass = if k > 1e-9 { 1.0 / k } else { 0.0 };

        let error = length - self.rest_length;
        self.bias = config.baumgarte * error / dt;
        self.active = self.effective_mass > 0.0;
    }

    fn warm_start<const N: usize>(&self, bodies: &mut Arena<RigidBody, N>) {
        if !self.active || self.accumulated_impulse == 0.0 {
            return;
        }
        if let Some((a, b)) = bodies.pair_mut(self.body_a.0, self.body_b.0) {
            let p = self.normal * self.accumulated_impulse;
            a.apply_impulse_at(-p, &self.r_a);
            b.apply_impulse_at(p, &self.r_b);
        }
    }

    fn solve<const N: usize>(&mut self, bodies: &mut Arena<RigidBody, N>) {
        if !self.active {
            return;
        }
        let Some((a, b)) = bodies.pair_mut(self.body_a.0, self.body_b.0) else {
            return;
        };

        let relative = b.velocity_at(&self.r_b) - a.velocity_at(&self.r_a);
        let lambda = -(relative.dot(&self.normal) + self.bias) * self.effective_mass;
        self.accumulated_impulse += lambda;

        let p = self.normal * lambda;
        a.apply_impulse_at(-p, &self.r_a);
        b.apply_impulse_at(p, &self.r_b);
    }
}

/// Joint kinds. The set is closed; dispatch is a `match`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    /// Rigid rod between two anchors.
    Distance(DistanceConstraint),
    /// Ball-socket: the anchors are pinned together (rest length zero).
    Point(DistanceConstraint),
}

impl Constraint {
    pub fn distance(
        body_a: BodyHandle,
        body_b: BodyHandle,
        local_anchor_a: Vector3<f32>,
        local_anchor_b: Vector3<f32>,
        rest_length: f32,
    ) -> Self {
        Constraint::Distance(DistanceConstraint::new(
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            rest_length,
        ))
    }

    pub fn point(
        body_a: BodyHandle,
        body_b: BodyHandle,
        local_anchor_a: Vector3<f32>,
        local_anchor_b: Vector3<f32>,
    ) -> Self {
        Constraint::Point(DistanceConstraint::new(
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            0.0,
        ))
    }

    #[inline]
    pub fn joint(&self) -> &DistanceConstraint {
        match self {
            Constraint::Distance(joint) | Constraint::Point(joint) => joint,
        }
    }

    #[inline]
    pub fn joint_mut(&mut self) -> &mut DistanceConstraint {
        match self {
            Constraint::Distance(joint) | Constraint::Point(joint) => joint,
        }
    }

    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        let joint = self.joint();
        (joint.body_a, joint.body_b)
    }

    pub fn is_enabled(&self) -> bool {
        self.joint().enabled
    }

    /// Disabling also drops the accumulated impulse so re-enabling starts cold.
    pub fn set_enabled(&mut self, enabled: bool) {
        let joint = self.joint_mut();
        joint.enabled = enabled;
        if !enabled {
            joint.accumulated_impulse = 0.0;
            joint.active = false;
        }
    }

    pub fn pre_step<const N: usize>(&mut self, bodies: &Arena<RigidBody, N>, dt: f32, config: &SolverConfig) {
        match self {
            Constraint::Distance(joint) | Constraint::Point(joint) => joint.pre_step(bodies, dt, config),
        }
    }

    pub fn warm_start<const N: usize>(&self, bodies: &mut Arena<RigidBody, N>) {
        match self {
            Constraint::Distance(joint) | Constraint::Point(joint) => joint.warm_start(bodies),
        }
    }

    pub fn solve<const N: usize>(&mut self, bodies: &mut Arena<RigidBody, N>) {
        match self {
            Constraint::Distance(joint) | Constraint::Point(joint) => joint.solve(bodies),
        }
    }
}

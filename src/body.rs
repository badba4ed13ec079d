//! Rigid body state, mass properties and integration.
//!
//! A [`RigidBody`] owns its motion state (position, velocity, orientation,
//! angular velocity), its collision [`Shape`] and the mass properties derived
//! from it. Bodies are stored in a [`PhysicsWorld`](crate::world::PhysicsWorld)
//! and addressed through [`BodyHandle`]s.
//!
//! Inverse mass and inverse inertia are zero exactly when the body is static,
//! kinematic, or was given a non-positive mass. They are recomputed by every
//! setter that can change them, so the pair never goes out of sync.

use nalgebra::{Isometry3, Matrix3, Quaternion, Translation3, UnitQuaternion, Vector3};

// ComplexField provides sqrt()/exp()/abs() for f32 in no_std via libm
#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::arena::Index;

/// Velocities whose squared magnitude falls below this are snapped to zero.
pub const VELOCITY_EPSILON: f32 = 1e-5;
/// Linear speed clamp (units per second).
pub const MAX_LINEAR_SPEED: f32 = 40.0;
/// Angular speed clamp (radians per second).
pub const MAX_ANGULAR_SPEED: f32 = 10.0;

/// Generation-checked handle to a body stored in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub(crate) Index);

impl BodyHandle {
    /// Rebuild a handle from its slot and generation, e.g. after storing
    /// [`Index::slot`] and [`Index::generation`] externally. A handle whose
    /// generation no longer matches its slot resolves to nothing.
    pub const fn from_raw_parts(slot: u32, generation: u32) -> Self {
        Self(Index::from_raw_parts(slot, generation))
    }

    #[inline]
    pub fn index(&self) -> Index {
        self.0
    }
}

/// Collision shape of a body, centred on the body position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere { radius: f32 },
    /// An oriented box defined by its half-extents along the body-local axes.
    Box { half_extents: Vector3<f32> },
}

impl Shape {
    pub fn sphere(radius: f32) -> Self {
        Shape::Sphere { radius }
    }

    pub fn cuboid(hx: f32, hy: f32, hz: f32) -> Self {
        Shape::Box {
            half_extents: Vector3::new(hx, hy, hz),
        }
    }
}

/// World-space axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Aabb {
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vector3<f32>, half: Vector3<f32>) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Closed-interval overlap: boxes that merely touch overlap.
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Union of this box and the same box translated by `-motion`, i.e. the
    /// volume swept over a step that moved the body by `motion`.
    pub fn swept(&self, motion: &Vector3<f32>) -> Aabb {
        Aabb {
            min: self.min.inf(&(self.min - motion)),
            max: self.max.sup(&(self.max - motion)),
        }
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vector3<f32> {
        (self.max - self.min) * 0.5
    }

    pub fn contains_point(&self, p: &Vector3<f32>) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}

/// A rigid body with linear and angular dynamics.
#[derive(Debug, Clone)]
pub struct RigidBody {
    // -- Linear state --
    pub position: Vector3<f32>,
    /// Position at the start of the current step, used by swept tests.
    pub prev_position: Vector3<f32>,
    pub velocity: Vector3<f32>,
    /// Acceleration accumulated from forces and gravity this step.
    acceleration: Vector3<f32>,
    /// Position-only velocity from contact push impulses; moves the body at
    /// the end of the step and is then discarded.
    push_velocity: Vector3<f32>,

    // -- Angular state --
    pub orientation: UnitQuaternion<f32>,
    /// Angular velocity in world space (radians per second).
    pub angular_velocity: Vector3<f32>,

    // -- Shape and mass --
    shape: Shape,
    mass: f32,
    inv_mass: f32,
    /// Reciprocal principal moments of inertia in body-local space.
    inv_inertia: Vector3<f32>,

    // -- Material --
    /// Coulomb friction coefficient. Pairs combine as `sqrt(mu_a * mu_b)`.
    pub friction: f32,
    /// Bounciness; pairs use the smaller of the two.
    pub restitution: f32,
    /// Exponential linear damping rate: `v *= exp(-linear_damping * dt)`.
    pub linear_damping: f32,
    /// Exponential angular damping rate.
    pub angular_damping: f32,

    // -- Flags --
    is_static: bool,
    is_kinematic: bool,
    /// Triggers report contacts but are never pushed apart by the solver.
    pub is_trigger: bool,
    pub can_sleep: bool,

    aabb: Aabb,
    sleeping: bool,
    /// Seconds spent below the sleep thresholds.
    pub sleep_timer: f32,
}

impl RigidBody {
    /// Create a dynamic body. A non-positive `mass` produces an immovable body
    /// with zero inverse mass rather than a panic.
    pub fn new(shape: Shape, mass: f32) -> Self {
        let mut body = Self {
            position: Vector3::zeros(),
            prev_position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            push_velocity: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            angular_velocity: Vector3::zeros(),
            shape,
            mass,
            inv_mass: 0.0,
            inv_inertia: Vector3::zeros(),
            friction: 0.5,
            restitution: 0.2,
            linear_damping: 0.01,
            angular_damping: 0.05,
            is_static: false,
            is_kinematic: false,
            is_trigger: false,
            can_sleep: true,
            aabb: Aabb::new(Vector3::zeros(), Vector3::zeros()),
            sleeping: false,
            sleep_timer: 0.0,
        };
        body.update_mass_properties();
        body.update_bounds();
        body
    }

    /// Create a static body (infinite mass, unaffected by forces and gravity).
    pub fn new_static(shape: Shape) -> Self {
        let mut body = Self::new(shape, 0.0);
        body.is_static = true;
        body.linear_damping = 0.0;
        body.angular_damping = 0.0;
        body.update_mass_properties();
        body
    }

    /// Builder: set initial position (also resets the swept-test snapshot).
    pub fn with_position(mut self, position: Vector3<f32>) -> Self {
        self.position = position;
        self.prev_position = position;
        self.update_bounds();
        self
    }

    pub fn with_velocity(mut self, velocity: Vector3<f32>) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: Vector3<f32>) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    pub fn with_orientation(mut self, orientation: UnitQuaternion<f32>) -> Self {
        self.orientation = orientation;
        self.update_bounds();
        self
    }

    /// Builder: set friction coefficient (clamped to `>= 0`).
    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction.max(0.0);
        self
    }

    /// Builder: set restitution (0.0..=1.0).
    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution.clamp(0.0, 1.0);
        self
    }

    pub fn with_damping(mut self, damping: f32) -> Self {
        self.linear_damping = damping.max(0.0);
        self
    }

    pub fn with_angular_damping(mut self, damping: f32) -> Self {
        self.angular_damping = damping.max(0.0);
        self
    }

    pub fn with_kinematic(mut self, kinematic: bool) -> Self {
        self.set_kinematic(kinematic);
        self
    }

    pub fn with_trigger(mut self, trigger: bool) -> Self {
        self.is_trigger = trigger;
        self
    }

    pub fn with_can_sleep(mut self, can_sleep: bool) -> Self {
        self.can_sleep = can_sleep;
        self
    }

    // -- Accessors --

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    #[inline]
    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    #[inline]
    pub fn inv_inertia(&self) -> Vector3<f32> {
        self.inv_inertia
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    #[inline]
    pub fn is_kinematic(&self) -> bool {
        self.is_kinematic
    }

    #[inline]
    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// Dynamic (finite mass) and not asleep.
    #[inline]
    pub fn is_awake_dynamic(&self) -> bool {
        self.inv_mass > 0.0 && !self.sleeping
    }

    #[inline]
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Bounds covering this step's motion from `prev_position` to `position`.
    pub fn swept_aabb(&self) -> Aabb {
        self.aabb.swept(&(self.position - self.prev_position))
    }

    #[inline]
    pub fn acceleration(&self) -> Vector3<f32> {
        self.acceleration
    }

    // -- Mass properties --

    pub fn set_mass(&mut self, mass: f32) {
        self.mass = mass;
        self.update_mass_properties();
    }

    pub fn set_shape(&mut self, shape: Shape) {
        self.shape = shape;
        self.update_mass_properties();
        self.update_bounds();
    }

    pub fn set_static(&mut self, is_static: bool) {
        self.is_static = is_static;
        if is_static {
            self.velocity = Vector3::zeros();
            self.angular_velocity = Vector3::zeros();
        }
        self.update_mass_properties();
    }

    /// Kinematic bodies move with their assigned velocities but never receive
    /// impulses, forces, or rotational response.
    pub fn set_kinematic(&mut self, kinematic: bool) {
        self.is_kinematic = kinematic;
        self.update_mass_properties();
    }

    /// Recompute `inv_mass` and the principal inverse inertia from shape and mass.
    ///
    /// Box: `I_x = m/12 * ((2hy)² + (2hz)²)` and cyclic. Sphere: `I = 0.4 * m * r²`.
    pub fn update_mass_properties(&mut self) {
        if self.is_static || self.is_kinematic || self.mass <= 0.0 {
            self.inv_mass = 0.0;
            self.inv_inertia = Vector3::zeros();
            return;
        }

        self.inv_mass = 1.0 / self.mass;
        let inertia = match self.shape {
            Shape::Sphere { radius } => Vector3::repeat(0.4 * self.mass * radius * radius),
            Shape::Box { half_extents } => {
                let x2 = 4.0 * half_extents.x * half_extents.x;
                let y2 = 4.0 * half_extents.y * half_extents.y;
                let z2 = 4.0 * half_extents.z * half_extents.z;
                let k = self.mass / 12.0;
                Vector3::new(k * (y2 + z2), k * (x2 + z2), k * (x2 + y2))
            }
        };
        self.inv_inertia = inertia.map(|i| if i > 0.0 { 1.0 / i } else { 0.0 });
    }

    /// World-space inverse inertia tensor: `R * diag(inv_inertia) * Rᵀ`.
    #[inline]
    pub fn inv_inertia_world(&self) -> Matrix3<f32> {
        let r = self.orientation.to_rotation_matrix();
        r.matrix() * Matrix3::from_diagonal(&self.inv_inertia) * r.matrix().transpose()
    }

    /// Inverse mass as seen by the solver; sleeping bodies behave as static.
    #[inline]
    pub fn solver_inv_mass(&self) -> f32 {
        if self.sleeping {
            0.0
        } else {
            self.inv_mass
        }
    }

    /// World inverse inertia as seen by the solver; zero while asleep.
    #[inline]
    pub fn solver_inv_inertia_world(&self) -> Matrix3<f32> {
        if self.sleeping {
            Matrix3::zeros()
        } else {
            self.inv_inertia_world()
        }
    }

    // -- Forces and impulses --

    /// Accumulate a force (in Newtons) for the next `update`. Wakes the body.
    pub fn apply_force(&mut self, force: Vector3<f32>) {
        if self.is_static {
            return;
        }
        self.acceleration += force * self.inv_mass;
        self.wake();
    }

    /// Accumulate a gravitational acceleration, independent of mass. Wakes the body.
    pub fn apply_gravity(&mut self, gravity: Vector3<f32>) {
        if self.inv_mass == 0.0 {
            return;
        }
        self.acceleration += gravity;
        self.wake();
    }

    /// The world's per-step gravity. Unlike [`apply_gravity`](Self::apply_gravity)
    /// it leaves the sleep timer alone.
    pub(crate) fn accumulate_gravity(&mut self, gravity: Vector3<f32>) {
        if self.inv_mass > 0.0 && !self.sleeping {
            self.acceleration += gravity;
        }
    }

    /// Apply a velocity-space impulse through the centre of mass.
    #[inline]
    pub fn apply_impulse(&mut self, impulse: Vector3<f32>) {
        if self.inv_mass > 0.0 && !self.sleeping {
            self.velocity += impulse * self.inv_mass;
        }
    }

    /// Apply an impulse at offset `r` from the centre of mass.
    #[inline]
    pub fn apply_impulse_at(&mut self, impulse: Vector3<f32>, r: &Vector3<f32>) {
        if self.inv_mass > 0.0 && !self.sleeping {
            self.velocity += impulse * self.inv_mass;
            self.angular_velocity += self.inv_inertia_world() * r.cross(&impulse);
        }
    }

    /// Position-only impulse through the centre of mass. It separates the
    /// body without adding momentum.
    #[inline]
    pub(crate) fn apply_push_impulse(&mut self, impulse: Vector3<f32>) {
        if self.inv_mass > 0.0 && !self.sleeping {
            self.push_velocity += impulse * self.inv_mass;
        }
    }

    #[inline]
    pub(crate) fn push_velocity(&self) -> Vector3<f32> {
        self.push_velocity
    }

    /// Move by the accumulated push velocity over `dt` and clear it.
    pub(crate) fn apply_push(&mut self, dt: f32) {
        if self.push_velocity != Vector3::zeros() {
            self.position += self.push_velocity * dt;
            self.push_velocity = Vector3::zeros();
            self.update_bounds();
        }
    }

    /// Velocity of the material point at offset `r` from the centre of mass.
    #[inline]
    pub fn velocity_at(&self, r: &Vector3<f32>) -> Vector3<f32> {
        self.velocity + self.angular_velocity.cross(r)
    }

    // -- Sleeping --

    #[inline]
    pub fn wake(&mut self) {
        self.sleeping = false;
        self.sleep_timer = 0.0;
    }

    /// Put the body to sleep, zeroing its motion.
    pub fn put_to_sleep(&mut self) {
        self.sleeping = true;
        self.velocity = Vector3::zeros();
        self.angular_velocity = Vector3::zeros();
        self.acceleration = Vector3::zeros();
        self.push_velocity = Vector3::zeros();
    }

    #[inline]
    pub fn is_awake(&self) -> bool {
        !self.sleeping
    }

    // -- Transforms --

    #[inline]
    pub fn local_to_world(&self, p: &Vector3<f32>) -> Vector3<f32> {
        self.position + self.orientation * p
    }

    #[inline]
    pub fn world_to_local(&self, p: &Vector3<f32>) -> Vector3<f32> {
        self.orientation.inverse_transform_vector(&(p - self.position))
    }

    /// Rigid transform of the body, for renderers syncing mesh transforms.
    pub fn isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position), self.orientation)
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.velocity.norm()
    }

    /// Linear plus rotational kinetic energy. Zero for immovable bodies.
    pub fn kinetic_energy(&self) -> f32 {
        if self.inv_mass == 0.0 {
            return 0.0;
        }
        let linear = 0.5 * self.mass * self.velocity.norm_squared();
        let local_w = self.orientation.inverse_transform_vector(&self.angular_velocity);
        let inertia = self.inv_inertia.map(|i| if i > 0.0 { 1.0 / i } else { 0.0 });
        let angular = 0.5 * local_w.dot(&inertia.component_mul(&local_w));
        linear + angular
    }

    // -- Integration --

    /// Recompute the world AABB: orientation-aware for boxes, translation-only for spheres.
    pub fn update_bounds(&mut self) {
        let half = match self.shape {
            Shape::Sphere { radius } => Vector3::repeat(radius),
            Shape::Box { half_extents } => {
                let r = self.orientation.to_rotation_matrix();
                r.matrix().abs() * half_extents
            }
        };
        self.aabb = Aabb::from_center_half_extents(self.position, half);
    }

    /// Advance this body by `dt` seconds with semi-implicit Euler.
    ///
    /// No-op for static or sleeping bodies.
    pub fn update(&mut self, dt: f32) {
        if self.is_static || self.sleeping {
            return;
        }

        // --- Linear ---
        self.velocity += self.acceleration * dt;
        self.velocity *= (-self.linear_damping * dt).exp();
        if self.velocity.norm_squared() < VELOCITY_EPSILON {
            self.velocity = Vector3::zeros();
        }
        let speed_sq = self.velocity.norm_squared();
        if speed_sq > MAX_LINEAR_SPEED * MAX_LINEAR_SPEED {
            self.velocity *= MAX_LINEAR_SPEED / speed_sq.sqrt();
        }
        self.position += self.velocity * dt;

        // --- Angular ---
        self.angular_velocity *= (-self.angular_damping * dt).exp();
        if self.angular_velocity.norm_squared() < VELOCITY_EPSILON {
            self.angular_velocity = Vector3::zeros();
        }
        let spin_sq = self.angular_velocity.norm_squared();
        if spin_sq > MAX_ANGULAR_SPEED * MAX_ANGULAR_SPEED {
            self.angular_velocity *= MAX_ANGULAR_SPEED / spin_sq.sqrt();
        }

        // q' = q + 0.5 * dt * ω * q, with ω encoded as (0, ωx, ωy, ωz)
        let w = &self.angular_velocity;
        let half_dt = 0.5 * dt;
        let dq = Quaternion::new(0.0, w.x * half_dt, w.y * half_dt, w.z * half_dt);
        let q = self.orientation.into_inner();
        self.orientation = UnitQuaternion::new_normalize(q + dq * q);

        self.update_bounds();
        self.acceleration = Vector3::zeros();
    }
}

//! Contact points and per-pair collision manifolds.

use nalgebra::Vector3;

use crate::body::BodyHandle;

/// Maximum contact points kept per manifold. Further candidates are dropped.
pub const MAX_CONTACTS: usize = 4;

/// A single contact point with the solver state cached on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// World-space contact position.
    pub position: Vector3<f32>,
    /// Penetration depth (positive when overlapping).
    pub penetration: f32,
    /// Accumulated normal impulse; carried across steps for warm starting.
    pub normal_impulse: f32,
    /// Friction impulse accumulated over this step's iterations, in the
    /// tangent plane. Starts from zero every step.
    pub tangent_impulse: Vector3<f32>,
    /// Cached `1 / K` along the normal.
    pub normal_mass: f32,
    /// Cached velocity bias from restitution.
    pub bias: f32,
    /// Separating speed the position-only pass aims for (Baumgarte feedback).
    pub push_bias: f32,
    /// Accumulated position-only impulse, clamped to be non-negative.
    pub push_impulse: f32,
    /// Moment arm from body A's centre of mass.
    pub r_a: Vector3<f32>,
    /// Moment arm from body B's centre of mass.
    pub r_b: Vector3<f32>,
}

impl Contact {
    pub fn new(position: Vector3<f32>, penetration: f32) -> Self {
        Self {
            position,
            penetration,
            normal_impulse: 0.0,
            tangent_impulse: Vector3::zeros(),
            normal_mass: 0.0,
            bias: 0.0,
            push_bias: 0.0,
            push_impulse: 0.0,
            r_a: Vector3::zeros(),
            r_b: Vector3::zeros(),
        }
    }
}

pub type ContactPoints = heapless::Vec<Contact, MAX_CONTACTS>;

/// Collision manifold for one body pair in one step.
#[derive(Debug, Clone)]
pub struct CollisionInfo {
    pub has_collision: bool,
    /// Shared contact normal, pointing from body A toward body B.
    pub normal: Vector3<f32>,
    pub contacts: ContactPoints,
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// At least one body is a trigger: reported, never solved.
    pub is_trigger: bool,
    /// Fraction of the step at which a swept test first saw the pair touch.
    pub time_of_impact: Option<f32>,
}

impl CollisionInfo {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, normal: Vector3<f32>) -> Self {
        Self {
            has_collision: false,
            normal,
            contacts: heapless::Vec::new(),
            body_a,
            body_b,
            is_trigger: false,
            time_of_impact: None,
        }
    }

    /// Adds a contact point. Returns `false` (and drops the point) when full.
    pub fn add_contact(&mut self, contact: Contact) -> bool {
        if self.contacts.push(contact).is_err() {
            return false;
        }
        self.has_collision = true;
        true
    }

    #[inline]
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn max_penetration(&self) -> f32 {
        self.contacts
            .iter()
            .map(|c| c.penetration)
            .fold(0.0, f32::max)
    }

    pub fn involves(&self, body: BodyHandle) -> bool {
        self.body_a == body || self.body_b == body
    }

    /// Same pair, ordered the same way.
    #[inline]
    pub fn same_pair(&self, other: &CollisionInfo) -> bool {
        self.body_a == other.body_a && self.body_b == other.body_b
    }

    /// The manifold seen from body B: bodies swapped, normal negated.
    pub fn flipped(&self) -> Self {
        Self {
            has_collision: self.has_collision,
            normal: -self.normal,
            contacts: self.contacts.clone(),
            body_a: self.body_b,
            body_b: self.body_a,
            is_trigger: self.is_trigger,
            time_of_impact: self.time_of_impact,
        }
    }
}

//! Ray queries against bodies.
//!
//! A world raycast rejects bodies with a slab test against their AABB and
//! then resolves the exact hit against the sphere, or against the box in its
//! local frame. The closest hit by parametric distance wins.

use nalgebra::Vector3;

#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::arena::Arena;
use crate::body::{BodyHandle, RigidBody, Shape};

/// A half-line with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vector3<f32>,
    pub direction: Vector3<f32>,
}

impl Ray {
    /// Creates a ray, normalizing `direction`. A degenerate direction falls back to `+Y`.
    pub fn new(origin: Vector3<f32>, direction: Vector3<f32>) -> Self {
        let direction = direction
            .try_normalize(1e-8)
            .unwrap_or_else(|| Vector3::new(0.0, 1.0, 0.0));
        Self { origin, direction }
    }

    #[inline]
    pub fn point_at(&self, t: f32) -> Vector3<f32> {
        self.origin + self.direction * t
    }
}

/// Closest intersection found by a raycast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub point: Vector3<f32>,
    /// Outward surface normal at `point`.
    pub normal: Vector3<f32>,
    pub distance: f32,
    pub body: BodyHandle,
}

/// Slab test of a line `origin + t * dir`, `t ∈ [0, max_t]`, against `[min, max]`.
///
/// Returns the entry parameter and the outward normal of the entered face.
/// An origin inside the box yields `t = 0` and a zero normal.
pub(crate) fn slab_intersect(
    origin: &Vector3<f32>,
    dir: &Vector3<f32>,
    min: &Vector3<f32>,
    max: &Vector3<f32>,
    max_t: f32,
) -> Option<(f32, Vector3<f32>)> {
    let mut t_min = 0.0f32;
    let mut t_max = max_t;
    let mut normal = Vector3::zeros();

    for i in 0..3 {
        if dir[i].abs() < 1e-8 {
            if origin[i] < min[i] || origin[i] > max[i] {
                return None;
            }
        } else {
            let inv = 1.0 / dir[i];
            let mut near = (min[i] - origin[i]) * inv;
            let mut far = (max[i] - origin[i]) * inv;
            // Entering through the min face unless the ray travels toward -axis.
            let mut sign = -1.0;
            if near > far {
                core::mem::swap(&mut near, &mut far);
                sign = 1.0;
            }

            if near > t_min {
                t_min = near;
                normal = Vector3::zeros();
                normal[i] = sign;
            }
            t_max = t_max.min(far);

            if t_min > t_max {
                return None;
            }
        }
    }

    Some((t_min, normal))
}

/// Exact ray/sphere test. Returns `(t, normal)`.
pub fn ray_sphere(
    ray: &Ray,
    center: &Vector3<f32>,
    radius: f32,
    max_distance: f32,
) -> Option<(f32, Vector3<f32>)> {
    let oc = ray.origin - center;
    let b = oc.dot(&ray.direction);
    let c = oc.norm_squared() - radius * radius;

    if c <= 0.0 {
        // Starting inside.
        return Some((0.0, -ray.direction));
    }
    if b > 0.0 {
        return None;
    }
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }

    let t = -b - disc.sqrt();
    if t > max_distance {
        return None;
    }
    let t = t.max(0.0);
    let normal = (ray.point_at(t) - center)
        .try_normalize(1e-8)
        .unwrap_or(-ray.direction);
    Some((t, normal))
}

/// Exact ray/box test in the body's local frame. Returns `(t, world normal)`.
pub fn ray_box(ray: &Ray, body: &RigidBody, half_extents: &Vector3<f32>, max_distance: f32) -> Option<(f32, Vector3<f32>)> {
    let local_origin = body.world_to_local(&ray.origin);
    let local_dir = body.orientation.inverse_transform_vector(&ray.direction);

    let (t, local_normal) =
        slab_intersect(&local_origin, &local_dir, &-half_extents, half_extents, max_distance)?;

    if local_normal == Vector3::zeros() {
        return Some((0.0, -ray.direction));
    }
    Some((t, body.orientation * local_normal))
}

/// Exact hit against a single body.
pub fn cast_body(ray: &Ray, body: &RigidBody, max_distance: f32) -> Option<(f32, Vector3<f32>)> {
    match body.shape() {
        Shape::Sphere { radius } => ray_sphere(ray, &body.position, *radius, max_distance),
        Shape::Box { half_extents } => ray_box(ray, body, half_extents, max_distance),
    }
}

/// Closest hit over every body in `bodies` within `max_distance`.
pub fn raycast<const N: usize>(
    bodies: &Arena<RigidBody, N>,
    ray: &Ray,
    max_distance: f32,
) -> Option<RaycastHit> {
    let mut best: Option<RaycastHit> = None;

    for (index, body) in bodies.iter() {
        let limit = best.map_or(max_distance, |h| h.distance);
        let aabb = body.aabb();
        if slab_intersect(&ray.origin, &ray.direction, &aabb.min, &aabb.max, limit).is_none() {
            continue;
        }

        if let Some((t, normal)) = cast_body(ray, body, limit) {
            if best.map_or(true, |h| t < h.distance) {
                best = Some(RaycastHit {
                    point: ray.point_at(t),
                    normal,
                    distance: t,
                    body: BodyHandle(index),
                });
            }
        }
    }

    best
}

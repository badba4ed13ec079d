//! Broad-phase pair filtering and narrow-phase shape tests.
//!
//! Every narrow-phase function returns the contact normal pointing from the
//! first body toward the second, plus up to [`MAX_CONTACTS`] contact points.
//! When a sphere pair misses the discrete test but moved during the step, a
//! swept test turns the relative motion into a ray and accepts hits with
//! `t ∈ [0, 1]`, widened by [`SWEEP_TOLERANCE`] so a pair that ends the step
//! exactly touching still reports contact. The hit carries `t` (capped at 1)
//! as its time of impact; the world moves the bodies back to it, so fast
//! bodies do not tunnel through thin ones.
//!
//! # Supported pairs
//! - sphere / sphere: centre distance, swept fallback
//! - sphere / box: closest point in box space, swept fallback against the
//!   box expanded by the radius
//! - box / box: 15-axis separating axis test, reference-face clipping (see
//!   [`BoxContactMode`])

use nalgebra::Vector3;

#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::body::{BodyHandle, RigidBody, Shape};
use crate::contact::{CollisionInfo, Contact, ContactPoints, MAX_CONTACTS};
use crate::raycast::slab_intersect;

/// Incident vertices above the reference plane by less than this still make contacts.
pub const CLIP_EPSILON: f32 = 0.005;
/// Swept hits up to this far past the end of the step still count, reported at `t = 1`.
pub const SWEEP_TOLERANCE: f32 = 1e-3;
/// A face axis from B must beat A's best face by this much to become the reference.
const FACE_TOLERANCE: f32 = 1e-3;
/// An edge axis must beat the best face axis by this much to be used.
const EDGE_TOLERANCE: f32 = 1e-3;

const DEFAULT_NORMAL: Vector3<f32> = Vector3::new(0.0, 1.0, 0.0);

#[inline]
fn sign(x: f32) -> f32 {
    if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Whether a body pair needs narrow-phase work at all (before any AABB test).
///
/// Skips static/static, pairs where neither body can respond (unless a trigger
/// is involved), and pairs where nothing is awake and moving.
pub fn should_test_pair(a: &RigidBody, b: &RigidBody) -> bool {
    if a.is_static() && b.is_static() {
        return false;
    }
    let trigger = a.is_trigger || b.is_trigger;
    if a.inv_mass() == 0.0 && b.inv_mass() == 0.0 && !trigger {
        return false;
    }
    let a_active = !a.is_static() && !a.is_sleeping();
    let b_active = !b.is_static() && !b.is_sleeping();
    a_active || b_active
}

/// Broad phase: shape-independent rejection on the bounds swept over this step.
#[inline]
pub fn bounds_overlap(a: &RigidBody, b: &RigidBody) -> bool {
    a.swept_aabb().overlaps(&b.swept_aabb())
}

/// Narrow phase dispatch. Returns a manifold when the shapes touch or overlap.
pub fn collide(
    handle_a: BodyHandle,
    a: &RigidBody,
    handle_b: BodyHandle,
    b: &RigidBody,
) -> Option<CollisionInfo> {
    collide_with(handle_a, a, handle_b, b, BoxContactMode::default())
}

/// [`collide`] with an explicit box/box contact mode.
pub fn collide_with(
    handle_a: BodyHandle,
    a: &RigidBody,
    handle_b: BodyHandle,
    b: &RigidBody,
    box_contacts: BoxContactMode,
) -> Option<CollisionInfo> {
    let hit = match (a.shape(), b.shape()) {
        (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => {
            sphere_sphere(a, *ra, b, *rb)?
        }
        (Shape::Sphere { radius }, Shape::Box { half_extents }) => {
            sphere_box(a, *radius, b, half_extents)?
        }
        (Shape::Box { half_extents }, Shape::Sphere { radius }) => {
            // Flip: run sphere-box with swapped order, negate normal
            sphere_box(b, *radius, a, half_extents)?.flipped()
        }
        (Shape::Box { half_extents: ha }, Shape::Box { half_extents: hb }) => {
            box_box_with(a, ha, b, hb, box_contacts)?
        }
    };

    let mut info = CollisionInfo::new(handle_a, handle_b, hit.normal);
    for contact in hit.contacts {
        info.add_contact(contact);
    }
    info.is_trigger = a.is_trigger || b.is_trigger;
    info.time_of_impact = hit.time_of_impact;
    if info.has_collision {
        Some(info)
    } else {
        None
    }
}

/// Narrow-phase result: normal from the first shape toward the second.
#[derive(Debug, Clone)]
pub struct Hit {
    pub normal: Vector3<f32>,
    pub contacts: ContactPoints,
    /// Set by swept tests: fraction of this step's motion at first touch.
    pub time_of_impact: Option<f32>,
}

impl Hit {
    /// The same hit seen from the second shape.
    fn flipped(mut self) -> Self {
        self.normal = -self.normal;
        self
    }

    fn at_time(mut self, t: f32) -> Self {
        self.time_of_impact = Some(t);
        self
    }
}

fn single_contact(
    normal: Vector3<f32>,
    position: Vector3<f32>,
    penetration: f32,
) -> Hit {
    let mut contacts = ContactPoints::new();
    let _ = contacts.push(Contact::new(position, penetration));
    Hit {
        normal,
        contacts,
        time_of_impact: None,
    }
}

// ---------------------------------------------------------------------------
// Sphere vs sphere
// ---------------------------------------------------------------------------

/// Sphere vs sphere, falling back to a swept test when the discrete one misses.
pub fn sphere_sphere(
    a: &RigidBody,
    radius_a: f32,
    b: &RigidBody,
    radius_b: f32,
) -> Option<Hit> {
    let diff = b.position - a.position;
    let dist_sq = diff.norm_squared();
    let sum_r = radius_a + radius_b;

    if dist_sq > sum_r * sum_r {
        return sweep_sphere_sphere(a, radius_a, b, radius_b);
    }

    let dist = dist_sq.sqrt();
    let penetration = sum_r - dist;
    let normal = if dist > 1e-6 {
        diff / dist
    } else {
        // Coincident centres: any axis separates them.
        DEFAULT_NORMAL
    };
    let position = a.position + normal * (radius_a - 0.5 * penetration);
    Some(single_contact(normal, position, penetration))
}

/// Earliest `t ∈ [0, 1]` at which `start + t * motion` reaches `radius` from the origin.
///
/// Round-off can put an exactly touching end pose a hair outside `radius`, so
/// roots just past 1 are accepted and capped.
fn sweep_point_sphere(start: &Vector3<f32>, motion: &Vector3<f32>, radius: f32) -> Option<f32> {
    let a = motion.norm_squared();
    if a < 1e-12 {
        return None;
    }
    let b = start.dot(motion);
    let c = start.norm_squared() - radius * radius;
    if c < 0.0 || b >= 0.0 {
        // Already overlapping at the start, or moving apart.
        return None;
    }
    let disc = b * b - a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / a;
    if (0.0..=1.0 + SWEEP_TOLERANCE).contains(&t) {
        Some(t.min(1.0))
    } else {
        None
    }
}

fn sweep_sphere_sphere(
    a: &RigidBody,
    radius_a: f32,
    b: &RigidBody,
    radius_b: f32,
) -> Option<Hit> {
    let motion_a = a.position - a.prev_position;
    let motion_b = b.position - b.prev_position;
    let relative_motion = motion_b - motion_a;
    let start = b.prev_position - a.prev_position;

    let t = sweep_point_sphere(&start, &relative_motion, radius_a + radius_b)?;

    let pa = a.prev_position + motion_a * t;
    let pb = b.prev_position + motion_b * t;
    let normal = (pb - pa).try_normalize(1e-6).unwrap_or(DEFAULT_NORMAL);
    Some(single_contact(normal, pa + normal * radius_a, 0.0).at_time(t))
}

// ---------------------------------------------------------------------------
// Sphere vs box
// ---------------------------------------------------------------------------

/// Sphere vs oriented box. The returned normal points from the sphere toward the box.
pub fn sphere_box(
    sphere: &RigidBody,
    radius: f32,
    cuboid: &RigidBody,
    half: &Vector3<f32>,
) -> Option<Hit> {
    let local = cuboid.world_to_local(&sphere.position);
    let closest = Vector3::new(
        local.x.clamp(-half.x, half.x),
        local.y.clamp(-half.y, half.y),
        local.z.clamp(-half.z, half.z),
    );

    let diff = local - closest;
    let dist_sq = diff.norm_squared();
    if dist_sq > radius * radius {
        return sweep_sphere_box(sphere, radius, cuboid, half);
    }

    let (local_normal, penetration, local_point) = if dist_sq > 1e-12 {
        // Centre outside the box: push along closest-point direction.
        let dist = dist_sq.sqrt();
        (-diff / dist, radius - dist, closest)
    } else {
        // Centre inside the box: leave through the face of least penetration.
        let mut min_dist = f32::MAX;
        let mut axis = 1;
        let mut face = 1.0;
        for i in 0..3 {
            let to_pos = half[i] - local[i];
            let to_neg = half[i] + local[i];
            if to_pos < min_dist {
                min_dist = to_pos;
                axis = i;
                face = 1.0;
            }
            if to_neg < min_dist {
                min_dist = to_neg;
                axis = i;
                face = -1.0;
            }
        }
        let mut outward = Vector3::zeros();
        outward[axis] = face;
        let mut point = local;
        point[axis] = face * half[axis];
        (-outward, radius + min_dist, point)
    };

    Some(single_contact(
        cuboid.orientation * local_normal,
        cuboid.local_to_world(&local_point),
        penetration,
    ))
}

fn sweep_sphere_box(
    sphere: &RigidBody,
    radius: f32,
    cuboid: &RigidBody,
    half: &Vector3<f32>,
) -> Option<Hit> {
    // Sphere centre motion relative to the box, in the box's current frame.
    let start = cuboid
        .orientation
        .inverse_transform_vector(&(sphere.prev_position - cuboid.prev_position));
    let end = cuboid.world_to_local(&sphere.position);
    let motion = end - start;
    if motion.norm_squared() < 1e-12 {
        return None;
    }

    let expanded = half + Vector3::repeat(radius);
    let (t, outward) = slab_intersect(&start, &motion, &-expanded, &expanded, 1.0 + SWEEP_TOLERANCE)?;
    let t = t.min(1.0);
    if outward == Vector3::zeros() {
        return None;
    }

    let hit_center = start + motion * t;
    let surface = hit_center - outward * radius;
    let local_point = Vector3::new(
        surface.x.clamp(-half.x, half.x),
        surface.y.clamp(-half.y, half.y),
        surface.z.clamp(-half.z, half.z),
    );
    Some(
        single_contact(
            cuboid.orientation * -outward,
            cuboid.local_to_world(&local_point),
            0.0,
        )
        .at_time(t),
    )
}

// ---------------------------------------------------------------------------
// Box vs box
// ---------------------------------------------------------------------------

struct BoxFrame {
    center: Vector3<f32>,
    axes: [Vector3<f32>; 3],
    half: Vector3<f32>,
}

impl BoxFrame {
    fn new(body: &RigidBody, half: &Vector3<f32>) -> Self {
        let r = body.orientation.to_rotation_matrix();
        let m = r.matrix();
        Self {
            center: body.position,
            axes: [
                m.column(0).into_owned(),
                m.column(1).into_owned(),
                m.column(2).into_owned(),
            ],
            half: *half,
        }
    }

    /// Projected radius of the box onto `axis`.
    fn project(&self, axis: &Vector3<f32>) -> f32 {
        (0..3)
            .map(|i| self.half[i] * self.axes[i].dot(axis).abs())
            .sum()
    }

    fn face_area(&self, axis: usize) -> f32 {
        self.half[(axis + 1) % 3] * self.half[(axis + 2) % 3]
    }

    /// Axis index whose face normal is most parallel to `dir`.
    fn most_aligned(&self, dir: &Vector3<f32>) -> usize {
        let mut best = 0;
        let mut best_dot = -1.0;
        for i in 0..3 {
            let d = self.axes[i].dot(dir).abs();
            if d > best_dot {
                best_dot = d;
                best = i;
            }
        }
        best
    }
}

/// Overlap of the two projections on `axis`; negative means separated.
fn overlap_on_axis(a: &BoxFrame, b: &BoxFrame, d: &Vector3<f32>, axis: &Vector3<f32>) -> f32 {
    a.project(axis) + b.project(axis) - d.dot(axis).abs()
}

/// How [`box_box_with`] chooses the face whose plane clips the other box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxContactMode {
    /// The normal is the SAT axis of least overlap. The reference face is the
    /// face of A most aligned with it and B's most anti-aligned face is
    /// clipped, so contacts always lie on B.
    #[default]
    ReferenceOnA,
    /// The reference face comes from whichever box owns the face axis of
    /// least overlap, near ties going to the larger face. An edge/edge axis
    /// that clearly wins yields one contact between the two edges.
    LeastOverlap,
}

#[derive(Debug, Clone, Copy)]
enum Feature {
    FaceA(usize),
    FaceB(usize),
    Edge(usize, usize),
}

/// Box vs box with the default [`BoxContactMode`].
pub fn box_box(
    a: &RigidBody,
    half_a: &Vector3<f32>,
    b: &RigidBody,
    half_b: &Vector3<f32>,
) -> Option<Hit> {
    box_box_with(a, half_a, b, half_b, BoxContactMode::default())
}

/// Box vs box using the separating axis theorem.
///
/// Face axes are tested first, then the nine edge cross products; the test
/// returns as soon as any axis separates. Zero overlap still counts as contact.
pub fn box_box_with(
    a: &RigidBody,
    half_a: &Vector3<f32>,
    b: &RigidBody,
    half_b: &Vector3<f32>,
    mode: BoxContactMode,
) -> Option<Hit> {
    let fa = BoxFrame::new(a, half_a);
    let fb = BoxFrame::new(b, half_b);
    let d = fb.center - fa.center;

    let mut best_a = (f32::MAX, 0);
    for i in 0..3 {
        let overlap = overlap_on_axis(&fa, &fb, &d, &fa.axes[i]);
        if overlap < 0.0 {
            return None;
        }
        if overlap < best_a.0 {
            best_a = (overlap, i);
        }
    }

    let mut best_b = (f32::MAX, 0);
    for j in 0..3 {
        let overlap = overlap_on_axis(&fa, &fb, &d, &fb.axes[j]);
        if overlap < 0.0 {
            return None;
        }
        if overlap < best_b.0 {
            best_b = (overlap, j);
        }
    }

    let mut best_edge: Option<(f32, usize, usize, Vector3<f32>)> = None;
    for i in 0..3 {
        for j in 0..3 {
            let cross = fa.axes[i].cross(&fb.axes[j]);
            let len_sq = cross.norm_squared();
            if len_sq < 1e-6 {
                // Parallel edges: the face axes already cover this direction.
                continue;
            }
            let axis = cross / len_sq.sqrt();
            let overlap = overlap_on_axis(&fa, &fb, &d, &axis);
            if overlap < 0.0 {
                return None;
            }
            if best_edge.map_or(true, |e| overlap < e.0) {
                best_edge = Some((overlap, i, j, axis));
            }
        }
    }

    match mode {
        BoxContactMode::ReferenceOnA => {
            let (mut overlap, mut axis) = (best_a.0, fa.axes[best_a.1]);
            if best_b.0 < overlap {
                (overlap, axis) = (best_b.0, fb.axes[best_b.1]);
            }
            if let Some((edge_overlap, _, _, edge_axis)) = best_edge {
                if edge_overlap < overlap {
                    (overlap, axis) = (edge_overlap, edge_axis);
                }
            }
            if axis.dot(&d) < 0.0 {
                axis = -axis;
            }

            let i = fa.most_aligned(&axis);
            let ref_normal = fa.axes[i] * sign(fa.axes[i].dot(&axis));
            let mut hit = face_contacts(&fa, i, &ref_normal, &fb, overlap);
            hit.normal = axis;
            Some(hit)
        }
        BoxContactMode::LeastOverlap => {
            // Near-ties go to the larger face so a small box resting on a
            // large one clips the small one.
            let (face_overlap, face) = if best_b.0 < best_a.0 - FACE_TOLERANCE {
                (best_b.0, Feature::FaceB(best_b.1))
            } else if best_a.0 < best_b.0 - FACE_TOLERANCE {
                (best_a.0, Feature::FaceA(best_a.1))
            } else if fb.face_area(best_b.1) > fa.face_area(best_a.1) {
                (best_b.0, Feature::FaceB(best_b.1))
            } else {
                (best_a.0, Feature::FaceA(best_a.1))
            };

            let feature = match best_edge {
                Some((overlap, i, j, _)) if overlap < face_overlap - EDGE_TOLERANCE => Feature::Edge(i, j),
                _ => face,
            };

            match feature {
                Feature::FaceA(i) => {
                    let ref_normal = fa.axes[i] * sign(fa.axes[i].dot(&d));
                    Some(face_contacts(&fa, i, &ref_normal, &fb, face_overlap))
                }
                Feature::FaceB(j) => {
                    let ref_normal = fb.axes[j] * sign(fb.axes[j].dot(&-d));
                    Some(face_contacts(&fb, j, &ref_normal, &fa, face_overlap).flipped())
                }
                Feature::Edge(i, j) => {
                    let (overlap, _, _, mut axis) = best_edge?;
                    if axis.dot(&d) < 0.0 {
                        axis = -axis;
                    }
                    Some(edge_contact(&fa, i, &fb, j, &axis, overlap))
                }
            }
        }
    }
}

/// Clip the incident face of `inc` against the reference face `axis` of `reference`.
///
/// `ref_normal` is that face's outward normal, facing `inc`. Only the
/// reference plane is used, not the reference face's side planes, so a
/// contact can land slightly outside the reference face's extent. Depths are
/// capped at the SAT overlap `max_depth`.
fn face_contacts(
    reference: &BoxFrame,
    axis: usize,
    ref_normal: &Vector3<f32>,
    inc: &BoxFrame,
    max_depth: f32,
) -> Hit {
    let ref_normal = *ref_normal;
    let plane = reference.center.dot(&ref_normal) + reference.half[axis];

    let j = inc.most_aligned(&ref_normal);
    let inc_normal = inc.axes[j] * -sign(inc.axes[j].dot(&ref_normal));
    let inc_center = inc.center + inc_normal * inc.half[j];
    let u = (j + 1) % 3;
    let v = (j + 2) % 3;
    let du = inc.axes[u] * inc.half[u];
    let dv = inc.axes[v] * inc.half[v];

    let mut contacts = ContactPoints::new();
    for (su, sv) in [(1.0, 1.0), (1.0, -1.0), (-1.0, -1.0), (-1.0, 1.0)] {
        let vertex = inc_center + du * su + dv * sv;
        let depth = plane - vertex.dot(&ref_normal);
        if depth >= -CLIP_EPSILON && contacts.len() < MAX_CONTACTS {
            let _ = contacts.push(Contact::new(
                vertex + ref_normal * (0.5 * depth),
                depth.min(max_depth).max(0.0),
            ));
        }
    }

    if contacts.is_empty() {
        // Clipping found nothing: fall back to one point between the centres.
        let _ = contacts.push(Contact::new(
            (reference.center + inc.center) * 0.5,
            max_depth.max(0.0),
        ));
    }

    Hit {
        normal: ref_normal,
        contacts,
        time_of_impact: None,
    }
}

/// Single contact between the two supporting edges for an edge/edge axis.
fn edge_contact(
    a: &BoxFrame,
    i: usize,
    b: &BoxFrame,
    j: usize,
    normal: &Vector3<f32>,
    penetration: f32,
) -> Hit {
    // Edge of A furthest along the normal, edge of B furthest against it.
    let mut pa = a.center;
    let mut pb = b.center;
    for k in 0..3 {
        if k != i {
            pa += a.axes[k] * (a.half[k] * sign(a.axes[k].dot(normal)));
        }
        if k != j {
            pb -= b.axes[k] * (b.half[k] * sign(b.axes[k].dot(normal)));
        }
    }
    let ua = a.axes[i];
    let ub = b.axes[j];

    // Closest points between the two segments.
    let r = pa - pb;
    let bb = ua.dot(&ub);
    let c = ua.dot(&r);
    let f = ub.dot(&r);
    let denom = 1.0 - bb * bb;
    let mut s = if denom > 1e-6 {
        ((bb * f - c) / denom).clamp(-a.half[i], a.half[i])
    } else {
        0.0
    };
    let mut t = bb * s + f;
    if t < -b.half[j] || t > b.half[j] {
        t = t.clamp(-b.half[j], b.half[j]);
        s = (bb * t - c).clamp(-a.half[i], a.half[i]);
    }

    let on_a = pa + ua * s;
    let on_b = pb + ub * t;
    single_contact(*normal, (on_a + on_b) * 0.5, penetration.max(0.0))
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use nalgebra::UnitQuaternion;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn approx_vec_eq(a: &Vector3<f32>, b: &Vector3<f32>) -> bool {
        approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
    }

    fn sphere_at(p: Vector3<f32>, r: f32) -> RigidBody {
        RigidBody::new(Shape::sphere(r), 1.0).with_position(p)
    }

    fn cube_at(p: Vector3<f32>, h: f32) -> RigidBody {
        RigidBody::new(Shape::cuboid(h, h, h), 1.0).with_position(p)
    }

    fn handles() -> (BodyHandle, BodyHandle) {
        (BodyHandle::from_raw_parts(0, 0), BodyHandle::from_raw_parts(1, 0))
    }

    // -- Sphere vs sphere --

    #[test]
    fn test_sphere_sphere_no_collision() {
        let a = sphere_at(Vector3::zeros(), 1.0);
        let b = sphere_at(Vector3::new(3.0, 0.0, 0.0), 1.0);
        assert!(sphere_sphere(&a, 1.0, &b, 1.0).is_none());
    }

    #[test]
    fn test_sphere_sphere_overlapping() {
        let a = sphere_at(Vector3::zeros(), 1.0);
        let b = sphere_at(Vector3::new(1.5, 0.0, 0.0), 1.0);
        let Hit { normal, contacts, .. } = sphere_sphere(&a, 1.0, &b, 1.0).unwrap();
        assert_eq!(contacts.len(), 1);
        assert!(approx_eq(contacts[0].penetration, 0.5));
        assert!(approx_vec_eq(&normal, &Vector3::x()));
        assert!(approx_vec_eq(&contacts[0].position, &Vector3::new(0.75, 0.0, 0.0)));
    }

    #[test]
    fn test_sphere_sphere_touching_counts() {
        let a = sphere_at(Vector3::zeros(), 1.0);
        let b = sphere_at(Vector3::new(2.0, 0.0, 0.0), 1.0);
        let Hit { contacts, .. } = sphere_sphere(&a, 1.0, &b, 1.0).unwrap();
        assert!(approx_eq(contacts[0].penetration, 0.0));
    }

    #[test]
    fn test_sphere_sphere_coincident_uses_default_axis() {
        let a = sphere_at(Vector3::zeros(), 1.0);
        let b = sphere_at(Vector3::zeros(), 1.0);
        let Hit { normal, contacts, .. } = sphere_sphere(&a, 1.0, &b, 1.0).unwrap();
        assert!(approx_vec_eq(&normal, &Vector3::y()));
        assert!(approx_eq(contacts[0].penetration, 2.0));
    }

    #[test]
    fn test_sphere_sphere_swept_catches_tunneling() {
        // B crossed straight through A during the step.
        let a = sphere_at(Vector3::zeros(), 0.25);
        let mut b = sphere_at(Vector3::new(3.0, 0.0, 0.0), 0.25);
        b.prev_position = Vector3::new(-3.0, 0.0, 0.0);
        let hit = sphere_sphere(&a, 0.25, &b, 0.25).unwrap();
        // At impact B is on the -X side of A.
        assert!(approx_vec_eq(&hit.normal, &-Vector3::x()));
        assert!(approx_vec_eq(&hit.contacts[0].position, &Vector3::new(-0.25, 0.0, 0.0)));
        assert_eq!(hit.contacts[0].penetration, 0.0);
        // Centres close from 3.0 to the 0.5 radius sum after 2.5 of the 6.0 travelled.
        assert!(approx_eq(hit.time_of_impact.unwrap(), 2.5 / 6.0));
    }

    #[test]
    fn test_sphere_sphere_swept_rejects_outside_step() {
        // Moving toward each other but still short of contact at the end of the step.
        let a = sphere_at(Vector3::zeros(), 0.5);
        let mut b = sphere_at(Vector3::new(3.0, 0.0, 0.0), 0.5);
        b.prev_position = Vector3::new(4.0, 0.0, 0.0);
        assert!(sphere_sphere(&a, 0.5, &b, 0.5).is_none());

        // Moving apart.
        let mut c = sphere_at(Vector3::new(3.0, 0.0, 0.0), 0.5);
        c.prev_position = Vector3::new(1.5, 0.0, 0.0);
        assert!(sphere_sphere(&a, 0.5, &c, 0.5).is_none());
    }

    #[test]
    fn test_sphere_sphere_swept_end_of_step_touch_counts() {
        // B stops a rounding error short of touching A; the sweep still reports it.
        let a = sphere_at(Vector3::zeros(), 0.5);
        let mut b = sphere_at(Vector3::new(1.000_001, 0.0, 0.0), 0.5);
        b.prev_position = Vector3::new(2.0, 0.0, 0.0);
        let hit = sphere_sphere(&a, 0.5, &b, 0.5).unwrap();
        assert_eq!(hit.time_of_impact, Some(1.0));
        assert_eq!(hit.contacts[0].penetration, 0.0);
        assert!(approx_vec_eq(&hit.normal, &Vector3::x()));
    }

    // -- Sphere vs box --

    #[test]
    fn test_sphere_box_overlapping() {
        let s = sphere_at(Vector3::new(1.5, 0.0, 0.0), 1.0);
        let b = cube_at(Vector3::zeros(), 1.0);
        let Hit {
            normal,
            contacts,
            time_of_impact,
        } = sphere_box(&s, 1.0, &b, &Vector3::repeat(1.0)).unwrap();
        assert!(time_of_impact.is_none());
        assert!(approx_eq(contacts[0].penetration, 0.5));
        // From sphere toward box.
        assert!(approx_vec_eq(&normal, &-Vector3::x()));
        assert!(approx_vec_eq(&contacts[0].position, &Vector3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_sphere_box_no_collision() {
        let s = sphere_at(Vector3::new(5.0, 0.0, 0.0), 1.0);
        let b = cube_at(Vector3::zeros(), 1.0);
        assert!(sphere_box(&s, 1.0, &b, &Vector3::repeat(1.0)).is_none());
    }

    #[test]
    fn test_sphere_box_rotated() {
        // Box turned 45° about Z: its corner points along +X at sqrt(2).
        let b = RigidBody::new(Shape::cuboid(1.0, 1.0, 1.0), 1.0).with_orientation(
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), core::f32::consts::FRAC_PI_4),
        );
        let s = sphere_at(Vector3::new(1.8, 0.0, 0.0), 0.5);
        let Hit { normal, contacts, .. } = sphere_box(&s, 0.5, &b, &Vector3::repeat(1.0)).unwrap();
        assert!(approx_eq(contacts[0].penetration, 0.5 - (1.8 - core::f32::consts::SQRT_2)));
        assert!(approx_vec_eq(&normal, &-Vector3::x()));
    }

    #[test]
    fn test_sphere_box_center_inside() {
        let s = sphere_at(Vector3::new(0.0, 0.8, 0.0), 0.5);
        let b = RigidBody::new(Shape::cuboid(2.0, 1.0, 3.0), 1.0);
        let Hit { normal, contacts, .. } = sphere_box(&s, 0.5, &b, &Vector3::new(2.0, 1.0, 3.0)).unwrap();
        // Closest face is +Y (0.2 away); sphere must leave upward, so box lies along -Y.
        assert!(approx_vec_eq(&normal, &-Vector3::y()));
        assert!(approx_eq(contacts[0].penetration, 0.7));
        assert!(approx_eq(contacts[0].position.y, 1.0));
    }

    #[test]
    fn test_sphere_box_swept() {
        // Sphere passed through a thin wall during the step.
        let wall = RigidBody::new_static(Shape::cuboid(0.05, 2.0, 2.0));
        let mut s = sphere_at(Vector3::new(2.0, 0.0, 0.0), 0.2);
        s.prev_position = Vector3::new(-2.0, 0.0, 0.0);
        let hit = sphere_box(&s, 0.2, &wall, &Vector3::new(0.05, 2.0, 2.0)).unwrap();
        assert!(approx_vec_eq(&hit.normal, &Vector3::x()));
        assert!(approx_eq(hit.contacts[0].position.x, -0.05));
        assert_eq!(hit.contacts[0].penetration, 0.0);
        assert!(approx_eq(hit.time_of_impact.unwrap(), 1.75 / 4.0));
    }

    #[test]
    fn test_box_sphere_dispatch_flips_normal() {
        let (ha, hb) = handles();
        let b = cube_at(Vector3::zeros(), 1.0);
        let s = sphere_at(Vector3::new(1.5, 0.0, 0.0), 1.0);
        let info = collide(ha, &b, hb, &s).unwrap();
        assert!(approx_vec_eq(&info.normal, &Vector3::x()));
        assert_eq!(info.body_a, ha);
        assert_eq!(info.body_b, hb);
    }

    // -- Box vs box --

    #[test]
    fn test_box_box_face_separation() {
        let a = cube_at(Vector3::zeros(), 1.0);
        for dir in [Vector3::x(), Vector3::y(), Vector3::z(), -Vector3::x()] {
            let b = cube_at(dir * 2.1, 1.0);
            assert!(box_box(&a, &Vector3::repeat(1.0), &b, &Vector3::repeat(1.0)).is_none());
        }
    }

    #[test]
    fn test_box_box_touching_reports_zero_depth() {
        let a = cube_at(Vector3::zeros(), 1.0);
        let b = cube_at(Vector3::new(0.0, 2.0, 0.0), 1.0);
        let Hit { normal, contacts, .. } = box_box(&a, &Vector3::repeat(1.0), &b, &Vector3::repeat(1.0)).unwrap();
        assert!(!contacts.is_empty());
        assert!(approx_vec_eq(&normal, &Vector3::y()));
        for c in &contacts {
            assert!(approx_eq(c.penetration, 0.0));
        }
    }

    #[test]
    fn test_box_box_resting_has_four_contacts() {
        let ground = RigidBody::new_static(Shape::cuboid(10.0, 0.5, 10.0))
            .with_position(Vector3::new(0.0, -0.5, 0.0));
        let cube = cube_at(Vector3::new(0.0, 0.49, 0.0), 0.5);
        let ground_half = Vector3::new(10.0, 0.5, 10.0);
        let cube_half = Vector3::repeat(0.5);

        // Ground first: contacts at the small box's corners in either mode.
        for mode in [BoxContactMode::ReferenceOnA, BoxContactMode::LeastOverlap] {
            let Hit { normal, contacts, .. } = box_box_with(&ground, &ground_half, &cube, &cube_half, mode).unwrap();
            assert_eq!(contacts.len(), 4);
            assert!(approx_vec_eq(&normal, &Vector3::y()));
            for c in &contacts {
                assert!(approx_eq(c.penetration, 0.01));
                assert!(c.position.x.abs() <= 0.5 + EPSILON);
            }
        }
    }

    #[test]
    fn test_box_box_reference_face_is_on_a() {
        let ground = RigidBody::new_static(Shape::cuboid(10.0, 0.5, 10.0))
            .with_position(Vector3::new(0.0, -0.5, 0.0));
        let cube = cube_at(Vector3::new(0.0, 0.49, 0.0), 0.5);
        let ground_half = Vector3::new(10.0, 0.5, 10.0);
        let cube_half = Vector3::repeat(0.5);

        // The cube's bottom face is the reference, so the slab's top corners
        // are the incident points.
        let Hit { normal, contacts, .. } = box_box(&cube, &cube_half, &ground, &ground_half).unwrap();
        assert_eq!(contacts.len(), 4);
        assert!(approx_vec_eq(&normal, &-Vector3::y()));
        for c in &contacts {
            assert!(approx_eq(c.penetration, 0.01));
            assert!(approx_eq(c.position.x.abs(), 10.0));
            assert!(approx_eq(c.position.y, -0.005));
        }

        // The least-overlap mode clips the smaller box instead.
        let Hit { normal, contacts, .. } =
            box_box_with(&cube, &cube_half, &ground, &ground_half, BoxContactMode::LeastOverlap).unwrap();
        assert_eq!(contacts.len(), 4);
        assert!(approx_vec_eq(&normal, &-Vector3::y()));
        for c in &contacts {
            assert!(c.position.z.abs() <= 0.5 + EPSILON);
        }
    }

    #[test]
    fn test_box_box_edge_axis_separation() {
        // A turned about Z and B about Y: every face axis overlaps, but the
        // cross product of their leading edges (world X) separates them.
        let angle = core::f32::consts::FRAC_PI_4;
        let a = RigidBody::new(Shape::cuboid(1.0, 1.0, 1.0), 1.0)
            .with_orientation(UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle));
        let gap = 0.1;
        let b = RigidBody::new(Shape::cuboid(1.0, 1.0, 1.0), 1.0)
            .with_position(Vector3::new(2.0 * core::f32::consts::SQRT_2 + gap, 0.0, 0.0))
            .with_orientation(UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angle));
        let half = Vector3::repeat(1.0);
        assert!(box_box(&a, &half, &b, &half).is_none());

        let touching = b
            .clone()
            .with_position(Vector3::new(2.0 * core::f32::consts::SQRT_2, 0.0, 0.0));

        // Edge axis wins; B's face clipped against A's plane reports no depth.
        let Hit { normal, contacts, .. } = box_box(&a, &half, &touching, &half).unwrap();
        assert!(!contacts.is_empty());
        assert!(approx_eq(normal.x, 1.0));
        assert!(contacts.iter().all(|c| c.penetration.abs() < 1e-3));

        let Hit { normal, contacts, .. } =
            box_box_with(&a, &half, &touching, &half, BoxContactMode::LeastOverlap).unwrap();
        assert_eq!(contacts.len(), 1);
        assert!(approx_eq(normal.x.abs(), 1.0));
        assert!(contacts[0].penetration.abs() < 1e-3);
        assert!(approx_vec_eq(&contacts[0].position, &Vector3::new(core::f32::consts::SQRT_2, 0.0, 0.0)));
    }

    #[test]
    fn test_box_box_deep_overlap_normal_points_a_to_b() {
        let a = cube_at(Vector3::zeros(), 1.0);
        let b = cube_at(Vector3::new(-1.5, 0.2, 0.1), 1.0);
        let Hit { normal, contacts, .. } = box_box(&a, &Vector3::repeat(1.0), &b, &Vector3::repeat(1.0)).unwrap();
        assert!(approx_vec_eq(&normal, &-Vector3::x()));
        assert!(contacts.iter().all(|c| approx_eq(c.penetration, 0.5)));
    }

    // -- Pair filtering --

    #[test]
    fn test_pair_filtering() {
        let ground = RigidBody::new_static(Shape::sphere(1.0));
        let wall = RigidBody::new_static(Shape::sphere(1.0));
        let ball = RigidBody::new(Shape::sphere(1.0), 1.0);
        let platform = RigidBody::new(Shape::sphere(1.0), 1.0).with_kinematic(true);
        let lift = RigidBody::new(Shape::sphere(1.0), 1.0).with_kinematic(true);
        let sensor = RigidBody::new(Shape::sphere(1.0), 1.0)
            .with_kinematic(true)
            .with_trigger(true);
        let mut sleeper = RigidBody::new(Shape::sphere(1.0), 1.0);
        sleeper.put_to_sleep();

        assert!(!should_test_pair(&ground, &wall));
        assert!(!should_test_pair(&platform, &lift));
        assert!(should_test_pair(&platform, &sensor));
        assert!(!should_test_pair(&ground, &platform));
        assert!(should_test_pair(&ball, &ground));
        assert!(should_test_pair(&ball, &sleeper));
        assert!(!should_test_pair(&ground, &sleeper));
        assert!(should_test_pair(&platform, &sleeper));
    }

    #[test]
    fn test_collide_marks_trigger_pairs() {
        let (ha, hb) = handles();
        let a = sphere_at(Vector3::zeros(), 1.0).with_trigger(true);
        let b = sphere_at(Vector3::new(1.0, 0.0, 0.0), 1.0);
        let info = collide(ha, &a, hb, &b).unwrap();
        assert!(info.is_trigger);
        assert!(info.has_collision);
        assert_eq!(info.contact_count(), 1);
    }
}

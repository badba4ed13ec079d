//! Wireframe overlay of the simulation state.
//!
//! The world only emits world-space primitives; projecting and rasterizing
//! them is left to the renderer.

use embedded_graphics_core::pixelcolor::{Rgb565, RgbColor, WebColors};
use nalgebra::{Point3, Vector3};

use crate::body::{RigidBody, Shape};
use crate::world::PhysicsWorld;

/// Length of the drawn contact normals, in world units.
pub const NORMAL_LENGTH: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DebugPrimitive {
    Point(Point3<f32>, Rgb565),
    Line([Point3<f32>; 2], Rgb565),
}

/// Overlay colour for a body's state.
pub fn body_color(body: &RigidBody) -> Rgb565 {
    if body.is_static() || body.is_kinematic() {
        Rgb565::BLUE
    } else if body.is_sleeping() {
        Rgb565::CSS_GRAY
    } else {
        Rgb565::GREEN
    }
}

/// Emit the 12 edges of a box given its eight corners.
fn emit_box(corners: &[Vector3<f32>; 8], color: Rgb565, callback: &mut impl FnMut(DebugPrimitive)) {
    // Corner i has +x when bit 0 is set, +y for bit 1, +z for bit 2; edges join
    // corners that differ in exactly one bit.
    for i in 0..8 {
        for bit in [1, 2, 4] {
            if i & bit == 0 {
                callback(DebugPrimitive::Line(
                    [Point3::from(corners[i]), Point3::from(corners[i | bit])],
                    color,
                ));
            }
        }
    }
}

fn corners(half: &Vector3<f32>, transform: impl Fn(Vector3<f32>) -> Vector3<f32>) -> [Vector3<f32>; 8] {
    let mut out = [Vector3::zeros(); 8];
    for (i, corner) in out.iter_mut().enumerate() {
        let local = Vector3::new(
            if i & 1 != 0 { half.x } else { -half.x },
            if i & 2 != 0 { half.y } else { -half.y },
            if i & 4 != 0 { half.z } else { -half.z },
        );
        *corner = transform(local);
    }
    out
}

impl<const N: usize, const M: usize, const C: usize> PhysicsWorld<N, M, C> {
    /// Feed the overlay for the current state to `callback`.
    ///
    /// Boxes are drawn as oriented wireframes, spheres as their AABB outline,
    /// then each contact as a red point with a yellow normal.
    pub fn debug_draw(&self, mut callback: impl FnMut(DebugPrimitive)) {
        for (_, body) in self.bodies() {
            let color = body_color(body);
            let box_corners = match body.shape() {
                Shape::Box { half_extents } => corners(half_extents, |p| body.local_to_world(&p)),
                Shape::Sphere { .. } => {
                    let aabb = body.aabb();
                    let center = aabb.center();
                    corners(&aabb.half_extents(), |p| center + p)
                }
            };
            emit_box(&box_corners, color, &mut callback);
        }

        for manifold in self.manifolds() {
            let point_color = if manifold.is_trigger {
                Rgb565::CSS_ORANGE
            } else {
                Rgb565::RED
            };
            for contact in manifold.contacts.iter() {
                let p = Point3::from(contact.position);
                callback(DebugPrimitive::Point(p, point_color));
                callback(DebugPrimitive::Line(
                    [p, p + manifold.normal * NORMAL_LENGTH],
                    Rgb565::YELLOW,
                ));
            }
        }
    }
}

//! Sequential-impulse contact solver.
//!
//! Per step the world calls, in order: [`ContactSolver::match_warm_start`],
//! [`ContactSolver::pre_step`], [`ContactSolver::apply_warm_start`], then
//! [`ContactSolver::solve_velocity`] and [`ContactSolver::solve_push`] once
//! per iteration (interleaved with the joints), then
//! [`ContactSolver::apply_push`] and finally
//! [`ContactSolver::correct_positions`].
//!
//! Normal impulses are accumulated and the running total is clamped to be
//! non-negative, so contacts push but never pull. Friction is accumulated the
//! same way: each iteration adds the impulse that would stop the current slip
//! to the contact's running tangent impulse, clamps that total to the cone
//! `|jt| <= mu * normal_impulse`, and applies only the change.
//!
//! With [`SolverConfig::split_impulse`] set, Baumgarte feedback is solved
//! on a separate position-only velocity. It moves bodies apart at the end of
//! the step but never enters their real velocity, so resting contacts settle
//! to zero velocity and can fall asleep. Without it the bias is added to the
//! normal row as usual.
//!
//! Manifolds flagged as triggers are skipped everywhere.

use nalgebra::Vector3;

#[allow(unused_imports)]
use nalgebra::ComplexField;

use crate::arena::Arena;
use crate::body::RigidBody;
use crate::config::SolverConfig;
use crate::contact::{CollisionInfo, MAX_CONTACTS};

/// Positional correction stops once every manifold's overshoot is below this.
const POSITION_TOLERANCE: f32 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
pub struct ContactSolver {
    pub config: SolverConfig,
}

impl ContactSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Carry accumulated normal impulses from last step's manifolds.
    ///
    /// Manifolds are paired by body handles. Within a pair each new contact
    /// takes the impulse of the nearest old contact within the warm start
    /// radius, and every old contact is used at most once.
    pub fn match_warm_start(&self, manifolds: &mut [CollisionInfo], previous: &[CollisionInfo]) {
        let radius_sq = self.config.warm_start_radius * self.config.warm_start_radius;

        for manifold in manifolds.iter_mut() {
            let Some(old) = previous.iter().find(|p| p.same_pair(manifold)) else {
                continue;
            };

            let mut used = [false; MAX_CONTACTS];
            for contact in manifold.contacts.iter_mut() {
                let mut best: Option<(usize, f32)> = None;
                for (i, candidate) in old.contacts.iter().enumerate() {
                    if used[i] {
                        continue;
                    }
                    let dist_sq = (candidate.position - contact.position).norm_squared();
                    if dist_sq <= radius_sq && best.map_or(true, |(_, d)| dist_sq < d) {
                        best = Some((i, dist_sq));
                    }
                }
                if let Some((i, _)) = best {
                    used[i] = true;
                    contact.normal_impulse = old.contacts[i].normal_impulse;
                }
            }
        }
    }

    /// Cache moment arms, effective normal mass and biases per contact, and
    /// reset the per-step friction and push accumulators.
    pub fn pre_step<const N: usize>(
        &self,
        bodies: &Arena<RigidBody, N>,
        manifolds: &mut [CollisionInfo],
        dt: f32,
    ) {
        if dt <= 0.0 {
            return;
        }
        let cfg = &self.config;

        for manifold in manifolds.iter_mut() {
            if manifold.is_trigger {
                continue;
            }
            let (Some(a), Some(b)) = (bodies.get(manifold.body_a.0), bodies.get(manifold.body_b.0)) else {
                continue;
            };

            let n = manifold.normal;
            let inv_mass_sum = a.solver_inv_mass() + b.solver_inv_mass();
            let inv_i_a = a.solver_inv_inertia_world();
            let inv_i_b = b.solver_inv_inertia_world();
            let restitution = a.restitution.min(b.restitution);

            for contact in manifold.contacts.iter_mut() {
                contact.r_a = contact.position - a.position;
                contact.r_b = contact.position - b.position;

                let rn_a = contact.r_a.cross(&n);
                let rn_b = contact.r_b.cross(&n);
                let k = inv_mass_sum + rn_a.dot(&(inv_i_a * rn_a)) + rn_b.dot(&(inv_i_b * rn_b));
                contact.normal_mass = if k > 0.0 { 1.0 / k } else { 0.0 };

                // Baumgarte: push out the overlap beyond slop.
                let baumgarte = cfg.baumgarte / dt * (contact.penetration - cfg.slop).max(0.0);
                if cfg.split_impulse {
                    contact.bias = 0.0;
                    contact.push_bias = baumgarte;
                } else {
                    contact.bias = -baumgarte;
                    contact.push_bias = 0.0;
                }
                contact.push_impulse = 0.0;
                contact.tangent_impulse = Vector3::zeros();

                let relative = b.velocity_at(&contact.r_b) - a.velocity_at(&contact.r_a);
                let vn = relative.dot(&n);
                if vn < -cfg.restitution_threshold {
                    contact.bias += restitution * vn;
                }
            }
        }
    }

    /// Apply each contact's carried-over normal impulse once.
    pub fn apply_warm_start<const N: usize>(
        &self,
        bodies: &mut Arena<RigidBody, N>,
        manifolds: &[CollisionInfo],
    ) {
        for manifold in manifolds {
            if manifold.is_trigger {
                continue;
            }
            let Some((a, b)) = bodies.pair_mut(manifold.body_a.0, manifold.body_b.0) else {
                continue;
            };
            for contact in manifold.contacts.iter() {
                if contact.normal_impulse == 0.0 {
                    continue;
                }
                let p = manifold.normal * contact.normal_impulse;
                a.apply_impulse_at(-p, &contact.r_a);
                b.apply_impulse_at(p, &contact.r_b);
            }
        }
    }

    /// One velocity iteration over every manifold.
    pub fn solve_velocity<const N: usize>(
        &self,
        bodies: &mut Arena<RigidBody, N>,
        manifolds: &mut [CollisionInfo],
    ) {
        for manifold in manifolds.iter_mut() {
            if manifold.is_trigger {
                continue;
            }
            let Some((a, b)) = bodies.pair_mut(manifold.body_a.0, manifold.body_b.0) else {
                continue;
            };

            let n = manifold.normal;
            let mu = (a.friction * b.friction).sqrt();
            let inv_mass_sum = a.solver_inv_mass() + b.solver_inv_mass();

            for contact in manifold.contacts.iter_mut() {
                // --- Normal ---
                let relative = b.velocity_at(&contact.r_b) - a.velocity_at(&contact.r_a);
                let vn = relative.dot(&n);
                let lambda = -(vn + contact.bias) * contact.normal_mass;

                let old = contact.normal_impulse;
                contact.normal_impulse = (old + lambda).max(0.0);
                let delta = contact.normal_impulse - old;

                let p = n * delta;
                a.apply_impulse_at(-p, &contact.r_a);
                b.apply_impulse_at(p, &contact.r_b);

                // --- Friction ---
                let relative = b.velocity_at(&contact.r_b) - a.velocity_at(&contact.r_a);
                let tangential = relative - n * relative.dot(&n);
                let slip = tangential.norm();
                let old = contact.tangent_impulse;
                let mut total = old;
                if slip > 1e-6 {
                    let t = tangential / slip;
                    let rt_a = contact.r_a.cross(&t);
                    let rt_b = contact.r_b.cross(&t);
                    let k = inv_mass_sum
                        + rt_a.dot(&(a.solver_inv_inertia_world() * rt_a))
                        + rt_b.dot(&(b.solver_inv_inertia_world() * rt_b));
                    if k > 0.0 {
                        total -= t * (slip / k);
                    }
                }
                let max_friction = mu * contact.normal_impulse;
                let magnitude = total.norm();
                if magnitude > max_friction {
                    total *= max_friction / magnitude;
                }
                contact.tangent_impulse = total;

                let pt = total - old;
                if pt != Vector3::zeros() {
                    a.apply_impulse_at(-pt, &contact.r_a);
                    b.apply_impulse_at(pt, &contact.r_b);
                }
            }
        }
    }

    /// One iteration of the position-only Baumgarte pass.
    ///
    /// Linear only: each contact drives the relative push velocity along the
    /// normal toward its `push_bias`, with the accumulated push clamped to be
    /// non-negative.
    pub fn solve_push<const N: usize>(
        &self,
        bodies: &mut Arena<RigidBody, N>,
        manifolds: &mut [CollisionInfo],
    ) {
        if !self.config.split_impulse {
            return;
        }
        for manifold in manifolds.iter_mut() {
            if manifold.is_trigger {
                continue;
            }
            let Some((a, b)) = bodies.pair_mut(manifold.body_a.0, manifold.body_b.0) else {
                continue;
            };
            let inv_mass_sum = a.solver_inv_mass() + b.solver_inv_mass();
            if inv_mass_sum <= 0.0 {
                continue;
            }
            let n = manifold.normal;

            for contact in manifold.contacts.iter_mut() {
                if contact.push_bias <= 0.0 && contact.push_impulse == 0.0 {
                    continue;
                }
                let vn = (b.push_velocity() - a.push_velocity()).dot(&n);
                let lambda = (contact.push_bias - vn) / inv_mass_sum;

                let old = contact.push_impulse;
                contact.push_impulse = (old + lambda).max(0.0);
                let p = n * (contact.push_impulse - old);
                a.apply_push_impulse(-p);
                b.apply_push_impulse(p);
            }
        }
    }

    /// Move every body by the push velocity gathered this step, then clear it.
    pub fn apply_push<const N: usize>(&self, bodies: &mut Arena<RigidBody, N>, dt: f32) {
        for body in bodies.values_mut() {
            body.apply_push(dt);
        }
    }

    /// Nudge overlapping bodies apart by a share of the overlap beyond slop.
    ///
    /// Runs up to `position_iterations` passes. Each pass moves every
    /// overlapping pair apart by `correction_percent` of its deepest
    /// overshoot and lowers that manifold's contact depths by the distance
    /// moved, so later passes see what is left. Stops early once no
    /// manifold overshoots the slop.
    pub fn correct_positions<const N: usize>(
        &self,
        bodies: &mut Arena<RigidBody, N>,
        manifolds: &mut [CollisionInfo],
    ) {
        let cfg = &self.config;

        for _ in 0..cfg.position_iterations {
            let mut moved = false;

            for manifold in manifolds.iter_mut() {
                if manifold.is_trigger {
                    continue;
                }
                let Some((a, b)) = bodies.pair_mut(manifold.body_a.0, manifold.body_b.0) else {
                    continue;
                };
                let inv_a = a.solver_inv_mass();
                let inv_b = b.solver_inv_mass();
                let inv_sum = inv_a + inv_b;
                if inv_sum <= 0.0 {
                    continue;
                }

                let overshoot = manifold.max_penetration() - cfg.slop;
                if overshoot <= POSITION_TOLERANCE {
                    continue;
                }
                let separation = overshoot * cfg.correction_percent;
                let correction: Vector3<f32> = manifold.normal * (separation / inv_sum);

                if inv_a > 0.0 {
                    a.position -= correction * inv_a;
                    a.update_bounds();
                }
                if inv_b > 0.0 {
                    b.position += correction * inv_b;
                    b.update_bounds();
                }
                for contact in manifold.contacts.iter_mut() {
                    contact.penetration -= separation;
                }
                moved = true;
            }

            if !moved {
                break;
            }
        }
    }
}

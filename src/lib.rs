//! Rigid-body physics for small real-time 3D engines.
//!
//! Sphere and oriented-box bodies, discrete and swept collision detection,
//! contact manifolds with warm starting, a sequential-impulse solver, distance
//! and point joints, sleeping, and a fixed-timestep world that can also be
//! stepped on a job queue (`std` feature).
//!
//! The core is `no_std` and allocation-free: every container has a capacity
//! fixed by const generics on [`PhysicsWorld`].

#![no_std]

#[cfg(feature = "std")]
extern crate std;

pub mod arena;
pub mod body;
pub mod collision;
pub mod config;
pub mod constraint;
pub mod contact;
pub mod debug;
pub mod perfcounter;
pub mod raycast;
#[cfg(feature = "std")]
pub mod scheduler;
pub mod solver;
pub mod world;

pub use body::{Aabb, BodyHandle, RigidBody, Shape};
pub use collision::BoxContactMode;
pub use config::{SolverConfig, WorldConfig};
pub use constraint::{Constraint, ConstraintHandle, DistanceConstraint};
pub use contact::{CollisionInfo, Contact, MAX_CONTACTS};
pub use debug::DebugPrimitive;
pub use perfcounter::StepTimings;
pub use raycast::{Ray, RaycastHit};
#[cfg(feature = "std")]
pub use scheduler::{InlineQueue, Job, JobQueue, ManualQueue, Scheduler, StepState, SubmitError, WorkerPool};
pub use solver::ContactSolver;
pub use world::PhysicsWorld;

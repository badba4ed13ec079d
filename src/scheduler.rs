//! Synchronous or deferred stepping on an injected job queue.
//!
//! The [`Scheduler`] owns the world behind `Arc<Mutex<_>>`. In synchronous
//! mode `update_fixed` steps on the caller. In asynchronous mode it hands the
//! frame delta to a [`JobQueue`] and returns at once; at most one step is ever
//! in flight, tracked by a three-state gate:
//!
//! ```text
//! Idle --compare_exchange--> StepQueued --worker--> StepRunning --> Idle
//!   ^                            |
//!   +------ submission failed ---+
//! ```
//!
//! A frame that finds a step already in flight, or whose job cannot be
//! submitted, is skipped rather than retried.

extern crate std;

use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::boxed::Box;
use std::string::String;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};
use std::vec::Vec;

use log::{debug, warn};
use thiserror::Error;

use crate::world::PhysicsWorld;

/// Unit of work handed to a [`JobQueue`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Why a job was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("job queue is full")]
    QueueFull,
    #[error("job queue is disconnected")]
    Disconnected,
}

/// Executor seam for deferred physics steps.
///
/// Implementations must not block on a full queue; they report
/// [`SubmitError::QueueFull`] instead.
pub trait JobQueue {
    fn submit(&self, job: Job) -> Result<(), SubmitError>;
}

/// Runs every job immediately on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineQueue;

impl JobQueue for InlineQueue {
    fn submit(&self, job: Job) -> Result<(), SubmitError> {
        job();
        Ok(())
    }
}

/// Holds jobs until [`ManualQueue::run_pending`] is called.
///
/// Gives tests full control over when a deferred step actually runs.
#[derive(Default)]
pub struct ManualQueue {
    jobs: Mutex<Vec<Job>>,
    capacity: Option<usize>,
}

impl ManualQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue that rejects submissions once `capacity` jobs are pending.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            capacity: Some(capacity),
        }
    }

    pub fn pending(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Run the jobs pending right now. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let jobs = core::mem::take(&mut *self.jobs.lock().unwrap_or_else(PoisonError::into_inner));
        let count = jobs.len();
        for job in jobs {
            job();
        }
        count
    }
}

impl JobQueue for ManualQueue {
    fn submit(&self, job: Job) -> Result<(), SubmitError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if self.capacity.is_some_and(|cap| jobs.len() >= cap) {
            return Err(SubmitError::QueueFull);
        }
        jobs.push(job);
        Ok(())
    }
}

/// Fixed set of worker threads draining a bounded channel.
///
/// Dropping the pool closes the channel and joins the workers after they
/// finish the jobs already queued.
pub struct WorkerPool {
    sender: Option<SyncSender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `threads` workers (at least one) sharing a queue of `depth` jobs.
    pub fn new(threads: usize, depth: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<Job>(depth);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(threads.max(1));
        for id in 0..threads.max(1) {
            let receiver = Arc::clone(&receiver);
            let spawned = thread::Builder::new()
                .name(String::from("physics-worker"))
                .spawn(move || loop {
                    // Hold the receiver lock only while waiting, not while running.
                    let next = receiver
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .recv();
                    match next {
                        Ok(job) => job(),
                        Err(_) => break,
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => warn!("failed to spawn physics worker {}: {}", id, err),
            }
        }
        debug!("worker pool started with {} threads, queue depth {}", workers.len(), depth);

        Self {
            sender: Some(sender),
            workers,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }
}

impl JobQueue for WorkerPool {
    fn submit(&self, job: Job) -> Result<(), SubmitError> {
        let sender = self.sender.as_ref().ok_or(SubmitError::Disconnected)?;
        sender.try_send(job).map_err(|err| match err {
            TrySendError::Full(_) => SubmitError::QueueFull,
            TrySendError::Disconnected(_) => SubmitError::Disconnected,
        })
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("physics worker panicked");
            }
        }
    }
}

/// Where the single in-flight asynchronous step is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StepState {
    Idle = 0,
    StepQueued = 1,
    StepRunning = 2,
}

impl StepState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => StepState::StepQueued,
            2 => StepState::StepRunning,
            _ => StepState::Idle,
        }
    }
}

#[derive(Debug)]
struct StepGate {
    state: AtomicU8,
}

impl StepGate {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(StepState::Idle as u8),
        }
    }

    fn load(&self) -> StepState {
        StepState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Idle -> StepQueued`. Fails if a step is already queued or running.
    fn try_queue(&self) -> bool {
        self.state
            .compare_exchange(
                StepState::Idle as u8,
                StepState::StepQueued as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn set(&self, state: StepState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Marks the step running and returns the gate to `Idle` when dropped,
/// including when the step panics.
struct RunningStep<'a>(&'a StepGate);

impl<'a> RunningStep<'a> {
    fn begin(gate: &'a StepGate) -> Self {
        gate.set(StepState::StepRunning);
        Self(gate)
    }
}

impl Drop for RunningStep<'_> {
    fn drop(&mut self) {
        self.0.set(StepState::Idle);
    }
}

/// Drives a [`PhysicsWorld`] synchronously or through a [`JobQueue`].
pub struct Scheduler<Q: JobQueue, const N: usize, const M: usize = 0, const C: usize = 32> {
    world: Arc<Mutex<PhysicsWorld<N, M, C>>>,
    queue: Q,
    gate: Arc<StepGate>,
    async_enabled: bool,
    dropped: AtomicU64,
}

impl<Q: JobQueue, const N: usize, const M: usize, const C: usize> Scheduler<Q, N, M, C> {
    /// Starts in synchronous mode.
    pub fn new(world: PhysicsWorld<N, M, C>, queue: Q) -> Self {
        Self {
            world: Arc::new(Mutex::new(world)),
            queue,
            gate: Arc::new(StepGate::new()),
            async_enabled: false,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn set_async_enabled(&mut self, enabled: bool) {
        self.async_enabled = enabled;
    }

    pub fn is_async_enabled(&self) -> bool {
        self.async_enabled
    }

    /// Advance by a frame's elapsed time, inline or through the queue.
    pub fn update_fixed(&self, frame_dt: f32) {
        if self.async_enabled {
            self.step_async(frame_dt);
        } else {
            self.world().update_fixed(frame_dt);
        }
    }

    /// Queue one deferred `update_fixed(frame_dt)`.
    ///
    /// Returns `false` when a step is already in flight or the queue rejected
    /// the job; either way the frame's time is not simulated.
    pub fn step_async(&self, frame_dt: f32) -> bool {
        if !self.gate.try_queue() {
            return false;
        }

        let world = Arc::clone(&self.world);
        let gate = Arc::clone(&self.gate);
        let job: Job = Box::new(move || {
            let _running = RunningStep::begin(&gate);
            world
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .update_fixed(frame_dt);
        });

        match self.queue.submit(job) {
            Ok(()) => true,
            Err(err) => {
                self.gate.set(StepState::Idle);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("physics step skipped: {}", err);
                false
            }
        }
    }

    pub fn step_in_progress(&self) -> bool {
        self.gate.load() != StepState::Idle
    }

    pub fn state(&self) -> StepState {
        self.gate.load()
    }

    /// Lock the world for reading or for mutation between steps.
    ///
    /// Blocks while an asynchronous step is running.
    pub fn world(&self) -> MutexGuard<'_, PhysicsWorld<N, M, C>> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Like [`Scheduler::world`] but returns `None` instead of blocking.
    pub fn try_world(&self) -> Option<MutexGuard<'_, PhysicsWorld<N, M, C>>> {
        match self.world.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Frames whose step could not be submitted.
    pub fn dropped_submissions(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

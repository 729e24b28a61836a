//! Cancellable workers
//!
//! A [`Worker`] wraps a [`Task`] that runs on its own native thread once the
//! worker is handed to [`ThreadRegistry::start`](crate::ThreadRegistry::start).
//! Cancellation is cooperative: the owner calls [`Worker::set_exit_state`] and
//! the task is expected to poll [`Worker::exit_state`] between units of work.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start──▶ Running ──run returns / exit()──▶ Exited ──join──▶ Joined
//! ```
//!
//! A worker runs at most once. Starting a worker that is not idle is refused.

use anyhow::{Context, Result, bail};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique worker identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    fn next() -> Self {
        Self(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Constructed, no native thread yet
    Idle = 0,
    /// Native thread launched, task running
    Running = 1,
    /// Task finished; the native thread still needs joining
    Exited = 2,
    /// Native thread reclaimed
    Joined = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Running,
            2 => WorkerState::Exited,
            _ => WorkerState::Joined,
        }
    }
}

/// The body of a worker.
///
/// The default `run` does nothing. Long-running tasks should loop until
/// `worker.exit_state()` turns true:
///
/// ```rust
/// use threadengine::{Task, Worker};
///
/// struct Heartbeat;
///
/// impl Task for Heartbeat {
///     fn run(&mut self, worker: &Worker) {
///         while !worker.exit_state() {
///             std::thread::sleep(std::time::Duration::from_millis(10));
///         }
///     }
/// }
/// ```
///
/// Closures taking `&Worker` are tasks too.
pub trait Task: Send + 'static {
    fn run(&mut self, worker: &Worker) {
        let _ = worker;
    }
}

impl<F> Task for F
where
    F: FnMut(&Worker) + Send + 'static,
{
    fn run(&mut self, worker: &Worker) {
        self(worker)
    }
}

struct Inner {
    id: WorkerId,
    exit_requested: AtomicBool,
    state: AtomicU8,
    /// Taken by the native thread when it starts; stays here if spawning fails
    task: Mutex<Option<Box<dyn Task>>>,
    /// Guards state transitions into Running and Joined
    handle: Mutex<Option<JoinHandle<()>>>,
    joined: Condvar,
    thread_id: OnceLock<ThreadId>,
    /// Panic message from the task, reported by every join
    panicked: OnceLock<String>,
}

/// Handle to a cancellable unit of work.
///
/// Cloning is cheap and every clone refers to the same worker; the registry
/// keeps one clone while the worker is tracked.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<Inner>,
}

impl Worker {
    /// Create an idle worker. No native resources are touched until it is started.
    pub fn new(task: impl Task) -> Self {
        let task: Box<dyn Task> = Box::new(task);
        Self {
            inner: Arc::new(Inner {
                id: WorkerId::next(),
                exit_requested: AtomicBool::new(false),
                state: AtomicU8::new(WorkerState::Idle as u8),
                task: Mutex::new(Some(task)),
                handle: Mutex::new(None),
                joined: Condvar::new(),
                thread_id: OnceLock::new(),
                panicked: OnceLock::new(),
            }),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.inner.id
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// True once the task has returned or called [`Worker::exit`]. The native
    /// thread may still be running; see [`Worker::is_terminated`].
    pub fn is_finished(&self) -> bool {
        matches!(self.state(), WorkerState::Exited | WorkerState::Joined)
    }

    /// True once the native thread has terminated, so joining it will not block.
    ///
    /// Also true for a worker that has already been joined. False while another
    /// thread is in the middle of joining it.
    pub fn is_terminated(&self) -> bool {
        match self.inner.handle.lock().as_ref() {
            Some(handle) => handle.is_finished(),
            None => self.state() == WorkerState::Joined,
        }
    }

    /// Ask the worker to wind down. Safe from any thread, any number of times.
    pub fn set_exit_state(&self) {
        self.inner.exit_requested.store(true, Ordering::Release);
    }

    /// Whether an exit has been requested
    pub fn exit_state(&self) -> bool {
        self.inner.exit_requested.load(Ordering::Acquire)
    }

    /// Mark this worker finished. Must be called from the worker's own thread,
    /// as the last thing its task does; the runtime also does this when the
    /// task returns or panics, so calling it is optional.
    ///
    /// Only the state changes: the task keeps running until it returns, and
    /// the registry does not reap the worker before its thread terminates.
    ///
    /// # Panics
    /// If called from any thread other than the worker's own.
    pub fn exit(&self) {
        assert!(
            self.inner.thread_id.get() == Some(&thread::current().id()),
            "Worker::exit must be called from the worker's own thread"
        );
        self.mark_exited();
    }

    /// Block until the worker's thread has terminated, then reclaim it.
    ///
    /// Joining implies the caller wants the worker to stop, so this also
    /// sets the exit state before waiting. Joining an already joined worker
    /// returns `Ok(())` immediately; this happens when
    /// [`ThreadRegistry::process`](crate::ThreadRegistry::process) reaped it first.
    ///
    /// Fails if the worker was never started, or if called from the worker's
    /// own thread. If the task panicked, every join reports it, including
    /// joins that happen after the registry reaped the worker.
    pub fn join(&self) -> Result<()> {
        self.set_exit_state();

        if self.inner.thread_id.get() == Some(&thread::current().id()) {
            bail!("worker {} cannot join itself", self.id());
        }

        let mut slot = self.inner.handle.lock();
        loop {
            if let Some(handle) = slot.take() {
                drop(slot);
                let outcome = handle.join();

                let _slot = self.inner.handle.lock();
                if let Err(payload) = outcome {
                    let _ = self.inner.panicked.set(panic_message(&*payload));
                }
                self.inner
                    .state
                    .store(WorkerState::Joined as u8, Ordering::Release);
                self.inner.joined.notify_all();

                return self.joined_outcome();
            }

            match self.state() {
                WorkerState::Idle => bail!("worker {} has not been started", self.id()),
                WorkerState::Joined => return self.joined_outcome(),
                // Another thread holds the handle and is joining right now
                WorkerState::Running | WorkerState::Exited => self.inner.joined.wait(&mut slot),
            }
        }
    }

    fn joined_outcome(&self) -> Result<()> {
        match self.inner.panicked.get() {
            Some(message) => bail!("worker {} panicked: {}", self.id(), message),
            None => Ok(()),
        }
    }

    /// Spawn the native thread. On failure the worker stays idle and keeps its task.
    pub(crate) fn launch(&self, builder: thread::Builder) -> Result<()> {
        let mut slot = self.inner.handle.lock();

        if let Err(current) = self.inner.state.compare_exchange(
            WorkerState::Idle as u8,
            WorkerState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            bail!(
                "worker {} cannot be started from state {:?}",
                self.id(),
                WorkerState::from_u8(current)
            );
        }

        let worker = self.clone();
        match builder.spawn(move || worker.body()) {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.inner
                    .state
                    .store(WorkerState::Idle as u8, Ordering::Release);
                Err(e).with_context(|| format!("Failed to spawn native thread for worker {}", self.id()))
            }
        }
    }

    fn body(&self) {
        let _ = self.inner.thread_id.set(thread::current().id());
        let _exit = ExitGuard(self);

        let task = self.inner.task.lock().take();
        if let Some(mut task) = task {
            task.run(self);
        }
    }

    fn mark_exited(&self) {
        let _ = self.inner.state.compare_exchange(
            WorkerState::Running as u8,
            WorkerState::Exited as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("exit_requested", &self.exit_state())
            .finish()
    }
}

/// Marks the worker exited when the task returns or unwinds
struct ExitGuard<'a>(&'a Worker);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.mark_exited();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

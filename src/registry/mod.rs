//! Worker registry
//!
//! The [`ThreadRegistry`] starts workers on native threads, tracks them while
//! they run, and reaps the ones that have finished. It is an explicit context
//! object rather than a global: create one at startup and pass it to whatever
//! code spawns workers (tests create their own).
//!
//! # Reaping
//!
//! [`ThreadRegistry::process`] joins every tracked worker whose native thread
//! has terminated, stops tracking it, and drops its [`Extensions`] entries. A
//! worker that called [`Worker::exit`] but is still running stays tracked
//! until its thread ends. Owners may still call [`Worker::join`] afterwards;
//! it returns immediately.
//!
//! Dropping the registry requests exit from every tracked worker and joins
//! them all, so no thread outlives it unjoined. A worker is only untracked
//! once it has actually been joined.

use crate::config::RegistryConfig;
use crate::worker::{Worker, WorkerId, WorkerState};
use anyhow::Result;
use parking_lot::Mutex;
use std::thread;

pub mod extensions;

pub use extensions::Extensions;

pub struct ThreadRegistry {
    config: RegistryConfig,
    /// Tracked workers in start order
    threads: Mutex<Vec<Worker>>,
    extensions: Extensions,
}

impl ThreadRegistry {
    /// Registry with default settings
    pub fn new() -> Self {
        Self {
            config: RegistryConfig::default(),
            threads: Mutex::new(Vec::new()),
            extensions: Extensions::new(),
        }
    }

    pub fn with_config(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            threads: Mutex::new(Vec::new()),
            extensions: Extensions::new(),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Launch `worker` on a new native thread and track it.
    ///
    /// Fails if the worker is not idle (workers run at most once), or if the
    /// OS refuses to create the thread. In both cases the registry is left
    /// unchanged; after a spawn failure the worker is still idle and may be
    /// started again or discarded.
    pub fn start(&self, worker: &Worker) -> Result<()> {
        let mut builder =
            thread::Builder::new().name(format!("{}-{}", self.config.thread_name_prefix, worker.id()));
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        worker.launch(builder)?;
        self.threads.lock().push(worker.clone());

        tracing::debug!(worker = %worker.id(), "worker started");
        Ok(())
    }

    /// Reap finished workers: join each one whose native thread has terminated
    /// and stop tracking it. Never waits on a worker that is still running,
    /// even one that has already called [`Worker::exit`].
    ///
    /// Returns the number of workers reaped.
    pub fn process(&self) -> usize {
        let terminated: Vec<Worker> = {
            let mut threads = self.threads.lock();
            let (terminated, running): (Vec<Worker>, Vec<Worker>) =
                threads.drain(..).partition(Worker::is_terminated);
            *threads = running;
            terminated
        };

        let reaped = self.reclaim_all(terminated);
        if reaped > 0 {
            tracing::debug!(reaped, remaining = self.len(), "processed finished workers");
        }
        reaped
    }

    /// Request exit from every tracked worker, then join them all.
    ///
    /// Blocks until each worker's task returns; a task that never polls its
    /// exit state blocks this forever. Returns the number of workers joined.
    pub fn shutdown(&self) -> usize {
        let workers = std::mem::take(&mut *self.threads.lock());

        for worker in &workers {
            worker.set_exit_state();
        }
        let joined = self.reclaim_all(workers);

        // Attachments for workers that were never started, or were attached
        // after being reaped, have no other point at which they are dropped
        let threads = self.threads.lock();
        self.extensions
            .retain(|id| threads.iter().any(|worker| worker.id() == id));
        drop(threads);

        if joined > 0 {
            tracing::debug!(joined, "registry shut down");
        }
        joined
    }

    /// Number of workers currently tracked
    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.lock().is_empty()
    }

    pub fn contains(&self, id: WorkerId) -> bool {
        self.threads.lock().iter().any(|worker| worker.id() == id)
    }

    /// Snapshot of the tracked workers, in start order
    pub fn workers(&self) -> Vec<Worker> {
        self.threads.lock().clone()
    }

    /// Side-table of per-worker attachments
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Join each worker. Those that could not be joined go back on the tracked
    /// list. Returns how many were joined.
    fn reclaim_all(&self, workers: Vec<Worker>) -> usize {
        let (joined, unjoined): (Vec<Worker>, Vec<Worker>) =
            workers.into_iter().partition(|worker| self.reclaim(worker));

        if !unjoined.is_empty() {
            self.threads.lock().extend(unjoined);
        }
        joined.len()
    }

    fn reclaim(&self, worker: &Worker) -> bool {
        let result = worker.join();

        // A panicked task is still joined; any other failure left the thread alone
        if worker.state() != WorkerState::Joined {
            if let Err(e) = result {
                tracing::warn!(worker = %worker.id(), "worker could not be joined, still tracked: {e:#}");
            }
            return false;
        }

        if let Err(e) = result {
            tracing::warn!(worker = %worker.id(), "worker terminated abnormally: {e:#}");
        }
        self.extensions.clear(worker.id());
        true
    }
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadRegistry")
            .field("config", &self.config)
            .field("threads", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn poll_until_exit() -> impl FnMut(&Worker) + Send + 'static {
        |worker: &Worker| {
            while !worker.exit_state() {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    fn process_until_empty(registry: &ThreadRegistry) -> usize {
        let mut calls = 0;
        while !registry.is_empty() {
            registry.process();
            calls += 1;
            assert!(calls < 5_000, "workers were never reaped");
            thread::sleep(Duration::from_millis(1));
        }
        calls
    }

    #[test]
    fn test_start_tracks_worker() {
        let registry = ThreadRegistry::new();
        let worker = Worker::new(poll_until_exit());

        registry.start(&worker).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(worker.id()));
        assert_eq!(worker.state(), WorkerState::Running);

        worker.set_exit_state();
        process_until_empty(&registry);
        assert_eq!(worker.state(), WorkerState::Joined);
    }

    #[test]
    fn test_process_leaves_running_workers() {
        let registry = ThreadRegistry::new();
        let running = Worker::new(poll_until_exit());
        let quick = Worker::new(|_: &Worker| {});

        registry.start(&running).unwrap();
        registry.start(&quick).unwrap();

        while !quick.is_terminated() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(registry.process(), 1);
        assert!(registry.contains(running.id()));
        assert!(!registry.contains(quick.id()));
        assert_eq!(running.state(), WorkerState::Running);

        running.set_exit_state();
        process_until_empty(&registry);
    }

    #[test]
    fn test_self_exiting_worker_is_reaped() {
        let registry = ThreadRegistry::new();
        let worker = Worker::new(|w: &Worker| {
            w.set_exit_state();
            w.exit();
        });

        registry.start(&worker).unwrap();
        process_until_empty(&registry);

        // The owner may still join; it is already reclaimed
        worker.join().unwrap();
        assert!(worker.exit_state());
    }

    #[test]
    fn test_start_refuses_running_worker() {
        let registry = ThreadRegistry::new();
        let worker = Worker::new(poll_until_exit());

        registry.start(&worker).unwrap();
        assert!(registry.start(&worker).is_err());
        assert_eq!(registry.len(), 1);

        registry.shutdown();
    }

    #[test]
    fn test_threads_are_named_from_config() {
        let config = RegistryConfig {
            thread_name_prefix: "reaper".to_string(),
            stack_size: Some(256 * 1024),
        };
        let registry = ThreadRegistry::with_config(config).unwrap();
        let (tx, rx) = crossbeam::channel::bounded(1);
        let worker = Worker::new(move |_: &Worker| {
            let _ = tx.send(thread::current().name().map(str::to_string));
        });

        registry.start(&worker).unwrap();
        let name = rx.recv().unwrap();
        assert_eq!(name, Some(format!("reaper-{}", worker.id())));
    }

    #[test]
    fn test_with_config_validates() {
        let config = RegistryConfig {
            thread_name_prefix: String::new(),
            stack_size: None,
        };
        assert!(ThreadRegistry::with_config(config).is_err());
    }

    #[test]
    fn test_extensions_dropped_on_reap() {
        let registry = ThreadRegistry::new();
        let worker = Worker::new(poll_until_exit());
        registry.extensions().insert(worker.id(), "indexer".to_string());

        registry.start(&worker).unwrap();
        assert_eq!(registry.extensions().get::<String>(worker.id()), Some("indexer".to_string()));

        worker.set_exit_state();
        process_until_empty(&registry);
        assert!(!registry.extensions().contains::<String>(worker.id()));
    }

    #[test]
    fn test_panicking_worker_does_not_poison_registry() {
        let registry = ThreadRegistry::new();
        let bad = Worker::new(|_: &Worker| panic!("boom"));
        let good = Worker::new(poll_until_exit());

        registry.start(&bad).unwrap();
        registry.start(&good).unwrap();

        while !bad.is_terminated() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(registry.process(), 1);
        assert_eq!(bad.state(), WorkerState::Joined);
        assert!(registry.contains(good.id()));

        assert_eq!(registry.shutdown(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_joins_remaining_workers() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopped);
        let worker = Worker::new(move |w: &Worker| {
            while !w.exit_state() {
                thread::sleep(Duration::from_millis(1));
            }
            flag.store(true, Ordering::SeqCst);
        });

        {
            let registry = ThreadRegistry::new();
            registry.start(&worker).unwrap();
        }

        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(worker.state(), WorkerState::Joined);
    }

    #[test]
    fn test_workers_snapshot_in_start_order() {
        let registry = ThreadRegistry::new();
        let workers: Vec<_> = (0..3).map(|_| Worker::new(poll_until_exit())).collect();
        for worker in &workers {
            registry.start(worker).unwrap();
        }

        let ids: Vec<_> = registry.workers().iter().map(Worker::id).collect();
        let expected: Vec<_> = workers.iter().map(Worker::id).collect();
        assert_eq!(ids, expected);

        assert_eq!(registry.shutdown(), 3);
    }

    #[test]
    fn test_process_skips_exited_worker_still_running() {
        let registry = ThreadRegistry::new();
        let (exited_tx, exited_rx) = crossbeam::channel::bounded(0);
        let (release_tx, release_rx) = crossbeam::channel::bounded::<()>(0);
        let worker = Worker::new(move |w: &Worker| {
            w.exit();
            let _ = exited_tx.send(());
            // Keeps running until the reaping thread lets it go
            let _ = release_rx.recv();
        });

        registry.start(&worker).unwrap();
        exited_rx.recv().unwrap();
        assert_eq!(worker.state(), WorkerState::Exited);

        let started = std::time::Instant::now();
        assert_eq!(registry.process(), 0);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(registry.contains(worker.id()));

        release_tx.send(()).unwrap();
        process_until_empty(&registry);
        assert_eq!(worker.state(), WorkerState::Joined);
    }

    #[test]
    fn test_process_from_worker_thread_keeps_itself_tracked() {
        let registry = Arc::new(ThreadRegistry::new());
        let (tx, rx) = crossbeam::channel::bounded(1);
        let worker = {
            let registry = Arc::clone(&registry);
            Worker::new(move |w: &Worker| {
                w.exit();
                let reaped = registry.process();
                let _ = tx.send((reaped, registry.contains(w.id())));
            })
        };

        registry.start(&worker).unwrap();
        assert_eq!(rx.recv().unwrap(), (0, true));

        process_until_empty(&registry);
        assert_eq!(worker.state(), WorkerState::Joined);
    }

    #[test]
    fn test_shutdown_from_worker_thread_keeps_itself_tracked() {
        let registry = Arc::new(ThreadRegistry::new());
        let (tx, rx) = crossbeam::channel::bounded(1);
        let worker = {
            let registry = Arc::clone(&registry);
            Worker::new(move |w: &Worker| {
                let joined = registry.shutdown();
                let _ = tx.send((joined, registry.contains(w.id())));
            })
        };

        registry.start(&worker).unwrap();
        assert_eq!(rx.recv().unwrap(), (0, true));

        worker.join().unwrap();
        assert_eq!(registry.process(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_spawn_failure_leaves_worker_idle() {
        let config = RegistryConfig {
            thread_name_prefix: "huge".to_string(),
            stack_size: Some(usize::MAX / 2),
        };
        let registry = ThreadRegistry::with_config(config).unwrap();
        let worker = Worker::new(|_: &Worker| {});

        let err = registry.start(&worker).unwrap_err();
        assert!(err.to_string().contains("Failed to spawn native thread"));
        assert_eq!(worker.state(), WorkerState::Idle);
        assert_eq!(registry.len(), 0);

        // The task survived, so the worker can be started elsewhere
        let retry = ThreadRegistry::new();
        retry.start(&worker).unwrap();
        worker.join().unwrap();
        assert_eq!(worker.state(), WorkerState::Joined);
    }

    #[test]
    fn test_shutdown_drops_stray_extensions() {
        let registry = ThreadRegistry::new();
        let never_started = Worker::new(|_: &Worker| {});
        let running = Worker::new(poll_until_exit());

        registry.extensions().insert(never_started.id(), 1u32);
        registry.start(&running).unwrap();
        registry.extensions().insert(running.id(), 2u32);

        assert_eq!(registry.shutdown(), 1);
        assert!(registry.extensions().is_empty());
    }

    #[test]
    fn test_panic_reported_to_owner_after_reap() {
        let registry = ThreadRegistry::new();
        let worker = Worker::new(|_: &Worker| panic!("lost payload"));

        registry.start(&worker).unwrap();
        process_until_empty(&registry);

        let err = worker.join().unwrap_err();
        assert!(err.to_string().contains("lost payload"));
    }
}

//! # threadengine - Minimal threading toolkit
//!
//! A small, uniform layer over native threads:
//!
//! - **[`Lock`]**: non-recursive mutual exclusion with explicit lock/unlock
//! - **[`WaitCondition`]**: a lock with a condition for suspend-until-woken handoffs
//! - **[`Worker`]**: a cancellable unit of work running a [`Task`] on its own thread
//! - **[`ThreadRegistry`]**: starts workers, tracks them, and reaps finished ones
//!
//! Cancellation is cooperative. A task polls [`Worker::exit_state`] and returns
//! once an exit has been requested; nothing interrupts a running task.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use threadengine::{Lock, ThreadRegistry, Worker};
//!
//! # fn main() -> anyhow::Result<()> {
//! let registry = ThreadRegistry::new();
//! let lock = Arc::new(Lock::new());
//! let total = Arc::new(AtomicUsize::new(0));
//!
//! let workers: Vec<Worker> = (0..4)
//!     .map(|_| {
//!         let (lock, total) = (Arc::clone(&lock), Arc::clone(&total));
//!         Worker::new(move |_: &Worker| {
//!             let _held = lock.guard();
//!             total.fetch_add(1, Ordering::Relaxed);
//!         })
//!     })
//!     .collect();
//!
//! for worker in &workers {
//!     registry.start(worker)?;
//! }
//! for worker in &workers {
//!     worker.join()?;
//! }
//! registry.process();
//!
//! assert_eq!(total.load(Ordering::Relaxed), 4);
//! assert!(registry.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod registry;
pub mod sync;
pub mod worker;

pub use config::RegistryConfig;
pub use registry::{Extensions, ThreadRegistry};
pub use sync::{Lock, LockGuard, WaitCondition};
pub use worker::{Task, Worker, WorkerId, WorkerState};

/// Result type alias for threadengine operations
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

//! Synchronization primitives
//!
//! - [`Lock`]: non-recursive mutual exclusion with explicit `lock`/`unlock`
//!   (plus an RAII [`LockGuard`] for scoped use)
//! - [`WaitCondition`]: a `Lock` with an attached condition for
//!   suspend-until-woken handoffs
//!
//! Both are built on `parking_lot`'s mutex and condition variable. Neither
//! depends on the worker registry; workers and the main thread use them to
//! protect whatever they share.

pub mod condition;
pub mod lock;

pub use condition::WaitCondition;
pub use lock::{Lock, LockGuard};

use super::Lock;
use parking_lot::Condvar;
use std::ops::Deref;
use std::thread;

/// A [`Lock`] paired with a condition a holder can sleep on.
///
/// `wait` atomically releases the lock, sleeps until another thread calls
/// [`wakeup`](Self::wakeup), and reacquires the lock before returning.
/// A wakeup releases exactly one thread that was already waiting; with no
/// waiter it is a no-op and is not remembered for later callers. `wait`
/// never returns without a matching wakeup, but the usual pattern of
/// re-checking the awaited condition in a loop is still expected:
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use threadengine::WaitCondition;
///
/// let cond = Arc::new(WaitCondition::new());
/// let ready = Arc::new(AtomicBool::new(false));
///
/// let (c, r) = (Arc::clone(&cond), Arc::clone(&ready));
/// let producer = std::thread::spawn(move || {
///     c.lock();
///     r.store(true, Ordering::Relaxed);
///     c.wakeup();
///     c.unlock();
/// });
///
/// cond.lock();
/// while !ready.load(Ordering::Relaxed) {
///     cond.wait();
/// }
/// cond.unlock();
/// producer.join().unwrap();
/// ```
#[derive(Debug, Default)]
pub struct WaitCondition {
    lock: Lock,
    signal: Condvar,
}

impl WaitCondition {
    pub const fn new() -> Self {
        Self {
            lock: Lock::new(),
            signal: Condvar::new(),
        }
    }

    /// Release the lock, sleep until woken, then reacquire the lock.
    ///
    /// There is no timeout: without a later wakeup this blocks forever.
    ///
    /// # Panics
    /// If the calling thread does not hold the lock.
    pub fn wait(&self) {
        let me = thread::current().id();
        let mut state = self.lock.state.lock();
        assert!(
            state.owner == Some(me),
            "WaitCondition::wait called without holding the lock"
        );

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        self.lock.release(&mut state);

        while state.serving <= ticket {
            self.signal.wait(&mut state);
        }

        self.lock.acquire(&mut state, me);
    }

    /// Wake one thread currently blocked in [`wait`](Self::wait).
    /// Returns whether a waiter was released.
    pub fn wakeup(&self) -> bool {
        let mut state = self.lock.state.lock();
        if state.serving == state.next_ticket {
            return false;
        }
        state.serving += 1;
        tracing::trace!(pending = state.next_ticket - state.serving, "wait condition woke one waiter");
        // Tickets are served in order, so every sleeper has to re-check its own
        self.signal.notify_all();
        true
    }

    /// Wake every thread currently blocked in [`wait`](Self::wait).
    /// Returns how many waiters were released.
    pub fn wakeup_all(&self) -> usize {
        let mut state = self.lock.state.lock();
        let woken = state.next_ticket - state.serving;
        if woken > 0 {
            state.serving = state.next_ticket;
            tracing::trace!(woken, "wait condition woke all waiters");
            self.signal.notify_all();
        }
        woken as usize
    }

    /// Number of threads currently blocked in [`wait`](Self::wait) and not yet woken
    pub fn waiters(&self) -> usize {
        let state = self.lock.state.lock();
        (state.next_ticket - state.serving) as usize
    }
}

impl Deref for WaitCondition {
    type Target = Lock;

    fn deref(&self) -> &Lock {
        &self.lock
    }
}

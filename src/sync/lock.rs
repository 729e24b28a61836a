use parking_lot::{Condvar, Mutex, MutexGuard};
use std::marker::PhantomData;
use std::thread::{self, ThreadId};

/// Bookkeeping shared by a [`Lock`] and any [`WaitCondition`](super::WaitCondition)
/// layered on top of it. Everything lives behind one internal mutex so that
/// releasing the lock and parking on a condition happen atomically.
#[derive(Debug, Default)]
pub(crate) struct LockState {
    /// Thread currently holding the lock
    pub(crate) owner: Option<ThreadId>,
    /// Next ticket handed to a thread entering `wait`
    pub(crate) next_ticket: u64,
    /// Tickets below this value have been woken
    pub(crate) serving: u64,
}

/// Non-recursive mutual-exclusion lock with explicit `lock`/`unlock`.
///
/// Unlike [`std::sync::Mutex`] the lock does not own the data it protects;
/// it guards a critical section. The holder is recorded so misuse (unlocking
/// from the wrong thread, relocking from the owner) panics instead of
/// corrupting state.
///
/// ```rust
/// use threadengine::Lock;
///
/// let lock = Lock::new();
/// lock.lock();
/// assert!(!lock.try_lock());
/// lock.unlock();
///
/// let _held = lock.guard(); // released on drop
/// ```
#[derive(Debug, Default)]
pub struct Lock {
    pub(crate) state: Mutex<LockState>,
    pub(crate) released: Condvar,
}

impl Lock {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                owner: None,
                next_ticket: 0,
                serving: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Block until the lock is free, then take it.
    ///
    /// # Panics
    /// If the calling thread already holds the lock.
    pub fn lock(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        assert!(
            state.owner != Some(me),
            "Lock::lock called by the thread that already holds it (locks are not recursive)"
        );
        self.acquire(&mut state, me);
    }

    /// Take the lock if it is free. Never waits for the current holder.
    pub fn try_lock(&self) -> bool {
        let mut state = self.state.lock();
        if state.owner.is_some() {
            return false;
        }
        state.owner = Some(thread::current().id());
        true
    }

    /// Release the lock.
    ///
    /// # Panics
    /// If the lock is not held, or is held by another thread.
    pub fn unlock(&self) {
        let mut state = self.state.lock();
        self.release(&mut state);
    }

    /// Lock and return a guard that unlocks when dropped.
    pub fn guard(&self) -> LockGuard<'_> {
        self.lock();
        LockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Non-blocking variant of [`Lock::guard`].
    pub fn try_guard(&self) -> Option<LockGuard<'_>> {
        self.try_lock().then(|| LockGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Whether the calling thread is the current holder
    pub fn is_held_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    pub(crate) fn acquire(&self, state: &mut MutexGuard<'_, LockState>, me: ThreadId) {
        while state.owner.is_some() {
            self.released.wait(state);
        }
        state.owner = Some(me);
    }

    pub(crate) fn release(&self, state: &mut LockState) {
        match state.owner {
            Some(owner) if owner == thread::current().id() => {}
            Some(_) => panic!("Lock::unlock called by a thread that does not hold the lock"),
            None => panic!("Lock::unlock called on a lock that is not locked"),
        }
        state.owner = None;
        self.released.notify_one();
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if self.state.get_mut().owner.is_some() {
            tracing::error!("lock destroyed while still held");
            if cfg!(debug_assertions) && !thread::panicking() {
                panic!("lock destroyed while still held");
            }
        }
    }
}

/// Scoped hold on a [`Lock`]. Not `Send`: it must be released by the thread
/// that acquired it.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a Lock,
    _not_send: PhantomData<*const ()>,
}

impl std::fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").finish_non_exhaustive()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

use super::AtomicUsize;
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::Ordering,
};

const WRITE_LOCK: usize = usize::MAX;
const NO_LOCK: usize = 0;

/// A non-blocking reader-writer lock.
///
/// Any number of readers or at most one writer may hold the lock at any point
/// in time. Both [`try_read`](RwLock::try_read) and
/// [`try_write`](RwLock::try_write) fail immediately instead of waiting, which
/// lets [`SmemCell`](crate::SmemCell) report
/// [`Error::NotReady`](crate::Error::NotReady) while the engine is being
/// installed or torn down.
pub struct RwLock<T> {
    state: AtomicUsize,
    data: UnsafeCell<T>,
}

/// RAII structure used to release the shared read access of a lock when
/// dropped.
#[must_use = "if unused the RwLock will immediately unlock"]
pub struct RwLockReadGuard<'a, T> {
    rw_lock: &'a RwLock<T>,
}

/// RAII structure used to release the exclusive write access of a lock when
/// dropped.
#[must_use = "if unused the RwLock will immediately unlock"]
pub struct RwLockWriteGuard<'a, T> {
    rw_lock: &'a RwLock<T>,
}

unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

unsafe impl<T: Sync> Sync for RwLockReadGuard<'_, T> {}
unsafe impl<T: Sync> Sync for RwLockWriteGuard<'_, T> {}

impl<T> RwLock<T> {
    maybe_const_fn! {
        /// Creates a new instance of an `RwLock<T>` which is unlocked.
        #[inline]
        pub const fn new(data: T) -> Self {
            Self { state: AtomicUsize::new(NO_LOCK), data: UnsafeCell::new(data) }
        }
    }

    /// Attempts to acquire this lock with shared read access.
    ///
    /// Returns `None` if a writer currently holds the lock.
    #[inline]
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            if current >= WRITE_LOCK - 1 {
                break None;
            }
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => break Some(RwLockReadGuard { rw_lock: self }),
                Err(state) => current = state,
            }
        }
    }

    /// Attempts to lock this lock with exclusive write access.
    ///
    /// Returns `None` if any reader or another writer holds the lock.
    #[inline]
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        self.state
            .compare_exchange(NO_LOCK, WRITE_LOCK, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| RwLockWriteGuard { rw_lock: self })
    }
}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.rw_lock.data.get() }
    }
}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.rw_lock.data.get() }
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.rw_lock.data.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.rw_lock.state.fetch_sub(1, Ordering::Release);
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.rw_lock.state.store(NO_LOCK, Ordering::Release);
    }
}

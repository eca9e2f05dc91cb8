//! Cross-processor hardware mutex.
//!
//! SMEM allocations are serialized between processors with a hardware
//! spinlock (on Qualcomm SoCs one of the TCSR or SFPB mutex banks). The lock is
//! not reentrant and gives no fairness guarantee. It is also not honored by
//! every writer of the shared region, so holding it never excuses skipping the
//! structural checks of the heap walkers.

use super::AtomicBool;
use crate::Error;
use core::sync::atomic::Ordering;

/// Default time to wait for the hardware mutex, in milliseconds.
pub const HWSPINLOCK_TIMEOUT_MS: u64 = 1000;

/// A hardware spinlock shared with the remote processors.
///
/// Dropping the value returns the lock to the platform.
pub trait HwSpinlock {
    /// Makes a single attempt to take the lock. Returns `true` on success.
    fn try_lock(&self) -> bool;

    /// Releases the lock previously taken with
    /// [`try_lock`](HwSpinlock::try_lock).
    fn unlock(&self);
}

/// Monotonic millisecond clock used to bound lock acquisition.
pub trait Clock {
    /// Returns the current time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// An RAII guard holding a [`HwSpinlock`]. The lock is released when the guard
/// is dropped, on every exit path.
#[must_use = "if unused the hardware spinlock will immediately unlock"]
pub struct LockGuard<'a, L: HwSpinlock> {
    lock: &'a L,
}

impl<'a, L: HwSpinlock> LockGuard<'a, L> {
    /// Spins on `lock` until it is taken or `timeout_ms` elapse on `clock`.
    ///
    /// A timed-out attempt is returned as [`Error::LockTimeout`] and is never
    /// retried here.
    pub fn acquire<C: Clock>(lock: &'a L, clock: &C, timeout_ms: u64) -> Result<Self, Error> {
        let start = clock.now_ms();
        loop {
            if lock.try_lock() {
                return Ok(Self { lock });
            }
            if clock.now_ms().wrapping_sub(start) >= timeout_ms {
                return Err(Error::LockTimeout);
            }
            relax();
        }
    }
}

impl<L: HwSpinlock> Drop for LockGuard<'_, L> {
    #[inline]
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[inline]
fn relax() {
    #[cfg(loom)]
    loom::thread::yield_now();
    #[cfg(not(loom))]
    core::hint::spin_loop();
}

/// Software stand-in for a hardware spinlock, backed by an atomic flag.
///
/// Useful on hosts without a mutex bank and for simulating a remote processor
/// in tests.
pub struct SoftSpinlock {
    locked: AtomicBool,
}

impl SoftSpinlock {
    maybe_const_fn! {
        /// Creates a new unlocked `SoftSpinlock`.
        #[inline]
        pub const fn new() -> Self {
            Self { locked: AtomicBool::new(false) }
        }
    }

    /// Returns `true` if the lock is currently held.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl Default for SoftSpinlock {
    fn default() -> Self {
        Self::new()
    }
}

impl HwSpinlock for SoftSpinlock {
    #[inline]
    fn try_lock(&self) -> bool {
        !self.locked.swap(true, Ordering::Acquire)
    }

    #[inline]
    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

impl<L: HwSpinlock> HwSpinlock for &L {
    #[inline]
    fn try_lock(&self) -> bool {
        (**self).try_lock()
    }

    #[inline]
    fn unlock(&self) {
        (**self).unlock();
    }
}

impl<C: Clock> Clock for &C {
    #[inline]
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// [`Clock`] backed by [`std::time::Instant`].
#[cfg(feature = "host")]
#[derive(Clone, Copy, Debug)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "host")]
impl StdClock {
    /// Creates a clock counting from now.
    pub fn new() -> Self {
        Self { origin: std::time::Instant::now() }
    }
}

#[cfg(feature = "host")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "host")]
impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

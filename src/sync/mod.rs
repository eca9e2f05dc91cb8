//! Synchronization with the remote processors.

pub mod hwlock;

mod publish;
mod rwlock;

pub use self::{
    hwlock::{Clock, HwSpinlock, LockGuard, SoftSpinlock, HWSPINLOCK_TIMEOUT_MS},
    publish::{publish, wmb},
    rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

#[cfg(feature = "host")]
pub use self::hwlock::StdClock;

#[cfg(not(loom))]
type AtomicBool = core::sync::atomic::AtomicBool;
#[cfg(loom)]
type AtomicBool = loom::sync::atomic::AtomicBool;
#[cfg(not(loom))]
type AtomicUsize = core::sync::atomic::AtomicUsize;
#[cfg(loom)]
type AtomicUsize = loom::sync::atomic::AtomicUsize;

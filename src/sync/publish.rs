//! Barrier-ordered publication of shared structures.

use crate::Error;
use core::sync::atomic::Ordering;

/// Write memory barrier.
///
/// Every store issued before the barrier becomes visible to other processors
/// before any store issued after it.
#[inline]
pub fn wmb() {
    #[cfg(loom)]
    loom::sync::atomic::fence(Ordering::Release);
    #[cfg(not(loom))]
    core::sync::atomic::fence(Ordering::Release);
}

/// Publishes a new structure in shared memory.
///
/// `stage` writes every field of the structure, then the publish barrier is
/// issued, then `commit` writes the single marker (a flag or a free offset)
/// that makes the structure valid. A remote reader that checks the marker and
/// respects the barrier convention never observes a half-written structure,
/// whether or not it took the hardware mutex.
///
/// If `stage` fails, the barrier and the commit are skipped and the
/// structure stays unpublished.
pub fn publish<T>(
    stage: impl FnOnce() -> Result<T, Error>,
    commit: impl FnOnce(T) -> Result<(), Error>,
) -> Result<(), Error> {
    let staged = stage()?;
    wmb();
    commit(staged)
}

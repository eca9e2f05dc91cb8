#![cfg(loom)]

#[macro_use]
mod loom_helpers;

use drone_smem::{sync::LockGuard, Clock, Error, HwSpinlock, SoftSpinlock};
use loom::{cell::UnsafeCell, sync::Arc, thread};
use std::cell::Cell;

use self::loom_helpers::*;

/// A clock that never advances, so acquisition spins until it succeeds.
struct Stopped;

impl Clock for Stopped {
    fn now_ms(&self) -> u64 {
        0
    }
}

/// Advances by one millisecond on every reading.
struct Ticking(Cell<u64>);

impl Clock for Ticking {
    fn now_ms(&self) -> u64 {
        let now = self.0.get();
        self.0.set(now + 1);
        now
    }
}

struct Shared {
    lock: SoftSpinlock,
    order: UnsafeCell<usize>,
}

unsafe impl Sync for Shared {}
unsafe impl Send for Shared {}

fn critical_section(shared: &Shared, id: usize) {
    let _guard = LockGuard::acquire(&shared.lock, &Stopped, u64::MAX).unwrap();
    shared.order.with_mut(|order| unsafe { *order = *order * 10 + id });
}

#[test]
fn loom_mutual_exclusion() {
    let states = statemap![
        12 => [0],
        21 => [0],
    ];
    loom::model(move || {
        let shared = Arc::new(Shared { lock: SoftSpinlock::new(), order: UnsafeCell::new(0) });
        let first = thread::spawn({
            let shared = Arc::clone(&shared);
            move || critical_section(&shared, 1)
        });
        let second = thread::spawn({
            let shared = Arc::clone(&shared);
            move || critical_section(&shared, 2)
        });
        first.join().unwrap();
        second.join().unwrap();
        assert!(!shared.lock.is_locked());
        let order = shared.order.with(|order| unsafe { *order });
        statemap_put(states, order, 0);
    });
    statemap_check_exhaustive(states);
}

#[test]
fn loom_bounded_wait() {
    let states = statemap![
        0 => [0],
        1 => [0],
    ];
    loom::model(move || {
        let lock = Arc::new(SoftSpinlock::new());
        assert!(lock.try_lock());
        let holder = thread::spawn({
            let lock = Arc::clone(&lock);
            move || lock.unlock()
        });
        let outcome = match LockGuard::acquire(&*lock, &Ticking(Cell::new(0)), 2) {
            Ok(_guard) => 1,
            Err(Error::LockTimeout) => 0,
            Err(err) => panic!("unexpected {err}"),
        };
        holder.join().unwrap();
        statemap_put(states, outcome, usize::from(lock.is_locked()));
    });
    statemap_check_exhaustive(states);
}

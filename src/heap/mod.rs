//! Allocate-only heaps in the shared region.
//!
//! Items live in one of two heap flavors, depending on what the boot loader
//! set up:
//!
//! * The legacy [`FlatHeap`] hands out space from the end of region 0's
//!   table of contents and records each item in a fixed slot of that table.
//! * A [`PrivateHeap`] lives in a partition shared by exactly two hosts (or
//!   by everybody, in the case of the global partition). It holds two
//!   singly-linked lists growing towards each other: the uncached list grows
//!   forward from the partition header and the cached list grows backward
//!   from the partition end. The free gap sits between them.
//!
//! [`Heap::select`] picks the heap serving a host: its private partition if
//! there is one, else the global partition, else the flat heap.
//!
//! Nothing is ever freed. Every allocation stages the new record, issues the
//! publish barrier, and only then writes the marker that makes the record
//! visible (the `allocated` flag or the free offset). Remote processors may
//! write the region without taking the hardware mutex, so each list walk
//! re-validates every node it touches and requires every step to move
//! strictly away from the list head.

mod global;
mod private;

pub use self::{global::FlatHeap, private::PrivateHeap};

use crate::{partition::PartitionIndex, region::RegionMap, smem_dbg, Error};
use core::ptr::NonNull;

/// Walk direction of a heap list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Uncached list, towards higher offsets.
    Forward,
    /// Cached list, towards lower offsets.
    Backward,
}

impl Direction {
    /// Validates one step of a list walk from `current` to `next`.
    ///
    /// A step that does not move strictly in the walk direction would let a
    /// corrupt list loop forever, so it fails with [`Error::InvalidFormat`].
    /// A `None` step (the next offset overflowed) fails the same way.
    pub fn step(self, current: u32, next: Option<u32>) -> Result<u32, Error> {
        match (self, next) {
            (Self::Forward, Some(next)) if next > current => Ok(next),
            (Self::Backward, Some(next)) if next < current => Ok(next),
            _ => {
                smem_dbg!("non-monotonic {:?} step from {:#x} to {:x?}", self, current, next);
                Err(Error::InvalidFormat)
            }
        }
    }
}

/// The heap serving one host.
#[derive(Clone, Copy, Debug)]
pub enum Heap<'a> {
    /// Legacy flat heap.
    Flat(FlatHeap<'a>),
    /// Private or global partition.
    Private(PrivateHeap<'a>),
}

impl<'a> Heap<'a> {
    /// Selects the heap serving `host`.
    ///
    /// A host without a private partition, including an out-of-range host
    /// and `None`, is served by the global partition if there is one and by
    /// the flat heap otherwise.
    pub fn select(regions: &'a RegionMap, index: &'a PartitionIndex, host: Option<u16>) -> Self {
        match index.select(host) {
            Some(entry) => Self::Private(PrivateHeap::new(regions.primary(), entry)),
            None => Self::Flat(FlatHeap::new(regions)),
        }
    }

    /// Allocates `size` bytes for `item`.
    pub fn alloc(&self, item: u16, size: u32) -> Result<(), Error> {
        match self {
            Self::Flat(heap) => heap.alloc(item, size),
            Self::Private(heap) => heap.alloc(item, size),
        }
    }

    /// Looks `item` up.
    pub fn get(&self, item: u16) -> Result<NonNull<[u8]>, Error> {
        match self {
            Self::Flat(heap) => heap.get(item),
            Self::Private(heap) => heap.get(item),
        }
    }

    /// Returns the number of free bytes.
    pub fn free_space(&self) -> Result<u32, Error> {
        match self {
            Self::Flat(heap) => heap.free_space(),
            Self::Private(heap) => heap.free_space(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_steps() {
        assert_eq!(Direction::Forward.step(32, Some(48)), Ok(48));
        assert_eq!(Direction::Forward.step(32, Some(32)), Err(Error::InvalidFormat));
        assert_eq!(Direction::Forward.step(32, Some(16)), Err(Error::InvalidFormat));
        assert_eq!(Direction::Forward.step(32, None), Err(Error::InvalidFormat));
    }

    #[test]
    fn backward_steps() {
        assert_eq!(Direction::Backward.step(4032, Some(3904)), Ok(3904));
        assert_eq!(Direction::Backward.step(4032, Some(4032)), Err(Error::InvalidFormat));
        assert_eq!(Direction::Backward.step(4032, Some(4096)), Err(Error::InvalidFormat));
        assert_eq!(Direction::Backward.step(0, None), Err(Error::InvalidFormat));
    }
}

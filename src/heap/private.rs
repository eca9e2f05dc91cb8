use super::Direction;
use crate::{
    layout::{
        align8, align_to, PartitionHeader, PartitionTableEntry, PrivateEntry, PRIVATE_CANARY,
    },
    region::Region,
    smem_err,
    sync::publish,
    Error,
};
use core::ptr::NonNull;

const ENTRY_LEN: u32 = PrivateEntry::LEN as u32;

/// The heap of one partition.
///
/// All offsets below are relative to the partition header.
#[derive(Clone, Copy, Debug)]
pub struct PrivateHeap<'a> {
    region: &'a Region,
    entry: &'a PartitionTableEntry,
}

/// Outcome of an uncached list walk.
enum Uncached {
    /// The node at the offset holds the item.
    Found(u32, PrivateEntry),
    /// The item is missing, the offset is where the next node goes.
    End(u32),
}

impl<'a> PrivateHeap<'a> {
    /// Creates a view of the partition described by `entry` in `region0`.
    ///
    /// The entry must have passed
    /// [`validate_header`](crate::partition::validate_header).
    #[inline]
    pub fn new(region0: &'a Region, entry: &'a PartitionTableEntry) -> Self {
        Self { region: region0, entry }
    }

    /// Appends an uncached node of `size` bytes, rounded up to 8, for `item`.
    pub fn alloc(&self, item: u16, size: u32) -> Result<(), Error> {
        let (uncached_end, cached_end) = self.free_bounds()?;
        let at = match self.walk_uncached(uncached_end, item)? {
            Uncached::Found(..) => return Err(Error::AlreadyExists),
            Uncached::End(at) => at,
        };
        let padded = align8(size).ok_or(Error::OutOfSpace)?;
        let next = match padded.checked_add(ENTRY_LEN).and_then(|len| at.checked_add(len)) {
            Some(next) if next <= cached_end => next,
            _ => {
                smem_err!(
                    "out of memory in hosts {}:{} partition",
                    self.entry.host0,
                    self.entry.host1
                );
                return Err(Error::OutOfSpace);
            }
        };
        let node = self.offset(at);
        publish(
            || {
                self.region.store_u16(node + PrivateEntry::CANARY, PRIVATE_CANARY)?;
                self.region.store_u16(node + PrivateEntry::ITEM, item)?;
                self.region.store_u32(node + PrivateEntry::SIZE, padded)?;
                self.region.store_u16(node + PrivateEntry::PADDING_DATA, (padded - size) as u16)?;
                self.region.store_u16(node + PrivateEntry::PADDING_HDR, 0)
            },
            |()| {
                let free = self.offset(0) + PartitionHeader::OFFSET_FREE_UNCACHED;
                self.region.store_u32(free, next)
            },
        )
    }

    /// Looks `item` up in the uncached list, then in the cached list.
    pub fn get(&self, item: u16) -> Result<NonNull<[u8]>, Error> {
        let (uncached_end, cached_end) = self.free_bounds()?;
        if let Uncached::Found(at, node) = self.walk_uncached(uncached_end, item)? {
            let len = node.data_len(self.entry.size)?;
            let data = at
                .checked_add(ENTRY_LEN + u32::from(node.padding_hdr))
                .filter(|data| data.checked_add(len).map_or(false, |end| end <= uncached_end))
                .ok_or(Error::InvalidFormat)?;
            return self.slice(data, len);
        }
        if cached_end == self.entry.size {
            return Err(Error::NotFound);
        }
        let stride = self.cached_stride()?;
        let mut at = self.entry.size.checked_sub(stride).ok_or(Error::InvalidFormat)?;
        if at < cached_end {
            return Err(Error::InvalidFormat);
        }
        while at > cached_end {
            let node = self.node(at)?;
            if node.item == item {
                let len = node.data_len(self.entry.size)?;
                let data = at
                    .checked_sub(node.size)
                    .filter(|&data| data >= cached_end && data + len <= at)
                    .ok_or(Error::InvalidFormat)?;
                return self.slice(data, len);
            }
            let next = at.checked_sub(node.size).and_then(|next| next.checked_sub(stride));
            at = Direction::Backward.step(at, next)?;
        }
        Err(Error::NotFound)
    }

    /// Returns the size of the gap between the two lists, which can't exceed
    /// the partition size.
    pub fn free_space(&self) -> Result<u32, Error> {
        let header = PartitionHeader::read(self.region, self.offset(0))?;
        header
            .offset_free_cached
            .checked_sub(header.offset_free_uncached)
            .filter(|&free| free <= self.entry.size)
            .ok_or(Error::InvalidFormat)
    }

    /// Reads the list ends and checks `uncached <= cached <= size`.
    fn free_bounds(&self) -> Result<(u32, u32), Error> {
        let header = PartitionHeader::read(self.region, self.offset(0))?;
        let (uncached, cached) = (header.offset_free_uncached, header.offset_free_cached);
        if uncached > cached || cached > self.entry.size {
            smem_err!(
                "bad free offsets {:#x}/{:#x} in hosts {}:{} partition",
                uncached,
                cached,
                self.entry.host0,
                self.entry.host1
            );
            return Err(Error::InvalidFormat);
        }
        Ok((uncached, cached))
    }

    fn walk_uncached(&self, end: u32, item: u16) -> Result<Uncached, Error> {
        let mut at = PartitionHeader::LEN as u32;
        while at < end && at.saturating_add(ENTRY_LEN) < end {
            let node = self.node(at)?;
            if node.item == item {
                return Ok(Uncached::Found(at, node));
            }
            let next = at
                .checked_add(ENTRY_LEN + u32::from(node.padding_hdr))
                .and_then(|next| next.checked_add(node.size));
            at = Direction::Forward.step(at, next)?;
        }
        if at > end {
            return Err(Error::InvalidFormat);
        }
        Ok(Uncached::End(at))
    }

    /// Reads the node header at `at` and checks its canary.
    fn node(&self, at: u32) -> Result<PrivateEntry, Error> {
        if at.checked_add(ENTRY_LEN).map_or(true, |end| end > self.entry.size) {
            return Err(Error::InvalidFormat);
        }
        let node = PrivateEntry::read(self.region, self.offset(at))?;
        if node.canary != PRIVATE_CANARY {
            smem_err!(
                "found invalid canary in hosts {}:{} partition",
                self.entry.host0,
                self.entry.host1
            );
            return Err(Error::InvalidFormat);
        }
        Ok(node)
    }

    /// Distance from a cached node header down to the next one, not counting
    /// the node data.
    fn cached_stride(&self) -> Result<u32, Error> {
        align_to(ENTRY_LEN, self.entry.cacheline).ok_or_else(|| {
            smem_err!("bad cacheline {} in partition table", self.entry.cacheline);
            Error::InvalidFormat
        })
    }

    fn slice(&self, at: u32, len: u32) -> Result<NonNull<[u8]>, Error> {
        self.region.slice(self.offset(at), len as usize)
    }

    #[inline]
    fn offset(&self, at: u32) -> usize {
        self.entry.offset as usize + at as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{image::Image, layout::GLOBAL_HOST};

    const PART: PartitionTableEntry = PartitionTableEntry {
        offset: 0x4000,
        size: 0x1000,
        flags: 0,
        host0: GLOBAL_HOST,
        host1: GLOBAL_HOST,
        cacheline: 64,
    };

    fn partitioned() -> Image {
        let mut image = Image::new(0x10000);
        image.partitioned(&PART, &[]);
        image
    }

    fn item_offset(image: &Image, item: NonNull<[u8]>) -> usize {
        item.as_ptr() as *mut u8 as usize - image.ptr_at(0) as usize
    }

    #[test]
    fn alloc_then_get() {
        let image = partitioned();
        let region = image.region(0x8600_0000);
        let heap = PrivateHeap::new(&region, &PART);
        assert_eq!(heap.free_space(), Ok(0x1000 - 32));
        heap.alloc(9, 100).unwrap();
        heap.alloc(10, 8).unwrap();
        assert_eq!(heap.free_space(), Ok(0x1000 - 32 - 120 - 24));
        let item = heap.get(9).unwrap();
        assert_eq!(item.len(), 100);
        assert_eq!(item_offset(&image, item), 0x4000 + 32 + 16);
        let item = heap.get(10).unwrap();
        assert_eq!(item.len(), 8);
        assert_eq!(item_offset(&image, item), 0x4000 + 32 + 120 + 16);
        assert_eq!(heap.get(11), Err(Error::NotFound));
        assert_eq!(heap.alloc(9, 4), Err(Error::AlreadyExists));
    }

    #[test]
    fn node_layout() {
        let image = partitioned();
        let region = image.region(0x8600_0000);
        PrivateHeap::new(&region, &PART).alloc(9, 100).unwrap();
        let node = PrivateEntry::read(&region, 0x4000 + 32).unwrap();
        assert_eq!(
            node,
            PrivateEntry {
                canary: PRIVATE_CANARY,
                item: 9,
                size: 104,
                padding_data: 4,
                padding_hdr: 0,
            }
        );
        assert_eq!(image.peek_u32(0x4000 + PartitionHeader::OFFSET_FREE_UNCACHED), 32 + 120);
    }

    #[test]
    fn header_padding() {
        let mut image = partitioned();
        let node = image.uncached_padded(&PART, 9, 12, 8, 0x77);
        assert_eq!(node, 0x4000 + 32);
        let region = image.region(0x8600_0000);
        let heap = PrivateHeap::new(&region, &PART);
        let item = heap.get(9).unwrap();
        assert_eq!(item.len(), 12);
        assert_eq!(item_offset(&image, item), node + 16 + 8);
        assert_eq!(image.peek_u8(node + 16 + 8), 0x77);
        heap.alloc(10, 8).unwrap();
        let item = heap.get(10).unwrap();
        assert_eq!(item_offset(&image, item), node + 16 + 8 + 16 + 16);
        assert_eq!(heap.free_space(), Ok(0x1000 - 32 - 40 - 24));
    }

    #[test]
    fn cached_items() {
        let mut image = partitioned();
        let first = image.cached(&PART, 20, 30, 0xaa);
        let second = image.cached(&PART, 21, 64, 0xbb);
        assert_eq!(first, 0x4000 + 0x1000 - 64);
        assert_eq!(second, first - 32 - 64);
        let region = image.region(0x8600_0000);
        let heap = PrivateHeap::new(&region, &PART);
        let item = heap.get(20).unwrap();
        assert_eq!(item.len(), 30);
        assert_eq!(item_offset(&image, item), first - 32);
        assert_eq!(image.peek_u8(first - 32), 0xaa);
        let item = heap.get(21).unwrap();
        assert_eq!(item.len(), 64);
        assert_eq!(item_offset(&image, item), second - 64);
        assert_eq!(heap.get(22), Err(Error::NotFound));
        assert_eq!(heap.free_space(), Ok((second - 64 - 0x4000 - 32) as u32));
    }

    #[test]
    fn uncached_shadows_cached() {
        let mut image = partitioned();
        image.cached(&PART, 20, 8, 0xaa);
        image.uncached(&PART, 20, 16, 0xbb);
        let region = image.region(0x8600_0000);
        let item = PrivateHeap::new(&region, &PART).get(20).unwrap();
        assert_eq!(item.len(), 16);
        assert_eq!(item_offset(&image, item), 0x4000 + 32 + 16);
    }

    #[test]
    fn alloc_stops_at_cached_list() {
        let mut image = partitioned();
        image.cached(&PART, 20, 0x800, 0);
        let region = image.region(0x8600_0000);
        let heap = PrivateHeap::new(&region, &PART);
        let cached_end = image.peek_u32(0x4000 + PartitionHeader::OFFSET_FREE_CACHED);
        assert_eq!(cached_end, 0x1000 - 64 - 0x800);
        assert_eq!(heap.alloc(9, cached_end - 32 - 16 + 1), Err(Error::OutOfSpace));
        heap.alloc(9, cached_end - 32 - 16).unwrap();
        assert_eq!(heap.free_space(), Ok(0));
        assert_eq!(heap.alloc(10, 1), Err(Error::OutOfSpace));
        assert_eq!(heap.get(9).map(|item| item.len()), Ok(cached_end as usize - 48));
        assert_eq!(heap.get(20).map(|item| item.len()), Ok(0x800));
    }

    #[test]
    fn bad_canary() {
        let mut image = partitioned();
        let node = image.uncached(&PART, 9, 8, 0);
        image.uncached(&PART, 10, 8, 0);
        image.poke_u16(node, 0xa5a4);
        let region = image.region(0x8600_0000);
        let heap = PrivateHeap::new(&region, &PART);
        assert_eq!(heap.get(10), Err(Error::InvalidFormat));
        assert_eq!(heap.alloc(11, 8), Err(Error::InvalidFormat));
    }

    #[test]
    fn bad_cached_canary() {
        let mut image = partitioned();
        let node = image.cached(&PART, 20, 8, 0);
        image.poke_u16(node, 0);
        let region = image.region(0x8600_0000);
        assert_eq!(PrivateHeap::new(&region, &PART).get(20), Err(Error::InvalidFormat));
    }

    #[test]
    fn oversized_node() {
        let mut image = partitioned();
        let node = image.uncached(&PART, 9, 8, 0);
        image.uncached(&PART, 10, 8, 0);
        image.poke_u32(node + PrivateEntry::SIZE, u32::MAX - 8);
        let region = image.region(0x8600_0000);
        let heap = PrivateHeap::new(&region, &PART);
        assert_eq!(heap.get(9), Err(Error::InvalidFormat));
        assert_eq!(heap.get(10), Err(Error::InvalidFormat));
    }

    #[test]
    fn free_offsets_out_of_order() {
        let mut image = partitioned();
        image.poke_u32(0x4000 + PartitionHeader::OFFSET_FREE_UNCACHED, 0x800);
        image.poke_u32(0x4000 + PartitionHeader::OFFSET_FREE_CACHED, 0x400);
        let region = image.region(0x8600_0000);
        let heap = PrivateHeap::new(&region, &PART);
        assert_eq!(heap.alloc(9, 8), Err(Error::InvalidFormat));
        assert_eq!(heap.get(9), Err(Error::InvalidFormat));
        assert_eq!(heap.free_space(), Err(Error::InvalidFormat));
    }

    #[test]
    fn cached_end_overlapping_first_node() {
        let mut image = partitioned();
        image.poke_u32(0x4000 + PartitionHeader::OFFSET_FREE_CACHED, 0x1000 - 8);
        let region = image.region(0x8600_0000);
        assert_eq!(PrivateHeap::new(&region, &PART).get(9), Err(Error::InvalidFormat));
    }

    #[test]
    fn bad_cacheline() {
        let mut image = partitioned();
        image.cached(&PART, 20, 8, 0);
        let region = image.region(0x8600_0000);
        let entry = PartitionTableEntry { cacheline: 48, ..PART };
        assert_eq!(PrivateHeap::new(&region, &entry).get(20), Err(Error::InvalidFormat));
    }
}

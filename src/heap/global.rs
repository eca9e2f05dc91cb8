use crate::{
    layout::{align8, GlobalEntry, GlobalHeader},
    region::RegionMap,
    smem_err,
    sync::publish,
    Error,
};
use core::ptr::NonNull;

/// The legacy flat heap indexed by the table of contents of region 0.
#[derive(Clone, Copy, Debug)]
pub struct FlatHeap<'a> {
    regions: &'a RegionMap,
}

impl<'a> FlatHeap<'a> {
    /// Creates a view of the flat heap of `regions`.
    #[inline]
    pub fn new(regions: &'a RegionMap) -> Self {
        Self { regions }
    }

    /// Allocates `size` bytes, rounded up to 8, for `item`.
    pub fn alloc(&self, item: u16, size: u32) -> Result<(), Error> {
        let region = self.regions.primary();
        let slot = GlobalHeader::toc_entry(item)?;
        if GlobalEntry::read(region, slot)?.allocated != 0 {
            return Err(Error::AlreadyExists);
        }
        let header = GlobalHeader::read(region)?;
        let size = align8(size).ok_or(Error::OutOfSpace)?;
        if size > header.available {
            smem_err!("out of memory ({} > {})", size, header.available);
            return Err(Error::OutOfSpace);
        }
        let free_offset = header
            .free_offset
            .checked_add(size)
            .filter(|&end| end as usize <= region.size())
            .ok_or(Error::InvalidFormat)?;
        publish(
            || {
                region.store_u32(slot + GlobalEntry::OFFSET, header.free_offset)?;
                region.store_u32(slot + GlobalEntry::SIZE, size)
            },
            |()| region.store_u32(slot + GlobalEntry::ALLOCATED, 1),
        )?;
        region.store_u32(GlobalHeader::FREE_OFFSET, free_offset)?;
        region.store_u32(GlobalHeader::AVAILABLE, header.available - size)
    }

    /// Returns the memory of `item`, which may live in any mapped region.
    pub fn get(&self, item: u16) -> Result<NonNull<[u8]>, Error> {
        let entry = GlobalEntry::read(self.regions.primary(), GlobalHeader::toc_entry(item)?)?;
        if entry.allocated == 0 {
            return Err(Error::NotFound);
        }
        let region = self.regions.by_tag(entry.region_tag()).ok_or(Error::NotFound)?;
        let (offset, size) = (entry.offset as usize, entry.size as usize);
        if offset.checked_add(size).map_or(true, |end| end > region.size()) {
            smem_err!("item {} ({:#x}+{:#x}) exceeds its region", item, offset, size);
            return Err(Error::InvalidFormat);
        }
        region.slice(offset, size)
    }

    /// Returns the number of free bytes, which can't exceed the region size.
    pub fn free_space(&self) -> Result<u32, Error> {
        let region = self.regions.primary();
        let available = region.load_u32(GlobalHeader::AVAILABLE)?;
        if available as usize > region.size() {
            return Err(Error::InvalidFormat);
        }
        Ok(available)
    }
}

//! Host-side SMEM image builder.
//!
//! [`Image`] lays out a shared memory region the way a boot loader and the
//! remote processors would, so the engine can be exercised without hardware.
//! Every writer panics on an out-of-range offset.

use crate::{
    layout::{
        align_to, GlobalEntry, GlobalHeader, InfoBlock, PartitionHeader, PartitionTableEntry,
        PartitionTableHeader, PrivateEntry, GLOBAL_PART_VERSION, INFO_MAGIC, PART_MAGIC,
        PRIVATE_CANARY, PTABLE_MAGIC, PTABLE_OFFSET_FROM_END, SBL_VERSION_INDEX,
    },
    ptable::PTABLE_VERSION,
    region::{Region, RegionDesc},
};
use core::{fmt, ptr, ptr::NonNull};

/// An 8-byte aligned SMEM image.
///
/// The backing buffer is leaked, so every [`Region`] handed out by
/// [`Image::region`] stays valid for the rest of the process.
pub struct Image {
    base: NonNull<u8>,
    size: usize,
}

// Safety: the buffer is never freed and all accesses are volatile.
unsafe impl Send for Image {}
unsafe impl Sync for Image {}

impl Image {
    /// Allocates a zeroed image of `size` bytes.
    pub fn new(size: usize) -> Self {
        let words: &'static mut [u64] = Box::leak(vec![0_u64; (size + 7) / 8].into_boxed_slice());
        let base = NonNull::from(words).cast::<u8>();
        Self { base, size }
    }

    /// Returns the image size.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns a region over the image tagged by `phys`.
    pub fn region(&self, phys: u64) -> Region {
        self.region_with(&RegionDesc::new(phys, self.size))
    }

    /// Returns a region over the image described by `desc`.
    ///
    /// # Panics
    ///
    /// If `desc.size` exceeds the image size.
    pub fn region_with(&self, desc: &RegionDesc) -> Region {
        assert!(desc.size <= self.size, "region exceeds the image");
        unsafe { Region::from_raw_parts(desc, self.base) }
    }

    /// Returns a pointer to the byte at `offset`.
    pub fn ptr_at(&self, offset: usize) -> *mut u8 {
        assert!(offset <= self.size, "offset {offset:#x} out of the image");
        unsafe { self.base.as_ptr().add(offset) }
    }

    /// Writes a global header declaring boot loader major version `version`
    /// and an empty flat heap right after the table of contents.
    pub fn header(&mut self, version: u32) -> &mut Self {
        let available = self.ptable_offset().saturating_sub(GlobalHeader::LEN);
        self.poke_u32(GlobalHeader::VERSION + SBL_VERSION_INDEX * 4, version << 16)
            .poke_u32(GlobalHeader::INITIALIZED, 1)
            .poke_u32(GlobalHeader::RESERVED, 0)
            .flat_heap(GlobalHeader::LEN as u32, available as u32)
    }

    /// Sets the flat heap counters.
    pub fn flat_heap(&mut self, free_offset: u32, available: u32) -> &mut Self {
        self.poke_u32(GlobalHeader::FREE_OFFSET, free_offset)
            .poke_u32(GlobalHeader::AVAILABLE, available)
    }

    /// Writes the table of contents slot of `item`.
    pub fn toc_entry(&mut self, item: u16, entry: &GlobalEntry) -> &mut Self {
        let at = GlobalHeader::TOC + usize::from(item) * GlobalEntry::LEN;
        self.poke_u32(at + GlobalEntry::ALLOCATED, entry.allocated)
            .poke_u32(at + GlobalEntry::OFFSET, entry.offset)
            .poke_u32(at + GlobalEntry::SIZE, entry.size)
            .poke_u32(at + GlobalEntry::AUX_BASE, entry.aux_base)
    }

    /// Returns the offset of the partition table.
    #[inline]
    pub fn ptable_offset(&self) -> usize {
        self.size.saturating_sub(PTABLE_OFFSET_FROM_END)
    }

    /// Writes a partition table holding `entries`.
    pub fn ptable(&mut self, entries: &[PartitionTableEntry]) -> &mut Self {
        let base = self.ptable_offset();
        self.poke_bytes(base + PartitionTableHeader::MAGIC, &PTABLE_MAGIC)
            .poke_u32(base + PartitionTableHeader::VERSION, PTABLE_VERSION)
            .poke_u32(base + PartitionTableHeader::NUM_ENTRIES, entries.len() as u32);
        for (i, entry) in entries.iter().enumerate() {
            let at = base + PartitionTableHeader::LEN + i * PartitionTableEntry::LEN;
            self.poke_u32(at + PartitionTableEntry::OFFSET, entry.offset)
                .poke_u32(at + PartitionTableEntry::SIZE, entry.size)
                .poke_u32(at + PartitionTableEntry::FLAGS, entry.flags)
                .poke_u16(at + PartitionTableEntry::HOST0, entry.host0)
                .poke_u16(at + PartitionTableEntry::HOST1, entry.host1)
                .poke_u32(at + PartitionTableEntry::CACHELINE, entry.cacheline);
        }
        self
    }

    /// Writes an info block after the last partition table entry.
    pub fn info_block(&mut self, num_items: u16) -> &mut Self {
        let base = self.ptable_offset();
        let num_entries = self.peek_u32(base + PartitionTableHeader::NUM_ENTRIES) as usize;
        let at = base + PartitionTableHeader::LEN + num_entries * PartitionTableEntry::LEN;
        let size = self.size as u32;
        self.poke_bytes(at + InfoBlock::MAGIC, &INFO_MAGIC)
            .poke_u32(at + InfoBlock::SIZE, size)
            .poke_u16(at + InfoBlock::NUM_ITEMS, num_items)
    }

    /// Writes an empty partition header matching `entry`.
    pub fn partition(&mut self, entry: &PartitionTableEntry) -> &mut Self {
        let at = entry.offset as usize;
        self.poke_bytes(at + PartitionHeader::MAGIC, &PART_MAGIC)
            .poke_u16(at + PartitionHeader::HOST0, entry.host0)
            .poke_u16(at + PartitionHeader::HOST1, entry.host1)
            .poke_u32(at + PartitionHeader::SIZE, entry.size)
            .poke_u32(at + PartitionHeader::OFFSET_FREE_UNCACHED, PartitionHeader::LEN as u32)
            .poke_u32(at + PartitionHeader::OFFSET_FREE_CACHED, entry.size)
    }

    /// Writes a boot loader with a global partition described by `global`
    /// plus the partitions in `private`, all listed in the partition table.
    pub fn partitioned(
        &mut self,
        global: &PartitionTableEntry,
        private: &[PartitionTableEntry],
    ) -> &mut Self {
        let mut entries = vec![*global];
        entries.extend_from_slice(private);
        self.header(GLOBAL_PART_VERSION).ptable(&entries);
        for entry in &entries {
            self.partition(entry);
        }
        self
    }

    /// Appends an uncached node for `item` holding `len` bytes of `fill` to
    /// the partition of `entry`, as a remote processor would. Returns the
    /// offset of the node header within the image.
    pub fn uncached(
        &mut self,
        entry: &PartitionTableEntry,
        item: u16,
        len: u32,
        fill: u8,
    ) -> usize {
        self.uncached_padded(entry, item, len, 0, fill)
    }

    /// Like [`uncached`](Image::uncached), but leaves `padding_hdr` bytes
    /// between the node header and the data.
    pub fn uncached_padded(
        &mut self,
        entry: &PartitionTableEntry,
        item: u16,
        len: u32,
        padding_hdr: u16,
        fill: u8,
    ) -> usize {
        let base = entry.offset as usize;
        let end = self.peek_u32(base + PartitionHeader::OFFSET_FREE_UNCACHED);
        let size = align_to(len, 8).unwrap_or(len);
        let at = base + end as usize;
        self.private_entry(at, item, size, (size - len) as u16, padding_hdr);
        self.fill(at + PrivateEntry::LEN + usize::from(padding_hdr), len as usize, fill);
        self.poke_u32(
            base + PartitionHeader::OFFSET_FREE_UNCACHED,
            end + PrivateEntry::LEN as u32 + u32::from(padding_hdr) + size,
        );
        at
    }

    /// Appends a cached node for `item` holding `len` bytes of `fill` to the
    /// partition of `entry`. Returns the offset of the node header within the
    /// image.
    ///
    /// # Panics
    ///
    /// If the cacheline of `entry` is not a power of two.
    pub fn cached(&mut self, entry: &PartitionTableEntry, item: u16, len: u32, fill: u8) -> usize {
        let base = entry.offset as usize;
        let stride = Self::stride(entry);
        let end = self.peek_u32(base + PartitionHeader::OFFSET_FREE_CACHED);
        let size = align_to(len, 8).unwrap_or(len);
        let hdr = if end == entry.size { entry.size - stride } else { end - stride };
        let data = hdr - size;
        self.private_entry(base + hdr as usize, item, size, (size - len) as u16, 0);
        self.fill(base + data as usize, len as usize, fill);
        self.poke_u32(base + PartitionHeader::OFFSET_FREE_CACHED, data);
        base + hdr as usize
    }

    /// Returns the distance between a cached node header and the previous
    /// node in the partition of `entry`.
    pub fn stride(entry: &PartitionTableEntry) -> u32 {
        align_to(PrivateEntry::LEN as u32, entry.cacheline)
            .expect("cacheline is not a power of two")
    }

    fn private_entry(
        &mut self,
        at: usize,
        item: u16,
        size: u32,
        padding_data: u16,
        padding_hdr: u16,
    ) {
        self.poke_u16(at + PrivateEntry::CANARY, PRIVATE_CANARY)
            .poke_u16(at + PrivateEntry::ITEM, item)
            .poke_u32(at + PrivateEntry::SIZE, size)
            .poke_u16(at + PrivateEntry::PADDING_DATA, padding_data)
            .poke_u16(at + PrivateEntry::PADDING_HDR, padding_hdr);
    }

    fn fill(&mut self, at: usize, len: usize, byte: u8) {
        self.check(at, len);
        for i in 0..len {
            unsafe { ptr::write_volatile(self.base.as_ptr().add(at + i), byte) };
        }
    }

    /// Overwrites bytes at `offset`.
    pub fn poke_bytes(&mut self, offset: usize, bytes: &[u8]) -> &mut Self {
        self.check(offset, bytes.len());
        for (i, byte) in bytes.iter().enumerate() {
            unsafe { ptr::write_volatile(self.base.as_ptr().add(offset + i), *byte) };
        }
        self
    }

    /// Overwrites a little-endian `u16` at `offset`.
    pub fn poke_u16(&mut self, offset: usize, value: u16) -> &mut Self {
        self.poke_bytes(offset, &value.to_le_bytes())
    }

    /// Overwrites a little-endian `u32` at `offset`.
    pub fn poke_u32(&mut self, offset: usize, value: u32) -> &mut Self {
        self.poke_bytes(offset, &value.to_le_bytes())
    }

    /// Reads a byte at `offset`.
    pub fn peek_u8(&self, offset: usize) -> u8 {
        self.check(offset, 1);
        unsafe { ptr::read_volatile(self.base.as_ptr().add(offset)) }
    }

    /// Reads a little-endian `u32` at `offset`.
    pub fn peek_u32(&self, offset: usize) -> u32 {
        let mut bytes = [0; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.peek_u8(offset + i);
        }
        u32::from_le_bytes(bytes)
    }

    fn check(&self, offset: usize, len: usize) {
        assert!(
            offset.checked_add(len).map_or(false, |end| end <= self.size),
            "access {offset:#x}+{len:#x} out of the image"
        );
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image").field("base", &self.base).field("size", &self.size).finish()
    }
}

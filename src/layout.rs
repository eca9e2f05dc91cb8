//! Binary layout of the shared memory structures.
//!
//! The region is written by the boot loader and by remote processors, so the
//! layout is fixed: every field is little-endian at a fixed byte offset. Each
//! structure below has a decoded form with a `read` constructor, the offsets
//! of its fields as associated constants, and its encoded length as `LEN`.
//! All decoding and encoding goes through [`Region`] accessors, which reject
//! out-of-range offsets.
//!
//! ```text
//! region 0
//! +---------------------------+ 0
//! | GlobalHeader              |
//! |   version[32]             |
//! |   initialized, free, ...  |
//! |   toc[512] GlobalEntry    |
//! +---------------------------+ GlobalHeader::LEN
//! | ... flat heap items ...   |
//! | PartitionHeader           | <- PartitionTableEntry::offset
//! |   uncached: hdr,data ->   |
//! |   free gap                |
//! |   <- cached: data,hdr     |
//! +---------------------------+
//! | PartitionTable            | region0.size - 4096
//! |   entries, InfoBlock      |
//! +---------------------------+ region0.size
//! ```

use crate::{region::Region, Error};

/// Index of the boot loader version in [`GlobalHeader::VERSION`].
pub const SBL_VERSION_INDEX: usize = 7;

/// Boot loader major version of the legacy flat global heap.
pub const GLOBAL_HEAP_VERSION: u32 = 11;

/// Boot loader major version of the partitioned global heap.
pub const GLOBAL_PART_VERSION: u32 = 12;

/// Items below this number are only allocated by the boot loader.
pub const ITEM_LAST_FIXED: u16 = 8;

/// Default highest accepted item number, and the size of the flat heap table
/// of contents.
pub const ITEM_COUNT: u32 = 512;

/// Host identifier of the application processor.
pub const HOST_APPS: u16 = 0;

/// Pseudo-host identifier of the global partition.
pub const GLOBAL_HOST: u16 = 0xfffe;

/// Upper bound of processor identifiers in a system.
pub const HOST_COUNT: usize = 13;

/// Distance of the partition table from the end of region 0.
pub const PTABLE_OFFSET_FROM_END: usize = 4096;

/// Magic of the partition table.
pub const PTABLE_MAGIC: [u8; 4] = *b"$TOC";

/// Magic of a partition header.
pub const PART_MAGIC: [u8; 4] = *b"$PRT";

/// Magic of the info block.
pub const INFO_MAGIC: [u8; 4] = *b"SIII";

/// Canary of every private heap entry.
pub const PRIVATE_CANARY: u16 = 0xa5a5;

/// Reserved bits of [`GlobalEntry::aux_base`].
pub const AUX_BASE_MASK: u32 = 0xffff_fffc;

/// Rounds `value` up to the multiple of 8.
///
/// Returns `None` on overflow.
#[inline]
pub const fn align8(value: u32) -> Option<u32> {
    align_to(value, 8)
}

/// Rounds `value` up to the multiple of `align`, which must be a power of two.
///
/// Returns `None` on overflow or if `align` is not a power of two.
#[inline]
pub const fn align_to(value: u32, align: u32) -> Option<u32> {
    if !align.is_power_of_two() {
        return None;
    }
    match value.checked_add(align - 1) {
        Some(value) => Some(value & !(align - 1)),
        None => None,
    }
}

/// Table of contents at the start of region 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlobalHeader {
    /// Boot loader version word, see [`SBL_VERSION_INDEX`].
    pub sbl_version: u32,
    /// Must be 1 once the boot loader has set the heap up.
    pub initialized: u32,
    /// Offset of the first unallocated byte of the flat heap.
    pub free_offset: u32,
    /// Number of bytes left in the flat heap.
    pub available: u32,
    /// Must be 0.
    pub reserved: u32,
}

impl GlobalHeader {
    /// Offset of the legacy `proc_comm` array, ignored by this crate.
    pub const PROC_COMM: usize = 0;
    /// Offset of the `version[32]` array.
    pub const VERSION: usize = 64;
    /// Offset of the `initialized` field.
    pub const INITIALIZED: usize = 192;
    /// Offset of the `free_offset` field.
    pub const FREE_OFFSET: usize = 196;
    /// Offset of the `available` field.
    pub const AVAILABLE: usize = 200;
    /// Offset of the `reserved` field.
    pub const RESERVED: usize = 204;
    /// Offset of the `toc[512]` array of [`GlobalEntry`].
    pub const TOC: usize = 208;
    /// Encoded length.
    pub const LEN: usize = Self::TOC + ITEM_COUNT as usize * GlobalEntry::LEN;

    /// Decodes the header from the start of `region`.
    pub fn read(region: &Region) -> Result<Self, Error> {
        Ok(Self {
            sbl_version: region.load_u32(Self::VERSION + SBL_VERSION_INDEX * 4)?,
            initialized: region.load_u32(Self::INITIALIZED)?,
            free_offset: region.load_u32(Self::FREE_OFFSET)?,
            available: region.load_u32(Self::AVAILABLE)?,
            reserved: region.load_u32(Self::RESERVED)?,
        })
    }

    /// Returns the offset of the table of contents slot for `item`.
    pub fn toc_entry(item: u16) -> Result<usize, Error> {
        if u32::from(item) < ITEM_COUNT {
            Ok(Self::TOC + usize::from(item) * GlobalEntry::LEN)
        } else {
            Err(Error::InvalidArgument)
        }
    }
}

/// Flat heap table of contents slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlobalEntry {
    /// Non-zero once the item is allocated. Never cleared.
    pub allocated: u32,
    /// Offset of the item from the start of its region.
    pub offset: u32,
    /// Size of the item, 8-byte aligned.
    pub size: u32,
    /// Tag of the region holding the item, or 0 for region 0.
    pub aux_base: u32,
}

impl GlobalEntry {
    /// Offset of the `allocated` field.
    pub const ALLOCATED: usize = 0;
    /// Offset of the `offset` field.
    pub const OFFSET: usize = 4;
    /// Offset of the `size` field.
    pub const SIZE: usize = 8;
    /// Offset of the `aux_base` field.
    pub const AUX_BASE: usize = 12;
    /// Encoded length.
    pub const LEN: usize = 16;

    /// Decodes the entry at offset `at` of `region`.
    pub fn read(region: &Region, at: usize) -> Result<Self, Error> {
        Ok(Self {
            allocated: region.load_u32(at + Self::ALLOCATED)?,
            offset: region.load_u32(at + Self::OFFSET)?,
            size: region.load_u32(at + Self::SIZE)?,
            aux_base: region.load_u32(at + Self::AUX_BASE)?,
        })
    }

    /// Returns the region tag with the reserved bits cleared.
    #[inline]
    pub fn region_tag(&self) -> u32 {
        self.aux_base & AUX_BASE_MASK
    }
}

/// Partition table header, found [`PTABLE_OFFSET_FROM_END`] bytes before the
/// end of region 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionTableHeader {
    /// Must be [`PTABLE_MAGIC`].
    pub magic: [u8; 4],
    /// Must be 1.
    pub version: u32,
    /// Number of [`PartitionTableEntry`] following the header.
    pub num_entries: u32,
}

impl PartitionTableHeader {
    /// Offset of the `magic` field.
    pub const MAGIC: usize = 0;
    /// Offset of the `version` field.
    pub const VERSION: usize = 4;
    /// Offset of the `num_entries` field.
    pub const NUM_ENTRIES: usize = 8;
    /// Encoded length, the entries start right after it.
    pub const LEN: usize = 32;

    /// Decodes the header at offset `at` of `region`.
    pub fn read(region: &Region, at: usize) -> Result<Self, Error> {
        Ok(Self {
            magic: region.load_array(at + Self::MAGIC)?,
            version: region.load_u32(at + Self::VERSION)?,
            num_entries: region.load_u32(at + Self::NUM_ENTRIES)?,
        })
    }
}

/// Partition table entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartitionTableEntry {
    /// Offset of the partition within region 0. Zero means unused.
    pub offset: u32,
    /// Size of the partition. Zero means unused.
    pub size: u32,
    /// Partition flags, currently unused.
    pub flags: u32,
    /// First host with access to the partition.
    pub host0: u16,
    /// Second host with access to the partition.
    pub host1: u16,
    /// Alignment of cached entry headers.
    pub cacheline: u32,
}

impl PartitionTableEntry {
    /// Offset of the `offset` field.
    pub const OFFSET: usize = 0;
    /// Offset of the `size` field.
    pub const SIZE: usize = 4;
    /// Offset of the `flags` field.
    pub const FLAGS: usize = 8;
    /// Offset of the `host0` field.
    pub const HOST0: usize = 12;
    /// Offset of the `host1` field.
    pub const HOST1: usize = 14;
    /// Offset of the `cacheline` field.
    pub const CACHELINE: usize = 16;
    /// Encoded length.
    pub const LEN: usize = 48;

    /// Decodes the entry at offset `at` of `region`.
    pub fn read(region: &Region, at: usize) -> Result<Self, Error> {
        Ok(Self {
            offset: region.load_u32(at + Self::OFFSET)?,
            size: region.load_u32(at + Self::SIZE)?,
            flags: region.load_u32(at + Self::FLAGS)?,
            host0: region.load_u16(at + Self::HOST0)?,
            host1: region.load_u16(at + Self::HOST1)?,
            cacheline: region.load_u32(at + Self::CACHELINE)?,
        })
    }

    /// Returns `true` if the entry describes a partition.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.offset != 0 && self.size != 0
    }
}

/// Header at the start of every partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionHeader {
    /// Must be [`PART_MAGIC`].
    pub magic: [u8; 4],
    /// First host with access to the partition.
    pub host0: u16,
    /// Second host with access to the partition.
    pub host1: u16,
    /// Size of the partition.
    pub size: u32,
    /// End of the uncached list, from the start of the partition.
    pub offset_free_uncached: u32,
    /// End of the cached list, from the start of the partition.
    pub offset_free_cached: u32,
}

impl PartitionHeader {
    /// Offset of the `magic` field.
    pub const MAGIC: usize = 0;
    /// Offset of the `host0` field.
    pub const HOST0: usize = 4;
    /// Offset of the `host1` field.
    pub const HOST1: usize = 6;
    /// Offset of the `size` field.
    pub const SIZE: usize = 8;
    /// Offset of the `offset_free_uncached` field.
    pub const OFFSET_FREE_UNCACHED: usize = 12;
    /// Offset of the `offset_free_cached` field.
    pub const OFFSET_FREE_CACHED: usize = 16;
    /// Encoded length, the first uncached entry starts right after it.
    pub const LEN: usize = 32;

    /// Decodes the header at offset `at` of `region`.
    pub fn read(region: &Region, at: usize) -> Result<Self, Error> {
        Ok(Self {
            magic: region.load_array(at + Self::MAGIC)?,
            host0: region.load_u16(at + Self::HOST0)?,
            host1: region.load_u16(at + Self::HOST1)?,
            size: region.load_u32(at + Self::SIZE)?,
            offset_free_uncached: region.load_u32(at + Self::OFFSET_FREE_UNCACHED)?,
            offset_free_cached: region.load_u32(at + Self::OFFSET_FREE_CACHED)?,
        })
    }
}

/// Header of an item in a private heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrivateEntry {
    /// Must be [`PRIVATE_CANARY`].
    pub canary: u16,
    /// Item number.
    pub item: u16,
    /// Size of the data, including padding.
    pub size: u32,
    /// Padding bytes at the end of the data.
    pub padding_data: u16,
    /// Padding bytes between the header and the data.
    pub padding_hdr: u16,
}

impl PrivateEntry {
    /// Offset of the `canary` field.
    pub const CANARY: usize = 0;
    /// Offset of the `item` field.
    pub const ITEM: usize = 2;
    /// Offset of the `size` field.
    pub const SIZE: usize = 4;
    /// Offset of the `padding_data` field.
    pub const PADDING_DATA: usize = 8;
    /// Offset of the `padding_hdr` field.
    pub const PADDING_HDR: usize = 10;
    /// Encoded length.
    pub const LEN: usize = 16;

    /// Decodes the entry at offset `at` of `region`.
    pub fn read(region: &Region, at: usize) -> Result<Self, Error> {
        Ok(Self {
            canary: region.load_u16(at + Self::CANARY)?,
            item: region.load_u16(at + Self::ITEM)?,
            size: region.load_u32(at + Self::SIZE)?,
            padding_data: region.load_u16(at + Self::PADDING_DATA)?,
            padding_hdr: region.load_u16(at + Self::PADDING_HDR)?,
        })
    }

    /// Returns the length of the item data without the trailing padding.
    ///
    /// The entry is rejected if it claims to be as large as the partition or
    /// if its padding swallows the whole data.
    pub fn data_len(&self, partition_size: u32) -> Result<u32, Error> {
        if self.size < partition_size && u32::from(self.padding_data) < self.size {
            Ok(self.size - u32::from(self.padding_data))
        } else {
            Err(Error::InvalidFormat)
        }
    }
}

/// Optional block following the last partition table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InfoBlock {
    /// Must be [`INFO_MAGIC`].
    pub magic: [u8; 4],
    /// Declared size of the SMEM region.
    pub size: u32,
    /// Declared base address of the SMEM region.
    pub base_addr: u32,
    /// Highest accepted item number.
    pub num_items: u16,
}

impl InfoBlock {
    /// Offset of the `magic` field.
    pub const MAGIC: usize = 0;
    /// Offset of the `size` field.
    pub const SIZE: usize = 4;
    /// Offset of the `base_addr` field.
    pub const BASE_ADDR: usize = 8;
    /// Offset of the `num_items` field.
    pub const NUM_ITEMS: usize = 16;
    /// Encoded length.
    pub const LEN: usize = 18;

    /// Decodes the block at offset `at` of `region`.
    pub fn read(region: &Region, at: usize) -> Result<Self, Error> {
        Ok(Self {
            magic: region.load_array(at + Self::MAGIC)?,
            size: region.load_u32(at + Self::SIZE)?,
            base_addr: region.load_u32(at + Self::BASE_ADDR)?,
            num_items: region.load_u16(at + Self::NUM_ITEMS)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment() {
        assert_eq!(align8(0), Some(0));
        assert_eq!(align8(1), Some(8));
        assert_eq!(align8(100), Some(104));
        assert_eq!(align8(104), Some(104));
        assert_eq!(align8(u32::MAX), None);
        assert_eq!(align_to(16, 64), Some(64));
        assert_eq!(align_to(16, 0), None);
        assert_eq!(align_to(16, 24), None);
    }

    #[test]
    fn header_fits_toc() {
        assert_eq!(GlobalHeader::LEN, 8400);
        assert_eq!(GlobalHeader::toc_entry(9), Ok(208 + 9 * 16));
        assert_eq!(GlobalHeader::toc_entry(512), Err(Error::InvalidArgument));
    }

    #[test]
    fn magics_match_wire_bytes() {
        assert_eq!(PTABLE_MAGIC, [0x24, 0x54, 0x4f, 0x43]);
        assert_eq!(PART_MAGIC, [0x24, 0x50, 0x52, 0x54]);
        assert_eq!(INFO_MAGIC, [0x53, 0x49, 0x49, 0x49]);
    }

    #[test]
    fn private_entry_data_len() {
        let entry = PrivateEntry {
            canary: PRIVATE_CANARY,
            item: 9,
            size: 104,
            padding_data: 4,
            padding_hdr: 0,
        };
        assert_eq!(entry.data_len(4096), Ok(100));
        assert_eq!(entry.data_len(104), Err(Error::InvalidFormat));
        let swallowed = PrivateEntry { padding_data: 104, ..entry };
        assert_eq!(swallowed.data_len(4096), Err(Error::InvalidFormat));
    }
}

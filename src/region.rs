//! Mapped shared memory regions.
//!
//! A [`Region`] is a bounds-checked view of one mapped chunk of shared memory.
//! The memory is concurrently written by other processors, so every access is
//! volatile, goes through an accessor that rejects out-of-range offsets, and
//! decodes little-endian explicitly.

use crate::Error;
use core::{fmt, iter, ptr, ptr::NonNull};

/// Maximum number of regions: the main SMEM region and the RPM message RAM.
pub const MAX_REGIONS: usize = 2;

/// Descriptor of a memory region as provided by the platform configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionDesc {
    /// Identifier matched against [`GlobalEntry::aux_base`].
    ///
    /// [`GlobalEntry::aux_base`]: crate::layout::GlobalEntry::aux_base
    pub tag: u32,
    /// Physical base address.
    pub phys: u64,
    /// Size in bytes.
    pub size: usize,
}

impl RegionDesc {
    /// Creates a descriptor tagged by the low 32 bits of its physical base.
    #[inline]
    pub const fn new(phys: u64, size: usize) -> Self {
        Self { tag: phys as u32, phys, size }
    }
}

/// A mapped shared memory region.
pub struct Region {
    tag: u32,
    phys: u64,
    virt: NonNull<u8>,
    size: usize,
}

// Safety: the region is shared memory, all accesses are volatile.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Creates a region from a mapping of `desc` at `virt`.
    ///
    /// # Safety
    ///
    /// * `virt` must be valid for volatile reads and writes of `desc.size`
    ///   bytes for the whole lifetime of the region.
    /// * `desc.size` must not exceed `isize::MAX`.
    #[inline]
    pub unsafe fn from_raw_parts(desc: &RegionDesc, virt: NonNull<u8>) -> Self {
        Self { tag: desc.tag, phys: desc.phys, virt, size: desc.size }
    }

    /// Returns the region tag.
    #[inline]
    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// Returns the physical base address.
    #[inline]
    pub fn phys(&self) -> u64 {
        self.phys
    }

    /// Returns the size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the virtual base address.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.virt.as_ptr()
    }

    /// Returns the offset of `ptr` if it points inside the region.
    #[inline]
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        let base = self.virt.as_ptr() as usize;
        let addr = ptr as usize;
        (addr >= base && addr - base < self.size).then(|| addr - base)
    }

    /// Returns a pointer to `len` bytes at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<NonNull<[u8]>, Error> {
        let ptr = self.checked(offset, len)?;
        Ok(NonNull::slice_from_raw_parts(ptr, len))
    }

    /// Reads `N` bytes at `offset`.
    pub fn load_array<const N: usize>(&self, offset: usize) -> Result<[u8; N], Error> {
        let ptr = self.checked(offset, N)?;
        let mut bytes = [0; N];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = unsafe { ptr::read_volatile(ptr.as_ptr().add(i)) };
        }
        Ok(bytes)
    }

    /// Writes `bytes` at `offset`.
    pub fn store_bytes(&self, offset: usize, bytes: &[u8]) -> Result<(), Error> {
        let ptr = self.checked(offset, bytes.len())?;
        for (i, byte) in bytes.iter().enumerate() {
            unsafe { ptr::write_volatile(ptr.as_ptr().add(i), *byte) };
        }
        Ok(())
    }

    /// Reads a little-endian `u16` at `offset`.
    pub fn load_u16(&self, offset: usize) -> Result<u16, Error> {
        let ptr = self.checked(offset, 2)?;
        if is_aligned(ptr, 2) {
            Ok(u16::from_le(unsafe { ptr::read_volatile(ptr.as_ptr().cast::<u16>()) }))
        } else {
            self.load_array(offset).map(u16::from_le_bytes)
        }
    }

    /// Reads a little-endian `u32` at `offset`.
    ///
    /// An aligned field is read with a single access, so a concurrent update
    /// by a remote processor is never observed torn.
    pub fn load_u32(&self, offset: usize) -> Result<u32, Error> {
        let ptr = self.checked(offset, 4)?;
        if is_aligned(ptr, 4) {
            Ok(u32::from_le(unsafe { ptr::read_volatile(ptr.as_ptr().cast::<u32>()) }))
        } else {
            self.load_array(offset).map(u32::from_le_bytes)
        }
    }

    /// Writes a little-endian `u16` at `offset`.
    pub fn store_u16(&self, offset: usize, value: u16) -> Result<(), Error> {
        let ptr = self.checked(offset, 2)?;
        if is_aligned(ptr, 2) {
            unsafe { ptr::write_volatile(ptr.as_ptr().cast::<u16>(), value.to_le()) };
            Ok(())
        } else {
            self.store_bytes(offset, &value.to_le_bytes())
        }
    }

    /// Writes a little-endian `u32` at `offset`.
    ///
    /// An aligned field is written with a single access, which is what makes
    /// it usable as a commit marker.
    pub fn store_u32(&self, offset: usize, value: u32) -> Result<(), Error> {
        let ptr = self.checked(offset, 4)?;
        if is_aligned(ptr, 4) {
            unsafe { ptr::write_volatile(ptr.as_ptr().cast::<u32>(), value.to_le()) };
            Ok(())
        } else {
            self.store_bytes(offset, &value.to_le_bytes())
        }
    }

    fn checked(&self, offset: usize, len: usize) -> Result<NonNull<u8>, Error> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => {
                Ok(unsafe { NonNull::new_unchecked(self.virt.as_ptr().add(offset)) })
            }
            _ => Err(Error::InvalidFormat),
        }
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("tag", &format_args!("{:#x}", self.tag))
            .field("phys", &format_args!("{:#x}", self.phys))
            .field("virt", &self.virt)
            .field("size", &self.size)
            .finish()
    }
}

#[inline]
fn is_aligned(ptr: NonNull<u8>, align: usize) -> bool {
    ptr.as_ptr() as usize & (align - 1) == 0
}

/// Ordered set of the mapped regions. Region 0 is the main SMEM region.
#[derive(Debug)]
pub struct RegionMap {
    primary: Region,
    secondary: Option<Region>,
}

impl RegionMap {
    /// Creates a map holding only the main region.
    pub fn new(primary: Region) -> Self {
        Self { primary, secondary: None }
    }

    /// Appends a secondary region.
    ///
    /// Fails with [`Error::InvalidArgument`] if the map is full.
    pub fn push(&mut self, region: Region) -> Result<(), Error> {
        if self.secondary.is_some() {
            return Err(Error::InvalidArgument);
        }
        self.secondary = Some(region);
        Ok(())
    }

    /// Returns the main SMEM region.
    #[inline]
    pub fn primary(&self) -> &Region {
        &self.primary
    }

    /// Returns the number of mapped regions.
    #[inline]
    pub fn len(&self) -> usize {
        1 + usize::from(self.secondary.is_some())
    }

    /// Always `false`, there is at least the main region.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterates over the regions in order.
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        iter::once(&self.primary).chain(self.secondary.iter())
    }

    /// Finds the region holding a flat heap item tagged with `tag`. A zero tag
    /// means the first region.
    pub fn by_tag(&self, tag: u32) -> Option<&Region> {
        self.iter().find(|region| tag == 0 || region.tag() == tag)
    }

    /// Resolves `ptr` to its region and offset.
    pub fn resolve(&self, ptr: *const u8) -> Option<(&Region, usize)> {
        self.iter().find_map(|region| region.offset_of(ptr).map(|offset| (region, offset)))
    }

    /// Returns the physical address of `ptr`, or 0 if it is outside every
    /// region.
    pub fn to_physical(&self, ptr: *const u8) -> u64 {
        self.resolve(ptr).map_or(0, |(region, offset)| region.phys() + offset as u64)
    }
}

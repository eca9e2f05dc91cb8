//! The SMEM engine.

use crate::{
    config::{Config, Platform},
    heap::Heap,
    layout::{GlobalHeader, GLOBAL_HEAP_VERSION, GLOBAL_PART_VERSION, ITEM_COUNT, ITEM_LAST_FIXED},
    partition::PartitionIndex,
    ptable::PartitionTable,
    region::RegionMap,
    smem_dbg, smem_err,
    sync::{Clock, HwSpinlock, LockGuard},
    Error,
};
use core::{fmt, ptr::NonNull};

/// A probed SMEM instance.
///
/// Holds the mapped regions and the partition index along with the hardware
/// mutex. Dropping the engine releases the mutex back to the platform.
///
/// Only [`alloc`](Smem::alloc) and [`get`](Smem::get) take the hardware
/// mutex. [`free_space`](Smem::free_space) and
/// [`virt_to_phys`](Smem::virt_to_phys) run without it, so a remote
/// processor may move the list ends while they read.
pub struct Smem<L: HwSpinlock, C: Clock> {
    config: Config,
    regions: RegionMap,
    index: PartitionIndex,
    item_count: u32,
    lock: L,
    clock: C,
}

impl<L: HwSpinlock, C: Clock> Smem<L, C> {
    /// Brings SMEM up.
    ///
    /// Maps the configured regions, validates the global header, builds the
    /// partition index, and requests the hardware mutex. Any malformed active
    /// partition aborts the whole bring-up.
    pub fn probe<P>(config: &Config, platform: &mut P) -> Result<Self, Error>
    where
        P: Platform<Lock = L, Clock = C>,
    {
        config.validate()?;
        let mut mapped = config.regions().map(|desc| {
            platform.map(desc).ok_or_else(|| {
                smem_err!("failed to map region {:#x}+{:#x}", desc.phys, desc.size);
                Error::MapFailed
            })
        });
        let primary = mapped.next().ok_or(Error::InvalidArgument)??;
        let mut regions = RegionMap::new(primary);
        for region in mapped {
            regions.push(region?)?;
        }
        let (index, item_count) = parse(&regions, config.local_host)?;
        let lock = platform.request_lock(config.hwlock_id).ok_or_else(|| {
            smem_err!("failed to retrieve hwlock {}", config.hwlock_id);
            Error::LockUnavailable
        })?;
        let clock = platform.clock();
        let smem = Self { config: *config, regions, index, item_count, lock, clock };
        if let Err(err) = platform.ready(&smem) {
            smem_dbg!("failed to register socinfo device: {}", err);
        }
        Ok(smem)
    }

    /// Allocates `size` bytes for `item` in the heap serving `host`.
    ///
    /// Items below 8 belong to the boot loader and are rejected with
    /// [`Error::InvalidArgument`], as is a zero `size`.
    pub fn alloc(&self, host: Option<u16>, item: u32, size: usize) -> Result<(), Error> {
        if item < u32::from(ITEM_LAST_FIXED) {
            smem_err!("rejecting allocation of static entry {}", item);
            return Err(Error::InvalidArgument);
        }
        let item = self.checked_item(item)?;
        if size == 0 {
            return Err(Error::InvalidArgument);
        }
        let size = u32::try_from(size).map_err(|_| Error::OutOfSpace)?;
        let _guard = self.lock()?;
        self.heap(host).alloc(item, size)
    }

    /// Looks `item` up in the heap serving `host`.
    ///
    /// The returned memory is shared with the remote processors. It stays
    /// mapped until the engine is dropped.
    pub fn get(&self, host: Option<u16>, item: u32) -> Result<NonNull<[u8]>, Error> {
        let item = self.checked_item(item)?;
        let _guard = self.lock()?;
        self.heap(host).get(item)
    }

    /// Returns the number of free bytes in the heap serving `host`.
    ///
    /// Clients poll this to learn about new allocations, so the hardware mutex
    /// is not taken.
    pub fn free_space(&self, host: Option<u16>) -> Result<usize, Error> {
        self.heap(host).free_space().map(|free| free as usize)
    }

    /// Returns the physical address of `ptr`, or 0 if it is outside every
    /// mapped region.
    #[inline]
    pub fn virt_to_phys(&self, ptr: *const u8) -> u64 {
        self.regions.to_physical(ptr)
    }

    /// Returns the highest accepted item number.
    #[inline]
    pub fn item_count(&self) -> u32 {
        self.item_count
    }

    /// Returns the configuration the engine was probed with.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the mapped regions.
    #[inline]
    pub fn regions(&self) -> &RegionMap {
        &self.regions
    }

    /// Returns the partition index.
    #[inline]
    pub fn partitions(&self) -> &PartitionIndex {
        &self.index
    }

    /// Tears the engine down, returning its configuration.
    pub fn remove(self) -> Config {
        self.config
    }

    fn checked_item(&self, item: u32) -> Result<u16, Error> {
        if item >= self.item_count {
            smem_dbg!("item {} out of range ({})", item, self.item_count);
            return Err(Error::InvalidArgument);
        }
        u16::try_from(item).map_err(|_| Error::InvalidArgument)
    }

    fn lock(&self) -> Result<LockGuard<'_, L>, Error> {
        LockGuard::acquire(&self.lock, &self.clock, self.config.lock_timeout_ms)
    }

    fn heap(&self, host: Option<u16>) -> Heap<'_> {
        Heap::select(&self.regions, &self.index, host)
    }
}

impl<L: HwSpinlock, C: Clock> fmt::Debug for Smem<L, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Smem")
            .field("config", &self.config)
            .field("regions", &self.regions)
            .field("index", &self.index)
            .field("item_count", &self.item_count)
            .finish_non_exhaustive()
    }
}

/// Validates the global header of region 0 and indexes the partitions.
/// Returns the index and the highest accepted item number.
fn parse(regions: &RegionMap, local_host: u16) -> Result<(PartitionIndex, u32), Error> {
    let region0 = regions.primary();
    let header = GlobalHeader::read(region0)?;
    if header.initialized != 1 || header.reserved != 0 {
        smem_err!("SMEM is not initialized by SBL");
        return Err(Error::InvalidFormat);
    }
    let mut index = PartitionIndex::new();
    let item_count = match header.sbl_version >> 16 {
        GLOBAL_PART_VERSION => {
            let table = PartitionTable::locate(region0)?;
            index.select_global_partition(&table)?;
            table.item_count()
        }
        GLOBAL_HEAP_VERSION => ITEM_COUNT,
        _ => {
            smem_err!("unsupported SMEM version {:#x}", header.sbl_version);
            return Err(Error::Unsupported);
        }
    };
    match PartitionTable::locate(region0) {
        Ok(table) => index.enumerate(&table, local_host)?,
        Err(Error::NotFound) => {}
        Err(err) => return Err(err),
    }
    Ok((index, item_count))
}

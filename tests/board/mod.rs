#![allow(dead_code)]

use drone_smem::{
    image::Image,
    layout::{PartitionTableEntry, GLOBAL_HOST, HOST_APPS},
    Clock, Config, Error, Platform, Region, RegionDesc, Smem, SoftSpinlock,
};
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering::SeqCst},
    Arc,
};

pub const SMEM_PHYS: u64 = 0x8690_0000;
pub const SMEM_SIZE: usize = 0x10000;
pub const RPM_PHYS: u64 = 0x0006_0000;
pub const RPM_SIZE: usize = 0x1000;
pub const HWLOCK_ID: u32 = 3;

pub const GLOBAL: PartitionTableEntry = PartitionTableEntry {
    offset: 0x3000,
    size: 0x2000,
    flags: 0,
    host0: GLOBAL_HOST,
    host1: GLOBAL_HOST,
    cacheline: 64,
};

pub const MODEM: PartitionTableEntry = PartitionTableEntry {
    offset: 0x5000,
    size: 0x1000,
    flags: 0,
    host0: HOST_APPS,
    host1: 1,
    cacheline: 64,
};

pub const ADSP: PartitionTableEntry = PartitionTableEntry {
    offset: 0x6000,
    size: 0x1000,
    flags: 0,
    host0: 2,
    host1: HOST_APPS,
    cacheline: 128,
};

pub type TestSmem = Smem<&'static SoftSpinlock, TickClock>;

/// Advances by one millisecond on every reading.
#[derive(Clone, Debug, Default)]
pub struct TickClock(Arc<AtomicU64>);

impl Clock for TickClock {
    fn now_ms(&self) -> u64 {
        self.0.fetch_add(1, SeqCst)
    }
}

/// A simulated SoC with the SMEM region and the RPM message RAM.
pub struct Board {
    pub smem: Image,
    pub rpm: Image,
    pub lock: &'static SoftSpinlock,
    pub clock: TickClock,
    pub fail_map: bool,
    pub no_lock: bool,
    pub fail_ready: bool,
    pub ready_calls: Arc<AtomicUsize>,
}

impl Board {
    pub fn new(smem: Image) -> Self {
        Self {
            smem,
            rpm: Image::new(RPM_SIZE),
            lock: Box::leak(Box::new(SoftSpinlock::new())),
            clock: TickClock::default(),
            fail_map: false,
            no_lock: false,
            fail_ready: false,
            ready_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn probe(&mut self) -> Result<TestSmem, Error> {
        Smem::probe(&config(), self)
    }

    /// Offset of `ptr` from the start of the SMEM image.
    pub fn offset_of(&self, ptr: *const u8) -> usize {
        ptr as usize - self.smem.ptr_at(0) as usize
    }
}

impl Platform for Board {
    type Lock = &'static SoftSpinlock;
    type Clock = TickClock;

    fn map(&mut self, desc: &RegionDesc) -> Option<Region> {
        if self.fail_map {
            return None;
        }
        match desc.phys {
            SMEM_PHYS => Some(self.smem.region_with(desc)),
            RPM_PHYS => Some(self.rpm.region_with(desc)),
            _ => None,
        }
    }

    fn request_lock(&mut self, id: u32) -> Option<Self::Lock> {
        (id == HWLOCK_ID && !self.no_lock).then_some(self.lock)
    }

    fn clock(&mut self) -> Self::Clock {
        self.clock.clone()
    }

    fn ready(&mut self, smem: &TestSmem) -> Result<(), Error> {
        assert!(smem.item_count() > 0);
        self.ready_calls.fetch_add(1, SeqCst);
        if self.fail_ready { Err(Error::NotFound) } else { Ok(()) }
    }
}

pub fn config() -> Config {
    Config::new(RegionDesc::new(SMEM_PHYS, SMEM_SIZE))
        .rpm_msg_ram(RegionDesc::new(RPM_PHYS, RPM_SIZE))
        .hwlock(HWLOCK_ID)
}

/// An image with a legacy flat heap holding `available` bytes.
pub fn flat_image(available: u32) -> Image {
    let mut image = Image::new(SMEM_SIZE);
    image
        .header(drone_smem::layout::GLOBAL_HEAP_VERSION)
        .flat_heap(drone_smem::layout::GlobalHeader::LEN as u32, available);
    image
}

/// An image with the global partition and the partitions shared with the
/// modem and the ADSP.
pub fn partitioned_image() -> Image {
    let mut image = Image::new(SMEM_SIZE);
    image.partitioned(&GLOBAL, &[MODEM, ADSP]);
    image
}

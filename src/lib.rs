//! Shared memory item heap for multi-processor SoCs.
//!
//! Qualcomm SoCs let the application processor, the modem, the DSPs and the
//! RPM exchange small fixed-purpose items through a shared memory region
//! (SMEM) laid out by the secondary boot loader. Each item is identified by a
//! number, allocated once and never freed. This crate parses the region,
//! allocates and looks items up, and serializes with the remote processors
//! through a hardware mutex.
//!
//! The region is written by parties outside of our control and is treated as
//! untrusted input: every structure is decoded through bounds-checked
//! accessors and every heap walk validates each step. A malformed structure
//! fails the current operation with [`Error::InvalidFormat`].
//!
//! # Usage
//!
//! Implement [`Platform`] to map the regions and hand out the hardware mutex,
//! then probe the engine into a process-wide [`SmemCell`]:
//!
//! ```
//! use drone_smem::{
//!     image::Image, layout::GLOBAL_HEAP_VERSION, Config, Platform, Region, RegionDesc,
//!     SmemCell, SoftSpinlock, StdClock,
//! };
//!
//! struct Board(Image);
//!
//! impl Platform for Board {
//!     type Lock = SoftSpinlock;
//!     type Clock = StdClock;
//!
//!     fn map(&mut self, desc: &RegionDesc) -> Option<Region> {
//!         Some(self.0.region_with(desc))
//!     }
//!
//!     fn request_lock(&mut self, _id: u32) -> Option<SoftSpinlock> {
//!         Some(SoftSpinlock::new())
//!     }
//!
//!     fn clock(&mut self) -> StdClock {
//!         StdClock::new()
//!     }
//! }
//!
//! static SMEM: SmemCell<SoftSpinlock, StdClock> = SmemCell::new();
//!
//! let mut image = Image::new(0x10000);
//! image.header(GLOBAL_HEAP_VERSION);
//! let config = Config::new(RegionDesc::new(0x8690_0000, 0x10000)).hwlock(3);
//! SMEM.probe(&config, &mut Board(image))?;
//!
//! SMEM.alloc(None, 9, 100)?;
//! let item = SMEM.get(None, 9)?;
//! assert_eq!(item.len(), 104);
//! assert_ne!(SMEM.virt_to_phys(item.as_ptr() as *const u8), 0);
//! # Ok::<(), drone_smem::Error>(())
//! ```
//!
//! # Features
//!
//! * `host` (default): build against `std`, add [`StdClock`] and the
//!   [`image`] builder, and send error logs to the process standard error.
//! * `debug-log`: emit debug diagnostics to the log stream #0.

#![warn(missing_docs)]
#![cfg_attr(not(any(feature = "host", test)), no_std)]

#[macro_use]
mod atomic_macros;

pub mod config;
pub mod heap;
#[cfg(any(test, feature = "host"))]
pub mod image;
pub mod layout;
pub mod log;
pub mod partition;
pub mod ptable;
pub mod region;
pub mod sync;

mod cell;
mod error;
mod smem;

pub use self::{
    cell::SmemCell,
    config::{Config, Platform},
    error::Error,
    region::{Region, RegionDesc, RegionMap},
    smem::Smem,
    sync::{Clock, HwSpinlock, SoftSpinlock},
};

#[cfg(feature = "host")]
pub use self::sync::StdClock;

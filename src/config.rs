//! Bring-up configuration and platform collaborators.

use crate::{
    layout::{GlobalHeader, HOST_APPS, HOST_COUNT},
    region::{Region, RegionDesc},
    sync::{Clock, HwSpinlock, HWSPINLOCK_TIMEOUT_MS},
    Error, Smem,
};

/// SMEM bring-up configuration, normally taken from the device tree.
///
/// # Examples
///
/// ```
/// use drone_smem::{Config, RegionDesc};
///
/// const CONFIG: Config = Config::new(RegionDesc::new(0x8690_0000, 0x20_0000))
///     .rpm_msg_ram(RegionDesc::new(0x0006_0000, 0x6000))
///     .hwlock(3);
/// assert!(CONFIG.validate().is_ok());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// The main SMEM region.
    pub region: RegionDesc,
    /// The optional RPM message RAM holding flat heap items.
    pub rpm_msg_ram: Option<RegionDesc>,
    /// Identifier of the hardware mutex.
    pub hwlock_id: u32,
    /// Host identifier of the local processor.
    pub local_host: u16,
    /// Time to wait for the hardware mutex, in milliseconds.
    pub lock_timeout_ms: u64,
}

impl Config {
    /// Creates a configuration for the main region `region`, with the
    /// application processor as the local host.
    pub const fn new(region: RegionDesc) -> Self {
        Self {
            region,
            rpm_msg_ram: None,
            hwlock_id: 0,
            local_host: HOST_APPS,
            lock_timeout_ms: HWSPINLOCK_TIMEOUT_MS,
        }
    }

    /// Adds the RPM message RAM region.
    pub const fn rpm_msg_ram(self, desc: RegionDesc) -> Self {
        Self { rpm_msg_ram: Some(desc), ..self }
    }

    /// Sets the hardware mutex identifier.
    pub const fn hwlock(self, id: u32) -> Self {
        Self { hwlock_id: id, ..self }
    }

    /// Sets the local host identifier.
    pub const fn local_host(self, host: u16) -> Self {
        Self { local_host: host, ..self }
    }

    /// Sets the hardware mutex timeout.
    pub const fn lock_timeout_ms(self, timeout_ms: u64) -> Self {
        Self { lock_timeout_ms: timeout_ms, ..self }
    }

    /// Checks the configuration before any region is mapped.
    ///
    /// Fails with [`Error::InvalidArgument`] if the main region can't hold the
    /// global header or the local host is out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.region.size < GlobalHeader::LEN {
            return Err(Error::InvalidArgument);
        }
        if usize::from(self.local_host) >= HOST_COUNT {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    /// Iterates over the configured regions in mapping order.
    pub fn regions(&self) -> impl Iterator<Item = &RegionDesc> {
        core::iter::once(&self.region).chain(self.rpm_msg_ram.iter())
    }
}

/// Services the engine consumes from the platform.
pub trait Platform {
    /// Hardware mutex handle.
    type Lock: HwSpinlock;
    /// Clock bounding the hardware mutex wait.
    type Clock: Clock;

    /// Maps the region described by `desc`. Returns `None` on failure.
    fn map(&mut self, desc: &RegionDesc) -> Option<Region>;

    /// Requests the hardware mutex `id`. Returns `None` if there is no such
    /// mutex or it is taken by another driver.
    fn request_lock(&mut self, id: u32) -> Option<Self::Lock>;

    /// Returns the clock.
    fn clock(&mut self) -> Self::Clock;

    /// Called once the engine is ready, to register dependent devices.
    ///
    /// A failure is logged and otherwise ignored.
    fn ready(&mut self, _smem: &Smem<Self::Lock, Self::Clock>) -> Result<(), Error> {
        Ok(())
    }
}

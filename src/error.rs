use core::fmt;

/// Errors returned by the SMEM engine.
///
/// Every structural check failure on the shared region (a bad magic, canary,
/// bound, version or a non-monotonic list step) is reported as
/// [`InvalidFormat`](Error::InvalidFormat) and aborts only the current
/// operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// The engine is not installed yet. The caller should retry later.
    NotReady,
    /// The item number is reserved for the boot loader or out of bounds, or
    /// the configuration is unusable.
    InvalidArgument,
    /// The item is already allocated.
    AlreadyExists,
    /// The heap has no room for the requested allocation.
    OutOfSpace,
    /// The item or the partition table does not exist.
    NotFound,
    /// The shared region content is corrupt or inconsistent.
    InvalidFormat,
    /// The region was laid out by an unsupported boot loader version.
    Unsupported,
    /// The hardware mutex could not be taken in time.
    LockTimeout,
    /// An engine is already installed.
    Busy,
    /// The platform has no hardware mutex with the configured id.
    LockUnavailable,
    /// The platform failed to map a memory region.
    MapFailed,
}

impl Error {
    /// Returns the negative Linux errno matching this error, for FFI
    /// consumers following the kernel calling convention.
    pub const fn errno(self) -> i32 {
        match self {
            Self::NotReady => -517, // EPROBE_DEFER
            Self::InvalidArgument | Self::InvalidFormat | Self::Unsupported => -22,
            Self::AlreadyExists => -17,
            Self::OutOfSpace => -28,
            Self::NotFound => -2,
            Self::LockTimeout => -110,
            Self::Busy => -16,
            Self::LockUnavailable => -6,
            Self::MapFailed => -12,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotReady => "SMEM is not ready",
            Self::InvalidArgument => "invalid SMEM argument",
            Self::AlreadyExists => "SMEM item already exists",
            Self::OutOfSpace => "out of SMEM space",
            Self::NotFound => "SMEM item not found",
            Self::InvalidFormat => "invalid SMEM format",
            Self::Unsupported => "unsupported SMEM version",
            Self::LockTimeout => "timed out waiting for the SMEM hardware mutex",
            Self::Busy => "SMEM is already probed",
            Self::LockUnavailable => "SMEM hardware mutex is unavailable",
            Self::MapFailed => "failed to map an SMEM region",
        })
    }
}

#[cfg(feature = "host")]
impl std::error::Error for Error {}

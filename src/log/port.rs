use super::PORTS_COUNT;
#[cfg(not(feature = "host"))]
use super::{drone_log_is_enabled, drone_log_write_bytes};
use core::{fmt, fmt::Write};

/// Logger port handle.
#[derive(Clone, Copy, Debug)]
pub struct Port(u8);

impl Port {
    /// Creates a new port handle.
    ///
    /// # Panics
    ///
    /// If `port` is more than or equal to [`PORTS_COUNT`].
    #[inline]
    pub fn new(port: u8) -> Self {
        assert!(port < PORTS_COUNT);
        Self(port)
    }

    /// Returns `true` if somebody listens to the port.
    #[inline]
    pub fn is_enabled(self) -> bool {
        let Self(port) = self;
        #[cfg(feature = "host")]
        return port == super::STDOUT_PORT || port == super::STDERR_PORT;
        #[cfg(not(feature = "host"))]
        unsafe {
            drone_log_is_enabled(port)
        }
    }

    /// Writes a sequence of bytes to the port.
    ///
    /// The resulting byte sequence may be interleaved with concurrent writes.
    #[inline]
    pub fn write_bytes(self, bytes: &[u8]) -> Self {
        let Self(port) = self;
        #[cfg(feature = "host")]
        {
            use std::io::Write as _;
            match port {
                super::STDOUT_PORT => std::io::stdout().write_all(bytes).unwrap_or(()),
                super::STDERR_PORT => std::io::stderr().write_all(bytes).unwrap_or(()),
                _ => {}
            }
        }
        #[cfg(not(feature = "host"))]
        unsafe {
            drone_log_write_bytes(port, bytes.as_ptr(), bytes.len());
        }
        self
    }
}

impl Write for Port {
    #[inline]
    fn write_str(&mut self, string: &str) -> fmt::Result {
        self.write_bytes(string.as_bytes());
        Ok(())
    }
}

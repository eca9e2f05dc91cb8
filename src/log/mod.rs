//! Diagnostics output.
//!
//! SMEM reports structural problems found in the shared region through the
//! Drone log ports. Port [`STDERR_PORT`] carries errors and port
//! [`STDOUT_PORT`] carries debug output (only with the `debug-log` feature).
//!
//! On a target the ports are backed by the `drone_log_*` hooks provided by the
//! platform crate. With the `host` feature the two ports go to the process
//! standard output and standard error, and the other ports are disabled.

mod macros;
mod port;

pub use self::port::Port;

use core::{fmt, fmt::Write};

#[cfg(not(feature = "host"))]
extern "C" {
    fn drone_log_is_enabled(port: u8) -> bool;
    fn drone_log_write_bytes(port: u8, buffer: *const u8, count: usize);
}

/// Number of available log ports.
pub const PORTS_COUNT: u8 = 32;

/// Port number of the standard output stream.
pub const STDOUT_PORT: u8 = 0;

/// Port number of the standard error stream.
pub const STDERR_PORT: u8 = 1;

/// Returns port for standard output.
#[inline]
pub fn stdout() -> Port {
    Port::new(STDOUT_PORT)
}

/// Returns port for standard error.
#[inline]
pub fn stderr() -> Port {
    Port::new(STDERR_PORT)
}

/// Writes `string` to the log port number `port`.
///
/// The presence of the debug probe is not checked, so it is recommended to use
/// this function together with [`Port::is_enabled`].
#[inline(never)]
pub fn write_str(port: u8, string: &str) {
    Port::new(port).write_str(string).unwrap_or(())
}

/// Writes `args` to the log port number `port`.
///
/// The presence of the debug probe is not checked, so it is recommended to use
/// this function together with [`Port::is_enabled`].
#[inline(never)]
pub fn write_fmt(port: u8, args: fmt::Arguments<'_>) {
    Port::new(port).write_fmt(args).unwrap_or(())
}

/// Writes `args` to the standard output port if debug output is compiled in
/// and the port is enabled.
#[inline]
pub fn write_debug(args: fmt::Arguments<'_>) {
    if cfg!(feature = "debug-log") && stdout().is_enabled() {
        write_fmt(STDOUT_PORT, args);
    }
}

/// Prints an SMEM error message with a newline to the log stream #1, if
/// logging is enabled.
///
/// # Examples
///
/// ```
/// use drone_smem::smem_err;
///
/// smem_err!("bad host {}", 14);
/// ```
#[macro_export]
macro_rules! smem_err {
    ($fmt:expr) => {
        if $crate::log::stderr().is_enabled() {
            $crate::log::write_str($crate::log::STDERR_PORT, concat!("smem: ", $fmt, "\n"));
        }
    };
    ($fmt:expr, $($arg:tt)*) => {
        if $crate::log::stderr().is_enabled() {
            $crate::log::write_fmt(
                $crate::log::STDERR_PORT,
                format_args!(concat!("smem: ", $fmt, "\n"), $($arg)*),
            );
        }
    };
}

/// Prints an SMEM debug message with a newline to the log stream #0.
///
/// Messages are dropped unless this crate is built with the `debug-log`
/// feature. The arguments are still type-checked.
#[macro_export]
macro_rules! smem_dbg {
    ($fmt:expr) => {
        $crate::log::write_debug(format_args!(concat!("smem: ", $fmt, "\n")))
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::log::write_debug(format_args!(concat!("smem: ", $fmt, "\n"), $($arg)*))
    };
}

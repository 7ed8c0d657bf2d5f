//! Debug macros for driver subsystems
//!
//! These macros compile to nothing when debug features are disabled.

/// Debug print for storage subsystem
#[macro_export]
#[cfg(feature = "debug-storage")]
macro_rules! debug_storage {
    ($($arg:tt)*) => {
        // Will use serial_write when integrated
        // For now, this is a placeholder that can be hooked up
        $crate::_debug_print("[STORAGE] ", format_args!($($arg)*))
    };
}

#[macro_export]
#[cfg(not(feature = "debug-storage"))]
macro_rules! debug_storage {
    ($($arg:tt)*) => {};
}

/// Debug print for the filesystem search index
#[macro_export]
#[cfg(feature = "debug-index")]
macro_rules! debug_index {
    ($($arg:tt)*) => {
        $crate::_debug_print("[INDEX] ", format_args!($($arg)*))
    };
}

#[macro_export]
#[cfg(not(feature = "debug-index"))]
macro_rules! debug_index {
    ($($arg:tt)*) => {};
}

/// Debug output function - can be replaced with actual serial output
#[doc(hidden)]
#[cfg(any(feature = "debug-storage", feature = "debug-index"))]
pub fn _debug_print(_prefix: &str, _args: core::fmt::Arguments) {
    // This will be hooked up to serial output
    // For now it's a no-op that can be connected later
}

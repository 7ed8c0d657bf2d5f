//! Hardware Driver Traits for Osprey
//!
//! This crate defines the trait interfaces that hardware drivers implement.
//! Subsystems (storage, the search index, etc.) use these traits to interact
//! with hardware without knowing the specific driver implementation.
//!
//! # Debug Features
//!
//! Enable debug output for specific subsystems at compile time:
//! ```toml
//! osprey-driver-traits = { path = "...", features = ["debug-storage"] }
//! ```
//!
//! Available features:
//! - `debug-all`: Enable all debug output
//! - `debug-storage`: BlockDevice operations
//! - `debug-index`: Search index maintenance

#![no_std]

// Re-export all trait modules
pub mod block;
mod debug;

pub use block::*;
pub use debug::*;

/// Common error type for driver operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// Device not found or not responding
    DeviceNotFound,
    /// Invalid parameter
    InvalidParameter,
    /// I/O error
    IoError,
    /// Not supported by this device
    NotSupported,
    /// Buffer too small
    BufferTooSmall,
}

pub type DriverResult<T> = Result<T, DriverError>;

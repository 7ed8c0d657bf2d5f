//! OFAT - Osprey File Allocation Table
//!
//! A compact FAT derivative for Osprey with a fixed single-volume layout
//! and an in-memory name index.
//!
//! ## Disk Layout
//!
//! ```text
//! Block 0:       Volume signature
//! Cluster 1:     File allocation table (512 entries, one per cluster)
//! Cluster 2:     Root directory table
//! Cluster 3+:    File content and directory table continuations
//! ```
//!
//! A cluster is four 512-byte blocks. Directory tables fill one cluster
//! with 64 entries of 32 bytes each; slot 0 describes the table itself
//! and records the parent directory. Directories grow by chaining
//! continuation clusters through the allocation table, the same way file
//! content does.
//!
//! ## Operations
//!
//! The driver exposes four operations keyed by `(name, ext, parent)`
//! requests: `read`, `read_directory`, `write` (file from a buffer, or
//! directory creation from an empty one), and `delete` with optional
//! recursion. All validation happens before the first on-disk mutation.
//!
//! ## Search Index
//!
//! [`index::SearchIndex`] keeps every on-volume name in a B+tree for
//! `whereis` queries, mapping a name to the directories holding it. The
//! index is rebuilt from the directory tree after each mutation.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod core;
pub mod index;

mod volume;

pub use crate::core::structures::{pack_ext, pack_name, DriverRequest};
pub use crate::core::{FilesystemState, FsError, FsResult};
pub use crate::volume::OfatFilesystem;

pub use osprey_driver_traits::{
    BlockDevice, BlockDeviceExt, BlockGeometry, DriverError, DriverResult,
};

/// Common imports for driver consumers
pub mod prelude {
    pub use crate::core::structures::{pack_ext, pack_name, DriverRequest};
    pub use crate::core::{FilesystemState, FsError, FsResult};
    pub use crate::index::{LocationSet, SearchIndex};
    pub use crate::OfatFilesystem;
    pub use osprey_driver_traits::{BlockDevice, BlockDeviceExt, BlockGeometry};
}

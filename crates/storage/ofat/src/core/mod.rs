//! On-disk format and the filesystem driver
//!
//! The layout is fixed: block 0 carries the volume signature, cluster 1 the
//! allocation table, cluster 2 the root directory. Everything above that is
//! file content and directory table chains.

pub mod structures;

mod cluster;
mod dir;
mod fat;
mod fs;

pub use fs::{FilesystemState, FsError, FsResult};

#[cfg(test)]
mod tests;

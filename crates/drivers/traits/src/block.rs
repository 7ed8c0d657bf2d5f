//! Block Device Trait
//!
//! Implemented by storage drivers (AHCI, IDE, file-backed images, etc.)
//! Used by filesystem drivers (OFAT).

use crate::DriverError;

/// Block device geometry
#[derive(Debug, Clone, Copy)]
pub struct BlockGeometry {
    /// Block size in bytes (usually 512)
    pub block_size: u32,
    /// Total number of blocks
    pub total_blocks: u64,
}

/// Block device interface for storage drivers
pub trait BlockDevice {
    /// Get device geometry
    fn geometry(&self) -> BlockGeometry;

    /// Read blocks from the device
    ///
    /// # Arguments
    /// * `start` - Starting block (LBA)
    /// * `buffer` - Buffer to read into (size determines block count)
    ///
    /// # Returns
    /// Number of bytes read on success
    fn read_blocks(&mut self, start: u64, buffer: &mut [u8]) -> Result<usize, DriverError>;

    /// Write blocks to the device
    ///
    /// # Arguments
    /// * `start` - Starting block (LBA)
    /// * `buffer` - Buffer to write from (size determines block count)
    ///
    /// # Returns
    /// Number of bytes written on success
    fn write_blocks(&mut self, start: u64, buffer: &[u8]) -> Result<usize, DriverError>;

    /// Flush any cached writes to the device
    fn flush(&mut self) -> Result<(), DriverError> {
        Ok(()) // Default: no caching
    }
}

/// Convenience methods for BlockDevice
pub trait BlockDeviceExt: BlockDevice {
    /// Get block size
    fn block_size(&self) -> u32 {
        self.geometry().block_size
    }

    /// Get total blocks
    fn total_blocks(&self) -> u64 {
        self.geometry().total_blocks
    }

    /// Get total device size in bytes
    fn size_bytes(&self) -> u64 {
        self.geometry().total_blocks * self.geometry().block_size as u64
    }

    /// Read a single block
    fn read_block(&mut self, lba: u64, buf: &mut [u8]) -> Result<usize, DriverError> {
        let block_size = self.block_size() as usize;
        if buf.len() < block_size {
            return Err(DriverError::BufferTooSmall);
        }
        self.read_blocks(lba, &mut buf[..block_size])
    }

    /// Write a single block
    fn write_block(&mut self, lba: u64, buf: &[u8]) -> Result<usize, DriverError> {
        let block_size = self.block_size() as usize;
        if buf.len() < block_size {
            return Err(DriverError::BufferTooSmall);
        }
        self.write_blocks(lba, &buf[..block_size])
    }
}

// Auto-implement BlockDeviceExt for all BlockDevice implementors
impl<T: BlockDevice + ?Sized> BlockDeviceExt for T {}

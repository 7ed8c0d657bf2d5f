//! Cluster addressing and cluster-granular I/O
//!
//! Thin multiplicative wrappers over the block device. The driver always
//! moves whole clusters; partial transfers are staged by the caller.

use osprey_driver_traits::{BlockDevice, DriverResult};

use crate::core::structures::{BOOT_BLOCK, CLUSTER_BLOCK_COUNT, CLUSTER_SIZE};

/// Map a cluster number to its first logical block address
pub fn cluster_to_lba(cluster: u32) -> u64 {
    cluster as u64 * CLUSTER_BLOCK_COUNT as u64 + BOOT_BLOCK
}

/// Read `count` whole clusters into the front of `buffer`
pub fn read_clusters<D: BlockDevice>(
    device: &mut D,
    buffer: &mut [u8],
    cluster: u32,
    count: usize,
) -> DriverResult<()> {
    device.read_blocks(cluster_to_lba(cluster), &mut buffer[..count * CLUSTER_SIZE])?;
    Ok(())
}

/// Write `count` whole clusters from the front of `buffer`
pub fn write_clusters<D: BlockDevice>(
    device: &mut D,
    buffer: &[u8],
    cluster: u32,
    count: usize,
) -> DriverResult<()> {
    device.write_blocks(cluster_to_lba(cluster), &buffer[..count * CLUSTER_SIZE])?;
    Ok(())
}

//! Cluster map allocation and chain traversal
//!
//! Pure in-memory operations on the allocation table. Persistence and
//! content I/O stay with the filesystem state.

use crate::core::structures::{
    FileAllocationTable, CLUSTER_MAP_SIZE, FAT_EMPTY_ENTRY, FAT_END_OF_FILE,
    FIRST_ALLOCATABLE_CLUSTER,
};

impl FileAllocationTable {
    /// Number of clusters currently free for allocation
    pub fn free_cluster_count(&self) -> usize {
        self.cluster_map[FIRST_ALLOCATABLE_CLUSTER as usize..]
            .iter()
            .filter(|&&value| value == FAT_EMPTY_ENTRY)
            .count()
    }

    /// Next cluster in a chain, or None at the chain tail.
    ///
    /// Out-of-range and reserved link values are treated as chain ends so
    /// a corrupted map cannot send a walk outside the cluster region.
    pub fn next_in_chain(&self, cluster: u32) -> Option<u32> {
        if cluster as usize >= CLUSTER_MAP_SIZE {
            return None;
        }
        let value = self.entry(cluster);
        if value == FAT_END_OF_FILE
            || value < FIRST_ALLOCATABLE_CLUSTER
            || value >= CLUSTER_MAP_SIZE as u32
        {
            None
        } else {
            Some(value)
        }
    }

    /// Number of clusters in the chain starting at `start`
    pub fn chain_length(&self, start: u32) -> usize {
        let mut length = 1;
        let mut cluster = start;
        while let Some(next) = self.next_in_chain(cluster) {
            length += 1;
            cluster = next;

            // Safety limit to prevent infinite loops
            if length > CLUSTER_MAP_SIZE {
                break;
            }
        }
        length
    }

    /// Last cluster of the chain starting at `start`
    pub fn chain_tail(&self, start: u32) -> u32 {
        let mut cluster = start;
        let mut steps = 0;
        while let Some(next) = self.next_in_chain(cluster) {
            cluster = next;

            // Safety limit to prevent infinite loops
            steps += 1;
            if steps > CLUSTER_MAP_SIZE {
                break;
            }
        }
        cluster
    }

    /// First-fit chain allocation.
    ///
    /// Claims `count` free clusters in ascending order, linking each to the
    /// next found and terminating the tail. The clusters need not be
    /// contiguous. Returns the head cluster; the map is untouched when
    /// there is not enough space.
    pub fn allocate_chain(&mut self, count: usize) -> Option<u32> {
        if count == 0 || self.free_cluster_count() < count {
            return None;
        }

        let mut head = 0;
        let mut previous: Option<u32> = None;
        let mut allocated = 0;

        for cluster in FIRST_ALLOCATABLE_CLUSTER..CLUSTER_MAP_SIZE as u32 {
            if !self.is_free(cluster) {
                continue;
            }
            match previous {
                None => head = cluster,
                Some(prev) => self.set_entry(prev, cluster),
            }
            previous = Some(cluster);
            allocated += 1;
            if allocated == count {
                self.set_entry(cluster, FAT_END_OF_FILE);
                return Some(head);
            }
        }

        None
    }
}

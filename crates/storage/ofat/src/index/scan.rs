//! Volume scan feeding the search index
//!
//! The index is never updated in place. After every successful mutation
//! the whole directory tree is walked again and each occupied entry is
//! reinserted, so the index always mirrors the on-disk state.

use osprey_driver_traits::{debug_index, BlockDevice};

use crate::core::structures::{
    CLUSTER_MAP_SIZE, ENTRIES_PER_CLUSTER, MAX_RECURSION_DEPTH, ROOT_CLUSTER_NUMBER,
    ROOT_DIRECTORY_NAME,
};
use crate::core::{FilesystemState, FsResult};
use crate::index::tree::{IndexError, IndexKey, LocationSet, SearchTree};

/// Name lookup over every entry on the volume.
///
/// Answers `whereis` queries from a B+tree of entry names. Each key maps
/// to the head clusters of the directories holding that name.
pub struct SearchIndex {
    tree: SearchTree,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self {
            tree: SearchTree::new(),
        }
    }

    /// Every recorded location of `name`, or an empty set
    pub fn whereis(&self, name: &IndexKey) -> LocationSet {
        match self.tree.find(name) {
            Some(record) => *record,
            None => LocationSet::default(),
        }
    }

    /// Number of distinct names indexed
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Rebuild the index from the live directory tree.
    ///
    /// The root is seeded first, then every directory is scanned in
    /// preorder. Returns false when the arena filled up, in which case
    /// the index is left empty instead of half built.
    pub fn rebuild<D: BlockDevice>(&mut self, fs: &mut FilesystemState<D>) -> FsResult<bool> {
        self.tree.clear();

        if self
            .tree
            .insert(ROOT_DIRECTORY_NAME, [0; 3], ROOT_CLUSTER_NUMBER)
            .is_err()
        {
            self.tree.clear();
            return Ok(false);
        }

        match self.scan_directory(fs, ROOT_CLUSTER_NUMBER, 1) {
            Ok(true) => {
                debug_index!("index: rebuilt with {} names", self.tree.len());
                Ok(true)
            }
            Ok(false) => {
                debug_index!("index: arena full during rebuild, disabled");
                self.tree.clear();
                Ok(false)
            }
            Err(err) => {
                self.tree.clear();
                Err(err)
            }
        }
    }

    /// Index one directory chain and recurse into its subdirectories.
    /// Returns false when the arena is exhausted. Directories nested past
    /// the recursion limit are skipped.
    fn scan_directory<D: BlockDevice>(
        &mut self,
        fs: &mut FilesystemState<D>,
        dir_cluster: u32,
        depth: usize,
    ) -> FsResult<bool> {
        if depth > MAX_RECURSION_DEPTH {
            return Ok(true);
        }

        let mut cluster = dir_cluster;
        let mut steps = 0;
        loop {
            let table = fs.load_table(cluster)?;
            for slot in 1..ENTRIES_PER_CLUSTER {
                let entry = table.table[slot];
                if !entry.is_occupied() {
                    continue;
                }
                match self.tree.insert(entry.name, entry.ext, dir_cluster) {
                    Ok(()) => {}
                    // A sixth copy of a name is not recorded
                    Err(IndexError::RecordFull) => {}
                    Err(IndexError::OutOfNodes) => return Ok(false),
                }
                if entry.is_subdirectory() && !self.scan_directory(fs, entry.cluster(), depth + 1)? {
                    return Ok(false);
                }
            }
            match fs.fat().next_in_chain(cluster) {
                Some(next) => cluster = next,
                None => return Ok(true),
            }

            // Safety limit to prevent infinite loops
            steps += 1;
            if steps > CLUSTER_MAP_SIZE {
                return Ok(true);
            }
        }
    }
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

//! Filesystem state and the driver operations
//!
//! Every operation validates against the allocation table and the on-disk
//! directory tables before its first mutation, so a rejected request
//! leaves the volume exactly as it was.

use osprey_driver_traits::{debug_storage, BlockDevice, BlockDeviceExt, DriverError};

use crate::core::cluster;
use crate::core::structures::{
    ClusterBuffer, DirectoryEntry, DirectoryTable, DriverRequest, FileAllocationTable,
    BLOCK_SIZE, BOOT_BLOCK, CLUSTER_MAP_SIZE, CLUSTER_SIZE, ENTRIES_PER_CLUSTER,
    FAT_CLUSTER_NUMBER, FAT_EMPTY_ENTRY, FS_SIGNATURE, MAX_RECURSION_DEPTH,
    ROOT_CLUSTER_NUMBER, ROOT_DIRECTORY_NAME,
};

// ============================================================================
// ERRORS
// ============================================================================

/// Failure modes of the driver operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// No entry with the requested name in the parent directory
    NotFound,
    /// Entry exists but is a directory where a file was expected, or the reverse
    WrongKind,
    /// Caller buffer cannot hold the content
    BufferTooSmall,
    /// Parent cluster is not the head of a live directory chain
    InvalidParent,
    /// Creation target already present in the parent
    AlreadyExists,
    /// Requested name is reserved
    ForbiddenName,
    /// Not enough free clusters for the request
    OutOfSpace,
    /// Non-recursive delete of a directory that still has entries
    NotEmpty,
    /// Recursive delete past the nesting limit
    TooDeep,
    /// Underlying device failure
    Io(DriverError),
}

impl FsError {
    /// Stable status code for syscall-style dispatch.
    ///
    /// Callers report success as 0; failures map to small positive codes,
    /// with -1 reserved for device errors.
    pub fn code(&self) -> i8 {
        match self {
            FsError::NotFound => 1,
            FsError::WrongKind => 2,
            FsError::BufferTooSmall => 3,
            FsError::InvalidParent => 4,
            FsError::AlreadyExists => 5,
            FsError::ForbiddenName => 6,
            FsError::OutOfSpace => 7,
            FsError::NotEmpty => 8,
            FsError::TooDeep => 9,
            FsError::Io(_) => -1,
        }
    }
}

impl From<DriverError> for FsError {
    fn from(err: DriverError) -> Self {
        FsError::Io(err)
    }
}

pub type FsResult<T> = Result<T, FsError>;

// ============================================================================
// FILESYSTEM STATE
// ============================================================================

/// Where a directory entry was found: the cluster holding its table, the
/// slot inside that table, and a copy of the entry itself.
struct EntryLocation {
    cluster: u32,
    slot: usize,
    entry: DirectoryEntry,
}

/// A mounted OFAT volume: the block device plus the cached allocation table.
///
/// The allocation table is loaded once at mount and persisted after every
/// mutating operation. Directory tables are never cached; each operation
/// reads them fresh from the device.
pub struct FilesystemState<D: BlockDevice> {
    device: D,
    fat: FileAllocationTable,
}

impl<D: BlockDevice> FilesystemState<D> {
    /// Mount the volume, formatting first if the device carries no signature
    pub fn new(device: D) -> FsResult<Self> {
        let mut state = Self {
            device,
            fat: FileAllocationTable::default(),
        };
        if state.is_empty_storage()? {
            debug_storage!("ofat: no signature found, formatting");
            state.format()?;
        }
        state.load_allocation_table()?;
        Ok(state)
    }

    /// True when the boot block does not carry the OFAT signature
    pub fn is_empty_storage(&mut self) -> FsResult<bool> {
        let mut boot_block = [0u8; BLOCK_SIZE];
        self.device.read_block(BOOT_BLOCK, &mut boot_block)?;
        Ok(boot_block != FS_SIGNATURE)
    }

    /// Write a fresh filesystem: signature, reserved map entries, empty root
    pub fn format(&mut self) -> FsResult<()> {
        debug_storage!("ofat: formatting volume");
        self.device.write_block(BOOT_BLOCK, &FS_SIGNATURE)?;

        self.fat = FileAllocationTable::formatted();
        self.persist_allocation_table()?;

        // The root directory is its own parent
        let root = DirectoryTable::new(ROOT_DIRECTORY_NAME, ROOT_CLUSTER_NUMBER);
        self.store_table(ROOT_CLUSTER_NUMBER, &root)?;
        Ok(())
    }

    pub fn fat(&self) -> &FileAllocationTable {
        &self.fat
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    // ========================================================================
    // TABLE AND MAP I/O
    // ========================================================================

    fn load_allocation_table(&mut self) -> FsResult<()> {
        let mut table = FileAllocationTable::default();
        cluster::read_clusters(&mut self.device, table.as_bytes_mut(), FAT_CLUSTER_NUMBER, 1)?;
        self.fat = table;
        Ok(())
    }

    fn persist_allocation_table(&mut self) -> FsResult<()> {
        cluster::write_clusters(&mut self.device, self.fat.as_bytes(), FAT_CLUSTER_NUMBER, 1)?;
        Ok(())
    }

    /// Read one directory table cluster. Also used by tooling that walks
    /// chains by cluster number.
    pub fn load_table(&mut self, cluster: u32) -> FsResult<DirectoryTable> {
        let mut table = DirectoryTable::default();
        cluster::read_clusters(&mut self.device, table.as_bytes_mut(), cluster, 1)?;
        Ok(table)
    }

    fn store_table(&mut self, cluster: u32, table: &DirectoryTable) -> FsResult<()> {
        cluster::write_clusters(&mut self.device, table.as_bytes(), cluster, 1)?;
        Ok(())
    }

    // ========================================================================
    // DIRECTORY SEARCH AND VALIDATION
    // ========================================================================

    /// Load the request's parent table, rejecting clusters outside the
    /// cluster region and tables that are chain continuations. Operations
    /// address directories by their head cluster only.
    fn load_parent_table(&mut self, request: &DriverRequest) -> FsResult<DirectoryTable> {
        let parent = request.parent_cluster;
        if parent < ROOT_CLUSTER_NUMBER || parent as usize >= CLUSTER_MAP_SIZE {
            return Err(FsError::InvalidParent);
        }
        let table = self.load_table(parent)?;
        if table.is_continuation() {
            return Err(FsError::InvalidParent);
        }
        Ok(table)
    }

    /// First occupied content entry in the directory chain satisfying the
    /// predicate. Slot 0 of every cluster is the self entry and is skipped.
    fn find_entry<F>(&mut self, head_cluster: u32, matches: F) -> FsResult<Option<EntryLocation>>
    where
        F: Fn(&DirectoryEntry) -> bool,
    {
        let mut cluster = head_cluster;
        let mut steps = 0;
        loop {
            let table = self.load_table(cluster)?;
            for slot in 1..ENTRIES_PER_CLUSTER {
                let entry = &table.table[slot];
                if entry.is_occupied() && matches(entry) {
                    return Ok(Some(EntryLocation {
                        cluster,
                        slot,
                        entry: *entry,
                    }));
                }
            }
            match self.fat.next_in_chain(cluster) {
                Some(next) => cluster = next,
                None => return Ok(None),
            }

            // Safety limit to prevent infinite loops
            steps += 1;
            if steps > CLUSTER_MAP_SIZE {
                return Ok(None);
            }
        }
    }

    /// Walk recorded parent links upward until the root. A cluster outside
    /// the cluster region or a revisited cluster means the parent is not
    /// part of a live directory tree.
    fn is_parent_cluster_valid(&mut self, parent_cluster: u32) -> FsResult<bool> {
        let mut visited = [false; CLUSTER_MAP_SIZE];
        let mut cluster = parent_cluster;
        while cluster != ROOT_CLUSTER_NUMBER {
            if cluster < ROOT_CLUSTER_NUMBER
                || cluster as usize >= CLUSTER_MAP_SIZE
                || visited[cluster as usize]
            {
                return Ok(false);
            }
            visited[cluster as usize] = true;
            let table = self.load_table(cluster)?;
            cluster = table.parent_cluster();
        }
        Ok(true)
    }

    /// True when no cluster of the directory chain holds a content entry
    fn is_directory_chain_empty(&mut self, head_cluster: u32) -> FsResult<bool> {
        let mut cluster = head_cluster;
        let mut steps = 0;
        loop {
            let table = self.load_table(cluster)?;
            if table.occupied_entries().next().is_some() {
                return Ok(false);
            }
            match self.fat.next_in_chain(cluster) {
                Some(next) => cluster = next,
                None => return Ok(true),
            }
            steps += 1;
            if steps > CLUSTER_MAP_SIZE {
                return Ok(true);
            }
        }
    }

    /// Check that no directory below `dir_cluster` sits deeper than the
    /// recursion limit. `depth` counts `dir_cluster` itself as one level.
    fn subtree_within_depth(&mut self, dir_cluster: u32, depth: usize) -> FsResult<bool> {
        if depth > MAX_RECURSION_DEPTH {
            return Ok(false);
        }
        let mut cluster = dir_cluster;
        let mut steps = 0;
        loop {
            let table = self.load_table(cluster)?;
            for slot in 1..ENTRIES_PER_CLUSTER {
                let entry = table.table[slot];
                if entry.is_occupied()
                    && entry.is_subdirectory()
                    && !self.subtree_within_depth(entry.cluster(), depth + 1)?
                {
                    return Ok(false);
                }
            }
            match self.fat.next_in_chain(cluster) {
                Some(next) => cluster = next,
                None => return Ok(true),
            }
            steps += 1;
            if steps > CLUSTER_MAP_SIZE {
                return Ok(true);
            }
        }
    }

    // ========================================================================
    // READ OPERATIONS
    // ========================================================================

    /// Copy a subdirectory's raw cluster chain into `buffer`.
    ///
    /// The target is matched by name alone; a file of the same name is
    /// reported as the wrong kind. Returns the number of bytes copied,
    /// which is the directory's recorded size.
    pub fn read_directory(&mut self, request: &DriverRequest, buffer: &mut [u8]) -> FsResult<usize> {
        self.load_parent_table(request)?;

        let found = self.find_entry(request.parent_cluster, |entry| {
            entry.is_subdirectory() && entry.matches_name(&request.name)
        })?;
        let location = match found {
            Some(location) => location,
            None => {
                let other = self.find_entry(request.parent_cluster, |entry| {
                    entry.matches_name(&request.name)
                })?;
                return Err(if other.is_some() {
                    FsError::WrongKind
                } else {
                    FsError::NotFound
                });
            }
        };

        let size = location.entry.filesize as usize;
        if buffer.len() < size {
            return Err(FsError::BufferTooSmall);
        }
        self.read_chain(location.entry.cluster(), &mut buffer[..size])
    }

    /// Copy a file's content into `buffer`.
    ///
    /// The target is matched by name and extension. Returns the number of
    /// bytes copied, which is the file's recorded size.
    pub fn read(&mut self, request: &DriverRequest, buffer: &mut [u8]) -> FsResult<usize> {
        self.load_parent_table(request)?;

        let found = self.find_entry(request.parent_cluster, |entry| {
            entry.matches_name_ext(&request.name, &request.ext)
        })?;
        let location = found.ok_or(FsError::NotFound)?;
        if location.entry.is_subdirectory() {
            return Err(FsError::WrongKind);
        }

        let size = location.entry.filesize as usize;
        if buffer.len() < size {
            return Err(FsError::BufferTooSmall);
        }
        self.read_chain(location.entry.cluster(), &mut buffer[..size])
    }

    /// Copy `buffer.len()` bytes of chain content, cluster by cluster. The
    /// last cluster of a file chain is read in full but copied only up to
    /// the recorded size.
    fn read_chain(&mut self, start_cluster: u32, buffer: &mut [u8]) -> FsResult<usize> {
        let mut cluster_buf: ClusterBuffer = [0; CLUSTER_SIZE];
        let mut cluster = start_cluster;
        let mut offset = 0;
        let mut steps = 0;
        loop {
            if cluster as usize >= CLUSTER_MAP_SIZE {
                break;
            }
            cluster::read_clusters(&mut self.device, &mut cluster_buf, cluster, 1)?;
            let take = (buffer.len() - offset).min(CLUSTER_SIZE);
            buffer[offset..offset + take].copy_from_slice(&cluster_buf[..take]);
            offset += take;
            if offset == buffer.len() {
                break;
            }
            match self.fat.next_in_chain(cluster) {
                Some(next) => cluster = next,
                None => break,
            }
            steps += 1;
            if steps > CLUSTER_MAP_SIZE {
                break;
            }
        }
        Ok(offset)
    }

    // ========================================================================
    // WRITE OPERATION
    // ========================================================================

    /// Create a file or, when `data` is empty, a subdirectory.
    ///
    /// Runs every check before the first mutation: parent head and upward
    /// chain, reserved names, duplicates, the one-byte entry count, and
    /// free space including a directory table continuation when the parent
    /// has no free slot. Directories collide on name alone, files on name
    /// plus extension.
    pub fn write(&mut self, request: &DriverRequest, data: &[u8]) -> FsResult<()> {
        let creating_directory = data.is_empty();

        let parent_table = self.load_parent_table(request)?;
        if !self.is_parent_cluster_valid(request.parent_cluster)? {
            return Err(FsError::InvalidParent);
        }
        if creating_directory && request.name == ROOT_DIRECTORY_NAME {
            return Err(FsError::ForbiddenName);
        }

        let duplicate = if creating_directory {
            self.find_entry(request.parent_cluster, |entry| {
                entry.is_subdirectory() && entry.matches_name(&request.name)
            })?
        } else {
            self.find_entry(request.parent_cluster, |entry| {
                !entry.is_subdirectory() && entry.matches_name_ext(&request.name, &request.ext)
            })?
        };
        if duplicate.is_some() {
            return Err(FsError::AlreadyExists);
        }

        // The head self entry counts the whole chain in one byte; a
        // saturated directory takes no more entries
        if parent_table.entry_count() == u8::MAX {
            return Err(FsError::OutOfSpace);
        }

        let required_clusters = if creating_directory {
            1
        } else {
            (data.len() + CLUSTER_SIZE - 1) / CLUSTER_SIZE
        };

        // Find a home for the new entry before touching anything
        let free_slot = self.find_free_slot_in_chain(request.parent_cluster)?;
        let total_needed = required_clusters + usize::from(free_slot.is_none());
        if self.fat.free_cluster_count() < total_needed {
            return Err(FsError::OutOfSpace);
        }

        // All checks passed; mutations start here
        let (entry_cluster, entry_slot) = match free_slot {
            Some(home) => home,
            None => self.grow_directory(request.parent_cluster)?,
        };

        let content_cluster = self
            .fat
            .allocate_chain(required_clusters)
            .ok_or(FsError::OutOfSpace)?;

        let entry = if creating_directory {
            let table = DirectoryTable::new(request.name, request.parent_cluster);
            self.store_table(content_cluster, &table)?;
            DirectoryEntry::new_subdirectory(request.name, content_cluster)
        } else {
            self.write_chain(content_cluster, data)?;
            DirectoryEntry::new_file(request.name, request.ext, content_cluster, data.len() as u32)
        };

        let mut entry_table = self.load_table(entry_cluster)?;
        entry_table.table[entry_slot] = entry;
        self.store_table(entry_cluster, &entry_table)?;

        let mut head = self.load_table(request.parent_cluster)?;
        head.increment_entry_count();
        self.store_table(request.parent_cluster, &head)?;

        self.persist_allocation_table()?;
        debug_storage!(
            "ofat: wrote {} clusters under parent {}",
            required_clusters,
            request.parent_cluster
        );
        Ok(())
    }

    /// First free content slot anywhere in the directory chain
    fn find_free_slot_in_chain(&mut self, head_cluster: u32) -> FsResult<Option<(u32, usize)>> {
        let mut cluster = head_cluster;
        let mut steps = 0;
        loop {
            let table = self.load_table(cluster)?;
            if let Some(slot) = table.find_free_slot() {
                return Ok(Some((cluster, slot)));
            }
            match self.fat.next_in_chain(cluster) {
                Some(next) => cluster = next,
                None => return Ok(None),
            }
            steps += 1;
            if steps > CLUSTER_MAP_SIZE {
                return Ok(None);
            }
        }
    }

    /// Extend a full directory with a continuation cluster and keep the
    /// recorded sizes current: the head self entry grows by one cluster,
    /// and so does the directory's entry in its parent. Returns the new
    /// cluster and the first usable slot in it.
    fn grow_directory(&mut self, head_cluster: u32) -> FsResult<(u32, usize)> {
        let new_cluster = self.fat.allocate_chain(1).ok_or(FsError::OutOfSpace)?;
        let tail = self.fat.chain_tail(head_cluster);
        self.fat.set_entry(tail, new_cluster);

        let mut head = self.load_table(head_cluster)?;
        let continuation =
            DirectoryTable::new_continuation(head.self_entry().name, head.parent_cluster());
        self.store_table(new_cluster, &continuation)?;

        head.self_entry_mut().filesize += CLUSTER_SIZE as u32;
        self.store_table(head_cluster, &head)?;
        self.update_directory_size_entry(head_cluster, &head)?;

        debug_storage!(
            "ofat: directory {} grew continuation cluster {}",
            head_cluster,
            new_cluster
        );
        Ok((new_cluster, 1))
    }

    /// Refresh the size recorded for a grown directory in its parent's
    /// table. The root has no such entry and is skipped.
    fn update_directory_size_entry(
        &mut self,
        dir_cluster: u32,
        head: &DirectoryTable,
    ) -> FsResult<()> {
        if dir_cluster == ROOT_CLUSTER_NUMBER {
            return Ok(());
        }
        let recorded_size = head.self_entry().filesize;
        let found = self.find_entry(head.parent_cluster(), |entry| {
            entry.is_subdirectory() && entry.cluster() == dir_cluster
        })?;
        if let Some(location) = found {
            let mut table = self.load_table(location.cluster)?;
            table.table[location.slot].filesize = recorded_size;
            self.store_table(location.cluster, &table)?;
        }
        Ok(())
    }

    /// Write `data` over a freshly allocated chain. The tail of the last
    /// cluster is zero filled.
    fn write_chain(&mut self, start_cluster: u32, data: &[u8]) -> FsResult<()> {
        let mut cluster_buf: ClusterBuffer = [0; CLUSTER_SIZE];
        let mut cluster = start_cluster;
        let mut offset = 0;
        let mut steps = 0;
        loop {
            let take = (data.len() - offset).min(CLUSTER_SIZE);
            cluster_buf[..take].copy_from_slice(&data[offset..offset + take]);
            cluster_buf[take..].fill(0);
            cluster::write_clusters(&mut self.device, &cluster_buf, cluster, 1)?;
            offset += take;
            match self.fat.next_in_chain(cluster) {
                Some(next) => cluster = next,
                None => break,
            }
            steps += 1;
            if steps > CLUSTER_MAP_SIZE {
                break;
            }
        }
        Ok(())
    }

    // ========================================================================
    // DELETE OPERATION
    // ========================================================================

    /// Remove a file or directory from the parent.
    ///
    /// An empty extension selects a directory first, then a file carrying
    /// no extension; any other extension selects a file. Directories with
    /// entries are rejected unless `recursive` is set, in which case the
    /// whole subtree is checked against the nesting limit before anything
    /// is removed.
    pub fn delete(&mut self, request: &DriverRequest, recursive: bool) -> FsResult<()> {
        self.load_parent_table(request)?;
        if !self.is_parent_cluster_valid(request.parent_cluster)? {
            return Err(FsError::InvalidParent);
        }

        let found = if request.ext == [0u8; 3] {
            let directory = self.find_entry(request.parent_cluster, |entry| {
                entry.is_subdirectory() && entry.matches_name(&request.name)
            })?;
            match directory {
                Some(location) => Some(location),
                None => self.find_entry(request.parent_cluster, |entry| {
                    !entry.is_subdirectory()
                        && entry.matches_name_ext(&request.name, &request.ext)
                })?,
            }
        } else {
            self.find_entry(request.parent_cluster, |entry| {
                !entry.is_subdirectory() && entry.matches_name_ext(&request.name, &request.ext)
            })?
        };
        let location = found.ok_or(FsError::NotFound)?;

        self.delete_located(request.parent_cluster, &location, recursive, true)
    }

    /// Delete an already located entry. `check_depth` is set for the
    /// caller-facing entry point only; recursion below an already vetted
    /// subtree skips the walk.
    fn delete_located(
        &mut self,
        parent_cluster: u32,
        location: &EntryLocation,
        recursive: bool,
        check_depth: bool,
    ) -> FsResult<()> {
        if location.entry.is_subdirectory() {
            let target = location.entry.cluster();
            if !self.is_directory_chain_empty(target)? {
                if !recursive {
                    return Err(FsError::NotEmpty);
                }
                if check_depth && !self.subtree_within_depth(target, 1)? {
                    return Err(FsError::TooDeep);
                }
                self.delete_children(target)?;
            }
        }
        self.remove_entry(parent_cluster, location)
    }

    /// Delete every content entry of a directory, recursing into
    /// subdirectories
    fn delete_children(&mut self, dir_cluster: u32) -> FsResult<()> {
        loop {
            match self.find_entry(dir_cluster, |_| true)? {
                Some(location) => self.delete_located(dir_cluster, &location, true, false)?,
                None => return Ok(()),
            }
        }
    }

    /// Free the entry's cluster chain, clear its slot, and drop the parent
    /// head count
    fn remove_entry(&mut self, parent_cluster: u32, location: &EntryLocation) -> FsResult<()> {
        self.free_chain(location.entry.cluster())?;

        let mut table = self.load_table(location.cluster)?;
        table.table[location.slot] = DirectoryEntry::default();
        self.store_table(location.cluster, &table)?;

        let mut head = self.load_table(parent_cluster)?;
        head.decrement_entry_count();
        self.store_table(parent_cluster, &head)?;

        self.persist_allocation_table()?;
        Ok(())
    }

    /// Zero every cluster of a chain and release its map entries
    fn free_chain(&mut self, start_cluster: u32) -> FsResult<()> {
        let zeroes: ClusterBuffer = [0; CLUSTER_SIZE];
        let mut cluster = start_cluster;
        let mut freed = 0;
        loop {
            if cluster as usize >= CLUSTER_MAP_SIZE {
                break;
            }
            let next = self.fat.next_in_chain(cluster);
            cluster::write_clusters(&mut self.device, &zeroes, cluster, 1)?;
            self.fat.set_entry(cluster, FAT_EMPTY_ENTRY);
            freed += 1;
            match next {
                Some(next_cluster) => cluster = next_cluster,
                None => break,
            }

            // Safety limit to prevent infinite loops
            if freed > CLUSTER_MAP_SIZE {
                break;
            }
        }
        debug_storage!("ofat: freed {} clusters from {}", freed, start_cluster);
        Ok(())
    }
}

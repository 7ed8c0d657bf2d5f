//! OFAT Core Data Structures
//!
//! On-disk structures shared by the kernel driver and the mkfs tool.
//! Every structure here maps byte-for-byte onto its disk representation,
//! so layout changes are format changes.

// ============================================================================
// VOLUME GEOMETRY
// ============================================================================

/// Block size in bytes (one LBA)
pub const BLOCK_SIZE: usize = 512;

/// Blocks per cluster
pub const CLUSTER_BLOCK_COUNT: usize = 4;

/// Cluster size in bytes
pub const CLUSTER_SIZE: usize = BLOCK_SIZE * CLUSTER_BLOCK_COUNT;

/// Number of entries in the cluster map (fills exactly one cluster)
pub const CLUSTER_MAP_SIZE: usize = 512;

/// Directory entries per cluster
pub const ENTRIES_PER_CLUSTER: usize = CLUSTER_SIZE / DIRECTORY_ENTRY_SIZE;

/// Block holding the volume signature
pub const BOOT_BLOCK: u64 = 0;

/// Cluster holding the file allocation table
pub const FAT_CLUSTER_NUMBER: u32 = 1;

/// Cluster holding the root directory table
pub const ROOT_CLUSTER_NUMBER: u32 = 2;

/// First cluster available for allocation
pub const FIRST_ALLOCATABLE_CLUSTER: u32 = 3;

/// Name recorded in the root directory's self entry. Reserved: directory
/// creation requests using it are rejected.
pub const ROOT_DIRECTORY_NAME: [u8; 8] = *b"root\0\0\0\0";

// ============================================================================
// CLUSTER MAP VALUES
// ============================================================================

/// Reserved map value for cluster 0
pub const CLUSTER_0_VALUE: u32 = 0x0FFFFFF0;

/// Reserved map value for cluster 1
pub const CLUSTER_1_VALUE: u32 = 0x0FFFFFFF;

/// End-of-chain marker
pub const FAT_END_OF_FILE: u32 = 0x0FFFFFFF;

/// Free cluster marker
pub const FAT_EMPTY_ENTRY: u32 = 0x00000000;

// ============================================================================
// DIRECTORY ENTRY ATTRIBUTES
// ============================================================================

/// Attribute marking an entry as a subdirectory
pub const ATTR_SUBDIRECTORY: u8 = 0x10;

/// Attribute marking a directory table as a continuation cluster
pub const ATTR_SUBDIRECTORY_CHILD: u8 = 0x11;

/// User-attribute value marking an entry slot as occupied.
/// Any other value means the slot is free.
pub const UATTR_NOT_EMPTY: u8 = 0xAA;

/// Maximum directory depth accepted by recursive operations
pub const MAX_RECURSION_DEPTH: usize = 64;

// ============================================================================
// VOLUME SIGNATURE
// ============================================================================

/// Signature text at the start of the boot block, visible in hex dumps
pub const SIGNATURE_TEXT: &[u8] = b"OFAT - Osprey File Allocation Table ---- 2024\n";

/// Volume signature occupying the whole boot block.
///
/// Free-form text up front, zero padding, and a fixed "Ok" marker in the
/// last two bytes. Mounting checks the full block for equality.
pub const FS_SIGNATURE: [u8; BLOCK_SIZE] = build_signature();

const fn build_signature() -> [u8; BLOCK_SIZE] {
    let mut signature = [0u8; BLOCK_SIZE];
    let mut i = 0;
    while i < SIGNATURE_TEXT.len() {
        signature[i] = SIGNATURE_TEXT[i];
        i += 1;
    }
    signature[BLOCK_SIZE - 2] = b'O';
    signature[BLOCK_SIZE - 1] = b'k';
    signature
}

// ============================================================================
// DIRECTORY ENTRY
// ============================================================================

/// 8.3-style directory entry, 32 bytes on disk.
///
/// `n_of_entries` is only meaningful on slot 0 of a directory's head
/// cluster, where it counts the self entry plus every occupied content
/// slot across the directory's whole cluster chain.
///
/// For directories, `filesize` is occupied-cluster-count * `CLUSTER_SIZE`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: [u8; 8],       // 8 bytes - Entry name, NUL padded
    pub ext: [u8; 3],        // 3 bytes - Extension, NUL padded
    pub attribute: u8,       // 1 byte  - ATTR_* value, 0 for plain files
    pub user_attribute: u8,  // 1 byte  - UATTR_NOT_EMPTY when occupied

    pub n_of_entries: u8,    // 1 byte  - Entry count (head self entry only)
    pub create_time: u16,    // 2 bytes - Reserved for RTC integration
    pub create_date: u16,    // 2 bytes - Reserved for RTC integration
    pub access_date: u16,    // 2 bytes - Reserved for RTC integration
    pub access_time: u16,    // 2 bytes - Reserved for RTC integration
    pub modified_date: u16,  // 2 bytes - Reserved for RTC integration

    pub cluster_high: u16,   // 2 bytes - Upper half of first content cluster
    pub cluster_low: u16,    // 2 bytes - Lower half of first content cluster

    pub filesize: u32,       // 4 bytes - Size in bytes
}

pub const DIRECTORY_ENTRY_SIZE: usize = 32;

impl Default for DirectoryEntry {
    fn default() -> Self {
        Self {
            name: [0; 8],
            ext: [0; 3],
            attribute: 0,
            user_attribute: 0,
            n_of_entries: 0,
            create_time: 0,
            create_date: 0,
            access_date: 0,
            access_time: 0,
            modified_date: 0,
            cluster_high: 0,
            cluster_low: 0,
            filesize: 0,
        }
    }
}

impl DirectoryEntry {
    /// Build a fully-populated file entry
    pub fn new_file(name: [u8; 8], ext: [u8; 3], cluster: u32, filesize: u32) -> Self {
        let mut entry = Self {
            name,
            ext,
            attribute: 0,
            user_attribute: UATTR_NOT_EMPTY,
            filesize,
            ..Self::default()
        };
        entry.set_cluster(cluster);
        entry
    }

    /// Build a fully-populated subdirectory entry
    pub fn new_subdirectory(name: [u8; 8], cluster: u32) -> Self {
        let mut entry = Self {
            name,
            ext: [0; 3],
            attribute: ATTR_SUBDIRECTORY,
            user_attribute: UATTR_NOT_EMPTY,
            filesize: CLUSTER_SIZE as u32,
            ..Self::default()
        };
        entry.set_cluster(cluster);
        entry
    }

    /// First content cluster of this entry
    pub fn cluster(&self) -> u32 {
        ((self.cluster_high as u32) << 16) | self.cluster_low as u32
    }

    pub fn set_cluster(&mut self, cluster: u32) {
        self.cluster_high = (cluster >> 16) as u16;
        self.cluster_low = cluster as u16;
    }

    /// Whether this slot holds a live entry
    pub fn is_occupied(&self) -> bool {
        self.user_attribute == UATTR_NOT_EMPTY
    }

    /// Whether this entry names a subdirectory
    pub fn is_subdirectory(&self) -> bool {
        self.attribute == ATTR_SUBDIRECTORY
    }

    pub fn matches_name(&self, name: &[u8; 8]) -> bool {
        self.name == *name
    }

    pub fn matches_name_ext(&self, name: &[u8; 8], ext: &[u8; 3]) -> bool {
        self.name == *name && self.ext == *ext
    }

    /// Entry name with trailing NUL padding stripped
    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    /// Extension with trailing NUL padding stripped
    pub fn ext_str(&self) -> &str {
        let len = self.ext.iter().position(|&b| b == 0).unwrap_or(3);
        core::str::from_utf8(&self.ext[..len]).unwrap_or("")
    }
}

// ============================================================================
// DIRECTORY TABLE
// ============================================================================

/// One cluster's worth of directory entries.
///
/// Slot 0 is the self entry: it records the directory's own name, its
/// parent's cluster number in the cluster fields, and (on the head
/// cluster) the authoritative entry count and occupied size.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DirectoryTable {
    pub table: [DirectoryEntry; ENTRIES_PER_CLUSTER],
}

impl Default for DirectoryTable {
    fn default() -> Self {
        Self {
            table: [DirectoryEntry::default(); ENTRIES_PER_CLUSTER],
        }
    }
}

impl DirectoryTable {
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self as *const _ as *const u8, CLUSTER_SIZE) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self as *mut _ as *mut u8, CLUSTER_SIZE) }
    }
}

// ============================================================================
// FILE ALLOCATION TABLE
// ============================================================================

/// The cluster map, persisted as one cluster at `FAT_CLUSTER_NUMBER`.
///
/// Each slot holds the next cluster in a chain, `FAT_END_OF_FILE` for a
/// chain tail, or `FAT_EMPTY_ENTRY` for a free cluster.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FileAllocationTable {
    pub cluster_map: [u32; CLUSTER_MAP_SIZE],
}

impl Default for FileAllocationTable {
    fn default() -> Self {
        Self {
            cluster_map: [FAT_EMPTY_ENTRY; CLUSTER_MAP_SIZE],
        }
    }
}

impl FileAllocationTable {
    /// Map for a freshly formatted volume: reserved sentinels for
    /// clusters 0 and 1, a single-cluster root chain, everything else free.
    pub fn formatted() -> Self {
        let mut fat = Self::default();
        fat.cluster_map[0] = CLUSTER_0_VALUE;
        fat.cluster_map[1] = CLUSTER_1_VALUE;
        fat.cluster_map[ROOT_CLUSTER_NUMBER as usize] = FAT_END_OF_FILE;
        fat
    }

    pub fn entry(&self, cluster: u32) -> u32 {
        self.cluster_map[cluster as usize]
    }

    pub fn set_entry(&mut self, cluster: u32, value: u32) {
        self.cluster_map[cluster as usize] = value;
    }

    pub fn is_free(&self, cluster: u32) -> bool {
        self.cluster_map[cluster as usize] == FAT_EMPTY_ENTRY
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self as *const _ as *const u8, CLUSTER_SIZE) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self as *mut _ as *mut u8, CLUSTER_SIZE) }
    }
}

// ============================================================================
// CLUSTER BUFFER
// ============================================================================

/// Scratch buffer holding exactly one cluster
pub type ClusterBuffer = [u8; CLUSTER_SIZE];

// ============================================================================
// DRIVER REQUEST
// ============================================================================

/// Target of a driver operation: an 8.3 name under a parent directory.
///
/// The parent cluster must be the head cluster of a directory. Content
/// buffers are passed separately to the operation that needs them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverRequest {
    pub name: [u8; 8],
    pub ext: [u8; 3],
    pub parent_cluster: u32,
}

impl DriverRequest {
    pub fn new(name: &str, ext: &str, parent_cluster: u32) -> Self {
        Self {
            name: pack_name(name),
            ext: pack_ext(ext),
            parent_cluster,
        }
    }
}

/// Pack a name into the fixed 8-byte field, NUL padded, truncating
pub fn pack_name(name: &str) -> [u8; 8] {
    let mut packed = [0u8; 8];
    let bytes = name.as_bytes();
    let len = bytes.len().min(8);
    packed[..len].copy_from_slice(&bytes[..len]);
    packed
}

/// Pack an extension into the fixed 3-byte field, NUL padded, truncating
pub fn pack_ext(ext: &str) -> [u8; 3] {
    let mut packed = [0u8; 3];
    let bytes = ext.as_bytes();
    let len = bytes.len().min(3);
    packed[..len].copy_from_slice(&bytes[..len]);
    packed
}

// ============================================================================
// COMPILE-TIME CHECKS
// ============================================================================

const _: () = assert!(core::mem::size_of::<DirectoryEntry>() == DIRECTORY_ENTRY_SIZE);
const _: () = assert!(core::mem::size_of::<DirectoryTable>() == CLUSTER_SIZE);
const _: () = assert!(core::mem::size_of::<FileAllocationTable>() == CLUSTER_SIZE);
const _: () = assert!(ENTRIES_PER_CLUSTER == 64);
const _: () = assert!(CLUSTER_SIZE == 2048);

//! Unit tests for the OFAT driver
//!
//! Run with: cargo test --package ofat-common

use super::structures::*;
use super::*;
use std::collections::HashMap;

use osprey_driver_traits::{BlockDevice, BlockGeometry, DriverError};

// ============================================================================
// MOCK BLOCK DEVICE FOR TESTING
// ============================================================================

/// In-memory block device backing one full volume
struct MockBlockDevice {
    blocks: HashMap<u64, [u8; BLOCK_SIZE]>,
    total_blocks: u64,
}

impl MockBlockDevice {
    fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            total_blocks: (CLUSTER_MAP_SIZE * CLUSTER_BLOCK_COUNT) as u64,
        }
    }
}

impl BlockDevice for MockBlockDevice {
    fn geometry(&self) -> BlockGeometry {
        BlockGeometry {
            block_size: BLOCK_SIZE as u32,
            total_blocks: self.total_blocks,
        }
    }

    fn read_blocks(&mut self, start: u64, buffer: &mut [u8]) -> Result<usize, DriverError> {
        if buffer.len() % BLOCK_SIZE != 0 {
            return Err(DriverError::InvalidParameter);
        }
        let count = (buffer.len() / BLOCK_SIZE) as u64;
        if start + count > self.total_blocks {
            return Err(DriverError::InvalidParameter);
        }
        for i in 0..count {
            let chunk = &mut buffer[i as usize * BLOCK_SIZE..][..BLOCK_SIZE];
            match self.blocks.get(&(start + i)) {
                Some(block) => chunk.copy_from_slice(block),
                None => chunk.fill(0),
            }
        }
        Ok(buffer.len())
    }

    fn write_blocks(&mut self, start: u64, buffer: &[u8]) -> Result<usize, DriverError> {
        if buffer.len() % BLOCK_SIZE != 0 {
            return Err(DriverError::InvalidParameter);
        }
        let count = (buffer.len() / BLOCK_SIZE) as u64;
        if start + count > self.total_blocks {
            return Err(DriverError::InvalidParameter);
        }
        for i in 0..count {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(&buffer[i as usize * BLOCK_SIZE..][..BLOCK_SIZE]);
            self.blocks.insert(start + i, block);
        }
        Ok(buffer.len())
    }
}

fn fresh_fs() -> FilesystemState<MockBlockDevice> {
    FilesystemState::new(MockBlockDevice::new()).unwrap()
}

fn request(name: &str, ext: &str, parent: u32) -> DriverRequest {
    DriverRequest::new(name, ext, parent)
}

/// Occupied content entries across a whole directory chain
fn occupied_in_chain(fs: &mut FilesystemState<MockBlockDevice>, head: u32) -> usize {
    let mut total = 0;
    let mut cluster = head;
    loop {
        let table = fs.load_table(cluster).unwrap();
        total += table.occupied_entries().count();
        match fs.fat().next_in_chain(cluster) {
            Some(next) => cluster = next,
            None => return total,
        }
    }
}

// ============================================================================
// STRUCTURE TESTS
// ============================================================================

#[test]
fn test_on_disk_sizes() {
    assert_eq!(std::mem::size_of::<DirectoryEntry>(), DIRECTORY_ENTRY_SIZE);
    assert_eq!(std::mem::size_of::<DirectoryTable>(), CLUSTER_SIZE);
    assert_eq!(std::mem::size_of::<FileAllocationTable>(), CLUSTER_SIZE);
}

#[test]
fn test_signature_block() {
    assert_eq!(&FS_SIGNATURE[..SIGNATURE_TEXT.len()], SIGNATURE_TEXT);
    assert_eq!(FS_SIGNATURE[BLOCK_SIZE - 2], b'O');
    assert_eq!(FS_SIGNATURE[BLOCK_SIZE - 1], b'k');
}

#[test]
fn test_pack_name_and_ext() {
    assert_eq!(pack_name("a"), *b"a\0\0\0\0\0\0\0");
    assert_eq!(pack_name("verylongname"), *b"verylong");
    assert_eq!(pack_ext("txt"), *b"txt");
    assert_eq!(pack_ext(""), [0; 3]);
}

#[test]
fn test_entry_constructors() {
    let file = DirectoryEntry::new_file(pack_name("notes"), pack_ext("txt"), 0x12345, 100);
    assert!(file.is_occupied());
    assert!(!file.is_subdirectory());
    assert_eq!(file.cluster(), 0x12345);
    assert_eq!(file.filesize, 100);

    let dir = DirectoryEntry::new_subdirectory(pack_name("docs"), 7);
    assert!(dir.is_occupied());
    assert!(dir.is_subdirectory());
    assert_eq!(dir.cluster(), 7);
    assert_eq!(dir.filesize, CLUSTER_SIZE as u32);

    assert!(!DirectoryEntry::default().is_occupied());
}

// ============================================================================
// FORMAT AND MOUNT TESTS
// ============================================================================

#[test]
fn test_format_blank_device() {
    let mut fs = fresh_fs();
    assert!(!fs.is_empty_storage().unwrap());

    assert_eq!(fs.fat().entry(0), CLUSTER_0_VALUE);
    assert_eq!(fs.fat().entry(1), CLUSTER_1_VALUE);
    assert_eq!(fs.fat().entry(ROOT_CLUSTER_NUMBER), FAT_END_OF_FILE);
    assert_eq!(
        fs.fat().free_cluster_count(),
        CLUSTER_MAP_SIZE - FIRST_ALLOCATABLE_CLUSTER as usize
    );

    let root = fs.load_table(ROOT_CLUSTER_NUMBER).unwrap();
    assert_eq!(root.self_entry().name, ROOT_DIRECTORY_NAME);
    assert_eq!(root.parent_cluster(), ROOT_CLUSTER_NUMBER);
    assert_eq!(root.entry_count(), 1);
    assert!(root.is_empty_directory());
}

#[test]
fn test_mount_preserves_existing_volume() {
    let mut fs = fresh_fs();
    fs.write(&request("keep", "txt", ROOT_CLUSTER_NUMBER), b"still here")
        .unwrap();

    let device = fs.into_device();
    let mut remounted = FilesystemState::new(device).unwrap();

    let mut buffer = [0u8; CLUSTER_SIZE];
    let len = remounted
        .read(&request("keep", "txt", ROOT_CLUSTER_NUMBER), &mut buffer)
        .unwrap();
    assert_eq!(&buffer[..len], b"still here");
}

// ============================================================================
// ALLOCATION TABLE TESTS
// ============================================================================

#[test]
fn test_allocate_chain_links_and_terminates() {
    let mut fat = FileAllocationTable::formatted();
    let head = fat.allocate_chain(3).unwrap();
    assert_eq!(head, FIRST_ALLOCATABLE_CLUSTER);
    assert_eq!(fat.entry(3), 4);
    assert_eq!(fat.entry(4), 5);
    assert_eq!(fat.entry(5), FAT_END_OF_FILE);
    assert_eq!(fat.chain_length(head), 3);
    assert_eq!(fat.chain_tail(head), 5);
}

#[test]
fn test_allocate_chain_skips_used_clusters() {
    let mut fat = FileAllocationTable::formatted();
    fat.allocate_chain(2).unwrap();
    let second = fat.allocate_chain(1).unwrap();
    assert_eq!(second, 5);
    assert_eq!(fat.entry(5), FAT_END_OF_FILE);
}

#[test]
fn test_allocate_chain_without_space_leaves_map_untouched() {
    let mut fat = FileAllocationTable::formatted();
    let free_before = fat.free_cluster_count();
    assert!(fat.allocate_chain(free_before + 1).is_none());
    assert_eq!(fat.free_cluster_count(), free_before);
    assert!(fat.is_free(FIRST_ALLOCATABLE_CLUSTER));
}

#[test]
fn test_chain_walk_tolerates_corrupt_links() {
    let mut fat = FileAllocationTable::formatted();
    fat.set_entry(3, 600); // points outside the cluster region
    assert_eq!(fat.next_in_chain(3), None);
    assert_eq!(fat.chain_length(3), 1);
    assert_eq!(fat.next_in_chain(9999), None);
}

// ============================================================================
// WRITE AND READ TESTS
// ============================================================================

#[test]
fn test_write_and_read_file() {
    let mut fs = fresh_fs();
    let req = request("hello", "txt", ROOT_CLUSTER_NUMBER);
    fs.write(&req, b"hello world").unwrap();

    let mut buffer = [0u8; CLUSTER_SIZE];
    let len = fs.read(&req, &mut buffer).unwrap();
    assert_eq!(len, 11);
    assert_eq!(&buffer[..len], b"hello world");

    let mut small = [0u8; 4];
    assert_eq!(fs.read(&req, &mut small), Err(FsError::BufferTooSmall));
}

#[test]
fn test_write_multi_cluster_file() {
    let mut fs = fresh_fs();
    let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    let req = request("big", "bin", ROOT_CLUSTER_NUMBER);
    fs.write(&req, &data).unwrap();

    // First file on a fresh volume starts at the first allocatable cluster
    assert_eq!(fs.fat().chain_length(FIRST_ALLOCATABLE_CLUSTER), 3);

    let mut buffer = vec![0u8; 3 * CLUSTER_SIZE];
    let len = fs.read(&req, &mut buffer).unwrap();
    assert_eq!(len, data.len());
    assert_eq!(&buffer[..len], &data[..]);
}

#[test]
fn test_write_duplicate_file_rejected() {
    let mut fs = fresh_fs();
    fs.write(&request("dup", "txt", ROOT_CLUSTER_NUMBER), b"one")
        .unwrap();

    let free_before = fs.fat().free_cluster_count();
    let count_before = fs.load_table(ROOT_CLUSTER_NUMBER).unwrap().entry_count();
    let blocks_before = fs.device().blocks.clone();
    assert_eq!(
        fs.write(&request("dup", "txt", ROOT_CLUSTER_NUMBER), b"two"),
        Err(FsError::AlreadyExists)
    );
    assert_eq!(fs.fat().free_cluster_count(), free_before);
    assert_eq!(
        fs.load_table(ROOT_CLUSTER_NUMBER).unwrap().entry_count(),
        count_before
    );
    // The device is byte for byte as it was
    assert_eq!(fs.device().blocks, blocks_before);

    // Same name with a different extension is a different file
    fs.write(&request("dup", "md", ROOT_CLUSTER_NUMBER), b"two")
        .unwrap();
}

#[test]
fn test_fragmented_write_round_trip() {
    let mut fs = fresh_fs();
    fs.write(&request("pad0", "bin", ROOT_CLUSTER_NUMBER), b"a")
        .unwrap();
    fs.write(&request("hole", "bin", ROOT_CLUSTER_NUMBER), b"b")
        .unwrap();
    fs.write(&request("pad1", "bin", ROOT_CLUSTER_NUMBER), b"c")
        .unwrap();
    // Free cluster 4 between the two pads
    fs.delete(&request("hole", "bin", ROOT_CLUSTER_NUMBER), false)
        .unwrap();

    // Three clusters land at 4, 6 and 7, skipping the occupied 5
    let data: Vec<u8> = (0..5500u32).map(|i| (i % 249) as u8).collect();
    fs.write(&request("frag", "bin", ROOT_CLUSTER_NUMBER), &data)
        .unwrap();
    assert_eq!(fs.fat().next_in_chain(4), Some(6));
    assert_eq!(fs.fat().chain_length(4), 3);

    let mut buffer = vec![0u8; 3 * CLUSTER_SIZE];
    let len = fs
        .read(&request("frag", "bin", ROOT_CLUSTER_NUMBER), &mut buffer)
        .unwrap();
    assert_eq!(len, data.len());
    assert_eq!(&buffer[..len], &data[..]);
}

#[test]
fn test_directory_creation() {
    let mut fs = fresh_fs();
    fs.write(&request("docs", "", ROOT_CLUSTER_NUMBER), b"")
        .unwrap();

    let mut buffer = vec![0u8; CLUSTER_SIZE];
    let len = fs
        .read_directory(&request("docs", "", ROOT_CLUSTER_NUMBER), &mut buffer)
        .unwrap();
    assert_eq!(len, CLUSTER_SIZE);

    let mut table = DirectoryTable::default();
    table.as_bytes_mut().copy_from_slice(&buffer);
    assert_eq!(table.self_entry().name, pack_name("docs"));
    assert_eq!(table.parent_cluster(), ROOT_CLUSTER_NUMBER);
    assert!(table.is_empty_directory());
}

#[test]
fn test_file_and_directory_can_share_a_name() {
    let mut fs = fresh_fs();
    fs.write(&request("docs", "", ROOT_CLUSTER_NUMBER), b"")
        .unwrap();
    fs.write(&request("docs", "txt", ROOT_CLUSTER_NUMBER), b"notes")
        .unwrap();

    let mut buffer = vec![0u8; CLUSTER_SIZE];
    assert_eq!(
        fs.read(&request("docs", "txt", ROOT_CLUSTER_NUMBER), &mut buffer),
        Ok(5)
    );
    assert_eq!(
        fs.read_directory(&request("docs", "", ROOT_CLUSTER_NUMBER), &mut buffer),
        Ok(CLUSTER_SIZE)
    );
}

#[test]
fn test_write_into_subdirectory() {
    let mut fs = fresh_fs();
    fs.write(&request("docs", "", ROOT_CLUSTER_NUMBER), b"")
        .unwrap();
    // First allocation on a fresh volume, so the directory head is cluster 3
    let docs_cluster = FIRST_ALLOCATABLE_CLUSTER;

    fs.write(&request("a", "txt", docs_cluster), b"alpha").unwrap();

    let mut buffer = [0u8; CLUSTER_SIZE];
    let len = fs.read(&request("a", "txt", docs_cluster), &mut buffer).unwrap();
    assert_eq!(&buffer[..len], b"alpha");

    // The file is not visible from the root
    assert_eq!(
        fs.read(&request("a", "txt", ROOT_CLUSTER_NUMBER), &mut buffer),
        Err(FsError::NotFound)
    );
}

#[test]
fn test_write_rejects_invalid_parents() {
    let mut fs = fresh_fs();
    // Reserved clusters are never directory heads
    assert_eq!(
        fs.write(&request("x", "txt", 1), b"data"),
        Err(FsError::InvalidParent)
    );
    assert_eq!(
        fs.write(&request("x", "txt", 600), b"data"),
        Err(FsError::InvalidParent)
    );
    // An unallocated cluster has no parent link leading to the root
    assert_eq!(
        fs.write(&request("x", "txt", 7), b"data"),
        Err(FsError::InvalidParent)
    );
}

#[test]
fn test_root_name_is_reserved_for_directories() {
    let mut fs = fresh_fs();
    assert_eq!(
        fs.write(&request("root", "", ROOT_CLUSTER_NUMBER), b""),
        Err(FsError::ForbiddenName)
    );
    // A file may still use the name
    fs.write(&request("root", "txt", ROOT_CLUSTER_NUMBER), b"ok")
        .unwrap();
}

#[test]
fn test_write_without_space_changes_nothing() {
    let mut fs = fresh_fs();
    let free_before = fs.fat().free_cluster_count();
    let blocks_before = fs.device().blocks.clone();
    let too_big = vec![0u8; (free_before + 1) * CLUSTER_SIZE];

    assert_eq!(
        fs.write(&request("huge", "bin", ROOT_CLUSTER_NUMBER), &too_big),
        Err(FsError::OutOfSpace)
    );
    assert_eq!(fs.fat().free_cluster_count(), free_before);
    assert_eq!(
        fs.load_table(ROOT_CLUSTER_NUMBER).unwrap().entry_count(),
        1
    );
    assert_eq!(fs.device().blocks, blocks_before);
}

#[test]
fn test_read_wrong_kind() {
    let mut fs = fresh_fs();
    fs.write(&request("docs", "", ROOT_CLUSTER_NUMBER), b"")
        .unwrap();
    fs.write(&request("hello", "txt", ROOT_CLUSTER_NUMBER), b"hi")
        .unwrap();

    let mut buffer = [0u8; CLUSTER_SIZE];
    assert_eq!(
        fs.read(&request("docs", "", ROOT_CLUSTER_NUMBER), &mut buffer),
        Err(FsError::WrongKind)
    );
    assert_eq!(
        fs.read_directory(&request("hello", "", ROOT_CLUSTER_NUMBER), &mut buffer),
        Err(FsError::WrongKind)
    );
    assert_eq!(
        fs.read_directory(&request("ghost", "", ROOT_CLUSTER_NUMBER), &mut buffer),
        Err(FsError::NotFound)
    );
}

// ============================================================================
// DIRECTORY GROWTH TESTS
// ============================================================================

#[test]
fn test_full_directory_grows_a_continuation() {
    let mut fs = fresh_fs();
    fs.write(&request("docs", "", ROOT_CLUSTER_NUMBER), b"")
        .unwrap();
    let docs_cluster = FIRST_ALLOCATABLE_CLUSTER;

    // One self entry plus 63 files fills the first table
    for i in 0..ENTRIES_PER_CLUSTER {
        let name = format!("f{:02}", i);
        fs.write(&request(&name, "txt", docs_cluster), b"x").unwrap();
    }

    assert_eq!(fs.fat().chain_length(docs_cluster), 2);

    let head = fs.load_table(docs_cluster).unwrap();
    assert_eq!(head.entry_count() as usize, 1 + ENTRIES_PER_CLUSTER);
    assert_eq!(head.self_entry().filesize as usize, 2 * CLUSTER_SIZE);

    let continuation_cluster = fs.fat().next_in_chain(docs_cluster).unwrap();
    let continuation = fs.load_table(continuation_cluster).unwrap();
    assert!(continuation.is_continuation());
    assert_eq!(continuation.entry_count(), 1);
    assert_eq!(continuation.self_entry().name, pack_name("docs"));
    assert_eq!(continuation.parent_cluster(), ROOT_CLUSTER_NUMBER);

    // The root's entry for the directory reflects the new size
    let root = fs.load_table(ROOT_CLUSTER_NUMBER).unwrap();
    let docs_entry = root
        .occupied_entries()
        .find(|entry| entry.matches_name(&pack_name("docs")))
        .unwrap();
    assert_eq!(docs_entry.filesize as usize, 2 * CLUSTER_SIZE);

    // Every file is still reachable
    let mut buffer = [0u8; CLUSTER_SIZE];
    for i in 0..ENTRIES_PER_CLUSTER {
        let name = format!("f{:02}", i);
        assert_eq!(fs.read(&request(&name, "txt", docs_cluster), &mut buffer), Ok(1));
    }

    // And the grown directory reads back as two tables
    let mut chain = vec![0u8; 2 * CLUSTER_SIZE];
    let len = fs
        .read_directory(&request("docs", "", ROOT_CLUSTER_NUMBER), &mut chain)
        .unwrap();
    assert_eq!(len, 2 * CLUSTER_SIZE);
}

#[test]
fn test_space_check_covers_the_continuation_cluster() {
    let mut fs = fresh_fs();
    // Fill the root's table up to its last free slot
    for i in 0..ENTRIES_PER_CLUSTER - 2 {
        let name = format!("f{:02}", i);
        fs.write(&request(&name, "txt", ROOT_CLUSTER_NUMBER), b"x")
            .unwrap();
    }
    // The filler takes that slot and eats all but one remaining cluster
    let free = fs.fat().free_cluster_count();
    let filler = vec![0u8; (free - 1) * CLUSTER_SIZE];
    fs.write(&request("filler", "bin", ROOT_CLUSTER_NUMBER), &filler)
        .unwrap();
    assert_eq!(fs.fat().free_cluster_count(), 1);

    // One cluster of content would fit, but the continuation does not
    let count_before = fs.load_table(ROOT_CLUSTER_NUMBER).unwrap().entry_count();
    assert_eq!(
        fs.write(&request("last", "txt", ROOT_CLUSTER_NUMBER), b"x"),
        Err(FsError::OutOfSpace)
    );
    assert_eq!(fs.fat().chain_length(ROOT_CLUSTER_NUMBER), 1);
    assert_eq!(fs.fat().free_cluster_count(), 1);
    assert_eq!(
        fs.load_table(ROOT_CLUSTER_NUMBER).unwrap().entry_count(),
        count_before
    );
}

#[test]
fn test_head_count_matches_occupied_slots() {
    let mut fs = fresh_fs();
    for i in 0..70 {
        let name = format!("f{:02}", i);
        fs.write(&request(&name, "txt", ROOT_CLUSTER_NUMBER), b"x")
            .unwrap();
    }
    fs.delete(&request("f03", "txt", ROOT_CLUSTER_NUMBER), false)
        .unwrap();
    fs.delete(&request("f69", "txt", ROOT_CLUSTER_NUMBER), false)
        .unwrap();

    let head = fs.load_table(ROOT_CLUSTER_NUMBER).unwrap();
    let occupied = occupied_in_chain(&mut fs, ROOT_CLUSTER_NUMBER);
    assert_eq!(head.entry_count() as usize, occupied + 1);
    assert_eq!(occupied, 68);
}

#[test]
fn test_saturated_directory_rejects_new_entries() {
    let mut fs = fresh_fs();
    // 254 entries bring the head count to its one-byte maximum
    for i in 0..(u8::MAX as usize - 1) {
        let name = format!("f{:03}", i);
        fs.write(&request(&name, "b", ROOT_CLUSTER_NUMBER), b"x").unwrap();
    }
    assert_eq!(
        fs.load_table(ROOT_CLUSTER_NUMBER).unwrap().entry_count(),
        u8::MAX
    );

    // Slots and clusters remain, but the count cannot grow past one byte
    let free_before = fs.fat().free_cluster_count();
    assert!(free_before > 1);
    let blocks_before = fs.device().blocks.clone();
    assert_eq!(
        fs.write(&request("overflow", "b", ROOT_CLUSTER_NUMBER), b"x"),
        Err(FsError::OutOfSpace)
    );
    assert_eq!(fs.fat().free_cluster_count(), free_before);
    assert_eq!(fs.device().blocks, blocks_before);

    // Removing an entry makes room again
    fs.delete(&request("f000", "b", ROOT_CLUSTER_NUMBER), false).unwrap();
    fs.write(&request("overflow", "b", ROOT_CLUSTER_NUMBER), b"x").unwrap();
    assert_eq!(
        fs.load_table(ROOT_CLUSTER_NUMBER).unwrap().entry_count(),
        u8::MAX
    );
    assert_eq!(
        occupied_in_chain(&mut fs, ROOT_CLUSTER_NUMBER),
        u8::MAX as usize - 1
    );
}

// ============================================================================
// DELETE TESTS
// ============================================================================

#[test]
fn test_delete_file_frees_and_zeroes_clusters() {
    let mut fs = fresh_fs();
    let free_before = fs.fat().free_cluster_count();
    let data = vec![7u8; 2 * CLUSTER_SIZE + 10];
    fs.write(&request("gone", "bin", ROOT_CLUSTER_NUMBER), &data)
        .unwrap();

    fs.delete(&request("gone", "bin", ROOT_CLUSTER_NUMBER), false)
        .unwrap();

    assert_eq!(fs.fat().free_cluster_count(), free_before);
    let mut buffer = vec![0u8; 3 * CLUSTER_SIZE];
    assert_eq!(
        fs.read(&request("gone", "bin", ROOT_CLUSTER_NUMBER), &mut buffer),
        Err(FsError::NotFound)
    );

    // Freed content clusters are zeroed on disk
    let stale = fs.load_table(FIRST_ALLOCATABLE_CLUSTER).unwrap();
    assert!(stale.as_bytes().iter().all(|&byte| byte == 0));
}

#[test]
fn test_delete_empty_directory() {
    let mut fs = fresh_fs();
    let free_before = fs.fat().free_cluster_count();
    fs.write(&request("docs", "", ROOT_CLUSTER_NUMBER), b"")
        .unwrap();
    fs.delete(&request("docs", "", ROOT_CLUSTER_NUMBER), false)
        .unwrap();

    assert_eq!(fs.fat().free_cluster_count(), free_before);
    assert!(fs.load_table(ROOT_CLUSTER_NUMBER).unwrap().is_empty_directory());
}

#[test]
fn test_delete_nonempty_directory_requires_recursion() {
    let mut fs = fresh_fs();
    let free_before = fs.fat().free_cluster_count();
    fs.write(&request("docs", "", ROOT_CLUSTER_NUMBER), b"")
        .unwrap();
    fs.write(&request("a", "txt", FIRST_ALLOCATABLE_CLUSTER), b"alpha")
        .unwrap();

    assert_eq!(
        fs.delete(&request("docs", "", ROOT_CLUSTER_NUMBER), false),
        Err(FsError::NotEmpty)
    );
    fs.delete(&request("docs", "", ROOT_CLUSTER_NUMBER), true)
        .unwrap();

    assert_eq!(fs.fat().free_cluster_count(), free_before);
    let mut buffer = [0u8; CLUSTER_SIZE];
    assert_eq!(
        fs.read_directory(&request("docs", "", ROOT_CLUSTER_NUMBER), &mut buffer),
        Err(FsError::NotFound)
    );
}

#[test]
fn test_recursive_delete_frees_a_whole_subtree() {
    let mut fs = fresh_fs();
    let free_before = fs.fat().free_cluster_count();

    // root/a/b with files at every level; fresh volume allocation is
    // sequential, so the directory heads are 3 and 5
    fs.write(&request("a", "", ROOT_CLUSTER_NUMBER), b"").unwrap();
    fs.write(&request("one", "txt", 3), b"1").unwrap();
    fs.write(&request("b", "", 3), b"").unwrap();
    fs.write(&request("two", "txt", 5), b"2").unwrap();

    fs.delete(&request("a", "", ROOT_CLUSTER_NUMBER), true).unwrap();

    assert_eq!(fs.fat().free_cluster_count(), free_before);
    assert!(fs.load_table(ROOT_CLUSTER_NUMBER).unwrap().is_empty_directory());
}

#[test]
fn test_delete_selects_kind_by_extension() {
    let mut fs = fresh_fs();
    fs.write(&request("data", "", ROOT_CLUSTER_NUMBER), b"").unwrap();
    fs.write(&request("data", "txt", ROOT_CLUSTER_NUMBER), b"keep")
        .unwrap();

    // Empty extension deletes the directory, not the file
    fs.delete(&request("data", "", ROOT_CLUSTER_NUMBER), false)
        .unwrap();
    let mut buffer = [0u8; CLUSTER_SIZE];
    assert_eq!(
        fs.read(&request("data", "txt", ROOT_CLUSTER_NUMBER), &mut buffer),
        Ok(4)
    );

    fs.delete(&request("data", "txt", ROOT_CLUSTER_NUMBER), false)
        .unwrap();
    assert!(fs.load_table(ROOT_CLUSTER_NUMBER).unwrap().is_empty_directory());
}

#[test]
fn test_extensionless_file_round_trip_and_delete() {
    let mut fs = fresh_fs();
    let free_before = fs.fat().free_cluster_count();
    fs.write(&request("notes", "", ROOT_CLUSTER_NUMBER), b"no extension")
        .unwrap();

    let mut buffer = [0u8; CLUSTER_SIZE];
    let len = fs
        .read(&request("notes", "", ROOT_CLUSTER_NUMBER), &mut buffer)
        .unwrap();
    assert_eq!(&buffer[..len], b"no extension");

    fs.delete(&request("notes", "", ROOT_CLUSTER_NUMBER), false)
        .unwrap();
    assert_eq!(fs.fat().free_cluster_count(), free_before);
    assert_eq!(occupied_in_chain(&mut fs, ROOT_CLUSTER_NUMBER), 0);
    assert_eq!(
        fs.read(&request("notes", "", ROOT_CLUSTER_NUMBER), &mut buffer),
        Err(FsError::NotFound)
    );
}

#[test]
fn test_empty_ext_delete_prefers_the_directory() {
    let mut fs = fresh_fs();
    fs.write(&request("report", "", ROOT_CLUSTER_NUMBER), b"").unwrap();
    fs.write(&request("report", "", ROOT_CLUSTER_NUMBER), b"body")
        .unwrap();

    // The directory goes first, the extensionless file needs a second call
    fs.delete(&request("report", "", ROOT_CLUSTER_NUMBER), false)
        .unwrap();
    let mut buffer = [0u8; CLUSTER_SIZE];
    assert_eq!(
        fs.read(&request("report", "", ROOT_CLUSTER_NUMBER), &mut buffer),
        Ok(4)
    );

    fs.delete(&request("report", "", ROOT_CLUSTER_NUMBER), false)
        .unwrap();
    assert!(fs.load_table(ROOT_CLUSTER_NUMBER).unwrap().is_empty_directory());
}

#[test]
fn test_delete_missing_entry() {
    let mut fs = fresh_fs();
    assert_eq!(
        fs.delete(&request("ghost", "txt", ROOT_CLUSTER_NUMBER), false),
        Err(FsError::NotFound)
    );
    // An empty extension does not reach a file that has one
    fs.write(&request("plain", "txt", ROOT_CLUSTER_NUMBER), b"x")
        .unwrap();
    assert_eq!(
        fs.delete(&request("plain", "", ROOT_CLUSTER_NUMBER), false),
        Err(FsError::NotFound)
    );
}

#[test]
fn test_recursive_delete_depth_limit_is_checked_first() {
    let mut fs = fresh_fs();

    // 65 nested directories; heads run sequentially from cluster 3
    let mut parent = ROOT_CLUSTER_NUMBER;
    for i in 0..65u32 {
        let name = format!("d{:02}", i);
        fs.write(&request(&name, "", parent), b"").unwrap();
        parent = FIRST_ALLOCATABLE_CLUSTER + i;
    }

    let count_before = fs.load_table(ROOT_CLUSTER_NUMBER).unwrap().entry_count();
    let free_before = fs.fat().free_cluster_count();
    let blocks_before = fs.device().blocks.clone();
    assert_eq!(
        fs.delete(&request("d00", "", ROOT_CLUSTER_NUMBER), true),
        Err(FsError::TooDeep)
    );

    // Nothing was removed, down to the deep levels
    assert_eq!(
        fs.load_table(ROOT_CLUSTER_NUMBER).unwrap().entry_count(),
        count_before
    );
    assert_eq!(fs.fat().free_cluster_count(), free_before);
    assert_eq!(fs.device().blocks, blocks_before);
    let mut buffer = [0u8; CLUSTER_SIZE];
    assert_eq!(
        fs.read_directory(&request("d32", "", FIRST_ALLOCATABLE_CLUSTER + 31), &mut buffer),
        Ok(CLUSTER_SIZE)
    );

    // Trimming the deepest level brings the subtree inside the limit
    let deepest_parent = FIRST_ALLOCATABLE_CLUSTER + 63;
    fs.delete(&request("d64", "", deepest_parent), false).unwrap();
    fs.delete(&request("d00", "", ROOT_CLUSTER_NUMBER), true).unwrap();
    assert!(fs.load_table(ROOT_CLUSTER_NUMBER).unwrap().is_empty_directory());
}

#[test]
fn test_error_codes_are_stable() {
    assert_eq!(FsError::NotFound.code(), 1);
    assert_eq!(FsError::WrongKind.code(), 2);
    assert_eq!(FsError::InvalidParent.code(), 4);
    assert_eq!(FsError::OutOfSpace.code(), 7);
    assert_eq!(FsError::TooDeep.code(), 9);
    assert_eq!(FsError::Io(DriverError::IoError).code(), -1);
}

// ============================================================================
// VOLUME AND INDEX TESTS
// ============================================================================

#[test]
fn test_volume_indexes_names_across_directories() {
    let volume = crate::OfatFilesystem::new(MockBlockDevice::new()).unwrap();

    volume
        .write(&request("docs", "", ROOT_CLUSTER_NUMBER), b"")
        .unwrap();
    let docs_cluster = FIRST_ALLOCATABLE_CLUSTER;
    volume
        .write(&request("a", "txt", docs_cluster), b"in docs")
        .unwrap();
    volume
        .write(&request("a", "txt", ROOT_CLUSTER_NUMBER), b"in root")
        .unwrap();

    let matches = volume.whereis(&pack_name("a"));
    assert_eq!(matches.count(), 2);
    let parents: Vec<u32> = matches.entries().map(|(parent, _)| parent).collect();
    assert!(parents.contains(&ROOT_CLUSTER_NUMBER));
    assert!(parents.contains(&docs_cluster));
    for (_, ext) in matches.entries() {
        assert_eq!(ext, pack_ext("txt"));
    }

    // The index follows deletions
    volume
        .delete(&request("a", "txt", ROOT_CLUSTER_NUMBER), false)
        .unwrap();
    let matches = volume.whereis(&pack_name("a"));
    assert_eq!(matches.count(), 1);
    assert_eq!(matches.get(0), Some((docs_cluster, pack_ext("txt"))));

    assert!(volume.whereis(&pack_name("ghost")).is_empty());
}

#[test]
fn test_volume_index_includes_the_root() {
    let volume = crate::OfatFilesystem::new(MockBlockDevice::new()).unwrap();
    let matches = volume.whereis(&ROOT_DIRECTORY_NAME);
    assert_eq!(matches.count(), 1);
    assert_eq!(matches.get(0), Some((ROOT_CLUSTER_NUMBER, [0; 3])));
}

#[test]
fn test_volume_rejects_failed_operation_without_index_change() {
    let volume = crate::OfatFilesystem::new(MockBlockDevice::new()).unwrap();
    volume
        .write(&request("solo", "txt", ROOT_CLUSTER_NUMBER), b"x")
        .unwrap();

    assert_eq!(
        volume.write(&request("solo", "txt", ROOT_CLUSTER_NUMBER), b"y"),
        Err(FsError::AlreadyExists)
    );
    assert_eq!(volume.whereis(&pack_name("solo")).count(), 1);
}

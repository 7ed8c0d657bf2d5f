//! mkfs.ofat - Create OFAT disk images
//!
//! Produces a formatted single-volume image: signature block, allocation
//! table, empty root directory. With `--dir` the image is populated from a
//! host directory, mapping names to the 8.3 on-disk form.
//!
//! Usage:
//!   mkfs.ofat -o disk.img                # Create an empty 1M image
//!   mkfs.ofat -o disk.img -d ./rootfs    # Create and populate from ./rootfs

use clap::Parser;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

// Import all shared OFAT definitions
use ofat_common::core::structures::{
    BLOCK_SIZE, CLUSTER_BLOCK_COUNT, CLUSTER_MAP_SIZE, MAX_RECURSION_DEPTH, ROOT_CLUSTER_NUMBER,
};
use ofat_common::*;

/// Blocks an OFAT volume spans. The signature block is the first block of
/// cluster 0, so the volume is exactly the mapped cluster range.
const VOLUME_BLOCKS: u64 = (CLUSTER_MAP_SIZE * CLUSTER_BLOCK_COUNT) as u64;

#[derive(Parser)]
#[command(name = "mkfs.ofat")]
#[command(about = "Create OFAT disk images")]
struct Args {
    /// Output disk image file
    #[arg(short, long)]
    output: PathBuf,

    /// Disk size (e.g. 1M, 2M); must cover the fixed volume layout
    #[arg(short, long, default_value = "1M")]
    size: String,

    /// Directory to copy files from
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim().to_uppercase();
    let (num_str, mult) = if s.ends_with("G") || s.ends_with("GB") {
        (s.trim_end_matches("GB").trim_end_matches("G"), 1024 * 1024 * 1024)
    } else if s.ends_with("M") || s.ends_with("MB") {
        (s.trim_end_matches("MB").trim_end_matches("M"), 1024 * 1024)
    } else if s.ends_with("K") || s.ends_with("KB") {
        (s.trim_end_matches("KB").trim_end_matches("K"), 1024)
    } else {
        (s.as_str(), 1)
    };

    num_str.parse::<u64>().ok().map(|n| n * mult)
}

struct FileBlockDevice {
    file: File,
    total_blocks: u64,
}

impl FileBlockDevice {
    fn new(path: &PathBuf, size: u64) -> std::io::Result<Self> {
        // Open file for read+write
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size)?;
        Ok(Self {
            file,
            total_blocks: size / BLOCK_SIZE as u64,
        })
    }
}

impl BlockDevice for FileBlockDevice {
    fn geometry(&self) -> BlockGeometry {
        BlockGeometry {
            block_size: BLOCK_SIZE as u32,
            total_blocks: self.total_blocks,
        }
    }

    fn read_blocks(&mut self, start: u64, buffer: &mut [u8]) -> Result<usize, DriverError> {
        self.file
            .seek(SeekFrom::Start(start * BLOCK_SIZE as u64))
            .map_err(|_| DriverError::IoError)?;
        self.file
            .read_exact(buffer)
            .map_err(|_| DriverError::IoError)?;
        Ok(buffer.len())
    }

    fn write_blocks(&mut self, start: u64, buffer: &[u8]) -> Result<usize, DriverError> {
        self.file
            .seek(SeekFrom::Start(start * BLOCK_SIZE as u64))
            .map_err(|_| DriverError::IoError)?;
        self.file
            .write_all(buffer)
            .map_err(|_| DriverError::IoError)?;
        Ok(buffer.len())
    }

    fn flush(&mut self) -> Result<(), DriverError> {
        self.file.sync_all().map_err(|_| DriverError::IoError)
    }
}

/// Map a host file name to the on-disk 8.3 form. The part after the last
/// dot becomes the extension; both parts are truncated to fit.
fn split_name(file_name: &str) -> (String, String) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), ext.to_string()),
        _ => (file_name.to_string(), String::new()),
    }
}

/// Head cluster of a just-created subdirectory, found by scanning the
/// parent's table chain for its entry.
fn find_directory_cluster(
    fs: &mut FilesystemState<FileBlockDevice>,
    parent_cluster: u32,
    name: &str,
) -> std::io::Result<u32> {
    let packed = pack_name(name);
    let mut current = parent_cluster;
    loop {
        let table = fs
            .load_table(current)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("{:?}", e)))?;
        for entry in table.occupied_entries() {
            if entry.is_subdirectory() && entry.matches_name(&packed) {
                return Ok(entry.cluster());
            }
        }
        match fs.fat().next_in_chain(current) {
            Some(next) => current = next,
            None => break,
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("Created directory {} missing from parent", name),
    ))
}

fn populate_filesystem(
    fs: &mut FilesystemState<FileBlockDevice>,
    source_dir: &Path,
    verbose: bool,
) -> std::io::Result<()> {
    let mut file_count = 0;
    let mut dir_count = 0;
    let mut skipped_count = 0;

    fn populate_recursive(
        fs: &mut FilesystemState<FileBlockDevice>,
        source_path: &Path,
        parent_cluster: u32,
        depth: usize,
        file_count: &mut usize,
        dir_count: &mut usize,
        skipped_count: &mut usize,
        verbose: bool,
    ) -> std::io::Result<()> {
        if depth > MAX_RECURSION_DEPTH {
            if verbose {
                println!("  SKIP: {} (nested too deep)", source_path.display());
            }
            *skipped_count += 1;
            return Ok(());
        }

        for entry in fs::read_dir(source_path)? {
            let entry = entry?;
            let path = entry.path();
            let file_name = entry.file_name();
            let name_str = file_name.to_string_lossy();
            let metadata = entry.metadata()?;

            if metadata.is_dir() {
                let (name, _) = split_name(&name_str);
                let request = DriverRequest::new(&name, "", parent_cluster);
                if let Err(e) = fs.write(&request, b"") {
                    eprintln!("Failed to create directory {}: {:?}", name_str, e);
                    *skipped_count += 1;
                    continue;
                }
                *dir_count += 1;
                if verbose {
                    println!("  DIR:  {}", name_str);
                }

                let dir_cluster = find_directory_cluster(fs, parent_cluster, &name)?;
                populate_recursive(
                    fs,
                    &path,
                    dir_cluster,
                    depth + 1,
                    file_count,
                    dir_count,
                    skipped_count,
                    verbose,
                )?;
            } else if metadata.is_file() {
                let mut data = Vec::new();
                File::open(&path)?.read_to_end(&mut data)?;

                if data.is_empty() {
                    // An empty buffer would create a directory instead
                    if verbose {
                        println!("  SKIP: {} (empty file)", name_str);
                    }
                    *skipped_count += 1;
                    continue;
                }

                let (name, ext) = split_name(&name_str);
                let request = DriverRequest::new(&name, &ext, parent_cluster);
                match fs.write(&request, &data) {
                    Ok(()) => {
                        *file_count += 1;
                        if verbose {
                            println!("  FILE: {} ({} bytes)", name_str, data.len());
                        }
                    }
                    Err(e) => {
                        eprintln!("Failed to create file {}: {:?}", name_str, e);
                        *skipped_count += 1;
                    }
                }
            }
        }
        Ok(())
    }

    populate_recursive(
        fs,
        source_dir,
        ROOT_CLUSTER_NUMBER,
        1,
        &mut file_count,
        &mut dir_count,
        &mut skipped_count,
        verbose,
    )?;

    println!("\nPopulation complete:");
    println!("  Files:   {}", file_count);
    println!("  Dirs:    {}", dir_count);
    println!("  Skipped: {}", skipped_count);

    Ok(())
}

fn main() -> std::io::Result<()> {
    let args = Args::parse();

    let size = parse_size(&args.size)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput,
                                           "Invalid size format"))?;

    let volume_bytes = VOLUME_BLOCKS * BLOCK_SIZE as u64;
    if size < volume_bytes {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput,
            format!("Disk size must be at least {} bytes", volume_bytes)));
    }

    println!("Creating OFAT disk image: {}", args.output.display());
    println!("  Size: {} bytes ({} blocks)", size, size / BLOCK_SIZE as u64);

    // A blank device is formatted on mount
    let device = FileBlockDevice::new(&args.output, size)?;
    let mut fs = FilesystemState::new(device)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("{:?}", e)))?;

    if args.verbose {
        println!("  Free clusters: {}", fs.fat().free_cluster_count());
    }

    if let Some(ref dir) = args.dir {
        if !dir.exists() {
            return Err(std::io::Error::new(std::io::ErrorKind::NotFound,
                format!("Directory not found: {}", dir.display())));
        }

        println!("\nPopulating filesystem from: {}", dir.display());
        populate_filesystem(&mut fs, dir, args.verbose)?;
    }

    // Final sync
    fs.device_mut()
        .flush()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "Final sync failed"))?;

    println!("\nDone! OFAT filesystem created.");
    Ok(())
}

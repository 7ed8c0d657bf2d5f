//! Mounted volume handle
//!
//! Pairs the filesystem driver with the search index behind one lock so
//! file handles and syscall dispatch can share the volume. The index is
//! rebuilt from disk after every successful mutation.

use alloc::sync::Arc;
use spin::Mutex;

use osprey_driver_traits::BlockDevice;

use crate::core::structures::DriverRequest;
use crate::core::{FilesystemState, FsResult};
use crate::index::{IndexKey, LocationSet, SearchIndex};

struct VolumeInner<D: BlockDevice> {
    state: FilesystemState<D>,
    index: SearchIndex,
}

/// Shared OFAT volume
pub struct OfatFilesystem<D: BlockDevice + Send + Sync + 'static> {
    inner: Arc<Mutex<VolumeInner<D>>>,
}

impl<D: BlockDevice + Send + Sync + 'static> OfatFilesystem<D> {
    /// Mount the device, formatting it when blank, and build the index
    pub fn new(device: D) -> FsResult<Self> {
        let state = FilesystemState::new(device)?;
        let mut inner = VolumeInner {
            state,
            index: SearchIndex::new(),
        };
        inner.index.rebuild(&mut inner.state)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    /// Read a file's content. Returns the number of bytes copied.
    pub fn read(&self, request: &DriverRequest, buffer: &mut [u8]) -> FsResult<usize> {
        self.inner.lock().state.read(request, buffer)
    }

    /// Read a directory's raw table chain. Returns the number of bytes copied.
    pub fn read_directory(&self, request: &DriverRequest, buffer: &mut [u8]) -> FsResult<usize> {
        self.inner.lock().state.read_directory(request, buffer)
    }

    /// Create a file from `data`, or a subdirectory when `data` is empty
    pub fn write(&self, request: &DriverRequest, data: &[u8]) -> FsResult<()> {
        let mut inner = self.inner.lock();
        inner.state.write(request, data)?;
        let VolumeInner { state, index } = &mut *inner;
        index.rebuild(state)?;
        Ok(())
    }

    /// Delete a file or directory, recursing into directories when asked
    pub fn delete(&self, request: &DriverRequest, recursive: bool) -> FsResult<()> {
        let mut inner = self.inner.lock();
        inner.state.delete(request, recursive)?;
        let VolumeInner { state, index } = &mut *inner;
        index.rebuild(state)?;
        Ok(())
    }

    /// Every indexed location of `name` on the volume
    pub fn whereis(&self, name: &IndexKey) -> LocationSet {
        self.inner.lock().index.whereis(name)
    }

    /// Clusters still free for allocation
    pub fn free_clusters(&self) -> usize {
        self.inner.lock().state.fat().free_cluster_count()
    }
}

impl<D: BlockDevice + Send + Sync + 'static> Clone for OfatFilesystem<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

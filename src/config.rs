use crate::page_layout::PAGE_SIZE;

/// Minimum size of a new mmap chunk.
pub const DEFAULT_MIN_MMAP_CHUNK: usize = 64 << 20;

/// Options for opening a `Kv`.
#[derive(Debug, Clone)]
pub struct Options {
    min_mmap_chunk: usize,
    sync_dir_on_create: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            min_mmap_chunk: DEFAULT_MIN_MMAP_CHUNK,
            sync_dir_on_create: true,
        }
    }
}

impl Options {
    /// Minimum size of each mmap chunk, rounded up to whole pages.
    pub fn min_mmap_chunk(&mut self, bytes: usize) -> &mut Self {
        let pages = (bytes.max(1) + PAGE_SIZE - 1) / PAGE_SIZE;
        self.min_mmap_chunk = pages * PAGE_SIZE;
        self
    }

    /// Whether to fsync the parent directory when the file is created.
    pub fn sync_dir_on_create(&mut self, sync: bool) -> &mut Self {
        self.sync_dir_on_create = sync;
        self
    }

    pub fn mmap_chunk_bytes(&self) -> usize {
        self.min_mmap_chunk
    }

    pub fn syncs_dir_on_create(&self) -> bool {
        self.sync_dir_on_create
    }
}

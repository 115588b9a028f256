use crate::error::{Error, Result};
use crate::node::Node;
use crate::page::Page;
use crate::page_layout::PAGE_SIZE;
use crate::pager::{PageManager, PagePtr, NIL_PAGE};
use memmap::{Mmap, MmapOptions};
use std::cmp;
use std::fs::File;
use tracing::{debug, error};

/// Pages of a database file.
///
/// Committed pages are read through read-only mmap chunks. The mapping only
/// grows by appending chunks, existing chunks are never remapped, so a page
/// that was resolved once stays valid. Pages allocated by the tree are kept
/// in a staging list until the `Kv` writes them out, and are read from there
/// until then.
///
/// Released pages are never reused: `del` does nothing and the file grows
/// monotonically.
pub struct DiskPager {
    chunks: Vec<Mmap>,
    mapped: usize,
    min_chunk: usize,
    // database size in pages, the meta page included
    flushed: u64,
    staged: Vec<Page>,
}

impl DiskPager {
    pub(crate) fn create(flushed: u64, min_chunk: usize) -> DiskPager {
        DiskPager {
            chunks: Vec::new(),
            mapped: 0,
            min_chunk,
            flushed,
            staged: Vec::new(),
        }
    }

    /// Number of committed pages, the meta page included.
    pub fn flushed(&self) -> u64 {
        self.flushed
    }

    pub(crate) fn set_flushed(&mut self, flushed: u64) {
        self.flushed = flushed;
    }

    pub fn staged(&self) -> &[Page] {
        &self.staged
    }

    /// Bytes of the file covered by the mmap chunks.
    pub fn mapped_bytes(&self) -> usize {
        self.mapped
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Extends the mapping with one new chunk if `size` bytes are not
    /// covered yet. The new chunk is at least `min_chunk` bytes and at least
    /// as large as everything mapped so far, doubled until it is enough.
    pub(crate) fn ensure_mapped(&mut self, file: &File, size: usize) -> Result<()> {
        if size <= self.mapped {
            return Ok(());
        }
        let mut len = cmp::max(self.mapped, self.min_chunk);
        while self.mapped + len < size {
            len *= 2;
        }
        // Chunks are read-only and the file is only appended to past the
        // committed region, so the mapped bytes of committed pages never change.
        let chunk = unsafe {
            MmapOptions::new()
                .offset(self.mapped as u64)
                .len(len)
                .map(file)?
        };
        debug!(offset = self.mapped, len, "mapped a new chunk");
        self.chunks.push(chunk);
        self.mapped += len;
        Ok(())
    }

    /// Bytes at the start of the file, read through the first chunk.
    pub(crate) fn head(&self, len: usize) -> Result<&[u8]> {
        let first = self.chunks.first().map(|c| &c[..]).unwrap_or(&[]);
        first.get(..len).ok_or(Error::Truncated {
            needed: len,
            available: first.len(),
        })
    }

    /// Folds the staged pages into the committed ones after they were
    /// written and the meta page points at them.
    pub(crate) fn commit_staged(&mut self) {
        self.flushed += self.staged.len() as u64;
        self.staged.clear();
    }

    pub(crate) fn discard_staged(&mut self) {
        self.staged.clear();
    }
}

impl PageManager for DiskPager {
    fn get(&self, ptr: PagePtr) -> Result<Node> {
        if ptr >= self.flushed {
            // a page allocated by the update in progress
            if let Some(page) = self.staged.get((ptr - self.flushed) as usize) {
                return page.to_node();
            }
        } else if ptr != NIL_PAGE {
            let mut start: PagePtr = 0;
            for chunk in &self.chunks {
                let end = start + (chunk.len() / PAGE_SIZE) as PagePtr;
                if ptr < end {
                    let offset = (ptr - start) as usize * PAGE_SIZE;
                    return Node::from_page(&chunk[offset..offset + PAGE_SIZE]);
                }
                start = end;
            }
        }
        error!(ptr, flushed = self.flushed, "bad ptr");
        Err(Error::BadPointer(ptr))
    }

    fn new(&mut self, node: Node) -> Result<PagePtr> {
        let page = Page::from_node(&node)?;
        let ptr = self.flushed + self.staged.len() as PagePtr;
        self.staged.push(page);
        Ok(ptr)
    }

    fn del(&mut self, _ptr: PagePtr) -> Result<()> {
        Ok(())
    }
}

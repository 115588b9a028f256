//! A key-value store persisting a `BTree` to a single file.
//!
//! Every `set`/`del` rebuilds the affected path of the tree in memory and
//! then commits it:
//!
//! 1. grow the read mapping if the new pages are not covered,
//! 2. write the new pages after the last committed one,
//! 3. `fsync`, so the pages are durable before anything points at them,
//! 4. overwrite the meta page with the new root and page count,
//! 5. `fsync` again.
//!
//! The meta page is the only thing ever overwritten, so a crash before
//! step 4 leaves the previous version intact.

use crate::btree::BTree;
use crate::config::Options;
use crate::disk_pager::DiskPager;
use crate::error::{Error, Result};
use crate::meta::Meta;
use crate::page::Page;
use crate::page_layout::{META_SIZE, PAGE_SIZE};
use crate::pager::{PagePtr, NIL_PAGE};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitStep {
    Map,
    WritePages,
    SyncPages,
    WriteMeta,
    SyncMeta,
}

pub struct Kv {
    path: PathBuf,
    file: File,
    tree: BTree<DiskPager>,
    // root named by the meta page on disk
    committed_root: PagePtr,
    #[cfg(test)]
    crash_after: Option<CommitStep>,
}

impl Kv {
    /// Opens the database at `path`, creating an empty one if needed.
    pub fn open(path: impl AsRef<Path>, options: &Options) -> Result<Kv> {
        let path = path.as_ref();
        let existed = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        if !existed && options.syncs_dir_on_create() {
            sync_parent_dir(path)?;
        }

        let file_len = file.metadata()?.len();
        let mut pager = DiskPager::create(0, options.mmap_chunk_bytes());
        let root = if file_len == 0 {
            // the meta page is valid before the first node page is written
            let meta = Meta {
                root: NIL_PAGE,
                page_count: 1,
            };
            write_at(&file, &meta.encode(), 0)?;
            file.sync_all()?;
            pager.set_flushed(1);
            NIL_PAGE
        } else {
            if file_len < META_SIZE as u64 {
                error!(path = %path.display(), file_len, "file too short for a meta page");
                return Err(Error::Corruption(format!(
                    "file of {} bytes has no meta page",
                    file_len
                )));
            }
            pager.ensure_mapped(&file, file_len as usize)?;
            let meta = Meta::decode(pager.head(META_SIZE)?).and_then(|meta| {
                let file_pages = (file_len + PAGE_SIZE as u64 - 1) / PAGE_SIZE as u64;
                meta.validate(file_pages).map(|()| meta)
            });
            let meta = match meta {
                Ok(meta) => meta,
                Err(err) => {
                    error!(path = %path.display(), %err, "bad meta page");
                    return Err(err);
                }
            };
            pager.set_flushed(meta.page_count);
            meta.root
        };

        info!(
            path = %path.display(),
            root,
            pages = pager.flushed(),
            "opened database"
        );
        Ok(Kv {
            path: path.to_path_buf(),
            file,
            tree: BTree::with_root(pager, root),
            committed_root: root,
            #[cfg(test)]
            crash_after: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Root page of the committed tree, `NIL_PAGE` when empty.
    pub fn root(&self) -> PagePtr {
        self.committed_root
    }

    /// Pages in use, the meta page included.
    pub fn page_count(&self) -> u64 {
        self.tree.pager().flushed()
    }

    pub fn tree(&self) -> &BTree<DiskPager> {
        &self.tree
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.tree.get(key)
    }

    /// Inserts or updates `key` and commits.
    pub fn set(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        self.apply(|tree| tree.insert(key, val))
    }

    /// Deletes `key` and commits. Returns false if the key did not exist.
    pub fn del(&mut self, key: &[u8]) -> Result<bool> {
        self.apply(|tree| tree.delete(key))
    }

    /// Flushes file metadata and releases the file and its mappings.
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn apply<T>(&mut self, op: impl FnOnce(&mut BTree<DiskPager>) -> Result<T>) -> Result<T> {
        let result = op(&mut self.tree).and_then(|out| self.commit().map(|()| out));
        if let Err(err) = &result {
            self.rollback(err);
        }
        result
    }

    fn commit(&mut self) -> Result<()> {
        let root = self.tree.root();
        let flushed = self.tree.pager().flushed();
        let staged = self.tree.pager().staged().len() as u64;
        if staged == 0 && root == self.committed_root {
            return Ok(());
        }
        let page_count = flushed + staged;

        // 1. extend the mapping if needed
        self.tree
            .pager_mut()
            .ensure_mapped(&self.file, page_count as usize * PAGE_SIZE)?;
        self.crash_point(CommitStep::Map)?;

        // 2. write the new pages
        write_pages(&self.file, flushed, self.tree.pager().staged())?;
        self.crash_point(CommitStep::WritePages)?;

        // 3. `fsync` to enforce the order between 2 and 4
        self.file.sync_all()?;
        self.crash_point(CommitStep::SyncPages)?;

        // 4. switch the root
        let meta = Meta { root, page_count };
        write_at(&self.file, &meta.encode(), 0)?;
        let synced = self
            .crash_point(CommitStep::WriteMeta)
            .and_then(|()| {
                // 5. `fsync` to make everything persistent
                self.file.sync_all()?;
                self.crash_point(CommitStep::SyncMeta)
            });
        if let Err(err) = synced {
            self.restore_meta(flushed);
            return Err(err);
        }

        self.tree.pager_mut().commit_staged();
        self.committed_root = root;
        debug!(root, written = staged, pages = page_count, "committed");
        Ok(())
    }

    // Puts the previous meta page back after a failed commit wrote a new one.
    fn restore_meta(&self, flushed: u64) {
        let meta = Meta {
            root: self.committed_root,
            page_count: flushed,
        };
        let restored = write_at(&self.file, &meta.encode(), 0)
            .and_then(|()| self.file.sync_all().map_err(Error::from));
        if let Err(err) = restored {
            error!(%err, "failed to restore the meta page");
        }
    }

    fn rollback(&mut self, err: &Error) {
        warn!(%err, root = self.committed_root, "update failed, rolling back");
        self.tree.pager_mut().discard_staged();
        self.tree.set_root(self.committed_root);
    }

    #[cfg(test)]
    fn crash_point(&self, step: CommitStep) -> Result<()> {
        if self.crash_after == Some(step) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("simulated crash after {:?}", step),
            )));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn crash_point(&self, _step: CommitStep) -> Result<()> {
        Ok(())
    }
}

fn write_pages(file: &File, flushed: u64, pages: &[Page]) -> Result<()> {
    let mut offset = flushed * PAGE_SIZE as u64;
    for page in pages {
        write_at(file, page.as_bytes(), offset)?;
        offset += PAGE_SIZE as u64;
    }
    Ok(())
}

fn write_at(file: &File, buf: &[u8], offset: u64) -> Result<()> {
    let written = pwrite(file, buf, offset)?;
    if written != buf.len() {
        return Err(Error::ShortWrite {
            written,
            expected: buf.len(),
        });
    }
    Ok(())
}

#[cfg(unix)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, buf, offset)
}

#[cfg(windows)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, buf, offset)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_type::NodeType;
    use crate::pager::PageManager;
    use tempfile::TempDir;

    fn options() -> Options {
        let mut options = Options::default();
        options.min_mmap_chunk(16 * PAGE_SIZE);
        options
    }

    fn open(dir: &TempDir) -> Kv {
        Kv::open(dir.path().join("test.db"), &options()).unwrap()
    }

    fn crash_during_set(step: CommitStep) {
        let dir = tempfile::tempdir().unwrap();
        let mut kv = open(&dir);
        kv.set(b"a", b"1").unwrap();
        let root = kv.root();
        let pages = kv.page_count();

        kv.crash_after = Some(step);
        assert!(matches!(kv.set(b"b", b"2"), Err(Error::Io(_))));
        // the in-memory tree is back at the committed version
        assert_eq!(kv.tree().root(), root);
        assert_eq!(kv.page_count(), pages);
        assert_eq!(kv.get(b"b").unwrap(), None);
        drop(kv);

        let mut kv = open(&dir);
        assert_eq!(kv.root(), root);
        assert_eq!(kv.page_count(), pages);
        assert_eq!(kv.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(kv.get(b"b").unwrap(), None);

        // the orphaned pages are simply overwritten by the next commit
        kv.set(b"c", b"3").unwrap();
        drop(kv);
        let kv = open(&dir);
        assert_eq!(kv.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(kv.get(b"b").unwrap(), None);
        assert_eq!(kv.get(b"c").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn crash_during_the_first_commit() {
        let steps = [
            CommitStep::Map,
            CommitStep::WritePages,
            CommitStep::SyncPages,
            CommitStep::WriteMeta,
            CommitStep::SyncMeta,
        ];
        for step in steps {
            let dir = tempfile::tempdir().unwrap();
            let mut kv = open(&dir);
            kv.crash_after = Some(step);
            assert!(kv.set(b"a", b"1").is_err(), "{:?}", step);
            drop(kv);

            let mut kv = open(&dir);
            assert_eq!(kv.root(), NIL_PAGE, "{:?}", step);
            assert_eq!(kv.page_count(), 1);
            assert_eq!(kv.get(b"a").unwrap(), None);

            kv.set(b"b", b"2").unwrap();
            drop(kv);
            let kv = open(&dir);
            assert_eq!(kv.get(b"a").unwrap(), None);
            assert_eq!(kv.get(b"b").unwrap(), Some(b"2".to_vec()));
        }
    }

    #[test]
    fn crash_after_mapping() {
        crash_during_set(CommitStep::Map);
    }

    #[test]
    fn crash_after_writing_pages() {
        crash_during_set(CommitStep::WritePages);
    }

    #[test]
    fn crash_after_syncing_pages() {
        crash_during_set(CommitStep::SyncPages);
    }

    #[test]
    fn failure_after_meta_write_restores_the_meta_page() {
        crash_during_set(CommitStep::WriteMeta);
        crash_during_set(CommitStep::SyncMeta);
    }

    #[test]
    fn failed_delete_keeps_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut kv = open(&dir);
        kv.set(b"a", b"1").unwrap();
        kv.crash_after = Some(CommitStep::WritePages);
        assert!(kv.del(b"a").is_err());
        assert_eq!(kv.get(b"a").unwrap(), Some(b"1".to_vec()));
        kv.crash_after = None;
        assert!(kv.del(b"a").unwrap());
        assert_eq!(kv.get(b"a").unwrap(), None);
    }

    #[test]
    fn missing_delete_does_not_commit() {
        let dir = tempfile::tempdir().unwrap();
        let mut kv = open(&dir);
        kv.set(b"a", b"1").unwrap();
        let pages = kv.page_count();
        kv.crash_after = Some(CommitStep::Map);
        assert!(!kv.del(b"zz").unwrap());
        assert_eq!(kv.page_count(), pages);
    }

    #[test]
    fn deleting_the_last_key_commits_an_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let mut kv = open(&dir);
        for i in 0..200u32 {
            kv.set(format!("{:0>200}", i).as_bytes(), b"v").unwrap();
        }
        let root = kv.tree().pager().get(kv.root()).unwrap();
        assert_eq!(root.node_type().unwrap(), NodeType::Internal);
        for i in 0..200u32 {
            assert!(kv.del(format!("{:0>200}", i).as_bytes()).unwrap());
        }
        assert_eq!(kv.root(), NIL_PAGE);
        drop(kv);

        let kv = open(&dir);
        assert_eq!(kv.root(), NIL_PAGE);
        assert!(kv.tree().is_empty());
    }
}

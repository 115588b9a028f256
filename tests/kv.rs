//! End-to-end tests of the file backed store.

use cowbtree::meta::Meta;
use cowbtree::page_layout::{MAX_KEY_SIZE, MAX_VAL_SIZE, META_SIZE, PAGE_SIZE};
use cowbtree::{Error, Kv, Options, NIL_PAGE};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn small_chunks() -> Options {
    let mut options = Options::default();
    options.min_mmap_chunk(2 * PAGE_SIZE);
    options
}

fn create_test_db() -> (TempDir, PathBuf, Kv) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.db");
    let kv = Kv::open(&path, &small_chunks()).unwrap();
    (dir, path, kv)
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

#[test]
fn test_new_database_is_empty() {
    let (_dir, path, kv) = create_test_db();
    assert_eq!(kv.root(), NIL_PAGE);
    assert_eq!(kv.page_count(), 1);
    assert_eq!(kv.get(b"anything").unwrap(), None);
    kv.close().unwrap();

    // only the meta page of the empty tree
    assert_eq!(file_len(&path), META_SIZE as u64);
    let kv = Kv::open(&path, &small_chunks()).unwrap();
    assert_eq!(kv.root(), NIL_PAGE);
}

#[test]
fn test_updates_survive_reopen() {
    let (_dir, path, mut kv) = create_test_db();
    kv.set(b"apple", b"red").unwrap();
    kv.set(b"banana", b"yellow").unwrap();
    kv.set(b"cherry", b"dark red").unwrap();
    kv.set(b"apple", b"green").unwrap();
    assert!(kv.del(b"banana").unwrap());
    let root = kv.root();
    let pages = kv.page_count();
    kv.close().unwrap();

    assert_eq!(file_len(&path), pages * PAGE_SIZE as u64);
    let kv = Kv::open(&path, &small_chunks()).unwrap();
    assert_eq!(kv.root(), root);
    assert_eq!(kv.page_count(), pages);
    assert_eq!(kv.get(b"apple").unwrap(), Some(b"green".to_vec()));
    assert_eq!(kv.get(b"banana").unwrap(), None);
    assert_eq!(kv.get(b"cherry").unwrap(), Some(b"dark red".to_vec()));
}

#[test]
fn test_file_grows_across_many_chunks() {
    let (_dir, path, mut kv) = create_test_db();
    for i in 0..300u32 {
        let key = format!("key{:05}", i);
        kv.set(key.as_bytes(), &[i as u8; 100]).unwrap();
    }
    assert!(kv.tree().pager().num_chunks() > 1);
    for i in (0..300u32).step_by(3) {
        assert!(kv.del(format!("key{:05}", i).as_bytes()).unwrap());
    }
    drop(kv);

    let kv = Kv::open(&path, &small_chunks()).unwrap();
    let entries = kv.tree().entries().unwrap();
    assert_eq!(entries.len(), 200);
    for i in 0..300u32 {
        let got = kv.get(format!("key{:05}", i).as_bytes()).unwrap();
        if i % 3 == 0 {
            assert_eq!(got, None);
        } else {
            assert_eq!(got, Some(vec![i as u8; 100]));
        }
    }
}

#[test]
fn test_large_entries() {
    let (_dir, path, mut kv) = create_test_db();
    let big_key = vec![b'k'; MAX_KEY_SIZE];
    let big_val = vec![b'v'; MAX_VAL_SIZE];
    kv.set(&big_key, &big_val).unwrap();
    kv.set(b"small", b"1").unwrap();
    drop(kv);

    let kv = Kv::open(&path, &small_chunks()).unwrap();
    assert_eq!(kv.get(&big_key).unwrap(), Some(big_val));
    assert_eq!(kv.get(b"small").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_invalid_updates_write_nothing() {
    let (_dir, path, mut kv) = create_test_db();
    kv.set(b"a", b"1").unwrap();
    let pages = kv.page_count();
    let len = file_len(&path);

    assert!(matches!(kv.set(b"", b"v"), Err(Error::EmptyKey)));
    assert!(matches!(
        kv.set(&vec![b'k'; MAX_KEY_SIZE + 1], b"v"),
        Err(Error::KeyTooLong(n)) if n == MAX_KEY_SIZE + 1
    ));
    assert!(matches!(
        kv.set(b"k", &vec![b'v'; MAX_VAL_SIZE + 1]),
        Err(Error::ValueTooLong(n)) if n == MAX_VAL_SIZE + 1
    ));
    assert!(!kv.del(b"missing").unwrap());

    assert_eq!(kv.page_count(), pages);
    assert_eq!(file_len(&path), len);
    assert_eq!(kv.get(b"a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_deleting_everything() {
    let (_dir, path, mut kv) = create_test_db();
    for key in ["x", "y", "z"] {
        kv.set(key.as_bytes(), b"v").unwrap();
    }
    for key in ["x", "y", "z"] {
        assert!(kv.del(key.as_bytes()).unwrap());
    }
    assert_eq!(kv.root(), NIL_PAGE);
    drop(kv);

    let mut kv = Kv::open(&path, &small_chunks()).unwrap();
    assert_eq!(kv.root(), NIL_PAGE);
    assert!(kv.tree().entries().unwrap().is_empty());
    kv.set(b"y", b"again").unwrap();
    assert_eq!(kv.get(b"y").unwrap(), Some(b"again".to_vec()));
}

#[test]
fn test_bad_signature_is_corruption() {
    let (_dir, path, mut kv) = create_test_db();
    kv.set(b"a", b"1").unwrap();
    drop(kv);

    let mut data = std::fs::read(&path).unwrap();
    data[0] ^= 0xff;
    std::fs::write(&path, &data).unwrap();
    assert!(matches!(
        Kv::open(&path, &small_chunks()),
        Err(Error::Corruption(_))
    ));
}

#[test]
fn test_meta_page_beyond_the_file_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.db");
    let mut data = vec![0u8; PAGE_SIZE];
    let meta = Meta {
        root: 1,
        page_count: 100,
    };
    data[..32].copy_from_slice(&meta.encode());
    std::fs::write(&path, &data).unwrap();
    assert!(matches!(
        Kv::open(&path, &small_chunks()),
        Err(Error::Corruption(_))
    ));

    std::fs::write(&path, b"short").unwrap();
    assert!(matches!(
        Kv::open(&path, &small_chunks()),
        Err(Error::Corruption(_))
    ));
}

#[test]
fn test_open_without_directory_sync() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = small_chunks();
    options.sync_dir_on_create(false);
    let mut kv = Kv::open(dir.path().join("data.db"), &options).unwrap();
    kv.set(b"k", b"v").unwrap();
    assert_eq!(kv.get(b"k").unwrap(), Some(b"v".to_vec()));
    assert_eq!(kv.path(), dir.path().join("data.db"));
}

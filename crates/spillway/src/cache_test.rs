//! Tests for cache file pair management

use std::fs;
use std::io::{Read, Seek, SeekFrom};

use tempfile::TempDir;

use super::{READ_CACHE, SpillCache, WRITE_CACHE};

fn read_file_contents(file: &mut std::fs::File) -> Vec<u8> {
    file.seek(SeekFrom::Start(0)).unwrap();
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).unwrap();
    bytes
}

#[test]
fn test_open_creates_directory_and_files() {
    let dir = TempDir::new().unwrap();
    let cache_dir = dir.path().join("nested").join("cache");

    let (cache, _read) = SpillCache::open(&cache_dir).unwrap();

    assert!(cache_dir.join(READ_CACHE).exists());
    assert!(cache_dir.join(WRITE_CACHE).exists());
    assert!(!cache.modified());
    assert!(cache.reading());
    assert!(cache.has_pending());
}

#[test]
fn test_residual_write_file_marks_modified() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(WRITE_CACHE), b"leftover").unwrap();

    let (cache, _read) = SpillCache::open(dir.path()).unwrap();
    assert!(cache.modified());
}

#[test]
fn test_append_sets_modified() {
    let dir = TempDir::new().unwrap();
    let (cache, _read) = SpillCache::open(dir.path()).unwrap();

    assert!(!cache.modified());
    cache.append(b"frame").unwrap();
    assert!(cache.modified());
    assert_eq!(
        fs::read(dir.path().join(WRITE_CACHE)).unwrap(),
        b"frame".to_vec()
    );
}

#[test]
fn test_swap_exchanges_roles() {
    let dir = TempDir::new().unwrap();
    let (cache, mut read) = SpillCache::open(dir.path()).unwrap();

    cache.append(b"spilled").unwrap();
    cache.swap(&mut read).unwrap();

    // the old write file is now readable through the read handle, rewound
    assert_eq!(read_file_contents(&mut read), b"spilled".to_vec());
    assert!(!cache.modified());
    assert!(cache.reading());

    // new appends land in the other file (named cache_a after one swap)
    cache.append(b"next").unwrap();
    assert_eq!(
        fs::read(dir.path().join(READ_CACHE)).unwrap(),
        b"next".to_vec()
    );
}

#[test]
fn test_finish_read_pass_quiesces() {
    let dir = TempDir::new().unwrap();
    let (cache, _read) = SpillCache::open(dir.path()).unwrap();
    let idle = cache.subscribe_idle();

    cache.finish_read_pass();
    assert!(!cache.reading());
    assert!(!cache.has_pending());
    assert!(*idle.borrow());
}

#[test]
fn test_finish_read_pass_stays_busy_when_modified() {
    let dir = TempDir::new().unwrap();
    let (cache, _read) = SpillCache::open(dir.path()).unwrap();
    let idle = cache.subscribe_idle();

    cache.append(b"frame").unwrap();
    cache.finish_read_pass();

    assert!(cache.has_pending());
    assert!(!*idle.borrow());
}

#[test]
fn test_close_write_is_idempotent_and_fails_appends() {
    let dir = TempDir::new().unwrap();
    let (cache, mut read) = SpillCache::open(dir.path()).unwrap();

    assert!(cache.close_write().is_some());
    assert!(cache.close_write().is_none());
    assert!(cache.append(b"frame").is_err());
    assert!(cache.swap(&mut read).is_err());
}

//! Cache file pair management.
//!
//! The spill engine keeps two append-only files in the cache directory:
//! `cache_a` starts in the read role and `cache_b` in the write role. The
//! dispatcher appends frames to the write file while the drainer decodes the
//! read file, so the two sides never touch the same handle. When the read
//! file is exhausted and the write file has data, the roles swap.
//!
//! A single mutex (the *spill lock*) guards the write-role handle, the
//! `modified` flag transitions, and role swaps. It is held for one append or
//! one swap at a time, never across an output send. `modified` and `reading`
//! are additionally readable without the lock, which is what makes
//! [`has_pending`](SpillCache::has_pending) a cheap quiescence probe.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::mem;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Notify, watch};

use crate::error::{Result, SpillError};

/// File holding the read role at startup
pub(crate) const READ_CACHE: &str = "cache_a";

/// File holding the write role at startup
pub(crate) const WRITE_CACHE: &str = "cache_b";

/// Shared state of the spill engine
pub(crate) struct SpillCache {
    /// Spill lock. `None` once commit has closed the files.
    write: Mutex<Option<File>>,

    /// The write file holds frames not yet swapped into the read role
    modified: AtomicBool,

    /// The drainer has not yet exhausted the read file
    reading: AtomicBool,

    /// Wakes the drainer as soon as a spill write lands
    modified_notify: Notify,

    /// True between a read pass ending with nothing modified and the next
    /// spill write. The dispatcher's shutdown handshake waits on this edge.
    idle: watch::Sender<bool>,
}

impl SpillCache {
    /// Open (or create) the cache pair in `dir`.
    ///
    /// Returns the cache plus the read-role handle, which the drainer takes
    /// ownership of. A non-empty write file is residual data from a prior
    /// run (crash or [`commit`](crate::SpillQueue::commit)); it is marked
    /// modified so the drainer swaps it in once `cache_a` is exhausted.
    pub(crate) fn open(dir: &Path) -> Result<(Self, File)> {
        fs::create_dir_all(dir).map_err(|e| SpillError::CreateDir {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let read = open_cache_file(&dir.join(READ_CACHE))?;
        let write = open_cache_file(&dir.join(WRITE_CACHE))?;

        let read_len = cache_file_len(&read, dir, READ_CACHE)?;
        let write_len = cache_file_len(&write, dir, WRITE_CACHE)?;
        let residual = write_len != 0;
        if read_len != 0 || residual {
            tracing::info!(
                dir = %dir.display(),
                read_bytes = read_len,
                write_bytes = write_len,
                "recovering residual cache data"
            );
        }

        let (idle, _) = watch::channel(false);
        let cache = Self {
            write: Mutex::new(Some(write)),
            modified: AtomicBool::new(residual),
            reading: AtomicBool::new(true),
            modified_notify: Notify::new(),
            idle,
        };
        Ok((cache, read))
    }

    pub(crate) fn modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    pub(crate) fn reading(&self) -> bool {
        self.reading.load(Ordering::Acquire)
    }

    /// Anything left on disk to deliver?
    pub(crate) fn has_pending(&self) -> bool {
        self.modified() || self.reading()
    }

    /// Append one encoded frame to the write file.
    ///
    /// The spill lock is held for the duration of the append so a role swap
    /// cannot interleave with a partially written frame.
    pub(crate) fn append(&self, frame: &[u8]) -> io::Result<()> {
        let mut guard = self.write.lock();
        let Some(file) = guard.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "cache files closed by commit",
            ));
        };
        file.write_all(frame)?;
        self.modified.store(true, Ordering::Release);
        self.idle.send_replace(false);
        drop(guard);

        self.modified_notify.notify_one();
        Ok(())
    }

    /// Mark the end of a read pass.
    ///
    /// Taking the lock orders this against concurrent appends: if nothing
    /// was modified by the time the pass ends, the queue is quiescent and
    /// the idle edge fires.
    pub(crate) fn finish_read_pass(&self) {
        let guard = self.write.lock();
        self.reading.store(false, Ordering::Release);
        if !self.modified.load(Ordering::Acquire) {
            self.idle.send_replace(true);
        }
        drop(guard);
    }

    /// Swap file roles.
    ///
    /// The exhausted (already truncated) read handle becomes the write
    /// target and the modified write file becomes the new read source,
    /// rewound to the start.
    pub(crate) fn swap(&self, read: &mut File) -> io::Result<()> {
        let mut guard = self.write.lock();
        let Some(write) = guard.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "cache files closed by commit",
            ));
        };
        mem::swap(read, write);
        read.seek(SeekFrom::Start(0))?;
        self.modified.store(false, Ordering::Release);
        self.reading.store(true, Ordering::Release);
        Ok(())
    }

    /// Resolves when a spill write lands
    pub(crate) async fn modified_signal(&self) {
        self.modified_notify.notified().await;
    }

    pub(crate) fn subscribe_idle(&self) -> watch::Receiver<bool> {
        self.idle.subscribe()
    }

    /// Take the write handle out of service. Subsequent appends and swaps
    /// fail; calling this twice returns `None`.
    pub(crate) fn close_write(&self) -> Option<File> {
        self.write.lock().take()
    }
}

fn cache_file_len(file: &File, dir: &Path, name: &str) -> Result<u64> {
    file.metadata()
        .map(|m| m.len())
        .map_err(|e| SpillError::OpenCache {
            path: dir.join(name),
            source: e,
        })
}

fn open_cache_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| SpillError::OpenCache {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;

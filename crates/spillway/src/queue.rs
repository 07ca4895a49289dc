//! The spill queue: producer/consumer handles, dispatcher, drainer, commit.
//!
//! Two long-lived tasks run per queue. The *dispatcher* moves items from the
//! input port to the bounded output buffer, routing to the write cache file
//! when the buffer is full and the pause gate is open. The *drainer* decodes
//! the read cache file back into the output buffer, swapping file roles when
//! its side runs dry. The tasks share only the spill lock, the pause gate,
//! and the atomic `modified`/`reading` flags.
//!
//! Shutdown is a handshake: the producer closes the input (drops the
//! sender), the dispatcher waits for the spill path to quiesce, stops the
//! drainer, and the output closes once both tasks have released their
//! senders. [`SpillQueue::commit`] replaces the quiesce wait for teardown:
//! it vacuums whatever is still buffered back to disk so a later queue on
//! the same directory picks it up.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::cache::SpillCache;
use crate::codec::{self, FrameReader};
use crate::config::SpillConfig;
use crate::error::Result;
use crate::gate::PauseGate;
use crate::metrics::{MetricsSnapshot, SpillMetrics};

/// Capacity of the input handoff channel. One slot is the closest Tokio
/// analogue of an unbuffered rendezvous; a producer can run at most one item
/// ahead of the dispatcher.
const INPUT_CAPACITY: usize = 1;

/// Read-side buffer size for drain passes
const READ_BUF_SIZE: usize = 32 * 1024;

/// Poll interval for [`SpillQueue::drain`]
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// State shared by the queue handle and its tasks
struct Inner {
    /// `None` when no cache directory was configured (spill disabled)
    cache: Option<Arc<SpillCache>>,

    gate: PauseGate,

    /// Stops the drainer: no more disk → output deliveries
    stop: CancellationToken,

    /// Latched by the drainer on exit; awaited by shutdown and commit
    drainer_done: CancellationToken,

    /// Latched by `commit`; releases the dispatcher's quiesce wait
    committed: CancellationToken,

    metrics: SpillMetrics,

    swap_poll_interval: Duration,
}

/// Producer handle for a [`SpillQueue`]
///
/// There is exactly one sender per queue; dropping it closes the input port
/// and begins the queue's shutdown handshake.
pub struct SpillSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> SpillSender<T> {
    /// Hand one item to the queue.
    ///
    /// Blocks while the pipeline is applying backpressure (buffer full and
    /// spilling disabled or paused). Returns the item back if the queue has
    /// been dropped.
    pub async fn send(&self, item: T) -> std::result::Result<(), T> {
        self.tx.send(item).await.map_err(|e| e.0)
    }

    /// True once the queue side has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Close the input port. Equivalent to dropping the sender.
    pub fn close(self) {}
}

impl<T> std::fmt::Debug for SpillSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillSender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Consumer and control handle for a spill-to-disk channel
///
/// Behaves as a bounded in-memory queue under normal conditions and as an
/// unbounded disk-backed queue under backpressure. See the crate docs for
/// the full protocol.
pub struct SpillQueue<T> {
    inner: Arc<Inner>,
    output: mpsc::Receiver<T>,
}

impl<T> SpillQueue<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Create a queue and its producer handle.
    ///
    /// Must be called from within a Tokio runtime; the queue spawns its
    /// dispatcher and (when a cache directory is configured) drainer tasks.
    ///
    /// If the cache directory already holds cache files from a prior run,
    /// draining them begins immediately; this is how data persisted by
    /// [`commit`](Self::commit) or left behind by a crash is recovered.
    pub fn new(config: SpillConfig) -> Result<(SpillSender<T>, SpillQueue<T>)> {
        let depth = config.effective_depth();
        let (in_tx, in_rx) = mpsc::channel(INPUT_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(depth);

        let mut read_file = None;
        let cache = match &config.cache_dir {
            Some(dir) => {
                let (cache, file) = SpillCache::open(dir)?;
                read_file = Some(file);
                Some(Arc::new(cache))
            }
            None => None,
        };

        let inner = Arc::new(Inner {
            cache,
            gate: PauseGate::new(),
            stop: CancellationToken::new(),
            drainer_done: CancellationToken::new(),
            committed: CancellationToken::new(),
            metrics: SpillMetrics::default(),
            swap_poll_interval: config.swap_poll_interval,
        });

        tracing::debug!(
            depth,
            spill = inner.cache.is_some(),
            "spill queue starting"
        );

        if let Some(file) = read_file {
            tokio::spawn(run_drainer::<T>(file, out_tx.clone(), Arc::clone(&inner)));
        }
        tokio::spawn(run_dispatcher(in_rx, out_tx, Arc::clone(&inner)));

        Ok((
            SpillSender { tx: in_tx },
            SpillQueue {
                inner,
                output: out_rx,
            },
        ))
    }

    /// Vacuum the remaining buffer to disk and close the cache files.
    ///
    /// Call after closing the input (and optionally receiving part of the
    /// stream). The drainer is stopped, everything still buffered is written
    /// back to the write cache file, and the on-disk pair becomes the
    /// authoritative remaining queue for a future `SpillQueue` opened on the
    /// same directory. The output is closed when this returns.
    ///
    /// Draining cannot be restarted afterwards; commit is a teardown
    /// operation. With spilling disabled this only marks the queue
    /// committed. Idempotent.
    pub async fn commit(&mut self) -> Result<()> {
        self.inner.committed.cancel();
        let Some(cache) = self.inner.cache.clone() else {
            return Ok(());
        };
        self.inner.stop.cancel();

        // Vacuum the buffer while waiting for the drainer to acknowledge.
        // The drainer may still be finishing a read pass, with its items
        // flowing through the buffer and straight back to disk here; the
        // randomized select keeps the acknowledgement from being starved.
        let mut acked = false;
        let mut drained = false;
        while !(acked && drained) {
            tokio::select! {
                _ = self.inner.drainer_done.cancelled(), if !acked => {
                    acked = true;
                }
                item = self.output.recv(), if !drained => match item {
                    Some(item) => spill_item(&self.inner, &cache, &item),
                    None => drained = true,
                },
            }
        }

        if let Some(write) = cache.close_write() {
            write.sync_all()?;
        }
        Ok(())
    }
}

impl<T> SpillQueue<T> {
    /// Receive the next item.
    ///
    /// Returns `None` once the input is closed, the spill path has fully
    /// drained, and every buffered item has been delivered (or, after
    /// [`commit`](Self::commit), immediately).
    pub async fn recv(&mut self) -> Option<T> {
        self.output.recv().await
    }

    /// Number of items currently in the in-memory output buffer
    pub fn buffer_depth(&self) -> usize {
        self.output.len()
    }

    /// True while the cache files hold undelivered data
    pub fn pending_spill(&self) -> bool {
        self.inner
            .cache
            .as_deref()
            .is_some_and(SpillCache::has_pending)
    }

    /// True when a cache directory was configured
    pub fn spill_enabled(&self) -> bool {
        self.inner.cache.is_some()
    }

    /// Forbid new spill writes.
    ///
    /// The dispatcher falls back to blocking on the output buffer, applying
    /// backpressure to the producer. The drainer keeps delivering items that
    /// are already on disk. Idempotent; a no-op when spilling is disabled.
    pub fn pause_spill(&self) {
        if self.inner.cache.is_some() {
            self.inner.gate.close();
        }
    }

    /// Re-allow spill writes. Idempotent; a no-op when spilling is disabled.
    pub fn resume_spill(&self) {
        if self.inner.cache.is_some() {
            self.inner.gate.open();
        }
    }

    /// Snapshot of the spill counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Block until the in-memory buffer is empty.
    ///
    /// New items may still be arriving while this returns, so the result is
    /// only a point-in-time observation. For a guaranteed-complete drain,
    /// close the input and receive until `None` instead.
    pub async fn drain(&self) {
        while !self.output.is_empty() {
            sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}

impl<T> std::fmt::Debug for SpillQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillQueue")
            .field("buffer_depth", &self.buffer_depth())
            .field("spill_enabled", &self.spill_enabled())
            .field("pending_spill", &self.pending_spill())
            .finish()
    }
}

/// Encode and append one item to the write cache file.
///
/// Failures are logged and counted; the item is dropped. The queue never
/// raises spill-path errors out of `send`/`recv`.
fn spill_item<T: Serialize>(inner: &Inner, cache: &SpillCache, item: &T) {
    let frame = match codec::encode_frame(item) {
        Ok(frame) => frame,
        Err(e) => {
            inner.metrics.record_encode_error();
            tracing::error!(error = %e, "dropping item that failed to encode for spill");
            return;
        }
    };
    if let Err(e) = cache.append(&frame) {
        inner.metrics.record_write_error();
        tracing::error!(error = %e, "dropping item after cache append failure");
        return;
    }
    inner.metrics.record_spilled();
}

/// Dispatcher task: input → output, or input → write cache under pressure.
async fn run_dispatcher<T>(mut input: mpsc::Receiver<T>, out: mpsc::Sender<T>, inner: Arc<Inner>)
where
    T: Serialize + Send + 'static,
{
    loop {
        let item = tokio::select! {
            item = input.recv() => match item {
                Some(item) => item,
                None => break,
            },
            // a dropped consumer ends the pipeline even with the input open
            _ = out.closed() => break,
        };

        // fast path
        let item = match out.try_reserve() {
            Ok(permit) => {
                permit.send(item);
                continue;
            }
            Err(TrySendError::Closed(())) => break,
            Err(TrySendError::Full(())) => item,
        };

        let Some(cache) = inner.cache.as_deref() else {
            // no spill path: backpressure onto the producer
            if out.send(item).await.is_err() {
                break;
            }
            continue;
        };

        // The buffer is full. Race a buffer slot against the pause gate:
        // whichever is ready first decides the route.
        tokio::select! {
            permit = out.reserve() => match permit {
                Ok(permit) => permit.send(item),
                Err(_) => break,
            },
            _ = inner.gate.wait_open() => {
                // the consumer may have caught up while we waited on the
                // gate; memory wins the tie
                match out.try_reserve() {
                    Ok(permit) => permit.send(item),
                    Err(TrySendError::Closed(())) => break,
                    Err(TrySendError::Full(())) => spill_item(&inner, cache, &item),
                }
            }
        }
    }

    // Input closed (or the consumer vanished). Let the spill path quiesce,
    // stop the drainer, and close the output by releasing the sender.
    if let Some(cache) = inner.cache.as_deref() {
        let mut idle = cache.subscribe_idle();
        tokio::select! {
            _ = idle.wait_for(|quiet| *quiet) => {}
            _ = inner.committed.cancelled() => {}
            _ = inner.drainer_done.cancelled() => {}
        }
        inner.stop.cancel();
        inner.drainer_done.cancelled().await;
    }

    let snapshot = inner.metrics.snapshot();
    tracing::debug!(
        spilled = snapshot.items_spilled,
        drained = snapshot.items_drained,
        swaps = snapshot.cache_swaps,
        "spill queue dispatcher stopped"
    );
}

/// Drainer task: read cache → output, swapping file roles as sides run dry.
async fn run_drainer<T>(mut file: File, out: mpsc::Sender<T>, inner: Arc<Inner>)
where
    T: DeserializeOwned + Send + 'static,
{
    let Some(cache) = inner.cache.clone() else {
        // drainer is only spawned with a cache configured
        inner.drainer_done.cancel();
        return;
    };

    'read: loop {
        // stream-decode the read file into the output
        {
            let mut reader = FrameReader::new(BufReader::with_capacity(READ_BUF_SIZE, &file));
            loop {
                match reader.next_item::<T>() {
                    Ok(Some(item)) => {
                        if out.send(item).await.is_err() {
                            // consumer is gone; leave the file for recovery
                            break 'read;
                        }
                        inner.metrics.record_drained();
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // treat the file as exhausted at this offset
                        inner.metrics.record_decode_error();
                        tracing::warn!(
                            error = %e,
                            "cache decode failed, discarding rest of read file"
                        );
                        break;
                    }
                }
            }
        }

        // Reset the exhausted file so the next swap starts from empty.
        // This happens before the shutdown check: a commit arriving mid-pass
        // must not leave already-delivered frames behind for redelivery.
        if let Err(e) = reset_read_file(&mut file) {
            tracing::error!(error = %e, "failed to truncate drained cache file, drainer exiting");
            cache.finish_read_pass();
            break 'read;
        }
        cache.finish_read_pass();

        // wait for the write file to fill, or for shutdown
        loop {
            if inner.stop.is_cancelled() {
                break 'read;
            }
            if cache.modified() {
                break;
            }
            tokio::select! {
                _ = inner.stop.cancelled() => break 'read,
                _ = cache.modified_signal() => {}
                _ = sleep(inner.swap_poll_interval) => {}
            }
        }

        if let Err(e) = cache.swap(&mut file) {
            tracing::error!(error = %e, "cache swap failed, drainer exiting");
            break 'read;
        }
        inner.metrics.record_swap();
    }

    inner.drainer_done.cancel();
}

fn reset_read_file(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(())
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;

//! Spillway - durable spill-to-disk channel
//!
//! A producer/consumer pipeline whose bounded in-memory buffer overflows to
//! a local disk cache when the consumer falls behind, and whose on-disk
//! overflow drains back through the pipeline as the consumer catches up.
//! Under normal conditions it behaves as a bounded in-memory queue; under
//! backpressure it becomes an unbounded disk-backed queue, and data
//! persisted to disk survives a crash for recovery on the next open.
//!
//! # Architecture
//!
//! ```text
//!                        ┌────────────┐  fast path  ┌──────────┐
//! producer ── send() ──→ │ Dispatcher │ ──────────→ │  Output  │ ── recv() ──→ consumer
//!                        └─────┬──────┘             └──────────┘
//!              buffer full and │                         ↑
//!              pause gate open ▼                         │
//!                        ┌──────────┐      swap     ┌────┴─────┐
//!                        │ cache_b  │ ←───────────→ │ cache_a  │ ←── Drainer
//!                        │ (write)  │               │  (read)  │
//!                        └──────────┘               └──────────┘
//! ```
//!
//! # Key Design
//!
//! - **Channel-based**: the ports are `tokio::sync::mpsc` channels; output
//!   closure falls out of sender-drop semantics once both tasks finish
//! - **Permit routing**: the dispatcher routes with `try_reserve`/`reserve`
//!   so an item is never lost to a cancelled send
//! - **Two files, disjoint handles**: the dispatcher appends to one cache
//!   file while the drainer decodes the other; an atomic role swap hands
//!   accumulated overflow to the read side
//! - **Cheap quiescence probe**: `modified`/`reading` are lock-free atomics,
//!   so [`SpillQueue::pending_spill`] costs two loads
//! - **Pause gate**: a re-openable latch that redirects overflow back into
//!   producer backpressure without stopping the drain of existing spill
//! - **Commit**: terminal flush of the remaining buffer to disk, making the
//!   cache directory the authoritative queue for a future open
//!
//! # Example
//!
//! ```ignore
//! use spillway::{SpillConfig, SpillQueue};
//!
//! let config = SpillConfig::new()
//!     .with_max_depth(1024)
//!     .with_cache_dir("/var/cache/ingest");
//! let (tx, mut queue) = SpillQueue::new(config)?;
//!
//! tokio::spawn(async move {
//!     for entry in entries {
//!         let _ = tx.send(entry).await;
//!     }
//!     // dropping tx closes the input
//! });
//!
//! while let Some(entry) = queue.recv().await {
//!     forward(entry).await;
//! }
//! // output closed: input closed and the spill path fully drained
//! ```
//!
//! # Durability
//!
//! Spilled data is best-effort durable: appends are not individually synced,
//! and a crash loses at worst the in-memory buffer plus a partial trailing
//! record per file. [`SpillQueue::commit`] is the deliberate persistence
//! point for clean shutdown. Cache files are private state owned by the
//! queue; their format is not stable across versions.

mod cache;
mod codec;
mod config;
mod error;
mod gate;
mod metrics;
mod queue;

pub use config::{MAX_DEPTH, SpillConfig};
pub use error::{Result, SpillError};
pub use metrics::MetricsSnapshot;
pub use queue::{SpillQueue, SpillSender};

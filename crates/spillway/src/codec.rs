//! On-disk frame codec for spilled items.
//!
//! Each item is stored as a length-prefixed frame:
//!
//! ```text
//! ┌──────────────┬─────────────────────────────────────┐
//! │ 4 bytes      │ N bytes                             │
//! │ length (BE)  │ bincode-encoded item                │
//! └──────────────┴─────────────────────────────────────┘
//! ```
//!
//! The prefix makes frames self-delimiting, so a file truncated at any byte
//! loses at worst its final partial record. A zero-length frame is the
//! detectable "empty item" marker and is skipped on decode.
//!
//! The format is local state: it is only ever read back by the process (or a
//! successor process) that wrote it, never exchanged with other systems.

use std::io::{self, Read};

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, SpillError};

/// Size of the frame length field in bytes
pub(crate) const LENGTH_FIELD_SIZE: usize = 4;

/// Sanity cap on a single frame. A header announcing more than this is
/// treated as corruption rather than trusted with an allocation.
pub(crate) const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Encode one item as a length-prefixed frame
pub(crate) fn encode_frame<T: Serialize>(item: &T) -> Result<BytesMut> {
    let payload = bincode::serde::encode_to_vec(item, bincode::config::standard())
        .map_err(SpillError::Encode)?;

    let mut frame = BytesMut::with_capacity(LENGTH_FIELD_SIZE + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(&payload);
    Ok(frame)
}

/// Streaming frame reader
///
/// Yields decoded items until end of file. A truncated trailing record is
/// discarded and reported as end of file; zero-length frames are skipped.
pub(crate) struct FrameReader<R> {
    reader: R,
}

impl<R: Read> FrameReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read the next item from the stream
    ///
    /// Returns `Ok(None)` at end of file (including a partial tail record),
    /// `Err` on a corrupt frame.
    pub(crate) fn next_item<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        loop {
            let mut len_bytes = [0u8; LENGTH_FIELD_SIZE];
            match self.reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_be_bytes(len_bytes) as usize;
            if len == 0 {
                // empty-item marker
                continue;
            }
            if len > MAX_FRAME_LEN {
                return Err(SpillError::FrameTooLarge {
                    len,
                    max: MAX_FRAME_LEN,
                });
            }

            let mut payload = vec![0u8; len];
            match self.reader.read_exact(&mut payload) {
                Ok(()) => {}
                // partial tail record, discard
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            }

            let (item, _) =
                bincode::serde::decode_from_slice(&payload, bincode::config::standard())
                    .map_err(SpillError::Decode)?;
            return Ok(Some(item));
        }
    }
}

//! Payload chunking.
//!
//! A payload of `len` bytes is cut into `len / chunk_size` full chunks plus
//! one trailing chunk of `len % chunk_size` bytes when that remainder is
//! non-zero. Chunks are zero-copy `Bytes` slices of the payload.

use bytes::Bytes;

use crate::error::{Result, StrandLinkError};

/// Chunk boundaries for one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Number of full-size chunks.
    pub chunk_count: usize,
    /// Length of the trailing partial chunk (0 when there is none).
    pub remainder: usize,
    pub chunk_size: usize,
}

impl ChunkPlan {
    pub fn new(len: usize, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StrandLinkError::InvalidChunkSize(chunk_size));
        }
        Ok(Self {
            chunk_count: len / chunk_size,
            remainder: len % chunk_size,
            chunk_size,
        })
    }

    /// Total chunks that will be sent, counting the partial one.
    pub fn total(&self) -> usize {
        self.chunk_count + usize::from(self.remainder > 0)
    }

    /// Payload length this plan was computed for.
    pub fn payload_len(&self) -> usize {
        self.chunk_count * self.chunk_size + self.remainder
    }
}

/// Iterator over the chunks of a payload, in order.
#[derive(Debug, Clone)]
pub struct Chunks {
    payload: Bytes,
    chunk_size: usize,
    offset: usize,
}

impl Iterator for Chunks {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.offset >= self.payload.len() {
            return None;
        }
        let end = (self.offset + self.chunk_size).min(self.payload.len());
        let chunk = self.payload.slice(self.offset..end);
        self.offset = end;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.payload.len() - self.offset;
        let n = left.div_ceil(self.chunk_size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunks {}

/// Split `payload` into chunks of at most `chunk_size` bytes.
pub fn split(payload: &Bytes, chunk_size: usize) -> Result<Chunks> {
    if chunk_size == 0 {
        return Err(StrandLinkError::InvalidChunkSize(chunk_size));
    }
    Ok(Chunks {
        payload: payload.clone(),
        chunk_size,
        offset: 0,
    })
}

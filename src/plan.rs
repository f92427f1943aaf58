//! Chunk layout
//!
//! A [`ChunkPlan`] partitions `0..length` into contiguous, non-overlapping
//! ranges. Every chunk is `chunk_size` bytes, except for the last, which
//! holds the remainder. No I/O happens here.

use alloc::vec::Vec;
use core::{num::NonZeroUsize, ptr::NonNull};

/// One byte range of a transfer buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Chunk {
    index: usize,
    offset: usize,
    len: usize,
}

impl Chunk {
    /// Position of this chunk in its plan
    pub fn index(&self) -> usize {
        self.index
    }
    /// Offset of the first byte, relative to the buffer base
    pub fn offset(&self) -> usize {
        self.offset
    }
    pub fn len(&self) -> usize {
        self.len
    }
    /// Always `false`; plans never hold an empty chunk
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Derive this chunk's address from a buffer base
    ///
    /// # Safety
    ///
    /// `base` must point to an allocation of at least the plan's length.
    pub(crate) unsafe fn bind(&self, base: NonNull<u8>) -> NonNull<u8> {
        // Safety: offset is in bounds of the allocation, per the caller.
        NonNull::new_unchecked(base.as_ptr().add(self.offset))
    }
}

/// The chunk layout of one transfer buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    length: usize,
    chunk_size: NonZeroUsize,
    chunks: Vec<Chunk>,
}

impl ChunkPlan {
    /// Lay out `length` bytes in chunks of `chunk_size`
    ///
    /// A `length` of zero produces a plan without chunks.
    pub fn new(length: usize, chunk_size: NonZeroUsize) -> Self {
        let size = chunk_size.get();
        let count = length.div_ceil(size);
        let mut chunks = Vec::with_capacity(count);
        let mut offset = 0;
        while offset < length {
            let len = size.min(length - offset);
            chunks.push(Chunk {
                index: chunks.len(),
                offset,
                len,
            });
            offset += len;
        }
        debug_assert_eq!(chunks.len(), count);
        ChunkPlan {
            length,
            chunk_size,
            chunks,
        }
    }

    /// Total number of bytes covered by the plan
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn chunk_size(&self) -> NonZeroUsize {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn get(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }
}

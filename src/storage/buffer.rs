//! Growable byte buffer composed of pool blocks and nested buffers.

use crate::error::{Error, Result};
use crate::storage::allocator::BlockAllocator;
use crate::storage::block::{BlockId, OwnerId};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, trace};

/// One contiguous piece of a buffer.
#[derive(Debug)]
enum Segment {
    /// A block reserved from the buffer's allocator.
    Block(BlockId),
    /// A nested buffer, addressed with the same floor lookup.
    Nested(Box<ExtensibleBlockBuffer>),
}

/// Byte-addressable region made of blocks, addressed as `[0, capacity)`.
///
/// Segments are keyed by their starting offset and cover the capacity with
/// no gaps or overlaps. Growth appends freshly allocated blocks, shrinking
/// removes trailing segments and hands their blocks back in one batch.
///
/// Every access checks that the allocator is still open before touching a
/// block; blocks are held by index, never by pointer.
#[derive(Debug)]
pub struct ExtensibleBlockBuffer {
    allocator: Arc<BlockAllocator>,
    owner: OwnerId,
    segments: BTreeMap<u64, Segment>,
    capacity: u64,
}

impl ExtensibleBlockBuffer {
    /// Create an empty buffer whose blocks will be reserved for `owner`.
    pub fn new(allocator: Arc<BlockAllocator>, owner: OwnerId) -> Self {
        Self {
            allocator,
            owner,
            segments: BTreeMap::new(),
            capacity: 0,
        }
    }

    /// Owner tag used for this buffer's blocks.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Addressable size in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Blocks held directly by this buffer, in offset order.
    pub fn blocks(&self) -> Vec<BlockId> {
        self.segments
            .values()
            .filter_map(|segment| match segment {
                Segment::Block(id) => Some(*id),
                Segment::Nested(_) => None,
            })
            .collect()
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    pub fn read(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        self.check_range(offset, dst.len())?;
        self.for_each_span(offset, dst.len(), |segment, inner, span| {
            self.read_segment(segment, inner, &mut dst[span])
        })
    }

    /// Copy `src` into the buffer starting at `offset`.
    pub fn write(&self, offset: u64, src: &[u8]) -> Result<()> {
        self.check_range(offset, src.len())?;
        self.for_each_span(offset, src.len(), |segment, inner, span| {
            self.write_segment(segment, inner, &src[span])
        })
    }

    /// Read a single byte.
    pub fn read_byte(&self, offset: u64) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read(offset, &mut byte)?;
        Ok(byte[0])
    }

    /// Write a single byte.
    pub fn write_byte(&self, offset: u64, value: u8) -> Result<()> {
        self.write(offset, &[value])
    }

    /// Grow so that at least `min_capacity` bytes are addressable.
    ///
    /// All missing blocks are requested in one batch; on failure the
    /// capacity is unchanged.
    pub fn ensure_capacity(&mut self, min_capacity: u64) -> Result<()> {
        self.check_open()?;
        if min_capacity <= self.capacity {
            return Ok(());
        }

        let block_size = self.allocator.block_size() as u64;
        let count = (min_capacity - self.capacity).div_ceil(block_size) as usize;
        let blocks = self.allocator.allocate(self.owner, count)?;

        for id in blocks {
            self.segments.insert(self.capacity, Segment::Block(id));
            self.capacity += block_size;
        }
        trace!(owner = self.owner, capacity = self.capacity, "buffer grown");
        Ok(())
    }

    /// Drop every segment that starts at or beyond `min_capacity`.
    ///
    /// Removed blocks are freed in one batch. The resulting capacity is the
    /// end of the last remaining segment, so it may stay above
    /// `min_capacity`.
    pub fn trim_capacity(&mut self, min_capacity: u64) -> Result<()> {
        self.check_open()?;
        if min_capacity >= self.capacity {
            return Ok(());
        }

        let mut removed = self.segments.split_off(&min_capacity);
        let blocks: Vec<BlockId> = removed
            .values()
            .filter_map(|segment| match segment {
                Segment::Block(id) => Some(*id),
                Segment::Nested(_) => None,
            })
            .collect();

        if let Err(e) = self.allocator.free(self.owner, &blocks) {
            self.segments.append(&mut removed);
            return Err(e);
        }
        for segment in removed.values_mut() {
            if let Segment::Nested(nested) = segment {
                nested.trim_capacity(0)?;
            }
        }

        self.capacity = self
            .segments
            .iter()
            .next_back()
            .map(|(&start, segment)| start + self.segment_len(segment))
            .unwrap_or(0);
        trace!(owner = self.owner, capacity = self.capacity, "buffer trimmed");
        Ok(())
    }

    /// Append another buffer as a nested segment at the current end.
    pub fn append_buffer(&mut self, child: ExtensibleBlockBuffer) -> Result<()> {
        self.check_open()?;
        if child.capacity() == 0 {
            return Err(Error::InvalidArgument(
                "cannot append an empty buffer".to_string(),
            ));
        }
        let start = self.capacity;
        self.capacity += child.capacity();
        self.segments.insert(start, Segment::Nested(Box::new(child)));
        Ok(())
    }

    /// Visit every segment overlapping `[offset, offset + len)` in order.
    ///
    /// The first and last segments are found by floor lookup; the callback
    /// gets the segment, the offset inside it, and the matching range of the
    /// caller's slice.
    fn for_each_span(
        &self,
        offset: u64,
        len: usize,
        mut f: impl FnMut(&Segment, u64, Range<usize>) -> Result<()>,
    ) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let end = offset + len as u64;
        let first = self.floor_key(offset)?;
        let last = self.floor_key(end - 1)?;

        let mut cursor = 0usize;
        for (&start, segment) in self.segments.range(first..=last) {
            let from = offset.max(start);
            let to = end.min(start + self.segment_len(segment));
            let moved = (to - from) as usize;
            f(segment, from - start, cursor..cursor + moved)?;
            cursor += moved;
        }

        if cursor != len {
            return Err(Error::InconsistentState(format!(
                "buffer segments cover {} of {} requested bytes",
                cursor, len
            )));
        }
        Ok(())
    }

    fn floor_key(&self, offset: u64) -> Result<u64> {
        self.segments
            .range(..=offset)
            .next_back()
            .map(|(&start, _)| start)
            .ok_or_else(|| {
                Error::InconsistentState(format!("no segment covers offset {}", offset))
            })
    }

    fn segment_len(&self, segment: &Segment) -> u64 {
        match segment {
            Segment::Block(_) => self.allocator.block_size() as u64,
            Segment::Nested(nested) => nested.capacity(),
        }
    }

    fn read_segment(&self, segment: &Segment, inner: u64, dst: &mut [u8]) -> Result<()> {
        match segment {
            Segment::Block(id) => self
                .allocator
                .read_block(self.owner, *id, inner as usize, dst),
            Segment::Nested(nested) => nested.read(inner, dst),
        }
    }

    fn write_segment(&self, segment: &Segment, inner: u64, src: &[u8]) -> Result<()> {
        match segment {
            Segment::Block(id) => self
                .allocator
                .write_block(self.owner, *id, inner as usize, src),
            Segment::Nested(nested) => nested.write(inner, src),
        }
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<()> {
        self.check_open()?;
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(Error::OutOfBounds {
                offset,
                length: len as u64,
                capacity: self.capacity,
            }),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.allocator.is_closed() {
            Err(Error::AllocatorClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for ExtensibleBlockBuffer {
    fn drop(&mut self) {
        if self.capacity == 0 || self.allocator.is_closed() {
            return;
        }
        if let Err(e) = self.trim_capacity(0) {
            debug!(owner = self.owner, error = %e, "failed to release buffer blocks");
        }
    }
}

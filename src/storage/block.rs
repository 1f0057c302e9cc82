//! Fixed-capacity blocks, the allocation unit of the pool.

use crate::error::{Error, Result};
use std::fmt;

/// Identifier of the node that owns a block.
pub type OwnerId = u64;

/// Index of a block within its allocator's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    /// Position of the block in the pool.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A block of the pool.
///
/// The payload is only materialised while the block is reserved; a free
/// block holds no memory.
#[derive(Debug, Default)]
pub struct Block {
    /// Owner tag, `None` while the block is free.
    owner: Option<OwnerId>,
    /// Block contents.
    payload: Vec<u8>,
}

impl Block {
    /// Current owner, if reserved.
    pub fn owner(&self) -> Option<OwnerId> {
        self.owner
    }

    /// Payload capacity (0 while free).
    pub fn capacity(&self) -> usize {
        self.payload.len()
    }

    /// Tag the block for `owner` and give it a zeroed payload.
    pub(crate) fn reserve(&mut self, owner: OwnerId, size: usize) {
        self.owner = Some(owner);
        self.payload = vec![0; size];
    }

    /// Clear the owner tag and drop the payload.
    pub(crate) fn release(&mut self) {
        self.owner = None;
        self.payload = Vec::new();
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    pub fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let range = self.range(offset, dst.len())?;
        dst.copy_from_slice(&self.payload[range]);
        Ok(())
    }

    /// Copy `src` into the block starting at `offset`.
    pub fn write(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        let range = self.range(offset, src.len())?;
        self.payload[range].copy_from_slice(src);
        Ok(())
    }

    fn range(&self, offset: usize, len: usize) -> Result<std::ops::Range<usize>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.payload.len() => Ok(offset..end),
            _ => Err(Error::OutOfBounds {
                offset: offset as u64,
                length: len as u64,
                capacity: self.payload.len() as u64,
            }),
        }
    }
}

//! Block pool with exclusive ownership tracking.

use crate::error::{Error, Result};
use crate::storage::block::{Block, BlockId, OwnerId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Snapshot of pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    /// Size of each block in bytes.
    pub block_size: usize,
    /// Number of blocks in the pool.
    pub total_blocks: usize,
    /// Number of reserved blocks.
    pub used_blocks: usize,
}

impl Usage {
    /// Number of free blocks.
    pub fn free_blocks(&self) -> usize {
        self.total_blocks - self.used_blocks
    }

    /// Total capacity in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.total_blocks as u64 * self.block_size as u64
    }

    /// Reserved bytes.
    pub fn used_bytes(&self) -> u64 {
        self.used_blocks as u64 * self.block_size as u64
    }

    /// Unreserved bytes.
    pub fn free_bytes(&self) -> u64 {
        self.free_blocks() as u64 * self.block_size as u64
    }
}

/// Used-space counter shared between an allocator and its space.
///
/// Recomputed by the allocator after every allocate, free and close.
#[derive(Debug)]
pub struct UsageCounter {
    block_size: usize,
    total_blocks: usize,
    used_blocks: AtomicUsize,
}

impl UsageCounter {
    fn new(block_size: usize, total_blocks: usize) -> Self {
        Self {
            block_size,
            total_blocks,
            used_blocks: AtomicUsize::new(0),
        }
    }

    fn record(&self, used_blocks: usize) {
        self.used_blocks.store(used_blocks, Ordering::Release);
    }

    /// Current usage.
    pub fn snapshot(&self) -> Usage {
        Usage {
            block_size: self.block_size,
            total_blocks: self.total_blocks,
            used_blocks: self.used_blocks.load(Ordering::Acquire),
        }
    }
}

#[derive(Debug)]
struct AllocatorState {
    /// Unreserved block indices.
    free: BTreeSet<usize>,
    /// Reserved block indices by owner.
    reserved: HashMap<OwnerId, BTreeSet<usize>>,
}

impl AllocatorState {
    fn reserved_count(&self) -> usize {
        self.reserved.values().map(BTreeSet::len).sum()
    }
}

/// Fixed pool of equally sized blocks.
///
/// Allocation is all-or-nothing and release validates ownership of every
/// block before changing anything. Once closed, every operation fails with
/// [`Error::AllocatorClosed`].
#[derive(Debug)]
pub struct BlockAllocator {
    block_size: usize,
    blocks: Box<[Mutex<Block>]>,
    state: Mutex<AllocatorState>,
    closed: AtomicBool,
    usage: Arc<UsageCounter>,
}

impl BlockAllocator {
    /// Create a pool of `block_count` blocks of `block_size` bytes.
    pub fn new(block_size: usize, block_count: usize) -> Self {
        let blocks = (0..block_count)
            .map(|_| Mutex::new(Block::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            block_size,
            blocks,
            state: Mutex::new(AllocatorState {
                free: (0..block_count).collect(),
                reserved: HashMap::new(),
            }),
            closed: AtomicBool::new(false),
            usage: Arc::new(UsageCounter::new(block_size, block_count)),
        }
    }

    /// Block size in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks in the pool.
    pub fn total_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Shared used-space counter.
    pub fn usage_counter(&self) -> Arc<UsageCounter> {
        Arc::clone(&self.usage)
    }

    /// Current usage.
    pub fn usage(&self) -> Usage {
        self.usage.snapshot()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of free blocks.
    pub fn free_blocks(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Free block ids in pool order.
    pub fn free_set(&self) -> Vec<BlockId> {
        self.state.lock().free.iter().map(|&i| BlockId(i)).collect()
    }

    /// Block ids reserved by `owner`, in pool order.
    pub fn reserved_by(&self, owner: OwnerId) -> Vec<BlockId> {
        self.state
            .lock()
            .reserved
            .get(&owner)
            .map(|set| set.iter().map(|&i| BlockId(i)).collect())
            .unwrap_or_default()
    }

    /// Owner tag of a block.
    pub fn owner_of(&self, id: BlockId) -> Option<OwnerId> {
        self.blocks.get(id.0).and_then(|slot| slot.lock().owner())
    }

    /// Reserve exactly `count` free blocks for `owner`.
    ///
    /// Fails with [`Error::InsufficientSpace`] without reserving anything if
    /// fewer than `count` blocks are free.
    pub fn allocate(&self, owner: OwnerId, count: usize) -> Result<Vec<BlockId>> {
        let mut state = self.state.lock();
        self.check_open()?;

        if count == 0 {
            return Ok(Vec::new());
        }
        if state.free.len() < count {
            warn!(
                owner,
                requested = count,
                available = state.free.len(),
                "block pool exhausted"
            );
            return Err(Error::InsufficientSpace {
                requested: count,
                available: state.free.len(),
            });
        }

        let picked: Vec<usize> = state.free.iter().take(count).copied().collect();
        for &index in &picked {
            state.free.remove(&index);
            self.blocks[index].lock().reserve(owner, self.block_size);
        }
        state.reserved.entry(owner).or_default().extend(&picked);
        self.usage.record(state.reserved_count());

        debug!(owner, count, free = state.free.len(), "reserved blocks");
        Ok(picked.into_iter().map(BlockId).collect())
    }

    /// Return `blocks` held by `owner` to the pool.
    ///
    /// Every block is checked before any is released; a single foreign block
    /// rejects the whole request with [`Error::ForeignBlock`].
    pub fn free(&self, owner: OwnerId, blocks: &[BlockId]) -> Result<()> {
        let mut state = self.state.lock();
        self.check_open()?;

        let requested: BTreeSet<usize> = blocks.iter().map(|b| b.0).collect();
        if requested.is_empty() {
            return Ok(());
        }

        let owned = state.reserved.get(&owner);
        if let Some(&foreign) = requested
            .iter()
            .find(|&&index| !owned.is_some_and(|set| set.contains(&index)))
        {
            return Err(Error::ForeignBlock {
                block: BlockId(foreign),
                owner,
            });
        }

        if let Some(owned) = state.reserved.get_mut(&owner) {
            for index in &requested {
                owned.remove(index);
            }
            if owned.is_empty() {
                state.reserved.remove(&owner);
            }
        }
        for &index in &requested {
            let mut block = self.blocks[index].lock();
            debug_assert_eq!(block.owner(), Some(owner));
            block.release();
            state.free.insert(index);
        }
        self.usage.record(state.reserved_count());

        debug!(owner, count = requested.len(), free = state.free.len(), "released blocks");
        Ok(())
    }

    /// Invalidate the allocator and drop every payload.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let reserved = std::mem::take(&mut state.reserved);
        for index in reserved.into_values().flatten() {
            self.blocks[index].lock().release();
            state.free.insert(index);
        }
        self.usage.record(0);
        info!(blocks = self.blocks.len(), "block allocator closed");
    }

    /// Read from a block owned by `owner`.
    pub fn read_block(
        &self,
        owner: OwnerId,
        id: BlockId,
        offset: usize,
        dst: &mut [u8],
    ) -> Result<()> {
        self.with_block(owner, id, |block| block.read(offset, dst))
    }

    /// Write into a block owned by `owner`.
    pub fn write_block(&self, owner: OwnerId, id: BlockId, offset: usize, src: &[u8]) -> Result<()> {
        self.with_block(owner, id, |block| block.write(offset, src))
    }

    fn with_block<R>(
        &self,
        owner: OwnerId,
        id: BlockId,
        f: impl FnOnce(&mut Block) -> Result<R>,
    ) -> Result<R> {
        self.check_open()?;
        let slot = self
            .blocks
            .get(id.0)
            .ok_or(Error::ForeignBlock { block: id, owner })?;
        let mut block = slot.lock();
        // close() raises the flag before it releases blocks
        self.check_open()?;
        if block.owner() != Some(owner) {
            return Err(Error::ForeignBlock { block: id, owner });
        }
        f(&mut block)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::AllocatorClosed)
        } else {
            Ok(())
        }
    }
}

//! Block storage engine.
//!
//! This module handles:
//! - Fixed-size blocks with an exclusive owner tag
//! - The block pool that reserves and reclaims blocks per owner
//! - Extensible buffers that address a run of blocks as one byte range

mod allocator;
mod block;
mod buffer;

pub use allocator::{BlockAllocator, Usage, UsageCounter};
pub use block::{Block, BlockId, OwnerId};
pub use buffer::ExtensibleBlockBuffer;

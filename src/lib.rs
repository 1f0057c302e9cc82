//! Block VFS
//!
//! A pluggable, memory-resident virtual file system: directories, files and
//! symbolic links stored in a fixed pool of blocks.
//!
//! # Features
//!
//! - **Block Storage**: Fixed-size blocks with exclusive ownership, reserved and
//!   released in all-or-nothing batches
//! - **Extensible Buffers**: Byte ranges mapped onto blocks and nested buffers,
//!   grown and trimmed on demand
//! - **Route Resolution**: Component-by-component walks that report exactly
//!   where and why they stopped, with symbolic-link loop detection
//! - **Seekable Channels**: Cursor-based reads and writes with sparse zero fill
//! - **CLI Interface**: Script runner for quick experiments
//!
//! # Architecture
//!
//! ```text
//! path → Route → RouteResolver → Node → SeekableChannel → ExtensibleBlockBuffer → BlockAllocator
//! ```
//!
//! # Example
//!
//! ```rust
//! use block_vfs::{Space, SpaceConfig};
//!
//! let space = Space::new(SpaceConfig::default()).unwrap();
//! space.create_directory("/docs").unwrap();
//! space.write_file("/docs/note.txt", b"Hello").unwrap();
//!
//! let data = space.read_file("/docs/note.txt").unwrap();
//! assert_eq!(data, b"Hello");
//! ```

pub mod config;
pub mod error;
pub mod registry;
pub mod shell;
pub mod storage;
pub mod vfs;

pub use config::SpaceConfig;
pub use error::{Error, Result};
pub use vfs::{OpenOptions, Route, SeekableChannel, Space};

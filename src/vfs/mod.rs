//! Memory-resident virtual file system.
//!
//! Provides a tree of directories, files and symbolic links over a block
//! pool, addressed by parsed routes and read or written through seekable
//! channels.

mod channel;
mod node;
mod resolver;
mod route;
mod space;
mod types;

pub use channel::{OpenOptions, SeekableChannel};
pub use node::{FileContent, NewNode, Node};
pub use resolver::{resolve, ResolutionKind, ResolutionOutcome, ResolutionStatus, RouteResolver};
pub use route::{validate_name, Route, CURRENT_DIR, PARENT_DIR, SEPARATOR};
pub use space::{Space, SpaceInfo};
pub use types::{DirEntry, NodeId, NodeStat, NodeType, Timestamps, ROOT_NODE_ID};

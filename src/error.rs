//! Error types for the block VFS.

use std::io;
use thiserror::Error;

use crate::storage::{BlockId, OwnerId};

/// Result type alias for block VFS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in block VFS operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from the host environment (config files, stdin).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A path component does not exist.
    ///
    /// `consumed` is the number of leading components that resolved.
    #[error("No such file or directory: {path}")]
    NotFound { path: String, consumed: usize },

    /// Path already exists.
    #[error("Path already exists: {0}")]
    PathExists(String),

    /// A non-terminal path component is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file, found a directory.
    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// Expected a file, found a link or directory.
    #[error("Not a file: {0}")]
    NotAFile(String),

    /// Expected a symbolic link.
    #[error("Not a symbolic link: {0}")]
    NotALink(String),

    /// A symbolic link chain revisits a link.
    #[error("Too many levels of symbolic links: {0}")]
    LinkLoop(String),

    /// The target of a symbolic link could not be resolved.
    #[error("Cannot resolve target of link {link}")]
    UnresolvedLinkTarget {
        link: String,
        #[source]
        source: Box<Error>,
    },

    /// The tree was observed in a state that violates its invariants.
    #[error("Inconsistent file system state: {0}")]
    InconsistentState(String),

    /// Directory still has children.
    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Invalid node name.
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    /// Invalid path for the requested operation.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Not enough free blocks to satisfy a request.
    #[error("Not enough space: need {requested} blocks, have {available} blocks")]
    InsufficientSpace { requested: usize, available: usize },

    /// A block was released by something other than its owner.
    #[error("Block {block} is not owned by {owner}")]
    ForeignBlock { block: BlockId, owner: OwnerId },

    /// The block allocator has been closed.
    #[error("Block allocator is closed")]
    AllocatorClosed,

    /// The space has been closed.
    #[error("Space is closed")]
    SpaceClosed,

    /// The channel has been closed.
    #[error("Channel is closed")]
    ChannelClosed,

    /// The channel was not opened for reading.
    #[error("Channel is not readable")]
    NonReadableChannel,

    /// The channel was not opened for writing.
    #[error("Channel is not writable")]
    NonWritableChannel,

    /// A byte range lies outside the buffer.
    #[error("Range {offset}+{length} out of bounds for capacity {capacity}")]
    OutOfBounds {
        offset: u64,
        length: u64,
        capacity: u64,
    },

    /// Nodes belong to different spaces.
    #[error("Nodes belong to different spaces")]
    CrossSpace,

    /// A space is already registered under this domain.
    #[error("Domain already in use: {0}")]
    DomainInUse(String),

    /// No space is registered under this domain.
    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A script command failed.
    #[error("line {line}: {source}")]
    Script {
        line: usize,
        #[source]
        source: Box<Error>,
    },
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Convert to `std::io::Error` so channels can implement the `std::io` traits.
impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::Io(inner) => inner.kind(),
            Error::NotFound { .. } => io::ErrorKind::NotFound,
            Error::PathExists(_) => io::ErrorKind::AlreadyExists,
            Error::NotADirectory(_) => io::ErrorKind::NotADirectory,
            Error::IsADirectory(_) => io::ErrorKind::IsADirectory,
            Error::DirectoryNotEmpty(_) => io::ErrorKind::DirectoryNotEmpty,
            Error::InsufficientSpace { .. } => io::ErrorKind::StorageFull,
            Error::InvalidName(_)
            | Error::InvalidPath(_)
            | Error::InvalidArgument(_)
            | Error::OutOfBounds { .. } => io::ErrorKind::InvalidInput,
            Error::NonReadableChannel | Error::NonWritableChannel => {
                io::ErrorKind::PermissionDenied
            }
            _ => io::ErrorKind::Other,
        };
        match e {
            Error::Io(inner) => inner,
            other => io::Error::new(kind, other),
        }
    }
}

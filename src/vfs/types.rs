//! VFS types: node kinds, directory entries, stat records.

use serde::Serialize;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a node within its space. Never reused.
pub type NodeId = u64;

/// Root node ID (always 1; 0 is never handed out).
pub const ROOT_NODE_ID: NodeId = 1;

/// Type of node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// A directory.
    Directory,
    /// A regular file.
    File,
    /// A symbolic link.
    Link,
}

impl NodeType {
    /// Single-character marker used in listings.
    pub fn marker(self) -> char {
        match self {
            NodeType::Directory => 'd',
            NodeType::File => '-',
            NodeType::Link => 'l',
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Directory => "directory",
            NodeType::File => "file",
            NodeType::Link => "link",
        };
        f.write_str(name)
    }
}

/// Creation and modification times (Unix epoch seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamps {
    /// Creation timestamp.
    pub created: u64,
    /// Last modification timestamp.
    pub modified: u64,
}

impl Timestamps {
    /// Both times set to now.
    pub fn now() -> Self {
        let now = current_timestamp();
        Self {
            created: now,
            modified: now,
        }
    }

    /// Update modification time.
    pub fn touch(&mut self) {
        self.modified = current_timestamp();
    }
}

/// A directory entry for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    /// Name of the entry.
    pub name: String,
    /// Node ID.
    pub node_id: NodeId,
    /// Kind of node.
    pub kind: NodeType,
    /// Size in bytes (files only).
    pub size: u64,
}

/// Metadata snapshot of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStat {
    /// Node ID.
    pub node_id: NodeId,
    /// Kind of node.
    pub kind: NodeType,
    /// Logical size for files, child count for directories, 0 for links.
    pub size: u64,
    /// Creation timestamp (Unix epoch seconds).
    pub created: u64,
    /// Last modification timestamp (Unix epoch seconds).
    pub modified: u64,
}

/// Get current Unix timestamp.
pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers() {
        assert_eq!(NodeType::Directory.marker(), 'd');
        assert_eq!(NodeType::File.marker(), '-');
        assert_eq!(NodeType::Link.marker(), 'l');
        assert_eq!(NodeType::Link.to_string(), "link");
    }

    #[test]
    fn test_touch() {
        let mut times = Timestamps::now();
        let created = times.created;
        times.touch();
        assert_eq!(times.created, created);
        assert!(times.modified >= created);
    }

    #[test]
    fn test_serialize_entry() {
        let entry = DirEntry {
            name: "a".to_string(),
            node_id: 2,
            kind: NodeType::File,
            size: 3,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""kind":"file""#));
    }
}

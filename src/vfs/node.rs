//! The node tree: directories, files and symbolic links.

use crate::error::{Error, Result};
use crate::storage::ExtensibleBlockBuffer;
use crate::vfs::route::{validate_name, Route};
use crate::vfs::space::SpaceShared;
use crate::vfs::types::{DirEntry, NodeId, NodeStat, NodeType, Timestamps};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// What to create with [`Node::create_child`].
#[derive(Debug, Clone)]
pub enum NewNode {
    /// An empty directory.
    Directory,
    /// An empty file.
    File,
    /// A symbolic link to the given route.
    Link(Route),
}

/// Content of a file: its buffer and logical size.
///
/// The buffer capacity is always at least the size.
#[derive(Debug)]
pub struct FileContent {
    buffer: ExtensibleBlockBuffer,
    size: u64,
}

impl FileContent {
    fn new(buffer: ExtensibleBlockBuffer) -> Self {
        Self { buffer, size: 0 }
    }

    /// Logical size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Backing buffer.
    pub fn buffer(&self) -> &ExtensibleBlockBuffer {
        &self.buffer
    }

    /// Backing buffer, for growth.
    pub(crate) fn buffer_mut(&mut self) -> &mut ExtensibleBlockBuffer {
        &mut self.buffer
    }

    /// Record a new logical size; the caller has made the buffer large enough.
    pub(crate) fn set_len(&mut self, size: u64) {
        debug_assert!(size <= self.buffer.capacity());
        self.size = size;
    }

    /// Zero `[from, to)` in chunks of at most `scratch` bytes.
    pub(crate) fn zero_fill(&self, from: u64, to: u64, scratch: usize) -> Result<()> {
        if to <= from {
            return Ok(());
        }
        let zeros = vec![0u8; scratch.min((to - from) as usize).max(1)];
        let mut offset = from;
        while offset < to {
            let chunk = zeros.len().min((to - offset) as usize);
            self.buffer.write(offset, &zeros[..chunk])?;
            offset += chunk as u64;
        }
        Ok(())
    }

    /// Grow (zero-filling the new bytes) or shrink (returning blocks).
    pub(crate) fn resize(&mut self, new_size: u64, scratch: usize) -> Result<()> {
        if new_size > self.size {
            self.buffer.ensure_capacity(new_size)?;
            self.zero_fill(self.size, new_size, scratch)?;
            self.size = new_size;
        } else if new_size < self.size {
            self.size = new_size;
            self.buffer.trim_capacity(new_size)?;
        }
        Ok(())
    }
}

enum NodeKind {
    Directory(RwLock<HashMap<String, Node>>),
    File(RwLock<FileContent>),
    Link(Route),
}

/// Where a node sits in the tree.
///
/// Root: no parent, no name. Attached: both. Detached (removed): name only.
struct Placement {
    parent: Option<Weak<NodeInner>>,
    name: Option<String>,
}

struct NodeInner {
    id: NodeId,
    store: Weak<SpaceShared>,
    placement: RwLock<Placement>,
    times: Mutex<Timestamps>,
    kind: NodeKind,
}

/// A directory, file or symbolic link.
///
/// Cloning is cheap and yields a handle to the same node. A directory's
/// children map holds the only owning handles of the tree; a handle kept
/// elsewhere keeps a removed node alive but detached.
#[derive(Clone)]
pub struct Node(Arc<NodeInner>);

impl Node {
    pub(crate) fn new_root(id: NodeId, store: Weak<SpaceShared>) -> Self {
        Self(Arc::new(NodeInner {
            id,
            store,
            placement: RwLock::new(Placement {
                parent: None,
                name: None,
            }),
            times: Mutex::new(Timestamps::now()),
            kind: NodeKind::Directory(RwLock::new(HashMap::new())),
        }))
    }

    /// Node ID.
    pub fn id(&self) -> NodeId {
        self.0.id
    }

    /// Kind of node.
    pub fn node_type(&self) -> NodeType {
        match self.0.kind {
            NodeKind::Directory(_) => NodeType::Directory,
            NodeKind::File(_) => NodeType::File,
            NodeKind::Link(_) => NodeType::Link,
        }
    }

    /// Check if this is a directory.
    pub fn is_directory(&self) -> bool {
        matches!(self.0.kind, NodeKind::Directory(_))
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        matches!(self.0.kind, NodeKind::File(_))
    }

    /// Check if this is a symbolic link.
    pub fn is_link(&self) -> bool {
        matches!(self.0.kind, NodeKind::Link(_))
    }

    /// Name within the parent; `None` for the root.
    pub fn name(&self) -> Option<String> {
        self.0.placement.read().name.clone()
    }

    /// Parent directory; `None` for the root and for removed nodes.
    pub fn parent(&self) -> Option<Node> {
        self.0
            .placement
            .read()
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Node)
    }

    /// Whether this is the root of its space.
    pub fn is_root(&self) -> bool {
        let placement = self.0.placement.read();
        placement.parent.is_none() && placement.name.is_none()
    }

    /// Whether the node has been removed from its parent.
    pub fn is_detached(&self) -> bool {
        !self.is_root() && self.parent().is_none()
    }

    /// Whether both nodes live in the same space.
    pub fn same_store(&self, other: &Node) -> bool {
        Weak::ptr_eq(&self.0.store, &other.0.store)
    }

    /// Absolute route of this node, rebuilt from its ancestors.
    ///
    /// A detached node reports the route of its last name under the root.
    pub fn path(&self) -> Route {
        let mut names = Vec::new();
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if let Some(name) = node.name() {
                names.push(name);
            }
            current = node.parent();
        }
        names.reverse();
        Route::new(true, names).unwrap_or_else(|_| Route::root())
    }

    /// Root directory of the node's space.
    pub fn root(&self) -> Result<Node> {
        Ok(self.store()?.root().clone())
    }

    /// Creation and modification times.
    pub fn timestamps(&self) -> Timestamps {
        *self.0.times.lock()
    }

    /// Metadata snapshot.
    pub fn stat(&self) -> NodeStat {
        let times = self.timestamps();
        let size = match &self.0.kind {
            NodeKind::Directory(children) => children.read().len() as u64,
            NodeKind::File(content) => content.read().size(),
            NodeKind::Link(_) => 0,
        };
        NodeStat {
            node_id: self.id(),
            kind: self.node_type(),
            size,
            created: times.created,
            modified: times.modified,
        }
    }

    fn touch(&self) {
        self.0.times.lock().touch();
    }

    pub(crate) fn store(&self) -> Result<Arc<SpaceShared>> {
        let store = self.0.store.upgrade().ok_or(Error::SpaceClosed)?;
        if store.is_closed() {
            return Err(Error::SpaceClosed);
        }
        Ok(store)
    }

    // ---- directories ----

    fn dir_children(&self) -> Result<&RwLock<HashMap<String, Node>>> {
        match &self.0.kind {
            NodeKind::Directory(children) => Ok(children),
            _ => Err(Error::NotADirectory(self.path().to_string())),
        }
    }

    /// Look up a child by name.
    ///
    /// Fails if this is not a directory or the space has been closed.
    pub fn resolve_child(&self, name: &str) -> Result<Option<Node>> {
        let children = self.dir_children()?;
        self.store()?;
        Ok(children.read().get(name).cloned())
    }

    /// Snapshot of the children, in no particular order.
    pub fn children(&self) -> Result<std::vec::IntoIter<Node>> {
        let children = self.dir_children()?;
        self.store()?;
        let snapshot: Vec<Node> = children.read().values().cloned().collect();
        Ok(snapshot.into_iter())
    }

    /// Whether the directory has no children.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.dir_children()?.read().is_empty())
    }

    /// Listing entries sorted by name.
    pub fn entries(&self) -> Result<Vec<DirEntry>> {
        let mut entries: Vec<DirEntry> = self
            .children()?
            .map(|child| DirEntry {
                name: child.name().unwrap_or_default(),
                node_id: child.id(),
                kind: child.node_type(),
                size: child.stat().size,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Create a child node.
    ///
    /// Fails if the name is invalid or taken. New files start empty, so no
    /// blocks are reserved here.
    pub fn create_child(&self, name: &str, kind: NewNode) -> Result<Node> {
        validate_name(name)?;
        let children = self.dir_children()?;
        let store = self.store()?;

        let mut children = children.write();
        if self.is_detached() {
            return Err(Error::NotFound {
                path: self.path().to_string(),
                consumed: 0,
            });
        }
        if children.contains_key(name) {
            return Err(Error::PathExists(self.path().join(name)?.to_string()));
        }

        let id = store.next_node_id();
        let kind = match kind {
            NewNode::Directory => NodeKind::Directory(RwLock::new(HashMap::new())),
            NewNode::File => NodeKind::File(RwLock::new(FileContent::new(
                ExtensibleBlockBuffer::new(Arc::clone(store.allocator()), id),
            ))),
            NewNode::Link(target) => NodeKind::Link(target),
        };
        let child = Node(Arc::new(NodeInner {
            id,
            store: self.0.store.clone(),
            placement: RwLock::new(Placement {
                parent: Some(Arc::downgrade(&self.0)),
                name: Some(name.to_string()),
            }),
            times: Mutex::new(Timestamps::now()),
            kind,
        }));

        children.insert(name.to_string(), child.clone());
        drop(children);
        self.touch();
        Ok(child)
    }

    /// Remove the child called `name`.
    ///
    /// Directories must be empty. A removed file's blocks go back to the
    /// pool before the entry disappears.
    pub fn remove_child(&self, name: &str) -> Result<Node> {
        self.remove_entry(name, None)
    }

    /// Remove this node from its parent.
    pub fn unlink(&self) -> Result<()> {
        if self.is_root() {
            return Err(Error::InvalidPath("cannot remove the root".to_string()));
        }
        let name = self.name().unwrap_or_default();
        let parent = self.parent().ok_or_else(|| Error::NotFound {
            path: self.path().to_string(),
            consumed: 0,
        })?;
        parent.remove_entry(&name, Some(self)).map(|_| ())
    }

    fn remove_entry(&self, name: &str, expected: Option<&Node>) -> Result<Node> {
        let children = self.dir_children()?;
        self.store()?;
        let not_found = || Error::NotFound {
            path: self.path().join(name).map(|r| r.to_string()).unwrap_or_default(),
            consumed: 0,
        };

        let child = children.read().get(name).cloned().ok_or_else(not_found)?;
        if expected.is_some_and(|node| node != &child) {
            return Err(not_found());
        }

        let (mut parent_guard, child_guard) = match &child.0.kind {
            NodeKind::Directory(grandchildren) => {
                // directory locks are taken in node-id order
                if child.id() < self.id() {
                    let c = grandchildren.write();
                    (children.write(), Some(c))
                } else {
                    let p = children.write();
                    (p, Some(grandchildren.write()))
                }
            }
            _ => (children.write(), None),
        };

        if !parent_guard.get(name).is_some_and(|current| current == &child) {
            return Err(not_found());
        }
        if child_guard.as_ref().is_some_and(|g| !g.is_empty()) {
            return Err(Error::DirectoryNotEmpty(child.path().to_string()));
        }
        if let NodeKind::File(content) = &child.0.kind {
            let mut content = content.write();
            content.size = 0;
            content.buffer.trim_capacity(0)?;
        }

        parent_guard.remove(name);
        child.0.placement.write().parent = None;
        drop(child_guard);
        drop(parent_guard);
        self.touch();
        Ok(child)
    }

    /// Move the child `name` into `target` as `new_name`.
    ///
    /// The target name must be free. A directory cannot be moved below
    /// itself.
    pub fn rename_child(&self, name: &str, target: &Node, new_name: &str) -> Result<Node> {
        validate_name(new_name)?;
        if !self.same_store(target) {
            return Err(Error::CrossSpace);
        }
        let source_children = self.dir_children()?;
        let target_children = target.dir_children()?;
        let store = self.store()?;
        let not_found = || Error::NotFound {
            path: self.path().join(name).map(|r| r.to_string()).unwrap_or_default(),
            consumed: 0,
        };

        let child = source_children
            .read()
            .get(name)
            .cloned()
            .ok_or_else(not_found)?;
        let _moving = child.is_directory().then(|| store.rename_lock().lock());
        if child.is_directory() {
            let mut ancestor = Some(target.clone());
            while let Some(node) = ancestor {
                if node == child {
                    return Err(Error::InvalidArgument(format!(
                        "cannot move {} below itself",
                        child.path()
                    )));
                }
                ancestor = node.parent();
            }
        }

        if self == target {
            let mut children = source_children.write();
            if !children.get(name).is_some_and(|current| current == &child) {
                return Err(not_found());
            }
            if name == new_name {
                return Ok(child);
            }
            if children.contains_key(new_name) {
                return Err(Error::PathExists(self.path().join(new_name)?.to_string()));
            }
            children.remove(name);
            children.insert(new_name.to_string(), child.clone());
            child.0.placement.write().name = Some(new_name.to_string());
        } else {
            let (mut source, mut dest) = if self.id() < target.id() {
                let s = source_children.write();
                (s, target_children.write())
            } else {
                let d = target_children.write();
                (source_children.write(), d)
            };
            if !source.get(name).is_some_and(|current| current == &child) {
                return Err(not_found());
            }
            if dest.contains_key(new_name) {
                return Err(Error::PathExists(target.path().join(new_name)?.to_string()));
            }
            source.remove(name);
            dest.insert(new_name.to_string(), child.clone());
            let mut placement = child.0.placement.write();
            placement.parent = Some(Arc::downgrade(&target.0));
            placement.name = Some(new_name.to_string());
        }

        self.touch();
        target.touch();
        Ok(child)
    }

    // ---- files ----

    fn file_content(&self) -> Result<&RwLock<FileContent>> {
        match &self.0.kind {
            NodeKind::File(content) => Ok(content),
            NodeKind::Directory(_) => Err(Error::IsADirectory(self.path().to_string())),
            NodeKind::Link(_) => Err(Error::NotAFile(self.path().to_string())),
        }
    }

    /// Logical file size.
    pub fn read_size(&self) -> Result<u64> {
        Ok(self.file_content()?.read().size())
    }

    /// Grow or truncate the file.
    ///
    /// Growth zero-fills the newly exposed bytes; truncation returns
    /// trailing blocks to the pool.
    pub fn set_size(&self, new_size: u64) -> Result<()> {
        let content = self.file_content()?;
        let scratch = self.store()?.config().scratch_size;
        content.write().resize(new_size, scratch)?;
        self.touch();
        Ok(())
    }

    /// Shared access to the file content.
    pub fn content(&self) -> Result<RwLockReadGuard<'_, FileContent>> {
        Ok(self.file_content()?.read())
    }

    /// Exclusive access to the file content; serialises growth and shrink.
    pub fn content_mut(&self) -> Result<RwLockWriteGuard<'_, FileContent>> {
        let guard = self.file_content()?.write();
        self.touch();
        Ok(guard)
    }

    // ---- links ----

    /// Target of a symbolic link, without resolving it.
    pub fn link_target(&self) -> Option<&Route> {
        match &self.0.kind {
            NodeKind::Link(target) => Some(target),
            _ => None,
        }
    }

    /// Target of a symbolic link; fails for other kinds.
    pub fn follow_target(&self) -> Result<Route> {
        self.link_target()
            .cloned()
            .ok_or_else(|| Error::NotALink(self.path().to_string()))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id())
            .field("type", &self.node_type())
            .field("name", &self.name())
            .finish()
    }
}

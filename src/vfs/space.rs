//! Space: the filesystem façade.
//!
//! A space owns the block pool, the usage counters, the configuration and
//! the root directory. Path-based operations parse a route, resolve it from
//! the root and act on the resulting node.

use crate::config::SpaceConfig;
use crate::error::{Error, Result};
use crate::storage::{BlockAllocator, Usage, UsageCounter};
use crate::vfs::channel::{OpenOptions, SeekableChannel};
use crate::vfs::node::{NewNode, Node};
use crate::vfs::resolver::{ResolutionKind, ResolutionOutcome, RouteResolver};
use crate::vfs::route::Route;
use crate::vfs::types::{DirEntry, NodeId, NodeStat, ROOT_NODE_ID};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// State shared by a space and its nodes.
pub(crate) struct SpaceShared {
    allocator: Arc<BlockAllocator>,
    usage: Arc<UsageCounter>,
    config: SpaceConfig,
    root: Node,
    next_id: AtomicU64,
    closed: AtomicBool,
    rename_lock: Mutex<()>,
}

impl SpaceShared {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn root(&self) -> &Node {
        &self.root
    }

    pub(crate) fn next_node_id(&self) -> NodeId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn allocator(&self) -> &Arc<BlockAllocator> {
        &self.allocator
    }

    pub(crate) fn config(&self) -> &SpaceConfig {
        &self.config
    }

    /// Held by directory moves from the ancestor check to the commit.
    pub(crate) fn rename_lock(&self) -> &Mutex<()> {
        &self.rename_lock
    }
}

/// Space information summary.
#[derive(Debug, Clone, Serialize)]
pub struct SpaceInfo {
    /// Block pool usage.
    pub usage: Usage,
    /// Number of directories, the root included.
    pub directory_count: usize,
    /// Number of regular files.
    pub file_count: usize,
    /// Number of symbolic links.
    pub link_count: usize,
    /// Sum of the logical sizes of all files.
    pub total_file_size: u64,
}

/// A memory-resident filesystem.
///
/// Cloning yields another handle to the same space.
#[derive(Clone)]
pub struct Space {
    shared: Arc<SpaceShared>,
}

impl Space {
    /// Create an empty space with a fresh block pool.
    pub fn new(config: SpaceConfig) -> Result<Self> {
        config.validate().map_err(Error::InvalidConfig)?;

        let allocator = Arc::new(BlockAllocator::new(config.block_size, config.block_count));
        let usage = allocator.usage_counter();
        let shared = Arc::new_cyclic(|weak| SpaceShared {
            allocator,
            usage,
            root: Node::new_root(ROOT_NODE_ID, weak.clone()),
            next_id: AtomicU64::new(ROOT_NODE_ID + 1),
            closed: AtomicBool::new(false),
            rename_lock: Mutex::new(()),
            config,
        });

        info!(
            block_size = shared.config.block_size,
            block_count = shared.config.block_count,
            "space created"
        );
        Ok(Self { shared })
    }

    /// The root directory.
    pub fn root(&self) -> Node {
        self.shared.root.clone()
    }

    /// Effective configuration.
    pub fn config(&self) -> &SpaceConfig {
        &self.shared.config
    }

    /// Whether [`Space::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Current block usage.
    pub fn usage(&self) -> Usage {
        self.shared.usage.snapshot()
    }

    /// Close the space.
    ///
    /// Every block goes back to the pool and later lookups fail with
    /// [`Error::SpaceClosed`]. Closing twice is a no-op.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.allocator.close();
        info!("space closed");
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SpaceClosed);
        }
        Ok(())
    }

    // ---- resolution ----

    /// Resolve a whole route from the root.
    pub fn resolve(&self, route: &Route, follow_links: bool) -> ResolutionOutcome {
        self.resolve_from(&self.shared.root, route, follow_links, 0..route.len())
    }

    /// Resolve `route[range]` from `start`.
    pub fn resolve_from(
        &self,
        start: &Node,
        route: &Route,
        follow_links: bool,
        range: Range<usize>,
    ) -> ResolutionOutcome {
        RouteResolver::new(self.root()).resolve(start, route, follow_links, range)
    }

    fn locate(&self, path: &str, follow_links: bool) -> Result<Node> {
        self.check_open()?;
        let route = Route::parse(path)?;
        self.resolve(&route, follow_links).into_node()
    }

    /// Find the node at `path`, following links.
    pub fn lookup(&self, path: &str) -> Result<Node> {
        self.locate(path, true)
    }

    /// Whether `path` resolves to a node, following links.
    pub fn exists(&self, path: &str) -> bool {
        match Route::parse(path) {
            Ok(route) => !self.is_closed() && self.resolve(&route, true).is_success(),
            Err(_) => false,
        }
    }

    // ---- structure ----

    fn create(&self, path: &str, kind: NewNode) -> Result<Node> {
        self.check_open()?;
        let route = Route::parse(path)?;
        let outcome = self.resolve(&route, false);
        if outcome.is_success() {
            return Err(Error::PathExists(route.to_string()));
        }
        if !outcome.is_leaf_missing() {
            return Err(outcome.into_error());
        }
        let name = route
            .name()
            .ok_or_else(|| Error::InvalidPath(route.to_string()))?;
        outcome.node().create_child(name, kind)
    }

    /// Create a directory; its parent must exist.
    pub fn create_directory(&self, path: &str) -> Result<Node> {
        self.create(path, NewNode::Directory)
    }

    /// Create a directory and any missing ancestors.
    ///
    /// Existing directories along the way (or links to them) are reused.
    pub fn create_directories(&self, path: &str) -> Result<Node> {
        self.check_open()?;
        let route = Route::parse(path)?;
        let mut current = self.root();
        for (index, name) in route.components().iter().enumerate() {
            let outcome = self.resolve_from(&current, &route, true, index..index + 1);
            current = match outcome.kind() {
                ResolutionKind::Success => outcome.into_node()?,
                ResolutionKind::NameNotFound => {
                    match current.create_child(name, NewNode::Directory) {
                        Ok(dir) => dir,
                        // lost a race with another creator
                        Err(Error::PathExists(_)) => current
                            .resolve_child(name)?
                            .ok_or_else(|| Error::NotFound {
                                path: route.prefix(index + 1).to_string(),
                                consumed: index,
                            })?,
                        Err(e) => return Err(e),
                    }
                }
                _ => return Err(outcome.into_error()),
            };
            if !current.is_directory() {
                return Err(Error::NotADirectory(route.prefix(index + 1).to_string()));
            }
        }
        Ok(current)
    }

    /// Create an empty file; its parent must exist.
    pub fn create_file(&self, path: &str) -> Result<Node> {
        self.create(path, NewNode::File)
    }

    /// Create a symbolic link at `path` pointing to `target`.
    ///
    /// The target is stored as given and need not exist.
    pub fn create_link(&self, path: &str, target: &str) -> Result<Node> {
        let target = Route::parse(target)?;
        self.create(path, NewNode::Link(target))
    }

    /// Target of the link at `path`.
    pub fn read_link(&self, path: &str) -> Result<Route> {
        self.locate(path, false)?.follow_target()
    }

    /// Remove the node at `path`. Links are removed, not their targets.
    pub fn delete(&self, path: &str) -> Result<()> {
        let node = self.locate(path, false)?;
        node.unlink()?;
        debug!(path, "node deleted");
        Ok(())
    }

    /// Move the node at `from` to `to`.
    ///
    /// `to` must not exist and its parent must be a directory of the same
    /// space. A directory cannot be moved below itself.
    pub fn rename(&self, from: &str, to: &str) -> Result<Node> {
        let source = self.locate(from, false)?;
        if source.is_root() {
            return Err(Error::InvalidPath("cannot move the root".to_string()));
        }
        let source_parent = source.parent().ok_or_else(|| Error::NotFound {
            path: from.to_string(),
            consumed: 0,
        })?;
        let source_name = source.name().unwrap_or_default();

        let target = Route::parse(to)?;
        let outcome = self.resolve(&target, false);
        if outcome.is_success() {
            return Err(Error::PathExists(target.to_string()));
        }
        if !outcome.is_leaf_missing() {
            return Err(outcome.into_error());
        }
        let new_name = target
            .name()
            .ok_or_else(|| Error::InvalidPath(target.to_string()))?;
        source_parent.rename_child(&source_name, outcome.node(), new_name)
    }

    /// List a directory, sorted by name.
    pub fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.lookup(path)?.entries()
    }

    /// Metadata of the node at `path`, following links.
    pub fn stat(&self, path: &str) -> Result<NodeStat> {
        Ok(self.lookup(path)?.stat())
    }

    // ---- file content ----

    /// Open a file for channel I/O.
    pub fn open(&self, path: &str, options: &OpenOptions) -> Result<SeekableChannel> {
        self.check_open()?;
        options.validate()?;
        let route = Route::parse(path)?;
        let outcome = self.resolve(&route, true);

        let node = if outcome.is_success() {
            if options.is_create_new() {
                return Err(Error::PathExists(route.to_string()));
            }
            outcome.into_node()?
        } else if outcome.is_leaf_missing() && (options.is_create() || options.is_create_new()) {
            let name = route
                .name()
                .ok_or_else(|| Error::InvalidPath(route.to_string()))?;
            let parent = outcome.node();
            match parent.create_child(name, NewNode::File) {
                Ok(file) => file,
                Err(Error::PathExists(_)) if !options.is_create_new() => parent
                    .resolve_child(name)?
                    .ok_or_else(|| Error::NotFound {
                        path: route.to_string(),
                        consumed: route.len() - 1,
                    })?,
                Err(e) => return Err(e),
            }
        } else {
            return Err(outcome.into_error());
        };

        SeekableChannel::open(node, options)
    }

    /// Read a whole file.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let mut channel = self.open(path, OpenOptions::new().read(true))?;
        let mut data = Vec::with_capacity(channel.size()? as usize);
        let mut chunk = vec![0u8; self.shared.config.scratch_size];
        while let Some(n) = channel.read(&mut chunk)? {
            data.extend_from_slice(&chunk[..n]);
        }
        channel.close()?;
        Ok(data)
    }

    /// Replace the content of a file, creating it if needed.
    pub fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let options = OpenOptions::new().write(true).create(true).truncate(true).clone();
        let mut channel = self.open(path, &options)?;
        channel.write(data)?;
        channel.close()
    }

    /// Append to a file, creating it if needed.
    pub fn append_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let options = OpenOptions::new().append(true).create(true).clone();
        let mut channel = self.open(path, &options)?;
        channel.write(data)?;
        channel.close()
    }

    /// Grow or truncate the file at `path`.
    pub fn set_size(&self, path: &str, size: u64) -> Result<()> {
        self.lookup(path)?.set_size(size)
    }

    // ---- reporting ----

    /// Usage plus node counts.
    pub fn info(&self) -> Result<SpaceInfo> {
        self.check_open()?;
        let mut info = SpaceInfo {
            usage: self.usage(),
            directory_count: 0,
            file_count: 0,
            link_count: 0,
            total_file_size: 0,
        };

        let mut pending = vec![self.root()];
        while let Some(node) = pending.pop() {
            if node.is_directory() {
                info.directory_count += 1;
                pending.extend(node.children()?);
            } else if node.is_file() {
                info.file_count += 1;
                info.total_file_size += node.read_size()?;
            } else {
                info.link_count += 1;
            }
        }
        Ok(info)
    }
}

impl fmt::Debug for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Space")
            .field("config", &self.shared.config)
            .field("usage", &self.usage())
            .field("closed", &self.is_closed())
            .finish()
    }
}

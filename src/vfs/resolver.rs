//! Route resolution against the node tree.
//!
//! Resolution never fails with an error directly. It produces a
//! [`ResolutionOutcome`] describing how far the walk got and why it stopped,
//! so "does it exist" queries don't pay for error construction and callers
//! can tell a missing leaf from a missing parent. [`ResolutionOutcome::into_node`]
//! converts the outcome into a `Result` where existence is required.

use crate::error::Error;
use crate::vfs::node::Node;
use crate::vfs::route::{Route, CURRENT_DIR, PARENT_DIR};
use crate::vfs::types::NodeId;
use std::ops::Range;
use tracing::trace;

/// Why a resolution stopped.
#[derive(Debug)]
pub enum ResolutionStatus {
    /// Every component resolved.
    Success,
    /// A component does not exist.
    NameNotFound,
    /// A non-final component is not a directory.
    NonDirectoryEncountered,
    /// A link chain revisited `link`.
    LinkLoop { link: Node },
    /// The target of `link` failed to resolve.
    SubresolutionFailure {
        link: Node,
        nested: Box<ResolutionOutcome>,
    },
    /// A lookup failed; the walk stopped there.
    IoFailure(Box<Error>),
    /// The tree was observed in an impossible state.
    InconsistentState(String),
}

/// Status tag without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    Success,
    NameNotFound,
    NonDirectoryEncountered,
    LinkLoop,
    SubresolutionFailure,
    IoFailure,
    InconsistentState,
}

impl ResolutionStatus {
    /// Tag of this status.
    pub fn kind(&self) -> ResolutionKind {
        match self {
            ResolutionStatus::Success => ResolutionKind::Success,
            ResolutionStatus::NameNotFound => ResolutionKind::NameNotFound,
            ResolutionStatus::NonDirectoryEncountered => ResolutionKind::NonDirectoryEncountered,
            ResolutionStatus::LinkLoop { .. } => ResolutionKind::LinkLoop,
            ResolutionStatus::SubresolutionFailure { .. } => ResolutionKind::SubresolutionFailure,
            ResolutionStatus::IoFailure(_) => ResolutionKind::IoFailure,
            ResolutionStatus::InconsistentState(_) => ResolutionKind::InconsistentState,
        }
    }
}

/// Result of walking a route.
///
/// On success `node` is the target and `consumed == end`. On failure `node`
/// is the last node reached (the last directory for missing names) and
/// `consumed` is the index of the component that failed.
#[derive(Debug)]
pub struct ResolutionOutcome {
    node: Node,
    route: Route,
    consumed: usize,
    end: usize,
    status: ResolutionStatus,
}

impl ResolutionOutcome {
    fn new(node: Node, route: &Route, consumed: usize, end: usize, status: ResolutionStatus) -> Self {
        if !matches!(status, ResolutionStatus::Success) {
            trace!(route = %route, consumed, kind = ?status.kind(), "resolution stopped");
        }
        Self {
            node,
            route: route.clone(),
            consumed,
            end,
            status,
        }
    }

    /// Target node on success, last reached node otherwise.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// The route that was walked.
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Index reached by the walk.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// End of the requested range.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Why the walk stopped.
    pub fn status(&self) -> &ResolutionStatus {
        &self.status
    }

    /// Status tag.
    pub fn kind(&self) -> ResolutionKind {
        self.status.kind()
    }

    /// Whether every component resolved.
    pub fn is_success(&self) -> bool {
        matches!(self.status, ResolutionStatus::Success)
    }

    /// Whether only the final component is missing.
    ///
    /// `node` is then the would-be parent.
    pub fn is_leaf_missing(&self) -> bool {
        matches!(self.status, ResolutionStatus::NameNotFound) && self.consumed + 1 == self.end
    }

    /// Follow nested link failures down to the outcome that caused them.
    pub fn innermost(&self) -> &ResolutionOutcome {
        match &self.status {
            ResolutionStatus::SubresolutionFailure { nested, .. } => nested.innermost(),
            _ => self,
        }
    }

    /// The target node, or the error describing why it does not exist.
    pub fn into_node(self) -> Result<Node, Error> {
        match self.status {
            ResolutionStatus::Success => Ok(self.node),
            _ => Err(self.into_error()),
        }
    }

    /// Convert a failed outcome into an error.
    pub fn into_error(self) -> Error {
        match self.status {
            ResolutionStatus::Success => Error::InconsistentState(format!(
                "resolution of {} succeeded",
                self.route
            )),
            ResolutionStatus::NameNotFound => Error::NotFound {
                path: self.route.prefix(self.consumed + 1).to_string(),
                consumed: self.consumed,
            },
            ResolutionStatus::NonDirectoryEncountered => {
                Error::NotADirectory(self.route.prefix(self.consumed).to_string())
            }
            ResolutionStatus::LinkLoop { link } => Error::LinkLoop(link.path().to_string()),
            ResolutionStatus::SubresolutionFailure { link, nested } => {
                Error::UnresolvedLinkTarget {
                    link: link.path().to_string(),
                    source: Box::new(nested.into_error()),
                }
            }
            ResolutionStatus::IoFailure(e) => *e,
            ResolutionStatus::InconsistentState(msg) => Error::InconsistentState(msg),
        }
    }
}

/// Walks routes for one space.
///
/// The resolver keeps the set of links being dereferenced so that nested
/// resolutions started by a link chain share its loop detection.
#[derive(Debug)]
pub struct RouteResolver {
    root: Node,
    chain: Vec<NodeId>,
    dereferences: usize,
}

impl RouteResolver {
    /// Create a resolver for the space rooted at `root`.
    pub fn new(root: Node) -> Self {
        Self {
            root,
            chain: Vec::new(),
            dereferences: 0,
        }
    }

    /// Number of link dereferences performed so far.
    pub fn dereferences(&self) -> usize {
        self.dereferences
    }

    /// Walk `route[range]` starting at `start`.
    ///
    /// Links in non-final position are always followed; a link in final
    /// position is followed only when `follow_links` is set.
    pub fn resolve(
        &mut self,
        start: &Node,
        route: &Route,
        follow_links: bool,
        range: Range<usize>,
    ) -> ResolutionOutcome {
        let end = range.end;
        if range.start > end || end > route.len() {
            return ResolutionOutcome::new(
                start.clone(),
                route,
                range.start,
                end,
                ResolutionStatus::InconsistentState(format!(
                    "range {:?} outside route {} of {} components",
                    range,
                    route,
                    route.len()
                )),
            );
        }

        let mut last_node = start.clone();
        for index in range {
            if !last_node.is_directory() {
                return ResolutionOutcome::new(
                    last_node,
                    route,
                    index,
                    end,
                    ResolutionStatus::NonDirectoryEncountered,
                );
            }
            let directory = last_node;
            let name = route.component(index).unwrap_or_default();

            let next = match name {
                CURRENT_DIR => directory.clone(),
                PARENT_DIR => {
                    if directory.is_root() {
                        directory.clone()
                    } else {
                        match directory.parent() {
                            Some(parent) => parent,
                            None => {
                                let msg = format!("{} was removed during resolution", directory.path());
                                return ResolutionOutcome::new(
                                    directory,
                                    route,
                                    index,
                                    end,
                                    ResolutionStatus::InconsistentState(msg),
                                );
                            }
                        }
                    }
                }
                _ => match directory.resolve_child(name) {
                    Ok(Some(child)) => child,
                    Ok(None) => {
                        return ResolutionOutcome::new(
                            directory,
                            route,
                            index,
                            end,
                            ResolutionStatus::NameNotFound,
                        );
                    }
                    Err(e) => {
                        return ResolutionOutcome::new(
                            directory,
                            route,
                            index,
                            end,
                            ResolutionStatus::IoFailure(Box::new(e)),
                        );
                    }
                },
            };

            let is_final = index + 1 == end;
            last_node = if next.is_link() && (!is_final || follow_links) {
                match self.dereference(&next) {
                    Ok(target) => target,
                    Err(status) => {
                        return ResolutionOutcome::new(directory, route, index, end, status);
                    }
                }
            } else {
                next
            };
        }

        ResolutionOutcome::new(last_node, route, end, end, ResolutionStatus::Success)
    }

    /// Follow `link` until a non-link is reached.
    fn dereference(&mut self, link: &Node) -> Result<Node, ResolutionStatus> {
        let depth = self.chain.len();
        let result = self.follow_chain(link);
        self.chain.truncate(depth);
        result
    }

    fn follow_chain(&mut self, link: &Node) -> Result<Node, ResolutionStatus> {
        let mut current = link.clone();
        while let Some(target) = current.link_target().cloned() {
            if self.chain.contains(&current.id()) {
                return Err(ResolutionStatus::LinkLoop { link: current });
            }
            self.chain.push(current.id());
            self.dereferences += 1;

            // every target is resolved from the space root
            let root = self.root.clone();
            let nested = self.resolve(&root, &target, false, 0..target.len());
            if !nested.is_success() {
                return Err(ResolutionStatus::SubresolutionFailure {
                    link: current,
                    nested: Box::new(nested),
                });
            }
            current = nested.node;
        }
        Ok(current)
    }
}

/// Walk `route[range]` from `start` with a fresh resolver.
pub fn resolve(
    start: &Node,
    route: &Route,
    follow_links: bool,
    range: Range<usize>,
) -> ResolutionOutcome {
    match start.root() {
        Ok(root) => RouteResolver::new(root).resolve(start, route, follow_links, range),
        Err(e) => ResolutionOutcome::new(
            start.clone(),
            route,
            range.start,
            range.end,
            ResolutionStatus::IoFailure(Box::new(e)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpaceConfig;
    use crate::vfs::node::NewNode;
    use crate::vfs::Space;

    fn route(s: &str) -> Route {
        Route::parse(s).unwrap()
    }

    fn full(start: &Node, r: &Route, follow: bool) -> ResolutionOutcome {
        resolve(start, r, follow, 0..r.len())
    }

    fn tree() -> Space {
        let space = Space::new(SpaceConfig::new(16, 8)).unwrap();
        let root = space.root();
        let foo = root.create_child("foo", NewNode::Directory).unwrap();
        foo.create_child("bar", NewNode::File).unwrap();
        foo.create_child("sub", NewNode::Directory).unwrap();
        space
    }

    #[test]
    fn test_resolve_existing() {
        let space = tree();
        let root = space.root();
        let r = route("/foo/bar");
        let outcome = full(&root, &r, true);

        assert!(outcome.is_success());
        assert_eq!(outcome.consumed(), 2);
        let foo = root.resolve_child("foo").unwrap().unwrap();
        let bar = foo.resolve_child("bar").unwrap().unwrap();
        assert_eq!(outcome.node(), &bar);
    }

    #[test]
    fn test_empty_route_is_start() {
        let space = tree();
        let foo = space.root().resolve_child("foo").unwrap().unwrap();
        let outcome = full(&foo, &Route::root(), true);
        assert!(outcome.is_success());
        assert_eq!(outcome.node(), &foo);
    }

    #[test]
    fn test_missing_leaf() {
        let space = tree();
        let root = space.root();
        let r = route("/foo/nope");
        let outcome = full(&root, &r, true);

        assert_eq!(outcome.kind(), ResolutionKind::NameNotFound);
        assert!(outcome.is_leaf_missing());
        assert_eq!(outcome.consumed(), 1);
        assert_eq!(outcome.node().name().as_deref(), Some("foo"));
    }

    #[test]
    fn test_missing_parent() {
        let space = tree();
        let r = route("/nope/leaf");
        let outcome = full(&space.root(), &r, true);
        assert_eq!(outcome.kind(), ResolutionKind::NameNotFound);
        assert!(!outcome.is_leaf_missing());
        assert_eq!(outcome.consumed(), 0);

        match outcome.into_node() {
            Err(Error::NotFound { path, consumed }) => {
                assert_eq!(path, "/nope");
                assert_eq!(consumed, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_non_directory_component() {
        let space = tree();
        let r = route("/foo/bar/baz");
        let outcome = full(&space.root(), &r, true);

        assert_eq!(outcome.kind(), ResolutionKind::NonDirectoryEncountered);
        assert_eq!(outcome.consumed(), 2);
        assert!(outcome.node().is_file());
        assert!(matches!(
            outcome.into_node(),
            Err(Error::NotADirectory(path)) if path == "/foo/bar"
        ));
    }

    #[test]
    fn test_dot_and_dotdot() {
        let space = tree();
        let root = space.root();
        let r = route("/foo/./sub/../bar");
        let outcome = full(&root, &r, true);
        assert!(outcome.is_success());
        assert!(outcome.node().is_file());

        let above = full(&root, &route("/../../foo"), true);
        assert!(above.is_success());
        assert_eq!(above.node().name().as_deref(), Some("foo"));
    }

    #[test]
    fn test_relative_from_directory() {
        let space = tree();
        let foo = space.root().resolve_child("foo").unwrap().unwrap();
        let outcome = full(&foo, &route("sub/../bar"), true);
        assert!(outcome.is_success());
        assert_eq!(outcome.node().path().to_string(), "/foo/bar");
    }

    #[test]
    fn test_partial_range() {
        let space = tree();
        let r = route("/foo/bar/anything");
        let outcome = resolve(&space.root(), &r, true, 0..2);
        assert!(outcome.is_success());
        assert!(outcome.node().is_file());

        let bad = resolve(&space.root(), &r, true, 1..7);
        assert_eq!(bad.kind(), ResolutionKind::InconsistentState);
    }

    #[test]
    fn test_link_in_middle_is_followed() {
        let space = tree();
        let root = space.root();
        root.create_child("l", NewNode::Link(route("/foo")))
            .unwrap();

        let outcome = full(&root, &route("/l/bar"), false);
        assert!(outcome.is_success());
        assert_eq!(outcome.node().path().to_string(), "/foo/bar");
    }

    #[test]
    fn test_final_link_follow_flag() {
        let space = tree();
        let root = space.root();
        let link = root
            .create_child("l", NewNode::Link(route("foo/bar")))
            .unwrap();

        let nofollow = full(&root, &route("/l"), false);
        assert_eq!(nofollow.node(), &link);

        let follow = full(&root, &route("/l"), true);
        assert!(follow.is_success());
        assert!(follow.node().is_file());
    }

    #[test]
    fn test_relative_target_resolves_from_root() {
        let space = tree();
        let root = space.root();
        let foo = root.resolve_child("foo").unwrap().unwrap();
        foo.create_child("up", NewNode::Link(route("foo/bar"))).unwrap();
        foo.create_child("here", NewNode::Link(route("bar"))).unwrap();

        let outcome = full(&root, &route("/foo/up"), true);
        assert!(outcome.is_success());
        assert_eq!(outcome.node().path().to_string(), "/foo/bar");

        // "bar" is looked up in the root, not next to the link
        let outcome = full(&root, &route("/foo/here"), true);
        assert_eq!(outcome.kind(), ResolutionKind::SubresolutionFailure);
        assert_eq!(outcome.innermost().kind(), ResolutionKind::NameNotFound);
    }

    #[test]
    fn test_link_chain() {
        let space = tree();
        let root = space.root();
        root.create_child("a", NewNode::Link(route("/b"))).unwrap();
        root.create_child("b", NewNode::Link(route("/c"))).unwrap();
        root.create_child("c", NewNode::Link(route("/foo"))).unwrap();

        let mut resolver = RouteResolver::new(root.clone());
        let r = route("/a/bar");
        let outcome = resolver.resolve(&root, &r, true, 0..r.len());
        assert!(outcome.is_success());
        assert_eq!(resolver.dereferences(), 3);
    }

    #[test]
    fn test_two_link_loop() {
        let space = tree();
        let root = space.root();
        root.create_child("a", NewNode::Link(route("/b"))).unwrap();
        root.create_child("b", NewNode::Link(route("/a"))).unwrap();

        for path in ["/a", "/a/x", "/b/x/y"] {
            let r = route(path);
            let outcome = full(&root, &r, true);
            assert_eq!(outcome.kind(), ResolutionKind::LinkLoop, "{}", path);
        }

        // without following, the final link itself is the target
        let outcome = full(&root, &route("/a"), false);
        assert!(outcome.is_success());
        assert!(outcome.node().is_link());
    }

    #[test]
    fn test_loop_bounded_by_cycle_length() {
        let space = tree();
        let root = space.root();
        // entry -> l0 -> l1 -> l2 -> l0
        root.create_child("entry", NewNode::Link(route("/l0"))).unwrap();
        for i in 0..3 {
            let next = format!("/l{}", (i + 1) % 3);
            root.create_child(&format!("l{}", i), NewNode::Link(route(&next)))
                .unwrap();
        }

        let mut resolver = RouteResolver::new(root.clone());
        let r = route("/entry/x");
        let outcome = resolver.resolve(&root, &r, true, 0..r.len());
        assert_eq!(outcome.kind(), ResolutionKind::LinkLoop);
        match outcome.status() {
            ResolutionStatus::LinkLoop { link } => assert_eq!(link.name().as_deref(), Some("l0")),
            other => panic!("unexpected {:?}", other),
        }
        // entry, then l0 l1 l2 before l0 recurs
        assert_eq!(resolver.dereferences(), 4);
    }

    #[test]
    fn test_loop_through_intermediate_components() {
        let space = tree();
        let root = space.root();
        root.create_child("a", NewNode::Link(route("b/x"))).unwrap();
        root.create_child("b", NewNode::Link(route("a/x"))).unwrap();

        let outcome = full(&root, &route("/a"), true);
        assert_eq!(outcome.kind(), ResolutionKind::SubresolutionFailure);
        assert_eq!(outcome.innermost().kind(), ResolutionKind::LinkLoop);
        assert!(matches!(
            outcome.into_node(),
            Err(Error::UnresolvedLinkTarget { .. })
        ));
    }

    #[test]
    fn test_dangling_link() {
        let space = tree();
        let root = space.root();
        root.create_child("d", NewNode::Link(route("/missing"))).unwrap();

        let outcome = full(&root, &route("/d/x"), true);
        assert_eq!(outcome.kind(), ResolutionKind::SubresolutionFailure);
        assert_eq!(outcome.consumed(), 0);
        assert_eq!(outcome.innermost().kind(), ResolutionKind::NameNotFound);
    }

    #[test]
    fn test_closed_space_is_io_failure() {
        let space = tree();
        let root = space.root();
        space.close();

        let outcome = full(&root, &route("/foo/bar"), true);
        assert_eq!(outcome.kind(), ResolutionKind::IoFailure);
        assert!(matches!(outcome.into_node(), Err(Error::SpaceClosed)));
    }

    #[test]
    fn test_detached_parent_is_inconsistent() {
        let space = tree();
        let root = space.root();
        let foo = root.resolve_child("foo").unwrap().unwrap();
        let sub = foo.resolve_child("sub").unwrap().unwrap();
        foo.remove_child("sub").unwrap();

        let outcome = full(&sub, &route(".."), true);
        assert_eq!(outcome.kind(), ResolutionKind::InconsistentState);
    }
}

//! Integration tests for VFS end-to-end functionality.

use block_vfs::storage::{BlockAllocator, ExtensibleBlockBuffer};
use block_vfs::vfs::{
    resolve, NewNode, OpenOptions, ResolutionKind, ResolutionStatus, Route, RouteResolver,
};
use block_vfs::{Error, Space, SpaceConfig};
use std::sync::Arc;

/// Helper to create a space with small blocks so tests cross block boundaries.
fn setup_space(blocks: usize) -> Space {
    Space::new(SpaceConfig::new(16, blocks)).expect("Failed to create space")
}

fn route(path: &str) -> Route {
    Route::parse(path).expect("Failed to parse route")
}

#[test]
fn test_three_block_pool_scenario() {
    let pool = BlockAllocator::new(4096, 3);
    let file_a = 10;
    let file_b = 11;

    let a_blocks = pool.allocate(file_a, 2).expect("Failed to allocate for A");
    assert_eq!(a_blocks.len(), 2);

    assert!(matches!(
        pool.allocate(file_b, 2),
        Err(Error::InsufficientSpace { requested: 2, available: 1 })
    ));
    assert_eq!(pool.reserved_by(file_a), a_blocks);
    assert!(pool.reserved_by(file_b).is_empty());

    let b_blocks = pool.allocate(file_b, 1).expect("Failed to allocate for B");
    assert!(matches!(
        pool.free(file_a, &b_blocks),
        Err(Error::ForeignBlock { .. })
    ));
    assert_eq!(pool.reserved_by(file_a), a_blocks);
    assert_eq!(pool.reserved_by(file_b), b_blocks);
}

#[test]
fn test_non_directory_in_the_middle() {
    let space = setup_space(8);
    space.create_directory("/foo").unwrap();
    space.create_file("/foo/bar").unwrap();

    let r = route("/foo/bar/baz");
    assert_eq!(r.len(), 3);
    let outcome = space.resolve(&r, true);
    assert_eq!(outcome.kind(), ResolutionKind::NonDirectoryEncountered);
    assert_eq!(outcome.consumed(), 2);
    assert!(outcome.node().is_file());
}

#[test]
fn test_sparse_write_scenario() {
    let space = setup_space(8);
    let options = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .clone();
    let mut channel = space.open("/sparse", &options).unwrap();

    channel.write(b"0123456").unwrap();
    channel.set_position(11).unwrap();
    channel.write(b"WXYZ").unwrap();
    channel.close().unwrap();

    let data = space.read_file("/sparse").unwrap();
    assert_eq!(data.len(), 15);
    assert_eq!(&data[..7], b"0123456");
    assert_eq!(&data[7..11], &[0u8; 4]);
    assert_eq!(&data[11..], b"WXYZ");
}

#[test]
fn test_two_link_cycle() {
    let space = setup_space(8);
    space.create_link("/a", "/b").unwrap();
    space.create_link("/b", "/a").unwrap();

    for path in ["/a", "/a/x", "/a/x/y/z"] {
        let outcome = space.resolve(&route(path), true);
        assert_eq!(outcome.kind(), ResolutionKind::LinkLoop, "{}", path);
    }
    assert!(matches!(space.lookup("/a/x"), Err(Error::LinkLoop(_))));
    assert!(matches!(
        space.read_file("/a"),
        Err(Error::LinkLoop(_))
    ));
}

#[test]
fn test_existing_routes_resolve_to_their_node() {
    let space = setup_space(32);
    let mut created = Vec::new();
    for dir in ["/a", "/a/b", "/a/b/c", "/d"] {
        created.push((dir, space.create_directory(dir).unwrap()));
    }
    for file in ["/a/f1", "/a/b/f2", "/a/b/c/f3", "/d/f4"] {
        created.push((file, space.create_file(file).unwrap()));
    }

    let root = space.root();
    for (path, node) in &created {
        let r = route(path);
        let outcome = resolve(&root, &r, true, 0..r.len());
        assert!(outcome.is_success(), "{}", path);
        assert_eq!(outcome.node(), node, "{}", path);
        assert_eq!(outcome.consumed(), r.len());
        assert_eq!(node.path().to_string(), *path);
    }
}

#[test]
fn test_missing_leaf_consumes_all_but_last() {
    let space = setup_space(8);
    space.create_directories("/a/b/c").unwrap();

    for path in ["/missing", "/a/missing", "/a/b/missing", "/a/b/c/missing"] {
        let r = route(path);
        let outcome = space.resolve(&r, true);
        assert_eq!(outcome.kind(), ResolutionKind::NameNotFound, "{}", path);
        assert_eq!(outcome.consumed(), outcome.end() - 1, "{}", path);
        assert!(outcome.is_leaf_missing());
        assert!(outcome.node().is_directory());
    }
}

#[test]
fn test_link_chain_with_cycle_is_bounded() {
    let space = setup_space(8);
    // l0 -> l1 -> ... -> l5 -> l3: chain of six, cycle of three
    let n = 6;
    let cycle_start = 3;
    for i in 0..n {
        let next = if i + 1 < n { i + 1 } else { cycle_start };
        space
            .create_link(&format!("/l{}", i), &format!("/l{}", next))
            .unwrap();
    }

    let root = space.root();
    let mut resolver = RouteResolver::new(root.clone());
    let r = route("/l0/x");
    let outcome = resolver.resolve(&root, &r, true, 0..r.len());

    assert_eq!(outcome.kind(), ResolutionKind::LinkLoop);
    match outcome.status() {
        ResolutionStatus::LinkLoop { link } => {
            assert_eq!(link.name().as_deref(), Some("l3"));
        }
        other => panic!("unexpected status {:?}", other),
    }
    // l0..l5 once each, then l3 recurs
    assert_eq!(resolver.dereferences(), n);
}

#[test]
fn test_link_chain_without_cycle() {
    let space = setup_space(8);
    space.create_directory("/target").unwrap();
    space.write_file("/target/data", b"payload").unwrap();
    for i in 0..10 {
        let next = if i == 9 {
            "/target".to_string()
        } else {
            format!("/l{}", i + 1)
        };
        space.create_link(&format!("/l{}", i), &next).unwrap();
    }

    assert_eq!(space.read_file("/l0/data").unwrap(), b"payload");
    assert_eq!(space.list("/l0").unwrap().len(), 1);
}

#[test]
fn test_buffer_round_trip_across_blocks() {
    let pool = Arc::new(BlockAllocator::new(16, 16));
    let mut buffer = ExtensibleBlockBuffer::new(Arc::clone(&pool), 1);
    buffer.ensure_capacity(100).unwrap();

    let data: Vec<u8> = (0..60u8).map(|b| b.wrapping_mul(7)).collect();
    for offset in [0u64, 5, 15, 16, 33, 40] {
        buffer.write(offset, &data).unwrap();
        let mut out = vec![0u8; data.len()];
        buffer.read(offset, &mut out).unwrap();
        assert_eq!(out, data, "offset {}", offset);
    }
}

#[test]
fn test_grow_then_trim_restores_allocator() {
    let pool = Arc::new(BlockAllocator::new(16, 16));
    let mut buffer = ExtensibleBlockBuffer::new(Arc::clone(&pool), 1);
    buffer.ensure_capacity(32).unwrap();
    let before = pool.free_set();

    buffer.ensure_capacity(100).unwrap();
    assert_eq!(buffer.capacity(), 112);
    buffer.trim_capacity(32).unwrap();

    assert_eq!(buffer.capacity(), 32);
    assert_eq!(pool.free_set(), before);
}

#[test]
fn test_nested_node_operations() {
    let space = setup_space(32);
    let root = space.root();
    let docs = root.create_child("docs", NewNode::Directory).unwrap();
    let file = docs.create_child("a.txt", NewNode::File).unwrap();
    file.set_size(20).unwrap();

    assert_eq!(space.stat("/docs/a.txt").unwrap().size, 20);
    assert_eq!(space.read_file("/docs/a.txt").unwrap(), vec![0u8; 20]);

    space.rename("/docs/a.txt", "/b.txt").unwrap();
    assert_eq!(file.parent(), Some(root.clone()));
    assert!(docs.is_empty().unwrap());
}

#[test]
fn test_full_workflow() {
    let space = setup_space(64);
    space.create_directories("/home/user/docs").unwrap();
    space
        .write_file("/home/user/docs/notes.txt", b"first line\n")
        .unwrap();
    space
        .append_file("/home/user/docs/notes.txt", b"second line\n")
        .unwrap();
    space
        .create_link("/home/user/latest", "home/user/docs/notes.txt")
        .unwrap();

    assert_eq!(
        space.read_file("/home/user/latest").unwrap(),
        b"first line\nsecond line\n"
    );

    let names: Vec<String> = space
        .list("/home/user")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["docs", "latest"]);

    space.delete("/home/user/latest").unwrap();
    space.delete("/home/user/docs/notes.txt").unwrap();
    assert_eq!(space.usage().used_blocks, 0);

    let info = space.info().unwrap();
    assert_eq!(info.file_count, 0);
    assert_eq!(info.directory_count, 4);
}

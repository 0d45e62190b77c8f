use super::*;
use pretty_assertions::assert_eq;
use rand::prelude::*;
use std::path::PathBuf;
use tempfile::tempdir;

fn scratch() -> (tempfile::TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join(index_file_name("t", 0));
    (dir, path)
}

fn int_index(pf: &mut PagedFiles, path: &PathBuf, order: i32) -> IndexHandle {
    IndexHandle::create(pf, path, ColType::Int, 4).unwrap();
    let mut ih = IndexHandle::open(pf, path).unwrap();
    // Shrink the order so small inserts exercise splits; the persisted page
    // geometry still reserves the full arrays.
    assert!(order > 2 && order <= ih.hdr.btree_order);
    ih.hdr.btree_order = order;
    ih
}

fn key(v: i32) -> [u8; 4] {
    v.to_le_bytes()
}

fn reopen(ih: IndexHandle, pf: &mut PagedFiles, path: &PathBuf) -> IndexHandle {
    ih.close(pf).unwrap();
    IndexHandle::open(pf, path).unwrap()
}

/// All (key, rid) entries in leaf order.
fn entries(ih: &IndexHandle, pf: &mut PagedFiles) -> Vec<(i32, Rid)> {
    let upper = ih.leaf_end(pf).unwrap();
    let mut scan = IxScan::new(ih, ih.leaf_begin(), upper);
    let mut out = Vec::new();
    while !scan.is_end() {
        let iid = scan.iid();
        let entry = ih
            .with_node(pf, iid.page_no, |n| {
                Ok((
                    i32::from_le_bytes(n.key(iid.slot_no).try_into().unwrap()),
                    n.rid(iid.slot_no),
                ))
            })
            .unwrap();
        out.push(entry);
        scan.next(pf).unwrap();
    }
    out
}

/// Parent back-pointers, max-key equality, and occupancy, checked root-down.
fn check_tree(ih: &IndexHandle, pf: &mut PagedFiles, page_no: i32) {
    let hdr = ih.node_hdr(pf, page_no).unwrap();
    assert_eq!(hdr.num_key, hdr.num_child);
    assert!(hdr.num_child <= ih.hdr.btree_order);
    if page_no != ih.hdr.root_page {
        assert!(hdr.num_child >= (ih.hdr.btree_order + 1) / 2);
    }
    if hdr.is_leaf {
        return;
    }
    for rank in 0..hdr.num_child {
        let (child, stored_key) = ih
            .with_node(pf, page_no, |n| Ok((n.rid(rank).page_no, n.key(rank).to_vec())))
            .unwrap();
        let (parent, child_max) = ih
            .with_node(pf, child, |n| {
                Ok((n.hdr.parent_page, n.key(n.hdr.num_key - 1).to_vec()))
            })
            .unwrap();
        assert_eq!(parent, page_no);
        assert_eq!(stored_key, child_max);
        check_tree(ih, pf, child);
    }
}

/// The leaf ring closes through the sentinel in both directions and each
/// neighbor pair is mutually linked.
fn check_leaf_ring(ih: &IndexHandle, pf: &mut PagedFiles) {
    let mut forward = Vec::new();
    let mut leaf = ih.hdr.first_leaf;
    while leaf != LEAF_SENTINEL_PAGE {
        let hdr = ih.node_hdr(pf, leaf).unwrap();
        assert_eq!(ih.node_hdr(pf, hdr.prev_leaf).unwrap().next_leaf, leaf);
        assert_eq!(ih.node_hdr(pf, hdr.next_leaf).unwrap().prev_leaf, leaf);
        forward.push(leaf);
        leaf = hdr.next_leaf;
        assert!(forward.len() <= ih.hdr.num_pages as usize, "ring does not close");
    }

    let mut backward = Vec::new();
    let mut leaf = ih.hdr.last_leaf;
    while leaf != LEAF_SENTINEL_PAGE {
        backward.push(leaf);
        leaf = ih.node_hdr(pf, leaf).unwrap().prev_leaf;
    }
    backward.reverse();
    assert_eq!(forward, backward);
}

/// Structural invariants plus agreement with a sorted mock multiset.
fn check_equal(ih: &IndexHandle, pf: &mut PagedFiles, mock: &[(i32, Rid)]) {
    check_tree(ih, pf, ih.hdr.root_page);
    check_leaf_ring(ih, pf);

    let found = entries(ih, pf);
    assert_eq!(found, mock);
    assert!(found.windows(2).all(|w| w[0].0 <= w[1].0));

    for &(k, _) in mock {
        let lower = mock.partition_point(|&(mk, _)| mk < k);
        let iid = ih.lower_bound(pf, &key(k)).unwrap();
        assert_eq!(ih.get_rid(pf, iid).unwrap(), mock[lower].1);

        let upper = mock.partition_point(|&(mk, _)| mk <= k);
        let iid = ih.upper_bound(pf, &key(k)).unwrap();
        if upper == mock.len() {
            assert_eq!(iid, ih.leaf_end(pf).unwrap());
        } else {
            assert_eq!(ih.get_rid(pf, iid).unwrap(), mock[upper].1);
        }
    }
}

/// Mirror of the tree's duplicate handling: equal keys keep insertion order.
fn mock_insert(mock: &mut Vec<(i32, Rid)>, k: i32, rid: Rid) {
    let pos = mock.partition_point(|&(mk, _)| mk <= k);
    mock.insert(pos, (k, rid));
}

#[test]
fn create_initializes_ring_and_empty_root() {
    let (_dir, path) = scratch();
    let mut pf = PagedFiles::new();
    IndexHandle::create(&mut pf, &path, ColType::Int, 4).unwrap();
    let ih = IndexHandle::open(&mut pf, &path).unwrap();

    assert_eq!(ih.hdr.root_page, INIT_ROOT_PAGE);
    assert_eq!(ih.hdr.first_leaf, INIT_ROOT_PAGE);
    assert_eq!(ih.hdr.last_leaf, INIT_ROOT_PAGE);
    assert_eq!(ih.hdr.num_pages, INIT_NUM_PAGES);
    assert!(ih.hdr.btree_order > 2);

    // Empty tree: begin == end, and a delete misses.
    let end = ih.leaf_end(&mut pf).unwrap();
    assert_eq!(ih.leaf_begin(), end);
    check_leaf_ring(&ih, &mut pf);
    ih.close(&mut pf).unwrap();
}

#[test]
fn page_geometry_is_byte_stable() {
    let (_dir, path) = scratch();
    let mut pf = PagedFiles::new();
    IndexHandle::create(&mut pf, &path, ColType::Int, 4).unwrap();
    let ih = IndexHandle::open(&mut pf, &path).unwrap();

    // order = (4096 - 25) / (4 + 8) - 1, with one spare slot reserved.
    assert_eq!(ih.hdr.btree_order, 338);
    assert_eq!(ih.hdr.key_offset, 25);
    assert_eq!(ih.hdr.rid_offset, 25 + 339 * 4);
    ih.close(&mut pf).unwrap();

    // The 40-byte header image round-trips through its on-disk form.
    let mut raw = [0u8; 40];
    let fid = pf.open_file(&path).unwrap();
    pf.read_page(fid, FILE_HDR_PAGE, &mut raw).unwrap();
    assert_eq!(&raw[..4], &(NO_PAGE).to_le_bytes());
    assert_eq!(&raw[4..8], &INIT_NUM_PAGES.to_le_bytes());
    assert_eq!(&raw[8..12], &INIT_ROOT_PAGE.to_le_bytes());
    pf.close_file(fid).unwrap();
}

#[test]
fn rejects_oversized_columns() {
    let (_dir, path) = scratch();
    let mut pf = PagedFiles::new();
    assert!(matches!(
        IndexHandle::create(&mut pf, &path, ColType::Str, MAX_COL_LEN + 1),
        Err(DbError::InvalidColLength(_))
    ));
}

#[test]
fn order_four_stress_sequence() {
    let (_dir, path) = scratch();
    let mut pf = PagedFiles::new();
    let mut ih = int_index(&mut pf, &path, 4);

    let mut mock = Vec::new();
    for &k in &[5, 3, 8, 1, 9, 2, 7, 4, 6] {
        let rid = Rid::new(k, k);
        ih.insert_entry(&mut pf, &key(k), rid).unwrap();
        mock_insert(&mut mock, k, rid);
        check_equal(&ih, &mut pf, &mock);
    }
    assert_eq!(
        entries(&ih, &mut pf).iter().map(|e| e.0).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5, 6, 7, 8, 9]
    );

    // lower_bound(5) points at 5, upper_bound(5) at 6.
    let iid = ih.lower_bound(&mut pf, &key(5)).unwrap();
    assert_eq!(ih.get_rid(&mut pf, iid).unwrap(), Rid::new(5, 5));
    let iid = ih.upper_bound(&mut pf, &key(5)).unwrap();
    assert_eq!(ih.get_rid(&mut pf, iid).unwrap(), Rid::new(6, 6));

    for &k in &[1, 9, 5] {
        ih.delete_entry(&mut pf, &key(k), Rid::new(k, k)).unwrap();
        mock.retain(|&(mk, _)| mk != k);
        check_equal(&ih, &mut pf, &mock);
    }
    assert_eq!(
        entries(&ih, &mut pf).iter().map(|e| e.0).collect::<Vec<_>>(),
        vec![2, 3, 4, 6, 7, 8]
    );

    ih.close(&mut pf).unwrap();
}

#[test]
fn duplicate_keys_resolve_by_rid() {
    let (_dir, path) = scratch();
    let mut pf = PagedFiles::new();
    let mut ih = int_index(&mut pf, &path, 4);

    let a = Rid::new(1, 0);
    let b = Rid::new(1, 1);
    let c = Rid::new(1, 2);
    for rid in [a, b, c] {
        ih.insert_entry(&mut pf, &key(2), rid).unwrap();
    }

    let iid = ih.lower_bound(&mut pf, &key(2)).unwrap();
    assert_eq!(ih.get_rid(&mut pf, iid).unwrap(), a);
    let iid = ih.upper_bound(&mut pf, &key(2)).unwrap();
    assert_eq!(iid, ih.leaf_end(&mut pf).unwrap());

    ih.delete_entry(&mut pf, &key(2), b).unwrap();
    assert_eq!(entries(&ih, &mut pf), vec![(2, a), (2, c)]);

    // Deleting the same rid again misses.
    assert!(matches!(
        ih.delete_entry(&mut pf, &key(2), b),
        Err(DbError::IndexEntryNotFound)
    ));

    ih.close(&mut pf).unwrap();
}

#[test]
fn ascending_inserts_propagate_the_max_key() {
    let (_dir, path) = scratch();
    let mut pf = PagedFiles::new();
    let mut ih = int_index(&mut pf, &path, 4);

    let mut mock = Vec::new();
    for k in 1..=40 {
        let rid = Rid::new(k, 0);
        ih.insert_entry(&mut pf, &key(k), rid).unwrap();
        mock_insert(&mut mock, k, rid);
    }
    check_equal(&ih, &mut pf, &mock);
    // first_leaf never moves off the initial root page.
    assert_eq!(ih.hdr.first_leaf, INIT_ROOT_PAGE);

    ih.close(&mut pf).unwrap();
}

#[test]
fn cross_reopen_durability() {
    let (_dir, path) = scratch();
    let mut pf = PagedFiles::new();
    let mut ih = int_index(&mut pf, &path, 6);

    let mut mock = Vec::new();
    for k in 0..50 {
        let rid = Rid::new(k % 7, k);
        ih.insert_entry(&mut pf, &key(k % 10), rid).unwrap();
        mock_insert(&mut mock, k % 10, rid);
    }
    let before = entries(&ih, &mut pf);

    let ih = reopen(ih, &mut pf, &path);
    assert_eq!(entries(&ih, &mut pf), before);
    check_equal(&ih, &mut pf, &mock);
    ih.close(&mut pf).unwrap();
}

#[test]
fn randomized_churn_matches_mirror() {
    let (_dir, path) = scratch();
    let mut pf = PagedFiles::new();
    let mut ih = int_index(&mut pf, &path, 4);
    let mut rng = StdRng::seed_from_u64(0x5eed);

    let rounds = 400;
    let mut mock: Vec<(i32, Rid)> = Vec::new();
    for round in 0..rounds {
        let insert_prob = 1.0 - mock.len() as f64 / (0.5 * rounds as f64);
        if mock.is_empty() || rng.gen_bool(insert_prob.clamp(0.05, 1.0)) {
            let k = rng.gen_range(0..rounds as i32);
            let rid = Rid::new(rng.gen_range(0..1_000), rng.gen_range(0..1_000));
            ih.insert_entry(&mut pf, &key(k), rid).unwrap();
            mock_insert(&mut mock, k, rid);
        } else {
            let victim = rng.gen_range(0..mock.len());
            let (k, rid) = mock.remove(victim);
            ih.delete_entry(&mut pf, &key(k), rid).unwrap();
        }
        if round % 50 == 0 {
            check_equal(&ih, &mut pf, &mock);
            ih = reopen(ih, &mut pf, &path);
        }
    }
    check_equal(&ih, &mut pf, &mock);

    // Drain to empty.
    while let Some((k, rid)) = mock.pop() {
        ih.delete_entry(&mut pf, &key(k), rid).unwrap();
    }
    check_equal(&ih, &mut pf, &mock);
    ih.close(&mut pf).unwrap();
}

#[test]
fn freed_pages_are_recycled() {
    let (_dir, path) = scratch();
    let mut pf = PagedFiles::new();
    let mut ih = int_index(&mut pf, &path, 4);

    for k in 0..60 {
        ih.insert_entry(&mut pf, &key(k), Rid::new(k, 0)).unwrap();
    }
    let peak = ih.hdr.num_pages;
    for k in 0..60 {
        ih.delete_entry(&mut pf, &key(k), Rid::new(k, 0)).unwrap();
    }
    assert_eq!(ih.hdr.num_pages, peak);
    assert_ne!(ih.hdr.first_free_page, NO_PAGE);

    // Refilling reuses the free chain instead of growing the file.
    for k in 0..60 {
        ih.insert_entry(&mut pf, &key(k), Rid::new(k, 0)).unwrap();
    }
    assert_eq!(ih.hdr.num_pages, peak);

    ih.close(&mut pf).unwrap();
}

#[test]
fn string_keys_compare_bytewise() {
    let (_dir, path) = scratch();
    let mut pf = PagedFiles::new();
    IndexHandle::create(&mut pf, &path, ColType::Str, 8).unwrap();
    let mut ih = IndexHandle::open(&mut pf, &path).unwrap();

    let pad = |s: &str| {
        let mut k = [0u8; 8];
        k[..s.len()].copy_from_slice(s.as_bytes());
        k
    };
    for (i, name) in ["delta", "alpha", "echo", "bravo", "charlie"].iter().enumerate() {
        ih.insert_entry(&mut pf, &pad(name), Rid::new(1, i as i32))
            .unwrap();
    }

    let iid = ih.lower_bound(&mut pf, &pad("bravo")).unwrap();
    assert_eq!(ih.get_rid(&mut pf, iid).unwrap(), Rid::new(1, 3));
    let iid = ih.upper_bound(&mut pf, &pad("bravo")).unwrap();
    assert_eq!(ih.get_rid(&mut pf, iid).unwrap(), Rid::new(1, 4));

    ih.close(&mut pf).unwrap();
}

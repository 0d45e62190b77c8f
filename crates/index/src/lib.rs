//! Index manager: an on-disk B+ tree of (key, rid) entries.
//!
//! The tree is the max-key variant: an inner node stores, for child *i*, the
//! maximum key of the subtree rooted at that child, and `num_key == num_child`
//! on every node. Leaves form a doubly-linked ring closed through a sentinel
//! page, so erasing at either end needs no branching. Each node persists its
//! parent's page number; splits, merges, and root changes rewrite those
//! back-pointers through [`IndexHandle::maintain_child`], and rightmost-key
//! changes bubble up through [`IndexHandle::maintain_parent`].
//!
//! File layout: page 0 is the [`IndexFileHeader`], page 1 the leaf-ring
//! sentinel, page 2 the initial root (a leaf). Pages freed by merges go onto
//! a free chain threaded through the node headers and are reused before the
//! file grows.

mod node;

#[cfg(test)]
mod tests;

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_into_slice};
use common::{DbError, DbResult, FileId, Iid, Rid, NO_PAGE, PAGE_SIZE};
use node::{Node, NodeHdr, NodeLayout, NODE_HDR_BYTES};
use pagefile::PagedFiles;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use types::{ColType, KeyComparator};

pub const FILE_HDR_PAGE: i32 = 0;
/// Anchors both ends of the leaf ring; only its prev/next fields ever change.
pub const LEAF_SENTINEL_PAGE: i32 = 1;
pub const INIT_ROOT_PAGE: i32 = 2;
pub const INIT_NUM_PAGES: i32 = 3;
pub const MAX_COL_LEN: i32 = 512;

const FILE_HDR_BYTES: usize = 40;
const RID_BYTES: i32 = 8;

fn bincode_config() -> impl Config {
    config::legacy()
}

/// File name of the `index_no`-th index of `table`.
pub fn index_file_name(table: &str, index_no: usize) -> String {
    format!("{table}.{index_no}.idx")
}

/// Persisted at file offset 0.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexFileHeader {
    pub first_free_page: i32,
    pub num_pages: i32,
    pub root_page: i32,
    pub col_type: ColType,
    pub col_len: i32,
    pub btree_order: i32,
    pub key_offset: i32,
    pub rid_offset: i32,
    pub first_leaf: i32,
    pub last_leaf: i32,
}

impl IndexFileHeader {
    fn encode(&self) -> [u8; FILE_HDR_BYTES] {
        let mut buf = [0u8; FILE_HDR_BYTES];
        let written =
            encode_into_slice(self, &mut buf, bincode_config()).expect("index file header fits");
        debug_assert_eq!(written, FILE_HDR_BYTES);
        buf
    }

    fn decode(buf: &[u8]) -> DbResult<Self> {
        let (hdr, read) = decode_from_slice(buf, bincode_config())
            .map_err(|e| DbError::Internal(format!("bad index file header: {e}")))?;
        debug_assert_eq!(read, FILE_HDR_BYTES);
        Ok(hdr)
    }
}

/// Handle for an open index file. The in-memory header is authoritative while
/// the handle is open and is written back on [`IndexHandle::close`].
#[derive(Debug)]
pub struct IndexHandle {
    fid: FileId,
    pub hdr: IndexFileHeader,
    cmp: KeyComparator,
}

impl IndexHandle {
    /// Create an index file at `path` for keys of `col_type`/`col_len`.
    ///
    /// The order is the largest n with
    /// `node_header + (n + 1) * (col_len + sizeof(Rid)) <= PAGE_SIZE`; the
    /// spare slot lets inserts overflow a node before it splits.
    pub fn create(pf: &mut PagedFiles, path: &Path, col_type: ColType, col_len: i32) -> DbResult<()> {
        if col_len < 1 || col_len > MAX_COL_LEN {
            return Err(DbError::InvalidColLength(col_len));
        }
        let btree_order =
            (PAGE_SIZE as i32 - NODE_HDR_BYTES as i32) / (col_len + RID_BYTES) - 1;
        assert!(btree_order > 2);
        let key_offset = NODE_HDR_BYTES as i32;
        let rid_offset = key_offset + (btree_order + 1) * col_len;

        pf.create_file(path)?;
        let fid = pf.open_file(path)?;
        let hdr = IndexFileHeader {
            first_free_page: NO_PAGE,
            num_pages: INIT_NUM_PAGES,
            root_page: INIT_ROOT_PAGE,
            col_type,
            col_len,
            btree_order,
            key_offset,
            rid_offset,
            first_leaf: INIT_ROOT_PAGE,
            last_leaf: INIT_ROOT_PAGE,
        };
        pf.write_page(fid, FILE_HDR_PAGE, &hdr.encode())?;

        // Sentinel and initial root leaf point at each other, closing the
        // ring. Both are written as whole pages so later fetches see them.
        let mut page_buf = vec![0u8; PAGE_SIZE];
        NodeHdr {
            next_free_page: NO_PAGE,
            parent_page: NO_PAGE,
            num_key: 0,
            num_child: 0,
            is_leaf: true,
            prev_leaf: INIT_ROOT_PAGE,
            next_leaf: INIT_ROOT_PAGE,
        }
        .write(&mut page_buf);
        pf.write_page(fid, LEAF_SENTINEL_PAGE, &page_buf)?;

        NodeHdr {
            next_free_page: NO_PAGE,
            parent_page: NO_PAGE,
            num_key: 0,
            num_child: 0,
            is_leaf: true,
            prev_leaf: LEAF_SENTINEL_PAGE,
            next_leaf: LEAF_SENTINEL_PAGE,
        }
        .write(&mut page_buf);
        pf.write_page(fid, INIT_ROOT_PAGE, &page_buf)?;

        pf.close_file(fid)?;
        debug!(path = %path.display(), ?col_type, col_len, btree_order, "created index");
        Ok(())
    }

    pub fn open(pf: &mut PagedFiles, path: &Path) -> DbResult<Self> {
        let fid = pf.open_file(path)?;
        let mut buf = [0u8; FILE_HDR_BYTES];
        pf.read_page(fid, FILE_HDR_PAGE, &mut buf)?;
        let hdr = IndexFileHeader::decode(&buf)?;
        let cmp = KeyComparator::new(hdr.col_type, hdr.col_len as usize);
        Ok(Self { fid, hdr, cmp })
    }

    /// Write the in-memory header back, then flush and release the file.
    pub fn close(self, pf: &mut PagedFiles) -> DbResult<()> {
        pf.write_page(self.fid, FILE_HDR_PAGE, &self.hdr.encode())?;
        pf.close_file(self.fid)
    }

    pub fn destroy(pf: &PagedFiles, path: &Path) -> DbResult<()> {
        pf.destroy_file(path)
    }

    pub fn comparator(&self) -> KeyComparator {
        self.cmp
    }

    /// First leaf slot, i.e. the position of the smallest key.
    pub fn leaf_begin(&self) -> Iid {
        Iid::new(self.hdr.first_leaf, 0)
    }

    /// One past the last leaf slot.
    pub fn leaf_end(&self, pf: &mut PagedFiles) -> DbResult<Iid> {
        let hdr = self.node_hdr(pf, self.hdr.last_leaf)?;
        Ok(Iid::new(self.hdr.last_leaf, hdr.num_key))
    }

    /// Record id stored at a leaf position.
    pub fn get_rid(&self, pf: &mut PagedFiles, iid: Iid) -> DbResult<Rid> {
        self.with_node(pf, iid.page_no, |n| {
            if iid.slot_no >= n.hdr.num_child {
                return Err(DbError::IndexEntryNotFound);
            }
            Ok(n.rid(iid.slot_no))
        })
    }

    /// First leaf position whose key is >= `key`, else `leaf_end`.
    pub fn lower_bound(&self, pf: &mut PagedFiles, key: &[u8]) -> DbResult<Iid> {
        self.descend(pf, key, Bound::Lower)
    }

    /// First leaf position whose key is > `key`, else `leaf_end`.
    pub fn upper_bound(&self, pf: &mut PagedFiles, key: &[u8]) -> DbResult<Iid> {
        self.descend(pf, key, Bound::Upper)
    }

    /// Insert one (key, rid) entry.
    pub fn insert_entry(&mut self, pf: &mut PagedFiles, key: &[u8], rid: Rid) -> DbResult<()> {
        debug_assert_eq!(key.len(), self.hdr.col_len as usize);
        // upper_bound lands on the slot that keeps the leaf sorted, at the
        // upper edge of any equal-key run; for a key beyond every stored key
        // this is the append slot of the rightmost leaf.
        let iid = self.upper_bound(pf, key)?;
        let mut page_no = iid.page_no;
        let num_key = self.with_node(pf, page_no, |n| {
            n.insert_key(iid.slot_no, key);
            n.insert_rid(iid.slot_no, rid);
            Ok(n.hdr.num_key)
        })?;
        if iid.page_no == self.hdr.last_leaf && iid.slot_no == num_key - 1 {
            // New global maximum.
            self.maintain_parent(pf, page_no)?;
        }

        while self.node_hdr(pf, page_no)?.num_child > self.hdr.btree_order {
            page_no = self.split(pf, page_no)?;
        }
        Ok(())
    }

    /// Delete the entry matching both `key` and `rid`.
    pub fn delete_entry(&mut self, pf: &mut PagedFiles, key: &[u8], rid: Rid) -> DbResult<()> {
        debug_assert_eq!(key.len(), self.hdr.col_len as usize);
        let upper = self.upper_bound(pf, key)?;
        let mut iid = self.lower_bound(pf, key)?;
        while iid != upper {
            let hdr = self.node_hdr(pf, iid.page_no)?;
            debug_assert!(hdr.is_leaf);
            let found = self.with_node(pf, iid.page_no, |n| Ok(n.rid(iid.slot_no) == rid))?;
            if !found {
                iid.slot_no += 1;
                if iid.page_no != self.hdr.last_leaf && iid.slot_no == hdr.num_key {
                    iid = Iid::new(hdr.next_leaf, 0);
                }
                continue;
            }
            self.with_node(pf, iid.page_no, |n| {
                n.erase_key(iid.slot_no);
                n.erase_rid(iid.slot_no);
                Ok(())
            })?;
            self.maintain_parent(pf, iid.page_no)?;
            self.rebalance(pf, iid.page_no)?;
            return Ok(());
        }
        Err(DbError::IndexEntryNotFound)
    }

    fn descend(&self, pf: &mut PagedFiles, key: &[u8], bound: Bound) -> DbResult<Iid> {
        let cmp = self.cmp;
        let mut page_no = self.hdr.root_page;
        loop {
            let step = self.with_node(pf, page_no, |n| {
                let idx = match bound {
                    Bound::Lower => n.lower_bound(key, cmp),
                    Bound::Upper => n.upper_bound(key, cmp),
                };
                if n.hdr.is_leaf {
                    Ok(Step::Leaf(idx))
                } else if idx >= n.hdr.num_key {
                    Ok(Step::PastEnd)
                } else {
                    Ok(Step::Child(n.rid(idx).page_no))
                }
            })?;
            match step {
                Step::Leaf(slot_no) => return Ok(Iid::new(page_no, slot_no)),
                Step::PastEnd => return self.leaf_end(pf),
                Step::Child(child) => page_no = child,
            }
        }
    }

    /// Split an overfull node, returning the parent to continue from.
    fn split(&mut self, pf: &mut PagedFiles, page_no: i32) -> DbResult<i32> {
        let hdr = self.node_hdr(pf, page_no)?;
        let mut parent = hdr.parent_page;
        if parent == NO_PAGE {
            parent = self.grow_root(pf, page_no)?;
        }

        let brother = self.create_node(pf)?;
        debug!(page_no, brother, "splitting node");
        self.with_node(pf, brother, |n| {
            n.hdr = NodeHdr {
                next_free_page: NO_PAGE,
                parent_page: parent,
                num_key: 0,
                num_child: 0,
                is_leaf: hdr.is_leaf,
                prev_leaf: NO_PAGE,
                next_leaf: NO_PAGE,
            };
            n.mark();
            Ok(())
        })?;
        if hdr.is_leaf {
            // Splice the brother into the ring right after this node.
            self.with_node(pf, brother, |n| {
                n.hdr.prev_leaf = page_no;
                n.hdr.next_leaf = hdr.next_leaf;
                n.mark();
                Ok(())
            })?;
            self.with_node(pf, hdr.next_leaf, |n| {
                n.hdr.prev_leaf = brother;
                n.mark();
                Ok(())
            })?;
            self.with_node(pf, page_no, |n| {
                n.hdr.next_leaf = brother;
                n.mark();
                Ok(())
            })?;
        }

        // Keys in [0, split) stay; [split, num_child) move to the brother.
        let (keys, rids, popup) = self.with_node(pf, page_no, |n| {
            let split = n.hdr.num_child / 2;
            let keys = n.keys_range(split, n.hdr.num_key);
            let rids = n.rids_range(split, n.hdr.num_child);
            n.truncate(split);
            Ok((keys, rids, n.key(split - 1).to_vec()))
        })?;
        let moved = self.with_node(pf, brother, |n| {
            n.insert_keys(0, &keys);
            n.insert_rids(0, &rids);
            Ok(n.hdr.num_child)
        })?;
        for child_idx in 0..moved {
            self.maintain_child(pf, brother, child_idx)?;
        }

        // The last key remaining on the left pops up into the parent, and the
        // brother's child pointer lands immediately after this node's.
        self.with_node(pf, parent, |n| {
            let child_idx = n.find_child(page_no);
            n.insert_key(child_idx, &popup);
            n.insert_rid(child_idx + 1, Rid::new(brother, -1));
            Ok(())
        })?;
        if self.hdr.last_leaf == page_no {
            self.hdr.last_leaf = brother;
        }
        Ok(parent)
    }

    /// Allocate a fresh root above `page_no`, which holds the whole tree.
    fn grow_root(&mut self, pf: &mut PagedFiles, page_no: i32) -> DbResult<i32> {
        let root = self.create_node(pf)?;
        debug!(root, "growing new root");
        let last_key = self.with_node(pf, page_no, |n| Ok(n.key(n.hdr.num_key - 1).to_vec()))?;
        self.with_node(pf, root, |n| {
            n.hdr = NodeHdr {
                next_free_page: NO_PAGE,
                parent_page: NO_PAGE,
                num_key: 0,
                num_child: 0,
                is_leaf: false,
                prev_leaf: NO_PAGE,
                next_leaf: NO_PAGE,
            };
            n.insert_rid(0, Rid::new(page_no, -1));
            n.insert_key(0, &last_key);
            Ok(())
        })?;
        self.with_node(pf, page_no, |n| {
            n.hdr.parent_page = root;
            n.mark();
            Ok(())
        })?;
        self.hdr.root_page = root;
        Ok(root)
    }

    /// Restore minimum occupancy upward from `page_no` after an erase.
    fn rebalance(&mut self, pf: &mut PagedFiles, mut page_no: i32) -> DbResult<()> {
        let min_child = (self.hdr.btree_order + 1) / 2;
        loop {
            let hdr = self.node_hdr(pf, page_no)?;
            if hdr.num_child >= min_child {
                break;
            }
            if hdr.parent_page == NO_PAGE {
                // Underflow at the root is tolerated, except that an inner
                // root with a single child hands the tree to that child.
                if !hdr.is_leaf && hdr.num_key <= 1 {
                    let new_root = self.with_node(pf, page_no, |n| Ok(n.rid(0).page_no))?;
                    self.with_node(pf, new_root, |n| {
                        n.hdr.parent_page = NO_PAGE;
                        n.mark();
                        Ok(())
                    })?;
                    debug!(old = page_no, new = new_root, "collapsing root");
                    self.hdr.root_page = new_root;
                    self.release_node(pf, page_no)?;
                }
                break;
            }

            let parent = hdr.parent_page;
            let child_idx = self.with_node(pf, parent, |n| Ok(n.find_child(page_no)))?;

            if child_idx > 0 {
                let left = self.with_node(pf, parent, |n| Ok(n.rid(child_idx - 1).page_no))?;
                if self.node_hdr(pf, left)?.num_child > min_child {
                    self.borrow_from_left(pf, page_no, left)?;
                    break;
                }
            }
            let parent_children = self.node_hdr(pf, parent)?.num_child;
            if child_idx + 1 < parent_children {
                let right = self.with_node(pf, parent, |n| Ok(n.rid(child_idx + 1).page_no))?;
                if self.node_hdr(pf, right)?.num_child > min_child {
                    self.borrow_from_right(pf, page_no, right)?;
                    break;
                }
            }

            if child_idx > 0 {
                let left = self.with_node(pf, parent, |n| Ok(n.rid(child_idx - 1).page_no))?;
                self.merge_into_left(pf, page_no, left, parent, child_idx)?;
            } else {
                assert!(child_idx + 1 < parent_children);
                let right = self.with_node(pf, parent, |n| Ok(n.rid(child_idx + 1).page_no))?;
                self.merge_from_right(pf, page_no, right, parent, child_idx)?;
            }
            page_no = parent;
        }
        Ok(())
    }

    /// Take the left sibling's last entry and prepend it here.
    fn borrow_from_left(&mut self, pf: &mut PagedFiles, page_no: i32, left: i32) -> DbResult<()> {
        debug!(page_no, left, "borrowing from left sibling");
        let (key, rid) = self.with_node(pf, left, |n| {
            let key = n.key(n.hdr.num_key - 1).to_vec();
            let rid = n.rid(n.hdr.num_child - 1);
            n.erase_key(n.hdr.num_key - 1);
            n.erase_rid(n.hdr.num_child - 1);
            Ok((key, rid))
        })?;
        self.with_node(pf, page_no, |n| {
            n.insert_key(0, &key);
            n.insert_rid(0, rid);
            Ok(())
        })?;
        // The left sibling's max shrank; this node gained a first child.
        self.maintain_parent(pf, left)?;
        self.maintain_child(pf, page_no, 0)
    }

    /// Take the right sibling's first entry and append it here.
    fn borrow_from_right(&mut self, pf: &mut PagedFiles, page_no: i32, right: i32) -> DbResult<()> {
        debug!(page_no, right, "borrowing from right sibling");
        let (key, rid) = self.with_node(pf, right, |n| {
            let key = n.key(0).to_vec();
            let rid = n.rid(0);
            n.erase_key(0);
            n.erase_rid(0);
            Ok((key, rid))
        })?;
        let num_child = self.with_node(pf, page_no, |n| {
            n.insert_key(n.hdr.num_key, &key);
            n.insert_rid(n.hdr.num_child, rid);
            Ok(n.hdr.num_child)
        })?;
        // This node's max grew; it also gained a last child.
        self.maintain_parent(pf, page_no)?;
        self.maintain_child(pf, page_no, num_child - 1)
    }

    /// Move everything from `page_no` into its left sibling and free it.
    fn merge_into_left(
        &mut self,
        pf: &mut PagedFiles,
        page_no: i32,
        left: i32,
        parent: i32,
        child_idx: i32,
    ) -> DbResult<()> {
        debug!(page_no, left, "merging into left sibling");
        let (keys, rids, is_leaf) = self.with_node(pf, page_no, |n| {
            Ok((
                n.keys_range(0, n.hdr.num_key),
                n.rids_range(0, n.hdr.num_child),
                n.hdr.is_leaf,
            ))
        })?;
        let (first_moved, num_child) = self.with_node(pf, left, |n| {
            let first_moved = n.hdr.num_child;
            n.insert_keys(n.hdr.num_key, &keys);
            n.insert_rids(n.hdr.num_child, &rids);
            Ok((first_moved, n.hdr.num_child))
        })?;
        for child_idx in first_moved..num_child {
            self.maintain_child(pf, left, child_idx)?;
        }
        self.with_node(pf, parent, |n| {
            n.erase_key(child_idx);
            n.erase_rid(child_idx);
            Ok(())
        })?;
        self.maintain_parent(pf, left)?;
        if is_leaf {
            self.erase_leaf(pf, page_no)?;
        }
        if self.hdr.last_leaf == page_no {
            self.hdr.last_leaf = left;
        }
        self.release_node(pf, page_no)
    }

    /// Absorb the right sibling into `page_no` and free the sibling.
    fn merge_from_right(
        &mut self,
        pf: &mut PagedFiles,
        page_no: i32,
        right: i32,
        parent: i32,
        child_idx: i32,
    ) -> DbResult<()> {
        debug!(page_no, right, "absorbing right sibling");
        let (keys, rids, is_leaf) = self.with_node(pf, right, |n| {
            Ok((
                n.keys_range(0, n.hdr.num_key),
                n.rids_range(0, n.hdr.num_child),
                n.hdr.is_leaf,
            ))
        })?;
        let (first_moved, num_child) = self.with_node(pf, page_no, |n| {
            let first_moved = n.hdr.num_child;
            n.insert_keys(n.hdr.num_key, &keys);
            n.insert_rids(n.hdr.num_child, &rids);
            Ok((first_moved, n.hdr.num_child))
        })?;
        for idx in first_moved..num_child {
            self.maintain_child(pf, page_no, idx)?;
        }
        // Dropping key[child_idx] shifts the absorbed sibling's max down onto
        // this node's slot, so the parent key stays correct.
        self.with_node(pf, parent, |n| {
            n.erase_rid(child_idx + 1);
            n.erase_key(child_idx);
            Ok(())
        })?;
        self.maintain_parent(pf, page_no)?;
        if is_leaf {
            self.erase_leaf(pf, right)?;
        }
        if self.hdr.last_leaf == right {
            self.hdr.last_leaf = page_no;
        }
        self.release_node(pf, right)
    }

    /// Walk ancestors, refreshing each stored max key until one already
    /// matches.
    fn maintain_parent(&self, pf: &mut PagedFiles, mut page_no: i32) -> DbResult<()> {
        loop {
            let hdr = self.node_hdr(pf, page_no)?;
            if hdr.parent_page == NO_PAGE {
                break;
            }
            debug_assert!(hdr.num_key > 0);
            let last_key =
                self.with_node(pf, page_no, |n| Ok(n.key(n.hdr.num_key - 1).to_vec()))?;
            let changed = self.with_node(pf, hdr.parent_page, |n| {
                let rank = n.find_child(page_no);
                if n.key(rank) == last_key.as_slice() {
                    Ok(false)
                } else {
                    n.replace_key(rank, &last_key);
                    Ok(true)
                }
            })?;
            if !changed {
                break;
            }
            page_no = hdr.parent_page;
        }
        Ok(())
    }

    /// Point the `child_idx`-th child of an inner node back at it.
    fn maintain_child(&self, pf: &mut PagedFiles, page_no: i32, child_idx: i32) -> DbResult<()> {
        let hdr = self.node_hdr(pf, page_no)?;
        if hdr.is_leaf {
            return Ok(());
        }
        let child = self.with_node(pf, page_no, |n| Ok(n.rid(child_idx).page_no))?;
        self.with_node(pf, child, |n| {
            n.hdr.parent_page = page_no;
            n.mark();
            Ok(())
        })
    }

    /// Unlink a leaf from the ring.
    fn erase_leaf(&self, pf: &mut PagedFiles, page_no: i32) -> DbResult<()> {
        let hdr = self.node_hdr(pf, page_no)?;
        debug_assert!(hdr.is_leaf);
        self.with_node(pf, hdr.prev_leaf, |n| {
            n.hdr.next_leaf = hdr.next_leaf;
            n.mark();
            Ok(())
        })?;
        self.with_node(pf, hdr.next_leaf, |n| {
            n.hdr.prev_leaf = hdr.prev_leaf;
            n.mark();
            Ok(())
        })
    }

    /// Pop a page off the free chain, or grow the file.
    fn create_node(&mut self, pf: &mut PagedFiles) -> DbResult<i32> {
        if self.hdr.first_free_page == NO_PAGE {
            let page_no = self.hdr.num_pages;
            pf.create_page(self.fid, page_no)?;
            self.hdr.num_pages += 1;
            return Ok(page_no);
        }
        let page_no = self.hdr.first_free_page;
        self.hdr.first_free_page = self.node_hdr(pf, page_no)?.next_free_page;
        Ok(page_no)
    }

    /// Push a freed page onto the free chain.
    fn release_node(&mut self, pf: &mut PagedFiles, page_no: i32) -> DbResult<()> {
        self.with_node(pf, page_no, |n| {
            n.hdr.next_free_page = self.hdr.first_free_page;
            n.mark();
            Ok(())
        })?;
        self.hdr.first_free_page = page_no;
        Ok(())
    }

    fn node_hdr(&self, pf: &mut PagedFiles, page_no: i32) -> DbResult<NodeHdr> {
        debug_assert!(page_no > FILE_HDR_PAGE && page_no < self.hdr.num_pages);
        let frame = pf.fetch_page(self.fid, page_no)?;
        NodeHdr::read(frame.data())
    }

    /// Run `f` over a node view pinned for the duration of this call; the
    /// frame is dirtied iff the view mutated anything.
    fn with_node<R>(
        &self,
        pf: &mut PagedFiles,
        page_no: i32,
        f: impl FnOnce(&mut Node<'_>) -> DbResult<R>,
    ) -> DbResult<R> {
        debug_assert!(page_no > FILE_HDR_PAGE && page_no < self.hdr.num_pages);
        let layout = NodeLayout::from(&self.hdr);
        let frame = pf.fetch_page(self.fid, page_no)?;
        let mut node = Node::read(frame.data_mut(), layout)?;
        let out = f(&mut node);
        if node.finish() {
            frame.mark_dirty();
        }
        out
    }
}

enum Bound {
    Lower,
    Upper,
}

enum Step {
    Leaf(i32),
    PastEnd,
    Child(i32),
}

/// Half-open forward iterator over leaf entries in `[lower, upper)`.
#[derive(Debug)]
pub struct IxScan {
    fid: FileId,
    hdr: IndexFileHeader,
    iid: Iid,
    end: Iid,
}

impl IxScan {
    pub fn new(ih: &IndexHandle, lower: Iid, upper: Iid) -> Self {
        Self {
            fid: ih.fid,
            hdr: ih.hdr,
            iid: lower,
            end: upper,
        }
    }

    pub fn next(&mut self, pf: &mut PagedFiles) -> DbResult<()> {
        debug_assert!(!self.is_end());
        let frame = pf.fetch_page(self.fid, self.iid.page_no)?;
        let hdr = NodeHdr::read(frame.data())?;
        debug_assert!(hdr.is_leaf);
        debug_assert!(self.iid.slot_no < hdr.num_key);
        self.iid.slot_no += 1;
        if self.iid.page_no != self.hdr.last_leaf && self.iid.slot_no == hdr.num_key {
            self.iid = Iid::new(hdr.next_leaf, 0);
        }
        Ok(())
    }

    pub fn is_end(&self) -> bool {
        self.iid == self.end
    }

    pub fn iid(&self) -> Iid {
        self.iid
    }

    pub fn rid(&self, pf: &mut PagedFiles) -> DbResult<Rid> {
        let frame = pf.fetch_page(self.fid, self.iid.page_no)?;
        let data = frame.data();
        let hdr = NodeHdr::read(data)?;
        if self.iid.slot_no >= hdr.num_child {
            return Err(DbError::IndexEntryNotFound);
        }
        let at = self.hdr.rid_offset as usize + self.iid.slot_no as usize * 8;
        Ok(Rid::new(
            i32::from_le_bytes(data[at..at + 4].try_into().unwrap()),
            i32::from_le_bytes(data[at + 4..at + 8].try_into().unwrap()),
        ))
    }
}

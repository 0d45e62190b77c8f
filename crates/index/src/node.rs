//! Short-lived view over one B+ tree node page.
//!
//! A [`Node`] borrows a pinned frame's buffer for the duration of a single
//! pager call. The header is decoded once on construction, mutated in memory,
//! and written back by [`Node::finish`]; key and rid slots are edited in
//! place. Each page holds `order + 1` key and rid slots, one more than the
//! maximum child count, so inserts can overflow before a split.

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_into_slice};
use common::{DbError, DbResult, Rid};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use types::KeyComparator;

use crate::IndexFileHeader;

pub(crate) const NODE_HDR_BYTES: usize = 25;
const RID_BYTES: usize = 8;

fn bincode_config() -> impl Config {
    config::legacy()
}

/// Per-page header of a B+ tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct NodeHdr {
    pub next_free_page: i32,
    pub parent_page: i32,
    pub num_key: i32,
    pub num_child: i32,
    pub is_leaf: bool,
    pub prev_leaf: i32,
    pub next_leaf: i32,
}

impl NodeHdr {
    pub fn read(data: &[u8]) -> DbResult<Self> {
        let (hdr, read) = decode_from_slice(&data[..NODE_HDR_BYTES], bincode_config())
            .map_err(|e| DbError::Internal(format!("bad index node header: {e}")))?;
        debug_assert_eq!(read, NODE_HDR_BYTES);
        Ok(hdr)
    }

    pub fn write(&self, data: &mut [u8]) {
        let written = encode_into_slice(self, &mut data[..NODE_HDR_BYTES], bincode_config())
            .expect("index node header fits");
        debug_assert_eq!(written, NODE_HDR_BYTES);
    }
}

/// Array geometry of a node page, derived from the index file header.
#[derive(Clone, Copy, Debug)]
pub(crate) struct NodeLayout {
    pub col_len: usize,
    pub order: i32,
    pub key_offset: usize,
    pub rid_offset: usize,
}

impl From<&IndexFileHeader> for NodeLayout {
    fn from(hdr: &IndexFileHeader) -> Self {
        Self {
            col_len: hdr.col_len as usize,
            order: hdr.btree_order,
            key_offset: hdr.key_offset as usize,
            rid_offset: hdr.rid_offset as usize,
        }
    }
}

pub(crate) struct Node<'a> {
    data: &'a mut [u8],
    pub hdr: NodeHdr,
    layout: NodeLayout,
    dirty: bool,
}

impl<'a> Node<'a> {
    pub fn read(data: &'a mut [u8], layout: NodeLayout) -> DbResult<Self> {
        let hdr = NodeHdr::read(data)?;
        Ok(Self {
            data,
            hdr,
            layout,
            dirty: false,
        })
    }

    /// Flag the node dirty for header-only mutations.
    pub fn mark(&mut self) {
        self.dirty = true;
    }

    /// Write the header back if anything changed; returns whether the caller
    /// must dirty the frame.
    pub fn finish(self) -> bool {
        if self.dirty {
            self.hdr.write(self.data);
        }
        self.dirty
    }

    fn key_pos(&self, idx: i32) -> usize {
        self.layout.key_offset + idx as usize * self.layout.col_len
    }

    fn rid_pos(&self, idx: i32) -> usize {
        self.layout.rid_offset + idx as usize * RID_BYTES
    }

    pub fn key(&self, idx: i32) -> &[u8] {
        debug_assert!(idx >= 0 && idx < self.hdr.num_key);
        &self.data[self.key_pos(idx)..self.key_pos(idx) + self.layout.col_len]
    }

    pub fn rid(&self, idx: i32) -> Rid {
        debug_assert!(idx >= 0 && idx < self.hdr.num_child);
        let at = self.rid_pos(idx);
        Rid::new(
            i32::from_le_bytes(self.data[at..at + 4].try_into().unwrap()),
            i32::from_le_bytes(self.data[at + 4..at + 8].try_into().unwrap()),
        )
    }

    fn store_rid(&mut self, idx: i32, rid: Rid) {
        let at = self.rid_pos(idx);
        self.data[at..at + 4].copy_from_slice(&rid.page_no.to_le_bytes());
        self.data[at + 4..at + 8].copy_from_slice(&rid.slot_no.to_le_bytes());
    }

    /// Copy of the keys in `[from, to)`, flattened.
    pub fn keys_range(&self, from: i32, to: i32) -> Vec<u8> {
        self.data[self.key_pos(from)..self.key_pos(to)].to_vec()
    }

    pub fn rids_range(&self, from: i32, to: i32) -> Vec<Rid> {
        (from..to).map(|i| self.rid(i)).collect()
    }

    /// Insert `keys.len() / col_len` keys at `pos`, shifting the tail right.
    pub fn insert_keys(&mut self, pos: i32, keys: &[u8]) {
        let n = (keys.len() / self.layout.col_len) as i32;
        debug_assert_eq!(keys.len() % self.layout.col_len, 0);
        debug_assert!(self.hdr.num_key + n <= self.layout.order + 1);
        let src = self.key_pos(pos);
        let end = self.key_pos(self.hdr.num_key);
        self.data
            .copy_within(src..end, src + n as usize * self.layout.col_len);
        self.data[src..src + keys.len()].copy_from_slice(keys);
        self.hdr.num_key += n;
        self.dirty = true;
    }

    pub fn insert_key(&mut self, pos: i32, key: &[u8]) {
        self.insert_keys(pos, key);
    }

    pub fn erase_key(&mut self, pos: i32) {
        let at = self.key_pos(pos);
        let end = self.key_pos(self.hdr.num_key);
        self.data.copy_within(at + self.layout.col_len..end, at);
        self.hdr.num_key -= 1;
        self.dirty = true;
    }

    /// Overwrite the key at `pos` in place.
    pub fn replace_key(&mut self, pos: i32, key: &[u8]) {
        debug_assert!(pos >= 0 && pos < self.hdr.num_key);
        let at = self.key_pos(pos);
        self.data[at..at + self.layout.col_len].copy_from_slice(key);
        self.dirty = true;
    }

    pub fn insert_rids(&mut self, pos: i32, rids: &[Rid]) {
        let n = rids.len() as i32;
        debug_assert!(self.hdr.num_child + n <= self.layout.order + 1);
        let src = self.rid_pos(pos);
        let end = self.rid_pos(self.hdr.num_child);
        self.data.copy_within(src..end, src + rids.len() * RID_BYTES);
        self.hdr.num_child += n;
        for (i, rid) in rids.iter().enumerate() {
            self.store_rid(pos + i as i32, *rid);
        }
        self.dirty = true;
    }

    pub fn insert_rid(&mut self, pos: i32, rid: Rid) {
        self.insert_rids(pos, &[rid]);
    }

    pub fn erase_rid(&mut self, pos: i32) {
        let at = self.rid_pos(pos);
        let end = self.rid_pos(self.hdr.num_child);
        self.data.copy_within(at + RID_BYTES..end, at);
        self.hdr.num_child -= 1;
        self.dirty = true;
    }

    /// Keep the first `n` entries, dropping the rest (used by splits).
    pub fn truncate(&mut self, n: i32) {
        self.hdr.num_key = n;
        self.hdr.num_child = n;
        self.dirty = true;
    }

    /// Smallest key index whose key is >= `target`, else `num_key`.
    pub fn lower_bound(&self, target: &[u8], cmp: KeyComparator) -> i32 {
        let mut idx = 0;
        while idx < self.hdr.num_key {
            if cmp.compare(target, self.key(idx)) != Ordering::Greater {
                break;
            }
            idx += 1;
        }
        idx
    }

    /// Smallest key index whose key is > `target`, else `num_key`.
    pub fn upper_bound(&self, target: &[u8], cmp: KeyComparator) -> i32 {
        let mut idx = 0;
        while idx < self.hdr.num_key {
            if cmp.compare(target, self.key(idx)) == Ordering::Less {
                break;
            }
            idx += 1;
        }
        idx
    }

    /// Rank of the child whose rid points at `page_no`.
    pub fn find_child(&self, page_no: i32) -> i32 {
        let mut rank = 0;
        while rank < self.hdr.num_child {
            if self.rid(rank).page_no == page_no {
                return rank;
            }
            rank += 1;
        }
        unreachable!("page {page_no} is not a child of this node");
    }
}

//! The B+Tree node page layout (spec.md §4.4): a generic page header, a
//! node-type flag, an entry count, and (leaves only) sibling links, then
//! a region of fixed-width entries — built on frames fetched through
//! [`buffer::BufferPool`], the same "page is a tagged byte buffer"
//! discipline [`heap::page::HeapPageView`] uses for table-heap pages
//! (spec.md §9: "dispatch is by type code in the page header, resolved
//! at the call site").
//!
//! Keys are fixed-width per index: a 4-byte null bitmap followed by each
//! key column's bytes at its declared length, with a zero placeholder
//! written for a null field rather than omitted (unlike [`types::Row`]'s
//! variable-length row encoding) so every entry in a node occupies the
//! same number of bytes and slots can be addressed by index alone —
//! the same reasoning the heap's slot directory uses fixed `(offset,
//! length)` pairs, just pushed one step further since a B+Tree node has
//! no slot directory at all, only a flat fixed-stride array.

use common::codec::{Decoder, Encoder};
use common::{DbResult, PageId, RowId};
use storage::{read_page_id, write_header, HEADER_LEN};
use types::{SqlType, Value};

const NONE_PAGE: u32 = u32::MAX;

pub const NODE_TYPE_LEAF: u8 = 0;
pub const NODE_TYPE_INTERNAL: u8 = 1;

/// Bytes of B+Tree-specific header after the generic 8-byte page header:
/// node type (1), entry count (2), prev-leaf (4), next-leaf (4).
/// Internal nodes leave prev/next at the `NONE_PAGE` sentinel — they are
/// meaningless there, but keeping the header uniform means dispatch
/// needs only the type byte, not a second layout per node kind.
pub const INDEX_HEADER_LEN: usize = HEADER_LEN + 1 + 2 + 4 + 4;

const OFF_TYPE: usize = HEADER_LEN;
const OFF_COUNT: usize = HEADER_LEN + 1;
const OFF_PREV: usize = HEADER_LEN + 3;
const OFF_NEXT: usize = HEADER_LEN + 7;

/// Byte width of one encoded key for an index over `key_types`: a 4-byte
/// null bitmap plus each column's declared length.
pub fn key_len(key_types: &[SqlType]) -> usize {
    4 + key_types.iter().map(|t| t.encoded_len()).sum::<usize>()
}

/// Encode `key` at its fixed width. `key.len()` must equal `key_types.len()`.
pub fn encode_key(key: &[Value], key_types: &[SqlType], enc: &mut Encoder) {
    let mut bitmap: u32 = 0;
    for (i, v) in key.iter().enumerate() {
        if v.is_null() {
            bitmap |= 1 << i;
        }
    }
    enc.put_u32(bitmap);
    for (v, ty) in key.iter().zip(key_types) {
        if v.is_null() {
            enc.put_raw(&vec![0u8; ty.encoded_len()]);
        } else {
            v.encode(enc);
        }
    }
}

/// Decode a fixed-width key previously written by [`encode_key`].
pub fn decode_key(dec: &mut Decoder<'_>, key_types: &[SqlType]) -> DbResult<Vec<Value>> {
    let bitmap = dec.get_u32()?;
    let mut values = Vec::with_capacity(key_types.len());
    for (i, ty) in key_types.iter().enumerate() {
        if bitmap & (1 << i) != 0 {
            dec.get_raw(ty.encoded_len())?;
            values.push(Value::Null);
        } else {
            values.push(Value::decode(dec, ty)?);
        }
    }
    Ok(values)
}

/// A read/write view over one B+Tree node page's bytes.
pub struct IndexPageView<'a> {
    buf: &'a mut [u8],
}

impl<'a> IndexPageView<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf }
    }

    fn init(buf: &mut [u8], page_id: PageId, node_type: u8) {
        buf.fill(0);
        write_header(buf, page_id);
        buf[OFF_TYPE] = node_type;
        buf[OFF_COUNT..OFF_COUNT + 2].copy_from_slice(&0u16.to_le_bytes());
        buf[OFF_PREV..OFF_PREV + 4].copy_from_slice(&NONE_PAGE.to_le_bytes());
        buf[OFF_NEXT..OFF_NEXT + 4].copy_from_slice(&NONE_PAGE.to_le_bytes());
    }

    pub fn init_leaf(buf: &mut [u8], page_id: PageId) {
        Self::init(buf, page_id, NODE_TYPE_LEAF);
    }

    pub fn init_internal(buf: &mut [u8], page_id: PageId) {
        Self::init(buf, page_id, NODE_TYPE_INTERNAL);
    }

    pub fn page_id(&self) -> PageId {
        read_page_id(self.buf)
    }

    pub fn is_leaf(&self) -> bool {
        self.buf[OFF_TYPE] == NODE_TYPE_LEAF
    }

    pub fn count(&self) -> u16 {
        u16::from_le_bytes(self.buf[OFF_COUNT..OFF_COUNT + 2].try_into().unwrap())
    }

    fn set_count(&mut self, v: u16) {
        self.buf[OFF_COUNT..OFF_COUNT + 2].copy_from_slice(&v.to_le_bytes());
    }

    pub fn prev_leaf(&self) -> Option<PageId> {
        let raw = u32::from_le_bytes(self.buf[OFF_PREV..OFF_PREV + 4].try_into().unwrap());
        (raw != NONE_PAGE).then_some(PageId(raw))
    }

    pub fn set_prev_leaf(&mut self, id: Option<PageId>) {
        let raw = id.map(|p| p.0).unwrap_or(NONE_PAGE);
        self.buf[OFF_PREV..OFF_PREV + 4].copy_from_slice(&raw.to_le_bytes());
    }

    pub fn next_leaf(&self) -> Option<PageId> {
        let raw = u32::from_le_bytes(self.buf[OFF_NEXT..OFF_NEXT + 4].try_into().unwrap());
        (raw != NONE_PAGE).then_some(PageId(raw))
    }

    pub fn set_next_leaf(&mut self, id: Option<PageId>) {
        let raw = id.map(|p| p.0).unwrap_or(NONE_PAGE);
        self.buf[OFF_NEXT..OFF_NEXT + 4].copy_from_slice(&raw.to_le_bytes());
    }

    // ---- Leaf entries: `key_len` bytes of key + 8-byte RowId per slot ----

    fn leaf_entry_len(key_types: &[SqlType]) -> usize {
        key_len(key_types) + 8
    }

    /// Maximum entries a leaf can hold for this page size and key shape —
    /// the B+Tree's "order" for leaves (spec.md §4.4).
    pub fn max_leaf_entries(page_size: usize, key_types: &[SqlType]) -> usize {
        (page_size - INDEX_HEADER_LEN) / Self::leaf_entry_len(key_types)
    }

    pub fn leaf_key_at(&self, idx: u16, key_types: &[SqlType]) -> DbResult<Vec<Value>> {
        let entry_len = Self::leaf_entry_len(key_types);
        let off = INDEX_HEADER_LEN + idx as usize * entry_len;
        let klen = key_len(key_types);
        let mut dec = Decoder::new(&self.buf[off..off + klen]);
        decode_key(&mut dec, key_types)
    }

    pub fn leaf_rowid_at(&self, idx: u16, key_types: &[SqlType]) -> RowId {
        let entry_len = Self::leaf_entry_len(key_types);
        let koff = key_len(key_types);
        let off = INDEX_HEADER_LEN + idx as usize * entry_len + koff;
        let bits = u64::from_le_bytes(self.buf[off..off + 8].try_into().unwrap());
        RowId::from_u64(bits)
    }

    pub fn leaf_entries(&self, key_types: &[SqlType]) -> DbResult<Vec<(Vec<Value>, RowId)>> {
        let mut out = Vec::with_capacity(self.count() as usize);
        for i in 0..self.count() {
            out.push((self.leaf_key_at(i, key_types)?, self.leaf_rowid_at(i, key_types)));
        }
        Ok(out)
    }

    /// Rewrite the whole leaf entry region from `entries` (already in
    /// sorted order). Caller ensures `entries.len() <=
    /// max_leaf_entries(..)`.
    pub fn set_leaf_entries(&mut self, entries: &[(Vec<Value>, RowId)], key_types: &[SqlType]) {
        let entry_len = Self::leaf_entry_len(key_types);
        for (i, (key, rid)) in entries.iter().enumerate() {
            let off = INDEX_HEADER_LEN + i * entry_len;
            let mut enc = Encoder::with_capacity(entry_len);
            encode_key(key, key_types, &mut enc);
            enc.put_u64(rid.to_u64());
            let bytes = enc.into_vec();
            self.buf[off..off + bytes.len()].copy_from_slice(&bytes);
        }
        self.set_count(entries.len() as u16);
    }

    // ---- Internal entries: (count+1) child page ids, then count keys ----

    /// Maximum separator keys an internal node can hold (spec.md §4.4's
    /// "order ≈ 200 for 8-byte keys").
    pub fn max_internal_keys(page_size: usize, key_types: &[SqlType]) -> usize {
        let klen = key_len(key_types);
        let capacity = page_size.saturating_sub(INDEX_HEADER_LEN);
        capacity.saturating_sub(4) / (4 + klen)
    }

    fn children_region_len(&self) -> usize {
        (self.count() as usize + 1) * 4
    }

    pub fn child_at(&self, idx: u16) -> PageId {
        let off = INDEX_HEADER_LEN + idx as usize * 4;
        PageId(u32::from_le_bytes(self.buf[off..off + 4].try_into().unwrap()))
    }

    pub fn internal_key_at(&self, idx: u16, key_types: &[SqlType]) -> DbResult<Vec<Value>> {
        let klen = key_len(key_types);
        let off = INDEX_HEADER_LEN + self.children_region_len() + idx as usize * klen;
        let mut dec = Decoder::new(&self.buf[off..off + klen]);
        decode_key(&mut dec, key_types)
    }

    pub fn internal_keys(&self, key_types: &[SqlType]) -> DbResult<Vec<Vec<Value>>> {
        let mut out = Vec::with_capacity(self.count() as usize);
        for i in 0..self.count() {
            out.push(self.internal_key_at(i, key_types)?);
        }
        Ok(out)
    }

    pub fn children(&self) -> Vec<PageId> {
        (0..=self.count()).map(|i| self.child_at(i)).collect()
    }

    /// Rewrite the whole internal-node region. `children.len()` must be
    /// `keys.len() + 1`.
    pub fn set_internal(&mut self, keys: &[Vec<Value>], children: &[PageId], key_types: &[SqlType]) {
        debug_assert_eq!(children.len(), keys.len() + 1);
        let klen = key_len(key_types);
        let mut off = INDEX_HEADER_LEN;
        for child in children {
            self.buf[off..off + 4].copy_from_slice(&child.0.to_le_bytes());
            off += 4;
        }
        for key in keys {
            let mut enc = Encoder::with_capacity(klen);
            encode_key(key, key_types, &mut enc);
            let bytes = enc.into_vec();
            self.buf[off..off + bytes.len()].copy_from_slice(&bytes);
            off += klen;
        }
        self.set_count(keys.len() as u16);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_types() -> Vec<SqlType> {
        vec![SqlType::Int]
    }

    #[test]
    fn fresh_leaf_is_empty_with_no_siblings() {
        let mut buf = vec![0xFFu8; 256];
        IndexPageView::init_leaf(&mut buf, PageId(3));
        let view = IndexPageView::new(&mut buf);
        assert!(view.is_leaf());
        assert_eq!(view.count(), 0);
        assert_eq!(view.prev_leaf(), None);
        assert_eq!(view.next_leaf(), None);
    }

    #[test]
    fn leaf_entries_round_trip() {
        let kt = key_types();
        let mut buf = vec![0u8; 256];
        IndexPageView::init_leaf(&mut buf, PageId(1));
        let mut view = IndexPageView::new(&mut buf);
        let entries = vec![
            (vec![Value::Int(1)], RowId::new(PageId(10), 0)),
            (vec![Value::Int(2)], RowId::new(PageId(10), 1)),
        ];
        view.set_leaf_entries(&entries, &kt);
        assert_eq!(view.count(), 2);
        assert_eq!(view.leaf_key_at(0, &kt).unwrap(), vec![Value::Int(1)]);
        assert_eq!(view.leaf_rowid_at(1, &kt), RowId::new(PageId(10), 1));
    }

    #[test]
    fn internal_entries_round_trip() {
        let kt = key_types();
        let mut buf = vec![0u8; 256];
        IndexPageView::init_internal(&mut buf, PageId(2));
        let mut view = IndexPageView::new(&mut buf);
        let keys = vec![vec![Value::Int(5)], vec![Value::Int(10)]];
        let children = vec![PageId(1), PageId(2), PageId(3)];
        view.set_internal(&keys, &children, &kt);
        assert_eq!(view.count(), 2);
        assert_eq!(view.children(), children);
        assert_eq!(view.internal_keys(&kt).unwrap(), keys);
    }

    #[test]
    fn null_key_round_trips_with_placeholder_bytes() {
        let kt = key_types();
        let mut buf = vec![0u8; 128];
        IndexPageView::init_leaf(&mut buf, PageId(1));
        let mut view = IndexPageView::new(&mut buf);
        let entries = vec![(vec![Value::Null], RowId::new(PageId(1), 0))];
        view.set_leaf_entries(&entries, &kt);
        assert_eq!(view.leaf_key_at(0, &kt).unwrap(), vec![Value::Null]);
    }

    #[test]
    fn max_leaf_entries_shrinks_with_larger_keys() {
        let small = IndexPageView::max_leaf_entries(4096, &[SqlType::Int]);
        let large = IndexPageView::max_leaf_entries(4096, &[SqlType::Char(200)]);
        assert!(small > large);
    }
}

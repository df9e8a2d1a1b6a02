//! The slotted heap-page layout (spec.md §4.3): a generic page header,
//! then table-heap-specific fields (prev/next page in the doubly linked
//! list, free-space offset, slot count, live-tuple count), a slot
//! directory growing forward from the header, and tuple bytes growing
//! backward from the end of the page.
//!
//! `HeapPageView` reinterprets a buffer handed back by [`buffer::BufferPool`]
//! — "a page is a tagged byte buffer... dispatch is by type code in the
//! page header, resolved at the call site" (spec.md §9). There is no
//! heap-page base class; callers fetch a frame and build a view over its
//! bytes for the duration of one operation.

use common::PageId;
use storage::{read_page_id, write_header, HEADER_LEN};

const NONE_PAGE: u32 = u32::MAX;

/// Bytes of heap-specific header after the generic 8-byte page header:
/// prev page (4), next page (4), free-space offset (2), slot count (2),
/// live tuple count (2).
pub const HEAP_HEADER_LEN: usize = HEADER_LEN + 4 + 4 + 2 + 2 + 2;

const OFF_PREV: usize = HEADER_LEN;
const OFF_NEXT: usize = HEADER_LEN + 4;
const OFF_FREE: usize = HEADER_LEN + 8;
const OFF_SLOT_COUNT: usize = HEADER_LEN + 10;
const OFF_TUPLE_COUNT: usize = HEADER_LEN + 12;

/// One slot directory entry: `(offset, length)`; `length == 0` marks a
/// tombstone (spec.md §4.3).
const SLOT_LEN: usize = 4;

/// A read/write view over one heap page's bytes.
pub struct HeapPageView<'a> {
    buf: &'a mut [u8],
}

impl<'a> HeapPageView<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf }
    }

    /// Initialize a freshly allocated page as an empty heap page with no
    /// links yet (caller splices it into the list afterward).
    pub fn init(buf: &mut [u8], page_id: PageId) {
        buf.fill(0);
        write_header(buf, page_id);
        let page_size = buf.len() as u16;
        buf[OFF_PREV..OFF_PREV + 4].copy_from_slice(&NONE_PAGE.to_le_bytes());
        buf[OFF_NEXT..OFF_NEXT + 4].copy_from_slice(&NONE_PAGE.to_le_bytes());
        buf[OFF_FREE..OFF_FREE + 2].copy_from_slice(&page_size.to_le_bytes());
        buf[OFF_SLOT_COUNT..OFF_SLOT_COUNT + 2].copy_from_slice(&0u16.to_le_bytes());
        buf[OFF_TUPLE_COUNT..OFF_TUPLE_COUNT + 2].copy_from_slice(&0u16.to_le_bytes());
    }

    pub fn page_id(&self) -> PageId {
        read_page_id(self.buf)
    }

    pub fn prev_page(&self) -> Option<PageId> {
        let raw = u32::from_le_bytes(self.buf[OFF_PREV..OFF_PREV + 4].try_into().unwrap());
        (raw != NONE_PAGE).then_some(PageId(raw))
    }

    pub fn set_prev_page(&mut self, id: Option<PageId>) {
        let raw = id.map(|p| p.0).unwrap_or(NONE_PAGE);
        self.buf[OFF_PREV..OFF_PREV + 4].copy_from_slice(&raw.to_le_bytes());
    }

    pub fn next_page(&self) -> Option<PageId> {
        let raw = u32::from_le_bytes(self.buf[OFF_NEXT..OFF_NEXT + 4].try_into().unwrap());
        (raw != NONE_PAGE).then_some(PageId(raw))
    }

    pub fn set_next_page(&mut self, id: Option<PageId>) {
        let raw = id.map(|p| p.0).unwrap_or(NONE_PAGE);
        self.buf[OFF_NEXT..OFF_NEXT + 4].copy_from_slice(&raw.to_le_bytes());
    }

    fn free_space_offset(&self) -> u16 {
        u16::from_le_bytes(self.buf[OFF_FREE..OFF_FREE + 2].try_into().unwrap())
    }

    fn set_free_space_offset(&mut self, v: u16) {
        self.buf[OFF_FREE..OFF_FREE + 2].copy_from_slice(&v.to_le_bytes());
    }

    pub fn slot_count(&self) -> u16 {
        u16::from_le_bytes(self.buf[OFF_SLOT_COUNT..OFF_SLOT_COUNT + 2].try_into().unwrap())
    }

    fn set_slot_count(&mut self, v: u16) {
        self.buf[OFF_SLOT_COUNT..OFF_SLOT_COUNT + 2].copy_from_slice(&v.to_le_bytes());
    }

    pub fn tuple_count(&self) -> u16 {
        u16::from_le_bytes(self.buf[OFF_TUPLE_COUNT..OFF_TUPLE_COUNT + 2].try_into().unwrap())
    }

    fn set_tuple_count(&mut self, v: u16) {
        self.buf[OFF_TUPLE_COUNT..OFF_TUPLE_COUNT + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn slot_dir_offset(idx: u16) -> usize {
        HEAP_HEADER_LEN + idx as usize * SLOT_LEN
    }

    /// Read slot `idx`'s `(tuple offset, tuple length)`. Length 0 means
    /// the slot is a tombstone or unused.
    pub fn slot(&self, idx: u16) -> (u16, u16) {
        let off = Self::slot_dir_offset(idx);
        let offset = u16::from_le_bytes(self.buf[off..off + 2].try_into().unwrap());
        let length = u16::from_le_bytes(self.buf[off + 2..off + 4].try_into().unwrap());
        (offset, length)
    }

    fn write_slot(&mut self, idx: u16, offset: u16, length: u16) {
        let off = Self::slot_dir_offset(idx);
        self.buf[off..off + 2].copy_from_slice(&offset.to_le_bytes());
        self.buf[off + 2..off + 4].copy_from_slice(&length.to_le_bytes());
    }

    /// Tuple bytes for a live slot. Caller must check `slot(idx).1 != 0`
    /// first.
    pub fn tuple_bytes(&self, idx: u16) -> &[u8] {
        let (offset, length) = self.slot(idx);
        &self.buf[offset as usize..(offset + length) as usize]
    }

    fn tuples_start(&self) -> usize {
        HEAP_HEADER_LEN + self.slot_count() as usize * SLOT_LEN
    }

    /// Bytes available without moving any existing tuple.
    pub fn contiguous_free(&self) -> usize {
        (self.free_space_offset() as usize).saturating_sub(self.tuples_start())
    }

    /// Bytes that would be available after compaction: contiguous free
    /// space plus every tombstoned slot's freed bytes.
    pub fn fragmented_free(&self) -> usize {
        let used_by_live: usize = (0..self.slot_count())
            .map(|i| self.slot(i).1 as usize)
            .sum();
        let tuple_region = self.buf.len() - self.tuples_start();
        tuple_region.saturating_sub(used_by_live)
    }

    /// Append `bytes` as a new live tuple. Caller has already ensured
    /// `contiguous_free() >= bytes.len() + SLOT_LEN`.
    pub fn append_tuple(&mut self, bytes: &[u8]) -> u16 {
        let new_offset = self.free_space_offset() - bytes.len() as u16;
        let start = new_offset as usize;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
        let slot_idx = self.slot_count();
        self.write_slot(slot_idx, new_offset, bytes.len() as u16);
        self.set_slot_count(slot_idx + 1);
        self.set_tuple_count(self.tuple_count() + 1);
        self.set_free_space_offset(new_offset);
        slot_idx
    }

    /// Overwrite an existing live slot's bytes in place. Caller has
    /// already ensured `bytes.len()` does not exceed the slot's current
    /// length.
    pub fn overwrite_tuple(&mut self, idx: u16, bytes: &[u8]) {
        let (offset, _) = self.slot(idx);
        let start = offset as usize;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
        self.write_slot(idx, offset, bytes.len() as u16);
    }

    /// Mark a slot as a tombstone (length 0). Its slot index is never
    /// reused or removed from the directory (spec.md §4.3).
    pub fn tombstone(&mut self, idx: u16) {
        let (offset, length) = self.slot(idx);
        if length == 0 {
            return;
        }
        self.write_slot(idx, offset, 0);
        self.set_tuple_count(self.tuple_count() - 1);
    }

    /// Opportunistic compaction: rewrite the tuple region so every live
    /// tuple's bytes are contiguous, without changing any slot's index
    /// (spec.md §4.3's "existing slot directory entries keep their
    /// index"). Reclaims space freed by tombstones.
    pub fn compact(&mut self) {
        let slot_count = self.slot_count();
        let live: Vec<(u16, Vec<u8>)> = (0..slot_count)
            .filter_map(|idx| {
                let (offset, length) = self.slot(idx);
                (length > 0).then(|| (idx, self.buf[offset as usize..(offset + length) as usize].to_vec()))
            })
            .collect();
        let mut cursor = self.buf.len() as u16;
        for (idx, bytes) in live {
            cursor -= bytes.len() as u16;
            let start = cursor as usize;
            self.buf[start..start + bytes.len()].copy_from_slice(&bytes);
            self.write_slot(idx, cursor, bytes.len() as u16);
        }
        self.set_free_space_offset(cursor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_page(size: usize) -> Vec<u8> {
        let mut buf = vec![0xFFu8; size];
        HeapPageView::init(&mut buf, PageId(3));
        buf
    }

    #[test]
    fn fresh_page_is_empty_and_fully_free() {
        let mut buf = fresh_page(256);
        let view = HeapPageView::new(&mut buf);
        assert_eq!(view.slot_count(), 0);
        assert_eq!(view.tuple_count(), 0);
        assert_eq!(view.contiguous_free(), 256 - HEAP_HEADER_LEN);
        assert_eq!(view.next_page(), None);
        assert_eq!(view.prev_page(), None);
    }

    #[test]
    fn append_and_read_tuple() {
        let mut buf = fresh_page(256);
        let mut view = HeapPageView::new(&mut buf);
        let idx = view.append_tuple(b"hello");
        assert_eq!(idx, 0);
        assert_eq!(view.tuple_bytes(0), b"hello");
        assert_eq!(view.tuple_count(), 1);
        assert_eq!(view.slot_count(), 1);
    }

    #[test]
    fn tombstone_keeps_slot_index_but_clears_length() {
        let mut buf = fresh_page(256);
        let mut view = HeapPageView::new(&mut buf);
        view.append_tuple(b"a");
        view.append_tuple(b"b");
        view.tombstone(0);
        assert_eq!(view.slot(0).1, 0);
        assert_eq!(view.tuple_bytes(1), b"b");
        assert_eq!(view.tuple_count(), 1);
        assert_eq!(view.slot_count(), 2);
    }

    #[test]
    fn compaction_preserves_slot_indices_and_reclaims_space() {
        let mut buf = fresh_page(64);
        let mut view = HeapPageView::new(&mut buf);
        view.append_tuple(b"aaaaaaaa");
        view.append_tuple(b"bbbbbbbb");
        view.append_tuple(b"cccccccc");
        view.tombstone(1);
        let before = view.contiguous_free();
        view.compact();
        assert!(view.contiguous_free() > before);
        assert_eq!(view.tuple_bytes(0), b"aaaaaaaa");
        assert_eq!(view.tuple_bytes(2), b"cccccccc");
        assert_eq!(view.slot(1).1, 0);
    }

    #[test]
    fn links_round_trip() {
        let mut buf = fresh_page(128);
        let mut view = HeapPageView::new(&mut buf);
        view.set_prev_page(Some(PageId(1)));
        view.set_next_page(Some(PageId(5)));
        assert_eq!(view.prev_page(), Some(PageId(1)));
        assert_eq!(view.next_page(), Some(PageId(5)));
    }
}

//! The record heap: a doubly linked list of slotted table-heap pages
//! (spec.md §4.3), built on frames fetched through [`buffer::BufferPool`].
//!
//! `TableHeap` holds no page bytes of its own between calls — it only
//! remembers the head page id and a next-fit cache. Every operation
//! fetches the page it needs, mutates or reads it through
//! [`page::HeapPageView`], and unpins it before returning, matching the
//! pinning discipline of spec.md §5.

pub mod page;


use buffer::BufferPool;
use common::codec::{Decoder, Encoder};
use common::{DbError, DbResult, PageId, RowId, TableId};
use log::trace;
use page::HeapPageView;
use types::{Row, SqlType};

/// A table's record heap: the page chain plus enough state to drive
/// first/next-fit insertion.
pub struct TableHeap {
    pub table_id: TableId,
    head: PageId,
    next_fit: PageId,
    col_types: Vec<SqlType>,
}

impl TableHeap {
    /// Allocate the first heap page for a brand new table.
    pub fn create(pool: &mut BufferPool, table_id: TableId, col_types: Vec<SqlType>) -> DbResult<Self> {
        let (id, buf) = pool.new_page()?;
        HeapPageView::init(buf, id);
        pool.unpin(id, true)?;
        Ok(Self {
            table_id,
            head: id,
            next_fit: id,
            col_types,
        })
    }

    /// Resume operating on an existing table whose heap head page is
    /// already on disk (engine reopen).
    pub fn open(table_id: TableId, head: PageId, col_types: Vec<SqlType>) -> Self {
        Self {
            table_id,
            head,
            next_fit: head,
            col_types,
        }
    }

    pub fn head(&self) -> PageId {
        self.head
    }

    fn max_tuple_len(pool: &BufferPool) -> usize {
        pool.page_size() - page::HEAP_HEADER_LEN - 4
    }

    /// Insert `row`, returning its new `RowId`. Walks the page chain from
    /// the next-fit cache, compacting a page opportunistically before
    /// concluding it has no room, and appends a fresh page at the tail
    /// when every existing page is full (spec.md §4.3).
    pub fn insert(&mut self, pool: &mut BufferPool, row: &Row) -> DbResult<RowId> {
        let mut enc = Encoder::with_capacity(row.encoded_len());
        row.encode(&mut enc)?;
        let bytes = enc.into_vec();
        let need = bytes.len() + 4;
        if bytes.len() > Self::max_tuple_len(pool) {
            return Err(DbError::SchemaViolation(format!(
                "row of {} bytes exceeds the maximum tuple size for this page size",
                bytes.len()
            )));
        }

        let mut current = self.next_fit;
        loop {
            let buf = pool.fetch(current)?;
            let mut view = HeapPageView::new(buf);
            let mut dirtied = false;
            if view.contiguous_free() < need && view.fragmented_free() >= need {
                view.compact();
                dirtied = true;
            }
            if view.contiguous_free() >= need {
                let slot = view.append_tuple(&bytes);
                pool.unpin(current, true)?;
                self.next_fit = current;
                trace!("heap table {}: inserted into page {current:?} slot {slot}", self.table_id.0);
                return Ok(RowId::new(current, slot as u32));
            }
            let next = view.next_page();
            pool.unpin(current, dirtied)?;
            current = match next {
                Some(n) => n,
                None => self.append_page(pool, current)?,
            };
        }
    }

    /// Allocate a new page and splice it at the tail of the list after
    /// `tail`, returning the new page's id.
    fn append_page(&mut self, pool: &mut BufferPool, tail: PageId) -> DbResult<PageId> {
        let (new_id, buf) = pool.new_page()?;
        HeapPageView::init(buf, new_id);
        HeapPageView::new(buf).set_prev_page(Some(tail));
        pool.unpin(new_id, true)?;

        let tail_buf = pool.fetch(tail)?;
        HeapPageView::new(tail_buf).set_next_page(Some(new_id));
        pool.unpin(tail, true)?;
        Ok(new_id)
    }

    /// Fetch the live row at `rid`. `NotFound` if the slot is a tombstone
    /// or out of range.
    pub fn get(&self, pool: &mut BufferPool, rid: RowId) -> DbResult<Row> {
        let buf = pool.fetch(rid.page_id)?;
        let view = HeapPageView::new(buf);
        if rid.slot >= view.slot_count() as u32 {
            pool.unpin(rid.page_id, false)?;
            return Err(DbError::NotFound);
        }
        let (_, len) = view.slot(rid.slot as u16);
        if len == 0 {
            pool.unpin(rid.page_id, false)?;
            return Err(DbError::NotFound);
        }
        let bytes = view.tuple_bytes(rid.slot as u16).to_vec();
        pool.unpin(rid.page_id, false)?;
        let mut dec = Decoder::new(&bytes);
        Row::decode(&mut dec, &self.col_types)
    }

    /// Tombstone the slot at `rid`. Does not compact or reclaim its slot
    /// index (spec.md §4.3).
    pub fn delete(&mut self, pool: &mut BufferPool, rid: RowId) -> DbResult<()> {
        let buf = pool.fetch(rid.page_id)?;
        let mut view = HeapPageView::new(buf);
        if rid.slot >= view.slot_count() as u32 || view.slot(rid.slot as u16).1 == 0 {
            pool.unpin(rid.page_id, false)?;
            return Err(DbError::NotFound);
        }
        view.tombstone(rid.slot as u16);
        pool.unpin(rid.page_id, true)
    }

    /// Update the row at `rid`. Overwrites in place if the new encoding
    /// fits within the slot's current byte length; otherwise deletes and
    /// reinserts, returning the new `RowId` (spec.md §4.3). The caller is
    /// responsible for updating any indexes with the new `RowId`.
    pub fn update(&mut self, pool: &mut BufferPool, rid: RowId, row: &Row) -> DbResult<RowId> {
        let mut enc = Encoder::with_capacity(row.encoded_len());
        row.encode(&mut enc)?;
        let bytes = enc.into_vec();

        let buf = pool.fetch(rid.page_id)?;
        let mut view = HeapPageView::new(buf);
        if rid.slot >= view.slot_count() as u32 {
            pool.unpin(rid.page_id, false)?;
            return Err(DbError::NotFound);
        }
        let (_, old_len) = view.slot(rid.slot as u16);
        if old_len == 0 {
            pool.unpin(rid.page_id, false)?;
            return Err(DbError::NotFound);
        }
        if bytes.len() <= old_len as usize {
            view.overwrite_tuple(rid.slot as u16, &bytes);
            pool.unpin(rid.page_id, true)?;
            return Ok(rid);
        }
        pool.unpin(rid.page_id, false)?;
        self.delete(pool, rid)?;
        self.insert(pool, row)
    }

    /// Free every page in this heap's chain. Used when the owning table
    /// is dropped — a dropped table must not leave heap pages holding a
    /// live bitmap bit with nothing in the catalog pointing at them
    /// (spec.md §8 property 1).
    pub fn drop_all(&self, pool: &mut BufferPool) -> DbResult<()> {
        let mut current = Some(self.head);
        while let Some(id) = current {
            let buf = pool.fetch(id)?;
            let next = HeapPageView::new(buf).next_page();
            pool.unpin(id, false)?;
            pool.delete_page(id)?;
            current = next;
        }
        Ok(())
    }

    /// A forward, restartable iterator over every live tuple in page-
    /// chain then slot order.
    pub fn scan<'p>(&self, pool: &'p mut BufferPool) -> HeapIter<'p> {
        HeapIter {
            pool,
            col_types: self.col_types.clone(),
            current_page: Some(self.head),
            slot_idx: 0,
        }
    }
}

/// Forward iterator over `(RowId, Row)`. Never holds a page pinned across
/// calls to `next`, so its `Drop` has nothing to release; documented as a
/// "scoped acquisition of pinned frames" regardless (spec.md §9) since a
/// future crabbing-latch upgrade may need to hold the current page
/// pinned between calls.
pub struct HeapIter<'p> {
    pool: &'p mut BufferPool,
    col_types: Vec<SqlType>,
    current_page: Option<PageId>,
    slot_idx: u32,
}

impl Iterator for HeapIter<'_> {
    type Item = DbResult<(RowId, Row)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let page_id = self.current_page?;
            let buf = match self.pool.fetch(page_id) {
                Ok(b) => b,
                Err(e) => {
                    self.current_page = None;
                    return Some(Err(e));
                }
            };
            let view = HeapPageView::new(buf);
            let slot_count = view.slot_count() as u32;
            if self.slot_idx >= slot_count {
                let next = view.next_page();
                if let Err(e) = self.pool.unpin(page_id, false) {
                    return Some(Err(e));
                }
                self.current_page = next;
                self.slot_idx = 0;
                continue;
            }
            let idx = self.slot_idx as u16;
            self.slot_idx += 1;
            let (_, len) = view.slot(idx);
            if len == 0 {
                if let Err(e) = self.pool.unpin(page_id, false) {
                    return Some(Err(e));
                }
                continue;
            }
            let bytes = view.tuple_bytes(idx).to_vec();
            if let Err(e) = self.pool.unpin(page_id, false) {
                return Some(Err(e));
            }
            let mut dec = Decoder::new(&bytes);
            let row = match Row::decode(&mut dec, &self.col_types) {
                Ok(r) => r,
                Err(e) => return Some(Err(e)),
            };
            return Some(Ok((RowId::new(page_id, idx as u32), row)));
        }
    }
}

//! The table handle: insert/get/update/delete/scan on one table, with
//! every primary-key/unique index kept in agreement with the heap on
//! every mutation (spec.md §6's "Table handle" interface).

use common::{DbResult, RowId};
use heap::HeapIter;
use log::trace;
use types::Row;

use crate::{validate_row, Engine};

/// A scoped handle to one table, borrowing the engine for its lifetime.
/// Spec.md §9: "a table or range iterator is a scoped acquisition of one
/// or more pinned frames" — this handle itself pins nothing between
/// calls, but the iterator `scan` returns does, and unpins on drop.
pub struct TableHandle<'a> {
    engine: &'a mut Engine,
    table_id: common::TableId,
}

impl<'a> TableHandle<'a> {
    pub(crate) fn new(engine: &'a mut Engine, table_id: common::TableId) -> Self {
        Self { engine, table_id }
    }

    /// Insert `row`, maintaining every primary-key/unique index. If any
    /// index rejects the row as a duplicate, the heap insert is undone
    /// and every index already updated by this call is rolled back, so
    /// a failed insert never leaves the row partially indexed.
    pub fn insert(&mut self, row: Row) -> DbResult<RowId> {
        let schema = self.engine.catalog.table_by_id(self.table_id)?.schema.clone();
        validate_row(&schema, &row)?;

        self.engine.ensure_heap_loaded(self.table_id)?;
        let rid = {
            let heap = self.engine.heaps.get_mut(&self.table_id).expect("just loaded");
            heap.insert(&mut self.engine.pool, &row)?
        };

        match self.engine.insert_into_auto_indexes(self.table_id, &row, rid) {
            Ok(()) => {
                trace!("table {:?}: inserted row {rid}", self.table_id);
                Ok(rid)
            }
            Err(e) => {
                let heap = self.engine.heaps.get_mut(&self.table_id).expect("just loaded");
                let _ = heap.delete(&mut self.engine.pool, rid);
                Err(e)
            }
        }
    }

    pub fn get(&mut self, rid: RowId) -> DbResult<Row> {
        self.engine.ensure_heap_loaded(self.table_id)?;
        let heap = self.engine.heaps.get(&self.table_id).expect("just loaded");
        heap.get(&mut self.engine.pool, rid)
    }

    /// Update the row at `rid`. Two index operations — remove the old
    /// key, insert the new one — exactly as spec.md §8 S6 describes;
    /// this handle does not itself roll the pair back on a partial
    /// failure, since spec.md §8 S6 places that responsibility on the
    /// caller ("both must succeed or both roll back at the executor
    /// level").
    pub fn update(&mut self, rid: RowId, row: Row) -> DbResult<RowId> {
        let schema = self.engine.catalog.table_by_id(self.table_id)?.schema.clone();
        validate_row(&schema, &row)?;

        let old_row = self.get(rid)?;

        self.engine.ensure_heap_loaded(self.table_id)?;
        let new_rid = {
            let heap = self.engine.heaps.get_mut(&self.table_id).expect("just loaded");
            heap.update(&mut self.engine.pool, rid, &row)?
        };

        self.engine.remove_from_auto_indexes(self.table_id, &old_row, rid)?;
        self.engine.insert_into_auto_indexes(self.table_id, &row, new_rid)?;
        trace!("table {:?}: updated row {rid} -> {new_rid}", self.table_id);
        Ok(new_rid)
    }

    pub fn delete(&mut self, rid: RowId) -> DbResult<()> {
        let row = self.get(rid)?;
        self.engine.remove_from_auto_indexes(self.table_id, &row, rid)?;
        self.engine.ensure_heap_loaded(self.table_id)?;
        let heap = self.engine.heaps.get_mut(&self.table_id).expect("just loaded");
        heap.delete(&mut self.engine.pool, rid)?;
        trace!("table {:?}: deleted row {rid}", self.table_id);
        Ok(())
    }

    /// A forward, restartable iterator over every live row (spec.md
    /// §4.3). Borrows the engine for the iterator's lifetime; its `Drop`
    /// unpins whatever page it currently holds.
    pub fn scan(&mut self) -> DbResult<HeapIter<'_>> {
        self.engine.ensure_heap_loaded(self.table_id)?;
        let heap = self.engine.heaps.get(&self.table_id).expect("just loaded");
        Ok(heap.scan(&mut self.engine.pool))
    }

    pub fn row_count(&mut self) -> DbResult<usize> {
        let mut count = 0;
        for item in self.scan()? {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

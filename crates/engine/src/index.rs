//! The index handle: lookup/range/insert/remove on one B+Tree index
//! (spec.md §6's "Index handle" interface). Exposed mainly for direct
//! exercising of the B+Tree in isolation from table-level row
//! maintenance — `TableHandle` is what keeps indexes in agreement with
//! the heap on ordinary row mutations.

use common::{DbResult, IndexId, RowId, TableId};
use types::Value;

use crate::Engine;

pub struct IndexHandle<'a> {
    engine: &'a mut Engine,
    table_id: TableId,
    index_id: IndexId,
}

impl<'a> IndexHandle<'a> {
    pub(crate) fn new(engine: &'a mut Engine, table_id: TableId, index_id: IndexId) -> Self {
        Self {
            engine,
            table_id,
            index_id,
        }
    }

    pub fn lookup(&mut self, key: &[Value]) -> DbResult<Vec<RowId>> {
        self.engine.ensure_index_loaded(self.table_id, self.index_id)?;
        let index = self.engine.indexes.get(&self.index_id).expect("just loaded");
        index.lookup(&mut self.engine.pool, key)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn range(
        &mut self,
        lo: Option<&[Value]>,
        hi: Option<&[Value]>,
        lo_inclusive: bool,
        hi_inclusive: bool,
    ) -> DbResult<Vec<RowId>> {
        self.engine.ensure_index_loaded(self.table_id, self.index_id)?;
        let index = self.engine.indexes.get(&self.index_id).expect("just loaded");
        index.range(&mut self.engine.pool, lo, hi, lo_inclusive, hi_inclusive)
    }

    pub fn insert(&mut self, key: Vec<Value>, rid: RowId) -> DbResult<()> {
        self.engine.ensure_index_loaded(self.table_id, self.index_id)?;
        let index = self.engine.indexes.get_mut(&self.index_id).expect("just loaded");
        index.insert(&mut self.engine.pool, key, rid)
    }

    pub fn remove(&mut self, key: &[Value], rid: RowId) -> DbResult<()> {
        self.engine.ensure_index_loaded(self.table_id, self.index_id)?;
        let index = self.engine.indexes.get_mut(&self.index_id).expect("just loaded");
        index.remove(&mut self.engine.pool, key, rid)
    }
}

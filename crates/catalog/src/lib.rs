//! The catalog: in-memory table/index metadata plus its on-disk page
//! format (spec.md §6). The core stores catalog pages through the
//! buffer pool but does not interpret them for query planning (spec.md
//! §1) — this crate owns exactly the encode/decode and the lookup
//! structures an executor would need, nothing about type coercion or
//! plan costing.

mod entry;
pub mod page;

#[cfg(test)]
mod tests;

use ahash::RandomState;
use buffer::BufferPool;
use common::codec::{Decoder, Encoder};
use common::{ColumnId, DbError, DbResult, IndexId, PageId, TableId};
use hashbrown::HashMap;
use page::CatalogPageView;
use types::SqlType;

type Map<K, V> = HashMap<K, V, RandomState>;

/// In-memory catalog: every registered table, plus name/id indexes for
/// O(1) lookup (spec.md §3's table and index models).
#[derive(Clone, Debug)]
pub struct Catalog {
    tables: Vec<TableMeta>,
    next_table_id: u32,
    next_index_id: u32,
    table_name_index: Map<String, usize>,
    table_id_index: Map<TableId, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            next_table_id: 1,
            next_index_id: 1,
            table_name_index: Map::default(),
            table_id_index: Map::default(),
        }
    }

    /// Load the catalog from the page chain rooted at `root`, through the
    /// buffer pool. Index identifiers are not persisted (spec.md §6's
    /// catalog page format has no index-id field); they are reassigned in
    /// encounter order on every load.
    pub fn load(pool: &mut BufferPool, root: PageId) -> DbResult<Self> {
        let mut bytes = Vec::new();
        let mut current = Some(root);
        while let Some(id) = current {
            let buf = pool.fetch(id)?;
            let view = CatalogPageView::new(buf);
            bytes.extend_from_slice(view.entries_bytes());
            let next = view.next_page();
            pool.unpin(id, false)?;
            current = next;
        }
        let mut dec = Decoder::new(&bytes);
        let mut tables = Vec::new();
        while dec.remaining() > 0 {
            tables.push(entry::decode_table_entry(&mut dec)?);
        }
        Ok(Self::from_tables(tables))
    }

    fn from_tables(mut tables: Vec<TableMeta>) -> Self {
        let mut next_table_id = 1;
        let mut next_index_id = 1;
        for table in &mut tables {
            next_table_id = next_table_id.max(table.id.0 + 1);
            for index in &mut table.indexes {
                index.id = IndexId(next_index_id);
                next_index_id += 1;
            }
        }
        let mut catalog = Self {
            tables,
            next_table_id,
            next_index_id,
            table_name_index: Map::default(),
            table_id_index: Map::default(),
        };
        catalog.rebuild_indexes();
        catalog
    }

    /// Persist every table as a chain of catalog pages through the buffer
    /// pool, freeing `existing_root`'s chain first. Returns the new root
    /// page id, which the caller (the `engine` facade) writes into the
    /// meta page's `catalog_root` field.
    pub fn save(&self, pool: &mut BufferPool, existing_root: Option<PageId>) -> DbResult<PageId> {
        if let Some(root) = existing_root {
            Self::free_chain(pool, root)?;
        }
        let mut entries = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            let mut enc = Encoder::new();
            entry::encode_table_entry(table, &mut enc)?;
            entries.push(enc.into_vec());
        }
        Self::write_chain(pool, &entries)
    }

    fn free_chain(pool: &mut BufferPool, root: PageId) -> DbResult<()> {
        let mut current = Some(root);
        while let Some(id) = current {
            let buf = pool.fetch(id)?;
            let next = CatalogPageView::new(buf).next_page();
            pool.unpin(id, false)?;
            pool.delete_page(id)?;
            current = next;
        }
        Ok(())
    }

    fn write_chain(pool: &mut BufferPool, entries: &[Vec<u8>]) -> DbResult<PageId> {
        let (first_id, buf) = pool.new_page()?;
        CatalogPageView::init(buf, first_id);
        pool.unpin(first_id, true)?;

        let mut current = first_id;
        for entry in entries {
            if entry.len() > pool.page_size() - page::CATALOG_HEADER_LEN {
                return Err(DbError::Catalog(
                    "table entry does not fit on an empty catalog page".into(),
                ));
            }
            loop {
                let buf = pool.fetch(current)?;
                let mut view = CatalogPageView::new(buf);
                if view.try_append_entry(entry) {
                    pool.unpin(current, true)?;
                    break;
                }
                let next = view.next_page();
                pool.unpin(current, false)?;
                current = match next {
                    Some(n) => n,
                    None => {
                        let (new_id, buf) = pool.new_page()?;
                        CatalogPageView::init(buf, new_id);
                        pool.unpin(new_id, true)?;
                        let tail = pool.fetch(current)?;
                        CatalogPageView::new(tail).set_next_page(Some(new_id));
                        pool.unpin(current, true)?;
                        new_id
                    }
                };
            }
        }
        Ok(first_id)
    }

    pub fn table(&self, name: &str) -> DbResult<&TableMeta> {
        let idx = self
            .table_name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))?;
        Ok(&self.tables[idx])
    }

    pub fn table_by_id(&self, id: TableId) -> DbResult<&TableMeta> {
        let idx = self
            .table_id_index
            .get(&id)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table id {}", id.0)))?;
        Ok(&self.tables[idx])
    }

    pub fn table_mut(&mut self, name: &str) -> DbResult<&mut TableMeta> {
        let idx = self
            .table_name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))?;
        Ok(&mut self.tables[idx])
    }

    /// Register a table whose heap has already been created (its first
    /// heap page allocated) elsewhere — the catalog only records
    /// metadata, it never allocates heap pages itself.
    pub fn create_table(&mut self, name: &str, columns: Vec<Column>, heap_head: PageId) -> DbResult<TableId> {
        if self.table_name_index.contains_key(name) {
            return Err(DbError::Catalog(format!("table '{name}' already exists")));
        }
        let schema = TableSchema::try_new(columns)?;
        let id = TableId(self.next_table_id);
        self.next_table_id += 1;
        self.tables.push(TableMeta::from_parts(id, name.to_string(), schema, heap_head, Vec::new()));
        self.rebuild_indexes();
        Ok(id)
    }

    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        let idx = self
            .table_name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))?;
        self.tables.remove(idx);
        self.rebuild_indexes();
        Ok(())
    }

    /// Register an index whose root page has already been allocated
    /// elsewhere (an empty B+Tree leaf), mirroring `create_table`.
    pub fn create_index(
        &mut self,
        table_name: &str,
        index_name: &str,
        columns: &[&str],
        root: PageId,
        unique: bool,
    ) -> DbResult<IndexId> {
        if columns.is_empty() {
            return Err(DbError::Catalog("index must reference at least one column".into()));
        }
        let resolved: Vec<ColumnId> = {
            let table = self.table(table_name)?;
            let mut resolved = Vec::with_capacity(columns.len());
            for name in columns {
                let ordinal = table.schema.column_index(name).ok_or_else(|| {
                    DbError::Catalog(format!("unknown column '{name}' on table '{table_name}'"))
                })?;
                resolved.push(ordinal);
            }
            resolved
        };
        let id = IndexId(self.next_index_id);
        self.next_index_id += 1;
        let table = self.table_mut(table_name)?;
        table.add_index(IndexMeta {
            id,
            name: index_name.to_string(),
            columns: resolved,
            root,
            unique,
        })?;
        Ok(id)
    }

    pub fn drop_index(&mut self, table_name: &str, index_name: &str) -> DbResult<()> {
        self.table_mut(table_name)?.remove_index(index_name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.tables.iter()
    }

    fn rebuild_indexes(&mut self) {
        self.table_name_index.clear();
        self.table_id_index.clear();
        for (idx, table) in self.tables.iter_mut().enumerate() {
            self.table_name_index.insert(table.name.clone(), idx);
            self.table_id_index.insert(table.id, idx);
            table.rebuild_index_lookup();
        }
    }
}

/// Metadata describing a registered table: its schema, the head page of
/// its heap, and every index built over it.
#[derive(Clone, Debug)]
pub struct TableMeta {
    pub id: TableId,
    pub name: String,
    pub schema: TableSchema,
    pub heap_head: PageId,
    pub indexes: Vec<IndexMeta>,
    index_name_lookup: Map<String, usize>,
    index_id_lookup: Map<IndexId, usize>,
}

impl TableMeta {
    fn from_parts(id: TableId, name: String, schema: TableSchema, heap_head: PageId, indexes: Vec<IndexMeta>) -> Self {
        let mut table = Self {
            id,
            name,
            schema,
            heap_head,
            indexes,
            index_name_lookup: Map::default(),
            index_id_lookup: Map::default(),
        };
        table.rebuild_index_lookup();
        table
    }

    fn add_index(&mut self, index: IndexMeta) -> DbResult<()> {
        if self.index_name_lookup.contains_key(&index.name) {
            return Err(DbError::Catalog(format!(
                "index '{}' already exists on table '{}'",
                index.name, self.name
            )));
        }
        self.indexes.push(index);
        self.rebuild_index_lookup();
        Ok(())
    }

    fn remove_index(&mut self, index_name: &str) -> DbResult<()> {
        let idx = self.index_name_lookup.get(index_name).copied().ok_or_else(|| {
            DbError::Catalog(format!("index '{index_name}' does not exist on table '{}'", self.name))
        })?;
        self.indexes.remove(idx);
        self.rebuild_index_lookup();
        Ok(())
    }

    pub fn index(&self, name: &str) -> DbResult<&IndexMeta> {
        let idx = self.index_name_lookup.get(name).copied().ok_or_else(|| {
            DbError::Catalog(format!("index '{name}' does not exist on table '{}'", self.name))
        })?;
        Ok(&self.indexes[idx])
    }

    pub fn index_by_id(&self, id: IndexId) -> DbResult<&IndexMeta> {
        let idx = self
            .index_id_lookup
            .get(&id)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown index id {} on '{}'", id.0, self.name)))?;
        Ok(&self.indexes[idx])
    }

    pub fn has_index(&self, index_name: &str) -> bool {
        self.index_name_lookup.contains_key(index_name)
    }

    pub fn indexes(&self) -> &[IndexMeta] {
        &self.indexes
    }

    /// Every index auto-created for a primary key or unique column
    /// (spec.md §3: "Primary key and unique columns each get an
    /// auto-created index"), in schema column order.
    pub fn auto_index_columns(&self) -> impl Iterator<Item = (ColumnId, &Column)> {
        self.schema
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key || c.unique)
            .map(|(i, c)| (i as ColumnId, c))
    }

    fn rebuild_index_lookup(&mut self) {
        self.index_name_lookup.clear();
        self.index_id_lookup.clear();
        for (idx, index) in self.indexes.iter().enumerate() {
            self.index_name_lookup.insert(index.name.clone(), idx);
            self.index_id_lookup.insert(index.id, idx);
        }
    }
}

/// A table's column layout, plus a name→ordinal lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
    name_to_ordinal: Map<String, ColumnId>,
}

impl TableSchema {
    pub fn try_new(columns: Vec<Column>) -> DbResult<Self> {
        if columns.is_empty() {
            return Err(DbError::Catalog("table must contain at least one column".into()));
        }
        if columns.len() > types::MAX_FIELDS {
            return Err(DbError::Catalog(format!(
                "schema has {} columns, max is {}",
                columns.len(),
                types::MAX_FIELDS
            )));
        }
        if columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(DbError::Catalog("a table may have at most one primary key".into()));
        }
        let mut name_to_ordinal = Map::default();
        for (idx, column) in columns.iter().enumerate() {
            if column.primary_key && column.nullable {
                return Err(DbError::Catalog(format!(
                    "primary key column '{}' cannot be nullable",
                    column.name
                )));
            }
            if name_to_ordinal.insert(column.name.clone(), idx as ColumnId).is_some() {
                return Err(DbError::Catalog(format!("duplicate column '{}'", column.name)));
            }
        }
        Ok(Self { columns, name_to_ordinal })
    }

    pub fn column_index(&self, name: &str) -> Option<ColumnId> {
        self.name_to_ordinal.get(name).copied()
    }

    pub fn column_type(&self, ordinal: ColumnId) -> Option<&SqlType> {
        self.columns.get(ordinal as usize).map(|c| &c.ty)
    }

    pub fn column_types(&self) -> Vec<SqlType> {
        self.columns.iter().map(|c| c.ty).collect()
    }
}

/// A column's declared type, plus the flags spec.md §3 says every column
/// carries: nullable, unique, primary key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: SqlType,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            unique: false,
            primary_key: false,
        }
    }

    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    pub fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// A primary key is implicitly unique and not nullable (spec.md §3).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.unique = true;
        self.nullable = false;
        self
    }
}

/// A table index: the ordinal list of key columns, its B+Tree root page,
/// and whether duplicate keys are rejected (spec.md §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexMeta {
    pub id: IndexId,
    pub name: String,
    pub columns: Vec<ColumnId>,
    pub root: PageId,
    pub unique: bool,
}

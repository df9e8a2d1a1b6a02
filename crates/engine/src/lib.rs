//! The engine facade: the single composition root tying the disk
//! manager, buffer pool, record heap, B+Tree, and catalog into the "one
//! engine handle per process" of spec.md §9. There is no SQL front end
//! in scope (spec.md §1) — `Engine` *is* the "interface surface exposed
//! to the executor" of spec.md §6, implemented as a real API so the
//! storage core can be exercised and tested without one.
//!
//! `Engine::open`/`close` are the only places in this workspace that log
//! (spec.md §7: "lower layers never log; they return kinds") — every
//! crate underneath returns a [`common::DbError`] and lets this facade
//! decide what, if anything, to report.

mod index;
mod table;

pub use index::IndexHandle;
pub use table::TableHandle;

use std::collections::HashMap;
use std::fs;

use buffer::{BufferPool, PoolStats};
use catalog::{Catalog, Column, TableMeta};
use common::{ColumnId, Config, DbError, DbResult, IndexId, PageId, TableId};
use heap::TableHeap;
use log::{debug, info};
use types::{SqlType, Value};

const DB_FILE_NAME: &str = "minisql.db";

/// One open database. Owns the buffer pool (and, through it, the disk
/// manager), the in-memory catalog, and a lazily-populated cache of the
/// [`heap::TableHeap`]/[`btree::BTreeIndex`] handles the catalog's tables
/// and indexes resolve to (spec.md §9: "avoid hidden process-wide state
/// for catalogs or file handles — thread them through the engine
/// handle").
pub struct Engine {
    pool: BufferPool,
    catalog: Catalog,
    catalog_root: Option<PageId>,
    heaps: HashMap<TableId, TableHeap>,
    indexes: HashMap<IndexId, btree::BTreeIndex>,
}

impl Engine {
    /// Open (creating if absent) the database file under
    /// `config.data_dir`, loading the catalog from the meta page's
    /// catalog-root pointer or starting an empty one.
    pub fn open(config: &Config) -> DbResult<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let path = config.data_dir.join(DB_FILE_NAME);
        let mut pool = BufferPool::open(&path, config.page_size, config.buffer_pool_pages)?;
        let meta = pool.read_meta()?;
        let catalog = match meta.catalog_root {
            Some(root) => Catalog::load(&mut pool, root)?,
            None => Catalog::new(),
        };
        info!(
            "engine opened at {:?} ({} tables, {} frames)",
            path,
            catalog.tables().count(),
            config.buffer_pool_pages
        );
        Ok(Self {
            pool,
            catalog,
            catalog_root: meta.catalog_root,
            heaps: HashMap::new(),
            indexes: HashMap::new(),
        })
    }

    /// Persist the catalog and flush every dirty page, then drop this
    /// handle. Spec.md §5: "No automatic flushing... engine shutdown
    /// invoke `flush_all`."
    pub fn close(mut self) -> DbResult<()> {
        self.flush_all()?;
        info!("engine closed");
        Ok(())
    }

    /// Persist the catalog to a fresh page chain and flush every dirty
    /// frame. Safe to call at any point, not just shutdown (e.g. after
    /// DDL, per spec.md §5's "callers... invoke `flush_all`").
    pub fn flush_all(&mut self) -> DbResult<()> {
        let new_root = self.catalog.save(&mut self.pool, self.catalog_root)?;
        self.catalog_root = Some(new_root);
        let mut meta = self.pool.read_meta()?;
        meta.catalog_root = Some(new_root);
        self.pool.write_meta(&meta)?;
        self.pool.flush_all()?;
        debug!("flush_all: catalog root now page {}", new_root.0);
        Ok(())
    }

    /// Buffer pool occupancy, surfaced verbatim (spec.md §6: "Engine:
    /// open, close, flush, pool statistics").
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.catalog.tables()
    }

    /// Create a table, allocating its first heap page and one B+Tree
    /// index per primary-key/unique column (spec.md §3: "Primary key and
    /// unique columns each get an auto-created index").
    pub fn create_table(&mut self, name: &str, columns: Vec<Column>) -> DbResult<TableId> {
        let (heap_head, buf) = self.pool.new_page()?;
        heap::page::HeapPageView::init(buf, heap_head);
        self.pool.unpin(heap_head, true)?;

        let table_id = match self.catalog.create_table(name, columns, heap_head) {
            Ok(id) => id,
            Err(e) => {
                // Roll back the heap page allocated above so a rejected
                // `create_table` never leaks an orphan page.
                let _ = self.pool.delete_page(heap_head);
                return Err(e);
            }
        };
        let col_types = self.catalog.table_by_id(table_id)?.schema.column_types();
        self.heaps
            .insert(table_id, TableHeap::open(table_id, heap_head, col_types));

        let auto_columns: Vec<(ColumnId, bool)> = self
            .catalog
            .table_by_id(table_id)?
            .auto_index_columns()
            .map(|(ordinal, column)| (ordinal, column.primary_key))
            .collect();
        for (ordinal, is_pk) in auto_columns {
            let table = self.catalog.table_by_id(table_id)?;
            let column_name = table.schema.columns[ordinal as usize].name.clone();
            let index_name = if is_pk {
                format!("pk_{name}")
            } else {
                format!("uq_{name}_{column_name}")
            };
            self.create_index(name, &index_name, &[&column_name], true)?;
        }
        info!("created table '{name}' ({table_id:?})");
        Ok(table_id)
    }

    /// Drop a table: free every heap page and every index page it owns,
    /// then remove it from the catalog.
    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        let table_id = self.catalog.table(name)?.id;
        let index_ids: Vec<IndexId> = self
            .catalog
            .table_by_id(table_id)?
            .indexes()
            .iter()
            .map(|ix| ix.id)
            .collect();
        for index_id in index_ids {
            self.ensure_index_loaded(table_id, index_id)?;
            let index = self.indexes.remove(&index_id).expect("just loaded");
            index.drop_all(&mut self.pool)?;
        }
        self.ensure_heap_loaded(table_id)?;
        let heap = self.heaps.remove(&table_id).expect("just loaded");
        heap.drop_all(&mut self.pool)?;

        self.catalog.drop_table(name)?;
        info!("dropped table '{name}'");
        Ok(())
    }

    /// Create a named index over `columns`, allocating its root leaf and
    /// registering it in the catalog.
    pub fn create_index(
        &mut self,
        table_name: &str,
        index_name: &str,
        columns: &[&str],
        unique: bool,
    ) -> DbResult<IndexId> {
        let table = self.catalog.table(table_name)?;
        let key_types: Vec<SqlType> = columns
            .iter()
            .map(|c| {
                table
                    .schema
                    .column_index(c)
                    .and_then(|ord| table.schema.column_type(ord))
                    .copied()
                    .ok_or_else(|| DbError::Catalog(format!("unknown column '{c}'")))
            })
            .collect::<DbResult<_>>()?;

        let index = btree::BTreeIndex::create(&mut self.pool, key_types, unique)?;
        let root = index.root();
        let index_id = match self.catalog.create_index(table_name, index_name, columns, root, unique) {
            Ok(id) => id,
            Err(e) => {
                let _ = index.drop_all(&mut self.pool);
                return Err(e);
            }
        };

        // Backfill the new index from every existing row (spec.md §3
        // implies indexes stay in agreement with their table at all
        // times; a brand new unique index over a table that already has
        // duplicate values must be rejected, not silently created).
        let table_id = self.catalog.table(table_name)?.id;
        self.ensure_heap_loaded(table_id)?;
        let ordinals: Vec<ColumnId> = {
            let table = self.catalog.table_by_id(table_id)?;
            columns
                .iter()
                .map(|c| table.schema.column_index(c).expect("validated above"))
                .collect()
        };
        self.indexes.insert(index_id, index);
        let rows: Vec<(common::RowId, types::Row)> = {
            let heap = self.heaps.get(&table_id).expect("just loaded");
            heap.scan(&mut self.pool).collect::<DbResult<Vec<_>>>()?
        };
        for (rid, row) in rows {
            let key = build_key(&row, &ordinals);
            let (pool, idx) = (&mut self.pool, self.indexes.get_mut(&index_id).expect("just inserted"));
            if let Err(e) = idx.insert(pool, key, rid) {
                let removed = self.indexes.remove(&index_id).expect("just inserted");
                let _ = removed.drop_all(&mut self.pool);
                let _ = self.catalog.drop_index(table_name, index_name);
                return Err(e);
            }
        }
        info!("created index '{index_name}' on '{table_name}'");
        Ok(index_id)
    }

    pub fn drop_index(&mut self, table_name: &str, index_name: &str) -> DbResult<()> {
        let table = self.catalog.table(table_name)?;
        let index_id = table.index(index_name)?.id;
        self.ensure_index_loaded(table.id, index_id)?;
        let index = self.indexes.remove(&index_id).expect("just loaded");
        index.drop_all(&mut self.pool)?;
        self.catalog.drop_index(table_name, index_name)?;
        info!("dropped index '{index_name}' on '{table_name}'");
        Ok(())
    }

    pub fn table(&mut self, name: &str) -> DbResult<TableHandle<'_>> {
        let table_id = self.catalog.table(name)?.id;
        Ok(TableHandle::new(self, table_id))
    }

    pub fn index(&mut self, table_name: &str, index_name: &str) -> DbResult<IndexHandle<'_>> {
        let table = self.catalog.table(table_name)?;
        let table_id = table.id;
        let index_id = table.index(index_name)?.id;
        Ok(IndexHandle::new(self, table_id, index_id))
    }

    fn ensure_heap_loaded(&mut self, table_id: TableId) -> DbResult<()> {
        if self.heaps.contains_key(&table_id) {
            return Ok(());
        }
        let meta = self.catalog.table_by_id(table_id)?;
        let col_types = meta.schema.column_types();
        self.heaps
            .insert(table_id, TableHeap::open(table_id, meta.heap_head, col_types));
        Ok(())
    }

    fn ensure_index_loaded(&mut self, table_id: TableId, index_id: IndexId) -> DbResult<()> {
        if self.indexes.contains_key(&index_id) {
            return Ok(());
        }
        let table = self.catalog.table_by_id(table_id)?;
        let idx_meta = table.index_by_id(index_id)?;
        let key_types: Vec<SqlType> = idx_meta
            .columns
            .iter()
            .map(|&ord| {
                *table
                    .schema
                    .column_type(ord)
                    .expect("catalog column ordinals are always valid")
            })
            .collect();
        let index = btree::BTreeIndex::open(idx_meta.root, key_types, idx_meta.unique);
        self.indexes.insert(index_id, index);
        Ok(())
    }

    /// Insert `rid`'s key into every index on `table_id`, rolling back
    /// any index already updated in this call if a later one rejects the
    /// key as a duplicate (spec.md §8 S2: a duplicate leaves the tree,
    /// and by extension every index touched by one `insert`, unmodified).
    fn insert_into_auto_indexes(&mut self, table_id: TableId, row: &types::Row, rid: common::RowId) -> DbResult<()> {
        let specs: Vec<(IndexId, Vec<ColumnId>)> = self
            .catalog
            .table_by_id(table_id)?
            .indexes()
            .iter()
            .map(|ix| (ix.id, ix.columns.clone()))
            .collect();
        let mut applied: Vec<(IndexId, Vec<Value>)> = Vec::with_capacity(specs.len());
        for (index_id, columns) in specs {
            let key = build_key(row, &columns);
            self.ensure_index_loaded(table_id, index_id)?;
            let (pool, index) = (&mut self.pool, self.indexes.get_mut(&index_id).expect("just loaded"));
            match index.insert(pool, key.clone(), rid) {
                Ok(()) => applied.push((index_id, key)),
                Err(e) => {
                    for (done_id, done_key) in applied {
                        if let Some(done_index) = self.indexes.get_mut(&done_id) {
                            let _ = done_index.remove(&mut self.pool, &done_key, rid);
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Remove `rid`'s key from every index on `table_id`. Used by both
    /// `delete` and the remove-half of `update` (spec.md §8 S6).
    fn remove_from_auto_indexes(&mut self, table_id: TableId, row: &types::Row, rid: common::RowId) -> DbResult<()> {
        let specs: Vec<(IndexId, Vec<ColumnId>)> = self
            .catalog
            .table_by_id(table_id)?
            .indexes()
            .iter()
            .map(|ix| (ix.id, ix.columns.clone()))
            .collect();
        for (index_id, columns) in specs {
            let key = build_key(row, &columns);
            self.ensure_index_loaded(table_id, index_id)?;
            let (pool, index) = (&mut self.pool, self.indexes.get_mut(&index_id).expect("just loaded"));
            index.remove(pool, &key, rid)?;
        }
        Ok(())
    }
}

/// Validate `row` against `schema`: field count, nullability, and
/// type/length agreement (spec.md §7's `SchemaViolation`).
fn validate_row(schema: &catalog::TableSchema, row: &types::Row) -> DbResult<()> {
    let fields = row.fields();
    if fields.len() != schema.columns.len() {
        return Err(DbError::SchemaViolation(format!(
            "row has {} fields, schema declares {}",
            fields.len(),
            schema.columns.len()
        )));
    }
    for (value, column) in fields.iter().zip(&schema.columns) {
        if value.is_null() {
            if !column.nullable {
                return Err(DbError::SchemaViolation(format!(
                    "column '{}' is not nullable",
                    column.name
                )));
            }
            continue;
        }
        if value.sql_type() != Some(column.ty) {
            return Err(DbError::SchemaViolation(format!(
                "column '{}' expects {:?}, got a value of a different type or length",
                column.name, column.ty
            )));
        }
    }
    Ok(())
}

fn build_key(row: &types::Row, columns: &[ColumnId]) -> Vec<Value> {
    columns.iter().map(|&c| row.fields()[c as usize].clone()).collect()
}

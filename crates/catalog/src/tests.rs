use super::*;
use buffer::BufferPool;
use common::{ColumnId, DbError, IndexId, PageId, TableId};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use types::SqlType;

fn open_pool(capacity: usize) -> (BufferPool, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    (BufferPool::open(&path, 4096, capacity).unwrap(), dir)
}

fn alloc_page(pool: &mut BufferPool) -> PageId {
    let (id, _) = pool.new_page().unwrap();
    pool.unpin(id, true).unwrap();
    id
}

fn sample_columns() -> Vec<Column> {
    vec![
        Column::new("id", SqlType::Int).primary_key(),
        Column::new("name", SqlType::Char(8)),
        Column::new("age", SqlType::Int),
    ]
}

#[test]
fn create_and_lookup_table() {
    let (mut pool, _dir) = open_pool(16);
    let heap_head = alloc_page(&mut pool);
    let mut catalog = Catalog::new();
    let table_id = catalog.create_table("users", sample_columns(), heap_head).unwrap();

    assert_eq!(table_id, TableId(1));
    let table = catalog.table("users").unwrap();
    assert_eq!(table.schema.column_index("name"), Some(1));
    assert_eq!(table.schema.column_type(0), Some(&SqlType::Int));
    assert_eq!(catalog.table_by_id(table_id).unwrap().name, "users");
}

#[test]
fn rejects_duplicate_tables() {
    let (mut pool, _dir) = open_pool(16);
    let heap_head = alloc_page(&mut pool);
    let mut catalog = Catalog::new();
    catalog.create_table("users", sample_columns(), heap_head).unwrap();
    let err = catalog.create_table("users", sample_columns(), heap_head).unwrap_err();
    assert!(matches!(err, DbError::Catalog(_)));
}

#[test]
fn rejects_duplicate_columns() {
    let mut catalog = Catalog::new();
    let err = catalog
        .create_table(
            "bad",
            vec![Column::new("id", SqlType::Int), Column::new("id", SqlType::Int)],
            PageId(1),
        )
        .unwrap_err();
    assert!(format!("{err}").contains("duplicate column"));
}

#[test]
fn rejects_two_primary_keys() {
    let err = TableSchema::try_new(vec![
        Column::new("a", SqlType::Int).primary_key(),
        Column::new("b", SqlType::Int).primary_key(),
    ])
    .unwrap_err();
    assert!(format!("{err}").contains("at most one primary key"));
}

#[test]
fn primary_key_is_implicitly_unique_and_not_nullable() {
    let col = Column::new("id", SqlType::Int).primary_key();
    assert!(col.unique);
    assert!(!col.nullable);
}

#[test]
fn create_and_drop_index() {
    let (mut pool, _dir) = open_pool(16);
    let heap_head = alloc_page(&mut pool);
    let root = alloc_page(&mut pool);
    let mut catalog = Catalog::new();
    catalog.create_table("users", sample_columns(), heap_head).unwrap();

    let index_id = catalog
        .create_index("users", "idx_users_name", &["name"], root, false)
        .unwrap();
    assert_eq!(index_id, IndexId(1));

    let table = catalog.table("users").unwrap();
    assert!(table.has_index("idx_users_name"));
    assert_eq!(table.index("idx_users_name").unwrap().columns, vec![1u8]);

    catalog.drop_index("users", "idx_users_name").unwrap();
    assert!(!catalog.table("users").unwrap().has_index("idx_users_name"));
}

#[test]
fn auto_index_columns_reports_pk_and_unique() {
    let (mut pool, _dir) = open_pool(16);
    let heap_head = alloc_page(&mut pool);
    let mut catalog = Catalog::new();
    let columns = vec![
        Column::new("id", SqlType::Int).primary_key(),
        Column::new("u", SqlType::Int).unique(true),
        Column::new("v", SqlType::Char(4)),
    ];
    catalog.create_table("t", columns, heap_head).unwrap();
    let table = catalog.table("t").unwrap();
    let ordinals: Vec<ColumnId> = table.auto_index_columns().map(|(ord, _)| ord).collect();
    assert_eq!(ordinals, vec![0, 1]);
}

#[test]
fn persistence_round_trip_through_buffer_pool() {
    let (mut pool, _dir) = open_pool(16);
    let heap_head = alloc_page(&mut pool);
    let root = alloc_page(&mut pool);
    let mut catalog = Catalog::new();
    catalog.create_table("users", sample_columns(), heap_head).unwrap();
    catalog
        .create_index("users", "idx_users_name", &["name"], root, false)
        .unwrap();

    let root_page = catalog.save(&mut pool, None).unwrap();
    pool.flush_all().unwrap();

    let loaded = Catalog::load(&mut pool, root_page).unwrap();
    let table = loaded.table("users").unwrap();
    assert!(table.has_index("idx_users_name"));
    assert_eq!(table.index("idx_users_name").unwrap().columns, vec![1u8]);
    assert_eq!(table.heap_head, heap_head);
    assert_eq!(loaded.table_by_id(TableId(1)).unwrap().name, "users");
    assert_eq!(table.schema, catalog.table("users").unwrap().schema);
    let pk = &table.schema.columns[0];
    assert!(pk.primary_key && pk.unique && !pk.nullable);
}

#[test]
fn save_again_frees_the_previous_chain() {
    let (mut pool, _dir) = open_pool(16);
    let heap_head = alloc_page(&mut pool);
    let mut catalog = Catalog::new();
    catalog.create_table("users", sample_columns(), heap_head).unwrap();

    let first_root = catalog.save(&mut pool, None).unwrap();
    catalog.create_table("orders", sample_columns(), heap_head).unwrap();
    let second_root = catalog.save(&mut pool, Some(first_root)).unwrap();

    // The old root page was deallocated; fetching it is now invalid.
    assert!(pool.fetch(first_root).is_err() || first_root == second_root);
    let loaded = Catalog::load(&mut pool, second_root).unwrap();
    assert!(loaded.table("users").is_ok());
    assert!(loaded.table("orders").is_ok());
}

#[test]
fn entries_spanning_many_pages_round_trip() {
    let (mut pool, _dir) = open_pool(64);
    let mut catalog = Catalog::new();
    for i in 0..40 {
        let heap_head = alloc_page(&mut pool);
        catalog.create_table(&format!("t{i}"), sample_columns(), heap_head).unwrap();
    }
    let root = catalog.save(&mut pool, None).unwrap();
    let loaded = Catalog::load(&mut pool, root).unwrap();
    assert_eq!(loaded.tables().count(), 40);
    assert!(loaded.table("t39").is_ok());
}

#[test]
fn drop_table_removes_metadata() {
    let (mut pool, _dir) = open_pool(16);
    let heap_head = alloc_page(&mut pool);
    let mut catalog = Catalog::new();
    catalog.create_table("users", sample_columns(), heap_head).unwrap();
    catalog.drop_table("users").unwrap();
    assert!(catalog.table("users").is_err());

    let next_id = catalog.create_table("orders", sample_columns(), heap_head).unwrap();
    assert_eq!(next_id, TableId(2));
}

#[test]
fn index_creation_validates_columns() {
    let (mut pool, _dir) = open_pool(16);
    let heap_head = alloc_page(&mut pool);
    let root = alloc_page(&mut pool);
    let mut catalog = Catalog::new();
    catalog.create_table("users", sample_columns(), heap_head).unwrap();
    let err = catalog
        .create_index("users", "idx_missing", &["missing"], root, false)
        .unwrap_err();
    assert!(format!("{err}").contains("unknown column"));
}

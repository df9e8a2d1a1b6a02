use super::*;

#[test]
fn config_defaults_match_spec() {
    let cfg = Config::default();
    assert_eq!(cfg.page_size, 4096);
    assert_eq!(cfg.buffer_pool_pages, 64);
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::Corruption("bad magic".into());
    assert!(format!("{err}").contains("bad magic"));
}

#[test]
fn row_id_round_trips_through_u64() {
    let rid = RowId::new(PageId(42), 7);
    assert_eq!(RowId::from_u64(rid.to_u64()), rid);
}

#[test]
fn row_id_packs_page_in_high_bits() {
    let rid = RowId::new(PageId(1), 255);
    assert_eq!(rid.to_u64(), (1u64 << 32) | 255);
}

#[test]
fn io_error_converts() {
    let e = std::io::Error::other("oops");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::Io(_)));
}

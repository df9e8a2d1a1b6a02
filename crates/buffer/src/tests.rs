use super::*;
use tempfile::tempdir;

fn open_pool(capacity: usize) -> (BufferPool, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    (BufferPool::open(&path, 4096, capacity).unwrap(), dir)
}

#[test]
fn new_page_is_pinned_and_dirty() {
    let (mut pool, _dir) = open_pool(4);
    let (id, buf) = pool.new_page().unwrap();
    buf[8] = 0xAB;
    assert_eq!(pool.pin_count(id), 1);
    pool.unpin(id, true).unwrap();
    assert_eq!(pool.pin_count(id), 0);
}

#[test]
fn fetch_of_resident_page_reuses_frame_and_pins() {
    let (mut pool, _dir) = open_pool(4);
    let (id, _) = pool.new_page().unwrap();
    pool.unpin(id, true).unwrap();

    let buf = pool.fetch(id).unwrap();
    assert_eq!(buf[8], 0); // freshly zeroed by new_page
    assert_eq!(pool.pin_count(id), 1);
    pool.unpin(id, false).unwrap();
}

#[test]
fn double_unpin_surfaces_double_unpin_error() {
    let (mut pool, _dir) = open_pool(4);
    let (id, _) = pool.new_page().unwrap();
    pool.unpin(id, false).unwrap();
    let err = pool.unpin(id, false).unwrap_err();
    assert!(matches!(err, DbError::DoubleUnpin(_)));
}

/// Scenario S4: buffer pool of 4 frames; sequential fetch/unpin of pages
/// never exhausts the pool, but holding all pins does.
#[test]
fn sequential_fetch_unpin_never_exhausts_pool() {
    let (mut pool, _dir) = open_pool(4);
    let mut ids = Vec::new();
    for _ in 0..11 {
        let (id, _) = pool.new_page().unwrap();
        pool.unpin(id, false).unwrap();
        ids.push(id);
    }
    for id in ids {
        let _buf = pool.fetch(id).unwrap();
        pool.unpin(id, false).unwrap();
    }
}

#[test]
fn holding_every_pin_exhausts_pool() {
    let (mut pool, _dir) = open_pool(4);
    let mut held = Vec::new();
    for _ in 0..4 {
        let (id, _) = pool.new_page().unwrap();
        held.push(id);
    }
    // All 4 frames are pinned (never unpinned); a 5th new_page needs a
    // victim and there is none.
    let err = pool.new_page().unwrap_err();
    assert!(matches!(err, DbError::OutOfFrames));
}

#[test]
fn eviction_flushes_dirty_victim_before_reuse() {
    let (mut pool, _dir) = open_pool(1);
    let (id_a, buf) = pool.new_page().unwrap();
    buf[8] = 0x42;
    pool.unpin(id_a, true).unwrap();

    // Forces eviction of id_a's frame (only one frame exists).
    let (id_b, _) = pool.new_page().unwrap();
    pool.unpin(id_b, false).unwrap();

    let buf = pool.fetch(id_a).unwrap();
    assert_eq!(buf[8], 0x42);
    pool.unpin(id_a, false).unwrap();
}

#[test]
fn delete_page_refuses_while_pinned_by_others() {
    let (mut pool, _dir) = open_pool(4);
    let (id, _) = pool.new_page().unwrap();
    // still pinned once (our own pin) — deletable.
    pool.delete_page(id).unwrap();
    assert!(pool.is_page_free(id).unwrap());
}

#[test]
fn delete_page_rejects_when_pinned_more_than_once() {
    let (mut pool, _dir) = open_pool(4);
    let (id, _) = pool.new_page().unwrap();
    pool.unpin(id, false).unwrap();
    let _first = pool.fetch(id).unwrap();
    let _second = pool.fetch(id).unwrap();
    let err = pool.delete_page(id).unwrap_err();
    assert!(matches!(err, DbError::InvariantViolation(_)));
    pool.unpin(id, false).unwrap();
    pool.unpin(id, false).unwrap();
}

#[test]
fn flush_all_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let id = {
        let mut pool = BufferPool::open(&path, 4096, 4).unwrap();
        let (id, buf) = pool.new_page().unwrap();
        buf[8] = 0x77;
        pool.unpin(id, true).unwrap();
        pool.flush_all().unwrap();
        id
    };
    let mut pool = BufferPool::open(&path, 4096, 4).unwrap();
    let buf = pool.fetch(id).unwrap();
    assert_eq!(buf[8], 0x77);
    pool.unpin(id, false).unwrap();
}

#[test]
fn fetch_of_unallocated_page_is_invalid_page() {
    let (mut pool, _dir) = open_pool(4);
    let err = pool.fetch(PageId(999)).unwrap_err();
    assert!(matches!(err, DbError::InvalidPage(_, _)));
}

#[test]
fn pool_stats_reflect_pin_and_residency() {
    let (mut pool, _dir) = open_pool(4);
    let (id, _) = pool.new_page().unwrap();
    let stats = pool.stats();
    assert_eq!(stats.capacity, 4);
    assert_eq!(stats.pages_resident, 1);
    assert_eq!(stats.pages_pinned, 1);
    pool.unpin(id, false).unwrap();
    assert_eq!(pool.stats().pages_pinned, 0);
}

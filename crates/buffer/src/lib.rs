//! The pinning buffer pool (spec.md §4.2): a fixed array of frames
//! caching pages from the single database file owned by [`storage`]'s
//! `DiskManager`. This is the only cache in the system — every layer
//! above (`heap`, `btree`, `catalog`) reaches the disk exclusively
//! through `fetch`/`unpin`/`new_page`/`delete_page`/`flush`, and so does
//! bitmap-bit maintenance: `new_page`/`delete_page` fetch the relevant
//! bitmap extent into a frame exactly like any other page, flip the bit
//! there, and let the frame's normal dirty/eviction/flush path carry the
//! change back to disk. There is no second, direct-file-handle path for
//! bitmap bytes (spec.md §4.1).
//!
//! # Pin discipline
//!
//! `fetch` increments a frame's pin count and returns the frame's bytes;
//! `unpin` decrements it and ORs in the dirty flag. A frame with a
//! positive pin count is never a victim. Callers are expected to match
//! every `fetch` with exactly one `unpin` on every control-flow exit,
//! including error paths (spec.md §5) — `fetch`'s borrow is transient
//! (tied to the `&mut self` call, not stored across further pool calls),
//! so higher layers copy bytes out (or write bytes in) within one
//! statement and call `unpin` once they are done, even if that is many
//! statements later. See DESIGN.md for how `heap`/`btree` use this to
//! hold a page "pinned" across several operations without holding a Rust
//! borrow open. Internally, bitmap frames hold to the same discipline:
//! a bitmap extent is pinned only for the duration of the bit flip.
//!
//! Eviction policy: an LRU replacer ([`replacer::LruReplacer`]) holds
//! every frame whose pin count is currently zero; `fetch`/`new_page`
//! prefer a frame from the free list, falling back to the replacer's
//! victim, writing it back first if dirty. A resident-but-unpinned
//! bitmap extent is as eligible a victim as any data page.

mod replacer;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::Path;

use common::{DbError, DbResult, PageId};
use replacer::LruReplacer;
use storage::{BitmapView, DiskManager};

/// What a frame currently caches: a data page by its logical id, or a
/// bitmap extent by its extent index. Kept distinct so the two id
/// spaces can never collide in `page_table`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum FrameKey {
    Data(PageId),
    Bitmap(u32),
}

struct Frame {
    key: Option<FrameKey>,
    data: Vec<u8>,
    pin_count: u32,
    dirty: bool,
}

impl Frame {
    fn new(page_size: usize) -> Self {
        Self {
            key: None,
            data: vec![0u8; page_size],
            pin_count: 0,
            dirty: false,
        }
    }
}

/// Point-in-time counters describing pool occupancy, surfaced to the
/// `engine` facade as the "pool statistics" of spec.md §6.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub pages_resident: usize,
    pub pages_pinned: usize,
    pub free_frames: usize,
}

/// A fixed pool of `P` frames (spec.md §4.2 default 64) fronting one
/// database file.
pub struct BufferPool {
    frames: Vec<Frame>,
    page_table: HashMap<FrameKey, usize>,
    free_list: Vec<usize>,
    replacer: LruReplacer,
    disk: DiskManager,
}

impl BufferPool {
    /// Open (or create) the database file at `path` and build a pool of
    /// `capacity` frames over it.
    pub fn open(path: &Path, page_size: usize, capacity: usize) -> DbResult<Self> {
        assert!(capacity > 0, "buffer pool must have at least one frame");
        let disk = DiskManager::open(path, page_size)?;
        let frames = (0..capacity).map(|_| Frame::new(page_size)).collect();
        let free_list = (0..capacity).rev().collect();
        Ok(Self {
            frames,
            page_table: HashMap::new(),
            free_list,
            replacer: LruReplacer::new(capacity),
            disk,
        })
    }

    pub fn page_size(&self) -> usize {
        self.disk.page_size()
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.frames.len(),
            pages_resident: self.page_table.len(),
            pages_pinned: self.frames.iter().filter(|f| f.pin_count > 0).count(),
            free_frames: self.free_list.len() + self.replacer.len(),
        }
    }

    /// Direct pass-through to the disk manager's meta page, for the
    /// handful of callers (the engine, opening/closing) that need the
    /// catalog root pointer before any page can be fetched through the
    /// pool. Page 0 is never cached as a frame — it has no logical page
    /// id of its own (spec.md §6) and is read/written exactly once per
    /// `open`/`flush_all`.
    pub fn read_meta(&mut self) -> DbResult<storage::MetaPage> {
        self.disk.read_meta()
    }

    pub fn write_meta(&mut self, meta: &storage::MetaPage) -> DbResult<()> {
        self.disk.write_meta(meta)
    }

    /// Acquire a frame to hold a page: prefer the free list, otherwise
    /// evict the replacer's victim (flushing it first if dirty).
    fn acquire_frame(&mut self) -> DbResult<usize> {
        if let Some(idx) = self.free_list.pop() {
            return Ok(idx);
        }
        let idx = self.replacer.victim().ok_or(DbError::OutOfFrames)?;
        let frame = &mut self.frames[idx];
        let old_key = frame.key.take().expect("a replacer member always holds a resident page");
        if frame.dirty {
            match old_key {
                FrameKey::Data(id) => self.disk.write_page(id, &frame.data)?,
                FrameKey::Bitmap(extent) => {
                    let physical = self.disk.physical_of_bitmap(extent);
                    self.disk.write_physical_page(physical, &frame.data)?;
                }
            }
            self.frames[idx].dirty = false;
        }
        self.page_table.remove(&old_key);
        Ok(idx)
    }

    fn pin_resident(&mut self, idx: usize) {
        self.frames[idx].pin_count += 1;
        self.replacer.pin(idx);
    }

    fn unpin_key(&mut self, key: FrameKey, dirty: bool) -> DbResult<()> {
        let idx = *self
            .page_table
            .get(&key)
            .ok_or_else(|| DbError::InvariantViolation(format!("unpin of non-resident frame {key:?}")))?;
        let frame = &mut self.frames[idx];
        if frame.pin_count == 0 {
            let id = match key {
                FrameKey::Data(id) => id.0,
                FrameKey::Bitmap(extent) => extent,
            };
            return Err(DbError::DoubleUnpin(id));
        }
        frame.pin_count -= 1;
        frame.dirty |= dirty;
        if frame.pin_count == 0 {
            self.replacer.unpin(idx);
        }
        Ok(())
    }

    /// Fetch `id`, pinning it. Resident pages are pinned in place;
    /// non-resident pages are loaded from disk into an acquired frame.
    /// Returns `InvalidPage` if `id`'s bitmap bit is clear — reading an
    /// unallocated page is a programmer error (spec.md §4.1).
    pub fn fetch(&mut self, id: PageId) -> DbResult<&mut [u8]> {
        let key = FrameKey::Data(id);
        if let Some(&idx) = self.page_table.get(&key) {
            self.pin_resident(idx);
            return Ok(&mut self.frames[idx].data);
        }
        if self.is_page_free(id)? {
            return Err(DbError::InvalidPage(id.0, "page is not allocated".into()));
        }
        let bytes = self.disk.read_page(id)?;
        let idx = self.acquire_frame()?;
        let frame = &mut self.frames[idx];
        frame.data.copy_from_slice(&bytes);
        frame.key = Some(key);
        frame.pin_count = 1;
        frame.dirty = false;
        self.page_table.insert(key, idx);
        Ok(&mut frame.data)
    }

    /// Decrement `id`'s pin count and OR in `dirty`. Pushes the frame to
    /// the replacer once its pin count reaches zero.
    pub fn unpin(&mut self, id: PageId, dirty: bool) -> DbResult<()> {
        self.unpin_key(FrameKey::Data(id), dirty)
    }

    /// Fetch bitmap extent `extent` into a frame, pinning it, initializing
    /// a fresh all-free extent in memory if it hasn't been written to the
    /// file yet.
    fn fetch_bitmap(&mut self, extent: u32) -> DbResult<usize> {
        let key = FrameKey::Bitmap(extent);
        if let Some(&idx) = self.page_table.get(&key) {
            self.pin_resident(idx);
            return Ok(idx);
        }
        let physical = self.disk.physical_of_bitmap(extent);
        let exists = physical < self.disk.num_physical_pages()?;
        let existing = if exists {
            Some(self.disk.read_physical_page(physical)?)
        } else {
            None
        };
        let idx = self.acquire_frame()?;
        let frame = &mut self.frames[idx];
        match existing {
            Some(bytes) => frame.data.copy_from_slice(&bytes),
            None => BitmapView::init(&mut frame.data, PageId(extent)),
        }
        frame.key = Some(key);
        frame.pin_count = 1;
        frame.dirty = false;
        self.page_table.insert(key, idx);
        Ok(idx)
    }

    /// Scan bitmap extents in order for the first clear bit, set it
    /// through a fetched frame, and return the newly allocated logical
    /// page id (spec.md §4.1).
    fn allocate_logical_page(&mut self) -> DbResult<PageId> {
        let bits = self.disk.bits_per_extent();
        let known_extents = {
            let pages = self.disk.num_physical_pages()?;
            // Every known extent is `bits + 1` physical pages; extent 0
            // starts at physical 1.
            if pages <= 1 {
                0
            } else {
                ((pages - 1) / (bits as u64 + 1)) as u32 + 1
            }
        };
        for extent in 0..=known_extents {
            let idx = self.fetch_bitmap(extent)?;
            let found = {
                let view = BitmapView::new(&mut self.frames[idx].data);
                view.first_clear_bit(bits)
            };
            match found {
                Some(bit) => {
                    BitmapView::new(&mut self.frames[idx].data).set_bit(bit);
                    self.unpin_key(FrameKey::Bitmap(extent), true)?;
                    return Ok(PageId(extent * bits + bit));
                }
                None => self.unpin_key(FrameKey::Bitmap(extent), false)?,
            }
        }
        unreachable!("extending one extent beyond the known range always has free bits");
    }

    /// Clear the bitmap bit for `id` through a fetched frame. Does not
    /// zero or reclaim the page's bytes — only `is_page_free` and future
    /// `allocate_logical_page` calls see the effect.
    fn deallocate_logical_page(&mut self, id: PageId) -> DbResult<()> {
        let (extent, bit) = self.disk.extent_of(id.0);
        let idx = self.fetch_bitmap(extent)?;
        let cleared = BitmapView::new(&mut self.frames[idx].data).clear_bit(bit);
        if !cleared {
            self.unpin_key(FrameKey::Bitmap(extent), false)?;
            return Err(DbError::InvariantViolation(format!("page {} was already free", id.0)));
        }
        self.unpin_key(FrameKey::Bitmap(extent), true)
    }

    /// Allocate a fresh logical page through a fetched bitmap frame,
    /// acquire a frame for it, zero its bytes, and pin it once (pin
    /// count 1, dirty). The generic page header is stamped with the new
    /// id.
    pub fn new_page(&mut self) -> DbResult<(PageId, &mut [u8])> {
        let id = self.allocate_logical_page()?;
        let idx = self.acquire_frame()?;
        let frame = &mut self.frames[idx];
        frame.data.fill(0);
        storage::write_header(&mut frame.data, id);
        frame.key = Some(FrameKey::Data(id));
        frame.pin_count = 1;
        frame.dirty = true;
        self.page_table.insert(FrameKey::Data(id), idx);
        Ok((id, &mut frame.data))
    }

    /// Delete `id`. Callable only when its pin count is at most 1 (the
    /// caller's own pin); never flushes the freed bytes (spec.md §5).
    pub fn delete_page(&mut self, id: PageId) -> DbResult<()> {
        let key = FrameKey::Data(id);
        if let Some(&idx) = self.page_table.get(&key) {
            let pin_count = self.frames[idx].pin_count;
            if pin_count > 1 {
                return Err(DbError::InvariantViolation(format!(
                    "cannot delete page {} while pinned {pin_count} times",
                    id.0
                )));
            }
            if self.replacer.contains(idx) {
                self.replacer.pin(idx);
            }
            self.page_table.remove(&key);
            let frame = &mut self.frames[idx];
            frame.key = None;
            frame.dirty = false;
            frame.pin_count = 0;
            self.free_list.push(idx);
        }
        self.deallocate_logical_page(id)
    }

    /// Write `id`'s bytes to disk if resident and dirty, clearing dirty.
    pub fn flush(&mut self, id: PageId) -> DbResult<()> {
        let key = FrameKey::Data(id);
        if let Some(&idx) = self.page_table.get(&key) {
            let frame = &mut self.frames[idx];
            if frame.dirty {
                self.disk.write_page(id, &frame.data)?;
                frame.dirty = false;
            }
        }
        Ok(())
    }

    fn flush_bitmap(&mut self, extent: u32) -> DbResult<()> {
        if let Some(&idx) = self.page_table.get(&FrameKey::Bitmap(extent)) {
            let frame = &mut self.frames[idx];
            if frame.dirty {
                let physical = self.disk.physical_of_bitmap(extent);
                self.disk.write_physical_page(physical, &frame.data)?;
                frame.dirty = false;
            }
        }
        Ok(())
    }

    /// Flush every resident dirty page, including bitmap extents. Called
    /// on DDL commit and engine shutdown (spec.md §5) — there is no
    /// automatic flushing otherwise.
    pub fn flush_all(&mut self) -> DbResult<()> {
        let keys: Vec<FrameKey> = self.page_table.keys().copied().collect();
        for key in keys {
            match key {
                FrameKey::Data(id) => self.flush(id)?,
                FrameKey::Bitmap(extent) => self.flush_bitmap(extent)?,
            }
        }
        Ok(())
    }

    pub fn pin_count(&self, id: PageId) -> u32 {
        self.page_table
            .get(&FrameKey::Data(id))
            .map(|&idx| self.frames[idx].pin_count)
            .unwrap_or(0)
    }

    /// Whether `id`'s bitmap bit is clear. Checks a resident bitmap
    /// frame first, since it may be dirty with a mutation not yet
    /// flushed to disk; falls back to the disk manager's own read
    /// otherwise.
    pub fn is_page_free(&mut self, id: PageId) -> DbResult<bool> {
        let (extent, bit) = self.disk.extent_of(id.0);
        if let Some(&idx) = self.page_table.get(&FrameKey::Bitmap(extent)) {
            let view = BitmapView::new(&mut self.frames[idx].data);
            return Ok(!view.get_bit(bit));
        }
        self.disk.is_page_free(id)
    }
}

//! The disk manager: owns the single database file, translates logical
//! page ids to physical offsets through bitmap extents (spec.md §4.1).
//!
//! Layout: physical page 0 is the meta page. Every extent thereafter is
//! one bitmap page followed by `B` data pages, `B = bits_per_extent`. A
//! page's logical id is dense over the *data* page space only — callers
//! above this crate never see or fetch a bitmap page by logical id.
//!
//! This crate owns raw physical-offset arithmetic and direct file I/O
//! only. It does not scan or mutate bitmap bits itself (besides the
//! bootstrap write of the very first extent, before any pool exists to
//! own it): allocating and freeing a logical page means flipping a bit
//! in a bitmap page, and per spec.md §4.1 that mutation is driven by
//! whichever layer already owns a cache over this file — the `buffer`
//! pool — by fetching the bitmap page into a frame like any other page
//! and writing it back through the pool's normal eviction/flush path,
//! not through a second direct-file-handle path. See `buffer`'s
//! `BufferPool::new_page`/`delete_page`.

mod bitmap;
mod header;
mod meta;

pub use bitmap::{bits_per_extent, BitmapView, BITMAP_HEADER_LEN};
pub use header::{read_page_id, write_header, HEADER_LEN};
pub use meta::{MetaPage, MAGIC as META_MAGIC, META_LEN, VERSION as META_VERSION};

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use common::{DbError, DbResult, PageId};

pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Owns the single on-disk database file.
#[derive(Debug)]
pub struct DiskManager {
    file: File,
    page_size: usize,
}

impl DiskManager {
    /// Open (creating if absent) the database file at `path`. A brand
    /// new file gets an initialized meta page and first bitmap extent;
    /// an existing file's meta page is validated against `page_size`.
    pub fn open(path: &Path, page_size: usize) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let mut mgr = Self { file, page_size };
        if mgr.file_len()? == 0 {
            mgr.initialize()?;
        } else {
            let meta = mgr.read_meta()?;
            if meta.page_size as usize != page_size {
                return Err(DbError::Corruption(format!(
                    "database page size {} does not match configured {page_size}",
                    meta.page_size
                )));
            }
        }
        Ok(mgr)
    }

    /// Write the meta page and the first (empty) bitmap extent directly.
    /// There is no pool yet at this point in `open` for either to be
    /// fetched through — this is the one exception to "no direct disk
    /// I/O besides raw physical pages", and it happens exactly once per
    /// fresh database file.
    fn initialize(&mut self) -> DbResult<()> {
        let meta = MetaPage::new(self.page_size as u16);
        self.extend_to(1)?;
        self.write_meta(&meta)?;
        self.extend_to(2)?;
        let mut bitmap_buf = vec![0u8; self.page_size];
        bitmap::BitmapView::init(&mut bitmap_buf, PageId(0));
        self.write_physical_page(1, &bitmap_buf)?;
        Ok(())
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn file_len(&self) -> DbResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn num_physical_pages(&self) -> DbResult<u64> {
        Ok(self.file_len()? / self.page_size as u64)
    }

    fn extend_to(&mut self, physical_count: u64) -> DbResult<()> {
        let want = physical_count * self.page_size as u64;
        if self.file_len()? < want {
            self.file.set_len(want)?;
        }
        Ok(())
    }

    /// Direct file I/O: read a physical page's raw bytes.
    pub fn read_physical_page(&mut self, physical: u64) -> DbResult<Vec<u8>> {
        if physical >= self.num_physical_pages()? {
            return Err(DbError::InvalidPage(
                physical as u32,
                "page beyond end of file".into(),
            ));
        }
        let mut buf = vec![0u8; self.page_size];
        self.file.seek(SeekFrom::Start(physical * self.page_size as u64))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Direct file I/O: write a physical page's raw bytes, extending the
    /// file first if `physical` is past its current end.
    pub fn write_physical_page(&mut self, physical: u64, buf: &[u8]) -> DbResult<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        self.extend_to(physical + 1)?;
        self.file.seek(SeekFrom::Start(physical * self.page_size as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    pub fn read_meta(&mut self) -> DbResult<MetaPage> {
        let buf = self.read_physical_page(0)?;
        MetaPage::decode(&buf)
    }

    pub fn write_meta(&mut self, meta: &MetaPage) -> DbResult<()> {
        let mut buf = vec![0u8; self.page_size];
        meta.encode(&mut buf);
        self.write_physical_page(0, &buf)
    }

    pub fn bits_per_extent(&self) -> u32 {
        bitmap::bits_per_extent(self.page_size)
    }

    /// Physical offset of the bitmap page that heads extent `extent`.
    pub fn physical_of_bitmap(&self, extent: u32) -> u64 {
        1 + extent as u64 * (self.bits_per_extent() as u64 + 1)
    }

    fn physical_of_logical(&self, logical: u32) -> u64 {
        let b = self.bits_per_extent();
        let extent = logical / b;
        let intra = logical % b;
        self.physical_of_bitmap(extent) + 1 + intra as u64
    }

    /// Split a logical page id into its `(extent, bit)` coordinates.
    pub fn extent_of(&self, logical: u32) -> (u32, u32) {
        let b = self.bits_per_extent();
        (logical / b, logical % b)
    }

    /// Read a bitmap page's bytes, treating one that hasn't been written
    /// to the file yet as a fresh all-free extent. A pure read — used
    /// only by [`Self::is_page_free`], which is a convenience query, not
    /// a maintenance path.
    fn read_or_init_bitmap(&mut self, extent: u32) -> DbResult<Vec<u8>> {
        let physical = self.physical_of_bitmap(extent);
        if physical >= self.num_physical_pages()? {
            let mut buf = vec![0u8; self.page_size];
            bitmap::BitmapView::init(&mut buf, PageId(extent));
            return Ok(buf);
        }
        self.read_physical_page(physical)
    }

    /// Whether `id`'s bitmap bit is clear, reading straight from disk.
    /// Callers that hold a buffer pool should prefer its
    /// `BufferPool::is_page_free`, which also sees a bitmap extent
    /// that's resident and dirty in a frame but not yet flushed here.
    pub fn is_page_free(&mut self, id: PageId) -> DbResult<bool> {
        let (extent, bit) = self.extent_of(id.0);
        let mut buf = self.read_or_init_bitmap(extent)?;
        let view = bitmap::BitmapView::new(&mut buf);
        Ok(!view.get_bit(bit))
    }

    /// Direct file I/O: read a data page's raw bytes by logical id.
    pub fn read_page(&mut self, id: PageId) -> DbResult<Vec<u8>> {
        let physical = self.physical_of_logical(id.0);
        self.read_physical_page(physical)
    }

    /// Direct file I/O: write a data page's raw bytes by logical id.
    pub fn write_page(&mut self, id: PageId, buf: &[u8]) -> DbResult<()> {
        let physical = self.physical_of_logical(id.0);
        self.write_physical_page(physical, buf)
    }
}

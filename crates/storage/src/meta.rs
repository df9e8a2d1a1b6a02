//! The meta page (logical/physical page 0): file header, page size, and
//! the catalog/bitmap root pointers (spec.md §3, §6).

use common::codec::{Decoder, Encoder};
use common::{DbError, DbResult, PageId};

/// `"MNSQ"` in ASCII, little-endian as a `u32` (spec.md §6).
pub const MAGIC: u32 = 0x4D4E_5351;
pub const VERSION: u16 = 1;

/// The meta page's fixed fields, exactly as spec.md §6 pins them: magic
/// (4 bytes), version (2), page size (2), catalog root page id (4),
/// first-bitmap page id (4, always 1). 16 bytes total; the meta page
/// carries no generic page header (it has no logical id of its own to
/// store — it is always physical/logical page 0).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetaPage {
    pub page_size: u16,
    /// `None` until the engine creates the catalog's first page.
    pub catalog_root: Option<PageId>,
    pub first_bitmap_id: u32,
}

pub const META_LEN: usize = 16;

impl MetaPage {
    pub fn new(page_size: u16) -> Self {
        Self {
            page_size,
            catalog_root: None,
            first_bitmap_id: 1,
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        let mut enc = Encoder::with_capacity(META_LEN);
        enc.put_u32(MAGIC);
        enc.put_u16(VERSION);
        enc.put_u16(self.page_size);
        enc.put_u32(self.catalog_root.map(|p| p.0).unwrap_or(u32::MAX));
        enc.put_u32(self.first_bitmap_id);
        let bytes = enc.into_vec();
        buf[..bytes.len()].copy_from_slice(&bytes);
    }

    pub fn decode(buf: &[u8]) -> DbResult<Self> {
        let mut dec = Decoder::new(buf);
        let magic = dec.get_u32()?;
        if magic != MAGIC {
            return Err(DbError::Corruption(format!(
                "bad meta page magic: {magic:#x}"
            )));
        }
        let version = dec.get_u16()?;
        if version != VERSION {
            return Err(DbError::Corruption(format!(
                "unsupported meta page version {version}"
            )));
        }
        let page_size = dec.get_u16()?;
        let catalog_root_raw = dec.get_u32()?;
        let first_bitmap_id = dec.get_u32()?;
        Ok(Self {
            page_size,
            catalog_root: if catalog_root_raw == u32::MAX {
                None
            } else {
                Some(PageId(catalog_root_raw))
            },
            first_bitmap_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_catalog_root() {
        let mut buf = vec![0u8; META_LEN];
        let mut meta = MetaPage::new(4096);
        meta.catalog_root = Some(PageId(7));
        meta.encode(&mut buf);
        let back = MetaPage::decode(&buf).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn round_trips_without_catalog_root() {
        let mut buf = vec![0u8; META_LEN];
        let meta = MetaPage::new(4096);
        meta.encode(&mut buf);
        let back = MetaPage::decode(&buf).unwrap();
        assert_eq!(back.catalog_root, None);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; META_LEN];
        assert!(matches!(MetaPage::decode(&buf), Err(DbError::Corruption(_))));
    }
}

//! Shared identifiers, error taxonomy, and configuration for the MiniSQL
//! storage core.
//!
//! Every crate in this workspace speaks `DbError`/`DbResult` at its public
//! boundary (spec.md §7): lower layers never log, they return a kind, and
//! the caller (here: the `engine` facade, standing in for the executor)
//! decides what to do with it.

use std::path::PathBuf;
use thiserror::Error;

/// Logical page identifier. Dense, non-negative, stable for the lifetime
/// of the page (spec.md §2.1).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct PageId(pub u32);

impl PageId {
    pub const INVALID: PageId = PageId(u32::MAX);
}

/// Identifier for a table registered in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TableId(pub u32);

/// Identifier for an index registered in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct IndexId(pub u32);

/// Ordinal position of a column within a schema. Schemas are capped at 32
/// fields (spec.md §3), so a byte is ample.
pub type ColumnId = u8;

/// A stable `(page_id, slot)` pair identifying one tuple for the life of
/// its insertion (spec.md §3, GLOSSARY). Packs into 64 bits with the page
/// id in the high 32 bits and the slot in the low 32.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RowId {
    pub page_id: PageId,
    pub slot: u32,
}

impl RowId {
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    pub fn to_u64(self) -> u64 {
        ((self.page_id.0 as u64) << 32) | self.slot as u64
    }

    pub fn from_u64(bits: u64) -> Self {
        Self {
            page_id: PageId((bits >> 32) as u32),
            slot: bits as u32,
        }
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_id.0, self.slot)
    }
}

/// Canonical error taxonomy shared across storage/buffer/heap/btree/catalog
/// (spec.md §7).
#[derive(Error, Debug)]
pub enum DbError {
    /// Disk read/write or file-open failure. Surfaced to the top; the
    /// engine enters a read-only degraded state until reopened.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Reading a page whose bitmap bit is clear. A programmer error: the
    /// caller asked for a page that was never allocated.
    #[error("invalid page {0}: {1}")]
    InvalidPage(u32, String),

    /// A frame's pin count would go negative.
    #[error("double unpin on page {0}")]
    DoubleUnpin(u32),

    /// Every frame is pinned and a victim is needed. Back pressure, not
    /// fatal: the caller may retry after releasing pins.
    #[error("buffer pool exhausted: all frames pinned")]
    OutOfFrames,

    /// A unique index already holds an entry for this key.
    #[error("duplicate key")]
    DuplicateKey,

    /// A lookup, delete, or index removal found nothing to act on.
    #[error("not found")]
    NotFound,

    /// A row violates its schema: type/length mismatch, null in a
    /// non-nullable column, or a primary-key duplicate at the row level.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// An internal structural invariant does not hold. Abort the current
    /// operation without mutating further state.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Bad magic, impossible slot offset, or otherwise unreadable bytes.
    /// Fatal for the table/index involved.
    #[error("corruption: {0}")]
    Corruption(String),

    /// Catalog-level error: unknown table/column/index, duplicate name.
    #[error("catalog: {0}")]
    Catalog(String),

    /// Generic storage-layer failure not covered by a more specific kind.
    #[error("storage: {0}")]
    Storage(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the storage core.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .page_size(4096)
///     .buffer_pool_pages(64)
///     .build();
/// ```
#[derive(Clone, Debug, bon::Builder)]
pub struct Config {
    /// Directory holding the single database file.
    #[builder(default = PathBuf::from("./minisql_data"))]
    pub data_dir: PathBuf,
    /// Fixed page size in bytes (spec.md §3 default 4096).
    #[builder(default = 4096)]
    pub page_size: usize,
    /// Number of frames in the buffer pool (spec.md §4.2 default 64).
    #[builder(default = 64)]
    pub buffer_pool_pages: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./minisql_data"),
            page_size: 4096,
            buffer_pool_pages: 64,
        }
    }
}

pub mod codec;

#[cfg(test)]
mod tests;

//! Binary encode/decode for one table entry, per spec.md §6's catalog
//! page format: magic, table id, name, columns, heap head, indexes.
//!
//! One deliberate departure from the spec prose: §6 describes a single
//! "column ordinal" per index record, but §3's index model is a
//! "key-column ordinal list" to support composite keys. This module
//! persists a count-prefixed list of ordinals instead of one ordinal;
//! see DESIGN.md for the resolution.

use common::codec::{Decoder, Encoder};
use common::{ColumnId, DbError, DbResult, PageId, TableId};
use types::SqlType;

use crate::{Column, IndexMeta, TableMeta, TableSchema};

/// Marks the start of a table entry (spec.md §6).
pub const TABLE_ENTRY_MAGIC: u32 = 0x0202_0202;

const NULLABLE: u8 = 1 << 0;
const UNIQUE: u8 = 1 << 1;
const PRIMARY_KEY: u8 = 1 << 2;

fn column_flags(c: &Column) -> u8 {
    let mut flags = 0u8;
    if c.nullable {
        flags |= NULLABLE;
    }
    if c.unique {
        flags |= UNIQUE;
    }
    if c.primary_key {
        flags |= PRIMARY_KEY;
    }
    flags
}

pub fn encode_table_entry(table: &TableMeta, enc: &mut Encoder) -> DbResult<()> {
    enc.put_u32(TABLE_ENTRY_MAGIC);
    enc.put_u32(table.id.0);
    enc.put_bytes(table.name.as_bytes());
    enc.put_u8(table.schema.columns.len() as u8);
    for column in &table.schema.columns {
        enc.put_bytes(column.name.as_bytes());
        enc.put_u8(column.ty.type_code());
        let length = match column.ty {
            SqlType::Char(n) => n,
            _ => 0,
        };
        enc.put_u8(length);
        enc.put_u8(column_flags(column));
    }
    enc.put_u32(table.heap_head.0);
    enc.put_u32(table.indexes.len() as u32);
    for index in &table.indexes {
        enc.put_bytes(index.name.as_bytes());
        enc.put_u8(index.columns.len() as u8);
        for &ordinal in &index.columns {
            enc.put_u8(ordinal);
        }
        enc.put_u32(index.root.0);
        enc.put_u8(index.unique as u8);
    }
    Ok(())
}

pub fn decode_table_entry(dec: &mut Decoder<'_>) -> DbResult<TableMeta> {
    let magic = dec.get_u32()?;
    if magic != TABLE_ENTRY_MAGIC {
        return Err(DbError::Corruption(format!(
            "bad table entry magic {magic:#010x}"
        )));
    }
    let id = TableId(dec.get_u32()?);
    let name = String::from_utf8_lossy(dec.get_bytes()?).into_owned();
    let column_count = dec.get_u8()?;
    let mut columns = Vec::with_capacity(column_count as usize);
    for _ in 0..column_count {
        let col_name = String::from_utf8_lossy(dec.get_bytes()?).into_owned();
        let type_code = dec.get_u8()?;
        let length = dec.get_u8()?;
        let ty = SqlType::from_code(type_code, length)?;
        let flags = dec.get_u8()?;
        columns.push(Column {
            name: col_name,
            ty,
            nullable: flags & NULLABLE != 0,
            unique: flags & UNIQUE != 0,
            primary_key: flags & PRIMARY_KEY != 0,
        });
    }
    let schema = TableSchema::try_new(columns)?;
    let heap_head = PageId(dec.get_u32()?);
    let index_count = dec.get_u32()?;
    let mut indexes = Vec::with_capacity(index_count as usize);
    for _ in 0..index_count {
        let index_name = String::from_utf8_lossy(dec.get_bytes()?).into_owned();
        let key_count = dec.get_u8()?;
        let mut key_columns: Vec<ColumnId> = Vec::with_capacity(key_count as usize);
        for _ in 0..key_count {
            key_columns.push(dec.get_u8()?);
        }
        let root = PageId(dec.get_u32()?);
        let unique = dec.get_u8()? != 0;
        indexes.push(IndexMeta {
            id: common::IndexId(0), // reassigned by the caller once every entry is loaded
            name: index_name,
            columns: key_columns,
            root,
            unique,
        });
    }
    Ok(TableMeta::from_parts(id, name, schema, heap_head, indexes))
}

//! The field types and typed values the storage core persists.
//!
//! spec.md §3: "Field types: `INT` (32-bit signed), `FLOAT` (IEEE-754
//! 32-bit), `CHAR(n)` (n-byte, NUL-padded, 1 ≤ n ≤ 255)." A key
//! comparison proceeds field-by-field with NULLs sorting first and
//! `CHAR` compared as unsigned bytes up to its declared length (§4.4).

use std::cmp::Ordering;

use common::codec::{Decoder, Encoder};
use common::{DbError, DbResult};

/// The declared type of a column. `Char`'s payload is its fixed length in
/// bytes (1..=255, spec.md §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SqlType {
    Int,
    Float,
    Char(u8),
}

impl SqlType {
    pub fn type_code(&self) -> u8 {
        match self {
            SqlType::Int => 1,
            SqlType::Float => 2,
            SqlType::Char(_) => 3,
        }
    }

    pub fn from_code(code: u8, length: u8) -> DbResult<Self> {
        match code {
            1 => Ok(SqlType::Int),
            2 => Ok(SqlType::Float),
            3 => Ok(SqlType::Char(length)),
            other => Err(DbError::Corruption(format!("unknown type code {other}"))),
        }
    }

    /// Length in bytes needed when a row of this type is not null:
    /// 4 for `INT`/`FLOAT`, `n` for `CHAR(n)`.
    pub fn encoded_len(&self) -> usize {
        match self {
            SqlType::Int | SqlType::Float => 4,
            SqlType::Char(n) => *n as usize,
        }
    }
}

/// A typed field value. `Char` always holds exactly its column's declared
/// length in bytes, NUL-padded or truncated at construction time — never
/// a variable-length Rust `String` — so byte-wise comparison and on-disk
/// encoding agree by construction.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Int(i32),
    Float(f32),
    Char(Vec<u8>),
    Null,
}

impl Value {
    /// Build a `CHAR(len)` value, NUL-padding or truncating `s`'s bytes to
    /// exactly `len`.
    pub fn char_padded(s: &str, len: u8) -> Self {
        let mut bytes = vec![0u8; len as usize];
        let src = s.as_bytes();
        let n = src.len().min(len as usize);
        bytes[..n].copy_from_slice(&src[..n]);
        Value::Char(bytes)
    }

    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            Value::Int(_) => Some(SqlType::Int),
            Value::Float(_) => Some(SqlType::Float),
            Value::Char(b) => Some(SqlType::Char(b.len() as u8)),
            Value::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render a `CHAR` value's bytes as a `String`, trimming trailing NUL
    /// padding. Returns `None` for non-`Char` values.
    pub fn as_char_str(&self) -> Option<String> {
        match self {
            Value::Char(bytes) => {
                let trimmed = match bytes.iter().position(|&b| b == 0) {
                    Some(idx) => &bytes[..idx],
                    None => &bytes[..],
                };
                Some(String::from_utf8_lossy(trimmed).into_owned())
            }
            _ => None,
        }
    }

    /// Total ordering used by the B+Tree comparator: NULL sorts first
    /// (spec.md §4.4), then same-typed values compare structurally, and
    /// `CHAR` compares as unsigned bytes up to its declared length.
    pub fn cmp_key(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Char(a), Value::Char(b)) => a.cmp(b),
            // Mixed non-null types never arise within one column's
            // values in a well-formed schema; order by type code so the
            // comparator stays total.
            (a, b) => a
                .sql_type()
                .map(|t| t.type_code())
                .cmp(&b.sql_type().map(|t| t.type_code())),
        }
    }

    /// Encode this value's bytes (no null marker — callers track
    /// nullability via the row's null bitmap, spec.md §3).
    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Value::Int(v) => {
                enc.put_i32(*v);
            }
            Value::Float(v) => {
                enc.put_f32(*v);
            }
            Value::Char(bytes) => {
                enc.put_raw(bytes);
            }
            Value::Null => {}
        }
    }

    /// Decode a non-null value of the given type from `dec`.
    pub fn decode(dec: &mut Decoder<'_>, ty: &SqlType) -> DbResult<Self> {
        Ok(match ty {
            SqlType::Int => Value::Int(dec.get_i32()?),
            SqlType::Float => Value::Float(dec.get_f32()?),
            SqlType::Char(n) => Value::Char(dec.get_raw(*n as usize)?.to_vec()),
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_key(other) == Ordering::Equal
    }
}
impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp_key(other))
    }
}
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key(other)
    }
}

/// Compares two composite keys field-by-field, per spec.md §4.4.
pub fn cmp_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.cmp_key(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// A tuple of typed field values, in schema column order.
///
/// On-disk form (spec.md §3): a null-bitmap followed by each non-null
/// field's bytes in declared order. A schema has at most 32 columns, so
/// the bitmap is a fixed 4 bytes regardless of column count.
#[derive(Clone, Debug, PartialEq)]
pub struct Row(pub Vec<Value>);

/// Schemas are capped at 32 fields (spec.md §3); a `u32` bitmap covers
/// every column with room to spare.
pub const MAX_FIELDS: usize = 32;

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn fields(&self) -> &[Value] {
        &self.0
    }

    /// Encode this row as a null-bitmap (4 bytes, bit `i` set ⇒ field `i`
    /// is null) followed by each non-null field's bytes in order.
    pub fn encode(&self, enc: &mut Encoder) -> DbResult<()> {
        if self.0.len() > MAX_FIELDS {
            return Err(DbError::SchemaViolation(format!(
                "row has {} fields, max is {MAX_FIELDS}",
                self.0.len()
            )));
        }
        let mut bitmap: u32 = 0;
        for (i, v) in self.0.iter().enumerate() {
            if v.is_null() {
                bitmap |= 1 << i;
            }
        }
        enc.put_u32(bitmap);
        for v in &self.0 {
            if !v.is_null() {
                v.encode(enc);
            }
        }
        Ok(())
    }

    /// Decode a row given the column types declared by the schema. Column
    /// count comes from `col_types.len()`, not from the bytes themselves —
    /// the null bitmap alone can't tell a decoder how many fields a row
    /// has, since trailing nulls set no "there is a field here" marker.
    pub fn decode(dec: &mut Decoder<'_>, col_types: &[SqlType]) -> DbResult<Self> {
        if col_types.len() > MAX_FIELDS {
            return Err(DbError::SchemaViolation(format!(
                "schema has {} columns, max is {MAX_FIELDS}",
                col_types.len()
            )));
        }
        let bitmap = dec.get_u32()?;
        let mut values = Vec::with_capacity(col_types.len());
        for (i, ty) in col_types.iter().enumerate() {
            if bitmap & (1 << i) != 0 {
                values.push(Value::Null);
            } else {
                values.push(Value::decode(dec, ty)?);
            }
        }
        Ok(Row(values))
    }

    /// Byte length this row would occupy once encoded, without actually
    /// encoding it — used by the heap to decide whether a tuple fits
    /// before paying for an allocation.
    pub fn encoded_len(&self) -> usize {
        4 + self
            .0
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| v.sql_type().map(|t| t.encoded_len()).unwrap_or(0))
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn null_sorts_before_everything() {
        assert_eq!(Value::Null.cmp_key(&Value::Int(i32::MIN)), Ordering::Less);
        assert_eq!(Value::Int(0).cmp_key(&Value::Null), Ordering::Greater);
        assert_eq!(Value::Null.cmp_key(&Value::Null), Ordering::Equal);
    }

    #[test]
    fn char_padding_is_nul_and_fixed_length() {
        let v = Value::char_padded("ab", 8);
        match &v {
            Value::Char(bytes) => {
                assert_eq!(bytes.len(), 8);
                assert_eq!(&bytes[..2], b"ab");
                assert!(bytes[2..].iter().all(|&b| b == 0));
            }
            _ => panic!("expected Char"),
        }
        assert_eq!(v.as_char_str().unwrap(), "ab");
    }

    #[test]
    fn char_truncates_when_longer_than_declared_length() {
        let v = Value::char_padded("abcdef", 3);
        assert_eq!(v.as_char_str().unwrap(), "abc");
    }

    #[test]
    fn char_compares_as_unsigned_bytes() {
        let short = Value::char_padded("a", 4);
        let long = Value::char_padded("ab", 4);
        assert_eq!(short.cmp_key(&long), Ordering::Less);
    }

    #[test]
    fn cmp_keys_is_field_by_field() {
        let a = vec![Value::Int(1), Value::char_padded("x", 4)];
        let b = vec![Value::Int(1), Value::char_padded("y", 4)];
        assert_eq!(cmp_keys(&a, &b), Ordering::Less);
    }

    #[test]
    fn encode_decode_round_trip_int_and_float() {
        let mut enc = Encoder::new();
        Value::Int(-7).encode(&mut enc);
        let bytes = enc.into_vec();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(Value::decode(&mut dec, &SqlType::Int).unwrap(), Value::Int(-7));

        let mut enc = Encoder::new();
        Value::Float(2.5).encode(&mut enc);
        let bytes = enc.into_vec();
        let mut dec = Decoder::new(&bytes);
        assert_eq!(
            Value::decode(&mut dec, &SqlType::Float).unwrap(),
            Value::Float(2.5)
        );
    }

    #[test]
    fn encode_decode_round_trip_char() {
        let v = Value::char_padded("hi", 5);
        let mut enc = Encoder::new();
        v.encode(&mut enc);
        let bytes = enc.into_vec();
        let mut dec = Decoder::new(&bytes);
        let back = Value::decode(&mut dec, &SqlType::Char(5)).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn row_round_trips_with_nulls() {
        let col_types = vec![SqlType::Int, SqlType::Char(4), SqlType::Float];
        let row = Row::new(vec![Value::Int(7), Value::Null, Value::Float(1.5)]);
        let mut enc = Encoder::new();
        row.encode(&mut enc).unwrap();
        let bytes = enc.into_vec();
        assert_eq!(bytes.len(), row.encoded_len());

        let mut dec = Decoder::new(&bytes);
        let back = Row::decode(&mut dec, &col_types).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn row_rejects_too_many_fields() {
        let values = vec![Value::Int(0); MAX_FIELDS + 1];
        let row = Row::new(values);
        let mut enc = Encoder::new();
        assert!(row.encode(&mut enc).is_err());
    }

    proptest! {
        #[test]
        fn order_is_antisymmetric(i in any::<i32>(), j in any::<i32>()) {
            let a = Value::Int(i);
            let b = Value::Int(j);
            assert_eq!(a.cmp_key(&b), b.cmp_key(&a).reverse());
        }

        #[test]
        fn eq_reflexive(val in any::<i32>()) {
            let v = Value::Int(val);
            assert_eq!(v.cmp_key(&v), Ordering::Equal);
        }
    }
}

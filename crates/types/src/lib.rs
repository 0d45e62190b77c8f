//! Column types, runtime values, and key comparison.
//!
//! Every value the engine stores is fixed width: a 4-byte little-endian
//! integer, a 4-byte IEEE float, or a zero-padded byte string of the column's
//! declared length. `Value` converts between the runtime and storage forms,
//! and `KeyComparator` compares two storage-form keys for a given column type.

use std::cmp::Ordering;
use std::fmt;

use common::{DbError, DbResult};
use serde::{Deserialize, Serialize};

/// Supported column types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColType {
    Int,
    Float,
    Str,
}

impl fmt::Display for ColType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColType::Int => write!(f, "INT"),
            ColType::Float => write!(f, "FLOAT"),
            ColType::Str => write!(f, "STRING"),
        }
    }
}

/// A runtime value, as produced by the SQL front-end.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Str(String),
}

impl Value {
    pub fn col_type(&self) -> ColType {
        match self {
            Value::Int(_) => ColType::Int,
            Value::Float(_) => ColType::Float,
            Value::Str(_) => ColType::Str,
        }
    }

    /// Encode into the fixed-width storage form of a column of length `len`.
    ///
    /// Strings shorter than `len` are zero-padded on the right; longer ones
    /// fail with `StringOverflow`.
    pub fn to_storage(&self, len: usize) -> DbResult<Vec<u8>> {
        match self {
            Value::Int(v) => {
                debug_assert_eq!(len, 4);
                Ok(v.to_le_bytes().to_vec())
            }
            Value::Float(v) => {
                debug_assert_eq!(len, 4);
                Ok(v.to_le_bytes().to_vec())
            }
            Value::Str(s) => {
                if s.len() > len {
                    return Err(DbError::StringOverflow);
                }
                let mut buf = vec![0u8; len];
                buf[..s.len()].copy_from_slice(s.as_bytes());
                Ok(buf)
            }
        }
    }

    /// Decode a storage-form field back into a runtime value.
    ///
    /// String fields drop their zero padding.
    pub fn from_storage(ty: ColType, bytes: &[u8]) -> Value {
        match ty {
            ColType::Int => Value::Int(i32::from_le_bytes(bytes[..4].try_into().unwrap())),
            ColType::Float => Value::Float(f32::from_le_bytes(bytes[..4].try_into().unwrap())),
            ColType::Str => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Value::Str(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Compares storage-form keys for one column.
///
/// Selected once from the column's type and carried in the index handle, so
/// per-comparison dispatch is a single match on the tag.
#[derive(Clone, Copy, Debug)]
pub struct KeyComparator {
    ty: ColType,
    len: usize,
}

impl KeyComparator {
    pub fn new(ty: ColType, len: usize) -> Self {
        Self { ty, len }
    }

    pub fn col_type(&self) -> ColType {
        self.ty
    }

    pub fn key_len(&self) -> usize {
        self.len
    }

    /// Compare two keys in storage form.
    ///
    /// Ints compare natively, floats by IEEE partial order (any comparison
    /// against NaN lands on `Equal`), strings bytewise over the full column
    /// length.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.ty {
            ColType::Int => {
                let ia = i32::from_le_bytes(a[..4].try_into().unwrap());
                let ib = i32::from_le_bytes(b[..4].try_into().unwrap());
                ia.cmp(&ib)
            }
            ColType::Float => {
                let fa = f32::from_le_bytes(a[..4].try_into().unwrap());
                let fb = f32::from_le_bytes(b[..4].try_into().unwrap());
                fa.partial_cmp(&fb).unwrap_or(Ordering::Equal)
            }
            ColType::Str => a[..self.len].cmp(&b[..self.len]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cmp::Ordering::{Equal, Greater, Less};

    #[test]
    fn int_round_trip() {
        let raw = Value::Int(-42).to_storage(4).unwrap();
        assert_eq!(raw, (-42i32).to_le_bytes());
        assert_eq!(Value::from_storage(ColType::Int, &raw), Value::Int(-42));
    }

    #[test]
    fn string_is_zero_padded_and_trimmed() {
        let raw = Value::Str("ada".into()).to_storage(8).unwrap();
        assert_eq!(raw, b"ada\0\0\0\0\0");
        assert_eq!(
            Value::from_storage(ColType::Str, &raw),
            Value::Str("ada".into())
        );
    }

    #[test]
    fn oversized_string_is_rejected() {
        let err = Value::Str("too long".into()).to_storage(4).unwrap_err();
        assert!(matches!(err, DbError::StringOverflow));
    }

    #[test]
    fn comparator_orders_each_type() {
        let int_cmp = KeyComparator::new(ColType::Int, 4);
        assert_eq!(
            int_cmp.compare(&(-1i32).to_le_bytes(), &1i32.to_le_bytes()),
            Less
        );

        let float_cmp = KeyComparator::new(ColType::Float, 4);
        assert_eq!(
            float_cmp.compare(&2.5f32.to_le_bytes(), &0.5f32.to_le_bytes()),
            Greater
        );

        let str_cmp = KeyComparator::new(ColType::Str, 4);
        assert_eq!(str_cmp.compare(b"ab\0\0", b"ab\0\0"), Equal);
        assert_eq!(str_cmp.compare(b"ab\0\0", b"b\0\0\0"), Less);
    }

    #[test]
    fn nan_compares_equal_to_everything() {
        let cmp = KeyComparator::new(ColType::Float, 4);
        let nan = f32::NAN.to_le_bytes();
        assert_eq!(cmp.compare(&nan, &1.0f32.to_le_bytes()), Equal);
        assert_eq!(cmp.compare(&1.0f32.to_le_bytes(), &nan), Equal);
    }

    proptest! {
        #[test]
        fn int_comparator_matches_native(a in any::<i32>(), b in any::<i32>()) {
            let cmp = KeyComparator::new(ColType::Int, 4);
            prop_assert_eq!(cmp.compare(&a.to_le_bytes(), &b.to_le_bytes()), a.cmp(&b));
        }

        #[test]
        fn string_comparator_is_antisymmetric(a in "[a-z]{0,6}", b in "[a-z]{0,6}") {
            let cmp = KeyComparator::new(ColType::Str, 8);
            let ka = Value::Str(a).to_storage(8).unwrap();
            let kb = Value::Str(b).to_storage(8).unwrap();
            prop_assert_eq!(cmp.compare(&ka, &kb), cmp.compare(&kb, &ka).reverse());
        }

        #[test]
        fn storage_round_trip_int(v in any::<i32>()) {
            let raw = Value::Int(v).to_storage(4).unwrap();
            prop_assert_eq!(Value::from_storage(ColType::Int, &raw), Value::Int(v));
        }
    }
}

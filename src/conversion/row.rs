//! Row decoding traits and implementations.

use crate::conversion::FromWireValue;
use crate::error::{Error, Result};
use crate::protocol::backend::query::{DataRow, FieldDescription};
use crate::protocol::types::FormatCode;

/// Trait for decoding a PostgreSQL row into a Rust type.
///
/// Each column is decoded in the format the server reported for it in the
/// RowDescription, so the same impl serves simple queries (always text) and
/// batch statements (whatever result formats were requested).
pub trait FromRow<'a>: Sized {
    fn from_row(cols: &[FieldDescription<'_>], row: DataRow<'a>) -> Result<Self>;
}

/// Decode a single column value.
pub(crate) fn decode_column<'a, T: FromWireValue<'a>>(
    field: &FieldDescription<'_>,
    value: Option<&'a [u8]>,
) -> Result<T> {
    let decoded = match value {
        None => T::from_null(),
        Some(bytes) => match field.format() {
            FormatCode::Text => T::from_text(field.type_oid(), bytes),
            FormatCode::Binary => T::from_binary(field.type_oid(), bytes),
        },
    };
    decoded.map_err(|e| match e {
        Error::Decode(msg) => Error::Decode(format!("column \"{}\": {}", field.name, msg)),
        other => other,
    })
}

fn check_width(cols: &[FieldDescription<'_>], row: &DataRow<'_>, expected: usize) -> Result<()> {
    if cols.len() != expected || row.len() != expected {
        return Err(Error::Decode(format!(
            "row has {} columns, expected {}",
            row.len(),
            expected
        )));
    }
    Ok(())
}

// === Tuple implementations ===

/// Implementation for empty tuple - discards the row
impl FromRow<'_> for () {
    fn from_row(_cols: &[FieldDescription<'_>], _row: DataRow<'_>) -> Result<Self> {
        Ok(())
    }
}

macro_rules! impl_from_row_tuple {
    ($count:literal: $($idx:tt => $T:ident),+) => {
        impl<'a, $($T: FromWireValue<'a>),+> FromRow<'a> for ($($T,)+) {
            fn from_row(cols: &[FieldDescription<'_>], row: DataRow<'a>) -> Result<Self> {
                check_width(cols, &row, $count)?;
                let mut fields = cols.iter();
                let mut values = row.iter();
                Ok(($({
                    let (Some(field), Some(value)) = (fields.next(), values.next()) else {
                        return Err(Error::Decode(format!("missing column {}", $idx)));
                    };
                    decode_column::<$T>(field, value?)?
                },)+))
            }
        }
    };
}

impl_from_row_tuple!(1: 0 => T1);
impl_from_row_tuple!(2: 0 => T1, 1 => T2);
impl_from_row_tuple!(3: 0 => T1, 1 => T2, 2 => T3);
impl_from_row_tuple!(4: 0 => T1, 1 => T2, 2 => T3, 3 => T4);
impl_from_row_tuple!(5: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5);
impl_from_row_tuple!(6: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6);
impl_from_row_tuple!(7: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7);
impl_from_row_tuple!(8: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7, 7 => T8);
impl_from_row_tuple!(9: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7, 7 => T8, 8 => T9);
impl_from_row_tuple!(10: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7, 7 => T8, 8 => T9, 9 => T10);
impl_from_row_tuple!(11: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7, 7 => T8, 8 => T9, 9 => T10, 10 => T11);
impl_from_row_tuple!(12: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7, 7 => T8, 8 => T9, 9 => T10, 10 => T11, 11 => T12);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::backend::RowDescription;
    use crate::protocol::types::{Oid, oid};

    fn describe(cols: &[(&str, Oid, u16)]) -> Vec<u8> {
        let mut out = (cols.len() as u16).to_be_bytes().to_vec();
        for (name, type_oid, format) in cols {
            out.extend_from_slice(name.as_bytes());
            out.push(0);
            out.extend_from_slice(&[0; 6]);
            out.extend_from_slice(&type_oid.to_be_bytes());
            out.extend_from_slice(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
            out.extend_from_slice(&format.to_be_bytes());
        }
        out
    }

    fn data_row(values: &[Option<&[u8]>]) -> Vec<u8> {
        let mut out = (values.len() as u16).to_be_bytes().to_vec();
        for value in values {
            match value {
                Some(v) => {
                    out.extend_from_slice(&(v.len() as i32).to_be_bytes());
                    out.extend_from_slice(v);
                }
                None => out.extend_from_slice(&(-1_i32).to_be_bytes()),
            }
        }
        out
    }

    #[test]
    fn mixed_formats() {
        let desc = describe(&[("id", oid::INT4, 1), ("name", oid::TEXT, 0), ("n", oid::INT8, 0)]);
        let desc = RowDescription::parse(&desc).unwrap();
        let row = data_row(&[Some(&7_i32.to_be_bytes()), Some(b"q1"), None]);
        let row = DataRow::parse(&row).unwrap();

        let (id, name, n): (i32, &str, Option<i64>) = FromRow::from_row(desc.fields(), row).unwrap();
        assert_eq!((id, name, n), (7, "q1", None));
    }

    #[test]
    fn width_and_type_errors() {
        let desc = describe(&[("id", oid::INT4, 0)]);
        let desc = RowDescription::parse(&desc).unwrap();
        let row = data_row(&[Some(b"x")]);
        let row = DataRow::parse(&row).unwrap();

        assert!(<(i32, i32)>::from_row(desc.fields(), row).is_err());
        let err = <(i32,)>::from_row(desc.fields(), row).unwrap_err();
        assert!(err.to_string().contains("column \"id\""));
    }
}

//! Type encoding and decoding for PostgreSQL wire protocol.
//!
//! This module provides traits and implementations for converting between
//! Rust types and PostgreSQL wire format values. Every type speaks both the
//! text and the binary representation; the column's format code (or the
//! parameter format chosen at Bind time) decides which one is used.

pub mod array;
mod bytes;
mod primitives;
mod row;
mod string;

#[cfg(feature = "with-chrono")]
mod chrono;

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid};

pub use array::{Array, ArrayDimension, ArrayElement, ArrayStatus};
pub use row::FromRow;

/// Trait for decoding PostgreSQL values into Rust types.
///
/// This trait provides methods for decoding values from different formats:
/// - `from_null()` - Handle NULL values
/// - `from_text()` - Decode from text format
/// - `from_binary()` - Decode from binary format
///
/// The OID parameter allows implementations to check the PostgreSQL type
/// and reject incompatible types with clear error messages.
pub trait FromWireValue<'a>: Sized {
    /// Decode from NULL value.
    ///
    /// Default implementation returns an error. Override for types that can
    /// represent NULL (like `Option<T>`).
    fn from_null() -> Result<Self> {
        Err(Error::Decode("unexpected NULL value".into()))
    }

    /// Decode from text format bytes.
    fn from_text(oid: Oid, bytes: &'a [u8]) -> Result<Self>;

    /// Decode from binary format bytes.
    ///
    /// Binary format uses PostgreSQL's internal representation. Integers are
    /// big-endian, floats are IEEE 754, etc.
    fn from_binary(oid: Oid, bytes: &'a [u8]) -> Result<Self>;
}

/// Whether an encoder produced a value or a SQL NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsNull {
    Yes,
    No,
}

/// Trait for encoding Rust values as PostgreSQL parameters.
///
/// Encoders append only the payload; the 4-byte length prefix (or `-1` for
/// NULL) is written by [`write_value`].
pub trait ToWireValue {
    /// The OID this value naturally encodes to.
    ///
    /// For example, i64 naturally encodes to INT8 (OID 20).
    fn natural_oid(&self) -> Oid;

    /// Format used when the caller gave no hint for this parameter.
    fn preferred_format(&self, _target_oid: Oid) -> FormatCode {
        FormatCode::Binary
    }

    /// Append the binary representation for `target_oid`.
    ///
    /// An i64 can encode as INT2, INT4, or INT8 depending on what the server
    /// expects (with overflow checking).
    fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull>;

    /// Append the text representation for `target_oid`.
    fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull>;
}

/// Write a length-prefixed value in the given format.
pub fn write_value<T: ToWireValue + ?Sized>(
    value: &T,
    target_oid: Oid,
    format: FormatCode,
    buf: &mut Vec<u8>,
) -> Result<IsNull> {
    let start = buf.len();
    buf.extend_from_slice(&[0, 0, 0, 0]);
    let is_null = match format {
        FormatCode::Binary => value.encode_binary(target_oid, buf)?,
        FormatCode::Text => value.encode_text(target_oid, buf)?,
    };
    let len = match is_null {
        IsNull::Yes => {
            buf.truncate(start + 4);
            -1
        }
        IsNull::No => i32::try_from(buf.len() - start - 4)
            .map_err(|_| Error::Encode("value exceeds 2GB".into()))?,
    };
    if let Some(prefix) = buf.get_mut(start..start + 4) {
        prefix.copy_from_slice(&len.to_be_bytes());
    }
    Ok(is_null)
}

/// Trait for encoding a statement's parameter list.
pub trait ToParams {
    /// Number of parameters.
    fn param_count(&self) -> usize;

    /// Natural OIDs for all parameters, used when the caller declares none.
    fn natural_oids(&self) -> Vec<Oid>;

    /// Preferred format of each parameter for the given target OIDs.
    fn preferred_formats(&self, target_oids: &[Oid]) -> Vec<FormatCode>;

    /// Encode all parameters, each length-prefixed.
    ///
    /// `target_oids` and `formats` have `param_count()` entries.
    fn encode(&self, target_oids: &[Oid], formats: &[FormatCode], buf: &mut Vec<u8>)
    -> Result<()>;
}

pub(crate) fn utf8(bytes: &[u8]) -> Result<&str> {
    simdutf8::compat::from_utf8(bytes).map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))
}

fn param_at<T: Copy>(values: &[T], idx: usize) -> Result<T> {
    values
        .get(idx)
        .copied()
        .ok_or_else(|| Error::InvalidUsage(format!("missing type or format for parameter {}", idx + 1)))
}

// === Option<T> - NULL handling ===

impl<'a, T: FromWireValue<'a>> FromWireValue<'a> for Option<T> {
    fn from_null() -> Result<Self> {
        Ok(None)
    }

    fn from_text(oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        T::from_text(oid, bytes).map(Some)
    }

    fn from_binary(oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        T::from_binary(oid, bytes).map(Some)
    }
}

impl<T: ToWireValue> ToWireValue for Option<T> {
    fn natural_oid(&self) -> Oid {
        match self {
            Some(v) => v.natural_oid(),
            None => crate::protocol::types::oid::UNSPECIFIED,
        }
    }

    fn preferred_format(&self, target_oid: Oid) -> FormatCode {
        match self {
            Some(v) => v.preferred_format(target_oid),
            None => FormatCode::Binary,
        }
    }

    fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        match self {
            Some(v) => v.encode_binary(target_oid, buf),
            None => Ok(IsNull::Yes),
        }
    }

    fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        match self {
            Some(v) => v.encode_text(target_oid, buf),
            None => Ok(IsNull::Yes),
        }
    }
}

// === Reference and box support ===

macro_rules! forward_to_wire_value {
    ($($ty:ty),+) => {$(
        impl<T: ToWireValue + ?Sized> ToWireValue for $ty {
            fn natural_oid(&self) -> Oid {
                (**self).natural_oid()
            }

            fn preferred_format(&self, target_oid: Oid) -> FormatCode {
                (**self).preferred_format(target_oid)
            }

            fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
                (**self).encode_binary(target_oid, buf)
            }

            fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
                (**self).encode_text(target_oid, buf)
            }
        }
    )+};
}

forward_to_wire_value!(&T, Box<T>);

// === ToParams implementations ===

impl ToParams for () {
    fn param_count(&self) -> usize {
        0
    }

    fn natural_oids(&self) -> Vec<Oid> {
        vec![]
    }

    fn preferred_formats(&self, _target_oids: &[Oid]) -> Vec<FormatCode> {
        vec![]
    }

    fn encode(&self, _: &[Oid], _: &[FormatCode], _: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

impl<T: ToParams + ?Sized> ToParams for &T {
    fn param_count(&self) -> usize {
        (*self).param_count()
    }

    fn natural_oids(&self) -> Vec<Oid> {
        (*self).natural_oids()
    }

    fn preferred_formats(&self, target_oids: &[Oid]) -> Vec<FormatCode> {
        (*self).preferred_formats(target_oids)
    }

    fn encode(
        &self,
        target_oids: &[Oid],
        formats: &[FormatCode],
        buf: &mut Vec<u8>,
    ) -> Result<()> {
        (*self).encode(target_oids, formats, buf)
    }
}

/// Homogeneous parameter lists, including `Vec<Box<dyn ToWireValue>>`.
impl<T: ToWireValue> ToParams for [T] {
    fn param_count(&self) -> usize {
        self.len()
    }

    fn natural_oids(&self) -> Vec<Oid> {
        self.iter().map(ToWireValue::natural_oid).collect()
    }

    fn preferred_formats(&self, target_oids: &[Oid]) -> Vec<FormatCode> {
        self.iter()
            .zip(target_oids)
            .map(|(value, &oid)| value.preferred_format(oid))
            .collect()
    }

    fn encode(
        &self,
        target_oids: &[Oid],
        formats: &[FormatCode],
        buf: &mut Vec<u8>,
    ) -> Result<()> {
        for (idx, value) in self.iter().enumerate() {
            write_value(value, param_at(target_oids, idx)?, param_at(formats, idx)?, buf)?;
        }
        Ok(())
    }
}

impl<T: ToWireValue> ToParams for Vec<T> {
    fn param_count(&self) -> usize {
        self.as_slice().param_count()
    }

    fn natural_oids(&self) -> Vec<Oid> {
        self.as_slice().natural_oids()
    }

    fn preferred_formats(&self, target_oids: &[Oid]) -> Vec<FormatCode> {
        self.as_slice().preferred_formats(target_oids)
    }

    fn encode(
        &self,
        target_oids: &[Oid],
        formats: &[FormatCode],
        buf: &mut Vec<u8>,
    ) -> Result<()> {
        self.as_slice().encode(target_oids, formats, buf)
    }
}

// Tuple implementations via macro
macro_rules! impl_to_params {
    ($count:expr, $($idx:tt: $T:ident),+) => {
        impl<$($T: ToWireValue),+> ToParams for ($($T,)+) {
            fn param_count(&self) -> usize {
                $count
            }

            fn natural_oids(&self) -> Vec<Oid> {
                vec![$(self.$idx.natural_oid()),+]
            }

            fn preferred_formats(&self, target_oids: &[Oid]) -> Vec<FormatCode> {
                vec![$(
                    self.$idx.preferred_format(
                        target_oids.get($idx).copied().unwrap_or(self.$idx.natural_oid()),
                    )
                ),+]
            }

            fn encode(
                &self,
                target_oids: &[Oid],
                formats: &[FormatCode],
                buf: &mut Vec<u8>,
            ) -> Result<()> {
                $(
                    write_value(
                        &self.$idx,
                        param_at(target_oids, $idx)?,
                        param_at(formats, $idx)?,
                        buf,
                    )?;
                )+
                Ok(())
            }
        }
    };
}

impl_to_params!(1, 0: T0);
impl_to_params!(2, 0: T0, 1: T1);
impl_to_params!(3, 0: T0, 1: T1, 2: T2);
impl_to_params!(4, 0: T0, 1: T1, 2: T2, 3: T3);
impl_to_params!(5, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4);
impl_to_params!(6, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5);
impl_to_params!(7, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6);
impl_to_params!(8, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7);
impl_to_params!(9, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8);
impl_to_params!(10, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9);
impl_to_params!(11, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10);
impl_to_params!(12, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10, 11: T11);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;

    #[test]
    fn test_option_null() {
        assert_eq!(Option::<i32>::from_null().unwrap(), None);
        assert!(i32::from_null().is_err());
    }

    #[test]
    fn write_value_prefixes_length() {
        let mut buf = vec![0xAA];
        write_value(&5_i16, oid::INT2, FormatCode::Binary, &mut buf).unwrap();
        write_value(&None::<i32>, oid::INT4, FormatCode::Binary, &mut buf).unwrap();
        write_value(&"ab", oid::TEXT, FormatCode::Text, &mut buf).unwrap();
        assert_eq!(
            buf,
            [
                0xAA, 0, 0, 0, 2, 0, 5, //
                0xFF, 0xFF, 0xFF, 0xFF, //
                0, 0, 0, 2, b'a', b'b'
            ]
        );
    }

    #[test]
    fn boxed_params() {
        let params: Vec<Box<dyn ToWireValue + Send + Sync>> = vec![Box::new(1_i64), Box::new("x")];
        assert_eq!(params.natural_oids(), [oid::INT8, oid::TEXT]);
        let mut buf = Vec::new();
        params
            .encode(
                &[oid::INT8, oid::TEXT],
                &[FormatCode::Text, FormatCode::Text],
                &mut buf,
            )
            .unwrap();
        assert_eq!(buf, [0, 0, 0, 1, b'1', 0, 0, 0, 1, b'x']);
    }

    #[test]
    fn missing_oid_is_usage_error() {
        let mut buf = Vec::new();
        let err = (1_i32, 2_i32)
            .encode(&[oid::INT4], &[FormatCode::Binary, FormatCode::Binary], &mut buf)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
    }
}

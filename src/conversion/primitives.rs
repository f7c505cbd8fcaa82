//! Primitive type implementations (bool, integers, floats).

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid, oid};

use super::{FromWireValue, IsNull, ToWireValue, utf8};

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| Error::Decode(format!("invalid {} length: {}", what, bytes.len())))
}

fn parse_text<T: std::str::FromStr>(bytes: &[u8], what: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    utf8(bytes)?
        .parse()
        .map_err(|e| Error::Decode(format!("invalid {}: {}", what, e)))
}

fn write_display(value: impl std::fmt::Display, buf: &mut Vec<u8>) -> IsNull {
    use std::io::Write;
    // Writing into a Vec cannot fail.
    let _ = write!(buf, "{}", value);
    IsNull::No
}

// === Boolean ===

impl FromWireValue<'_> for bool {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::BOOL {
            return Err(Error::type_mismatch(oid::BOOL, oid));
        }
        match bytes {
            b"t" | b"true" | b"TRUE" | b"T" | b"1" => Ok(true),
            b"f" | b"false" | b"FALSE" | b"F" | b"0" => Ok(false),
            _ => Err(Error::Decode(format!(
                "invalid boolean: {:?}",
                String::from_utf8_lossy(bytes)
            ))),
        }
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::BOOL {
            return Err(Error::type_mismatch(oid::BOOL, oid));
        }
        let [byte] = fixed::<1>(bytes, "boolean")?;
        Ok(byte != 0)
    }
}

impl ToWireValue for bool {
    fn natural_oid(&self) -> Oid {
        oid::BOOL
    }

    fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        if target_oid != oid::BOOL {
            return Err(Error::type_mismatch(oid::BOOL, target_oid));
        }
        buf.push(u8::from(*self));
        Ok(IsNull::No)
    }

    fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        if target_oid != oid::BOOL {
            return Err(Error::type_mismatch(oid::BOOL, target_oid));
        }
        buf.push(if *self { b't' } else { b'f' });
        Ok(IsNull::No)
    }
}

// === Integer types ===

fn decode_int_binary(oid: Oid, bytes: &[u8]) -> Result<i64> {
    match oid {
        oid::INT2 => Ok(i64::from(i16::from_be_bytes(fixed(bytes, "int2")?))),
        oid::INT4 => Ok(i64::from(i32::from_be_bytes(fixed(bytes, "int4")?))),
        oid::INT8 => Ok(i64::from_be_bytes(fixed(bytes, "int8")?)),
        _ => Err(Error::type_mismatch(oid::INT8, oid)),
    }
}

/// Integer-valued numeric text such as `6` from `sum(bigint)`.
fn decode_int_text(oid: Oid, bytes: &[u8]) -> Result<i64> {
    match oid {
        oid::INT2 | oid::INT4 | oid::INT8 | oid::NUMERIC => parse_text(bytes, "integer"),
        _ => Err(Error::type_mismatch(oid::INT8, oid)),
    }
}

fn encode_int_binary(value: i64, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
    match target_oid {
        oid::INT2 => {
            let v = i16::try_from(value).map_err(|_| Error::overflow(&value.to_string(), "INT2"))?;
            buf.extend_from_slice(&v.to_be_bytes());
        }
        oid::INT4 => {
            let v = i32::try_from(value).map_err(|_| Error::overflow(&value.to_string(), "INT4"))?;
            buf.extend_from_slice(&v.to_be_bytes());
        }
        oid::INT8 => buf.extend_from_slice(&value.to_be_bytes()),
        _ => return Err(Error::type_mismatch(oid::INT8, target_oid)),
    }
    Ok(IsNull::No)
}

fn encode_int_text(value: i64, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
    match target_oid {
        oid::INT2 | oid::INT4 | oid::INT8 | oid::NUMERIC | oid::TEXT | oid::VARCHAR => {
            Ok(write_display(value, buf))
        }
        _ => Err(Error::type_mismatch(oid::INT8, target_oid)),
    }
}

macro_rules! impl_integer {
    ($ty:ty, $natural:expr, $name:literal) => {
        impl FromWireValue<'_> for $ty {
            fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
                let value = decode_int_text(oid, bytes)?;
                <$ty>::try_from(value).map_err(|_| Error::overflow(&value.to_string(), $name))
            }

            fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
                let value = decode_int_binary(oid, bytes)?;
                <$ty>::try_from(value).map_err(|_| Error::overflow(&value.to_string(), $name))
            }
        }

        impl ToWireValue for $ty {
            fn natural_oid(&self) -> Oid {
                $natural
            }

            fn preferred_format(&self, target_oid: Oid) -> FormatCode {
                match target_oid {
                    oid::INT2 | oid::INT4 | oid::INT8 => FormatCode::Binary,
                    _ => FormatCode::Text,
                }
            }

            fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
                encode_int_binary(i64::from(*self), target_oid, buf)
            }

            fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
                encode_int_text(i64::from(*self), target_oid, buf)
            }
        }
    };
}

impl_integer!(i16, oid::INT2, "i16");
impl_integer!(i32, oid::INT4, "i32");
impl_integer!(i64, oid::INT8, "i64");

// === Floating point ===

fn parse_float(bytes: &[u8]) -> Result<f64> {
    match bytes {
        b"Infinity" => Ok(f64::INFINITY),
        b"-Infinity" => Ok(f64::NEG_INFINITY),
        b"NaN" => Ok(f64::NAN),
        _ => parse_text(bytes, "float"),
    }
}

fn write_float(value: f64, buf: &mut Vec<u8>) -> IsNull {
    if value.is_nan() {
        buf.extend_from_slice(b"NaN");
        IsNull::No
    } else if value == f64::INFINITY {
        buf.extend_from_slice(b"Infinity");
        IsNull::No
    } else if value == f64::NEG_INFINITY {
        buf.extend_from_slice(b"-Infinity");
        IsNull::No
    } else {
        write_display(value, buf)
    }
}

impl FromWireValue<'_> for f32 {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::FLOAT4 {
            return Err(Error::type_mismatch(oid::FLOAT4, oid));
        }
        match bytes {
            b"Infinity" => Ok(f32::INFINITY),
            b"-Infinity" => Ok(f32::NEG_INFINITY),
            b"NaN" => Ok(f32::NAN),
            _ => parse_text(bytes, "float4"),
        }
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::FLOAT4 {
            return Err(Error::type_mismatch(oid::FLOAT4, oid));
        }
        Ok(f32::from_be_bytes(fixed(bytes, "float4")?))
    }
}

impl ToWireValue for f32 {
    fn natural_oid(&self) -> Oid {
        oid::FLOAT4
    }

    fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        match target_oid {
            oid::FLOAT4 => buf.extend_from_slice(&self.to_be_bytes()),
            oid::FLOAT8 => buf.extend_from_slice(&f64::from(*self).to_be_bytes()),
            _ => return Err(Error::type_mismatch(oid::FLOAT4, target_oid)),
        }
        Ok(IsNull::No)
    }

    fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        match target_oid {
            oid::FLOAT4 | oid::FLOAT8 | oid::NUMERIC => Ok(write_float(f64::from(*self), buf)),
            _ => Err(Error::type_mismatch(oid::FLOAT4, target_oid)),
        }
    }
}

impl FromWireValue<'_> for f64 {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        match oid {
            oid::FLOAT4 | oid::FLOAT8 => parse_float(bytes),
            _ => Err(Error::type_mismatch(oid::FLOAT8, oid)),
        }
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        match oid {
            oid::FLOAT4 => Ok(f64::from(f32::from_be_bytes(fixed(bytes, "float4")?))),
            oid::FLOAT8 => Ok(f64::from_be_bytes(fixed(bytes, "float8")?)),
            _ => Err(Error::type_mismatch(oid::FLOAT8, oid)),
        }
    }
}

impl ToWireValue for f64 {
    fn natural_oid(&self) -> Oid {
        oid::FLOAT8
    }

    fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        if target_oid != oid::FLOAT8 {
            return Err(Error::type_mismatch(oid::FLOAT8, target_oid));
        }
        buf.extend_from_slice(&self.to_be_bytes());
        Ok(IsNull::No)
    }

    fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        match target_oid {
            oid::FLOAT8 | oid::NUMERIC => Ok(write_float(*self, buf)),
            _ => Err(Error::type_mismatch(oid::FLOAT8, target_oid)),
        }
    }
}

//! Byte type implementations (`&[u8]`, `Vec<u8>`).

use crate::error::{Error, Result};
use crate::protocol::types::{Oid, oid};

use super::{FromWireValue, IsNull, ToWireValue};

impl<'a> FromWireValue<'a> for &'a [u8] {
    fn from_text(oid: Oid, _bytes: &'a [u8]) -> Result<Self> {
        if oid != oid::BYTEA {
            return Err(Error::type_mismatch(oid::BYTEA, oid));
        }
        Err(Error::Decode(
            "text-format bytea is hex encoded; decode into Vec<u8>".into(),
        ))
    }

    fn from_binary(oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        if oid != oid::BYTEA {
            return Err(Error::type_mismatch(oid::BYTEA, oid));
        }
        Ok(bytes)
    }
}

impl FromWireValue<'_> for Vec<u8> {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::BYTEA {
            return Err(Error::type_mismatch(oid::BYTEA, oid));
        }
        // Text format for bytea is hex-encoded: \xDEADBEEF
        match bytes.strip_prefix(b"\\x") {
            Some(hex) => decode_hex(hex),
            None => Err(Error::Decode("bytea text without \\x prefix".into())),
        }
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        <&[u8]>::from_binary(oid, bytes).map(<[u8]>::to_vec)
    }
}

impl ToWireValue for [u8] {
    fn natural_oid(&self) -> Oid {
        oid::BYTEA
    }

    fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        if target_oid != oid::BYTEA {
            return Err(Error::type_mismatch(oid::BYTEA, target_oid));
        }
        buf.extend_from_slice(self);
        Ok(IsNull::No)
    }

    fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        if target_oid != oid::BYTEA {
            return Err(Error::type_mismatch(oid::BYTEA, target_oid));
        }
        buf.reserve(2 + self.len() * 2);
        buf.extend_from_slice(b"\\x");
        for &b in self {
            buf.push(HEX[usize::from(b >> 4)]);
            buf.push(HEX[usize::from(b & 0x0f)]);
        }
        Ok(IsNull::No)
    }
}

impl ToWireValue for Vec<u8> {
    fn natural_oid(&self) -> Oid {
        oid::BYTEA
    }

    fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        self.as_slice().encode_binary(target_oid, buf)
    }

    fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        self.as_slice().encode_text(target_oid, buf)
    }
}

fn decode_hex(hex: &[u8]) -> Result<Vec<u8>> {
    let pairs = hex.chunks_exact(2);
    if !pairs.remainder().is_empty() {
        return Err(Error::Decode("invalid hex length".into()));
    }
    pairs
        .map(|pair| match *pair {
            [high, low] => Ok((hex_digit(high)? << 4) | hex_digit(low)?),
            _ => Err(Error::Decode("invalid hex length".into())),
        })
        .collect()
}

fn hex_digit(b: u8) -> Result<u8> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(Error::Decode(format!("invalid hex digit: {}", b as char))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytea_hex() {
        assert_eq!(
            Vec::<u8>::from_text(oid::BYTEA, b"\\xDEADBEEF").unwrap(),
            vec![0xDE, 0xAD, 0xBE, 0xEF]
        );
        assert!(Vec::<u8>::from_text(oid::BYTEA, b"\\xABC").is_err());
    }

    #[test]
    fn test_bytea_text_encode() {
        let mut buf = Vec::new();
        vec![0x00_u8, 0xff].encode_text(oid::BYTEA, &mut buf).unwrap();
        assert_eq!(buf, b"\\x00ff");
    }
}

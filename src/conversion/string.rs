//! String type implementations (&str, String).
//!
//! Text-like columns decode in either format. In text format any column can
//! be read as a string, since that is how the server rendered it.

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid, oid};

use super::{FromWireValue, IsNull, ToWireValue, utf8};

fn is_text_like(oid: Oid) -> bool {
    matches!(oid, oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME)
}

impl<'a> FromWireValue<'a> for &'a str {
    fn from_text(_oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        utf8(bytes)
    }

    fn from_binary(oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        if !is_text_like(oid) {
            return Err(Error::type_mismatch(oid::TEXT, oid));
        }
        utf8(bytes)
    }
}

impl FromWireValue<'_> for String {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        <&str>::from_text(oid, bytes).map(str::to_owned)
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        <&str>::from_binary(oid, bytes).map(str::to_owned)
    }
}

/// Strings bind to text-like types in binary and to anything else as a
/// literal the server parses.
impl ToWireValue for str {
    fn natural_oid(&self) -> Oid {
        oid::TEXT
    }

    fn preferred_format(&self, target_oid: Oid) -> FormatCode {
        if is_text_like(target_oid) {
            FormatCode::Binary
        } else {
            FormatCode::Text
        }
    }

    fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        if !is_text_like(target_oid) {
            return Err(Error::type_mismatch(oid::TEXT, target_oid));
        }
        buf.extend_from_slice(self.as_bytes());
        Ok(IsNull::No)
    }

    fn encode_text(&self, _target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        buf.extend_from_slice(self.as_bytes());
        Ok(IsNull::No)
    }
}

impl ToWireValue for String {
    fn natural_oid(&self) -> Oid {
        oid::TEXT
    }

    fn preferred_format(&self, target_oid: Oid) -> FormatCode {
        self.as_str().preferred_format(target_oid)
    }

    fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        self.as_str().encode_binary(target_oid, buf)
    }

    fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        self.as_str().encode_text(target_oid, buf)
    }
}

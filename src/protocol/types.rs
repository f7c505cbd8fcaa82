//! Common PostgreSQL wire protocol types.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// PostgreSQL Object Identifier (OID)
pub type Oid = u32;

/// Built-in type OIDs from `pg_type`.
pub mod oid {
    use super::Oid;

    /// Unspecified; lets the server infer the parameter type
    pub const UNSPECIFIED: Oid = 0;
    pub const BOOL: Oid = 16;
    pub const BYTEA: Oid = 17;
    pub const NAME: Oid = 19;
    pub const INT8: Oid = 20;
    pub const INT2: Oid = 21;
    pub const INT4: Oid = 23;
    pub const TEXT: Oid = 25;
    pub const OID: Oid = 26;
    pub const FLOAT4: Oid = 700;
    pub const FLOAT8: Oid = 701;
    pub const BPCHAR: Oid = 1042;
    pub const VARCHAR: Oid = 1043;
    pub const DATE: Oid = 1082;
    pub const TIME: Oid = 1083;
    pub const TIMESTAMP: Oid = 1114;
    pub const TIMESTAMPTZ: Oid = 1184;
    pub const NUMERIC: Oid = 1700;
    pub const UUID: Oid = 2950;

    pub const BOOL_ARRAY: Oid = 1000;
    pub const BYTEA_ARRAY: Oid = 1001;
    pub const NAME_ARRAY: Oid = 1003;
    pub const INT2_ARRAY: Oid = 1005;
    pub const INT4_ARRAY: Oid = 1007;
    pub const TEXT_ARRAY: Oid = 1009;
    pub const BPCHAR_ARRAY: Oid = 1014;
    pub const VARCHAR_ARRAY: Oid = 1015;
    pub const INT8_ARRAY: Oid = 1016;
    pub const FLOAT4_ARRAY: Oid = 1021;
    pub const FLOAT8_ARRAY: Oid = 1022;
    pub const OID_ARRAY: Oid = 1028;
    pub const TIMESTAMP_ARRAY: Oid = 1115;
    pub const DATE_ARRAY: Oid = 1182;
    pub const TIME_ARRAY: Oid = 1183;
    pub const TIMESTAMPTZ_ARRAY: Oid = 1185;
    pub const NUMERIC_ARRAY: Oid = 1231;
    pub const UUID_ARRAY: Oid = 2951;

    const ARRAYS: [(Oid, Oid); 18] = [
        (BOOL_ARRAY, BOOL),
        (BYTEA_ARRAY, BYTEA),
        (NAME_ARRAY, NAME),
        (INT2_ARRAY, INT2),
        (INT4_ARRAY, INT4),
        (TEXT_ARRAY, TEXT),
        (BPCHAR_ARRAY, BPCHAR),
        (VARCHAR_ARRAY, VARCHAR),
        (INT8_ARRAY, INT8),
        (FLOAT4_ARRAY, FLOAT4),
        (FLOAT8_ARRAY, FLOAT8),
        (OID_ARRAY, OID),
        (TIMESTAMP_ARRAY, TIMESTAMP),
        (DATE_ARRAY, DATE),
        (TIME_ARRAY, TIME),
        (TIMESTAMPTZ_ARRAY, TIMESTAMPTZ),
        (NUMERIC_ARRAY, NUMERIC),
        (UUID_ARRAY, UUID),
    ];

    /// Element type of a built-in array type.
    pub fn array_element(array_oid: Oid) -> Option<Oid> {
        ARRAYS
            .iter()
            .find(|(array, _)| *array == array_oid)
            .map(|(_, element)| *element)
    }

    /// Array type whose elements are `element_oid`.
    pub fn array_of(element_oid: Oid) -> Option<Oid> {
        ARRAYS
            .iter()
            .find(|(_, element)| *element == element_oid)
            .map(|(array, _)| *array)
    }
}

/// Data format code in PostgreSQL protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum FormatCode {
    /// Text format (human-readable)
    #[default]
    Text = 0,
    /// Binary format (type-specific packed representation)
    Binary = 1,
}

impl FormatCode {
    /// Create a FormatCode from a raw u16 value.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => FormatCode::Text,
            1 => FormatCode::Binary,
            _ => FormatCode::Text, // Default to text for unknown values
        }
    }
}

impl From<u16> for FormatCode {
    fn from(value: u16) -> Self {
        Self::from_u16(value)
    }
}

/// Transaction status indicator from ReadyForQuery message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Idle (not in transaction block)
    #[default]
    Idle = b'I',
    /// In transaction block
    InTransaction = b'T',
    /// In failed transaction block (queries will be rejected until rollback)
    Failed = b'E',
}

impl TransactionStatus {
    /// Create a TransactionStatus from a raw byte value.
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            b'I' => Some(TransactionStatus::Idle),
            b'T' => Some(TransactionStatus::InTransaction),
            b'E' => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    /// Returns true if currently in a transaction (either active or failed).
    pub fn in_transaction(self) -> bool {
        matches!(self, TransactionStatus::InTransaction | TransactionStatus::Failed)
    }

    /// Returns true if the transaction has failed.
    pub fn is_failed(self) -> bool {
        matches!(self, TransactionStatus::Failed)
    }
}

/// Big-endian 16-bit unsigned integer for zerocopy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct U16BE([u8; 2]);

impl U16BE {
    /// Create a new U16BE from a native u16.
    pub const fn new(value: u16) -> Self {
        Self(value.to_be_bytes())
    }

    /// Get the native u16 value.
    pub const fn get(self) -> u16 {
        u16::from_be_bytes(self.0)
    }
}

impl From<u16> for U16BE {
    fn from(value: u16) -> Self {
        Self::new(value)
    }
}

impl From<U16BE> for u16 {
    fn from(value: U16BE) -> Self {
        value.get()
    }
}

/// Big-endian 32-bit unsigned integer for zerocopy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct U32BE([u8; 4]);

impl U32BE {
    /// Create a new U32BE from a native u32.
    pub const fn new(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    /// Get the native u32 value.
    pub const fn get(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl From<u32> for U32BE {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<U32BE> for u32 {
    fn from(value: U32BE) -> Self {
        value.get()
    }
}

/// Big-endian 32-bit signed integer for zerocopy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct I32BE([u8; 4]);

impl I32BE {
    /// Create a new I32BE from a native i32.
    pub const fn new(value: i32) -> Self {
        Self(value.to_be_bytes())
    }

    /// Get the native i32 value.
    pub const fn get(self) -> i32 {
        i32::from_be_bytes(self.0)
    }
}

impl From<i32> for I32BE {
    fn from(value: i32) -> Self {
        Self::new(value)
    }
}

impl From<I32BE> for i32 {
    fn from(value: I32BE) -> Self {
        value.get()
    }
}

/// Big-endian 16-bit signed integer for zerocopy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct I16BE([u8; 2]);

impl I16BE {
    /// Create a new I16BE from a native i16.
    pub const fn new(value: i16) -> Self {
        Self(value.to_be_bytes())
    }

    /// Get the native i16 value.
    pub const fn get(self) -> i16 {
        i16::from_be_bytes(self.0)
    }
}

impl From<i16> for I16BE {
    fn from(value: i16) -> Self {
        Self::new(value)
    }
}

impl From<I16BE> for i16 {
    fn from(value: I16BE) -> Self {
        value.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_oid_lookup() {
        assert_eq!(oid::array_element(oid::INT4_ARRAY), Some(oid::INT4));
        assert_eq!(oid::array_of(oid::TIMESTAMPTZ), Some(oid::TIMESTAMPTZ_ARRAY));
        assert_eq!(oid::array_element(oid::INT4), None);
    }

    #[test]
    fn transaction_status_bytes() {
        assert_eq!(TransactionStatus::from_byte(b'T'), Some(TransactionStatus::InTransaction));
        assert!(TransactionStatus::Failed.in_transaction());
        assert_eq!(TransactionStatus::from_byte(b'x'), None);
    }
}

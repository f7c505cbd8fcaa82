//! Error and notice response messages.

use crate::error::{Error, Result, ServerError};
use crate::protocol::codec::{read_cstr, read_u8};

/// Error field type codes from PostgreSQL protocol.
pub mod field_type {
    /// Severity (localized)
    pub const SEVERITY: u8 = b'S';
    /// Severity (non-localized, PostgreSQL 9.6+)
    pub const SEVERITY_NON_LOCALIZED: u8 = b'V';
    /// SQLSTATE code
    pub const CODE: u8 = b'C';
    pub const MESSAGE: u8 = b'M';
    pub const DETAIL: u8 = b'D';
    pub const HINT: u8 = b'H';
    /// Position in query
    pub const POSITION: u8 = b'P';
    /// Where (context)
    pub const WHERE: u8 = b'W';
    pub const SCHEMA: u8 = b's';
    pub const TABLE: u8 = b't';
    pub const COLUMN: u8 = b'c';
    pub const DATA_TYPE: u8 = b'd';
    pub const CONSTRAINT: u8 = b'n';
    pub const ROUTINE: u8 = b'R';
}

/// Parse error/notice fields from payload.
fn parse_fields(payload: &[u8]) -> Result<ServerError> {
    let mut fields = ServerError::default();
    let mut data = payload;

    while data.first().is_some_and(|&b| b != 0) {
        let (field_type, rest) = read_u8(data)?;
        let (value, rest) = read_cstr(rest)?;
        data = rest;

        let value = value.to_string();
        match field_type {
            field_type::SEVERITY => fields.severity = Some(value),
            field_type::SEVERITY_NON_LOCALIZED => fields.severity_non_localized = Some(value),
            field_type::CODE => fields.code = Some(value),
            field_type::MESSAGE => fields.message = Some(value),
            field_type::DETAIL => fields.detail = Some(value),
            field_type::HINT => fields.hint = Some(value),
            field_type::POSITION => fields.position = value.parse().ok(),
            field_type::WHERE => fields.where_ = Some(value),
            field_type::SCHEMA => fields.schema = Some(value),
            field_type::TABLE => fields.table = Some(value),
            field_type::COLUMN => fields.column = Some(value),
            field_type::DATA_TYPE => fields.data_type = Some(value),
            field_type::CONSTRAINT => fields.constraint = Some(value),
            field_type::ROUTINE => fields.routine = Some(value),
            _ => {
                tracing::trace!("ignoring error field type {}", field_type as char);
            }
        }
    }

    Ok(fields)
}

/// ErrorResponse message.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub fields: ServerError,
}

impl ErrorResponse {
    /// Parse an ErrorResponse message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            fields: parse_fields(payload)?,
        })
    }

    /// Convert to an Error.
    pub fn into_error(self) -> Error {
        Error::Server(self.fields)
    }
}

/// NoticeResponse message - non-fatal warning/info from server.
#[derive(Debug, Clone)]
pub struct NoticeResponse {
    pub fields: ServerError,
}

impl NoticeResponse {
    /// Parse a NoticeResponse message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            fields: parse_fields(payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_fields() {
        let payload = b"SERROR\0VERROR\0C23505\0Mduplicate key\0nt_pkey\0P12\0Zignored\0\0";
        let err = ErrorResponse::parse(payload).unwrap().into_error();
        let Error::Server(fields) = err else {
            panic!("expected server error");
        };
        assert_eq!(fields.code(), Some("23505"));
        assert_eq!(fields.severity(), Some("ERROR"));
        assert_eq!(fields.message.as_deref(), Some("duplicate key"));
        assert_eq!(fields.constraint.as_deref(), Some("t_pkey"));
        assert_eq!(fields.position, Some(12));
    }

    #[test]
    fn truncated_field_is_protocol_error() {
        assert!(ErrorResponse::parse(b"C2350").is_err());
    }
}

//! PostgreSQL backend (server → client) messages.

pub mod auth;
pub mod error;
pub mod query;

pub use auth::{AuthenticationMessage, BackendKeyData, ParameterStatus, ReadyForQuery};
pub use error::{ErrorResponse, NoticeResponse};
pub use query::{CommandComplete, DataRow, RowDescription};

/// Backend message type bytes.
pub mod msg_type {
    pub const AUTHENTICATION: u8 = b'R';
    pub const BACKEND_KEY_DATA: u8 = b'K';
    pub const PARAMETER_STATUS: u8 = b'S';
    pub const READY_FOR_QUERY: u8 = b'Z';
    pub const ROW_DESCRIPTION: u8 = b'T';
    pub const DATA_ROW: u8 = b'D';
    pub const COMMAND_COMPLETE: u8 = b'C';
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    pub const ERROR_RESPONSE: u8 = b'E';
    pub const NOTICE_RESPONSE: u8 = b'N';
    pub const NOTIFICATION_RESPONSE: u8 = b'A';
    pub const PARSE_COMPLETE: u8 = b'1';
    pub const BIND_COMPLETE: u8 = b'2';
    pub const NO_DATA: u8 = b'n';
}

/// Check if a type byte represents an async message (can arrive at any time).
pub fn is_async_type(type_byte: u8) -> bool {
    matches!(
        type_byte,
        msg_type::NOTICE_RESPONSE | msg_type::NOTIFICATION_RESPONSE | msg_type::PARAMETER_STATUS
    )
}

//! PostgreSQL frontend (client → server) messages.

pub mod auth;
pub mod extended;
pub mod simple;
pub mod startup;

pub use auth::{write_password, write_sasl_initial_response, write_sasl_response};
pub use extended::{write_bind, write_describe_portal, write_execute, write_parse, write_sync};
pub use simple::write_query;
pub use startup::{write_startup, write_terminate};

/// Frontend message type bytes.
pub mod msg_type {
    /// Password/SASL response (all auth response types use 'p')
    pub const PASSWORD: u8 = b'p';
    /// Query (simple query protocol)
    pub const QUERY: u8 = b'Q';
    pub const PARSE: u8 = b'P';
    pub const BIND: u8 = b'B';
    pub const EXECUTE: u8 = b'E';
    pub const DESCRIBE: u8 = b'D';
    pub const SYNC: u8 = b'S';
    pub const TERMINATE: u8 = b'X';
}

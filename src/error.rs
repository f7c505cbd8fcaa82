//! Error types for pg-batch.

use thiserror::Error;

use crate::protocol::types::Oid;

/// Result type for pg-batch operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Fields of an ErrorResponse or NoticeResponse.
///
/// Cloneable so that a batch can keep reporting the same server error
/// from every accessor that runs after it was recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerError {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    pub severity: Option<String>,
    /// Non-localized severity (same as severity but never translated)
    pub severity_non_localized: Option<String>,
    /// SQLSTATE error code (5 characters)
    pub code: Option<String>,
    /// Primary error message
    pub message: Option<String>,
    /// Detailed error explanation
    pub detail: Option<String>,
    /// Suggestion for fixing the error
    pub hint: Option<String>,
    /// Cursor position in query string (1-based)
    pub position: Option<u32>,
    /// Context/stack trace
    pub where_: Option<String>,
    /// Schema name
    pub schema: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// Column name
    pub column: Option<String>,
    /// Data type name
    pub data_type: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
    /// Source routine name
    pub routine: Option<String>,
}

impl ServerError {
    /// SQLSTATE code, if the server sent one.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Severity, preferring the non-localized form.
    pub fn severity(&self) -> Option<&str> {
        self.severity_non_localized
            .as_deref()
            .or(self.severity.as_deref())
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Error type for pg-batch.
#[derive(Debug, Error)]
pub enum Error {
    /// Server error response
    #[error("PostgreSQL error: {0}")]
    Server(ServerError),

    /// Protocol error (malformed message, unexpected response, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read did not complete within the configured timeout
    #[error("Timed out waiting for the server")]
    Timeout,

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Connection is broken and cannot be reused
    #[error("Connection is broken")]
    ConnectionBroken,

    /// Invalid usage (e.g., reading more results than statements queued)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// The statement's result does not have the shape the accessor expects
    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),

    /// A single-row read found no rows
    #[error("Query returned no rows")]
    NoRows,

    /// A single-row read found more than one row
    #[error("Query returned more than one row")]
    TooManyRows,

    /// Value could not be decoded from the wire
    #[error("Decode error: {0}")]
    Decode(String),

    /// Value could not be encoded for the wire
    #[error("Encode error: {0}")]
    Encode(String),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_) | Error::ConnectionBroken | Error::Timeout | Error::Protocol(_) => true,
            Error::Server(fields) => {
                // FATAL and PANIC errors indicate connection is broken
                matches!(fields.severity(), Some("FATAL") | Some("PANIC"))
            }
            _ => false,
        }
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(fields) => fields.code(),
            _ => None,
        }
    }

    /// A value of one type was asked to encode or decode as another.
    pub(crate) fn type_mismatch(expected: Oid, actual: Oid) -> Self {
        Error::Decode(format!(
            "type mismatch: expected oid {}, got oid {}",
            expected, actual
        ))
    }

    /// A value does not fit the target integer width.
    pub(crate) fn overflow(from: &str, to: &str) -> Self {
        Error::Decode(format!("value out of range: {} does not fit in {}", from, to))
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

impl<Src: std::fmt::Debug, Dst: std::fmt::Debug + ?Sized>
    From<zerocopy::error::CastError<Src, Dst>> for Error
{
    fn from(err: zerocopy::error::CastError<Src, Dst>) -> Self {
        Error::Protocol(format!("zerocopy cast error: {err:?}"))
    }
}

impl<Src: std::fmt::Debug, Dst: std::fmt::Debug + ?Sized>
    From<zerocopy::error::SizeError<Src, Dst>> for Error
{
    fn from(err: zerocopy::error::SizeError<Src, Dst>) -> Self {
        Error::Protocol(format!("zerocopy size error: {err:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_display() {
        let fields = ServerError {
            severity: Some("ERROR".into()),
            code: Some("22012".into()),
            message: Some("division by zero".into()),
            ..Default::default()
        };
        assert_eq!(
            fields.to_string(),
            "ERROR: division by zero (SQLSTATE 22012)"
        );
        let err = Error::Server(fields);
        assert_eq!(err.sqlstate(), Some("22012"));
        assert!(!err.is_connection_broken());
    }

    #[test]
    fn fatal_severity_breaks_connection() {
        let err = Error::Server(ServerError {
            severity: Some("FATAL".into()),
            ..Default::default()
        });
        assert!(err.is_connection_broken());
        assert!(Error::Timeout.is_connection_broken());
        assert!(!Error::NoRows.is_connection_broken());
    }
}

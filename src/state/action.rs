//! Action types for state machine I/O requests.

use crate::error::{Result, ServerError};
use crate::protocol::backend::{NoticeResponse, ParameterStatus, msg_type};
use crate::protocol::backend::auth::NotificationResponse;

/// Action requested by a state machine.
///
/// The caller performs the requested I/O, leaves the next backend message in
/// the buffer set, and calls `step()` again.
#[derive(Debug)]
pub enum Action {
    /// Read a PostgreSQL message from the server.
    ///
    /// The caller should:
    /// 1. Read the message type byte (1 byte) into `buffer_set.type_byte`
    /// 2. Read the length (4 bytes, big-endian i32)
    /// 3. Read (length - 4) bytes of payload into `buffer_set.read_buffer`
    /// 4. Call the state machine's `step()` method again
    ReadMessage,

    /// Write `buffer_set.write_buffer` to the server and flush, then read a
    /// message.
    WriteAndReadMessage,

    /// An asynchronous message was received.
    ///
    /// The caller should handle the message, read the next message,
    /// then call `step()` again.
    HandleAsyncMessageAndReadMessage(AsyncMessage),

    /// The state machine has finished successfully.
    Finished,
}

/// Asynchronous message from the server.
///
/// These can arrive at any time during query execution.
#[derive(Debug, Clone)]
pub enum AsyncMessage {
    /// Notification from LISTEN/NOTIFY.
    Notification {
        /// PID of the notifying backend process
        pid: u32,
        /// Channel name
        channel: String,
        /// Notification payload
        payload: String,
    },

    /// Non-fatal notice/warning from server.
    Notice(ServerError),

    /// Server parameter value changed.
    ParameterChanged {
        /// Parameter name
        name: String,
        /// New value
        value: String,
    },
}

impl AsyncMessage {
    /// Parse an asynchronous message. `type_byte` must satisfy
    /// [`is_async_type`](crate::protocol::backend::is_async_type).
    pub fn parse(type_byte: u8, payload: &[u8]) -> Result<Self> {
        match type_byte {
            msg_type::NOTICE_RESPONSE => Ok(Self::Notice(NoticeResponse::parse(payload)?.fields)),
            msg_type::PARAMETER_STATUS => {
                let param = ParameterStatus::parse(payload)?;
                Ok(Self::ParameterChanged {
                    name: param.name.to_string(),
                    value: param.value.to_string(),
                })
            }
            _ => {
                let notification = NotificationResponse::parse(payload)?;
                Ok(Self::Notification {
                    pid: notification.pid,
                    channel: notification.channel.to_string(),
                    payload: notification.payload.to_string(),
                })
            }
        }
    }

    /// Log the message. Drivers call this for every async message they skip.
    pub fn log(&self) {
        match self {
            Self::Notice(notice) => tracing::debug!(
                severity = notice.severity().unwrap_or_default(),
                code = notice.code().unwrap_or_default(),
                "server notice: {}",
                notice.message.as_deref().unwrap_or_default()
            ),
            Self::ParameterChanged { name, value } => {
                tracing::debug!(%name, %value, "server parameter changed");
            }
            Self::Notification { pid, channel, .. } => {
                tracing::debug!(pid, %channel, "notification received");
            }
        }
    }
}

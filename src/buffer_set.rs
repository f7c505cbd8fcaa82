//! Buffers shared by a connection and the state machines it drives.

use crate::error::Result;
use crate::protocol::backend::RowDescription;

/// Buffer set for state machine operations.
///
/// The connection owns one set and lends it to whichever state machine is
/// running, so steady-state operation does not allocate.
pub struct BufferSet {
    /// Payload of the last message read
    pub read_buffer: Vec<u8>,
    /// Outgoing messages, written to the socket in one call
    pub write_buffer: Vec<u8>,
    /// RowDescription payload of the result currently being read
    pub column_buffer: Vec<u8>,
    /// Type byte of the last message read
    pub type_byte: u8,
}

impl BufferSet {
    /// Create a new buffer set.
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::with_capacity(8192),
            write_buffer: Vec::with_capacity(8192),
            column_buffer: Vec::with_capacity(512),
            type_byte: 0,
        }
    }

    /// Keep the RowDescription in `read_buffer` for the rows that follow it.
    pub fn save_columns(&mut self) {
        self.column_buffer.clear();
        self.column_buffer.extend_from_slice(&self.read_buffer);
    }

    /// Columns saved by [`save_columns`](Self::save_columns).
    pub fn columns(&self) -> Result<RowDescription<'_>> {
        RowDescription::parse(&self.column_buffer)
    }
}

impl Default for BufferSet {
    fn default() -> Self {
        Self::new()
    }
}

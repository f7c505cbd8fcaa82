use std::io::{BufReader, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};

/// Blocking transport to the server.
pub enum Stream {
    Tcp(BufReader<TcpStream>),
    Unix(BufReader<UnixStream>),
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(BufReader::new(stream))
    }

    pub fn unix(stream: UnixStream) -> Self {
        Self::Unix(BufReader::new(stream))
    }

    /// Bound every following read. `None` blocks without limit.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match self {
            Stream::Tcp(r) => r.get_ref().set_read_timeout(timeout)?,
            Stream::Unix(r) => r.get_ref().set_read_timeout(timeout)?,
        }
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let result = match self {
            Stream::Tcp(r) => r.read_exact(buf),
            Stream::Unix(r) => r.read_exact(buf),
        };
        result.map_err(|e| match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => Error::Timeout,
            _ => Error::Io(e),
        })
    }

    pub fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.get_mut().write_all(buf),
            Stream::Unix(r) => r.get_mut().write_all(buf),
        }
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.get_mut().flush(),
            Stream::Unix(r) => r.get_mut().flush(),
        }
    }

    /// Read one backend message into `buffer_set`.
    pub fn read_message(&mut self, buffer_set: &mut BufferSet) -> Result<()> {
        let mut header = [0u8; 5];
        self.read_exact(&mut header)?;
        let [type_byte, length @ ..] = header;
        buffer_set.type_byte = type_byte;

        let length = u32::from_be_bytes(length);
        if length < 4 {
            return Err(Error::Protocol(format!(
                "Invalid message length: {}",
                length
            )));
        }

        buffer_set.read_buffer.clear();
        buffer_set.read_buffer.resize((length - 4) as usize, 0);
        self.read_exact(&mut buffer_set.read_buffer)
    }
}

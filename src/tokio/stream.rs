//! Async stream abstraction for tokio.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::UnixStream;

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};

/// Async transport to the server.
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

    async fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.read_exact(buf).await.map(|_| ()),
            Stream::Unix(r) => r.read_exact(buf).await.map(|_| ()),
        }
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.get_mut().write_all(buf).await,
            Stream::Unix(r) => r.get_mut().write_all(buf).await,
        }
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.get_mut().flush().await,
            Stream::Unix(r) => r.get_mut().flush().await,
        }
    }

    async fn read_message_inner(&mut self, buffer_set: &mut BufferSet) -> Result<()> {
        let mut header = [0u8; 5];
        self.read_exact(&mut header).await?;
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
        self.read_exact(&mut buffer_set.read_buffer).await?;
        Ok(())
    }

    /// Read one backend message into `buffer_set`, giving up after `timeout`.
    pub async fn read_message(
        &mut self,
        buffer_set: &mut BufferSet,
        timeout: Option<Duration>,
    ) -> Result<()> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_message_inner(buffer_set))
                .await
                .map_err(|_elapsed| Error::Timeout)?,
            None => self.read_message_inner(buffer_set).await,
        }
    }
}

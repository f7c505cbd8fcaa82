//! A scripted PostgreSQL backend over a Unix socket pair.
//!
//! The server answers the startup handshake, then for every exchange reads
//! frontend messages up to a Sync or Query and replies with the scripted
//! bytes. The frontend message types of each exchange are returned from the
//! join handle so tests can check what was written.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::thread::{self, JoinHandle};

use pg_batch::Opts;

/// Builder for backend messages.
#[derive(Default)]
pub struct Backend {
    buf: Vec<u8>,
}

impl Backend {
    pub fn new() -> Self {
        Self::default()
    }

    fn msg(mut self, type_byte: u8, payload: &[u8]) -> Self {
        self.buf.push(type_byte);
        self.buf
            .extend_from_slice(&(payload.len() as u32 + 4).to_be_bytes());
        self.buf.extend_from_slice(payload);
        self
    }

    pub fn parse_complete(self) -> Self {
        self.msg(b'1', b"")
    }

    pub fn bind_complete(self) -> Self {
        self.msg(b'2', b"")
    }

    pub fn no_data(self) -> Self {
        self.msg(b'n', b"")
    }

    /// Text-format columns as `(name, type oid)`.
    pub fn row_description(self, cols: &[(&str, u32)]) -> Self {
        let mut payload = (cols.len() as i16).to_be_bytes().to_vec();
        for (name, oid) in cols {
            payload.extend_from_slice(name.as_bytes());
            payload.push(0);
            payload.extend_from_slice(&0u32.to_be_bytes());
            payload.extend_from_slice(&0i16.to_be_bytes());
            payload.extend_from_slice(&oid.to_be_bytes());
            payload.extend_from_slice(&(-1i16).to_be_bytes());
            payload.extend_from_slice(&(-1i32).to_be_bytes());
            payload.extend_from_slice(&0i16.to_be_bytes());
        }
        self.msg(b'T', &payload)
    }

    pub fn data_row(self, values: &[Option<&str>]) -> Self {
        let mut payload = (values.len() as i16).to_be_bytes().to_vec();
        for value in values {
            match value {
                Some(v) => {
                    payload.extend_from_slice(&(v.len() as i32).to_be_bytes());
                    payload.extend_from_slice(v.as_bytes());
                }
                None => payload.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        self.msg(b'D', &payload)
    }

    pub fn command_complete(self, tag: &str) -> Self {
        let mut payload = tag.as_bytes().to_vec();
        payload.push(0);
        self.msg(b'C', &payload)
    }

    pub fn empty_query(self) -> Self {
        self.msg(b'I', b"")
    }

    pub fn error(self, code: &str, message: &str) -> Self {
        let payload = format!("SERROR\0VERROR\0C{code}\0M{message}\0\0");
        self.msg(b'E', payload.as_bytes())
    }

    pub fn notice(self, message: &str) -> Self {
        let payload = format!("SNOTICE\0VNOTICE\0C00000\0M{message}\0\0");
        self.msg(b'N', payload.as_bytes())
    }

    /// ReadyForQuery with status `I`, `T` or `E`.
    pub fn ready(self, status: u8) -> Self {
        self.msg(b'Z', &[status])
    }

    /// ParseComplete, BindComplete, NoData and CommandComplete.
    pub fn exec(self, tag: &str) -> Self {
        self.parse_complete()
            .bind_complete()
            .no_data()
            .command_complete(tag)
    }

    /// A full text result set of one column per value.
    pub fn query(self, cols: &[(&str, u32)], rows: &[&[Option<&str>]], tag: &str) -> Self {
        let mut this = self.parse_complete().bind_complete().row_description(cols);
        for row in rows {
            this = this.data_row(row);
        }
        this.command_complete(tag)
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

fn startup_reply() -> Vec<u8> {
    let mut key = 4242u32.to_be_bytes().to_vec();
    key.extend_from_slice(&7u32.to_be_bytes());
    Backend::new()
        .msg(b'R', &0u32.to_be_bytes())
        .msg(b'S', b"server_version\x0017.0\0")
        .msg(b'K', &key)
        .ready(b'I')
        .build()
}

/// Read one typed frontend message. `None` at end of stream.
fn read_frontend(stream: &mut UnixStream) -> Option<(u8, Vec<u8>)> {
    let mut header = [0u8; 5];
    stream.read_exact(&mut header).ok()?;
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    let mut payload = vec![0u8; len.saturating_sub(4)];
    stream.read_exact(&mut payload).ok()?;
    Some((header[0], payload))
}

fn run(mut stream: UnixStream, exchanges: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).expect("startup length");
    let mut startup = vec![0u8; u32::from_be_bytes(len) as usize - 4];
    stream.read_exact(&mut startup).expect("startup body");
    stream.write_all(&startup_reply()).expect("startup reply");

    let mut captured = Vec::new();
    for reply in exchanges {
        let mut types = Vec::new();
        loop {
            let Some((type_byte, _)) = read_frontend(&mut stream) else {
                captured.push(types);
                return captured;
            };
            types.push(type_byte);
            if type_byte == b'S' || type_byte == b'Q' {
                break;
            }
        }
        captured.push(types);
        if stream.write_all(&reply).is_err() {
            return captured;
        }
    }

    // Wait for Terminate or the client going away.
    while let Some((type_byte, _)) = read_frontend(&mut stream) {
        if type_byte == b'X' {
            break;
        }
    }
    captured
}

/// Start a fake server. Returns the client end of the socket.
pub fn serve(exchanges: Vec<Vec<u8>>) -> (UnixStream, JoinHandle<Vec<Vec<u8>>>) {
    let (client, server) = UnixStream::pair().expect("socket pair");
    let handle = thread::spawn(move || run(server, exchanges));
    (client, handle)
}

pub fn opts() -> Opts {
    Opts {
        user: "tester".into(),
        database: Some("test".into()),
        ..Default::default()
    }
}

pub const INT4: u32 = 23;
pub const TEXT: u32 = 25;

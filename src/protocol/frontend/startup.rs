//! Messages that open and close a session.

use crate::error::Result;
use crate::protocol::codec::MessageBuilder;

use super::msg_type;

/// Protocol 3.0, major version in the high 16 bits.
pub const PROTOCOL_VERSION: i32 = 3 << 16;

/// Write a StartupMessage carrying `params` as name/value pairs.
///
/// `user` is the only parameter the server requires.
pub fn write_startup<'p>(
    buf: &mut Vec<u8>,
    params: impl IntoIterator<Item = (&'p str, &'p str)>,
) -> Result<()> {
    let mut msg = MessageBuilder::new_startup(buf);
    msg.write_i32(PROTOCOL_VERSION);
    for (name, value) in params {
        msg.write_cstr(name);
        msg.write_cstr(value);
    }
    msg.write_u8(0);
    msg.finish()
}

pub fn write_terminate(buf: &mut Vec<u8>) -> Result<()> {
    MessageBuilder::new(buf, msg_type::TERMINATE).finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_layout() {
        let mut buf = Vec::new();
        write_startup(&mut buf, [("user", "app"), ("database", "orders")]).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&34_i32.to_be_bytes());
        expected.extend_from_slice(&[0, 3, 0, 0]);
        expected.extend_from_slice(b"user\0app\0database\0orders\0\0");
        assert_eq!(buf, expected);
    }

    #[test]
    fn terminate() {
        let mut buf = Vec::new();
        write_terminate(&mut buf).unwrap();
        assert_eq!(buf, b"X\x00\x00\x00\x04");
    }
}

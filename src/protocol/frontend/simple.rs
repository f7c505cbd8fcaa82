//! Query message of the simple query protocol.

use crate::error::Result;
use crate::protocol::codec::MessageBuilder;

use super::msg_type;

/// Write a Query message. `query` may hold several `;`-separated statements.
pub fn write_query(buf: &mut Vec<u8>, query: &str) -> Result<()> {
    let mut msg = MessageBuilder::new(buf, msg_type::QUERY);
    msg.write_cstr(query);
    msg.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_to_existing_buffer() {
        let mut buf = b"prefix".to_vec();
        write_query(&mut buf, "BEGIN").unwrap();
        assert_eq!(&buf[..6], b"prefix");
        assert_eq!(&buf[6..], b"Q\x00\x00\x00\x0aBEGIN\x00");
    }
}

//! Extended query protocol messages.

use crate::conversion::ToParams;
use crate::error::{Error, Result};
use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::{FormatCode, Oid};

fn count_i16(len: usize, what: &str) -> Result<i16> {
    i16::try_from(len).map_err(|_| Error::InvalidUsage(format!("too many {what}: {len}")))
}

/// Write a Parse message to create a prepared statement.
///
/// - `name`: Statement name (empty string for unnamed statement)
/// - `query`: SQL query with $1, $2, ... placeholders
/// - `param_oids`: Parameter type OIDs (0 = let server infer)
pub fn write_parse(buf: &mut Vec<u8>, name: &str, query: &str, param_oids: &[Oid]) -> Result<()> {
    let count = count_i16(param_oids.len(), "parameters")?;
    let mut msg = MessageBuilder::new(buf, super::msg_type::PARSE);
    msg.write_cstr(name);
    msg.write_cstr(query);
    msg.write_i16(count);
    for &oid in param_oids {
        msg.write_u32(oid);
    }
    msg.finish()
}

/// Write a Bind message to create a portal from a prepared statement.
///
/// Every parameter is encoded for the OID in `param_oids` and the format in
/// `param_formats` at the same position. An encode failure leaves a partial
/// message in `buf`; callers discard the buffer in that case.
pub fn write_bind<P: ToParams + ?Sized>(
    buf: &mut Vec<u8>,
    portal: &str,
    statement: &str,
    params: &P,
    param_oids: &[Oid],
    param_formats: &[FormatCode],
    result_formats: &[FormatCode],
) -> Result<()> {
    let param_count = count_i16(params.param_count(), "parameters")?;
    let result_count = count_i16(result_formats.len(), "result formats")?;

    let mut msg = MessageBuilder::new(buf, super::msg_type::BIND);
    msg.write_cstr(portal);
    msg.write_cstr(statement);

    msg.write_i16(count_i16(param_formats.len(), "parameter formats")?);
    for &fmt in param_formats {
        msg.write_u16(fmt as u16);
    }

    msg.write_i16(param_count);
    params.encode(param_oids, param_formats, msg.buf())?;

    msg.write_i16(result_count);
    for &fmt in result_formats {
        msg.write_u16(fmt as u16);
    }

    msg.finish()
}

/// Write an Execute message to run a portal.
///
/// - `max_rows`: Maximum number of rows to return (0 = unlimited)
pub fn write_execute(buf: &mut Vec<u8>, portal: &str, max_rows: u32) -> Result<()> {
    let mut msg = MessageBuilder::new(buf, super::msg_type::EXECUTE);
    msg.write_cstr(portal);
    msg.write_u32(max_rows);
    msg.finish()
}

/// Write a Describe message for a portal.
///
/// The server answers with RowDescription or NoData, reflecting the result
/// formats chosen at Bind time.
pub fn write_describe_portal(buf: &mut Vec<u8>, name: &str) -> Result<()> {
    let mut msg = MessageBuilder::new(buf, super::msg_type::DESCRIBE);
    msg.write_u8(b'P');
    msg.write_cstr(name);
    msg.finish()
}

/// Write a Sync message.
///
/// This ends an extended query sequence and causes:
/// - Implicit COMMIT if successful and not in explicit transaction
/// - Implicit ROLLBACK if failed and not in explicit transaction
/// - Server responds with ReadyForQuery
pub fn write_sync(buf: &mut Vec<u8>) -> Result<()> {
    MessageBuilder::new(buf, super::msg_type::SYNC).finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;

    #[test]
    fn test_parse() {
        let mut buf = Vec::new();
        write_parse(&mut buf, "", "SELECT $1::int", &[oid::INT4]).unwrap();

        assert_eq!(buf[0], b'P');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len as usize, buf.len() - 1);
        assert!(buf.ends_with(&[0, 1, 0, 0, 0, 23]));
    }

    #[test]
    fn test_bind_mixed_formats() {
        let mut buf = Vec::new();
        write_bind(
            &mut buf,
            "",
            "ps1",
            &(7_i32, "x"),
            &[oid::INT4, oid::TEXT],
            &[FormatCode::Binary, FormatCode::Text],
            &[FormatCode::Binary],
        )
        .unwrap();

        let mut expected = vec![b'B', 0, 0, 0, 0, 0, b'p', b's', b'1', 0];
        expected.extend_from_slice(&[0, 2, 0, 1, 0, 0]); // param formats
        expected.extend_from_slice(&[0, 2]); // param count
        expected.extend_from_slice(&[0, 0, 0, 4, 0, 0, 0, 7]);
        expected.extend_from_slice(&[0, 0, 0, 1, b'x']);
        expected.extend_from_slice(&[0, 1, 0, 1]); // result formats
        let len = (expected.len() - 1) as i32;
        expected[1..5].copy_from_slice(&len.to_be_bytes());
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_describe_execute_sync() {
        let mut buf = Vec::new();
        write_describe_portal(&mut buf, "").unwrap();
        write_execute(&mut buf, "", 0).unwrap();
        write_sync(&mut buf).unwrap();
        assert_eq!(
            buf,
            [
                b'D', 0, 0, 0, 6, b'P', 0, //
                b'E', 0, 0, 0, 9, 0, 0, 0, 0, 0, //
                b'S', 0, 0, 0, 4,
            ]
        );
    }
}

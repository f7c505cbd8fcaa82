//! Simple query protocol state machine.

use crate::batch::CommandResult;
use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::handler::TextHandler;
use crate::protocol::backend::{
    DataRow, ErrorResponse, ReadyForQuery, RowDescription, is_async_type, msg_type,
};
use crate::protocol::frontend::write_query;
use crate::protocol::types::TransactionStatus;

use super::StateMachine;
use super::action::{Action, AsyncMessage};

/// Simple query state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingResponse,
    ProcessingRows,
    Finished,
}

/// Simple query protocol state machine.
///
/// A server error or a handler error does not end the exchange early: the
/// machine keeps reading until ReadyForQuery so the connection stays usable,
/// and the first error is available from [`take_error`](Self::take_error).
pub struct SimpleQueryStateMachine<'a, H> {
    state: State,
    query: &'a str,
    handler: &'a mut H,
    error: Option<Error>,
    transaction_status: TransactionStatus,
}

impl<'a, H: TextHandler> SimpleQueryStateMachine<'a, H> {
    /// Create a new simple query state machine.
    pub fn new(query: &'a str, handler: &'a mut H) -> Self {
        Self {
            state: State::Initial,
            query,
            handler,
            error: None,
            transaction_status: TransactionStatus::Idle,
        }
    }

    /// Get the transaction status from the final ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Take the first error seen during the exchange.
    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    fn record(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
    }

    fn handle_message(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let type_byte = buffer_set.type_byte;
        let payload = &buffer_set.read_buffer;

        match (self.state, type_byte) {
            (State::WaitingResponse, msg_type::ROW_DESCRIPTION) => {
                buffer_set.save_columns();
                let cols = buffer_set.columns()?;
                if self.error.is_none() {
                    let result = self.handler.result_start(cols);
                    self.record(result);
                }
                self.state = State::ProcessingRows;
            }
            (State::ProcessingRows, msg_type::DATA_ROW) => {
                if self.error.is_none() {
                    let result = RowDescription::parse(&buffer_set.column_buffer).and_then(|cols| {
                        self.handler.row(cols, DataRow::parse(payload)?)
                    });
                    self.record(result);
                }
            }
            (State::WaitingResponse | State::ProcessingRows, msg_type::COMMAND_COMPLETE) => {
                let complete = CommandResult::parse(payload)?;
                if self.error.is_none() {
                    let result = self.handler.result_end(complete);
                    self.record(result);
                }
                self.state = State::WaitingResponse;
            }
            (State::WaitingResponse, msg_type::EMPTY_QUERY_RESPONSE) => {}
            (State::WaitingResponse | State::ProcessingRows, msg_type::ERROR_RESPONSE) => {
                let error = ErrorResponse::parse(payload)?.into_error();
                self.record(Err(error));
                self.state = State::WaitingResponse;
            }
            (State::WaitingResponse | State::ProcessingRows, msg_type::READY_FOR_QUERY) => {
                self.transaction_status = ReadyForQuery::parse(payload)?.transaction_status()?;
                self.state = State::Finished;
                return Ok(Action::Finished);
            }
            (state, other) => {
                return Err(Error::Protocol(format!(
                    "Unexpected message '{}' in simple query state {:?}",
                    other as char, state
                )));
            }
        }

        Ok(Action::ReadMessage)
    }
}

impl<H: TextHandler> StateMachine for SimpleQueryStateMachine<'_, H> {
    fn start(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        buffer_set.write_buffer.clear();
        write_query(&mut buffer_set.write_buffer, self.query)?;
        self.state = State::WaitingResponse;
        Ok(Action::WriteAndReadMessage)
    }

    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        if is_async_type(buffer_set.type_byte) {
            let msg = AsyncMessage::parse(buffer_set.type_byte, &buffer_set.read_buffer)?;
            return Ok(Action::HandleAsyncMessageAndReadMessage(msg));
        }
        self.handle_message(buffer_set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{CollectHandler, DropHandler};

    fn feed<H: TextHandler>(
        sm: &mut SimpleQueryStateMachine<'_, H>,
        bs: &mut BufferSet,
        type_byte: u8,
        payload: &[u8],
    ) -> Action {
        bs.type_byte = type_byte;
        bs.read_buffer.clear();
        bs.read_buffer.extend_from_slice(payload);
        sm.step(bs).unwrap()
    }

    fn row_description(name: &str, type_oid: u32) -> Vec<u8> {
        let mut payload = 1i16.to_be_bytes().to_vec();
        payload.extend_from_slice(name.as_bytes());
        payload.push(0);
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&0i16.to_be_bytes());
        payload.extend_from_slice(&type_oid.to_be_bytes());
        payload.extend_from_slice(&4i16.to_be_bytes());
        payload.extend_from_slice(&(-1i32).to_be_bytes());
        payload.extend_from_slice(&0i16.to_be_bytes());
        payload
    }

    fn data_row(value: &[u8]) -> Vec<u8> {
        let mut payload = 1i16.to_be_bytes().to_vec();
        payload.extend_from_slice(&(value.len() as i32).to_be_bytes());
        payload.extend_from_slice(value);
        payload
    }

    #[test]
    fn collects_rows() {
        let mut handler = CollectHandler::<(i32,)>::new();
        let mut bs = BufferSet::new();
        let mut sm = SimpleQueryStateMachine::new("SELECT 1", &mut handler);
        assert!(matches!(sm.start(&mut bs).unwrap(), Action::WriteAndReadMessage));
        assert_eq!(bs.write_buffer.first(), Some(&b'Q'));

        feed(&mut sm, &mut bs, b'T', &row_description("n", 23));
        feed(&mut sm, &mut bs, b'D', &data_row(b"1"));
        feed(&mut sm, &mut bs, b'D', &data_row(b"2"));
        feed(&mut sm, &mut bs, b'C', b"SELECT 2\0");
        assert!(matches!(feed(&mut sm, &mut bs, b'Z', b"I"), Action::Finished));
        assert!(sm.take_error().is_none());
        assert_eq!(handler.into_rows(), vec![(1,), (2,)]);
    }

    #[test]
    fn error_waits_for_ready() {
        let mut handler = DropHandler::new();
        let mut bs = BufferSet::new();
        let mut sm = SimpleQueryStateMachine::new("SELECT 1/0", &mut handler);
        sm.start(&mut bs).unwrap();

        let action = feed(&mut sm, &mut bs, b'E', b"SERROR\0C22012\0Mdivision by zero\0\0");
        assert!(matches!(action, Action::ReadMessage));
        assert!(matches!(feed(&mut sm, &mut bs, b'Z', b"E"), Action::Finished));
        assert_eq!(sm.transaction_status(), TransactionStatus::Failed);
        assert_eq!(sm.take_error().and_then(|e| e.sqlstate().map(String::from)).as_deref(), Some("22012"));
    }

    #[test]
    fn decode_error_keeps_reading() {
        let mut handler = CollectHandler::<(i32,)>::new();
        let mut bs = BufferSet::new();
        let mut sm = SimpleQueryStateMachine::new("SELECT 'x'", &mut handler);
        sm.start(&mut bs).unwrap();

        feed(&mut sm, &mut bs, b'T', &row_description("s", 23));
        feed(&mut sm, &mut bs, b'D', &data_row(b"x"));
        feed(&mut sm, &mut bs, b'D', &data_row(b"1"));
        feed(&mut sm, &mut bs, b'C', b"SELECT 2\0");
        feed(&mut sm, &mut bs, b'Z', b"I");
        assert!(matches!(sm.take_error(), Some(Error::Decode(_))));
        assert!(handler.is_empty());
    }

    #[test]
    fn command_and_empty_query() {
        let mut handler = DropHandler::new();
        let mut bs = BufferSet::new();
        let mut sm = SimpleQueryStateMachine::new("UPDATE t SET x = 1;;", &mut handler);
        sm.start(&mut bs).unwrap();
        feed(&mut sm, &mut bs, b'C', b"UPDATE 3\0");
        feed(&mut sm, &mut bs, b'I', b"");
        feed(&mut sm, &mut bs, b'Z', b"T");
        assert_eq!(sm.transaction_status(), TransactionStatus::InTransaction);
        assert_eq!(handler.rows_affected(), Some(3));
    }
}

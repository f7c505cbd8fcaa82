//! Batch response demultiplexer.
//!
//! A batch of N statements produces, per statement,
//!
//! ```text
//! [ParseComplete] BindComplete (RowDescription DataRow* | NoData) (CommandComplete | EmptyQueryResponse)
//! ```
//!
//! followed by a single ReadyForQuery for the trailing Sync. An ErrorResponse
//! makes the server skip everything up to the Sync, and an error raised at
//! the Sync itself (a deferred constraint, for example) arrives after the last
//! statement completed and before ReadyForQuery.
//!
//! The machine tracks two positions: how many statements the caller has
//! asked for (`consumed`) and which statement the wire is currently at
//! (`wire`). The first server error is kept and reported for every statement
//! the caller asks for afterwards.

use crate::batch::CommandResult;
use crate::buffer_set::BufferSet;
use crate::error::{Error, Result, ServerError};
use crate::protocol::backend::{ErrorResponse, ReadyForQuery, is_async_type, msg_type};
use crate::protocol::types::TransactionStatus;

use super::action::AsyncMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for ParseComplete
    Parse,
    /// Waiting for BindComplete
    Bind,
    /// Waiting for RowDescription or NoData
    Describe,
    /// Reading DataRows until CommandComplete
    Rows,
    /// Waiting for CommandComplete or EmptyQueryResponse
    Command,
    /// All statements answered or skipped, waiting for ReadyForQuery
    Syncing,
    Finished,
}

/// What the message just processed means to the reader.
#[derive(Debug)]
pub enum BatchEvent {
    /// Nothing to report; read the next message.
    ReadMessage,
    /// An asynchronous message arrived in the middle of the batch.
    Async(AsyncMessage),
    /// The current statement returns rows, described by the message in
    /// `read_buffer`.
    RowDescription,
    /// The current statement returns no rows.
    NoData,
    /// A row of the current statement is in `read_buffer`.
    DataRow,
    /// The current statement completed.
    Complete(CommandResult),
    /// The server reported an error. Remaining statements are skipped.
    Error(ServerError),
    /// ReadyForQuery arrived; the batch is over.
    Ready,
}

/// State machine for reading the responses of a pipelined batch.
#[derive(Debug)]
pub struct BatchStateMachine {
    state: State,
    parses: Vec<bool>,
    consumed: usize,
    wire: usize,
    error: Option<ServerError>,
    transaction_status: TransactionStatus,
}

impl BatchStateMachine {
    /// Create a machine for a batch whose statements sent a Parse where
    /// `parses[i]` is true.
    pub fn new(parses: Vec<bool>) -> Self {
        let state = match parses.first() {
            Some(&parse) => Self::header(parse),
            None => State::Syncing,
        };
        Self {
            state,
            parses,
            consumed: 0,
            wire: 0,
            error: None,
            transaction_status: TransactionStatus::Idle,
        }
    }

    fn header(parse: bool) -> State {
        if parse { State::Parse } else { State::Bind }
    }

    /// Number of statements in the batch.
    pub fn len(&self) -> usize {
        self.parses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parses.is_empty()
    }

    /// Number of statements the caller has not asked for yet.
    pub fn remaining(&self) -> usize {
        self.len() - self.consumed
    }

    /// True once ReadyForQuery has been read.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// True while a statement the caller asked for still has unread
    /// responses on the wire.
    pub fn statement_open(&self) -> bool {
        self.wire < self.consumed && !matches!(self.state, State::Syncing | State::Finished)
    }

    /// The first server error of the batch.
    pub fn error(&self) -> Option<&ServerError> {
        self.error.as_ref()
    }

    /// Transaction status reported by ReadyForQuery.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Move on to the next statement the caller asked for.
    ///
    /// Fails with [`Error::InvalidUsage`] when every statement was already
    /// read, and with the batch's server error when an earlier statement
    /// failed, since the server skipped this one.
    pub fn begin(&mut self) -> Result<()> {
        if self.consumed >= self.len() {
            return Err(Error::InvalidUsage(format!(
                "all {} statements of the batch have been read",
                self.len()
            )));
        }
        if self.statement_open() {
            return Err(Error::InvalidUsage(
                "previous statement of the batch is still being read".into(),
            ));
        }
        self.consumed += 1;
        match &self.error {
            Some(error) => Err(Error::Server(error.clone())),
            None => Ok(()),
        }
    }

    /// Process the message in `buffer_set`.
    pub fn step(&mut self, buffer_set: &BufferSet) -> Result<BatchEvent> {
        let type_byte = buffer_set.type_byte;
        let payload = &buffer_set.read_buffer;

        if is_async_type(type_byte) {
            return Ok(BatchEvent::Async(AsyncMessage::parse(type_byte, payload)?));
        }

        match (self.state, type_byte) {
            (State::Finished, _) => Err(Error::Protocol(format!(
                "Unexpected message '{}' after the batch finished",
                type_byte as char
            ))),
            (_, msg_type::ERROR_RESPONSE) => {
                let error = ErrorResponse::parse(payload)?.fields;
                self.record_error(&error);
                self.state = State::Syncing;
                Ok(BatchEvent::Error(error))
            }
            (State::Parse, msg_type::PARSE_COMPLETE) => {
                self.state = State::Bind;
                Ok(BatchEvent::ReadMessage)
            }
            (State::Bind, msg_type::BIND_COMPLETE) => {
                self.state = State::Describe;
                Ok(BatchEvent::ReadMessage)
            }
            (State::Describe, msg_type::ROW_DESCRIPTION) => {
                self.state = State::Rows;
                Ok(BatchEvent::RowDescription)
            }
            (State::Describe, msg_type::NO_DATA) => {
                self.state = State::Command;
                Ok(BatchEvent::NoData)
            }
            (State::Rows, msg_type::DATA_ROW) => Ok(BatchEvent::DataRow),
            (State::Rows | State::Command, msg_type::COMMAND_COMPLETE) => {
                let result = CommandResult::parse(payload)?;
                Ok(self.complete(result))
            }
            (State::Command, msg_type::EMPTY_QUERY_RESPONSE) => {
                Ok(self.complete(CommandResult::empty()))
            }
            (State::Syncing, msg_type::READY_FOR_QUERY) => {
                self.transaction_status = ReadyForQuery::parse(payload)?.transaction_status()?;
                self.state = State::Finished;
                Ok(BatchEvent::Ready)
            }
            (state, other) => Err(Error::Protocol(format!(
                "Unexpected message '{}' for statement {} of the batch in state {:?}",
                other as char, self.wire, state
            ))),
        }
    }

    fn complete(&mut self, result: CommandResult) -> BatchEvent {
        self.wire += 1;
        self.state = match self.parses.get(self.wire) {
            Some(&parse) => Self::header(parse),
            None => State::Syncing,
        };
        BatchEvent::Complete(result)
    }

    fn record_error(&mut self, error: &ServerError) {
        if self.error.is_some() {
            return;
        }
        if self.wire < self.len() {
            tracing::debug!(
                statement = self.wire,
                code = error.code().unwrap_or_default(),
                "batch statement failed: {}",
                error
            );
        } else {
            tracing::debug!(
                code = error.code().unwrap_or_default(),
                "batch failed at sync: {}",
                error
            );
        }
        self.error = Some(error.clone());
    }
}

/// An empty, finished batch.
impl Default for BatchStateMachine {
    fn default() -> Self {
        Self {
            state: State::Finished,
            parses: Vec::new(),
            consumed: 0,
            wire: 0,
            error: None,
            transaction_status: TransactionStatus::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Wire {
        bs: BufferSet,
    }

    impl Wire {
        fn new() -> Self {
            Self { bs: BufferSet::new() }
        }

        fn feed(&mut self, sm: &mut BatchStateMachine, type_byte: u8, payload: &[u8]) -> BatchEvent {
            self.bs.type_byte = type_byte;
            self.bs.read_buffer.clear();
            self.bs.read_buffer.extend_from_slice(payload);
            sm.step(&self.bs).unwrap()
        }
    }

    const ERROR: &[u8] = b"SERROR\0C22012\0Mdivision by zero\0\0";
    const UNIQUE: &[u8] = b"SERROR\0C23505\0Mduplicate key value\0\0";

    #[test]
    fn command_then_rows() {
        let mut sm = BatchStateMachine::new(vec![true, true]);
        let mut w = Wire::new();

        sm.begin().unwrap();
        assert!(sm.statement_open());
        assert!(matches!(w.feed(&mut sm, b'1', b""), BatchEvent::ReadMessage));
        assert!(matches!(w.feed(&mut sm, b'2', b""), BatchEvent::ReadMessage));
        assert!(matches!(w.feed(&mut sm, b'n', b""), BatchEvent::NoData));
        let BatchEvent::Complete(result) = w.feed(&mut sm, b'C', b"INSERT 0 1\0") else {
            panic!("expected completion");
        };
        assert_eq!(result.rows_affected(), 1);
        assert!(!sm.statement_open());

        sm.begin().unwrap();
        w.feed(&mut sm, b'1', b"");
        w.feed(&mut sm, b'2', b"");
        assert!(matches!(w.feed(&mut sm, b'T', b"\0\0"), BatchEvent::RowDescription));
        assert!(matches!(w.feed(&mut sm, b'D', b"\0\0"), BatchEvent::DataRow));
        assert!(matches!(w.feed(&mut sm, b'N', b"SNOTICE\0Mhi\0\0"), BatchEvent::Async(_)));
        assert!(matches!(w.feed(&mut sm, b'D', b"\0\0"), BatchEvent::DataRow));
        assert!(matches!(w.feed(&mut sm, b'C', b"SELECT 2\0"), BatchEvent::Complete(_)));
        assert!(matches!(w.feed(&mut sm, b'Z', b"I"), BatchEvent::Ready));

        assert!(sm.is_finished());
        assert!(sm.error().is_none());
        assert!(matches!(sm.begin(), Err(Error::InvalidUsage(_))));
    }

    #[test]
    fn prepared_target_skips_parse_complete() {
        let mut sm = BatchStateMachine::new(vec![false]);
        let mut w = Wire::new();
        sm.begin().unwrap();
        assert!(matches!(w.feed(&mut sm, b'2', b""), BatchEvent::ReadMessage));
        assert!(matches!(w.feed(&mut sm, b'n', b""), BatchEvent::NoData));
        assert!(matches!(w.feed(&mut sm, b'C', b"UPDATE 0\0"), BatchEvent::Complete(_)));
        assert!(matches!(w.feed(&mut sm, b'Z', b"T"), BatchEvent::Ready));
        assert_eq!(sm.transaction_status(), TransactionStatus::InTransaction);
    }

    #[test]
    fn error_aborts_remaining_statements() {
        let mut sm = BatchStateMachine::new(vec![true, true, true]);
        let mut w = Wire::new();

        sm.begin().unwrap();
        w.feed(&mut sm, b'1', b"");
        w.feed(&mut sm, b'2', b"");
        w.feed(&mut sm, b'T', b"\0\0");
        w.feed(&mut sm, b'D', b"\0\0");
        let BatchEvent::Error(error) = w.feed(&mut sm, b'E', ERROR) else {
            panic!("expected error");
        };
        assert_eq!(error.code(), Some("22012"));
        assert!(!sm.statement_open());

        let aborted = sm.begin().unwrap_err();
        assert_eq!(aborted.sqlstate(), Some("22012"));
        assert_eq!(sm.remaining(), 1);

        assert!(matches!(w.feed(&mut sm, b'Z', b"I"), BatchEvent::Ready));
        assert!(sm.begin().is_err());
        assert!(matches!(sm.begin(), Err(Error::InvalidUsage(_))));
        assert_eq!(sm.error().and_then(ServerError::code), Some("22012"));
    }

    #[test]
    fn deferred_error_after_last_statement() {
        let mut sm = BatchStateMachine::new(vec![true]);
        let mut w = Wire::new();
        sm.begin().unwrap();
        w.feed(&mut sm, b'1', b"");
        w.feed(&mut sm, b'2', b"");
        w.feed(&mut sm, b'T', b"\0\0");
        w.feed(&mut sm, b'C', b"INSERT 0 1\0");
        assert!(sm.error().is_none());

        assert!(matches!(w.feed(&mut sm, b'E', UNIQUE), BatchEvent::Error(_)));
        assert!(!sm.is_finished());
        assert!(matches!(w.feed(&mut sm, b'Z', b"I"), BatchEvent::Ready));
        assert_eq!(sm.error().and_then(ServerError::code), Some("23505"));
    }

    #[test]
    fn first_error_wins() {
        let mut sm = BatchStateMachine::new(vec![true]);
        let mut w = Wire::new();
        sm.begin().unwrap();
        w.feed(&mut sm, b'E', ERROR);
        w.feed(&mut sm, b'E', UNIQUE);
        assert_eq!(sm.error().and_then(ServerError::code), Some("22012"));
    }

    #[test]
    fn empty_query_completes() {
        let mut sm = BatchStateMachine::new(vec![true]);
        let mut w = Wire::new();
        sm.begin().unwrap();
        w.feed(&mut sm, b'1', b"");
        w.feed(&mut sm, b'2', b"");
        w.feed(&mut sm, b'n', b"");
        let BatchEvent::Complete(result) = w.feed(&mut sm, b'I', b"") else {
            panic!("expected completion");
        };
        assert_eq!(result.command(), "");
    }

    #[test]
    fn empty_batch_waits_for_ready() {
        let mut sm = BatchStateMachine::new(Vec::new());
        let mut w = Wire::new();
        assert!(matches!(sm.begin(), Err(Error::InvalidUsage(_))));
        assert!(matches!(w.feed(&mut sm, b'Z', b"I"), BatchEvent::Ready));
    }

    #[test]
    fn unread_statement_blocks_begin() {
        let mut sm = BatchStateMachine::new(vec![true, true]);
        sm.begin().unwrap();
        assert!(matches!(sm.begin(), Err(Error::InvalidUsage(_))));
        assert_eq!(sm.remaining(), 1);
    }

    #[test]
    fn protocol_violations() {
        let mut sm = BatchStateMachine::new(vec![true]);
        let mut bs = BufferSet::new();
        bs.type_byte = b'D';
        assert!(matches!(sm.step(&bs), Err(Error::Protocol(_))));

        let mut finished = BatchStateMachine::default();
        bs.type_byte = b'E';
        bs.read_buffer.extend_from_slice(ERROR);
        assert!(matches!(finished.step(&bs), Err(Error::Protocol(_))));

        let mut sm = BatchStateMachine::new(vec![true]);
        bs.type_byte = b'Z';
        bs.read_buffer.clear();
        bs.read_buffer.push(b'I');
        assert!(matches!(sm.step(&bs), Err(Error::Protocol(_))));
    }
}

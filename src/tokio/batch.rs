//! Reading the results of a batch on an asynchronous connection.

use crate::batch::CommandResult;
use crate::conversion::FromRow;
use crate::error::{Error, Result};
use crate::protocol::backend::{DataRow, RowDescription};
use crate::state::{BatchEvent, BatchStateMachine};

use super::conn::Conn;

fn unexpected(event: &BatchEvent) -> Error {
    Error::Protocol(format!("Unexpected batch event {:?}", event))
}

/// Results of a batch sent with [`Conn::send_batch`].
///
/// Statements are read in the order they were queued. Call
/// [`close`](Self::close) to read the rest of the batch and get its first
/// server error. Dropping the results instead leaves the rest on the wire,
/// and the next operation on the connection reads it before doing anything
/// else.
pub struct BatchResults<'c> {
    conn: &'c mut Conn,
    machine: BatchStateMachine,
    closed: bool,
}

impl<'c> BatchResults<'c> {
    pub(crate) fn new(conn: &'c mut Conn, machine: BatchStateMachine) -> Self {
        Self {
            conn,
            machine,
            closed: false,
        }
    }

    /// Number of statements in the batch.
    pub fn len(&self) -> usize {
        self.machine.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machine.is_empty()
    }

    /// Number of statements not read yet.
    pub fn remaining(&self) -> usize {
        self.machine.remaining()
    }

    async fn read_event(&mut self) -> Result<BatchEvent> {
        self.conn
            .stream
            .read_message(&mut self.conn.buffer_set, self.conn.read_timeout)
            .await?;
        self.machine.step(&self.conn.buffer_set)
    }

    /// Next event that matters to a reader.
    ///
    /// The connection counts as broken while a read is in flight, so a
    /// cancelled read leaves it broken.
    async fn next_event(&mut self) -> Result<BatchEvent> {
        loop {
            if self.conn.is_broken {
                return Err(Error::ConnectionBroken);
            }
            self.conn.is_broken = true;
            let event = match self.read_event().await {
                Ok(event) => event,
                Err(e) => {
                    self.conn.is_broken = e.is_connection_broken();
                    return Err(e);
                }
            };
            self.conn.is_broken = false;

            match event {
                BatchEvent::ReadMessage => {}
                BatchEvent::Async(msg) => msg.log(),
                BatchEvent::RowDescription => {
                    self.conn.buffer_set.save_columns();
                    return Ok(event);
                }
                BatchEvent::Ready => {
                    self.conn.transaction_status = self.machine.transaction_status();
                    return Ok(event);
                }
                _ => return Ok(event),
            }
        }
    }

    /// Skip what is left of a statement whose row stream was dropped.
    async fn drain_statement(&mut self) -> Result<()> {
        while self.machine.statement_open() {
            self.next_event().await?;
        }
        Ok(())
    }

    /// Result of the next statement, which must not return rows.
    ///
    /// A statement that does return rows is read to its end without
    /// decoding and reported as [`Error::UnexpectedResult`].
    pub async fn exec_results(&mut self) -> Result<CommandResult> {
        self.drain_statement().await?;
        self.machine.begin()?;

        let mut returned_rows = false;
        loop {
            match self.next_event().await? {
                BatchEvent::RowDescription => returned_rows = true,
                BatchEvent::NoData | BatchEvent::DataRow => {}
                BatchEvent::Complete(result) if returned_rows => {
                    return Err(Error::UnexpectedResult(format!(
                        "statement returned rows ({}); read it with query_results",
                        result.tag()
                    )));
                }
                BatchEvent::Complete(result) => return Ok(result),
                BatchEvent::Error(e) => return Err(Error::Server(e)),
                other => return Err(unexpected(&other)),
            }
        }
    }

    /// Rows of the next statement.
    ///
    /// A statement without a result set is reported as
    /// [`Error::UnexpectedResult`] after it is read.
    pub async fn query_results(&mut self) -> Result<Rows<'_, 'c>> {
        self.drain_statement().await?;
        self.machine.begin()?;

        loop {
            match self.next_event().await? {
                BatchEvent::RowDescription => return Ok(Rows::new(self)),
                BatchEvent::NoData => {}
                BatchEvent::Complete(result) => {
                    return Err(Error::UnexpectedResult(format!(
                        "statement returned no result set ({}); read it with exec_results",
                        result.tag()
                    )));
                }
                BatchEvent::Error(e) => return Err(Error::Server(e)),
                other => return Err(unexpected(&other)),
            }
        }
    }

    /// The single row of the next statement, checked by [`RowResult::scan`].
    pub async fn query_row_results(&mut self) -> RowResult<'_, 'c> {
        RowResult {
            rows: self.query_results().await,
        }
    }

    /// Read the rest of the batch and wait for the server to finish it.
    ///
    /// Returns the first server error of the batch, wherever it occurred.
    pub async fn close(mut self) -> Result<()> {
        while !self.machine.is_finished() {
            if let Err(e) = self.next_event().await {
                self.closed = true;
                return Err(e);
            }
        }
        self.closed = true;
        match self.machine.error() {
            Some(e) => Err(Error::Server(e.clone())),
            None => Ok(()),
        }
    }
}

impl Drop for BatchResults<'_> {
    fn drop(&mut self) {
        if self.closed || self.machine.is_finished() {
            return;
        }
        self.conn.pending_batch = Some(std::mem::take(&mut self.machine));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowsState {
    Streaming,
    Exhausted,
    Errored,
}

/// Rows of one statement of a batch, read one at a time.
///
/// ```ignore
/// let mut rows = results.query_results().await?;
/// while rows.advance().await {
///     let (id, name): (i32, &str) = rows.scan()?;
/// }
/// rows.close().await?;
/// ```
///
/// A stream dropped before its last row is skipped by the next call on the
/// batch.
pub struct Rows<'r, 'c> {
    results: &'r mut BatchResults<'c>,
    state: RowsState,
    has_row: bool,
    error: Option<Error>,
    result: Option<CommandResult>,
}

impl<'r, 'c> Rows<'r, 'c> {
    fn new(results: &'r mut BatchResults<'c>) -> Self {
        Self {
            results,
            state: RowsState::Streaming,
            has_row: false,
            error: None,
            result: None,
        }
    }

    fn fail(&mut self, error: Error) {
        self.state = RowsState::Errored;
        self.error = Some(error);
    }

    /// Move to the next row. Returns `false` at the end of the rows or on
    /// error; [`err`](Self::err) tells the two apart.
    pub async fn advance(&mut self) -> bool {
        self.has_row = false;
        if self.state != RowsState::Streaming {
            return false;
        }

        match self.results.next_event().await {
            Ok(BatchEvent::DataRow) => {
                self.has_row = true;
                true
            }
            Ok(BatchEvent::Complete(result)) => {
                self.result = Some(result);
                self.state = RowsState::Exhausted;
                false
            }
            Ok(BatchEvent::Error(e)) => {
                self.fail(Error::Server(e));
                false
            }
            Ok(other) => {
                self.results.conn.is_broken = true;
                self.fail(unexpected(&other));
                false
            }
            Err(e) => {
                self.fail(e);
                false
            }
        }
    }

    /// Decode the current row.
    pub fn scan<'s, T: FromRow<'s>>(&'s self) -> Result<T> {
        if !self.has_row {
            return Err(Error::InvalidUsage(
                "no current row; call advance() first".into(),
            ));
        }
        let buffer_set = &self.results.conn.buffer_set;
        let cols = buffer_set.columns()?;
        let row = DataRow::parse(&buffer_set.read_buffer)?;
        T::from_row(cols.fields(), row)
    }

    /// Columns of the result set.
    pub fn columns(&self) -> Result<RowDescription<'_>> {
        self.results.conn.buffer_set.columns()
    }

    /// The error that ended the stream, if any.
    pub fn err(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Completion of the statement, once every row was read.
    pub fn command_result(&self) -> Option<&CommandResult> {
        self.result.as_ref()
    }

    /// Skip any remaining rows and return the error that ended the stream.
    pub async fn close(mut self) -> Result<()> {
        while self.advance().await {}
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// The result of [`BatchResults::query_row_results`].
pub struct RowResult<'r, 'c> {
    rows: Result<Rows<'r, 'c>>,
}

impl RowResult<'_, '_> {
    /// Decode the only row.
    ///
    /// Fails with [`Error::NoRows`] or [`Error::TooManyRows`] when the
    /// statement did not return exactly one row. Any error that ended the
    /// rows takes precedence.
    pub async fn scan<T: for<'a> FromRow<'a>>(self) -> Result<T> {
        let mut rows = self.rows?;
        if !rows.advance().await {
            rows.close().await?;
            return Err(Error::NoRows);
        }
        let value = rows.scan::<T>();
        let extra = rows.advance().await;
        rows.close().await?;
        if extra {
            return Err(Error::TooManyRows);
        }
        value
    }
}

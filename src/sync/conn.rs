//! Synchronous PostgreSQL connection.

use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::batch::{Batch, write_batch};
use crate::buffer_set::BufferSet;
use crate::conversion::FromRow;
use crate::error::{Error, Result};
use crate::handler::{CollectHandler, DropHandler, FirstRowHandler, TextHandler};
use crate::opts::Opts;
use crate::protocol::backend::BackendKeyData;
use crate::protocol::frontend::write_terminate;
use crate::protocol::types::TransactionStatus;
use crate::state::{
    Action, BatchStateMachine, ConnectionStateMachine, SimpleQueryStateMachine, StateMachine,
};

use super::batch::BatchResults;
use super::stream::Stream;
use super::transaction::Transaction;

/// Run a state machine to completion over `stream`.
fn drive<S: StateMachine>(
    stream: &mut Stream,
    buffer_set: &mut BufferSet,
    state_machine: &mut S,
) -> Result<()> {
    let mut action = state_machine.start(buffer_set)?;
    loop {
        match action {
            Action::WriteAndReadMessage => {
                stream.write_all(&buffer_set.write_buffer)?;
                stream.flush()?;
            }
            Action::ReadMessage => {}
            Action::HandleAsyncMessageAndReadMessage(msg) => msg.log(),
            Action::Finished => return Ok(()),
        }
        stream.read_message(buffer_set)?;
        action = state_machine.step(buffer_set)?;
    }
}

/// Synchronous PostgreSQL connection.
pub struct Conn {
    pub(crate) stream: Stream,
    pub(crate) buffer_set: BufferSet,
    backend_key: Option<BackendKeyData>,
    server_params: Vec<(String, String)>,
    pub(crate) transaction_status: TransactionStatus,
    pub(crate) is_broken: bool,
}

impl Conn {
    /// Connect to a PostgreSQL server.
    pub fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;

        let stream = if let Some(socket_path) = &opts.socket {
            Stream::unix(UnixStream::connect(socket_path)?)
        } else {
            if opts.host.is_empty() {
                return Err(Error::InvalidUsage("host is empty".into()));
            }
            let tcp = TcpStream::connect((opts.host.as_str(), opts.port))?;
            tcp.set_nodelay(true)?;
            Stream::tcp(tcp)
        };

        Self::new_with_stream(stream, opts)
    }

    /// Run the startup handshake over an existing stream.
    pub fn new_with_stream(mut stream: Stream, options: Opts) -> Result<Self> {
        stream.set_read_timeout(options.read_timeout)?;

        let mut buffer_set = BufferSet::new();
        let mut state_machine = ConnectionStateMachine::new(options);
        drive(&mut stream, &mut buffer_set, &mut state_machine)?;

        Ok(Self {
            stream,
            buffer_set,
            backend_key: state_machine.backend_key().copied(),
            server_params: state_machine.take_server_params(),
            transaction_status: state_machine.transaction_status(),
            is_broken: false,
        })
    }

    /// Get the backend key data for query cancellation.
    pub fn backend_key(&self) -> Option<&BackendKeyData> {
        self.backend_key.as_ref()
    }

    /// Get the connection ID (backend process ID).
    ///
    /// Returns 0 if the backend key data is not available.
    pub fn connection_id(&self) -> u32 {
        self.backend_key.as_ref().map_or(0, |k| k.process_id())
    }

    /// Get server parameters.
    pub fn server_params(&self) -> &[(String, String)] {
        &self.server_params
    }

    /// Get the current transaction status.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Check if currently in a transaction.
    pub fn in_transaction(&self) -> bool {
        self.transaction_status.in_transaction()
    }

    /// Check if the connection is broken.
    pub fn is_broken(&self) -> bool {
        self.is_broken
    }

    /// Change the bound on blocking reads. A read that times out breaks the
    /// connection.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    fn check_usable(&self) -> Result<()> {
        if self.is_broken {
            return Err(Error::ConnectionBroken);
        }
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && e.is_connection_broken()
        {
            self.is_broken = true;
        }
        result
    }

    /// Execute a simple query with a handler.
    pub fn query<H: TextHandler>(&mut self, sql: &str, handler: &mut H) -> Result<()> {
        self.check_usable()?;
        let result = self.query_inner(sql, handler);
        self.track(result)
    }

    fn query_inner<H: TextHandler>(&mut self, sql: &str, handler: &mut H) -> Result<()> {
        let mut state_machine = SimpleQueryStateMachine::new(sql, handler);
        drive(&mut self.stream, &mut self.buffer_set, &mut state_machine)?;
        self.transaction_status = state_machine.transaction_status();
        match state_machine.take_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Execute a simple query and discard results.
    pub fn query_drop(&mut self, sql: &str) -> Result<Option<u64>> {
        let mut handler = DropHandler::new();
        self.query(sql, &mut handler)?;
        Ok(handler.rows_affected())
    }

    /// Execute a simple query and collect typed rows.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let rows: Vec<(i32, String)> = conn.query_collect("SELECT id, name FROM users")?;
    /// ```
    pub fn query_collect<T: for<'a> FromRow<'a>>(&mut self, sql: &str) -> Result<Vec<T>> {
        let mut handler = CollectHandler::<T>::new();
        self.query(sql, &mut handler)?;
        Ok(handler.into_rows())
    }

    /// Execute a simple query and return the first typed row.
    pub fn query_first<T: for<'a> FromRow<'a>>(&mut self, sql: &str) -> Result<Option<T>> {
        let mut handler = FirstRowHandler::<T>::new();
        self.query(sql, &mut handler)?;
        Ok(handler.into_row())
    }

    /// Send every statement of `batch` in one write.
    ///
    /// Results are read back in queue order from the returned
    /// [`BatchResults`], which borrows the connection until it is closed or
    /// dropped. An encode failure is returned before anything is written.
    pub fn send_batch(&mut self, batch: &Batch<'_>) -> Result<BatchResults<'_>> {
        self.check_usable()?;

        let buf = &mut self.buffer_set.write_buffer;
        buf.clear();
        let parses = write_batch(buf, batch)?;
        tracing::debug!(statements = batch.len(), bytes = buf.len(), "sending batch");

        let written = self.stream.write_all(buf).and_then(|()| self.stream.flush());
        self.track(written.map_err(Error::from))?;

        Ok(BatchResults::new(self, BatchStateMachine::new(parses)))
    }

    /// Start a transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if a transaction is already open.
    pub fn begin(&mut self) -> Result<Transaction> {
        if self.in_transaction() {
            return Err(Error::InvalidUsage(
                "nested transactions are not supported".into(),
            ));
        }
        self.query_drop("BEGIN")?;
        Ok(Transaction::new(
            self.backend_key.as_ref().map(|k| k.process_id()),
        ))
    }

    /// Execute a closure within a transaction.
    ///
    /// The transaction is rolled back if the closure returns `Err` or leaves
    /// it open without calling `commit` or `rollback`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if called while already in a transaction.
    pub fn run_transaction<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Conn, Transaction) -> Result<R>,
    {
        let tx = self.begin()?;
        let result = f(self, tx);

        if self.in_transaction() && !self.is_broken {
            let rollback_result = self.query_drop("ROLLBACK");
            let value = result?;
            rollback_result?;
            return Ok(value);
        }

        result
    }

    fn terminate(&mut self) -> Result<()> {
        let buf = &mut self.buffer_set.write_buffer;
        buf.clear();
        write_terminate(buf)?;
        self.stream.write_all(buf)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Close the connection gracefully.
    pub fn close(mut self) -> Result<()> {
        let result = self.terminate();
        // Terminate is sent once; Drop skips broken connections.
        self.is_broken = true;
        result
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        if !self.is_broken {
            let _ = self.terminate();
        }
    }
}

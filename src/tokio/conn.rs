//! Asynchronous PostgreSQL connection.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::net::UnixStream;

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
    Action, BatchEvent, BatchStateMachine, ConnectionStateMachine, SimpleQueryStateMachine,
    StateMachine,
};

use super::batch::BatchResults;
use super::stream::Stream;
use super::transaction::Transaction;

/// Drive a state machine to completion.
async fn drive<S: StateMachine>(
    stream: &mut Stream,
    buffer_set: &mut BufferSet,
    read_timeout: Option<Duration>,
    state_machine: &mut S,
) -> Result<()> {
    let mut action = state_machine.start(buffer_set)?;
    loop {
        match action {
            Action::WriteAndReadMessage => {
                stream.write_all(&buffer_set.write_buffer).await?;
                stream.flush().await?;
            }
            Action::ReadMessage => {}
            Action::HandleAsyncMessageAndReadMessage(msg) => msg.log(),
            Action::Finished => return Ok(()),
        }
        stream.read_message(buffer_set, read_timeout).await?;
        action = state_machine.step(buffer_set)?;
    }
}

/// Asynchronous PostgreSQL connection.
///
/// An operation whose future is dropped before it completes leaves the
/// connection broken, since its position in the response stream is unknown.
pub struct Conn {
    pub(crate) stream: Stream,
    pub(crate) buffer_set: BufferSet,
    backend_key: Option<BackendKeyData>,
    server_params: Vec<(String, String)>,
    pub(crate) transaction_status: TransactionStatus,
    pub(crate) is_broken: bool,
    pub(crate) read_timeout: Option<Duration>,
    /// Batch dropped before it was read to the end
    pub(crate) pending_batch: Option<BatchStateMachine>,
}

impl Conn {
    /// Connect to a PostgreSQL server.
    pub async fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;

        let stream = if let Some(socket_path) = &opts.socket {
            Stream::unix(UnixStream::connect(socket_path).await?)
        } else {
            if opts.host.is_empty() {
                return Err(Error::InvalidUsage("host is empty".into()));
            }
            let tcp = TcpStream::connect((opts.host.as_str(), opts.port)).await?;
            tcp.set_nodelay(true)?;
            Stream::tcp(tcp)
        };

        Self::new_with_stream(stream, opts).await
    }

    /// Run the startup handshake over an existing stream.
    pub async fn new_with_stream(mut stream: Stream, options: Opts) -> Result<Self> {
        let read_timeout = options.read_timeout;
        let mut buffer_set = BufferSet::new();
        let mut state_machine = ConnectionStateMachine::new(options);
        drive(&mut stream, &mut buffer_set, read_timeout, &mut state_machine).await?;

        Ok(Self {
            stream,
            buffer_set,
            backend_key: state_machine.backend_key().copied(),
            server_params: state_machine.take_server_params(),
            transaction_status: state_machine.transaction_status(),
            is_broken: false,
            read_timeout,
            pending_batch: None,
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

    /// Change the bound on each read. A read that times out breaks the
    /// connection.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Read a dropped batch to its end.
    async fn resync(&mut self) -> Result<()> {
        let Some(mut machine) = self.pending_batch.take() else {
            return Ok(());
        };
        tracing::warn!(
            unread = machine.remaining(),
            "draining batch dropped without close"
        );

        while !machine.is_finished() {
            self.stream
                .read_message(&mut self.buffer_set, self.read_timeout)
                .await?;
            match machine.step(&self.buffer_set)? {
                BatchEvent::Async(msg) => msg.log(),
                BatchEvent::Ready => self.transaction_status = machine.transaction_status(),
                _ => {}
            }
        }

        if let Some(e) = machine.error() {
            tracing::debug!("batch dropped without close failed: {}", e);
        }
        Ok(())
    }

    /// Make the connection ready for a new command.
    ///
    /// The connection counts as broken until the command completes.
    async fn begin_io(&mut self) -> Result<()> {
        if self.is_broken {
            return Err(Error::ConnectionBroken);
        }
        self.is_broken = true;
        let result = self.resync().await;
        self.end_io(result)
    }

    fn end_io<T>(&mut self, result: Result<T>) -> Result<T> {
        self.is_broken = matches!(&result, Err(e) if e.is_connection_broken());
        result
    }

    /// Execute a simple query with a handler.
    pub async fn query<H: TextHandler>(&mut self, sql: &str, handler: &mut H) -> Result<()> {
        self.begin_io().await?;
        self.is_broken = true;
        let result = self.query_inner(sql, handler).await;
        self.end_io(result)
    }

    async fn query_inner<H: TextHandler>(&mut self, sql: &str, handler: &mut H) -> Result<()> {
        let mut state_machine = SimpleQueryStateMachine::new(sql, handler);
        drive(
            &mut self.stream,
            &mut self.buffer_set,
            self.read_timeout,
            &mut state_machine,
        )
        .await?;
        self.transaction_status = state_machine.transaction_status();
        match state_machine.take_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Execute a simple query and discard results.
    pub async fn query_drop(&mut self, sql: &str) -> Result<Option<u64>> {
        let mut handler = DropHandler::new();
        self.query(sql, &mut handler).await?;
        Ok(handler.rows_affected())
    }

    /// Execute a simple query and collect typed rows.
    pub async fn query_collect<T: for<'a> FromRow<'a>>(&mut self, sql: &str) -> Result<Vec<T>> {
        let mut handler = CollectHandler::<T>::new();
        self.query(sql, &mut handler).await?;
        Ok(handler.into_rows())
    }

    /// Execute a simple query and return the first typed row.
    pub async fn query_first<T: for<'a> FromRow<'a>>(&mut self, sql: &str) -> Result<Option<T>> {
        let mut handler = FirstRowHandler::<T>::new();
        self.query(sql, &mut handler).await?;
        Ok(handler.into_row())
    }

    /// Send every statement of `batch` in one write.
    ///
    /// See [`BatchResults`] for reading the results. Dropping the results
    /// before [`BatchResults::close`] is allowed; the next operation on the
    /// connection reads what is left first.
    pub async fn send_batch(&mut self, batch: &Batch<'_>) -> Result<BatchResults<'_>> {
        self.begin_io().await?;

        let buf = &mut self.buffer_set.write_buffer;
        buf.clear();
        let parses = write_batch(buf, batch)?;
        tracing::debug!(statements = batch.len(), bytes = buf.len(), "sending batch");

        self.is_broken = true;
        let written = match self.stream.write_all(buf).await {
            Ok(()) => self.stream.flush().await,
            Err(e) => Err(e),
        };
        self.end_io(written.map_err(Error::from))?;

        Ok(BatchResults::new(self, BatchStateMachine::new(parses)))
    }

    /// Start a transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if a transaction is already open.
    pub async fn begin(&mut self) -> Result<Transaction> {
        if self.in_transaction() {
            return Err(Error::InvalidUsage(
                "nested transactions are not supported".into(),
            ));
        }
        self.query_drop("BEGIN").await?;
        Ok(Transaction::new(
            self.backend_key.as_ref().map(|k| k.process_id()),
        ))
    }

    /// Close the connection gracefully.
    pub async fn close(mut self) -> Result<()> {
        self.buffer_set.write_buffer.clear();
        write_terminate(&mut self.buffer_set.write_buffer)?;
        self.stream.write_all(&self.buffer_set.write_buffer).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

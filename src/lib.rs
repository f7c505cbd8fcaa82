//! Pipelined batches for PostgreSQL.
//!
//! # Features
//!
//! - **One round trip per batch**: every queued statement and a single Sync
//!   are sent in one write
//! - **Ordered, streaming results**: each statement's result is read in queue
//!   order, rows one at a time straight from the read buffer
//! - **Sticky batch errors**: the first server error of a batch, including an
//!   error raised only at the end of the batch, is reported by `close`
//! - **Arrays**: multi-dimensional arrays in text and binary form
//! - **Sans-I/O state machines**: Protocol logic is separated from I/O
//! - **Sync and async APIs**: Choose between synchronous and tokio-based async
//!
//! # Example
//!
//! ```no_run
//! use pg_batch::sync::Conn;
//! use pg_batch::{Batch, Opts};
//!
//! fn main() -> pg_batch::Result<()> {
//!     let opts = Opts {
//!         host: "localhost".into(),
//!         user: "postgres".into(),
//!         database: Some("mydb".into()),
//!         password: Some("secret".into()),
//!         ..Default::default()
//!     };
//!     let mut conn = Conn::new(opts)?;
//!
//!     let mut batch = Batch::new();
//!     batch.queue("INSERT INTO items (name) VALUES ($1)", ("a",));
//!     batch.queue("SELECT id, name FROM items ORDER BY id", ());
//!
//!     let mut results = conn.send_batch(&batch)?;
//!     println!("inserted {}", results.exec_results()?.rows_affected());
//!
//!     let mut rows = results.query_results()?;
//!     while rows.advance() {
//!         let (id, name): (i32, &str) = rows.scan()?;
//!         println!("{id}: {name}");
//!     }
//!     rows.close()?;
//!     results.close()?;
//!
//!     conn.close()
//! }
//! ```

pub mod batch;
pub mod buffer_set;
pub mod conversion;
pub mod error;
pub mod handler;
pub mod opts;
pub mod protocol;
pub mod state;

#[cfg(feature = "sync")]
pub mod sync;

#[cfg(feature = "tokio")]
pub mod tokio;

pub use batch::{Batch, CommandResult, QueuedStatement, StatementTarget};
pub use buffer_set::BufferSet;
pub use conversion::{
    Array, ArrayDimension, ArrayElement, ArrayStatus, FromRow, FromWireValue, IsNull, ToParams,
    ToWireValue,
};
pub use error::{Error, Result, ServerError};
pub use handler::{CollectHandler, DropHandler, FirstRowHandler, TextHandler};
pub use opts::Opts;
pub use protocol::types::{FormatCode, Oid, TransactionStatus, oid};

//! Asynchronous PostgreSQL client using Tokio.

mod batch;
mod conn;
mod stream;
mod transaction;

pub use batch::{BatchResults, RowResult, Rows};
pub use conn::Conn;
pub use stream::Stream;
pub use transaction::Transaction;

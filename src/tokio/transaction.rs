//! Transaction support for asynchronous PostgreSQL connections.

use super::Conn;
use super::batch::BatchResults;
use crate::batch::Batch;
use crate::error::Result;
use crate::state::connection::check_same_backend;

/// A PostgreSQL transaction for the asynchronous connection.
///
/// Created by [`Conn::begin`]. The connection is passed to every method,
/// and must be the one the transaction was started on. The check compares
/// backend process IDs, so it is skipped when the server sent no
/// BackendKeyData.
pub struct Transaction {
    backend_pid: Option<u32>,
}

impl Transaction {
    pub(crate) fn new(backend_pid: Option<u32>) -> Self {
        Self { backend_pid }
    }

    fn check(&self, conn: &Conn) -> Result<()> {
        check_same_backend(self.backend_pid, conn.backend_key().map(|k| k.process_id()))
    }

    /// Send a batch inside the transaction.
    pub async fn send_batch<'c>(
        &self,
        conn: &'c mut Conn,
        batch: &Batch<'_>,
    ) -> Result<BatchResults<'c>> {
        self.check(conn)?;
        conn.send_batch(batch).await
    }

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if the connection is not the same
    /// as the one that started the transaction.
    pub async fn commit(self, conn: &mut Conn) -> Result<()> {
        self.check(conn)?;
        conn.query_drop("COMMIT").await?;
        Ok(())
    }

    /// Roll back the transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if the connection is not the same
    /// as the one that started the transaction.
    pub async fn rollback(self, conn: &mut Conn) -> Result<()> {
        self.check(conn)?;
        conn.query_drop("ROLLBACK").await?;
        Ok(())
    }
}

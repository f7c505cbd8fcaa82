//! Callbacks for simple query results.
//!
//! Simple queries are only used around batches (transaction control,
//! `PREPARE`, setup statements), so every value arrives in text format.

use crate::batch::CommandResult;
use crate::conversion::FromRow;
use crate::error::Result;
use crate::protocol::backend::query::{DataRow, RowDescription};

/// Receives the results of a simple query.
///
/// A query string may hold several statements. Each statement produces
/// `result_start`, then `row` per row, then `result_end` when it returns rows,
/// and only `result_end` otherwise:
///
/// ```text
/// SELECT 1; UPDATE foo SET x = 1
///
/// result_start, row, result_end    (SELECT 1)
/// result_end                       (UPDATE)
/// ```
///
/// After the first error, from the server or from a callback, no further
/// callbacks are made for the query.
pub trait TextHandler {
    fn result_start(&mut self, cols: RowDescription<'_>) -> Result<()> {
        let _ = cols;
        Ok(())
    }

    fn row(&mut self, cols: RowDescription<'_>, row: DataRow<'_>) -> Result<()>;

    fn result_end(&mut self, result: CommandResult) -> Result<()> {
        let _ = result;
        Ok(())
    }
}

/// Ignores rows and remembers how the last statement completed.
#[derive(Debug, Default)]
pub struct DropHandler {
    last: Option<CommandResult>,
}

impl DropHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row count of the last completed statement.
    pub fn rows_affected(&self) -> Option<u64> {
        self.last.as_ref().map(CommandResult::rows_affected)
    }

    pub fn into_result(self) -> Option<CommandResult> {
        self.last
    }
}

impl TextHandler for DropHandler {
    fn row(&mut self, _cols: RowDescription<'_>, _row: DataRow<'_>) -> Result<()> {
        Ok(())
    }

    fn result_end(&mut self, result: CommandResult) -> Result<()> {
        self.last = Some(result);
        Ok(())
    }
}

/// Decodes every row into `T`.
///
/// ```ignore
/// let mut handler = CollectHandler::<(i32, String)>::new();
/// conn.query("SELECT id, name FROM users", &mut handler)?;
/// let users = handler.into_rows();
/// ```
pub struct CollectHandler<T> {
    rows: Vec<T>,
}

impl<T> CollectHandler<T> {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<T> {
        self.rows
    }
}

impl<T> Default for CollectHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: for<'a> FromRow<'a>> TextHandler for CollectHandler<T> {
    fn row(&mut self, cols: RowDescription<'_>, row: DataRow<'_>) -> Result<()> {
        let value = T::from_row(cols.fields(), row)?;
        self.rows.push(value);
        Ok(())
    }
}

/// Decodes the first row into `T` and skips the rest undecoded.
pub struct FirstRowHandler<T> {
    row: Option<T>,
}

impl<T> FirstRowHandler<T> {
    pub fn new() -> Self {
        Self { row: None }
    }

    pub fn into_row(self) -> Option<T> {
        self.row
    }
}

impl<T> Default for FirstRowHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: for<'a> FromRow<'a>> TextHandler for FirstRowHandler<T> {
    fn row(&mut self, cols: RowDescription<'_>, row: DataRow<'_>) -> Result<()> {
        if self.row.is_some() {
            return Ok(());
        }
        self.row = Some(T::from_row(cols.fields(), row)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    // One int4 column named "n", text format.
    const COLS: &[u8] = b"\x00\x01n\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x17\x00\x04\xff\xff\xff\xff\x00\x00";

    fn row(value: &[u8]) -> Vec<u8> {
        let mut payload = 1i16.to_be_bytes().to_vec();
        payload.extend_from_slice(&(value.len() as i32).to_be_bytes());
        payload.extend_from_slice(value);
        payload
    }

    #[test]
    fn first_row_skips_the_rest() {
        let mut handler = FirstRowHandler::<(i32,)>::new();
        for value in [&b"7"[..], b"not a number"] {
            let cols = RowDescription::parse(COLS).unwrap();
            let payload = row(value);
            handler.row(cols, DataRow::parse(&payload).unwrap()).unwrap();
        }
        assert_eq!(handler.into_row(), Some((7,)));
    }

    #[test]
    fn collect_propagates_decode_errors() {
        let mut handler = CollectHandler::<(i32,)>::new();
        let cols = RowDescription::parse(COLS).unwrap();
        let payload = row(b"x");
        let result = handler.row(cols, DataRow::parse(&payload).unwrap());
        assert!(matches!(result, Err(Error::Decode(_))));
        assert!(handler.is_empty());
    }

    #[test]
    fn drop_handler_keeps_last_completion() {
        let mut handler = DropHandler::new();
        assert_eq!(handler.rows_affected(), None);
        handler.result_end(CommandResult::parse(b"INSERT 0 2\0").unwrap()).unwrap();
        handler.result_end(CommandResult::parse(b"CREATE TABLE\0").unwrap()).unwrap();
        assert_eq!(handler.rows_affected(), Some(0));
        assert_eq!(handler.into_result().unwrap().command(), "CREATE");
    }
}

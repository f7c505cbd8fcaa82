//! Batches of statements sent in one round trip.
//!
//! A [`Batch`] is filled with statements, then handed to `send_batch` on a
//! connection. Every statement is framed as Parse (for SQL text), Bind,
//! Describe and Execute on the unnamed statement and portal, and one Sync
//! closes the whole batch:
//!
//! ```text
//! Parse Bind Describe Execute  Parse Bind Describe Execute  ...  Sync
//! ```
//!
//! The server answers each statement in order, so results are read back in
//! the order the statements were queued.

use crate::conversion::ToParams;
use crate::error::{Error, Result};
use crate::protocol::backend::CommandComplete;
use crate::protocol::frontend::{
    write_bind, write_describe_portal, write_execute, write_parse, write_sync,
};
use crate::protocol::types::{FormatCode, Oid, oid};

/// What a queued statement executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementTarget {
    /// SQL text, parsed into the unnamed statement.
    Sql(String),
    /// A statement already prepared on this connection under this name.
    Prepared(String),
}

/// A statement waiting in a [`Batch`].
pub struct QueuedStatement<'a> {
    target: StatementTarget,
    params: Box<dyn ToParams + Send + Sync + 'a>,
    param_oids: Vec<Oid>,
    param_formats: Vec<FormatCode>,
    result_formats: Vec<FormatCode>,
}

impl QueuedStatement<'_> {
    /// Declare parameter types. `0` leaves a parameter's type to its value.
    pub fn param_types(&mut self, oids: &[Oid]) -> &mut Self {
        self.param_oids = oids.to_vec();
        self
    }

    /// Send parameters in these formats instead of each value's preference.
    pub fn param_formats(&mut self, formats: &[FormatCode]) -> &mut Self {
        self.param_formats = formats.to_vec();
        self
    }

    /// Request result columns in these formats.
    ///
    /// Empty means text for every column. One entry applies to all columns.
    pub fn result_formats(&mut self, formats: &[FormatCode]) -> &mut Self {
        self.result_formats = formats.to_vec();
        self
    }

    pub fn target(&self) -> &StatementTarget {
        &self.target
    }

    /// OIDs declared in Parse and used to encode each parameter.
    fn resolved_oids(&self) -> Result<Vec<Oid>> {
        let natural = self.params.natural_oids();
        if self.param_oids.is_empty() {
            return Ok(natural);
        }
        if self.param_oids.len() != natural.len() {
            return Err(Error::InvalidUsage(format!(
                "{} parameter types declared for {} parameters",
                self.param_oids.len(),
                natural.len()
            )));
        }
        Ok(self
            .param_oids
            .iter()
            .zip(natural)
            .map(|(&declared, natural)| {
                if declared == oid::UNSPECIFIED {
                    natural
                } else {
                    declared
                }
            })
            .collect())
    }

    fn resolved_formats(&self, oids: &[Oid]) -> Result<Vec<FormatCode>> {
        if self.param_formats.is_empty() {
            return Ok(self.params.preferred_formats(oids));
        }
        if self.param_formats.len() != oids.len() {
            return Err(Error::InvalidUsage(format!(
                "{} parameter formats given for {} parameters",
                self.param_formats.len(),
                oids.len()
            )));
        }
        Ok(self.param_formats.clone())
    }

    fn write(&self, buf: &mut Vec<u8>) -> Result<bool> {
        let oids = self.resolved_oids()?;
        let formats = self.resolved_formats(&oids)?;

        let (statement, parse) = match &self.target {
            StatementTarget::Sql(sql) => {
                write_parse(buf, "", sql, &oids)?;
                ("", true)
            }
            StatementTarget::Prepared(name) => (name.as_str(), false),
        };

        write_bind(
            buf,
            "",
            statement,
            &*self.params,
            &oids,
            &formats,
            &self.result_formats,
        )?;
        write_describe_portal(buf, "")?;
        write_execute(buf, "", 0)?;
        Ok(parse)
    }
}

impl std::fmt::Debug for QueuedStatement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedStatement")
            .field("target", &self.target)
            .field("param_count", &self.params.param_count())
            .field("param_oids", &self.param_oids)
            .field("param_formats", &self.param_formats)
            .field("result_formats", &self.result_formats)
            .finish()
    }
}

/// An ordered list of statements to send in one round trip.
///
/// # Example
///
/// ```ignore
/// let mut batch = Batch::new();
/// batch.queue("INSERT INTO t (id) VALUES ($1)", (1_i32,));
/// batch.queue("SELECT id FROM t", ());
///
/// let mut results = conn.send_batch(&batch)?;
/// let inserted = results.exec_results()?;
/// let mut rows = results.query_results()?;
/// while rows.advance() {
///     let (id,): (i32,) = rows.scan()?;
/// }
/// rows.close()?;
/// results.close()?;
/// ```
#[derive(Debug, Default)]
pub struct Batch<'a> {
    statements: Vec<QueuedStatement<'a>>,
}

impl<'a> Batch<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue SQL text with its parameters.
    pub fn queue<P>(&mut self, sql: impl Into<String>, params: P) -> &mut QueuedStatement<'a>
    where
        P: ToParams + Send + Sync + 'a,
    {
        self.push(StatementTarget::Sql(sql.into()), params)
    }

    /// Queue a statement prepared earlier on the connection, e.g. with `PREPARE`.
    pub fn queue_prepared<P>(
        &mut self,
        name: impl Into<String>,
        params: P,
    ) -> &mut QueuedStatement<'a>
    where
        P: ToParams + Send + Sync + 'a,
    {
        self.push(StatementTarget::Prepared(name.into()), params)
    }

    /// Queue a statement with explicit parameter types and result formats.
    pub fn queue_with<P>(
        &mut self,
        target: StatementTarget,
        params: P,
        param_oids: &[Oid],
        result_formats: &[FormatCode],
    ) -> &mut QueuedStatement<'a>
    where
        P: ToParams + Send + Sync + 'a,
    {
        self.push(target, params)
            .param_types(param_oids)
            .result_formats(result_formats)
    }

    fn push<P>(&mut self, target: StatementTarget, params: P) -> &mut QueuedStatement<'a>
    where
        P: ToParams + Send + Sync + 'a,
    {
        let index = self.statements.len();
        self.statements.push(QueuedStatement {
            target,
            params: Box::new(params),
            param_oids: Vec::new(),
            param_formats: Vec::new(),
            result_formats: Vec::new(),
        });
        &mut self.statements[index]
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statements(&self) -> &[QueuedStatement<'a>] {
        &self.statements
    }
}

/// Append the whole batch and a trailing Sync to `buf`.
///
/// Returns, per statement, whether a Parse was sent. On error `buf` is
/// restored to its previous length so nothing partial reaches the socket.
pub(crate) fn write_batch(buf: &mut Vec<u8>, batch: &Batch<'_>) -> Result<Vec<bool>> {
    let start = buf.len();
    let result = batch
        .statements
        .iter()
        .map(|stmt| stmt.write(buf))
        .collect::<Result<Vec<bool>>>()
        .and_then(|parses| {
            write_sync(buf)?;
            Ok(parses)
        });
    if result.is_err() {
        buf.truncate(start);
    }
    result
}

/// Completion of a statement that does not return rows, or of one whose
/// rows were all read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    tag: String,
}

impl CommandResult {
    /// Parse a CommandComplete payload.
    pub(crate) fn parse(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            tag: CommandComplete::parse(payload)?.tag.to_string(),
        })
    }

    /// Result of an empty query string.
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    /// The full command tag, e.g. `INSERT 0 3`.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The command verb, e.g. `INSERT`. Empty for an empty query.
    pub fn command(&self) -> &str {
        CommandComplete { tag: &self.tag }.command().unwrap_or_default()
    }

    /// Rows inserted, updated, deleted or returned. `0` for commands that
    /// report no count.
    pub fn rows_affected(&self) -> u64 {
        CommandComplete { tag: &self.tag }
            .rows_affected()
            .unwrap_or(0)
    }
}

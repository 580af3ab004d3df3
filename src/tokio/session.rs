//! Statement sessions: plain queries and prepared batches.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::protocol::bind::{BindBuffer, common_rows};
use crate::protocol::query::{QueryReply, binary_query, read_query_reply};
use crate::protocol::stmt;

use super::conn::ConnShared;
use super::cursor::ResultCursor;

/// Queries slower than this are logged
const SLOW_QUERY: Duration = Duration::from_secs(1);

/// Per-call overrides for `Statement::execute_with`
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Correlation id to send under instead of a generated one
    pub req_id: Option<u64>,
    /// Request timeout; zero waits forever
    pub timeout: Option<Duration>,
    /// Database the statement switches to, recorded as the connection's
    /// current database on success
    pub switch_database: Option<String>,
}

enum QueryState {
    Idle,
    Executing,
    ResultReady(ResultCursor),
    UpdateDone(u64),
    Closed,
}

impl QueryState {
    fn name(&self) -> &'static str {
        match self {
            QueryState::Idle => "Idle",
            QueryState::ResultReady(cursor) if cursor.is_closed() => "Idle",
            QueryState::Executing => "Executing",
            QueryState::ResultReady(_) => "ResultReady",
            QueryState::UpdateDone(_) => "UpdateDone",
            QueryState::Closed => "Closed",
        }
    }
}

/// Server-assigned id of a prepared statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreparedHandle(u64);

impl PreparedHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreparedState {
    Prepared,
    TagsBound,
    ColumnsBound,
    BatchAccumulated,
    Executed,
    Closed,
}

impl PreparedState {
    pub fn name(self) -> &'static str {
        match self {
            PreparedState::Prepared => "Prepared",
            PreparedState::TagsBound => "TagsBound",
            PreparedState::ColumnsBound => "ColumnsBound",
            PreparedState::BatchAccumulated => "BatchAccumulated",
            PreparedState::Executed => "Executed",
            PreparedState::Closed => "Closed",
        }
    }
}

struct TableBinding {
    name: String,
    tags: Vec<BindBuffer>,
}

/// One `add_batch` worth of bindings
struct Batch {
    table: Option<TableBinding>,
    columns: Vec<BindBuffer>,
}

struct PreparedEntry {
    state: PreparedState,
    is_insert: bool,
    table: Option<TableBinding>,
    columns: Vec<BindBuffer>,
    batches: Vec<Batch>,
}

impl PreparedEntry {
    fn require_state(
        &self,
        operation: &'static str,
        allowed: &'static [&'static str],
        states: &[PreparedState],
    ) -> Result<()> {
        if states.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidStatementState {
                operation,
                expected: allowed,
                actual: self.state.name(),
            })
        }
    }
}

/// A statement session on one connection
///
/// Runs plain queries and owns the prepared statements created through it.
/// Every operation on a prepared handle is checked against the handle's
/// state before anything is sent.
pub struct Statement {
    conn: Arc<ConnShared>,
    query: QueryState,
    prepared: HashMap<u64, PreparedEntry>,
}

impl Statement {
    pub(crate) fn new(conn: Arc<ConnShared>) -> Self {
        Self {
            conn,
            query: QueryState::Idle,
            prepared: HashMap::new(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if matches!(self.query, QueryState::Closed) {
            Err(Error::StatementClosed)
        } else {
            Ok(())
        }
    }

    /// Run `sql`; returns `true` when it produced a result set
    pub async fn execute(&mut self, sql: &str) -> Result<bool> {
        self.execute_with(sql, QueryOptions::default()).await
    }

    /// Run `sql` with per-call overrides
    ///
    /// A result set left open by a previous call is released first.
    #[instrument(skip_all)]
    pub async fn execute_with(&mut self, sql: &str, options: QueryOptions) -> Result<bool> {
        self.ensure_open()?;
        let command = binary_query(sql)?;
        if let QueryState::ResultReady(mut cursor) =
            std::mem::replace(&mut self.query, QueryState::Executing)
        {
            // A failed release must not block the next query
            if let Err(e) = cursor.close().await {
                debug!(error = %e, "releasing previous result failed");
            }
        }

        let started = Instant::now();
        let result = self
            .conn
            .call(&command, options.req_id, options.timeout, |r| {
                Ok((r.req_id, read_query_reply(&r.body)?))
            })
            .await;
        let (req_id, reply) = match result {
            Ok(ok) => ok,
            Err(e) => {
                self.query = QueryState::Idle;
                return Err(e);
            }
        };

        let elapsed = started.elapsed();
        if elapsed > SLOW_QUERY {
            info!(
                req_id = format_args!("0x{req_id:x}"),
                elapsed_ms = elapsed.as_millis() as u64,
                sql,
                "slow query"
            );
        }

        if let Some(db) = options.switch_database {
            self.conn.set_current_database(db);
        }

        match reply {
            QueryReply::Update { affected_rows } => {
                self.query = QueryState::UpdateDone(affected_rows);
                Ok(false)
            }
            QueryReply::ResultSet(header) => {
                let cursor = ResultCursor::new(Arc::clone(&self.conn), header, options.timeout);
                self.query = QueryState::ResultReady(cursor);
                Ok(true)
            }
        }
    }

    /// Rows affected by the last update
    pub fn affected_rows(&self) -> Result<u64> {
        match &self.query {
            QueryState::UpdateDone(affected_rows) => Ok(*affected_rows),
            QueryState::Closed => Err(Error::StatementClosed),
            other => Err(Error::InvalidStatementState {
                operation: "affected_rows",
                expected: &["UpdateDone"],
                actual: other.name(),
            }),
        }
    }

    /// A result set whose cursor was closed leaves the statement `Idle`
    fn settle(&mut self) {
        if matches!(&self.query, QueryState::ResultReady(cursor) if cursor.is_closed()) {
            self.query = QueryState::Idle;
        }
    }

    /// Cursor over the last query's result set
    pub fn result_set(&mut self) -> Result<&mut ResultCursor> {
        self.settle();
        match &mut self.query {
            QueryState::ResultReady(cursor) => Ok(cursor),
            QueryState::Closed => Err(Error::StatementClosed),
            other => Err(Error::InvalidStatementState {
                operation: "result_set",
                expected: &["ResultReady"],
                actual: other.name(),
            }),
        }
    }

    /// Take ownership of the last query's result set, returning to `Idle`
    pub fn take_result_set(&mut self) -> Result<ResultCursor> {
        self.result_set()?;
        match std::mem::replace(&mut self.query, QueryState::Idle) {
            QueryState::ResultReady(cursor) => Ok(cursor),
            _ => Err(Error::StatementClosed),
        }
    }

    /// Prepare `sql` on the server
    #[instrument(skip_all)]
    pub async fn prepare(&mut self, sql: &str) -> Result<PreparedHandle> {
        self.ensure_open()?;
        let reply = self
            .conn
            .call(&stmt::prepare(sql)?, None, None, |r| {
                stmt::read_prepare_reply(&r.body)
            })
            .await?;
        self.prepared.insert(
            reply.stmt_id,
            PreparedEntry {
                state: PreparedState::Prepared,
                is_insert: reply.is_insert,
                table: None,
                columns: Vec::new(),
                batches: Vec::new(),
            },
        );
        debug!(stmt_id = reply.stmt_id, "statement prepared");
        Ok(PreparedHandle(reply.stmt_id))
    }

    fn entry(&mut self, handle: PreparedHandle) -> Result<&mut PreparedEntry> {
        self.ensure_open()?;
        match self.prepared.get_mut(&handle.0) {
            Some(entry) if entry.state != PreparedState::Closed => Ok(entry),
            _ => Err(Error::StatementClosed),
        }
    }

    /// Current state of a prepared handle
    pub fn prepared_state(&self, handle: PreparedHandle) -> Result<PreparedState> {
        self.prepared
            .get(&handle.0)
            .map(|entry| entry.state)
            .ok_or(Error::StatementClosed)
    }

    /// Whether the server reported the prepared SQL as an insert
    pub fn is_insert(&self, handle: PreparedHandle) -> Result<bool> {
        self.prepared
            .get(&handle.0)
            .map(|entry| entry.is_insert)
            .ok_or(Error::StatementClosed)
    }

    /// Bind the target table and its tag values (one row each)
    pub fn bind_table_name_and_tags(
        &mut self,
        handle: PreparedHandle,
        table_name: &str,
        tags: Vec<BindBuffer>,
    ) -> Result<()> {
        let entry = self.entry(handle)?;
        entry.require_state(
            "bind_table_name_and_tags",
            &["Prepared", "BatchAccumulated", "Executed"],
            &[
                PreparedState::Prepared,
                PreparedState::BatchAccumulated,
                PreparedState::Executed,
            ],
        )?;
        if table_name.is_empty() {
            return Err(Error::BadUsageError("empty table name".into()));
        }
        if let Some(tag) = tags.iter().find(|tag| tag.rows() != 1) {
            return Err(Error::BadUsageError(format!(
                "tag {} has {} rows, expected 1",
                tag.ordinal(),
                tag.rows()
            )));
        }
        check_ordinals(&tags)?;

        entry.table = Some(TableBinding {
            name: table_name.to_string(),
            tags,
        });
        entry.state = PreparedState::TagsBound;
        Ok(())
    }

    /// Bind column values; every buffer must hold the same number of rows
    pub fn bind_columns(&mut self, handle: PreparedHandle, columns: Vec<BindBuffer>) -> Result<()> {
        let entry = self.entry(handle)?;
        entry.require_state(
            "bind_columns",
            &["Prepared", "TagsBound", "BatchAccumulated", "Executed"],
            &[
                PreparedState::Prepared,
                PreparedState::TagsBound,
                PreparedState::BatchAccumulated,
                PreparedState::Executed,
            ],
        )?;
        common_rows(&columns)?;
        check_ordinals(&columns)?;

        entry.columns = columns;
        entry.state = PreparedState::ColumnsBound;
        Ok(())
    }

    /// Move the bound table and columns into the pending batch
    pub fn add_batch(&mut self, handle: PreparedHandle) -> Result<()> {
        let entry = self.entry(handle)?;
        entry.require_state("add_batch", &["ColumnsBound"], &[PreparedState::ColumnsBound])?;
        let batch = Batch {
            table: entry.table.take(),
            columns: std::mem::take(&mut entry.columns),
        };
        entry.batches.push(batch);
        entry.state = PreparedState::BatchAccumulated;
        Ok(())
    }

    /// Send every accumulated batch and execute them, returning affected rows
    ///
    /// The handle leaves `BatchAccumulated` before anything is sent. On
    /// failure, or if the call is dropped before it completes, the batches
    /// are discarded and the handle stays in `Prepared`.
    #[instrument(skip_all)]
    pub async fn execute_batch(&mut self, handle: PreparedHandle) -> Result<u64> {
        let entry = self.entry(handle)?;
        entry.require_state(
            "execute_batch",
            &["BatchAccumulated"],
            &[PreparedState::BatchAccumulated],
        )?;
        let batches = std::mem::take(&mut entry.batches);
        entry.state = PreparedState::Prepared;
        let stmt_id = handle.0;

        let affected_rows = self.send_batches(stmt_id, &batches).await?;
        self.entry(handle)?.state = PreparedState::Executed;
        debug!(stmt_id, batches = batches.len(), affected_rows, "batch executed");
        Ok(affected_rows)
    }

    async fn send_batches(&self, stmt_id: u64, batches: &[Batch]) -> Result<u64> {
        let mux = &self.conn.mux;
        for batch in batches {
            if let Some(table) = &batch.table {
                mux.send(&stmt::set_tags(stmt_id, &table.name, &table.tags)?, None, None)
                    .await?;
            }
            mux.send(&stmt::bind(stmt_id, &batch.columns)?, None, None)
                .await?;
        }
        self.conn
            .call(&stmt::exec(stmt_id), None, None, |r| {
                stmt::read_affected_rows(&r.body)
            })
            .await
    }

    /// Release a prepared statement; closing twice is a no-op
    pub async fn close_prepared(&mut self, handle: PreparedHandle) -> Result<()> {
        self.ensure_open()?;
        let Some(entry) = self.prepared.get_mut(&handle.0) else {
            return Err(Error::StatementClosed);
        };
        if entry.state == PreparedState::Closed {
            return Ok(());
        }
        entry.state = PreparedState::Closed;
        entry.table = None;
        entry.columns.clear();
        entry.batches.clear();
        self.conn
            .mux
            .send(&stmt::close(handle.0), None, None)
            .await?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.query, QueryState::Closed)
    }

    /// Release the open result set and every prepared statement
    ///
    /// Every handle is closed even when one release fails; the first
    /// failure is returned.
    pub async fn close(&mut self) -> Result<()> {
        let previous = std::mem::replace(&mut self.query, QueryState::Closed);
        let mut first_error = None;
        if let QueryState::ResultReady(mut cursor) = previous
            && let Err(e) = cursor.close().await
        {
            first_error.get_or_insert(e);
        }

        for (stmt_id, entry) in self.prepared.iter_mut() {
            if entry.state == PreparedState::Closed {
                continue;
            }
            entry.state = PreparedState::Closed;
            if let Err(e) = self.conn.mux.send(&stmt::close(*stmt_id), None, None).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn check_ordinals(buffers: &[BindBuffer]) -> Result<()> {
    let mut seen = HashSet::with_capacity(buffers.len());
    for buffer in buffers {
        if !seen.insert(buffer.ordinal()) {
            return Err(Error::BadUsageError(format!(
                "ordinal {} bound twice",
                buffer.ordinal()
            )));
        }
    }
    Ok(())
}

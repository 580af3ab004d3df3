use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::col::ColumnMeta;
use crate::constant::Precision;
use crate::error::{Error, Result};
use crate::protocol::block::ResultBlock;
use crate::protocol::query::{FetchReply, ResultSetHeader, fetch, free_result, read_fetch_reply};
use crate::value::Value;

use super::conn::ConnShared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Open,
    /// The server reported completion and released the result
    Exhausted,
    Closed,
}

/// Forward-only iteration over a query result
///
/// Blocks are fetched lazily as rows are consumed. Dropping an open cursor
/// releases the server-side result in the background.
pub struct ResultCursor {
    conn: Arc<ConnShared>,
    result_id: u64,
    precision: Precision,
    schema: Arc<[ColumnMeta]>,
    block: Option<ResultBlock>,
    /// Rows of `block` already handed out
    consumed: usize,
    current: Option<usize>,
    state: CursorState,
    timeout: Option<Duration>,
}

impl ResultCursor {
    pub(crate) fn new(
        conn: Arc<ConnShared>,
        header: ResultSetHeader,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            conn,
            result_id: header.result_id,
            precision: header.precision,
            schema: header.schema.into(),
            block: header.first_block,
            consumed: 0,
            current: None,
            state: CursorState::Open,
            timeout,
        }
    }

    pub fn result_id(&self) -> u64 {
        self.result_id
    }

    /// Timestamp precision of the result
    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn schema(&self) -> &[ColumnMeta] {
        &self.schema
    }

    /// Index of the first column named `name`
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.iter().position(|meta| meta.name == name)
    }

    /// Advance to the next row
    ///
    /// Returns `false` once the result is exhausted or the cursor is closed,
    /// and keeps returning `false` afterwards.
    #[instrument(skip_all)]
    pub async fn next(&mut self) -> Result<bool> {
        if self.state != CursorState::Open {
            self.current = None;
            return Ok(false);
        }

        if let Some(block) = &self.block
            && self.consumed < block.rows()
        {
            self.current = Some(self.consumed);
            self.consumed += 1;
            return Ok(true);
        }
        self.current = None;

        loop {
            let schema = &self.schema;
            let reply = self
                .conn
                .call(&fetch(self.result_id), None, self.timeout, |r| {
                    read_fetch_reply(schema, &r.body)
                })
                .await?;
            match reply {
                FetchReply::Completed => {
                    debug!(result_id = self.result_id, "result exhausted");
                    self.block = None;
                    self.state = CursorState::Exhausted;
                    return Ok(false);
                }
                FetchReply::Block(block) if block.is_empty() => continue,
                FetchReply::Block(block) => {
                    self.block = Some(block);
                    self.current = Some(0);
                    self.consumed = 1;
                    return Ok(true);
                }
            }
        }
    }

    /// Value of column `index` (0-based) in the current row
    pub fn column_value(&self, index: usize) -> Result<Value<'_>> {
        if self.state == CursorState::Closed {
            return Err(Error::StatementClosed);
        }
        let (Some(block), Some(row)) = (&self.block, self.current) else {
            return Err(Error::BadUsageError("cursor is not on a row".into()));
        };
        if index >= self.schema.len() {
            return Err(Error::BadUsageError(format!(
                "column {} out of range ({} columns)",
                index,
                self.schema.len()
            )));
        }
        block.value(row, index)
    }

    /// Value of the column named `name` in the current row
    pub fn column_value_by_name(&self, name: &str) -> Result<Value<'_>> {
        let index = self
            .column_index(name)
            .ok_or_else(|| Error::BadUsageError(format!("no column named {name}")))?;
        self.column_value(index)
    }

    pub fn is_closed(&self) -> bool {
        self.state == CursorState::Closed
    }

    /// Release the cursor; the server-side result is freed unless the
    /// server already released it on completion
    ///
    /// Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let state = std::mem::replace(&mut self.state, CursorState::Closed);
        self.block = None;
        self.current = None;
        if state != CursorState::Open {
            return Ok(());
        }
        self.conn
            .mux
            .send(&free_result(self.result_id), None, self.timeout)
            .await?;
        Ok(())
    }
}

impl Drop for ResultCursor {
    fn drop(&mut self) {
        if self.state != CursorState::Open || self.conn.mux.is_closed() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let conn = Arc::clone(&self.conn);
        let result_id = self.result_id;
        runtime.spawn(async move {
            if let Err(e) = conn.mux.send(&free_result(result_id), None, None).await {
                debug!(result_id, error = %e, "free on drop failed");
            }
        });
    }
}

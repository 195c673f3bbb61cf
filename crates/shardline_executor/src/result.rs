//! Retrieved query outcomes.
//!
//! `Stream` keeps the backend cursor open and reads one row per call. It
//! holds its connection handle, so the connection is not released while
//! the stream is alive. `Memory` holds
//! every row, drained while the unit still owned the shared connection.

use shardline_common::datum::OwnedRow;
use shardline_common::error::ExecutionError;

use crate::backend::{BackendError, ConnectionHandle, CursorHandle};

#[derive(Debug)]
pub enum QueryResult {
    Stream(StreamResult),
    Memory(MemoryResult),
}

impl QueryResult {
    pub fn next_row(&mut self) -> Result<Option<OwnedRow>, ExecutionError> {
        match self {
            QueryResult::Stream(r) => r.next_row(),
            QueryResult::Memory(r) => Ok(r.next_row()),
        }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            QueryResult::Stream(r) => &r.columns,
            QueryResult::Memory(r) => &r.columns,
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns().len()
    }

    /// 1-based like most SQL client APIs; `None` when out of range.
    pub fn column_label(&self, column: usize) -> Option<&str> {
        column
            .checked_sub(1)
            .and_then(|i| self.columns().get(i))
            .map(String::as_str)
    }

    pub fn target(&self) -> &str {
        match self {
            QueryResult::Stream(r) => &r.target,
            QueryResult::Memory(r) => &r.target,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, QueryResult::Stream(_))
    }

    /// Read every remaining row.
    pub fn collect_rows(&mut self) -> Result<Vec<OwnedRow>, ExecutionError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Live, single-pass cursor bound to an open connection.
pub struct StreamResult {
    target: String,
    columns: Vec<String>,
    cursor: CursorHandle,
    connection: ConnectionHandle,
    exhausted: bool,
}

impl StreamResult {
    pub fn new(
        target: impl Into<String>,
        cursor: CursorHandle,
        connection: ConnectionHandle,
    ) -> Self {
        Self {
            target: target.into(),
            columns: cursor.columns(),
            cursor,
            connection,
            exhausted: false,
        }
    }

    /// The dedicated connection the cursor reads from.
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn next_row(&mut self) -> Result<Option<OwnedRow>, ExecutionError> {
        if self.exhausted {
            return Ok(None);
        }
        let row = self
            .cursor
            .next_row()
            .map_err(|e| cursor_error(&self.target, e))?;
        if row.is_none() {
            self.exhausted = true;
        }
        Ok(row)
    }
}

impl std::fmt::Debug for StreamResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResult")
            .field("target", &self.target)
            .field("columns", &self.columns)
            .field("connection", &self.connection.target())
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

/// Fully buffered rows.
#[derive(Debug, Clone)]
pub struct MemoryResult {
    target: String,
    columns: Vec<String>,
    rows: Vec<OwnedRow>,
    next: usize,
}

impl MemoryResult {
    pub fn new(target: impl Into<String>, columns: Vec<String>, rows: Vec<OwnedRow>) -> Self {
        Self {
            target: target.into(),
            columns,
            rows,
            next: 0,
        }
    }

    /// Read `cursor` to the end. The cursor itself is left open; closing is
    /// up to whoever tracks it.
    pub fn drain(target: impl Into<String>, cursor: &CursorHandle) -> Result<Self, ExecutionError> {
        let target = target.into();
        let columns = cursor.columns();
        let mut rows = Vec::new();
        while let Some(row) = cursor.next_row().map_err(|e| cursor_error(&target, e))? {
            rows.push(row);
        }
        Ok(Self::new(target, columns, rows))
    }

    pub fn next_row(&mut self) -> Option<OwnedRow> {
        let row = self.rows.get(self.next).cloned();
        if row.is_some() {
            self.next += 1;
        }
        row
    }

    pub fn rows(&self) -> &[OwnedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn cursor_error(target: &str, e: BackendError) -> ExecutionError {
    ExecutionError::Cursor {
        target: target.to_string(),
        reason: e.message,
    }
}

//! Tracking of statements and cursors opened by query units.
//!
//! Worker threads append concurrently; readers get handles ordered by unit
//! position so the view does not depend on scheduling. The engine never
//! closes anything here. Callers do, through `close_all` or the handles.

use parking_lot::Mutex;

use shardline_common::error::{ExecutionError, ShardlineResult};

use crate::backend::{CursorHandle, StatementHandle};

#[derive(Default)]
pub struct ResourceRegistry {
    statements: Mutex<Vec<(usize, StatementHandle)>>,
    cursors: Mutex<Vec<(usize, CursorHandle)>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_statement(&self, position: usize, statement: StatementHandle) {
        self.statements.lock().push((position, statement));
    }

    pub fn register_cursor(&self, position: usize, cursor: CursorHandle) {
        self.cursors.lock().push((position, cursor));
    }

    /// Tracked statements in unit order.
    pub fn statements(&self) -> Vec<StatementHandle> {
        ordered(&self.statements.lock())
    }

    /// Tracked cursors in unit order.
    pub fn cursors(&self) -> Vec<CursorHandle> {
        ordered(&self.cursors.lock())
    }

    pub fn statement_count(&self) -> usize {
        self.statements.lock().len()
    }

    pub fn cursor_count(&self) -> usize {
        self.cursors.lock().len()
    }

    /// Close and forget every tracked handle, cursors first. Every handle is
    /// attempted; the first failure is returned afterwards.
    pub fn close_all(&self) -> ShardlineResult<()> {
        let cursors = std::mem::take(&mut *self.cursors.lock());
        let statements = std::mem::take(&mut *self.statements.lock());
        let mut first_error: Option<ExecutionError> = None;

        for (position, cursor) in cursors {
            if let Err(e) = cursor.close() {
                tracing::warn!(unit_index = position, "cursor close failed: {}", e);
                first_error.get_or_insert(ExecutionError::Close {
                    resource: "cursor",
                    reason: e.message,
                });
            }
        }
        for (position, statement) in statements {
            if let Err(e) = statement.close() {
                tracing::warn!(unit_index = position, "statement close failed: {}", e);
                first_error.get_or_insert(ExecutionError::Close {
                    resource: "statement",
                    reason: e.message,
                });
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

fn ordered<T: Clone>(entries: &[(usize, T)]) -> Vec<T> {
    let mut sorted: Vec<&(usize, T)> = entries.iter().collect();
    // Stable: repeated calls on one executor keep registration order per position.
    sorted.sort_by_key(|(position, _)| *position);
    sorted.into_iter().map(|(_, h)| h.clone()).collect()
}

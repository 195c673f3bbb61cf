//! Narrow interfaces to the physical backend.
//!
//! The executor never talks to a wire protocol directly. Connections come
//! from a `ConnectionProvider`; statements and cursors are opaque handles
//! whose methods block until the backend answers. Handles are shared
//! (`Arc`) because the resource registry keeps them alive after the unit
//! that opened them has finished.

use std::sync::Arc;

use thiserror::Error;

use shardline_common::config::StatementOptions;
use shardline_common::datum::OwnedRow;
use shardline_common::error::{ConnectionError, StatementError};

use crate::route::SqlUnit;

pub type ConnectionHandle = Arc<dyn Connection>;
pub type StatementHandle = Arc<dyn Statement>;
pub type CursorHandle = Arc<dyn Cursor>;

/// Failure reported by a backend call (query, update, execute, fetch, close).
/// Timeouts of the underlying call surface here too.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
    pub sql_state: Option<String>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
        }
    }

    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }
}

/// Hands out physical connections by target name.
///
/// A connection is released when the last handle to it is dropped. The
/// executor keeps a handle for as long as anything still reads from it,
/// including streaming results held by the caller.
pub trait ConnectionProvider: Send + Sync {
    fn get_connection(&self, target: &str) -> Result<ConnectionHandle, ConnectionError>;

    /// One connection for a group that packs several targets, given in
    /// route order. Every unit of those targets is prepared and run on the
    /// returned connection, one at a time, so it must be able to reach all
    /// of them. The default hands out the lead target's connection, which
    /// is only correct when all targets are served by the same backend.
    fn get_shared_connection(&self, targets: &[&str]) -> Result<ConnectionHandle, ConnectionError> {
        match targets.first() {
            Some(lead) => self.get_connection(lead),
            None => Err(ConnectionError::UnknownTarget(String::new())),
        }
    }
}

/// One physical connection. Never used by two groups at the same time.
pub trait Connection: Send + Sync {
    /// Target this connection was acquired for.
    fn target(&self) -> &str;

    /// Prepare a statement bound to `sql_unit` with the executor's options.
    fn prepare(
        &self,
        sql_unit: &SqlUnit,
        options: &StatementOptions,
    ) -> Result<StatementHandle, StatementError>;
}

/// A prepared statement. Each method is one blocking backend round trip.
pub trait Statement: Send + Sync {
    fn execute_query(&self) -> Result<CursorHandle, BackendError>;

    /// Affected rows; `None` when the backend reports no count.
    fn execute_update(&self) -> Result<Option<u64>, BackendError>;

    /// true if the statement produced a row set.
    fn execute(&self) -> Result<bool, BackendError>;

    fn close(&self) -> Result<(), BackendError>;
}

/// Single-pass cursor over a row set.
pub trait Cursor: Send + Sync {
    fn columns(&self) -> Vec<String>;

    fn next_row(&self) -> Result<Option<OwnedRow>, BackendError>;

    fn close(&self) -> Result<(), BackendError>;
}

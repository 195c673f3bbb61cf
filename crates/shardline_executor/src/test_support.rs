//! In-crate fakes for unit tests. Integration tests use the richer mock
//! backend under `tests/common`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use shardline_common::config::StatementOptions;
use shardline_common::datum::{Datum, OwnedRow};
use shardline_common::error::{ConnectionError, StatementError};

use crate::backend::{
    BackendError, Connection, ConnectionHandle, Cursor, CursorHandle, Statement, StatementHandle,
};
use crate::connection_mode::ConnectionMode;
use crate::grouping::PrepareCallback;
use crate::route::{RouteUnit, SqlUnit};
use crate::unit::ExecutionUnit;

pub fn route(target: &str, sql: &str) -> RouteUnit {
    RouteUnit::new(target, SqlUnit::new(sql, vec![]))
}

pub struct FakeConnection {
    target: String,
}

impl FakeConnection {
    pub fn handle(target: &str) -> ConnectionHandle {
        Arc::new(FakeConnection {
            target: target.to_string(),
        })
    }
}

impl Connection for FakeConnection {
    fn target(&self) -> &str {
        &self.target
    }

    fn prepare(
        &self,
        sql_unit: &SqlUnit,
        _options: &StatementOptions,
    ) -> Result<StatementHandle, StatementError> {
        Ok(FakeStatement::handle(&self.target, &sql_unit.sql))
    }
}

/// Statement whose behaviour is derived from its SQL text:
/// `FAIL` anywhere in the text makes every call fail.
pub struct FakeStatement {
    pub target: String,
    pub sql: String,
    pub closed: AtomicBool,
}

impl FakeStatement {
    pub fn handle(target: &str, sql: &str) -> StatementHandle {
        Arc::new(FakeStatement {
            target: target.to_string(),
            sql: sql.to_string(),
            closed: AtomicBool::new(false),
        })
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.sql.contains("FAIL") {
            return Err(BackendError::new(format!("{} rejected by {}", self.sql, self.target)));
        }
        Ok(())
    }
}

impl Statement for FakeStatement {
    fn execute_query(&self) -> Result<CursorHandle, BackendError> {
        self.check()?;
        let rows = vec![
            OwnedRow::new(vec![Datum::Text(self.target.clone()), Datum::Int64(1)]),
            OwnedRow::new(vec![Datum::Text(self.target.clone()), Datum::Int64(2)]),
        ];
        Ok(FakeCursor::handle(rows, self.sql.contains("BROKEN_CURSOR")))
    }

    fn execute_update(&self) -> Result<Option<u64>, BackendError> {
        self.check()?;
        Ok(Some(1))
    }

    fn execute(&self) -> Result<bool, BackendError> {
        self.check()?;
        Ok(self.sql.starts_with("SELECT"))
    }

    fn close(&self) -> Result<(), BackendError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeCursor {
    rows: Mutex<std::vec::IntoIter<OwnedRow>>,
    broken: bool,
    pub closed: AtomicBool,
}

impl FakeCursor {
    pub fn handle(rows: Vec<OwnedRow>, broken: bool) -> CursorHandle {
        Arc::new(FakeCursor {
            rows: Mutex::new(rows.into_iter()),
            broken,
            closed: AtomicBool::new(false),
        })
    }

    pub fn new_empty() -> Self {
        FakeCursor {
            rows: Mutex::new(Vec::new().into_iter()),
            broken: false,
            closed: AtomicBool::new(false),
        }
    }
}

impl Cursor for FakeCursor {
    fn columns(&self) -> Vec<String> {
        vec!["target".into(), "n".into()]
    }

    fn next_row(&self) -> Result<Option<OwnedRow>, BackendError> {
        if self.broken {
            return Err(BackendError::new("cursor reset by peer"));
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::new("cursor closed"));
        }
        Ok(self.rows.lock().next())
    }

    fn close(&self) -> Result<(), BackendError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Prepare callback with failure injection and acquisition counters.
#[derive(Default)]
pub struct FakePrepare {
    fail_connection_for: Option<String>,
    fail_statement_for: Option<String>,
    connections: AtomicUsize,
    statements: AtomicUsize,
}

impl FakePrepare {
    pub fn failing_connection(target: &str) -> Self {
        Self {
            fail_connection_for: Some(target.to_string()),
            ..Default::default()
        }
    }

    pub fn failing_statement(sql: &str) -> Self {
        Self {
            fail_statement_for: Some(sql.to_string()),
            ..Default::default()
        }
    }

    pub fn connections_acquired(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn statements_created(&self) -> usize {
        self.statements.load(Ordering::SeqCst)
    }
}

impl PrepareCallback for FakePrepare {
    fn get_connection(&self, target: &str) -> Result<ConnectionHandle, ConnectionError> {
        if self.fail_connection_for.as_deref() == Some(target) {
            return Err(ConnectionError::Acquire {
                target: target.to_string(),
                reason: "connection refused".into(),
            });
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection::handle(target))
    }

    fn create_execution_unit(
        &self,
        connection: &ConnectionHandle,
        route_unit: &RouteUnit,
        mode: ConnectionMode,
    ) -> Result<ExecutionUnit, StatementError> {
        if self.fail_statement_for.as_deref() == Some(route_unit.sql()) {
            return Err(StatementError::Prepare {
                target: route_unit.target.clone(),
                reason: "syntax error".into(),
            });
        }
        let statement = connection.prepare(&route_unit.sql_unit, &StatementOptions::default())?;
        self.statements.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutionUnit::new(
            route_unit.clone(),
            Arc::clone(connection),
            statement,
            mode,
        ))
    }
}

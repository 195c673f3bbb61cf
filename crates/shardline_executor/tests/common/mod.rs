//! In-memory backend for integration tests.
//!
//! Behaviour is keyed by SQL text. Every backend call checks that no other
//! call is running on the same connection. With `serve_shared` the backend
//! hands packed groups one connection spanning all of their targets;
//! otherwise packed groups get the lead target's connection.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use parking_lot::Mutex;

use shardline_common::config::{ExecutorConfig, StatementOptions};
use shardline_common::context::AmbientContext;
use shardline_common::datum::{Datum, OwnedRow};
use shardline_common::error::{ConnectionError, StatementError};
use shardline_executor::{
    BackendError, Connection, ConnectionHandle, ConnectionProvider, Cursor, CursorHandle,
    ExecuteEngine, RouteUnit, SqlType, SqlUnit, Statement, StatementExecutor, StatementHandle,
};

#[derive(Debug, Clone)]
pub struct Behavior {
    pub rows: Vec<OwnedRow>,
    pub update_count: Option<u64>,
    pub produces_rows: bool,
    pub latency: Duration,
    pub fail: Option<String>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            update_count: Some(0),
            produces_rows: true,
            latency: Duration::ZERO,
            fail: None,
        }
    }
}

impl Behavior {
    pub fn rows(n: i64) -> Self {
        Self {
            rows: (0..n).map(|i| OwnedRow::new(vec![Datum::Int64(i)])).collect(),
            ..Default::default()
        }
    }

    pub fn count(count: Option<u64>) -> Self {
        Self {
            update_count: count,
            produces_rows: false,
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency = Duration::from_millis(ms);
        self
    }

    pub fn with_produces_rows(mut self, produces_rows: bool) -> Self {
        self.produces_rows = produces_rows;
        self
    }
}

#[derive(Default)]
struct BackendState {
    behaviors: Mutex<HashMap<String, Behavior>>,
    unreachable: Mutex<HashSet<String>>,
    connections_acquired: AtomicUsize,
    connections_released: AtomicUsize,
    serve_shared: AtomicBool,
    prepared_on: Mutex<Vec<(String, String)>>,
    statements_prepared: AtomicUsize,
    calls_started: AtomicUsize,
    calls_finished: AtomicUsize,
    overlap_violations: AtomicUsize,
    executed_sql: Mutex<Vec<String>>,
    worker_threads: Mutex<HashSet<ThreadId>>,
    seen_options: Mutex<Vec<StatementOptions>>,
    statements: Mutex<Vec<Arc<MockStatement>>>,
    cursors: Mutex<Vec<Arc<MockCursor>>>,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<BackendState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn behave(&self, sql: &str, behavior: Behavior) -> &Self {
        self.state
            .behaviors
            .lock()
            .insert(sql.to_string(), behavior);
        self
    }

    pub fn unreachable(&self, target: &str) -> &Self {
        self.state.unreachable.lock().insert(target.to_string());
        self
    }

    /// Answer `get_shared_connection` with a multi-target connection.
    pub fn serve_shared(&self) -> &Self {
        self.state.serve_shared.store(true, Ordering::SeqCst);
        self
    }

    pub fn connections_acquired(&self) -> usize {
        self.state.connections_acquired.load(Ordering::SeqCst)
    }

    pub fn connections_released(&self) -> usize {
        self.state.connections_released.load(Ordering::SeqCst)
    }

    /// `(connection target, sql)` for every prepared statement.
    pub fn prepared_on(&self) -> Vec<(String, String)> {
        self.state.prepared_on.lock().clone()
    }

    pub fn statements_prepared(&self) -> usize {
        self.state.statements_prepared.load(Ordering::SeqCst)
    }

    pub fn calls_started(&self) -> usize {
        self.state.calls_started.load(Ordering::SeqCst)
    }

    pub fn calls_finished(&self) -> usize {
        self.state.calls_finished.load(Ordering::SeqCst)
    }

    pub fn overlap_violations(&self) -> usize {
        self.state.overlap_violations.load(Ordering::SeqCst)
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.state.executed_sql.lock().clone()
    }

    pub fn worker_threads(&self) -> usize {
        self.state.worker_threads.lock().len()
    }

    pub fn seen_options(&self) -> Vec<StatementOptions> {
        self.state.seen_options.lock().clone()
    }

    pub fn all_cursors_closed(&self) -> bool {
        self.state
            .cursors
            .lock()
            .iter()
            .all(|c| c.closed.load(Ordering::SeqCst))
    }

    pub fn all_statements_closed(&self) -> bool {
        self.state
            .statements
            .lock()
            .iter()
            .all(|s| s.closed.load(Ordering::SeqCst))
    }

    /// Wait until `n` backend calls have finished, or give up after `max`.
    pub fn wait_finished(&self, n: usize, max: Duration) -> bool {
        let deadline = std::time::Instant::now() + max;
        while std::time::Instant::now() < deadline {
            if self.calls_finished() >= n {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        self.calls_finished() >= n
    }

    /// Wait until `n` connections have been released, or give up after `max`.
    /// Workers drop their group's handles just after reporting the last unit.
    pub fn wait_released(&self, n: usize, max: Duration) -> bool {
        let deadline = std::time::Instant::now() + max;
        while std::time::Instant::now() < deadline {
            if self.connections_released() >= n {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        self.connections_released() >= n
    }

    fn behavior(&self, sql: &str) -> Behavior {
        self.state
            .behaviors
            .lock()
            .get(sql)
            .cloned()
            .unwrap_or_default()
    }
}

impl ConnectionProvider for MockBackend {
    fn get_connection(&self, target: &str) -> Result<ConnectionHandle, ConnectionError> {
        if self.state.unreachable.lock().contains(target) {
            return Err(ConnectionError::Acquire {
                target: target.to_string(),
                reason: "connection refused".into(),
            });
        }
        Ok(self.open(target.to_string()))
    }

    fn get_shared_connection(&self, targets: &[&str]) -> Result<ConnectionHandle, ConnectionError> {
        if !self.state.serve_shared.load(Ordering::SeqCst) {
            return match targets.first() {
                Some(lead) => self.get_connection(lead),
                None => Err(ConnectionError::UnknownTarget(String::new())),
            };
        }
        if let Some(down) = targets
            .iter()
            .find(|t| self.state.unreachable.lock().contains(**t))
        {
            return Err(ConnectionError::Acquire {
                target: down.to_string(),
                reason: "connection refused".into(),
            });
        }
        Ok(self.open(targets.join("+")))
    }
}

impl MockBackend {
    fn open(&self, target: String) -> ConnectionHandle {
        self.state.connections_acquired.fetch_add(1, Ordering::SeqCst);
        Arc::new(MockConnection {
            target,
            backend: self.clone(),
            busy: Arc::new(AtomicBool::new(false)),
        })
    }
}

pub struct MockConnection {
    target: String,
    backend: MockBackend,
    busy: Arc<AtomicBool>,
}

impl Connection for MockConnection {
    fn target(&self) -> &str {
        &self.target
    }

    fn prepare(
        &self,
        sql_unit: &SqlUnit,
        options: &StatementOptions,
    ) -> Result<StatementHandle, StatementError> {
        if sql_unit.sql.contains("BAD SYNTAX") {
            return Err(StatementError::Prepare {
                target: self.target.clone(),
                reason: "syntax error".into(),
            });
        }
        self.backend.state.seen_options.lock().push(*options);
        self.backend
            .state
            .prepared_on
            .lock()
            .push((self.target.clone(), sql_unit.sql.clone()));
        self.backend
            .state
            .statements_prepared
            .fetch_add(1, Ordering::SeqCst);
        let statement = Arc::new(MockStatement {
            sql: sql_unit.sql.clone(),
            backend: self.backend.clone(),
            busy: Arc::clone(&self.busy),
            closed: AtomicBool::new(false),
        });
        self.backend
            .state
            .statements
            .lock()
            .push(Arc::clone(&statement));
        Ok(statement)
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.backend
            .state
            .connections_released
            .fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockStatement {
    sql: String,
    backend: MockBackend,
    busy: Arc<AtomicBool>,
    pub closed: AtomicBool,
}

impl MockStatement {
    fn call<T>(&self, f: impl FnOnce(&Behavior) -> T) -> Result<T, BackendError> {
        let state = &self.backend.state;
        if self.busy.swap(true, Ordering::SeqCst) {
            state.overlap_violations.fetch_add(1, Ordering::SeqCst);
        }
        state.calls_started.fetch_add(1, Ordering::SeqCst);
        state
            .worker_threads
            .lock()
            .insert(std::thread::current().id());

        let behavior = self.backend.behavior(&self.sql);
        if !behavior.latency.is_zero() {
            std::thread::sleep(behavior.latency);
        }
        state.executed_sql.lock().push(self.sql.clone());
        let result = match &behavior.fail {
            Some(message) => Err(BackendError::new(message.clone())),
            None => Ok(f(&behavior)),
        };

        self.busy.store(false, Ordering::SeqCst);
        state.calls_finished.fetch_add(1, Ordering::SeqCst);
        result
    }
}

impl Statement for MockStatement {
    fn execute_query(&self) -> Result<CursorHandle, BackendError> {
        let rows = self.call(|b| b.rows.clone())?;
        let cursor = Arc::new(MockCursor {
            rows: Mutex::new(rows.into_iter()),
            closed: AtomicBool::new(false),
        });
        self.backend.state.cursors.lock().push(Arc::clone(&cursor));
        Ok(cursor)
    }

    fn execute_update(&self) -> Result<Option<u64>, BackendError> {
        self.call(|b| b.update_count)
    }

    fn execute(&self) -> Result<bool, BackendError> {
        self.call(|b| b.produces_rows)
    }

    fn close(&self) -> Result<(), BackendError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockCursor {
    rows: Mutex<std::vec::IntoIter<OwnedRow>>,
    pub closed: AtomicBool,
}

impl Cursor for MockCursor {
    fn columns(&self) -> Vec<String> {
        vec!["n".into()]
    }

    fn next_row(&self) -> Result<Option<OwnedRow>, BackendError> {
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

// ── Fixtures ────────────────────────────────────────────────────────────────

pub fn route(target: &str, sql: &str) -> RouteUnit {
    RouteUnit::new(target, SqlUnit::new(sql, vec![Datum::Int64(1)]))
}

pub fn config(max_connections_per_query: usize) -> ExecutorConfig {
    ExecutorConfig {
        max_connections_per_query,
        executor_threads: 8,
        ..Default::default()
    }
}

pub fn engine(threads: usize) -> Arc<ExecuteEngine> {
    shardline_observability::init_tracing();
    Arc::new(ExecuteEngine::new(threads).expect("engine"))
}

pub fn executor(
    backend: &MockBackend,
    sql_type: SqlType,
    max_connections_per_query: usize,
    ambient: Arc<AmbientContext>,
    route_units: Vec<RouteUnit>,
) -> StatementExecutor {
    StatementExecutor::new(
        sql_type,
        &config(max_connections_per_query),
        engine(8),
        Arc::new(backend.clone()),
        ambient,
        route_units,
    )
}

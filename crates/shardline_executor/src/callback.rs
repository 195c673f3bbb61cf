//! Per-unit actions.
//!
//! The engine knows one capability, `UnitCallback::run_unit`. The three
//! statement entry points differ only in the `UnitStrategy` plugged into
//! `SqlExecuteCallback`, which adds events, logging and metrics around the
//! strategy's backend call.

use std::sync::Arc;

use shardline_common::context::ExecutionContext;
use shardline_common::error::ExecutionError;

use crate::backend::BackendError;
use crate::connection_mode::ConnectionMode;
use crate::events::{EventBus, ExecutionEvent, ExecutionEventKind};
use crate::registry::ResourceRegistry;
use crate::result::{MemoryResult, QueryResult, StreamResult};
use crate::route::SqlType;
use crate::unit::ExecutionUnit;

/// What the engine invokes for each unit, on a worker thread.
pub trait UnitCallback: Send + Sync + 'static {
    type Output: Send + 'static;

    fn run_unit(
        &self,
        position: usize,
        unit: &ExecutionUnit,
        ctx: &ExecutionContext,
    ) -> Result<Self::Output, ExecutionError>;
}

/// The backend call made for one unit.
pub trait UnitStrategy: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Metric/log label.
    const KIND: &'static str;

    fn execute_sql(
        &self,
        position: usize,
        unit: &ExecutionUnit,
    ) -> Result<Self::Output, ExecutionError>;
}

/// Wraps a strategy with event posting, tracing and metrics.
pub struct SqlExecuteCallback<S> {
    strategy: S,
    sql_type: SqlType,
    events: EventBus,
}

impl<S: UnitStrategy> SqlExecuteCallback<S> {
    pub fn new(strategy: S, sql_type: SqlType, events: EventBus) -> Self {
        Self {
            strategy,
            sql_type,
            events,
        }
    }

    fn event(
        &self,
        position: usize,
        unit: &ExecutionUnit,
        ctx: &ExecutionContext,
        kind: ExecutionEventKind,
    ) -> ExecutionEvent {
        ExecutionEvent {
            query_id: ctx.query_id,
            position,
            target: unit.target().to_string(),
            sql: unit.route_unit.sql().to_string(),
            sql_type: self.sql_type,
            kind,
        }
    }
}

impl<S: UnitStrategy> UnitCallback for SqlExecuteCallback<S> {
    type Output = S::Output;

    fn run_unit(
        &self,
        position: usize,
        unit: &ExecutionUnit,
        ctx: &ExecutionContext,
    ) -> Result<S::Output, ExecutionError> {
        if !self.events.is_empty() {
            self.events
                .post(&self.event(position, unit, ctx, ExecutionEventKind::BeforeExecute));
        }
        tracing::debug!(
            query_id = ctx.query_id,
            unit_index = position,
            target = unit.target(),
            kind = S::KIND,
            sql_type = %self.sql_type,
            mode = %unit.mode,
            "executing unit"
        );

        let result = self.strategy.execute_sql(position, unit);

        match &result {
            Ok(_) => {
                shardline_observability::record_unit_metrics(S::KIND, true);
                if !self.events.is_empty() {
                    self.events.post(&self.event(
                        position,
                        unit,
                        ctx,
                        ExecutionEventKind::ExecuteSuccess,
                    ));
                }
            }
            Err(e) => {
                shardline_observability::record_unit_metrics(S::KIND, false);
                tracing::warn!(
                    query_id = ctx.query_id,
                    unit_index = position,
                    target = unit.target(),
                    kind = S::KIND,
                    "unit failed: {}",
                    e
                );
                if !self.events.is_empty() {
                    self.events.post(&self.event(
                        position,
                        unit,
                        ctx,
                        ExecutionEventKind::ExecuteFailure {
                            reason: e.to_string(),
                        },
                    ));
                }
            }
        }
        result
    }
}

fn unit_error(position: usize, unit: &ExecutionUnit, e: BackendError) -> ExecutionError {
    ExecutionError::unit(position, unit.target(), e.message)
}

// ── Strategies ──────────────────────────────────────────────────────────────

/// Row-producing execution. Streams on a dedicated connection, drains on a
/// shared one. The statement and cursor are tracked as soon as the cursor
/// exists, even if draining it fails afterwards.
pub struct QueryStrategy {
    registry: Arc<ResourceRegistry>,
}

impl QueryStrategy {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self { registry }
    }
}

impl UnitStrategy for QueryStrategy {
    type Output = QueryResult;

    const KIND: &'static str = "query";

    fn execute_sql(&self, position: usize, unit: &ExecutionUnit) -> Result<QueryResult, ExecutionError> {
        let cursor = unit
            .statement
            .execute_query()
            .map_err(|e| unit_error(position, unit, e))?;
        self.registry
            .register_statement(position, Arc::clone(&unit.statement));
        self.registry.register_cursor(position, Arc::clone(&cursor));

        match unit.mode {
            ConnectionMode::PerConnectionStrict => {
                Ok(QueryResult::Stream(StreamResult::new(
                    unit.target(),
                    cursor,
                    Arc::clone(&unit.connection),
                )))
            }
            ConnectionMode::MemoryStrict => MemoryResult::drain(unit.target(), &cursor)
                .map(QueryResult::Memory)
                .map_err(|e| ExecutionError::unit(position, unit.target(), e.to_string())),
        }
    }
}

/// Mutation; yields the affected-row count (`None` = backend gave no count).
pub struct UpdateStrategy;

impl UnitStrategy for UpdateStrategy {
    type Output = Option<u64>;

    const KIND: &'static str = "update";

    fn execute_sql(&self, position: usize, unit: &ExecutionUnit) -> Result<Option<u64>, ExecutionError> {
        unit.statement
            .execute_update()
            .map_err(|e| unit_error(position, unit, e))
    }
}

/// Generic execution; true when the statement produced a row set.
pub struct ExecuteStrategy;

impl UnitStrategy for ExecuteStrategy {
    type Output = bool;

    const KIND: &'static str = "execute";

    fn execute_sql(&self, position: usize, unit: &ExecutionUnit) -> Result<bool, ExecutionError> {
        unit.statement
            .execute()
            .map_err(|e| unit_error(position, unit, e))
    }
}

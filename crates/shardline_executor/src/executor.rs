//! Statement executor: one logical statement over its routed targets.
//!
//! Each call snapshots the ambient context, groups the route units (one
//! statement prepared per unit with the configured options), runs the groups
//! on the shared engine with the entry point's strategy, then merges:
//! - `execute_query`: per-unit results in route order
//! - `execute_update`: sum of affected rows, "no count" treated as zero
//! - `execute`: the first unit's outcome, false when there is none
//!
//! Statements and cursors opened by query units stay tracked in the
//! executor's `ResourceRegistry` until the caller closes them.

use std::sync::Arc;

use shardline_common::config::{ExecutorConfig, StatementOptions};
use shardline_common::context::{AmbientContext, ExecutionContext};
use shardline_common::error::{ConnectionError, ShardlineError, ShardlineResult, StatementError};

use crate::backend::{ConnectionHandle, ConnectionProvider, CursorHandle, StatementHandle};
use crate::callback::{
    ExecuteStrategy, QueryStrategy, SqlExecuteCallback, UnitStrategy, UpdateStrategy,
};
use crate::connection_mode::ConnectionMode;
use crate::engine::ExecuteEngine;
use crate::events::{EventBus, ExecutionEventListener};
use crate::grouping::{GroupingEngine, PrepareCallback};
use crate::registry::ResourceRegistry;
use crate::result::QueryResult;
use crate::route::{RouteUnit, SqlType};
use crate::unit::ExecutionUnit;

pub struct StatementExecutor {
    sql_type: SqlType,
    options: StatementOptions,
    grouping: GroupingEngine,
    engine: Arc<ExecuteEngine>,
    provider: Arc<dyn ConnectionProvider>,
    ambient: Arc<AmbientContext>,
    route_units: Vec<RouteUnit>,
    registry: Arc<ResourceRegistry>,
    events: EventBus,
}

impl StatementExecutor {
    pub fn new(
        sql_type: SqlType,
        config: &ExecutorConfig,
        engine: Arc<ExecuteEngine>,
        provider: Arc<dyn ConnectionProvider>,
        ambient: Arc<AmbientContext>,
        route_units: Vec<RouteUnit>,
    ) -> Self {
        Self {
            sql_type,
            options: config.statement,
            grouping: GroupingEngine::new(config.max_connections_per_query),
            engine,
            provider,
            ambient,
            route_units,
            registry: Arc::new(ResourceRegistry::new()),
            events: EventBus::new(),
        }
    }

    /// Register a listener for per-unit execution events.
    pub fn with_listener(mut self, listener: Arc<dyn ExecutionEventListener>) -> Self {
        self.events.register(listener);
        self
    }

    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    pub fn route_units(&self) -> &[RouteUnit] {
        &self.route_units
    }

    /// One result per route unit, in route order.
    pub fn execute_query(&self) -> ShardlineResult<Vec<QueryResult>> {
        let ctx = self.ambient.snapshot();
        let query_id = ctx.query_id;
        let strategy = QueryStrategy::new(Arc::clone(&self.registry));
        let outcomes = self.execute_callback(strategy, ctx)?;
        collect_query_results(outcomes, query_id)
    }

    /// Total affected rows across all units.
    pub fn execute_update(&self) -> ShardlineResult<u64> {
        let ctx = self.ambient.snapshot();
        let outcomes = self.execute_callback(UpdateStrategy, ctx)?;
        Ok(accumulate_update_counts(&outcomes))
    }

    /// Whether the first unit (route order) produced a row set.
    pub fn execute(&self) -> ShardlineResult<bool> {
        let ctx = self.ambient.snapshot();
        let outcomes = self.execute_callback(ExecuteStrategy, ctx)?;
        Ok(first_execute_outcome(&outcomes))
    }

    /// Statements opened by query units so far, in unit order.
    pub fn open_statements(&self) -> Vec<StatementHandle> {
        self.registry.statements()
    }

    /// Cursors opened by query units so far, in unit order.
    pub fn open_cursors(&self) -> Vec<CursorHandle> {
        self.registry.cursors()
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    fn execute_callback<S: UnitStrategy>(
        &self,
        strategy: S,
        ctx: ExecutionContext,
    ) -> ShardlineResult<Vec<Option<S::Output>>> {
        let ctx = Arc::new(ctx);
        let result = self.run(strategy, &ctx);
        let duration_us = ctx.elapsed_us();
        shardline_observability::record_execution_metrics(S::KIND, duration_us, result.is_ok());
        match &result {
            Ok(outcomes) => tracing::debug!(
                query_id = ctx.query_id,
                kind = S::KIND,
                sql_type = %self.sql_type,
                units = outcomes.len(),
                duration_us,
                "statement executed"
            ),
            Err(e) => tracing::warn!(
                query_id = ctx.query_id,
                kind = S::KIND,
                sql_type = %self.sql_type,
                duration_us,
                "statement failed: {}",
                e
            ),
        }
        result
    }

    fn run<S: UnitStrategy>(
        &self,
        strategy: S,
        ctx: &Arc<ExecutionContext>,
    ) -> ShardlineResult<Vec<Option<S::Output>>> {
        let factory = StatementFactory {
            provider: self.provider.as_ref(),
            options: &self.options,
        };
        let groups = self.grouping.group(&self.route_units, &factory)?;
        for mode in [ConnectionMode::PerConnectionStrict, ConnectionMode::MemoryStrict] {
            let n = groups.iter().filter(|g| g.mode == mode).count();
            if n > 0 {
                shardline_observability::record_group_metrics(mode.as_str(), n);
            }
        }

        let callback = Arc::new(SqlExecuteCallback::new(
            strategy,
            self.sql_type,
            self.events.clone(),
        ));
        self.engine
            .execute_groups(groups, callback, Arc::clone(ctx))
    }
}

/// Prepare callback bound to the executor's provider and statement options.
struct StatementFactory<'a> {
    provider: &'a dyn ConnectionProvider,
    options: &'a StatementOptions,
}

impl PrepareCallback for StatementFactory<'_> {
    fn get_connection(&self, target: &str) -> Result<ConnectionHandle, ConnectionError> {
        self.provider.get_connection(target)
    }

    fn get_shared_connection(&self, targets: &[&str]) -> Result<ConnectionHandle, ConnectionError> {
        self.provider.get_shared_connection(targets)
    }

    fn create_execution_unit(
        &self,
        connection: &ConnectionHandle,
        route_unit: &RouteUnit,
        mode: ConnectionMode,
    ) -> Result<ExecutionUnit, StatementError> {
        let statement = connection.prepare(&route_unit.sql_unit, self.options)?;
        Ok(ExecutionUnit::new(
            route_unit.clone(),
            Arc::clone(connection),
            statement,
            mode,
        ))
    }
}

/// Unwrap per-unit query results. On success every slot is filled; an empty
/// one means the engine lost a result.
fn collect_query_results(
    outcomes: Vec<Option<QueryResult>>,
    query_id: u64,
) -> ShardlineResult<Vec<QueryResult>> {
    let expected = outcomes.len();
    let mut results = Vec::with_capacity(expected);
    for (position, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Some(r) => results.push(r),
            None => {
                return Err(ShardlineError::internal_bug(
                    "E-EXEC-003",
                    "query unit produced no result",
                    format!(
                        "query_id={}, position={}, units={}",
                        query_id, position, expected
                    ),
                ))
            }
        }
    }
    Ok(results)
}

/// Sum per-unit counts; a missing count contributes zero.
pub fn accumulate_update_counts(counts: &[Option<Option<u64>>]) -> u64 {
    counts.iter().map(|c| c.flatten().unwrap_or(0)).sum()
}

/// The first unit's outcome; false for no units or a missing outcome.
pub fn first_execute_outcome(outcomes: &[Option<bool>]) -> bool {
    outcomes.first().copied().flatten().unwrap_or(false)
}

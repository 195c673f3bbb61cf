//! Parallel statement execution for routed SQL.
//!
//! A logical statement arrives already routed to one or more targets. The
//! executor prepares one statement per route unit, groups the units onto
//! physical connections under a per-statement connection cap, runs groups
//! concurrently on a bounded worker pool and merges the per-unit outcomes.
//!
//! Layers, leaves first:
//! - `connection_mode`: stream vs. materialize decision per group
//! - `route` / `unit`: route units, execution units, execution groups
//! - `grouping`: connection acquisition and target packing
//! - `pool` / `engine`: worker pool and order-preserving execution
//! - `callback`: query / update / execute strategies
//! - `executor`: `StatementExecutor`, merge policy and resource tracking

pub mod backend;
pub mod callback;
pub mod connection_mode;
pub mod engine;
pub mod events;
pub mod executor;
pub mod grouping;
pub mod pool;
pub mod registry;
pub mod result;
pub mod route;
pub mod unit;

#[cfg(test)]
mod test_support;

pub use backend::{
    BackendError, Connection, ConnectionHandle, ConnectionProvider, Cursor, CursorHandle,
    Statement, StatementHandle,
};
pub use callback::{
    ExecuteStrategy, QueryStrategy, SqlExecuteCallback, UnitCallback, UnitStrategy,
    UpdateStrategy,
};
pub use connection_mode::ConnectionMode;
pub use engine::ExecuteEngine;
pub use events::{
    EventBus, EventRecorder, ExecutionEvent, ExecutionEventKind, ExecutionEventListener,
};
pub use executor::StatementExecutor;
pub use grouping::{GroupingEngine, PrepareCallback};
pub use pool::{PoolStats, WorkerPool};
pub use registry::ResourceRegistry;
pub use result::{MemoryResult, QueryResult, StreamResult};
pub use route::{RouteUnit, SqlType, SqlUnit};
pub use unit::{ExecutionGroup, ExecutionUnit, PositionedUnit};

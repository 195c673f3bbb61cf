//! Shared types for the shardline statement executor: errors, configuration,
//! the ambient execution context and the scalar row model.

pub mod config;
pub mod context;
pub mod datum;
pub mod error;

pub use config::{CursorConcurrency, CursorType, ExecutorConfig, Holdability, StatementOptions};
pub use context::{AmbientContext, ExecutionContext};
pub use datum::{Datum, OwnedRow};
pub use error::{
    ConfigError, ConnectionError, ErrorKind, ExecutionError, ShardlineError, ShardlineResult,
    StatementError,
};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Statement executor configuration, usually the `[executor]` part of
/// `shardline.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum physical connections one logical statement may hold at once.
    /// When a statement routes to more targets than this, targets share
    /// connections and their results are materialized eagerly.
    #[serde(default = "default_max_connections_per_query")]
    pub max_connections_per_query: usize,
    /// Worker pool size. 0 = available parallelism.
    #[serde(default)]
    pub executor_threads: usize,
    /// Options used by the statement factory for every unit.
    #[serde(default)]
    pub statement: StatementOptions,
}

fn default_max_connections_per_query() -> usize {
    1
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_connections_per_query: default_max_connections_per_query(),
            executor_threads: 0,
            statement: StatementOptions::default(),
        }
    }
}

impl ExecutorConfig {
    /// Parse from TOML text. Missing keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ExecutorConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            max_connections_per_query = config.max_connections_per_query,
            executor_threads = config.executor_threads,
            "executor config loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections_per_query == 0 {
            return Err(ConfigError::Invalid {
                field: "max_connections_per_query",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Effective number of worker threads.
    pub fn effective_threads(&self) -> usize {
        if self.executor_threads > 0 {
            return self.executor_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

/// Cursor scrollability requested from the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorType {
    #[default]
    ForwardOnly,
    ScrollInsensitive,
    ScrollSensitive,
}

/// Whether rows read through a cursor may be updated in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorConcurrency {
    #[default]
    ReadOnly,
    Updatable,
}

/// Whether cursors survive a commit on their connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Holdability {
    HoldOverCommit,
    #[default]
    CloseAtCommit,
}

/// Options bound into the statement factory at executor construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementOptions {
    #[serde(default)]
    pub cursor_type: CursorType,
    #[serde(default)]
    pub concurrency: CursorConcurrency,
    #[serde(default)]
    pub holdability: Holdability,
    #[serde(default)]
    pub return_generated_keys: bool,
}

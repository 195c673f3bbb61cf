//! Ambient execution context.
//!
//! Callers keep an `AmbientContext` for their session: a free-form data map
//! plus the exception policy flag. Every executor call takes exactly one
//! `snapshot()` when it starts; the resulting `ExecutionContext` is shared
//! (via `Arc`) with every worker job of that call. Pool workers are reused
//! across unrelated calls, so nothing is read from thread-local state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value;

/// Global monotonic query ID counter.
static GLOBAL_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a new unique query ID.
pub fn next_query_id() -> u64 {
    GLOBAL_QUERY_ID.fetch_add(1, Ordering::Relaxed)
}

/// Caller-owned, mutable context holder.
#[derive(Debug)]
pub struct AmbientContext {
    data: RwLock<BTreeMap<String, Value>>,
    rethrow_immediately: AtomicBool,
}

impl Default for AmbientContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AmbientContext {
    /// Fail-fast by default.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            rethrow_immediately: AtomicBool::new(true),
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.data.write().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.write().remove(key)
    }

    pub fn clear(&self) {
        self.data.write().clear();
    }

    pub fn set_rethrow_immediately(&self, rethrow: bool) {
        self.rethrow_immediately.store(rethrow, Ordering::Release);
    }

    pub fn rethrow_immediately(&self) -> bool {
        self.rethrow_immediately.load(Ordering::Acquire)
    }

    /// Capture an immutable copy for one executor call.
    pub fn snapshot(&self) -> ExecutionContext {
        let data = self.data.read().clone();
        ExecutionContext {
            query_id: next_query_id(),
            data,
            rethrow_immediately: self.rethrow_immediately(),
            started_at: Instant::now(),
        }
    }
}

/// Immutable context captured once per executor call.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Unique per executor call.
    pub query_id: u64,
    /// Caller key/value data, copied verbatim.
    pub data: BTreeMap<String, Value>,
    /// true = surface the first unit failure as soon as it is observed;
    /// false = run every unit, then surface the lowest-indexed failure.
    pub rethrow_immediately: bool,
    /// When the snapshot was taken; call duration is measured from here.
    pub started_at: Instant,
}

impl ExecutionContext {
    /// Create with explicit fields (for testing).
    pub fn with_data(data: BTreeMap<String, Value>, rethrow_immediately: bool) -> Self {
        Self {
            query_id: next_query_id(),
            data,
            rethrow_immediately,
            started_at: Instant::now(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Elapsed time since the call started, in microseconds.
    pub fn elapsed_us(&self) -> u64 {
        self.started_at.elapsed().as_micros() as u64
    }
}

//! Per-unit execution events.
//!
//! Every unit invocation produces `BeforeExecute` followed by either
//! `ExecuteSuccess` or `ExecuteFailure`, emitted on the worker thread that
//! ran the unit. Listeners must be cheap and must not block.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::route::SqlType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEventKind {
    BeforeExecute,
    ExecuteSuccess,
    ExecuteFailure { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionEvent {
    pub query_id: u64,
    /// Unit position in route order.
    pub position: usize,
    pub target: String,
    pub sql: String,
    pub sql_type: SqlType,
    pub kind: ExecutionEventKind,
}

pub trait ExecutionEventListener: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Fan-out to zero or more listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Vec<Arc<dyn ExecutionEventListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Arc<dyn ExecutionEventListener>) {
        self.listeners.push(listener);
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn post(&self, event: &ExecutionEvent) {
        for listener in &self.listeners {
            listener.on_event(event);
        }
    }
}

/// Listener that keeps every event in memory.
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl EventRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn successes(&self) -> usize {
        self.count(|k| matches!(k, ExecutionEventKind::ExecuteSuccess))
    }

    pub fn failures(&self) -> usize {
        self.count(|k| matches!(k, ExecutionEventKind::ExecuteFailure { .. }))
    }

    fn count(&self, pred: impl Fn(&ExecutionEventKind) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(&e.kind)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ExecutionEventListener for EventRecorder {
    fn on_event(&self, event: &ExecutionEvent) {
        self.events.lock().push(event.clone());
    }
}

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::example::{Example, Prediction};

/// Record of one module or program invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub id: Uuid,
    /// Name of the module (or `"program"`) that produced the trace.
    pub module: String,
    pub inputs: Example,
    pub outputs: Option<Prediction>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Trace {
    pub fn success(module: impl Into<String>, inputs: Example, outputs: Prediction) -> Self {
        Self {
            id: Uuid::new_v4(),
            module: module.into(),
            inputs,
            outputs: Some(outputs),
            error: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn failure(module: impl Into<String>, inputs: Example, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            module: module.into(),
            inputs,
            outputs: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Sink for observability traces. Injected into the optimizer rather than
/// held as global state.
pub trait TraceCollector: Send + Sync {
    fn collect(&self, trace: Trace);

    fn clear(&self);

    fn size(&self) -> usize;
}

/// Bounded in-memory collector. When full, the oldest trace is dropped.
#[derive(Debug)]
pub struct InMemoryTraceCollector {
    traces: Mutex<Vec<Trace>>,
    max_traces: usize,
}

impl InMemoryTraceCollector {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(max_traces: usize) -> Self {
        Self {
            traces: Mutex::new(Vec::new()),
            max_traces: max_traces.max(1),
        }
    }

    /// Copy of all retained traces, oldest first.
    pub fn snapshot(&self) -> Vec<Trace> {
        self.traces.lock().clone()
    }

    pub fn traces_for(&self, module: &str) -> Vec<Trace> {
        self.traces
            .lock()
            .iter()
            .filter(|t| t.module == module)
            .cloned()
            .collect()
    }
}

impl Default for InMemoryTraceCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceCollector for InMemoryTraceCollector {
    fn collect(&self, trace: Trace) {
        let mut traces = self.traces.lock();
        traces.push(trace);
        if traces.len() > self.max_traces {
            let overflow = traces.len() - self.max_traces;
            traces.drain(..overflow);
        }
    }

    fn clear(&self) {
        self.traces.lock().clear();
    }

    fn size(&self) -> usize {
        self.traces.lock().len()
    }
}

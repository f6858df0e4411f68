//! Log and output sinks.
//!
//! A [`Hooks`] value is assembled once during process setup and handed to the
//! [`ContextFactory`](crate::context::ContextFactory); every context it creates shares it
//! read-only. Tests inject a [`MemorySink`] to capture what the engine reports.

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One query lifecycle record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub ts: String,
    pub level: LogLevel,
    pub context: u64,
    pub event: String,
    pub data: Value,
}

impl LogRecord {
    pub fn with_now(level: LogLevel, context: u64, event: impl Into<String>, data: Value) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level,
            context,
            event: event.into(),
            data,
        }
    }
}

/// Receives query lifecycle records
pub trait LogSink: Send + Sync {
    fn log(&self, record: &LogRecord);
}

/// Receives normalized results a caller chooses to publish
pub trait OutputSink: Send + Sync {
    fn emit(&self, value: &Value);
}

/// Forwards records into `tracing` under the `cairn::query` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, record: &LogRecord) {
        let data = record.data.to_string();
        match record.level {
            LogLevel::Debug => {
                debug!(target: "cairn::query", context = record.context, event = %record.event, data = %data)
            }
            LogLevel::Info => {
                info!(target: "cairn::query", context = record.context, event = %record.event, data = %data)
            }
            LogLevel::Warn => {
                warn!(target: "cairn::query", context = record.context, event = %record.event, data = %data)
            }
            LogLevel::Error => {
                error!(target: "cairn::query", context = record.context, event = %record.event, data = %data)
            }
        }
    }
}

/// Writes each emitted value to stdout as one JSON line.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&self, value: &Value) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        if let Err(e) = writeln!(handle, "{}", value) {
            warn!(error = %e, "Failed to write output");
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _record: &LogRecord) {}
}

impl OutputSink for NullSink {
    fn emit(&self, _value: &Value) {}
}

/// Captures records and outputs in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
    outputs: Mutex<Vec<Value>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Records whose event name equals `event`
    pub fn events(&self, event: &str) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.event == event)
            .cloned()
            .collect()
    }

    pub fn outputs(&self) -> Vec<Value> {
        self.outputs.lock().clone()
    }
}

impl LogSink for MemorySink {
    fn log(&self, record: &LogRecord) {
        self.records.lock().push(record.clone());
    }
}

impl OutputSink for MemorySink {
    fn emit(&self, value: &Value) {
        self.outputs.lock().push(value.clone());
    }
}

/// Process-wide log and output hooks
#[derive(Clone)]
pub struct Hooks {
    pub log: Arc<dyn LogSink>,
    pub output: Arc<dyn OutputSink>,
}

impl Hooks {
    pub fn new(log: Arc<dyn LogSink>, output: Arc<dyn OutputSink>) -> Self {
        Self { log, output }
    }

    /// Route both hooks into one capturing sink.
    pub fn capturing(sink: Arc<MemorySink>) -> Self {
        Self {
            log: sink.clone(),
            output: sink,
        }
    }

    pub fn silent() -> Self {
        Self {
            log: Arc::new(NullSink),
            output: Arc::new(NullSink),
        }
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            log: Arc::new(TracingSink),
            output: Arc::new(StdoutSink),
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

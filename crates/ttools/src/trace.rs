//! Statement tracing.
//!
//! Every hooked statement can be reported to a [`StatementLog`]. The default
//! sink, [`TracingLog`], emits one `tracing` event per statement under the
//! `ttools::sql` target; [`MemoryLog`] keeps entries for inspection in tests.

use crate::config::TraceFormat;
use crate::hooks::{ConnId, HookPoint};
use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use ttools_core::Value;

static TRACING: AtomicBool = AtomicBool::new(false);

/// Turn statement tracing on or off for every hooked driver that does not
/// override it in its [`HookConfig`](crate::HookConfig). Off by default.
pub fn set_tracing(enabled: bool) {
    TRACING.store(enabled, Ordering::Relaxed);
}

/// Current value of the process-wide tracing switch.
pub fn tracing_enabled() -> bool {
    TRACING.load(Ordering::Relaxed)
}

/// One traced operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub point: HookPoint,
    pub sql: String,
    pub args: Vec<Value>,
    #[serde(rename = "elapsed_us", serialize_with = "as_micros")]
    pub elapsed: Duration,
    pub conn: ConnId,
    /// Rendered error when the operation failed.
    pub error: Option<String>,
}

fn as_micros<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(micros(*elapsed))
}

fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

/// Sink for traced statements.
pub trait StatementLog: Send + Sync {
    fn record(&self, entry: TraceEntry);
}

/// Emits each statement as a `tracing` event at INFO level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog {
    format: TraceFormat,
}

impl TracingLog {
    pub fn new(format: TraceFormat) -> Self {
        Self { format }
    }
}

impl StatementLog for TracingLog {
    fn record(&self, entry: TraceEntry) {
        match self.format {
            TraceFormat::Text => tracing::info!(
                target: "ttools::sql",
                conn = %entry.conn,
                point = ?entry.point,
                elapsed_us = micros(entry.elapsed),
                args = ?entry.args,
                error = ?entry.error,
                "{}",
                entry.sql
            ),
            TraceFormat::Json => match serde_json::to_string(&entry) {
                Ok(line) => tracing::info!(target: "ttools::sql", "{}", line),
                Err(e) => tracing::warn!(
                    target: "ttools::sql",
                    error = %e,
                    sql = %entry.sql,
                    "failed to render trace entry as JSON"
                ),
            },
        }
    }
}

/// Keeps every entry in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<TraceEntry>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the entries recorded so far.
    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl StatementLog for MemoryLog {
    fn record(&self, entry: TraceEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

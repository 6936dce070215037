use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::headers::Endpoint;

/// Target of the `tracing` events emitted by [`LogTraceSink`].
pub const TRACE_TARGET: &str = "island_events::trace";

/// Terminal state of a trace record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TraceOutcome {
    /// Not ended yet.
    Pending,
    /// The handler succeeded.
    Succeeded,
    /// The handler failed.
    Failed {
        /// Rendered failure.
        error: String,
    },
}

/// Timing and routing record of one handler dispatch.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceLog {
    correlation_id: Option<String>,
    timestamp: u64,
    /// Body size in bytes.
    pub size: usize,
    /// Publishing endpoint.
    pub from: Option<Endpoint>,
    /// Handling endpoint.
    pub to: Option<Endpoint>,
    started_at: u64,
    ended_at: Option<u64>,
    elapsed: Option<Duration>,
    outcome: TraceOutcome,
    #[serde(skip)]
    started: Instant,
}

impl TraceLog {
    /// Starts a record for a message published at `timestamp` (epoch ms, 0 if unknown).
    #[must_use]
    pub fn new(correlation_id: Option<String>, timestamp: u64) -> Self {
        Self {
            correlation_id,
            timestamp,
            size: 0,
            from: None,
            to: None,
            started_at: epoch_millis(),
            ended_at: None,
            elapsed: None,
            outcome: TraceOutcome::Pending,
            started: Instant::now(),
        }
    }

    /// Correlation id of the message.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Publish time of the message, epoch milliseconds.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// When handling started, epoch milliseconds.
    #[must_use]
    pub const fn started_at(&self) -> u64 {
        self.started_at
    }

    /// When handling ended, epoch milliseconds.
    #[must_use]
    pub const fn ended_at(&self) -> Option<u64> {
        self.ended_at
    }

    /// Handling duration.
    #[must_use]
    pub const fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Terminal state.
    #[must_use]
    pub const fn outcome(&self) -> &TraceOutcome {
        &self.outcome
    }

    /// Marks the dispatch as succeeded.
    pub fn end(&mut self) {
        self.finish(TraceOutcome::Succeeded);
    }

    /// Marks the dispatch as failed.
    pub fn end_with_error(&mut self, error: &dyn Display) {
        self.finish(TraceOutcome::Failed {
            error: error.to_string(),
        });
    }

    /// Hands the record to `sink`.
    pub fn shoot(self, sink: &dyn TraceSink) {
        sink.emit(self);
    }

    // Only the first end counts.
    fn finish(&mut self, outcome: TraceOutcome) {
        if self.outcome != TraceOutcome::Pending {
            return;
        }
        self.ended_at = Some(epoch_millis());
        self.elapsed = Some(self.started.elapsed());
        self.outcome = outcome;
    }
}

/// Receives finished trace records.
pub trait TraceSink: Send + Sync + 'static {
    /// Ships one record.
    fn emit(&self, log: TraceLog);
}

/// Emits trace records as `tracing` events on [`TRACE_TARGET`].
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTraceSink;

impl TraceSink for LogTraceSink {
    fn emit(&self, log: TraceLog) {
        info!(
            target: TRACE_TARGET,
            correlation_id = log.correlation_id().unwrap_or_default(),
            timestamp = log.timestamp,
            size = log.size,
            from = ?log.from,
            to = ?log.to,
            elapsed = ?log.elapsed,
            outcome = ?log.outcome,
            "trace"
        );
    }
}

/// Keeps trace records in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryTraceSink {
    logs: Arc<Mutex<Vec<TraceLog>>>,
}

impl MemoryTraceSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records received so far, oldest first.
    #[must_use]
    pub fn logs(&self) -> Vec<TraceLog> {
        self.logs.lock().clone()
    }

    /// Number of records received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.logs.lock().len()
    }

    /// Whether no record was received yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logs.lock().is_empty()
    }
}

impl TraceSink for MemoryTraceSink {
    fn emit(&self, log: TraceLog) {
        self.logs.lock().push(log);
    }
}

/// Current time, epoch milliseconds.
pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since| {
            u64::try_from(since.as_millis()).unwrap_or(u64::MAX)
        })
}

//! Retry bookkeeping and the bounded error log.
//!
//! Retries are keyed by a logical operation identifier (e.g. `agent_loop_3`)
//! and capped at a fixed attempt count. The backoff is a short fixed delay,
//! not exponential — the agent loop re-enters the same turn path after it.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ErrorKind, SableError};

/// Maximum automatic attempts per logical operation. A failure past this
/// count is forced non-retryable.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Fixed delay before a retry.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(1_000);

/// Bounded capacity of the error log ring buffer.
pub const ERROR_LOG_CAPACITY: usize = 100;

/// Outcome of classifying one caught error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryReport {
    pub kind: ErrorKind,
    /// Sanitized user-facing message, never a raw stack trace.
    pub message: String,
    pub should_retry: bool,
}

/// One recorded failure. Append-only; oldest entries are evicted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorLogEntry {
    pub id: Uuid,
    pub kind: ErrorKind,
    pub message: String,
    /// The logical operation that failed.
    pub context: String,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
}

/// Ring buffer of recent failures.
#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: VecDeque<ErrorLogEntry>,
}

impl ErrorLog {
    pub fn record(&mut self, kind: ErrorKind, message: &str, context: &str) -> Uuid {
        if self.entries.len() >= ERROR_LOG_CAPACITY {
            self.entries.pop_front();
        }
        let id = Uuid::new_v4();
        self.entries.push_back(ErrorLogEntry {
            id,
            kind,
            message: message.to_string(),
            context: context.to_string(),
            timestamp: Utc::now(),
            resolved: false,
        });
        id
    }

    /// Mark an entry resolved after a successful retry.
    pub fn resolve(&mut self, id: Uuid) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.resolved = true;
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &ErrorLogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-operation retry counters plus the error log.
///
/// Counters must be reset on success so stale caps do not leak into
/// unrelated future operations.
#[derive(Debug, Default)]
pub struct RecoveryTracker {
    attempts: HashMap<String, u32>,
    log: ErrorLog,
}

impl RecoveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a caught error for the given operation.
    ///
    /// Increments the operation's attempt counter. Exceeding the cap forces
    /// `should_retry = false` even for normally-retryable kinds and clears
    /// the counter.
    pub fn classify(&mut self, operation: &str, error: &SableError) -> RecoveryReport {
        let kind = error.kind();
        let message = error.user_message();
        self.log.record(kind, &message, operation);

        let attempts = self.attempts.entry(operation.to_string()).or_insert(0);
        *attempts += 1;

        let should_retry = if *attempts > MAX_RETRY_ATTEMPTS {
            self.attempts.remove(operation);
            false
        } else {
            kind.should_retry()
        };

        RecoveryReport {
            kind,
            message,
            should_retry,
        }
    }

    /// Single authority for whether the agent loop should re-issue a failed
    /// operation: true only for Network-classified errors still under the
    /// retry cap.
    pub fn attempt_recovery(&mut self, operation: &str, error: &SableError) -> bool {
        let report = self.classify(operation, error);
        let recover = report.should_retry && report.kind == ErrorKind::Network;
        if recover {
            tracing::warn!(
                operation,
                kind = ?report.kind,
                "retrying after recoverable error"
            );
        }
        recover
    }

    /// Clear the attempt counter for an operation after it succeeds.
    pub fn reset(&mut self, operation: &str) {
        self.attempts.remove(operation);
    }

    pub fn attempts(&self, operation: &str) -> u32 {
        self.attempts.get(operation).copied().unwrap_or(0)
    }

    pub fn log(&self) -> &ErrorLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut ErrorLog {
        &mut self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_error() -> SableError {
        SableError::Stream("connection reset by peer".into())
    }

    #[test]
    fn retry_cap_forces_no_retry_and_resets_counter() {
        let mut tracker = RecoveryTracker::new();
        let op = "agent_loop_1";

        // Attempts up to the cap stay retryable.
        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            let report = tracker.classify(op, &network_error());
            assert!(report.should_retry, "attempt {attempt} is within the cap");
        }

        // The fourth exceeds the cap: forced non-retryable, counter cleared.
        let fourth = tracker.classify(op, &network_error());
        assert!(!fourth.should_retry);
        assert_eq!(tracker.attempts(op), 0);

        // Counter cleared: a fifth classification starts over.
        let fifth = tracker.classify(op, &network_error());
        assert!(fifth.should_retry);
    }

    #[test]
    fn attempt_recovery_accepts_only_network_errors() {
        let mut tracker = RecoveryTracker::new();
        assert!(tracker.attempt_recovery("op", &network_error()));

        let parse = SableError::Parse("garbled".into());
        assert!(!tracker.attempt_recovery("op2", &parse));

        let tool = SableError::ToolExecution {
            tool_name: "read_file".into(),
            message: "enoent".into(),
        };
        assert!(!tracker.attempt_recovery("op3", &tool));
    }

    #[test]
    fn counters_are_keyed_per_operation() {
        let mut tracker = RecoveryTracker::new();
        tracker.classify("a", &network_error());
        tracker.classify("a", &network_error());
        tracker.classify("b", &network_error());

        assert_eq!(tracker.attempts("a"), 2);
        assert_eq!(tracker.attempts("b"), 1);

        tracker.reset("a");
        assert_eq!(tracker.attempts("a"), 0);
        assert_eq!(tracker.attempts("b"), 1);
    }

    #[test]
    fn error_log_evicts_oldest_past_capacity() {
        let mut log = ErrorLog::default();
        for i in 0..(ERROR_LOG_CAPACITY + 5) {
            log.record(ErrorKind::Network, &format!("err {i}"), "ctx");
        }
        assert_eq!(log.len(), ERROR_LOG_CAPACITY);
        let first = log.entries().next().unwrap();
        assert_eq!(first.message, "err 5");
    }

    #[test]
    fn error_log_resolve_marks_entry() {
        let mut log = ErrorLog::default();
        let id = log.record(ErrorKind::Tool, "boom", "exec");
        log.resolve(id);
        assert!(log.entries().next().unwrap().resolved);
    }

    #[test]
    fn classify_records_into_log() {
        let mut tracker = RecoveryTracker::new();
        tracker.classify("op", &network_error());
        assert_eq!(tracker.log().len(), 1);
        assert_eq!(tracker.log().entries().next().unwrap().context, "op");
    }
}

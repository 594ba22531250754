//! Progress reporting for reconciliation passes.
//!
//! A pass emits one event per step so callers can show incremental feedback
//! while documents are embedded.

use std::sync::Arc;
use std::time::Instant;

/// Progress event emitted during a pass.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Phase of the pass: "scan", "delete", "embed", "record"
    pub phase: String,

    pub current: u64,

    /// Total expected work, if known
    pub total: Option<u64>,

    pub percentage: Option<f64>,

    pub message: String,

    /// Seconds since the reporter was created
    pub elapsed_secs: Option<f64>,
}

impl ProgressEvent {
    pub fn new(
        phase: impl Into<String>,
        current: u64,
        total: Option<u64>,
        message: impl Into<String>,
    ) -> Self {
        let percentage = total.map(|t| {
            if t > 0 {
                (current as f64 / t as f64) * 100.0
            } else {
                100.0
            }
        });

        Self {
            phase: phase.into(),
            current,
            total,
            percentage,
            message: message.into(),
            elapsed_secs: None,
        }
    }

    pub fn with_elapsed(mut self, elapsed_secs: f64) -> Self {
        self.elapsed_secs = Some(elapsed_secs);
        self
    }

    /// Single human-readable line, e.g. `[embed] 2/5 (40%) - docs/a.md`.
    pub fn format_simple(&self) -> String {
        let progress = match self.total {
            Some(total) => format!("{}/{}", self.current, total),
            None => self.current.to_string(),
        };
        let pct = self
            .percentage
            .map(|p| format!(" ({:.0}%)", p))
            .unwrap_or_default();

        format!("[{}] {}{} - {}", self.phase, progress, pct, self.message)
    }
}

/// Callback for progress events.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Emits events through an optional callback.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            start_time: Instant::now(),
        }
    }

    /// Reporter that drops every event.
    pub fn noop() -> Self {
        Self {
            callback: None,
            start_time: Instant::now(),
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        let Some(callback) = &self.callback else {
            return;
        };

        let event = event.with_elapsed(self.start_time.elapsed().as_secs_f64());
        tracing::debug!(
            phase = %event.phase,
            current = event.current,
            total = ?event.total,
            message = %event.message,
            "Progress event"
        );
        callback(event);
    }

    pub fn scan(&self, documents: u64, root: &str) {
        self.emit(ProgressEvent::new(
            "scan",
            documents,
            None,
            format!("{} documents under {}", documents, root),
        ));
    }

    pub fn delete(&self, documents: u64, ids: u64) {
        self.emit(ProgressEvent::new(
            "delete",
            documents,
            Some(documents),
            format!("{} index ids removed", ids),
        ));
    }

    pub fn embed(&self, current: u64, total: u64, path: &str) {
        self.emit(ProgressEvent::new("embed", current, Some(total), path));
    }

    pub fn record(&self, entries: u64, path: &str) {
        self.emit(ProgressEvent::new(
            "record",
            entries,
            None,
            format!("wrote {}", path),
        ));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::noop()
    }
}

//! Progress events, the event sink, and cooperative cancellation.
//!
//! The engine never blocks on the sink: events go into a bounded buffer and,
//! on overflow, the oldest non-terminal `progress` event is dropped. Terminal
//! events (`result`, `error`, `module_completed`, `guardrail_violation`) are
//! never dropped. Adapters (WebSocket, logs, a CLI progress bar) drain or
//! observe the sink; the engine only depends on the `EventSink` trait.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::guardrails::Severity;

/// Event payloads, one variant per wire `kind`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Progress {
        module: &'static str,
        /// Monotonically non-decreasing within (run, module), in [0, 1].
        fraction: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    ModuleStarted {
        module: &'static str,
    },
    ModuleCompleted {
        module: &'static str,
        execution_time_seconds: f64,
    },
    IntermediateResult {
        module: &'static str,
        data: serde_json::Value,
    },
    Result {
        result: serde_json::Value,
        execution_time_seconds: f64,
    },
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        module: Option<&'static str>,
    },
    GuardrailViolation {
        rule: String,
        severity: Severity,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

impl EventKind {
    /// Terminal events survive buffer overflow; progress events do not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventKind::Progress { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimEvent {
    pub run_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Where the engine sends events. Implementations must be cheap and
/// non-blocking; the engine calls `emit` from hot loops.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SimEvent);
}

/// Discards everything. Used by stress re-runs and tests.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: SimEvent) {}
}

/// Bounded in-memory sink with the documented overflow policy: when full,
/// drop the oldest buffered `progress` event; if only terminal events are
/// buffered, grow past the bound rather than lose one.
pub struct ChannelSink {
    buffer: Mutex<VecDeque<SimEvent>>,
    capacity: usize,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        ChannelSink {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Remove and return all buffered events, oldest first.
    pub fn drain(&self) -> Vec<SimEvent> {
        let mut buf = self.buffer.lock().expect("event buffer poisoned");
        buf.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().expect("event buffer poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: SimEvent) {
        let mut buf = self.buffer.lock().expect("event buffer poisoned");
        if buf.len() >= self.capacity {
            let oldest_progress = buf.iter().position(|e| !e.kind.is_terminal());
            if let Some(idx) = oldest_progress {
                buf.remove(idx);
            }
            // No droppable event: exceed the bound, terminals are kept.
        }
        buf.push_back(event);
    }
}

/// Cooperative cancellation flag, shared by the caller, the Monte Carlo
/// driver, every worker, and every stage. Setting it never interrupts a
/// call in flight; active stages observe it at their next checkpoint
/// (between months, loans, or paths).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Checkpoint helper: `Err(Cancelled)` once the flag is set.
    pub fn check(&self) -> Result<(), crate::error::SimError> {
        if self.is_cancelled() {
            Err(crate::error::SimError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Watchdog: cancels the token after `timeout`. Timeouts ride the same
/// cooperative path as user cancellation.
pub struct Watchdog {
    stop: Arc<AtomicBool>,
}

impl Watchdog {
    pub fn spawn(token: CancelToken, timeout: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        std::thread::spawn(move || {
            let started = std::time::Instant::now();
            while started.elapsed() < timeout {
                if stop_flag.load(Ordering::SeqCst) {
                    return;
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            if !stop_flag.load(Ordering::SeqCst) {
                token.cancel();
            }
        });
        Watchdog { stop }
    }

    /// Disarm; the run finished before the deadline.
    pub fn disarm(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Per-stage progress reporter handed to stages by the orchestrator.
/// Clamps fractions into [0, 1] and enforces monotonicity so adapters can
/// trust the stream.
pub struct ProgressReporter<'a> {
    sink: &'a dyn EventSink,
    run_id: String,
    module: &'static str,
    last_fraction: Mutex<f64>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn EventSink, run_id: impl Into<String>, module: &'static str) -> Self {
        ProgressReporter {
            sink,
            run_id: run_id.into(),
            module,
            last_fraction: Mutex::new(0.0),
        }
    }

    pub fn report(&self, fraction: f64) {
        self.report_with(fraction, None);
    }

    pub fn report_with(&self, fraction: f64, message: Option<String>) {
        let mut last = self.last_fraction.lock().expect("progress lock poisoned");
        let clamped = fraction.clamp(0.0, 1.0).max(*last);
        *last = clamped;
        self.sink.emit(SimEvent {
            run_id: self.run_id.to_string(),
            kind: EventKind::Progress {
                module: self.module,
                fraction: clamped,
                message,
            },
        });
    }

    /// Publish an intermediate result payload for UI consumption.
    pub fn intermediate(&self, data: serde_json::Value) {
        self.sink.emit(SimEvent {
            run_id: self.run_id.to_string(),
            kind: EventKind::IntermediateResult {
                module: self.module,
                data,
            },
        });
    }

    /// Publish a guardrail breach on the event stream.
    pub fn violation(
        &self,
        rule: String,
        severity: Severity,
        message: String,
        details: Option<serde_json::Value>,
    ) {
        self.sink.emit(SimEvent {
            run_id: self.run_id.to_string(),
            kind: EventKind::GuardrailViolation {
                rule,
                severity,
                message,
                details,
            },
        });
    }
}

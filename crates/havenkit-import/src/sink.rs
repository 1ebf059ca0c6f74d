//! Ordered log event channel between the import orchestrator and the
//! browser-facing event stream
//!
//! Multi-writer, single-reader: the orchestrator (and the cancel handler)
//! emit events; the one active SSE stream consumes them. Starting a new job
//! resets the channel, discarding any unconsumed backlog from the previous
//! job.

use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use utoipa::ToSchema;

/// Kind of a streamed log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogEventKind {
    Info,
    Success,
    Warning,
    Error,
    /// Job status frames emitted by the stream itself
    Status,
}

/// A single log event as sent to the browser
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LogEvent {
    #[serde(rename = "type")]
    pub kind: LogEventKind,
    pub message: String,
}

impl LogEvent {
    pub fn new(kind: LogEventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Unbounded ordered event channel, reset at the start of each job
pub struct LogSink {
    tx: Mutex<mpsc::UnboundedSender<LogEvent>>,
    reader: Mutex<Option<mpsc::UnboundedReceiver<LogEvent>>>,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(tx),
            reader: Mutex::new(Some(rx)),
        }
    }

    /// Append an event; never blocks
    pub fn emit(&self, kind: LogEventKind, message: impl Into<String>) {
        let event = LogEvent::new(kind, message);
        debug!("import event [{:?}]: {}", event.kind, event.message);
        // A send error means the reader side was replaced; the event belongs
        // to a job nobody is watching anymore
        let _ = self.tx.lock().unwrap().send(event);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(LogEventKind::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(LogEventKind::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(LogEventKind::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(LogEventKind::Error, message);
    }

    /// Install a fresh channel pair, discarding any unconsumed backlog
    pub fn reset(&self) {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.lock().unwrap() = tx;
        *self.reader.lock().unwrap() = Some(rx);
    }

    /// Claim the single reader side, if nobody holds it yet
    pub fn take_reader(&self) -> Option<mpsc::UnboundedReceiver<LogEvent>> {
        self.reader.lock().unwrap().take()
    }
}

//! Import job supervision for the HavenKit console
//!
//! The import job stops the relay container, runs the relay's `--import`
//! mode as a one-shot sibling container, streams its output to the browser,
//! supports mid-flight cancellation, and restarts the relay no matter how
//! the job ends. One job may run at a time; its state machine lives in
//! [`services::ImportJobService`].

pub mod handlers;
pub mod plugin;
pub mod services;
pub mod sink;
pub mod state;

pub use plugin::ImportPlugin;
pub use services::{
    default_completion_matcher, CompletionMatcher, ImportControlError, ImportJobService,
    ImportSettings, ImportTunables,
};
pub use sink::{LogEvent, LogEventKind, LogSink};
pub use state::{JobState, JobStatus};

//! Import job orchestrator
//!
//! Sequences one import job: stop relay -> run import container -> detect
//! completion or cancellation from its output -> stop import container ->
//! restart relay. Every exit path (success, failure, timeout, cancellation,
//! unexpected fault) ends with a relay restart attempt and exactly one
//! terminal job status.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use havenkit_config::{ConfigService, ServerConfig};
use havenkit_runtime::{
    ContainerRuntime, ImportProcess, ProcessStopper, RunSpec, VolumeMount,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use super::{ImportControlError, ImportJobError};
use crate::sink::LogSink;
use crate::state::{JobState, JobStatus};

/// Image used for the import run when introspecting the relay fails
pub const DEFAULT_IMPORT_IMAGE: &str = "localhost/haven-kit_haven_relay:latest";

/// Network attached to the import run when introspecting the relay fails
pub const DEFAULT_IMPORT_NETWORK: &str = "haven-kit_haven_network";

/// Entrypoint executed inside the import container
const IMPORT_ENTRYPOINT: [&str; 2] = ["/haven/haven", "--import"];

/// Log substrings that mark the import as finished
///
/// The import binary offers no structured completion signal; its own log
/// phrasing is the only contract available. Lines are matched
/// case-insensitively against these literal substrings. If the upstream
/// wording ever changes, detection stops working and the job falls back to
/// waiting for process exit.
pub const COMPLETION_MARKERS: [&str; 2] =
    ["tagged import complete", "please restart the relay"];

/// Pluggable completion detection policy over subprocess output lines
pub type CompletionMatcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// The production matcher: case-insensitive substring match against
/// [`COMPLETION_MARKERS`]
pub fn default_completion_matcher() -> CompletionMatcher {
    Arc::new(|line: &str| {
        let line = line.to_lowercase();
        COMPLETION_MARKERS
            .iter()
            .any(|marker| line.contains(marker))
    })
}

/// Timeouts and delays of the import state machine
///
/// Defaults are the production values; tests compress them.
#[derive(Debug, Clone)]
pub struct ImportTunables {
    /// Bound on `stop <relay>` before the import starts
    pub stop_relay_timeout: Duration,
    /// Pause between stopping the relay and launching the import
    pub settle_delay: Duration,
    /// Bound on image/network introspection
    pub inspect_timeout: Duration,
    /// Wait for the import process to exit after a cancellation
    pub cancel_wait: Duration,
    /// Wait for the import process to exit after detected completion
    pub complete_wait: Duration,
    /// Wait for the import process once it closed its output on its own
    pub exit_wait: Duration,
    /// Wait after a graceful stop when the exit wait expired
    pub late_stop_wait: Duration,
    /// Bound on `start <relay>` after the job
    pub start_relay_timeout: Duration,
}

impl Default for ImportTunables {
    fn default() -> Self {
        Self {
            stop_relay_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(2),
            inspect_timeout: Duration::from_secs(10),
            cancel_wait: Duration::from_secs(10),
            complete_wait: Duration::from_secs(30),
            exit_wait: Duration::from_secs(600),
            late_stop_wait: Duration::from_secs(15),
            start_relay_timeout: Duration::from_secs(30),
        }
    }
}

/// Launch parameters for the import container
#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// Name of the relay container to stop and restart around the job
    pub relay_container: String,
    /// Base directory providing the `config/`, `blossom/` and `db/` bind
    /// mounts shared with the relay
    pub data_dir: PathBuf,
    /// Explicit import image; the relay's own image is used when unset
    pub image_override: Option<String>,
    /// Explicit import network; the relay's own network is used when unset
    pub network_override: Option<String>,
}

impl ImportSettings {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            relay_container: config.relay_container.clone(),
            data_dir: config.data_dir.clone(),
            image_override: config.import_image.clone(),
            network_override: config.import_network.clone(),
        }
    }
}

/// How a job ended, before it is written to the job state
enum JobOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Registry entry for the in-flight job
///
/// Lets a concurrent cancel request reach the orchestrator (token) and the
/// live subprocess (stopper). The stopper is absent before the subprocess
/// starts and after it exits.
struct JobHandle {
    cancel: CancellationToken,
    stopper: Option<Arc<dyn ProcessStopper>>,
}

#[derive(Default)]
struct JobSlot {
    state: JobState,
    handle: Option<JobHandle>,
}

/// Owns the one job slot: job state, job handle, cancellation token and the
/// log sink, all behind a single lock
///
/// The HTTP layer and the orchestrator task communicate only through this
/// service; "one job at a time" is enforced by the state check in
/// [`ImportJobService::start_job`], not by a queue.
pub struct ImportJobService {
    runtime: Arc<dyn ContainerRuntime>,
    config: Arc<ConfigService>,
    settings: ImportSettings,
    tunables: ImportTunables,
    matcher: CompletionMatcher,
    sink: Arc<LogSink>,
    slot: Mutex<JobSlot>,
}

impl ImportJobService {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        config: Arc<ConfigService>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            runtime,
            config,
            settings,
            tunables: ImportTunables::default(),
            matcher: default_completion_matcher(),
            sink: Arc::new(LogSink::new()),
            slot: Mutex::new(JobSlot::default()),
        }
    }

    /// Replace the state machine timeouts (used by tests)
    pub fn with_tunables(mut self, tunables: ImportTunables) -> Self {
        self.tunables = tunables;
        self
    }

    /// Replace the completion detection policy
    pub fn with_matcher(mut self, matcher: CompletionMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn sink(&self) -> Arc<LogSink> {
        self.sink.clone()
    }

    /// Snapshot of the current job state
    pub fn state(&self) -> JobState {
        self.slot.lock().unwrap().state.clone()
    }

    /// Start a new import job on its own task
    ///
    /// Rejected while a job is running. Atomically flips the job state to
    /// `running`, clears the log sink, registers the job handle and spawns
    /// the orchestrator.
    pub fn start_job(self: &Arc<Self>) -> Result<(), ImportControlError> {
        let mut slot = self.slot.lock().unwrap();
        if slot.state.status.is_running() {
            return Err(ImportControlError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        slot.state = JobState {
            status: JobStatus::Running,
            message: "Starting import...".to_string(),
        };
        self.sink.reset();
        slot.handle = Some(JobHandle {
            cancel: cancel.clone(),
            stopper: None,
        });

        tokio::spawn(Arc::clone(self).run(cancel));
        Ok(())
    }

    /// Request cancellation of the running job
    ///
    /// Sets the one-shot cancellation token and signals the import
    /// subprocess if it is already running. The orchestrator observes the
    /// token between output lines, so latency is bounded by the time between
    /// lines; the direct signal is the primary forcing function.
    pub fn request_cancel(&self) -> Result<(), ImportControlError> {
        let mut slot = self.slot.lock().unwrap();
        if !slot.state.status.is_running() {
            return Err(ImportControlError::NotRunning);
        }
        let handle = slot
            .handle
            .as_mut()
            .ok_or(ImportControlError::NotRunning)?;
        if handle.cancel.is_cancelled() {
            return Err(ImportControlError::AlreadyCancelling);
        }

        handle.cancel.cancel();
        self.sink.warning("Cancellation requested, stopping import...");

        if let Some(stopper) = &handle.stopper {
            if let Err(e) = stopper.signal_graceful() {
                // Best effort: the orchestrator still observes the token
                // between output lines
                warn!("Failed to signal import process: {}", e);
            }
        }

        Ok(())
    }

    fn register_stopper(&self, stopper: Arc<dyn ProcessStopper>) {
        if let Some(handle) = self.slot.lock().unwrap().handle.as_mut() {
            handle.stopper = Some(stopper);
        }
    }

    fn clear_stopper(&self) {
        if let Some(handle) = self.slot.lock().unwrap().handle.as_mut() {
            handle.stopper = None;
        }
    }

    fn set_terminal(&self, status: JobStatus, message: impl Into<String>) {
        let mut slot = self.slot.lock().unwrap();
        slot.state = JobState {
            status,
            message: message.into(),
        };
    }

    /// Orchestrator task body
    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        // Clears the job handle when this task ends, even if it panics; a
        // new job must always be startable afterwards.
        struct SlotGuard<'a>(&'a ImportJobService);
        impl Drop for SlotGuard<'_> {
            fn drop(&mut self) {
                let mut slot = self.0.slot.lock().unwrap();
                slot.handle = None;
                if slot.state.status.is_running() {
                    slot.state = JobState {
                        status: JobStatus::Failed,
                        message: "Import job aborted unexpectedly".to_string(),
                    };
                }
            }
        }
        let _guard = SlotGuard(&self);

        let outcome = match self.drive(&cancel).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Import job failed: {}", err);
                self.sink.error(format!("Import failed: {}", err));
                if cancel.is_cancelled() {
                    JobOutcome::Cancelled
                } else {
                    JobOutcome::Failed(err.to_string())
                }
            }
        };

        // The relay is restarted on every path; stopping it may have
        // (partially) succeeded even when the job failed early.
        self.restart_relay(&outcome).await;

        match outcome {
            JobOutcome::Completed => {
                self.sink.success("✓ Import process completed successfully!");
                self.set_terminal(JobStatus::Completed, "Import completed successfully");
            }
            JobOutcome::Cancelled => {
                self.sink.warning("Import cancelled by user");
                self.set_terminal(JobStatus::Cancelled, "Import cancelled by user");
            }
            JobOutcome::Failed(message) => {
                self.set_terminal(JobStatus::Failed, message);
            }
        }
    }

    async fn drive(&self, cancel: &CancellationToken) -> Result<JobOutcome, ImportJobError> {
        let settings = &self.settings;
        let tunables = &self.tunables;

        self.sink.info("Starting import process...");
        self.sink
            .info(format!("Using container runtime: {}", self.runtime.name()));

        self.sink.info("Stopping HAVEN relay...");
        self.runtime
            .stop(&settings.relay_container, tunables.stop_relay_timeout)
            .await
            .map_err(ImportJobError::RelayStop)?;
        self.sink.success("HAVEN relay stopped");

        tokio::time::sleep(tunables.settle_delay).await;
        if cancel.is_cancelled() {
            // Nothing has been imported yet, so there is no partial work to
            // undo; skip straight to the cancelled path
            return Ok(JobOutcome::Cancelled);
        }

        let image = self.resolve_image().await;
        let network = self.resolve_network().await;
        let env = self
            .config
            .env_pairs()
            .await
            .map_err(ImportJobError::EnvFile)?;

        self.sink.info("Running haven --import...");
        self.sink.info("This may take several minutes...");
        self.sink.info(format!(
            "Executing import with {} environment variables",
            env.len()
        ));
        self.sink
            .info(format!("Data directory: {}", settings.data_dir.display()));

        let spec = RunSpec {
            image,
            entrypoint: IMPORT_ENTRYPOINT.iter().map(|s| s.to_string()).collect(),
            volumes: vec![
                VolumeMount {
                    host: settings.data_dir.join("config"),
                    container: "/haven-config".to_string(),
                },
                VolumeMount {
                    host: settings.data_dir.join("blossom"),
                    container: "/haven/blossom".to_string(),
                },
                VolumeMount {
                    host: settings.data_dir.join("db"),
                    container: "/haven/db".to_string(),
                },
            ],
            network: Some(network),
            env,
        };

        let mut process = self
            .runtime
            .spawn_import(&spec)
            .await
            .map_err(ImportJobError::SpawnImport)?;
        self.register_stopper(process.stopper());

        let result = self.supervise(process.as_mut(), cancel).await;
        self.clear_stopper();
        result
    }

    /// Consume subprocess output until completion, cancellation or output
    /// close, then bring the subprocess down accordingly
    async fn supervise(
        &self,
        process: &mut dyn ImportProcess,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, ImportJobError> {
        let tunables = &self.tunables;
        let mut cancelled = false;
        let mut completed = false;

        while let Some(line) = process.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.sink.info(line);
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if (self.matcher)(line) {
                completed = true;
                break;
            }
        }

        // The stream can also close because the cancel request signalled the
        // process directly; a deliberately interrupted process is not a
        // failure even when it exits non-zero
        if !cancelled && !completed && cancel.is_cancelled() {
            cancelled = true;
        }

        if cancelled {
            let _ = process.stopper().signal_graceful();
            if process.wait(tunables.cancel_wait).await?.is_none() {
                process.kill().await?;
            }
            return Ok(JobOutcome::Cancelled);
        }

        if completed {
            self.sink
                .success("Import completed, stopping import container...");
            let _ = process.stopper().signal_graceful();
            if process.wait(tunables.complete_wait).await?.is_none() {
                process.kill().await?;
            }
            return Ok(JobOutcome::Completed);
        }

        // The process closed its output on its own
        match process.wait(tunables.exit_wait).await? {
            Some(_) if cancel.is_cancelled() => Ok(JobOutcome::Cancelled),
            Some(0) => {
                self.sink.success("Import completed successfully");
                Ok(JobOutcome::Completed)
            }
            Some(code) => Err(ImportJobError::ImportExit(code)),
            None => {
                let _ = process.stopper().signal_graceful();
                if process.wait(tunables.late_stop_wait).await?.is_none() {
                    process.kill().await?;
                }
                Err(ImportJobError::ImportTimeout)
            }
        }
    }

    /// Image for the import container: explicit override, else the relay's
    /// own image, else a well-known default with a warning
    async fn resolve_image(&self) -> String {
        if let Some(image) = &self.settings.image_override {
            return image.clone();
        }
        let inspected = self
            .runtime
            .inspect_format(
                &self.settings.relay_container,
                "{{.Config.Image}}",
                self.tunables.inspect_timeout,
            )
            .await;
        match inspected {
            Ok(image) if !image.is_empty() => image,
            other => {
                if let Err(e) = other {
                    warn!("Could not inspect relay image: {}", e);
                }
                self.sink.warning(format!(
                    "Could not determine relay image; using default {}",
                    DEFAULT_IMPORT_IMAGE
                ));
                DEFAULT_IMPORT_IMAGE.to_string()
            }
        }
    }

    /// Network for the import container, resolved like the image
    async fn resolve_network(&self) -> String {
        if let Some(network) = &self.settings.network_override {
            return network.clone();
        }
        let inspected = self
            .runtime
            .inspect_format(
                &self.settings.relay_container,
                "{{.HostConfig.NetworkMode}}",
                self.tunables.inspect_timeout,
            )
            .await;
        match inspected {
            Ok(network) if !network.is_empty() => network,
            other => {
                if let Err(e) = other {
                    warn!("Could not inspect relay network: {}", e);
                }
                self.sink.warning(format!(
                    "Could not determine relay network; using default {}",
                    DEFAULT_IMPORT_NETWORK
                ));
                DEFAULT_IMPORT_NETWORK.to_string()
            }
        }
    }

    /// Restart the relay, regardless of how the job ended
    ///
    /// A restart failure is reported as an additional error event; it never
    /// changes the already-determined job outcome, and the service being
    /// left down is never silent.
    async fn restart_relay(&self, outcome: &JobOutcome) {
        self.sink.info("Starting HAVEN relay...");
        match self
            .runtime
            .start(
                &self.settings.relay_container,
                self.tunables.start_relay_timeout,
            )
            .await
        {
            Ok(()) => match outcome {
                JobOutcome::Failed(_) => self.sink.warning("HAVEN relay restarted after error"),
                _ => self.sink.success("HAVEN relay started"),
            },
            Err(e) => {
                error!("Failed to restart relay after import: {}", e);
                self.sink
                    .error(format!("Failed to restart HAVEN relay: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matcher_is_case_insensitive() {
        let matcher = default_completion_matcher();
        assert!(matcher("Tagged import complete"));
        assert!(matcher("TAGGED IMPORT COMPLETE, PLEASE RESTART THE RELAY"));
        assert!(matcher("2024/01/01 12:00:00 please restart the relay now"));
    }

    #[test]
    fn matcher_ignores_ordinary_lines() {
        let matcher = default_completion_matcher();
        assert!(!matcher("importing event 128/4096"));
        assert!(!matcher("tagged 500 events"));
        assert!(!matcher(""));
    }

    #[test]
    fn default_tunables_match_production_policy() {
        let tunables = ImportTunables::default();
        assert_eq!(tunables.stop_relay_timeout, Duration::from_secs(30));
        assert_eq!(tunables.cancel_wait, Duration::from_secs(10));
        assert_eq!(tunables.complete_wait, Duration::from_secs(30));
        assert_eq!(tunables.exit_wait, Duration::from_secs(600));
        assert_eq!(tunables.late_stop_wait, Duration::from_secs(15));
    }
}

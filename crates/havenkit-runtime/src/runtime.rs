//! The container runtime boundary
//!
//! Everything the console asks of docker/podman goes through
//! [`ContainerRuntime`], and everything it does with the live import
//! subprocess goes through [`ImportProcess`]. Keeping these as traits lets
//! the import orchestrator be driven end-to-end by a recording fake in
//! tests (see [`crate::test_utils`]).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("`{command}` failed with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bind mount handed to `run -v`
#[derive(Debug, Clone)]
pub struct VolumeMount {
    pub host: PathBuf,
    pub container: String,
}

/// Everything needed to launch the one-shot import container
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub image: String,
    pub entrypoint: Vec<String>,
    pub volumes: Vec<VolumeMount>,
    pub network: Option<String>,
    pub env: Vec<(String, String)>,
}

/// Handle for signalling a running import subprocess from another task
///
/// Separated from [`ImportProcess`] so a concurrent cancel request can reach
/// the process while the orchestrator owns the process itself.
pub trait ProcessStopper: Send + Sync {
    /// Best-effort interrupt signal (SIGINT)
    fn signal_graceful(&self) -> std::io::Result<()>;

    /// SIGTERM
    fn terminate(&self) -> std::io::Result<()>;
}

/// A spawned import subprocess
///
/// The output is a finite lazy sequence of lines, stdout and stderr merged
/// in arrival order; it ends when the process closes its output and is not
/// restartable. The owner is responsible for reaping the process on every
/// exit path.
#[async_trait]
pub trait ImportProcess: Send {
    /// Next line of combined output, or `None` once the process has closed
    /// its output
    async fn next_line(&mut self) -> Option<String>;

    /// Signal handle usable from other tasks
    fn stopper(&self) -> Arc<dyn ProcessStopper>;

    /// Wait for exit up to `timeout`; `Ok(None)` means the timeout elapsed
    async fn wait(&mut self, timeout: Duration) -> Result<Option<i32>, RuntimeError>;

    /// Force-kill the process and reap it
    async fn kill(&mut self) -> Result<(), RuntimeError>;
}

/// The container runtime CLI surface the console depends on
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime name for log messages ("docker", "podman")
    fn name(&self) -> &str;

    /// `stop <container>` bounded by `timeout`
    async fn stop(&self, container: &str, timeout: Duration) -> Result<(), RuntimeError>;

    /// `start <container>` bounded by `timeout`
    async fn start(&self, container: &str, timeout: Duration) -> Result<(), RuntimeError>;

    /// `restart <container>` bounded by `timeout`
    async fn restart(&self, container: &str, timeout: Duration) -> Result<(), RuntimeError>;

    /// `inspect -f <template> <container>`, trimmed stdout
    async fn inspect_format(
        &self,
        container: &str,
        template: &str,
        timeout: Duration,
    ) -> Result<String, RuntimeError>;

    /// `run --rm ...` for the one-shot import container
    async fn spawn_import(&self, spec: &RunSpec) -> Result<Box<dyn ImportProcess>, RuntimeError>;
}

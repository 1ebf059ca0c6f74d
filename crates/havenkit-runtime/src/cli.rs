//! CLI-backed [`ContainerRuntime`] implementation

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::debug;

use crate::detect::{detect_runtime, RuntimeKind};
use crate::runtime::{ContainerRuntime, ImportProcess, ProcessStopper, RunSpec, RuntimeError};

/// Merge a child's stdout and stderr into one ordered line channel
///
/// Two reader tasks forward lines as they arrive; the channel closes once
/// both pipes reach EOF.
pub fn merged_output_lines(child: &mut Child) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }

    rx
}

/// Container runtime driven through the docker/podman CLI
pub struct CliRuntime {
    kind: RuntimeKind,
}

impl CliRuntime {
    pub fn new(kind: RuntimeKind) -> Self {
        Self { kind }
    }

    /// Create a runtime for whatever CLI the host environment points at
    pub fn detect() -> Self {
        Self::new(detect_runtime())
    }

    pub fn kind(&self) -> RuntimeKind {
        self.kind
    }

    /// Run a CLI subcommand to completion within `timeout`
    async fn run_bounded(&self, args: &[&str], timeout: Duration) -> Result<String, RuntimeError> {
        let command = format!("{} {}", self.kind.binary(), args.join(" "));
        debug!("Running `{}`", command);

        let mut cmd = Command::new(self.kind.binary());
        // kill_on_drop reaps the child if the timeout abandons the future
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| RuntimeError::Timeout {
                command: command.clone(),
                seconds: timeout.as_secs(),
            })?
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    fn name(&self) -> &str {
        self.kind.binary()
    }

    async fn stop(&self, container: &str, timeout: Duration) -> Result<(), RuntimeError> {
        self.run_bounded(&["stop", container], timeout).await?;
        Ok(())
    }

    async fn start(&self, container: &str, timeout: Duration) -> Result<(), RuntimeError> {
        self.run_bounded(&["start", container], timeout).await?;
        Ok(())
    }

    async fn restart(&self, container: &str, timeout: Duration) -> Result<(), RuntimeError> {
        self.run_bounded(&["restart", container], timeout).await?;
        Ok(())
    }

    async fn inspect_format(
        &self,
        container: &str,
        template: &str,
        timeout: Duration,
    ) -> Result<String, RuntimeError> {
        self.run_bounded(&["inspect", "-f", template, container], timeout)
            .await
    }

    async fn spawn_import(&self, spec: &RunSpec) -> Result<Box<dyn ImportProcess>, RuntimeError> {
        let mut args: Vec<String> = vec!["run".to_string(), "--rm".to_string()];

        for mount in &spec.volumes {
            args.push("-v".to_string());
            // :z relabels the volume so the import container can share it on
            // SELinux hosts (podman machines in particular)
            args.push(format!("{}:{}:z", mount.host.display(), mount.container));
        }

        if let Some(network) = &spec.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }

        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(spec.image.clone());
        args.extend(spec.entrypoint.iter().cloned());

        let command = format!("{} run --rm ... {}", self.kind.binary(), spec.image);
        debug!(
            "Spawning import container: {} {}",
            self.kind.binary(),
            args.join(" ")
        );

        let mut child = Command::new(self.kind.binary())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RuntimeError::Spawn { command, source })?;

        let lines = merged_output_lines(&mut child);
        let stopper = Arc::new(PidStopper { pid: child.id() });

        Ok(Box::new(CliProcess {
            child,
            lines,
            stopper,
        }))
    }
}

/// Signals a process by PID
pub struct PidStopper {
    pid: Option<u32>,
}

impl PidStopper {
    fn signal(&self, signal: libc::c_int) -> std::io::Result<()> {
        // pid is None once the child has been reaped; nothing left to signal
        let Some(pid) = self.pid else {
            return Ok(());
        };
        let result = unsafe { libc::kill(pid as i32, signal) };
        if result != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

impl ProcessStopper for PidStopper {
    fn signal_graceful(&self) -> std::io::Result<()> {
        self.signal(libc::SIGINT)
    }

    fn terminate(&self) -> std::io::Result<()> {
        self.signal(libc::SIGTERM)
    }
}

struct CliProcess {
    child: Child,
    lines: mpsc::UnboundedReceiver<String>,
    stopper: Arc<PidStopper>,
}

#[async_trait]
impl ImportProcess for CliProcess {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    fn stopper(&self) -> Arc<dyn ProcessStopper> {
        self.stopper.clone()
    }

    async fn wait(&mut self, timeout: Duration) -> Result<Option<i32>, RuntimeError> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => Ok(Some(status.code().unwrap_or(-1))),
            Ok(Err(e)) => Err(RuntimeError::Io(e)),
            Err(_) => Ok(None),
        }
    }

    async fn kill(&mut self) -> Result<(), RuntimeError> {
        match self.child.start_kill() {
            Ok(()) => {}
            // already exited; wait below reaps it
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(RuntimeError::Io(e)),
        }
        self.child.wait().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn merged_output_interleaves_stdout_and_stderr() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("echo out; echo err >&2")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let mut lines = merged_output_lines(&mut child);
        let mut collected = Vec::new();
        while let Some(line) = lines.recv().await {
            collected.push(line);
        }
        child.wait().await.unwrap();

        collected.sort();
        assert_eq!(collected, vec!["err".to_string(), "out".to_string()]);
    }

    #[tokio::test]
    async fn wait_reports_exit_code_and_timeout() {
        let mut child = Command::new("sh").arg("-c").arg("exit 3").spawn().unwrap();
        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn runtime_errors_render_the_failing_command() {
        let err = RuntimeError::CommandFailed {
            command: "docker stop haven_relay_1".to_string(),
            status: 1,
            stderr: "no such container".to_string(),
        };
        assert!(err.to_string().contains("docker stop haven_relay_1"));
        assert!(err.to_string().contains("no such container"));

        let err = RuntimeError::Timeout {
            command: "docker start haven_relay_1".to_string(),
            seconds: 30,
        };
        assert!(err.to_string().contains("timed out after 30s"));
    }
}

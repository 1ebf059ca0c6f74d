//! Test utilities for container runtime consumers
//!
//! [`FakeRuntime`] records every invocation in order and serves scripted
//! responses, so orchestration logic can be exercised without a container
//! runtime on the host.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::runtime::{ContainerRuntime, ImportProcess, ProcessStopper, RunSpec, RuntimeError};

#[derive(Default)]
struct FakeState {
    invocations: Vec<String>,
    inspect_responses: HashMap<String, String>,
    import_lines: Vec<String>,
    feed: Option<mpsc::UnboundedReceiver<String>>,
    exit_code: i32,
    ignore_graceful: bool,
    fail_stop: bool,
    fail_start: bool,
}

/// Recording fake for [`ContainerRuntime`]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
    graceful_signals: Arc<AtomicUsize>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            graceful_signals: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Lines the next spawned import process emits before closing its output
    pub fn with_import_lines<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().unwrap().import_lines = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Exit code of the next spawned import process
    pub fn with_exit_code(self, code: i32) -> Self {
        self.state.lock().unwrap().exit_code = code;
        self
    }

    /// Scripted `inspect -f` answer for a template
    pub fn with_inspect(self, template: &str, value: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .inspect_responses
            .insert(template.to_string(), value.to_string());
        self
    }

    /// The next import process records graceful signals but keeps running
    /// until force-killed
    pub fn refusing_graceful(self) -> Self {
        self.state.lock().unwrap().ignore_graceful = true;
        self
    }

    /// `stop` invocations fail
    pub fn failing_stop(self) -> Self {
        self.state.lock().unwrap().fail_stop = true;
        self
    }

    /// `start` invocations fail
    pub fn failing_start(self) -> Self {
        self.state.lock().unwrap().fail_start = true;
        self
    }

    /// Feed the next import process lines interactively; the process keeps
    /// its output open until the returned sender is dropped or the process
    /// is signalled
    pub fn feed(&self) -> mpsc::UnboundedSender<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().feed = Some(rx);
        tx
    }

    /// All runtime invocations so far, in call order
    pub fn invocations(&self) -> Vec<String> {
        self.state.lock().unwrap().invocations.clone()
    }

    /// Number of graceful-stop signals sent to spawned processes
    pub fn graceful_signals(&self) -> usize {
        self.graceful_signals.load(Ordering::SeqCst)
    }

    fn record(&self, invocation: String) {
        self.state.lock().unwrap().invocations.push(invocation);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn stop(&self, container: &str, _timeout: Duration) -> Result<(), RuntimeError> {
        self.record(format!("stop {}", container));
        if self.state.lock().unwrap().fail_stop {
            return Err(RuntimeError::CommandFailed {
                command: format!("fake stop {}", container),
                status: 1,
                stderr: "simulated stop failure".to_string(),
            });
        }
        Ok(())
    }

    async fn start(&self, container: &str, _timeout: Duration) -> Result<(), RuntimeError> {
        self.record(format!("start {}", container));
        if self.state.lock().unwrap().fail_start {
            return Err(RuntimeError::CommandFailed {
                command: format!("fake start {}", container),
                status: 1,
                stderr: "simulated start failure".to_string(),
            });
        }
        Ok(())
    }

    async fn restart(&self, container: &str, _timeout: Duration) -> Result<(), RuntimeError> {
        self.record(format!("restart {}", container));
        Ok(())
    }

    async fn inspect_format(
        &self,
        container: &str,
        template: &str,
        _timeout: Duration,
    ) -> Result<String, RuntimeError> {
        self.record(format!("inspect {} {}", container, template));
        self.state
            .lock()
            .unwrap()
            .inspect_responses
            .get(template)
            .cloned()
            .ok_or_else(|| RuntimeError::CommandFailed {
                command: format!("fake inspect {}", container),
                status: 1,
                stderr: "no such object".to_string(),
            })
    }

    async fn spawn_import(&self, spec: &RunSpec) -> Result<Box<dyn ImportProcess>, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state.invocations.push(format!("run {}", spec.image));

        let stop = CancellationToken::new();
        let stopper = Arc::new(FakeStopper {
            stop: stop.clone(),
            signals: self.graceful_signals.clone(),
            ignore_graceful: state.ignore_graceful,
        });

        Ok(Box::new(FakeProcess {
            scripted: state.import_lines.drain(..).collect(),
            feed: state.feed.take(),
            exit_code: state.exit_code,
            output_done: false,
            stop,
            stopper,
        }))
    }
}

/// Stopper handed out by [`FakeProcess`]; counts graceful signals
pub struct FakeStopper {
    stop: CancellationToken,
    signals: Arc<AtomicUsize>,
    ignore_graceful: bool,
}

impl ProcessStopper for FakeStopper {
    fn signal_graceful(&self) -> std::io::Result<()> {
        self.signals.fetch_add(1, Ordering::SeqCst);
        if !self.ignore_graceful {
            self.stop.cancel();
        }
        Ok(())
    }

    fn terminate(&self) -> std::io::Result<()> {
        if !self.ignore_graceful {
            self.stop.cancel();
        }
        Ok(())
    }
}

/// Scripted import process produced by [`FakeRuntime::spawn_import`]
pub struct FakeProcess {
    scripted: VecDeque<String>,
    feed: Option<mpsc::UnboundedReceiver<String>>,
    exit_code: i32,
    output_done: bool,
    stop: CancellationToken,
    stopper: Arc<FakeStopper>,
}

#[async_trait]
impl ImportProcess for FakeProcess {
    async fn next_line(&mut self) -> Option<String> {
        if self.stop.is_cancelled() {
            self.output_done = true;
            return None;
        }
        if let Some(line) = self.scripted.pop_front() {
            return Some(line);
        }
        let stop = self.stop.clone();
        let line = match self.feed.as_mut() {
            Some(feed) => tokio::select! {
                _ = stop.cancelled() => None,
                line = feed.recv() => line,
            },
            None => None,
        };
        if line.is_none() {
            self.output_done = true;
        }
        line
    }

    fn stopper(&self) -> Arc<dyn ProcessStopper> {
        self.stopper.clone()
    }

    async fn wait(&mut self, timeout: Duration) -> Result<Option<i32>, RuntimeError> {
        if self.stop.is_cancelled() || self.output_done {
            return Ok(Some(self.exit_code));
        }
        let stop = self.stop.clone();
        tokio::select! {
            _ = stop.cancelled() => Ok(Some(self.exit_code)),
            _ = tokio::time::sleep(timeout) => Ok(None),
        }
    }

    async fn kill(&mut self) -> Result<(), RuntimeError> {
        self.stop.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_lines_then_exit() {
        let runtime = FakeRuntime::new()
            .with_import_lines(["one", "two"])
            .with_exit_code(7);
        let spec = RunSpec {
            image: "img".to_string(),
            entrypoint: vec![],
            volumes: vec![],
            network: None,
            env: vec![],
        };

        let mut process = runtime.spawn_import(&spec).await.unwrap();
        assert_eq!(process.next_line().await.as_deref(), Some("one"));
        assert_eq!(process.next_line().await.as_deref(), Some("two"));
        assert_eq!(process.next_line().await, None);
        assert_eq!(process.wait(Duration::from_millis(10)).await.unwrap(), Some(7));
        assert_eq!(runtime.invocations(), vec!["run img".to_string()]);
    }

    #[tokio::test]
    async fn graceful_signal_closes_fed_process() {
        let runtime = FakeRuntime::new();
        let feed = runtime.feed();
        let spec = RunSpec {
            image: "img".to_string(),
            entrypoint: vec![],
            volumes: vec![],
            network: None,
            env: vec![],
        };

        let mut process = runtime.spawn_import(&spec).await.unwrap();
        feed.send("line".to_string()).unwrap();
        assert_eq!(process.next_line().await.as_deref(), Some("line"));

        process.stopper().signal_graceful().unwrap();
        assert_eq!(process.next_line().await, None);
        assert_eq!(process.wait(Duration::from_millis(10)).await.unwrap(), Some(0));
        assert_eq!(runtime.graceful_signals(), 1);
    }

    #[tokio::test]
    async fn stubborn_process_outlives_graceful_stop() {
        let runtime = FakeRuntime::new().refusing_graceful();
        let feed = runtime.feed();
        let spec = RunSpec {
            image: "img".to_string(),
            entrypoint: vec![],
            volumes: vec![],
            network: None,
            env: vec![],
        };

        let mut process = runtime.spawn_import(&spec).await.unwrap();
        process.stopper().signal_graceful().unwrap();
        assert_eq!(process.wait(Duration::from_millis(20)).await.unwrap(), None);

        process.kill().await.unwrap();
        assert_eq!(process.wait(Duration::from_millis(10)).await.unwrap(), Some(0));
        drop(feed);
    }
}

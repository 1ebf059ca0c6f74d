//! End-to-end tests for the import job state machine, driven by a recording
//! fake container runtime

use std::sync::Arc;
use std::time::Duration;

use havenkit_config::ConfigService;
use havenkit_import::services::ImportControlError;
use havenkit_import::{
    ImportJobService, ImportSettings, ImportTunables, JobState, JobStatus, LogEvent, LogEventKind,
};
use havenkit_runtime::test_utils::FakeRuntime;
use havenkit_runtime::ContainerRuntime;
use tempfile::TempDir;

const RELAY: &str = "haven_relay_1";
const IMAGE_TEMPLATE: &str = "{{.Config.Image}}";
const NETWORK_TEMPLATE: &str = "{{.HostConfig.NetworkMode}}";

fn fast_tunables() -> ImportTunables {
    ImportTunables {
        stop_relay_timeout: Duration::from_secs(1),
        settle_delay: Duration::from_millis(20),
        inspect_timeout: Duration::from_secs(1),
        cancel_wait: Duration::from_millis(100),
        complete_wait: Duration::from_millis(100),
        exit_wait: Duration::from_millis(500),
        late_stop_wait: Duration::from_millis(50),
        start_relay_timeout: Duration::from_secs(1),
    }
}

fn settings(dir: &TempDir) -> ImportSettings {
    ImportSettings {
        relay_container: RELAY.to_string(),
        data_dir: dir.path().to_path_buf(),
        image_override: None,
        network_override: None,
    }
}

async fn setup(runtime: FakeRuntime) -> (Arc<ImportJobService>, Arc<FakeRuntime>, TempDir) {
    setup_with(runtime, fast_tunables()).await
}

async fn setup_with(
    runtime: FakeRuntime,
    tunables: ImportTunables,
) -> (Arc<ImportJobService>, Arc<FakeRuntime>, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = Arc::new(ConfigService::new(dir.path().join("config")));
    config
        .write_env("OWNER_NPUB=npub1abc\nRELAY_URL=\"ws://localhost:3355\"\n")
        .await
        .unwrap();

    let runtime = Arc::new(runtime);
    let service = Arc::new(
        ImportJobService::new(
            runtime.clone() as Arc<dyn ContainerRuntime>,
            config,
            settings(&dir),
        )
        .with_tunables(tunables),
    );
    (service, runtime, dir)
}

async fn wait_for_terminal(service: &ImportJobService) -> JobState {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let state = service.state();
            if state.status.is_terminal() {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not reach a terminal state")
}

fn drain_events(service: &ImportJobService) -> Vec<LogEvent> {
    let mut rx = service.sink().take_reader().expect("sink reader available");
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn positions_of(invocations: &[String], prefix: &str) -> Vec<usize> {
    invocations
        .iter()
        .enumerate()
        .filter(|(_, inv)| inv.starts_with(prefix))
        .map(|(i, _)| i)
        .collect()
}

#[tokio::test]
async fn completed_import_runs_stop_run_start_in_order() {
    let runtime = FakeRuntime::new()
        .with_import_lines([
            "Starting import",
            "Tagged import complete, please restart the relay",
        ])
        .with_inspect(IMAGE_TEMPLATE, "localhost/haven-kit_haven_relay:latest")
        .with_inspect(NETWORK_TEMPLATE, "haven-kit_haven_network");
    let (service, runtime, _dir) = setup(runtime).await;

    service.start_job().unwrap();
    let state = wait_for_terminal(&service).await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.message, "Import completed successfully");

    let invocations = runtime.invocations();
    let stops = positions_of(&invocations, "stop ");
    let runs = positions_of(&invocations, "run ");
    let starts = positions_of(&invocations, "start ");
    assert_eq!(stops.len(), 1, "exactly one relay stop: {:?}", invocations);
    assert_eq!(runs.len(), 1, "exactly one import run: {:?}", invocations);
    assert_eq!(starts.len(), 1, "exactly one relay start: {:?}", invocations);
    assert!(stops[0] < runs[0] && runs[0] < starts[0]);
    assert_eq!(
        invocations[runs[0]],
        "run localhost/haven-kit_haven_relay:latest"
    );

    // the detected completion triggered a graceful stop of the subprocess
    assert_eq!(runtime.graceful_signals(), 1);

    let events = drain_events(&service);
    assert!(events
        .iter()
        .any(|e| e.kind == LogEventKind::Info && e.message == "Starting import"));
    assert!(events
        .iter()
        .any(|e| e.message.contains("Tagged import complete")));
    let last = events.last().unwrap();
    assert_eq!(last.kind, LogEventKind::Success);
    assert!(last.message.contains("Import process completed successfully"));
}

#[tokio::test]
async fn introspection_failure_falls_back_with_warning() {
    // no scripted inspect answers: both lookups fail
    let runtime = FakeRuntime::new().with_import_lines(["Tagged import complete"]);
    let (service, runtime, _dir) = setup(runtime).await;

    service.start_job().unwrap();
    let state = wait_for_terminal(&service).await;
    assert_eq!(state.status, JobStatus::Completed);

    let invocations = runtime.invocations();
    assert!(invocations.contains(&"run localhost/haven-kit_haven_relay:latest".to_string()));
    assert!(invocations.iter().any(|i| i.starts_with("inspect ")));

    let events = drain_events(&service);
    assert!(events
        .iter()
        .any(|e| e.kind == LogEventKind::Warning && e.message.contains("relay image")));
    assert!(events
        .iter()
        .any(|e| e.kind == LogEventKind::Warning && e.message.contains("relay network")));
}

#[tokio::test]
async fn explicit_overrides_skip_introspection() {
    let runtime = FakeRuntime::new().with_import_lines(["Tagged import complete"]);
    let dir = TempDir::new().unwrap();
    let config = Arc::new(ConfigService::new(dir.path().join("config")));
    config.ensure_config_files().await.unwrap();

    let runtime = Arc::new(runtime);
    let service = Arc::new(
        ImportJobService::new(
            runtime.clone() as Arc<dyn ContainerRuntime>,
            config,
            ImportSettings {
                relay_container: RELAY.to_string(),
                data_dir: dir.path().to_path_buf(),
                image_override: Some("registry.example.com/haven:v2".to_string()),
                network_override: Some("custom-net".to_string()),
            },
        )
        .with_tunables(fast_tunables()),
    );

    service.start_job().unwrap();
    let state = wait_for_terminal(&service).await;
    assert_eq!(state.status, JobStatus::Completed);

    let invocations = runtime.invocations();
    assert!(invocations.iter().all(|i| !i.starts_with("inspect ")));
    assert!(invocations.contains(&"run registry.example.com/haven:v2".to_string()));
}

#[tokio::test]
async fn second_start_is_rejected_and_leaves_job_running() {
    let runtime = FakeRuntime::new();
    let feed = runtime.feed();
    let (service, _runtime, _dir) = setup(runtime).await;

    service.start_job().unwrap();
    assert_eq!(
        service.start_job().unwrap_err(),
        ImportControlError::AlreadyRunning
    );
    assert!(service.state().status.is_running());

    service.request_cancel().unwrap();
    let state = wait_for_terminal(&service).await;
    assert_eq!(state.status, JobStatus::Cancelled);
    drop(feed);
}

#[tokio::test]
async fn cancel_before_subprocess_starts_never_runs_import() {
    let runtime = FakeRuntime::new();
    let (service, runtime, _dir) = setup(runtime).await;

    service.start_job().unwrap();
    // the orchestrator has not passed the settle delay yet
    service.request_cancel().unwrap();

    let state = wait_for_terminal(&service).await;
    assert_eq!(state.status, JobStatus::Cancelled);
    assert_eq!(state.message, "Import cancelled by user");

    let invocations = runtime.invocations();
    assert!(
        invocations.iter().all(|i| !i.starts_with("run ")),
        "import must not be launched: {:?}",
        invocations
    );
    assert_eq!(positions_of(&invocations, "start ").len(), 1);
}

#[tokio::test]
async fn cancel_mid_run_signals_subprocess_and_cancels() {
    let runtime = FakeRuntime::new();
    let feed = runtime.feed();
    let (service, runtime, _dir) = setup(runtime).await;

    service.start_job().unwrap();
    feed.send("Importing notes...".to_string()).unwrap();
    // give the orchestrator time to stop the relay, spawn and consume the line
    tokio::time::sleep(Duration::from_millis(100)).await;

    service.request_cancel().unwrap();
    let state = wait_for_terminal(&service).await;

    assert_eq!(state.status, JobStatus::Cancelled);
    assert!(runtime.graceful_signals() >= 1);

    let invocations = runtime.invocations();
    assert_eq!(positions_of(&invocations, "run ").len(), 1);
    assert_eq!(positions_of(&invocations, "start ").len(), 1);

    let events = drain_events(&service);
    assert!(events.iter().any(|e| e.message == "Importing notes..."));
}

#[tokio::test]
async fn completion_marker_wins_even_when_process_refuses_to_die() {
    let runtime = FakeRuntime::new()
        .refusing_graceful()
        .with_import_lines(["TAGGED IMPORT COMPLETE, PLEASE RESTART THE RELAY"]);
    let (service, runtime, _dir) = setup(runtime).await;

    service.start_job().unwrap();
    let state = wait_for_terminal(&service).await;

    // the forced termination does not flip the outcome
    assert_eq!(state.status, JobStatus::Completed);
    assert!(runtime.graceful_signals() >= 1);
    assert_eq!(
        positions_of(&runtime.invocations(), "start ").len(),
        1,
        "relay restarted exactly once"
    );
}

#[tokio::test]
async fn nonzero_exit_without_marker_fails_with_code() {
    let runtime = FakeRuntime::new()
        .with_import_lines(["importing...", "fatal: db locked"])
        .with_exit_code(3);
    let (service, runtime, _dir) = setup(runtime).await;

    service.start_job().unwrap();
    let state = wait_for_terminal(&service).await;

    assert_eq!(state.status, JobStatus::Failed);
    assert!(
        state.message.contains("code 3"),
        "exit code surfaced: {}",
        state.message
    );
    // relay still restarted
    assert_eq!(positions_of(&runtime.invocations(), "start ").len(), 1);
}

#[tokio::test]
async fn zero_exit_without_marker_completes() {
    let runtime = FakeRuntime::new().with_import_lines(["importing...", "done"]);
    let (service, _runtime, _dir) = setup(runtime).await;

    service.start_job().unwrap();
    let state = wait_for_terminal(&service).await;
    assert_eq!(state.status, JobStatus::Completed);
}

#[tokio::test]
async fn relay_stop_failure_fails_job_but_still_restarts() {
    let runtime = FakeRuntime::new().failing_stop();
    let (service, runtime, _dir) = setup(runtime).await;

    service.start_job().unwrap();
    let state = wait_for_terminal(&service).await;

    assert_eq!(state.status, JobStatus::Failed);
    assert!(state.message.contains("Failed to stop relay"));

    let invocations = runtime.invocations();
    assert_eq!(invocations[0], format!("stop {}", RELAY));
    assert!(invocations.iter().all(|i| !i.starts_with("run ")));
    // restart is attempted even though the stop failed
    assert_eq!(positions_of(&invocations, "start ").len(), 1);
}

#[tokio::test]
async fn restart_failure_does_not_mask_the_job_outcome() {
    let runtime = FakeRuntime::new()
        .failing_start()
        .with_import_lines(["Tagged import complete"]);
    let (service, _runtime, _dir) = setup(runtime).await;

    service.start_job().unwrap();
    let state = wait_for_terminal(&service).await;

    // the job outcome stays completed; the restart failure is an extra event
    assert_eq!(state.status, JobStatus::Completed);
    let events = drain_events(&service);
    assert!(events
        .iter()
        .any(|e| e.kind == LogEventKind::Error && e.message.contains("Failed to restart")));
}

#[tokio::test]
async fn duplicate_cancel_is_rejected() {
    let runtime = FakeRuntime::new().refusing_graceful();
    let feed = runtime.feed();
    let mut tunables = fast_tunables();
    tunables.cancel_wait = Duration::from_millis(300);
    let (service, _runtime, _dir) = setup_with(runtime, tunables).await;

    service.start_job().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    service.request_cancel().unwrap();
    assert_eq!(
        service.request_cancel().unwrap_err(),
        ImportControlError::AlreadyCancelling
    );

    // the stubborn process only reacts once another line lets the
    // orchestrator observe the token, then gets force-killed
    feed.send("still importing...".to_string()).unwrap();
    let state = wait_for_terminal(&service).await;
    assert_eq!(state.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn cancel_without_running_job_is_rejected() {
    let runtime = FakeRuntime::new().with_import_lines(["Tagged import complete"]);
    let (service, _runtime, _dir) = setup(runtime).await;

    assert_eq!(
        service.request_cancel().unwrap_err(),
        ImportControlError::NotRunning
    );

    service.start_job().unwrap();
    let state = wait_for_terminal(&service).await;
    assert_eq!(state.status, JobStatus::Completed);

    // also rejected once the job is terminal
    assert_eq!(
        service.request_cancel().unwrap_err(),
        ImportControlError::NotRunning
    );
}

#[tokio::test]
async fn new_job_can_start_after_a_terminal_job() {
    let runtime = FakeRuntime::new().with_import_lines(["fatal"]).with_exit_code(1);
    let (service, runtime, _dir) = setup(runtime).await;

    service.start_job().unwrap();
    let state = wait_for_terminal(&service).await;
    assert_eq!(state.status, JobStatus::Failed);

    // a fresh job is accepted and drives the full sequence again
    service.start_job().unwrap();
    let state = wait_for_terminal(&service).await;
    assert!(state.status.is_terminal());
    assert_eq!(positions_of(&runtime.invocations(), "stop ").len(), 2);
    assert_eq!(positions_of(&runtime.invocations(), "start ").len(), 2);
}

#[tokio::test]
async fn env_pairs_are_passed_to_the_import_container() {
    // quote stripping and comment skipping are covered by the config crate;
    // here the pairs just need to reach the spawn
    let runtime = FakeRuntime::new().with_import_lines(["Tagged import complete"]);
    let (service, _runtime, _dir) = setup(runtime).await;

    service.start_job().unwrap();
    wait_for_terminal(&service).await;

    let events = drain_events(&service);
    assert!(events
        .iter()
        .any(|e| e.message == "Executing import with 2 environment variables"));
}

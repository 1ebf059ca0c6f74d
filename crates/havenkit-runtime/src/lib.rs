//! Container runtime access for the HavenKit console
//!
//! The console drives docker or podman through their CLIs rather than a
//! daemon API so that the one-shot import container is started as a true
//! sibling of the relay and both runtimes work unchanged. This crate holds
//! the runtime detection logic, the [`ContainerRuntime`] boundary trait with
//! its CLI-backed implementation, and the relay status/restart HTTP surface.

pub mod cli;
pub mod detect;
pub mod handlers;
pub mod plugin;
pub mod runtime;
pub mod test_utils;

pub use cli::CliRuntime;
pub use detect::{detect_runtime, RuntimeKind};
pub use plugin::RuntimePlugin;
pub use runtime::{
    ContainerRuntime, ImportProcess, ProcessStopper, RunSpec, RuntimeError, VolumeMount,
};

//! Container runtime detection (docker vs. podman)

use std::fmt;

/// The container runtime CLI the console shells out to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Docker,
    Podman,
}

impl RuntimeKind {
    /// The CLI binary name for this runtime
    pub fn binary(&self) -> &'static str {
        match self {
            RuntimeKind::Docker => "docker",
            RuntimeKind::Podman => "podman",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// Detect the container runtime based on environment or socket path
///
/// `CONTAINER_RUNTIME` wins when set to a known runtime; otherwise a
/// `podman` substring in the configured socket path selects podman;
/// docker is the default.
pub fn detect_runtime() -> RuntimeKind {
    detect_from(
        std::env::var("CONTAINER_RUNTIME").ok().as_deref(),
        std::env::var("DOCKER_SOCK").ok().as_deref(),
    )
}

fn detect_from(runtime_env: Option<&str>, socket_path: Option<&str>) -> RuntimeKind {
    match runtime_env.map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("docker") => return RuntimeKind::Docker,
        Some("podman") => return RuntimeKind::Podman,
        _ => {}
    }

    if socket_path
        .unwrap_or("/var/run/docker.sock")
        .contains("podman")
    {
        return RuntimeKind::Podman;
    }

    RuntimeKind::Docker
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_takes_precedence() {
        assert_eq!(
            detect_from(Some("podman"), Some("/var/run/docker.sock")),
            RuntimeKind::Podman
        );
        assert_eq!(
            detect_from(Some("DOCKER"), Some("/run/user/1000/podman/podman.sock")),
            RuntimeKind::Docker
        );
    }

    #[test]
    fn unknown_env_value_falls_through_to_socket() {
        assert_eq!(
            detect_from(Some("containerd"), Some("/run/podman/podman.sock")),
            RuntimeKind::Podman
        );
    }

    #[test]
    fn socket_path_selects_podman() {
        assert_eq!(
            detect_from(None, Some("/run/user/1000/podman/podman.sock")),
            RuntimeKind::Podman
        );
    }

    #[test]
    fn defaults_to_docker() {
        assert_eq!(detect_from(None, None), RuntimeKind::Docker);
    }
}

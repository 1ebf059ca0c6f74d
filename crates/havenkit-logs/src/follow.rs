//! Container log following via the runtime CLI

use std::process::Stdio;

use futures::Stream;
use havenkit_runtime::cli::merged_output_lines;
use havenkit_runtime::RuntimeKind;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LogFollowError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Follows a container's logs through `logs -f`
pub struct LogFollowService {
    kind: RuntimeKind,
}

impl LogFollowService {
    pub fn new(kind: RuntimeKind) -> Self {
        Self { kind }
    }

    /// Stream a container's log lines, stdout and stderr merged
    ///
    /// The follower subprocess lives as long as the returned stream and is
    /// killed when the stream is dropped.
    pub fn follow(
        &self,
        container: &str,
        tail: Option<u32>,
    ) -> Result<impl Stream<Item = String>, LogFollowError> {
        let args = follow_args(container, tail);
        let command = format!("{} {}", self.kind.binary(), args.join(" "));
        debug!("Following container logs: `{}`", command);

        let mut child = Command::new(self.kind.binary())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LogFollowError::Spawn { command, source })?;

        let mut lines = merged_output_lines(&mut child);

        Ok(async_stream::stream! {
            while let Some(line) = lines.recv().await {
                yield line;
            }
            // reap the follower once its output closes
            let _ = child.wait().await;
        })
    }
}

fn follow_args(container: &str, tail: Option<u32>) -> Vec<String> {
    let mut args = vec!["logs".to_string(), "-f".to_string()];
    if let Some(tail) = tail {
        args.push("--tail".to_string());
        args.push(tail.to_string());
    }
    args.push(container.to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_args_without_tail() {
        assert_eq!(follow_args("haven_relay_1", None), vec!["logs", "-f", "haven_relay_1"]);
    }

    #[test]
    fn follow_args_with_tail() {
        assert_eq!(
            follow_args("haven_relay_1", Some(200)),
            vec!["logs", "-f", "--tail", "200", "haven_relay_1"]
        );
    }
}

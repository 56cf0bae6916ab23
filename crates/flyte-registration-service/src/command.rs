//! External command execution

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::CommandError;

/// Runs an external program to completion
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and return its stdout followed by its stderr.
    ///
    /// The output is also carried by the error when the program fails.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, CommandError>;
}

/// Runs commands as child processes of the operator
#[derive(Debug, Default, Clone, Copy)]
pub struct OsCommandRunner;

impl OsCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for OsCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, CommandError> {
        debug!(program, ?args, "running command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut out = Vec::new();
        let mut err = Vec::new();

        // Both pipes are drained while the process runs, so whatever it printed
        // before a cancellation is still reported
        let finished = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = async {
                let (read_out, read_err, status) =
                    tokio::join!(drain(stdout, &mut out), drain(stderr, &mut err), child.wait());
                read_out.and(read_err).and(status)
            } => Some(result),
        };

        let combined = combine(&out, &err);
        let status = match finished {
            Some(status) => status.map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?,
            None => {
                if let Err(e) = child.start_kill() {
                    debug!(program, error = %e, "failed to kill cancelled command");
                }
                return Err(CommandError::Cancelled {
                    program: program.to_string(),
                    output: combined,
                });
            }
        };

        if !status.success() {
            return Err(CommandError::Exited {
                program: program.to_string(),
                code: status.code(),
                output: combined,
            });
        }

        Ok(combined)
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>, buf: &mut Vec<u8>) -> std::io::Result<()> {
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(buf).await?;
    }
    Ok(())
}

/// Stdout followed by stderr
fn combine(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(stderr));
    combined
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_output_is_stdout_then_stderr() {
        let output = OsCommandRunner::new()
            .run(
                "sh",
                &args(&["-c", "echo err >&2; echo out"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(output, "out\nerr\n");
    }

    #[tokio::test]
    async fn test_failure_carries_output() {
        let err = OsCommandRunner::new()
            .run(
                "sh",
                &args(&["-c", "echo partial; echo broken >&2; exit 3"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match &err {
            CommandError::Exited { code, output, .. } => {
                assert_eq!(*code, Some(3));
                assert_eq!(output, "partial\nbroken\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let err = OsCommandRunner::new()
            .run("definitely-not-a-real-binary", &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_kills_the_child() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = OsCommandRunner::new()
            .run("sleep", &args(&["5"]), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancellation_keeps_partial_output() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let err = OsCommandRunner::new()
            .run(
                "sh",
                &args(&["-c", "echo uploading; echo retrying >&2; sleep 5"]),
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.output(), "uploading\nretrying\n");
    }
}

//! Bounded external process invocation shared by the renderer, the encoder and the text backend.
//!
//! Every call carries a timeout, captures stdout/stderr and turns a non-zero exit into a
//! [`JobError::NonZeroExit`] that keeps the full diagnostic context.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {}s", .timeout.as_secs_f64())]
    TimedOut { command: String, timeout: Duration },

    #[error("`{command}` failed ({status})\n--- stderr ---\n{stderr}")]
    NonZeroExit {
        command: String,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
}

impl JobError {
    /// Exit code of a process that ran to completion, if any
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            JobError::NonZeroExit { status, .. } => status.code(),
            _ => None,
        }
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// A single-attempt external command with a bounded timeout
#[derive(Debug, Clone)]
pub struct ExternalJob {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    stdin: Option<String>,
    envs: Vec<(String, String)>,
    scrubbed_prefixes: Vec<String>,
    timeout: Duration,
}

impl ExternalJob {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            stdin: None,
            envs: Vec::new(),
            scrubbed_prefixes: Vec::new(),
            timeout,
        }
    }

    /// Build a job from an argv-style command line (`["node", "render.mjs"]`)
    pub fn from_argv(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        Some(Self::new(program.clone(), timeout).args(rest.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Feed `input` to the child's stdin, then close it
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Drop every inherited environment variable starting with `prefix`
    pub fn scrub_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.scrubbed_prefixes.push(prefix.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Human-readable command line for logs and diagnostics
    pub fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion; a non-zero exit is an error carrying the captured output
    pub async fn run(&self) -> Result<JobOutput, JobError> {
        let output = self.output().await?;
        if !output.status.success() {
            return Err(JobError::NonZeroExit {
                command: self.describe(),
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Run to completion and return the output whatever the exit status
    pub async fn output(&self) -> Result<JobOutput, JobError> {
        let command_line = self.describe();
        tracing::debug!("Running external job: {}", command_line);

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(if self.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        if !self.scrubbed_prefixes.is_empty() {
            for (key, _) in std::env::vars_os() {
                let name = key.to_string_lossy();
                if self.scrubbed_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
                    command.env_remove(&key);
                }
            }
        }
        command.envs(self.envs.iter().map(|(k, v)| (k, v)));

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| JobError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let input = self.stdin.clone();
        let stdin = child.stdin.take();
        let run = async move {
            if let (Some(mut pipe), Some(input)) = (stdin, input) {
                // The child may exit without reading everything; its exit status tells the story.
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        return Err(e);
                    }
                }
                drop(pipe);
            }
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result.map_err(|source| JobError::Spawn {
                command: command_line.clone(),
                source,
            })?,
            Err(_) => {
                tracing::warn!("External job timed out after {:?}: {}", self.timeout, command_line);
                return Err(JobError::TimedOut {
                    command: command_line,
                    timeout: self.timeout,
                });
            }
        };

        let elapsed = started.elapsed();
        tracing::debug!(
            "External job finished in {:.1}s with {}: {}",
            elapsed.as_secs_f64(),
            output.status,
            command_line
        );

        Ok(JobOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ExternalJob {
        ExternalJob::new("sh", Duration::from_secs(5)).args(["-c", script])
    }

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let output = sh("echo hello").run().await.unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_diagnostics() {
        let err = sh("echo partial; echo boom >&2; exit 3").run().await.unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
        match err {
            JobError::NonZeroExit { command, stdout, stderr, .. } => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(stdout.trim(), "partial");
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn output_does_not_fail_on_exit_status() {
        let output = sh("exit 7").output().await.unwrap();
        assert_eq!(output.status.code(), Some(7));
    }

    #[tokio::test]
    async fn exceeding_the_timeout_is_an_error() {
        let job = ExternalJob::new("sleep", Duration::from_millis(200)).arg("5");
        let started = Instant::now();
        let err = job.run().await.unwrap_err();
        assert!(matches!(err, JobError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn stdin_is_delivered_and_closed() {
        let output = ExternalJob::new("cat", Duration::from_secs(5))
            .stdin("prompt text")
            .run()
            .await
            .unwrap();
        assert_eq!(output.stdout, "prompt text");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = ExternalJob::new("definitely-not-a-real-binary-wotd", Duration::from_secs(1))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Spawn { .. }));
    }

    #[tokio::test]
    async fn scrubbed_prefixes_are_not_inherited() {
        std::env::set_var("WOTDSCRUB_ONLY_TEST", "leaked");
        let output = sh("echo ${WOTDSCRUB_ONLY_TEST:-unset} ${WOTD_EXPLICIT:-unset}")
            .scrub_env_prefix("WOTDSCRUB")
            .env("WOTD_EXPLICIT", "kept")
            .run()
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "unset kept");
    }

    #[tokio::test]
    async fn runs_in_the_requested_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = sh("pwd").current_dir(dir.path()).run().await.unwrap();
        let reported = std::path::PathBuf::from(output.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn from_argv_splits_program_and_args() {
        let argv = vec!["node".to_string(), "render.mjs".to_string()];
        let job = ExternalJob::from_argv(&argv, Duration::from_secs(1)).unwrap();
        assert_eq!(job.describe(), "node render.mjs");
        assert!(ExternalJob::from_argv(&[], Duration::from_secs(1)).is_none());
    }
}

//! External command execution
//!
//! Commands run directly (never through a shell) with a literal argument
//! vector. Standard output and standard error are captured separately.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Split a raw argument string on runs of whitespace.
///
/// No quoting, escaping or shell metacharacters are interpreted; every
/// token is passed to the program as-is.
pub fn split_arguments(arguments: &str) -> Vec<String> {
    arguments.split_whitespace().map(str::to_string).collect()
}

/// Reasons a command did not complete successfully
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The command name was empty
    #[error("no command given")]
    EmptyCommand,

    /// The program could not be started (not found, not executable, ...)
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program exited unsuccessfully
    #[error("{program} failed with {status}")]
    Exit {
        program: String,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },

    /// The program ran longer than the configured limit and was killed
    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

impl ExecutionError {
    /// Text reported to the control-plane in place of the command output.
    ///
    /// Always carries the `Stdout:` and `Stderr:` sections, empty when
    /// nothing was captured.
    pub fn report(&self) -> String {
        let (stdout, stderr) = match self {
            ExecutionError::Exit { stdout, stderr, .. } => (stdout.as_str(), stderr.as_str()),
            _ => ("", ""),
        };
        format!("Error: {}\nStdout: {}\nStderr: {}", self, stdout, stderr)
    }
}

/// Runs one command and returns its standard output
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, program: &str, args: &[String]) -> Result<String, ExecutionError>;
}

/// [`Executor`] spawning local processes with the agent's privileges
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    /// Create an executor; `timeout` bounds each command's run time
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, program: &str, args: &[String]) -> Result<String, ExecutionError> {
        if program.is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }

        tracing::debug!("Spawning {} {:?}", program, args);
        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let run = command.output();
        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, run).await.map_err(|_| {
                ExecutionError::TimedOut {
                    program: program.to_string(),
                    timeout,
                }
            })?,
            None => run.await,
        }
        .map_err(|source| ExecutionError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        Err(ExecutionError::Exit {
            program: program.to_string(),
            status: output.status,
            stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &str) -> Vec<String> {
        split_arguments(raw)
    }

    #[test]
    fn test_split_collapses_whitespace_runs() {
        assert_eq!(split_arguments("a  b\tc"), vec!["a", "b", "c"]);
        assert_eq!(split_arguments("  get pods \n -A "), vec!["get", "pods", "-A"]);
    }

    #[test]
    fn test_split_does_not_interpret_quotes() {
        assert_eq!(
            split_arguments(r#"-c "echo hi; rm -rf /""#),
            vec!["-c", "\"echo", "hi;", "rm", "-rf", "/\""]
        );
    }

    #[test]
    fn test_split_empty() {
        assert!(split_arguments("").is_empty());
        assert!(split_arguments(" \t ").is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_echo_captures_stdout() {
        let executor = ProcessExecutor::default();
        let output = executor.execute("echo", &args("hello world")).await.unwrap();
        assert_eq!(output, "hello world\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_repeated_execution_is_stable() {
        let executor = ProcessExecutor::default();
        let first = executor.execute("echo", &args("same  input")).await.unwrap();
        let second = executor.execute("echo", &args("same  input")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "same input\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_arguments_are_not_shell_expanded() {
        let executor = ProcessExecutor::default();
        let output = executor.execute("echo", &args("$HOME *")).await.unwrap();
        assert_eq!(output, "$HOME *\n");
    }

    #[tokio::test]
    async fn test_missing_program_reports_empty_streams() {
        let executor = ProcessExecutor::default();
        let err = executor
            .execute("definitely-not-a-real-command-7f3a", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { .. }));

        let report = err.report();
        assert!(report.starts_with("Error: failed to start definitely-not-a-real-command-7f3a"));
        assert!(report.ends_with("\nStdout: \nStderr: "));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_captures_both_streams() {
        let executor = ProcessExecutor::default();
        let err = executor
            .execute("sh", &args("-c echo-out"))
            .await
            .unwrap_err();
        match &err {
            ExecutionError::Exit { status, stderr, .. } => {
                assert!(!status.success());
                assert!(stderr.contains("echo-out"));
            }
            other => panic!("Expected exit failure, got {:?}", other),
        }
        assert!(err.report().contains("Stderr: "));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_command() {
        let executor = ProcessExecutor::new(Some(Duration::from_millis(100)));
        let err = executor.execute("sleep", &args("5")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let executor = ProcessExecutor::default();
        let err = executor.execute("", &[]).await.unwrap_err();
        assert!(matches!(err, ExecutionError::EmptyCommand));
        assert_eq!(err.report(), "Error: no command given\nStdout: \nStderr: ");
    }
}

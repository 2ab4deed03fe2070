use async_trait::async_trait;
use std::time::Duration;

use super::error::ProcessError;

/// What to do with a child's stderr
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StderrMode {
    /// Capture into `ProcessOutput::stderr`
    #[default]
    Capture,
    /// Discard
    Suppress,
    /// Share the parent's stderr, so child logs appear live
    Inherit,
}

#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
    pub stdin: Option<String>,
    pub stderr: StderrMode,
}

impl ProcessCommand {
    /// Program and arguments joined for log and error messages
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Timeout,
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Error(code) => Some(*code),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

pub struct TokioProcessRunner;

impl TokioProcessRunner {
    /// Log command execution details
    fn log_command_start(command: &ProcessCommand) {
        tracing::debug!("Executing subprocess: {}", command.display());

        if let Some(ref stdin) = command.stdin {
            tracing::trace!("Stdin provided: {} bytes", stdin.len());
        }
    }

    /// Build the tokio command with arguments and stdio
    fn configure_command(command: &ProcessCommand) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);

        cmd.args(&command.args);

        // A timed-out child is dropped with its wait future and must not linger
        cmd.kill_on_drop(true);

        Self::configure_stdio(&mut cmd, command);
        cmd
    }

    /// Configure stdio pipes for the process
    fn configure_stdio(cmd: &mut tokio::process::Command, command: &ProcessCommand) {
        if command.stdin.is_some() {
            cmd.stdin(std::process::Stdio::piped());
        } else {
            cmd.stdin(std::process::Stdio::null());
        }

        cmd.stdout(std::process::Stdio::piped());

        match command.stderr {
            StderrMode::Capture => cmd.stderr(std::process::Stdio::piped()),
            StderrMode::Suppress => cmd.stderr(std::process::Stdio::null()),
            StderrMode::Inherit => cmd.stderr(std::process::Stdio::inherit()),
        };
    }

    /// Write stdin data and close the pipe so the child sees EOF. A child
    /// that exits without draining stdin breaks the pipe; its exit status
    /// reports that, so a broken pipe is not an error here.
    async fn write_stdin(
        stdin: Option<tokio::process::ChildStdin>,
        stdin_data: Option<&str>,
    ) -> Result<(), ProcessError> {
        use tokio::io::AsyncWriteExt;

        let (Some(mut stdin), Some(data)) = (stdin, stdin_data) else {
            return Ok(());
        };
        let written = match stdin.write_all(data.as_bytes()).await {
            Ok(()) => stdin.shutdown().await,
            Err(e) => Err(e),
        };
        match written {
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(ProcessError::Stdin(e)),
            _ => Ok(()),
        }
    }

    /// Feed stdin while collecting output, both under the optional timeout
    async fn communicate(
        mut child: tokio::process::Child,
        stdin_data: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<std::process::Output, ProcessError> {
        let stdin = child.stdin.take();
        let exchange = async move {
            let (written, output) = tokio::join!(
                Self::write_stdin(stdin, stdin_data),
                child.wait_with_output()
            );
            let output = output.map_err(ProcessError::Io)?;
            written?;
            Ok::<_, ProcessError>(output)
        };

        match timeout {
            // Dropping the exchange drops the child, which kills it
            Some(duration) => match tokio::time::timeout(duration, exchange).await {
                Ok(result) => result,
                Err(_) => Err(ProcessError::Timeout(duration)),
            },
            None => exchange.await,
        }
    }

    /// Convert process exit status to our ExitStatus enum
    fn parse_exit_status(status: std::process::ExitStatus) -> ExitStatus {
        if status.success() {
            ExitStatus::Success
        } else if let Some(code) = status.code() {
            ExitStatus::Error(code)
        } else {
            Self::parse_signal_status(status)
        }
    }

    #[cfg(unix)]
    fn parse_signal_status(status: std::process::ExitStatus) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            ExitStatus::Signal(signal)
        } else {
            ExitStatus::Error(1)
        }
    }

    #[cfg(not(unix))]
    fn parse_signal_status(_status: std::process::ExitStatus) -> ExitStatus {
        ExitStatus::Error(1)
    }

    /// Log the process execution result
    fn log_result(result: &ProcessOutput, command: &ProcessCommand) {
        match &result.status {
            ExitStatus::Success => {
                tracing::debug!(
                    "Subprocess completed successfully in {:?}: {}",
                    result.duration,
                    command.program
                );
                tracing::trace!("Stdout length: {} bytes", result.stdout.len());
            }
            ExitStatus::Error(code) => {
                tracing::debug!(
                    "Subprocess failed with exit code {} in {:?}: {}",
                    code,
                    result.duration,
                    command.program
                );
                if !result.stderr.is_empty() {
                    tracing::trace!("Stderr: {}", result.stderr);
                }
            }
            ExitStatus::Signal(signal) => {
                tracing::warn!(
                    "Subprocess terminated by signal {} in {:?}: {}",
                    signal,
                    result.duration,
                    command.program
                );
            }
            ExitStatus::Timeout => {
                tracing::warn!(
                    "Subprocess timed out after {:?}: {}",
                    result.duration,
                    command.program
                );
            }
        }
    }

    /// Map spawn error to ProcessError
    fn map_spawn_error(error: std::io::Error, program: &str) -> ProcessError {
        if error.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandNotFound(program.to_string())
        } else {
            tracing::error!("Failed to spawn '{}': {:?}", program, error);
            ProcessError::Spawn(error)
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        let start = std::time::Instant::now();

        Self::log_command_start(&command);

        let mut cmd = Self::configure_command(&command);
        let child = cmd
            .spawn()
            .map_err(|e| Self::map_spawn_error(e, &command.program))?;

        let output =
            Self::communicate(child, command.stdin.as_deref(), command.timeout).await?;

        let duration = start.elapsed();
        let status = Self::parse_exit_status(output.status);
        let result = ProcessOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration,
        };

        Self::log_result(&result, &command);

        Ok(result)
    }
}

//! Ways of running one worker.

use crate::decompose::{CommandDecomposer, Decomposer};
use crate::error::{ErrorCode, ErrorExt, PipelineError, Result};
use crate::subprocess::{ExitStatus, ProcessCommandBuilder, StderrMode, SubprocessManager};
use crate::worker::{BatchOutcome, Worker, WorkerRequest};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, request: WorkerRequest) -> Result<BatchOutcome>;
}

/// Runs each worker as a child process of the current executable
pub struct ProcessLauncher {
    subprocess: SubprocessManager,
    program: PathBuf,
    global_args: Vec<String>,
    timeout: Option<Duration>,
}

impl ProcessLauncher {
    pub fn new(subprocess: SubprocessManager, program: PathBuf) -> Self {
        Self {
            subprocess,
            program,
            global_args: Vec::new(),
            timeout: None,
        }
    }

    /// Launcher re-executing the running binary
    pub fn current_exe(subprocess: SubprocessManager) -> Result<Self> {
        let program = std::env::current_exe()
            .to_execution_error("Cannot locate the running executable")?;
        Ok(Self::new(subprocess, program))
    }

    /// Pass the parent's logging setup on to every worker
    pub fn with_logging(mut self, verbosity: u8, log_level: Option<&str>) -> Self {
        if verbosity > 0 {
            let flag = format!("-{}", "v".repeat(verbosity as usize));
            self.global_args.push(flag);
        }
        if let Some(directive) = log_level {
            self.global_args.push("--log-level".to_string());
            self.global_args.push(directive.to_string());
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The outcome is the last non-empty stdout line
fn parse_outcome(stdout: &str) -> Result<BatchOutcome> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| {
            PipelineError::execution_with_code(
                ErrorCode::EXEC_OUTPUT_ERROR,
                "worker printed no outcome",
                None,
            )
        })?;

    serde_json::from_str(line).map_err(|e| {
        PipelineError::execution_with_code(
            ErrorCode::EXEC_OUTPUT_ERROR,
            format!("unreadable worker outcome: {}", line),
            None,
        )
        .with_source(e)
    })
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, request: WorkerRequest) -> Result<BatchOutcome> {
        let batch_index = request.batch.index;
        let payload =
            serde_json::to_string(&request).to_execution_error("Failed to encode worker request")?;

        let command = ProcessCommandBuilder::new(&self.program.to_string_lossy())
            .args(&self.global_args)
            .arg("worker")
            .stdin(payload)
            .maybe_timeout(self.timeout)
            .stderr(StderrMode::Inherit)
            .build();
        let command_line = command.display();
        debug!("Launching worker for batch {}: {}", batch_index, command_line);

        let output = self
            .subprocess
            .runner()
            .run(command)
            .await
            .map_err(|e| {
                PipelineError::from(e).with_context(format!("batch {}", batch_index))
            })?;

        match output.status {
            ExitStatus::Success => parse_outcome(&output.stdout),
            ExitStatus::Error(code) => Err(PipelineError::execution_with_code(
                ErrorCode::EXEC_SUBPROCESS_FAILED,
                format!("worker for batch {} exited with code {}", batch_index, code),
                Some(command_line),
            )
            .with_exit_code(code)),
            ExitStatus::Signal(signal) => Err(PipelineError::execution_with_code(
                ErrorCode::EXEC_SIGNAL_RECEIVED,
                format!(
                    "worker for batch {} terminated by signal {}",
                    batch_index, signal
                ),
                Some(command_line),
            )),
            ExitStatus::Timeout => Err(PipelineError::execution_with_code(
                ErrorCode::EXEC_TIMEOUT,
                format!("worker for batch {} timed out", batch_index),
                Some(command_line),
            )),
        }
    }
}

/// Runs workers as tasks of the current process, sharing one decomposer
pub struct InProcessLauncher {
    decomposer: Arc<dyn Decomposer>,
}

impl InProcessLauncher {
    pub fn new(decomposer: Arc<dyn Decomposer>) -> Self {
        Self { decomposer }
    }
}

#[async_trait]
impl WorkerLauncher for InProcessLauncher {
    async fn launch(&self, request: WorkerRequest) -> Result<BatchOutcome> {
        Worker::new(request.settings, Arc::clone(&self.decomposer))
            .process(&request.batch)
            .await
    }
}

/// Entry point of the isolated worker process
pub async fn run_worker_request(
    request: WorkerRequest,
    subprocess: SubprocessManager,
) -> Result<BatchOutcome> {
    let decomposer = CommandDecomposer::new(request.decomposer.clone(), subprocess);
    InProcessLauncher::new(Arc::new(decomposer))
        .launch(request)
        .await
}

use crate::error::{ErrorCode, PipelineError};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to write process stdin: {0}")]
    Stdin(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mock expectation not met: {0}")]
    MockExpectationNotMet(String),
}

impl From<ProcessError> for PipelineError {
    fn from(err: ProcessError) -> Self {
        let (code, command) = match &err {
            ProcessError::CommandNotFound(cmd) => {
                (ErrorCode::EXEC_COMMAND_NOT_FOUND, Some(cmd.clone()))
            }
            ProcessError::Timeout(_) => (ErrorCode::EXEC_TIMEOUT, None),
            ProcessError::Spawn(_) => (ErrorCode::EXEC_SPAWN_FAILED, None),
            ProcessError::Stdin(_) => (ErrorCode::EXEC_STDIN_ERROR, None),
            ProcessError::Io(_) => (ErrorCode::EXEC_OUTPUT_ERROR, None),
            ProcessError::MockExpectationNotMet(_) => (ErrorCode::EXEC_GENERIC, None),
        };

        PipelineError::execution_with_code(code, err.to_string(), command).with_source(err)
    }
}

use super::{ErrorCode, PipelineError};
use std::path::Path;

/// Extension trait for convenient error conversion
pub trait ErrorExt<T> {
    fn to_storage_error(self, message: impl Into<String>) -> Result<T, PipelineError>;
    fn to_execution_error(self, message: impl Into<String>) -> Result<T, PipelineError>;

    /// Convert to an artifact error that records which file was being read
    fn to_artifact_error(self, code: u16, path: &Path) -> Result<T, PipelineError>;
}

impl<T, E> ErrorExt<T> for Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn to_storage_error(self, message: impl Into<String>) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::storage(message).with_source(e))
    }

    fn to_execution_error(self, message: impl Into<String>) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::execution(message).with_source(e))
    }

    fn to_artifact_error(self, code: u16, path: &Path) -> Result<T, PipelineError> {
        self.map_err(|e| {
            PipelineError::artifact_with_code(
                code,
                super::describe_error_code(code),
                Some(path.to_path_buf()),
            )
            .with_source(e)
        })
    }
}

/// Storage error for a failed write, carrying the target path
pub fn write_failed(path: &Path, err: std::io::Error) -> PipelineError {
    PipelineError::storage_with_code(
        ErrorCode::STORAGE_IO_ERROR,
        format!("Failed to write {}", path.display()),
        Some(path.to_path_buf()),
    )
    .with_source(err)
}

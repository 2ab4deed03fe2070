//! Outcome bookkeeping for one dispatch run.

use super::DispatchMode;
use crate::error::{helpers::write_failed, ErrorExt, PipelineError, Result};
use crate::worker::BatchOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// A batch whose worker did not finish cleanly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub code: u16,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    pub mode: DispatchMode,
    pub num_workers: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub launched: usize,
    /// Barriers joined; zero in pool mode
    pub waves: usize,
    pub written: Vec<usize>,
    pub skipped: Vec<usize>,
    pub failed: Vec<BatchFailure>,
    /// Why dispatch stopped before the batch stream was exhausted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<String>,
}

impl DispatchReport {
    pub fn new(mode: DispatchMode, num_workers: usize) -> Self {
        Self {
            mode,
            num_workers,
            started_at: Utc::now(),
            finished_at: None,
            launched: 0,
            waves: 0,
            written: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            interrupted: None,
        }
    }

    pub fn record(&mut self, batch_index: usize, result: Result<BatchOutcome>) {
        match result {
            Ok(BatchOutcome::Written { .. }) => self.written.push(batch_index),
            Ok(BatchOutcome::Skipped) => self.skipped.push(batch_index),
            Err(err) => {
                warn!("Batch {} failed: {}", batch_index, err);
                self.failed.push(BatchFailure {
                    batch_index,
                    code: err.code(),
                    reason: err.to_string(),
                });
            }
        }
    }

    pub fn completed(&self) -> usize {
        self.written.len() + self.skipped.len() + self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Stamp the end time and order the batch lists by index
    pub fn finish(&mut self) {
        self.written.sort_unstable();
        self.skipped.sort_unstable();
        self.failed.sort_by_key(|f| f.batch_index);
        self.finished_at = Some(Utc::now());
    }

    pub fn log_summary(&self) {
        let elapsed = self
            .finished_at
            .map(|end| (end - self.started_at).num_seconds())
            .unwrap_or_default();
        info!(
            "Dispatched {} batches in {}s: {} written, {} skipped, {} failed",
            self.launched,
            elapsed,
            self.written.len(),
            self.skipped.len(),
            self.failed.len()
        );
        for failure in &self.failed {
            warn!("  batch {}: {}", failure.batch_index, failure.reason);
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| write_failed(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .to_storage_error("Failed to serialize dispatch report")?;
        fs::write(path, json).map_err(|e| write_failed(path, e))
    }

    /// Error summarizing failed batches, if any
    pub fn failure_error(&self) -> Option<PipelineError> {
        if !self.has_failures() {
            return None;
        }
        let indices: Vec<String> = self
            .failed
            .iter()
            .map(|f| f.batch_index.to_string())
            .collect();
        Some(PipelineError::execution(format!(
            "{} of {} batches failed: {}",
            self.failed.len(),
            self.launched,
            indices.join(", ")
        )))
    }
}

//! Per-batch worker: paces itself, runs the decomposition and persists the
//! resulting artifact.
//!
//! In production every worker runs in its own OS process (the hidden
//! `worker` subcommand), so each batch gets an independent memory lifetime.

pub mod memory;

use crate::artifact::{artifact_path, write_artifact};
use crate::decompose::{
    DecomposeRequest, Decomposer, DecomposerConfig, Decomposition, LadderpathSettings,
};
use crate::error::Result;
use crate::sequence::Batch;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Settings shared by every worker of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub output_folder: PathBuf,
    pub ladder_folder: PathBuf,
    #[serde(with = "humantime_serde")]
    pub pacing_delay: Duration,
    pub ladderpath: LadderpathSettings,
}

impl WorkerSettings {
    /// Save file handed to the decomposition routine for one batch
    pub fn ladder_file(&self, batch_index: usize) -> PathBuf {
        self.ladder_folder.join(format!("ladder_{}.json", batch_index))
    }
}

/// Everything an isolated worker process needs, sent as JSON on its stdin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub batch: Batch,
    pub settings: WorkerSettings,
    pub decomposer: DecomposerConfig,
}

/// What a worker did with its batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    Written { path: PathBuf },
    /// The routine judged the batch invalid; no artifact
    Skipped,
}

pub struct Worker {
    settings: WorkerSettings,
    decomposer: Arc<dyn Decomposer>,
}

impl Worker {
    pub fn new(settings: WorkerSettings, decomposer: Arc<dyn Decomposer>) -> Self {
        Self {
            settings,
            decomposer,
        }
    }

    /// Process one batch. A decomposition fault is returned unchanged.
    pub async fn process(&self, batch: &Batch) -> Result<BatchOutcome> {
        if !self.settings.pacing_delay.is_zero() {
            tokio::time::sleep(self.settings.pacing_delay).await;
        }

        info!(
            "Processing batch {}, Total length: {}, List length: {}",
            batch.index,
            batch.total_length(),
            batch.len()
        );

        let decomposition = self
            .decomposer
            .decompose(DecomposeRequest {
                batch_index: batch.index,
                units: &batch.units,
                settings: &self.settings.ladderpath,
                save_file: self.settings.ladder_file(batch.index),
            })
            .await?;

        let outcome = match decomposition {
            Decomposition::Invalid => {
                info!("Invalid input for batch {}, skipping.", batch.index);
                BatchOutcome::Skipped
            }
            Decomposition::Ladder(ladder) => {
                info!("Batch {} indices: {}", batch.index, ladder.indices);

                let path = artifact_path(&self.settings.output_folder, batch.index);
                write_artifact(&path, &ladder.pom)?;
                info!("Batch {} artifact written to {}", batch.index, path.display());
                BatchOutcome::Written { path }
            }
        };

        memory::log_memory_checkpoint(&format!("after batch {}", batch.index));
        Ok(outcome)
    }
}

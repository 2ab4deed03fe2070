//! Command implementations

use crate::aggregate::{read_totals, write_totals, Aggregator, TokenCounts, VocabularyBuilder};
use crate::config::PipelineConfig;
use crate::error::{helpers::write_failed, ErrorCode, PipelineError, Result};
use crate::orchestrator::{
    plan_batches, run_worker_request, DispatchMode, DispatchReport, Orchestrator, ProcessLauncher,
};
use crate::sequence::{batch_sequences, open_sequences, SourceFormat};
use crate::subprocess::SubprocessManager;
use crate::worker::{BatchOutcome, WorkerRequest};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::info;

/// Command-line overrides for `run`
#[derive(Debug, Default)]
pub struct RunOptions {
    pub input: PathBuf,
    pub format: Option<SourceFormat>,
    pub column: Option<String>,
    pub max_length: Option<usize>,
    pub num_workers: Option<usize>,
    pub output_folder: Option<PathBuf>,
    pub ladder_folder: Option<PathBuf>,
    pub alphabet: Option<String>,
    pub dispatch: Option<DispatchMode>,
    pub pacing_delay: Option<Duration>,
    pub worker_timeout: Option<Duration>,
    pub decomposer: Option<String>,
    pub dry_run: bool,
    pub report: Option<PathBuf>,
}

impl RunOptions {
    /// Overlay the flags that were given onto `config`
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(value) = self.max_length {
            config.max_length = value;
        }
        if let Some(value) = self.num_workers {
            config.num_workers = value;
        }
        if let Some(value) = &self.output_folder {
            config.output_folder = value.clone();
        }
        if let Some(value) = &self.ladder_folder {
            config.ladder_folder = value.clone();
        }
        if let Some(value) = &self.alphabet {
            config.alphabet = value.clone();
        }
        if let Some(value) = self.dispatch {
            config.dispatch = value;
        }
        if let Some(value) = self.pacing_delay {
            config.pacing_delay = value;
        }
        if self.worker_timeout.is_some() {
            config.worker_timeout = self.worker_timeout;
        }
        if let Some(value) = &self.decomposer {
            config.decomposer.program = value.clone();
        }
        if let Some(value) = &self.column {
            config.sequence_column = value.clone();
        }
        if self.format.is_some() {
            config.sequence_format = self.format;
        }
    }
}

/// Fragment, batch and dispatch the sequences of one source
pub async fn run_pipeline(
    options: RunOptions,
    mut config: PipelineConfig,
    verbosity: u8,
) -> Result<Option<DispatchReport>> {
    options.apply(&mut config);
    config.validate()?;

    let sequences = open_sequences(
        &options.input,
        config.sequence_format,
        &config.sequence_column,
    )?;
    let batches = batch_sequences(sequences, config.alphabet()?, config.max_length);

    if options.dry_run {
        plan_batches(batches)?;
        return Ok(None);
    }

    std::fs::create_dir_all(&config.output_folder)
        .map_err(|e| write_failed(&config.output_folder, e))?;

    let launcher = ProcessLauncher::current_exe(SubprocessManager::production())?
        .with_logging(verbosity, config.log_level.as_deref())
        .with_timeout(config.worker_timeout);
    let orchestrator = Orchestrator::new(
        Arc::new(launcher),
        config.worker_settings(),
        config.decomposer.clone(),
        config.num_workers,
    )
    .with_mode(config.dispatch);

    let (report, outcome) = orchestrator.dispatch(batches).await;
    if let Some(path) = &options.report {
        report.write(path)?;
    }
    outcome?;
    match report.failure_error() {
        Some(err) => Err(err),
        None => Ok(Some(report)),
    }
}

/// Body of the hidden `worker` subcommand: request on stdin, outcome on stdout
pub async fn run_worker() -> Result<BatchOutcome> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .map_err(|e| {
            PipelineError::execution_with_code(
                ErrorCode::EXEC_STDIN_ERROR,
                "cannot read worker request",
                None,
            )
            .with_source(e)
        })?;
    let request: WorkerRequest = serde_json::from_str(&input).map_err(|e| {
        PipelineError::execution_with_code(
            ErrorCode::EXEC_STDIN_ERROR,
            "malformed worker request",
            None,
        )
        .with_source(e)
    })?;

    let outcome = run_worker_request(request, SubprocessManager::production()).await?;
    let line = serde_json::to_string(&outcome).map_err(|e| {
        PipelineError::execution_with_code(
            ErrorCode::EXEC_OUTPUT_ERROR,
            "cannot encode worker outcome",
            None,
        )
        .with_source(e)
    })?;
    println!("{}", line);
    Ok(outcome)
}

fn artifact_sources(sources: Vec<PathBuf>, config: &PipelineConfig) -> Vec<PathBuf> {
    if sources.is_empty() {
        vec![config.output_folder.clone()]
    } else {
        sources
    }
}

/// Merge artifacts into one table written to `output`
pub fn run_merge(
    sources: Vec<PathBuf>,
    output: PathBuf,
    config: &PipelineConfig,
) -> Result<TokenCounts> {
    let aggregator = Aggregator::new(artifact_sources(sources, config));
    let (counts, summary) = aggregator.aggregate()?;
    summary.log();
    write_totals(&counts, &output)?;
    Ok(counts)
}

/// Where `vocab` takes its table from
pub enum VocabInput {
    Artifacts(Vec<PathBuf>),
    Totals(PathBuf),
}

/// Build the table (or read it back) and write the top-K vocabulary
pub fn run_vocab(
    input: VocabInput,
    totals: PathBuf,
    vocab: PathBuf,
    top_k: Option<usize>,
    config: &PipelineConfig,
) -> Result<Vec<String>> {
    let top_k = top_k.unwrap_or(config.top_k);
    if top_k == 0 {
        return Err(PipelineError::config_with_code(
            ErrorCode::CONFIG_VALIDATION_FAILED,
            "must be a positive integer",
            Some("top_k"),
        ));
    }

    let counts = match input {
        VocabInput::Artifacts(sources) => run_merge(sources, totals, config)?,
        VocabInput::Totals(path) => {
            let counts = read_totals(&path)?;
            info!("Read {} token totals from {}", counts.len(), path.display());
            counts
        }
    };

    let builder = VocabularyBuilder::new(top_k);
    let tokens = builder.build(&counts);
    builder.write(&tokens, &vocab)?;
    Ok(tokens)
}

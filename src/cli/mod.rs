//! Command-line interface: argument structures, command routing and the
//! tracing setup shared by the parent process and its workers.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};

use crate::config::PipelineConfig;
use crate::error::Result;
use commands::{RunOptions, VocabInput};

/// Default filter for a `-v` count
pub fn get_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the fmt subscriber on stderr; stdout is reserved for worker outcomes
pub fn init_tracing(verbose: u8, directive: Option<&str>) {
    let filter = directive.unwrap_or_else(|| get_log_level(verbose));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_thread_ids(verbose >= 3)
        .with_line_number(verbose >= 3)
        .try_init();
}

/// Execute a parsed command against a loaded configuration
pub async fn execute_command(
    command: Commands,
    config: PipelineConfig,
    verbose: u8,
) -> Result<()> {
    match command {
        Commands::Run {
            input,
            config: _,
            format,
            column,
            max_length,
            num_workers,
            output_folder,
            ladder_folder,
            alphabet,
            dispatch,
            pacing_delay,
            worker_timeout,
            decomposer,
            dry_run,
            report,
        } => {
            let options = RunOptions {
                input,
                format,
                column,
                max_length,
                num_workers,
                output_folder,
                ladder_folder,
                alphabet,
                dispatch,
                pacing_delay,
                worker_timeout,
                decomposer,
                dry_run,
                report,
            };
            commands::run_pipeline(options, config, verbose).await?;
            Ok(())
        }
        Commands::Worker => {
            commands::run_worker().await?;
            Ok(())
        }
        Commands::Merge {
            sources, output, ..
        } => {
            commands::run_merge(sources, output, &config)?;
            Ok(())
        }
        Commands::Vocab {
            sources,
            from_totals,
            totals,
            vocab,
            top_k,
            ..
        } => {
            let input = match from_totals {
                Some(path) => VocabInput::Totals(path),
                None => VocabInput::Artifacts(sources),
            };
            commands::run_vocab(input, totals, vocab, top_k, &config)?;
            Ok(())
        }
    }
}

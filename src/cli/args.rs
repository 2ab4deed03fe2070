//! CLI argument structures

use crate::orchestrator::DispatchMode;
use crate::sequence::SourceFormat;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Batch DNA sequences through ladderpath decomposition and build a token vocabulary
#[derive(Parser)]
#[command(name = "ladderpath-vocab")]
#[command(about = "ladderpath-vocab - batch, decompose and merge DNA sequence tokens", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Tracing filter directive, overriding -v and the configuration
    #[arg(long, value_name = "DIRECTIVE", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fragment and batch sequences, then decompose every batch in isolated workers
    #[command(name = "run")]
    Run {
        /// Sequence source (CSV with a sequence column, or one sequence per line)
        input: PathBuf,

        /// Path to a TOML configuration file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Source format (detected from the file extension by default)
        #[arg(long, value_enum)]
        format: Option<SourceFormat>,

        /// CSV column holding the sequences
        #[arg(long, value_name = "NAME")]
        column: Option<String>,

        /// Maximum summed unit length of one batch
        #[arg(short = 'l', long)]
        max_length: Option<usize>,

        /// Maximum number of workers in flight
        #[arg(short = 'j', long)]
        num_workers: Option<usize>,

        /// Folder receiving per-batch artifacts
        #[arg(short = 'o', long)]
        output_folder: Option<PathBuf>,

        /// Folder receiving the decomposition program's save files
        #[arg(long)]
        ladder_folder: Option<PathBuf>,

        /// Valid sequence symbols
        #[arg(long)]
        alphabet: Option<String>,

        /// How worker concurrency is bounded
        #[arg(long, value_enum)]
        dispatch: Option<DispatchMode>,

        /// Pause each worker takes before decomposing (e.g. "2s")
        #[arg(long, value_parser = parse_duration)]
        pacing_delay: Option<Duration>,

        /// Kill and fail workers running longer than this (e.g. "30m")
        #[arg(long, value_parser = parse_duration)]
        worker_timeout: Option<Duration>,

        /// Decomposition program to run for every batch
        #[arg(long, value_name = "PROGRAM")]
        decomposer: Option<String>,

        /// Log the planned batches without launching workers
        #[arg(long)]
        dry_run: bool,

        /// Write the dispatch report as JSON
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Process one batch request read from stdin
    #[command(name = "worker", hide = true)]
    Worker,

    /// Merge per-batch artifacts into one token multiplicity table
    #[command(name = "merge")]
    Merge {
        /// Artifact folders or files (defaults to the configured output folder)
        sources: Vec<PathBuf>,

        /// Path to a TOML configuration file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Output file for the merged table
        #[arg(short = 'o', long, default_value = "./merge_multiplicities.json")]
        output: PathBuf,
    },

    /// Merge artifacts and write the top-K vocabulary
    #[command(name = "vocab")]
    Vocab {
        /// Artifact folders or files (defaults to the configured output folder)
        #[arg(conflicts_with = "from_totals")]
        sources: Vec<PathBuf>,

        /// Path to a TOML configuration file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Rank an existing merged table instead of merging artifacts
        #[arg(long, value_name = "FILE")]
        from_totals: Option<PathBuf>,

        /// Output file for the merged table
        #[arg(long, default_value = "./token_chongshu_total.json")]
        totals: PathBuf,

        /// Output file for the vocabulary
        #[arg(long, default_value = "./vocab.txt")]
        vocab: PathBuf,

        /// Number of tokens to keep
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
}

impl Commands {
    /// Configuration file named on the command line, if any
    pub fn config_path(&self) -> Option<&Path> {
        match self {
            Commands::Run { config, .. }
            | Commands::Merge { config, .. }
            | Commands::Vocab { config, .. } => config.as_deref(),
            Commands::Worker => None,
        }
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::try_parse_from([
            "ladderpath-vocab",
            "-vv",
            "run",
            "genes.csv",
            "-j",
            "8",
            "--dispatch",
            "pool",
            "--worker-timeout",
            "90s",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run {
                input,
                num_workers,
                dispatch,
                worker_timeout,
                dry_run,
                ..
            } => {
                assert_eq!(input, PathBuf::from("genes.csv"));
                assert_eq!(num_workers, Some(8));
                assert_eq!(dispatch, Some(DispatchMode::Pool));
                assert_eq!(worker_timeout, Some(Duration::from_secs(90)));
                assert!(dry_run);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_vocab_defaults() {
        let cli = Cli::try_parse_from(["ladderpath-vocab", "vocab", "poms"]).unwrap();
        match cli.command {
            Commands::Vocab {
                sources,
                totals,
                vocab,
                top_k,
                ..
            } => {
                assert_eq!(sources, vec![PathBuf::from("poms")]);
                assert_eq!(totals, PathBuf::from("./token_chongshu_total.json"));
                assert_eq!(vocab, PathBuf::from("./vocab.txt"));
                assert_eq!(top_k, None);
            }
            _ => panic!("expected vocab"),
        }
    }

    #[test]
    fn test_worker_is_hidden_but_parses() {
        let cli = Cli::try_parse_from(["ladderpath-vocab", "worker", "--log-level", "debug"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Worker));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(cli.command.config_path().is_none());
    }
}

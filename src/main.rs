use clap::Parser;
use ladderpath_vocab::cli::{execute_command, init_tracing, Cli};
use ladderpath_vocab::config::PipelineConfig;
use ladderpath_vocab::error::PipelineError;
use tracing::{debug, error, trace};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match PipelineConfig::load(cli.command.config_path()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e.user_message());
            std::process::exit(e.exit_code());
        }
    };

    let directive = cli.log_level.as_deref().or(config.log_level.as_deref());
    init_tracing(cli.verbose, directive);

    debug!("ladderpath-vocab started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let result: anyhow::Result<()> = execute_command(cli.command, config, cli.verbose)
        .await
        .map_err(anyhow::Error::from);

    if let Err(e) = result {
        error!("Fatal error: {}", e);
        let exit_code = e
            .downcast_ref::<PipelineError>()
            .map(PipelineError::exit_code)
            .unwrap_or(1);
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

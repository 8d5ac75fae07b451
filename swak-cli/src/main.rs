use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use swak_cli::cli::{Cli, Commands};
use swak_cli::commands;
use swak_cli::error::CliError;
use swak_cli::logging;
use swak_cli::output::OutputWriter;
use swak_core::config::GeneralConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // `config validate` reports load failures itself, so logging falls back
    // to defaults when the file cannot be loaded.
    let loaded = commands::config::load(cli.config.as_deref()).await;
    let general = loaded
        .as_ref()
        .map(|c| c.general.clone())
        .unwrap_or_else(|_| GeneralConfig::default());
    let level = logging::effective_level(&general.log_level, cli.verbose, cli.log_level.as_deref());

    if let Err(e) = logging::init_tracing(&general, &level).context("failed to set up logging") {
        eprintln!("error: {e:#}");
        return ExitCode::from(2);
    }

    tracing::debug!(level = level.as_str(), "swak starting");

    match run(cli, loaded).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(
    cli: Cli,
    loaded: Result<swak_core::config::SwakConfig, swak_core::error::SwakError>,
) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Config(args) => {
            commands::config::execute(args, cli.config.as_deref(), &writer).await
        }
        Commands::List(args) => commands::list::execute(args, &loaded?, &writer),
        Commands::Desc(args) => commands::desc::execute(args, &loaded?, &writer),
        Commands::Validate(args) => commands::validate::execute(args, &loaded?, &writer),
        Commands::Test(args) => commands::test::execute(args, &loaded?, &writer).await,
    }
}

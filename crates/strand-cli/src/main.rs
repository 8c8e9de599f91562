use clap::Parser;

mod cli;
mod convert_cmd;
mod log_cmd;
mod stream_cmd;
mod util;

use cli::*;
use convert_cmd::{handle_convert_command, handle_schema_command};
use log_cmd::handle_reduce_command;
use strand_config::{Config, ConfigLoader};
use strand_util::{init_tracing, LogLevel};
use stream_cmd::handle_normalize_command;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // Stdout carries command output, so logs always go to stderr.
    let level = cli
        .log_level
        .as_deref()
        .or(config.log_level.as_deref())
        .map(LogLevel::parse);
    let _log = init_tracing(level, None, true)?;

    match cli.command {
        Commands::Convert {
            messages,
            provider,
            system,
        } => handle_convert_command(&config, &messages, provider.as_deref(), system.as_deref())?,
        Commands::Schema { tools } => handle_schema_command(&tools)?,
        Commands::Normalize {
            parts,
            provider,
            input,
        } => handle_normalize_command(&config, &parts, provider.as_deref(), input).await?,
        Commands::Reduce { events, resumed } => handle_reduce_command(&config, &events, resumed)?,
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    let cwd = std::env::current_dir()?;
    loader.load_all(&cwd)?;
    if let Some(path) = &cli.config {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        loader.load_from_file(path)?;
    }
    Ok(loader.config().clone())
}

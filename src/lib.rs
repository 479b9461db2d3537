pub mod cli;
pub mod commands;
pub mod logger;

use agent_core::config::{Config, ConfigLoadError};
use clap::Parser;
use cli::Cmd;
use dirs_next as dirs;
use std::{path::PathBuf, process::ExitCode};

fn default_config_path() -> eyre::Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("backup-agent").join("config.toml"))
        .ok_or_else(|| eyre::eyre!("failed to get default config file path"))
}

async fn load_config(args: &cli::Cli) -> eyre::Result<Config> {
    if let Some(config_string) = &args.config_string {
        return Ok(Config::parse(config_string)?);
    }
    if let Some(config_file) = &args.config_file {
        return Ok(Config::parse_file(config_file).await?);
    }

    let default_path = default_config_path()?;
    match Config::parse_file(&default_path).await {
        Err(ConfigLoadError::IoError(_, e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %default_path.display(), "no config file, using defaults");
            Ok(Config::default())
        }
        result => Ok(result?),
    }
}

pub async fn main() -> eyre::Result<ExitCode> {
    color_eyre::install()?;
    let args = cli::Cli::parse();
    logger::setup(args.log_file.as_deref(), args.verbose)?;

    if let Cmd::Version = args.subcommand {
        return commands::version();
    }

    let config = load_config(&args).await?;
    match args.subcommand {
        Cmd::Backup(args) => commands::backup::backup(&config, args).await,
        Cmd::Retry(args) => match args.subcommand {
            cli::retry::Cmd::Process => commands::retry::process(&config).await,
            cli::retry::Cmd::List => commands::retry::list(&config).await,
        },
        Cmd::Scan(args) => commands::scan::scan(&config, args).await,
        Cmd::Status => commands::status::status(&config).await,
        Cmd::Config => commands::config(&config),
        Cmd::Version => commands::version(),
    }
}

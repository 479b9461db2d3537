use agent_core::{
    clock::SystemClock,
    config::Config,
    panel::HttpPanel,
    retry_queue::RetryQueue,
    secrets::{SecretValue, Secrets},
    state::StateFile,
};
use std::{process::ExitCode, sync::Arc};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

pub mod backup;
pub mod retry;
pub mod scan;
pub mod status;

fn write_color(text: &str, fg_color: Color) -> std::io::Result<()> {
    use std::io::Write as _;

    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    stdout.set_color(ColorSpec::new().set_fg(Some(fg_color)))?;
    let result = stdout.write_all(text.as_bytes());
    stdout.reset().ok();
    result
}

/// The configured token (or `BACKUP_API_TOKEN`), falling back to the one
/// stored at registration.
async fn api_token(config: &Config) -> eyre::Result<Option<SecretValue>> {
    let secret = config.panel.token_secret();
    match Secrets.get_secret(&secret) {
        Ok(token) => return Ok(Some(token)),
        Err(error) => {
            tracing::debug!(%error, source = secret.label(), "no configured API token")
        }
    }
    let record = StateFile::new(config.state_file()).load().await?;
    Ok(record
        .and_then(|r| r.api_token)
        .map(SecretValue::new))
}

async fn panel(config: &Config) -> eyre::Result<HttpPanel> {
    let token = api_token(config).await?;
    if token.is_none() {
        tracing::warn!("no API token available, panel calls will be unauthenticated");
    }
    HttpPanel::new(&config.panel, token)
}

fn retry_queue(config: &Config) -> RetryQueue {
    RetryQueue::new(
        config.queue_file(),
        config.retry.clone(),
        Arc::new(SystemClock),
    )
}

fn instance_name(config: &Config) -> eyre::Result<String> {
    match &config.server_name {
        Some(name) => Ok(name.clone()),
        None => Ok(hostname::get()?.to_string_lossy().into_owned()),
    }
}

pub fn config(config: &Config) -> eyre::Result<ExitCode> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(ExitCode::SUCCESS)
}

pub fn version() -> eyre::Result<ExitCode> {
    if let Some(version) = agent_core::VERSION {
        println!("backup-agent: {}", version);
    } else {
        println!("backup-agent: [untagged build]")
    }
    match hostname::get() {
        Ok(host) => println!("host: {}", host.to_string_lossy()),
        Err(err) => println!("Could not determine host name ({})", err),
    }
    Ok(ExitCode::SUCCESS)
}

use super::{panel, write_color};
use agent_core::{
    config::Config,
    panel::{Panel, ServerState},
    state::StateFile,
};
use std::process::ExitCode;
use termcolor::Color;

pub async fn status(config: &Config) -> eyre::Result<ExitCode> {
    let state = StateFile::new(config.state_file());
    let mut record = match state.load().await? {
        Some(record) => record,
        None => {
            write_color(
                &format!(
                    "Server not registered (no state file at {}).\n",
                    state.path().display()
                ),
                Color::Yellow,
            )?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let panel = panel(config).await?;
    let status = match panel.check_status(&record.fingerprint).await {
        Ok(status) => status,
        Err(error) => {
            write_color(&format!("Failed to check status: {}\n", error), Color::Red)?;
            return Ok(ExitCode::FAILURE);
        }
    };
    record.apply(&status);
    state.save(&record).await?;

    match record.server_id {
        Some(id) => println!("Server ID: {}", id),
        None => println!("Server ID: <unknown>"),
    }
    println!("Status: {}", record.status);

    match record.status {
        ServerState::Pending => write_color("Awaiting admin approval.\n", Color::Yellow)?,
        ServerState::Approved if record.challenge.is_some() => write_color(
            "Server approved, the challenge has to be verified to complete setup.\n",
            Color::Green,
        )?,
        ServerState::Approved => write_color("Server approved.\n", Color::Green)?,
        ServerState::Rejected => {
            write_color("Server was rejected by admin.\n", Color::Red)?;
            return Ok(ExitCode::FAILURE);
        }
        ServerState::Verified => {
            write_color("Server is verified and ready to run backups.\n", Color::Green)?
        }
        ServerState::Unknown => {}
    }
    Ok(ExitCode::SUCCESS)
}

use super::{instance_name, panel, retry_queue, write_color};
use crate::cli;
use agent_core::{
    clock::SystemClock, config::Config, model::SiteTarget, panel::Panel, scanner::Scanner,
};
use agent_jobs::{ArtifactDirs, Capabilities, Drain, Orchestrator};
use std::{process::ExitCode, sync::Arc};
use termcolor::Color;

fn select(targets: Vec<SiteTarget>, args: &cli::backup::Cli) -> Vec<SiteTarget> {
    targets
        .into_iter()
        .filter(|t| args.site.as_ref().map_or(true, |site| &t.site.0 == site))
        .filter(|t| {
            args.database
                .as_ref()
                .map_or(true, |database| &t.database.0 == database)
        })
        .collect()
}

pub async fn backup(config: &Config, args: cli::backup::Cli) -> eyre::Result<ExitCode> {
    let scanner = Scanner::new(config.sites_paths.clone());
    let found = scanner.scan().await?;
    if found.is_empty() {
        tracing::warn!("no sites with MySQL databases found");
        return Ok(ExitCode::SUCCESS);
    }
    let targets = select(found, &args);

    if args.dry_run {
        println!("{:<40} DATABASE", "SITE");
        for target in &targets {
            println!("{:<40} {}", target.site, target.database);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let panel: Arc<dyn Panel> = Arc::new(panel(config).await?);
    if !panel.is_available().await {
        tracing::warn!("panel is not available, reports will be queued for retry");
    }
    let queue = Arc::new(retry_queue(config));
    let orchestrator = Orchestrator::new(
        panel.clone(),
        Capabilities::from_config(config),
        queue.clone(),
        ArtifactDirs::from_config(config),
        Arc::new(SystemClock),
    );
    let drain = Drain::new(panel, queue);

    tracing::info!(
        instance = %instance_name(config)?,
        sites = targets.len(),
        "starting backup run"
    );
    let result = agent_jobs::run(&orchestrator, &drain, &targets).await?;

    print!("Backup run complete: ");
    write_color(
        &format!("{} successful", result.successful),
        Color::Green,
    )?;
    print!(", ");
    let failed = format!("{} failed", result.failed);
    if result.failed > 0 {
        write_color(&failed, Color::Red)?;
    } else {
        print!("{}", failed);
    }
    println!();
    if result.queue_depth > 0 {
        write_color(
            &format!("Retry queue has {} pending items.\n", result.queue_depth),
            Color::Yellow,
        )?;
    }

    Ok(ExitCode::from(result.exit_code() as u8))
}

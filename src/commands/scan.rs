use super::write_color;
use crate::cli;
use agent_core::{config::Config, scanner::Scanner};
use std::process::ExitCode;
use termcolor::Color;

pub async fn scan(config: &Config, args: cli::scan::Cli) -> eyre::Result<ExitCode> {
    let scanner = Scanner::new(config.sites_paths.clone());

    if args.paths {
        println!("Configured scan paths:");
        for path in scanner.paths() {
            print!("  - {} (", path.display());
            if tokio::fs::metadata(path).await.map_or(false, |m| m.is_dir()) {
                write_color("exists", Color::Green)?;
            } else {
                write_color("not found", Color::Red)?;
            }
            println!(")");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let targets = scanner.scan().await?;
    if targets.is_empty() {
        write_color("No sites with MySQL databases found.\n", Color::Yellow)?;
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<30} {:<24} {:<20} PATH", "SITE", "DATABASE", "HOST");
    for target in &targets {
        println!(
            "{:<30} {:<24} {:<20} {}",
            target.site,
            target.database,
            format!("{}:{}", target.connection.host, target.connection.port),
            target.path.display()
        );
    }
    println!("Found {} site(s) with MySQL databases.", targets.len());
    Ok(ExitCode::SUCCESS)
}

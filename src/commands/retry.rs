use super::{panel, retry_queue, write_color};
use agent_core::{
    clock::{Clock, SystemClock},
    config::Config,
    panel::Panel,
    retry_queue::RetryItem,
};
use agent_jobs::Drain;
use std::{
    process::ExitCode,
    sync::Arc,
    time::{Duration, UNIX_EPOCH},
};
use termcolor::Color;

pub async fn process(config: &Config) -> eyre::Result<ExitCode> {
    let queue = Arc::new(retry_queue(config));
    if queue.ready_items().await?.is_empty() {
        println!("Retry queue has nothing due.");
        return Ok(ExitCode::SUCCESS);
    }

    let panel: Arc<dyn Panel> = Arc::new(panel(config).await?);
    let report = Drain::new(panel, queue).run().await?;

    if report.panel_unavailable {
        write_color(
            "Panel is not available. Retry will be attempted later.\n",
            Color::Yellow,
        )?;
    }
    println!(
        "Processed: {} successful, {} failed",
        report.delivered, report.failed
    );
    if report.evicted > 0 {
        write_color(
            &format!("Gave up on {} item(s) after too many attempts.\n", report.evicted),
            Color::Red,
        )?;
    }
    if report.remaining > 0 {
        println!("Remaining in queue: {}", report.remaining);
    }

    if report.failed > 0 || report.panel_unavailable {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn describe_due(item: &RetryItem, now: i64) -> String {
    match u64::try_from(item.next_attempt_at.saturating_sub(now)) {
        Ok(wait) if wait > 0 => format!(
            "in {}",
            humantime::format_duration(Duration::from_secs(wait))
        ),
        _ => "due".to_owned(),
    }
}

/// Timestamps before the epoch are shown as the epoch.
fn format_timestamp(ts: i64) -> String {
    let time = UNIX_EPOCH + Duration::from_secs(u64::try_from(ts).unwrap_or_default());
    humantime::format_rfc3339_seconds(time).to_string()
}

pub async fn list(config: &Config) -> eyre::Result<ExitCode> {
    let queue = retry_queue(config);
    let items = queue.items().await?;
    if items.is_empty() {
        println!("Retry queue is empty.");
        return Ok(ExitCode::SUCCESS);
    }

    let now = SystemClock.now();
    for item in &items {
        println!("{} {} {}", item.id, item.method, item.endpoint);
        println!(
            "    attempts: {}/{}, queued: {}, next attempt: {}",
            item.attempts,
            queue.max_attempts(),
            format_timestamp(item.created_at),
            describe_due(item, now)
        );
    }
    println!("{} item(s) queued", items.len());
    Ok(ExitCode::SUCCESS)
}

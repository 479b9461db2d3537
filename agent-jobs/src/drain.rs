use agent_core::{
    panel::Panel,
    retry_queue::{Disposition, QueueError, RetryQueue},
};
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
    pub evicted: usize,
    /// Items still persisted after the drain.
    pub remaining: usize,
    /// The drain stopped early because the panel stopped answering.
    pub panel_unavailable: bool,
}

/// Replays queued panel calls that are due.
#[derive(Debug)]
pub struct Drain {
    panel: Arc<dyn Panel>,
    queue: Arc<RetryQueue>,
}

impl Drain {
    pub fn new(panel: Arc<dyn Panel>, queue: Arc<RetryQueue>) -> Self {
        Drain { panel, queue }
    }

    #[tracing::instrument(name = "drain", skip_all)]
    pub async fn run(&self) -> Result<DrainReport, QueueError> {
        let mut report = DrainReport::default();
        let ready = self.queue.ready_items().await?;
        if !ready.is_empty() {
            tracing::info!(items = ready.len(), "processing retry queue");
        }

        for item in ready {
            if !self.panel.is_available().await {
                tracing::warn!("panel is not available, leaving remaining items queued");
                report.panel_unavailable = true;
                break;
            }

            match self.panel.replay(&item).await {
                Ok(()) => {
                    tracing::debug!(id = %item.id, endpoint = %item.endpoint, "delivered queued call");
                    self.queue.mark_success(item.id).await?;
                    report.delivered += 1;
                }
                Err(error) => {
                    tracing::warn!(id = %item.id, endpoint = %item.endpoint, %error, "queued call failed again");
                    report.failed += 1;
                    match self.queue.mark_failed(item.id).await? {
                        Disposition::Evicted { attempts } => {
                            tracing::warn!(
                                id = %item.id,
                                endpoint = %item.endpoint,
                                attempts,
                                "giving up on queued call"
                            );
                            report.evicted += 1;
                        }
                        Disposition::Rescheduled { next_attempt_at, .. } => {
                            tracing::debug!(id = %item.id, next_attempt_at, "rescheduled queued call")
                        }
                        Disposition::NotFound => {}
                    }
                }
            }
        }

        report.remaining = self.queue.count().await?;
        Ok(report)
    }
}

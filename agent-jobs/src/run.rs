use crate::{
    drain::{Drain, DrainReport},
    orchestrator::{Orchestrator, Outcome},
};
use agent_core::{model::SiteTarget, retry_queue::QueueError};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub successful: usize,
    pub failed: usize,
    pub queue_depth: usize,
    pub drain: DrainReport,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Backs up every target in order, then drains whatever the retry queue has due.
///
/// A failed site never stops the run. A retry queue I/O error does: panel
/// calls could no longer be kept, so it ends the run and is returned.
#[tracing::instrument(name = "run", skip_all, fields(sites = targets.len()))]
pub async fn run(
    orchestrator: &Orchestrator,
    drain: &Drain,
    targets: &[SiteTarget],
) -> Result<RunResult, QueueError> {
    let mut result = RunResult::default();
    for target in targets {
        match orchestrator.run_one(target).await? {
            Outcome::Success => result.successful += 1,
            Outcome::Failed(_) => result.failed += 1,
        }
    }

    result.drain = drain.run().await?;
    result.queue_depth = result.drain.remaining;
    tracing::info!(
        successful = result.successful,
        failed = result.failed,
        "backup run complete"
    );
    if result.queue_depth > 0 {
        tracing::warn!(items = result.queue_depth, "retry queue has pending items");
    }
    Ok(result)
}

pub mod drain;
pub mod orchestrator;
pub mod run;

#[cfg(test)]
mod testing;

pub use drain::{Drain, DrainReport};
pub use orchestrator::{ArtifactDirs, BackupJob, Capabilities, JobError, Orchestrator, Outcome};
pub use run::{run, RunResult};

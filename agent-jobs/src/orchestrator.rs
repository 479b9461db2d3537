use agent_core::{
    clock::Clock,
    config::Config,
    dump::{Dumper, MysqlDumper},
    encrypt::{Encryptor, OpensslEncryptor},
    keys::EncryptionKey,
    model::{DatabaseName, SiteTarget},
    panel::{BackupId, Completion, Panel, Request},
    retry_queue::{QueueError, RetryQueue},
    upload::{ProgressSink, RsyncUploader, Uploader},
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use time::{macros::format_description, OffsetDateTime};

/// Errors that end a backup job. Panel errors never do.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("database dump failed")]
    Dump(#[source] eyre::Report),
    #[error("encryption failed")]
    Encrypt(#[source] eyre::Report),
    #[error("failed to read encrypted artifact {}", .0.display())]
    Artifact(PathBuf, #[source] std::io::Error),
    #[error("upload failed")]
    Upload(#[source] eyre::Report),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// The external programs a job runs.
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub dumper: Arc<dyn Dumper>,
    pub encryptor: Arc<dyn Encryptor>,
    pub uploader: Arc<dyn Uploader>,
}

impl Capabilities {
    pub fn from_config(config: &Config) -> Self {
        Capabilities {
            dumper: Arc::new(MysqlDumper::new(&config.tools, &config.timeouts)),
            encryptor: Arc::new(OpensslEncryptor::new(&config.tools, &config.timeouts)),
            uploader: Arc::new(RsyncUploader::new(
                &config.tools,
                &config.upload,
                &config.timeouts,
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDirs {
    pub dumps: PathBuf,
    pub encrypted: PathBuf,
}

impl ArtifactDirs {
    pub fn from_config(config: &Config) -> Self {
        ArtifactDirs {
            dumps: config.dumps_dir(),
            encrypted: config.encrypted_dir(),
        }
    }
}

/// Where one backup's artifacts live, locally and remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupJob {
    pub name: String,
    pub dump_path: PathBuf,
    pub encrypted_path: PathBuf,
    pub remote_path: String,
}

impl BackupJob {
    pub fn new(database: &DatabaseName, dirs: &ArtifactDirs, timestamp: i64) -> Self {
        let time = OffsetDateTime::from_unix_timestamp(timestamp)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let stamp = time
            .format(format_description!(
                "[year]-[month]-[day]_[hour]-[minute]-[second]"
            ))
            .unwrap_or_else(|_| timestamp.to_string());
        let name = format!("{}_{}", database, stamp);
        BackupJob {
            dump_path: dirs.dumps.join(format!("{}.sql", name)),
            encrypted_path: dirs.encrypted.join(format!("{}.sql.enc", name)),
            remote_path: format!("{}/{}.sql.enc", database, name),
            name,
        }
    }

    pub fn filename(&self) -> String {
        format!("{}.sql.enc", self.name)
    }
}

/// Renders an error with its whole source chain on one line.
fn describe(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Runs the per-site backup workflow.
///
/// Panel calls are made when the panel answers its health probe; any call that
/// cannot be made or fails is handed to the retry queue instead, so the panel
/// never decides whether a backup happens. A call that can neither be made nor
/// queued is an error of the whole run.
#[derive(Debug)]
pub struct Orchestrator {
    panel: Arc<dyn Panel>,
    capabilities: Capabilities,
    queue: Arc<RetryQueue>,
    dirs: ArtifactDirs,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        panel: Arc<dyn Panel>,
        capabilities: Capabilities,
        queue: Arc<RetryQueue>,
        dirs: ArtifactDirs,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Orchestrator {
            panel,
            capabilities,
            queue,
            dirs,
            clock,
        }
    }

    #[tracing::instrument(name = "job", skip_all, fields(site = %target.site, database = %target.database))]
    pub async fn run_one(&self, target: &SiteTarget) -> Result<Outcome, QueueError> {
        let job = BackupJob::new(&target.database, &self.dirs, self.clock.now());
        let key = EncryptionKey::generate();
        let backup_id = self.start(&target.database, &key).await?;

        let mut progress = PanelProgress {
            orchestrator: self,
            backup_id,
            queue_error: None,
        };
        let result = self.execute(target, &job, &key, &mut progress).await;
        self.cleanup(&job).await;
        if let Some(error) = progress.queue_error {
            return Err(error);
        }

        match result {
            Ok(completion) => {
                if let Some(id) = backup_id {
                    self.deliver(Request::complete_backup(id, &completion))
                        .await?;
                }
                tracing::info!("backup finished successfully");
                Ok(Outcome::Success)
            }
            Err(error) => {
                let reason = describe(&error);
                tracing::error!(error = %reason, "backup failed");
                if let Some(id) = backup_id {
                    self.deliver(Request::fail_backup(id, &reason)).await?;
                }
                Ok(Outcome::Failed(reason))
            }
        }
    }

    async fn start(
        &self,
        database: &DatabaseName,
        key: &EncryptionKey,
    ) -> Result<Option<BackupId>, QueueError> {
        if self.panel.is_available().await {
            match self.panel.start_backup(database, key).await {
                Ok(id) => {
                    tracing::info!(backup_id = %id, "backup registered with panel");
                    return Ok(Some(id));
                }
                Err(error) => {
                    tracing::warn!(error = %describe(&error), "failed to register backup with panel")
                }
            }
        } else {
            tracing::warn!("panel is not available, backup start will be retried later");
        }
        self.enqueue(Request::start_backup(database, key)).await?;
        Ok(None)
    }

    async fn execute(
        &self,
        target: &SiteTarget,
        job: &BackupJob,
        key: &EncryptionKey,
        progress: &mut PanelProgress<'_>,
    ) -> Result<Completion, JobError> {
        let dump = self
            .capabilities
            .dumper
            .dump(&target.connection, &job.dump_path)
            .await
            .map_err(JobError::Dump)?;
        tracing::info!(tables = dump.table_count, "database dumped");

        let encrypted = self
            .capabilities
            .encryptor
            .encrypt(&dump.path, &job.encrypted_path, key)
            .await
            .map_err(JobError::Encrypt)?;

        let size = tokio::fs::metadata(&encrypted.path)
            .await
            .map_err(|e| JobError::Artifact(encrypted.path.clone(), e))?
            .len();
        tracing::info!(
            size = %humansize::format_size(size, humansize::DECIMAL),
            "backup encrypted"
        );

        self.capabilities
            .uploader
            .upload(&encrypted.path, &job.remote_path, progress)
            .await
            .map_err(JobError::Upload)?;

        Ok(Completion {
            filename: job.filename(),
            size,
            table_count: dump.table_count,
            checksum: encrypted.checksum,
        })
    }

    /// Sends a report now if the panel is there, queues it otherwise.
    async fn deliver(&self, request: Request) -> Result<(), QueueError> {
        if self.panel.is_available().await {
            match self.panel.send(&request).await {
                Ok(_) => return Ok(()),
                Err(error) => tracing::warn!(
                    endpoint = %request.endpoint,
                    error = %describe(&error),
                    "panel call failed, queueing for retry"
                ),
            }
        }
        self.enqueue(request).await
    }

    async fn enqueue(&self, request: Request) -> Result<(), QueueError> {
        let Request {
            endpoint,
            method,
            payload,
        } = request;
        match self.queue.add(endpoint.clone(), method, payload).await {
            Ok(id) => {
                tracing::debug!(%id, %endpoint, "queued panel call");
                Ok(())
            }
            Err(error) => {
                tracing::error!(%endpoint, error = %describe(&error), "failed to queue panel call");
                Err(error)
            }
        }
    }

    async fn cleanup(&self, job: &BackupJob) {
        for path in [&job.dump_path, &job.encrypted_path] {
            remove_artifact(path).await;
        }
    }
}

async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed local artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to remove local artifact")
        }
    }
}

struct PanelProgress<'a> {
    orchestrator: &'a Orchestrator,
    backup_id: Option<BackupId>,
    // first progress report that could not be queued
    queue_error: Option<QueueError>,
}

#[async_trait::async_trait]
impl<'a> ProgressSink for PanelProgress<'a> {
    async fn progress(&mut self, percent: u8) {
        tracing::debug!(percent, "upload progress");
        if let Some(id) = self.backup_id {
            let orchestrator = self.orchestrator;
            if orchestrator.panel.is_available().await {
                let request = Request::update_progress(id, percent);
                if let Err(error) = orchestrator.panel.send(&request).await {
                    tracing::warn!(error = %describe(&error), "failed to report progress");
                    if let Err(error) = orchestrator.enqueue(request).await {
                        self.queue_error.get_or_insert(error);
                    }
                }
            }
        }
    }
}

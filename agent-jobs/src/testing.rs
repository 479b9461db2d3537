use crate::orchestrator::{ArtifactDirs, Capabilities, Orchestrator};
use agent_core::{
    clock::ManualClock,
    config::Retry,
    dump::{DumpResult, Dumper},
    encrypt::{sha256_file, EncryptResult, Encryptor},
    keys::EncryptionKey,
    model::{Connection, DatabaseName, SiteName, SiteTarget},
    panel::{Panel, PanelError, Request},
    retry_queue::RetryQueue,
    upload::{ProgressSink, Uploader},
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

pub(crate) fn target(database: &str) -> SiteTarget {
    SiteTarget {
        site: SiteName(format!("{}.test", database)),
        path: PathBuf::from(format!("/home/forge/{}.test", database)),
        database: DatabaseName(database.to_owned()),
        connection: Connection {
            driver: "mysql".to_owned(),
            host: "127.0.0.1".to_owned(),
            port: 3306,
            database: DatabaseName(database.to_owned()),
            username: "forge".to_owned(),
            password: "secret".to_owned(),
        },
    }
}

#[derive(Default)]
struct Hook(Mutex<Option<Box<dyn Fn() + Send + Sync>>>);

impl Hook {
    fn set(&self, f: impl Fn() + Send + Sync + 'static) {
        *self.0.lock() = Some(Box::new(f));
    }

    fn call(&self) {
        if let Some(f) = &*self.0.lock() {
            f();
        }
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Hook")
    }
}

#[derive(Debug)]
pub(crate) struct FakePanel {
    reachable: AtomicBool,
    rejected: Mutex<Vec<String>>,
    sent: Mutex<Vec<Request>>,
    next_id: AtomicU64,
}

impl Default for FakePanel {
    fn default() -> Self {
        FakePanel {
            reachable: AtomicBool::new(true),
            rejected: Default::default(),
            sent: Default::default(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl FakePanel {
    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub(crate) fn reject(&self, endpoint: &str) {
        self.rejected.lock().push(endpoint.to_owned());
    }

    pub(crate) fn sent(&self) -> Vec<Request> {
        self.sent.lock().clone()
    }

    pub(crate) fn endpoints(&self) -> Vec<String> {
        self.sent().into_iter().map(|r| r.endpoint).collect()
    }

    pub(crate) fn sent_to(&self, endpoint: &str) -> Vec<Request> {
        self.sent()
            .into_iter()
            .filter(|r| r.endpoint == endpoint)
            .collect()
    }

    pub(crate) fn progress_values(&self, backup_id: u64) -> Vec<u64> {
        self.sent_to(&format!("/backups/{}/progress", backup_id))
            .iter()
            .filter_map(|r| r.payload.get("progress").and_then(Value::as_u64))
            .collect()
    }
}

#[async_trait::async_trait]
impl Panel for FakePanel {
    async fn is_available(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn send(&self, request: &Request) -> Result<Value, PanelError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(PanelError::Unreachable(eyre::eyre!("connection refused")));
        }
        self.sent.lock().push(request.clone());
        if self.rejected.lock().contains(&request.endpoint) {
            return Err(PanelError::Rejected {
                status: 422,
                message: "rejected".to_owned(),
            });
        }
        if request.endpoint == "/backups/start" {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            return Ok(json!({ "backup_id": id }));
        }
        Ok(Value::Null)
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeDumper {
    fail: AtomicBool,
    calls: AtomicUsize,
    finished: Hook,
}

impl FakeDumper {
    pub(crate) fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn on_finish(&self, f: impl Fn() + Send + Sync + 'static) {
        self.finished.set(f);
    }
}

#[async_trait::async_trait]
impl Dumper for FakeDumper {
    async fn dump(&self, connection: &Connection, output: &Path) -> eyre::Result<DumpResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            eyre::bail!("mysqldump exited with error status 2");
        }
        tokio::fs::create_dir_all(output.parent().unwrap()).await?;
        tokio::fs::write(output, format!("-- dump of {}\n", connection.database)).await?;
        self.finished.call();
        Ok(DumpResult {
            path: output.to_owned(),
            table_count: 7,
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeEncryptor {
    fail: AtomicBool,
    calls: AtomicUsize,
    keys: Mutex<Vec<String>>,
    checksum: Mutex<String>,
}

impl FakeEncryptor {
    pub(crate) fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.keys.lock().clone()
    }

    pub(crate) fn checksum(&self) -> String {
        self.checksum.lock().clone()
    }
}

#[async_trait::async_trait]
impl Encryptor for FakeEncryptor {
    async fn encrypt(
        &self,
        input: &Path,
        output: &Path,
        key: &EncryptionKey,
    ) -> eyre::Result<EncryptResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().push(key.expose().to_owned());
        if self.fail.load(Ordering::SeqCst) {
            eyre::bail!("openssl exited with error status 1");
        }
        let mut data = tokio::fs::read(input).await?;
        data.reverse();
        tokio::fs::create_dir_all(output.parent().unwrap()).await?;
        tokio::fs::write(output, data).await?;
        let checksum = sha256_file(output).await?;
        *self.checksum.lock() = checksum.clone();
        Ok(EncryptResult {
            path: output.to_owned(),
            checksum,
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeUploader {
    fail: AtomicBool,
    remotes: Mutex<Vec<String>>,
    finished: Hook,
}

impl FakeUploader {
    pub(crate) fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.remotes.lock().len()
    }

    pub(crate) fn remotes(&self) -> Vec<String> {
        self.remotes.lock().clone()
    }

    pub(crate) fn on_finish(&self, f: impl Fn() + Send + Sync + 'static) {
        self.finished.set(f);
    }
}

#[async_trait::async_trait]
impl Uploader for FakeUploader {
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: &mut dyn ProgressSink,
    ) -> eyre::Result<()> {
        self.remotes.lock().push(remote.to_owned());
        eyre::ensure!(local.exists(), "{} does not exist", local.display());
        progress.progress(30).await;
        if self.fail.load(Ordering::SeqCst) {
            eyre::bail!("rsync exited with error status 12");
        }
        progress.progress(60).await;
        progress.progress(100).await;
        self.finished.call();
        Ok(())
    }
}

/// An orchestrator wired to fakes, storing everything below a temporary directory.
pub(crate) struct Harness {
    pub dir: tempfile::TempDir,
    pub clock: ManualClock,
    pub panel: Arc<FakePanel>,
    pub dumper: Arc<FakeDumper>,
    pub encryptor: Arc<FakeEncryptor>,
    pub uploader: Arc<FakeUploader>,
    pub queue: Arc<RetryQueue>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub(crate) fn new(now: i64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(now);
        let panel = Arc::new(FakePanel::default());
        let dumper = Arc::new(FakeDumper::default());
        let encryptor = Arc::new(FakeEncryptor::default());
        let uploader = Arc::new(FakeUploader::default());
        let queue = Arc::new(RetryQueue::new(
            dir.path().join("retry-queue.json"),
            Retry::default(),
            Arc::new(clock.clone()),
        ));
        let orchestrator = Orchestrator::new(
            panel.clone(),
            Capabilities {
                dumper: dumper.clone(),
                encryptor: encryptor.clone(),
                uploader: uploader.clone(),
            },
            queue.clone(),
            ArtifactDirs {
                dumps: dir.path().join("dumps"),
                encrypted: dir.path().join("encrypted"),
            },
            Arc::new(clock.clone()),
        );
        Harness {
            dir,
            clock,
            panel,
            dumper,
            encryptor,
            uploader,
            queue,
            orchestrator,
        }
    }

    pub(crate) fn artifacts_removed(&self) -> bool {
        ["dumps", "encrypted"].iter().all(|d| {
            match std::fs::read_dir(self.dir.path().join(d)) {
                Ok(mut entries) => entries.next().is_none(),
                Err(_) => true,
            }
        })
    }
}

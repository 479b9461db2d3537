use crate::{
    config,
    process::{self, ExitStatus, Tool},
};
use eyre::{eyre, WrapErr};
use std::{fmt::Debug, path::Path, process::Stdio, time::Duration};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

/// Receives transfer progress as a percentage.
#[async_trait::async_trait]
pub trait ProgressSink: Send {
    async fn progress(&mut self, percent: u8);
}

/// Transfers an artifact off the host.
///
/// Progress is reported zero or more times while the transfer runs. A successful
/// transfer always ends with exactly one report of 100.
#[async_trait::async_trait]
pub trait Uploader: Debug + Send + Sync {
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: &mut dyn ProgressSink,
    ) -> eyre::Result<()>;
}

#[derive(Debug)]
pub struct RsyncUploader {
    rsync: Tool,
    destination: Option<String>,
    timeout: Duration,
}

impl RsyncUploader {
    pub fn new(
        tools: &config::tools::Tools,
        upload: &config::tools::Upload,
        timeouts: &config::tools::Timeouts,
    ) -> Self {
        RsyncUploader {
            rsync: Tool::new("rsync", &tools.rsync),
            destination: upload.destination.clone(),
            timeout: timeouts.upload,
        }
    }

    fn target(destination: &str, remote: &str) -> String {
        format!("{}/{}", destination.trim_end_matches('/'), remote)
    }
}

#[async_trait::async_trait]
impl Uploader for RsyncUploader {
    #[tracing::instrument(level = "debug", skip_all, fields(remote = remote))]
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        progress: &mut dyn ProgressSink,
    ) -> eyre::Result<()> {
        let destination = self
            .destination
            .as_deref()
            .ok_or_else(|| eyre!("no upload destination configured"))?;

        let mut cmd = self.rsync.command();
        cmd.arg("-az")
            .arg("--progress")
            .arg(local)
            .arg(Self::target(destination, remote))
            .stdout(Stdio::piped());
        let mut child = cmd
            .spawn()
            .map_err(|e| process::Error::FailedToStart(self.rsync.name(), e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| eyre!("rsync stdout was not captured"))?;
        let stderr = child.stderr.take();
        let name = self.rsync.name();

        let transfer = async {
            let read_progress = async {
                let mut reader = BufReader::new(stdout);
                let mut segment = Vec::new();
                let mut last = None;
                loop {
                    segment.clear();
                    // rsync redraws its progress line with carriage returns
                    if reader.read_until(b'\r', &mut segment).await? == 0 {
                        break;
                    }
                    if let Some(percent) = parse_progress(&segment) {
                        if last != Some(percent) {
                            last = Some(percent);
                            progress.progress(percent).await;
                        }
                    }
                }
                Ok::<_, std::io::Error>(last)
            };
            let read_stderr = async {
                let mut output = Vec::new();
                if let Some(mut stderr) = stderr {
                    if let Err(error) = stderr.read_to_end(&mut output).await {
                        tracing::debug!(%error, "failed to read rsync stderr");
                    }
                }
                String::from_utf8_lossy(&output).into_owned()
            };
            let (progress_result, stderr_output) = tokio::join!(read_progress, read_stderr);
            let last = progress_result.map_err(|e| process::Error::SubprocessIoError(name, e))?;
            let status = child
                .wait()
                .await
                .map_err(|e| process::Error::SubprocessStatusError(name, e))?;
            Ok::<_, process::Error>((ExitStatus::from(status), stderr_output, last))
        };

        let (status, stderr_output, last) = tokio::time::timeout(self.timeout, transfer)
            .await
            .map_err(|_| process::Error::TimedOut {
                name,
                timeout: self.timeout,
            })??;
        if !status.success() {
            return Err(process::Error::Failed {
                name,
                status,
                stderr: stderr_output,
            })
            .wrap_err("upload failed");
        }

        if last != Some(100) {
            progress.progress(100).await;
        }
        Ok(())
    }
}

/// Last `NN%` token in a chunk of rsync output.
fn parse_progress(output: &[u8]) -> Option<u8> {
    let mut found = None;
    for (i, _) in output.iter().enumerate().filter(|(_, b)| **b == b'%') {
        let digits = output[..i]
            .iter()
            .rev()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits == 0 {
            continue;
        }
        let value = std::str::from_utf8(&output[i - digits..i])
            .ok()
            .and_then(|s| s.parse::<u32>().ok());
        if let Some(value) = value.filter(|v| *v <= 100) {
            found = Some(value as u8);
        }
    }
    found
}

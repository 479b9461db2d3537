use std::{path::PathBuf, process::Stdio, time::Duration};
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to start {0} process")]
    FailedToStart(&'static str, #[source] std::io::Error),
    #[error("error waiting for {0} process")]
    SubprocessStatusError(&'static str, #[source] std::io::Error),
    #[error("error reading from {0} output")]
    SubprocessIoError(&'static str, #[source] std::io::Error),
    #[error("{name} did not finish within {timeout:?}")]
    TimedOut {
        name: &'static str,
        timeout: Duration,
    },
    #[error("{}{}", .status.message(.name), stderr_suffix(.stderr))]
    Failed {
        name: &'static str,
        status: ExitStatus,
        stderr: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum ExitStatus {
    Successful,
    Failed(Option<i32>),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        self == &ExitStatus::Successful
    }

    pub fn message(&self, name: &str) -> String {
        match self {
            ExitStatus::Successful => format!("{} exited successfully", name),
            ExitStatus::Failed(Some(code)) => format!("{} exited with error status {}", name, code),
            ExitStatus::Failed(None) => format!("{} exited with unknown error status", name),
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        if status.success() {
            ExitStatus::Successful
        } else {
            ExitStatus::Failed(status.code())
        }
    }
}

/// An external program the agent shells out to.
#[derive(Debug, Clone)]
pub struct Tool {
    name: &'static str,
    path: PathBuf,
}

impl Tool {
    pub fn new(name: &'static str, path: impl Into<PathBuf>) -> Self {
        Tool {
            name,
            path: path.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // the child must not outlive a timed out or dropped call
            .kill_on_drop(true);
        cmd
    }

    /// Runs `cmd` to completion, collecting its output. Fails on a non-zero exit status.
    pub async fn run(&self, mut cmd: Command, timeout: Duration) -> Result<Output, Error> {
        let child = cmd
            .spawn()
            .map_err(|e| Error::FailedToStart(self.name, e))?;
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| Error::SubprocessStatusError(self.name, e))?,
            Err(_) => {
                return Err(Error::TimedOut {
                    name: self.name,
                    timeout,
                })
            }
        };
        let status = ExitStatus::from(output.status);
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !status.success() {
            return Err(Error::Failed {
                name: self.name,
                status,
                stderr,
            });
        }
        Ok(Output {
            stdout: output.stdout,
            stderr,
        })
    }
}

#[derive(Debug)]
pub struct Output {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

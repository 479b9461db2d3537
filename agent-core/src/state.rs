use crate::panel::{ServerState, ServerStatus};
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What the agent knows about its own registration with the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub server_id: Option<u64>,
    pub fingerprint: String,
    pub status: ServerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
}

impl ServerRecord {
    /// Folds a status response into the record. Fields the panel omitted are kept.
    pub fn apply(&mut self, status: &ServerStatus) {
        self.status = status.status;
        if let Some(token) = &status.api_token {
            self.api_token = Some(token.clone());
        }
        if status.challenge.is_some() {
            self.challenge = status.challenge.clone();
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateFile(PathBuf);

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StateFile(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// `None` if the agent was never registered on this host.
    pub async fn load(&self) -> eyre::Result<Option<ServerRecord>> {
        let contents = match tokio::fs::read(&self.0).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .wrap_err_with(|| format!("failed to read state file '{}'", self.0.display()))
            }
        };
        let record = serde_json::from_slice(&contents)
            .wrap_err_with(|| format!("state file '{}' is not valid", self.0.display()))?;
        Ok(Some(record))
    }

    pub async fn save(&self, record: &ServerRecord) -> eyre::Result<()> {
        if let Some(dir) = self.0.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.0.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(record)?)
            .await
            .wrap_err_with(|| format!("failed to write state file '{}'", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.0)
            .await
            .wrap_err_with(|| format!("failed to write state file '{}'", self.0.display()))?;
        Ok(())
    }
}

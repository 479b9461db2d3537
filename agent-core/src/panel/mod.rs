use crate::{
    keys::EncryptionKey,
    model::DatabaseName,
    retry_queue::{Method, Payload, RetryItem},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Debug;

mod http;

pub use http::HttpPanel;

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("panel is unreachable")]
    Unreachable(#[source] eyre::Report),
    #[error("panel rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("panel sent an invalid response")]
    InvalidResponse(#[source] serde_json::Error),
}

#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupId(pub u64);

impl std::fmt::Display for BackupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub filename: String,
    pub size: u64,
    pub table_count: u64,
    pub checksum: String,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Pending,
    Approved,
    Rejected,
    Verified,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ServerState::Pending => "pending",
            ServerState::Approved => "approved",
            ServerState::Rejected => "rejected",
            ServerState::Verified => "verified",
            ServerState::Unknown => "unknown",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Registration {
    pub server_id: u64,
    pub fingerprint: String,
    pub status: ServerState,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerStatus {
    pub status: ServerState,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub challenge: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Verification {
    pub api_token: String,
}

/// One call against the panel API, relative to the API root.
///
/// The same value is sent directly and, if that fails, stored in the retry
/// queue, so a replayed call is byte-for-byte the original.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub endpoint: String,
    pub method: Method,
    pub payload: Payload,
}

fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

impl Request {
    fn post(endpoint: impl Into<String>, payload: Value) -> Self {
        Request {
            endpoint: endpoint.into(),
            method: Method::Post,
            payload: object(payload),
        }
    }

    pub fn register(name: &str, public_key: &str, ip_address: Option<&str>) -> Self {
        Self::post(
            "/servers/register",
            json!({"name": name, "public_key": public_key, "ip_address": ip_address}),
        )
    }

    pub fn check_status(fingerprint: &str) -> Self {
        Request {
            endpoint: "/servers/status".to_owned(),
            method: Method::Get,
            payload: object(json!({ "fingerprint": fingerprint })),
        }
    }

    pub fn verify(fingerprint: &str, signed_challenge: &str) -> Self {
        Self::post(
            "/servers/verify",
            json!({"fingerprint": fingerprint, "signed_challenge": signed_challenge}),
        )
    }

    pub fn start_backup(database: &DatabaseName, key: &EncryptionKey) -> Self {
        Self::post(
            "/backups/start",
            json!({"database_name": database.0, "encryption_key": key.expose()}),
        )
    }

    pub fn update_progress(id: BackupId, progress: u8) -> Self {
        Self::post(
            format!("/backups/{}/progress", id),
            json!({ "progress": progress }),
        )
    }

    pub fn complete_backup(id: BackupId, completion: &Completion) -> Self {
        Self::post(
            format!("/backups/{}/complete", id),
            serde_json::to_value(completion).unwrap_or_default(),
        )
    }

    pub fn fail_backup(id: BackupId, error_message: &str) -> Self {
        Self::post(
            format!("/backups/{}/failed", id),
            json!({ "error_message": error_message }),
        )
    }
}

impl From<&RetryItem> for Request {
    fn from(item: &RetryItem) -> Self {
        Request {
            endpoint: item.endpoint.clone(),
            method: item.method,
            payload: item.payload.clone(),
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, PanelError> {
    serde_json::from_value(value).map_err(PanelError::InvalidResponse)
}

/// The remote control plane. Implementations never retry on their own.
#[async_trait::async_trait]
pub trait Panel: Debug + Send + Sync {
    /// Short-timeout health probe; any failure counts as unavailable.
    async fn is_available(&self) -> bool;

    async fn send(&self, request: &Request) -> Result<Value, PanelError>;

    async fn register(
        &self,
        name: &str,
        public_key: &str,
        ip_address: Option<&str>,
    ) -> Result<Registration, PanelError> {
        decode(
            self.send(&Request::register(name, public_key, ip_address))
                .await?,
        )
    }

    async fn check_status(&self, fingerprint: &str) -> Result<ServerStatus, PanelError> {
        decode(self.send(&Request::check_status(fingerprint)).await?)
    }

    async fn verify(
        &self,
        fingerprint: &str,
        signed_challenge: &str,
    ) -> Result<Verification, PanelError> {
        decode(
            self.send(&Request::verify(fingerprint, signed_challenge))
                .await?,
        )
    }

    async fn start_backup(
        &self,
        database: &DatabaseName,
        key: &EncryptionKey,
    ) -> Result<BackupId, PanelError> {
        #[derive(Deserialize)]
        struct Started {
            backup_id: BackupId,
        }

        let started: Started = decode(self.send(&Request::start_backup(database, key)).await?)?;
        Ok(started.backup_id)
    }

    async fn update_progress(&self, id: BackupId, progress: u8) -> Result<(), PanelError> {
        self.send(&Request::update_progress(id, progress)).await?;
        Ok(())
    }

    async fn complete_backup(&self, id: BackupId, completion: &Completion) -> Result<(), PanelError> {
        self.send(&Request::complete_backup(id, completion)).await?;
        Ok(())
    }

    async fn fail_backup(&self, id: BackupId, error_message: &str) -> Result<(), PanelError> {
        self.send(&Request::fail_backup(id, error_message)).await?;
        Ok(())
    }

    /// Sends a queued call unchanged.
    async fn replay(&self, item: &RetryItem) -> Result<(), PanelError> {
        self.send(&Request::from(item)).await?;
        Ok(())
    }
}

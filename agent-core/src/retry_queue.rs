//! Durable queue of panel calls that failed and have to be delivered later.
//!
//! The whole queue lives in a single JSON file which is loaded fresh and
//! rewritten wholesale on every operation, so the file is the only source of
//! truth. Writes go to a temporary file that is renamed over the queue file,
//! which means a crash loses at most the mutation in flight. Items are
//! addressed by a stable [`Id`], so removing one item never changes how any
//! other item is addressed.
//!
//! Access is serialised within one process; across processes a single writer
//! per host is assumed.

use crate::{clock::Clock, config::Retry};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::Mutex;

#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(uuid::Uuid);

impl Default for Id {
    fn default() -> Self {
        Id(uuid::Uuid::new_v4())
    }
}

impl Id {
    pub fn new() -> Self {
        Default::default()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

pub type Payload = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryItem {
    pub id: Id,
    pub endpoint: String,
    pub method: Method,
    #[serde(default)]
    pub payload: Payload,
    pub attempts: u32,
    pub next_attempt_at: i64,
    pub created_at: i64,
}

/// On-disk form; files written by older agents carry no ids.
#[derive(Deserialize)]
struct StoredItem {
    #[serde(default)]
    id: Option<Id>,
    endpoint: String,
    method: Method,
    #[serde(default)]
    payload: Payload,
    attempts: u32,
    next_attempt_at: i64,
    created_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("failed to read retry queue {}", .0.display())]
    Read(PathBuf, #[source] std::io::Error),
    #[error("retry queue {} is not valid", .0.display())]
    Corrupt(PathBuf, #[source] serde_json::Error),
    #[error("failed to write retry queue {}", .0.display())]
    Write(PathBuf, #[source] std::io::Error),
}

/// What [`RetryQueue::mark_failed`] did with an item.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Disposition {
    Rescheduled { attempts: u32, next_attempt_at: i64 },
    Evicted { attempts: u32 },
    NotFound,
}

#[derive(Debug)]
pub struct RetryQueue {
    path: PathBuf,
    policy: Retry,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl RetryQueue {
    pub fn new(path: impl Into<PathBuf>, policy: Retry, clock: Arc<dyn Clock>) -> Self {
        RetryQueue {
            path: path.into(),
            policy,
            clock,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    pub async fn add(
        &self,
        endpoint: impl Into<String>,
        method: Method,
        payload: Payload,
    ) -> Result<Id, QueueError> {
        let _guard = self.lock.lock().await;
        let mut queue = self.load().await?;
        let now = self.clock.now();
        let id = Id::new();
        queue.push(RetryItem {
            id,
            endpoint: endpoint.into(),
            method,
            payload,
            attempts: 0,
            next_attempt_at: now,
            created_at: now,
        });
        self.save(&queue).await?;
        Ok(id)
    }

    /// Items whose backoff has elapsed, in queue order.
    pub async fn ready_items(&self) -> Result<Vec<RetryItem>, QueueError> {
        let _guard = self.lock.lock().await;
        let now = self.clock.now();
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|item| item.next_attempt_at <= now && item.attempts < self.policy.max_attempts)
            .collect())
    }

    pub async fn items(&self) -> Result<Vec<RetryItem>, QueueError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Removes the item; returns whether it was still queued.
    pub async fn mark_success(&self, id: Id) -> Result<bool, QueueError> {
        let _guard = self.lock.lock().await;
        let mut queue = self.load().await?;
        let Some(position) = queue.iter().position(|item| item.id == id) else {
            return Ok(false);
        };
        queue.remove(position);
        self.save(&queue).await?;
        Ok(true)
    }

    pub async fn mark_failed(&self, id: Id) -> Result<Disposition, QueueError> {
        let _guard = self.lock.lock().await;
        let mut queue = self.load().await?;
        let Some(position) = queue.iter().position(|item| item.id == id) else {
            return Ok(Disposition::NotFound);
        };

        let item = &mut queue[position];
        item.attempts += 1;
        let attempts = item.attempts;
        let disposition = if attempts >= self.policy.max_attempts {
            queue.remove(position);
            Disposition::Evicted { attempts }
        } else {
            item.next_attempt_at = self
                .clock
                .now()
                .saturating_add(backoff_secs(self.policy.base_delay, attempts));
            Disposition::Rescheduled {
                attempts,
                next_attempt_at: item.next_attempt_at,
            }
        };

        self.save(&queue).await?;
        Ok(disposition)
    }

    pub async fn count(&self) -> Result<usize, QueueError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.len())
    }

    async fn load(&self) -> Result<Vec<RetryItem>, QueueError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(QueueError::Read(self.path.clone(), e)),
        };
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let stored: Vec<StoredItem> = serde_json::from_slice(&content)
            .map_err(|e| QueueError::Corrupt(self.path.clone(), e))?;

        let missing_ids = stored.iter().any(|item| item.id.is_none());
        let queue = stored
            .into_iter()
            .map(|item| RetryItem {
                id: item.id.unwrap_or_default(),
                endpoint: item.endpoint,
                method: item.method,
                payload: item.payload,
                attempts: item.attempts,
                next_attempt_at: item.next_attempt_at,
                created_at: item.created_at,
            })
            .collect::<Vec<_>>();
        if missing_ids {
            // ids have to be stable between a read and the following mark_*
            self.save(&queue).await?;
        }
        Ok(queue)
    }

    async fn save(&self, queue: &[RetryItem]) -> Result<(), QueueError> {
        let write_err = |e| QueueError::Write(self.path.clone(), e);

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(write_err)?;
        }
        let content = serde_json::to_vec_pretty(queue)
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(write_err)?;
        Ok(())
    }
}

/// `base_delay * 2^attempts` in whole seconds, saturating.
pub fn backoff_secs(base_delay: Duration, attempts: u32) -> i64 {
    let factor = 2u64.checked_pow(attempts).unwrap_or(u64::MAX);
    let secs = base_delay.as_secs().saturating_mul(factor);
    i64::try_from(secs).unwrap_or(i64::MAX)
}

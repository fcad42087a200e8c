use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::error::AppResult;
use crate::models::DataType;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Last payload announced for a data type
    Snapshot(DataType),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Snapshot(data_type) => write!(f, "folio:snapshot:{}", data_type),
        }
    }
}

/// Creates a Redis client for caching
///
/// Only parses the URL; connections are opened lazily per operation.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Cache handler for storing and retrieving data from Redis
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

/// Writes handled by the writer task over its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterSummary {
    pub written: usize,
    pub failed: usize,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<WriterSummary>,
}

impl CacheWriterHandle {
    const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

    /// Asks the writer task to flush pending writes and waits for it to stop
    ///
    /// Returns `None` when the writer did not finish within the flush timeout.
    pub async fn shutdown(self) -> Option<WriterSummary> {
        let Self { shutdown_tx, task } = self;
        if shutdown_tx.send(()).await.is_err() {
            tracing::warn!("Cache writer already stopped");
        }

        match tokio::time::timeout(Self::FLUSH_TIMEOUT, task).await {
            Ok(Ok(summary)) => {
                tracing::info!(written = summary.written, failed = summary.failed, "Cache writer flushed");
                Some(summary)
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Cache writer task failed");
                None
            }
            Err(_) => {
                tracing::warn!(timeout_secs = Self::FLUSH_TIMEOUT.as_secs(), "Cache writer flush timed out");
                None
            }
        }
    }
}

impl Cache {
    /// Creates a new Cache instance with a background writer task
    ///
    /// Writes go through a channel so mirroring a snapshot never delays the
    /// broadcast that follows it.
    pub async fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        let task = tokio::spawn(Self::cache_writer_task(client, write_rx, shutdown_rx));

        let cache = Self {
            redis_client,
            write_tx,
        };

        (cache, CacheWriterHandle { shutdown_tx, task })
    }

    async fn cache_writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> WriterSummary {
        tracing::info!("Cache writer task started");
        let mut summary = WriterSummary::default();

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    Self::record_write(&client, msg, &mut summary).await;
                }
                _ = shutdown_rx.recv() => {
                    // Senders live on in cloned Cache handles, so drain what is queued now
                    // instead of waiting for the channel to close.
                    let mut flushed = 0usize;
                    while let Ok(msg) = write_rx.try_recv() {
                        flushed += 1;
                        Self::record_write(&client, msg, &mut summary).await;
                    }

                    tracing::info!(flushed, failed_writes = summary.failed, "Cache writer task stopped");
                    break;
                }
            }
        }

        summary
    }

    async fn record_write(client: &Client, msg: CacheWriteMessage, summary: &mut WriterSummary) {
        match Self::write_to_redis(client, msg).await {
            Ok(()) => summary.written += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::error!(error = %e, failed_writes = summary.failed, "Failed to write to Redis cache");
            }
        }
    }

    async fn write_to_redis(client: &Client, msg: CacheWriteMessage) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
        Ok(())
    }

    /// Retrieves a value from the cache by key, `None` on a miss
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key.to_string()).await?;

        match cached {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Queues a write for the background task and returns immediately
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, key = %key, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SnapshotEntry;
    use chrono::Utc;
    use serde_json::json;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    #[test]
    fn test_cache_key_display_snapshot() {
        let key = CacheKey::Snapshot(DataType::Analytics);
        assert_eq!(key.to_string(), "folio:snapshot:analytics");
    }

    #[test]
    fn test_cache_keys_are_distinct_per_data_type() {
        let keys: std::collections::HashSet<String> = DataType::ALL
            .into_iter()
            .map(|data_type| CacheKey::Snapshot(data_type).to_string())
            .collect();
        assert_eq!(keys.len(), DataType::ALL.len());
    }

    #[test]
    fn test_create_redis_client_rejects_bad_url() {
        assert!(create_redis_client("not a url").is_err());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_queued_writes() {
        // nothing listens on port 1, so every write fails fast
        let client = create_redis_client("redis://127.0.0.1:1").unwrap();
        let (cache, handle) = Cache::new(client).await;

        let entry = SnapshotEntry {
            payload: json!({ "total": 1 }),
            computed_at: Utc::now(),
        };
        cache.set_in_background(&CacheKey::Snapshot(DataType::Posts), &entry, 60);
        cache.set_in_background(&CacheKey::Snapshot(DataType::Media), &entry, 60);

        let summary = handle.shutdown().await.unwrap();
        assert_eq!(summary.written + summary.failed, 2);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_snapshot_written_in_background() {
        let client = create_redis_client(&redis_url()).unwrap();
        let (cache, _handle) = Cache::new(client.clone()).await;

        let key = CacheKey::Snapshot(DataType::Media);
        let entry = SnapshotEntry {
            payload: json!({ "total": 3 }),
            computed_at: Utc::now(),
        };

        cache.set_in_background(&key, &entry, 60);
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let retrieved: Option<SnapshotEntry> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, Some(entry));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_cache_writer_flushes_on_shutdown() {
        let client = create_redis_client(&redis_url()).unwrap();
        let (cache, handle) = Cache::new(client.clone()).await;

        let key = CacheKey::Snapshot(DataType::Comments);
        let entry = SnapshotEntry {
            payload: json!({ "pending": 1 }),
            computed_at: Utc::now(),
        };

        cache.set_in_background(&key, &entry, 60);
        let summary = handle.shutdown().await.unwrap();
        assert_eq!(summary, WriterSummary { written: 1, failed: 0 });

        let retrieved: Option<SnapshotEntry> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, Some(entry));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }
}

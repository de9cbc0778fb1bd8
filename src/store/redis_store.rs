//! Redis-backed session store.
//!
//! Layout per session, all sharing one TTL that is refreshed together in a
//! single `MULTI` block on every access:
//!
//! - `codebridge:session:{sid}`       JSON session metadata
//! - `codebridge:files:{sid}`         hash of file id -> JSON file metadata
//! - `codebridge:file:{sid}:{fid}`    base64 payload
//!
//! Expiry is native, so `cleanup` has nothing to do and data survives a
//! process restart.

use super::{generate_id, FileInfo, FileStore, StoreError, StoreStats, StoredFile};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

const KEY_PREFIX: &str = "codebridge";

fn session_key(session_id: &str) -> String {
    format!("{KEY_PREFIX}:session:{session_id}")
}

fn files_key(session_id: &str) -> String {
    format!("{KEY_PREFIX}:files:{session_id}")
}

fn file_key(session_id: &str, file_id: &str) -> String {
    format!("{KEY_PREFIX}:file:{session_id}:{file_id}")
}

/// Inverse of [`session_key`]. Ids may themselves contain `:`.
fn session_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(KEY_PREFIX)?.strip_prefix(":session:")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionMeta {
    id: String,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
}

impl SessionMeta {
    fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            created_at: now,
            last_accessed: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMeta {
    id: String,
    name: String,
    size: u64,
    created_at: DateTime<Utc>,
}

impl From<FileMeta> for FileInfo {
    fn from(meta: FileMeta) -> Self {
        Self {
            id: meta.id,
            name: meta.name,
            size: meta.size,
            last_modified: meta.created_at,
        }
    }
}

pub struct RedisStore {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisStore {
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(ttl_secs = ttl.as_secs(), "Connected to Redis session store");
        Ok(Self { conn, ttl })
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }

    async fn load_meta(&self, session_id: &str) -> Result<Option<SessionMeta>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(session_key(session_id)).await?;
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Queue the touch-on-access commands: rewrite the metadata with a fresh
    /// access time and push every key of the session to the same expiry.
    fn queue_touch(
        &self,
        pipe: &mut redis::Pipeline,
        mut meta: SessionMeta,
        file_ids: &[String],
    ) -> Result<(), StoreError> {
        let ttl = self.ttl_secs();
        meta.last_accessed = Utc::now();
        pipe.set_ex(session_key(&meta.id), serde_json::to_string(&meta)?, ttl)
            .ignore()
            .expire(files_key(&meta.id), ttl as i64)
            .ignore();
        for file_id in file_ids {
            pipe.expire(file_key(&meta.id, file_id), ttl as i64).ignore();
        }
        Ok(())
    }

    async fn touch(&self, meta: SessionMeta) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let file_ids: Vec<String> = conn.hkeys(files_key(&meta.id)).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        self.queue_touch(&mut pipe, meta, &file_ids)?;
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl FileStore for RedisStore {
    async fn create_session(&self) -> Result<String, StoreError> {
        let mut conn = self.conn.clone();
        loop {
            let id = generate_id();
            let meta = serde_json::to_string(&SessionMeta::new(&id))?;
            let created: Option<String> = redis::cmd("SET")
                .arg(session_key(&id))
                .arg(meta)
                .arg("NX")
                .arg("EX")
                .arg(self.ttl_secs())
                .query_async(&mut conn)
                .await?;
            if created.is_some() {
                debug!(session_id = %id, "Created session");
                return Ok(id);
            }
        }
    }

    async fn is_session_valid(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(session_key(session_id)).await?;
        Ok(exists)
    }

    async fn add_file(
        &self,
        session_id: &str,
        name: &str,
        content: Vec<u8>,
    ) -> Result<String, StoreError> {
        let mut conn = self.conn.clone();
        let meta = match self.load_meta(session_id).await? {
            Some(meta) => meta,
            None => {
                debug!(session_id, "Adopting session id on write");
                SessionMeta::new(session_id)
            }
        };

        let file_id = generate_id();
        let file_meta = FileMeta {
            id: file_id.clone(),
            name: name.to_string(),
            size: content.len() as u64,
            created_at: Utc::now(),
        };

        let existing: Vec<String> = conn.hkeys(files_key(session_id)).await?;

        // The write and the refresh land together or not at all.
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(
                file_key(session_id, &file_id),
                STANDARD.encode(&content),
                self.ttl_secs(),
            )
            .ignore()
            .hset(files_key(session_id), &file_id, serde_json::to_string(&file_meta)?)
            .ignore();
        self.queue_touch(&mut pipe, meta, &existing)?;
        let _: () = pipe.query_async(&mut conn).await?;

        debug!(session_id, file_id = %file_id, name, size = file_meta.size, "Stored file");
        Ok(file_id)
    }

    async fn get_file(
        &self,
        session_id: &str,
        file_id: &str,
    ) -> Result<Option<StoredFile>, StoreError> {
        let Some(meta) = self.load_meta(session_id).await? else {
            return Ok(None);
        };
        let mut conn = self.conn.clone();

        let raw_meta: Option<String> = conn.hget(files_key(session_id), file_id).await?;
        let Some(raw_meta) = raw_meta else {
            return Ok(None);
        };
        let payload: Option<String> = conn.get(file_key(session_id, file_id)).await?;
        let Some(payload) = payload else {
            return Ok(None);
        };

        let file_meta: FileMeta = serde_json::from_str(&raw_meta)?;
        let content = STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| StoreError::CorruptPayload {
                file_id: file_id.to_string(),
                reason: e.to_string(),
            })?;

        self.touch(meta).await?;
        Ok(Some(StoredFile {
            id: file_meta.id,
            name: file_meta.name,
            size: file_meta.size,
            content,
            created_at: file_meta.created_at,
        }))
    }

    async fn list_files(&self, session_id: &str) -> Result<Vec<FileInfo>, StoreError> {
        let Some(meta) = self.load_meta(session_id).await? else {
            return Ok(Vec::new());
        };
        let mut conn = self.conn.clone();

        let entries: HashMap<String, String> = conn.hgetall(files_key(session_id)).await?;
        let files = entries
            .values()
            .map(|json| serde_json::from_str::<FileMeta>(json).map(FileInfo::from))
            .collect::<Result<Vec<_>, _>>()?;

        self.touch(meta).await?;
        Ok(files)
    }

    async fn cleanup(&self) -> Result<usize, StoreError> {
        // Keys carry their own expiry.
        Ok(0)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut conn = self.conn.clone();

        let mut session_ids = Vec::new();
        {
            let pattern = session_key("*");
            let mut keys: redis::AsyncIter<String> = conn.scan_match(pattern).await?;
            while let Some(key) = keys.next_item().await {
                if let Some(id) = session_id_from_key(&key) {
                    session_ids.push(id.to_string());
                }
            }
        }

        let mut stats = StoreStats {
            session_count: session_ids.len(),
            ..StoreStats::default()
        };
        for session_id in &session_ids {
            let values: Vec<String> = conn.hvals(files_key(session_id)).await?;
            for json in values {
                // Entries can vanish mid-scan; unreadable ones are skipped.
                if let Ok(meta) = serde_json::from_str::<FileMeta>(&json) {
                    stats.total_files += 1;
                    stats.total_size += meta.size;
                }
            }
        }
        Ok(stats)
    }

    async fn destroy(&self) {
        // Data stays in Redis and keeps honouring its TTL; the connection
        // closes when the store is dropped.
        info!("Redis store released");
    }
}

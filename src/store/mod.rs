//! Session/file storage.
//!
//! A session is a TTL-scoped bag of immutable files. Two interchangeable
//! backends implement [`FileStore`]: an in-process map swept on an interval
//! and a Redis store that relies on native key expiry. Callers hold an
//! `Arc<dyn FileStore>` and never know which one they got.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Length of generated session and file ids.
pub const ID_LENGTH: usize = 21;

/// Generate a fixed-length id over `A-Za-z0-9_-`. Never contains `/`.
pub fn generate_id() -> String {
    nanoid::nanoid!(ID_LENGTH)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt payload for file {file_id}: {reason}")]
    CorruptPayload { file_id: String, reason: String },
}

/// A stored file with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub content: Vec<u8>,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Listing entry for a file, without the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl From<&StoredFile> for FileInfo {
    fn from(file: &StoredFile) -> Self {
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            size: file.size,
            last_modified: file.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub session_count: usize,
    pub total_files: usize,
    pub total_size: u64,
}

/// Capability surface shared by every storage backend.
///
/// Any read or write that succeeds against a live session refreshes its
/// TTL. An expired session behaves exactly like a missing one.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Allocate a fresh, unused session id with an empty file set.
    async fn create_session(&self) -> Result<String, StoreError>;

    /// Whether the session exists and is within its TTL. Does not refresh it.
    async fn is_session_valid(&self, session_id: &str) -> Result<bool, StoreError>;

    /// Store a file under `session_id`, creating the session under that very
    /// id if it does not exist (or has expired). Returns the new file id.
    async fn add_file(
        &self,
        session_id: &str,
        name: &str,
        content: Vec<u8>,
    ) -> Result<String, StoreError>;

    async fn get_file(
        &self,
        session_id: &str,
        file_id: &str,
    ) -> Result<Option<StoredFile>, StoreError>;

    /// Files of a live session; empty for unknown or expired sessions.
    async fn list_files(&self, session_id: &str) -> Result<Vec<FileInfo>, StoreError>;

    /// Drop expired sessions. Returns how many were removed.
    async fn cleanup(&self) -> Result<usize, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Release background resources. Called once during shutdown.
    async fn destroy(&self);
}

//! In-process session store.
//!
//! Sessions live in a shared map and are lost on restart. Expiry is checked
//! lazily on every access and enforced eagerly by a background sweep, since
//! an idle session nobody reads again would otherwise never be evicted.

use super::{generate_id, FileInfo, FileStore, StoreError, StoreStats, StoredFile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tracing::{debug, info};

/// Monotonic nanoseconds since the store was created.
#[derive(Clone, Copy)]
struct Clock {
    epoch: Instant,
}

impl Clock {
    fn now(&self) -> u64 {
        Instant::now().saturating_duration_since(self.epoch).as_nanos() as u64
    }
}

#[derive(Debug)]
struct Session {
    created_at: DateTime<Utc>,
    // Atomic so that reads can refresh it under the shared lock.
    last_accessed: AtomicU64,
    files: HashMap<String, Arc<StoredFile>>,
}

impl Session {
    fn new(now: u64) -> Self {
        Self {
            created_at: Utc::now(),
            last_accessed: AtomicU64::new(now),
            files: HashMap::new(),
        }
    }

    fn is_live(&self, now: u64, ttl: Duration) -> bool {
        u128::from(now.saturating_sub(self.last_accessed.load(Ordering::Acquire))) < ttl.as_nanos()
    }

    fn touch(&self, now: u64) {
        self.last_accessed.fetch_max(now, Ordering::AcqRel);
    }
}

type Sessions = Arc<RwLock<HashMap<String, Session>>>;

async fn sweep(sessions: &Sessions, clock: Clock, ttl: Duration) -> usize {
    let mut sessions = sessions.write().await;
    let now = clock.now();
    let before = sessions.len();
    sessions.retain(|id, s| {
        let live = s.is_live(now, ttl);
        if !live {
            debug!(
                session_id = %id,
                created_at = %s.created_at,
                files = s.files.len(),
                "Evicting expired session"
            );
        }
        live
    });
    before - sessions.len()
}

pub struct MemoryStore {
    sessions: Sessions,
    clock: Clock,
    ttl: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    /// Create the store and start its background sweep. Must be called from
    /// within a Tokio runtime.
    pub fn new(ttl: Duration, cleanup_interval: Duration) -> Self {
        let sessions: Sessions = Arc::new(RwLock::new(HashMap::new()));
        let clock = Clock {
            epoch: Instant::now(),
        };

        let sweeper = tokio::spawn({
            let sessions = sessions.clone();
            async move {
                let mut ticker = interval(cleanup_interval);
                loop {
                    ticker.tick().await;
                    let removed = sweep(&sessions, clock, ttl).await;
                    if removed > 0 {
                        info!(removed, "Swept expired sessions");
                    }
                }
            }
        });

        Self {
            sessions,
            clock,
            ttl,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn create_session(&self) -> Result<String, StoreError> {
        let mut sessions = self.sessions.write().await;
        let mut id = generate_id();
        while sessions.contains_key(&id) {
            id = generate_id();
        }
        sessions.insert(id.clone(), Session::new(self.clock.now()));
        debug!(session_id = %id, "Created session");
        Ok(id)
    }

    async fn is_session_valid(&self, session_id: &str) -> Result<bool, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .is_some_and(|s| s.is_live(self.clock.now(), self.ttl)))
    }

    async fn add_file(
        &self,
        session_id: &str,
        name: &str,
        content: Vec<u8>,
    ) -> Result<String, StoreError> {
        let mut sessions = self.sessions.write().await;
        let now = self.clock.now();

        // Unknown or expired ids are adopted rather than rejected.
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(now));
        if !session.is_live(now, self.ttl) {
            debug!(session_id, "Adopting expired session id on write");
            *session = Session::new(now);
        }
        session.touch(now);

        let mut file_id = generate_id();
        while session.files.contains_key(&file_id) {
            file_id = generate_id();
        }
        let file = StoredFile {
            id: file_id.clone(),
            name: name.to_string(),
            size: content.len() as u64,
            content,
            created_at: Utc::now(),
        };
        debug!(session_id, file_id = %file_id, name, size = file.size, "Stored file");
        session.files.insert(file_id.clone(), Arc::new(file));
        Ok(file_id)
    }

    async fn get_file(
        &self,
        session_id: &str,
        file_id: &str,
    ) -> Result<Option<StoredFile>, StoreError> {
        let file = {
            let sessions = self.sessions.read().await;
            let now = self.clock.now();
            let Some(session) = sessions.get(session_id).filter(|s| s.is_live(now, self.ttl))
            else {
                return Ok(None);
            };
            // A miss leaves the TTL alone.
            let Some(file) = session.files.get(file_id).cloned() else {
                return Ok(None);
            };
            session.touch(now);
            file
        };
        // Payload is copied after the lock is released.
        Ok(Some(StoredFile::clone(&file)))
    }

    async fn list_files(&self, session_id: &str) -> Result<Vec<FileInfo>, StoreError> {
        let sessions = self.sessions.read().await;
        let now = self.clock.now();
        let Some(session) = sessions.get(session_id).filter(|s| s.is_live(now, self.ttl)) else {
            return Ok(Vec::new());
        };
        session.touch(now);
        Ok(session
            .files
            .values()
            .map(|f| FileInfo::from(f.as_ref()))
            .collect())
    }

    async fn cleanup(&self) -> Result<usize, StoreError> {
        Ok(sweep(&self.sessions, self.clock, self.ttl).await)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let sessions = self.sessions.read().await;
        let now = self.clock.now();
        let mut stats = StoreStats::default();
        for session in sessions.values().filter(|s| s.is_live(now, self.ttl)) {
            stats.session_count += 1;
            stats.total_files += session.files.len();
            stats.total_size += session.files.values().map(|f| f.size).sum::<u64>();
        }
        Ok(stats)
    }

    async fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
        let dropped = {
            let mut sessions = self.sessions.write().await;
            let count = sessions.len();
            sessions.clear();
            count
        };
        info!(dropped, "In-memory store destroyed");
    }
}

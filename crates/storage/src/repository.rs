use async_trait::async_trait;
use course_core::model::{CourseId, ModuleIndex, ModuleKind, ProgressRecord, UserId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Composite key for one progress record: `(user, course, module)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgressKey {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub module_index: ModuleIndex,
}

impl ProgressKey {
    #[must_use]
    pub fn new(user_id: UserId, course_id: CourseId, module_index: ModuleIndex) -> Self {
        Self {
            user_id,
            course_id,
            module_index,
        }
    }

    /// The opaque composite string form used by key-value backends.
    #[must_use]
    pub fn composite(&self) -> String {
        format!(
            "progress:{}:{}:{}",
            self.user_id, self.course_id, self.module_index
        )
    }
}

impl fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.composite())
    }
}

/// One progress submission bound for the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressWrite {
    pub key: ProgressKey,
    pub kind: ModuleKind,
    pub record: ProgressRecord,
}

//
// ─── LOCAL CACHE ───────────────────────────────────────────────────────────────
//

/// Synchronous local progress cache.
///
/// This is the resume-on-reload safety net: reads and writes must be cheap
/// and never touch the network. Implementations persist at most to local
/// disk.
pub trait ProgressCache: Send + Sync {
    /// Fetch the cached record for a key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read. A missing
    /// entry is `Ok(None)`, not an error.
    fn get(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>, StorageError>;

    /// Insert or overwrite the cached record for a key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    fn set(&self, key: &ProgressKey, record: &ProgressRecord) -> Result<(), StorageError>;

    /// Subscribe to change notifications, if this backend emits them.
    ///
    /// Replaces ambient "storage changed elsewhere" listeners: a reconciler
    /// that cares about concurrent writers (another tab, another player)
    /// subscribes here explicitly. Backends without a notion of concurrent
    /// writers return `None`.
    fn changes(&self) -> Option<broadcast::Receiver<ProgressKey>> {
        None
    }
}

/// Simple in-memory cache implementation for testing and prototyping.
#[derive(Clone)]
pub struct InMemoryProgressCache {
    entries: Arc<Mutex<HashMap<String, ProgressRecord>>>,
    changes: broadcast::Sender<ProgressKey>,
}

impl InMemoryProgressCache {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            changes,
        }
    }
}

impl Default for InMemoryProgressCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCache for InMemoryProgressCache {
    fn get(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&key.composite()).cloned())
    }

    fn set(&self, key: &ProgressKey, record: &ProgressRecord) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.composite(), record.clone());
        drop(guard);
        // nobody listening is fine
        let _ = self.changes.send(key.clone());
        Ok(())
    }

    fn changes(&self) -> Option<broadcast::Receiver<ProgressKey>> {
        Some(self.changes.subscribe())
    }
}

//
// ─── REMOTE STORE ──────────────────────────────────────────────────────────────
//

/// Asynchronous remote progress store: the durable, cross-device source of
/// truth. All calls go over the network in real deployments; nothing on
/// the playback path may await these directly.
#[async_trait]
pub trait RemoteProgressStore: Send + Sync {
    /// Fetch every record the store has for `(user, course)`.
    ///
    /// Modules without a record are simply absent (they imply 0%).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be reached.
    async fn fetch_all(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<(ModuleIndex, ProgressRecord)>, StorageError>;

    /// Fetch the record for a single module, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be reached.
    async fn fetch_one(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>, StorageError>;

    /// Upsert one progress record.
    ///
    /// The store applies writes last-write-wins per field; the ratchet
    /// lives entirely in the client-side merge.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write cannot be applied.
    async fn submit(&self, write: &ProgressWrite) -> Result<(), StorageError>;
}

/// In-memory remote store for testing and prototyping.
///
/// Mirrors the production backend's upsert semantics (overwrite per field,
/// no server-side max) and keeps a log of every submission in arrival
/// order so tests can assert on write cadence and ordering.
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    records: Arc<Mutex<HashMap<String, ProgressRecord>>>,
    submitted: Arc<Mutex<Vec<ProgressWrite>>>,
}

impl InMemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the submission log.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned; test-support only.
    pub fn seed(&self, key: &ProgressKey, record: ProgressRecord) {
        self.records
            .lock()
            .expect("remote store lock poisoned")
            .insert(key.composite(), record);
    }

    /// Every submission received, in arrival order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned; test-support only.
    #[must_use]
    pub fn submissions(&self) -> Vec<ProgressWrite> {
        self.submitted
            .lock()
            .expect("remote store lock poisoned")
            .clone()
    }
}

#[async_trait]
impl RemoteProgressStore for InMemoryRemoteStore {
    async fn fetch_all(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<(ModuleIndex, ProgressRecord)>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let prefix = format!("progress:{user_id}:{course_id}:");
        let mut out: Vec<(ModuleIndex, ProgressRecord)> = guard
            .iter()
            .filter_map(|(composite, record)| {
                let index = composite.strip_prefix(&prefix)?;
                let index = index.parse::<ModuleIndex>().ok()?;
                Some((index, record.clone()))
            })
            .collect();
        out.sort_by_key(|(index, _)| *index);
        Ok(out)
    }

    async fn fetch_one(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&key.composite()).cloned())
    }

    async fn submit(&self, write: &ProgressWrite) -> Result<(), StorageError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        records.insert(write.key.composite(), write.record.clone());
        drop(records);
        self.submitted
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .push(write.clone());
        Ok(())
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::time::fixed_now;

    fn key(index: u32) -> ProgressKey {
        ProgressKey::new(
            UserId::new("u1"),
            CourseId::new("c1"),
            ModuleIndex::new(index),
        )
    }

    fn record(percent: i64) -> ProgressRecord {
        ProgressRecord::from_persisted(percent, 0.0, 0.0, fixed_now())
    }

    #[test]
    fn cache_round_trips_records() {
        let cache = InMemoryProgressCache::new();
        assert!(cache.get(&key(0)).unwrap().is_none());

        cache.set(&key(0), &record(40)).unwrap();
        assert_eq!(cache.get(&key(0)).unwrap().unwrap().percent(), 40);

        cache.set(&key(0), &record(70)).unwrap();
        assert_eq!(cache.get(&key(0)).unwrap().unwrap().percent(), 70);
    }

    #[test]
    fn cache_emits_change_notifications() {
        let cache = InMemoryProgressCache::new();
        let mut rx = cache.changes().expect("in-memory cache notifies");

        cache.set(&key(2), &record(10)).unwrap();
        let changed = rx.try_recv().unwrap();
        assert_eq!(changed, key(2));
    }

    #[tokio::test]
    async fn remote_store_overwrites_and_logs_submissions() {
        let store = InMemoryRemoteStore::new();
        let write = |percent| ProgressWrite {
            key: key(1),
            kind: ModuleKind::Video,
            record: record(percent),
        };

        store.submit(&write(50)).await.unwrap();
        store.submit(&write(20)).await.unwrap(); // last write wins, no max

        let fetched = store.fetch_one(&key(1)).await.unwrap().unwrap();
        assert_eq!(fetched.percent(), 20);

        let log = store.submissions();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].record.percent(), 50);
        assert_eq!(log[1].record.percent(), 20);
    }

    #[tokio::test]
    async fn remote_store_lists_only_matching_course() {
        let store = InMemoryRemoteStore::new();
        store.seed(&key(0), record(90));
        store.seed(
            &ProgressKey::new(
                UserId::new("u1"),
                CourseId::new("other"),
                ModuleIndex::new(0),
            ),
            record(10),
        );

        let all = store
            .fetch_all(&UserId::new("u1"), &CourseId::new("c1"))
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, ModuleIndex::new(0));
        assert_eq!(all[0].1.percent(), 90);
    }
}

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use storage::repository::{ProgressWrite, RemoteProgressStore};

/// Orders remote progress writes behind a single drain task.
///
/// Enqueuing never blocks and is never awaited by the playback path, but
/// because one task drains the channel, writes for a module reach the
/// store in the order they were issued. A failed submission is logged and
/// dropped; the next write carries a fresher record and heals the gap.
pub struct RemoteWriteQueue {
    tx: Option<mpsc::UnboundedSender<ProgressWrite>>,
    worker: Option<JoinHandle<()>>,
}

impl RemoteWriteQueue {
    /// Spawn the drain task on the current runtime.
    #[must_use]
    pub fn spawn(store: Arc<dyn RemoteProgressStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressWrite>();
        let worker = tokio::spawn(async move {
            while let Some(write) = rx.recv().await {
                match store.submit(&write).await {
                    Ok(()) => debug!(
                        key = %write.key,
                        percent = write.record.percent(),
                        "progress submitted"
                    ),
                    Err(err) => warn!(
                        error = %err,
                        key = %write.key,
                        "remote progress write dropped"
                    ),
                }
            }
        });
        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Enqueue a write. Never blocks, never fails the caller.
    pub fn enqueue(&self, write: ProgressWrite) {
        if let Some(tx) = &self.tx {
            if tx.send(write).is_err() {
                warn!("remote write queue is closed; write dropped");
            }
        }
    }

    /// Stop accepting writes and wait for everything queued to drain.
    pub async fn close(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                warn!(error = %err, "remote write worker ended abnormally");
            }
        }
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{CourseId, ModuleIndex, ModuleKind, ProgressRecord, UserId};
    use course_core::time::fixed_now;
    use storage::repository::{InMemoryRemoteStore, ProgressKey};

    fn write(percent: i64) -> ProgressWrite {
        ProgressWrite {
            key: ProgressKey::new(
                UserId::new("u1"),
                CourseId::new("c1"),
                ModuleIndex::new(0),
            ),
            kind: ModuleKind::Video,
            record: ProgressRecord::from_persisted(percent, 0.0, 0.0, fixed_now()),
        }
    }

    #[tokio::test]
    async fn drains_writes_in_issue_order() {
        let store = Arc::new(InMemoryRemoteStore::new());
        let mut queue = RemoteWriteQueue::spawn(Arc::clone(&store) as _);

        for percent in [10, 20, 30, 40] {
            queue.enqueue(write(percent));
        }
        queue.close().await;

        let percents: Vec<u8> = store
            .submissions()
            .iter()
            .map(|w| w.record.percent())
            .collect();
        assert_eq!(percents, vec![10, 20, 30, 40]);
    }

    #[tokio::test]
    async fn enqueue_after_close_is_a_logged_no_op() {
        let store = Arc::new(InMemoryRemoteStore::new());
        let mut queue = RemoteWriteQueue::spawn(Arc::clone(&store) as _);
        queue.close().await;

        queue.enqueue(write(50));
        assert!(store.submissions().is_empty());
    }
}

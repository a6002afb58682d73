//! Merges remote and locally-cached progress into one authoritative view
//! at course load.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use course_core::model::{
    CourseId, CourseModules, CourseProgressState, ModuleIndex, ProgressRecord, UserId,
};
use storage::repository::{ProgressCache, ProgressKey, RemoteProgressStore};

/// Result of reconciliation: the per-module record map and the state
/// derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledProgress {
    pub records: BTreeMap<ModuleIndex, ProgressRecord>,
    pub state: CourseProgressState,
    /// True when the remote store could not be reached and the view is
    /// local-cache-only.
    pub degraded: bool,
}

pub struct ProgressReconciler {
    cache: Arc<dyn ProgressCache>,
    remote: Arc<dyn RemoteProgressStore>,
}

impl ProgressReconciler {
    #[must_use]
    pub fn new(cache: Arc<dyn ProgressCache>, remote: Arc<dyn RemoteProgressStore>) -> Self {
        Self { cache, remote }
    }

    /// Produce the authoritative progress view for `(user, course)`.
    ///
    /// Percent is max-merged per module, so a previously recorded
    /// completion can never regress no matter which store is stale; the
    /// merged record is written back into the cache so both stores heal
    /// toward the same view. Running this twice on the same inputs yields
    /// the same result.
    ///
    /// This never fails: an unreachable remote degrades to a
    /// local-cache-only view, and an unreadable cache entry counts as
    /// absent. Course load goes on either way.
    pub async fn reconcile(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        modules: &CourseModules,
    ) -> ReconciledProgress {
        let (remote_records, degraded) = match self.remote.fetch_all(user_id, course_id).await {
            Ok(list) => (list.into_iter().collect::<BTreeMap<_, _>>(), false),
            Err(err) => {
                warn!(
                    error = %err,
                    course = %course_id,
                    "remote progress fetch failed; falling back to local cache"
                );
                (BTreeMap::new(), true)
            }
        };

        let mut records = BTreeMap::new();
        for index in modules.indices() {
            let key = ProgressKey::new(user_id.clone(), course_id.clone(), index);
            let local = self.cache.get(&key).unwrap_or_else(|err| {
                warn!(error = %err, key = %key, "progress cache read failed");
                None
            });

            let merged = match (remote_records.get(&index), local) {
                (Some(remote), Some(local)) => remote.merged_with(&local),
                (Some(remote), None) => remote.clone(),
                (None, Some(local)) => local,
                // untouched module: implicit 0%, no record to carry
                (None, None) => continue,
            };

            if let Err(err) = self.cache.set(&key, &merged) {
                warn!(error = %err, key = %key, "progress cache write-back failed");
            }
            records.insert(index, merged);
        }

        let state = CourseProgressState::derive(modules, &records);
        ReconciledProgress {
            records,
            state,
            degraded,
        }
    }
}

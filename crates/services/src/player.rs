//! Orchestrates the content-playback view: module selection through the
//! unlock gate, one active tracker session at a time, and fan-out of
//! tracker effects to both stores.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use course_core::gate;
use course_core::model::{
    CourseId, CourseModules, CourseProgressState, ModuleIndex, ProgressRecord, UserId,
};
use course_core::Clock;
use storage::repository::{ProgressCache, ProgressKey, RemoteProgressStore};

use crate::api::CourseCatalog;
use crate::error::PlayerError;
use crate::playback::{PlaybackTracker, RemoteWriteQueue, SessionPhase, TickEffects};
use crate::reconciler::ProgressReconciler;

/// Notification surfaced to the embedding UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// A module crossed its completion threshold this session. Emitted at
    /// most once per module per session, and never for modules that were
    /// already complete when the session began.
    ModuleCompleted {
        index: ModuleIndex,
        title: String,
        /// The successor this completion unlocked, if any.
        unlocked: Option<ModuleIndex>,
    },
}

/// Outcome of switching to a module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSwitch {
    pub index: ModuleIndex,
    /// Playback position to seek to when resuming mid-content.
    pub resume_at: Option<f64>,
    /// Ratcheted percent to render; NOT derived from `resume_at`.
    pub display_percent: u8,
    pub events: Vec<PlayerEvent>,
}

/// The module selector / player controller.
///
/// Owns the reconciled progress view for one `(user, course)` and the
/// single active playback session. All remote traffic goes through the
/// ordered write queue; nothing here ever awaits the network on the
/// playback path.
pub struct PlayerController {
    user_id: UserId,
    course_id: CourseId,
    clock: Clock,
    cache: Arc<dyn ProgressCache>,
    modules: CourseModules,
    records: BTreeMap<ModuleIndex, ProgressRecord>,
    state: CourseProgressState,
    degraded: bool,
    active: Option<PlaybackTracker>,
    queue: RemoteWriteQueue,
}

impl PlayerController {
    /// Load the player for `(user, course)`.
    ///
    /// Enrollment is evaluated once, up front; an unenrolled user never
    /// reaches reconciliation. A failing remote *progress* store does not
    /// fail the load; the view degrades to local-cache-only and the
    /// course still plays.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::NotEnrolled`, `PlayerError::EmptyCourse`, or
    /// a `CatalogError` when course metadata cannot be fetched at all.
    pub async fn load(
        user_id: UserId,
        course_id: CourseId,
        cache: Arc<dyn ProgressCache>,
        remote: Arc<dyn RemoteProgressStore>,
        catalog: Arc<dyn CourseCatalog>,
        clock: Clock,
    ) -> Result<Self, PlayerError> {
        if !catalog.is_enrolled(&user_id, &course_id).await? {
            return Err(PlayerError::NotEnrolled);
        }
        let modules = catalog.course_modules(&course_id).await?;
        if modules.is_empty() {
            return Err(PlayerError::EmptyCourse);
        }

        let reconciler = ProgressReconciler::new(Arc::clone(&cache), Arc::clone(&remote));
        let reconciled = reconciler.reconcile(&user_id, &course_id, &modules).await;

        Ok(Self {
            user_id,
            course_id,
            clock,
            cache,
            modules,
            records: reconciled.records,
            state: reconciled.state,
            degraded: reconciled.degraded,
            active: None,
            queue: RemoteWriteQueue::spawn(remote),
        })
    }

    /// Switch to a module.
    ///
    /// A locked or unknown module is rejected without touching any
    /// progress record. Otherwise the previous session (if any) is torn
    /// down and flushed, and a new session starts from the merged record.
    ///
    /// # Errors
    ///
    /// Returns `PlayerError::UnknownModule` or `PlayerError::Locked`; both
    /// leave all state unchanged.
    pub fn select_module(&mut self, index: ModuleIndex) -> Result<ModuleSwitch, PlayerError> {
        let Some(descriptor) = self.modules.get(index).cloned() else {
            return Err(PlayerError::UnknownModule { index });
        };
        if !gate::can_access(index, self.state.completed_modules()) {
            let required = gate::required_predecessor(index).unwrap_or(index);
            return Err(PlayerError::Locked { index, required });
        }

        self.teardown_active();

        let now = self.clock.now();
        let key = self.key(index);
        let record = self
            .records
            .get(&index)
            .cloned()
            .unwrap_or_else(|| ProgressRecord::new(now));

        let (tracker, start) = PlaybackTracker::start(key, &descriptor, record, now);
        debug!(
            module = %index,
            session = %tracker.session_id(),
            resume = ?start.resume_at,
            "module selected"
        );
        self.active = Some(tracker);
        let events = self.apply_effects(index, start.effects);

        Ok(ModuleSwitch {
            index,
            resume_at: start.resume_at,
            display_percent: start.display_percent,
            events,
        })
    }

    /// Playback-tick event from the active media element.
    ///
    /// A tick with no active session is a no-op; playback never crashes
    /// over a lost tracker.
    pub fn playback_tick(
        &mut self,
        position_seconds: f64,
        duration_seconds: f64,
    ) -> Vec<PlayerEvent> {
        let now = self.clock.now();
        let Some(tracker) = self.active.as_mut() else {
            return Vec::new();
        };
        let index = tracker.key().module_index;
        let effects = tracker.tick(position_seconds, duration_seconds, now);
        self.apply_effects(index, effects)
    }

    /// Playback started or resumed.
    pub fn playback_started(&mut self) {
        if let Some(tracker) = self.active.as_mut() {
            tracker.play();
        }
    }

    /// Playback paused. The tracker idles until the next start.
    pub fn playback_paused(&mut self) {
        if let Some(tracker) = self.active.as_mut() {
            tracker.pause();
        }
    }

    /// Natural end of the active media.
    pub fn playback_ended(&mut self, duration_seconds: f64) -> Vec<PlayerEvent> {
        let now = self.clock.now();
        let Some(tracker) = self.active.as_mut() else {
            return Vec::new();
        };
        let index = tracker.key().module_index;
        let effects = tracker.finish(duration_seconds, now);
        self.apply_effects(index, effects)
    }

    /// Tear down the active session and drain pending remote writes.
    ///
    /// Call when navigating away from the player; the final position write
    /// is best-effort but is issued before the queue closes.
    pub async fn shutdown(mut self) {
        self.teardown_active();
        self.queue.close().await;
    }

    /// Ratcheted percent for a module: what the progress indicator shows.
    #[must_use]
    pub fn display_percent(&self, index: ModuleIndex) -> u8 {
        if let Some(tracker) = &self.active {
            if tracker.key().module_index == index {
                return tracker.display_percent();
            }
        }
        self.records.get(&index).map_or(0, ProgressRecord::percent)
    }

    #[must_use]
    pub fn state(&self) -> &CourseProgressState {
        &self.state
    }

    #[must_use]
    pub fn modules(&self) -> &CourseModules {
        &self.modules
    }

    /// True when the last reconciliation ran without the remote store.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    #[must_use]
    pub fn active_module(&self) -> Option<ModuleIndex> {
        self.active.as_ref().map(|t| t.key().module_index)
    }

    #[must_use]
    pub fn session_phase(&self) -> SessionPhase {
        self.active
            .as_ref()
            .map_or(SessionPhase::Idle, PlaybackTracker::phase)
    }

    fn key(&self, index: ModuleIndex) -> ProgressKey {
        ProgressKey::new(self.user_id.clone(), self.course_id.clone(), index)
    }

    fn refresh_state(&mut self) {
        self.state = CourseProgressState::derive(&self.modules, &self.records);
    }

    fn teardown_active(&mut self) {
        if let Some(mut tracker) = self.active.take() {
            let index = tracker.key().module_index;
            if let Some(write) = tracker.flush() {
                if let Err(err) = self.cache.set(tracker.key(), &write.record) {
                    warn!(error = %err, "progress cache write failed during teardown");
                }
                self.queue.enqueue(write);
            }
            self.records.insert(index, tracker.record().clone());
            self.refresh_state();
        }
    }

    fn apply_effects(&mut self, index: ModuleIndex, effects: TickEffects) -> Vec<PlayerEvent> {
        if let Some(tracker) = &self.active {
            self.records.insert(index, tracker.record().clone());
        }

        if let Some(record) = effects.local_write {
            let key = self.key(index);
            if let Err(err) = self.cache.set(&key, &record) {
                warn!(error = %err, key = %key, "progress cache write failed");
            }
        }
        if let Some(write) = effects.remote_write {
            self.queue.enqueue(write);
        }

        let mut events = Vec::new();
        if effects.completed {
            let before = self.state.clone();
            self.refresh_state();

            let unlocked = index.next().filter(|next| {
                self.modules.get(*next).is_some()
                    && !gate::can_access(*next, before.completed_modules())
                    && gate::can_access(*next, self.state.completed_modules())
            });
            let title = self
                .modules
                .get(index)
                .map(|d| d.title().to_string())
                .unwrap_or_default();
            events.push(PlayerEvent::ModuleCompleted {
                index,
                title,
                unlocked,
            });
        }
        events
    }
}

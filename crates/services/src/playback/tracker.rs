use chrono::{DateTime, Utc};
use uuid::Uuid;

use course_core::model::{ModuleDescriptor, ModuleKind, ProgressRecord};
use storage::repository::{ProgressKey, ProgressWrite};

/// Seconds of *playback* time between periodic remote writes. Wall-clock
/// time spent paused does not count toward this.
pub const REMOTE_WRITE_INTERVAL_SECS: f64 = 10.0;

/// A positive position jump larger than this between two ticks is a seek,
/// not continuous playback, and earns no watch-time credit.
const SEEK_JUMP_SECS: f64 = 5.0;

/// Lifecycle of one playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Loaded,
    Playing,
    Paused,
    Ended,
}

/// Side effects requested by a tracker transition.
///
/// The tracker performs no I/O itself; the player applies these: the
/// local write synchronously, the remote write through the ordered queue.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickEffects {
    pub local_write: Option<ProgressRecord>,
    pub remote_write: Option<ProgressWrite>,
    /// Set when the module crossed its completion threshold for the first
    /// time in this session.
    pub completed: bool,
}

impl TickEffects {
    fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local_write.is_none() && self.remote_write.is_none() && !self.completed
    }
}

/// What starting a session asks the player to do.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStart {
    /// Seek target restoring the last known position, when resuming
    /// mid-content.
    pub resume_at: Option<f64>,
    /// Ratcheted percent to render. Deliberately NOT recomputed from
    /// `resume_at`: credit already earned stays on screen even when the
    /// user rewatches from an earlier position.
    pub display_percent: u8,
    pub effects: TickEffects,
}

/// Observes one module's playback session and turns the raw tick stream
/// into store writes.
///
/// Exactly one tracker is active at a time; the player tears the previous
/// one down (flushing it) before starting the next.
pub struct PlaybackTracker {
    session_id: Uuid,
    key: ProgressKey,
    kind: ModuleKind,
    duration_hint: Option<f64>,
    record: ProgressRecord,
    phase: SessionPhase,
    base_watch_time: f64,
    watched_this_session: f64,
    last_tick_position: Option<f64>,
    last_local_floor: Option<u64>,
    since_remote_write: f64,
    dirty: bool,
    was_complete_at_start: bool,
    completion_signaled: bool,
}

impl PlaybackTracker {
    /// Start a session for a module, resuming from the merged record.
    ///
    /// Video and audio land in `Loaded` with a pending resume seek.
    /// Documents bypass continuous tracking entirely: the session starts
    /// already `Ended`, with a single terminal write of 100%.
    #[must_use]
    pub fn start(
        key: ProgressKey,
        descriptor: &ModuleDescriptor,
        record: ProgressRecord,
        now: DateTime<Utc>,
    ) -> (Self, SessionStart) {
        let kind = descriptor.kind();
        let was_complete_at_start = record.is_complete_for(kind);
        let base_watch_time = record.watch_time_seconds();

        let mut tracker = Self {
            session_id: Uuid::new_v4(),
            key,
            kind,
            duration_hint: descriptor.duration_hint_seconds(),
            record,
            phase: SessionPhase::Loaded,
            base_watch_time,
            watched_this_session: 0.0,
            last_tick_position: None,
            last_local_floor: None,
            since_remote_write: 0.0,
            dirty: false,
            was_complete_at_start,
            completion_signaled: false,
        };

        if kind.is_continuous() {
            let position = tracker.record.last_position_seconds();
            let inside_content = tracker.duration_hint.is_none_or(|d| position < d);
            let resume_at = (position > 0.0 && inside_content).then_some(position);
            // playback-time deltas count from where the session begins
            tracker.last_tick_position = Some(resume_at.unwrap_or(0.0));
            let display_percent = tracker.record.percent();
            let start = SessionStart {
                resume_at,
                display_percent,
                effects: TickEffects::none(),
            };
            (tracker, start)
        } else {
            tracker
                .record
                .apply_sample(100, 0.0, tracker.base_watch_time, now);
            tracker.phase = SessionPhase::Ended;
            let completed = tracker.check_completion();
            let effects = TickEffects {
                local_write: Some(tracker.record.clone()),
                remote_write: Some(tracker.write()),
                completed,
            };
            let display_percent = tracker.record.percent();
            let start = SessionStart {
                resume_at: None,
                display_percent,
                effects,
            };
            (tracker, start)
        }
    }

    pub fn play(&mut self) {
        if matches!(self.phase, SessionPhase::Loaded | SessionPhase::Paused) {
            self.phase = SessionPhase::Playing;
        }
    }

    pub fn pause(&mut self) {
        if self.phase == SessionPhase::Playing {
            self.phase = SessionPhase::Paused;
        }
    }

    /// Process one raw playback-time update.
    ///
    /// Does nothing unless the session is `Playing`. A local write is
    /// requested whenever the floor of the position changes; a remote
    /// write every `REMOTE_WRITE_INTERVAL_SECS` of accumulated playback.
    pub fn tick(
        &mut self,
        position_seconds: f64,
        duration_seconds: f64,
        now: DateTime<Utc>,
    ) -> TickEffects {
        if self.phase != SessionPhase::Playing {
            return TickEffects::none();
        }
        if !duration_seconds.is_finite()
            || duration_seconds <= 0.0
            || !position_seconds.is_finite()
        {
            return TickEffects::none();
        }
        let position = position_seconds.clamp(0.0, duration_seconds);

        if let Some(last) = self.last_tick_position {
            let delta = position - last;
            if delta > 0.0 && delta <= SEEK_JUMP_SECS {
                self.watched_this_session += delta;
                self.since_remote_write += delta;
            }
        }
        self.last_tick_position = Some(position);

        let live_percent = percent_of(position, duration_seconds);
        self.record.apply_sample(
            live_percent,
            position,
            self.base_watch_time + self.watched_this_session,
            now,
        );
        self.dirty = true;

        let mut effects = TickEffects::none();

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let floor = position as u64;
        if self.last_local_floor != Some(floor) {
            self.last_local_floor = Some(floor);
            effects.local_write = Some(self.record.clone());
        }

        if self.since_remote_write >= REMOTE_WRITE_INTERVAL_SECS {
            self.since_remote_write -= REMOTE_WRITE_INTERVAL_SECS;
            effects.remote_write = Some(self.write());
            self.dirty = false;
        }

        effects.completed = self.check_completion();
        effects
    }

    /// Natural completion: playback reached the end of the content.
    ///
    /// Writes a terminal 100% to both stores.
    pub fn finish(&mut self, duration_seconds: f64, now: DateTime<Utc>) -> TickEffects {
        if matches!(self.phase, SessionPhase::Ended | SessionPhase::Idle) {
            return TickEffects::none();
        }
        let duration = if duration_seconds.is_finite() && duration_seconds > 0.0 {
            duration_seconds
        } else {
            self.duration_hint.unwrap_or(0.0)
        };

        // credit the tail played since the last tick
        if let Some(last) = self.last_tick_position {
            let tail = duration - last;
            if tail > 0.0 && tail <= SEEK_JUMP_SECS {
                self.watched_this_session += tail;
            }
        }

        self.record.apply_sample(
            100,
            duration,
            self.base_watch_time + self.watched_this_session,
            now,
        );
        self.phase = SessionPhase::Ended;
        self.since_remote_write = 0.0;
        self.dirty = false;

        let completed = self.check_completion();
        TickEffects {
            local_write: Some(self.record.clone()),
            remote_write: Some(self.write()),
            completed,
        }
    }

    /// Final best-effort write when the session is torn down by
    /// navigation. Returns `None` when everything observed has already
    /// been sent remotely.
    pub fn flush(&mut self) -> Option<ProgressWrite> {
        self.phase = SessionPhase::Ended;
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.write())
    }

    fn check_completion(&mut self) -> bool {
        if self.was_complete_at_start || self.completion_signaled {
            return false;
        }
        if self.record.is_complete_for(self.kind) {
            self.completion_signaled = true;
            return true;
        }
        false
    }

    fn write(&self) -> ProgressWrite {
        ProgressWrite {
            key: self.key.clone(),
            kind: self.kind,
            record: self.record.clone(),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    #[must_use]
    pub fn key(&self) -> &ProgressKey {
        &self.key
    }

    #[must_use]
    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    /// The ratcheted percent shown to the user.
    #[must_use]
    pub fn display_percent(&self) -> u8 {
        self.record.percent()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent_of(position: f64, duration: f64) -> u8 {
    (100.0 * position / duration).round().clamp(0.0, 100.0) as u8
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{ContentRef, CourseId, ModuleIndex, UserId};
    use course_core::time::fixed_now;

    fn key() -> ProgressKey {
        ProgressKey::new(
            UserId::new("u1"),
            CourseId::new("c1"),
            ModuleIndex::new(0),
        )
    }

    fn descriptor(kind: ModuleKind, duration_hint: Option<f64>) -> ModuleDescriptor {
        ModuleDescriptor::new(
            0,
            "Lesson",
            kind,
            ContentRef::from_id("content-0").unwrap(),
            duration_hint,
        )
        .unwrap()
    }

    fn fresh_video() -> (PlaybackTracker, SessionStart) {
        PlaybackTracker::start(
            key(),
            &descriptor(ModuleKind::Video, None),
            ProgressRecord::new(fixed_now()),
            fixed_now(),
        )
    }

    #[test]
    fn video_session_loads_without_writes() {
        let (tracker, start) = fresh_video();
        assert_eq!(tracker.phase(), SessionPhase::Loaded);
        assert_eq!(start.resume_at, None);
        assert_eq!(start.display_percent, 0);
        assert!(start.effects.is_empty());
    }

    #[test]
    fn resume_restores_last_position_and_merged_percent() {
        let record = ProgressRecord::from_persisted(95, 500.0, 570.0, fixed_now());
        let (_, start) = PlaybackTracker::start(
            key(),
            &descriptor(ModuleKind::Video, Some(600.0)),
            record,
            fixed_now(),
        );
        assert_eq!(start.resume_at, Some(570.0));
        // displayed percent is the ratchet, not position/duration
        assert_eq!(start.display_percent, 95);
    }

    #[test]
    fn resume_is_skipped_when_position_is_outside_content() {
        let record = ProgressRecord::from_persisted(100, 650.0, 650.0, fixed_now());
        let (_, start) = PlaybackTracker::start(
            key(),
            &descriptor(ModuleKind::Video, Some(600.0)),
            record,
            fixed_now(),
        );
        assert_eq!(start.resume_at, None);
    }

    #[test]
    fn ticks_are_ignored_until_playing_and_while_paused() {
        let (mut tracker, _) = fresh_video();
        assert!(tracker.tick(1.0, 100.0, fixed_now()).is_empty());

        tracker.play();
        assert!(!tracker.tick(1.0, 100.0, fixed_now()).is_empty());

        tracker.pause();
        assert_eq!(tracker.phase(), SessionPhase::Paused);
        assert!(tracker.tick(2.0, 100.0, fixed_now()).is_empty());
    }

    #[test]
    fn local_writes_follow_whole_second_boundaries() {
        let (mut tracker, _) = fresh_video();
        tracker.play();

        assert!(tracker.tick(1.2, 100.0, fixed_now()).local_write.is_some());
        assert!(tracker.tick(1.8, 100.0, fixed_now()).local_write.is_none());
        assert!(tracker.tick(2.1, 100.0, fixed_now()).local_write.is_some());
    }

    #[test]
    fn remote_write_cadence_is_ten_seconds_of_playback() {
        let (mut tracker, _) = fresh_video();
        tracker.play();

        let mut periodic = 0;
        for second in 1..=35 {
            let effects = tracker.tick(f64::from(second), 100.0, fixed_now());
            if effects.remote_write.is_some() {
                periodic += 1;
                assert_eq!(second % 10, 0, "unexpected write at {second}s");
            }
        }
        assert_eq!(periodic, 3); // 10s, 20s, 30s

        // navigation away flushes the unsent tail exactly once
        assert!(tracker.flush().is_some());
        assert!(tracker.flush().is_none());
    }

    #[test]
    fn pausing_stops_the_remote_cadence() {
        let (mut tracker, _) = fresh_video();
        tracker.play();
        for second in 1..=5 {
            tracker.tick(f64::from(second), 100.0, fixed_now());
        }
        tracker.pause();
        // paused ticks never advance playback time
        for _ in 0..20 {
            assert!(tracker.tick(5.0, 100.0, fixed_now()).is_empty());
        }
        tracker.play();
        for second in 6..=9 {
            let effects = tracker.tick(f64::from(second), 100.0, fixed_now());
            assert!(effects.remote_write.is_none());
        }
        let effects = tracker.tick(10.0, 100.0, fixed_now());
        assert!(effects.remote_write.is_some());
    }

    #[test]
    fn backward_seek_keeps_the_percent_ratchet() {
        let record = ProgressRecord::from_persisted(95, 570.0, 570.0, fixed_now());
        let (mut tracker, _) = PlaybackTracker::start(
            key(),
            &descriptor(ModuleKind::Video, Some(600.0)),
            record,
            fixed_now(),
        );
        tracker.play();

        // user seeks back to 10% and rewatches
        let effects = tracker.tick(60.0, 600.0, fixed_now());
        let written = effects.local_write.unwrap();
        assert_eq!(written.percent(), 95);
        assert_eq!(written.last_position_seconds(), 60.0);
        assert_eq!(tracker.display_percent(), 95);
    }

    #[test]
    fn seek_jumps_earn_no_watch_time() {
        let (mut tracker, _) = fresh_video();
        tracker.play();
        tracker.tick(1.0, 100.0, fixed_now());
        tracker.tick(2.0, 100.0, fixed_now());
        tracker.tick(80.0, 100.0, fixed_now()); // scrub forward

        // only the continuous 0s -> 2s stretch counted
        assert_eq!(tracker.record().watch_time_seconds(), 2.0);
        // but the cursor and the ratchet followed the seek
        assert_eq!(tracker.record().last_position_seconds(), 80.0);
        assert_eq!(tracker.display_percent(), 80);
    }

    #[test]
    fn completion_fires_once_at_the_threshold() {
        let (mut tracker, _) = fresh_video();
        tracker.play();

        let mut completions = 0;
        for second in 1..=95 {
            let effects = tracker.tick(f64::from(second), 100.0, fixed_now());
            if effects.completed {
                completions += 1;
                assert_eq!(second, 90);
            }
        }
        assert_eq!(completions, 1);
    }

    #[test]
    fn no_completion_event_when_already_complete_at_start() {
        let record = ProgressRecord::from_persisted(95, 570.0, 570.0, fixed_now());
        let (mut tracker, start) = PlaybackTracker::start(
            key(),
            &descriptor(ModuleKind::Video, Some(600.0)),
            record,
            fixed_now(),
        );
        assert!(!start.effects.completed);

        tracker.play();
        let effects = tracker.tick(595.0, 600.0, fixed_now());
        assert!(!effects.completed);
        let effects = tracker.finish(600.0, fixed_now());
        assert!(!effects.completed);
    }

    #[test]
    fn natural_end_writes_terminal_hundred() {
        let (mut tracker, _) = fresh_video();
        tracker.play();
        tracker.tick(50.0, 100.0, fixed_now());

        let effects = tracker.finish(100.0, fixed_now());
        assert!(effects.completed);
        let write = effects.remote_write.unwrap();
        assert_eq!(write.record.percent(), 100);
        assert_eq!(write.record.last_position_seconds(), 100.0);
        assert_eq!(tracker.phase(), SessionPhase::Ended);

        // nothing left to flush afterwards
        assert!(tracker.flush().is_none());
    }

    #[test]
    fn document_session_is_one_terminal_write() {
        let (tracker, start) = PlaybackTracker::start(
            key(),
            &descriptor(ModuleKind::Document, None),
            ProgressRecord::new(fixed_now()),
            fixed_now(),
        );

        assert_eq!(tracker.phase(), SessionPhase::Ended);
        assert_eq!(start.display_percent, 100);
        assert!(start.effects.completed);
        let write = start.effects.remote_write.unwrap();
        assert_eq!(write.record.percent(), 100);
        assert_eq!(write.kind, ModuleKind::Document);
    }

    #[test]
    fn reopening_a_document_does_not_re_complete() {
        let record = ProgressRecord::from_persisted(100, 0.0, 0.0, fixed_now());
        let (_, start) = PlaybackTracker::start(
            key(),
            &descriptor(ModuleKind::Document, None),
            record,
            fixed_now(),
        );
        assert!(!start.effects.completed);
        // the terminal write still refreshes the stores
        assert!(start.effects.remote_write.is_some());
    }
}

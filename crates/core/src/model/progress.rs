use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::model::module::ModuleKind;

/// Persisted consumption state for one `(user, course, module)`.
///
/// `percent` is a ratchet: merging never lowers it, even when samples
/// arrive out of order from a scrubbing user. `last_position_seconds` is
/// deliberately NOT a ratchet; it follows the playback cursor so a resume
/// lands where the user actually left off, including after a backward
/// seek.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    percent: u8,
    watch_time_seconds: f64,
    last_position_seconds: f64,
    last_updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// An empty record: nothing consumed yet.
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            percent: 0,
            watch_time_seconds: 0.0,
            last_position_seconds: 0.0,
            last_updated_at: at,
        }
    }

    /// Rehydrate a record from a store, clamping anything out of range.
    ///
    /// A corrupt row (percent above 100, negative or non-finite seconds)
    /// is repaired here rather than surfaced, so an out-of-range value
    /// can never leak into the derived completed set.
    #[must_use]
    pub fn from_persisted(
        percent: i64,
        watch_time_seconds: f64,
        last_position_seconds: f64,
        last_updated_at: DateTime<Utc>,
    ) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = percent.clamp(0, 100) as u8;
        Self {
            percent,
            watch_time_seconds: clamp_seconds(watch_time_seconds),
            last_position_seconds: clamp_seconds(last_position_seconds),
            last_updated_at,
        }
    }

    #[must_use]
    pub fn percent(&self) -> u8 {
        self.percent
    }

    #[must_use]
    pub fn watch_time_seconds(&self) -> f64 {
        self.watch_time_seconds
    }

    #[must_use]
    pub fn last_position_seconds(&self) -> f64 {
        self.last_position_seconds
    }

    #[must_use]
    pub fn last_updated_at(&self) -> DateTime<Utc> {
        self.last_updated_at
    }

    /// Fold a live playback sample into the record.
    ///
    /// Percent ratchets up, the position overwrites (seek-consistent), the
    /// cumulative watch time replaces the stored value.
    pub fn apply_sample(
        &mut self,
        live_percent: u8,
        position_seconds: f64,
        watch_time_seconds: f64,
        at: DateTime<Utc>,
    ) {
        self.percent = self.percent.max(live_percent.min(100));
        self.last_position_seconds = clamp_seconds(position_seconds);
        self.watch_time_seconds = clamp_seconds(watch_time_seconds);
        self.last_updated_at = at;
    }

    /// Merge two observations of the same module into one.
    ///
    /// Percent takes the maximum regardless of timestamps. Position and
    /// watch time come from whichever record is fresher; on a timestamp
    /// tie each takes its maximum, which keeps the operation commutative
    /// and idempotent.
    #[must_use]
    pub fn merged_with(&self, other: &ProgressRecord) -> ProgressRecord {
        let (position, watch_time) = match self.last_updated_at.cmp(&other.last_updated_at) {
            Ordering::Greater => (self.last_position_seconds, self.watch_time_seconds),
            Ordering::Less => (other.last_position_seconds, other.watch_time_seconds),
            Ordering::Equal => (
                self.last_position_seconds.max(other.last_position_seconds),
                self.watch_time_seconds.max(other.watch_time_seconds),
            ),
        };
        ProgressRecord {
            percent: self.percent.max(other.percent),
            watch_time_seconds: watch_time,
            last_position_seconds: position,
            last_updated_at: self.last_updated_at.max(other.last_updated_at),
        }
    }

    /// Whether this record satisfies the completion threshold for the
    /// given module kind.
    #[must_use]
    pub fn is_complete_for(&self, kind: ModuleKind) -> bool {
        self.percent >= kind.completion_threshold()
    }
}

fn clamp_seconds(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn record(percent: i64, position: f64, at: DateTime<Utc>) -> ProgressRecord {
        ProgressRecord::from_persisted(percent, position, position, at)
    }

    #[test]
    fn from_persisted_clamps_out_of_range_values() {
        let now = fixed_now();
        let r = ProgressRecord::from_persisted(150, -3.0, f64::NAN, now);
        assert_eq!(r.percent(), 100);
        assert_eq!(r.watch_time_seconds(), 0.0);
        assert_eq!(r.last_position_seconds(), 0.0);

        let r = ProgressRecord::from_persisted(-20, 5.0, 5.0, now);
        assert_eq!(r.percent(), 0);
    }

    #[test]
    fn sample_ratchets_percent_but_not_position() {
        let now = fixed_now();
        let mut r = record(95, 570.0, now);

        // user seeks back to 10% and keeps watching
        r.apply_sample(10, 60.0, 610.0, now + Duration::seconds(40));

        assert_eq!(r.percent(), 95);
        assert_eq!(r.last_position_seconds(), 60.0);
        assert_eq!(r.watch_time_seconds(), 610.0);
    }

    #[test]
    fn merge_takes_max_percent_regardless_of_timestamps() {
        let now = fixed_now();
        let stale_remote = record(40, 240.0, now - Duration::hours(2));
        let local = record(100, 10.0, now);

        let merged = local.merged_with(&stale_remote);
        assert_eq!(merged.percent(), 100);
        // local is fresher, so its position wins
        assert_eq!(merged.last_position_seconds(), 10.0);
    }

    #[test]
    fn merge_prefers_fresher_position() {
        let now = fixed_now();
        let local = record(80, 480.0, now - Duration::minutes(30));
        let remote = record(60, 700.0, now); // played further on another device

        let merged = local.merged_with(&remote);
        assert_eq!(merged.percent(), 80);
        assert_eq!(merged.last_position_seconds(), 700.0);
        assert_eq!(merged.last_updated_at(), now);
    }

    #[test]
    fn merge_is_commutative_and_idempotent() {
        let now = fixed_now();
        let a = record(70, 420.0, now - Duration::minutes(5));
        let b = record(55, 330.0, now);

        let ab = a.merged_with(&b);
        let ba = b.merged_with(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.merged_with(&ab), ab);
        assert_eq!(ab.merged_with(&b), ab);
    }

    #[test]
    fn merge_ties_resolve_to_maximums() {
        let now = fixed_now();
        let a = record(70, 420.0, now);
        let b = record(70, 300.0, now);
        assert_eq!(a.merged_with(&b).last_position_seconds(), 420.0);
        assert_eq!(b.merged_with(&a).last_position_seconds(), 420.0);
    }

    #[test]
    fn completion_follows_module_kind_threshold() {
        let now = fixed_now();
        assert!(!record(89, 0.0, now).is_complete_for(ModuleKind::Video));
        assert!(record(90, 0.0, now).is_complete_for(ModuleKind::Video));
        assert!(record(90, 0.0, now).is_complete_for(ModuleKind::Audio));
        assert!(!record(99, 0.0, now).is_complete_for(ModuleKind::Document));
        assert!(record(100, 0.0, now).is_complete_for(ModuleKind::Document));
    }
}

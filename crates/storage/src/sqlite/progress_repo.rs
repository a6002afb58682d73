use chrono::{DateTime, Utc};
use course_core::model::ProgressRecord;
use rusqlite::{params, OptionalExtension, Row};

use super::SqliteProgressCache;
use crate::repository::{ProgressCache, ProgressKey, StorageError};

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| StorageError::Serialization(format!("invalid datetime '{value}': {err}")))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<(i64, f64, f64, String)> {
    Ok((
        row.get("percent")?,
        row.get("watch_time_seconds")?,
        row.get("last_position_seconds")?,
        row.get("last_updated_at")?,
    ))
}

impl ProgressCache for SqliteProgressCache {
    fn get(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>, StorageError> {
        let conn = self
            .conn()
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let row = conn
            .query_row(
                r"
                SELECT percent, watch_time_seconds, last_position_seconds, last_updated_at
                FROM progress_cache
                WHERE user_id = ?1 AND course_id = ?2 AND module_index = ?3
                ",
                params![
                    key.user_id.as_str(),
                    key.course_id.as_str(),
                    i64::from(key.module_index.value()),
                ],
                row_to_record,
            )
            .optional()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some((percent, watch_time, position, updated_at)) => {
                let updated_at = parse_datetime(&updated_at)?;
                // clamp on read: a bad write must never surface out-of-range values
                Ok(Some(ProgressRecord::from_persisted(
                    percent, watch_time, position, updated_at,
                )))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &ProgressKey, record: &ProgressRecord) -> Result<(), StorageError> {
        let conn = self
            .conn()
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        conn.execute(
            r"
            INSERT INTO progress_cache (
                user_id, course_id, module_index,
                percent, watch_time_seconds, last_position_seconds, last_updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(user_id, course_id, module_index) DO UPDATE SET
                percent = excluded.percent,
                watch_time_seconds = excluded.watch_time_seconds,
                last_position_seconds = excluded.last_position_seconds,
                last_updated_at = excluded.last_updated_at
            ",
            params![
                key.user_id.as_str(),
                key.course_id.as_str(),
                i64::from(key.module_index.value()),
                i64::from(record.percent()),
                record.watch_time_seconds(),
                record.last_position_seconds(),
                record.last_updated_at().to_rfc3339(),
            ],
        )
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{CourseId, ModuleIndex, UserId};
    use course_core::time::fixed_now;

    fn key(index: u32) -> ProgressKey {
        ProgressKey::new(
            UserId::new("student-1"),
            CourseId::new("course-1"),
            ModuleIndex::new(index),
        )
    }

    #[test]
    fn round_trips_a_record() {
        let cache = SqliteProgressCache::open_in_memory().unwrap();
        let record = ProgressRecord::from_persisted(42, 12.5, 37.25, fixed_now());

        cache.set(&key(0), &record).unwrap();
        let fetched = cache.get(&key(0)).unwrap().unwrap();

        assert_eq!(fetched.percent(), 42);
        assert_eq!(fetched.watch_time_seconds(), 12.5);
        assert_eq!(fetched.last_position_seconds(), 37.25);
        assert_eq!(fetched.last_updated_at(), fixed_now());
    }

    #[test]
    fn missing_key_is_none() {
        let cache = SqliteProgressCache::open_in_memory().unwrap();
        assert!(cache.get(&key(9)).unwrap().is_none());
    }

    #[test]
    fn upsert_overwrites_on_conflict() {
        let cache = SqliteProgressCache::open_in_memory().unwrap();
        cache
            .set(&key(1), &ProgressRecord::from_persisted(10, 1.0, 1.0, fixed_now()))
            .unwrap();
        cache
            .set(&key(1), &ProgressRecord::from_persisted(60, 2.0, 2.0, fixed_now()))
            .unwrap();

        let fetched = cache.get(&key(1)).unwrap().unwrap();
        assert_eq!(fetched.percent(), 60);
    }

    #[test]
    fn clamps_corrupt_rows_on_read() {
        let cache = SqliteProgressCache::open_in_memory().unwrap();
        cache
            .set(&key(2), &ProgressRecord::from_persisted(50, 5.0, 5.0, fixed_now()))
            .unwrap();

        // corrupt the row behind the adapter's back
        cache
            .conn()
            .lock()
            .unwrap()
            .execute(
                "UPDATE progress_cache SET percent = 150, last_position_seconds = -9.0",
                [],
            )
            .unwrap();

        let fetched = cache.get(&key(2)).unwrap().unwrap();
        assert_eq!(fetched.percent(), 100);
        assert_eq!(fetched.last_position_seconds(), 0.0);
    }

    #[test]
    fn keys_are_scoped_per_user_and_course() {
        let cache = SqliteProgressCache::open_in_memory().unwrap();
        cache
            .set(&key(0), &ProgressRecord::from_persisted(80, 0.0, 0.0, fixed_now()))
            .unwrap();

        let other_user = ProgressKey::new(
            UserId::new("student-2"),
            CourseId::new("course-1"),
            ModuleIndex::new(0),
        );
        assert!(cache.get(&other_user).unwrap().is_none());
    }
}

//! Wire shapes for the learning-platform API.
//!
//! These mirror the backend's JSON exactly (camelCase fields, enveloped
//! responses) and are converted into domain types at the boundary, with
//! out-of-range values clamped on the way in.

use chrono::{DateTime, Utc};
use course_core::model::{
    ContentRef, ModuleDescriptor, ModuleError, ModuleIndex, ModuleKind, ProgressRecord,
};
use serde::{Deserialize, Serialize};
use storage::repository::ProgressWrite;

#[derive(Debug, Deserialize)]
pub(crate) struct ProgressListEnvelope {
    #[serde(default)]
    pub progress: Vec<ProgressDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProgressEnvelope {
    pub progress: ProgressDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProgressDto {
    pub module_index: i64,
    #[serde(default)]
    pub progress: i64,
    #[serde(default)]
    pub watch_time_seconds: f64,
    #[serde(default)]
    pub last_position_seconds: f64,
    #[serde(default)]
    pub last_watched_at: Option<DateTime<Utc>>,
}

impl ProgressDto {
    /// Convert into an index/record pair, clamping out-of-range values.
    ///
    /// Returns `None` for a negative module index (nothing sane to key it
    /// under).
    pub(crate) fn into_record(
        self,
        fallback_updated_at: DateTime<Utc>,
    ) -> Option<(ModuleIndex, ProgressRecord)> {
        let index = u32::try_from(self.module_index).ok()?;
        let updated_at = self.last_watched_at.unwrap_or(fallback_updated_at);
        Some((
            ModuleIndex::new(index),
            ProgressRecord::from_persisted(
                self.progress,
                self.watch_time_seconds,
                self.last_position_seconds,
                updated_at,
            ),
        ))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmitProgressDto<'a> {
    pub student_id: &'a str,
    pub course_id: &'a str,
    pub module_index: u32,
    pub module_type: &'a str,
    pub progress: u8,
    pub watch_time_seconds: f64,
    pub last_position_seconds: f64,
}

impl<'a> SubmitProgressDto<'a> {
    pub(crate) fn from_write(write: &'a ProgressWrite) -> Self {
        Self {
            student_id: write.key.user_id.as_str(),
            course_id: write.key.course_id.as_str(),
            module_index: write.key.module_index.value(),
            module_type: write.kind.as_str(),
            progress: write.record.percent(),
            watch_time_seconds: write.record.watch_time_seconds(),
            last_position_seconds: write.record.last_position_seconds(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CourseEnvelope {
    pub course: CourseDto,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CourseDto {
    #[serde(default)]
    pub modules: Vec<ModuleDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ModuleDto {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub document_url: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub lesson_id: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

impl ModuleDto {
    /// Convert into a descriptor at the given position in the course.
    ///
    /// Modules without a typed content URL fall back to whichever URL is
    /// present, then to the lesson id.
    pub(crate) fn into_descriptor(self, order: u32) -> Result<ModuleDescriptor, ModuleError> {
        let kind = match self.kind.as_deref() {
            Some(k) => k.parse::<ModuleKind>()?,
            None => ModuleKind::Video,
        };
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("Module {}", order + 1));

        let typed_url = match kind {
            ModuleKind::Video => self.video_url.clone(),
            ModuleKind::Document => self.document_url.clone(),
            ModuleKind::Audio => self.audio_url.clone(),
        };
        let url = typed_url
            .or(self.video_url)
            .or(self.document_url)
            .or(self.audio_url)
            .filter(|u| !u.trim().is_empty());

        let content = match (url, self.lesson_id) {
            (Some(url), _) => ContentRef::from_url(url)?,
            (None, Some(lesson_id)) => ContentRef::from_id(lesson_id)?,
            (None, None) => return Err(ModuleError::EmptyContentRef),
        };

        let duration_hint = self
            .duration_seconds
            .filter(|d| d.is_finite() && *d > 0.0);

        ModuleDescriptor::new(order, title, kind, content, duration_hint)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct EnrollmentListEnvelope {
    #[serde(default)]
    pub enrollments: Vec<EnrollmentDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EnrollmentDto {
    pub course_id: String,
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

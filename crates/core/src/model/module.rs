use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::model::ids::ModuleIndex;

//
// ─── ERRORS (domain validation) ────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModuleError {
    #[error("module title cannot be empty")]
    EmptyTitle,

    #[error("content reference cannot be empty")]
    EmptyContentRef,

    #[error("content URL is not a valid URL")]
    InvalidContentUrl,

    #[error("duration hint must be a positive number of seconds")]
    InvalidDurationHint,

    #[error("unknown module kind: {0}")]
    UnknownKind(String),
}

//
// ─── MODULE KIND ───────────────────────────────────────────────────────────────
//

/// Completion threshold for continuously-consumed media (video/audio).
pub const MEDIA_COMPLETION_PERCENT: u8 = 90;

/// Completion threshold for documents: binary, accessed means complete.
pub const DOCUMENT_COMPLETION_PERCENT: u8 = 100;

/// Kind of content a module delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Video,
    Document,
    Audio,
}

impl ModuleKind {
    /// Percent at which a module of this kind counts as complete.
    ///
    /// Video and audio carry a partial-consumption signal, so they complete
    /// at 90%. Documents have no such signal and complete only at 100,
    /// which is written in one step on first open.
    #[must_use]
    pub fn completion_threshold(self) -> u8 {
        match self {
            ModuleKind::Video | ModuleKind::Audio => MEDIA_COMPLETION_PERCENT,
            ModuleKind::Document => DOCUMENT_COMPLETION_PERCENT,
        }
    }

    /// Whether progress for this kind comes from a continuous playback
    /// stream (as opposed to a single access event).
    #[must_use]
    pub fn is_continuous(self) -> bool {
        !matches!(self, ModuleKind::Document)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleKind::Video => "video",
            ModuleKind::Document => "document",
            ModuleKind::Audio => "audio",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModuleKind {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(ModuleKind::Video),
            "document" => Ok(ModuleKind::Document),
            "audio" => Ok(ModuleKind::Audio),
            other => Err(ModuleError::UnknownKind(other.to_string())),
        }
    }
}

//
// ─── CONTENT REFERENCE ─────────────────────────────────────────────────────────
//

/// Where a module's content lives: a resolvable URL or an opaque id the
/// delivery layer knows how to look up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRef {
    Url(Url),
    Id(String),
}

impl ContentRef {
    /// Build a content reference from a URL string.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::EmptyContentRef` for blank input and
    /// `ModuleError::InvalidContentUrl` if the string does not parse.
    pub fn from_url(url: impl AsRef<str>) -> Result<Self, ModuleError> {
        let s = url.as_ref().trim();
        if s.is_empty() {
            return Err(ModuleError::EmptyContentRef);
        }
        let u = Url::parse(s).map_err(|_| ModuleError::InvalidContentUrl)?;
        Ok(ContentRef::Url(u))
    }

    /// Build a content reference from an opaque id.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::EmptyContentRef` for blank input.
    pub fn from_id(id: impl Into<String>) -> Result<Self, ModuleError> {
        let s = id.into();
        if s.trim().is_empty() {
            return Err(ModuleError::EmptyContentRef);
        }
        Ok(ContentRef::Id(s))
    }

    #[must_use]
    pub fn as_url(&self) -> Option<&Url> {
        match self {
            ContentRef::Url(u) => Some(u),
            ContentRef::Id(_) => None,
        }
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentRef::Url(u) => write!(f, "{u}"),
            ContentRef::Id(id) => write!(f, "{id}"),
        }
    }
}

//
// ─── MODULE DESCRIPTOR ─────────────────────────────────────────────────────────
//

/// One orderable unit of course content.
///
/// Descriptors are authored with the course and are read-only here; the
/// progress core never mutates them.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDescriptor {
    order: u32,
    title: String,
    kind: ModuleKind,
    content: ContentRef,
    duration_hint_seconds: Option<f64>,
}

impl ModuleDescriptor {
    /// Creates a module descriptor.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::EmptyTitle` for a blank title and
    /// `ModuleError::InvalidDurationHint` for a zero, negative, or
    /// non-finite duration hint.
    pub fn new(
        order: u32,
        title: impl Into<String>,
        kind: ModuleKind,
        content: ContentRef,
        duration_hint_seconds: Option<f64>,
    ) -> Result<Self, ModuleError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ModuleError::EmptyTitle);
        }
        if let Some(hint) = duration_hint_seconds {
            if !hint.is_finite() || hint <= 0.0 {
                return Err(ModuleError::InvalidDurationHint);
            }
        }
        Ok(Self {
            order,
            title,
            kind,
            content,
            duration_hint_seconds,
        })
    }

    #[must_use]
    pub fn order(&self) -> u32 {
        self.order
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    #[must_use]
    pub fn content(&self) -> &ContentRef {
        &self.content
    }

    #[must_use]
    pub fn duration_hint_seconds(&self) -> Option<f64> {
        self.duration_hint_seconds
    }
}

//
// ─── COURSE MODULES ────────────────────────────────────────────────────────────
//

/// The ordered module list of one course.
///
/// Modules are sorted by their authored `order`; a `ModuleIndex` is the
/// zero-based position in this sorted sequence and is the key every
/// progress record hangs off.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CourseModules {
    modules: Vec<ModuleDescriptor>,
}

impl CourseModules {
    /// Build the ordered list from authored descriptors, sorting by `order`.
    ///
    /// Duplicate `order` values keep their given relative ordering.
    #[must_use]
    pub fn from_descriptors(mut modules: Vec<ModuleDescriptor>) -> Self {
        modules.sort_by_key(ModuleDescriptor::order);
        Self { modules }
    }

    #[must_use]
    pub fn get(&self, index: ModuleIndex) -> Option<&ModuleDescriptor> {
        self.modules.get(index.value() as usize)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Iterate the indices of all modules in course order.
    pub fn indices(&self) -> impl Iterator<Item = ModuleIndex> + '_ {
        #[allow(clippy::cast_possible_truncation)]
        let count = self.modules.len() as u32;
        (0..count).map(ModuleIndex::new)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleIndex, &ModuleDescriptor)> {
        self.indices().zip(self.modules.iter())
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

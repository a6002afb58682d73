mod course_state;
mod ids;
mod module;
mod progress;

pub use course_state::CourseProgressState;
pub use ids::{CourseId, ModuleIndex, ParseIndexError, UserId};
pub use module::{
    ContentRef, CourseModules, ModuleDescriptor, ModuleError, ModuleKind,
    DOCUMENT_COMPLETION_PERCENT, MEDIA_COMPLETION_PERCENT,
};
pub use progress::ProgressRecord;

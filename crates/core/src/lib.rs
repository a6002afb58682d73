#![forbid(unsafe_code)]

pub mod error;
pub mod gate;
pub mod model;
pub mod time;

pub use error::Error;
pub use time::Clock;

pub use model::{
    ContentRef, CourseId, CourseModules, CourseProgressState, ModuleDescriptor, ModuleError,
    ModuleIndex, ModuleKind, ProgressRecord, UserId,
};

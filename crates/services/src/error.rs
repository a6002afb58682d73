//! Shared error types for the services crate.

use thiserror::Error;

use course_core::model::{ModuleError, ModuleIndex};

/// Errors emitted by the course catalog client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("course not found")]
    CourseNotFound,
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    #[error("catalog request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Module(#[from] ModuleError),
}

/// Errors emitted by `PlayerController`.
///
/// None of these are fatal to the host page: a rejected operation leaves
/// every progress record exactly as it was.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlayerError {
    #[error("user is not enrolled in this course")]
    NotEnrolled,
    #[error("course has no modules")]
    EmptyCourse,
    #[error("module {index} does not exist")]
    UnknownModule { index: ModuleIndex },
    #[error("module {index} is locked; complete module {required} first")]
    Locked {
        index: ModuleIndex,
        required: ModuleIndex,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

use thiserror::Error;

use crate::model::ModuleError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Module(#[from] ModuleError),
}

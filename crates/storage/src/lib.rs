#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    InMemoryProgressCache, InMemoryRemoteStore, ProgressCache, ProgressKey, ProgressWrite,
    RemoteProgressStore, StorageError,
};
pub use sqlite::{SqliteInitError, SqliteProgressCache};

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod playback;
pub mod player;
pub mod reconciler;

pub use course_core::Clock;

pub use api::{CourseApiClient, CourseCatalog, InMemoryCatalog, ProgressApiClient};
pub use config::ApiConfig;
pub use error::{CatalogError, PlayerError};
pub use playback::{
    PlaybackTracker, RemoteWriteQueue, SessionPhase, SessionStart, TickEffects,
    REMOTE_WRITE_INTERVAL_SECS,
};
pub use player::{ModuleSwitch, PlayerController, PlayerEvent};
pub use reconciler::{ProgressReconciler, ReconciledProgress};

mod remote_queue;
mod tracker;

// Public API of the playback subsystem.
pub use remote_queue::RemoteWriteQueue;
pub use tracker::{
    PlaybackTracker, SessionPhase, SessionStart, TickEffects, REMOTE_WRITE_INTERVAL_SECS,
};

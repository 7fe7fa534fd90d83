mod controller;
mod player;
mod watcher;

// Public API of the lesson playback subsystem.
pub use crate::error::WatchError;
pub use controller::PlaybackController;
pub use player::{Player, PlayerError, PlayerEvent};
pub use watcher::{
    EndOutcome, LessonContext, LessonWatchHandle, LessonWatcher, PollOutcome, WatchReport,
};

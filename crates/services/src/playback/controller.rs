use std::sync::Arc;

use course_core::model::LessonId;
use tokio::sync::mpsc;

use super::player::{Player, PlayerEvent};
use super::watcher::{LessonContext, LessonWatchHandle, LessonWatcher, WatchReport};
use crate::config::EngineConfig;
use crate::error::WatchError;
use crate::progress::CompletionRecorder;

/// Keeps exactly one lesson watch alive for a lesson view.
///
/// Opening another lesson stops the previous watch before the new one
/// starts, so the validated position always restarts at zero.
pub struct PlaybackController {
    recorder: CompletionRecorder,
    config: EngineConfig,
    active: Option<LessonWatchHandle>,
}

impl PlaybackController {
    #[must_use]
    pub fn new(recorder: CompletionRecorder, config: EngineConfig) -> Self {
        Self {
            recorder,
            config,
            active: None,
        }
    }

    #[must_use]
    pub fn active_lesson(&self) -> Option<LessonId> {
        self.active.as_ref().map(LessonWatchHandle::lesson_id)
    }

    /// Start watching `context.lesson_id`, replacing any previous watch.
    ///
    /// Returns the report of the watch that was replaced.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Playback` if the configured tolerance is invalid.
    pub async fn open_lesson(
        &mut self,
        context: LessonContext,
        player: Arc<dyn Player>,
        events: mpsc::UnboundedReceiver<PlayerEvent>,
    ) -> Result<Option<WatchReport>, WatchError> {
        let previous = self.close().await;
        let watcher = LessonWatcher::new(context, self.recorder.clone(), &self.config)?;
        self.active = Some(watcher.spawn(player, events, self.config.poll_interval));
        tracing::debug!(lesson_id = %context.lesson_id, "lesson opened");
        Ok(previous)
    }

    /// Stop the current watch, if any.
    pub async fn close(&mut self) -> Option<WatchReport> {
        let handle = self.active.take()?;
        handle.stop().await
    }
}

use std::sync::Arc;
use std::time::Duration;

use course_core::model::{CourseId, LessonId, UserId};
use course_core::playback::{PlaybackMonitor, PositionVerdict};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::player::{Player, PlayerEvent};
use crate::config::EngineConfig;
use crate::error::WatchError;
use crate::progress::{CompletionOutcome, CompletionRecorder};

/// Who is watching what.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonContext {
    /// `None` when nobody is signed in; playback is still policed but
    /// nothing is persisted.
    pub user_id: Option<UserId>,
    pub lesson_id: LessonId,
    pub course_id: CourseId,
}

/// Result of one poll of the player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollOutcome {
    /// Player had no position yet; the tick was skipped.
    NotReady,
    Sampled(PositionVerdict),
}

/// What happened when the player reported the end of the media.
#[derive(Debug, Clone, PartialEq)]
pub enum EndOutcome {
    Completed(CompletionOutcome),
    /// The end was reached by skipping. The player was sent back to `seek_to`.
    Rejected { seek_to: f64 },
    /// Completion was already handled during this watch.
    AlreadyHandled,
    /// Player could not report a duration.
    NotReady,
}

/// Final state of a watch, returned when it stops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchReport {
    pub lesson_id: LessonId,
    pub last_valid: f64,
    pub completed: bool,
    pub rejected_skips: u32,
}

/// Per-lesson watch state: the anti-skip monitor plus persistence bookkeeping.
///
/// `poll` is synchronous so it can be driven by any timer; persistence lives
/// in the async methods.
pub struct LessonWatcher {
    context: LessonContext,
    monitor: PlaybackMonitor,
    recorder: CompletionRecorder,
    checkpoint_every: f64,
    last_checkpoint: Option<f64>,
    pending_checkpoint: Option<f64>,
    completion_handled: bool,
    rejected_skips: u32,
}

impl LessonWatcher {
    /// # Errors
    ///
    /// Returns `WatchError::Playback` for an invalid skip tolerance.
    pub fn new(
        context: LessonContext,
        recorder: CompletionRecorder,
        config: &EngineConfig,
    ) -> Result<Self, WatchError> {
        Ok(Self {
            context,
            monitor: PlaybackMonitor::new(context.lesson_id, config.skip_tolerance_secs)?,
            recorder,
            checkpoint_every: config.position_checkpoint_secs,
            last_checkpoint: None,
            pending_checkpoint: None,
            completion_handled: false,
            rejected_skips: 0,
        })
    }

    #[must_use]
    pub fn context(&self) -> LessonContext {
        self.context
    }

    #[must_use]
    pub fn last_valid(&self) -> f64 {
        self.monitor.last_valid()
    }

    /// Sample the player once. Skips are undone immediately by seeking back.
    pub fn poll(&mut self, player: &dyn Player) -> PollOutcome {
        let Ok(position) = player.current_position() else {
            return PollOutcome::NotReady;
        };

        let verdict = self.monitor.observe(position);
        match verdict {
            PositionVerdict::SkipRejected { reported, seek_to } => {
                self.rejected_skips += 1;
                tracing::info!(
                    lesson_id = %self.context.lesson_id,
                    reported,
                    seek_to,
                    "skip rejected"
                );
                if let Err(err) = player.seek_to(seek_to) {
                    tracing::warn!(error = %err, "seek back failed");
                }
            }
            PositionVerdict::Advanced { to, .. } => {
                let due = self
                    .last_checkpoint
                    .is_none_or(|saved| to - saved >= self.checkpoint_every);
                if due {
                    self.pending_checkpoint = Some(to);
                }
            }
            PositionVerdict::Held => {}
        }
        PollOutcome::Sampled(verdict)
    }

    /// Persist the validated position if a checkpoint is due.
    ///
    /// Returns whether anything was written. A failed write leaves the last
    /// checkpoint where it was, so the next advance retries it.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Progress` if the write fails.
    pub async fn flush_checkpoint(&mut self) -> Result<bool, WatchError> {
        let Some(position) = self.pending_checkpoint.take() else {
            return Ok(false);
        };
        let stored = self
            .recorder
            .record_position(
                self.context.user_id,
                self.context.lesson_id,
                self.context.course_id,
                position,
            )
            .await?;
        self.last_checkpoint = Some(position);
        Ok(stored.is_some())
    }

    /// React to the player reaching the end of the media.
    ///
    /// Completion is recorded only if the learner actually watched up to the
    /// end, and at most once per watch.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Progress` if the completion write fails. The
    /// next `Ended` event retries it.
    pub async fn handle_ended(&mut self, player: &dyn Player) -> Result<EndOutcome, WatchError> {
        if self.completion_handled {
            return Ok(EndOutcome::AlreadyHandled);
        }
        let Ok(duration) = player.duration() else {
            return Ok(EndOutcome::NotReady);
        };

        if !self.monitor.accepts_completion(duration) {
            let seek_to = self.monitor.last_valid();
            tracing::info!(
                lesson_id = %self.context.lesson_id,
                duration,
                seek_to,
                "end reached by skipping"
            );
            if let Err(err) = player.seek_to(seek_to) {
                tracing::warn!(error = %err, "seek back failed");
            }
            return Ok(EndOutcome::Rejected { seek_to });
        }

        let outcome = self
            .recorder
            .record_completion(
                self.context.user_id,
                self.context.lesson_id,
                self.context.course_id,
                duration,
            )
            .await?;
        self.completion_handled = true;
        Ok(EndOutcome::Completed(outcome))
    }

    #[must_use]
    pub fn report(&self) -> WatchReport {
        WatchReport {
            lesson_id: self.context.lesson_id,
            last_valid: self.monitor.last_valid(),
            completed: self.completion_handled,
            rejected_skips: self.rejected_skips,
        }
    }

    /// Run the watch on its own task until the handle stops or drops it.
    #[must_use]
    pub fn spawn(
        self,
        player: Arc<dyn Player>,
        events: mpsc::UnboundedReceiver<PlayerEvent>,
        poll_interval: Duration,
    ) -> LessonWatchHandle {
        let lesson_id = self.context.lesson_id;
        let (cancel, cancelled) = oneshot::channel();
        let task = tokio::spawn(self.run(player, events, poll_interval, cancelled));
        LessonWatchHandle {
            lesson_id,
            cancel: Some(cancel),
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        player: Arc<dyn Player>,
        mut events: mpsc::UnboundedReceiver<PlayerEvent>,
        poll_interval: Duration,
        mut cancelled: oneshot::Receiver<()>,
    ) -> WatchReport {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;

        tracing::debug!(lesson_id = %self.context.lesson_id, "lesson watch started");
        loop {
            tokio::select! {
                _ = &mut cancelled => break,
                _ = ticker.tick() => self.poll_and_checkpoint(player.as_ref()).await,
                event = events.recv(), if events_open => match event {
                    Some(PlayerEvent::Ready) => self.poll_and_checkpoint(player.as_ref()).await,
                    Some(PlayerEvent::Ended) => self.on_ended(player.as_ref()).await,
                    None => events_open = false,
                },
            }
        }

        let report = self.report();
        tracing::debug!(
            lesson_id = %report.lesson_id,
            last_valid = report.last_valid,
            completed = report.completed,
            "lesson watch stopped"
        );
        report
    }

    async fn poll_and_checkpoint(&mut self, player: &dyn Player) {
        self.poll(player);
        if let Err(err) = self.flush_checkpoint().await {
            tracing::warn!(lesson_id = %self.context.lesson_id, error = %err, "checkpoint failed");
        }
    }

    async fn on_ended(&mut self, player: &dyn Player) {
        // Count the final stretch before judging the end.
        self.poll_and_checkpoint(player).await;
        match self.handle_ended(player).await {
            Ok(outcome) => {
                tracing::debug!(lesson_id = %self.context.lesson_id, ?outcome, "player ended");
            }
            Err(err) => {
                tracing::warn!(lesson_id = %self.context.lesson_id, error = %err, "completion failed");
            }
        }
    }
}

/// Owner of a running watch. Dropping it aborts the task.
#[derive(Debug)]
pub struct LessonWatchHandle {
    lesson_id: LessonId,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<WatchReport>>,
}

impl LessonWatchHandle {
    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    /// Stop the loop and wait for it to exit. No poll runs after this returns.
    pub async fn stop(mut self) -> Option<WatchReport> {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl Drop for LessonWatchHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

use std::sync::Arc;

use course_core::model::{CourseId, LessonId, LessonProgress, UserId};
use storage::repository::LessonProgressRepository;

use crate::Clock;
use crate::error::ProgressServiceError;
use crate::events::ProgressBus;

/// What a completion request ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// The lesson is now completed and listeners were notified.
    Recorded(LessonProgress),
    /// Nothing to do; the stored record already says completed.
    AlreadyCompleted(LessonProgress),
    /// No signed-in learner, so nothing was written.
    Unauthenticated,
}

impl CompletionOutcome {
    #[must_use]
    pub fn progress(&self) -> Option<&LessonProgress> {
        match self {
            Self::Recorded(progress) | Self::AlreadyCompleted(progress) => Some(progress),
            Self::Unauthenticated => None,
        }
    }
}

/// Persists lesson positions and completions.
#[derive(Clone)]
pub struct CompletionRecorder {
    clock: Clock,
    progress: Arc<dyn LessonProgressRepository>,
    bus: ProgressBus,
}

impl CompletionRecorder {
    #[must_use]
    pub fn new(clock: Clock, progress: Arc<dyn LessonProgressRepository>, bus: ProgressBus) -> Self {
        Self {
            clock,
            progress,
            bus,
        }
    }

    #[must_use]
    pub fn bus(&self) -> &ProgressBus {
        &self.bus
    }

    /// Mark a lesson as watched to the end.
    ///
    /// Safe to call any number of times: once a record is completed, later
    /// calls leave it alone and return `AlreadyCompleted`. A missing user is
    /// skipped without an error.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError` if `duration` is invalid or storage fails.
    pub async fn record_completion(
        &self,
        user_id: Option<UserId>,
        lesson_id: LessonId,
        course_id: CourseId,
        duration: f64,
    ) -> Result<CompletionOutcome, ProgressServiceError> {
        let Some(user_id) = user_id else {
            tracing::debug!(%lesson_id, "skipping completion without a signed-in user");
            return Ok(CompletionOutcome::Unauthenticated);
        };

        let existing = self.progress.get_progress(user_id, lesson_id).await?;
        if let Some(progress) = existing.as_ref().filter(|p| p.is_completed()) {
            return Ok(CompletionOutcome::AlreadyCompleted(progress.clone()));
        }

        let mut progress =
            existing.unwrap_or_else(|| LessonProgress::started(user_id, lesson_id, course_id));
        progress.complete(duration, self.clock.now())?;
        let stored = self.progress.upsert_progress(&progress).await?;

        tracing::info!(%user_id, %lesson_id, %course_id, "lesson completed");
        self.bus.publish();
        Ok(CompletionOutcome::Recorded(stored))
    }

    /// Save the furthest validated position so a reload can resume there.
    ///
    /// Storage keeps the larger of the stored and incoming positions, so an
    /// out-of-order write never moves the record backwards.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError` if `position` is invalid or storage fails.
    pub async fn record_position(
        &self,
        user_id: Option<UserId>,
        lesson_id: LessonId,
        course_id: CourseId,
        position: f64,
    ) -> Result<Option<LessonProgress>, ProgressServiceError> {
        let Some(user_id) = user_id else {
            return Ok(None);
        };

        let mut progress = LessonProgress::started(user_id, lesson_id, course_id);
        progress.record_position(position)?;
        let stored = self.progress.upsert_progress(&progress).await?;
        tracing::debug!(
            %lesson_id,
            position = stored.last_validated_position(),
            "position checkpoint"
        );
        Ok(Some(stored))
    }

    /// Stored progress for one lesson, if any.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` on read failure.
    pub async fn lesson_progress(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, ProgressServiceError> {
        Ok(self.progress.get_progress(user_id, lesson_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    fn recorder() -> (CompletionRecorder, ProgressBus) {
        let bus = ProgressBus::new(8);
        let recorder =
            CompletionRecorder::new(fixed_clock(), Arc::new(InMemoryRepository::new()), bus.clone());
        (recorder, bus)
    }

    #[tokio::test]
    async fn completion_is_idempotent() {
        let (recorder, bus) = recorder();
        let mut listener = bus.subscribe();
        let user = Some(UserId::random());
        let lesson = LessonId::new(1);
        let course = CourseId::new(1);

        let first = recorder
            .record_completion(user, lesson, course, 100.0)
            .await
            .unwrap();
        let CompletionOutcome::Recorded(progress) = &first else {
            panic!("expected a new completion, got {first:?}");
        };
        assert!(progress.is_completed());
        assert_eq!(progress.last_validated_position(), 100.0);
        assert_eq!(progress.completed_at(), Some(fixed_now()));
        assert!(listener.try_changed());

        let second = recorder
            .record_completion(user, lesson, course, 100.0)
            .await
            .unwrap();
        assert_eq!(second, CompletionOutcome::AlreadyCompleted(progress.clone()));
        assert!(!listener.try_changed());
    }

    #[tokio::test]
    async fn missing_user_is_skipped() {
        let (recorder, bus) = recorder();
        let mut listener = bus.subscribe();
        let outcome = recorder
            .record_completion(None, LessonId::new(1), CourseId::new(1), 10.0)
            .await
            .unwrap();
        assert_eq!(outcome, CompletionOutcome::Unauthenticated);
        assert!(!listener.try_changed());
    }

    #[tokio::test]
    async fn positions_never_move_backwards() {
        let (recorder, _bus) = recorder();
        let user = UserId::random();
        let lesson = LessonId::new(4);
        let course = CourseId::new(1);

        recorder
            .record_position(Some(user), lesson, course, 42.0)
            .await
            .unwrap();
        let stored = recorder
            .record_position(Some(user), lesson, course, 12.0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_validated_position(), 42.0);
        assert!(!stored.is_completed());
    }

    #[tokio::test]
    async fn completion_after_checkpoints_keeps_the_row() {
        let (recorder, _bus) = recorder();
        let user = UserId::random();
        let lesson = LessonId::new(2);
        let course = CourseId::new(1);

        recorder
            .record_position(Some(user), lesson, course, 80.0)
            .await
            .unwrap();
        recorder
            .record_completion(Some(user), lesson, course, 90.0)
            .await
            .unwrap();
        let stored = recorder.lesson_progress(user, lesson).await.unwrap().unwrap();
        assert!(stored.is_completed());
        assert_eq!(stored.last_validated_position(), 90.0);
    }
}

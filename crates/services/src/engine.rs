use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::config::EngineConfig;
use crate::error::EngineServicesError;
use crate::events::ProgressBus;
use crate::playback::PlaybackController;
use crate::progress::{CompletionRecorder, CourseProgressService};
use crate::quiz::{QuizRunner, QuizRunnerHandle, QuizService, QuizSession};

/// Assembles the engine services over one storage backend and one bus.
#[derive(Clone)]
pub struct EngineServices {
    config: EngineConfig,
    bus: ProgressBus,
    recorder: Arc<CompletionRecorder>,
    course_progress: Arc<CourseProgressService>,
    quizzes: Arc<QuizService>,
}

impl EngineServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `EngineServicesError` if the config is invalid or storage
    /// initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: EngineConfig,
    ) -> Result<Self, EngineServicesError> {
        config.validate()?;
        let storage = Storage::sqlite(db_url).await?;
        Self::from_storage(&storage, clock, config)
    }

    /// Build services over an existing storage aggregate.
    ///
    /// # Errors
    ///
    /// Returns `EngineServicesError::Config` if the config is invalid.
    pub fn from_storage(
        storage: &Storage,
        clock: Clock,
        config: EngineConfig,
    ) -> Result<Self, EngineServicesError> {
        config.validate()?;
        let bus = ProgressBus::new(config.bus_capacity);
        let recorder = Arc::new(CompletionRecorder::new(
            clock,
            Arc::clone(&storage.progress),
            bus.clone(),
        ));
        let course_progress = Arc::new(CourseProgressService::new(
            Arc::clone(&storage.progress),
            Arc::clone(&storage.lessons),
        ));
        let quizzes = Arc::new(
            QuizService::new(
                clock,
                Arc::clone(&storage.quizzes),
                Arc::clone(&storage.attempts),
            )
            .with_config(&config),
        );

        Ok(Self {
            config,
            bus,
            recorder,
            course_progress,
            quizzes,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn bus(&self) -> ProgressBus {
        self.bus.clone()
    }

    #[must_use]
    pub fn recorder(&self) -> Arc<CompletionRecorder> {
        Arc::clone(&self.recorder)
    }

    #[must_use]
    pub fn course_progress(&self) -> Arc<CourseProgressService> {
        Arc::clone(&self.course_progress)
    }

    #[must_use]
    pub fn quizzes(&self) -> Arc<QuizService> {
        Arc::clone(&self.quizzes)
    }

    /// A fresh controller for one lesson view.
    #[must_use]
    pub fn playback_controller(&self) -> PlaybackController {
        PlaybackController::new(self.recorder.as_ref().clone(), self.config.clone())
    }

    /// Run `session` on its own task with the configured countdown tick.
    #[must_use]
    pub fn run_quiz(&self, session: QuizSession) -> QuizRunnerHandle {
        QuizRunner::new(self.quizzes.as_ref().clone(), session, self.config.countdown_tick).spawn()
    }
}

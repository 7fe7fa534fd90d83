use std::sync::Arc;
use std::time::Duration;

use course_core::model::{CourseId, QuizAttempt, QuizDefinition, UserId};
use rand::Rng;
use rand::seq::SliceRandom;
use storage::repository::{QuizAttemptRepository, QuizRepository, StorageError};

use super::gate::AttemptGate;
use super::session::{Durability, QuizSession, QuizStage};
use crate::Clock;
use crate::config::EngineConfig;
use crate::error::QuizError;

/// Copy of `quiz` with each question's options in a fresh random order.
///
/// Question order and every option's correctness are untouched; only the
/// returned copy is reordered.
///
/// # Errors
///
/// Returns `QuizError::Definition` if the copy fails validation, which
/// reordering alone cannot cause.
pub fn shuffled_copy<R: Rng + ?Sized>(
    quiz: &QuizDefinition,
    rng: &mut R,
) -> Result<QuizDefinition, QuizError> {
    let questions = quiz
        .questions()
        .iter()
        .map(|question| {
            let mut question = question.clone();
            question.options.shuffle(rng);
            question
        })
        .collect();
    Ok(QuizDefinition::new(
        quiz.id(),
        quiz.course_id(),
        quiz.title(),
        questions,
    )?)
}

/// Starts quiz sessions and persists their single attempt.
#[derive(Clone)]
pub struct QuizService {
    clock: Clock,
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn QuizAttemptRepository>,
    gate: AttemptGate,
    question_seconds: u32,
    persist_timeout: Duration,
    shuffle_options: bool,
}

impl QuizService {
    #[must_use]
    pub fn new(
        clock: Clock,
        quizzes: Arc<dyn QuizRepository>,
        attempts: Arc<dyn QuizAttemptRepository>,
    ) -> Self {
        let config = EngineConfig::default();
        Self {
            clock,
            quizzes,
            gate: AttemptGate::new(Arc::clone(&attempts)),
            attempts,
            question_seconds: config.question_seconds,
            persist_timeout: config.persist_timeout,
            shuffle_options: true,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.question_seconds = config.question_seconds;
        self.persist_timeout = config.persist_timeout;
        self
    }

    /// Keep options in authoring order. Useful for deterministic tests.
    #[must_use]
    pub fn with_shuffle_options(mut self, shuffle_options: bool) -> Self {
        self.shuffle_options = shuffle_options;
        self
    }

    #[must_use]
    pub fn gate(&self) -> &AttemptGate {
        &self.gate
    }

    /// Resolve the `Loading` stage for the course's latest quiz.
    ///
    /// The session comes back `NotAvailable`, `AttemptBlocked`, or
    /// `InProgress` with its first countdown running.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Storage` if the quiz or the prior attempt cannot
    /// be read. Nothing is written, so the call can simply be retried.
    pub async fn start(&self, user_id: UserId, course_id: CourseId) -> Result<QuizSession, QuizError> {
        let mut session = QuizSession::loading(user_id, course_id, self.question_seconds);

        let Some(quiz) = self.quizzes.latest_quiz_for_course(course_id).await? else {
            tracing::debug!(%course_id, "no quiz for course");
            session.mark_not_available();
            return Ok(session);
        };
        if !quiz.is_available() {
            tracing::debug!(%course_id, quiz_id = %quiz.id(), "quiz has no questions");
            session.mark_not_available();
            return Ok(session);
        }

        if let Some(prior) = self.gate.has_attempted(user_id, quiz.id()).await? {
            tracing::debug!(%user_id, quiz_id = %quiz.id(), "quiz already attempted");
            session.block(quiz, prior);
            return Ok(session);
        }

        let quiz = if self.shuffle_options {
            shuffled_copy(&quiz, &mut rand::rng())?
        } else {
            quiz
        };
        tracing::info!(%user_id, quiz_id = %quiz.id(), questions = quiz.question_count(), "quiz started");
        session.begin(quiz);
        Ok(session)
    }

    /// Persist a session that reached `Grading` and move it on.
    ///
    /// Waits at most the configured persist timeout. A duplicate attempt
    /// lands in `AttemptBlocked`; any other failure lands in
    /// `Finished` with `Durability::Unsaved`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NotGrading` if the session is not in `Grading`.
    pub async fn grade(&self, session: &mut QuizSession) -> Result<QuizStage, QuizError> {
        let attempt = session.prepare_attempt(self.clock.now())?;
        self.persist(session, attempt).await;
        Ok(*session.stage())
    }

    /// Retry saving a result that finished unsaved.
    ///
    /// This is useful when the write at grading time failed (e.g. a
    /// transient storage error).
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NothingToSave` unless the session finished with
    /// `Durability::Unsaved`.
    pub async fn retry_save(&self, session: &mut QuizSession) -> Result<QuizStage, QuizError> {
        let unsaved = matches!(
            session.stage(),
            QuizStage::Finished(result) if result.durability == Durability::Unsaved
        );
        if !unsaved {
            return Err(QuizError::NothingToSave);
        }
        let attempt = session
            .pending_attempt()
            .cloned()
            .ok_or(QuizError::NothingToSave)?;
        self.persist(session, attempt).await;
        Ok(*session.stage())
    }

    async fn persist(&self, session: &mut QuizSession, attempt: QuizAttempt) {
        let score = attempt.score();
        let write = tokio::time::timeout(self.persist_timeout, self.attempts.insert_attempt(&attempt));
        match write.await {
            Ok(Ok(stored)) => {
                tracing::info!(
                    user_id = %stored.user_id(),
                    quiz_id = %stored.quiz_id(),
                    percent = score.percent(),
                    passed = score.passed(),
                    "quiz attempt saved"
                );
                session.finish(score, Durability::Saved);
            }
            Ok(Err(StorageError::Conflict)) => self.resolve_conflict(session, &attempt).await,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "quiz attempt not saved");
                session.finish(score, Durability::Unsaved);
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.persist_timeout, "quiz attempt save timed out");
                session.mark_write_uncertain();
                session.finish(score, Durability::Unsaved);
            }
        }
    }

    // A conflict means a row already exists. After a timed-out write it may be
    // this very attempt; otherwise another session got there first.
    async fn resolve_conflict(&self, session: &mut QuizSession, attempt: &QuizAttempt) {
        let score = attempt.score();
        match self.attempts.get_attempt(attempt.user_id(), attempt.quiz_id()).await {
            Ok(Some(stored))
                if session.write_uncertain()
                    && stored.score() == score
                    && stored.created_at() == attempt.created_at() =>
            {
                session.finish(score, Durability::Saved);
            }
            Ok(Some(stored)) => {
                tracing::info!(quiz_id = %attempt.quiz_id(), "attempt already recorded elsewhere");
                session.block_after_conflict(stored.summary());
            }
            Ok(None) => {
                tracing::warn!(quiz_id = %attempt.quiz_id(), "conflict without a stored attempt");
                session.finish(score, Durability::Unsaved);
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not read the conflicting attempt");
                session.finish(score, Durability::Unsaved);
            }
        }
    }
}

use chrono::{DateTime, Utc};
use course_core::model::{
    AttemptSummary, CourseId, OptionId, Question, QuestionId, QuizAttempt, QuizDefinition, QuizId,
    Score, UserId,
};

use super::countdown::{Countdown, CountdownTick};
use crate::error::QuizError;

//
// ─── STAGES ────────────────────────────────────────────────────────────────────
//

/// Whether the graded attempt reached storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    Saved,
    /// The write failed or timed out. The score is shown, and
    /// `QuizService::retry_save` can try again.
    Unsaved,
}

/// Final score plus whether it was persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizResult {
    pub score: Score,
    pub durability: Durability,
}

impl QuizResult {
    #[must_use]
    pub fn is_saved(&self) -> bool {
        self.durability == Durability::Saved
    }

    /// Passing scores get a celebration. Purely cosmetic.
    #[must_use]
    pub fn celebrate(&self) -> bool {
        self.score.passed()
    }
}

/// Where a quiz session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizStage {
    Loading,
    /// The course has no quiz, or the quiz has no questions.
    NotAvailable,
    /// The learner already took this quiz.
    AttemptBlocked(AttemptSummary),
    InProgress,
    /// All questions answered; the attempt is being saved.
    Grading(Score),
    Finished(QuizResult),
}

impl QuizStage {
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    /// No further learner input changes the outcome.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NotAvailable | Self::AttemptBlocked(_) | Self::Finished(_)
        )
    }
}

//
// ─── ANSWERS ───────────────────────────────────────────────────────────────────
//

/// How one question was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub question_id: QuestionId,
    pub selected: Option<OptionId>,
    pub correct: bool,
    /// The countdown ran out before the learner confirmed.
    pub timed_out: bool,
}

/// Result of moving past a locked question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    NextQuestion { index: usize },
    ReadyToGrade(Score),
}

/// The per-question view state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizSessionState {
    pub current_question_index: usize,
    pub selected_option_id: Option<OptionId>,
    pub answer_locked: bool,
    pub correct_count: u32,
    pub remaining_seconds: u32,
}

/// Everything a view needs to render the session.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizSnapshot {
    pub stage: QuizStage,
    pub state: QuizSessionState,
    pub total_questions: usize,
    pub question: Option<Question>,
    /// Generic message for the last rejected action, if any.
    pub notice: Option<&'static str>,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One learner's single attempt at a course quiz.
///
/// Created by `QuizService::start`, which resolves the `Loading` stage.
/// Every method here is synchronous; only grading touches storage.
#[derive(Debug, Clone)]
pub struct QuizSession {
    user_id: UserId,
    course_id: CourseId,
    quiz: Option<QuizDefinition>,
    stage: QuizStage,
    current: usize,
    selected: Option<OptionId>,
    locked: bool,
    answers: Vec<AnswerOutcome>,
    countdown: Countdown,
    pending_attempt: Option<QuizAttempt>,
    write_uncertain: bool,
}

impl QuizSession {
    pub(crate) fn loading(user_id: UserId, course_id: CourseId, question_seconds: u32) -> Self {
        Self {
            user_id,
            course_id,
            quiz: None,
            stage: QuizStage::Loading,
            current: 0,
            selected: None,
            locked: false,
            answers: Vec::new(),
            countdown: Countdown::new(question_seconds),
            pending_attempt: None,
            write_uncertain: false,
        }
    }

    pub(crate) fn mark_not_available(&mut self) {
        self.stage = QuizStage::NotAvailable;
    }

    pub(crate) fn block(&mut self, quiz: QuizDefinition, prior: AttemptSummary) {
        self.quiz = Some(quiz);
        self.stage = QuizStage::AttemptBlocked(prior);
    }

    /// Enter `InProgress` with an already shuffled copy of the quiz.
    pub(crate) fn begin(&mut self, quiz: QuizDefinition) {
        if !quiz.is_available() {
            self.stage = QuizStage::NotAvailable;
            return;
        }
        self.quiz = Some(quiz);
        self.stage = QuizStage::InProgress;
        self.countdown.restart();
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn quiz_id(&self) -> Option<QuizId> {
        self.quiz.as_ref().map(QuizDefinition::id)
    }

    /// The learner's copy of the quiz, options already shuffled.
    #[must_use]
    pub fn quiz(&self) -> Option<&QuizDefinition> {
        self.quiz.as_ref()
    }

    #[must_use]
    pub fn stage(&self) -> &QuizStage {
        &self.stage
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.quiz.as_ref().map_or(0, QuizDefinition::question_count)
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        if !self.stage.is_in_progress() {
            return None;
        }
        self.quiz.as_ref()?.questions().get(self.current)
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    #[must_use]
    pub fn answers(&self) -> &[AnswerOutcome] {
        &self.answers
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        let correct = self.answers.iter().filter(|a| a.correct).count();
        u32::try_from(correct).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn state(&self) -> QuizSessionState {
        QuizSessionState {
            current_question_index: self.current,
            selected_option_id: self.selected,
            answer_locked: self.locked,
            correct_count: self.correct_count(),
            remaining_seconds: self.countdown.remaining(),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> QuizSnapshot {
        QuizSnapshot {
            stage: self.stage,
            state: self.state(),
            total_questions: self.total_questions(),
            question: self.current_question().cloned(),
            notice: None,
        }
    }

    /// Highlight an option on the current question.
    ///
    /// # Errors
    ///
    /// Fails when the quiz is not in progress, the answer is locked, or the
    /// option is not on the current question.
    pub fn select_option(&mut self, option_id: OptionId) -> Result<(), QuizError> {
        self.ensure_unlocked()?;
        let question = self.current_question().ok_or(QuizError::NotInProgress)?;
        if question.option(option_id).is_none() {
            return Err(QuizError::UnknownOption(option_id));
        }
        self.selected = Some(option_id);
        Ok(())
    }

    /// Lock the selected option in and score it.
    ///
    /// # Errors
    ///
    /// Fails when the quiz is not in progress, the answer is already locked,
    /// or nothing is selected.
    pub fn confirm_answer(&mut self) -> Result<AnswerOutcome, QuizError> {
        self.ensure_unlocked()?;
        if self.selected.is_none() {
            return Err(QuizError::NothingSelected);
        }
        self.lock(false)
    }

    /// One second passed on the current question.
    ///
    /// Returns the locked outcome when this tick ran the countdown out. A
    /// timed out question always counts as incorrect.
    pub fn tick(&mut self) -> Option<AnswerOutcome> {
        if !self.stage.is_in_progress() || self.locked {
            return None;
        }
        match self.countdown.tick() {
            CountdownTick::Expired => self.lock(true).ok(),
            CountdownTick::Running { .. } | CountdownTick::Idle => None,
        }
    }

    /// Move on from a locked question.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::AnswerNotLocked` before the answer is locked and
    /// `QuizError::NotInProgress` outside `InProgress`.
    pub fn advance(&mut self) -> Result<AdvanceOutcome, QuizError> {
        if !self.stage.is_in_progress() {
            return Err(QuizError::NotInProgress);
        }
        if !self.locked {
            return Err(QuizError::AnswerNotLocked);
        }

        let total = self.total_questions();
        if self.current + 1 < total {
            self.current += 1;
            self.selected = None;
            self.locked = false;
            self.countdown.restart();
            return Ok(AdvanceOutcome::NextQuestion {
                index: self.current,
            });
        }

        let total = u32::try_from(total).unwrap_or(u32::MAX);
        let score = Score::from_counts(self.correct_count(), total)?;
        self.stage = QuizStage::Grading(score);
        Ok(AdvanceOutcome::ReadyToGrade(score))
    }

    /// Leave the quiz. The countdown stops for good.
    ///
    /// Returns the result if the quiz was finished.
    pub fn exit(mut self) -> Option<QuizResult> {
        self.countdown.cancel();
        match self.stage {
            QuizStage::Finished(result) => Some(result),
            _ => None,
        }
    }

    /// Attempt to persist for the current grading, built once so retries
    /// write the same row.
    pub(crate) fn prepare_attempt(&mut self, now: DateTime<Utc>) -> Result<QuizAttempt, QuizError> {
        let QuizStage::Grading(score) = self.stage else {
            return Err(QuizError::NotGrading);
        };
        if let Some(attempt) = &self.pending_attempt {
            return Ok(attempt.clone());
        }
        let quiz_id = self.quiz_id().ok_or(QuizError::NotGrading)?;
        let attempt = QuizAttempt::new(self.user_id, quiz_id, score, now);
        self.pending_attempt = Some(attempt.clone());
        Ok(attempt)
    }

    pub(crate) fn pending_attempt(&self) -> Option<&QuizAttempt> {
        self.pending_attempt.as_ref()
    }

    /// A write timed out and may still have landed.
    pub(crate) fn mark_write_uncertain(&mut self) {
        self.write_uncertain = true;
    }

    pub(crate) fn write_uncertain(&self) -> bool {
        self.write_uncertain
    }

    pub(crate) fn finish(&mut self, score: Score, durability: Durability) {
        if durability == Durability::Saved {
            self.pending_attempt = None;
        }
        self.stage = QuizStage::Finished(QuizResult { score, durability });
    }

    pub(crate) fn block_after_conflict(&mut self, prior: AttemptSummary) {
        self.pending_attempt = None;
        self.stage = QuizStage::AttemptBlocked(prior);
    }

    fn ensure_unlocked(&self) -> Result<(), QuizError> {
        if !self.stage.is_in_progress() {
            return Err(QuizError::NotInProgress);
        }
        if self.locked {
            return Err(QuizError::AnswerLocked);
        }
        Ok(())
    }

    fn lock(&mut self, timed_out: bool) -> Result<AnswerOutcome, QuizError> {
        let question = self.current_question().ok_or(QuizError::NotInProgress)?;
        let correct = !timed_out && self.selected.is_some_and(|id| question.is_correct(id));
        let outcome = AnswerOutcome {
            question_id: question.id,
            selected: self.selected,
            correct,
            timed_out,
        };
        self.countdown.cancel();
        self.locked = true;
        self.answers.push(outcome);
        Ok(outcome)
    }
}

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{QuizId, UserId};

/// Minimum percentage required to pass a quiz.
pub const PASS_THRESHOLD: u8 = 70;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("cannot score a quiz with zero questions")]
    NoQuestions,

    #[error("correct answers ({correct}) exceed question count ({total})")]
    TooManyCorrect { correct: u32, total: u32 },

    #[error("score percent out of range: {0}")]
    PercentOutOfRange(i64),

    #[error("stored pass flag disagrees with score {percent}")]
    PassedMismatch { percent: u8 },
}

//
// ─── SCORE ────────────────────────────────────────────────────────────────────
//

/// Final quiz result: a whole percentage and the derived pass flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    percent: u8,
}

impl Score {
    /// Score `correct` out of `total`, rounding half up to a whole percent.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` when `total` is zero or `correct > total`.
    pub fn from_counts(correct: u32, total: u32) -> Result<Self, AttemptError> {
        if total == 0 {
            return Err(AttemptError::NoQuestions);
        }
        if correct > total {
            return Err(AttemptError::TooManyCorrect { correct, total });
        }
        // round(correct / total * 100) without going through floats.
        let numerator = 200 * u64::from(correct) + u64::from(total);
        let percent = numerator / (2 * u64::from(total));
        Ok(Self {
            percent: u8::try_from(percent).unwrap_or(100),
        })
    }

    /// # Errors
    ///
    /// Returns `AttemptError::PercentOutOfRange` outside `0..=100`.
    pub fn from_percent(percent: i64) -> Result<Self, AttemptError> {
        match u8::try_from(percent) {
            Ok(p) if p <= 100 => Ok(Self { percent: p }),
            _ => Err(AttemptError::PercentOutOfRange(percent)),
        }
    }

    #[must_use]
    pub fn percent(&self) -> u8 {
        self.percent
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.percent >= PASS_THRESHOLD
    }
}

//
// ─── ATTEMPT ──────────────────────────────────────────────────────────────────
//

/// The single scored pass a learner gets at a quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizAttempt {
    id: Option<i64>,
    user_id: UserId,
    quiz_id: QuizId,
    score: Score,
    created_at: DateTime<Utc>,
}

impl QuizAttempt {
    /// A not-yet-persisted attempt.
    #[must_use]
    pub fn new(user_id: UserId, quiz_id: QuizId, score: Score, created_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            user_id,
            quiz_id,
            score,
            created_at,
        }
    }

    /// Rehydrate an attempt from storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if the percent is out of range or the stored
    /// `passed` flag contradicts it.
    pub fn from_persisted(
        id: i64,
        user_id: UserId,
        quiz_id: QuizId,
        score_percent: i64,
        passed: bool,
        created_at: DateTime<Utc>,
    ) -> Result<Self, AttemptError> {
        let score = Score::from_percent(score_percent)?;
        if score.passed() != passed {
            return Err(AttemptError::PassedMismatch {
                percent: score.percent(),
            });
        }
        Ok(Self {
            id: Some(id),
            user_id,
            quiz_id,
            score,
            created_at,
        })
    }

    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn score(&self) -> Score {
        self.score
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// What the learner is shown when a second attempt is blocked.
    #[must_use]
    pub fn summary(&self) -> AttemptSummary {
        AttemptSummary {
            score: self.score,
            attempted_at: self.created_at,
        }
    }
}

/// Stored score and date of a prior attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptSummary {
    pub score: Score,
    pub attempted_at: DateTime<Utc>,
}

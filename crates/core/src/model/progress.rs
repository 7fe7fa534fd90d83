use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{CourseId, LessonId, UserId};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("position must be a finite, non-negative number of seconds, got {0}")]
    InvalidPosition(f64),

    #[error("completed lesson is missing completed_at")]
    MissingCompletedAt,

    #[error("incomplete lesson carries a completed_at timestamp")]
    UnexpectedCompletedAt,
}

fn validate_seconds(value: f64) -> Result<f64, ProgressError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ProgressError::InvalidPosition(value))
    }
}

/// Per-learner watch state for one lesson, keyed by `(user_id, lesson_id)`.
///
/// The position only ever moves forward and completion only ever flips from
/// false to true; every mutator here preserves both.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonProgress {
    user_id: UserId,
    lesson_id: LessonId,
    course_id: CourseId,
    last_validated_position: f64,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl LessonProgress {
    /// Fresh row created on the first accepted playback tick.
    #[must_use]
    pub fn started(user_id: UserId, lesson_id: LessonId, course_id: CourseId) -> Self {
        Self {
            user_id,
            lesson_id,
            course_id,
            last_validated_position: 0.0,
            is_completed: false,
            completed_at: None,
        }
    }

    /// Rehydrate progress from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the position is invalid or the completion
    /// flag disagrees with `completed_at`.
    pub fn from_persisted(
        user_id: UserId,
        lesson_id: LessonId,
        course_id: CourseId,
        last_validated_position: f64,
        is_completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressError> {
        let last_validated_position = validate_seconds(last_validated_position)?;
        match (is_completed, completed_at) {
            (true, None) => return Err(ProgressError::MissingCompletedAt),
            (false, Some(_)) => return Err(ProgressError::UnexpectedCompletedAt),
            _ => {}
        }
        Ok(Self {
            user_id,
            lesson_id,
            course_id,
            last_validated_position,
            is_completed,
            completed_at,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn last_validated_position(&self) -> f64 {
        self.last_validated_position
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Raise the validated position. Lower values are ignored.
    ///
    /// Returns `true` if the stored position moved.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidPosition` for NaN, infinite, or negative input.
    pub fn record_position(&mut self, position: f64) -> Result<bool, ProgressError> {
        let position = validate_seconds(position)?;
        if position > self.last_validated_position {
            self.last_validated_position = position;
            return Ok(true);
        }
        Ok(false)
    }

    /// Mark the lesson watched to the end.
    ///
    /// Returns `false` and leaves the record untouched when it was already
    /// completed, so repeated calls converge on the same state.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidPosition` if `duration` is not a valid
    /// number of seconds.
    pub fn complete(&mut self, duration: f64, now: DateTime<Utc>) -> Result<bool, ProgressError> {
        let duration = validate_seconds(duration)?;
        if self.is_completed {
            return Ok(false);
        }
        self.last_validated_position = self.last_validated_position.max(duration);
        self.is_completed = true;
        self.completed_at = Some(now);
        Ok(true)
    }

    /// Combine a stored row with an incoming write the way the upsert does:
    /// the furthest position wins, completion is sticky, and the first
    /// `completed_at` is kept.
    #[must_use]
    pub fn merged_with(&self, incoming: &LessonProgress) -> LessonProgress {
        let is_completed = self.is_completed || incoming.is_completed;
        LessonProgress {
            user_id: self.user_id,
            lesson_id: self.lesson_id,
            course_id: self.course_id,
            last_validated_position: self
                .last_validated_position
                .max(incoming.last_validated_position),
            is_completed,
            completed_at: self.completed_at.or(incoming.completed_at),
        }
    }
}

//! Anti-skip validation for lesson playback.
//!
//! The monitor holds the furthest position the learner is known to have
//! reached by actually watching. Forward movement within the tolerance is
//! accepted, anything further is a skip and must be undone by seeking back.
//! Rewinds and pauses are always fine.

use thiserror::Error;

use crate::model::LessonId;

/// Default forward slack, in seconds, between two polls.
pub const DEFAULT_SKIP_TOLERANCE_SECS: f64 = 2.0;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PlaybackError {
    #[error("skip tolerance must be a finite, non-negative number of seconds, got {0}")]
    InvalidTolerance(f64),
}

/// What the monitor decided about one position sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionVerdict {
    /// Normal forward playback; the validated position moved.
    Advanced { from: f64, to: f64 },
    /// Paused, rewound, or replaying already-watched content.
    Held,
    /// Jumped too far ahead. The player must be sought back to `seek_to`.
    SkipRejected { reported: f64, seek_to: f64 },
}

/// Validated furthest-watched position for the active lesson.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackMonitor {
    lesson_id: LessonId,
    last_valid: f64,
    tolerance: f64,
}

impl PlaybackMonitor {
    /// # Errors
    ///
    /// Returns `PlaybackError::InvalidTolerance` for NaN, infinite, or negative tolerance.
    pub fn new(lesson_id: LessonId, tolerance: f64) -> Result<Self, PlaybackError> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(PlaybackError::InvalidTolerance(tolerance));
        }
        Ok(Self {
            lesson_id,
            last_valid: 0.0,
            tolerance,
        })
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn last_valid(&self) -> f64 {
        self.last_valid
    }

    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Judge a reported playback position.
    ///
    /// Non-finite or negative samples come from a half-initialised player and
    /// are treated as `Held`.
    pub fn observe(&mut self, position: f64) -> PositionVerdict {
        if !position.is_finite() || position < 0.0 {
            return PositionVerdict::Held;
        }
        if position > self.last_valid + self.tolerance {
            return PositionVerdict::SkipRejected {
                reported: position,
                seek_to: self.last_valid,
            };
        }
        if position > self.last_valid {
            let from = self.last_valid;
            self.last_valid = position;
            return PositionVerdict::Advanced { from, to: position };
        }
        PositionVerdict::Held
    }

    /// Point the monitor at another lesson. The validated position restarts
    /// at zero; switching to the same lesson keeps it.
    ///
    /// Returns `true` if the lesson actually changed.
    pub fn switch_lesson(&mut self, lesson_id: LessonId) -> bool {
        if lesson_id == self.lesson_id {
            return false;
        }
        self.lesson_id = lesson_id;
        self.last_valid = 0.0;
        true
    }

    /// Whether an end-of-media event is backed by watched content: the
    /// validated position must be within tolerance of `duration`.
    #[must_use]
    pub fn accepts_completion(&self, duration: f64) -> bool {
        if !duration.is_finite() || duration < 0.0 {
            return false;
        }
        self.last_valid + self.tolerance >= duration
    }
}

//! Shared error types for the services crate.

use thiserror::Error;

use course_core::model::{AttemptError, OptionId, ProgressError, QuizDefinitionError};
use course_core::playback::PlaybackError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

use crate::config::ConfigError;

const RETRY_MESSAGE: &str = "Something went wrong. Please try again.";

/// Errors emitted by `CompletionRecorder` and `CourseProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProgressServiceError {
    /// Text safe to show a learner. Storage details stay in the logs.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Progress(_) => "This lesson position could not be recorded.",
            Self::Storage(_) => RETRY_MESSAGE,
        }
    }
}

/// Errors emitted while starting or driving a lesson watch.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WatchError {
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error(transparent)]
    Progress(#[from] ProgressServiceError),
}

/// Errors emitted by quiz sessions and `QuizService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz is not in progress")]
    NotInProgress,
    #[error("answer is already locked")]
    AnswerLocked,
    #[error("answer is not locked yet")]
    AnswerNotLocked,
    #[error("no option selected")]
    NothingSelected,
    #[error("option {0} does not belong to the current question")]
    UnknownOption(OptionId),
    #[error("quiz is not awaiting grading")]
    NotGrading,
    #[error("quiz result has nothing left to save")]
    NothingToSave,
    #[error(transparent)]
    Definition(#[from] QuizDefinitionError),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl QuizError {
    /// Text safe to show a learner. Storage details stay in the logs.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotInProgress | Self::NotGrading | Self::NothingToSave => {
                "This quiz is no longer active."
            }
            Self::AnswerLocked => "This question has already been answered.",
            Self::AnswerNotLocked => "Confirm your answer first.",
            Self::NothingSelected => "Pick an answer first.",
            Self::UnknownOption(_) => "That answer is not part of this question.",
            Self::Definition(_) | Self::Attempt(_) => "This quiz could not be loaded.",
            Self::Storage(_) => RETRY_MESSAGE,
        }
    }
}

/// Errors emitted while bootstrapping engine services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

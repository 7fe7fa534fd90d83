use std::sync::Arc;

use course_core::model::{AttemptSummary, QuizId, UserId};
use storage::repository::{QuizAttemptRepository, StorageError};

/// Looks up whether a learner already used their single attempt.
///
/// This is a fast path for showing the prior result. The storage uniqueness
/// constraint on `(user, quiz)` is what actually enforces the rule.
#[derive(Clone)]
pub struct AttemptGate {
    attempts: Arc<dyn QuizAttemptRepository>,
}

impl AttemptGate {
    #[must_use]
    pub fn new(attempts: Arc<dyn QuizAttemptRepository>) -> Self {
        Self { attempts }
    }

    /// Prior attempt's score and date, if there is one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failure.
    pub async fn has_attempted(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<Option<AttemptSummary>, StorageError> {
        let attempt = self.attempts.get_attempt(user_id, quiz_id).await?;
        Ok(attempt.as_ref().map(|a| a.summary()))
    }
}

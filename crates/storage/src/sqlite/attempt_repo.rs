use course_core::model::{QuizAttempt, QuizId, UserId};

use super::{
    SqliteRepository, db_err,
    mapping::{id_i64, map_attempt_row},
};
use crate::repository::{QuizAttemptRepository, StorageError};

#[async_trait::async_trait]
impl QuizAttemptRepository for SqliteRepository {
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<QuizAttempt, StorageError> {
        let quiz_id = id_i64("quiz_id", attempt.quiz_id().value())?;

        // Plain INSERT: a second attempt must fail on UNIQUE (user_id, quiz_id), never overwrite.
        let res = sqlx::query(
            r"
                INSERT INTO quiz_attempts (user_id, quiz_id, score_percent, passed, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(attempt.user_id().to_string())
        .bind(quiz_id)
        .bind(i64::from(attempt.score().percent()))
        .bind(attempt.score().passed())
        .bind(attempt.created_at())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(attempt.clone().with_id(res.last_insert_rowid()))
    }

    async fn get_attempt(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<Option<QuizAttempt>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, user_id, quiz_id, score_percent, passed, created_at
                FROM quiz_attempts
                WHERE user_id = ?1 AND quiz_id = ?2
            ",
        )
        .bind(user_id.to_string())
        .bind(id_i64("quiz_id", quiz_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_attempt_row).transpose()
    }
}

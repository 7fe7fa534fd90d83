use course_core::model::{CourseId, LessonId, LessonProgress, UserId};

use super::{
    SqliteRepository, db_err,
    mapping::{id_i64, map_progress_row, u32_from_i64},
};
use crate::repository::{LessonProgressRepository, StorageError};

#[async_trait::async_trait]
impl LessonProgressRepository for SqliteRepository {
    async fn upsert_progress(
        &self,
        progress: &LessonProgress,
    ) -> Result<LessonProgress, StorageError> {
        let lesson_id = id_i64("lesson_id", progress.lesson_id().value())?;
        let course_id = id_i64("course_id", progress.course_id().value())?;

        let row = sqlx::query(
            r"
                INSERT INTO lesson_progress (
                    user_id, lesson_id, course_id,
                    last_validated_position, is_completed, completed_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(user_id, lesson_id) DO UPDATE SET
                    -- progress is monotonic: furthest position, sticky completion, first completion time
                    last_validated_position = MAX(
                        lesson_progress.last_validated_position,
                        excluded.last_validated_position
                    ),
                    is_completed = MAX(lesson_progress.is_completed, excluded.is_completed),
                    completed_at = COALESCE(lesson_progress.completed_at, excluded.completed_at)
                RETURNING
                    user_id, lesson_id, course_id,
                    last_validated_position, is_completed, completed_at
            ",
        )
        .bind(progress.user_id().to_string())
        .bind(lesson_id)
        .bind(course_id)
        .bind(progress.last_validated_position())
        .bind(progress.is_completed())
        .bind(progress.completed_at())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        map_progress_row(&row)
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    user_id, lesson_id, course_id,
                    last_validated_position, is_completed, completed_at
                FROM lesson_progress
                WHERE user_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(user_id.to_string())
        .bind(id_i64("lesson_id", lesson_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn count_completed(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<u32, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r"
                SELECT COUNT(*)
                FROM lesson_progress
                WHERE user_id = ?1 AND course_id = ?2 AND is_completed = 1
            ",
        )
        .bind(user_id.to_string())
        .bind(id_i64("course_id", course_id.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        u32_from_i64("completed count", count)
    }
}

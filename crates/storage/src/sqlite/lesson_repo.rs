use course_core::model::{CourseId, LessonId};

use super::{
    SqliteRepository, db_err,
    mapping::{id_i64, map_lesson_row, u32_from_i64},
};
use crate::repository::{LessonCatalogRepository, LessonRecord, StorageError};

#[async_trait::async_trait]
impl LessonCatalogRepository for SqliteRepository {
    async fn upsert_lesson(&self, lesson: &LessonRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO lessons (id, course_id, title, duration_secs)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    course_id = excluded.course_id,
                    title = excluded.title,
                    duration_secs = excluded.duration_secs
            ",
        )
        .bind(id_i64("lesson_id", lesson.id.value())?)
        .bind(id_i64("course_id", lesson.course_id.value())?)
        .bind(&lesson.title)
        .bind(lesson.duration_secs)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<LessonRecord>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, course_id, title, duration_secs
                FROM lessons
                WHERE id = ?1
            ",
        )
        .bind(id_i64("lesson_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_lesson_row).transpose()
    }

    async fn count_lessons(&self, course_id: CourseId) -> Result<u32, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lessons WHERE course_id = ?1")
            .bind(id_i64("course_id", course_id.value())?)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        u32_from_i64("lesson count", count)
    }
}

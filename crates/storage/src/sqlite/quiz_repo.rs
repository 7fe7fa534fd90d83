use chrono::{DateTime, Utc};
use course_core::model::{AnswerOption, CourseId, Question, QuizDefinition};
use sqlx::Row;

use super::{
    SqliteRepository, db_err,
    mapping::{id_i64, option_id_from_i64, question_id_from_i64, quiz_id_from_i64, ser},
};
use crate::repository::{QuizRepository, StorageError};

fn position_i64(index: usize) -> Result<i64, StorageError> {
    i64::try_from(index).map_err(|_| StorageError::Serialization("position overflow".into()))
}

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn upsert_quiz(
        &self,
        quiz: &QuizDefinition,
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let quiz_id = id_i64("quiz_id", quiz.id().value())?;
        let course_id = id_i64("course_id", quiz.course_id().value())?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r"
                INSERT INTO quizzes (id, course_id, title, created_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    course_id = excluded.course_id,
                    title = excluded.title,
                    created_at = excluded.created_at
            ",
        )
        .bind(quiz_id)
        .bind(course_id)
        .bind(quiz.title())
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        // Options go with their questions through ON DELETE CASCADE.
        sqlx::query("DELETE FROM quiz_questions WHERE quiz_id = ?1")
            .bind(quiz_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for (q_pos, question) in quiz.questions().iter().enumerate() {
            let question_id = id_i64("question_id", question.id.value())?;
            sqlx::query(
                r"
                    INSERT INTO quiz_questions (quiz_id, id, position, text)
                    VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(quiz_id)
            .bind(question_id)
            .bind(position_i64(q_pos)?)
            .bind(&question.text)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            for (o_pos, option) in question.options.iter().enumerate() {
                sqlx::query(
                    r"
                        INSERT INTO quiz_options (quiz_id, question_id, id, position, text, is_correct)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ",
                )
                .bind(quiz_id)
                .bind(question_id)
                .bind(id_i64("option_id", option.id.value())?)
                .bind(position_i64(o_pos)?)
                .bind(&option.text)
                .bind(option.is_correct)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn latest_quiz_for_course(
        &self,
        course_id: CourseId,
    ) -> Result<Option<QuizDefinition>, StorageError> {
        let course = id_i64("course_id", course_id.value())?;

        let Some(quiz_row) = sqlx::query(
            r"
                SELECT id, course_id, title
                FROM quizzes
                WHERE course_id = ?1
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            ",
        )
        .bind(course)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        else {
            return Ok(None);
        };

        let quiz_id_raw: i64 = quiz_row.try_get("id").map_err(ser)?;
        let title: String = quiz_row.try_get("title").map_err(ser)?;

        let question_rows = sqlx::query(
            r"
                SELECT id, text
                FROM quiz_questions
                WHERE quiz_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(quiz_id_raw)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let option_rows = sqlx::query(
            r"
                SELECT question_id, id, text, is_correct
                FROM quiz_options
                WHERE quiz_id = ?1
                ORDER BY question_id ASC, position ASC
            ",
        )
        .bind(quiz_id_raw)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut questions = Vec::with_capacity(question_rows.len());
        for row in &question_rows {
            questions.push(Question {
                id: question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
                text: row.try_get("text").map_err(ser)?,
                options: Vec::new(),
            });
        }

        for row in &option_rows {
            let question_id = question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?;
            let option = AnswerOption {
                id: option_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
                text: row.try_get("text").map_err(ser)?,
                is_correct: row.try_get("is_correct").map_err(ser)?,
            };
            let question = questions
                .iter_mut()
                .find(|q| q.id == question_id)
                .ok_or_else(|| {
                    StorageError::Serialization(format!("orphan option for question {question_id}"))
                })?;
            question.options.push(option);
        }

        QuizDefinition::new(
            quiz_id_from_i64(quiz_id_raw)?,
            course_id,
            title,
            questions,
        )
        .map(Some)
        .map_err(ser)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{
    CourseId, LessonId, LessonProgress, QuizAttempt, QuizDefinition, QuizId, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Catalog entry for a lesson. Owned by the course CRUD side; the engine only
/// reads durations and counts.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonRecord {
    pub id: LessonId,
    pub course_id: CourseId,
    pub title: String,
    pub duration_secs: f64,
}

/// Repository contract for per-learner lesson progress.
#[async_trait]
pub trait LessonProgressRepository: Send + Sync {
    /// Insert or merge a progress row keyed by `(user_id, lesson_id)`.
    ///
    /// The merge never lowers the stored position, never clears completion and
    /// keeps the first `completed_at`. Returns the stored state after the write.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be written.
    async fn upsert_progress(&self, progress: &LessonProgress)
    -> Result<LessonProgress, StorageError>;

    /// Fetch progress for one lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_progress(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError>;

    /// Count lessons of a course the learner has completed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_completed(&self, user_id: UserId, course_id: CourseId)
    -> Result<u32, StorageError>;
}

#[async_trait]
pub trait LessonCatalogRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the lesson cannot be stored.
    async fn upsert_lesson(&self, lesson: &LessonRecord) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_lesson(&self, id: LessonId) -> Result<Option<LessonRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_lessons(&self, course_id: CourseId) -> Result<u32, StorageError>;
}

#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Store a quiz definition, replacing its questions if it already exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the quiz cannot be stored.
    async fn upsert_quiz(
        &self,
        quiz: &QuizDefinition,
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Most recently created quiz for a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures or invalid stored content.
    async fn latest_quiz_for_course(
        &self,
        course_id: CourseId,
    ) -> Result<Option<QuizDefinition>, StorageError>;
}

#[async_trait]
pub trait QuizAttemptRepository: Send + Sync {
    /// Insert the learner's one attempt. Returns the stored attempt with its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if an attempt already exists for
    /// `(user_id, quiz_id)`, or other storage errors.
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<QuizAttempt, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_attempt(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<Option<QuizAttempt>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<(UserId, LessonId), LessonProgress>>>,
    lessons: Arc<Mutex<HashMap<LessonId, LessonRecord>>>,
    quizzes: Arc<Mutex<Vec<(DateTime<Utc>, QuizDefinition)>>>,
    attempts: Arc<Mutex<HashMap<(UserId, QuizId), QuizAttempt>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl LessonProgressRepository for InMemoryRepository {
    async fn upsert_progress(
        &self,
        progress: &LessonProgress,
    ) -> Result<LessonProgress, StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let key = (progress.user_id(), progress.lesson_id());
        let stored = match guard.get(&key) {
            Some(existing) => existing.merged_with(progress),
            None => progress.clone(),
        };
        guard.insert(key, stored.clone());
        Ok(stored)
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(&(user_id, lesson_id)).cloned())
    }

    async fn count_completed(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<u32, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        let count = guard
            .values()
            .filter(|p| p.user_id() == user_id && p.course_id() == course_id && p.is_completed())
            .count();
        u32::try_from(count).map_err(|_| StorageError::Serialization("count overflow".into()))
    }
}

#[async_trait]
impl LessonCatalogRepository for InMemoryRepository {
    async fn upsert_lesson(&self, lesson: &LessonRecord) -> Result<(), StorageError> {
        let mut guard = self.lessons.lock().map_err(poisoned)?;
        guard.insert(lesson.id, lesson.clone());
        Ok(())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<LessonRecord>, StorageError> {
        let guard = self.lessons.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    async fn count_lessons(&self, course_id: CourseId) -> Result<u32, StorageError> {
        let guard = self.lessons.lock().map_err(poisoned)?;
        let count = guard.values().filter(|l| l.course_id == course_id).count();
        u32::try_from(count).map_err(|_| StorageError::Serialization("count overflow".into()))
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn upsert_quiz(
        &self,
        quiz: &QuizDefinition,
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.quizzes.lock().map_err(poisoned)?;
        guard.retain(|(_, existing)| existing.id() != quiz.id());
        guard.push((created_at, quiz.clone()));
        Ok(())
    }

    async fn latest_quiz_for_course(
        &self,
        course_id: CourseId,
    ) -> Result<Option<QuizDefinition>, StorageError> {
        let guard = self.quizzes.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .filter(|(_, quiz)| quiz.course_id() == course_id)
            .max_by_key(|(created_at, quiz)| (*created_at, quiz.id()))
            .map(|(_, quiz)| quiz.clone()))
    }
}

#[async_trait]
impl QuizAttemptRepository for InMemoryRepository {
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<QuizAttempt, StorageError> {
        let mut guard = self.attempts.lock().map_err(poisoned)?;
        let key = (attempt.user_id(), attempt.quiz_id());
        if guard.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        let next_id = i64::try_from(guard.len())
            .map_err(|_| StorageError::Serialization("attempt id overflow".into()))?
            + 1;
        let stored = attempt.clone().with_id(next_id);
        guard.insert(key, stored.clone());
        Ok(stored)
    }

    async fn get_attempt(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<Option<QuizAttempt>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        Ok(guard.get(&(user_id, quiz_id)).cloned())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn LessonProgressRepository>,
    pub lessons: Arc<dyn LessonCatalogRepository>,
    pub quizzes: Arc<dyn QuizRepository>,
    pub attempts: Arc<dyn QuizAttemptRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            progress: Arc::new(repo.clone()),
            lessons: Arc::new(repo.clone()),
            quizzes: Arc::new(repo.clone()),
            attempts: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{AnswerOption, OptionId, Question, QuestionId, Score};
    use course_core::time::fixed_now;

    fn quiz(id: u64, course: u64) -> QuizDefinition {
        QuizDefinition::new(
            QuizId::new(id),
            CourseId::new(course),
            format!("Quiz {id}"),
            vec![Question {
                id: QuestionId::new(1),
                text: "2 + 2?".into(),
                options: vec![AnswerOption {
                    id: OptionId::new(1),
                    text: "4".into(),
                    is_correct: true,
                }],
            }],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn upsert_never_reverts_completion() {
        let repo = InMemoryRepository::new();
        let user = UserId::random();
        let mut done = LessonProgress::started(user, LessonId::new(1), CourseId::new(1));
        done.complete(120.0, fixed_now()).unwrap();
        repo.upsert_progress(&done).await.unwrap();

        let mut replay = LessonProgress::started(user, LessonId::new(1), CourseId::new(1));
        replay.record_position(15.0).unwrap();
        let stored = repo.upsert_progress(&replay).await.unwrap();

        assert!(stored.is_completed());
        assert_eq!(stored.last_validated_position(), 120.0);
        assert_eq!(repo.count_completed(user, CourseId::new(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn second_attempt_conflicts() {
        let repo = InMemoryRepository::new();
        let user = UserId::random();
        let attempt = QuizAttempt::new(
            user,
            QuizId::new(3),
            Score::from_counts(1, 2).unwrap(),
            fixed_now(),
        );
        let stored = repo.insert_attempt(&attempt).await.unwrap();
        assert_eq!(stored.id(), Some(1));

        let err = repo.insert_attempt(&attempt).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
        assert_eq!(
            repo.get_attempt(user, QuizId::new(3)).await.unwrap(),
            Some(stored)
        );
    }

    #[tokio::test]
    async fn latest_quiz_wins_by_creation_time() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        repo.upsert_quiz(&quiz(1, 5), now).await.unwrap();
        repo.upsert_quiz(&quiz(2, 5), now + chrono::Duration::days(1))
            .await
            .unwrap();
        repo.upsert_quiz(&quiz(3, 6), now + chrono::Duration::days(2))
            .await
            .unwrap();

        let latest = repo.latest_quiz_for_course(CourseId::new(5)).await.unwrap();
        assert_eq!(latest.map(|q| q.id()), Some(QuizId::new(2)));
        assert!(repo
            .latest_quiz_for_course(CourseId::new(7))
            .await
            .unwrap()
            .is_none());
    }
}

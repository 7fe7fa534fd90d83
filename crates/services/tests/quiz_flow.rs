use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use course_core::model::{
    AnswerOption, CourseId, OptionId, Question, QuestionId, QuizAttempt, QuizDefinition, QuizId,
    UserId,
};
use course_core::time::{fixed_clock, fixed_now};
use services::quiz::{AdvanceOutcome, Durability, QuizResult};
use services::{EngineConfig, EngineServices, QuizService, QuizStage};
use storage::repository::{
    InMemoryRepository, QuizAttemptRepository, QuizRepository, Storage, StorageError,
};

fn five_question_quiz() -> QuizDefinition {
    let questions = (1..=5)
        .map(|q| Question {
            id: QuestionId::new(q),
            text: format!("Question {q}"),
            options: (1..=3)
                .map(|o| AnswerOption {
                    id: OptionId::new(q * 10 + o),
                    text: format!("Option {o}"),
                    is_correct: o == 2,
                })
                .collect(),
        })
        .collect();
    QuizDefinition::new(QuizId::new(1), CourseId::new(1), "Final check", questions).unwrap()
}

fn correct_option(question: &Question) -> OptionId {
    question.correct_option_ids()[0]
}

fn wrong_option(question: &Question) -> OptionId {
    question
        .options
        .iter()
        .find(|o| !o.is_correct)
        .map(|o| o.id)
        .unwrap()
}

#[tokio::test]
async fn three_right_one_wrong_one_timeout_scores_60_and_persists_once() {
    let storage = Storage::sqlite("sqlite:file:memdb_quiz_flow?mode=memory&cache=shared")
        .await
        .unwrap();
    storage
        .quizzes
        .upsert_quiz(&five_question_quiz(), fixed_now())
        .await
        .unwrap();
    let engine = EngineServices::from_storage(&storage, fixed_clock(), EngineConfig::default())
        .unwrap();
    let quizzes = engine.quizzes();
    let user = UserId::random();

    let mut session = quizzes.start(user, CourseId::new(1)).await.unwrap();
    assert_eq!(*session.stage(), QuizStage::InProgress);
    assert_eq!(session.state().remaining_seconds, 60);

    for index in 0..5 {
        let question = session.current_question().unwrap().clone();
        match index {
            0..=2 => {
                session.select_option(correct_option(&question)).unwrap();
                session.confirm_answer().unwrap();
            }
            3 => {
                session.select_option(wrong_option(&question)).unwrap();
                session.confirm_answer().unwrap();
            }
            _ => {
                // Even a correct highlight does not count once time runs out.
                session.select_option(correct_option(&question)).unwrap();
                let mut outcome = None;
                for _ in 0..60 {
                    outcome = session.tick().or(outcome);
                }
                assert!(outcome.unwrap().timed_out);
            }
        }
        session.advance().unwrap();
    }

    let stage = quizzes.grade(&mut session).await.unwrap();
    let QuizStage::Finished(result) = stage else {
        panic!("expected finished, got {stage:?}");
    };
    assert_eq!(result.score.percent(), 60);
    assert!(!result.score.passed());
    assert_eq!(result.durability, Durability::Saved);

    let stored = storage
        .attempts
        .get_attempt(user, QuizId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.score().percent(), 60);
    assert!(!stored.score().passed());

    // One attempt per learner: the next visit is blocked with the stored result.
    let again = quizzes.start(user, CourseId::new(1)).await.unwrap();
    assert_eq!(*again.stage(), QuizStage::AttemptBlocked(stored.summary()));
}

/// Writes the attempt, then stalls past the grading timeout.
#[derive(Clone, Default)]
struct SlowAttempts {
    inner: InMemoryRepository,
    stall: Arc<AtomicBool>,
}

#[async_trait]
impl QuizAttemptRepository for SlowAttempts {
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<QuizAttempt, StorageError> {
        let stored = self.inner.insert_attempt(attempt).await?;
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Ok(stored)
    }

    async fn get_attempt(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<Option<QuizAttempt>, StorageError> {
        self.inner.get_attempt(user_id, quiz_id).await
    }
}

/// Fails every insert until switched back on.
#[derive(Clone, Default)]
struct OfflineAttempts {
    inner: InMemoryRepository,
    online: Arc<AtomicBool>,
}

#[async_trait]
impl QuizAttemptRepository for OfflineAttempts {
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<QuizAttempt, StorageError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("network unreachable".into()));
        }
        self.inner.insert_attempt(attempt).await
    }

    async fn get_attempt(
        &self,
        user_id: UserId,
        quiz_id: QuizId,
    ) -> Result<Option<QuizAttempt>, StorageError> {
        self.inner.get_attempt(user_id, quiz_id).await
    }
}

async fn answer_all(service: &QuizService, user: UserId) -> services::QuizSession {
    let mut session = service.start(user, CourseId::new(1)).await.unwrap();
    loop {
        let question = session.current_question().unwrap().clone();
        session.select_option(correct_option(&question)).unwrap();
        session.confirm_answer().unwrap();
        if let AdvanceOutcome::ReadyToGrade(_) = session.advance().unwrap() {
            return session;
        }
    }
}

#[tokio::test]
async fn failed_save_is_unsaved_until_retried() {
    let quizzes = InMemoryRepository::new();
    quizzes
        .upsert_quiz(&five_question_quiz(), fixed_now())
        .await
        .unwrap();
    let attempts = OfflineAttempts::default();
    let service = QuizService::new(fixed_clock(), Arc::new(quizzes), Arc::new(attempts.clone()));
    let user = UserId::random();

    let mut session = answer_all(&service, user).await;
    let stage = service.grade(&mut session).await.unwrap();
    let QuizStage::Finished(result) = stage else {
        panic!("expected finished, got {stage:?}");
    };
    assert_eq!(result.durability, Durability::Unsaved);
    assert_eq!(result.score.percent(), 100);
    assert!(attempts.get_attempt(user, QuizId::new(1)).await.unwrap().is_none());

    attempts.online.store(true, Ordering::SeqCst);
    let stage = service.retry_save(&mut session).await.unwrap();
    assert_eq!(
        stage,
        QuizStage::Finished(QuizResult {
            score: result.score,
            durability: Durability::Saved,
        })
    );
    assert!(attempts.get_attempt(user, QuizId::new(1)).await.unwrap().is_some());
}

#[tokio::test]
async fn timed_out_save_that_landed_is_recognised_on_retry() {
    let quizzes = InMemoryRepository::new();
    quizzes
        .upsert_quiz(&five_question_quiz(), fixed_now())
        .await
        .unwrap();
    let attempts = SlowAttempts::default();
    attempts.stall.store(true, Ordering::SeqCst);
    let config = EngineConfig::default().with_persist_timeout(Duration::from_millis(20));
    let service = QuizService::new(fixed_clock(), Arc::new(quizzes), Arc::new(attempts.clone()))
        .with_config(&config);
    let user = UserId::random();

    let mut session = answer_all(&service, user).await;
    let stage = service.grade(&mut session).await.unwrap();
    assert!(matches!(
        stage,
        QuizStage::Finished(QuizResult {
            durability: Durability::Unsaved,
            ..
        })
    ));

    attempts.stall.store(false, Ordering::SeqCst);
    let stage = service.retry_save(&mut session).await.unwrap();
    assert!(matches!(
        stage,
        QuizStage::Finished(QuizResult {
            durability: Durability::Saved,
            ..
        })
    ));
    assert!(matches!(
        service.retry_save(&mut session).await,
        Err(services::QuizError::NothingToSave)
    ));
}

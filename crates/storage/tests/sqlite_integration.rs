use chrono::Duration;
use course_core::model::{
    AnswerOption, CourseId, LessonId, LessonProgress, OptionId, Question, QuestionId, QuizAttempt,
    QuizDefinition, QuizId, Score, UserId,
};
use course_core::time::fixed_now;
use storage::repository::{
    LessonCatalogRepository, LessonProgressRepository, LessonRecord, QuizAttemptRepository,
    QuizRepository, StorageError,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn sample_quiz(id: u64, course: CourseId) -> QuizDefinition {
    let questions = (1..=3)
        .map(|q| Question {
            id: QuestionId::new(q),
            text: format!("Question {q}"),
            options: (1..=3)
                .map(|o| AnswerOption {
                    id: OptionId::new(o),
                    text: format!("Option {o}"),
                    is_correct: o == q,
                })
                .collect(),
        })
        .collect();
    QuizDefinition::new(QuizId::new(id), course, format!("Quiz {id}"), questions).unwrap()
}

#[tokio::test]
async fn sqlite_progress_upsert_is_monotonic_and_idempotent() {
    let repo = connect("memdb_progress").await;
    let user = UserId::random();
    let lesson = LessonId::new(7);
    let course = CourseId::new(1);

    let mut watching = LessonProgress::started(user, lesson, course);
    watching.record_position(35.0).unwrap();
    let stored = repo.upsert_progress(&watching).await.unwrap();
    assert_eq!(stored.last_validated_position(), 35.0);
    assert!(!stored.is_completed());

    let mut done = watching.clone();
    done.complete(100.0, fixed_now()).unwrap();
    repo.upsert_progress(&done).await.unwrap();

    // A replayed completion and a stale position write must both leave the row as it was.
    let mut replay = watching.clone();
    replay
        .complete(100.0, fixed_now() + Duration::hours(1))
        .unwrap();
    repo.upsert_progress(&replay).await.unwrap();
    let stored = repo.upsert_progress(&watching).await.unwrap();

    assert!(stored.is_completed());
    assert_eq!(stored.last_validated_position(), 100.0);
    assert_eq!(stored.completed_at(), Some(fixed_now()));

    let fetched = repo.get_progress(user, lesson).await.unwrap().unwrap();
    assert_eq!(fetched, stored);
    assert_eq!(repo.count_completed(user, course).await.unwrap(), 1);
}

#[tokio::test]
async fn sqlite_attempt_is_unique_per_user_and_quiz() {
    let repo = connect("memdb_attempts").await;
    let user = UserId::random();
    let quiz = QuizId::new(11);

    let attempt = QuizAttempt::new(user, quiz, Score::from_counts(3, 4).unwrap(), fixed_now());
    let stored = repo.insert_attempt(&attempt).await.unwrap();
    assert!(stored.id().is_some());

    let retry = QuizAttempt::new(user, quiz, Score::from_counts(4, 4).unwrap(), fixed_now());
    let err = repo.insert_attempt(&retry).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let fetched = repo.get_attempt(user, quiz).await.unwrap().unwrap();
    assert_eq!(fetched.score().percent(), 75);
    assert!(fetched.score().passed());

    // Another learner is unaffected.
    let other = QuizAttempt::new(UserId::random(), quiz, Score::from_counts(0, 4).unwrap(), fixed_now());
    repo.insert_attempt(&other).await.unwrap();
}

#[tokio::test]
async fn sqlite_quiz_roundtrip_keeps_order_and_picks_latest() {
    let repo = connect("memdb_quizzes").await;
    let course = CourseId::new(3);

    let older = sample_quiz(1, course);
    let newer = sample_quiz(2, course);
    repo.upsert_quiz(&older, fixed_now()).await.unwrap();
    repo.upsert_quiz(&newer, fixed_now() + Duration::days(1))
        .await
        .unwrap();

    let latest = repo
        .latest_quiz_for_course(course)
        .await
        .unwrap()
        .expect("quiz");
    assert_eq!(latest, newer);
    assert_eq!(latest.questions()[1].correct_option_ids(), vec![OptionId::new(2)]);

    assert!(repo
        .latest_quiz_for_course(CourseId::new(99))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn sqlite_lesson_catalog_counts_per_course() {
    let repo = connect("memdb_lessons").await;
    for id in 1..=4 {
        repo.upsert_lesson(&LessonRecord {
            id: LessonId::new(id),
            course_id: CourseId::new(if id < 4 { 1 } else { 2 }),
            title: format!("Lesson {id}"),
            duration_secs: 90.0,
        })
        .await
        .unwrap();
    }

    assert_eq!(repo.count_lessons(CourseId::new(1)).await.unwrap(), 3);
    let lesson = repo.get_lesson(LessonId::new(4)).await.unwrap().unwrap();
    assert_eq!(lesson.course_id, CourseId::new(2));
    assert_eq!(lesson.duration_secs, 90.0);
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use course_core::model::{CourseId, LessonId, LessonProgress, UserId};
use course_core::time::fixed_clock;
use services::playback::{EndOutcome, LessonWatcher, PlayerError};
use services::{
    CompletionOutcome, CompletionRecorder, CourseProgressService, EngineConfig, LessonContext,
    Player, PlayerEvent, ProgressBus,
};
use storage::repository::{
    InMemoryRepository, LessonCatalogRepository, LessonProgressRepository, LessonRecord,
    StorageError,
};
use tokio::sync::mpsc;

/// Counts completed writes on top of the in-memory store.
#[derive(Clone, Default)]
struct CountingProgress {
    inner: InMemoryRepository,
    completions: Arc<AtomicUsize>,
}

#[async_trait]
impl LessonProgressRepository for CountingProgress {
    async fn upsert_progress(
        &self,
        progress: &LessonProgress,
    ) -> Result<LessonProgress, StorageError> {
        if progress.is_completed() {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.upsert_progress(progress).await
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        self.inner.get_progress(user_id, lesson_id).await
    }

    async fn count_completed(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<u32, StorageError> {
        self.inner.count_completed(user_id, course_id).await
    }
}

struct ScriptedPlayer {
    position: Mutex<Option<f64>>,
    duration: f64,
    seeks: Mutex<Vec<f64>>,
}

impl ScriptedPlayer {
    fn new(duration: f64) -> Self {
        Self {
            position: Mutex::new(None),
            duration,
            seeks: Mutex::new(Vec::new()),
        }
    }

    fn set(&self, seconds: f64) {
        *self.position.lock().unwrap() = Some(seconds);
    }
}

impl Player for ScriptedPlayer {
    fn current_position(&self) -> Result<f64, PlayerError> {
        self.position.lock().unwrap().ok_or(PlayerError::NotReady)
    }

    fn duration(&self) -> Result<f64, PlayerError> {
        Ok(self.duration)
    }

    fn seek_to(&self, seconds: f64) -> Result<(), PlayerError> {
        self.seeks.lock().unwrap().push(seconds);
        self.set(seconds);
        Ok(())
    }
}

fn context(user: UserId) -> LessonContext {
    LessonContext {
        user_id: Some(user),
        lesson_id: LessonId::new(1),
        course_id: CourseId::new(1),
    }
}

#[tokio::test]
async fn continuous_watch_records_one_completion() {
    let progress = CountingProgress::default();
    let bus = ProgressBus::default();
    let mut listener = bus.subscribe();
    let recorder = CompletionRecorder::new(fixed_clock(), Arc::new(progress.clone()), bus);
    let user = UserId::random();
    let mut watcher =
        LessonWatcher::new(context(user), recorder, &EngineConfig::default()).unwrap();
    let player = ScriptedPlayer::new(100.0);

    // 0 -> 100 in half-second polls.
    for step in 0..=200 {
        player.set(f64::from(step) * 0.5);
        watcher.poll(&player);
        watcher.flush_checkpoint().await.unwrap();
    }
    assert_eq!(watcher.last_valid(), 100.0);

    let ended = watcher.handle_ended(&player).await.unwrap();
    assert!(matches!(
        ended,
        EndOutcome::Completed(CompletionOutcome::Recorded(_))
    ));
    // A duplicate end event from the player changes nothing.
    assert_eq!(
        watcher.handle_ended(&player).await.unwrap(),
        EndOutcome::AlreadyHandled
    );

    assert_eq!(progress.completions.load(Ordering::SeqCst), 1);
    let stored = progress
        .get_progress(user, LessonId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_completed());
    assert_eq!(stored.last_validated_position(), 100.0);
    assert!(listener.try_changed());
    assert!(player.seeks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn spawned_watch_completes_on_ended_event() {
    let repo = InMemoryRepository::new();
    repo.upsert_lesson(&LessonRecord {
        id: LessonId::new(1),
        course_id: CourseId::new(1),
        title: "Intro".into(),
        duration_secs: 3.0,
    })
    .await
    .unwrap();

    let bus = ProgressBus::default();
    let recorder = CompletionRecorder::new(fixed_clock(), Arc::new(repo.clone()), bus.clone());
    let courses = CourseProgressService::new(Arc::new(repo.clone()), Arc::new(repo.clone()));
    let user = UserId::random();
    let mut course_watch = courses.watch(&bus, user, CourseId::new(1));

    let config = EngineConfig::default().with_poll_interval(Duration::from_millis(5));
    let watcher = LessonWatcher::new(context(user), recorder, &config).unwrap();
    let player = Arc::new(ScriptedPlayer::new(3.0));
    let (events, receiver) = mpsc::unbounded_channel();
    let handle = watcher.spawn(player.clone(), receiver, config.poll_interval);

    for second in 1..=3 {
        player.set(f64::from(second));
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    events.send(PlayerEvent::Ended).unwrap();

    let refreshed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match course_watch.next().await {
                Some(progress) if progress.completed() == 1 => return progress,
                Some(_) => continue,
                None => panic!("course watch stopped"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(refreshed.percent(), 100);

    let report = handle.stop().await.unwrap();
    assert!(report.completed);
    assert_eq!(report.rejected_skips, 0);
}

#[tokio::test]
async fn skipping_to_the_end_records_nothing() {
    let repo = InMemoryRepository::new();
    let recorder = CompletionRecorder::new(fixed_clock(), Arc::new(repo.clone()), ProgressBus::default());
    let user = UserId::random();
    let mut watcher =
        LessonWatcher::new(context(user), recorder, &EngineConfig::default()).unwrap();
    let player = ScriptedPlayer::new(100.0);

    for second in 0..=10 {
        player.set(f64::from(second));
        watcher.poll(&player);
    }
    player.set(99.0);
    watcher.poll(&player);
    assert_eq!(watcher.last_valid(), 10.0);

    let ended = watcher.handle_ended(&player).await.unwrap();
    assert_eq!(ended, EndOutcome::Rejected { seek_to: 10.0 });
    assert_eq!(*player.seeks.lock().unwrap(), vec![10.0, 10.0]);
    assert!(repo.get_progress(user, LessonId::new(1)).await.unwrap().is_none());
}

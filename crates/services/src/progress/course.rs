use std::sync::Arc;

use course_core::model::{CourseId, CourseProgress, UserId};
use storage::repository::{LessonCatalogRepository, LessonProgressRepository};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::ProgressServiceError;
use crate::events::{ProgressBus, ProgressSubscription};

/// Completed-lesson totals for a course.
#[derive(Clone)]
pub struct CourseProgressService {
    progress: Arc<dyn LessonProgressRepository>,
    lessons: Arc<dyn LessonCatalogRepository>,
}

impl CourseProgressService {
    #[must_use]
    pub fn new(
        progress: Arc<dyn LessonProgressRepository>,
        lessons: Arc<dyn LessonCatalogRepository>,
    ) -> Self {
        Self { progress, lessons }
    }

    /// Count completed lessons against the course catalog.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` on read failure.
    pub async fn course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgress, ProgressServiceError> {
        let total = self.lessons.count_lessons(course_id).await?;
        let completed = self.progress.count_completed(user_id, course_id).await?;
        Ok(CourseProgress::new(course_id, completed, total))
    }

    /// Keep a course total fresh by re-querying on every bus notification.
    ///
    /// The first value is loaded right away. Dropping the returned handle
    /// stops the task and unsubscribes it.
    #[must_use]
    pub fn watch(&self, bus: &ProgressBus, user_id: UserId, course_id: CourseId) -> CourseProgressWatch {
        let (sender, receiver) = watch::channel(None);
        let subscription = bus.subscribe();
        let service = self.clone();
        let task = tokio::spawn(async move {
            service
                .refresh_loop(subscription, sender, user_id, course_id)
                .await;
        });
        CourseProgressWatch { receiver, task }
    }

    async fn refresh_loop(
        &self,
        mut subscription: ProgressSubscription,
        sender: watch::Sender<Option<CourseProgress>>,
        user_id: UserId,
        course_id: CourseId,
    ) {
        loop {
            match self.course_progress(user_id, course_id).await {
                Ok(progress) => {
                    sender.send_replace(Some(progress));
                }
                Err(err) => {
                    tracing::warn!(%course_id, error = %err, "course progress refresh failed");
                }
            }
            if !subscription.changed().await {
                return;
            }
            // Several completions in a row only need one re-query.
            subscription.try_changed();
        }
    }
}

/// Live course total. Holds the refresh task; dropping it stops the task.
#[derive(Debug)]
pub struct CourseProgressWatch {
    receiver: watch::Receiver<Option<CourseProgress>>,
    task: JoinHandle<()>,
}

impl CourseProgressWatch {
    /// Latest known total, or `None` before the first load finished.
    #[must_use]
    pub fn current(&self) -> Option<CourseProgress> {
        *self.receiver.borrow()
    }

    /// Wait for the next refreshed value.
    ///
    /// Returns `None` once the refresh task has stopped.
    pub async fn next(&mut self) -> Option<CourseProgress> {
        self.receiver.changed().await.ok()?;
        *self.receiver.borrow_and_update()
    }
}

impl Drop for CourseProgressWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use course_core::model::{LessonId, ProgressRank};
    use course_core::time::fixed_clock;
    use storage::repository::{InMemoryRepository, LessonRecord};

    use crate::progress::CompletionRecorder;

    async fn seeded(lessons: u64) -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        for id in 1..=lessons {
            repo.upsert_lesson(&LessonRecord {
                id: LessonId::new(id),
                course_id: CourseId::new(1),
                title: format!("Lesson {id}"),
                duration_secs: 60.0,
            })
            .await
            .unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn counts_completed_lessons() {
        let repo = seeded(4).await;
        let service = CourseProgressService::new(Arc::new(repo.clone()), Arc::new(repo.clone()));
        let recorder = CompletionRecorder::new(fixed_clock(), Arc::new(repo), ProgressBus::default());
        let user = UserId::random();

        for id in 1..=3 {
            recorder
                .record_completion(Some(user), LessonId::new(id), CourseId::new(1), 60.0)
                .await
                .unwrap();
        }

        let progress = service.course_progress(user, CourseId::new(1)).await.unwrap();
        assert_eq!(progress.completed(), 3);
        assert_eq!(progress.total(), 4);
        assert_eq!(progress.percent(), 75);
        assert_eq!(progress.rank(), ProgressRank::Hacker);
    }

    #[tokio::test]
    async fn watch_refreshes_after_a_completion() {
        let repo = seeded(2).await;
        let bus = ProgressBus::default();
        let service = CourseProgressService::new(Arc::new(repo.clone()), Arc::new(repo.clone()));
        let recorder = CompletionRecorder::new(fixed_clock(), Arc::new(repo), bus.clone());
        let user = UserId::random();

        let mut watch = service.watch(&bus, user, CourseId::new(1));
        let initial = tokio::time::timeout(Duration::from_secs(2), watch.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(initial.completed(), 0);

        recorder
            .record_completion(Some(user), LessonId::new(1), CourseId::new(1), 60.0)
            .await
            .unwrap();
        let refreshed = tokio::time::timeout(Duration::from_secs(2), watch.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.completed(), 1);
        assert_eq!(refreshed.percent(), 50);
    }

    #[tokio::test]
    async fn dropping_the_watch_unsubscribes() {
        let repo = seeded(1).await;
        let bus = ProgressBus::default();
        let service = CourseProgressService::new(Arc::new(repo.clone()), Arc::new(repo));

        let watch = service.watch(&bus, UserId::random(), CourseId::new(1));
        assert_eq!(bus.subscriber_count(), 1);
        drop(watch);
        tokio::time::timeout(Duration::from_secs(2), async {
            while bus.subscriber_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}

use std::time::Duration;

use course_core::model::OptionId;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::service::QuizService;
use super::session::{AdvanceOutcome, QuizResult, QuizSession, QuizSnapshot};
use crate::error::QuizError;

/// Learner input forwarded to a running quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizCommand {
    Select(OptionId),
    Confirm,
    Advance,
    RetrySave,
    Exit,
}

/// Drives a quiz session on its own task: one countdown tick per
/// `tick` period, plus learner commands, all applied in order.
pub struct QuizRunner {
    service: QuizService,
    session: QuizSession,
    tick: Duration,
}

impl QuizRunner {
    #[must_use]
    pub fn new(service: QuizService, session: QuizSession, tick: Duration) -> Self {
        Self {
            service,
            session,
            tick,
        }
    }

    #[must_use]
    pub fn spawn(self) -> QuizRunnerHandle {
        let (commands, receiver) = mpsc::channel(16);
        let (publisher, snapshots) = watch::channel(self.session.snapshot());
        let task = tokio::spawn(self.run(receiver, publisher));
        QuizRunnerHandle {
            commands,
            snapshots,
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<QuizCommand>,
        publisher: watch::Sender<QuizSnapshot>,
    ) -> Option<QuizResult> {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let counting = self.session.stage().is_in_progress() && !self.session.is_locked();
            tokio::select! {
                _ = ticker.tick(), if counting => {
                    if let Some(outcome) = self.session.tick() {
                        tracing::debug!(question_id = %outcome.question_id, "question timed out");
                    }
                    publisher.send_replace(self.session.snapshot());
                }
                command = commands.recv() => {
                    let Some(command) = command.filter(|c| *c != QuizCommand::Exit) else {
                        break;
                    };
                    let notice = match self.apply(command, &mut ticker).await {
                        Ok(()) => None,
                        Err(err) => {
                            tracing::debug!(?command, error = %err, "quiz command rejected");
                            Some(err.user_message())
                        }
                    };
                    let mut snapshot = self.session.snapshot();
                    snapshot.notice = notice;
                    publisher.send_replace(snapshot);
                }
            }
        }

        self.session.exit()
    }

    async fn apply(
        &mut self,
        command: QuizCommand,
        ticker: &mut tokio::time::Interval,
    ) -> Result<(), QuizError> {
        match command {
            QuizCommand::Select(option_id) => self.session.select_option(option_id),
            QuizCommand::Confirm => self.session.confirm_answer().map(|_| ()),
            QuizCommand::Advance => match self.session.advance()? {
                AdvanceOutcome::NextQuestion { .. } => {
                    // Full period for the new question.
                    ticker.reset();
                    Ok(())
                }
                AdvanceOutcome::ReadyToGrade(_) => {
                    self.service.grade(&mut self.session).await.map(|_| ())
                }
            },
            QuizCommand::RetrySave => self.service.retry_save(&mut self.session).await.map(|_| ()),
            QuizCommand::Exit => Ok(()),
        }
    }
}

/// Handle on a running quiz. Dropping it stops the task and its countdown.
#[derive(Debug)]
pub struct QuizRunnerHandle {
    commands: mpsc::Sender<QuizCommand>,
    snapshots: watch::Receiver<QuizSnapshot>,
    task: Option<JoinHandle<Option<QuizResult>>>,
}

impl QuizRunnerHandle {
    /// Queue a command. Returns `false` if the runner already stopped.
    pub async fn send(&self, command: QuizCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    #[must_use]
    pub fn snapshot(&self) -> QuizSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait for the next published snapshot. `None` once the runner stopped.
    pub async fn changed(&mut self) -> Option<QuizSnapshot> {
        self.snapshots.changed().await.ok()?;
        Some(self.snapshots.borrow_and_update().clone())
    }

    /// Wait until a snapshot satisfies `done`, returning it.
    pub async fn wait_for(
        &mut self,
        mut done: impl FnMut(&QuizSnapshot) -> bool,
    ) -> Option<QuizSnapshot> {
        let snapshot = self.snapshots.wait_for(|s| done(s)).await.ok()?;
        Some(snapshot.clone())
    }

    /// Leave the quiz and collect its result, if it finished.
    pub async fn exit(mut self) -> Option<QuizResult> {
        let _ = self.commands.send(QuizCommand::Exit).await;
        let task = self.task.take()?;
        task.await.ok().flatten()
    }
}

impl Drop for QuizRunnerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

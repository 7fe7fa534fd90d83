mod countdown;
mod gate;
mod runner;
mod service;
mod session;

// Public API of the quiz subsystem.
pub use crate::error::QuizError;
pub use countdown::{Countdown, CountdownTick};
pub use gate::AttemptGate;
pub use runner::{QuizCommand, QuizRunner, QuizRunnerHandle};
pub use service::{QuizService, shuffled_copy};
pub use session::{
    AdvanceOutcome, AnswerOutcome, Durability, QuizResult, QuizSession, QuizSessionState,
    QuizSnapshot, QuizStage,
};

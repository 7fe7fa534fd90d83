#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod playback;
pub mod progress;
pub mod quiz;

pub use course_core::Clock;

pub use config::EngineConfig;
pub use engine::EngineServices;
pub use error::{EngineServicesError, ProgressServiceError, QuizError, WatchError};
pub use events::{ProgressBus, ProgressChanged, ProgressSubscription};

pub use playback::{LessonContext, PlaybackController, Player, PlayerEvent};
pub use progress::{CompletionOutcome, CompletionRecorder, CourseProgressService};
pub use quiz::{AttemptGate, QuizCommand, QuizService, QuizSession, QuizStage};

mod course;
mod recorder;

pub use crate::error::ProgressServiceError;
pub use course::{CourseProgressService, CourseProgressWatch};
pub use recorder::{CompletionOutcome, CompletionRecorder};

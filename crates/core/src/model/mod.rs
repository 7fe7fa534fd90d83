mod attempt;
mod course;
mod ids;
mod progress;
mod quiz;

pub use ids::{CourseId, LessonId, OptionId, ParseIdError, QuestionId, QuizId, UserId};

pub use attempt::{AttemptError, AttemptSummary, PASS_THRESHOLD, QuizAttempt, Score};
pub use course::{CourseProgress, ProgressRank};
pub use progress::{LessonProgress, ProgressError};
pub use quiz::{AnswerOption, Question, QuizDefinition, QuizDefinitionError};

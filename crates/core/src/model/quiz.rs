use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, OptionId, QuestionId, QuizId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizDefinitionError {
    #[error("quiz title cannot be empty")]
    EmptyTitle,

    #[error("question {0} appears more than once")]
    DuplicateQuestion(QuestionId),

    #[error("option {option} appears more than once in question {question}")]
    DuplicateOption {
        question: QuestionId,
        option: OptionId,
    },
}

//
// ─── QUESTIONS ────────────────────────────────────────────────────────────────
//

/// One selectable answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: OptionId,
    pub text: String,
    pub is_correct: bool,
}

/// A single multiple-choice question.
///
/// A question may legitimately have no options, or no option flagged correct;
/// such a question simply cannot be answered correctly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub options: Vec<AnswerOption>,
}

impl Question {
    #[must_use]
    pub fn option(&self, id: OptionId) -> Option<&AnswerOption> {
        self.options.iter().find(|opt| opt.id == id)
    }

    /// Whether picking `id` earns the point. Unknown ids are wrong.
    #[must_use]
    pub fn is_correct(&self, id: OptionId) -> bool {
        self.option(id).is_some_and(|opt| opt.is_correct)
    }

    #[must_use]
    pub fn correct_option_ids(&self) -> Vec<OptionId> {
        self.options
            .iter()
            .filter(|opt| opt.is_correct)
            .map(|opt| opt.id)
            .collect()
    }
}

//
// ─── QUIZ ─────────────────────────────────────────────────────────────────────
//

/// Canonical, read-only quiz content for a course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizDefinition {
    id: QuizId,
    course_id: CourseId,
    title: String,
    questions: Vec<Question>,
}

impl QuizDefinition {
    /// Validate and build a quiz. Questions keep their given order.
    ///
    /// # Errors
    ///
    /// Returns `QuizDefinitionError` for a blank title or duplicate ids.
    pub fn new(
        id: QuizId,
        course_id: CourseId,
        title: impl Into<String>,
        questions: Vec<Question>,
    ) -> Result<Self, QuizDefinitionError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(QuizDefinitionError::EmptyTitle);
        }

        let mut seen_questions = HashSet::new();
        for question in &questions {
            if !seen_questions.insert(question.id) {
                return Err(QuizDefinitionError::DuplicateQuestion(question.id));
            }
            let mut seen_options = HashSet::new();
            for option in &question.options {
                if !seen_options.insert(option.id) {
                    return Err(QuizDefinitionError::DuplicateOption {
                        question: question.id,
                        option: option.id,
                    });
                }
            }
        }

        Ok(Self {
            id,
            course_id,
            title,
            questions,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuizId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// A quiz with no questions cannot be taken.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !self.questions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(id: u64, correct: bool) -> AnswerOption {
        AnswerOption {
            id: OptionId::new(id),
            text: format!("option {id}"),
            is_correct: correct,
        }
    }

    fn question(id: u64, options: Vec<AnswerOption>) -> Question {
        Question {
            id: QuestionId::new(id),
            text: format!("question {id}"),
            options,
        }
    }

    #[test]
    fn rejects_blank_title() {
        let err = QuizDefinition::new(QuizId::new(1), CourseId::new(1), "   ", vec![]).unwrap_err();
        assert_eq!(err, QuizDefinitionError::EmptyTitle);
    }

    #[test]
    fn rejects_duplicate_option_ids() {
        let q = question(1, vec![option(1, true), option(1, false)]);
        let err = QuizDefinition::new(QuizId::new(1), CourseId::new(1), "Quiz", vec![q]).unwrap_err();
        assert!(matches!(err, QuizDefinitionError::DuplicateOption { .. }));
    }

    #[test]
    fn empty_quiz_is_not_available() {
        let quiz = QuizDefinition::new(QuizId::new(1), CourseId::new(1), "Quiz", vec![]).unwrap();
        assert!(!quiz.is_available());
    }

    #[test]
    fn question_without_correct_option_never_scores() {
        let q = question(1, vec![option(1, false), option(2, false)]);
        assert!(!q.is_correct(OptionId::new(1)));
        assert!(!q.is_correct(OptionId::new(2)));
        assert!(q.correct_option_ids().is_empty());
    }

    #[test]
    fn unknown_option_is_wrong() {
        let q = question(1, vec![option(1, true)]);
        assert!(q.is_correct(OptionId::new(1)));
        assert!(!q.is_correct(OptionId::new(99)));
    }
}

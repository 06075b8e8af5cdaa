use thiserror::Error;

use crate::model::{Question, Test};
use crate::percent::percent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("question {index} does not exist (test has {len})")]
    QuestionOutOfRange { index: usize, len: usize },

    #[error("option {option} is not available (question has {available})")]
    OptionOutOfRange { option: u8, available: u8 },
}

/// Result of grading an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizScore {
    pub correct: usize,
    pub answered: usize,
    pub total: usize,
    pub percent: u8,
}

/// Per-question feedback shown after submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionReview {
    pub index: usize,
    pub selected: Option<u8>,
    pub correct: Option<u8>,
    pub is_correct: bool,
    pub explanation: Option<String>,
}

/// A student's answers to one test.
#[derive(Debug, Clone)]
pub struct QuizAttempt {
    test: Test,
    answers: Vec<Option<u8>>,
}

impl QuizAttempt {
    #[must_use]
    pub fn new(test: Test) -> Self {
        let answers = vec![None; test.questions_list.len()];
        Self { test, answers }
    }

    #[must_use]
    pub fn test(&self) -> &Test {
        &self.test
    }

    fn question(&self, index: usize) -> Result<&Question, QuizError> {
        self.test
            .questions_list
            .get(index)
            .ok_or(QuizError::QuestionOutOfRange {
                index,
                len: self.answers.len(),
            })
    }

    /// Records (or replaces) the selected option for a question.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` if the question or option does not exist.
    pub fn answer(&mut self, index: usize, option: u8) -> Result<(), QuizError> {
        let available = self.question(index)?.option_count();
        if option >= available {
            return Err(QuizError::OptionOutOfRange { option, available });
        }
        self.answers[index] = Some(option);
        Ok(())
    }

    /// Clears the selection for a question.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::QuestionOutOfRange` for an unknown question.
    pub fn clear(&mut self, index: usize) -> Result<(), QuizError> {
        self.question(index)?;
        self.answers[index] = None;
        Ok(())
    }

    #[must_use]
    pub fn selected(&self, index: usize) -> Option<u8> {
        self.answers.get(index).copied().flatten()
    }

    /// Grades the attempt. Questions without a usable answer key never count
    /// as correct.
    #[must_use]
    pub fn score(&self) -> QuizScore {
        let total = self.answers.len();
        let answered = self.answers.iter().filter(|a| a.is_some()).count();
        let correct = self
            .test
            .questions_list
            .iter()
            .zip(&self.answers)
            .filter(|(question, selected)| {
                selected.is_some() && question.answer_index() == **selected
            })
            .count();
        QuizScore {
            correct,
            answered,
            total,
            percent: percent(correct, total),
        }
    }

    #[must_use]
    pub fn review(&self) -> Vec<QuestionReview> {
        self.test
            .questions_list
            .iter()
            .zip(&self.answers)
            .enumerate()
            .map(|(index, (question, selected))| QuestionReview {
                index,
                selected: *selected,
                correct: question.answer_index(),
                is_correct: selected.is_some() && question.answer_index() == *selected,
                explanation: question.explanation.clone(),
            })
            .collect()
    }
}

//! Read-time quiz grading. Selections live only for the duration of one
//! evaluation: nothing here is persisted, and no scoring aggregate exists.

use std::collections::HashMap;

use serde::Serialize;

/// Answer key for a single question.
pub struct QuestionKey {
    pub question_id: String,
    pub correct_option: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct GradedAnswer {
    pub question_id: String,
    pub selected_option: Option<i64>,
    pub correct_option: i64,
    pub is_correct: bool,
}

/// One learner's in-flight answers. Each question holds at most one
/// selection; selecting again overwrites (the last choice counts), and
/// selections for different questions never affect each other.
#[derive(Debug, Default)]
pub struct AnswerSheet {
    selections: HashMap<String, i64>,
}

impl AnswerSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, question_id: &str, option: i64) {
        self.selections.insert(question_id.to_string(), option);
    }

    pub fn selected(&self, question_id: &str) -> Option<i64> {
        self.selections.get(question_id).copied()
    }

    /// Grades the sheet against the stored answer key. Questions with no
    /// selection are reported as incorrect with `selected_option: None`;
    /// selections for unknown question ids are ignored.
    pub fn grade(&self, key: &[QuestionKey]) -> Vec<GradedAnswer> {
        key.iter()
            .map(|q| {
                let selected = self.selected(&q.question_id);
                GradedAnswer {
                    question_id: q.question_id.clone(),
                    selected_option: selected,
                    correct_option: q.correct_option,
                    is_correct: selected == Some(q.correct_option),
                }
            })
            .collect()
    }
}

pub fn score(graded: &[GradedAnswer]) -> (usize, usize) {
    let correct = graded.iter().filter(|g| g.is_correct).count();
    (correct, graded.len())
}

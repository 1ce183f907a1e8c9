// src/models/attempt.rs

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::Question;

/// Lifecycle of an attempt. `Submitted` and `AutoSubmitted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    Ongoing,
    Submitted,
    AutoSubmitted,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Ongoing => "ongoing",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::AutoSubmitted => "auto-submitted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::Ongoing)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ongoing" => Ok(AttemptStatus::Ongoing),
            "submitted" => Ok(AttemptStatus::Submitted),
            "auto-submitted" => Ok(AttemptStatus::AutoSubmitted),
            other => Err(format!("unknown attempt status '{}'", other)),
        }
    }
}

/// One saved answer inside an attempt. At most one entry per `question_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question_id: i64,

    /// `None` when the student cleared the response.
    pub answer: Option<String>,

    /// Set at grading time only.
    pub is_correct: Option<bool>,

    /// Seconds spent on the question, summed over every save.
    pub time_taken: Option<i32>,

    #[serde(default)]
    pub marked_for_review: bool,
}

/// Question palette: four disjoint sets of question numbers whose union is
/// exactly `1..=total_questions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionStatus {
    pub answered: BTreeSet<i32>,
    pub not_answered: BTreeSet<i32>,
    pub marked_for_review: BTreeSet<i32>,
    pub not_visited: BTreeSet<i32>,
}

impl QuestionStatus {
    /// Every question starts unvisited.
    pub fn new(total_questions: i32) -> Self {
        Self {
            not_visited: (1..=total_questions).collect(),
            ..Self::default()
        }
    }

    /// Whether `number` belongs to the palette at all.
    pub fn contains(&self, number: i32) -> bool {
        self.answered.contains(&number)
            || self.not_answered.contains(&number)
            || self.marked_for_review.contains(&number)
            || self.not_visited.contains(&number)
    }

    /// Checks the partition invariant against `1..=total_questions`.
    pub fn is_partition_of(&self, total_questions: i32) -> bool {
        let sets = [
            &self.answered,
            &self.not_answered,
            &self.marked_for_review,
            &self.not_visited,
        ];
        let sizes: usize = sets.iter().map(|s| s.len()).sum();
        let union: BTreeSet<i32> = sets.iter().flat_map(|s| s.iter().copied()).collect();
        let expected: BTreeSet<i32> = (1..=total_questions).collect();

        sizes == union.len() && union == expected
    }
}

/// Represents the 'attempts' table: one student's session on one test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub user_id: i64,
    pub test_id: i64,
    pub course_id: i64,

    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,

    /// Whole seconds between start and finalization.
    pub time_spent: Option<i64>,

    pub answers: Vec<AnswerEntry>,
    pub question_status: QuestionStatus,

    pub score: i32,
    pub total_marks: i32,
    pub percentage: f64,
    pub percentile: f64,
    pub correct_answers: i32,
    pub wrong_answers: i32,
    pub unattempted: i32,

    pub status: AttemptStatus,

    /// Optimistic-concurrency counter, bumped on every committed write.
    #[serde(skip)]
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attempt {
    pub fn answer_for(&self, question_id: i64) -> Option<&AnswerEntry> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }

    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            attempt_id: self.id,
            status: self.status,
            score: self.score,
            total_marks: self.total_marks,
            percentage: self.percentage,
            percentile: self.percentile,
            correct_answers: self.correct_answers,
            wrong_answers: self.wrong_answers,
            unattempted: self.unattempted,
            time_spent: self.time_spent,
        }
    }
}

/// Result block returned by a successful submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub attempt_id: i64,
    pub status: AttemptStatus,
    pub score: i32,
    pub total_marks: i32,
    pub percentage: f64,
    pub percentile: f64,
    pub correct_answers: i32,
    pub wrong_answers: i32,
    pub unattempted: i32,
    pub time_spent: Option<i64>,
}

/// Attempt plus, once terminal, the answer key for review.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptReport {
    pub attempt: Attempt,

    /// Empty while the attempt is ongoing.
    pub solutions: Vec<Question>,
}

/// DTO for saving (or clearing) one answer.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaveAnswerRequest {
    pub attempt_id: i64,
    pub question_id: i64,

    #[validate(range(min = 1, message = "Question numbers start at 1."))]
    pub question_number: i32,

    /// Omitted or blank clears the response.
    #[validate(length(max = 500))]
    pub answer: Option<String>,

    #[serde(default)]
    pub marked_for_review: bool,

    #[validate(range(min = 0, max = 86400))]
    pub time_taken: Option<i32>,
}

/// DTO for finalizing an attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAttemptRequest {
    pub attempt_id: i64,

    /// Set by the client-side timer when the duration elapses.
    #[serde(default)]
    pub is_auto_submit: bool,
}

// src/models/test.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Points awarded per question outcome.
/// Stored as `mark_*` columns on the 'tests' table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct MarkingScheme {
    #[sqlx(rename = "mark_correct")]
    pub correct: i32,

    /// Usually negative.
    #[sqlx(rename = "mark_wrong")]
    pub wrong: i32,

    #[sqlx(rename = "mark_unattempted")]
    pub unattempted: i32,
}

impl Default for MarkingScheme {
    fn default() -> Self {
        Self {
            correct: 4,
            wrong: -1,
            unattempted: 0,
        }
    }
}

/// Represents the 'tests' table in the database.
///
/// Read-only to the attempt engine except for the aggregate columns
/// (`total_attempts`, `graded_attempts`, `score_sum`, `average_score`).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Test {
    pub id: i64,
    pub course_id: i64,
    pub title: String,

    /// 'chapter' or 'full-length'.
    pub test_type: String,

    pub duration_minutes: i32,
    pub total_questions: i32,
    pub total_marks: i32,

    #[sqlx(flatten)]
    pub marking_scheme: MarkingScheme,

    pub instructions: String,

    /// Incremented once per newly created attempt.
    pub total_attempts: i64,

    /// Number of finalized attempts folded into `score_sum`.
    pub graded_attempts: i64,
    pub score_sum: i64,
    pub average_score: f64,

    pub is_active: bool,
}

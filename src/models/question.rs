// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

pub const TYPE_MCQ: &str = "mcq";
pub const TYPE_MULTI_CORRECT: &str = "multi-correct";

/// Represents the 'questions' table in the database.
/// Carries the answer key, so it must never reach a test-taker before the
/// attempt is finalized.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub test_id: i64,

    /// 1-based position in the question palette.
    pub question_number: i32,

    /// Question type: 'mcq', 'numerical' or 'multi-correct'.
    /// Mapped from the database column 'type' since `type` is a reserved keyword in Rust.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub question_type: String,

    /// Optional passage for comprehension questions.
    pub passage: Option<String>,

    /// The text content of the question.
    pub question: String,

    /// List of options (e.g., ["A", "B", "C", "D"]).
    /// Stored as a JSON array in the database.
    pub options: Json<Vec<String>>,

    /// The correct answer key.
    pub correct_answer: String,

    /// Full option set for 'multi-correct' questions.
    pub correct_answers: Json<Vec<String>>,

    /// Explanation of the correct answer.
    pub solution: Option<String>,

    pub marks: i32,
    pub difficulty: String,
    pub topic: Option<String>,
}

impl Question {
    pub fn is_multi_correct(&self) -> bool {
        self.question_type == TYPE_MULTI_CORRECT
    }
}

/// DTO for sending question to client (excludes answer key and solution).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub question_number: i32,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub question_type: String,
    pub passage: Option<String>,
    pub question: String,
    pub options: Json<Vec<String>>,
    pub marks: i32,
    pub difficulty: String,
    pub topic: Option<String>,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            question_number: q.question_number,
            question_type: q.question_type,
            passage: q.passage,
            question: q.question,
            options: q.options,
            marks: q.marks,
            difficulty: q.difficulty,
            topic: q.topic,
        }
    }
}

// src/store/mod.rs
//
// Persistence boundary of the attempt engine.
//
// `AttemptStore` is the only way an attempt is mutated. The three
// collaborator traits are read-only views of data owned elsewhere
// (content, payments).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    engine::percentile::Standing,
    error::AppError,
    models::{
        attempt::Attempt,
        question::{PublicQuestion, Question},
        test::Test,
    },
};

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The stored row moved on (version bumped or status no longer ongoing).
    Stale,
}

/// Fields needed to open a fresh attempt.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub user_id: i64,
    pub test_id: i64,
    pub course_id: i64,
    pub total_questions: i32,
    pub total_marks: i32,
    pub start_time: DateTime<Utc>,
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Returns the ongoing attempt for `(user_id, test_id)` or atomically
    /// inserts a new one. The flag is `true` when a row was created, in which
    /// case the test's `total_attempts` was incremented in the same commit.
    async fn create_or_get_ongoing(&self, draft: NewAttempt) -> Result<(Attempt, bool), AppError>;

    async fn find(&self, attempt_id: i64) -> Result<Option<Attempt>, AppError>;

    async fn find_ongoing(&self, user_id: i64, test_id: i64) -> Result<Option<Attempt>, AppError>;

    /// Terminal attempts of one user, newest first.
    async fn list_finished_for_user(&self, user_id: i64) -> Result<Vec<Attempt>, AppError>;

    /// Writes answers and palette if the stored version still equals
    /// `attempt.version` and the attempt is ongoing.
    async fn save_progress(&self, attempt: &Attempt) -> Result<CommitOutcome, AppError>;

    /// Snapshot of terminal siblings on the same test, excluding one attempt.
    async fn sibling_standing(
        &self,
        test_id: i64,
        exclude_attempt_id: i64,
        score: i32,
    ) -> Result<Standing, AppError>;

    /// Persists a graded, terminal attempt and folds its score into the test
    /// aggregates as one unit. Same version/ongoing condition as
    /// `save_progress`; on `Stale` nothing is written.
    async fn finalize(&self, attempt: &Attempt) -> Result<CommitOutcome, AppError>;
}

#[async_trait]
pub trait TestRepository: Send + Sync {
    async fn get(&self, test_id: i64) -> Result<Option<Test>, AppError>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Questions ordered by number, answer key stripped.
    async fn list_for_test(&self, test_id: i64) -> Result<Vec<PublicQuestion>, AppError>;

    /// Full records including correct answers. Grading and post-submit review only.
    async fn answer_key(&self, test_id: i64) -> Result<Vec<Question>, AppError>;
}

#[async_trait]
pub trait AccessGate: Send + Sync {
    async fn has_access(&self, user_id: i64, course_id: i64) -> Result<bool, AppError>;
}

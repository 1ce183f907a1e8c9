// src/engine/mod.rs
//
// Test attempt engine.
//
// `AttemptEngine` sequences the attempt lifecycle explicitly:
// start/resume, answer saves, and finalization as
// grade -> percentile -> close -> persist with the aggregate update.
// Each step lives in its own module and is testable without storage.

pub mod lifecycle;
pub mod palette;
pub mod percentile;
pub mod scoring;

use std::sync::Arc;

use chrono::Utc;

use crate::{
    config::MAX_COMMIT_RETRIES,
    error::AppError,
    models::{
        attempt::{Attempt, AttemptReport, QuestionStatus, ResultSummary},
        question::{PublicQuestion, Question},
        test::Test,
    },
    store::{AccessGate, AttemptStore, CommitOutcome, NewAttempt, QuestionRepository, TestRepository},
};

use self::palette::AnswerInput;

/// Caller identity as extracted from a verified token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    /// Admins bypass the purchase check and may read any attempt.
    pub is_admin: bool,
}

impl Principal {
    pub fn student(user_id: i64) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }
}

#[derive(Clone)]
pub struct AttemptEngine {
    attempts: Arc<dyn AttemptStore>,
    tests: Arc<dyn TestRepository>,
    questions: Arc<dyn QuestionRepository>,
    access: Arc<dyn AccessGate>,
}

impl AttemptEngine {
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        tests: Arc<dyn TestRepository>,
        questions: Arc<dyn QuestionRepository>,
        access: Arc<dyn AccessGate>,
    ) -> Self {
        Self {
            attempts,
            tests,
            questions,
            access,
        }
    }

    /// Wires every collaborator to one backing store.
    pub fn with_store<S>(store: Arc<S>) -> Self
    where
        S: AttemptStore + TestRepository + QuestionRepository + AccessGate + 'static,
    {
        Self::new(store.clone(), store.clone(), store.clone(), store)
    }

    async fn load_test(&self, test_id: i64) -> Result<Test, AppError> {
        self.tests
            .get(test_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Test not found".to_string()))
    }

    async fn ensure_access(&self, principal: Principal, course_id: i64) -> Result<(), AppError> {
        if principal.is_admin {
            return Ok(());
        }
        if self.access.has_access(principal.user_id, course_id).await? {
            return Ok(());
        }
        tracing::warn!(
            "Access denied: user {} has no purchase for course {}",
            principal.user_id,
            course_id
        );
        Err(AppError::AccessDenied(
            "Please purchase the course to access this test".to_string(),
        ))
    }

    /// Loads an attempt that belongs to the caller. Foreign attempts are
    /// reported as missing.
    async fn load_owned(&self, principal: Principal, attempt_id: i64) -> Result<Attempt, AppError> {
        match self.attempts.find(attempt_id).await? {
            Some(attempt) if attempt.user_id == principal.user_id => Ok(attempt),
            _ => Err(AppError::NotFound("Attempt not found".to_string())),
        }
    }

    /// Test details, access-gated.
    pub async fn get_test(&self, principal: Principal, test_id: i64) -> Result<Test, AppError> {
        let test = self.load_test(test_id).await?;
        self.ensure_access(principal, test.course_id).await?;
        Ok(test)
    }

    /// Starts a new attempt or returns the caller's ongoing one.
    /// The flag is `true` when a new attempt was created.
    pub async fn create_or_resume_attempt(
        &self,
        principal: Principal,
        test_id: i64,
    ) -> Result<(Attempt, bool), AppError> {
        let test = self.load_test(test_id).await?;
        self.ensure_access(principal, test.course_id).await?;

        if !test.is_active {
            return Err(AppError::StateError("Test is not active".to_string()));
        }

        let draft = NewAttempt {
            user_id: principal.user_id,
            test_id: test.id,
            course_id: test.course_id,
            total_questions: test.total_questions,
            total_marks: test.total_marks,
            start_time: Utc::now(),
        };
        let (attempt, created) = self.attempts.create_or_get_ongoing(draft).await?;

        if created {
            tracing::info!(
                "Attempt {} started: user {} on test {}",
                attempt.id,
                principal.user_id,
                test_id
            );
        } else {
            tracing::info!("Attempt {} resumed by user {}", attempt.id, principal.user_id);
        }

        Ok((attempt, created))
    }

    /// Questions for the caller's ongoing attempt, answer key stripped.
    pub async fn questions_for_attempt(
        &self,
        principal: Principal,
        test_id: i64,
    ) -> Result<(i64, Vec<PublicQuestion>), AppError> {
        let test = self.load_test(test_id).await?;
        self.ensure_access(principal, test.course_id).await?;

        let attempt = self
            .attempts
            .find_ongoing(principal.user_id, test_id)
            .await?
            .ok_or_else(|| {
                AppError::StateError(
                    "No active attempt found. Please start the test first.".to_string(),
                )
            })?;

        let mut questions = self.questions.list_for_test(test_id).await?;
        questions.sort_by_key(|q| q.question_number);

        Ok((attempt.id, questions))
    }

    /// Saves one answer and returns the updated palette.
    pub async fn record_answer(
        &self,
        principal: Principal,
        attempt_id: i64,
        input: AnswerInput,
    ) -> Result<QuestionStatus, AppError> {
        let mut attempt = self.load_owned(principal, attempt_id).await?;
        lifecycle::ensure_ongoing(&attempt)?;

        let questions = self.questions.list_for_test(attempt.test_id).await?;
        let question = questions
            .iter()
            .find(|q| q.id == input.question_id)
            .ok_or_else(|| {
                AppError::Consistency(format!(
                    "Question {} does not belong to test {}",
                    input.question_id, attempt.test_id
                ))
            })?;
        if question.question_number != input.question_number
            || !attempt.question_status.contains(input.question_number)
        {
            return Err(AppError::Consistency(format!(
                "Question {} is number {}, not {}",
                question.id, question.question_number, input.question_number
            )));
        }

        for round in 0..MAX_COMMIT_RETRIES {
            if round > 0 {
                attempt = self.load_owned(principal, attempt_id).await?;
                lifecycle::ensure_ongoing(&attempt)?;
            }

            let snapshot = palette::apply(&mut attempt, &input);
            match self.attempts.save_progress(&attempt).await? {
                CommitOutcome::Committed => return Ok(snapshot),
                CommitOutcome::Stale => {
                    tracing::warn!("Attempt {} changed during answer save, retrying", attempt_id);
                }
            }
        }

        Err(AppError::Conflict(
            "Attempt is being updated concurrently, please retry".to_string(),
        ))
    }

    /// Finalizes an ongoing attempt. Exactly one caller wins a submit race;
    /// the others get `StateError`.
    pub async fn submit_attempt(
        &self,
        principal: Principal,
        attempt_id: i64,
        is_auto_submit: bool,
    ) -> Result<ResultSummary, AppError> {
        let mut attempt = self.load_owned(principal, attempt_id).await?;
        lifecycle::ensure_ongoing(&attempt)?;

        let test = self.load_test(attempt.test_id).await?;
        let answer_key = self.questions.answer_key(attempt.test_id).await?;

        for round in 0..MAX_COMMIT_RETRIES {
            if round > 0 {
                attempt = self.load_owned(principal, attempt_id).await?;
                lifecycle::ensure_ongoing(&attempt)?;
            }

            match self
                .finalize(&mut attempt, &test, &answer_key, is_auto_submit)
                .await?
            {
                CommitOutcome::Committed => {
                    tracing::info!(
                        "Attempt {} {}: score {}/{}, percentile {:.2}",
                        attempt.id,
                        attempt.status,
                        attempt.score,
                        attempt.total_marks,
                        attempt.percentile
                    );
                    return Ok(attempt.summary());
                }
                CommitOutcome::Stale => {
                    tracing::warn!("Attempt {} changed during submit, retrying", attempt_id);
                }
            }
        }

        Err(AppError::Conflict(
            "Attempt is being updated concurrently, please retry".to_string(),
        ))
    }

    /// grade -> percentile -> terminal transition -> persist (with aggregate update).
    /// Nothing is written unless the final conditional commit succeeds.
    async fn finalize(
        &self,
        attempt: &mut Attempt,
        test: &Test,
        answer_key: &[Question],
        is_auto_submit: bool,
    ) -> Result<CommitOutcome, AppError> {
        let graded = scoring::grade(attempt, test, answer_key);

        let standing = self
            .attempts
            .sibling_standing(attempt.test_id, attempt.id, graded.score)
            .await?;
        attempt.percentile = percentile::percentile(&standing);

        lifecycle::close(attempt, is_auto_submit, Utc::now())?;

        self.attempts.finalize(attempt).await
    }

    /// Attempt details. The answer key is attached only once the attempt is
    /// terminal.
    pub async fn get_attempt(
        &self,
        principal: Principal,
        attempt_id: i64,
    ) -> Result<AttemptReport, AppError> {
        let attempt = match self.attempts.find(attempt_id).await? {
            Some(a) if a.user_id == principal.user_id || principal.is_admin => a,
            _ => return Err(AppError::NotFound("Attempt not found".to_string())),
        };

        let solutions = if attempt.status.is_terminal() {
            let mut key = self.questions.answer_key(attempt.test_id).await?;
            key.sort_by_key(|q| q.question_number);
            key
        } else {
            Vec::new()
        };

        Ok(AttemptReport { attempt, solutions })
    }

    /// The caller's finished attempts, newest first.
    pub async fn list_my_attempts(&self, principal: Principal) -> Result<Vec<Attempt>, AppError> {
        self.attempts.list_finished_for_user(principal.user_id).await
    }
}

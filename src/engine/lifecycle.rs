// src/engine/lifecycle.rs
//
// Attempt state machine: `ongoing -> submitted | auto-submitted`.

use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::attempt::{Attempt, AttemptStatus, QuestionStatus},
    store::NewAttempt,
};

/// Builds a fresh ongoing attempt with every question unvisited.
pub fn open(id: i64, draft: NewAttempt) -> Attempt {
    Attempt {
        id,
        user_id: draft.user_id,
        test_id: draft.test_id,
        course_id: draft.course_id,
        start_time: draft.start_time,
        end_time: None,
        time_spent: None,
        answers: Vec::new(),
        question_status: QuestionStatus::new(draft.total_questions),
        score: 0,
        total_marks: draft.total_marks,
        percentage: 0.0,
        percentile: 0.0,
        correct_answers: 0,
        wrong_answers: 0,
        unattempted: 0,
        status: AttemptStatus::Ongoing,
        version: 0,
        created_at: draft.start_time,
        updated_at: draft.start_time,
    }
}

pub fn ensure_ongoing(attempt: &Attempt) -> Result<(), AppError> {
    if attempt.status.is_terminal() {
        return Err(AppError::StateError(format!(
            "Attempt {} is already {}",
            attempt.id, attempt.status
        )));
    }
    Ok(())
}

/// Moves an ongoing attempt to its terminal state and stamps the timing.
pub fn close(attempt: &mut Attempt, auto_submit: bool, now: DateTime<Utc>) -> Result<(), AppError> {
    ensure_ongoing(attempt)?;

    attempt.end_time = Some(now);
    attempt.time_spent = Some((now - attempt.start_time).num_seconds().max(0));
    attempt.status = if auto_submit {
        AttemptStatus::AutoSubmitted
    } else {
        AttemptStatus::Submitted
    };
    attempt.updated_at = now;

    Ok(())
}

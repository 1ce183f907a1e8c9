// src/handlers/exam.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    engine::{AttemptEngine, palette::AnswerInput},
    error::AppError,
    models::attempt::{SaveAnswerRequest, SubmitAttemptRequest},
    utils::jwt::Claims,
};

/// Returns test details (configuration, marking scheme, statistics).
/// Requires a purchase of the test's course.
pub async fn get_test(
    State(engine): State<AttemptEngine>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let test = engine.get_test(claims.principal()?, test_id).await?;

    Ok(Json(test))
}

/// Starts the test or resumes the caller's ongoing attempt.
///
/// * 201 with a fresh attempt.
/// * 200 with the existing attempt when one is already ongoing.
pub async fn start_test(
    State(engine): State<AttemptEngine>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (attempt, created) = engine
        .create_or_resume_attempt(claims.principal()?, test_id)
        .await?;

    let (status, message) = if created {
        (StatusCode::CREATED, "Test started successfully")
    } else {
        (StatusCode::OK, "Resuming existing attempt")
    };

    Ok((
        status,
        Json(serde_json::json!({
            "message": message,
            "attempt": attempt,
        })),
    ))
}

/// Lists the questions of the caller's ongoing attempt, without answers.
pub async fn get_questions(
    State(engine): State<AttemptEngine>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (attempt_id, questions) = engine
        .questions_for_attempt(claims.principal()?, test_id)
        .await?;

    Ok(Json(serde_json::json!({
        "attempt_id": attempt_id,
        "questions": questions,
    })))
}

/// Saves (or clears) one answer and returns the updated question palette.
pub async fn save_answer(
    State(engine): State<AttemptEngine>,
    Extension(claims): Extension<Claims>,
    Path(_test_id): Path<i64>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let input = AnswerInput {
        question_id: payload.question_id,
        question_number: payload.question_number,
        answer: payload.answer,
        marked_for_review: payload.marked_for_review,
        time_taken: payload.time_taken,
    };

    let question_status = engine
        .record_answer(claims.principal()?, payload.attempt_id, input)
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Answer saved",
        "question_status": question_status,
    })))
}

/// Submits the attempt for grading.
///
/// Manual and timer-driven submissions share this endpoint; the latter set
/// `is_auto_submit`.
pub async fn submit_test(
    State(engine): State<AttemptEngine>,
    Extension(claims): Extension<Claims>,
    Path(_test_id): Path<i64>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = engine
        .submit_attempt(claims.principal()?, payload.attempt_id, payload.is_auto_submit)
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Test submitted successfully",
        "result": result,
    })))
}

// src/handlers/attempt.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{engine::AttemptEngine, error::AppError, utils::jwt::Claims};

/// Attempt details; solutions are included once the attempt is submitted.
pub async fn get_attempt(
    State(engine): State<AttemptEngine>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let report = engine.get_attempt(claims.principal()?, attempt_id).await?;

    Ok(Json(report))
}

/// The caller's finished attempts, newest first.
pub async fn list_my_attempts(
    State(engine): State<AttemptEngine>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = engine.list_my_attempts(claims.principal()?).await?;

    Ok(Json(serde_json::json!({
        "count": attempts.len(),
        "attempts": attempts,
    })))
}

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

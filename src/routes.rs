// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{attempt, exam},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Mounts the exam routes under `/api/tests` and attempt reads under `/api/attempts`.
/// * Everything except `/health` requires a bearer token.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = match state.config.frontend_url.parse() {
        Ok(origin) => vec![origin],
        Err(_) => {
            tracing::warn!(
                "Ignoring invalid FRONTEND_URL '{}' for CORS",
                state.config.frontend_url
            );
            Vec::new()
        }
    };

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let test_routes = Router::new()
        .route("/my-attempts", get(attempt::list_my_attempts))
        .route("/{id}", get(exam::get_test))
        .route("/{id}/start", post(exam::start_test))
        .route("/{id}/questions", get(exam::get_questions))
        .route("/{id}/save-answer", post(exam::save_answer))
        .route("/{id}/submit", post(exam::submit_test));

    let attempt_routes = Router::new().route("/{id}", get(attempt::get_attempt));

    let protected = Router::new()
        .nest("/api/tests", test_routes)
        .nest("/api/attempts", attempt_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(attempt::health))
        .merge(protected)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

// tests/pg_store_tests.rs
//
// Runs the engine against Postgres. Skipped unless DATABASE_URL is set.

use std::sync::Arc;

use exam_backend::{
    engine::{AttemptEngine, Principal, palette::AnswerInput},
    error::AppError,
    models::attempt::AttemptStatus,
    store::{AccessGate, TestRepository, postgres::PgStore},
};
use sqlx::{PgPool, postgres::PgPoolOptions};

async fn connect() -> Option<PgPool> {
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(pool)
}

/// Positive id that will not collide with rows from earlier runs.
fn unique_id() -> i64 {
    (uuid::Uuid::new_v4().as_u128() % 1_000_000_000_000) as i64 + 1
}

struct Fixture {
    store: Arc<PgStore>,
    engine: AttemptEngine,
    test_id: i64,
    course_id: i64,
    question_ids: Vec<i64>,
}

/// Seeds a 3-question test (answer "B" everywhere) for a fresh course.
async fn seed(pool: PgPool) -> Fixture {
    let course_id = unique_id();
    let title = format!("Mock {}", uuid::Uuid::new_v4());

    let test_id: i64 = sqlx::query_scalar(
        "INSERT INTO tests (course_id, title, duration_minutes, total_questions, total_marks)
         VALUES ($1, $2, 60, 3, 12) RETURNING id",
    )
    .bind(course_id)
    .bind(&title)
    .fetch_one(&pool)
    .await
    .unwrap();

    let mut question_ids = Vec::new();
    for number in 1..=3 {
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO questions (test_id, question_number, question, options, correct_answer)
               VALUES ($1, $2, $3, '["A","B","C","D"]', 'B') RETURNING id"#,
        )
        .bind(test_id)
        .bind(number)
        .bind(format!("Question {}", number))
        .fetch_one(&pool)
        .await
        .unwrap();
        question_ids.push(id);
    }

    let store = Arc::new(PgStore::new(pool));
    let engine = AttemptEngine::with_store(store.clone());

    Fixture {
        store,
        engine,
        test_id,
        course_id,
        question_ids,
    }
}

async fn purchase(pool: &PgPool, user_id: i64, course_id: i64, status: &str) {
    sqlx::query("INSERT INTO purchases (user_id, course_id, status) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(course_id)
        .bind(status)
        .execute(pool)
        .await
        .unwrap();
}

fn answer(fx: &Fixture, number: i32, value: &str) -> AnswerInput {
    AnswerInput {
        question_id: fx.question_ids[(number - 1) as usize],
        question_number: number,
        answer: Some(value.to_string()),
        marked_for_review: false,
        time_taken: Some(15),
    }
}

#[tokio::test]
async fn only_successful_purchases_grant_access() {
    let Some(pool) = connect().await else {
        return;
    };
    let fx = seed(pool.clone()).await;
    let paid = unique_id();
    let pending = unique_id();
    purchase(&pool, paid, fx.course_id, "success").await;
    purchase(&pool, pending, fx.course_id, "pending").await;

    assert!(fx.store.has_access(paid, fx.course_id).await.unwrap());
    assert!(!fx.store.has_access(pending, fx.course_id).await.unwrap());

    let err = fx
        .engine
        .create_or_resume_attempt(Principal::student(pending), fx.test_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccessDenied(_)));
}

#[tokio::test]
async fn concurrent_starts_hit_the_ongoing_index_once() {
    let Some(pool) = connect().await else {
        return;
    };
    let fx = seed(pool.clone()).await;
    let user = unique_id();
    purchase(&pool, user, fx.course_id, "success").await;

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let engine = fx.engine.clone();
            let test_id = fx.test_id;
            tokio::spawn(async move {
                engine
                    .create_or_resume_attempt(Principal::student(user), test_id)
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        let (attempt, _) = handle.await.unwrap().unwrap();
        ids.push(attempt.id);
    }
    assert!(ids.iter().all(|id| *id == ids[0]));

    let ongoing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM attempts WHERE user_id = $1 AND test_id = $2 AND status = 'ongoing'",
    )
    .bind(user)
    .bind(fx.test_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(ongoing, 1);

    let test = fx.store.get(fx.test_id).await.unwrap().unwrap();
    assert_eq!(test.total_attempts, 1);
}

#[tokio::test]
async fn submit_persists_result_and_aggregates() {
    let Some(pool) = connect().await else {
        return;
    };
    let fx = seed(pool.clone()).await;
    let first = unique_id();
    let second = unique_id();
    purchase(&pool, first, fx.course_id, "success").await;
    purchase(&pool, second, fx.course_id, "success").await;

    // 4 + 4 - 1 = 7
    let (a, _) = fx
        .engine
        .create_or_resume_attempt(Principal::student(first), fx.test_id)
        .await
        .unwrap();
    for (number, value) in [(1, "B"), (2, "B"), (3, "C")] {
        fx.engine
            .record_answer(Principal::student(first), a.id, answer(&fx, number, value))
            .await
            .unwrap();
    }
    let result = fx
        .engine
        .submit_attempt(Principal::student(first), a.id, false)
        .await
        .unwrap();
    assert_eq!(result.score, 7);
    assert_eq!(result.percentile, 0.0);

    // 4, outranked by the first finisher
    let (b, _) = fx
        .engine
        .create_or_resume_attempt(Principal::student(second), fx.test_id)
        .await
        .unwrap();
    fx.engine
        .record_answer(Principal::student(second), b.id, answer(&fx, 1, "B"))
        .await
        .unwrap();
    let result = fx
        .engine
        .submit_attempt(Principal::student(second), b.id, true)
        .await
        .unwrap();
    assert_eq!(result.score, 4);
    assert_eq!(result.percentile, 0.0);
    assert_eq!(result.status, AttemptStatus::AutoSubmitted);

    let stored = fx
        .engine
        .get_attempt(Principal::student(first), a.id)
        .await
        .unwrap();
    assert_eq!(stored.attempt.status, AttemptStatus::Submitted);
    assert_eq!(stored.attempt.correct_answers, 2);
    assert_eq!(stored.solutions.len(), 3);

    let test = fx.store.get(fx.test_id).await.unwrap().unwrap();
    assert_eq!(test.graded_attempts, 2);
    assert_eq!(test.score_sum, 11);
    assert!((test.average_score - 5.5).abs() < 1e-9);

    let err = fx
        .engine
        .submit_attempt(Principal::student(first), a.id, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StateError(_)));
}

#[tokio::test]
async fn concurrent_saves_survive_round_trip() {
    let Some(pool) = connect().await else {
        return;
    };
    let fx = seed(pool.clone()).await;
    let user = unique_id();
    purchase(&pool, user, fx.course_id, "success").await;

    let (attempt, _) = fx
        .engine
        .create_or_resume_attempt(Principal::student(user), fx.test_id)
        .await
        .unwrap();

    let handles: Vec<_> = (1..=3)
        .map(|number| {
            let engine = fx.engine.clone();
            let input = answer(&fx, number, "A");
            tokio::spawn(async move {
                engine
                    .record_answer(Principal::student(user), attempt.id, input)
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let report = fx
        .engine
        .get_attempt(Principal::student(user), attempt.id)
        .await
        .unwrap();
    assert_eq!(report.attempt.answers.len(), 3);
    assert!(report.attempt.question_status.is_partition_of(3));
    assert!(report.solutions.is_empty());
}

// src/store/postgres.rs
//
// Postgres implementation of the store traits.
//
// Session uniqueness relies on the partial unique index
// `idx_attempts_one_ongoing`; every attempt write is conditional on the
// `version` column and `status = 'ongoing'`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};

use crate::{
    config::MAX_COMMIT_RETRIES,
    engine::percentile::Standing,
    error::AppError,
    models::{
        attempt::{AnswerEntry, Attempt, AttemptStatus, QuestionStatus},
        question::{PublicQuestion, Question},
        test::Test,
    },
    store::{AccessGate, AttemptStore, CommitOutcome, NewAttempt, QuestionRepository, TestRepository},
};

const ATTEMPT_COLUMNS: &str = "id, user_id, test_id, course_id, start_time, end_time, time_spent, \
     answers, question_status, score, total_marks, percentage, percentile, \
     correct_answers, wrong_answers, unattempted, status, version, created_at, updated_at";

/// Raw 'attempts' row; JSONB columns decoded via `sqlx::types::Json`.
#[derive(FromRow)]
struct AttemptRow {
    id: i64,
    user_id: i64,
    test_id: i64,
    course_id: i64,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    time_spent: Option<i64>,
    answers: Json<Vec<AnswerEntry>>,
    question_status: Json<QuestionStatus>,
    score: i32,
    total_marks: i32,
    percentage: f64,
    percentile: f64,
    correct_answers: i32,
    wrong_answers: i32,
    unattempted: i32,
    status: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<AttemptStatus>()
            .map_err(AppError::InternalServerError)?;

        Ok(Attempt {
            id: row.id,
            user_id: row.user_id,
            test_id: row.test_id,
            course_id: row.course_id,
            start_time: row.start_time,
            end_time: row.end_time,
            time_spent: row.time_spent,
            answers: row.answers.0,
            question_status: row.question_status.0,
            score: row.score,
            total_marks: row.total_marks,
            percentage: row.percentage,
            percentile: row.percentile,
            correct_answers: row.correct_answers,
            wrong_answers: row.wrong_answers,
            unattempted: row.unattempted,
            status,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Distinguishes "row moved on" from "row never existed" after a
    /// conditional update touched nothing.
    async fn stale_or_missing(&self, attempt_id: i64) -> Result<CommitOutcome, AppError> {
        match self.find(attempt_id).await? {
            Some(_) => Ok(CommitOutcome::Stale),
            None => Err(AppError::NotFound("Attempt not found".to_string())),
        }
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn create_or_get_ongoing(&self, draft: NewAttempt) -> Result<(Attempt, bool), AppError> {
        let insert_sql = format!(
            r#"
            INSERT INTO attempts (user_id, test_id, course_id, start_time, total_marks, question_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $4, $4)
            ON CONFLICT (user_id, test_id) WHERE status = 'ongoing' DO NOTHING
            RETURNING {}
            "#,
            ATTEMPT_COLUMNS
        );

        for _ in 0..MAX_COMMIT_RETRIES {
            let mut tx = self.pool.begin().await?;

            let inserted = sqlx::query_as::<_, AttemptRow>(&insert_sql)
                .bind(draft.user_id)
                .bind(draft.test_id)
                .bind(draft.course_id)
                .bind(draft.start_time)
                .bind(draft.total_marks)
                .bind(Json(QuestionStatus::new(draft.total_questions)))
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to insert attempt: {:?}", e);
                    AppError::InternalServerError(e.to_string())
                })?;

            if let Some(row) = inserted {
                sqlx::query("UPDATE tests SET total_attempts = total_attempts + 1 WHERE id = $1")
                    .bind(draft.test_id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                return Ok((Attempt::try_from(row)?, true));
            }

            tx.rollback().await?;

            if let Some(existing) = self.find_ongoing(draft.user_id, draft.test_id).await? {
                return Ok((existing, false));
            }
            // The conflicting attempt was finalized in between; insert again.
        }

        Err(AppError::Conflict(
            "Could not open an attempt, please retry".to_string(),
        ))
    }

    async fn find(&self, attempt_id: i64) -> Result<Option<Attempt>, AppError> {
        let sql = format!("SELECT {} FROM attempts WHERE id = $1", ATTEMPT_COLUMNS);
        sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Attempt::try_from)
            .transpose()
    }

    async fn find_ongoing(&self, user_id: i64, test_id: i64) -> Result<Option<Attempt>, AppError> {
        let sql = format!(
            "SELECT {} FROM attempts WHERE user_id = $1 AND test_id = $2 AND status = 'ongoing'",
            ATTEMPT_COLUMNS
        );
        sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(user_id)
            .bind(test_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Attempt::try_from)
            .transpose()
    }

    async fn list_finished_for_user(&self, user_id: i64) -> Result<Vec<Attempt>, AppError> {
        let sql = format!(
            r#"
            SELECT {} FROM attempts
            WHERE user_id = $1 AND status <> 'ongoing'
            ORDER BY created_at DESC, id DESC
            "#,
            ATTEMPT_COLUMNS
        );
        sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list attempts: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?
            .into_iter()
            .map(Attempt::try_from)
            .collect()
    }

    async fn save_progress(&self, attempt: &Attempt) -> Result<CommitOutcome, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE attempts
            SET answers = $1, question_status = $2, version = version + 1, updated_at = NOW()
            WHERE id = $3 AND version = $4 AND status = 'ongoing'
            "#,
        )
        .bind(Json(&attempt.answers))
        .bind(Json(&attempt.question_status))
        .bind(attempt.id)
        .bind(attempt.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(CommitOutcome::Committed)
        } else {
            self.stale_or_missing(attempt.id).await
        }
    }

    async fn sibling_standing(
        &self,
        test_id: i64,
        exclude_attempt_id: i64,
        score: i32,
    ) -> Result<Standing, AppError> {
        let (below, total) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE score < $3),
                COUNT(*)
            FROM attempts
            WHERE test_id = $1 AND id <> $2 AND status <> 'ongoing'
            "#,
        )
        .bind(test_id)
        .bind(exclude_attempt_id)
        .bind(score)
        .fetch_one(&self.pool)
        .await?;

        Ok(Standing { below, total })
    }

    async fn finalize(&self, attempt: &Attempt) -> Result<CommitOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE attempts
            SET end_time = $1, time_spent = $2, answers = $3, score = $4,
                percentage = $5, percentile = $6, correct_answers = $7,
                wrong_answers = $8, unattempted = $9, status = $10,
                version = version + 1, updated_at = NOW()
            WHERE id = $11 AND version = $12 AND status = 'ongoing'
            "#,
        )
        .bind(attempt.end_time)
        .bind(attempt.time_spent)
        .bind(Json(&attempt.answers))
        .bind(attempt.score)
        .bind(attempt.percentage)
        .bind(attempt.percentile)
        .bind(attempt.correct_answers)
        .bind(attempt.wrong_answers)
        .bind(attempt.unattempted)
        .bind(attempt.status.as_str())
        .bind(attempt.id)
        .bind(attempt.version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return self.stale_or_missing(attempt.id).await;
        }

        // Running mean; equals the mean over every terminal attempt of the test.
        sqlx::query(
            r#"
            UPDATE tests
            SET graded_attempts = graded_attempts + 1,
                score_sum = score_sum + $2,
                average_score = (score_sum + $2)::DOUBLE PRECISION / (graded_attempts + 1)
            WHERE id = $1
            "#,
        )
        .bind(attempt.test_id)
        .bind(i64::from(attempt.score))
        .execute(&mut *tx)
        .await?;

        tx.commit().await.map_err(|e| {
            tracing::error!("Failed to commit attempt {}: {:?}", attempt.id, e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(CommitOutcome::Committed)
    }
}

#[async_trait]
impl TestRepository for PgStore {
    async fn get(&self, test_id: i64) -> Result<Option<Test>, AppError> {
        let test = sqlx::query_as::<_, Test>(
            r#"
            SELECT
                id, course_id, title, test_type, duration_minutes,
                total_questions, total_marks,
                mark_correct, mark_wrong, mark_unattempted,
                instructions, total_attempts, graded_attempts, score_sum,
                average_score, is_active
            FROM tests
            WHERE id = $1
            "#,
        )
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(test)
    }
}

#[async_trait]
impl QuestionRepository for PgStore {
    async fn list_for_test(&self, test_id: i64) -> Result<Vec<PublicQuestion>, AppError> {
        let questions = sqlx::query_as::<_, PublicQuestion>(
            r#"
            SELECT id, question_number, type, passage, question, options, marks, difficulty, topic
            FROM questions
            WHERE test_id = $1
            ORDER BY question_number
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch questions: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(questions)
    }

    async fn answer_key(&self, test_id: i64) -> Result<Vec<Question>, AppError> {
        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT
                id, test_id, question_number, type, passage, question, options,
                correct_answer, correct_answers, solution, marks, difficulty, topic
            FROM questions
            WHERE test_id = $1
            ORDER BY question_number
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch answer key: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(questions)
    }
}

#[async_trait]
impl AccessGate for PgStore {
    async fn has_access(&self, user_id: i64, course_id: i64) -> Result<bool, AppError> {
        let purchased = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM purchases
                WHERE user_id = $1 AND course_id = $2 AND status = 'success'
                  AND (valid_till IS NULL OR valid_till > NOW())
            )
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(purchased)
    }
}

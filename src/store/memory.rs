// src/store/memory.rs
//
// In-process store backing every repository trait.
//
// All state sits behind one `tokio::sync::Mutex` that is never held across
// an await, so each trait call is a single atomic step.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    engine::{
        lifecycle,
        percentile::{self, Standing},
    },
    error::AppError,
    models::{
        attempt::{Attempt, AttemptStatus},
        question::{PublicQuestion, Question},
        test::Test,
    },
    store::{AccessGate, AttemptStore, CommitOutcome, NewAttempt, QuestionRepository, TestRepository},
};

#[derive(Default)]
struct Inner {
    last_attempt_id: i64,
    attempts: HashMap<i64, Attempt>,
    /// (user_id, test_id) -> ongoing attempt id
    ongoing: HashMap<(i64, i64), i64>,
    tests: HashMap<i64, Test>,
    questions: Vec<Question>,
    purchases: HashSet<(i64, i64)>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_test(&self, test: Test) {
        self.inner.lock().await.tests.insert(test.id, test);
    }

    pub async fn insert_question(&self, question: Question) {
        let mut inner = self.inner.lock().await;
        inner.questions.retain(|q| q.id != question.id);
        inner.questions.push(question);
    }

    /// Records a successful purchase of `course_id` by `user_id`.
    pub async fn grant_access(&self, user_id: i64, course_id: i64) {
        self.inner.lock().await.purchases.insert((user_id, course_id));
    }
}

fn is_current(stored: &Attempt, candidate: &Attempt) -> bool {
    stored.version == candidate.version && stored.status == AttemptStatus::Ongoing
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn create_or_get_ongoing(&self, draft: NewAttempt) -> Result<(Attempt, bool), AppError> {
        let mut inner = self.inner.lock().await;
        let key = (draft.user_id, draft.test_id);

        if let Some(existing) = inner.ongoing.get(&key).and_then(|id| inner.attempts.get(id)) {
            return Ok((existing.clone(), false));
        }

        inner.last_attempt_id += 1;
        let attempt = lifecycle::open(inner.last_attempt_id, draft);

        inner.ongoing.insert(key, attempt.id);
        inner.attempts.insert(attempt.id, attempt.clone());
        if let Some(test) = inner.tests.get_mut(&attempt.test_id) {
            test.total_attempts += 1;
        }

        Ok((attempt, true))
    }

    async fn find(&self, attempt_id: i64) -> Result<Option<Attempt>, AppError> {
        Ok(self.inner.lock().await.attempts.get(&attempt_id).cloned())
    }

    async fn find_ongoing(&self, user_id: i64, test_id: i64) -> Result<Option<Attempt>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .ongoing
            .get(&(user_id, test_id))
            .and_then(|id| inner.attempts.get(id))
            .cloned())
    }

    async fn list_finished_for_user(&self, user_id: i64) -> Result<Vec<Attempt>, AppError> {
        let inner = self.inner.lock().await;
        let mut finished: Vec<Attempt> = inner
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.status.is_terminal())
            .cloned()
            .collect();
        finished.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(finished)
    }

    async fn save_progress(&self, attempt: &Attempt) -> Result<CommitOutcome, AppError> {
        let mut inner = self.inner.lock().await;
        let Some(stored) = inner.attempts.get_mut(&attempt.id) else {
            return Err(AppError::NotFound("Attempt not found".to_string()));
        };
        if !is_current(stored, attempt) {
            return Ok(CommitOutcome::Stale);
        }

        stored.answers = attempt.answers.clone();
        stored.question_status = attempt.question_status.clone();
        stored.version += 1;
        stored.updated_at = chrono::Utc::now();

        Ok(CommitOutcome::Committed)
    }

    async fn sibling_standing(
        &self,
        test_id: i64,
        exclude_attempt_id: i64,
        score: i32,
    ) -> Result<Standing, AppError> {
        let inner = self.inner.lock().await;
        let siblings = inner
            .attempts
            .values()
            .filter(|a| a.test_id == test_id && a.id != exclude_attempt_id && a.status.is_terminal())
            .map(|a| a.score);
        Ok(Standing::from_scores(score, siblings))
    }

    async fn finalize(&self, attempt: &Attempt) -> Result<CommitOutcome, AppError> {
        let mut inner = self.inner.lock().await;
        match inner.attempts.get(&attempt.id) {
            Some(stored) if is_current(stored, attempt) => {}
            Some(_) => return Ok(CommitOutcome::Stale),
            None => return Err(AppError::NotFound("Attempt not found".to_string())),
        }

        let mut committed = attempt.clone();
        committed.version += 1;

        inner.ongoing.remove(&(attempt.user_id, attempt.test_id));
        if let Some(test) = inner.tests.get_mut(&attempt.test_id) {
            percentile::fold_score(test, attempt.score);
        }
        inner.attempts.insert(committed.id, committed);

        Ok(CommitOutcome::Committed)
    }
}

#[async_trait]
impl TestRepository for MemoryStore {
    async fn get(&self, test_id: i64) -> Result<Option<Test>, AppError> {
        Ok(self.inner.lock().await.tests.get(&test_id).cloned())
    }
}

#[async_trait]
impl QuestionRepository for MemoryStore {
    async fn list_for_test(&self, test_id: i64) -> Result<Vec<PublicQuestion>, AppError> {
        Ok(self
            .answer_key(test_id)
            .await?
            .into_iter()
            .map(PublicQuestion::from)
            .collect())
    }

    async fn answer_key(&self, test_id: i64) -> Result<Vec<Question>, AppError> {
        let inner = self.inner.lock().await;
        let mut questions: Vec<Question> = inner
            .questions
            .iter()
            .filter(|q| q.test_id == test_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.question_number);
        Ok(questions)
    }
}

#[async_trait]
impl AccessGate for MemoryStore {
    async fn has_access(&self, user_id: i64, course_id: i64) -> Result<bool, AppError> {
        Ok(self.inner.lock().await.purchases.contains(&(user_id, course_id)))
    }
}

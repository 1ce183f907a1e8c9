// src/engine/palette.rs
//
// Question palette bookkeeping for a single answer save.

use crate::models::attempt::{AnswerEntry, Attempt, QuestionStatus};

/// The four palette buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Answered,
    NotAnswered,
    MarkedForReview,
    NotVisited,
}

/// One answer save as received from the client.
#[derive(Debug, Clone)]
pub struct AnswerInput {
    pub question_id: i64,
    pub question_number: i32,
    pub answer: Option<String>,
    pub marked_for_review: bool,
    pub time_taken: Option<i32>,
}

impl AnswerInput {
    /// Blank strings count as a cleared response.
    fn normalized_answer(&self) -> Option<String> {
        self.answer
            .as_ref()
            .filter(|a| !a.trim().is_empty())
            .cloned()
    }

    /// Review flag wins over the answer; a missing answer means cleared.
    fn target_slot(&self) -> Slot {
        if self.marked_for_review {
            Slot::MarkedForReview
        } else if self.normalized_answer().is_some() {
            Slot::Answered
        } else {
            Slot::NotAnswered
        }
    }
}

/// Moves `number` into `slot`, removing it from every other bucket so the
/// sets stay pairwise disjoint.
pub fn move_to(status: &mut QuestionStatus, number: i32, slot: Slot) {
    status.answered.remove(&number);
    status.not_answered.remove(&number);
    status.marked_for_review.remove(&number);
    status.not_visited.remove(&number);

    let target = match slot {
        Slot::Answered => &mut status.answered,
        Slot::NotAnswered => &mut status.not_answered,
        Slot::MarkedForReview => &mut status.marked_for_review,
        Slot::NotVisited => &mut status.not_visited,
    };
    target.insert(number);
}

/// Applies one save to an in-memory attempt: upserts the answer entry and
/// updates the palette. The caller persists the result as one unit.
///
/// A save without a value (absent or blank) removes the entry, so
/// `answers` only ever holds questions that carry a response.
pub fn apply(attempt: &mut Attempt, input: &AnswerInput) -> QuestionStatus {
    let position = attempt
        .answers
        .iter()
        .position(|a| a.question_id == input.question_id);

    match (input.normalized_answer(), position) {
        (None, Some(index)) => {
            attempt.answers.remove(index);
        }
        (None, None) => {}
        (Some(answer), Some(index)) => {
            let entry = &mut attempt.answers[index];
            entry.answer = Some(answer);
            entry.marked_for_review = input.marked_for_review;
            entry.is_correct = None;
            if let Some(secs) = input.time_taken {
                entry.time_taken = Some(entry.time_taken.unwrap_or(0).saturating_add(secs));
            }
        }
        (Some(answer), None) => attempt.answers.push(AnswerEntry {
            question_id: input.question_id,
            answer: Some(answer),
            is_correct: None,
            time_taken: input.time_taken,
            marked_for_review: input.marked_for_review,
        }),
    }

    move_to(
        &mut attempt.question_status,
        input.question_number,
        input.target_slot(),
    );

    attempt.question_status.clone()
}

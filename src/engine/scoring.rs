// src/engine/scoring.rs
//
// Grading an attempt against the test's marking scheme.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::{attempt::Attempt, question::Question, test::Test};

/// Outcome of grading, copied onto the attempt by `grade`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeSummary {
    pub score: i32,
    pub percentage: f64,
    pub correct_answers: i32,
    pub wrong_answers: i32,
    pub unattempted: i32,
}

/// Strict match against the answer key.
///
/// Multi-correct questions with a non-empty `correct_answers` list accept the
/// same options in any order, written comma separated ("A, C").
pub fn is_correct(question: &Question, submitted: &str) -> bool {
    if question.is_multi_correct() && !question.correct_answers.is_empty() {
        let expected: BTreeSet<&str> = question.correct_answers.iter().map(|s| s.trim()).collect();
        let given: BTreeSet<&str> = submitted
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        return given == expected;
    }

    submitted == question.correct_answer
}

/// Grades every saved answer, sets `is_correct` on each entry and writes the
/// result fields of the attempt.
///
/// Every entry whose question is in the key is graded; an entry without a
/// value counts as wrong. `unattempted` is the number of questions with no
/// entry at all. The clamp to zero is applied once to the summed score,
/// never per question.
pub fn grade(attempt: &mut Attempt, test: &Test, answer_key: &[Question]) -> GradeSummary {
    let key: HashMap<i64, &Question> = answer_key.iter().map(|q| (q.id, q)).collect();
    let scheme = test.marking_scheme;

    let mut raw: i64 = 0;
    let mut correct_answers = 0;
    let mut wrong_answers = 0;

    for entry in attempt.answers.iter_mut() {
        let Some(question) = key.get(&entry.question_id) else {
            continue;
        };

        if is_correct(question, entry.answer.as_deref().unwrap_or_default()) {
            entry.is_correct = Some(true);
            correct_answers += 1;
            raw += i64::from(scheme.correct);
        } else {
            entry.is_correct = Some(false);
            wrong_answers += 1;
            raw += i64::from(scheme.wrong);
        }
    }

    let present: HashSet<i64> = attempt.answers.iter().map(|a| a.question_id).collect();
    let present = i32::try_from(present.len()).unwrap_or(i32::MAX);
    let unattempted = (test.total_questions - present).max(0);
    raw += i64::from(unattempted) * i64::from(scheme.unattempted);

    let score = i32::try_from(raw.max(0)).unwrap_or(i32::MAX);
    let percentage = if attempt.total_marks > 0 {
        (score as f64 / attempt.total_marks as f64) * 100.0
    } else {
        0.0
    };

    attempt.score = score;
    attempt.percentage = percentage;
    attempt.correct_answers = correct_answers;
    attempt.wrong_answers = wrong_answers;
    attempt.unattempted = unattempted;

    GradeSummary {
        score,
        percentage,
        correct_answers,
        wrong_answers,
        unattempted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{lifecycle, palette};
    use crate::models::attempt::AnswerEntry;
    use crate::models::question::{TYPE_MCQ, TYPE_MULTI_CORRECT};
    use crate::models::test::MarkingScheme;
    use crate::store::NewAttempt;
    use chrono::Utc;
    use sqlx::types::Json;

    fn five_question_test() -> Test {
        Test {
            id: 1,
            course_id: 1,
            title: "Physics Mock 1".to_string(),
            test_type: "chapter".to_string(),
            duration_minutes: 30,
            total_questions: 5,
            total_marks: 20,
            marking_scheme: MarkingScheme {
                correct: 4,
                wrong: -1,
                unattempted: 0,
            },
            instructions: String::new(),
            total_attempts: 0,
            graded_attempts: 0,
            score_sum: 0,
            average_score: 0.0,
            is_active: true,
        }
    }

    fn question(id: i64, number: i32, answer: &str) -> Question {
        Question {
            id,
            test_id: 1,
            question_number: number,
            question_type: TYPE_MCQ.to_string(),
            passage: None,
            question: format!("Question {}", number),
            options: Json(vec!["A".into(), "B".into(), "C".into(), "D".into()]),
            correct_answer: answer.to_string(),
            correct_answers: Json(Vec::new()),
            solution: None,
            marks: 4,
            difficulty: "Medium".to_string(),
            topic: None,
        }
    }

    fn key() -> Vec<Question> {
        (1..=5).map(|n| question(100 + n as i64, n, "A")).collect()
    }

    fn attempt_with(answers: &[(i32, &str)]) -> Attempt {
        let mut attempt = lifecycle::open(
            1,
            NewAttempt {
                user_id: 1,
                test_id: 1,
                course_id: 1,
                total_questions: 5,
                total_marks: 20,
                start_time: Utc::now(),
            },
        );
        for (number, answer) in answers {
            palette::apply(
                &mut attempt,
                &palette::AnswerInput {
                    question_id: 100 + *number as i64,
                    question_number: *number,
                    answer: Some(answer.to_string()),
                    marked_for_review: false,
                    time_taken: None,
                },
            );
        }
        attempt
    }

    #[test]
    fn mixed_answers_follow_marking_scheme() {
        // Q1 correct, Q2 wrong, Q3 skipped, Q4 correct, Q5 wrong
        let mut attempt = attempt_with(&[(1, "A"), (2, "B"), (4, "A"), (5, "C")]);
        let summary = grade(&mut attempt, &five_question_test(), &key());

        assert_eq!(summary.score, 6);
        assert_eq!(summary.correct_answers, 2);
        assert_eq!(summary.wrong_answers, 2);
        assert_eq!(summary.unattempted, 1);
        assert_eq!(summary.percentage, 30.0);
        assert_eq!(attempt.score, 6);
        assert_eq!(attempt.answer_for(101).and_then(|a| a.is_correct), Some(true));
        assert_eq!(attempt.answer_for(102).and_then(|a| a.is_correct), Some(false));
    }

    #[test]
    fn negative_total_is_clamped_once() {
        let mut attempt = attempt_with(&[(1, "B"), (2, "B"), (3, "B"), (4, "B"), (5, "B")]);
        let summary = grade(&mut attempt, &five_question_test(), &key());

        assert_eq!(summary.score, 0);
        assert_eq!(summary.wrong_answers, 5);
        assert_eq!(summary.percentage, 0.0);
    }

    #[test]
    fn wrong_answers_offset_correct_ones_before_clamping() {
        // +4 for Q1, -1 for each of Q2..Q4
        let mut attempt = attempt_with(&[(1, "A"), (2, "B"), (3, "B"), (4, "B")]);
        let summary = grade(&mut attempt, &five_question_test(), &key());
        assert_eq!(summary.score, 1);
    }

    #[test]
    fn cleared_answers_count_as_unattempted() {
        let mut attempt = attempt_with(&[(1, "A"), (2, "B")]);
        palette::apply(
            &mut attempt,
            &palette::AnswerInput {
                question_id: 102,
                question_number: 2,
                answer: None,
                marked_for_review: false,
                time_taken: None,
            },
        );
        let summary = grade(&mut attempt, &five_question_test(), &key());

        assert_eq!(summary.correct_answers, 1);
        assert_eq!(summary.wrong_answers, 0);
        assert_eq!(summary.unattempted, 4);
        assert!(attempt.answer_for(102).is_none());
    }

    #[test]
    fn review_only_and_blank_saves_leave_no_entry_to_grade() {
        let mut attempt = attempt_with(&[(1, "A")]);
        for (number, answer, review) in [(2, None, true), (3, Some(""), false)] {
            palette::apply(
                &mut attempt,
                &palette::AnswerInput {
                    question_id: 100 + number as i64,
                    question_number: number,
                    answer: answer.map(str::to_string),
                    marked_for_review: review,
                    time_taken: None,
                },
            );
        }
        let summary = grade(&mut attempt, &five_question_test(), &key());

        assert_eq!(attempt.answers.len(), 1);
        assert_eq!(summary.score, 4);
        assert_eq!(summary.correct_answers, 1);
        assert_eq!(summary.wrong_answers, 0);
        // total questions minus distinct answered question ids
        assert_eq!(summary.unattempted, 5 - attempt.answers.len() as i32);
        assert!(attempt.question_status.marked_for_review.contains(&2));
    }

    #[test]
    fn stored_entry_without_value_is_graded_wrong() {
        let mut attempt = attempt_with(&[(1, "A")]);
        attempt.answers.push(AnswerEntry {
            question_id: 102,
            answer: None,
            is_correct: None,
            time_taken: None,
            marked_for_review: true,
        });
        let summary = grade(&mut attempt, &five_question_test(), &key());

        assert_eq!(summary.correct_answers, 1);
        assert_eq!(summary.wrong_answers, 1);
        assert_eq!(summary.unattempted, 3);
        assert_eq!(summary.score, 3);
        assert_eq!(attempt.answer_for(102).and_then(|a| a.is_correct), Some(false));
    }

    #[test]
    fn unattempted_marks_are_applied() {
        let mut test = five_question_test();
        test.marking_scheme.unattempted = 1;
        let mut attempt = attempt_with(&[(1, "A")]);
        let summary = grade(&mut attempt, &test, &key());

        assert_eq!(summary.score, 8);
    }

    #[test]
    fn multi_correct_compares_as_a_set() {
        let mut q = question(1, 1, "A,C");
        q.question_type = TYPE_MULTI_CORRECT.to_string();
        q.correct_answers = Json(vec!["A".into(), "C".into()]);

        assert!(is_correct(&q, "C, A"));
        assert!(is_correct(&q, "A,C"));
        assert!(!is_correct(&q, "A"));
        assert!(!is_correct(&q, "A,B,C"));
    }

    #[test]
    fn single_answer_match_is_exact() {
        let q = question(1, 1, "B");
        assert!(is_correct(&q, "B"));
        assert!(!is_correct(&q, "b"));
        assert!(!is_correct(&q, " B"));
    }
}

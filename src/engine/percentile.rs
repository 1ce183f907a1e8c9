// src/engine/percentile.rs
//
// Percentile and running test aggregates.

use crate::models::test::Test;

/// Position of one score among terminal sibling attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Standing {
    /// Siblings scoring strictly below.
    pub below: i64,
    pub total: i64,
}

impl Standing {
    pub fn from_scores<I>(score: i32, siblings: I) -> Self
    where
        I: IntoIterator<Item = i32>,
    {
        siblings
            .into_iter()
            .fold(Standing::default(), |mut acc, other| {
                acc.total += 1;
                if other < score {
                    acc.below += 1;
                }
                acc
            })
    }
}

/// Percentage of siblings strictly outscored, 0 when there are none.
pub fn percentile(standing: &Standing) -> f64 {
    if standing.total == 0 {
        return 0.0;
    }
    (standing.below as f64 / standing.total as f64) * 100.0
}

/// Folds one finalized score into the test's running mean.
/// Mirrors the SQL increment in the Postgres store.
pub fn fold_score(test: &mut Test, score: i32) {
    test.graded_attempts += 1;
    test.score_sum += i64::from(score);
    test.average_score = test.score_sum as f64 / test.graded_attempts as f64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test::MarkingScheme;

    fn blank_test() -> Test {
        Test {
            id: 1,
            course_id: 1,
            title: "Mock".to_string(),
            test_type: "chapter".to_string(),
            duration_minutes: 60,
            total_questions: 5,
            total_marks: 20,
            marking_scheme: MarkingScheme::default(),
            instructions: String::new(),
            total_attempts: 0,
            graded_attempts: 0,
            score_sum: 0,
            average_score: 0.0,
            is_active: true,
        }
    }

    #[test]
    fn no_siblings_gives_zero() {
        let standing = Standing::from_scores(12, Vec::new());
        assert_eq!(standing, Standing { below: 0, total: 0 });
        assert_eq!(percentile(&standing), 0.0);
    }

    #[test]
    fn ties_are_not_counted_as_below() {
        let standing = Standing::from_scores(8, vec![4, 8, 8, 12]);
        assert_eq!(standing.below, 1);
        assert_eq!(standing.total, 4);
        assert_eq!(percentile(&standing), 25.0);
    }

    #[test]
    fn higher_score_ranks_strictly_higher() {
        let siblings = vec![0, 3, 6, 9, 12];
        let low = percentile(&Standing::from_scores(4, siblings.clone()));
        let high = percentile(&Standing::from_scores(10, siblings.clone()));
        let top = percentile(&Standing::from_scores(20, siblings));

        assert!(high > low);
        assert!((0.0..=100.0).contains(&low));
        assert_eq!(top, 100.0);
    }

    #[test]
    fn fold_score_keeps_population_mean() {
        let mut test = blank_test();
        for score in [6, 0, 12] {
            fold_score(&mut test, score);
        }
        assert_eq!(test.graded_attempts, 3);
        assert_eq!(test.score_sum, 18);
        assert_eq!(test.average_score, 6.0);
    }
}

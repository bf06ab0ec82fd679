/// One rubric criterion's result as reported by the model.
#[derive(Debug, Clone)]
pub(crate) struct CriterionScore {
    pub(crate) id: String,
    pub(crate) score: i64,
    pub(crate) weight: f64,
}

/// Weighted 1..=10 aggregate. Pure arithmetic so re-evaluating the same model
/// output always reproduces the persisted score.
pub(crate) fn deterministic_score_1_10(criteria: &[CriterionScore]) -> i32 {
    if criteria.is_empty() {
        return 1;
    }

    let mut weighted_sum = 0.0;
    let mut weights = 0.0;
    for item in criteria {
        let bounded_score = item.score.clamp(1, 10) as f64;
        let bounded_weight = item.weight.max(0.0);
        weighted_sum += bounded_score * bounded_weight;
        weights += bounded_weight;
    }

    if weights == 0.0 {
        return 1;
    }

    (weighted_sum / weights).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(id: &str, score: i64, weight: f64) -> CriterionScore {
        CriterionScore { id: id.to_string(), score, weight }
    }

    #[test]
    fn empty_criteria_floor_at_one() {
        assert_eq!(deterministic_score_1_10(&[]), 1);
    }

    #[test]
    fn zero_total_weight_floors_at_one() {
        let scores = vec![criterion("correctness", 9, 0.0)];
        assert_eq!(deterministic_score_1_10(&scores), 1);
    }

    #[test]
    fn weighted_average_rounds_half_up() {
        let scores = vec![criterion("a", 7, 1.0), criterion("b", 8, 1.0)];
        assert_eq!(deterministic_score_1_10(&scores), 8);
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        let scores = vec![criterion("a", 42, 1.0), criterion("b", -3, 1.0)];
        // 10 and 1 after clamping.
        assert_eq!(deterministic_score_1_10(&scores), 6);
    }

    #[test]
    fn negative_weights_are_ignored() {
        let scores = vec![criterion("a", 10, -5.0), criterion("b", 4, 2.0)];
        assert_eq!(deterministic_score_1_10(&scores), 4);
    }

    #[test]
    fn same_input_same_output() {
        let scores = vec![
            criterion("correctness", 8, 0.4),
            criterion("completeness", 7, 0.3),
            criterion("code_quality", 9, 0.2),
            criterion("edge_cases", 6, 0.1),
        ];
        let first = deterministic_score_1_10(&scores);
        for _ in 0..100 {
            assert_eq!(deterministic_score_1_10(&scores), first);
        }
    }
}

use crate::config::DetectorConfig;

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator). Undefined below two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let avg = mean(values);
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;

    Some(variance.sqrt())
}

/// Bonus for answering at a steady pace.
pub fn consistency_bonus(times: &[f64], config: &DetectorConfig) -> f64 {
    match sample_std_dev(times) {
        Some(std) if std < mean(times) * config.consistency_spread => config.consistency_bonus,
        _ => 0.0,
    }
}

/// Heuristic composite in [0, 1]: accuracy, less a fixed penalty per gap,
/// plus the consistency bonus.
pub fn compute_overall_score(
    accuracy: f64,
    num_gaps: usize,
    times: &[f64],
    config: &DetectorConfig,
) -> f64 {
    let gap_penalty = num_gaps as f64 * config.gap_penalty;
    let overall = accuracy - gap_penalty + consistency_bonus(times, config);

    overall.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[2.0, 4.0, 6.0]), 4.0);
    }

    #[test]
    fn test_sample_std_dev() {
        assert_eq!(sample_std_dev(&[]), None);
        assert_eq!(sample_std_dev(&[5.0]), None);
        assert_eq!(sample_std_dev(&[3.0, 3.0, 3.0]), Some(0.0));

        // variance = ((2-5)^2 + (4-5)^2 + (4-5)^2 + (4-5)^2 + (5-5)^2 + (5-5)^2 + (7-5)^2 + (9-5)^2) / 7 = 32 / 7
        let std = sample_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((std - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_consistency_bonus() {
        let config = DetectorConfig::default();
        assert_eq!(consistency_bonus(&[10.0, 11.0, 9.0], &config), 0.05);
        assert_eq!(consistency_bonus(&[1.0, 50.0, 2.0], &config), 0.0);
        assert_eq!(consistency_bonus(&[10.0], &config), 0.0);
        assert_eq!(consistency_bonus(&[0.0, 0.0], &config), 0.0);
    }

    #[test]
    fn test_overall_score_is_clamped() {
        let config = DetectorConfig::default();
        let steady = [10.0, 10.0, 10.0];

        assert_eq!(compute_overall_score(1.0, 0, &steady, &config), 1.0);
        assert_eq!(compute_overall_score(0.1, 4, &steady, &config), 0.0);
    }

    #[test]
    fn test_overall_score_penalizes_gaps() {
        let config = DetectorConfig::default();
        let erratic = [1.0, 50.0, 2.0];

        let score = compute_overall_score(0.8, 2, &erratic, &config);
        assert!((score - 0.6).abs() < 1e-12);
    }
}

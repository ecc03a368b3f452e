/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Computes the population standard deviation given a pre-computed mean.
/// Returns 0.0 for empty input.
pub fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

    variance.sqrt()
}

/// Mean of the observations lying within `sigma` population standard
/// deviations of the full-sample mean.
///
/// With a zero spread nothing is dropped. Returns `None` when no observation
/// survives (only possible for `sigma < 1`) or the input is empty.
pub fn trimmed_mean(values: &[f64], sigma: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mu = mean(values);
    let sd = stddev(values, mu);
    if sd == 0.0 {
        return Some(mu);
    }

    let limit = sigma * sd;
    let kept: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| (v - mu).abs() <= limit)
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(mean(&kept))
    }
}

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_stddev() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[15.0, 16.0, 14.0, 15.0]), 15.0);

        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(stddev(&values, mean(&values)), 2.0);
        assert_eq!(stddev(&[], 0.0), 0.0);
    }

    #[test]
    fn test_trimmed_mean_drops_outlier() {
        // mean 14.5, sd ~ 11.9: only the 46 sits beyond 1.5 sd
        let values = [10.0, 11.0, 9.0, 10.0, 11.0, 9.0, 10.0, 46.0];
        let trimmed = trimmed_mean(&values, 1.5).unwrap();
        assert_eq!(trimmed, 10.0);
    }

    #[test]
    fn test_trimmed_mean_constant_series() {
        assert_eq!(trimmed_mean(&[7.0, 7.0, 7.0], 0.0), Some(7.0));
    }

    #[test]
    fn test_trimmed_mean_can_drop_everything() {
        // symmetric pair: both points sit exactly 1 sd away
        assert_eq!(trimmed_mean(&[0.0, 10.0], 0.5), None);
        assert_eq!(trimmed_mean(&[], 2.0), None);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(15.04, 1), 15.0);
        assert_eq!(round_to(15.06, 1), 15.1);
        assert_eq!(round_to(12.345, 0), 12.0);
        assert_eq!(round_to(-2.5, 0), -3.0);
    }
}

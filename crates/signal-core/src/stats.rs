//! Small statistics helpers for short, irregular interest series.
//!
//! All functions are total: degenerate inputs (empty slices, zero variance)
//! return a neutral value instead of NaN so callers can clamp safely.

use statrs::statistics::Statistics;

/// Mean of a data slice, 0.0 when empty.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.mean()
}

/// Sample standard deviation, 0.0 with fewer than two points.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    data.std_dev()
}

/// Relative change from `base` to `current` with the denominator floored at `epsilon`.
pub fn relative_change(current: f64, base: f64, epsilon: f64) -> f64 {
    (current - base) / base.max(epsilon)
}

/// Standard deviation over mean.
///
/// A mean below `epsilon` (no measurable interest) counts as fully unstable: 1.0.
pub fn coefficient_of_variation(data: &[f64], epsilon: f64) -> f64 {
    let m = mean(data);
    if m < epsilon {
        return 1.0;
    }
    std_dev(data) / m
}

/// Whether the series is flat enough to carry no pattern at all.
pub fn is_flat(data: &[f64]) -> bool {
    let m = mean(data);
    data.iter().map(|x| (x - m).powi(2)).sum::<f64>() < 1e-9
}

/// Autocorrelation at `lag`, scaled by n/(n - lag) so a series that repeats
/// exactly over its overlap reaches 1.0 regardless of how many cycles it spans.
///
/// Clamped to [-1, 1]. Returns `None` when the lag leaves no overlapping pairs
/// or the series is flat.
pub fn autocorrelation(data: &[f64], lag: usize) -> Option<f64> {
    if lag == 0 || lag >= data.len() || is_flat(data) {
        return None;
    }
    let m = mean(data);
    let denom: f64 = data.iter().map(|x| (x - m).powi(2)).sum();
    let numer: f64 = data
        .iter()
        .zip(data.iter().skip(lag))
        .map(|(a, b)| (a - m) * (b - m))
        .sum();
    let n = data.len() as f64;
    let scaled = numer / denom * n / (n - lag as f64);
    Some(scaled.clamp(-1.0, 1.0))
}

/// Map a signed fraction onto [0, 1]: 0 → 0.5, +1 → 1, -1 → 0.
pub fn normalize_signed(value: f64) -> f64 {
    clamp_unit(0.5 + value / 2.0)
}

/// Clamp to [0, 1], mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Median of a data slice, 0.0 when empty.
pub fn median(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        let data = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        assert!((mean(&data) - 30.0).abs() < 1e-9);
        assert!((std_dev(&data) - 15.811).abs() < 0.01);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[5.0]), 0.0);
    }

    #[test]
    fn test_relative_change_floors_denominator() {
        assert!((relative_change(30.0, 20.0, 1.0) - 0.5).abs() < 1e-9);
        // base of zero uses the epsilon instead of dividing by zero
        assert!((relative_change(2.0, 0.0, 1.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_autocorrelation_of_periodic_series() {
        let data: Vec<f64> = (0..36)
            .map(|i| 50.0 + 30.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin())
            .collect();
        let r = autocorrelation(&data, 12).unwrap();
        assert!((r - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_autocorrelation_of_two_cycles_reaches_one() {
        let data: Vec<f64> = (0..24)
            .map(|i| 50.0 + 30.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin())
            .collect();
        let r = autocorrelation(&data, 12).unwrap();
        assert!(r > 0.99);
    }

    #[test]
    fn test_autocorrelation_of_linear_trend_is_negative() {
        let data: Vec<f64> = (0..24).map(|i| i as f64).collect();
        assert!(autocorrelation(&data, 12).unwrap() < 0.0);
    }

    #[test]
    fn test_zero_interest_is_fully_unstable() {
        assert_eq!(coefficient_of_variation(&[0.0; 24], 1.0), 1.0);
        assert_eq!(coefficient_of_variation(&[50.0; 24], 1.0), 0.0);
    }

    #[test]
    fn test_autocorrelation_of_flat_series() {
        assert_eq!(autocorrelation(&[42.0; 30], 12), None);
        assert_eq!(autocorrelation(&[1.0, 2.0], 5), None);
    }

    #[test]
    fn test_normalize_signed() {
        assert!((normalize_signed(0.0) - 0.5).abs() < 1e-9);
        assert_eq!(normalize_signed(3.0), 1.0);
        assert_eq!(normalize_signed(-2.0), 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }
}

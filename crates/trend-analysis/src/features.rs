//! Trend Feature Extraction
//!
//! Turns a short relative-interest series into growth, momentum, volatility,
//! seasonality and a bounded trend score.

use chrono::{DateTime, Datelike, Utc};
use signal_core::stats::{
    autocorrelation, clamp_unit, coefficient_of_variation, is_flat, mean, normalize_signed,
    relative_change,
};
use signal_core::{SeasonalityPattern, Timeframe, TimeSeriesPoint, TrendConfig, TrendFeatures};
use std::collections::BTreeMap;

/// Sort ascending, keep the last value per timestamp, clamp into [0, 100], drop non-finite values.
pub fn sanitize_series(points: Vec<TimeSeriesPoint>) -> Vec<TimeSeriesPoint> {
    let mut by_time: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    for p in points {
        if p.value.is_finite() {
            by_time.insert(p.timestamp, p.value.clamp(0.0, 100.0));
        }
    }
    by_time
        .into_iter()
        .map(|(timestamp, value)| TimeSeriesPoint::new(timestamp, value))
        .collect()
}

/// Computes [`TrendFeatures`] for one series.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: TrendConfig,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(TrendConfig::default())
    }
}

impl FeatureExtractor {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// Extract features from a sanitized, time-ascending series.
    ///
    /// Fails with a human-readable reason when the series is too short.
    pub fn extract(&self, series: &[TimeSeriesPoint], timeframe: Timeframe) -> Result<TrendFeatures, String> {
        if series.len() < self.config.min_series_len {
            return Err(format!(
                "{} points in series, at least {} required",
                series.len(),
                self.config.min_series_len
            ));
        }

        let values: Vec<f64> = series.iter().map(|p| p.value).collect();
        let current_interest = values.last().copied().unwrap_or(0.0);
        let growth_rate = self.growth_rate(&values);
        let momentum = self.momentum(&values);
        let volatility = coefficient_of_variation(&values, self.config.growth_epsilon);
        let seasonality = self.detect_seasonality(
            series,
            timeframe.natural_cycle(),
            timeframe.has_annual_cycle(),
        );
        let trend_score = self.trend_score(growth_rate, momentum, volatility);

        Ok(TrendFeatures {
            current_interest,
            growth_rate,
            momentum,
            volatility,
            seasonality,
            trend_score,
        })
    }

    /// Mean of the last quarter vs mean of the first quarter
    pub fn growth_rate(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let q = (values.len() / 4).max(1);
        let first = mean(&values[..q]);
        let last = mean(&values[values.len() - q..]);
        relative_change(last, first, self.config.growth_epsilon)
    }

    /// Mean of the last N points vs the N points before them
    pub fn momentum(&self, values: &[f64]) -> f64 {
        if values.len() < 2 {
            return 0.0;
        }
        let n = self.config.momentum_window.min(values.len() / 2).max(1);
        let len = values.len();
        let previous = mean(&values[len - 2 * n..len - n]);
        let recent = mean(&values[len - n..]);
        relative_change(recent, previous, self.config.growth_epsilon)
    }

    /// Autocorrelation at the natural cycle lag, flagged above the configured threshold.
    ///
    /// Needs `min_seasonal_cycles` full cycles of history; flat series are never seasonal.
    pub fn detect_seasonality(
        &self,
        series: &[TimeSeriesPoint],
        cycle: usize,
        annual: bool,
    ) -> Option<SeasonalityPattern> {
        if cycle < 2 || series.len() < cycle * self.config.min_seasonal_cycles.max(1) {
            return None;
        }
        let values: Vec<f64> = series.iter().map(|p| p.value).collect();
        if is_flat(&values) {
            return None;
        }

        let r = autocorrelation(&values, cycle)?;
        if r <= self.config.seasonality_threshold {
            return None;
        }

        let mut phase_sums = vec![(0.0, 0usize); cycle];
        for (i, v) in values.iter().enumerate() {
            let slot = &mut phase_sums[i % cycle];
            slot.0 += v;
            slot.1 += 1;
        }
        let peak_phase = argmax(phase_sums.iter().map(|(sum, n)| sum / (*n).max(1) as f64));

        let peak_month = if annual {
            let mut months: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
            for p in series {
                let slot = months.entry(p.timestamp.month()).or_insert((0.0, 0));
                slot.0 += p.value;
                slot.1 += 1;
            }
            months
                .iter()
                .map(|(m, (sum, n))| (*m, sum / (*n).max(1) as f64))
                .fold(None, |best: Option<(u32, f64)>, (m, avg)| match best {
                    Some((_, b)) if b >= avg => best,
                    _ => Some((m, avg)),
                })
                .map(|(m, _)| m)
        } else {
            None
        };

        Some(SeasonalityPattern {
            cycle_length: cycle,
            autocorrelation: r,
            peak_phase,
            peak_month,
        })
    }

    /// Weighted blend of normalized growth, momentum and stability, scaled to [0, 100]
    pub fn trend_score(&self, growth_rate: f64, momentum: f64, volatility: f64) -> f64 {
        let w = &self.config.weights;
        let total = w.growth + w.momentum + w.stability;
        if total <= 0.0 {
            return 0.0;
        }
        let blended = (w.growth * normalize_signed(growth_rate)
            + w.momentum * normalize_signed(momentum)
            + w.stability * clamp_unit(1.0 - volatility))
            / total;
        (blended * 100.0).clamp(0.0, 100.0)
    }
}

fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = (0usize, f64::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn monthly(values: &[f64]) -> Vec<TimeSeriesPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let ts = Utc
                    .with_ymd_and_hms(2021 + (i / 12) as i32, (i % 12) as u32 + 1, 1, 0, 0, 0)
                    .unwrap();
                TimeSeriesPoint::new(ts, *v)
            })
            .collect()
    }

    fn sinusoid(cycles: usize) -> Vec<f64> {
        (0..12 * cycles)
            .map(|i| 50.0 + 30.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin())
            .collect()
    }

    fn white_noise(n: usize) -> Vec<f64> {
        let mut state: u64 = 12345;
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                50.0 + ((state >> 33) % 41) as f64 - 20.0
            })
            .collect()
    }

    #[test]
    fn test_rising_series_scores_high() {
        // "écouteurs bluetooth": 20 → 80 with no drops
        let values: Vec<f64> = (0..12).map(|i| 20.0 + 60.0 * i as f64 / 11.0).collect();
        let features = FeatureExtractor::default()
            .extract(&monthly(&values), Timeframe::AllTime)
            .unwrap();

        assert!(features.growth_rate > 0.0);
        assert!(features.momentum > 0.0);
        assert!(features.trend_score > 60.0);
        assert!((features.current_interest - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_falling_series_scores_below_rising() {
        let extractor = FeatureExtractor::default();
        let rising: Vec<f64> = (0..24).map(|i| 20.0 + 2.5 * i as f64).collect();
        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        let up = extractor.extract(&monthly(&rising), Timeframe::AllTime).unwrap();
        let down = extractor.extract(&monthly(&falling), Timeframe::AllTime).unwrap();
        assert!(down.growth_rate < 0.0);
        assert!(down.momentum < 0.0);
        assert!(down.trend_score < up.trend_score);
    }

    #[test]
    fn test_sinusoid_over_three_cycles_is_seasonal() {
        let series = monthly(&sinusoid(3));
        let pattern = FeatureExtractor::default()
            .detect_seasonality(&series, 12, true)
            .expect("seasonal");
        assert_eq!(pattern.cycle_length, 12);
        assert!(pattern.autocorrelation > 0.5);
        // sin peaks a quarter of the way through the cycle: April for a January start
        assert_eq!(pattern.peak_phase, 3);
        assert_eq!(pattern.peak_month, Some(4));
    }

    #[test]
    fn test_sinusoid_over_two_cycles_is_seasonal() {
        let series = monthly(&sinusoid(2));
        let pattern = FeatureExtractor::default()
            .detect_seasonality(&series, 12, true)
            .expect("seasonal");
        assert!(pattern.autocorrelation > 0.99);
        assert_eq!(pattern.peak_month, Some(4));
    }

    #[test]
    fn test_rising_series_is_not_seasonal() {
        let values: Vec<f64> = (0..36).map(|i| 20.0 + 60.0 * i as f64 / 35.0).collect();
        assert!(FeatureExtractor::default()
            .detect_seasonality(&monthly(&values), 12, true)
            .is_none());
    }

    #[test]
    fn test_zero_interest_keyword_scores_below_rising_bar() {
        let features = FeatureExtractor::default()
            .extract(&monthly(&[0.0; 24]), Timeframe::AllTime)
            .unwrap();
        assert_eq!(features.volatility, 1.0);
        assert!(features.trend_score < 60.0);
        assert!((features.trend_score - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_series_is_not_seasonal() {
        let series = monthly(&[40.0; 36]);
        assert!(FeatureExtractor::default()
            .detect_seasonality(&series, 12, true)
            .is_none());
    }

    #[test]
    fn test_white_noise_is_not_seasonal() {
        let series = monthly(&white_noise(120));
        assert!(FeatureExtractor::default()
            .detect_seasonality(&series, 12, true)
            .is_none());
    }

    #[test]
    fn test_seasonality_needs_two_full_cycles() {
        let mut values = sinusoid(2);
        values.pop();
        let series = monthly(&values);
        assert!(FeatureExtractor::default()
            .detect_seasonality(&series, 12, true)
            .is_none());
    }

    #[test]
    fn test_short_series_is_rejected() {
        let err = FeatureExtractor::default()
            .extract(&monthly(&[10.0, 20.0, 30.0]), Timeframe::AllTime)
            .unwrap_err();
        assert!(err.contains("at least 8"));
    }

    #[test]
    fn test_trend_score_is_bounded() {
        let extractor = FeatureExtractor::default();
        for (g, m, v) in [(50.0, 50.0, 0.0), (-50.0, -50.0, 10.0), (0.0, 0.0, 0.0)] {
            let s = extractor.trend_score(g, m, v);
            assert!((0.0..=100.0).contains(&s));
        }
    }

    #[test]
    fn test_momentum_uses_configured_window() {
        let extractor = FeatureExtractor::default();
        let values = [10.0, 10.0, 10.0, 10.0, 20.0, 20.0, 20.0, 20.0];
        assert!((extractor.momentum(&values) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sanitize_orders_dedups_and_clamps() {
        let t = |m: u32| Utc.with_ymd_and_hms(2024, m, 1, 0, 0, 0).unwrap();
        let cleaned = sanitize_series(vec![
            TimeSeriesPoint::new(t(3), 120.0),
            TimeSeriesPoint::new(t(1), 10.0),
            TimeSeriesPoint::new(t(2), f64::NAN),
            TimeSeriesPoint::new(t(1), 15.0),
            TimeSeriesPoint::new(t(2), -5.0),
        ]);
        let values: Vec<f64> = cleaned.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![15.0, 0.0, 100.0]);
        assert!(cleaned.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }
}

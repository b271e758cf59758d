use super::*;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone};
use signal_core::ProviderLimits;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory trend provider with call counting and scripted failures
struct MockTrends {
    series: HashMap<String, Vec<f64>>,
    rising: Vec<String>,
    reports_rising: bool,
    calls: AtomicUsize,
    transient_failures: AtomicUsize,
}

impl MockTrends {
    fn new() -> Self {
        Self {
            series: HashMap::new(),
            rising: Vec::new(),
            reports_rising: true,
            calls: AtomicUsize::new(0),
            transient_failures: AtomicUsize::new(0),
        }
    }

    fn with_series(mut self, keyword: &str, values: Vec<f64>) -> Self {
        self.series.insert(keyword.to_string(), values);
        self
    }

    fn without_rising(mut self) -> Self {
        self.reports_rising = false;
        self
    }

    fn failing_first(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrendProvider for MockTrends {
    fn provider_id(&self) -> &str {
        "trends"
    }

    async fn fetch_trend_series(
        &self,
        keyword: &str,
        _timeframe: Timeframe,
        _region: &str,
    ) -> SignalResult<Vec<TimeSeriesPoint>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SignalError::ProviderUnavailable("HTTP 503".into()));
        }
        let values = self
            .series
            .get(keyword)
            .ok_or_else(|| SignalError::InvalidKeyword(keyword.to_string()))?;
        let start = Utc.with_ymd_and_hms(2021, 1, 4, 0, 0, 0).unwrap();
        Ok(values
            .iter()
            .enumerate()
            .map(|(i, v)| TimeSeriesPoint::new(start + ChronoDuration::weeks(i as i64), *v))
            .collect())
    }

    fn supports_rising_keywords(&self) -> bool {
        self.reports_rising
    }

    async fn fetch_rising_keywords(&self, _category: &str, _region: &str) -> SignalResult<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rising.clone())
    }
}

fn rising(n: usize) -> Vec<f64> {
    (0..n).map(|i| 20.0 + 60.0 * i as f64 / (n - 1) as f64).collect()
}

fn analyzer_with(provider: Arc<MockTrends>, daily_limit: u64) -> TrendSignalAnalyzer {
    let mut limits = HashMap::new();
    limits.insert("trends".to_string(), ProviderLimits::new(1_000.0, daily_limit));
    TrendSignalAnalyzer::new(
        provider,
        SignalCache::new(),
        QuotaGuard::new(limits, ProviderLimits::default()),
        TrendConfig::default(),
        CacheConfig::default(),
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        },
    )
}

#[tokio::test]
async fn test_rising_keyword_has_positive_features() {
    let provider = Arc::new(MockTrends::new().with_series("écouteurs bluetooth", rising(26)));
    let analyzer = analyzer_with(Arc::clone(&provider), 100);

    let signal = analyzer
        .analyze_keyword("écouteurs bluetooth", Timeframe::PastYear, "FR")
        .await;

    let features = signal.features.expect("features");
    assert!(features.growth_rate > 0.0);
    assert!(features.momentum > 0.0);
    assert!(features.trend_score > 60.0);
    assert_eq!(signal.series.len(), 26);
    assert!(signal.unavailable.is_none());
}

#[tokio::test]
async fn test_repeat_analysis_is_served_from_cache() {
    let provider = Arc::new(MockTrends::new().with_series("desk lamp", rising(20)));
    let analyzer = analyzer_with(Arc::clone(&provider), 100);

    for _ in 0..3 {
        let signal = analyzer.analyze_keyword("desk lamp", Timeframe::PastYear, "US").await;
        assert!(signal.is_available());
    }
    assert_eq!(provider.calls(), 1);

    // A different timeframe is a different cache key
    analyzer.analyze_keyword("desk lamp", Timeframe::FiveYears, "US").await;
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_short_series_marks_features_unavailable() {
    let provider = Arc::new(MockTrends::new().with_series("niche gadget", vec![10.0, 12.0, 11.0]));
    let analyzer = analyzer_with(provider, 100);

    let signal = analyzer.analyze_keyword("niche gadget", Timeframe::PastYear, "US").await;
    assert!(signal.features.is_none());
    assert_eq!(
        signal.unavailable.map(|u| u.reason),
        Some(UnavailableReason::InsufficientData)
    );
    assert_eq!(signal.series.len(), 3);
}

#[tokio::test]
async fn test_invalid_keyword_is_not_retried() {
    let provider = Arc::new(MockTrends::new());
    let analyzer = analyzer_with(Arc::clone(&provider), 100);

    let signal = analyzer.analyze_keyword("zzqx", Timeframe::PastYear, "US").await;
    assert_eq!(
        signal.unavailable.map(|u| u.reason),
        Some(UnavailableReason::InvalidKeyword)
    );
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_empty_keyword_skips_provider() {
    let provider = Arc::new(MockTrends::new());
    let analyzer = analyzer_with(Arc::clone(&provider), 100);

    let signal = analyzer.analyze_keyword("   ", Timeframe::PastYear, "US").await;
    assert!(!signal.is_available());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let provider = Arc::new(
        MockTrends::new()
            .with_series("standing desk", rising(16))
            .failing_first(2),
    );
    let analyzer = analyzer_with(Arc::clone(&provider), 100);

    let signal = analyzer.analyze_keyword("standing desk", Timeframe::PastYear, "US").await;
    assert!(signal.is_available());
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_outage_is_absorbed() {
    let provider = Arc::new(
        MockTrends::new()
            .with_series("standing desk", rising(16))
            .failing_first(10),
    );
    let analyzer = analyzer_with(Arc::clone(&provider), 100);

    let signal = analyzer.analyze_keyword("standing desk", Timeframe::PastYear, "US").await;
    assert_eq!(
        signal.unavailable.map(|u| u.reason),
        Some(UnavailableReason::ProviderUnavailable)
    );
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_exhausted_quota_marks_unavailable() {
    let provider = Arc::new(
        MockTrends::new()
            .with_series("a", rising(12))
            .with_series("b", rising(12)),
    );
    let analyzer = analyzer_with(Arc::clone(&provider), 1);

    assert!(analyzer.analyze_keyword("a", Timeframe::PastYear, "US").await.is_available());
    let blocked = analyzer.analyze_keyword("b", Timeframe::PastYear, "US").await;
    assert_eq!(
        blocked.unavailable.map(|u| u.reason),
        Some(UnavailableReason::QuotaExceeded)
    );
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_compare_ranks_by_trend_score() {
    let flat = vec![50.0; 20];
    let falling: Vec<f64> = rising(20).into_iter().rev().collect();
    let provider = Arc::new(
        MockTrends::new()
            .with_series("up", rising(20))
            .with_series("flat", flat)
            .with_series("down", falling),
    );
    let analyzer = analyzer_with(provider, 100);

    let keywords: Vec<String> = ["down", "missing", "flat", "up"].iter().map(|s| s.to_string()).collect();
    let ranked = analyzer.compare(&keywords).await;

    let order: Vec<&str> = ranked.iter().map(|r| r.keyword.as_str()).collect();
    assert_eq!(order, vec!["up", "flat", "down", "missing"]);
    assert_eq!(ranked[0].rank, 1);
    assert_eq!(ranked[3].rank, 4);
}

#[tokio::test]
async fn test_analyze_product_covers_every_timeframe() {
    let provider = Arc::new(
        MockTrends::new()
            .with_series("yoga mat", rising(30))
            .with_series("cork yoga mat", rising(30)),
    );
    let analyzer = analyzer_with(Arc::clone(&provider), 100);

    let keywords = vec!["yoga mat".to_string(), "cork yoga mat".to_string()];
    let timeframes = [Timeframe::PastQuarter, Timeframe::PastYear];
    let result = analyzer.analyze_product("Yoga Mat", &keywords, &timeframes).await;

    assert_eq!(result.len(), 2);
    for per_timeframe in result.values() {
        assert_eq!(per_timeframe.len(), 2);
        assert!(per_timeframe.values().all(|s| s.is_available()));
    }
    assert_eq!(provider.calls(), 4);
}

#[tokio::test]
async fn test_get_rising_keeps_growing_keywords() {
    let mut provider = MockTrends::new()
        .with_series("air fryer", rising(20))
        .with_series("rice cooker", rising(20).into_iter().rev().collect())
        .with_series("air fryer liners", (0..20).map(|i| 10.0 + i as f64).collect());
    provider.rising = vec![
        "air fryer".to_string(),
        "rice cooker".to_string(),
        "air fryer liners".to_string(),
    ];
    let analyzer = analyzer_with(Arc::new(provider), 100);

    let rising = analyzer.get_rising("kitchen", "US").await.unwrap();
    let keywords: Vec<&str> = rising.iter().map(|s| s.keyword.as_str()).collect();
    assert_eq!(keywords, vec!["air fryer", "air fryer liners"]);
}

#[tokio::test]
async fn test_get_rising_without_results_is_insufficient() {
    let analyzer = analyzer_with(Arc::new(MockTrends::new()), 100);
    let err = analyzer.get_rising("kitchen", "US").await.unwrap_err();
    assert!(matches!(err, SignalError::InsufficientData(_)));
}

#[tokio::test(start_paused = true)]
async fn test_get_rising_unsupported_skips_quota_and_retries() {
    let provider = Arc::new(MockTrends::new().without_rising());
    let analyzer = analyzer_with(Arc::clone(&provider), 100);

    let started = tokio::time::Instant::now();
    let err = analyzer.get_rising("audio", "FR").await.unwrap_err();
    assert!(matches!(err, SignalError::Unsupported(_)));
    assert_eq!(started.elapsed(), std::time::Duration::ZERO);
    assert_eq!(provider.calls(), 0);
    assert_eq!(analyzer.quota.remaining_today("trends").await, 100);
}

use async_trait::async_trait;

use crate::{
    Competitor, KeywordSuggestion, SeoMetric, SignalError, SignalResult, Timeframe,
    TimeSeriesPoint,
};

/// Source of relative search-interest time series.
///
/// Implementations only talk to their backend; caching, quota and retry
/// are layered on top by the analyzers.
#[async_trait]
pub trait TrendProvider: Send + Sync {
    /// Identifier used for quota accounting and cache keys
    fn provider_id(&self) -> &str;

    async fn fetch_trend_series(
        &self,
        keyword: &str,
        timeframe: Timeframe,
        region: &str,
    ) -> SignalResult<Vec<TimeSeriesPoint>>;

    /// Whether `fetch_rising_keywords` is backed by the provider
    fn supports_rising_keywords(&self) -> bool {
        false
    }

    /// Keywords currently rising within a category
    async fn fetch_rising_keywords(&self, _category: &str, _region: &str) -> SignalResult<Vec<String>> {
        Err(SignalError::Unsupported(format!(
            "{} does not report rising keywords",
            self.provider_id()
        )))
    }
}

/// Source of keyword-level SEO metrics.
#[async_trait]
pub trait SeoProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    /// Billable backend requests behind one `fetch_seo_metric` call
    fn requests_per_metric(&self) -> u32 {
        1
    }

    async fn fetch_seo_metric(&self, keyword: &str, database: &str) -> SignalResult<SeoMetric>;

    fn supports_competitors(&self) -> bool {
        false
    }

    async fn fetch_competitors(&self, _keyword: &str, _database: &str) -> SignalResult<Vec<Competitor>> {
        Err(SignalError::Unsupported(format!(
            "{} does not report competitors",
            self.provider_id()
        )))
    }

    fn supports_keyword_suggestions(&self) -> bool {
        false
    }

    async fn fetch_keyword_suggestions(
        &self,
        _keyword: &str,
        _database: &str,
    ) -> SignalResult<Vec<KeywordSuggestion>> {
        Err(SignalError::Unsupported(format!(
            "{} does not report keyword suggestions",
            self.provider_id()
        )))
    }
}

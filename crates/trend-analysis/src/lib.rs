//! Search-interest trend analysis.
//!
//! Every series request goes cache → quota → provider, with transient provider
//! failures retried. Fetch failures and short series never raise: the returned
//! [`KeywordSignal`] carries no features and an [`Unavailability`] marker instead.

pub mod features;

pub use features::{sanitize_series, FeatureExtractor};

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use quota_guard::QuotaGuard;
use signal_cache::{CacheKey, SignalCache};
use signal_core::{
    CacheConfig, KeywordSignal, RankedKeyword, RetryPolicy, SignalError, SignalResult,
    Timeframe, TimeSeriesPoint, TrendConfig, TrendProvider, Unavailability, UnavailableReason,
};
use std::collections::HashMap;
use std::sync::Arc;

pub struct TrendSignalAnalyzer {
    provider: Arc<dyn TrendProvider>,
    cache: SignalCache,
    quota: QuotaGuard,
    cache_config: CacheConfig,
    retry: RetryPolicy,
    extractor: FeatureExtractor,
}

impl TrendSignalAnalyzer {
    pub fn new(
        provider: Arc<dyn TrendProvider>,
        cache: SignalCache,
        quota: QuotaGuard,
        config: TrendConfig,
        cache_config: CacheConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            cache,
            quota,
            cache_config,
            retry,
            extractor: FeatureExtractor::new(config),
        }
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    pub fn config(&self) -> &TrendConfig {
        self.extractor.config()
    }

    /// Fetch (or reuse) the interest series for one keyword/timeframe/region.
    async fn fetch_series(
        &self,
        keyword: &str,
        timeframe: Timeframe,
        region: &str,
    ) -> SignalResult<Vec<TimeSeriesPoint>> {
        let source = self.provider.provider_id().to_string();
        let key = CacheKey::new(&source, keyword)
            .with_param("kind", "series")
            .with_param("timeframe", timeframe.label())
            .with_param("region", region);
        let ttl = self.cache_config.ttl_for(&source);

        let provider = Arc::clone(&self.provider);
        let quota = self.quota.clone();
        let retry = self.retry.clone();
        let keyword = keyword.to_string();
        let region = region.to_string();

        self.cache
            .get_or_fetch(&key, ttl, move || async move {
                let (provider, quota) = (&provider, &quota);
                let (keyword, region) = (keyword.as_str(), region.as_str());
                retry
                    .run(&format!("trend series for '{}'", keyword), move || async move {
                        quota.acquire(provider.provider_id()).await?;
                        provider.fetch_trend_series(keyword, timeframe, region).await
                    })
                    .await
            })
            .await
    }

    /// Trend features for one keyword over one timeframe and region.
    pub async fn analyze_keyword(&self, keyword: &str, timeframe: Timeframe, region: &str) -> KeywordSignal {
        let mut signal = KeywordSignal {
            keyword: keyword.to_string(),
            region: region.to_string(),
            timeframe,
            series: Vec::new(),
            features: None,
            unavailable: None,
            computed_at: Utc::now(),
        };

        if keyword.trim().is_empty() {
            signal.unavailable = Some(Unavailability::new(
                UnavailableReason::InvalidKeyword,
                "empty keyword",
            ));
            return signal;
        }

        let series = match self.fetch_series(keyword, timeframe, region).await {
            Ok(series) => sanitize_series(series),
            Err(e) => {
                tracing::warn!("Trend data unavailable for '{}' ({}): {}", keyword, timeframe, e);
                signal.unavailable = Some(Unavailability::from(&e));
                return signal;
            }
        };

        match self.extractor.extract(&series, timeframe) {
            Ok(features) => {
                tracing::debug!(
                    "Trend features for '{}' ({}): score {:.1}, growth {:.2}, momentum {:.2}",
                    keyword,
                    timeframe,
                    features.trend_score,
                    features.growth_rate,
                    features.momentum
                );
                signal.features = Some(features);
            }
            Err(reason) => {
                tracing::info!("Not enough trend history for '{}': {}", keyword, reason);
                signal.unavailable = Some(Unavailability::new(UnavailableReason::InsufficientData, reason));
            }
        }
        signal.series = series;
        signal
    }

    /// Analyze every keyword of a product over every requested timeframe.
    ///
    /// Returns keyword → timeframe → signal. Fetches run concurrently up to
    /// the configured concurrency limit.
    pub async fn analyze_product(
        &self,
        product_name: &str,
        keywords: &[String],
        timeframes: &[Timeframe],
    ) -> HashMap<String, HashMap<Timeframe, KeywordSignal>> {
        tracing::info!(
            "Analyzing trends for product '{}' ({} keywords x {} timeframes)",
            product_name,
            keywords.len(),
            timeframes.len()
        );
        let region = self.config().default_region.clone();
        let jobs: Vec<(&String, Timeframe)> = keywords
            .iter()
            .flat_map(|k| timeframes.iter().map(move |tf| (k, *tf)))
            .collect();

        let signals: Vec<KeywordSignal> = stream::iter(jobs)
            .map(|(keyword, timeframe)| {
                let region = region.as_str();
                async move { self.analyze_keyword(keyword, timeframe, region).await }
            })
            .buffer_unordered(self.config().max_concurrency.max(1))
            .collect()
            .await;

        let mut by_keyword: HashMap<String, HashMap<Timeframe, KeywordSignal>> = HashMap::new();
        for signal in signals {
            by_keyword
                .entry(signal.keyword.clone())
                .or_default()
                .insert(signal.timeframe, signal);
        }
        by_keyword
    }

    async fn analyze_all(&self, keywords: &[String]) -> Vec<KeywordSignal> {
        let timeframe = self.config().default_timeframe;
        let region = self.config().default_region.clone();
        stream::iter(keywords)
            .map(|keyword| {
                let region = region.as_str();
                async move { self.analyze_keyword(keyword, timeframe, region).await }
            })
            .buffered(self.config().max_concurrency.max(1))
            .collect()
            .await
    }

    /// Rank keywords by trend score. Keywords without features rank last.
    pub async fn compare(&self, keywords: &[String]) -> Vec<RankedKeyword> {
        let mut signals = self.analyze_all(keywords).await;
        signals.sort_by(|a, b| match (a.trend_score(), b.trend_score()) {
            (Some(x), Some(y)) => y
                .partial_cmp(&x)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.keyword.cmp(&b.keyword)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.keyword.cmp(&b.keyword),
        });

        signals
            .into_iter()
            .enumerate()
            .map(|(i, signal)| RankedKeyword {
                rank: i + 1,
                keyword: signal.keyword.clone(),
                signal,
            })
            .collect()
    }

    /// Keywords currently rising in `category`, with positive growth, fastest first.
    pub async fn get_rising(&self, category: &str, region: &str) -> SignalResult<Vec<KeywordSignal>> {
        if !self.provider.supports_rising_keywords() {
            return Err(SignalError::Unsupported(format!(
                "{} does not report rising keywords",
                self.provider.provider_id()
            )));
        }

        let source = self.provider.provider_id().to_string();
        let key = CacheKey::new(&source, category)
            .with_param("kind", "rising")
            .with_param("region", region);
        let ttl = self.cache_config.ttl_for(&source);

        let provider = Arc::clone(&self.provider);
        let quota = self.quota.clone();
        let retry = self.retry.clone();
        let owned_category = category.to_string();
        let owned_region = region.to_string();

        let keywords: Vec<String> = self
            .cache
            .get_or_fetch(&key, ttl, move || async move {
                let (provider, quota) = (&provider, &quota);
                let (category, region) = (owned_category.as_str(), owned_region.as_str());
                retry
                    .run(&format!("rising keywords for '{}'", category), move || async move {
                        quota.acquire(provider.provider_id()).await?;
                        provider.fetch_rising_keywords(category, region).await
                    })
                    .await
            })
            .await?;

        if keywords.is_empty() {
            return Err(SignalError::InsufficientData(format!(
                "no rising keywords reported for '{}'",
                category
            )));
        }

        let timeframe = self.config().default_timeframe;
        let mut rising: Vec<KeywordSignal> = stream::iter(&keywords)
            .map(|keyword| async move { self.analyze_keyword(keyword, timeframe, region).await })
            .buffered(self.config().max_concurrency.max(1))
            .filter(|s| {
                let growing = s.features.as_ref().map(|f| f.growth_rate > 0.0).unwrap_or(false);
                async move { growing }
            })
            .collect()
            .await;

        rising.sort_by(|a, b| {
            let ga = a.features.as_ref().map(|f| f.growth_rate).unwrap_or(0.0);
            let gb = b.features.as_ref().map(|f| f.growth_rate).unwrap_or(0.0);
            gb.partial_cmp(&ga).unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(rising)
    }
}

#[cfg(test)]
mod tests;

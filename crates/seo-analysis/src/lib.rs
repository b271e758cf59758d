//! Keyword-level SEO analysis.
//!
//! The analyzer is provider-agnostic: whichever [`SeoProvider`] it is built
//! with (SEMrush-like, Ahrefs-like, structured scrape) is chosen by configuration.

use futures_util::stream::{self, StreamExt};
use quota_guard::QuotaGuard;
use serde::de::DeserializeOwned;
use serde::Serialize;
use signal_cache::{CacheKey, SignalCache};
use signal_core::stats::clamp_unit;
use signal_core::{
    CacheConfig, Competitor, KeywordSuggestion, RetryPolicy, SeoConfig, SeoMetric, SeoProvider,
    SeoSignal, SignalError, SignalResult, Unavailability, UnavailableReason,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Log-scaled volume in [0, 1], reaching 1 at `saturation` monthly searches.
pub fn normalize_volume(monthly_volume: u64, saturation: u64) -> f64 {
    if saturation == 0 {
        return if monthly_volume > 0 { 1.0 } else { 0.0 };
    }
    clamp_unit((1.0 + monthly_volume as f64).ln() / (1.0 + saturation as f64).ln())
}

/// normalize(volume) * (1 - difficulty/100) * (1 - competition density), in [0, 1].
pub fn seo_opportunity(metric: &SeoMetric, volume_saturation: u64) -> f64 {
    let volume = normalize_volume(metric.monthly_volume, volume_saturation);
    let ease = clamp_unit(1.0 - metric.difficulty / 100.0);
    let openness = clamp_unit(1.0 - metric.competition_density);
    clamp_unit(volume * ease * openness)
}

/// Clamp provider values into their declared ranges and keep the trailing 12 months.
pub fn sanitize_metric(mut metric: SeoMetric) -> SeoMetric {
    metric.difficulty = if metric.difficulty.is_finite() {
        metric.difficulty.clamp(0.0, 100.0)
    } else {
        0.0
    };
    metric.competition_density = clamp_unit(metric.competition_density);
    if !metric.cpc.is_finite() || metric.cpc < 0.0 {
        metric.cpc = 0.0;
    }
    if metric.trend_12mo.len() > 12 {
        metric.trend_12mo = metric.trend_12mo.split_off(metric.trend_12mo.len() - 12);
    }
    metric
}

pub struct SeoMetricsAnalyzer {
    provider: Arc<dyn SeoProvider>,
    cache: SignalCache,
    quota: QuotaGuard,
    cache_config: CacheConfig,
    retry: RetryPolicy,
    config: SeoConfig,
}

impl SeoMetricsAnalyzer {
    pub fn new(
        provider: Arc<dyn SeoProvider>,
        cache: SignalCache,
        quota: QuotaGuard,
        config: SeoConfig,
        cache_config: CacheConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            cache,
            quota,
            cache_config,
            retry,
            config,
        }
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    pub fn config(&self) -> &SeoConfig {
        &self.config
    }

    /// Cache → quota → provider, retrying transient failures.
    ///
    /// `cost` is the number of billable provider requests one call makes.
    async fn fetch<T, F, Fut>(
        &self,
        kind: &'static str,
        keyword: &str,
        database: &str,
        cost: u32,
        call: F,
    ) -> SignalResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(Arc<dyn SeoProvider>, String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SignalResult<T>> + Send,
    {
        let source = self.provider.provider_id().to_string();
        let key = CacheKey::new(&source, keyword)
            .with_param("kind", kind)
            .with_param("database", database);
        let ttl = self.cache_config.ttl_for(&source);

        let provider = Arc::clone(&self.provider);
        let quota = self.quota.clone();
        let retry = self.retry.clone();
        let label = format!("{} {} for '{}'", source, kind, keyword);
        let keyword = keyword.to_string();
        let database = database.to_string();

        self.cache
            .get_or_fetch(&key, ttl, move || async move {
                let (provider, quota, call) = (&provider, &quota, &call);
                let (keyword, database) = (&keyword, &database);
                retry
                    .run(&label, move || async move {
                        quota.acquire_many(provider.provider_id(), cost).await?;
                        call(Arc::clone(provider), keyword.clone(), database.clone()).await
                    })
                    .await
            })
            .await
    }

    /// SEO metric and opportunity ratio for one keyword. Failures are absorbed into `unavailable`.
    pub async fn analyze_keyword(&self, keyword: &str, database: &str) -> SeoSignal {
        let mut signal = SeoSignal {
            keyword: keyword.to_string(),
            database: database.to_string(),
            metric: None,
            seo_opportunity: None,
            unavailable: None,
        };

        if keyword.trim().is_empty() {
            signal.unavailable = Some(Unavailability::new(
                UnavailableReason::InvalidKeyword,
                "empty keyword",
            ));
            return signal;
        }

        let fetched = self
            .fetch(
                "metric",
                keyword,
                database,
                self.provider.requests_per_metric(),
                |provider, keyword, database| async move { provider.fetch_seo_metric(&keyword, &database).await },
            )
            .await;

        match fetched {
            Ok(metric) => {
                let metric = sanitize_metric(metric);
                let opportunity = seo_opportunity(&metric, self.config.volume_saturation);
                tracing::debug!(
                    "SEO metric for '{}' ({}): volume {}, difficulty {:.0}, opportunity {:.2}",
                    keyword,
                    database,
                    metric.monthly_volume,
                    metric.difficulty,
                    opportunity
                );
                signal.seo_opportunity = Some(opportunity);
                signal.metric = Some(metric);
            }
            Err(e) => {
                tracing::warn!("SEO data unavailable for '{}' ({}): {}", keyword, database, e);
                signal.unavailable = Some(Unavailability::from(&e));
            }
        }
        signal
    }

    /// Analyze several keywords concurrently; keyed by keyword.
    pub async fn analyze_keywords(&self, keywords: &[String], database: &str) -> HashMap<String, SeoSignal> {
        stream::iter(keywords)
            .map(|keyword| async move { self.analyze_keyword(keyword, database).await })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .map(|signal| (signal.keyword.clone(), signal))
            .collect()
            .await
    }

    /// Domains ranking for `keyword`, best position first.
    ///
    /// Fails with `Unsupported` before touching cache or quota when the provider has no competitor report.
    pub async fn get_competitors(&self, keyword: &str, database: &str) -> SignalResult<Vec<Competitor>> {
        if !self.provider.supports_competitors() {
            return Err(SignalError::Unsupported(format!(
                "{} does not report competitors",
                self.provider_id()
            )));
        }
        let mut competitors: Vec<Competitor> = self
            .fetch("competitors", keyword, database, 1, |provider, keyword, database| async move {
                provider.fetch_competitors(&keyword, &database).await
            })
            .await?;
        competitors.sort_by_key(|c| c.position);
        Ok(competitors)
    }

    /// Related keywords, highest volume first, without the seed keyword itself.
    pub async fn get_keyword_suggestions(&self, keyword: &str, database: &str) -> SignalResult<Vec<KeywordSuggestion>> {
        if !self.provider.supports_keyword_suggestions() {
            return Err(SignalError::Unsupported(format!(
                "{} does not report keyword suggestions",
                self.provider_id()
            )));
        }
        let seed = keyword.trim().to_lowercase();
        let mut suggestions: Vec<KeywordSuggestion> = self
            .fetch("suggestions", keyword, database, 1, |provider, keyword, database| async move {
                provider.fetch_keyword_suggestions(&keyword, &database).await
            })
            .await?;
        suggestions.retain(|s| s.keyword.trim().to_lowercase() != seed);
        suggestions.sort_by(|a, b| {
            b.monthly_volume
                .cmp(&a.monthly_volume)
                .then_with(|| a.keyword.cmp(&b.keyword))
        });
        Ok(suggestions)
    }
}

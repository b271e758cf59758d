use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::{Criterion, RetryPolicy, SignalError, SignalResult, Timeframe};

/// Provider ids with a built-in quota/TTL entry
pub const KNOWN_PROVIDERS: [&str; 4] = ["trends", "semrush", "ahrefs", "scrape"];

/// Request ceilings for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderLimits {
    pub rate_limit_per_second: f64,
    pub daily_limit: u64,
    /// Longest time `acquire` will wait for the per-second bucket
    pub max_wait_ms: u64,
    /// Hours after midnight UTC at which the daily window resets
    pub reset_offset_hours: i64,
}

impl Default for ProviderLimits {
    fn default() -> Self {
        Self {
            rate_limit_per_second: 1.0,
            daily_limit: 1_000,
            max_wait_ms: 5_000,
            reset_offset_hours: 0,
        }
    }
}

impl ProviderLimits {
    pub fn new(rate_limit_per_second: f64, daily_limit: u64) -> Self {
        Self {
            rate_limit_per_second,
            daily_limit,
            ..Self::default()
        }
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL in seconds keyed by source (provider id)
    pub ttl_per_source: HashMap<String, u64>,
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut ttl_per_source = HashMap::new();
        // Trend series move daily, keyword metrics monthly
        ttl_per_source.insert("trends".to_string(), 6 * 3600);
        ttl_per_source.insert("semrush".to_string(), 24 * 3600);
        ttl_per_source.insert("ahrefs".to_string(), 24 * 3600);
        ttl_per_source.insert("scrape".to_string(), 12 * 3600);
        Self {
            ttl_per_source,
            default_ttl_secs: 3600,
        }
    }
}

impl CacheConfig {
    pub fn ttl_for(&self, source: &str) -> Duration {
        Duration::from_secs(
            self.ttl_per_source
                .get(source)
                .copied()
                .unwrap_or(self.default_ttl_secs),
        )
    }
}

/// Sub-weights of the trend score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendWeights {
    pub growth: f64,
    pub momentum: f64,
    /// Applied to (1 - volatility)
    pub stability: f64,
}

impl Default for TrendWeights {
    fn default() -> Self {
        Self {
            growth: 0.4,
            momentum: 0.3,
            stability: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Series shorter than this yield unavailable features
    pub min_series_len: usize,
    /// N in "last N vs previous N" momentum
    pub momentum_window: usize,
    /// Floor for relative-change denominators, in interest points
    pub growth_epsilon: f64,
    pub seasonality_threshold: f64,
    pub min_seasonal_cycles: usize,
    pub weights: TrendWeights,
    pub default_timeframe: Timeframe,
    pub default_region: String,
    pub max_concurrency: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_series_len: 8,
            momentum_window: 4,
            growth_epsilon: 1.0,
            seasonality_threshold: 0.5,
            min_seasonal_cycles: 2,
            weights: TrendWeights::default(),
            default_timeframe: Timeframe::FiveYears,
            default_region: "US".to_string(),
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeoConfig {
    /// Monthly volume at which the normalized volume reaches 1
    pub volume_saturation: u64,
    pub default_database: String,
    pub max_concurrency: usize,
}

impl Default for SeoConfig {
    fn default() -> Self {
        Self {
            volume_saturation: 10_000,
            default_database: "us".to_string(),
            max_concurrency: 4,
        }
    }
}

/// Declared weights of the four scoring criteria
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaWeights {
    pub trend: f64,
    pub seo: f64,
    pub seasonality: f64,
    pub competition: f64,
}

impl Default for CriteriaWeights {
    fn default() -> Self {
        Self {
            trend: 0.25,
            seo: 0.25,
            seasonality: 0.25,
            competition: 0.25,
        }
    }
}

impl CriteriaWeights {
    pub fn get(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::Trend => self.trend,
            Criterion::Seo => self.seo,
            Criterion::Seasonality => self.seasonality,
            Criterion::Competition => self.competition,
        }
    }

    pub fn total(&self) -> f64 {
        Criterion::ALL.iter().map(|c| self.get(*c)).sum()
    }

    pub fn validate(&self) -> SignalResult<()> {
        for c in Criterion::ALL {
            let w = self.get(c);
            if !w.is_finite() || w < 0.0 {
                return Err(SignalError::InvalidConfiguration(format!(
                    "weight for {} must be a non-negative number, got {}",
                    c.name(),
                    w
                )));
            }
        }
        if self.total() <= 0.0 {
            return Err(SignalError::InvalidConfiguration(
                "criteria weights sum to zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// How per-keyword values are folded into one criterion value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Mean,
    Median,
    Max,
    Min,
}

impl FromStr for Reducer {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Reducer::Mean),
            "median" => Ok(Reducer::Median),
            "max" => Ok(Reducer::Max),
            "min" => Ok(Reducer::Min),
            other => Err(SignalError::InvalidConfiguration(format!(
                "unknown reducer '{}'",
                other
            ))),
        }
    }
}

/// Seasonality criterion values by alignment with the target selling window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalityTarget {
    /// Calendar months (1-12) the product is meant to sell in; empty = no preference
    pub target_months: Vec<u32>,
    pub aligned_value: f64,
    pub misaligned_value: f64,
    pub neutral_value: f64,
}

impl Default for SeasonalityTarget {
    fn default() -> Self {
        Self {
            target_months: Vec::new(),
            aligned_value: 1.0,
            misaligned_value: 0.2,
            neutral_value: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: CriteriaWeights,
    pub reducer: Reducer,
    pub seasonality: SeasonalityTarget,
    pub timeframe: Timeframe,
    pub region: String,
    pub database: String,
    /// Per-fetch timeout; an expired fetch marks its criterion unavailable
    pub fetch_timeout_ms: u64,
    pub max_concurrency: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: CriteriaWeights::default(),
            reducer: Reducer::Mean,
            seasonality: SeasonalityTarget::default(),
            timeframe: Timeframe::FiveYears,
            region: "US".to_string(),
            database: "us".to_string(),
            fetch_timeout_ms: 30_000,
            max_concurrency: 8,
        }
    }
}

impl ScoringConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Every recognized engine option.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub providers: HashMap<String, ProviderLimits>,
    pub default_limits: ProviderLimits,
    pub cache: CacheConfig,
    pub trend: TrendConfig,
    pub seo: SeoConfig,
    pub scoring: ScoringConfig,
    pub retry: RetryPolicy,
}

fn env_or<T: FromStr>(name: &str, default: T) -> SignalResult<T> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            SignalError::InvalidConfiguration(format!("{} has an unparsable value '{}'", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

impl EngineConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> SignalResult<Self> {
        let defaults = EngineConfig::default();

        let default_limits = ProviderLimits {
            rate_limit_per_second: env_or("QUOTA_DEFAULT_RPS", defaults.default_limits.rate_limit_per_second)?,
            daily_limit: env_or("QUOTA_DEFAULT_DAILY", defaults.default_limits.daily_limit)?,
            max_wait_ms: env_or("QUOTA_MAX_WAIT_MS", defaults.default_limits.max_wait_ms)?,
            reset_offset_hours: env_or("QUOTA_RESET_OFFSET_HOURS", defaults.default_limits.reset_offset_hours)?,
        };

        let mut providers = HashMap::new();
        let mut cache = defaults.cache.clone();
        for id in KNOWN_PROVIDERS {
            let upper = id.to_ascii_uppercase();
            providers.insert(
                id.to_string(),
                ProviderLimits {
                    rate_limit_per_second: env_or(&format!("QUOTA_{}_RPS", upper), default_limits.rate_limit_per_second)?,
                    daily_limit: env_or(&format!("QUOTA_{}_DAILY", upper), default_limits.daily_limit)?,
                    ..default_limits.clone()
                },
            );
            let ttl = cache.ttl_for(id).as_secs();
            cache
                .ttl_per_source
                .insert(id.to_string(), env_or(&format!("CACHE_TTL_{}_SECS", upper), ttl)?);
        }
        cache.default_ttl_secs = env_or("CACHE_TTL_DEFAULT_SECS", cache.default_ttl_secs)?;

        let trend = TrendConfig {
            min_series_len: env_or("TREND_MIN_SERIES_LEN", defaults.trend.min_series_len)?,
            momentum_window: env_or("TREND_MOMENTUM_WINDOW", defaults.trend.momentum_window)?,
            growth_epsilon: env_or("TREND_GROWTH_EPSILON", defaults.trend.growth_epsilon)?,
            seasonality_threshold: env_or("SEASONALITY_THRESHOLD", defaults.trend.seasonality_threshold)?,
            min_seasonal_cycles: env_or("SEASONALITY_MIN_CYCLES", defaults.trend.min_seasonal_cycles)?,
            weights: TrendWeights {
                growth: env_or("TREND_WEIGHT_GROWTH", defaults.trend.weights.growth)?,
                momentum: env_or("TREND_WEIGHT_MOMENTUM", defaults.trend.weights.momentum)?,
                stability: env_or("TREND_WEIGHT_STABILITY", defaults.trend.weights.stability)?,
            },
            default_timeframe: match env::var("TREND_TIMEFRAME") {
                Ok(label) => Timeframe::from_label(&label).ok_or_else(|| {
                    SignalError::InvalidConfiguration(format!("unknown timeframe '{}'", label))
                })?,
                Err(_) => defaults.trend.default_timeframe,
            },
            default_region: env::var("TREND_REGION").unwrap_or(defaults.trend.default_region),
            max_concurrency: env_or("TREND_MAX_CONCURRENCY", defaults.trend.max_concurrency)?,
        };

        let seo = SeoConfig {
            volume_saturation: env_or("SEO_VOLUME_SATURATION", defaults.seo.volume_saturation)?,
            default_database: env::var("SEO_DATABASE").unwrap_or(defaults.seo.default_database),
            max_concurrency: env_or("SEO_MAX_CONCURRENCY", defaults.seo.max_concurrency)?,
        };

        let target_months = match env::var("SEASONALITY_TARGET_MONTHS") {
            Ok(raw) => raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| {
                    s.trim().parse::<u32>().map_err(|_| {
                        SignalError::InvalidConfiguration(format!("invalid month '{}'", s))
                    })
                })
                .collect::<SignalResult<Vec<u32>>>()?,
            Err(_) => Vec::new(),
        };

        let scoring = ScoringConfig {
            weights: CriteriaWeights {
                trend: env_or("WEIGHT_TREND", defaults.scoring.weights.trend)?,
                seo: env_or("WEIGHT_SEO", defaults.scoring.weights.seo)?,
                seasonality: env_or("WEIGHT_SEASONALITY", defaults.scoring.weights.seasonality)?,
                competition: env_or("WEIGHT_COMPETITION", defaults.scoring.weights.competition)?,
            },
            reducer: env_or("SCORING_REDUCER", defaults.scoring.reducer)?,
            seasonality: SeasonalityTarget {
                target_months,
                ..SeasonalityTarget::default()
            },
            timeframe: trend.default_timeframe,
            region: trend.default_region.clone(),
            database: seo.default_database.clone(),
            fetch_timeout_ms: env_or("FETCH_TIMEOUT_MS", defaults.scoring.fetch_timeout_ms)?,
            max_concurrency: env_or("SCORING_MAX_CONCURRENCY", defaults.scoring.max_concurrency)?,
        };

        let retry = RetryPolicy {
            max_attempts: env_or("RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
            base_delay_ms: env_or("RETRY_BASE_DELAY_MS", defaults.retry.base_delay_ms)?,
            max_delay_ms: env_or("RETRY_MAX_DELAY_MS", defaults.retry.max_delay_ms)?,
        };

        let config = Self {
            providers,
            default_limits,
            cache,
            trend,
            seo,
            scoring,
            retry,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SignalResult<()> {
        self.scoring.weights.validate()?;
        let tw = &self.trend.weights;
        if [tw.growth, tw.momentum, tw.stability].iter().any(|w| *w < 0.0)
            || tw.growth + tw.momentum + tw.stability <= 0.0
        {
            return Err(SignalError::InvalidConfiguration(
                "trend weights must be non-negative with a positive sum".to_string(),
            ));
        }
        let all_limits = self
            .providers
            .iter()
            .map(|(id, limits)| (id.as_str(), limits))
            .chain(std::iter::once(("default", &self.default_limits)));
        for (id, limits) in all_limits {
            if limits.rate_limit_per_second <= 0.0 {
                return Err(SignalError::InvalidConfiguration(format!(
                    "{}: rate_limit_per_second must be positive",
                    id
                )));
            }
        }
        if self.trend.momentum_window == 0 || self.trend.min_series_len < 2 {
            return Err(SignalError::InvalidConfiguration(
                "momentum_window must be >= 1 and min_series_len >= 2".to_string(),
            ));
        }
        if self.scoring.seasonality.target_months.iter().any(|m| !(1..=12).contains(m)) {
            return Err(SignalError::InvalidConfiguration(
                "seasonality target months must be within 1-12".to_string(),
            ));
        }
        Ok(())
    }

    /// Limits for a provider, falling back to `default_limits`
    pub fn limits_for(&self, provider: &str) -> ProviderLimits {
        self.providers
            .get(provider)
            .cloned()
            .unwrap_or_else(|| self.default_limits.clone())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Unavailability;

/// One observation of relative search interest (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Observation window requested from a search-trend provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    /// Hourly points over the last 7 days
    PastWeek,
    /// Daily points over the last month
    PastMonth,
    /// Daily points over the last 3 months
    PastQuarter,
    /// Weekly points over the last 12 months
    PastYear,
    /// Weekly points over the last 5 years
    FiveYears,
    /// Monthly points since the provider's first record
    AllTime,
}

impl Timeframe {
    /// Label understood by search-trend providers
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::PastWeek => "now 7-d",
            Timeframe::PastMonth => "today 1-m",
            Timeframe::PastQuarter => "today 3-m",
            Timeframe::PastYear => "today 12-m",
            Timeframe::FiveYears => "today 5-y",
            Timeframe::AllTime => "all",
        }
    }

    /// Number of periods in one natural cycle at this timeframe's resolution
    pub fn natural_cycle(&self) -> usize {
        match self {
            Timeframe::PastWeek => 24,
            Timeframe::PastMonth | Timeframe::PastQuarter => 7,
            Timeframe::PastYear | Timeframe::FiveYears => 52,
            Timeframe::AllTime => 12,
        }
    }

    /// Whether one natural cycle spans a calendar year
    pub fn has_annual_cycle(&self) -> bool {
        matches!(
            self,
            Timeframe::PastYear | Timeframe::FiveYears | Timeframe::AllTime
        )
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "now 7-d" | "7d" | "week" => Some(Timeframe::PastWeek),
            "today 1-m" | "1m" | "month" => Some(Timeframe::PastMonth),
            "today 3-m" | "3m" | "quarter" => Some(Timeframe::PastQuarter),
            "today 12-m" | "12m" | "year" => Some(Timeframe::PastYear),
            "today 5-y" | "5y" => Some(Timeframe::FiveYears),
            "all" => Some(Timeframe::AllTime),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Recurring pattern found by autocorrelation at the natural cycle lag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalityPattern {
    pub cycle_length: usize,
    pub autocorrelation: f64,
    /// Offset within the cycle with the highest average interest
    pub peak_phase: usize,
    /// Calendar month (1-12) with the highest average interest, for annual cycles
    pub peak_month: Option<u32>,
}

/// Features derived from a keyword's interest series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendFeatures {
    pub current_interest: f64,
    /// Signed fraction, last quarter of the window vs first quarter
    pub growth_rate: f64,
    /// Signed fraction, last N periods vs previous N periods
    pub momentum: f64,
    /// Coefficient of variation (higher = less stable)
    pub volatility: f64,
    pub seasonality: Option<SeasonalityPattern>,
    /// 0 to 100
    pub trend_score: f64,
}

/// Trend analysis of one keyword over one timeframe and region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordSignal {
    pub keyword: String,
    pub region: String,
    pub timeframe: Timeframe,
    pub series: Vec<TimeSeriesPoint>,
    pub features: Option<TrendFeatures>,
    #[serde(default)]
    pub unavailable: Option<Unavailability>,
    pub computed_at: DateTime<Utc>,
}

impl KeywordSignal {
    pub fn is_available(&self) -> bool {
        self.features.is_some()
    }

    pub fn trend_score(&self) -> Option<f64> {
        self.features.as_ref().map(|f| f.trend_score)
    }
}

/// Position of a keyword in a trend comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedKeyword {
    pub rank: usize,
    pub keyword: String,
    pub signal: KeywordSignal,
}

/// Keyword-level SEO metrics as reported by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeoMetric {
    pub keyword: String,
    pub database: String,
    pub monthly_volume: u64,
    pub cpc: f64,
    /// 0 to 100
    pub difficulty: f64,
    /// 0 to 1
    pub competition_density: f64,
    pub results_count: u64,
    /// Relative monthly interest for the trailing 12 months, oldest first
    pub trend_12mo: Vec<f64>,
}

/// SEO analysis of one keyword, with the derived opportunity ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeoSignal {
    pub keyword: String,
    pub database: String,
    pub metric: Option<SeoMetric>,
    /// 0 to 1
    pub seo_opportunity: Option<f64>,
    #[serde(default)]
    pub unavailable: Option<Unavailability>,
}

impl SeoSignal {
    pub fn is_available(&self) -> bool {
        self.metric.is_some()
    }
}

/// Domain ranking for a keyword in organic results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    pub domain: String,
    pub url: Option<String>,
    pub position: u32,
    #[serde(default)]
    pub estimated_traffic: Option<f64>,
}

/// Related keyword proposed by an SEO provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordSuggestion {
    pub keyword: String,
    pub monthly_volume: u64,
    #[serde(default)]
    pub difficulty: Option<f64>,
}

/// Scoring criteria combined into the opportunity score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Trend,
    Seo,
    Seasonality,
    Competition,
}

impl Criterion {
    pub const ALL: [Criterion; 4] = [
        Criterion::Trend,
        Criterion::Seo,
        Criterion::Seasonality,
        Criterion::Competition,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Criterion::Trend => "trend",
            Criterion::Seo => "seo",
            Criterion::Seasonality => "seasonality",
            Criterion::Competition => "competition",
        }
    }
}

/// One criterion's contribution to a product evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub criterion: Criterion,
    /// 0 to 1, `None` when no keyword had usable data
    pub normalized_value: Option<f64>,
    /// Declared weight, normalized so all declared weights sum to 1
    pub weight: f64,
    /// Weight actually applied after renormalization (0 when unavailable)
    pub effective_weight: f64,
    /// Keywords that contributed a value
    pub keywords_covered: usize,
    #[serde(default)]
    pub unavailable: Option<Unavailability>,
}

impl CriterionResult {
    pub fn is_available(&self) -> bool {
        self.normalized_value.is_some()
    }
}

/// Opportunity tier derived from the composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpportunityTier {
    High,
    Moderate,
    Low,
}

impl OpportunityTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            OpportunityTier::High
        } else if score >= 45.0 {
            OpportunityTier::Moderate
        } else {
            OpportunityTier::Low
        }
    }

    pub fn to_label(&self) -> &'static str {
        match self {
            OpportunityTier::High => "High",
            OpportunityTier::Moderate => "Moderate",
            OpportunityTier::Low => "Low",
        }
    }
}

/// Scored evaluation of a candidate product, consumed by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductOpportunity {
    pub product_id: String,
    pub keywords: Vec<String>,
    pub criteria: Vec<CriterionResult>,
    /// 0 to 100
    pub composite_score: f64,
    /// Fraction of declared weight backed by available data (0 to 1)
    pub confidence: f64,
    pub tier: OpportunityTier,
    pub recommendation: String,
    pub computed_at: DateTime<Utc>,
}

impl ProductOpportunity {
    /// Criteria that could not be scored, with the reason
    pub fn unavailable_criteria(&self) -> Vec<(Criterion, &Unavailability)> {
        self.criteria
            .iter()
            .filter_map(|c| c.unavailable.as_ref().map(|u| (c.criterion, u)))
            .collect()
    }
}

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use seo_analysis::SeoMetricsAnalyzer;
use signal_core::stats::{clamp_unit, mean, median};
use signal_core::{
    CriteriaWeights, Criterion, CriterionResult, KeywordSignal, OpportunityTier,
    ProductOpportunity, Reducer, ScoringConfig, SeasonalityPattern, SeasonalityTarget, SeoSignal,
    SignalError, SignalResult, Unavailability, UnavailableReason,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use trend_analysis::TrendSignalAnalyzer;

/// Seasonality criterion value for a detected (or absent) pattern.
///
/// Aligned peak month → bonus, misaligned → penalty, undetected or no target window → neutral.
pub fn seasonality_value(pattern: Option<&SeasonalityPattern>, target: &SeasonalityTarget) -> f64 {
    let value = match pattern.and_then(|p| p.peak_month) {
        _ if target.target_months.is_empty() => target.neutral_value,
        Some(month) if target.target_months.contains(&month) => target.aligned_value,
        Some(_) => target.misaligned_value,
        None => target.neutral_value,
    };
    clamp_unit(value)
}

/// Fold per-keyword values of one criterion into a single value.
pub fn reduce(reducer: Reducer, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let folded = match reducer {
        Reducer::Mean => mean(values),
        Reducer::Median => median(values),
        Reducer::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Reducer::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
    };
    Some(clamp_unit(folded))
}

/// Per-criterion outcome before weighting
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionValue {
    pub criterion: Criterion,
    pub value: Result<f64, Unavailability>,
    pub keywords_covered: usize,
}

/// Weighted combination with renormalization over available criteria.
///
/// Returns (composite score in [0, 100], confidence in [0, 1], per-criterion breakdown).
/// Fails with `InsufficientData` when no criterion carries a value.
pub fn combine_criteria(
    weights: &CriteriaWeights,
    values: &[CriterionValue],
) -> SignalResult<(f64, f64, Vec<CriterionResult>)> {
    weights.validate()?;
    let declared_total = weights.total();
    let covered_total: f64 = values
        .iter()
        .filter(|v| v.value.is_ok())
        .map(|v| weights.get(v.criterion))
        .sum();
    let confidence = clamp_unit(covered_total / declared_total);

    if covered_total <= 0.0 {
        let reasons: Vec<String> = values
            .iter()
            .filter_map(|v| v.value.as_ref().err())
            .map(|u| u.to_string())
            .collect();
        return Err(SignalError::InsufficientData(if reasons.is_empty() {
            "no weighted criterion has data".to_string()
        } else {
            reasons.join("; ")
        }));
    }

    let mut composite = 0.0;
    let mut results = Vec::with_capacity(values.len());
    for v in values {
        let weight = weights.get(v.criterion);
        let (normalized_value, effective_weight, unavailable) = match &v.value {
            Ok(x) => {
                let effective = weight / covered_total;
                composite += effective * x;
                (Some(*x), effective, None)
            }
            Err(u) => (None, 0.0, Some(u.clone())),
        };
        results.push(CriterionResult {
            criterion: v.criterion,
            normalized_value,
            weight: weight / declared_total,
            effective_weight,
            keywords_covered: v.keywords_covered,
            unavailable,
        });
    }

    Ok(((composite * 100.0).clamp(0.0, 100.0), confidence, results))
}

/// Order by composite score, higher first; equal scores favor the product backed by more keywords.
pub fn rank_opportunities(opportunities: &mut [ProductOpportunity]) {
    opportunities.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.keywords.len().cmp(&a.keywords.len()))
    });
}

/// Trend and SEO evidence gathered for one keyword
enum Evidence {
    Trend(KeywordSignal),
    Seo(SeoSignal),
}

pub struct ProductOpportunityScorer {
    trend: Arc<TrendSignalAnalyzer>,
    seo: Arc<SeoMetricsAnalyzer>,
    config: ScoringConfig,
}

impl ProductOpportunityScorer {
    pub fn new(trend: Arc<TrendSignalAnalyzer>, seo: Arc<SeoMetricsAnalyzer>, config: ScoringConfig) -> Self {
        Self { trend, seo, config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score a product from its keyword set.
    ///
    /// Fans out one trend and one SEO fetch per keyword (bounded concurrency, per-fetch
    /// timeout) and waits for all of them before aggregating. Dropping the returned
    /// future, or a fetch timing out, aborts the provider calls no other caller is waiting on.
    pub async fn score_product(
        &self,
        product_id: &str,
        keywords: &[String],
        weights: Option<CriteriaWeights>,
    ) -> SignalResult<ProductOpportunity> {
        let weights = weights.unwrap_or_else(|| self.config.weights.clone());
        weights.validate()?;

        // Unicode case folding, matching how cache keys fold keywords
        let mut seen = HashSet::new();
        let mut unique: Vec<String> = Vec::new();
        for k in keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
            if seen.insert(k.to_lowercase()) {
                unique.push(k.to_string());
            }
        }
        if unique.is_empty() {
            return Err(SignalError::InsufficientData(format!(
                "product {} has no keywords",
                product_id
            )));
        }

        tracing::info!("Scoring product {} over {} keywords", product_id, unique.len());
        let evidence = self.gather(&unique).await;

        let mut trends: HashMap<String, KeywordSignal> = HashMap::new();
        let mut seos: HashMap<String, SeoSignal> = HashMap::new();
        for e in evidence {
            match e {
                Evidence::Trend(s) => {
                    trends.insert(s.keyword.clone(), s);
                }
                Evidence::Seo(s) => {
                    seos.insert(s.keyword.clone(), s);
                }
            }
        }

        let values = self.criterion_values(&unique, &trends, &seos);
        let (composite_score, confidence, criteria) = combine_criteria(&weights, &values).map_err(|e| {
            tracing::warn!("Cannot score product {}: {}", product_id, e);
            e
        })?;

        let tier = OpportunityTier::from_score(composite_score);
        tracing::info!(
            "Product {} scored {:.1} ({}, confidence {:.0}%)",
            product_id,
            composite_score,
            tier.to_label(),
            confidence * 100.0
        );

        Ok(ProductOpportunity {
            product_id: product_id.to_string(),
            keywords: unique,
            criteria,
            composite_score,
            confidence,
            tier,
            recommendation: Self::generate_recommendation(tier, composite_score, confidence),
            computed_at: Utc::now(),
        })
    }

    /// Score several products in input order; each result stands alone.
    pub async fn score_products(
        &self,
        products: &[(String, Vec<String>)],
    ) -> Vec<(String, SignalResult<ProductOpportunity>)> {
        let mut results = Vec::with_capacity(products.len());
        for (product_id, keywords) in products {
            let result = self.score_product(product_id, keywords, None).await;
            results.push((product_id.clone(), result));
        }
        results
    }

    async fn gather(&self, keywords: &[String]) -> Vec<Evidence> {
        let timeout = self.config.fetch_timeout();
        let timeframe = self.config.timeframe;
        let region = self.config.region.as_str();
        let database = self.config.database.as_str();

        let jobs = keywords
            .iter()
            .flat_map(|k| [(k.as_str(), true), (k.as_str(), false)]);

        stream::iter(jobs)
            .map(|(keyword, is_trend)| async move {
                if is_trend {
                    match tokio::time::timeout(timeout, self.trend.analyze_keyword(keyword, timeframe, region)).await {
                        Ok(signal) => Evidence::Trend(signal),
                        Err(_) => {
                            tracing::warn!("Trend fetch for '{}' timed out after {:?}", keyword, timeout);
                            Evidence::Trend(KeywordSignal {
                                keyword: keyword.to_string(),
                                region: region.to_string(),
                                timeframe,
                                series: Vec::new(),
                                features: None,
                                unavailable: Some(Unavailability::timeout(format!(
                                    "trend fetch exceeded {}ms",
                                    timeout.as_millis()
                                ))),
                                computed_at: Utc::now(),
                            })
                        }
                    }
                } else {
                    match tokio::time::timeout(timeout, self.seo.analyze_keyword(keyword, database)).await {
                        Ok(signal) => Evidence::Seo(signal),
                        Err(_) => {
                            tracing::warn!("SEO fetch for '{}' timed out after {:?}", keyword, timeout);
                            Evidence::Seo(SeoSignal {
                                keyword: keyword.to_string(),
                                database: database.to_string(),
                                metric: None,
                                seo_opportunity: None,
                                unavailable: Some(Unavailability::timeout(format!(
                                    "SEO fetch exceeded {}ms",
                                    timeout.as_millis()
                                ))),
                            })
                        }
                    }
                }
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await
    }

    /// Per-criterion values reduced across keywords
    fn criterion_values(
        &self,
        keywords: &[String],
        trends: &HashMap<String, KeywordSignal>,
        seos: &HashMap<String, SeoSignal>,
    ) -> Vec<CriterionValue> {
        let missing = |keyword: &str, source: &str| {
            Unavailability::new(
                UnavailableReason::ProviderUnavailable,
                format!("no {} result for '{}'", source, keyword),
            )
        };

        let mut per_criterion: BTreeMap<Criterion, (Vec<f64>, Vec<(String, Unavailability)>)> =
            Criterion::ALL.iter().map(|c| (*c, (Vec::new(), Vec::new()))).collect();

        for keyword in keywords {
            let trend = trends.get(keyword);
            let trend_features = trend.and_then(|s| s.features.as_ref());
            let trend_gap = || {
                trend
                    .and_then(|s| s.unavailable.clone())
                    .unwrap_or_else(|| missing(keyword, "trend"))
            };

            let seo = seos.get(keyword);
            let seo_metric = seo.and_then(|s| s.metric.as_ref().zip(s.seo_opportunity));
            let seo_gap = || {
                seo.and_then(|s| s.unavailable.clone())
                    .unwrap_or_else(|| missing(keyword, "SEO"))
            };

            let outcomes = [
                (Criterion::Trend, trend_features.map(|f| clamp_unit(f.trend_score / 100.0)).ok_or_else(trend_gap)),
                (
                    Criterion::Seasonality,
                    trend_features
                        .map(|f| seasonality_value(f.seasonality.as_ref(), &self.config.seasonality))
                        .ok_or_else(trend_gap),
                ),
                (Criterion::Seo, seo_metric.map(|(_, opportunity)| opportunity).ok_or_else(seo_gap)),
                (
                    Criterion::Competition,
                    seo_metric
                        .map(|(m, _)| clamp_unit(1.0 - m.competition_density))
                        .ok_or_else(seo_gap),
                ),
            ];

            for (criterion, outcome) in outcomes {
                if let Some(slot) = per_criterion.get_mut(&criterion) {
                    match outcome {
                        Ok(v) => slot.0.push(v),
                        Err(u) => slot.1.push((keyword.clone(), u)),
                    }
                }
            }
        }

        per_criterion
            .into_iter()
            .map(|(criterion, (available, gaps))| {
                let value = match reduce(self.config.reducer, &available) {
                    Some(v) => Ok(v),
                    None => Err(summarize_gaps(&gaps)),
                };
                CriterionValue {
                    criterion,
                    value,
                    keywords_covered: available.len(),
                }
            })
            .collect()
    }

    fn generate_recommendation(tier: OpportunityTier, score: f64, confidence: f64) -> String {
        let action = match tier {
            OpportunityTier::High => "Strong candidate",
            OpportunityTier::Moderate => "Worth testing",
            OpportunityTier::Low => "Weak candidate",
        };

        let confidence_desc = if confidence > 0.8 {
            "high"
        } else if confidence > 0.6 {
            "moderate"
        } else if confidence > 0.4 {
            "low"
        } else {
            "very low"
        };

        format!(
            "{} (score {:.0}, confidence: {} - {:.0}%)",
            action,
            score,
            confidence_desc,
            confidence * 100.0
        )
    }
}

/// One marker for a criterion no keyword could back: the most frequent reason, with every keyword's detail.
fn summarize_gaps(gaps: &[(String, Unavailability)]) -> Unavailability {
    let mut counts: HashMap<UnavailableReason, usize> = HashMap::new();
    for (_, u) in gaps {
        *counts.entry(u.reason).or_default() += 1;
    }
    let reason = gaps
        .iter()
        .map(|(_, u)| u.reason)
        .max_by_key(|r| counts.get(r).copied().unwrap_or(0))
        .unwrap_or(UnavailableReason::InsufficientData);
    let detail = if gaps.is_empty() {
        "no keyword data".to_string()
    } else {
        gaps.iter()
            .map(|(k, u)| format!("{}: {}", k, u.detail))
            .collect::<Vec<_>>()
            .join("; ")
    };
    Unavailability::new(reason, detail)
}

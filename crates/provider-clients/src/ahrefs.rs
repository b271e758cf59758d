//! Ahrefs v3 API client (bearer token, JSON).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use signal_core::{
    Competitor, KeywordSuggestion, SeoMetric, SeoProvider, SignalError, SignalResult,
};
use std::time::Duration;

use crate::http;

pub const PROVIDER_ID: &str = "ahrefs";
pub const DEFAULT_BASE_URL: &str = "https://api.ahrefs.com/v3";

#[derive(Debug, Deserialize)]
struct KeywordsResponse {
    #[serde(default)]
    keywords: Vec<KeywordRow>,
}

#[derive(Debug, Deserialize)]
struct KeywordRow {
    keyword: String,
    #[serde(default)]
    volume: Option<u64>,
    #[serde(default)]
    difficulty: Option<f64>,
    /// USD cents
    #[serde(default)]
    cpc: Option<f64>,
    /// Clicks per search
    #[serde(default)]
    cps: Option<f64>,
    #[serde(default)]
    serp_results: Option<u64>,
    #[serde(default)]
    volume_monthly_history: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    positions: Vec<SerpRow>,
}

#[derive(Debug, Deserialize)]
struct SerpRow {
    #[serde(default)]
    url: Option<String>,
    position: u32,
    #[serde(default)]
    traffic: Option<f64>,
}

pub(crate) fn metric_from_body(keyword: &str, database: &str, body: &str) -> SignalResult<SeoMetric> {
    let response: KeywordsResponse = http::parse_json(PROVIDER_ID, body)?;
    let row = response
        .keywords
        .into_iter()
        .next()
        .ok_or_else(|| SignalError::InvalidKeyword(format!("ahrefs has no data for '{}'", keyword)))?;

    let difficulty = row.difficulty.unwrap_or(crate::NEUTRAL_DIFFICULTY);
    // A search that rarely ends in an organic click is a crowded results page
    let competition_density = row.cps.map(|cps| 1.0 - cps.min(1.0)).unwrap_or(difficulty / 100.0);

    Ok(SeoMetric {
        keyword: row.keyword,
        database: database.to_string(),
        monthly_volume: row.volume.unwrap_or(0),
        cpc: row.cpc.unwrap_or(0.0) / 100.0,
        difficulty,
        competition_density,
        results_count: row.serp_results.unwrap_or(0),
        trend_12mo: row.volume_monthly_history,
    })
}

pub(crate) fn competitors_from_body(body: &str) -> SignalResult<Vec<Competitor>> {
    let response: SerpResponse = http::parse_json(PROVIDER_ID, body)?;
    Ok(response
        .positions
        .into_iter()
        .filter_map(|row| {
            let domain = row.url.as_deref().and_then(http::domain_of)?;
            Some(Competitor {
                domain,
                url: row.url,
                position: row.position,
                estimated_traffic: row.traffic,
            })
        })
        .collect())
}

#[derive(Clone)]
pub struct AhrefsClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl AhrefsClient {
    pub fn new(api_key: String, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http::build_client(timeout),
        }
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> SignalResult<String> {
        let url = format!("{}/{}", self.base_url, path);
        http::send_text(
            PROVIDER_ID,
            self.client.get(&url).bearer_auth(&self.api_key).query(params),
        )
        .await
    }
}

#[async_trait]
impl SeoProvider for AhrefsClient {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn supports_competitors(&self) -> bool {
        true
    }

    fn supports_keyword_suggestions(&self) -> bool {
        true
    }

    async fn fetch_seo_metric(&self, keyword: &str, database: &str) -> SignalResult<SeoMetric> {
        let body = self
            .get(
                "keywords-explorer/overview",
                &[
                    ("keywords", keyword),
                    ("country", database),
                    ("select", "keyword,volume,difficulty,cpc,cps,serp_results,volume_monthly_history"),
                ],
            )
            .await?;
        metric_from_body(keyword, database, &body)
    }

    async fn fetch_competitors(&self, keyword: &str, database: &str) -> SignalResult<Vec<Competitor>> {
        let body = self
            .get(
                "serp-overview/serp-overview",
                &[("keyword", keyword), ("country", database), ("select", "url,position,traffic")],
            )
            .await?;
        competitors_from_body(&body)
    }

    async fn fetch_keyword_suggestions(&self, keyword: &str, database: &str) -> SignalResult<Vec<KeywordSuggestion>> {
        let body = self
            .get(
                "keywords-explorer/matching-terms",
                &[
                    ("keywords", keyword),
                    ("country", database),
                    ("select", "keyword,volume,difficulty"),
                    ("limit", "20"),
                ],
            )
            .await?;
        let response: KeywordsResponse = http::parse_json(PROVIDER_ID, &body)?;
        Ok(response
            .keywords
            .into_iter()
            .map(|row| KeywordSuggestion {
                keyword: row.keyword,
                monthly_volume: row.volume.unwrap_or(0),
                difficulty: row.difficulty,
            })
            .collect())
    }
}

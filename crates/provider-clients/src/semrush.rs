//! SEMrush analytics API client.
//!
//! Reports are semicolon-separated tables with a header row. Failures come
//! back as a 200 with an `ERROR <code> :: <message>` body.

use async_trait::async_trait;
use reqwest::Client;
use signal_core::{
    Competitor, KeywordSuggestion, SeoMetric, SeoProvider, SignalError, SignalResult,
};
use std::collections::HashMap;
use std::time::Duration;

use crate::http;

pub const PROVIDER_ID: &str = "semrush";
pub const DEFAULT_BASE_URL: &str = "https://api.semrush.com";

const SERP_LIMIT: &str = "10";
const SUGGESTION_LIMIT: &str = "20";

type Row = HashMap<String, String>;

/// Parse a report body into rows keyed by column header.
pub(crate) fn parse_report(body: &str) -> SignalResult<Vec<Row>> {
    let body = body.trim();
    if let Some(rest) = body.strip_prefix("ERROR") {
        let (code, message) = rest.split_once("::").unwrap_or((rest, ""));
        let code: u32 = code.trim().parse().unwrap_or(0);
        let detail = format!("semrush error {}: {}", code, message.trim());
        return Err(match code {
            50 => SignalError::InvalidKeyword(detail),
            // API units exhausted
            132 | 133 => SignalError::quota(PROVIDER_ID, detail),
            120 | 131 | 134 => SignalError::InvalidConfiguration(detail),
            _ => SignalError::ProviderUnavailable(detail),
        });
    }

    let mut lines = body.lines().filter(|l| !l.trim().is_empty());
    let headers: Vec<&str> = match lines.next() {
        Some(header) => header.split(';').map(|h| h.trim()).collect(),
        None => return Ok(Vec::new()),
    };
    Ok(lines
        .map(|line| {
            headers
                .iter()
                .zip(line.split(';'))
                .map(|(h, v)| (h.to_string(), v.trim().to_string()))
                .collect()
        })
        .collect())
}

fn field<'a>(row: &'a Row, name: &str) -> &'a str {
    row.get(name).map(|s| s.as_str()).unwrap_or("")
}

fn number(row: &Row, name: &str) -> f64 {
    field(row, name).parse().unwrap_or(0.0)
}

/// Build a metric from a `phrase_this` row and an optional `phrase_kdi` difficulty.
pub(crate) fn metric_from_rows(keyword: &str, database: &str, overview: &Row, difficulty: Option<f64>) -> SeoMetric {
    let trend_12mo = field(overview, "Trends")
        .split(',')
        .filter_map(|v| v.trim().parse().ok())
        .collect();
    SeoMetric {
        keyword: keyword.to_string(),
        database: database.to_string(),
        monthly_volume: number(overview, "Search Volume").max(0.0) as u64,
        cpc: number(overview, "CPC"),
        difficulty: difficulty.unwrap_or(crate::NEUTRAL_DIFFICULTY),
        competition_density: number(overview, "Competition"),
        results_count: number(overview, "Number of Results").max(0.0) as u64,
        trend_12mo,
    }
}

#[derive(Clone)]
pub struct SemrushClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl SemrushClient {
    pub fn new(api_key: String, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http::build_client(timeout),
        }
    }

    async fn report(&self, report: &str, params: &[(&str, &str)]) -> SignalResult<Vec<Row>> {
        let url = format!("{}/", self.base_url);
        let body = http::send_text(
            PROVIDER_ID,
            self.client
                .get(&url)
                .query(&[("type", report), ("key", self.api_key.as_str())])
                .query(params),
        )
        .await?;
        parse_report(&body)
    }
}

#[async_trait]
impl SeoProvider for SemrushClient {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    /// `phrase_this` plus `phrase_kdi`
    fn requests_per_metric(&self) -> u32 {
        2
    }

    fn supports_competitors(&self) -> bool {
        true
    }

    fn supports_keyword_suggestions(&self) -> bool {
        true
    }

    async fn fetch_seo_metric(&self, keyword: &str, database: &str) -> SignalResult<SeoMetric> {
        let overview = self
            .report(
                "phrase_this",
                &[("phrase", keyword), ("database", database), ("export_columns", "Ph,Nq,Cp,Co,Nr,Td")],
            )
            .await?;
        let row = overview
            .first()
            .ok_or_else(|| SignalError::InvalidKeyword(format!("semrush has no data for '{}'", keyword)))?;

        // Difficulty is a separate report; a failed call fails the metric, an empty one is neutral
        let difficulty = self
            .report(
                "phrase_kdi",
                &[("phrase", keyword), ("database", database), ("export_columns", "Ph,Kd")],
            )
            .await?
            .first()
            .map(|r| number(r, "Keyword Difficulty Index"));
        if difficulty.is_none() {
            tracing::debug!("SEMrush has no difficulty for '{}', using neutral", keyword);
        }

        Ok(metric_from_rows(keyword, database, row, difficulty))
    }

    async fn fetch_competitors(&self, keyword: &str, database: &str) -> SignalResult<Vec<Competitor>> {
        let rows = self
            .report(
                "phrase_organic",
                &[
                    ("phrase", keyword),
                    ("database", database),
                    ("export_columns", "Dn,Ur"),
                    ("display_limit", SERP_LIMIT),
                ],
            )
            .await?;
        Ok(rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let url = field(row, "Url");
                Competitor {
                    domain: field(row, "Domain").to_string(),
                    url: (!url.is_empty()).then(|| url.to_string()),
                    position: i as u32 + 1,
                    estimated_traffic: None,
                }
            })
            .collect())
    }

    async fn fetch_keyword_suggestions(&self, keyword: &str, database: &str) -> SignalResult<Vec<KeywordSuggestion>> {
        let rows = self
            .report(
                "phrase_related",
                &[
                    ("phrase", keyword),
                    ("database", database),
                    ("export_columns", "Ph,Nq,Kd"),
                    ("display_limit", SUGGESTION_LIMIT),
                ],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| KeywordSuggestion {
                keyword: field(row, "Keyword").to_string(),
                monthly_volume: number(row, "Search Volume").max(0.0) as u64,
                difficulty: field(row, "Keyword Difficulty Index").parse().ok(),
            })
            .filter(|s| !s.keyword.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_phrase_this_report() {
        let body = "Keyword;Search Volume;CPC;Competition;Number of Results;Trends\r\n\
                    yoga mat;74000;0.81;1.00;226000000;0.82,0.82,1.00,0.82,0.67,0.67,0.67,0.67,0.67,0.67,0.82,0.82\r\n";
        let rows = parse_report(body).unwrap();
        assert_eq!(rows.len(), 1);

        let metric = metric_from_rows("yoga mat", "us", &rows[0], Some(67.0));
        assert_eq!(metric.monthly_volume, 74_000);
        assert_eq!(metric.results_count, 226_000_000);
        assert!((metric.cpc - 0.81).abs() < 1e-9);
        assert_eq!(metric.competition_density, 1.0);
        assert_eq!(metric.difficulty, 67.0);
        assert_eq!(metric.trend_12mo.len(), 12);
    }

    #[test]
    fn test_nothing_found_is_invalid_keyword() {
        let err = parse_report("ERROR 50 :: NOTHING FOUND").unwrap_err();
        assert!(matches!(err, SignalError::InvalidKeyword(_)));
    }

    #[test]
    fn test_units_exhausted_is_quota() {
        let err = parse_report("ERROR 132 :: API UNITS BALANCE IS ZERO").unwrap_err();
        assert!(matches!(err, SignalError::QuotaExceeded { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_empty_body_has_no_rows() {
        assert!(parse_report("").unwrap().is_empty());
    }

    #[test]
    fn test_missing_difficulty_is_neutral_not_easiest() {
        let rows = parse_report("Keyword;Search Volume\nfoam roller;1200").unwrap();
        let metric = metric_from_rows("foam roller", "uk", &rows[0], None);
        assert_eq!(metric.monthly_volume, 1_200);
        assert_eq!(metric.difficulty, crate::NEUTRAL_DIFFICULTY);
        assert!(metric.trend_12mo.is_empty());
    }
}

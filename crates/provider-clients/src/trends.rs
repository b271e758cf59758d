//! Client for a search-interest bridge service.
//!
//! The bridge fronts the public trends site and answers plain JSON:
//! `GET /series?keyword=..&timeframe=today%205-y&region=US` →
//! `{"points": [{"time": 1609459200, "value": 42}]}` and
//! `GET /rising?category=..&region=..` → `{"keywords": ["..."]}`.

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use signal_core::{SignalResult, Timeframe, TimeSeriesPoint, TrendProvider};
use std::time::Duration;

use crate::http;

pub const PROVIDER_ID: &str = "trends";

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    #[serde(default)]
    points: Vec<BridgePoint>,
}

#[derive(Debug, Deserialize)]
struct BridgePoint {
    /// Unix seconds
    time: i64,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct RisingResponse {
    #[serde(default)]
    keywords: Vec<String>,
}

pub(crate) fn parse_series(body: &str) -> SignalResult<Vec<TimeSeriesPoint>> {
    let response: SeriesResponse = http::parse_json(PROVIDER_ID, body)?;
    Ok(response
        .points
        .into_iter()
        .filter_map(|p| DateTime::from_timestamp(p.time, 0).map(|ts| TimeSeriesPoint::new(ts, p.value)))
        .collect())
}

#[derive(Clone)]
pub struct TrendsBridgeClient {
    base_url: String,
    client: Client,
}

impl TrendsBridgeClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http::build_client(timeout),
        }
    }
}

#[async_trait]
impl TrendProvider for TrendsBridgeClient {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn supports_rising_keywords(&self) -> bool {
        true
    }

    async fn fetch_trend_series(
        &self,
        keyword: &str,
        timeframe: Timeframe,
        region: &str,
    ) -> SignalResult<Vec<TimeSeriesPoint>> {
        let url = format!("{}/series", self.base_url);
        tracing::debug!("Fetching trend series for '{}' ({}, {})", keyword, timeframe, region);
        let body = http::send_text(
            PROVIDER_ID,
            self.client
                .get(&url)
                .query(&[("keyword", keyword), ("timeframe", timeframe.label()), ("region", region)]),
        )
        .await?;
        parse_series(&body)
    }

    async fn fetch_rising_keywords(&self, category: &str, region: &str) -> SignalResult<Vec<String>> {
        let url = format!("{}/rising", self.base_url);
        let response: RisingResponse = http::send_json(
            PROVIDER_ID,
            self.client.get(&url).query(&[("category", category), ("region", region)]),
        )
        .await?;
        Ok(response.keywords)
    }
}

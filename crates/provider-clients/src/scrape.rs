//! Structured-scrape provider: a service that already emits metrics in engine shape.

use async_trait::async_trait;
use reqwest::Client;
use signal_core::{Competitor, SeoMetric, SeoProvider, SignalResult};
use std::time::Duration;

use crate::http;

pub const PROVIDER_ID: &str = "scrape";

#[derive(Clone)]
pub struct ScrapeClient {
    base_url: String,
    client: Client,
}

impl ScrapeClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http::build_client(timeout),
        }
    }
}

#[async_trait]
impl SeoProvider for ScrapeClient {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    fn supports_competitors(&self) -> bool {
        true
    }

    async fn fetch_seo_metric(&self, keyword: &str, database: &str) -> SignalResult<SeoMetric> {
        let url = format!("{}/metrics", self.base_url);
        http::send_json(
            PROVIDER_ID,
            self.client.get(&url).query(&[("keyword", keyword), ("database", database)]),
        )
        .await
    }

    async fn fetch_competitors(&self, keyword: &str, database: &str) -> SignalResult<Vec<Competitor>> {
        let url = format!("{}/serp", self.base_url);
        http::send_json(
            PROVIDER_ID,
            self.client.get(&url).query(&[("keyword", keyword), ("database", database)]),
        )
        .await
    }
}

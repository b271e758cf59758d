//! HTTP-backed trend and SEO providers.
//!
//! Clients only translate between their backend and the engine types;
//! caching, quota and retry are layered on by the analyzers.

pub mod ahrefs;
mod http;
pub mod scrape;
pub mod semrush;
pub mod trends;

pub use ahrefs::AhrefsClient;
pub use scrape::ScrapeClient;
pub use semrush::SemrushClient;
pub use trends::TrendsBridgeClient;

use serde::{Deserialize, Serialize};
use signal_core::{SeoProvider, SignalError, SignalResult, TrendProvider};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Difficulty reported when a backend has no figure for a keyword: midway, neither easy nor hard.
pub const NEUTRAL_DIFFICULTY: f64 = 50.0;

/// Which backend answers SEO metric requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeoBackend {
    Semrush,
    Ahrefs,
    Scrape,
}

impl FromStr for SeoBackend {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semrush" => Ok(SeoBackend::Semrush),
            "ahrefs" => Ok(SeoBackend::Ahrefs),
            "scrape" => Ok(SeoBackend::Scrape),
            other => Err(SignalError::InvalidConfiguration(format!(
                "unknown SEO provider '{}' (expected semrush, ahrefs or scrape)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub trend_url: String,
    pub seo_backend: SeoBackend,
    pub semrush_api_key: Option<String>,
    pub semrush_url: String,
    pub ahrefs_api_key: Option<String>,
    pub ahrefs_url: String,
    pub scrape_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            trend_url: "http://localhost:8090".to_string(),
            seo_backend: SeoBackend::Semrush,
            semrush_api_key: None,
            semrush_url: semrush::DEFAULT_BASE_URL.to_string(),
            ahrefs_api_key: None,
            ahrefs_url: ahrefs::DEFAULT_BASE_URL.to_string(),
            scrape_url: None,
            request_timeout_secs: 30,
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl ProviderSettings {
    /// `TREND_PROVIDER_URL`, `SEO_PROVIDER`, `SEMRUSH_API_KEY`, `SEMRUSH_BASE_URL`,
    /// `AHREFS_API_KEY`, `AHREFS_BASE_URL`, `SCRAPE_PROVIDER_URL`, `PROVIDER_TIMEOUT_SECS`.
    pub fn from_env() -> SignalResult<Self> {
        let defaults = Self::default();
        let seo_backend = match non_empty("SEO_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => defaults.seo_backend,
        };
        let request_timeout_secs = match non_empty("PROVIDER_TIMEOUT_SECS") {
            Some(raw) => raw.parse().map_err(|_| {
                SignalError::InvalidConfiguration(format!("PROVIDER_TIMEOUT_SECS: cannot parse '{}'", raw))
            })?,
            None => defaults.request_timeout_secs,
        };

        Ok(Self {
            trend_url: non_empty("TREND_PROVIDER_URL").unwrap_or(defaults.trend_url),
            seo_backend,
            semrush_api_key: non_empty("SEMRUSH_API_KEY"),
            semrush_url: non_empty("SEMRUSH_BASE_URL").unwrap_or(defaults.semrush_url),
            ahrefs_api_key: non_empty("AHREFS_API_KEY"),
            ahrefs_url: non_empty("AHREFS_BASE_URL").unwrap_or(defaults.ahrefs_url),
            scrape_url: non_empty("SCRAPE_PROVIDER_URL"),
            request_timeout_secs,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

pub fn build_trend_provider(settings: &ProviderSettings) -> Arc<dyn TrendProvider> {
    Arc::new(TrendsBridgeClient::new(settings.trend_url.clone(), settings.request_timeout()))
}

/// The configured SEO backend; fails when its credentials or endpoint are missing.
pub fn build_seo_provider(settings: &ProviderSettings) -> SignalResult<Arc<dyn SeoProvider>> {
    let missing = |what: &str| {
        SignalError::InvalidConfiguration(format!("SEO_PROVIDER={:?} requires {}", settings.seo_backend, what))
    };
    let timeout = settings.request_timeout();

    let provider: Arc<dyn SeoProvider> = match settings.seo_backend {
        SeoBackend::Semrush => {
            let key = settings.semrush_api_key.clone().ok_or_else(|| missing("SEMRUSH_API_KEY"))?;
            Arc::new(SemrushClient::new(key, settings.semrush_url.clone(), timeout))
        }
        SeoBackend::Ahrefs => {
            let key = settings.ahrefs_api_key.clone().ok_or_else(|| missing("AHREFS_API_KEY"))?;
            Arc::new(AhrefsClient::new(key, settings.ahrefs_url.clone(), timeout))
        }
        SeoBackend::Scrape => {
            let url = settings.scrape_url.clone().ok_or_else(|| missing("SCRAPE_PROVIDER_URL"))?;
            Arc::new(ScrapeClient::new(url, timeout))
        }
    };
    tracing::info!("SEO provider: {}", provider.provider_id());
    Ok(provider)
}

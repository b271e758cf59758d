use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use opportunity_scorer::{rank_opportunities, ProductOpportunityScorer};
use quota_guard::QuotaGuard;
use seo_analysis::SeoMetricsAnalyzer;
use serde::Serialize;
use signal_cache::SignalCache;
use signal_core::{ProductOpportunity, KNOWN_PROVIDERS};
use tokio::signal::unix::SignalKind;
use tokio::time;
use trend_analysis::TrendSignalAnalyzer;

mod config;

use config::CliConfig;

#[derive(Debug, Serialize)]
struct ScoringFailure {
    product_id: String,
    error: String,
}

/// One scoring pass, ranked best first
#[derive(Debug, Serialize)]
struct RunReport {
    generated_at: DateTime<Utc>,
    cycle: u64,
    ranked: Vec<ProductOpportunity>,
    failures: Vec<ScoringFailure>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // Logs go to stderr; stdout carries the JSON report
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    tracing::info!("Starting product opportunity scoring");

    // 2. Configuration
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = CliConfig::from_env_and_args(&args)?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Products: {}", config.products.len());
    tracing::info!(
        "  Weights: trend {:.2} | seo {:.2} | seasonality {:.2} | competition {:.2}",
        config.engine.scoring.weights.trend,
        config.engine.scoring.weights.seo,
        config.engine.scoring.weights.seasonality,
        config.engine.scoring.weights.competition
    );
    tracing::info!(
        "  Timeframe: {} | Region: {} | Database: {}",
        config.engine.scoring.timeframe,
        config.engine.scoring.region,
        config.engine.scoring.database
    );

    // 3. Shared cache and quota, built once for every analyzer
    let cache = SignalCache::new();
    let quota = QuotaGuard::from_config(&config.engine);

    // 4. Providers and analyzers
    let trend_provider = provider_clients::build_trend_provider(&config.providers);
    let seo_provider =
        provider_clients::build_seo_provider(&config.providers).context("cannot build SEO provider")?;

    let trend = Arc::new(TrendSignalAnalyzer::new(
        trend_provider,
        cache.clone(),
        quota.clone(),
        config.engine.trend.clone(),
        config.engine.cache.clone(),
        config.engine.retry.clone(),
    ));
    let seo = Arc::new(SeoMetricsAnalyzer::new(
        seo_provider,
        cache.clone(),
        quota.clone(),
        config.engine.seo.clone(),
        config.engine.cache.clone(),
        config.engine.retry.clone(),
    ));
    let scorer = ProductOpportunityScorer::new(trend, seo, config.engine.scoring.clone());

    // 5. One-shot run
    let Some(interval_secs) = config.refresh_interval_seconds else {
        run_cycle(&scorer, &config, &cache, &quota, 1).await?;
        return Ok(());
    };

    // 6. Refresh loop with graceful shutdown (SIGINT + SIGTERM)
    tracing::info!("Refreshing every {}s", interval_secs);
    let mut interval = time::interval(Duration::from_secs(interval_secs));
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    let mut cycle = 0u64;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                cycle += 1;
                if let Err(e) = run_cycle(&scorer, &config, &cache, &quota, cycle).await {
                    tracing::error!("Error in scoring cycle #{}: {}", cycle, e);
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, exiting gracefully...");
                break;
            }
        }
    }

    tracing::info!("Opportunity scoring shut down after {} cycles.", cycle);
    Ok(())
}

async fn run_cycle(
    scorer: &ProductOpportunityScorer,
    config: &CliConfig,
    cache: &SignalCache,
    quota: &QuotaGuard,
    cycle: u64,
) -> Result<()> {
    let started = std::time::Instant::now();
    let products: Vec<(String, Vec<String>)> = config
        .products
        .iter()
        .map(|p| (p.product_id.clone(), p.keywords.clone()))
        .collect();

    let mut ranked = Vec::new();
    let mut failures = Vec::new();
    for (product_id, result) in scorer.score_products(&products).await {
        match result {
            Ok(opportunity) => ranked.push(opportunity),
            Err(e) => {
                tracing::warn!("Product {} not scored: {}", product_id, e);
                failures.push(ScoringFailure {
                    product_id,
                    error: e.to_string(),
                });
            }
        }
    }
    rank_opportunities(&mut ranked);
    if let Some(n) = config.top_n {
        ranked.truncate(n);
    }

    let report = RunReport {
        generated_at: Utc::now(),
        cycle,
        ranked,
        failures,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    let purged = cache.purge_expired();
    tracing::info!(
        "Cycle #{} done in {:.1}s: {} scored, {} failed, {} cached signals ({} expired purged)",
        cycle,
        started.elapsed().as_secs_f64(),
        report.ranked.len(),
        report.failures.len(),
        cache.len(),
        purged
    );
    for provider in KNOWN_PROVIDERS {
        tracing::debug!("Quota remaining today for {}: {}", provider, quota.remaining_today(provider).await);
    }
    Ok(())
}

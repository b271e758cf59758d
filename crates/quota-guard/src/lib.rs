use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use signal_core::{EngineConfig, ProviderLimits, SignalError, SignalResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Start of the daily window containing `now`, with the boundary shifted by `offset_hours` from midnight UTC.
pub fn window_start(now: DateTime<Utc>, offset_hours: i64) -> DateTime<Utc> {
    let shifted = now - ChronoDuration::hours(offset_hours);
    let midnight = shifted
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(shifted);
    midnight + ChronoDuration::hours(offset_hours)
}

/// Quota bookkeeping for one provider.
#[derive(Debug)]
struct QuotaState {
    provider: String,
    limits: ProviderLimits,
    /// Token bucket for the per-second rate
    tokens: f64,
    last_refill: Instant,
    window_start: DateTime<Utc>,
    count_in_window: u64,
}

impl QuotaState {
    fn new(provider: &str, limits: ProviderLimits) -> Self {
        let window_start = window_start(Utc::now(), limits.reset_offset_hours);
        Self {
            provider: provider.to_string(),
            tokens: Self::capacity_of(&limits),
            limits,
            last_refill: Instant::now(),
            window_start,
            count_in_window: 0,
        }
    }

    /// Burst allowance: one second worth of requests, at least one
    fn capacity_of(limits: &ProviderLimits) -> f64 {
        limits.rate_limit_per_second.max(1.0)
    }

    fn roll_window(&mut self, now: DateTime<Utc>) {
        let current = window_start(now, self.limits.reset_offset_hours);
        if current > self.window_start {
            tracing::info!(
                "Daily quota window reset for {} ({} requests used)",
                self.provider,
                self.count_in_window
            );
            self.window_start = current;
            self.count_in_window = 0;
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.limits.rate_limit_per_second)
            .min(Self::capacity_of(&self.limits));
        self.last_refill = now;
    }

    fn remaining_today(&self) -> u64 {
        self.limits.daily_limit.saturating_sub(self.count_in_window)
    }
}

/// Proof that one request to `provider` fits within its quota.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaPermit {
    pub provider: String,
    pub remaining_today: u64,
    pub window_start: DateTime<Utc>,
}

/// Per-provider request-rate and daily-cap enforcement, shared by all analyzers.
///
/// Cloning shares the same state.
#[derive(Clone)]
pub struct QuotaGuard {
    states: Arc<DashMap<String, Arc<Mutex<QuotaState>>>>,
    limits: Arc<HashMap<String, ProviderLimits>>,
    default_limits: ProviderLimits,
}

impl QuotaGuard {
    pub fn new(limits: HashMap<String, ProviderLimits>, default_limits: ProviderLimits) -> Self {
        Self {
            states: Arc::new(DashMap::new()),
            limits: Arc::new(limits),
            default_limits,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.providers.clone(), config.default_limits.clone())
    }

    fn state_for(&self, provider: &str) -> Arc<Mutex<QuotaState>> {
        self.states
            .entry(provider.to_string())
            .or_insert_with(|| {
                let limits = self.limits.get(provider).cloned().unwrap_or_else(|| {
                    tracing::debug!("No quota configured for {}, using defaults", provider);
                    self.default_limits.clone()
                });
                Arc::new(Mutex::new(QuotaState::new(provider, limits)))
            })
            .clone()
    }

    /// Take one request slot for `provider`.
    ///
    /// Waits up to the provider's `max_wait_ms` for the per-second bucket to refill.
    /// An exhausted daily cap fails immediately with `QuotaExceeded`.
    pub async fn acquire(&self, provider: &str) -> SignalResult<QuotaPermit> {
        self.acquire_many(provider, 1).await
    }

    /// Take `count` request slots at once, for a call that costs several backend requests.
    ///
    /// Either every slot is granted or none is: a daily cap that cannot fit all of
    /// them fails without consuming any. Bursts larger than the bucket capacity
    /// wait for a full bucket and leave it in debt.
    pub async fn acquire_many(&self, provider: &str, count: u32) -> SignalResult<QuotaPermit> {
        let count = count.max(1);
        let state = self.state_for(provider);
        let started = Instant::now();

        loop {
            let (wait, max_wait) = {
                let mut s = state.lock().await;
                s.roll_window(Utc::now());

                if s.count_in_window + u64::from(count) > s.limits.daily_limit {
                    tracing::warn!(
                        "Daily quota exhausted for {} ({} requests since {}, {} needed)",
                        provider,
                        s.count_in_window,
                        s.window_start,
                        count
                    );
                    return Err(SignalError::quota(
                        provider,
                        format!(
                            "daily limit of {} reached ({} left, {} needed)",
                            s.limits.daily_limit,
                            s.remaining_today(),
                            count
                        ),
                    ));
                }

                s.refill(Instant::now());
                let needed = f64::from(count).min(QuotaState::capacity_of(&s.limits));
                if s.tokens >= needed {
                    s.tokens -= f64::from(count);
                    s.count_in_window += u64::from(count);
                    return Ok(QuotaPermit {
                        provider: provider.to_string(),
                        remaining_today: s.remaining_today(),
                        window_start: s.window_start,
                    });
                }

                let wait = Duration::try_from_secs_f64((needed - s.tokens) / s.limits.rate_limit_per_second)
                    .unwrap_or(Duration::MAX);
                (wait, s.limits.max_wait())
            };

            if started.elapsed().saturating_add(wait) > max_wait {
                return Err(SignalError::quota(
                    provider,
                    format!("rate limit slot not available within {}ms", max_wait.as_millis()),
                ));
            }

            tracing::debug!(
                "Quota guard: waiting {:.3}s for {} rate slot",
                wait.as_secs_f64(),
                provider
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests left in the current daily window
    pub async fn remaining_today(&self, provider: &str) -> u64 {
        let state = self.state_for(provider);
        let mut s = state.lock().await;
        s.roll_window(Utc::now());
        s.remaining_today()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures_util::future::join_all;

    fn guard(rps: f64, daily: u64, max_wait_ms: u64) -> QuotaGuard {
        let mut limits = HashMap::new();
        limits.insert(
            "semrush".to_string(),
            ProviderLimits {
                rate_limit_per_second: rps,
                daily_limit: daily,
                max_wait_ms,
                reset_offset_hours: 0,
            },
        );
        QuotaGuard::new(limits, ProviderLimits::default())
    }

    #[test]
    fn test_window_start_at_midnight_utc() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 15, 30, 0).unwrap();
        assert_eq!(window_start(now, 0), Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_window_start_with_offset() {
        // Boundary at 08:00 UTC: 05:00 still belongs to the previous day's window
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 5, 0, 0).unwrap();
        assert_eq!(window_start(now, 8), Utc.with_ymd_and_hms(2026, 3, 13, 8, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_daily_cap_holds_under_concurrency() {
        let guard = guard(1_000.0, 10, 1_000);
        let attempts = (0..50).map(|_| {
            let guard = guard.clone();
            async move { guard.acquire("semrush").await }
        });
        let results = join_all(attempts).await;

        let granted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(granted, 10);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, SignalError::QuotaExceeded { .. })));
        assert_eq!(guard.remaining_today("semrush").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_for_refill() {
        let guard = guard(2.0, 100, 5_000);
        let start = Instant::now();
        for _ in 0..3 {
            guard.acquire("semrush").await.unwrap();
        }
        // Bucket holds two tokens; the third refills at 2/s
        assert!(start.elapsed() >= Duration::from_millis(490));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_fails_past_max_wait() {
        let guard = guard(1.0, 100, 100);
        assert!(guard.acquire("semrush").await.is_ok());
        let err = guard.acquire("semrush").await.unwrap_err();
        assert!(matches!(err, SignalError::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn test_daily_cap_fails_without_waiting() {
        let guard = guard(0.001, 1, 60_000);
        let permit = guard.acquire("semrush").await.unwrap();
        assert_eq!(permit.remaining_today, 0);

        let start = std::time::Instant::now();
        let err = guard.acquire("semrush").await.unwrap_err();
        assert!(start.elapsed() < Duration::from_millis(50));
        assert!(err.to_string().contains("daily limit"));
    }

    #[tokio::test]
    async fn test_multi_request_call_counts_every_request() {
        let guard = guard(1_000.0, 5, 1_000);
        let permit = guard.acquire_many("semrush", 2).await.unwrap();
        assert_eq!(permit.remaining_today, 3);
        guard.acquire_many("semrush", 2).await.unwrap();

        // One slot left: a two-request call must not get it, a single request still can
        let err = guard.acquire_many("semrush", 2).await.unwrap_err();
        assert!(matches!(err, SignalError::QuotaExceeded { .. }));
        assert_eq!(guard.remaining_today("semrush").await, 1);
        assert!(guard.acquire("semrush").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_request_call_spends_rate_tokens() {
        let guard = guard(2.0, 100, 5_000);
        let start = Instant::now();
        guard.acquire_many("semrush", 2).await.unwrap();
        guard.acquire_many("semrush", 2).await.unwrap();
        // The second pair waits for the bucket to refill completely at 2/s
        assert!(start.elapsed() >= Duration::from_millis(990));
    }

    #[tokio::test]
    async fn test_unconfigured_provider_uses_defaults() {
        let guard = guard(1.0, 1, 0);
        let permit = guard.acquire("ahrefs").await.unwrap();
        assert_eq!(permit.remaining_today, ProviderLimits::default().daily_limit - 1);
    }
}

use reqwest::{Client, RequestBuilder, Response};
use signal_core::{SignalError, SignalResult};
use std::time::Duration;

pub(crate) fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Map a non-success HTTP status to the error taxonomy.
///
/// Only transient statuses (429, 5xx, anything unrecognized) come back as
/// `ProviderUnavailable`, so only those get retried.
pub(crate) fn classify_status(provider: &str, status: u16, body: &str) -> SignalError {
    let detail = format!("{} HTTP {}: {}", provider, status, body.trim());
    match status {
        400 | 404 | 422 => SignalError::InvalidKeyword(detail),
        401 | 403 => SignalError::InvalidConfiguration(detail),
        402 => SignalError::quota(provider, detail),
        _ => SignalError::ProviderUnavailable(detail),
    }
}

/// Send a request, turning transport failures and error statuses into `SignalError`.
pub(crate) async fn send(provider: &str, builder: RequestBuilder) -> SignalResult<Response> {
    let response = builder.send().await.map_err(|e| {
        tracing::warn!("{} request failed: {}", provider, e);
        SignalError::ProviderUnavailable(format!("{}: {}", provider, e))
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(provider, status.as_u16(), &body))
}

pub(crate) async fn send_json<T: serde::de::DeserializeOwned>(
    provider: &str,
    builder: RequestBuilder,
) -> SignalResult<T> {
    let body = send_text(provider, builder).await?;
    parse_json(provider, &body)
}

pub(crate) async fn send_text(provider: &str, builder: RequestBuilder) -> SignalResult<String> {
    send(provider, builder)
        .await?
        .text()
        .await
        .map_err(|e| SignalError::ProviderUnavailable(format!("{} body: {}", provider, e)))
}

/// A body that does not decode is a provider fault, not a caller fault.
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(provider: &str, body: &str) -> SignalResult<T> {
    serde_json::from_str(body)
        .map_err(|e| SignalError::ProviderUnavailable(format!("{} returned malformed JSON: {}", provider, e)))
}

/// Registrable host of a result URL, without a leading `www.`
pub(crate) fn domain_of(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(classify_status("semrush", 404, ""), SignalError::InvalidKeyword(_)));
        assert!(matches!(classify_status("semrush", 401, ""), SignalError::InvalidConfiguration(_)));
        assert!(matches!(classify_status("semrush", 402, ""), SignalError::QuotaExceeded { .. }));
        assert!(classify_status("semrush", 429, "slow down").is_retryable());
        assert!(classify_status("semrush", 503, "").is_retryable());
    }

    #[test]
    fn test_malformed_json_is_provider_fault() {
        let err = parse_json::<Vec<u32>>("trends", "<html>").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("https://www.example.com/a?b=1").as_deref(), Some("example.com"));
        assert_eq!(domain_of("https://shop.example.org").as_deref(), Some("shop.example.org"));
        assert_eq!(domain_of("not a url"), None);
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy shared by every component of the scoring engine.
///
/// `Clone` so a single in-flight fetch can hand the same failure to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Quota exceeded for {provider}: {detail}")]
    QuotaExceeded { provider: String, detail: String },

    #[error("Invalid keyword: {0}")]
    InvalidKeyword(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Cache corruption: {0}")]
    CacheCorruption(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The provider does not offer the requested optional capability
    #[error("Unsupported capability: {0}")]
    Unsupported(String),
}

impl SignalError {
    /// Only transient provider failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SignalError::ProviderUnavailable(_))
    }

    pub fn quota(provider: &str, detail: impl Into<String>) -> Self {
        SignalError::QuotaExceeded {
            provider: provider.to_string(),
            detail: detail.into(),
        }
    }
}

/// Why a feature or criterion has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    ProviderUnavailable,
    QuotaExceeded,
    InvalidKeyword,
    InsufficientData,
    Timeout,
    CacheCorruption,
}

impl UnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailableReason::ProviderUnavailable => "provider unavailable",
            UnavailableReason::QuotaExceeded => "quota exceeded",
            UnavailableReason::InvalidKeyword => "invalid keyword",
            UnavailableReason::InsufficientData => "insufficient data",
            UnavailableReason::Timeout => "timed out",
            UnavailableReason::CacheCorruption => "cache corruption",
        }
    }
}

/// Serializable marker carried in place of a missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unavailability {
    pub reason: UnavailableReason,
    pub detail: String,
}

impl Unavailability {
    pub fn new(reason: UnavailableReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(UnavailableReason::Timeout, detail)
    }
}

impl From<&SignalError> for Unavailability {
    fn from(err: &SignalError) -> Self {
        let reason = match err {
            SignalError::ProviderUnavailable(_) => UnavailableReason::ProviderUnavailable,
            SignalError::QuotaExceeded { .. } => UnavailableReason::QuotaExceeded,
            SignalError::InvalidKeyword(_) => UnavailableReason::InvalidKeyword,
            SignalError::InsufficientData(_) => UnavailableReason::InsufficientData,
            SignalError::CacheCorruption(_) => UnavailableReason::CacheCorruption,
            // Configuration problems surface to operators as a provider fault
            SignalError::InvalidConfiguration(_) | SignalError::Unsupported(_) => {
                UnavailableReason::ProviderUnavailable
            }
        };
        Self::new(reason, err.to_string())
    }
}

impl std::fmt::Display for Unavailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.reason.as_str(), self.detail)
    }
}

pub type SignalResult<T> = Result<T, SignalError>;

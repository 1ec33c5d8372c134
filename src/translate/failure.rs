use std::time::Duration;
use thiserror::Error;

/// Delay applied to a rate limit when the upstream gives no usable `Retry-After`
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Upper bound on a server-provided `Retry-After`
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(120);

/// Classification of one failed upstream attempt
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailureKind {
    #[error("empty response: {0}")]
    EmptyResponse(String),

    #[error("payment required: {0}")]
    PaymentRequired(String),

    #[error("rate limited, retry after {}s", .retry_after.as_secs_f64())]
    RateLimited { retry_after: Duration },

    #[error("connection error: {0}")]
    TransientConnection(String),

    #[error("upstream error{}: {message}", status_suffix(.status))]
    NonRetryableUpstream { status: Option<u16>, message: String },

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// The retryable subset of [`FailureKind`], one budget each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    EmptyResponse,
    PaymentRequired,
    RateLimited,
    TransientConnection,
}

impl RetryClass {
    pub fn index(self) -> usize {
        match self {
            RetryClass::EmptyResponse => 0,
            RetryClass::PaymentRequired => 1,
            RetryClass::RateLimited => 2,
            RetryClass::TransientConnection => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RetryClass::EmptyResponse => "Empty response",
            RetryClass::PaymentRequired => "Payment error",
            RetryClass::RateLimited => "Rate limited",
            RetryClass::TransientConnection => "Connection/timeout error",
        }
    }
}

impl FailureKind {
    /// `None` for kinds that abort the attempt chain on first occurrence
    pub fn retry_class(&self) -> Option<RetryClass> {
        match self {
            FailureKind::EmptyResponse(_) => Some(RetryClass::EmptyResponse),
            FailureKind::PaymentRequired(_) => Some(RetryClass::PaymentRequired),
            FailureKind::RateLimited { .. } => Some(RetryClass::RateLimited),
            FailureKind::TransientConnection(_) => Some(RetryClass::TransientConnection),
            FailureKind::NonRetryableUpstream { .. } | FailureKind::Unexpected(_) => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_class().is_some()
    }

    /// Negative delays clamp to zero, NaN falls back to the default and
    /// anything above the cap, infinity included, is capped
    pub fn rate_limited_secs(secs: f64) -> Self {
        if secs.is_nan() {
            return FailureKind::RateLimited {
                retry_after: DEFAULT_RETRY_AFTER,
            };
        }
        let retry_after = Duration::try_from_secs_f64(secs.max(0.0))
            .map(|d| d.min(MAX_RETRY_AFTER))
            .unwrap_or(MAX_RETRY_AFTER);
        FailureKind::RateLimited { retry_after }
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ports::provider::{PlaylistProvider, ProviderCredential, ProviderError};
use crate::sync::rate_limit::{ProviderRateLimiter, RateLimitKey};

/// Bounded exponential backoff for provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .with_jitter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("pass deadline elapsed")]
    DeadlineElapsed,
    #[error("pass cancelled")]
    Cancelled,
}

impl CallError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_retryable())
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Provider(e) => e.retry_after(),
            _ => None,
        }
    }
}

/// Value of a call that may have needed more than one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Everything a pass needs to talk to the provider: the port, the caller's
/// credential, the shared token bucket, the retry budget and the pass-level
/// deadline / cancellation signal.
pub struct RemoteContext {
    provider: Arc<dyn PlaylistProvider>,
    provider_name: String,
    credential: ProviderCredential,
    limiter: Arc<ProviderRateLimiter>,
    limit_key: RateLimitKey,
    retry: RetryPolicy,
    deadline: Instant,
    cancel: CancellationToken,
}

impl RemoteContext {
    pub fn new(
        provider: Arc<dyn PlaylistProvider>,
        provider_name: &str,
        credential: ProviderCredential,
        limiter: Arc<ProviderRateLimiter>,
        retry: RetryPolicy,
        deadline: Instant,
        cancel: CancellationToken,
    ) -> Self {
        let limit_key = RateLimitKey::new(provider_name, &credential);
        Self {
            provider,
            provider_name: provider_name.to_string(),
            credential,
            limiter,
            limit_key,
            retry,
            deadline,
            cancel,
        }
    }

    pub fn provider(&self) -> &dyn PlaylistProvider {
        self.provider.as_ref()
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn credential(&self) -> &ProviderCredential {
        &self.credential
    }

    /// True once the caller cancelled or the pass deadline passed.
    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Waits for a rate-limit token, bounded by the deadline and cancellation.
    pub async fn ready(&self) -> Result<(), CallError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CallError::Cancelled),
            waited = tokio::time::timeout_at(self.deadline, self.limiter.until_ready(&self.limit_key)) => {
                waited.map_err(|_| CallError::DeadlineElapsed)
            }
        }
    }

    /// Issues a single rate-limited call without retrying.
    pub async fn call_once<T, Fut>(&self, call: Fut) -> Result<T, CallError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.ready().await?;
        Ok(call.await?)
    }

    /// Issues a rate-limited call, retrying 429/5xx/network failures with
    /// exponential backoff. A provider `Retry-After` hint stretches the delay.
    ///
    /// Backoff sleeps are bounded like every other wait: cancellation stops
    /// them, and a delay that would end past the deadline is not taken.
    pub async fn retrying<T, F, Fut>(&self, what: &str, mut call: F) -> Result<Attempted<T>, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let deadline = self.deadline;
        let mut retries = 0u32;
        let mut out_of_time = false;

        let attempts = (|| {
            let fut = call();
            async move {
                self.ready().await?;
                fut.await.map_err(CallError::Provider)
            }
        })
        .retry(self.retry.backoff())
        .when(CallError::is_retryable)
        .adjust(|err: &CallError, delay: Option<Duration>| {
            let delay = delay.map(|d| err.retry_after().map_or(d, |hint| hint.max(d)))?;
            if Instant::now() + delay >= deadline {
                out_of_time = true;
                return None;
            }
            Some(delay)
        })
        .notify(|err: &CallError, delay: Duration| {
            retries += 1;
            tracing::warn!(what, error = %err, ?delay, "Retrying provider call");
        });

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CallError::Cancelled),
            result = tokio::time::timeout_at(deadline, attempts) => {
                result.unwrap_or(Err(CallError::DeadlineElapsed))
            }
        };

        match outcome {
            Ok(value) => Ok(Attempted {
                value,
                attempts: retries + 1,
            }),
            Err(err) if out_of_time && err.is_retryable() => {
                tracing::warn!(what, error = %err, "Backoff would outlast the pass deadline");
                Err(CallError::DeadlineElapsed)
            }
            Err(err) => Err(err),
        }
    }
}

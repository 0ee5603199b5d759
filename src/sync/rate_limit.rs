use std::num::NonZeroU32;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::ports::provider::ProviderCredential;

/// Quotas are per provider account, so every playlist synced with the same
/// credential draws from the same bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub provider: String,
    pub account: String,
}

impl RateLimitKey {
    pub fn new(provider: &str, credential: &ProviderCredential) -> Self {
        Self {
            provider: provider.to_string(),
            account: credential.user_id.clone(),
        }
    }
}

/// Process-wide token buckets for provider calls, one per [`RateLimitKey`].
///
/// Token withdrawal is atomic, so concurrent passes can share one instance.
pub struct ProviderRateLimiter {
    limiter: DefaultKeyedRateLimiter<RateLimitKey>,
}

impl ProviderRateLimiter {
    pub fn new(requests_per_second: NonZeroU32, burst: NonZeroU32) -> Self {
        Self::from_quota(Quota::per_second(requests_per_second).allow_burst(burst))
    }

    pub fn from_quota(quota: Quota) -> Self {
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// Suspends until a token is available for `key`.
    pub async fn until_ready(&self, key: &RateLimitKey) {
        self.limiter.until_key_ready(key).await;
    }

    /// Takes a token without waiting; returns whether one was available.
    pub fn try_acquire(&self, key: &RateLimitKey) -> bool {
        self.limiter.check_key(key).is_ok()
    }

    /// Drops buckets that have fully refilled, bounding memory for idle accounts.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}
